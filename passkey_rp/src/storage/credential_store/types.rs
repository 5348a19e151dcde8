use async_trait::async_trait;

use crate::passkey::{Credential, CredentialId, User};
use crate::storage::errors::StorageError;

/// Persistence for users and their credentials.
///
/// Reads must be safe under concurrent writes, and writes to one user's credential list
/// are serialized. A credential ID is unique across all users.
#[async_trait]
pub trait CredentialStore: Send + Sync + 'static {
    /// Initialize the store. This is called when the store is created.
    async fn init(&self) -> Result<(), StorageError>;

    /// Looks a user up by name, credentials included in registration order.
    async fn get_user(&self, name: &str) -> Result<Option<User>, StorageError>;

    /// Inserts `user` unless one with the same name exists, and returns the stored user.
    async fn put_user(&self, user: User) -> Result<User, StorageError>;

    /// Appends a credential to the user with id `user_id`.
    ///
    /// Fails with [`StorageError::DuplicateCredential`] if the ID is registered to anyone.
    async fn add_credential(&self, user_id: &[u8], credential: Credential) -> Result<(), StorageError>;

    async fn credential_exists(&self, credential_id: &CredentialId) -> Result<bool, StorageError>;

    /// Sets the signature counter to `new` only if it still equals `previous`.
    ///
    /// Returns false when the stored value moved on, so the caller can re-read and retry.
    async fn update_counter(
        &self,
        user_id: &[u8],
        credential_id: &CredentialId,
        previous: u32,
        new: u32,
    ) -> Result<bool, StorageError>;
}
