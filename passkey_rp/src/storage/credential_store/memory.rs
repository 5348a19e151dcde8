use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::passkey::{Credential, CredentialId, User};
use crate::storage::errors::StorageError;

use super::types::CredentialStore;

#[derive(Default)]
struct Inner {
    users: HashMap<String, User>,
    // user id -> user name
    names: HashMap<Vec<u8>, String>,
    // credential id -> user id
    owners: HashMap<CredentialId, Vec<u8>>,
}

impl Inner {
    fn user_by_id_mut(&mut self, user_id: &[u8]) -> Option<&mut User> {
        let name = self.names.get(user_id)?;
        self.users.get_mut(name)
    }
}

/// Process-local credential store.
pub struct InMemoryCredentialStore {
    inner: RwLock<Inner>,
}

impl InMemoryCredentialStore {
    pub fn new() -> Self {
        tracing::info!("Creating new in-memory credential store");
        Self {
            inner: RwLock::new(Inner::default()),
        }
    }
}

impl Default for InMemoryCredentialStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CredentialStore for InMemoryCredentialStore {
    async fn init(&self) -> Result<(), StorageError> {
        Ok(())
    }

    async fn get_user(&self, name: &str) -> Result<Option<User>, StorageError> {
        Ok(self.inner.read().await.users.get(name).cloned())
    }

    async fn put_user(&self, user: User) -> Result<User, StorageError> {
        let mut inner = self.inner.write().await;
        if let Some(existing) = inner.users.get(&user.name) {
            return Ok(existing.clone());
        }
        inner.names.insert(user.id.clone(), user.name.clone());
        for credential in &user.credentials {
            inner
                .owners
                .insert(credential.credential_id.clone(), user.id.clone());
        }
        inner.users.insert(user.name.clone(), user.clone());
        Ok(user)
    }

    async fn add_credential(&self, user_id: &[u8], credential: Credential) -> Result<(), StorageError> {
        let mut inner = self.inner.write().await;
        if inner.owners.contains_key(&credential.credential_id) {
            return Err(StorageError::DuplicateCredential(
                credential.credential_id.to_base64url(),
            ));
        }

        let credential_id = credential.credential_id.clone();
        let user = inner
            .user_by_id_mut(user_id)
            .ok_or_else(|| StorageError::NotFound("user".to_string()))?;
        user.credentials.push(credential);
        inner.owners.insert(credential_id, user_id.to_vec());
        Ok(())
    }

    async fn credential_exists(&self, credential_id: &CredentialId) -> Result<bool, StorageError> {
        Ok(self.inner.read().await.owners.contains_key(credential_id))
    }

    async fn update_counter(
        &self,
        user_id: &[u8],
        credential_id: &CredentialId,
        previous: u32,
        new: u32,
    ) -> Result<bool, StorageError> {
        let mut inner = self.inner.write().await;
        let user = inner
            .user_by_id_mut(user_id)
            .ok_or_else(|| StorageError::NotFound("user".to_string()))?;
        let credential = user
            .credentials
            .iter_mut()
            .find(|c| &c.credential_id == credential_id)
            .ok_or_else(|| StorageError::NotFound(format!("credential {credential_id}")))?;

        if credential.sign_count != previous {
            return Ok(false);
        }
        credential.sign_count = new;
        credential.last_used_at = Utc::now();
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::passkey::CredentialPublicKey;
    use std::sync::Arc;

    fn credential(id: &[u8], sign_count: u32) -> Credential {
        Credential {
            credential_id: CredentialId::new(id.to_vec()),
            public_key: CredentialPublicKey::EdDsa { x: vec![1; 32] },
            sign_count,
            transports: vec!["internal".to_string()],
            aaguid: "00000000-0000-0000-0000-000000000000".to_string(),
            attestation_format: "none".to_string(),
            created_at: Utc::now(),
            last_used_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_put_user_keeps_existing() {
        let store = InMemoryCredentialStore::new();
        let first = store.put_user(User::new("alice", "alice").unwrap()).await.unwrap();
        let second = store.put_user(User::new("alice", "Alice 2").unwrap()).await.unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(second.display_name, "alice");
    }

    #[tokio::test]
    async fn test_get_unknown_user() {
        let store = InMemoryCredentialStore::new();
        assert!(store.get_user("nobody").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_add_credential_keeps_order_and_uniqueness() {
        let store = InMemoryCredentialStore::new();
        let alice = store.put_user(User::new("alice", "alice").unwrap()).await.unwrap();
        let bob = store.put_user(User::new("bob", "bob").unwrap()).await.unwrap();

        store.add_credential(&alice.id, credential(b"c1", 0)).await.unwrap();
        store.add_credential(&alice.id, credential(b"c2", 0)).await.unwrap();

        let err = store
            .add_credential(&bob.id, credential(b"c1", 0))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::DuplicateCredential(_)));

        let alice = store.get_user("alice").await.unwrap().unwrap();
        let ids: Vec<_> = alice.credential_ids();
        assert_eq!(
            ids,
            vec![CredentialId::new(b"c1".to_vec()), CredentialId::new(b"c2".to_vec())]
        );
        assert!(store.credential_exists(&ids[0]).await.unwrap());
        assert!(store.get_user("bob").await.unwrap().unwrap().credentials.is_empty());
    }

    #[tokio::test]
    async fn test_add_credential_unknown_user() {
        let store = InMemoryCredentialStore::new();
        let err = store.add_credential(&[0; 32], credential(b"c1", 0)).await.unwrap_err();
        assert!(matches!(err, StorageError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_update_counter_is_compare_and_set() {
        let store = InMemoryCredentialStore::new();
        let alice = store.put_user(User::new("alice", "alice").unwrap()).await.unwrap();
        let id = CredentialId::new(b"c1".to_vec());
        store.add_credential(&alice.id, credential(b"c1", 5)).await.unwrap();

        assert!(!store.update_counter(&alice.id, &id, 4, 9).await.unwrap());
        assert!(store.update_counter(&alice.id, &id, 5, 6).await.unwrap());
        assert!(!store.update_counter(&alice.id, &id, 5, 7).await.unwrap());

        let alice = store.get_user("alice").await.unwrap().unwrap();
        assert_eq!(alice.credentials[0].sign_count, 6);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_registration_of_same_id() {
        let store = Arc::new(InMemoryCredentialStore::new());
        let alice = store.put_user(User::new("alice", "alice").unwrap()).await.unwrap();

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let store = store.clone();
            let user_id = alice.id.clone();
            tasks.push(tokio::spawn(async move {
                store.add_credential(&user_id, credential(b"same", 0)).await
            }));
        }

        let mut ok = 0;
        for task in tasks {
            if task.await.unwrap().is_ok() {
                ok += 1;
            }
        }
        assert_eq!(ok, 1);
        let alice = store.get_user("alice").await.unwrap().unwrap();
        assert_eq!(alice.credentials.len(), 1);
    }
}
