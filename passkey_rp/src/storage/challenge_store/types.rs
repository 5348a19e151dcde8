use async_trait::async_trait;

use crate::passkey::{ChallengeHandle, ChallengeState};
use crate::storage::errors::StorageError;

/// Result of taking a challenge out of the store.
///
/// An expired entry keeps answering [`LoadedChallenge::Expired`] and a consumed one
/// [`LoadedChallenge::Consumed`] until the retention window after expiry has passed.
#[derive(Debug, Clone)]
pub enum LoadedChallenge {
    /// First take of a live entry; the entry is now consumed
    Active(ChallengeState),
    Expired,
    Consumed,
    NotFound,
}

/// Storage for in-flight ceremony state, keyed by an opaque handle.
///
/// Implementations must make [`ChallengeStore::take`] atomic: of any number of
/// concurrent takes on one handle, at most one returns [`LoadedChallenge::Active`].
#[async_trait]
pub trait ChallengeStore: Send + Sync + 'static {
    /// Initialize the store. This is called when the store is created.
    async fn init(&self) -> Result<(), StorageError>;

    /// Stores `state` under a fresh handle. The entry outlives `state.expires_at` for a
    /// retention window, during which takes report [`LoadedChallenge::Expired`].
    async fn save(&self, state: &ChallengeState) -> Result<ChallengeHandle, StorageError>;

    /// Loads and consumes the entry in one step.
    async fn take(&self, handle: &ChallengeHandle) -> Result<LoadedChallenge, StorageError>;

    /// Invalidates a live entry without reading it. Returns false if there was nothing to invalidate.
    async fn consume(&self, handle: &ChallengeHandle) -> Result<bool, StorageError>;

    /// Drops entries past their expiry and retention window and returns how many were removed.
    async fn purge_expired(&self) -> Result<usize, StorageError>;
}
