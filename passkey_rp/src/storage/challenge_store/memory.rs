use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use tokio::sync::Mutex;

use crate::passkey::{ChallengeHandle, ChallengeState};
use crate::storage::errors::StorageError;

use super::EXPIRED_RETENTION_SECS;
use super::types::{ChallengeStore, LoadedChallenge};

enum Slot {
    Pending(ChallengeState),
    // Kept past expiry so a replayed handle is reported as consumed
    Consumed { expires_at: DateTime<Utc> },
}

impl Slot {
    fn expires_at(&self) -> DateTime<Utc> {
        match self {
            Slot::Pending(state) => state.expires_at,
            Slot::Consumed { expires_at } => *expires_at,
        }
    }

    fn is_retained_at(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at() + Duration::seconds(EXPIRED_RETENTION_SECS)
    }
}

/// Process-local challenge store.
pub struct InMemoryChallengeStore {
    entries: Mutex<HashMap<String, Slot>>,
}

impl InMemoryChallengeStore {
    pub fn new() -> Self {
        tracing::info!("Creating new in-memory challenge store");
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryChallengeStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChallengeStore for InMemoryChallengeStore {
    async fn init(&self) -> Result<(), StorageError> {
        Ok(()) // Nothing to initialize for in-memory store
    }

    async fn save(&self, state: &ChallengeState) -> Result<ChallengeHandle, StorageError> {
        let handle = ChallengeHandle::generate().map_err(|e| StorageError::Storage(e.to_string()))?;
        let mut entries = self.entries.lock().await;
        entries.insert(handle.as_str().to_string(), Slot::Pending(state.clone()));
        Ok(handle)
    }

    async fn take(&self, handle: &ChallengeHandle) -> Result<LoadedChallenge, StorageError> {
        let now = Utc::now();
        let key = handle.as_str();
        let mut entries = self.entries.lock().await;

        if entries.get(key).is_some_and(|slot| !slot.is_retained_at(now)) {
            entries.remove(key);
        }

        let loaded = match entries.get_mut(key) {
            None => LoadedChallenge::NotFound,
            Some(Slot::Consumed { .. }) => LoadedChallenge::Consumed,
            // Left in place so every later take reports the expiry too
            Some(Slot::Pending(state)) if state.is_expired_at(now) => LoadedChallenge::Expired,
            Some(slot) => {
                let expires_at = slot.expires_at();
                match std::mem::replace(slot, Slot::Consumed { expires_at }) {
                    Slot::Pending(state) => LoadedChallenge::Active(state),
                    Slot::Consumed { .. } => LoadedChallenge::Consumed,
                }
            }
        };
        Ok(loaded)
    }

    async fn consume(&self, handle: &ChallengeHandle) -> Result<bool, StorageError> {
        let now = Utc::now();
        let mut entries = self.entries.lock().await;
        match entries.get_mut(handle.as_str()) {
            Some(slot) if matches!(&*slot, Slot::Pending(state) if !state.is_expired_at(now)) => {
                let expires_at = slot.expires_at();
                *slot = Slot::Consumed { expires_at };
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn purge_expired(&self) -> Result<usize, StorageError> {
        let now = Utc::now();
        let mut entries = self.entries.lock().await;
        let before = entries.len();
        entries.retain(|_, slot| slot.is_retained_at(now));
        let removed = before - entries.len();
        if removed > 0 {
            tracing::debug!("Purged {} expired challenges", removed);
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::UserVerificationRequirement;
    use crate::passkey::CeremonyKind;
    use std::sync::Arc;

    fn state(ttl_secs: u32) -> ChallengeState {
        ChallengeState::new(
            CeremonyKind::Registration,
            vec![1; 32],
            vec![2; 32],
            vec![],
            UserVerificationRequirement::Preferred,
            ttl_secs,
        )
    }

    fn expired_state() -> ChallengeState {
        let mut s = state(60);
        s.expires_at = Utc::now() - Duration::seconds(1);
        s
    }

    fn forgotten_state() -> ChallengeState {
        let mut s = state(60);
        s.expires_at = Utc::now() - Duration::seconds(EXPIRED_RETENTION_SECS + 1);
        s
    }

    #[tokio::test]
    async fn test_take_returns_state_once() {
        let store = InMemoryChallengeStore::new();
        let handle = store.save(&state(60)).await.unwrap();

        let first = store.take(&handle).await.unwrap();
        assert!(matches!(first, LoadedChallenge::Active(s) if s.challenge == vec![2; 32]));

        let second = store.take(&handle).await.unwrap();
        assert!(matches!(second, LoadedChallenge::Consumed));
    }

    #[tokio::test]
    async fn test_unknown_handle_is_not_found() {
        let store = InMemoryChallengeStore::new();
        let handle = ChallengeHandle::from("nope".to_string());
        assert!(matches!(
            store.take(&handle).await.unwrap(),
            LoadedChallenge::NotFound
        ));
    }

    #[tokio::test]
    async fn test_expired_entry_is_reported_on_every_take() {
        let store = InMemoryChallengeStore::new();
        let handle = store.save(&expired_state()).await.unwrap();

        for _ in 0..2 {
            assert!(matches!(
                store.take(&handle).await.unwrap(),
                LoadedChallenge::Expired
            ));
        }
        assert!(!store.consume(&handle).await.unwrap());
        assert!(matches!(
            store.take(&handle).await.unwrap(),
            LoadedChallenge::Expired
        ));
    }

    #[tokio::test]
    async fn test_entry_past_retention_is_not_found() {
        let store = InMemoryChallengeStore::new();
        let handle = store.save(&forgotten_state()).await.unwrap();
        assert!(matches!(
            store.take(&handle).await.unwrap(),
            LoadedChallenge::NotFound
        ));
    }

    #[tokio::test]
    async fn test_consumed_entry_stays_consumed_after_expiry() {
        let store = InMemoryChallengeStore::new();
        let mut s = state(60);
        s.expires_at = Utc::now() + Duration::milliseconds(50);
        let handle = store.save(&s).await.unwrap();

        assert!(matches!(
            store.take(&handle).await.unwrap(),
            LoadedChallenge::Active(_)
        ));
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        assert!(matches!(
            store.take(&handle).await.unwrap(),
            LoadedChallenge::Consumed
        ));
    }

    #[tokio::test]
    async fn test_handles_are_unique() {
        let store = InMemoryChallengeStore::new();
        let a = store.save(&state(60)).await.unwrap();
        let b = store.save(&state(60)).await.unwrap();
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn test_consume_invalidates_pending_entry() {
        let store = InMemoryChallengeStore::new();
        let handle = store.save(&state(60)).await.unwrap();

        assert!(store.consume(&handle).await.unwrap());
        assert!(!store.consume(&handle).await.unwrap());
        assert!(matches!(
            store.take(&handle).await.unwrap(),
            LoadedChallenge::Consumed
        ));
    }

    #[tokio::test]
    async fn test_purge_keeps_recently_expired_entries() {
        let store = InMemoryChallengeStore::new();
        let live = store.save(&state(60)).await.unwrap();
        let expired = store.save(&expired_state()).await.unwrap();
        store.save(&forgotten_state()).await.unwrap();

        assert_eq!(store.purge_expired().await.unwrap(), 1);
        assert!(matches!(
            store.take(&live).await.unwrap(),
            LoadedChallenge::Active(_)
        ));
        assert!(matches!(
            store.take(&expired).await.unwrap(),
            LoadedChallenge::Expired
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_take_yields_single_winner() {
        let store = Arc::new(InMemoryChallengeStore::new());
        let handle = store.save(&state(60)).await.unwrap();

        let mut tasks = Vec::new();
        for _ in 0..16 {
            let store = store.clone();
            let handle = handle.clone();
            tasks.push(tokio::spawn(async move { store.take(&handle).await.unwrap() }));
        }

        let mut active = 0;
        for task in tasks {
            match task.await.unwrap() {
                LoadedChallenge::Active(_) => active += 1,
                LoadedChallenge::Consumed => {}
                other => panic!("unexpected result: {other:?}"),
            }
        }
        assert_eq!(active, 1);
    }
}
