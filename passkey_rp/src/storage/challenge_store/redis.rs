use async_trait::async_trait;
use redis::AsyncCommands;

use crate::passkey::{ChallengeHandle, ChallengeState};
use crate::storage::errors::StorageError;

use super::EXPIRED_RETENTION_SECS;
use super::types::{ChallengeStore, LoadedChallenge};

const CHALLENGE_PREFIX: &str = "passkey:challenge";
const TOMBSTONE: &str = "consumed";
const EXPIRED: &str = "expired";
const RETENTION_MILLIS: u64 = EXPIRED_RETENTION_SECS as u64 * 1000;

// Keys live for the challenge timeout plus the retention window, so a key whose
// remaining TTL is within the window belongs to an expired challenge. Such a key is
// left untouched and reported as expired. A live value is swapped for the tombstone,
// which keeps the TTL.
const TAKE_SCRIPT: &str = r#"
local v = redis.call('GET', KEYS[1])
if not v then
    return false
end
if v == ARGV[1] then
    return v
end
if redis.call('PTTL', KEYS[1]) <= tonumber(ARGV[3]) then
    return ARGV[2]
end
redis.call('SET', KEYS[1], ARGV[1], 'KEEPTTL')
return v
"#;

/// Challenge store shared between server instances through Redis.
pub struct RedisChallengeStore {
    client: redis::Client,
}

impl RedisChallengeStore {
    pub fn new(url: &str) -> Result<Self, StorageError> {
        tracing::info!("Creating Redis challenge store");
        let client = redis::Client::open(url)?;
        Ok(Self { client })
    }

    fn make_key(handle: &ChallengeHandle) -> String {
        format!("{CHALLENGE_PREFIX}:{handle}")
    }

    async fn run_take_script(&self, handle: &ChallengeHandle) -> Result<Option<String>, StorageError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let value = redis::Script::new(TAKE_SCRIPT)
            .key(Self::make_key(handle))
            .arg(TOMBSTONE)
            .arg(EXPIRED)
            .arg(RETENTION_MILLIS)
            .invoke_async(&mut conn)
            .await?;
        Ok(value)
    }
}

#[async_trait]
impl ChallengeStore for RedisChallengeStore {
    async fn init(&self) -> Result<(), StorageError> {
        // Verify the connection works
        let _conn = self.client.get_multiplexed_async_connection().await?;
        Ok(())
    }

    async fn save(&self, state: &ChallengeState) -> Result<ChallengeHandle, StorageError> {
        let handle = ChallengeHandle::generate().map_err(|e| StorageError::Storage(e.to_string()))?;
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let key = Self::make_key(&handle);
        let value = serde_json::to_string(state)?;
        let ttl = state.remaining_millis() + RETENTION_MILLIS;
        let _: () = conn.pset_ex(&key, value, ttl).await?;
        Ok(handle)
    }

    async fn take(&self, handle: &ChallengeHandle) -> Result<LoadedChallenge, StorageError> {
        let loaded = match self.run_take_script(handle).await? {
            None => LoadedChallenge::NotFound,
            Some(v) if v == TOMBSTONE => LoadedChallenge::Consumed,
            Some(v) if v == EXPIRED => LoadedChallenge::Expired,
            Some(v) => {
                let state: ChallengeState = serde_json::from_str(&v)?;
                if state.is_expired() {
                    LoadedChallenge::Expired
                } else {
                    LoadedChallenge::Active(state)
                }
            }
        };
        Ok(loaded)
    }

    async fn consume(&self, handle: &ChallengeHandle) -> Result<bool, StorageError> {
        let previous = self.run_take_script(handle).await?;
        Ok(matches!(previous, Some(v) if v != TOMBSTONE && v != EXPIRED))
    }

    async fn purge_expired(&self) -> Result<usize, StorageError> {
        Ok(0) // Redis expires keys on its own
    }
}
