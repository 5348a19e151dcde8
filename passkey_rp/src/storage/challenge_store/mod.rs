mod memory;
mod redis;
mod types;

/// How long an entry outlives its expiry, so late finishes still report why they failed.
const EXPIRED_RETENTION_SECS: i64 = 300;

pub use memory::InMemoryChallengeStore;
pub use self::redis::RedisChallengeStore;
pub use types::{ChallengeStore, LoadedChallenge};
