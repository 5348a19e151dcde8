mod challenge_store;
mod config;
mod credential_store;
mod errors;

pub use challenge_store::{
    ChallengeStore, InMemoryChallengeStore, LoadedChallenge, RedisChallengeStore,
};
pub use config::{
    ChallengeStoreKind, CredentialStoreKind, StorageConfig, build_challenge_store,
    build_credential_store,
};
pub use credential_store::{CredentialStore, InMemoryCredentialStore, SqliteCredentialStore};
pub use errors::StorageError;
