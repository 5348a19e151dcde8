use std::sync::Arc;

use crate::config::ConfigError;

use super::challenge_store::{ChallengeStore, InMemoryChallengeStore, RedisChallengeStore};
use super::credential_store::{CredentialStore, InMemoryCredentialStore, SqliteCredentialStore};
use super::errors::StorageError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChallengeStoreKind {
    Memory,
    Redis { url: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialStoreKind {
    Memory,
    Sqlite { url: String },
}

/// Which collaborator implementations to run with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageConfig {
    pub challenge_store: ChallengeStoreKind,
    pub credential_store: CredentialStoreKind,
}

impl StorageConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let challenge_store = match lookup("CHALLENGE_STORE_TYPE").as_deref() {
            None | Some("memory") => ChallengeStoreKind::Memory,
            Some("redis") => ChallengeStoreKind::Redis {
                url: lookup("CHALLENGE_STORE_URL").ok_or(ConfigError::Missing("CHALLENGE_STORE_URL"))?,
            },
            Some(t) => {
                return Err(ConfigError::Invalid(format!(
                    "Unsupported challenge store type: {t}. Supported types are 'memory' and 'redis'"
                )));
            }
        };

        let credential_store = match lookup("CREDENTIAL_STORE_TYPE").as_deref() {
            None | Some("memory") => CredentialStoreKind::Memory,
            Some("sqlite") => CredentialStoreKind::Sqlite {
                url: lookup("CREDENTIAL_STORE_URL")
                    .ok_or(ConfigError::Missing("CREDENTIAL_STORE_URL"))?,
            },
            Some(t) => {
                return Err(ConfigError::Invalid(format!(
                    "Unsupported credential store type: {t}. Supported types are 'memory' and 'sqlite'"
                )));
            }
        };

        Ok(Self {
            challenge_store,
            credential_store,
        })
    }
}

/// Creates and initializes the configured challenge store.
pub async fn build_challenge_store(
    kind: &ChallengeStoreKind,
) -> Result<Arc<dyn ChallengeStore>, StorageError> {
    let store: Arc<dyn ChallengeStore> = match kind {
        ChallengeStoreKind::Memory => Arc::new(InMemoryChallengeStore::new()),
        ChallengeStoreKind::Redis { url } => Arc::new(RedisChallengeStore::new(url)?),
    };
    store.init().await.inspect_err(|e| {
        tracing::error!("Failed to initialize challenge store: {}", e);
    })?;
    tracing::info!("Connected to challenge store: {}", kind_name(kind));
    Ok(store)
}

/// Creates and initializes the configured credential store.
pub async fn build_credential_store(
    kind: &CredentialStoreKind,
) -> Result<Arc<dyn CredentialStore>, StorageError> {
    let store: Arc<dyn CredentialStore> = match kind {
        CredentialStoreKind::Memory => Arc::new(InMemoryCredentialStore::new()),
        CredentialStoreKind::Sqlite { url } => Arc::new(SqliteCredentialStore::connect(url).await?),
    };
    store.init().await.inspect_err(|e| {
        tracing::error!("Failed to initialize credential store: {}", e);
    })?;
    tracing::info!("Connected to credential store: {:?}", kind);
    Ok(store)
}

// Redis URLs may carry a password
fn kind_name(kind: &ChallengeStoreKind) -> &'static str {
    match kind {
        ChallengeStoreKind::Memory => "memory",
        ChallengeStoreKind::Redis { .. } => "redis",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_to_memory() {
        let config = StorageConfig::from_lookup(lookup_from(&[])).unwrap();
        assert_eq!(config.challenge_store, ChallengeStoreKind::Memory);
        assert_eq!(config.credential_store, CredentialStoreKind::Memory);
    }

    #[test]
    fn test_redis_and_sqlite() {
        let config = StorageConfig::from_lookup(lookup_from(&[
            ("CHALLENGE_STORE_TYPE", "redis"),
            ("CHALLENGE_STORE_URL", "redis://localhost:6379"),
            ("CREDENTIAL_STORE_TYPE", "sqlite"),
            ("CREDENTIAL_STORE_URL", "sqlite:passkeys.db"),
        ]))
        .unwrap();
        assert_eq!(
            config.challenge_store,
            ChallengeStoreKind::Redis {
                url: "redis://localhost:6379".to_string()
            }
        );
        assert_eq!(
            config.credential_store,
            CredentialStoreKind::Sqlite {
                url: "sqlite:passkeys.db".to_string()
            }
        );
    }

    #[test]
    fn test_missing_url_and_unknown_type() {
        assert_eq!(
            StorageConfig::from_lookup(lookup_from(&[("CHALLENGE_STORE_TYPE", "redis")])).unwrap_err(),
            ConfigError::Missing("CHALLENGE_STORE_URL")
        );
        assert!(matches!(
            StorageConfig::from_lookup(lookup_from(&[("CREDENTIAL_STORE_TYPE", "postgres")])),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[tokio::test]
    async fn test_build_stores() {
        let challenges = build_challenge_store(&ChallengeStoreKind::Memory).await.unwrap();
        assert_eq!(challenges.purge_expired().await.unwrap(), 0);

        let credentials = build_credential_store(&CredentialStoreKind::Sqlite {
            url: "sqlite::memory:".to_string(),
        })
        .await
        .unwrap();
        assert!(credentials.get_user("alice").await.unwrap().is_none());
    }
}
