//! Error types for the ceremony engine

use thiserror::Error;

use crate::passkey::PasskeyError;
use crate::storage::StorageError;
use crate::utils::UtilError;

/// Errors that can end a registration or login ceremony
#[derive(Error, Debug, Clone)]
pub enum CeremonyError {
    #[error("User not found: {0}")]
    UserNotFound(String),

    #[error("Invalid username: {0}")]
    InvalidUsername(String),

    /// Session cookie missing, tampered or naming no stored challenge
    #[error("Session not found")]
    SessionNotFound,

    #[error("Challenge expired")]
    ChallengeExpired,

    #[error("Challenge already consumed")]
    ChallengeConsumed,

    /// The stored challenge belongs to another ceremony kind or another user
    #[error("Challenge does not belong to this ceremony")]
    ChallengeKindMismatch,

    #[error("Credential already registered: {0}")]
    DuplicateCredentialId(String),

    #[error("Credential not found: {0}")]
    CredentialNotFound(String),

    #[error("User has no credentials: {0}")]
    NoCredentials(String),

    /// Response failed cryptographic or protocol verification
    #[error("Verification failed: {0}")]
    Verification(#[from] PasskeyError),

    #[error("Store error: {0}")]
    Store(#[from] StorageError),

    /// Verification succeeded but persisting the new counter failed
    #[error("Counter update failed for credential {credential_id}: {reason}")]
    CounterUpdateFailed {
        credential_id: String,
        reason: String,
    },

    #[error("Utils error: {0}")]
    Utils(#[from] UtilError),
}

impl CeremonyError {
    /// Log the error and return self
    ///
    /// Verification details stay in server logs; callers facing clients should only
    /// expose the collapsed message from the HTTP layer.
    pub fn log(self) -> Self {
        match &self {
            Self::UserNotFound(name) => tracing::warn!("User not found: {}", name),
            Self::InvalidUsername(name) => tracing::warn!("Invalid username: {}", name),
            Self::SessionNotFound => tracing::warn!("Session not found"),
            Self::ChallengeExpired => tracing::warn!("Challenge expired"),
            Self::ChallengeConsumed => tracing::warn!("Challenge already consumed (possible replay)"),
            Self::ChallengeKindMismatch => tracing::warn!("Challenge kind or user mismatch"),
            Self::DuplicateCredentialId(id) => tracing::warn!("Duplicate credential id: {}", id),
            Self::CredentialNotFound(id) => tracing::warn!("Credential not found: {}", id),
            Self::NoCredentials(name) => tracing::warn!("User has no credentials: {}", name),
            Self::Verification(err) => tracing::warn!("Verification failed: {}", err),
            Self::Store(err) => tracing::error!("Store error: {}", err),
            Self::CounterUpdateFailed {
                credential_id,
                reason,
            } => tracing::error!(
                "Counter update failed for credential {}: {}",
                credential_id,
                reason
            ),
            Self::Utils(err) => tracing::error!("Utils error: {}", err),
        }
        self
    }

    /// True for failures caused by the request rather than by the server.
    pub fn is_client_error(&self) -> bool {
        !matches!(
            self,
            Self::Store(_) | Self::CounterUpdateFailed { .. } | Self::Utils(_)
        )
    }
}
