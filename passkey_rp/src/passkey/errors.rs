use thiserror::Error;

use crate::utils::UtilError;

/// Failures raised while checking a client response against a stored challenge.
///
/// These carry enough detail for server logs. The HTTP layer collapses them into a
/// single generic message before anything reaches the client.
#[derive(Debug, Error, Clone)]
pub enum PasskeyError {
    #[error("Challenge mismatch")]
    ChallengeMismatch,

    #[error("Client data type mismatch: expected {expected}, got {got}")]
    ClientDataTypeMismatch { expected: String, got: String },

    #[error("Origin not allowed: {0}")]
    OriginMismatch(String),

    #[error("RP ID hash mismatch")]
    RpIdHashMismatch,

    #[error("User presence flag not set")]
    UserPresenceMissing,

    #[error("User verification required but UV flag not set")]
    UserVerificationRequired,

    #[error("Unsupported algorithm: {0}")]
    UnsupportedAlgorithm(i64),

    #[error("Signature verification failed")]
    SignatureInvalid,

    #[error("Signature counter did not increase: stored {stored}, observed {observed}")]
    CounterReplay { stored: u32, observed: u32 },

    #[error("User handle does not match credential owner")]
    UserHandleMismatch,

    #[error("Attestation rejected: {0}")]
    AttestationRejected(String),

    #[error("Malformed response: {0}")]
    Malformed(String),

    #[error("Utils error: {0}")]
    Utils(#[from] UtilError),
}
