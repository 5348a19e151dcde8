use axum::Json;
use http::StatusCode;
use passkey_rp::CeremonyError;

/// Error half of every handler result: a status and a JSON string body.
pub type ResponseError = (StatusCode, Json<String>);

const VERIFICATION_FAILED: &str = "verification failed";

/// Helper trait for converting errors to a standard response error format
pub trait IntoResponseError<T> {
    fn into_response_error(self) -> Result<T, ResponseError>;
}

/// Maps ceremony errors to status codes.
///
/// Every reason a response fails verification collapses to the same message; the detail
/// was already logged by the ceremony layer.
impl<T> IntoResponseError<T> for Result<T, CeremonyError> {
    fn into_response_error(self) -> Result<T, ResponseError> {
        self.map_err(|e| {
            let (status, message) = match &e {
                CeremonyError::Verification(_)
                | CeremonyError::ChallengeExpired
                | CeremonyError::ChallengeConsumed
                | CeremonyError::ChallengeKindMismatch
                | CeremonyError::DuplicateCredentialId(_)
                | CeremonyError::CredentialNotFound(_) => {
                    (StatusCode::BAD_REQUEST, VERIFICATION_FAILED.to_string())
                }
                CeremonyError::SessionNotFound => {
                    (StatusCode::BAD_REQUEST, "session not found".to_string())
                }
                CeremonyError::InvalidUsername(message) => (StatusCode::BAD_REQUEST, message.clone()),
                CeremonyError::UserNotFound(_) => {
                    (StatusCode::BAD_REQUEST, "user not found".to_string())
                }
                CeremonyError::NoCredentials(_) => (
                    StatusCode::BAD_REQUEST,
                    "no credentials registered".to_string(),
                ),
                CeremonyError::CounterUpdateFailed { .. } => (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "login verified but could not be recorded".to_string(),
                ),
                CeremonyError::Store(_) | CeremonyError::Utils(_) => (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal server error".to_string(),
                ),
            };
            (status, Json(message))
        })
    }
}

pub(crate) fn malformed_body(rejection: impl std::fmt::Display) -> ResponseError {
    tracing::warn!("Rejected request body: {}", rejection);
    (StatusCode::BAD_REQUEST, Json(VERIFICATION_FAILED.to_string()))
}
