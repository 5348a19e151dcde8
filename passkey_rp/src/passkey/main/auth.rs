use crate::config::RpConfig;
use crate::passkey::errors::PasskeyError;
use crate::passkey::types::{CeremonyKind, ChallengeState, Credential};
use crate::utils::{base64url_decode, constant_time_eq};

use super::auth_data::AuthenticatorData;
use super::client_data::ParsedClientData;
use super::types::LoginResponse;

/// Outcome of a successful login check.
#[derive(Debug, Clone)]
pub(crate) struct VerifiedLogin {
    /// Counter value to persist for the credential
    pub(crate) new_sign_count: u32,
    pub(crate) user_verified: bool,
}

/// Verifies an assertion made with `credential` against the login challenge it answers.
pub(crate) fn verify_login(
    config: &RpConfig,
    state: &ChallengeState,
    credential: &Credential,
    response: &LoginResponse,
) -> Result<VerifiedLogin, PasskeyError> {
    let client_data = ParsedClientData::from_base64(&response.response.client_data_json)?;
    tracing::debug!("Parsed client data: {:?}", client_data);
    client_data.verify(CeremonyKind::Login, &state.challenge, &config.origins)?;

    let auth_data_bytes = base64url_decode(&response.response.authenticator_data)
        .map_err(|e| PasskeyError::Malformed(format!("Failed to decode authenticator data: {e}")))?;
    let auth_data = AuthenticatorData::from_bytes(auth_data_bytes)?;
    auth_data.verify(&config.rp_id, state.user_verification.is_required())?;

    verify_signature(response, &client_data, &auth_data, credential)?;

    let new_sign_count = check_counter(credential.sign_count, auth_data.counter)?;

    verify_user_handle(response, &state.user_id)?;

    Ok(VerifiedLogin {
        new_sign_count,
        user_verified: auth_data.is_user_verified(),
    })
}

fn verify_signature(
    response: &LoginResponse,
    client_data: &ParsedClientData,
    auth_data: &AuthenticatorData,
    credential: &Credential,
) -> Result<(), PasskeyError> {
    let signature = base64url_decode(&response.response.signature)
        .map_err(|e| PasskeyError::Malformed(format!("Failed to decode signature: {e}")))?;

    let mut signed_data = Vec::with_capacity(auth_data.raw.len() + 32);
    signed_data.extend_from_slice(&auth_data.raw);
    signed_data.extend_from_slice(&client_data.hash());

    credential.public_key.verify(&signed_data, &signature).inspect_err(|_| {
        tracing::debug!(
            "Signature verification failed for credential {}",
            credential.credential_id
        );
    })
}

fn verify_user_handle(response: &LoginResponse, user_id: &[u8]) -> Result<(), PasskeyError> {
    match response.response.user_handle.as_deref() {
        None | Some("") => Ok(()),
        Some(handle) => {
            let handle = base64url_decode(handle).map_err(|_| PasskeyError::UserHandleMismatch)?;
            if constant_time_eq(&handle, user_id) {
                Ok(())
            } else {
                tracing::debug!("User handle in assertion does not match the user");
                Err(PasskeyError::UserHandleMismatch)
            }
        }
    }
}

/// Applies the signature-counter rule and returns the value to store.
///
/// Once a credential has reported a nonzero counter every later counter must be
/// strictly greater. Authenticators that never count report 0 forever, which is accepted.
pub fn check_counter(stored: u32, observed: u32) -> Result<u32, PasskeyError> {
    if stored > 0 && observed <= stored {
        tracing::warn!(
            "Counter did not increase (stored {}, observed {}). Possible cloned authenticator",
            stored,
            observed
        );
        return Err(PasskeyError::CounterReplay { stored, observed });
    }
    Ok(observed)
}
