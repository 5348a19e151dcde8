use crate::config::RpConfig;
use crate::passkey::errors::PasskeyError;
use crate::passkey::types::{CeremonyKind, ChallengeState, CredentialId};
use crate::utils::base64url_decode;

use super::attestation::{AttestationObject, AttestationPolicy, verify_attestation};
use super::auth_data::AuthenticatorData;
use super::client_data::ParsedClientData;
use super::cose::CredentialPublicKey;
use super::types::RegistrationResponse;

/// Outcome of a successful registration check.
#[derive(Debug, Clone)]
pub(crate) struct VerifiedRegistration {
    pub(crate) credential_id: CredentialId,
    pub(crate) public_key: CredentialPublicKey,
    pub(crate) sign_count: u32,
    pub(crate) aaguid: String,
    pub(crate) attestation_format: String,
    pub(crate) transports: Vec<String>,
}

/// Verifies an attestation response against the registration challenge it answers.
///
/// 1. clientDataJSON: type, challenge, origin
/// 2. authenticator data: RP ID hash, UP, UV when required, attested credential data
/// 3. credential public key and its algorithm
/// 4. attestation statement
///
/// Credential-ID uniqueness needs the store and is left to the caller.
pub(crate) fn verify_registration(
    config: &RpConfig,
    state: &ChallengeState,
    response: &RegistrationResponse,
    policy: &dyn AttestationPolicy,
) -> Result<VerifiedRegistration, PasskeyError> {
    let client_data = ParsedClientData::from_base64(&response.response.client_data_json)?;
    tracing::debug!("Parsed client data: {:?}", client_data);
    client_data.verify(CeremonyKind::Registration, &state.challenge, &config.origins)?;

    let attestation_bytes = base64url_decode(&response.response.attestation_object)
        .map_err(|e| PasskeyError::Malformed(format!("Failed to decode attestation object: {e}")))?;
    let attestation = AttestationObject::from_bytes(&attestation_bytes)?;

    let auth_data = AuthenticatorData::from_bytes(attestation.auth_data.clone())?;
    auth_data.verify(&config.rp_id, state.user_verification.is_required())?;

    let attested = auth_data.attested.as_ref().ok_or_else(|| {
        tracing::error!("No attested credential data present");
        PasskeyError::Malformed("No attested credential data present".to_string())
    })?;

    let credential_id = response.credential_id()?;
    if credential_id.as_bytes() != attested.credential_id.as_slice() {
        return Err(PasskeyError::Malformed(
            "Response id does not match attested credential id".to_string(),
        ));
    }

    let public_key = CredentialPublicKey::from_cose_bytes(&attested.public_key_cose)?;
    let algorithm = public_key.algorithm();
    if !config.algorithms.contains(&algorithm) {
        return Err(PasskeyError::UnsupportedAlgorithm(algorithm.id()));
    }

    let aaguid = attested.aaguid_string();
    verify_attestation(
        &attestation,
        &client_data.hash(),
        &public_key,
        &aaguid,
        policy,
    )?;

    tracing::debug!(
        "Registration verified: credential {}, {:?}, aaguid {}, fmt {}",
        credential_id,
        algorithm,
        aaguid,
        attestation.fmt
    );

    Ok(VerifiedRegistration {
        credential_id,
        public_key,
        sign_count: auth_data.counter,
        aaguid,
        attestation_format: attestation.fmt,
        transports: response.response.transports.clone(),
    })
}
