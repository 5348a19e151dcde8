use ciborium::value::Value as CborValue;

use crate::passkey::errors::PasskeyError;
use crate::passkey::main::cose::CredentialPublicKey;

use super::none::verify_none_attestation;
use super::packed::verify_packed_attestation;
use super::policy::{AttestationPolicy, AttestationStatement};

/// Decoded `attestationObject`.
#[derive(Debug, Clone)]
pub(crate) struct AttestationObject {
    pub(crate) fmt: String,
    pub(crate) auth_data: Vec<u8>,
    pub(crate) att_stmt: Vec<(CborValue, CborValue)>,
}

impl AttestationObject {
    pub(crate) fn from_bytes(bytes: &[u8]) -> Result<Self, PasskeyError> {
        let value: CborValue = ciborium::de::from_reader(bytes).map_err(|e| {
            tracing::error!("Invalid attestation object CBOR: {}", e);
            PasskeyError::Malformed(format!("Invalid attestation object CBOR: {e}"))
        })?;

        let CborValue::Map(map) = value else {
            return Err(PasskeyError::Malformed(
                "Attestation object is not a map".to_string(),
            ));
        };

        let mut fmt = None;
        let mut auth_data = None;
        let mut att_stmt = None;

        for (key, value) in map {
            let CborValue::Text(key) = key else { continue };
            match (key.as_str(), value) {
                ("fmt", CborValue::Text(f)) => fmt = Some(f),
                ("authData", CborValue::Bytes(d)) => auth_data = Some(d),
                ("attStmt", CborValue::Map(s)) => att_stmt = Some(s),
                _ => {}
            }
        }

        match (fmt, auth_data, att_stmt) {
            (Some(fmt), Some(auth_data), Some(att_stmt)) => Ok(Self {
                fmt,
                auth_data,
                att_stmt,
            }),
            _ => Err(PasskeyError::Malformed(
                "Missing required attestation data".to_string(),
            )),
        }
    }
}

/// Checks the attestation statement for a freshly attested credential.
///
/// `none` and packed self-attestation are verified here. Every other statement,
/// including packed with a certificate chain, is decided by `policy`.
pub(crate) fn verify_attestation(
    attestation: &AttestationObject,
    client_data_hash: &[u8],
    credential_key: &CredentialPublicKey,
    aaguid: &str,
    policy: &dyn AttestationPolicy,
) -> Result<(), PasskeyError> {
    let statement = AttestationStatement {
        fmt: &attestation.fmt,
        aaguid,
        statement: &attestation.att_stmt,
        auth_data: &attestation.auth_data,
        client_data_hash,
    };

    match attestation.fmt.as_str() {
        "none" => {
            tracing::debug!("Using 'none' attestation format");
            verify_none_attestation(&attestation.att_stmt)
        }
        "packed" => {
            tracing::debug!("Using 'packed' attestation format");
            let self_attested = verify_packed_attestation(
                &attestation.auth_data,
                client_data_hash,
                &attestation.att_stmt,
                credential_key,
            )?;
            if self_attested {
                Ok(())
            } else {
                policy.evaluate(&statement)
            }
        }
        other => {
            tracing::debug!("Deferring '{}' attestation to policy", other);
            policy.evaluate(&statement)
        }
    }
}
