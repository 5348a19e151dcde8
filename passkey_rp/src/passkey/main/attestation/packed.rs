use ciborium::value::Value as CborValue;

use crate::passkey::errors::PasskeyError;
use crate::passkey::main::cose::CredentialPublicKey;

/// Verifies a packed attestation statement as far as it can be checked without a trust store.
///
/// Returns `true` for a verified self-attestation and `false` when the statement carries an
/// `x5c` chain that the caller must hand to its attestation policy.
pub(super) fn verify_packed_attestation(
    auth_data: &[u8],
    client_data_hash: &[u8],
    att_stmt: &[(CborValue, CborValue)],
    credential_key: &CredentialPublicKey,
) -> Result<bool, PasskeyError> {
    let (alg, sig) = get_sig_from_stmt(att_stmt)?;

    let mut has_x5c = false;
    let mut has_ecdaa = false;
    for (k, v) in att_stmt {
        match (k, v) {
            (CborValue::Text(key), CborValue::Array(certs)) if key == "x5c" => {
                has_x5c = !certs.is_empty();
            }
            (CborValue::Text(key), CborValue::Bytes(_)) if key == "ecdaaKeyId" => {
                has_ecdaa = true;
            }
            _ => {}
        }
    }

    match (has_x5c, has_ecdaa) {
        (true, false) => {
            tracing::debug!("Packed attestation with certificate chain");
            Ok(false)
        }
        (false, true) => Err(PasskeyError::AttestationRejected(
            "ECDAA attestation not supported".to_string(),
        )),
        (true, true) => Err(PasskeyError::AttestationRejected(
            "both x5c and ecdaaKeyId present".to_string(),
        )),
        (false, false) => {
            tracing::debug!("Packed self attestation");
            verify_self_attestation(auth_data, client_data_hash, alg, &sig, credential_key)?;
            Ok(true)
        }
    }
}

fn verify_self_attestation(
    auth_data: &[u8],
    client_data_hash: &[u8],
    alg: i64,
    sig: &[u8],
    credential_key: &CredentialPublicKey,
) -> Result<(), PasskeyError> {
    if alg != credential_key.algorithm().id() {
        return Err(PasskeyError::AttestationRejected(format!(
            "self attestation alg {alg} does not match credential key"
        )));
    }

    let mut signed_data = Vec::with_capacity(auth_data.len() + client_data_hash.len());
    signed_data.extend_from_slice(auth_data);
    signed_data.extend_from_slice(client_data_hash);

    credential_key.verify(&signed_data, sig).map_err(|_| {
        PasskeyError::AttestationRejected("self attestation signature invalid".to_string())
    })
}

fn get_sig_from_stmt(att_stmt: &[(CborValue, CborValue)]) -> Result<(i64, Vec<u8>), PasskeyError> {
    let mut alg = None;
    let mut sig = None;

    for (key, value) in att_stmt {
        match (key, value) {
            (CborValue::Text(k), CborValue::Integer(a)) if k == "alg" => {
                alg = i64::try_from(*a).ok();
            }
            (CborValue::Text(k), CborValue::Bytes(s)) if k == "sig" => {
                sig = Some(s.clone());
            }
            _ => {}
        }
    }

    match (alg, sig) {
        (Some(a), Some(s)) => Ok((a, s)),
        _ => Err(PasskeyError::AttestationRejected(
            "missing alg or sig in packed statement".to_string(),
        )),
    }
}
