use ciborium::value::{Integer, Value as CborValue};
use ring::signature::{self, RsaPublicKeyComponents, UnparsedPublicKey};

use crate::passkey::errors::PasskeyError;

// COSE_Key labels
const LABEL_KTY: i64 = 1;
const LABEL_ALG: i64 = 3;
const LABEL_CRV_OR_N: i64 = -1;
const LABEL_X_OR_E: i64 = -2;
const LABEL_Y: i64 = -3;

const KTY_OKP: i64 = 1;
const KTY_EC2: i64 = 2;
const KTY_RSA: i64 = 3;

const CRV_P256: i64 = 1;
const CRV_P384: i64 = 2;
const CRV_ED25519: i64 = 6;

/// Public-key algorithms accepted for credentials, by COSE identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CoseAlgorithm {
    Es256,
    EdDsa,
    Es384,
    Rs256,
}

impl CoseAlgorithm {
    pub fn id(&self) -> i64 {
        match self {
            Self::Es256 => -7,
            Self::EdDsa => -8,
            Self::Es384 => -35,
            Self::Rs256 => -257,
        }
    }

    pub fn from_id(id: i64) -> Option<Self> {
        match id {
            -7 => Some(Self::Es256),
            -8 => Some(Self::EdDsa),
            -35 => Some(Self::Es384),
            -257 => Some(Self::Rs256),
            _ => None,
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "es256" => Some(Self::Es256),
            "eddsa" | "ed25519" => Some(Self::EdDsa),
            "es384" => Some(Self::Es384),
            "rs256" => Some(Self::Rs256),
            _ => None,
        }
    }
}

/// Credential public key decoded from a COSE_Key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialPublicKey {
    Es256 { x: Vec<u8>, y: Vec<u8> },
    Es384 { x: Vec<u8>, y: Vec<u8> },
    EdDsa { x: Vec<u8> },
    Rs256 { n: Vec<u8>, e: Vec<u8> },
}

impl CredentialPublicKey {
    pub fn algorithm(&self) -> CoseAlgorithm {
        match self {
            Self::Es256 { .. } => CoseAlgorithm::Es256,
            Self::Es384 { .. } => CoseAlgorithm::Es384,
            Self::EdDsa { .. } => CoseAlgorithm::EdDsa,
            Self::Rs256 { .. } => CoseAlgorithm::Rs256,
        }
    }

    pub fn from_cose_bytes(bytes: &[u8]) -> Result<Self, PasskeyError> {
        let value: CborValue = ciborium::de::from_reader(bytes).map_err(|e| {
            tracing::error!("Invalid public key CBOR: {}", e);
            PasskeyError::Malformed(format!("Invalid public key CBOR: {e}"))
        })?;
        Self::from_cose(&value)
    }

    pub fn from_cose(value: &CborValue) -> Result<Self, PasskeyError> {
        let CborValue::Map(map) = value else {
            return Err(PasskeyError::Malformed("COSE key is not a map".to_string()));
        };

        let alg_id = label_int(map, LABEL_ALG)
            .ok_or_else(|| PasskeyError::Malformed("COSE key without alg".to_string()))?;
        let alg = CoseAlgorithm::from_id(alg_id).ok_or(PasskeyError::UnsupportedAlgorithm(alg_id))?;

        let kty = label_int(map, LABEL_KTY)
            .ok_or_else(|| PasskeyError::Malformed("COSE key without kty".to_string()))?;

        match alg {
            CoseAlgorithm::Es256 | CoseAlgorithm::Es384 => {
                let (crv, size) = if alg == CoseAlgorithm::Es256 {
                    (CRV_P256, 32)
                } else {
                    (CRV_P384, 48)
                };
                if kty != KTY_EC2 || label_int(map, LABEL_CRV_OR_N) != Some(crv) {
                    return Err(PasskeyError::Malformed(format!(
                        "Key type does not match {alg:?}"
                    )));
                }
                let x = label_bytes(map, LABEL_X_OR_E, size, "x")?;
                let y = label_bytes(map, LABEL_Y, size, "y")?;
                Ok(if alg == CoseAlgorithm::Es256 {
                    Self::Es256 { x, y }
                } else {
                    Self::Es384 { x, y }
                })
            }
            CoseAlgorithm::EdDsa => {
                if kty != KTY_OKP || label_int(map, LABEL_CRV_OR_N) != Some(CRV_ED25519) {
                    return Err(PasskeyError::Malformed(
                        "Key type does not match EdDSA".to_string(),
                    ));
                }
                let x = label_bytes(map, LABEL_X_OR_E, 32, "x")?;
                Ok(Self::EdDsa { x })
            }
            CoseAlgorithm::Rs256 => {
                if kty != KTY_RSA {
                    return Err(PasskeyError::Malformed(
                        "Key type does not match RS256".to_string(),
                    ));
                }
                let n = label_raw_bytes(map, LABEL_CRV_OR_N, "n")?;
                let e = label_raw_bytes(map, LABEL_X_OR_E, "e")?;
                Ok(Self::Rs256 { n, e })
            }
        }
    }

    /// Encodes the key back into a COSE_Key for persistence.
    pub fn to_cose_bytes(&self) -> Result<Vec<u8>, PasskeyError> {
        let alg = cbor_int(self.algorithm().id());
        let entries = match self {
            Self::Es256 { x, y } | Self::Es384 { x, y } => {
                let crv = if matches!(self, Self::Es256 { .. }) {
                    CRV_P256
                } else {
                    CRV_P384
                };
                vec![
                    (cbor_int(LABEL_KTY), cbor_int(KTY_EC2)),
                    (cbor_int(LABEL_ALG), alg),
                    (cbor_int(LABEL_CRV_OR_N), cbor_int(crv)),
                    (cbor_int(LABEL_X_OR_E), CborValue::Bytes(x.clone())),
                    (cbor_int(LABEL_Y), CborValue::Bytes(y.clone())),
                ]
            }
            Self::EdDsa { x } => vec![
                (cbor_int(LABEL_KTY), cbor_int(KTY_OKP)),
                (cbor_int(LABEL_ALG), alg),
                (cbor_int(LABEL_CRV_OR_N), cbor_int(CRV_ED25519)),
                (cbor_int(LABEL_X_OR_E), CborValue::Bytes(x.clone())),
            ],
            Self::Rs256 { n, e } => vec![
                (cbor_int(LABEL_KTY), cbor_int(KTY_RSA)),
                (cbor_int(LABEL_ALG), alg),
                (cbor_int(LABEL_CRV_OR_N), CborValue::Bytes(n.clone())),
                (cbor_int(LABEL_X_OR_E), CborValue::Bytes(e.clone())),
            ],
        };

        let mut out = Vec::new();
        ciborium::ser::into_writer(&CborValue::Map(entries), &mut out)
            .map_err(|e| PasskeyError::Malformed(format!("Failed to encode COSE key: {e}")))?;
        Ok(out)
    }

    /// Checks `sig` over `message` with this key.
    ///
    /// ECDSA signatures are expected in ASN.1 DER form, as authenticators produce them.
    pub fn verify(&self, message: &[u8], sig: &[u8]) -> Result<(), PasskeyError> {
        let result = match self {
            Self::Es256 { x, y } => UnparsedPublicKey::new(
                &signature::ECDSA_P256_SHA256_ASN1,
                uncompressed_point(x, y),
            )
            .verify(message, sig),
            Self::Es384 { x, y } => UnparsedPublicKey::new(
                &signature::ECDSA_P384_SHA384_ASN1,
                uncompressed_point(x, y),
            )
            .verify(message, sig),
            Self::EdDsa { x } => {
                UnparsedPublicKey::new(&signature::ED25519, x).verify(message, sig)
            }
            Self::Rs256 { n, e } => RsaPublicKeyComponents { n, e }.verify(
                &signature::RSA_PKCS1_2048_8192_SHA256,
                message,
                sig,
            ),
        };

        result.map_err(|_| {
            tracing::debug!("Signature rejected by {:?} key", self.algorithm());
            PasskeyError::SignatureInvalid
        })
    }
}

/// Splits a buffer that starts with a CBOR-encoded COSE_Key into the key and what follows.
pub(super) fn split_cose_key(bytes: &[u8]) -> Result<(&[u8], &[u8]), PasskeyError> {
    let mut reader = bytes;
    let _: CborValue = ciborium::de::from_reader(&mut reader).map_err(|e| {
        tracing::error!("Invalid credential public key CBOR: {}", e);
        PasskeyError::Malformed(format!("Invalid credential public key CBOR: {e}"))
    })?;
    let used = bytes.len() - reader.len();
    Ok(bytes.split_at(used))
}

fn uncompressed_point(x: &[u8], y: &[u8]) -> Vec<u8> {
    let mut point = Vec::with_capacity(1 + x.len() + y.len());
    point.push(0x04);
    point.extend_from_slice(x);
    point.extend_from_slice(y);
    point
}

fn cbor_int(v: i64) -> CborValue {
    CborValue::Integer(Integer::from(v))
}

fn label_value(map: &[(CborValue, CborValue)], label: i64) -> Option<&CborValue> {
    map.iter().find_map(|(k, v)| match k {
        CborValue::Integer(i) if i128::from(*i) == i128::from(label) => Some(v),
        _ => None,
    })
}

// Integers outside the i64 range never match a known label or identifier
fn label_int(map: &[(CborValue, CborValue)], label: i64) -> Option<i64> {
    match label_value(map, label) {
        Some(CborValue::Integer(i)) => i64::try_from(*i).ok(),
        _ => None,
    }
}

fn label_raw_bytes(
    map: &[(CborValue, CborValue)],
    label: i64,
    name: &str,
) -> Result<Vec<u8>, PasskeyError> {
    match label_value(map, label) {
        Some(CborValue::Bytes(b)) if !b.is_empty() => Ok(b.clone()),
        _ => Err(PasskeyError::Malformed(format!("COSE key missing {name}"))),
    }
}

fn label_bytes(
    map: &[(CborValue, CborValue)],
    label: i64,
    len: usize,
    name: &str,
) -> Result<Vec<u8>, PasskeyError> {
    let bytes = label_raw_bytes(map, label, name)?;
    if bytes.len() != len {
        return Err(PasskeyError::Malformed(format!(
            "COSE key {name} has length {}, expected {len}",
            bytes.len()
        )));
    }
    Ok(bytes)
}
