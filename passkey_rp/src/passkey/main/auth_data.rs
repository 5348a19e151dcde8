use ciborium::value::Value as CborValue;
use uuid::Uuid;

use super::cose::split_cose_key;
use crate::passkey::errors::PasskeyError;
use crate::utils::{constant_time_eq, sha256};

/// Authenticator data flag bits.
pub(crate) mod flags {
    pub(crate) const UP: u8 = 0x01;
    pub(crate) const UV: u8 = 0x04;
    pub(crate) const BE: u8 = 0x08;
    pub(crate) const BS: u8 = 0x10;
    pub(crate) const AT: u8 = 0x40;
    pub(crate) const ED: u8 = 0x80;
}

const RP_ID_HASH_LEN: usize = 32;
const HEADER_LEN: usize = RP_ID_HASH_LEN + 1 + 4;
const AAGUID_LEN: usize = 16;
const MAX_CREDENTIAL_ID_LEN: usize = 1023;

#[derive(Debug, Clone)]
pub(crate) struct AttestedCredentialData {
    pub(crate) aaguid: [u8; AAGUID_LEN],
    pub(crate) credential_id: Vec<u8>,
    /// COSE_Key bytes exactly as they appear in the authenticator data
    pub(crate) public_key_cose: Vec<u8>,
}

#[derive(Debug, Clone)]
pub(crate) struct AuthenticatorData {
    pub(crate) rp_id_hash: Vec<u8>,
    pub(crate) flags: u8,
    pub(crate) counter: u32,
    pub(crate) attested: Option<AttestedCredentialData>,
    pub(crate) raw: Vec<u8>,
}

impl AuthenticatorData {
    /// Parses the binary layout: rpIdHash, flags, big-endian counter, then optional
    /// attested credential data and extensions as announced by the flags.
    pub(crate) fn from_bytes(raw: Vec<u8>) -> Result<Self, PasskeyError> {
        if raw.len() < HEADER_LEN {
            return Err(PasskeyError::Malformed(format!(
                "Authenticator data too short: {} bytes",
                raw.len()
            )));
        }

        let rp_id_hash = raw[..RP_ID_HASH_LEN].to_vec();
        let flag_byte = raw[RP_ID_HASH_LEN];
        let counter = u32::from_be_bytes([raw[33], raw[34], raw[35], raw[36]]);

        let mut rest = &raw[HEADER_LEN..];
        let mut attested = None;

        if flag_byte & flags::AT != 0 {
            if rest.len() < AAGUID_LEN + 2 {
                return Err(PasskeyError::Malformed(
                    "Authenticator data too short for attested credential data".to_string(),
                ));
            }
            let mut aaguid = [0u8; AAGUID_LEN];
            aaguid.copy_from_slice(&rest[..AAGUID_LEN]);
            let id_len = usize::from(u16::from_be_bytes([rest[16], rest[17]]));
            rest = &rest[AAGUID_LEN + 2..];

            if id_len == 0 || id_len > MAX_CREDENTIAL_ID_LEN || rest.len() < id_len {
                return Err(PasskeyError::Malformed(format!(
                    "Invalid credential ID length: {id_len}"
                )));
            }
            let credential_id = rest[..id_len].to_vec();
            rest = &rest[id_len..];

            let (cose, after) = split_cose_key(rest)?;
            attested = Some(AttestedCredentialData {
                aaguid,
                credential_id,
                public_key_cose: cose.to_vec(),
            });
            rest = after;
        }

        if flag_byte & flags::ED != 0 {
            let mut reader = rest;
            let extensions: CborValue = ciborium::de::from_reader(&mut reader)
                .map_err(|e| PasskeyError::Malformed(format!("Invalid extensions CBOR: {e}")))?;
            if !matches!(extensions, CborValue::Map(_)) {
                return Err(PasskeyError::Malformed(
                    "Extensions are not a CBOR map".to_string(),
                ));
            }
            rest = reader;
        }

        if !rest.is_empty() {
            return Err(PasskeyError::Malformed(format!(
                "{} trailing bytes in authenticator data",
                rest.len()
            )));
        }

        Ok(Self {
            rp_id_hash,
            flags: flag_byte,
            counter,
            attested,
            raw,
        })
    }

    pub(crate) fn is_user_present(&self) -> bool {
        self.flags & flags::UP != 0
    }

    pub(crate) fn is_user_verified(&self) -> bool {
        self.flags & flags::UV != 0
    }

    pub(crate) fn is_backup_eligible(&self) -> bool {
        self.flags & flags::BE != 0
    }

    pub(crate) fn is_backed_up(&self) -> bool {
        self.flags & flags::BS != 0
    }

    /// Checks the RP ID hash and the presence and verification flags.
    pub(crate) fn verify(&self, rp_id: &str, user_verification_required: bool) -> Result<(), PasskeyError> {
        if !constant_time_eq(&self.rp_id_hash, &sha256(rp_id.as_bytes())) {
            return Err(PasskeyError::RpIdHashMismatch);
        }

        if !self.is_user_present() {
            return Err(PasskeyError::UserPresenceMissing);
        }

        if user_verification_required && !self.is_user_verified() {
            return Err(PasskeyError::UserVerificationRequired);
        }

        tracing::debug!(
            "Authenticator data flags: UP={}, UV={}, BE={}, BS={}, counter={}",
            self.is_user_present(),
            self.is_user_verified(),
            self.is_backup_eligible(),
            self.is_backed_up(),
            self.counter
        );

        Ok(())
    }
}

impl AttestedCredentialData {
    pub(crate) fn aaguid_string(&self) -> String {
        Uuid::from_bytes(self.aaguid).hyphenated().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::passkey::main::cose::CredentialPublicKey;

    fn header(rp_id: &str, flags: u8, counter: u32) -> Vec<u8> {
        let mut data = sha256(rp_id.as_bytes());
        data.push(flags);
        data.extend_from_slice(&counter.to_be_bytes());
        data
    }

    fn with_attested(mut data: Vec<u8>, cred_id: &[u8]) -> Vec<u8> {
        data.extend_from_slice(&[0xab; 16]);
        data.extend_from_slice(&(cred_id.len() as u16).to_be_bytes());
        data.extend_from_slice(cred_id);
        let key = CredentialPublicKey::EdDsa { x: vec![5; 32] };
        data.extend_from_slice(&key.to_cose_bytes().unwrap());
        data
    }

    #[test]
    fn test_parse_assertion_auth_data() {
        let raw = header("example.com", flags::UP | flags::UV, 0x0102_0304);
        let parsed = AuthenticatorData::from_bytes(raw).unwrap();
        assert_eq!(parsed.counter, 0x0102_0304);
        assert!(parsed.is_user_present());
        assert!(parsed.is_user_verified());
        assert!(parsed.attested.is_none());
        assert!(parsed.verify("example.com", true).is_ok());
    }

    #[test]
    fn test_parse_attested_credential_data() {
        let raw = with_attested(header("example.com", flags::UP | flags::AT, 0), b"cred-1");
        let parsed = AuthenticatorData::from_bytes(raw).unwrap();
        let attested = parsed.attested.unwrap();
        assert_eq!(attested.credential_id, b"cred-1".to_vec());
        assert_eq!(attested.aaguid_string(), "abababab-abab-abab-abab-abababababab");
        let key = CredentialPublicKey::from_cose_bytes(&attested.public_key_cose).unwrap();
        assert_eq!(key, CredentialPublicKey::EdDsa { x: vec![5; 32] });
    }

    #[test]
    fn test_extensions_after_credential_data() {
        let mut raw = with_attested(
            header("example.com", flags::UP | flags::AT | flags::ED, 0),
            b"cred-1",
        );
        // {"credProtect": 1}
        let ext = CborValue::Map(vec![(
            CborValue::Text("credProtect".to_string()),
            CborValue::Integer(1i64.into()),
        )]);
        ciborium::ser::into_writer(&ext, &mut raw).unwrap();
        assert!(AuthenticatorData::from_bytes(raw).is_ok());
    }

    #[test]
    fn test_trailing_bytes_are_rejected() {
        let mut raw = with_attested(header("example.com", flags::UP | flags::AT, 0), b"c");
        raw.push(0x00);
        assert!(matches!(
            AuthenticatorData::from_bytes(raw),
            Err(PasskeyError::Malformed(_))
        ));
    }

    #[test]
    fn test_too_short_is_rejected() {
        assert!(matches!(
            AuthenticatorData::from_bytes(vec![0; 36]),
            Err(PasskeyError::Malformed(_))
        ));
    }

    #[test]
    fn test_credential_id_length_past_end_is_rejected() {
        let mut raw = header("example.com", flags::UP | flags::AT, 0);
        raw.extend_from_slice(&[0; 16]);
        raw.extend_from_slice(&64u16.to_be_bytes());
        raw.extend_from_slice(&[1; 10]);
        assert!(matches!(
            AuthenticatorData::from_bytes(raw),
            Err(PasskeyError::Malformed(_))
        ));
    }

    #[test]
    fn test_verify_rp_id_hash_and_flags() {
        let parsed = AuthenticatorData::from_bytes(header("example.com", flags::UP, 1)).unwrap();
        assert!(matches!(
            parsed.verify("other.example", false),
            Err(PasskeyError::RpIdHashMismatch)
        ));
        assert!(matches!(
            parsed.verify("example.com", true),
            Err(PasskeyError::UserVerificationRequired)
        ));
        assert!(parsed.verify("example.com", false).is_ok());

        let absent = AuthenticatorData::from_bytes(header("example.com", flags::UV, 1)).unwrap();
        assert!(matches!(
            absent.verify("example.com", false),
            Err(PasskeyError::UserPresenceMissing)
        ));
    }
}
