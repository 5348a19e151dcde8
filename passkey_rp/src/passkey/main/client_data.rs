use serde::Deserialize;

use crate::passkey::errors::PasskeyError;
use crate::passkey::types::CeremonyKind;
use crate::utils::{base64url_decode, constant_time_contains, constant_time_eq, sha256};

#[derive(Deserialize)]
struct ClientDataJson {
    #[serde(rename = "type")]
    type_: String,
    challenge: String,
    origin: String,
}

/// Decoded `clientDataJSON`, keeping the raw bytes for hashing.
#[derive(Debug, Clone)]
pub(crate) struct ParsedClientData {
    pub(crate) type_: String,
    pub(crate) challenge: Vec<u8>,
    pub(crate) origin: String,
    pub(crate) raw: Vec<u8>,
}

impl ParsedClientData {
    pub(crate) fn from_base64(client_data_json: &str) -> Result<Self, PasskeyError> {
        let raw = base64url_decode(client_data_json).map_err(|e| {
            tracing::error!("Failed to decode client data: {}", e);
            PasskeyError::Malformed(format!("Failed to decode client data: {e}"))
        })?;
        Self::from_bytes(raw)
    }

    pub(crate) fn from_bytes(raw: Vec<u8>) -> Result<Self, PasskeyError> {
        let data: ClientDataJson = serde_json::from_slice(&raw)
            .map_err(|e| PasskeyError::Malformed(format!("Invalid client data JSON: {e}")))?;

        // An undecodable challenge can never match the stored one
        let challenge = base64url_decode(&data.challenge).unwrap_or_default();

        Ok(Self {
            type_: data.type_,
            challenge,
            origin: data.origin,
            raw,
        })
    }

    /// Checks type, challenge and origin, in that order.
    pub(crate) fn verify(
        &self,
        kind: CeremonyKind,
        expected_challenge: &[u8],
        allowed_origins: &[String],
    ) -> Result<(), PasskeyError> {
        let expected_type = kind.client_data_type();
        if self.type_ != expected_type {
            return Err(PasskeyError::ClientDataTypeMismatch {
                expected: expected_type.to_string(),
                got: self.type_.clone(),
            });
        }

        if self.challenge.is_empty() || !constant_time_eq(&self.challenge, expected_challenge) {
            tracing::debug!("Challenge in client data does not match stored challenge");
            return Err(PasskeyError::ChallengeMismatch);
        }

        if !constant_time_contains(self.origin.as_bytes(), allowed_origins) {
            tracing::debug!(
                "Origin {} not in allowed origins {:?}",
                self.origin,
                allowed_origins
            );
            return Err(PasskeyError::OriginMismatch(self.origin.clone()));
        }

        Ok(())
    }

    pub(crate) fn hash(&self) -> Vec<u8> {
        sha256(&self.raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::base64url_encode;

    fn client_data(type_: &str, challenge: &[u8], origin: &str) -> ParsedClientData {
        let json = serde_json::json!({
            "type": type_,
            "challenge": base64url_encode(challenge),
            "origin": origin,
            "crossOrigin": false,
        });
        ParsedClientData::from_bytes(serde_json::to_vec(&json).unwrap()).unwrap()
    }

    fn origins() -> Vec<String> {
        vec![
            "https://example.com".to_string(),
            "https://login.example.com".to_string(),
        ]
    }

    #[test]
    fn test_valid_client_data_passes() {
        let cd = client_data("webauthn.get", &[7; 32], "https://login.example.com");
        assert!(cd.verify(CeremonyKind::Login, &[7; 32], &origins()).is_ok());
    }

    #[test]
    fn test_wrong_type_is_rejected() {
        let cd = client_data("webauthn.get", &[7; 32], "https://example.com");
        let err = cd
            .verify(CeremonyKind::Registration, &[7; 32], &origins())
            .unwrap_err();
        assert!(matches!(
            err,
            PasskeyError::ClientDataTypeMismatch { ref expected, ref got }
                if expected == "webauthn.create" && got == "webauthn.get"
        ));
    }

    #[test]
    fn test_wrong_challenge_is_rejected() {
        let cd = client_data("webauthn.create", &[7; 32], "https://example.com");
        let mut other = [7u8; 32];
        other[31] = 8;
        assert!(matches!(
            cd.verify(CeremonyKind::Registration, &other, &origins()),
            Err(PasskeyError::ChallengeMismatch)
        ));
    }

    #[test]
    fn test_origin_must_match_exactly() {
        for origin in [
            "https://example.com/",
            "http://example.com",
            "https://EXAMPLE.com",
            "https://evil.example.com",
        ] {
            let cd = client_data("webauthn.create", &[7; 32], origin);
            assert!(
                matches!(
                    cd.verify(CeremonyKind::Registration, &[7; 32], &origins()),
                    Err(PasskeyError::OriginMismatch(_))
                ),
                "origin {origin} should be rejected"
            );
        }
    }

    #[test]
    fn test_undecodable_challenge_is_a_mismatch() {
        let json = br#"{"type":"webauthn.get","challenge":"***","origin":"https://example.com"}"#;
        let cd = ParsedClientData::from_bytes(json.to_vec()).unwrap();
        assert!(matches!(
            cd.verify(CeremonyKind::Login, &[7; 32], &origins()),
            Err(PasskeyError::ChallengeMismatch)
        ));
    }

    #[test]
    fn test_missing_field_is_malformed() {
        let json = br#"{"type":"webauthn.get","origin":"https://example.com"}"#;
        assert!(matches!(
            ParsedClientData::from_bytes(json.to_vec()),
            Err(PasskeyError::Malformed(_))
        ));
    }

    #[test]
    fn test_hash_covers_raw_bytes() {
        let a = client_data("webauthn.get", &[1; 32], "https://example.com");
        let b = client_data("webauthn.get", &[2; 32], "https://example.com");
        assert_eq!(a.hash().len(), 32);
        assert_ne!(a.hash(), b.hash());
    }
}
