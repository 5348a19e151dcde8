use ciborium::value::Value as CborValue;

use crate::passkey::errors::PasskeyError;

/// Attestation data handed to an [`AttestationPolicy`].
#[derive(Debug, Clone, Copy)]
pub struct AttestationStatement<'a> {
    pub fmt: &'a str,
    /// AAGUID of the authenticator model, hyphenated
    pub aaguid: &'a str,
    pub statement: &'a [(CborValue, CborValue)],
    pub auth_data: &'a [u8],
    pub client_data_hash: &'a [u8],
}

/// Decides on attestation statements the engine does not verify itself.
///
/// Implementations can validate certificate chains against a trust store of their choice.
pub trait AttestationPolicy: Send + Sync {
    fn evaluate(&self, statement: &AttestationStatement<'_>) -> Result<(), PasskeyError>;
}

/// Accepts any statement without checking it.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptUntrustedAttestation;

impl AttestationPolicy for AcceptUntrustedAttestation {
    fn evaluate(&self, statement: &AttestationStatement<'_>) -> Result<(), PasskeyError> {
        tracing::info!(
            "Accepting unverified '{}' attestation from authenticator {}",
            statement.fmt,
            statement.aaguid
        );
        Ok(())
    }
}

/// Rejects every statement that reaches the policy.
#[derive(Debug, Clone, Copy, Default)]
pub struct RequireVerifiedAttestation;

impl AttestationPolicy for RequireVerifiedAttestation {
    fn evaluate(&self, statement: &AttestationStatement<'_>) -> Result<(), PasskeyError> {
        tracing::warn!(
            "Rejecting unverifiable '{}' attestation from authenticator {}",
            statement.fmt,
            statement.aaguid
        );
        Err(PasskeyError::AttestationRejected(format!(
            "'{}' attestation cannot be verified",
            statement.fmt
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn statement() -> AttestationStatement<'static> {
        AttestationStatement {
            fmt: "tpm",
            aaguid: "00000000-0000-0000-0000-000000000000",
            statement: &[],
            auth_data: &[],
            client_data_hash: &[],
        }
    }

    #[test]
    fn test_accept_untrusted() {
        assert!(AcceptUntrustedAttestation.evaluate(&statement()).is_ok());
    }

    #[test]
    fn test_require_verified() {
        assert!(matches!(
            RequireVerifiedAttestation.evaluate(&statement()),
            Err(PasskeyError::AttestationRejected(_))
        ));
    }
}
