use ciborium::value::Value as CborValue;

use crate::passkey::errors::PasskeyError;

pub(super) fn verify_none_attestation(att_stmt: &[(CborValue, CborValue)]) -> Result<(), PasskeyError> {
    if !att_stmt.is_empty() {
        return Err(PasskeyError::AttestationRejected(
            "attStmt must be empty for none attestation".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_statement_is_accepted() {
        assert!(verify_none_attestation(&[]).is_ok());
    }

    #[test]
    fn test_non_empty_statement_is_rejected() {
        let stmt = vec![(
            CborValue::Text("sig".to_string()),
            CborValue::Bytes(vec![1, 2, 3]),
        )];
        assert!(matches!(
            verify_none_attestation(&stmt),
            Err(PasskeyError::AttestationRejected(_))
        ));
    }
}
