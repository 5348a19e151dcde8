use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::main::CredentialPublicKey;
use crate::config::UserVerificationRequirement;
use crate::utils::{UtilError, base64url_decode, base64url_encode, gen_random_bytes, gen_random_string};

const USER_ID_LEN: usize = 32;
const HANDLE_LEN: usize = 32;

/// Credential ID as chosen by the authenticator.
///
/// Opaque bytes, unique across the whole relying party. Serialized as unpadded base64url.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct CredentialId(Vec<u8>);

impl CredentialId {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn from_base64url(encoded: &str) -> Result<Self, UtilError> {
        Ok(Self(base64url_decode(encoded)?))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn to_base64url(&self) -> String {
        base64url_encode(&self.0)
    }
}

impl std::fmt::Display for CredentialId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_base64url())
    }
}

impl std::fmt::Debug for CredentialId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "CredentialId({})", self.to_base64url())
    }
}

impl Serialize for CredentialId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_base64url())
    }
}

impl<'de> Deserialize<'de> for CredentialId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_base64url(&s).map_err(serde::de::Error::custom)
    }
}

/// A registered public-key credential.
#[derive(Debug, Clone)]
pub struct Credential {
    pub credential_id: CredentialId,
    pub public_key: CredentialPublicKey,
    /// Last accepted signature counter
    pub sign_count: u32,
    pub transports: Vec<String>,
    pub aaguid: String,
    pub attestation_format: String,
    pub created_at: DateTime<Utc>,
    pub last_used_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct User {
    /// Opaque user handle sent to authenticators as `user.id`
    pub id: Vec<u8>,
    pub name: String,
    pub display_name: String,
    pub credentials: Vec<Credential>,
    pub created_at: DateTime<Utc>,
}

impl User {
    /// Creates a user with a fresh random handle and no credentials.
    pub fn new(name: impl Into<String>, display_name: impl Into<String>) -> Result<Self, UtilError> {
        Ok(Self {
            id: gen_random_bytes(USER_ID_LEN)?,
            name: name.into(),
            display_name: display_name.into(),
            credentials: Vec::new(),
            created_at: Utc::now(),
        })
    }

    pub fn credential_ids(&self) -> Vec<CredentialId> {
        self.credentials
            .iter()
            .map(|c| c.credential_id.clone())
            .collect()
    }

    pub fn find_credential(&self, credential_id: &CredentialId) -> Option<&Credential> {
        self.credentials
            .iter()
            .find(|c| &c.credential_id == credential_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CeremonyKind {
    Registration,
    Login,
}

impl CeremonyKind {
    /// Value the browser writes into `clientDataJSON.type` for this ceremony.
    pub fn client_data_type(&self) -> &'static str {
        match self {
            Self::Registration => "webauthn.create",
            Self::Login => "webauthn.get",
        }
    }
}

impl std::fmt::Display for CeremonyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Registration => f.write_str("registration"),
            Self::Login => f.write_str("login"),
        }
    }
}

/// Server-side record of an in-flight ceremony.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChallengeState {
    pub kind: CeremonyKind,
    #[serde(with = "crate::utils::serde_base64url")]
    pub user_id: Vec<u8>,
    #[serde(with = "crate::utils::serde_base64url")]
    pub challenge: Vec<u8>,
    /// Excluded IDs for registration, allowed IDs for login
    pub credential_ids: Vec<CredentialId>,
    pub user_verification: UserVerificationRequirement,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl ChallengeState {
    pub(crate) fn new(
        kind: CeremonyKind,
        user_id: Vec<u8>,
        challenge: Vec<u8>,
        credential_ids: Vec<CredentialId>,
        user_verification: UserVerificationRequirement,
        ttl_secs: u32,
    ) -> Self {
        let created_at = Utc::now();
        Self {
            kind,
            user_id,
            challenge,
            credential_ids,
            user_verification,
            created_at,
            expires_at: created_at + Duration::seconds(i64::from(ttl_secs)),
        }
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    /// Milliseconds left before expiry, zero once expired.
    pub fn remaining_millis(&self) -> u64 {
        u64::try_from((self.expires_at - Utc::now()).num_milliseconds()).unwrap_or(0)
    }
}

/// Opaque reference to a stored [`ChallengeState`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChallengeHandle(String);

impl ChallengeHandle {
    pub fn generate() -> Result<Self, UtilError> {
        Ok(Self(gen_random_string(HANDLE_LEN)?))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for ChallengeHandle {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl std::fmt::Display for ChallengeHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
