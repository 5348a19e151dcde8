use serde::{Deserialize, Serialize};

use crate::passkey::errors::PasskeyError;
use crate::passkey::types::{CeremonyKind, CredentialId};

/// Body returned by the begin-registration endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreationOptionsResponse {
    pub public_key: RegistrationOptions,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationOptions {
    pub challenge: String,
    pub rp: RelyingPartyEntity,
    pub user: UserEntity,
    pub pub_key_cred_params: Vec<PubKeyCredParam>,
    /// Milliseconds
    pub timeout: u64,
    pub exclude_credentials: Vec<CredentialDescriptor>,
    pub authenticator_selection: AuthenticatorSelection,
    pub attestation: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelyingPartyEntity {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserEntity {
    pub id: String,
    pub name: String,
    pub display_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PubKeyCredParam {
    #[serde(rename = "type")]
    pub type_: String,
    pub alg: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticatorSelection {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub authenticator_attachment: Option<String>,
    pub resident_key: String,
    pub require_resident_key: bool,
    pub user_verification: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialDescriptor {
    #[serde(rename = "type")]
    pub type_: String,
    pub id: String,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub transports: Vec<String>,
}

impl CredentialDescriptor {
    pub(crate) fn public_key(id: &CredentialId, transports: Vec<String>) -> Self {
        Self {
            type_: "public-key".to_string(),
            id: id.to_base64url(),
            transports,
        }
    }
}

/// Body returned by the begin-login endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestOptionsResponse {
    pub public_key: AuthenticationOptions,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticationOptions {
    pub challenge: String,
    /// Milliseconds
    pub timeout: u64,
    pub rp_id: String,
    pub allow_credentials: Vec<CredentialDescriptor>,
    pub user_verification: String,
}

/// `PublicKeyCredential` produced by `navigator.credentials.create()`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationResponse {
    pub id: String,
    pub raw_id: String,
    pub response: AttestationResponse,
    #[serde(rename = "type")]
    pub type_: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttestationResponse {
    #[serde(rename = "clientDataJSON")]
    pub client_data_json: String,
    pub attestation_object: String,
    #[serde(default)]
    pub transports: Vec<String>,
}

/// `PublicKeyCredential` produced by `navigator.credentials.get()`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub id: String,
    pub raw_id: String,
    pub response: AssertionResponse,
    #[serde(rename = "type")]
    pub type_: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssertionResponse {
    #[serde(rename = "clientDataJSON")]
    pub client_data_json: String,
    pub authenticator_data: String,
    pub signature: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_handle: Option<String>,
}

/// A client response of either ceremony.
#[derive(Debug, Clone)]
pub enum ClientResponse {
    Registration(RegistrationResponse),
    Login(LoginResponse),
}

impl ClientResponse {
    pub fn kind(&self) -> CeremonyKind {
        match self {
            Self::Registration(_) => CeremonyKind::Registration,
            Self::Login(_) => CeremonyKind::Login,
        }
    }
}

impl From<RegistrationResponse> for ClientResponse {
    fn from(r: RegistrationResponse) -> Self {
        Self::Registration(r)
    }
}

impl From<LoginResponse> for ClientResponse {
    fn from(r: LoginResponse) -> Self {
        Self::Login(r)
    }
}

impl RegistrationResponse {
    pub(crate) fn credential_id(&self) -> Result<CredentialId, PasskeyError> {
        credential_id_of(&self.type_, &self.id, &self.raw_id)
    }
}

impl LoginResponse {
    pub(crate) fn credential_id(&self) -> Result<CredentialId, PasskeyError> {
        credential_id_of(&self.type_, &self.id, &self.raw_id)
    }
}

/// `id` is the base64url form of `rawId`; both must name the same credential.
fn credential_id_of(type_: &str, id: &str, raw_id: &str) -> Result<CredentialId, PasskeyError> {
    if type_ != "public-key" {
        return Err(PasskeyError::Malformed(format!(
            "Unexpected credential type: {type_}"
        )));
    }
    let raw = CredentialId::from_base64url(raw_id)?;
    let from_id = CredentialId::from_base64url(id)?;
    if raw != from_id || raw.as_bytes().is_empty() {
        return Err(PasskeyError::Malformed(
            "Credential id does not match rawId".to_string(),
        ));
    }
    Ok(raw)
}
