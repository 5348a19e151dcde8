//! Test helpers shared by the unit tests and, behind the `test-utils` feature, by
//! dependent crates.
//!
//! [`SoftAuthenticator`] plays the browser and authenticator side of both ceremonies with
//! real keys, so responses go through the same verification as those of a hardware
//! authenticator. Its builder methods produce deliberately broken responses for negative
//! tests.

use std::sync::Arc;

use ciborium::value::Value as CborValue;
use ring::rand::SystemRandom;
use ring::signature::{
    ECDSA_P256_SHA256_ASN1_SIGNING, EcdsaKeyPair, Ed25519KeyPair, KeyPair,
};

use crate::config::RpConfig;
use crate::passkey::{
    AssertionResponse, AttestationResponse, AuthenticationOptions, CredentialId,
    CredentialPublicKey, LoginResponse, RegistrationOptions, RegistrationResponse, flags,
};
use crate::utils::{base64url_decode, base64url_encode, gen_random_bytes, sha256};

/// Relying party used throughout the tests: `example.com` served from `https://example.com`.
pub fn test_config() -> RpConfig {
    RpConfig::new(
        "example.com",
        "Example",
        vec![
            "https://example.com".to_string(),
            "https://login.example.com".to_string(),
        ],
    )
    .expect("valid test config")
}

/// Attestation statement the authenticator attaches at registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttestationMode {
    /// `fmt: "none"` with an empty statement
    None,
    /// `fmt: "packed"` signed with the credential key itself
    PackedSelf,
    /// Any other format, with a statement the relying party cannot check
    Other(&'static str),
}

#[derive(Clone)]
enum SigningKey {
    Es256(Arc<EcdsaKeyPair>),
    EdDsa(Arc<Ed25519KeyPair>),
}

/// A software authenticator holding a single credential.
#[derive(Clone)]
pub struct SoftAuthenticator {
    key: SigningKey,
    credential_id: CredentialId,
    counter: u32,
    counter_step: u32,
    user_verified: bool,
    attestation: AttestationMode,
    rp_id: Option<String>,
    origin: Option<String>,
    client_data_type: Option<String>,
    user_handle: Option<Vec<u8>>,
}

impl SoftAuthenticator {
    pub fn es256() -> Self {
        let rng = SystemRandom::new();
        let pkcs8 = EcdsaKeyPair::generate_pkcs8(&ECDSA_P256_SHA256_ASN1_SIGNING, &rng)
            .expect("generate P-256 key");
        let key = EcdsaKeyPair::from_pkcs8(&ECDSA_P256_SHA256_ASN1_SIGNING, pkcs8.as_ref(), &rng)
            .expect("load P-256 key");
        Self::with_key(SigningKey::Es256(Arc::new(key)))
    }

    pub fn eddsa() -> Self {
        let rng = SystemRandom::new();
        let pkcs8 = Ed25519KeyPair::generate_pkcs8(&rng).expect("generate Ed25519 key");
        let key = Ed25519KeyPair::from_pkcs8(pkcs8.as_ref()).expect("load Ed25519 key");
        Self::with_key(SigningKey::EdDsa(Arc::new(key)))
    }

    fn with_key(key: SigningKey) -> Self {
        Self {
            key,
            credential_id: CredentialId::new(gen_random_bytes(16).expect("random credential id")),
            counter: 0,
            counter_step: 0,
            user_verified: true,
            attestation: AttestationMode::None,
            rp_id: None,
            origin: None,
            client_data_type: None,
            user_handle: None,
        }
    }

    pub fn with_attestation(mut self, mode: AttestationMode) -> Self {
        self.attestation = mode;
        self
    }

    pub fn with_user_verified(mut self, verified: bool) -> Self {
        self.user_verified = verified;
        self
    }

    /// Scope responses to another RP ID than the configured one.
    pub fn with_rp_id(mut self, rp_id: &str) -> Self {
        self.rp_id = Some(rp_id.to_string());
        self
    }

    pub fn with_origin(mut self, origin: &str) -> Self {
        self.origin = Some(origin.to_string());
        self
    }

    /// Write this `type` into clientDataJSON for every ceremony.
    pub fn with_client_data_type(mut self, type_: &str) -> Self {
        self.client_data_type = Some(type_.to_string());
        self
    }

    /// Sets the current counter value.
    pub fn with_counter(mut self, counter: u32) -> Self {
        self.counter = counter;
        self
    }

    /// Amount added to the counter before each signature. Zero models an
    /// authenticator without a counter.
    pub fn with_counter_step(mut self, step: u32) -> Self {
        self.counter_step = step;
        self
    }

    pub fn credential_id(&self) -> CredentialId {
        self.credential_id.clone()
    }

    pub fn public_key(&self) -> CredentialPublicKey {
        match &self.key {
            SigningKey::Es256(key) => {
                // uncompressed point: 0x04 || x || y
                let point = key.public_key().as_ref();
                CredentialPublicKey::Es256 {
                    x: point[1..33].to_vec(),
                    y: point[33..65].to_vec(),
                }
            }
            SigningKey::EdDsa(key) => CredentialPublicKey::EdDsa {
                x: key.public_key().as_ref().to_vec(),
            },
        }
    }

    /// User handle recorded at the last registration.
    pub fn user_handle(&self) -> Option<&[u8]> {
        self.user_handle.as_deref()
    }

    /// Answers `navigator.credentials.create()` for `challenge`.
    pub fn register(&mut self, config: &RpConfig, challenge: &[u8], user_id: &[u8]) -> RegistrationResponse {
        self.user_handle = Some(user_id.to_vec());
        self.counter = self.counter.wrapping_add(self.counter_step);

        let client_data = self.client_data(config, "webauthn.create", challenge);

        let mut auth_data = self.auth_data_header(config, flags::AT);
        auth_data.extend_from_slice(&[0u8; 16]);
        let id = self.credential_id.as_bytes();
        auth_data.extend_from_slice(&(id.len() as u16).to_be_bytes());
        auth_data.extend_from_slice(id);
        auth_data.extend_from_slice(
            &self
                .public_key()
                .to_cose_bytes()
                .expect("encode credential key"),
        );

        let (fmt, att_stmt) = match self.attestation {
            AttestationMode::None => ("none", vec![]),
            AttestationMode::PackedSelf => {
                let sig = self.sign(&signed_data(&auth_data, &client_data));
                (
                    "packed",
                    vec![
                        (
                            CborValue::Text("alg".to_string()),
                            CborValue::Integer(self.public_key().algorithm().id().into()),
                        ),
                        (CborValue::Text("sig".to_string()), CborValue::Bytes(sig)),
                    ],
                )
            }
            AttestationMode::Other(fmt) => (
                fmt,
                vec![(
                    CborValue::Text("ver".to_string()),
                    CborValue::Text("2.0".to_string()),
                )],
            ),
        };

        let attestation_object = CborValue::Map(vec![
            (
                CborValue::Text("fmt".to_string()),
                CborValue::Text(fmt.to_string()),
            ),
            (
                CborValue::Text("attStmt".to_string()),
                CborValue::Map(att_stmt),
            ),
            (
                CborValue::Text("authData".to_string()),
                CborValue::Bytes(auth_data),
            ),
        ]);
        let mut encoded = Vec::new();
        ciborium::ser::into_writer(&attestation_object, &mut encoded)
            .expect("encode attestation object");

        RegistrationResponse {
            id: self.credential_id.to_base64url(),
            raw_id: self.credential_id.to_base64url(),
            response: AttestationResponse {
                client_data_json: base64url_encode(&client_data),
                attestation_object: base64url_encode(&encoded),
                transports: vec!["internal".to_string()],
            },
            type_: "public-key".to_string(),
        }
    }

    /// Answers `navigator.credentials.get()` for `challenge`.
    pub fn login(&mut self, config: &RpConfig, challenge: &[u8], user_handle: Option<&[u8]>) -> LoginResponse {
        self.counter = self.counter.wrapping_add(self.counter_step);

        let client_data = self.client_data(config, "webauthn.get", challenge);
        let auth_data = self.auth_data_header(config, 0);
        let signature = self.sign(&signed_data(&auth_data, &client_data));

        LoginResponse {
            id: self.credential_id.to_base64url(),
            raw_id: self.credential_id.to_base64url(),
            response: AssertionResponse {
                client_data_json: base64url_encode(&client_data),
                authenticator_data: base64url_encode(&auth_data),
                signature: base64url_encode(&signature),
                user_handle: user_handle.map(base64url_encode),
            },
            type_: "public-key".to_string(),
        }
    }

    /// [`Self::register`] driven by the options a relying party returned.
    pub fn answer_creation(&mut self, config: &RpConfig, options: &RegistrationOptions) -> RegistrationResponse {
        let challenge = base64url_decode(&options.challenge).expect("challenge is base64url");
        let user_id = base64url_decode(&options.user.id).expect("user id is base64url");
        self.register(config, &challenge, &user_id)
    }

    /// [`Self::login`] driven by the options a relying party returned, sending the
    /// user handle recorded at registration.
    pub fn answer_request(&mut self, config: &RpConfig, options: &AuthenticationOptions) -> LoginResponse {
        let challenge = base64url_decode(&options.challenge).expect("challenge is base64url");
        let user_handle = self.user_handle.clone();
        self.login(config, &challenge, user_handle.as_deref())
    }

    fn client_data(&self, config: &RpConfig, type_: &str, challenge: &[u8]) -> Vec<u8> {
        let json = serde_json::json!({
            "type": self.client_data_type.as_deref().unwrap_or(type_),
            "challenge": base64url_encode(challenge),
            "origin": self.origin.as_deref().unwrap_or(config.primary_origin()),
            "crossOrigin": false,
        });
        serde_json::to_vec(&json).expect("encode client data")
    }

    fn auth_data_header(&self, config: &RpConfig, extra_flags: u8) -> Vec<u8> {
        let rp_id = self.rp_id.as_deref().unwrap_or(&config.rp_id);
        let mut flag_byte = flags::UP | extra_flags;
        if self.user_verified {
            flag_byte |= flags::UV;
        }
        let mut data = sha256(rp_id.as_bytes());
        data.push(flag_byte);
        data.extend_from_slice(&self.counter.to_be_bytes());
        data
    }

    fn sign(&self, message: &[u8]) -> Vec<u8> {
        match &self.key {
            SigningKey::Es256(key) => key
                .sign(&SystemRandom::new(), message)
                .expect("ECDSA signature")
                .as_ref()
                .to_vec(),
            SigningKey::EdDsa(key) => key.sign(message).as_ref().to_vec(),
        }
    }
}

fn signed_data(auth_data: &[u8], client_data: &[u8]) -> Vec<u8> {
    let mut data = auth_data.to_vec();
    data.extend_from_slice(&sha256(client_data));
    data
}
