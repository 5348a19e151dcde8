mod attestation;
mod auth;
mod auth_data;
mod client_data;
mod cose;
mod register;
mod types;

pub use attestation::{
    AcceptUntrustedAttestation, AttestationPolicy, AttestationStatement, RequireVerifiedAttestation,
};
pub use auth::check_counter;
pub use cose::{CoseAlgorithm, CredentialPublicKey};
pub use types::{
    AssertionResponse, AttestationResponse, AuthenticationOptions, AuthenticatorSelection,
    ClientResponse, CreationOptionsResponse, CredentialDescriptor, LoginResponse, PubKeyCredParam,
    RegistrationOptions, RegistrationResponse, RelyingPartyEntity, RequestOptionsResponse,
    UserEntity,
};

pub(crate) use auth::verify_login;
pub(crate) use register::verify_registration;

#[cfg(any(test, feature = "test-utils"))]
pub(crate) use auth_data::flags;
