mod errors;
mod main;
mod types;

pub use errors::PasskeyError;

pub use main::{
    AcceptUntrustedAttestation, AssertionResponse, AttestationPolicy, AttestationResponse,
    AttestationStatement, AuthenticationOptions, AuthenticatorSelection, ClientResponse,
    CoseAlgorithm, CreationOptionsResponse, CredentialDescriptor, CredentialPublicKey,
    LoginResponse, PubKeyCredParam, RegistrationOptions, RegistrationResponse, RelyingPartyEntity,
    RequestOptionsResponse, RequireVerifiedAttestation, UserEntity, check_counter,
};

pub use types::{CeremonyKind, ChallengeHandle, ChallengeState, Credential, CredentialId, User};

pub(crate) use main::{verify_login, verify_registration};

#[cfg(any(test, feature = "test-utils"))]
pub(crate) use main::flags;
