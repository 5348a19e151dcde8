//! passkey-rp - Passkey (WebAuthn) relying-party library
//!
//! Runs the registration and login ceremonies against pluggable challenge and credential
//! stores, verifies authenticator responses, and coordinates the cookie that ties a
//! ceremony's begin and finish requests together. HTTP framing lives in `passkey-rp-axum`.

mod ceremony;
mod config;
mod passkey;
mod session;
mod storage;
mod utils;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use ceremony::{
    CeremonyError, CeremonyOutcome, LOGIN_SUCCESS, REGISTRATION_SUCCESS, RelyingParty,
    ServiceContext, handle_begin_login_core, handle_begin_registration_core,
    handle_finish_login_core, handle_finish_registration_core,
};

pub use config::{
    AttestationConveyance, AuthenticatorAttachment, ConfigError, ResidentKeyRequirement,
    RpConfig, UserVerificationRequirement,
};

pub use passkey::{
    AcceptUntrustedAttestation, AssertionResponse, AttestationPolicy, AttestationResponse,
    AttestationStatement, AuthenticationOptions, AuthenticatorSelection, CeremonyKind,
    ChallengeHandle, ChallengeState, ClientResponse, CoseAlgorithm, CreationOptionsResponse,
    Credential, CredentialDescriptor, CredentialId, CredentialPublicKey, LoginResponse,
    PasskeyError, PubKeyCredParam, RegistrationOptions, RegistrationResponse, RelyingPartyEntity,
    RequestOptionsResponse, RequireVerifiedAttestation, User, UserEntity, check_counter,
};

pub use session::{DEFAULT_SESSION_COOKIE_NAME, SessionCookie};

pub use storage::{
    ChallengeStore, ChallengeStoreKind, CredentialStore, CredentialStoreKind,
    InMemoryChallengeStore, InMemoryCredentialStore, LoadedChallenge, RedisChallengeStore,
    SqliteCredentialStore, StorageConfig, StorageError, build_challenge_store,
    build_credential_store,
};

pub use utils::UtilError;
