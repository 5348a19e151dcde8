mod core;
mod none;
mod packed;
mod policy;

pub(crate) use self::core::{AttestationObject, verify_attestation};
pub use policy::{
    AcceptUntrustedAttestation, AttestationPolicy, AttestationStatement, RequireVerifiedAttestation,
};
