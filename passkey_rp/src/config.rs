//! Relying-party configuration.
//!
//! Values are read once at startup into an immutable [`RpConfig`] that is shared by the
//! ceremony engine. Parsing goes through a lookup closure so the same code serves both
//! `std::env` and tests.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::passkey::CoseAlgorithm;

const DEFAULT_TIMEOUT_SECS: u32 = 60;
const DEFAULT_CHALLENGE_TIMEOUT_SECS: u32 = 60;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserVerificationRequirement {
    Required,
    Preferred,
    Discouraged,
}

impl UserVerificationRequirement {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Required => "required",
            Self::Preferred => "preferred",
            Self::Discouraged => "discouraged",
        }
    }

    pub fn is_required(&self) -> bool {
        matches!(self, Self::Required)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttestationConveyance {
    None,
    Indirect,
    Direct,
    Enterprise,
}

impl AttestationConveyance {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Indirect => "indirect",
            Self::Direct => "direct",
            Self::Enterprise => "enterprise",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthenticatorAttachment {
    Platform,
    CrossPlatform,
}

impl AuthenticatorAttachment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Platform => "platform",
            Self::CrossPlatform => "cross-platform",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResidentKeyRequirement {
    Required,
    Preferred,
    Discouraged,
}

impl ResidentKeyRequirement {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Required => "required",
            Self::Preferred => "preferred",
            Self::Discouraged => "discouraged",
        }
    }
}

/// Immutable relying-party record read by every ceremony.
#[derive(Debug, Clone)]
pub struct RpConfig {
    /// Effective domain the credentials are scoped to
    pub rp_id: String,
    /// Human-readable RP name shown by the authenticator
    pub rp_name: String,
    /// Origins accepted in clientDataJSON, compared byte-exactly
    pub origins: Vec<String>,
    /// Client-side ceremony timeout in seconds
    pub timeout_secs: u32,
    /// Lifetime of a stored challenge in seconds
    pub challenge_timeout_secs: u32,
    /// Accepted public-key algorithms in order of preference
    pub algorithms: Vec<CoseAlgorithm>,
    pub user_verification: UserVerificationRequirement,
    pub attestation: AttestationConveyance,
    pub authenticator_attachment: Option<AuthenticatorAttachment>,
    pub resident_key: ResidentKeyRequirement,
    pub require_resident_key: bool,
}

impl RpConfig {
    /// Builds a configuration with default ceremony policy.
    pub fn new(
        rp_id: impl Into<String>,
        rp_name: impl Into<String>,
        origins: Vec<String>,
    ) -> Result<Self, ConfigError> {
        let rp_id = rp_id.into();
        if rp_id.is_empty() {
            return Err(ConfigError::Invalid("RP ID must not be empty".to_string()));
        }
        if origins.is_empty() || origins.iter().any(|o| o.is_empty()) {
            return Err(ConfigError::Invalid(
                "at least one non-empty origin is required".to_string(),
            ));
        }

        Ok(Self {
            rp_id,
            rp_name: rp_name.into(),
            origins,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            challenge_timeout_secs: DEFAULT_CHALLENGE_TIMEOUT_SECS,
            algorithms: vec![CoseAlgorithm::Es256, CoseAlgorithm::EdDsa, CoseAlgorithm::Rs256],
            user_verification: UserVerificationRequirement::Preferred,
            attestation: AttestationConveyance::None,
            authenticator_attachment: None,
            resident_key: ResidentKeyRequirement::Discouraged,
            require_resident_key: false,
        })
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let origins: Vec<String> = lookup("ORIGIN")
            .ok_or(ConfigError::Missing("ORIGIN"))?
            .split(',')
            .map(|o| o.trim().trim_end_matches('/').to_string())
            .filter(|o| !o.is_empty())
            .collect();

        let primary = origins.first().ok_or(ConfigError::Missing("ORIGIN"))?.clone();

        let rp_id = match lookup("PASSKEY_RP_ID") {
            Some(id) if !id.trim().is_empty() => id.trim().to_string(),
            _ => rp_id_from_origin(&primary)?,
        };

        let rp_name = lookup("PASSKEY_RP_NAME").unwrap_or_else(|| primary.clone());

        let mut config = Self::new(rp_id, rp_name, origins)?;

        config.timeout_secs = parse_secs(&lookup, "PASSKEY_TIMEOUT", DEFAULT_TIMEOUT_SECS);
        config.challenge_timeout_secs = parse_secs(
            &lookup,
            "PASSKEY_CHALLENGE_TIMEOUT",
            DEFAULT_CHALLENGE_TIMEOUT_SECS,
        );

        if let Some(v) = lookup("PASSKEY_ALGORITHMS") {
            let algorithms = parse_algorithms(&v);
            if algorithms.is_empty() {
                tracing::warn!("No usable algorithm in PASSKEY_ALGORITHMS={}. Using defaults", v);
            } else {
                config.algorithms = algorithms;
            }
        }

        if let Some(v) = lookup("PASSKEY_USER_VERIFICATION") {
            config.user_verification = match v.to_lowercase().as_str() {
                "required" => UserVerificationRequirement::Required,
                "preferred" => UserVerificationRequirement::Preferred,
                "discouraged" => UserVerificationRequirement::Discouraged,
                invalid => {
                    tracing::warn!("Invalid user verification: {}. Using default 'preferred'", invalid);
                    UserVerificationRequirement::Preferred
                }
            };
        }

        if let Some(v) = lookup("PASSKEY_ATTESTATION") {
            config.attestation = match v.to_lowercase().as_str() {
                "none" => AttestationConveyance::None,
                "indirect" => AttestationConveyance::Indirect,
                "direct" => AttestationConveyance::Direct,
                "enterprise" => AttestationConveyance::Enterprise,
                invalid => {
                    tracing::warn!("Invalid attestation: {}. Using default 'none'", invalid);
                    AttestationConveyance::None
                }
            };
        }

        if let Some(v) = lookup("PASSKEY_AUTHENTICATOR_ATTACHMENT") {
            config.authenticator_attachment = match v.to_lowercase().as_str() {
                "platform" => Some(AuthenticatorAttachment::Platform),
                "cross-platform" => Some(AuthenticatorAttachment::CrossPlatform),
                "none" | "" => None,
                invalid => {
                    tracing::warn!("Invalid authenticator attachment: {}. Leaving it unset", invalid);
                    None
                }
            };
        }

        if let Some(v) = lookup("PASSKEY_RESIDENT_KEY") {
            config.resident_key = match v.to_lowercase().as_str() {
                "required" => ResidentKeyRequirement::Required,
                "preferred" => ResidentKeyRequirement::Preferred,
                "discouraged" => ResidentKeyRequirement::Discouraged,
                invalid => {
                    tracing::warn!("Invalid resident key: {}. Using default 'discouraged'", invalid);
                    ResidentKeyRequirement::Discouraged
                }
            };
        }

        if let Some(v) = lookup("PASSKEY_REQUIRE_RESIDENT_KEY") {
            config.require_resident_key = match v.to_lowercase().as_str() {
                "true" => true,
                "false" => false,
                invalid => {
                    tracing::warn!("Invalid require_resident_key: {}. Using default 'false'", invalid);
                    false
                }
            };
        }

        tracing::info!(
            "Relying party configured: rp_id={}, origins={:?}, algorithms={:?}",
            config.rp_id,
            config.origins,
            config.algorithms
        );

        Ok(config)
    }

    pub fn primary_origin(&self) -> &str {
        self.origins.first().map(String::as_str).unwrap_or_default()
    }
}

/// Strips scheme, port and path from an origin, the way browsers derive the default RP ID.
fn rp_id_from_origin(origin: &str) -> Result<String, ConfigError> {
    let host = origin
        .trim_start_matches("https://")
        .trim_start_matches("http://")
        .split(['/', ':'])
        .next()
        .unwrap_or_default();

    if host.is_empty() {
        return Err(ConfigError::Invalid(format!(
            "Could not extract RP ID from ORIGIN {origin}"
        )));
    }
    Ok(host.to_string())
}

fn parse_secs<F>(lookup: &F, key: &str, default: u32) -> u32
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => default,
        Some(v) => match v.parse::<u32>() {
            Ok(secs) if secs > 0 => secs,
            _ => {
                tracing::warn!("Invalid {}: {}. Using default {}", key, v, default);
                default
            }
        },
    }
}

fn parse_algorithms(value: &str) -> Vec<CoseAlgorithm> {
    let mut algorithms = Vec::new();
    for name in value.split(',').map(str::trim).filter(|n| !n.is_empty()) {
        match CoseAlgorithm::from_name(name) {
            Some(alg) if !algorithms.contains(&alg) => algorithms.push(alg),
            Some(_) => {}
            None => tracing::warn!("Ignoring unknown algorithm in PASSKEY_ALGORITHMS: {}", name),
        }
    }
    algorithms
}
