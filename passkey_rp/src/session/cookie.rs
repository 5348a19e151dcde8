//! Challenge-handle transport between begin and finish.
//!
//! The handle travels in an HttpOnly cookie as `<handle>.<tag>`, where the tag is an
//! HMAC-SHA256 over the handle under a server-side key. A cookie whose tag does not
//! verify is treated like a missing one.

use headers::HeaderMapExt;
use hmac::{Hmac, Mac};
use http::HeaderMap;
use sha2::Sha256;

use crate::config::ConfigError;
use crate::passkey::ChallengeHandle;
use crate::utils::{UtilError, base64url_decode, base64url_encode, gen_random_bytes, header_set_cookie};

type HmacSha256 = Hmac<Sha256>;

pub const DEFAULT_SESSION_COOKIE_NAME: &str = "__Host-PasskeyCeremony";
const MIN_SECRET_LEN: usize = 32;

#[derive(Clone)]
pub struct SessionCookie {
    name: String,
    key: Vec<u8>,
    max_age_secs: u32,
}

impl std::fmt::Debug for SessionCookie {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionCookie")
            .field("name", &self.name)
            .field("max_age_secs", &self.max_age_secs)
            .finish_non_exhaustive()
    }
}

impl SessionCookie {
    pub fn new(name: impl Into<String>, key: Vec<u8>, max_age_secs: u32) -> Self {
        Self {
            name: name.into(),
            key,
            max_age_secs,
        }
    }

    pub fn from_env(max_age_secs: u32) -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok(), max_age_secs)
    }

    /// Reads `SESSION_COOKIE_NAME` and `SESSION_SECRET` (base64url).
    ///
    /// Without a secret a random per-process key is used, so cookies do not survive a restart.
    pub fn from_lookup<F>(lookup: F, max_age_secs: u32) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let name = lookup("SESSION_COOKIE_NAME")
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| DEFAULT_SESSION_COOKIE_NAME.to_string());

        let key = match lookup("SESSION_SECRET") {
            Some(secret) => {
                let key = base64url_decode(secret.trim())
                    .map_err(|_| ConfigError::Invalid("SESSION_SECRET is not base64url".to_string()))?;
                if key.len() < MIN_SECRET_LEN {
                    return Err(ConfigError::Invalid(format!(
                        "SESSION_SECRET must decode to at least {MIN_SECRET_LEN} bytes"
                    )));
                }
                key
            }
            None => {
                tracing::warn!("SESSION_SECRET not set. Using a random key for this process");
                gen_random_bytes(MIN_SECRET_LEN).map_err(|e| ConfigError::Invalid(e.to_string()))?
            }
        };

        Ok(Self::new(name, key, max_age_secs))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn mac(&self) -> Result<HmacSha256, UtilError> {
        HmacSha256::new_from_slice(&self.key)
            .map_err(|_| UtilError::Crypto("Invalid HMAC key".to_string()))
    }

    /// Cookie value for `handle`.
    pub fn seal(&self, handle: &ChallengeHandle) -> Result<String, UtilError> {
        let mut mac = self.mac()?;
        mac.update(handle.as_str().as_bytes());
        let tag = mac.finalize().into_bytes();
        Ok(format!("{}.{}", handle, base64url_encode(&tag)))
    }

    /// Recovers the handle from a cookie value if its tag verifies.
    pub fn open(&self, value: &str) -> Option<ChallengeHandle> {
        let (handle, tag) = value.rsplit_once('.')?;
        if handle.is_empty() {
            return None;
        }
        let tag = base64url_decode(tag).ok()?;
        let mut mac = self.mac().ok()?;
        mac.update(handle.as_bytes());
        match mac.verify_slice(&tag) {
            Ok(()) => Some(ChallengeHandle::from(handle.to_string())),
            Err(_) => {
                tracing::debug!("Session cookie tag does not verify");
                None
            }
        }
    }

    pub fn set_header(&self, headers: &mut HeaderMap, handle: &ChallengeHandle) -> Result<(), UtilError> {
        let value = self.seal(handle)?;
        header_set_cookie(headers, &self.name, &value, i64::from(self.max_age_secs))
    }

    pub fn clear_header(&self, headers: &mut HeaderMap) -> Result<(), UtilError> {
        header_set_cookie(headers, &self.name, "", 0)
    }

    /// Extracts and verifies the handle carried by the request's `Cookie` header.
    pub fn handle_from_headers(&self, headers: &HeaderMap) -> Option<ChallengeHandle> {
        let cookies = headers.typed_get::<headers::Cookie>()?;
        let Some(value) = cookies.get(&self.name) else {
            tracing::debug!("No session cookie '{}' found in cookies", self.name);
            return None;
        };
        self.open(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::header::{COOKIE, SET_COOKIE};
    use std::collections::HashMap;

    fn cookie() -> SessionCookie {
        SessionCookie::new("sid", vec![7; 32], 60)
    }

    fn handle() -> ChallengeHandle {
        ChallengeHandle::from("aGFuZGxl".to_string())
    }

    #[test]
    fn test_seal_then_open() {
        let c = cookie();
        let sealed = c.seal(&handle()).unwrap();
        assert!(sealed.starts_with("aGFuZGxl."));
        assert_eq!(c.open(&sealed), Some(handle()));
    }

    #[test]
    fn test_tampered_values_are_rejected() {
        let c = cookie();
        let sealed = c.seal(&handle()).unwrap();
        let (_, tag) = sealed.rsplit_once('.').unwrap();

        assert_eq!(c.open(&format!("aGFuZGxm.{tag}")), None);
        assert_eq!(c.open("aGFuZGxl"), None);
        assert_eq!(c.open(&format!(".{tag}")), None);
        assert_eq!(c.open("aGFuZGxl.AAAA"), None);

        let other = SessionCookie::new("sid", vec![8; 32], 60);
        assert_eq!(other.open(&sealed), None);
    }

    #[test]
    fn test_set_header_and_read_back() {
        let c = cookie();
        let mut response = HeaderMap::new();
        c.set_header(&mut response, &handle()).unwrap();

        let set_cookie = response.get(SET_COOKIE).unwrap().to_str().unwrap();
        assert!(set_cookie.contains("HttpOnly"));
        assert!(set_cookie.contains("SameSite=Lax"));
        assert!(set_cookie.contains("Max-Age=60"));
        let pair = set_cookie.split(';').next().unwrap();

        let mut request = HeaderMap::new();
        request.insert(COOKIE, format!("other=1; {pair}").parse().unwrap());
        assert_eq!(c.handle_from_headers(&request), Some(handle()));
    }

    #[test]
    fn test_missing_cookie() {
        let c = cookie();
        assert_eq!(c.handle_from_headers(&HeaderMap::new()), None);

        let mut request = HeaderMap::new();
        request.insert(COOKIE, "other=1".parse().unwrap());
        assert_eq!(c.handle_from_headers(&request), None);
    }

    #[test]
    fn test_clear_header_expires_cookie() {
        let mut response = HeaderMap::new();
        cookie().clear_header(&mut response).unwrap();
        let set_cookie = response.get(SET_COOKIE).unwrap().to_str().unwrap();
        assert!(set_cookie.starts_with("sid=;"));
        assert!(set_cookie.contains("Max-Age=0"));
    }

    #[test]
    fn test_from_lookup() {
        let secret = base64url_encode(&[1u8; 32]);
        let map: HashMap<&str, String> = HashMap::from([
            ("SESSION_COOKIE_NAME", "ceremony".to_string()),
            ("SESSION_SECRET", secret),
        ]);
        let c = SessionCookie::from_lookup(|k| map.get(k).cloned(), 90).unwrap();
        assert_eq!(c.name(), "ceremony");
        assert_eq!(c.key, vec![1u8; 32]);

        let defaulted = SessionCookie::from_lookup(|_| None, 90).unwrap();
        assert_eq!(defaulted.name(), DEFAULT_SESSION_COOKIE_NAME);
        assert_eq!(defaulted.key.len(), 32);

        let short = SessionCookie::from_lookup(
            |k| (k == "SESSION_SECRET").then(|| "AAAA".to_string()),
            90,
        );
        assert!(matches!(short, Err(ConfigError::Invalid(_))));
    }
}
