use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use http::header::{HeaderMap, SET_COOKIE};
use ring::digest;
use ring::rand::SecureRandom;
use subtle::{Choice, ConstantTimeEq};
use thiserror::Error;

#[derive(Debug, Error, Clone)]
pub enum UtilError {
    #[error("Crypto error: {0}")]
    Crypto(String),

    #[error("Cookie error: {0}")]
    Cookie(String),

    #[error("Invalid format: {0}")]
    Format(String),
}

pub(crate) fn base64url_decode(input: &str) -> Result<Vec<u8>, UtilError> {
    URL_SAFE_NO_PAD
        .decode(input.trim_end_matches('='))
        .map_err(|_| UtilError::Format("Failed to decode base64url".to_string()))
}

pub(crate) fn base64url_encode(input: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(input)
}

pub(crate) fn gen_random_bytes(len: usize) -> Result<Vec<u8>, UtilError> {
    let rng = ring::rand::SystemRandom::new();
    let mut buf = vec![0u8; len];
    rng.fill(&mut buf)
        .map_err(|_| UtilError::Crypto("Failed to generate random bytes".to_string()))?;
    Ok(buf)
}

pub(crate) fn gen_random_string(len: usize) -> Result<String, UtilError> {
    Ok(base64url_encode(&gen_random_bytes(len)?))
}

pub(crate) fn sha256(data: &[u8]) -> Vec<u8> {
    digest::digest(&digest::SHA256, data).as_ref().to_vec()
}

/// Byte comparison whose running time does not depend on where the inputs differ.
///
/// Only the lengths are compared in variable time.
pub(crate) fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.ct_eq(b).into()
}

/// Checks `candidate` against every entry without stopping at the first match.
pub(crate) fn constant_time_contains<S: AsRef<[u8]>>(candidate: &[u8], allowed: &[S]) -> bool {
    let mut found = Choice::from(0u8);
    for entry in allowed {
        found |= candidate.ct_eq(entry.as_ref());
    }
    found.into()
}

pub(crate) fn header_set_cookie(
    headers: &mut HeaderMap,
    name: &str,
    value: &str,
    max_age: i64,
) -> Result<(), UtilError> {
    let cookie = format!("{name}={value}; SameSite=Lax; Secure; HttpOnly; Path=/; Max-Age={max_age}");
    tracing::trace!("Set-Cookie: {}", name);
    headers.append(
        SET_COOKIE,
        cookie
            .parse()
            .map_err(|_| UtilError::Cookie("Failed to parse cookie".to_string()))?,
    );
    Ok(())
}

/// Serde adapter that writes byte strings as unpadded base64url.
pub(crate) mod serde_base64url {
    use serde::{Deserialize, Deserializer, Serializer};

    pub(crate) fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::base64url_encode(bytes))
    }

    pub(crate) fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        super::base64url_decode(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::hint::black_box;
    use std::time::Instant;

    #[test]
    fn test_base64url_roundtrip_without_padding() {
        let data = b"\x00\xffpasskey?";
        let encoded = base64url_encode(data);
        assert!(!encoded.contains('='));
        assert!(!encoded.contains('+') && !encoded.contains('/'));
        assert_eq!(base64url_decode(&encoded).unwrap(), data.to_vec());
    }

    #[test]
    fn test_base64url_decode_tolerates_trailing_padding() {
        assert_eq!(base64url_decode("YQ==").unwrap(), b"a".to_vec());
    }

    #[test]
    fn test_base64url_decode_rejects_garbage() {
        let err = base64url_decode("***").unwrap_err();
        assert!(matches!(err, UtilError::Format(_)));
    }

    #[test]
    fn test_gen_random_bytes_length_and_uniqueness() {
        let a = gen_random_bytes(32).unwrap();
        let b = gen_random_bytes(32).unwrap();
        assert_eq!(a.len(), 32);
        assert_ne!(a, b);
    }

    #[test]
    fn test_sha256_known_vector() {
        let hash = sha256(b"abc");
        assert_eq!(
            base64url_encode(&hash),
            "ungWv48Bz-pBQUDeXa4iI7ADYaOWF3qctBD_YfIAFa0"
        );
    }

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq(b"origin", b"origin"));
        assert!(!constant_time_eq(b"origin", b"Origin"));
        assert!(!constant_time_eq(b"origin", b"origin2"));
        assert!(!constant_time_eq(b"", b"x"));
    }

    #[test]
    fn test_constant_time_contains_scans_all_entries() {
        let allowed = vec!["https://a.example".to_string(), "https://b.example".to_string()];
        assert!(constant_time_contains(b"https://b.example", &allowed));
        assert!(!constant_time_contains(b"https://c.example", &allowed));
        let empty: Vec<String> = Vec::new();
        assert!(!constant_time_contains(b"https://a.example", &empty));
    }

    /// Median time of `a` and of `b`, sampled alternately.
    fn median_nanos_pair(mut a: impl FnMut() -> bool, mut b: impl FnMut() -> bool) -> (u128, u128) {
        const SAMPLES: usize = 301;
        let mut ta = Vec::with_capacity(SAMPLES);
        let mut tb = Vec::with_capacity(SAMPLES);
        for _ in 0..SAMPLES {
            let start = Instant::now();
            black_box(a());
            ta.push(start.elapsed().as_nanos());

            let start = Instant::now();
            black_box(b());
            tb.push(start.elapsed().as_nanos());
        }
        ta.sort_unstable();
        tb.sort_unstable();
        (ta[SAMPLES / 2].max(1), tb[SAMPLES / 2].max(1))
    }

    fn assert_similar(label: &str, (a, b): (u128, u128)) {
        let ratio = a.max(b) as f64 / a.min(b) as f64;
        assert!(ratio < 3.0, "{label}: {a}ns vs {b}ns");
    }

    #[test]
    fn test_constant_time_eq_timing_ignores_mismatch_position() {
        // Large enough that an early exit would differ by orders of magnitude
        let expected = vec![0x5au8; 16 * 1024];
        let mut first_differs = expected.clone();
        first_differs[0] ^= 1;
        let mut last_differs = expected.clone();
        *last_differs.last_mut().unwrap() ^= 1;

        let timings = median_nanos_pair(
            || constant_time_eq(black_box(&first_differs), black_box(&expected)),
            || constant_time_eq(black_box(&last_differs), black_box(&expected)),
        );
        assert_similar("first vs last byte mismatch", timings);
    }

    #[test]
    fn test_constant_time_contains_timing_ignores_match_position() {
        let allowed: Vec<Vec<u8>> = (0..64u8)
            .map(|i| {
                let mut entry = vec![0x5au8; 1024];
                entry[0] = i;
                entry
            })
            .collect();
        let first = allowed[0].clone();
        let last = allowed[63].clone();

        let timings = median_nanos_pair(
            || constant_time_contains(black_box(&first), black_box(&allowed)),
            || constant_time_contains(black_box(&last), black_box(&allowed)),
        );
        assert_similar("first vs last entry match", timings);
    }

    #[test]
    fn test_header_set_cookie_attributes() {
        let mut headers = HeaderMap::new();
        header_set_cookie(&mut headers, "sid", "abc", 60).unwrap();
        let value = headers.get(SET_COOKIE).unwrap().to_str().unwrap();
        assert!(value.starts_with("sid=abc;"));
        assert!(value.contains("HttpOnly"));
        assert!(value.contains("Secure"));
        assert!(value.contains("Max-Age=60"));
    }

    #[test]
    fn test_header_set_cookie_rejects_invalid_value() {
        let mut headers = HeaderMap::new();
        let err = header_set_cookie(&mut headers, "sid", "bad\nvalue", 60).unwrap_err();
        assert!(matches!(err, UtilError::Cookie(_)));
    }
}
