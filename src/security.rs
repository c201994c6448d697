// security.rs
//! Leaf checks used to authenticate inbound webhook calls.
//!
//! Every function here is pure: no clock reads, no environment lookups and no
//! logging of secret material. The composition lives in [`crate::webhook`].

use std::collections::BTreeSet;

use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use tracing::warn;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_PREFIX: &str = "sha256=";

/// Compares a received shared secret against the expected one in constant time.
///
/// Returns `false` when either side is missing. A missing `expected` value is a
/// deployment problem rather than a bad request, so it is reported as a warning.
pub fn compare_secret(received: Option<&str>, expected: Option<&str>) -> bool {
    let Some(expected) = expected else {
        warn!("webhook secret is not configured; secret comparison cannot succeed");
        return false;
    };
    let Some(received) = received else {
        return false;
    };

    constant_time_eq(received.as_bytes(), expected.as_bytes())
}

// Length is not secret; content comparison runs over every byte.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && bool::from(a.ct_eq(b))
}

/// HMAC-SHA256 of `raw_body` under `key`, as lowercase hex.
///
/// An empty string is returned if the key is rejected; it never verifies.
pub fn sign(raw_body: &[u8], key: &str) -> String {
    let mut mac = match HmacSha256::new_from_slice(key.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return String::new(),
    };
    mac.update(raw_body);
    hex::encode(mac.finalize().into_bytes())
}

/// Verifies a received `x-hub-signature-256` value against the raw body.
///
/// The `sha256=` prefix is optional. Anything that is not valid hex, or decodes
/// to the wrong length, verifies as `false`.
pub fn verify_signature(raw_body: &[u8], received: Option<&str>, key: &str) -> bool {
    let Some(received) = received else {
        return false;
    };
    let received = received.trim();
    let received = received.strip_prefix(SIGNATURE_PREFIX).unwrap_or(received);

    let received = match hex::decode(received) {
        Ok(bytes) => bytes,
        Err(_) => return false,
    };

    let mut mac = match HmacSha256::new_from_slice(key.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return false,
    };
    mac.update(raw_body);

    // Constant-time comparison
    mac.verify_slice(&received).is_ok()
}

/// Result of checking a declared request timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    Fresh,
    /// Older than the window, or dated in the future.
    Stale,
    Malformed,
}

/// Classifies `timestamp` (epoch seconds) relative to `now`.
///
/// Fresh iff `0 <= now - timestamp <= max_age_seconds`.
pub fn check_freshness(timestamp: &str, max_age_seconds: u64, now: i64) -> Freshness {
    let timestamp: i64 = match timestamp.trim().parse() {
        Ok(ts) => ts,
        Err(_) => return Freshness::Malformed,
    };

    let age = i128::from(now) - i128::from(timestamp);
    if (0..=i128::from(max_age_seconds)).contains(&age) {
        Freshness::Fresh
    } else {
        Freshness::Stale
    }
}

pub fn is_fresh(timestamp: &str, max_age_seconds: u64, now: i64) -> bool {
    check_freshness(timestamp, max_age_seconds, now) == Freshness::Fresh
}

/// Exact-match allow-list test. An empty list allows everyone.
pub fn is_allowed(client_ip: Option<&str>, allow_list: &BTreeSet<String>) -> bool {
    if allow_list.is_empty() {
        return true;
    }
    match client_ip {
        Some(ip) => allow_list.contains(ip),
        None => false,
    }
}
