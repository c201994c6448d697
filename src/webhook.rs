// webhook.rs
use std::collections::BTreeSet;
use std::fmt;

use axum::body::Bytes;
use axum::http::HeaderMap;
use chrono::Utc;
use tracing::{debug, warn};

use crate::security::{self, Freshness};

pub const SECRET_HEADER: &str = "x-webhook-secret";
pub const SIGNATURE_HEADER: &str = "x-hub-signature-256";
pub const TIMESTAMP_HEADER: &str = "x-webhook-timestamp";
pub const FORWARDED_FOR_HEADER: &str = "x-forwarded-for";
pub const REAL_IP_HEADER: &str = "x-real-ip";

pub const DEFAULT_MAX_AGE_SECONDS: u64 = 300;

/// An inbound webhook call as received, before any parsing of the body.
#[derive(Debug, Clone)]
pub struct WebhookRequest {
    headers: HeaderMap,
    raw_body: Bytes,
}

impl WebhookRequest {
    pub fn new(headers: HeaderMap, raw_body: impl Into<Bytes>) -> Self {
        Self {
            headers,
            raw_body: raw_body.into(),
        }
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn raw_body(&self) -> &[u8] {
        &self.raw_body
    }

    /// Header value by name. Values that are not visible ASCII read as empty,
    /// so they still count as present.
    fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(name)
            .map(|value| value.to_str().unwrap_or_default())
    }

    /// Client IP from `x-forwarded-for`, then `x-real-ip`. The whole trimmed
    /// header value is used, so a proxy chain never matches a single allowed IP.
    pub fn client_ip(&self) -> Option<&str> {
        let forwarded = self.header(FORWARDED_FOR_HEADER).map(str::trim);
        let real_ip = self.header(REAL_IP_HEADER).map(str::trim);

        [forwarded, real_ip]
            .into_iter()
            .flatten()
            .find(|ip| !ip.is_empty())
    }
}

#[derive(Clone, Default)]
pub struct SecurityConfig {
    pub secret: Option<String>,
    pub allowed_ips: BTreeSet<String>,
    pub max_age_seconds: u64,
    pub require_signature: bool,
    pub require_timestamp: bool,
}

impl SecurityConfig {
    pub fn new(secret: Option<String>) -> Self {
        Self {
            secret: secret.filter(|s| !s.is_empty()),
            max_age_seconds: DEFAULT_MAX_AGE_SECONDS,
            ..Self::default()
        }
    }

    pub fn with_allowed_ips<I, S>(mut self, ips: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_ips = ips.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_max_age(mut self, seconds: u64) -> Self {
        self.max_age_seconds = seconds;
        self
    }

    pub fn strict(mut self) -> Self {
        self.require_signature = true;
        self.require_timestamp = true;
        self
    }

    /// No secret configured: secret and signature enforcement are off.
    pub fn is_degraded(&self) -> bool {
        self.secret.is_none()
    }
}

impl fmt::Debug for SecurityConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecurityConfig")
            .field("secret", &self.secret.as_ref().map(|_| "<REDACTED>"))
            .field("allowed_ips", &self.allowed_ips)
            .field("max_age_seconds", &self.max_age_seconds)
            .field("require_signature", &self.require_signature)
            .field("require_timestamp", &self.require_timestamp)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    MissingSecret,
    SecretMismatch,
    MissingOrInvalidSignature,
    TimestampTooOld,
    TimestampMalformed,
    IpNotAllowed,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            RejectReason::MissingSecret => "missing webhook secret",
            RejectReason::SecretMismatch => "invalid webhook secret",
            RejectReason::MissingOrInvalidSignature => "missing or invalid HMAC signature",
            RejectReason::TimestampTooOld => "webhook timestamp outside freshness window",
            RejectReason::TimestampMalformed => "missing or malformed webhook timestamp",
            RejectReason::IpNotAllowed => "IP not allowed",
        };
        f.write_str(reason)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationOutcome {
    Accepted,
    Rejected(RejectReason),
}

impl ValidationOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, ValidationOutcome::Accepted)
    }
}

#[derive(Debug, Clone)]
pub struct WebhookValidator {
    config: SecurityConfig,
}

impl WebhookValidator {
    pub fn new(config: SecurityConfig) -> Self {
        if config.is_degraded() {
            warn!("No webhook secret configured, accepting unauthenticated webhooks");
        }
        Self { config }
    }

    pub fn config(&self) -> &SecurityConfig {
        &self.config
    }

    pub fn validate(&self, request: &WebhookRequest) -> ValidationOutcome {
        self.validate_at(request, Utc::now().timestamp())
    }

    /// Runs secret, signature, timestamp and origin checks in that order and
    /// reports the first failure.
    pub fn validate_at(&self, request: &WebhookRequest, now: i64) -> ValidationOutcome {
        match self.check(request, now) {
            Ok(()) => ValidationOutcome::Accepted,
            Err(reason) => {
                warn!("Rejected webhook: {}", reason);
                ValidationOutcome::Rejected(reason)
            }
        }
    }

    fn check(&self, request: &WebhookRequest, now: i64) -> Result<(), RejectReason> {
        let config = &self.config;

        if let Some(expected) = config.secret.as_deref() {
            match request.header(SECRET_HEADER) {
                None => return Err(RejectReason::MissingSecret),
                Some(received) => {
                    if !security::compare_secret(Some(received), Some(expected)) {
                        return Err(RejectReason::SecretMismatch);
                    }
                }
            }

            let signature = request.header(SIGNATURE_HEADER);
            if (signature.is_some() || config.require_signature)
                && !security::verify_signature(request.raw_body(), signature, expected)
            {
                return Err(RejectReason::MissingOrInvalidSignature);
            }
        } else {
            debug!("Skipping secret and signature checks (no secret configured)");
        }

        match request.header(TIMESTAMP_HEADER) {
            Some(timestamp) => {
                match security::check_freshness(timestamp, config.max_age_seconds, now) {
                    Freshness::Fresh => {}
                    Freshness::Stale => return Err(RejectReason::TimestampTooOld),
                    Freshness::Malformed => return Err(RejectReason::TimestampMalformed),
                }
            }
            None if config.require_timestamp => return Err(RejectReason::TimestampMalformed),
            None => {}
        }

        if !config.allowed_ips.is_empty()
            && !security::is_allowed(request.client_ip(), &config.allowed_ips)
        {
            return Err(RejectReason::IpNotAllowed);
        }

        Ok(())
    }
}

/// One-shot validation against `config` at time `now`.
pub fn validate(
    request: &WebhookRequest,
    config: &SecurityConfig,
    now: i64,
) -> ValidationOutcome {
    WebhookValidator {
        config: config.clone(),
    }
    .validate_at(request, now)
}
