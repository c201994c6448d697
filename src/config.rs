// config.rs
use std::collections::BTreeSet;
use std::fmt;

use anyhow::Result;
use serde::Deserialize;

use crate::webhook::{SecurityConfig, DEFAULT_MAX_AGE_SECONDS};

const ENV_PREFIX: &str = "APP";

#[derive(Clone, Deserialize)]
pub struct Config {
    pub webhook_secret: Option<String>,
    #[serde(default = "default_max_age")]
    pub webhook_max_age_seconds: u64,
    #[serde(default)]
    pub webhook_allowed_ips: String,
    #[serde(default)]
    pub webhook_require_signature: bool,
    #[serde(default)]
    pub webhook_require_timestamp: bool,
    pub backend_webhook_url: Option<String>,
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
}

fn default_max_age() -> u64 {
    DEFAULT_MAX_AGE_SECONDS
}

fn default_bind_address() -> String {
    "0.0.0.0:3000".to_string()
}

impl Config {
    /// Reads `APP_*` variables from the process environment.
    pub fn load() -> Result<Self> {
        Self::from_source(::config::Environment::with_prefix(ENV_PREFIX))
    }

    /// Same as [`Config::load`] but over an explicit variable map.
    pub fn from_vars<I, K, V>(vars: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let vars: ::config::Map<String, String> = vars
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        Self::from_source(::config::Environment::with_prefix(ENV_PREFIX).source(Some(vars)))
    }

    fn from_source(env: ::config::Environment) -> Result<Self> {
        let config: Config = ::config::Config::builder()
            .add_source(env)
            .build()?
            .try_deserialize()?;
        config.check()?;
        Ok(config)
    }

    fn check(&self) -> Result<()> {
        if self.webhook_require_signature && self.secret().is_none() {
            anyhow::bail!("APP_WEBHOOK_REQUIRE_SIGNATURE is set but APP_WEBHOOK_SECRET is not");
        }
        Ok(())
    }

    fn secret(&self) -> Option<&str> {
        self.webhook_secret.as_deref().filter(|s| !s.is_empty())
    }

    pub fn allowed_ips(&self) -> BTreeSet<String> {
        self.webhook_allowed_ips
            .split(',')
            .map(str::trim)
            .filter(|ip| !ip.is_empty())
            .map(str::to_string)
            .collect()
    }

    pub fn backend_url(&self) -> Option<&str> {
        self.backend_webhook_url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
    }

    pub fn security(&self) -> SecurityConfig {
        let mut security = SecurityConfig::new(self.secret().map(str::to_string))
            .with_allowed_ips(self.allowed_ips())
            .with_max_age(self.webhook_max_age_seconds);
        security.require_signature = self.webhook_require_signature;
        security.require_timestamp = self.webhook_require_timestamp;
        security
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("webhook_secret", &self.secret().map(|_| "<REDACTED>"))
            .field("webhook_max_age_seconds", &self.webhook_max_age_seconds)
            .field("webhook_allowed_ips", &self.webhook_allowed_ips)
            .field("webhook_require_signature", &self.webhook_require_signature)
            .field("webhook_require_timestamp", &self.webhook_require_timestamp)
            .field("backend_webhook_url", &self.backend_webhook_url)
            .field("bind_address", &self.bind_address)
            .finish()
    }
}
