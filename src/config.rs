//! Layered configuration: a TOML file merged with `AUTOEVAL_*` environment
//! variables. Credentials are the only required section; everything else has
//! deployment defaults.

use anyhow::{Context, Result};
use figment::Figment;
use figment::providers::{Env, Format, Toml};
use serde::Deserialize;
use std::path::Path;

use crate::portal::auth::Credential;

#[derive(Debug, Deserialize)]
pub struct Config {
    /// School identifier and password; missing values are a fatal startup
    /// error, before any network activity.
    pub credentials: Credential,

    /// Previously captured `Cookie` header (`name=value; name=value`). When
    /// set, the run probes the cookies for liveness and skips the handshake
    /// if they still work.
    #[serde(default)]
    pub cookies: Option<String>,

    /// Academic system base URL.
    #[serde(default = "default_portal_base")]
    pub portal_base: String,
    /// Identity provider base URL.
    #[serde(default = "default_auth_base")]
    pub auth_base: String,

    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Bounds of the randomized pause between a save and the next harvest,
    /// in seconds. Keeps the portal's abuse-rate defenses quiet.
    #[serde(default = "default_delay_min_secs")]
    pub delay_min_secs: f64,
    #[serde(default = "default_delay_max_secs")]
    pub delay_max_secs: f64,
    /// Bounded retry count for the transport's backoff decorator.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

fn default_portal_base() -> String {
    "https://jwxt.sztu.edu.cn".to_string()
}

fn default_auth_base() -> String {
    "https://auth.sztu.edu.cn".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_timeout_secs() -> u64 {
    15
}

fn default_delay_min_secs() -> f64 {
    2.0
}

fn default_delay_max_secs() -> f64 {
    5.0
}

fn default_max_retries() -> u32 {
    3
}

impl Config {
    /// Load from the given TOML file (if present) merged with environment
    /// variables: `AUTOEVAL_CREDENTIALS__USERNAME`, `AUTOEVAL_LOG_LEVEL`, ...
    pub fn load(path: &Path) -> Result<Self> {
        Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed("AUTOEVAL_").split("__"))
            .extract()
            .context("failed to load config")
    }
}
