//! Session configuration.
//!
//! # Design
//! Everything needed to open a session lives in one `SessionConfig`: the
//! credentials, the endpoint, the debug switch that enables capture of the
//! last raw request, and transport settings. It can be built in code,
//! deserialized, or read from `EBOEKHOUDEN_*` environment variables.

use std::fmt;
use std::time::Duration;

use serde::Deserialize;

use crate::client::DEFAULT_ENDPOINT;
use crate::error::{Error, Result};

fn default_endpoint() -> String {
    DEFAULT_ENDPOINT.to_string()
}

#[derive(Clone, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    pub username: String,
    pub security_code_1: String,
    pub security_code_2: String,
    /// Keep the last raw request for `Session::last_request` and faults.
    #[serde(default)]
    pub debug: bool,
    /// Whole-request timeout in milliseconds.
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    /// Character ceiling applied to free-text relation searches.
    #[serde(default)]
    pub search_limit: Option<usize>,
}

impl SessionConfig {
    pub fn new(username: &str, security_code_1: &str, security_code_2: &str) -> Self {
        Self {
            endpoint: default_endpoint(),
            username: username.to_string(),
            security_code_1: security_code_1.to_string(),
            security_code_2: security_code_2.to_string(),
            debug: false,
            timeout_ms: None,
            search_limit: None,
        }
    }

    pub fn with_endpoint(mut self, endpoint: &str) -> Self {
        self.endpoint = endpoint.to_string();
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        let millis = timeout.as_nanos().div_ceil(1_000_000);
        self.timeout_ms = Some(u64::try_from(millis).unwrap_or(u64::MAX));
        self
    }

    pub fn with_search_limit(mut self, limit: usize) -> Self {
        self.search_limit = Some(limit);
        self
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }

    /// Read the configuration from the process environment.
    ///
    /// `EBOEKHOUDEN_USERNAME`, `EBOEKHOUDEN_SECURITY_CODE_1` and
    /// `EBOEKHOUDEN_SECURITY_CODE_2` are required; `EBOEKHOUDEN_ENDPOINT`,
    /// `EBOEKHOUDEN_DEBUG` and `EBOEKHOUDEN_TIMEOUT_MS` are optional.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let required = |key: &str| {
            lookup(key).ok_or_else(|| Error::Config(format!("{key} is not set")))
        };

        let mut config = Self::new(
            &required("EBOEKHOUDEN_USERNAME")?,
            &required("EBOEKHOUDEN_SECURITY_CODE_1")?,
            &required("EBOEKHOUDEN_SECURITY_CODE_2")?,
        );
        if let Some(endpoint) = lookup("EBOEKHOUDEN_ENDPOINT") {
            config.endpoint = endpoint;
        }
        if let Some(debug) = lookup("EBOEKHOUDEN_DEBUG") {
            config.debug = matches!(debug.trim(), "1" | "true" | "yes");
        }
        if let Some(millis) = lookup("EBOEKHOUDEN_TIMEOUT_MS") {
            let millis = millis
                .trim()
                .parse()
                .map_err(|_| Error::Config(format!("EBOEKHOUDEN_TIMEOUT_MS `{millis}` is not a number")))?;
            config.timeout_ms = Some(millis);
        }
        Ok(config)
    }
}

impl fmt::Debug for SessionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionConfig")
            .field("endpoint", &self.endpoint)
            .field("username", &self.username)
            .field("security_code_1", &"<redacted>")
            .field("security_code_2", &"<redacted>")
            .field("debug", &self.debug)
            .field("timeout_ms", &self.timeout_ms)
            .field("search_limit", &self.search_limit)
            .finish()
    }
}
