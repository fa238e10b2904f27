//! TOML-driven editor configuration.
//!
//! ```toml
//! max_root_rules = 5
//! dependency_timeout_ms = 30000
//!
//! [api]
//! base_url = "https://api.example.com/v1"
//! request_timeout_secs = 30
//! token_env = "QUORUM_API_TOKEN"
//! ```
//!
//! Every key is optional; missing keys take the defaults below.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use quorum_contracts::error::{QuorumError, QuorumResult};

/// Default bound on how long a node waits for its parent's server id.
pub const DEFAULT_DEPENDENCY_TIMEOUT_MS: u64 = 30_000;

/// Default per-request timeout for the HTTP client.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Settings shared by the forest, the submitter, and the API client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EditorConfig {
    /// Upper bound on root-level policies. `None` means unlimited.
    pub max_root_rules: Option<usize>,
    /// How long a create/update may wait for its parent to resolve.
    pub dependency_timeout_ms: u64,
    /// Remote service settings.
    pub api: ApiConfig,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            max_root_rules: None,
            dependency_timeout_ms: DEFAULT_DEPENDENCY_TIMEOUT_MS,
            api: ApiConfig::default(),
        }
    }
}

/// Where and how to reach the policy service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ApiConfig {
    pub base_url: String,
    pub request_timeout_secs: u64,
    /// Name of the environment variable holding a bearer token, if any.
    pub token_env: Option<String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            token_env: None,
        }
    }
}

impl EditorConfig {
    /// Parse `s` as TOML.
    ///
    /// Returns `QuorumError::ConfigError` if the TOML is malformed, names an
    /// unknown key, or sets a zero timeout.
    pub fn from_toml_str(s: &str) -> QuorumResult<Self> {
        let config: EditorConfig = toml::from_str(s).map_err(|e| QuorumError::ConfigError {
            reason: format!("failed to parse editor config TOML: {}", e),
        })?;
        config.check()?;
        Ok(config)
    }

    /// Read and parse the file at `path`.
    pub fn from_file(path: &Path) -> QuorumResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| QuorumError::ConfigError {
            reason: format!("failed to read editor config '{}': {}", path.display(), e),
        })?;
        Self::from_toml_str(&contents)
    }

    pub fn dependency_timeout(&self) -> Duration {
        Duration::from_millis(self.dependency_timeout_ms)
    }

    fn check(&self) -> QuorumResult<()> {
        if self.dependency_timeout_ms == 0 {
            return Err(QuorumError::ConfigError {
                reason: "dependency_timeout_ms must be greater than zero".to_string(),
            });
        }
        if self.api.request_timeout_secs == 0 {
            return Err(QuorumError::ConfigError {
                reason: "api.request_timeout_secs must be greater than zero".to_string(),
            });
        }
        if self.api.base_url.trim().is_empty() {
            return Err(QuorumError::ConfigError {
                reason: "api.base_url must not be empty".to_string(),
            });
        }
        Ok(())
    }
}

impl ApiConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// The bearer token named by `token_env`, if the variable is set.
    pub fn bearer_token(&self) -> Option<String> {
        self.token_env
            .as_deref()
            .and_then(|name| std::env::var(name).ok())
            .filter(|token| !token.is_empty())
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────
