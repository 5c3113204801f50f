//! `EngineConfig` — the process-wide, immutable configuration surface (§6,
//! §5 "Shared configuration"). Loaded once at startup; never mutated
//! afterward.

use std::path::Path;
use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{JitError, JitResult};
use crate::ids::ScopeId;

/// The recognized configuration surface (§6 table).
///
/// Deserializes from TOML with kebab-case keys. Malformed or out-of-range
/// configuration fails fast with `JitError::ConfigError` at construction
/// time — see `EngineConfig::validate`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct EngineConfig {
    /// Root of the analyzer search: `organizations/<id>` | `folders/<id>`
    /// | `projects/<id>`.
    pub scope: String,

    /// Optional resource-manager query; if present, `listProjects` uses
    /// search rather than policy analysis.
    #[serde(default)]
    pub project_query: Option<String>,

    #[serde(default = "default_min_activation_duration_secs")]
    pub min_activation_duration_secs: u64,

    #[serde(default = "default_max_activation_duration_secs")]
    pub max_activation_duration_secs: u64,

    #[serde(default = "default_min_reviewers")]
    pub min_reviewers: usize,

    #[serde(default = "default_max_reviewers")]
    pub max_reviewers: usize,

    #[serde(default = "default_max_entitlements_per_jit_request")]
    pub max_entitlements_per_jit_request: usize,

    /// Regular expression the `justification` string must match.
    pub justification_pattern: String,

    /// User-visible hint echoed verbatim on rejection (§7).
    pub justification_hint: String,

    /// Maximum span between a token's `iat` and `exp` (§4.4).
    #[serde(default = "default_token_validity_secs")]
    pub token_validity_secs: u64,

    /// Signing identity; issuer and audience of issued tokens (§4.4).
    pub service_account: String,

    /// If false, notifications are logged instead of sent (§4.5).
    #[serde(default = "default_enable_email")]
    pub enable_email: bool,

    /// HTML template path with `{{PLACEHOLDER}}` fields.
    #[serde(default)]
    pub email_template_path: Option<String>,
}

fn default_min_activation_duration_secs() -> u64 {
    15 * 60
}
fn default_max_activation_duration_secs() -> u64 {
    12 * 60 * 60
}
fn default_min_reviewers() -> usize {
    1
}
fn default_max_reviewers() -> usize {
    5
}
fn default_max_entitlements_per_jit_request() -> usize {
    10
}
fn default_token_validity_secs() -> u64 {
    60 * 60
}
fn default_enable_email() -> bool {
    true
}

impl EngineConfig {
    /// Parse `s` as TOML and validate the result.
    pub fn from_toml_str(s: &str) -> JitResult<Self> {
        let config: EngineConfig = toml::from_str(s)
            .map_err(|e| JitError::ConfigError { reason: format!("failed to parse engine config TOML: {e}") })?;
        config.validate()?;
        Ok(config)
    }

    /// Read the file at `path` and parse it as TOML engine configuration.
    pub fn from_file(path: &Path) -> JitResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| JitError::ConfigError {
            reason: format!("failed to read engine config file '{}': {e}", path.display()),
        })?;
        Self::from_toml_str(&contents)
    }

    /// Parsed form of `scope`.
    pub fn scope_id(&self) -> JitResult<ScopeId> {
        ScopeId::parse(&self.scope)
            .ok_or_else(|| JitError::ConfigError { reason: format!("invalid scope '{}'", self.scope) })
    }

    /// Compiled form of `justification_pattern`.
    pub fn justification_regex(&self) -> JitResult<Regex> {
        Regex::new(&self.justification_pattern).map_err(|e| JitError::ConfigError {
            reason: format!("invalid justification-pattern '{}': {e}", self.justification_pattern),
        })
    }

    pub fn min_activation_duration(&self) -> Duration {
        Duration::from_secs(self.min_activation_duration_secs)
    }
    pub fn max_activation_duration(&self) -> Duration {
        Duration::from_secs(self.max_activation_duration_secs)
    }
    pub fn token_validity(&self) -> Duration {
        Duration::from_secs(self.token_validity_secs)
    }

    /// Validate cross-field invariants on the configuration surface. Runs
    /// once at construction time rather than at first use (§2a).
    fn validate(&self) -> JitResult<()> {
        self.scope_id()?;
        self.justification_regex()?;

        if self.min_activation_duration_secs == 0 {
            return Err(JitError::ConfigError { reason: "min-activation-duration-secs must be > 0".into() });
        }
        if self.min_activation_duration_secs > self.max_activation_duration_secs {
            return Err(JitError::ConfigError {
                reason: "min-activation-duration-secs must be <= max-activation-duration-secs".into(),
            });
        }
        if self.min_reviewers == 0 {
            return Err(JitError::ConfigError { reason: "min-reviewers must be >= 1".into() });
        }
        if self.min_reviewers > self.max_reviewers {
            return Err(JitError::ConfigError { reason: "min-reviewers must be <= max-reviewers".into() });
        }
        if self.max_entitlements_per_jit_request == 0 {
            return Err(JitError::ConfigError { reason: "max-entitlements-per-jit-request must be >= 1".into() });
        }
        if self.token_validity_secs == 0 {
            return Err(JitError::ConfigError { reason: "token-validity-secs must be > 0".into() });
        }
        if self.service_account.trim().is_empty() {
            return Err(JitError::ConfigError { reason: "service-account must not be empty".into() });
        }
        Ok(())
    }
}
