//! # Scan Configuration
//!
//! Lifetimes and retry limits for the scan protocol.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     LOYALTY_TOKEN_TTL_SECS=300                                         │
//! │     LOYALTY_SESSION_TTL_SECS=120                                       │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/scan/scan.toml (Linux)                                   │
//! │     ~/Library/Application Support/com.loyalty.scan/scan.toml (macOS)   │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! # scan.toml
//! [tokens]
//! ttl_secs = 300      # how long a displayed QR code stays scannable
//! token_bytes = 32    # random bytes per token, hex encoded
//!
//! [sessions]
//! ttl_secs = 120      # how long the business has to finalize after a scan
//!
//! [finalize]
//! max_stamp_retries = 3
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{debug, info, warn};

use loyalty_core::MIN_TOKEN_BYTES;

use crate::error::{ScanError, ScanResult};

/// Largest token the issuer will generate.
const MAX_TOKEN_BYTES: usize = 64;

/// Longest token or session lifetime accepted from configuration (one year).
const MAX_TTL_SECS: u64 = 365 * 24 * 60 * 60;

// =============================================================================
// Token Settings
// =============================================================================

/// Issuer settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenSettings {
    /// Default token lifetime (seconds) when the caller gives none.
    #[serde(default = "default_token_ttl")]
    pub ttl_secs: u64,

    /// Random bytes per token. The string is twice as long (hex).
    #[serde(default = "default_token_bytes")]
    pub token_bytes: usize,
}

fn default_token_ttl() -> u64 {
    300
}

fn default_token_bytes() -> usize {
    32
}

impl Default for TokenSettings {
    fn default() -> Self {
        TokenSettings {
            ttl_secs: default_token_ttl(),
            token_bytes: default_token_bytes(),
        }
    }
}

// =============================================================================
// Session Settings
// =============================================================================

/// Resolver settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSettings {
    /// Window between claim and finalize (seconds).
    #[serde(default = "default_session_ttl")]
    pub ttl_secs: u64,
}

fn default_session_ttl() -> u64 {
    120
}

impl Default for SessionSettings {
    fn default() -> Self {
        SessionSettings {
            ttl_secs: default_session_ttl(),
        }
    }
}

// =============================================================================
// Finalize Settings
// =============================================================================

/// Finalizer settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinalizeSettings {
    /// Read-plan-write cycles before giving up with `CONFLICT`.
    #[serde(default = "default_max_stamp_retries")]
    pub max_stamp_retries: u32,
}

fn default_max_stamp_retries() -> u32 {
    3
}

impl Default for FinalizeSettings {
    fn default() -> Self {
        FinalizeSettings {
            max_stamp_retries: default_max_stamp_retries(),
        }
    }
}

// =============================================================================
// Main Configuration
// =============================================================================

/// Complete scan protocol configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScanConfig {
    #[serde(default)]
    pub tokens: TokenSettings,

    #[serde(default)]
    pub sessions: SessionSettings,

    #[serde(default)]
    pub finalize: FinalizeSettings,
}

impl ScanConfig {
    /// Loads configuration from file and environment.
    ///
    /// ## Loading Order
    /// 1. Start with defaults
    /// 2. Override with TOML file (if exists)
    /// 3. Override with environment variables
    /// 4. Validate
    pub fn load(config_path: Option<PathBuf>) -> ScanResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading scan config from file");
                let contents = std::fs::read_to_string(&path)?;
                config = toml::from_str(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Loads configuration, falling back to defaults on error.
    pub fn load_or_default(config_path: Option<PathBuf>) -> Self {
        Self::load(config_path).unwrap_or_else(|e| {
            warn!("Failed to load scan config: {}. Using defaults.", e);
            Self::default()
        })
    }

    /// Parses a TOML document without consulting the environment.
    pub fn from_toml_str(contents: &str) -> ScanResult<Self> {
        let config: ScanConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration.
    ///
    /// The session TTL must be strictly shorter than the token TTL.
    pub fn validate(&self) -> ScanResult<()> {
        if self.tokens.ttl_secs == 0 {
            return Err(ScanError::Config("tokens.ttl_secs must be positive".into()));
        }

        if self.sessions.ttl_secs == 0 {
            return Err(ScanError::Config(
                "sessions.ttl_secs must be positive".into(),
            ));
        }

        if self.tokens.ttl_secs > MAX_TTL_SECS {
            return Err(ScanError::Config(format!(
                "tokens.ttl_secs must be at most {}, got {}",
                MAX_TTL_SECS, self.tokens.ttl_secs
            )));
        }

        if self.sessions.ttl_secs >= self.tokens.ttl_secs {
            return Err(ScanError::Config(format!(
                "sessions.ttl_secs ({}) must be shorter than tokens.ttl_secs ({})",
                self.sessions.ttl_secs, self.tokens.ttl_secs
            )));
        }

        if !(MIN_TOKEN_BYTES..=MAX_TOKEN_BYTES).contains(&self.tokens.token_bytes) {
            return Err(ScanError::Config(format!(
                "tokens.token_bytes must be between {} and {}, got {}",
                MIN_TOKEN_BYTES, MAX_TOKEN_BYTES, self.tokens.token_bytes
            )));
        }

        if self.finalize.max_stamp_retries == 0 {
            return Err(ScanError::Config(
                "finalize.max_stamp_retries must be at least 1".into(),
            ));
        }

        Ok(())
    }

    /// Applies environment variable overrides.
    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Applies overrides from any key/value source. Unparseable values are
    /// logged and ignored.
    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(value) = lookup("LOYALTY_TOKEN_TTL_SECS") {
            match value.parse::<u64>() {
                Ok(secs) => {
                    debug!(ttl_secs = secs, "Overriding token TTL from environment");
                    self.tokens.ttl_secs = secs;
                }
                Err(_) => warn!(value = %value, "Ignoring invalid LOYALTY_TOKEN_TTL_SECS"),
            }
        }

        if let Some(value) = lookup("LOYALTY_TOKEN_BYTES") {
            match value.parse::<usize>() {
                Ok(bytes) => self.tokens.token_bytes = bytes,
                Err(_) => warn!(value = %value, "Ignoring invalid LOYALTY_TOKEN_BYTES"),
            }
        }

        if let Some(value) = lookup("LOYALTY_SESSION_TTL_SECS") {
            match value.parse::<u64>() {
                Ok(secs) => {
                    debug!(ttl_secs = secs, "Overriding session TTL from environment");
                    self.sessions.ttl_secs = secs;
                }
                Err(_) => warn!(value = %value, "Ignoring invalid LOYALTY_SESSION_TTL_SECS"),
            }
        }

        if let Some(value) = lookup("LOYALTY_MAX_STAMP_RETRIES") {
            match value.parse::<u32>() {
                Ok(n) => self.finalize.max_stamp_retries = n,
                Err(_) => warn!(value = %value, "Ignoring invalid LOYALTY_MAX_STAMP_RETRIES"),
            }
        }
    }

    /// Returns the default config file path.
    fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "loyalty", "scan")
            .map(|dirs| dirs.config_dir().join("scan.toml"))
    }

    // =========================================================================
    // Convenience Methods
    // =========================================================================

    /// Token lifetime, capped at one year for configs that skipped `validate`.
    pub fn token_ttl(&self) -> chrono::Duration {
        ttl_from_secs(self.tokens.ttl_secs)
    }

    pub fn session_ttl(&self) -> chrono::Duration {
        ttl_from_secs(self.sessions.ttl_secs)
    }

    /// Sets both lifetimes in seconds. Call `validate` afterwards.
    pub fn with_ttls(mut self, token_secs: u64, session_secs: u64) -> Self {
        self.tokens.ttl_secs = token_secs;
        self.sessions.ttl_secs = session_secs;
        self
    }
}

fn ttl_from_secs(secs: u64) -> chrono::Duration {
    chrono::Duration::seconds(secs.min(MAX_TTL_SECS) as i64)
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults_are_valid() {
        let config = ScanConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.token_ttl(), chrono::Duration::minutes(5));
        assert_eq!(config.session_ttl(), chrono::Duration::minutes(2));
        assert_eq!(config.finalize.max_stamp_retries, 3);
    }

    #[test]
    fn test_partial_toml() {
        let config = ScanConfig::from_toml_str(
            r#"
            [sessions]
            ttl_secs = 60
            "#,
        )
        .unwrap();
        assert_eq!(config.sessions.ttl_secs, 60);
        assert_eq!(config.tokens.ttl_secs, 300);
    }

    #[test]
    fn test_session_must_be_shorter_than_token() {
        let err = ScanConfig::from_toml_str(
            r#"
            [tokens]
            ttl_secs = 60
            [sessions]
            ttl_secs = 60
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, ScanError::Config(_)));
    }

    #[test]
    fn test_ttl_ceiling() {
        let config = ScanConfig::default().with_ttls(u64::MAX, 120);
        assert!(matches!(config.validate(), Err(ScanError::Config(_))));
        assert_eq!(config.token_ttl(), chrono::Duration::days(365));

        let config = ScanConfig::default().with_ttls(MAX_TTL_SECS, MAX_TTL_SECS - 1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_token_bytes_floor() {
        let mut config = ScanConfig::default();
        config.tokens.token_bytes = 8;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_malformed_toml() {
        let err = ScanConfig::from_toml_str("[tokens\nttl_secs = ").unwrap_err();
        assert!(matches!(err, ScanError::Config(_)));
    }

    #[test]
    fn test_overrides() {
        let env: HashMap<&str, &str> = [
            ("LOYALTY_TOKEN_TTL_SECS", "600"),
            ("LOYALTY_SESSION_TTL_SECS", "90"),
            ("LOYALTY_MAX_STAMP_RETRIES", "not-a-number"),
        ]
        .into_iter()
        .collect();

        let mut config = ScanConfig::default();
        config.apply_overrides(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.tokens.ttl_secs, 600);
        assert_eq!(config.sessions.ttl_secs, 90);
        assert_eq!(config.finalize.max_stamp_retries, 3);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scan.toml");
        std::fs::write(&path, "[finalize]\nmax_stamp_retries = 5\n").unwrap();

        let config = ScanConfig::load(Some(path)).unwrap();
        assert_eq!(config.finalize.max_stamp_retries, 5);
    }
}
