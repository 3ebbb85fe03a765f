//! Configuration settings for the digest daemon.

use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::auth::Ha1;
use crate::error::DaemonError;

/// Main configuration structure for the daemon.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerConfig,
    pub digest: DigestConfig,
    #[serde(default)]
    pub credentials: CredentialsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
    #[serde(default)]
    pub audit: AuditConfig,
}

/// HTTP listener configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Address to listen on.
    #[serde(default = "default_bind_address")]
    pub bind_address: SocketAddr,
}

/// Digest protocol configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DigestConfig {
    /// Protection space advertised in challenges.
    pub realm: String,
    /// Seconds after issuance before a nonce is stale.
    #[serde(default = "default_nonce_max_age")]
    pub nonce_max_age_seconds: u64,
    /// Stale nonces are purged after `max_age * grace_factor`.
    #[serde(default = "default_grace_factor")]
    pub nonce_grace_factor: u32,
    /// Interval between nonce sweeps in seconds.
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_seconds: u64,
    /// Send `Authentication-Info` with `rspauth` on success.
    #[serde(default = "default_true")]
    pub authentication_info: bool,
    /// Echo request/response auth headers in 401 bodies. Debugging only.
    #[serde(default)]
    pub diagnostic_echo: bool,
}

/// Credential sources.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct CredentialsConfig {
    /// Optional Apache htdigest file.
    pub htdigest_path: Option<PathBuf>,
    /// Users defined inline, bound to the configured realm.
    #[serde(default)]
    pub users: Vec<UserEntry>,
}

/// A user defined in the configuration file.
#[derive(Clone, Deserialize)]
pub struct UserEntry {
    pub username: String,
    /// Plaintext password, hashed at load time.
    pub password: Option<String>,
    /// Precomputed `H(username:realm:password)`.
    pub ha1: Option<String>,
}

impl std::fmt::Debug for UserEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserEntry")
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .field("ha1", &self.ha1.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Log format ("pretty" or "json").
    #[serde(default = "default_log_format")]
    pub format: String,
}

/// Limits configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LimitsConfig {
    /// Maximum concurrent requests.
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_requests: usize,
    /// Per-request timeout in seconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
    /// Maximum requests per client address per window.
    #[serde(default = "default_rate_limit_requests")]
    pub rate_limit_requests: usize,
    /// Rate limit window in seconds.
    #[serde(default = "default_rate_limit_window")]
    pub rate_limit_window_seconds: u64,
}

/// Audit logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AuditConfig {
    /// Whether audit logging is enabled.
    #[serde(default = "default_audit_enabled")]
    pub enabled: bool,
    /// Path to the audit log file.
    #[serde(default = "default_audit_log_path")]
    pub log_path: PathBuf,
}

// Default value functions
fn default_bind_address() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8080))
}

fn default_nonce_max_age() -> u64 {
    300
}

fn default_grace_factor() -> u32 {
    2
}

fn default_sweep_interval() -> u64 {
    60
}

fn default_true() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn default_max_concurrent() -> usize {
    100
}

fn default_request_timeout() -> u64 {
    30
}

fn default_rate_limit_requests() -> usize {
    120
}

fn default_rate_limit_window() -> u64 {
    60
}

fn default_audit_enabled() -> bool {
    true
}

fn default_audit_log_path() -> PathBuf {
    PathBuf::from("/var/log/digest-daemon/audit.log")
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_concurrent_requests: default_max_concurrent(),
            request_timeout_seconds: default_request_timeout(),
            rate_limit_requests: default_rate_limit_requests(),
            rate_limit_window_seconds: default_rate_limit_window(),
        }
    }
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            enabled: default_audit_enabled(),
            log_path: default_audit_log_path(),
        }
    }
}

impl DigestConfig {
    /// Digest settings for `realm` with every other field at its default.
    pub fn for_realm(realm: impl Into<String>) -> Self {
        Self {
            realm: realm.into(),
            nonce_max_age_seconds: default_nonce_max_age(),
            nonce_grace_factor: default_grace_factor(),
            sweep_interval_seconds: default_sweep_interval(),
            authentication_info: true,
            diagnostic_echo: false,
        }
    }

    pub fn nonce_max_age(&self) -> Duration {
        Duration::from_secs(self.nonce_max_age_seconds)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_seconds)
    }
}

impl Settings {
    /// Load settings from a TOML configuration file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, DaemonError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| DaemonError::Config {
            message: format!("Failed to read config file '{}': {}", path.display(), e),
        })?;

        Self::from_toml(&content).map_err(|e| match e {
            DaemonError::Config { message } => DaemonError::Config {
                message: format!("{} ({})", message, path.display()),
            },
            other => other,
        })
    }

    /// Parse and validate settings from TOML text.
    pub fn from_toml(content: &str) -> Result<Self, DaemonError> {
        let settings: Settings = toml::from_str(content).map_err(|e| DaemonError::Config {
            message: format!("Failed to parse config: {}", e),
        })?;

        settings.validate()?;

        Ok(settings)
    }

    /// Validate the settings.
    fn validate(&self) -> Result<(), DaemonError> {
        // Validate log level
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            return Err(DaemonError::Config {
                message: format!(
                    "Invalid log level '{}'. Valid levels: {:?}",
                    self.logging.level, valid_levels
                ),
            });
        }

        // Validate log format
        let valid_formats = ["pretty", "json"];
        if !valid_formats.contains(&self.logging.format.to_lowercase().as_str()) {
            return Err(DaemonError::Config {
                message: format!(
                    "Invalid log format '{}'. Valid formats: {:?}",
                    self.logging.format, valid_formats
                ),
            });
        }

        // The realm is reflected into a quoted header value
        let realm = &self.digest.realm;
        if realm.is_empty() || realm.chars().any(|c| c == '"' || c == '\\' || c.is_control()) {
            return Err(DaemonError::Config {
                message: format!("Invalid realm '{}'", realm.escape_debug()),
            });
        }

        if self.digest.nonce_max_age_seconds == 0 {
            return Err(DaemonError::Config {
                message: "nonce_max_age_seconds must be greater than 0".to_string(),
            });
        }

        if self.digest.nonce_grace_factor == 0 {
            return Err(DaemonError::Config {
                message: "nonce_grace_factor must be at least 1".to_string(),
            });
        }

        if self.digest.sweep_interval_seconds == 0 {
            return Err(DaemonError::Config {
                message: "sweep_interval_seconds must be greater than 0".to_string(),
            });
        }

        for user in &self.credentials.users {
            if user.username.is_empty() || user.username.contains(':') {
                return Err(DaemonError::Config {
                    message: format!("Invalid username '{}'", user.username),
                });
            }
            match (&user.password, &user.ha1) {
                (Some(_), None) => {}
                (None, Some(ha1)) if Ha1::from_hex(ha1).is_some() => {}
                (None, Some(_)) => {
                    return Err(DaemonError::Config {
                        message: format!(
                            "ha1 for user '{}' must be 32 hex characters",
                            user.username
                        ),
                    })
                }
                _ => {
                    return Err(DaemonError::Config {
                        message: format!(
                            "User '{}' must set exactly one of 'password' or 'ha1'",
                            user.username
                        ),
                    })
                }
            }
        }

        Ok(())
    }
}
