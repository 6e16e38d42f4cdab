use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Top-level configuration loaded from procwatch.toml.
#[derive(Debug, Deserialize)]
#[serde(default)]
#[derive(Default)]
pub struct ProcwatchConfig {
    pub child: ChildConfig,
    pub watchdog: WatchdogConfig,
    pub paths: PathsConfig,
}

/// The command line of the supervised child.
#[derive(Debug, Deserialize)]
#[serde(default)]
#[derive(Default)]
pub struct ChildConfig {
    pub command: String,
    pub args: Vec<String>,
}

/// Timing and resource knobs for the kill/relaunch policy.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct WatchdogConfig {
    /// Seconds a killed child must stay down before relaunch is attempted.
    pub resurrection_period_secs: u64,
    /// Max seconds since the last heartbeat before a running child is killed.
    pub unresponsive_kill_period_secs: u64,
    /// Seconds granted after launch before heartbeat absence counts as
    /// unresponsiveness; sizes the scheduler's initial delay only.
    pub unresponsive_grace_period_secs: u64,
    /// Seconds during which identical operator messages are deduplicated.
    pub message_suppression_secs: u64,
    /// Reserved: consecutive launch failures before reverting to a
    /// last-known-good binary. Parsed and carried, no behavior yet.
    pub failure_count_to_revert: u32,
    /// Hard memory ceiling for the child, in bytes. 0 disables the check.
    pub memory_limit_bytes: u64,
}

/// Where the heartbeat channel and the operator status file live.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub heartbeat_file: PathBuf,
    pub status_file: PathBuf,
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            resurrection_period_secs: 60,
            unresponsive_kill_period_secs: 180,
            unresponsive_grace_period_secs: 600,
            message_suppression_secs: 60,
            failure_count_to_revert: 0,
            memory_limit_bytes: 1024 * 1024 * 1024,
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            heartbeat_file: PathBuf::from("procwatch.heartbeat"),
            status_file: PathBuf::from("procwatch.status"),
        }
    }
}

/// Errors from loading or validating the configuration.
#[derive(Debug)]
pub enum ConfigError {
    /// Failed to read the config file.
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    /// Failed to parse the config file as TOML.
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    /// A field has a value the watchdog cannot run with.
    Invalid { field: &'static str, reason: String },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Read { path, source } => {
                write!(f, "failed to read config {}: {}", path.display(), source)
            }
            ConfigError::Parse { path, source } => {
                write!(f, "failed to parse config {}: {}", path.display(), source)
            }
            ConfigError::Invalid { field, reason } => {
                write!(f, "invalid config field {}: {}", field, reason)
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Read { source, .. } => Some(source),
            ConfigError::Parse { source, .. } => Some(source),
            ConfigError::Invalid { .. } => None,
        }
    }
}

impl ProcwatchConfig {
    /// Load configuration from a TOML file. A missing file yields the
    /// defaults, so the whole setup can come from CLI overrides.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "config file not found, using defaults");
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            source: e,
        })?;
        toml::from_str(&contents).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Reject configurations the watchdog cannot meaningfully run with.
    ///
    /// Out-of-range values are a hard error, never silently clamped: a zero
    /// kill or resurrection period degenerates the policy to "always kill"
    /// or "always relaunch".
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.child.command.is_empty() {
            return Err(ConfigError::Invalid {
                field: "child.command",
                reason: "no child command to supervise".to_string(),
            });
        }
        if self.watchdog.unresponsive_kill_period_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "watchdog.unresponsive_kill_period_secs",
                reason: "must be > 0".to_string(),
            });
        }
        if self.watchdog.resurrection_period_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "watchdog.resurrection_period_secs",
                reason: "must be > 0".to_string(),
            });
        }
        Ok(())
    }
}
