use core::error::Error;
use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;

use error_stack::Report;
use error_stack::ResultExt;
use serde::Deserialize;
use serde::Deserializer;

/// Interval between two attempts of a failed start or stop cycle.
pub const RESTART_RETRY_INTERVAL: Duration = Duration::from_secs(5);
/// Upper bound of the self-dial performed after binding a socket.
pub const GRPC_TIMEOUT: Duration = Duration::from_secs(5);
/// A crash further than this from the previous one restarts the count at 1.
pub const CRASH_RESET_WINDOW: Duration = Duration::from_secs(3600);
/// Consecutive crashes tolerated on one socket before a full restart.
pub const CRASH_THRESHOLD: u32 = 5;
/// Time a stopped server gets to drain before its task is aborted.
pub const SERVER_STOP_GRACE: Duration = Duration::from_secs(1);

/// Timing knobs of the plugin lifecycle.
///
/// Retries are fixed-interval and unbounded; only the interval is tunable.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LifecycleConfig {
    #[serde(rename = "retryIntervalMs", deserialize_with = "deserialize_millis")]
    pub retry_interval: Duration,

    #[serde(rename = "dialTimeoutMs", deserialize_with = "deserialize_millis")]
    pub dial_timeout: Duration,

    #[serde(rename = "crashResetWindowMs", deserialize_with = "deserialize_millis")]
    pub crash_reset_window: Duration,

    pub crash_threshold: u32,

    #[serde(rename = "serverStopGraceMs", deserialize_with = "deserialize_millis")]
    pub server_stop_grace: Duration,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            retry_interval: RESTART_RETRY_INTERVAL,
            dial_timeout: GRPC_TIMEOUT,
            crash_reset_window: CRASH_RESET_WINDOW,
            crash_threshold: CRASH_THRESHOLD,
            server_stop_grace: SERVER_STOP_GRACE,
        }
    }
}

/// Errors raised while loading a lifecycle config file.
#[derive(Debug, derive_more::Display)]
pub enum ConfigError {
    #[display("Failed to read lifecycle config {}", path.display())]
    Read { path: PathBuf },
    #[display("Failed to parse lifecycle config {}", path.display())]
    Parse { path: PathBuf },
}

impl Error for ConfigError {}

impl LifecycleConfig {
    /// Loads a YAML config; missing keys keep their defaults.
    pub async fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, Report<ConfigError>> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path)
            .await
            .change_context(ConfigError::Read {
                path: path.to_path_buf(),
            })?;
        Self::from_yaml_str(&content).change_context(ConfigError::Parse {
            path: path.to_path_buf(),
        })
    }

    pub fn from_yaml_str(content: &str) -> Result<Self, serde_yaml::Error> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(content)
    }
}

/// Accepts milliseconds either as a number or as a numeric string.
fn deserialize_millis<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum StringOrInt {
        String(String),
        Int(u64),
    }

    match StringOrInt::deserialize(deserializer)? {
        StringOrInt::String(s) => s.trim().parse::<u64>().map(Duration::from_millis).map_err(|e| {
            serde::de::Error::custom(format!("Failed to parse milliseconds from string '{s}': {e}"))
        }),
        StringOrInt::Int(ms) => Ok(Duration::from_millis(ms)),
    }
}
