//! Configuration types.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;

/// Origins the original web console was served from.
const DEFAULT_CORS_ORIGINS: &[&str] = &[
    "http://localhost:5000",
    "http://127.0.0.1:5000",
    "http://localhost:8000",
    "http://127.0.0.1:8000",
    "http://localhost:8080",
    "http://127.0.0.1:8080",
];

/// Relay runtime configuration.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Address the control API listens on.
    pub bind_addr: String,
    /// How often the poller fetches the latest source message.
    pub poll_interval: Duration,
    /// How long the consumer waits on an empty queue before re-checking the stop signal.
    pub dequeue_timeout: Duration,
    /// Upper bound for a single language-model call.
    pub llm_timeout: Duration,
    /// Directory holding `classify.txt` / `rewrite.txt` overrides.
    pub prompts_dir: Option<PathBuf>,
    /// First-line token that marks a message as fitting the audience.
    pub accept_token: String,
    /// Origins allowed to call the control API from a browser.
    pub cors_origins: Vec<String>,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8000".to_string(),
            poll_interval: Duration::from_secs(10),
            dequeue_timeout: Duration::from_millis(1000),
            llm_timeout: Duration::from_secs(300),
            prompts_dir: None,
            accept_token: "FIT".to_string(),
            cors_origins: DEFAULT_CORS_ORIGINS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl RelayConfig {
    /// Build the configuration from `RELAY_*` environment variables.
    ///
    /// Unset variables fall back to [`RelayConfig::default`]; set but
    /// unparsable values are rejected.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let bind_addr = std::env::var("RELAY_BIND_ADDR").unwrap_or(defaults.bind_addr);

        let poll_interval = non_zero(
            "RELAY_POLL_INTERVAL_SECS",
            Duration::from_secs(env_parse(
                "RELAY_POLL_INTERVAL_SECS",
                defaults.poll_interval.as_secs(),
            )?),
        )?;

        let dequeue_timeout = non_zero(
            "RELAY_DEQUEUE_TIMEOUT_MS",
            Duration::from_millis(env_parse(
                "RELAY_DEQUEUE_TIMEOUT_MS",
                defaults.dequeue_timeout.as_millis() as u64,
            )?),
        )?;
        let llm_timeout = Duration::from_secs(env_parse(
            "RELAY_LLM_TIMEOUT_SECS",
            defaults.llm_timeout.as_secs(),
        )?);

        let prompts_dir = std::env::var("RELAY_PROMPTS_DIR")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .map(PathBuf::from);

        let accept_token = std::env::var("RELAY_ACCEPT_TOKEN")
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or(defaults.accept_token);

        let cors_origins = match std::env::var("RELAY_CORS_ORIGINS") {
            Ok(raw) => split_list(&raw),
            Err(_) => defaults.cors_origins,
        };

        Ok(Self {
            bind_addr,
            poll_interval,
            dequeue_timeout,
            llm_timeout,
            prompts_dir,
            accept_token,
            cors_origins,
        })
    }
}

/// Parse an optional environment variable, keeping `default` when unset.
fn env_parse<T>(key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => parse_value(key, &raw),
        Err(_) => Ok(default),
    }
}

fn parse_value<T>(key: &str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|e: T::Err| ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("{raw:?}: {e}"),
        })
}

fn non_zero(key: &str, value: Duration) -> Result<Duration, ConfigError> {
    if value.is_zero() {
        return Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: "must be greater than zero".to_string(),
        });
    }
    Ok(value)
}

/// Split a comma-separated list, dropping empty entries.
pub(crate) fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}
