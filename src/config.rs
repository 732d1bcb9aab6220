//! Configuration for the temperature relay agent.
//!
//! All settings come from environment variables, loaded once at startup and
//! immutable for the process lifetime. Network and broker credentials have no
//! defaults and must be provided; operational knobs fall back to sensible
//! values.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Default broker host
const DEFAULT_BROKER_HOST: &str = "io.adafruit.com";

/// Default broker port
const DEFAULT_BROKER_PORT: u16 = 1883;

/// Default per-channel feed name prefix (channel number is appended)
const DEFAULT_FEED_PREFIX: &str = "feeds/temp_sensor_";

/// Default backlog file path
const DEFAULT_DATA_FILE: &str = "temps.csv";

/// Default measurement interval in seconds
const DEFAULT_SAMPLE_INTERVAL_SECS: u64 = 60;

/// Bounds for the measurement interval
const MIN_SAMPLE_INTERVAL_SECS: u64 = 1;
const MAX_SAMPLE_INTERVAL_SECS: u64 = 3_600;

/// Default link acquisition timeout in seconds
const DEFAULT_LINK_TIMEOUT_SECS: u64 = 30;

/// Default session acquisition timeout in seconds
const DEFAULT_SESSION_TIMEOUT_SECS: u64 = 10;

/// Bound for both acquisition timeouts
const MAX_ACQUISITION_TIMEOUT_SECS: u64 = 300;

/// Configuration for the relay agent.
///
/// Environment variables:
/// - `TEMP_RELAY_WIFI_SSID`: network name (required)
/// - `TEMP_RELAY_WIFI_CREDENTIAL`: network credential (required)
/// - `TEMP_RELAY_BROKER_USERNAME`: broker account (required)
/// - `TEMP_RELAY_BROKER_KEY`: broker credential (required)
/// - `TEMP_RELAY_BROKER_HOST`: broker host (default: io.adafruit.com)
/// - `TEMP_RELAY_BROKER_PORT`: broker port (default: 1883)
/// - `TEMP_RELAY_FEED_PREFIX`: feed name prefix (default: feeds/temp_sensor_)
/// - `TEMP_RELAY_DATA_FILE`: backlog file path (default: temps.csv)
/// - `TEMP_RELAY_SAMPLE_INTERVAL_SECS`: measurement interval (default: 60)
/// - `TEMP_RELAY_LINK_TIMEOUT_SECS`: link acquisition timeout (default: 30)
/// - `TEMP_RELAY_SESSION_TIMEOUT_SECS`: session acquisition timeout (default: 10)
#[derive(Debug, Clone)]
pub struct Config {
    /// Network name to join
    pub wifi_ssid: String,

    /// Network credential
    pub wifi_credential: String,

    /// Broker host
    pub broker_host: String,

    /// Broker port
    pub broker_port: u16,

    /// Broker account name; also the first topic segment
    pub broker_username: String,

    /// Broker credential
    pub broker_key: String,

    /// Per-channel feed name prefix
    pub feed_prefix: String,

    /// Path of the durable backlog file
    pub data_file: PathBuf,

    /// Interval between measurement cycles
    pub sample_interval: Duration,

    /// Upper bound on one link acquisition attempt
    pub link_timeout: Duration,

    /// Upper bound on one session acquisition attempt
    pub session_timeout: Duration,
}

/// Error type for configuration loading failures
#[derive(Debug)]
pub struct ConfigError {
    pub message: String,
    pub env_var: Option<String>,
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.env_var {
            Some(var) => write!(f, "Configuration error for {}: {}", var, self.message),
            None => write!(f, "Configuration error: {}", self.message),
        }
    }
}

impl std::error::Error for ConfigError {}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a required credential variable is missing or
    /// a numeric variable fails to parse or violates its bounds.
    pub fn from_env() -> Result<Self, ConfigError> {
        let wifi_ssid = required("TEMP_RELAY_WIFI_SSID")?;
        let wifi_credential = required("TEMP_RELAY_WIFI_CREDENTIAL")?;
        let broker_username = required("TEMP_RELAY_BROKER_USERNAME")?;
        let broker_key = required("TEMP_RELAY_BROKER_KEY")?;

        let broker_host = env::var("TEMP_RELAY_BROKER_HOST")
            .unwrap_or_else(|_| DEFAULT_BROKER_HOST.to_string());
        let broker_port = parse_number(
            "TEMP_RELAY_BROKER_PORT",
            u64::from(DEFAULT_BROKER_PORT),
            1,
            u64::from(u16::MAX),
        )? as u16;

        let feed_prefix =
            env::var("TEMP_RELAY_FEED_PREFIX").unwrap_or_else(|_| DEFAULT_FEED_PREFIX.to_string());
        let data_file = PathBuf::from(
            env::var("TEMP_RELAY_DATA_FILE").unwrap_or_else(|_| DEFAULT_DATA_FILE.to_string()),
        );

        let sample_interval = Duration::from_secs(parse_number(
            "TEMP_RELAY_SAMPLE_INTERVAL_SECS",
            DEFAULT_SAMPLE_INTERVAL_SECS,
            MIN_SAMPLE_INTERVAL_SECS,
            MAX_SAMPLE_INTERVAL_SECS,
        )?);
        let link_timeout = Duration::from_secs(parse_number(
            "TEMP_RELAY_LINK_TIMEOUT_SECS",
            DEFAULT_LINK_TIMEOUT_SECS,
            1,
            MAX_ACQUISITION_TIMEOUT_SECS,
        )?);
        let session_timeout = Duration::from_secs(parse_number(
            "TEMP_RELAY_SESSION_TIMEOUT_SECS",
            DEFAULT_SESSION_TIMEOUT_SECS,
            1,
            MAX_ACQUISITION_TIMEOUT_SECS,
        )?);

        Ok(Self {
            wifi_ssid,
            wifi_credential,
            broker_host,
            broker_port,
            broker_username,
            broker_key,
            feed_prefix,
            data_file,
            sample_interval,
            link_timeout,
            session_timeout,
        })
    }

    /// Topic prefix for per-channel publishes; the 1-based channel number is
    /// appended: `<username>/<feed_prefix><n>`.
    pub fn topic_prefix(&self) -> String {
        format!("{}/{}", self.broker_username, self.feed_prefix)
    }
}

impl Default for Config {
    /// Default configuration with placeholder credentials.
    ///
    /// Useful for tests and the simulated capability harness; a real
    /// deployment loads credentials through [`Config::from_env`].
    fn default() -> Self {
        Self {
            wifi_ssid: "test-net".to_string(),
            wifi_credential: "test-credential".to_string(),
            broker_host: DEFAULT_BROKER_HOST.to_string(),
            broker_port: DEFAULT_BROKER_PORT,
            broker_username: "device".to_string(),
            broker_key: "test-key".to_string(),
            feed_prefix: DEFAULT_FEED_PREFIX.to_string(),
            data_file: PathBuf::from(DEFAULT_DATA_FILE),
            sample_interval: Duration::from_secs(DEFAULT_SAMPLE_INTERVAL_SECS),
            link_timeout: Duration::from_secs(DEFAULT_LINK_TIMEOUT_SECS),
            session_timeout: Duration::from_secs(DEFAULT_SESSION_TIMEOUT_SECS),
        }
    }
}

/// Read a required environment variable.
fn required(env_var: &str) -> Result<String, ConfigError> {
    match env::var(env_var) {
        Ok(value) if !value.is_empty() => Ok(value),
        _ => Err(ConfigError {
            message: "required variable is not set".to_string(),
            env_var: Some(env_var.to_string()),
        }),
    }
}

/// Parse an optional numeric environment variable with bounds validation.
fn parse_number(env_var: &str, default: u64, min: u64, max: u64) -> Result<u64, ConfigError> {
    match env::var(env_var) {
        Ok(value) => {
            let number: u64 = value.parse().map_err(|_| ConfigError {
                message: format!("'{}' is not a valid number", value),
                env_var: Some(env_var.to_string()),
            })?;

            if number < min {
                return Err(ConfigError {
                    message: format!("{} is below minimum ({})", number, min),
                    env_var: Some(env_var.to_string()),
                });
            }
            if number > max {
                return Err(ConfigError {
                    message: format!("{} exceeds maximum ({})", number, max),
                    env_var: Some(env_var.to_string()),
                });
            }

            Ok(number)
        }
        Err(_) => Ok(default),
    }
}
