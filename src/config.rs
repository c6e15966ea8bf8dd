//! Configuration for the weather sensor bridge.
//!
//! Values are layered: built-in defaults, then the optional JSON config file,
//! then environment overrides.

use crate::broker::MqttSettings;
use crate::error::ConfigError;
use crate::weather::topic::BASE_TOPIC;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use url::{Host, Url};

/// Environment keys read by [`Config::apply_env`].
pub mod env {
    pub const LOG_LEVEL: &str = "DEBUG";
    pub const SERVER_URL: &str = "SERVER_URL";
    pub const KEEP_ALIVE: &str = "KA_TIME";
    pub const CONNECT_RETRY_DELAY: &str = "CRD_TIME";
    pub const BASE_TOPIC: &str = "BASE_TOPIC";
    pub const CLIENT_ID: &str = "CLIENT_ID";
    pub const SOURCE_CMD: &str = "SOURCE_CMD";
}

const DEFAULT_SOURCE_CMD: &str =
    "/usr/local/bin/rtl_433 -q -F json -R 146 -R 147 -R 148 -R 150 -R 151 -R 152";

const DEFAULT_MQTT_PORT: u16 = 1883;

/// Shortest keep-alive the MQTT client accepts.
const MIN_KEEP_ALIVE_SECS: u64 = 5;

/// Main configuration for the bridge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Log verbosity when `RUST_LOG` is not set
    pub log_level: LogLevel,

    /// MQTT broker URL, `mqtt://host:port` or `tcp://host:port`
    pub server_url: Option<String>,

    /// MQTT keep-alive interval
    #[serde(with = "duration_secs")]
    pub keep_alive: Duration,

    /// Delay between broker connection attempts
    #[serde(with = "duration_millis")]
    pub connect_retry_delay: Duration,

    /// Prefix for every published topic
    pub base_topic: String,

    /// MQTT client id; generated when unset
    pub client_id: Option<String>,

    /// Command producing sensor JSON lines on stdout
    pub source: SourceCommand,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Info,
            server_url: None,
            keep_alive: Duration::from_secs(30),
            connect_retry_delay: Duration::from_millis(2000),
            base_topic: BASE_TOPIC.to_string(),
            client_id: None,
            source: SourceCommand::parse(DEFAULT_SOURCE_CMD).unwrap_or_default(),
        }
    }
}

impl Config {
    /// Load the config file (or defaults) and apply the process environment.
    pub fn resolve() -> Result<Self, ConfigError> {
        let mut config = Self::load()?;
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Load configuration from the default location.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_path();

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            let config: Config =
                serde_json::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to the default location.
    pub fn save(&self) -> Result<(), ConfigError> {
        let config_path = Self::config_path();

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::Serialize(e.to_string()))?;

        std::fs::write(&config_path, content)?;

        Ok(())
    }

    /// Get the path to the configuration file.
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("weather-sensor-bridge")
            .join("config.json")
    }

    /// Override fields from environment-style variables.
    ///
    /// `lookup` returns the raw value of a key, or `None` when it is unset.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &'static str| -> Result<Option<String>, ConfigError> {
            match lookup(key) {
                Some(value) if value.trim().is_empty() => Err(ConfigError::Blank(key)),
                Some(value) => Ok(Some(value.trim().to_string())),
                None => Ok(None),
            }
        };

        if let Some(level) = get(env::LOG_LEVEL)? {
            self.log_level = level.parse()?;
        }
        if let Some(url) = get(env::SERVER_URL)? {
            self.server_url = Some(url);
        }
        if let Some(secs) = get(env::KEEP_ALIVE)? {
            self.keep_alive = Duration::from_secs(parse_integer(env::KEEP_ALIVE, &secs)?);
        }
        if let Some(millis) = get(env::CONNECT_RETRY_DELAY)? {
            self.connect_retry_delay =
                Duration::from_millis(parse_integer(env::CONNECT_RETRY_DELAY, &millis)?);
        }
        if let Some(base) = get(env::BASE_TOPIC)? {
            self.base_topic = base;
        }
        if let Some(id) = get(env::CLIENT_ID)? {
            self.client_id = Some(id);
        }
        if let Some(cmd) = get(env::SOURCE_CMD)? {
            self.source = SourceCommand::parse(&cmd).ok_or(ConfigError::Blank(env::SOURCE_CMD))?;
        }

        Ok(())
    }

    /// Validate the broker settings and build MQTT connection options.
    ///
    /// Only commands that actually connect need this.
    pub fn mqtt_settings(&self) -> Result<MqttSettings, ConfigError> {
        let url = self
            .server_url
            .as_deref()
            .ok_or(ConfigError::Missing(env::SERVER_URL))?;
        let (host, port) = parse_broker_url(url)?;

        let keep_alive = self.keep_alive.as_secs();
        if keep_alive < MIN_KEEP_ALIVE_SECS {
            return Err(ConfigError::OutOfRange {
                key: env::KEEP_ALIVE,
                value: keep_alive,
                min: MIN_KEEP_ALIVE_SECS,
            });
        }

        Ok(MqttSettings {
            host,
            port,
            client_id: self.client_id.clone().unwrap_or_else(default_client_id),
            keep_alive: self.keep_alive,
            connect_retry_delay: self.connect_retry_delay,
        })
    }
}

/// Log verbosity.
///
/// Accepts the level names of common Go and syslog-style loggers, so `panic`
/// and `fatal` mean `error` and `warning` means `warn`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    /// Directive understood by `tracing_subscriber::EnvFilter`.
    pub fn as_filter(&self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

impl FromStr for LogLevel {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "panic" | "fatal" | "error" => Ok(LogLevel::Error),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "info" => Ok(LogLevel::Info),
            "debug" => Ok(LogLevel::Debug),
            "trace" => Ok(LogLevel::Trace),
            _ => Err(ConfigError::InvalidLevel(s.to_string())),
        }
    }
}

impl TryFrom<String> for LogLevel {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, ConfigError> {
        value.parse()
    }
}

impl From<LogLevel> for String {
    fn from(level: LogLevel) -> Self {
        level.as_filter().to_string()
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_filter())
    }
}

/// A program and its arguments.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl SourceCommand {
    /// Split a command line on whitespace. Returns `None` for a blank line.
    pub fn parse(line: &str) -> Option<Self> {
        let mut words = line.split_whitespace().map(str::to_string);
        let program = words.next()?;
        Some(Self {
            program,
            args: words.collect(),
        })
    }
}

impl fmt::Display for SourceCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

fn parse_integer(key: &'static str, value: &str) -> Result<u64, ConfigError> {
    value.parse().map_err(|_| ConfigError::InvalidInteger {
        key,
        value: value.to_string(),
    })
}

/// Split `mqtt://host[:port]` or `tcp://host[:port]` into host and port.
///
/// Credentials, paths, queries and fragments are rejected. IPv6 hosts are
/// returned without brackets.
pub fn parse_broker_url(raw: &str) -> Result<(String, u16), ConfigError> {
    let invalid = |reason: &str| ConfigError::InvalidUrl {
        url: raw.to_string(),
        reason: reason.to_string(),
    };

    let url = Url::parse(raw).map_err(|e| invalid(&e.to_string()))?;
    if !matches!(url.scheme(), "mqtt" | "tcp") {
        return Err(invalid("scheme must be mqtt or tcp"));
    }
    if !url.username().is_empty() || url.password().is_some() {
        return Err(invalid("credentials are not supported"));
    }
    if !matches!(url.path(), "" | "/") {
        return Err(invalid("unexpected path"));
    }
    if url.query().is_some() || url.fragment().is_some() {
        return Err(invalid("unexpected query or fragment"));
    }

    let host = match url.host() {
        Some(Host::Domain(domain)) if !domain.is_empty() => domain.to_string(),
        Some(Host::Ipv4(addr)) => addr.to_string(),
        Some(Host::Ipv6(addr)) => addr.to_string(),
        _ => return Err(invalid("missing host")),
    };

    Ok((host, url.port().unwrap_or(DEFAULT_MQTT_PORT)))
}

/// `weather-bridge-<hostname>-<short uuid>`, unique per process.
fn default_client_id() -> String {
    let host = hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "unknown".to_string());
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("weather-bridge-{}-{}", host, &suffix[..8])
}

/// Serde support for Duration as whole seconds.
mod duration_secs {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

/// Serde support for Duration as milliseconds.
mod duration_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        (duration.as_millis() as u64).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
