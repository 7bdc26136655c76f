use std::str::FromStr;
use std::time::Duration;
use std::{env, fmt, fs, path};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::pipeline::collector::{DEFAULT_WORKER_COLLECTOR_RATIO, MAX_BATCH};

/// Largest accepted `collector.max_batch`
pub const BATCH_LIMIT: usize = 10_000;

#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to read {path}: {source}")]
    ReadFailed {
        path: path::PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write {path}: {source}")]
    WriteFailed {
        path: path::PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    ParseFailed(#[from] toml::de::Error),
    #[error("failed to serialize config: {0}")]
    SerializeFailed(#[from] toml::ser::Error),
    #[error("no config path available, set XDG_CONFIG_HOME or HOME")]
    ConfigPathUnavailable,
    #[error("invalid setting {key}: {reason}")]
    Invalid { key: &'static str, reason: &'static str },
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub partition: PartitionConfig,
    pub database: DatabaseConfig,
    pub probe: ProbeConfig,
    pub collector: CollectorConfig,
    pub telemetry: TelemetryConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PartitionConfig {
    pub count: i64,
    pub id: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: path::PathBuf,
    pub max_connections: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    pub timeout_seconds: u64,
    pub user_agent: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectorConfig {
    pub tick_interval_ms: u64,
    pub max_batch: usize,
    pub worker_collector_ratio: usize,
    /// Unset means the buffer is unbounded
    pub buffer_capacity: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    pub enabled: bool,
    pub host: String,
    pub port: u16,
    pub timeout_seconds: u64,
    pub measurement: String,
}

impl Default for PartitionConfig {
    fn default() -> Self {
        Self { count: 1, id: 0 }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self { path: "uptime-watcher.db".into(), max_connections: 10 }
    }
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: 30,
            user_agent: concat!("uptime-watcher/", env!("CARGO_PKG_VERSION")).into(),
        }
    }
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 200,
            max_batch: MAX_BATCH,
            worker_collector_ratio: DEFAULT_WORKER_COLLECTOR_RATIO,
            buffer_capacity: None,
        }
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            host: "localhost".into(),
            port: 9529,
            timeout_seconds: 5,
            measurement: "site_uptime_watcher".into(),
        }
    }
}

impl ProbeConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

impl CollectorConfig {
    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }
}

impl TelemetryConfig {
    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

/// Used to ensure we are actually reading a toml file
fn normalize_toml_path(path: &path::Path) -> path::PathBuf {
    let mut path = path.to_path_buf();
    if path.extension().map(|ext| ext != "toml").unwrap_or(true) {
        path.set_extension("toml");
    }
    path
}

/// Get default config path ($XDG_CONFIG_HOME/uptime-watcher/config.toml or
/// $HOME/.config/...)
fn default_config_path() -> Result<path::PathBuf, Error> {
    let path = if let Ok(config_home) = env::var("XDG_CONFIG_HOME") {
        path::PathBuf::from(config_home)
    } else if let Some(home_dir) = env::home_dir() {
        home_dir.join(".config")
    } else {
        return Err(Error::ConfigPathUnavailable);
    };

    Ok(path.join("uptime-watcher/config.toml"))
}

/// Parsed value of `name`, `None` when unset or unparseable
fn parse_override<T, F>(lookup: &F, name: &str) -> Option<T>
where
    T: FromStr,
    T::Err: fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    let raw = lookup(name)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(error) => {
            warn!(variable = name, value = %raw, %error, "ignoring unparseable override");
            None
        }
    }
}

/// Parse `name` from `lookup` into `target`; bad values keep the old one
fn override_with<T, F>(lookup: &F, name: &str, target: &mut T)
where
    T: FromStr,
    T::Err: fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    if let Some(value) = parse_override(lookup, name) {
        *target = value;
    }
}

impl fmt::Display for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let write_indented = |level: usize| {
            move |f: &mut fmt::Formatter<'_>, label: &str, value: &dyn fmt::Display| {
                writeln!(f, "  {:indent$}{}: {}", "", label, value, indent = level * 2)
            }
        };
        let write_title_indented = |level: usize| {
            move |f: &mut fmt::Formatter<'_>, label: &str| {
                writeln!(f, "{:indent$}{}", "", label, indent = level * 2)
            }
        };

        let write_title_1 = write_title_indented(1);
        let write_1 = write_indented(1);

        writeln!(f, "Current Internal Configuration State:")?;
        write_title_1(f, "Partition")?;
        write_1(f, "Count", &self.partition.count)?;
        write_1(f, "Id", &self.partition.id)?;
        write_title_1(f, "Database")?;
        write_1(f, "Path", &self.database.path.display())?;
        write_1(f, "Max Connections", &self.database.max_connections)?;
        write_title_1(f, "Probe")?;
        write_1(f, "Timeout (s)", &self.probe.timeout_seconds)?;
        write_1(f, "User Agent", &self.probe.user_agent)?;
        write_title_1(f, "Collector")?;
        write_1(f, "Tick (ms)", &self.collector.tick_interval_ms)?;
        write_1(f, "Max Batch", &self.collector.max_batch)?;
        write_1(f, "Probers per Collector", &self.collector.worker_collector_ratio)?;
        match self.collector.buffer_capacity {
            Some(capacity) => write_1(f, "Buffer Capacity", &capacity)?,
            None => write_1(f, "Buffer Capacity", &"unbounded")?,
        }
        write_title_1(f, "Telemetry")?;
        write_1(f, "Enabled", &self.telemetry.enabled)?;
        write_1(f, "Endpoint", &self.telemetry.base_url())?;
        write_1(f, "Timeout (s)", &self.telemetry.timeout_seconds)?;
        write_1(f, "Measurement", &self.telemetry.measurement)?;

        Ok(())
    }
}

impl Config {
    /// Generate Config structure from file
    ///
    /// Creates a default config in ~/.config/uptime-watcher/config.toml
    ///  or the specified path, with the name config.toml if one does not exist
    ///
    /// ```no_run
    /// let cfg = uptime_watcher::config::Config::from_config(None::<&std::path::Path>)?;
    /// println!("{}", cfg);
    /// # Ok::<(), uptime_watcher::config::Error>(())
    /// ```
    pub fn from_config(optional_path: Option<impl AsRef<path::Path>>) -> Result<Self, Error> {
        let config_path: path::PathBuf = if let Some(path) = optional_path {
            normalize_toml_path(path.as_ref())
        } else {
            default_config_path()?
        };

        if config_path.exists() {
            let raw_string = fs::read_to_string(&config_path)
                .map_err(|source| Error::ReadFailed { path: config_path.clone(), source })?;
            Ok(toml::from_str(raw_string.as_str())?)
        } else {
            let config = Self::default();
            config.write_config(&config_path)?;
            Ok(config)
        }
    }

    /// Serialize and write a config to a file
    pub fn write_config(&self, path: &path::Path) -> Result<(), Error> {
        let config_str: String = toml::to_string_pretty(self)?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|source| Error::WriteFailed { path: parent.to_path_buf(), source })?;
        }

        fs::write(path, config_str)
            .map_err(|source| Error::WriteFailed { path: path.to_path_buf(), source })
    }

    /// Apply process environment overrides
    pub fn with_env_overrides(mut self) -> Self {
        self.apply_overrides(|name| env::var(name).ok());
        self
    }

    /// Apply overrides from any variable source
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        override_with(&lookup, "PARTITION_COUNT", &mut self.partition.count);
        override_with(&lookup, "PARTITION_ID", &mut self.partition.id);
        override_with(&lookup, "DB_PATH", &mut self.database.path);
        override_with(&lookup, "DB_MAX_CONNECTIONS", &mut self.database.max_connections);
        override_with(&lookup, "PROBE_TIMEOUT_SECS", &mut self.probe.timeout_seconds);
        override_with(&lookup, "COLLECTOR_TICK_MS", &mut self.collector.tick_interval_ms);
        override_with(&lookup, "BATCH_SIZE", &mut self.collector.max_batch);
        override_with(&lookup, "WORKER_COLLECTOR_RATIO", &mut self.collector.worker_collector_ratio);
        override_with(&lookup, "TELEMETRY_ENABLED", &mut self.telemetry.enabled);
        override_with(&lookup, "TELEMETRY_HOST", &mut self.telemetry.host);
        override_with(&lookup, "TELEMETRY_PORT", &mut self.telemetry.port);

        if let Some(capacity) = parse_override(&lookup, "BUFFER_CAPACITY") {
            self.collector.buffer_capacity = Some(capacity);
        }
    }

    /// Reject settings the pipeline cannot run with
    pub fn validate(&self) -> Result<(), Error> {
        let invalid = |key, reason| Err(Error::Invalid { key, reason });

        if self.database.max_connections == 0 {
            return invalid("database.max_connections", "must be at least 1");
        }
        if self.probe.timeout_seconds == 0 {
            return invalid("probe.timeout_seconds", "must be at least 1");
        }
        if self.collector.tick_interval_ms == 0 {
            return invalid("collector.tick_interval_ms", "must be at least 1");
        }
        if self.collector.max_batch == 0 || self.collector.max_batch > BATCH_LIMIT {
            return invalid("collector.max_batch", "must be between 1 and 10000");
        }
        if self.collector.worker_collector_ratio == 0 {
            return invalid("collector.worker_collector_ratio", "must be at least 1");
        }
        if self.collector.buffer_capacity == Some(0) {
            return invalid("collector.buffer_capacity", "must be at least 1 when set");
        }
        Ok(())
    }
}
