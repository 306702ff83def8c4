use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{BenchError, Result};
use crate::ring::DEFAULT_REPLICAS;
use crate::worker::WorkerSettings;

/// Environment variable naming a TOML config file.
pub const CONFIG_PATH_ENV: &str = "TSBENCH_CONFIG";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub database: DatabaseConfig,
    pub bench: BenchConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Hostname with optional port, e.g. `localhost:5432`.
    pub host: String,
    pub user: String,
    #[serde(skip_serializing)]
    pub password: String,
    pub dbname: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            host: "localhost:5432".into(),
            user: "postgres".into(),
            password: String::new(),
            dbname: "homework".into(),
        }
    }
}

impl DatabaseConfig {
    /// Build the `postgres://` connection URL with credentials percent-encoded.
    pub fn url(&self) -> Result<String> {
        let mut url = Url::parse(&format!("postgres://{}", self.host))
            .map_err(|e| BenchError::Config(format!("invalid database host '{}': {e}", self.host)))?;
        url.set_path(&format!("/{}", self.dbname));
        url.set_username(&self.user)
            .map_err(|_| BenchError::Config("database url cannot carry a username".into()))?;
        if !self.password.is_empty() {
            url.set_password(Some(&self.password))
                .map_err(|_| BenchError::Config("database url cannot carry a password".into()))?;
        }
        Ok(url.into())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BenchConfig {
    /// Number of workers, and therefore of ring labels and store sessions.
    pub workers: usize,
    /// CSV file holding the query parameters.
    pub input: Option<PathBuf>,
    pub query_timeout_ms: u64,
    /// Capacity of each worker's inbound queue.
    pub queue_capacity: usize,
    /// Capacity of the shared outcome sink.
    pub sink_capacity: usize,
    /// Virtual points per label on the hash ring.
    pub ring_replicas: usize,
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            input: None,
            query_timeout_ms: 5_000,
            queue_capacity: 1,
            sink_capacity: 100,
            ring_replicas: DEFAULT_REPLICAS,
        }
    }
}

impl BenchConfig {
    pub fn query_timeout(&self) -> Duration {
        Duration::from_millis(self.query_timeout_ms)
    }

    pub fn worker_settings(&self) -> WorkerSettings {
        WorkerSettings {
            query_timeout: self.query_timeout(),
            queue_capacity: self.queue_capacity,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// `text` or `json`.
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}

impl Config {
    /// Load configuration: defaults, then the TOML file at `path` (or the one
    /// named by `TSBENCH_CONFIG`), then `TSBENCH_*` environment overrides.
    pub fn load(path: Option<&str>) -> Result<Self> {
        let path = path
            .map(str::to_string)
            .or_else(|| std::env::var(CONFIG_PATH_ENV).ok());

        let mut config = match path {
            Some(p) => Self::from_file(Path::new(&p))?,
            None => Self::default(),
        };
        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            BenchError::Config(format!("reading config file {}: {e}", path.display()))
        })?;
        Self::from_toml(&raw)
    }

    pub fn from_toml(raw: &str) -> Result<Self> {
        Ok(toml::from_str(raw)?)
    }

    /// Apply `TSBENCH_*` overrides using `lookup` to read variables.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("TSBENCH_DB_HOST") {
            self.database.host = v;
        }
        if let Some(v) = lookup("TSBENCH_DB_USER") {
            self.database.user = v;
        }
        if let Some(v) = lookup("TSBENCH_DB_PASSWORD") {
            self.database.password = v;
        }
        if let Some(v) = lookup("TSBENCH_DB_NAME") {
            self.database.dbname = v;
        }
        if let Some(v) = lookup("TSBENCH_WORKERS") {
            self.bench.workers = parse_env("TSBENCH_WORKERS", &v)?;
        }
        if let Some(v) = lookup("TSBENCH_INPUT") {
            self.bench.input = Some(PathBuf::from(v));
        }
        if let Some(v) = lookup("TSBENCH_QUERY_TIMEOUT_MS") {
            self.bench.query_timeout_ms = parse_env("TSBENCH_QUERY_TIMEOUT_MS", &v)?;
        }
        if let Some(v) = lookup("TSBENCH_LOG_LEVEL") {
            self.logging.level = v;
        }
        if let Some(v) = lookup("TSBENCH_LOG_FORMAT") {
            self.logging.format = v;
        }
        Ok(())
    }

    /// Reject configurations that cannot produce a meaningful run.
    pub fn validate(&self) -> Result<()> {
        if self.database.host.trim().is_empty() {
            return Err(BenchError::Config("database host must be set".into()));
        }
        if self.database.dbname.trim().is_empty() {
            return Err(BenchError::Config("database name must be set".into()));
        }
        if self.bench.workers == 0 {
            return Err(BenchError::Config("worker count must be at least 1".into()));
        }
        if self.bench.query_timeout_ms == 0 {
            return Err(BenchError::Config("query timeout must be > 0".into()));
        }
        if self.bench.queue_capacity == 0 || self.bench.sink_capacity == 0 {
            return Err(BenchError::Config("queue and sink capacities must be > 0".into()));
        }
        if self.bench.ring_replicas == 0 {
            return Err(BenchError::Config("ring replicas must be > 0".into()));
        }
        match self.logging.format.as_str() {
            "text" | "json" => Ok(()),
            other => Err(BenchError::Config(format!(
                "unknown log format '{other}', expected 'text' or 'json'"
            ))),
        }
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| BenchError::Config(format!("{key}={value}: {e}")))
}
