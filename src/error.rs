use std::time::Duration;

use thiserror::Error;

/// Pipeline stage at which an error was raised.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Stage {
    Config,
    Routing,
    Record,
    Dispatch,
    Query,
    Stats,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Stage::Config => write!(f, "config"),
            Stage::Routing => write!(f, "routing"),
            Stage::Record => write!(f, "record"),
            Stage::Dispatch => write!(f, "dispatch"),
            Stage::Query => write!(f, "query"),
            Stage::Stats => write!(f, "stats"),
        }
    }
}

#[derive(Error, Debug)]
pub enum BenchError {
    // Structural errors
    #[error("config error: {0}")]
    Config(String),

    #[error("routing error: {0}")]
    Routing(String),

    // Per-record errors
    #[error("malformed record at line {line}: {reason}")]
    Record { line: u64, reason: String },

    #[error("dispatch to worker {label} failed: {reason}")]
    Dispatch { label: String, reason: String },

    #[error("query on worker {label} failed: {reason}")]
    Query { label: String, reason: String },

    #[error("query on worker {label} exceeded deadline of {timeout:?}")]
    QueryTimeout { label: String, timeout: Duration },

    // Statistics
    #[error("no latency samples were observed")]
    EmptySample,

    // Wrapped library errors
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("toml parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    // Internal
    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, BenchError>;

impl BenchError {
    pub fn stage(&self) -> Stage {
        match self {
            BenchError::Config(_) | BenchError::TomlParse(_) => Stage::Config,
            BenchError::Routing(_) => Stage::Routing,
            BenchError::Record { .. } => Stage::Record,
            BenchError::Dispatch { .. } | BenchError::Internal(_) => Stage::Dispatch,
            BenchError::Query { .. }
            | BenchError::QueryTimeout { .. }
            | BenchError::Database(_) => Stage::Query,
            BenchError::EmptySample => Stage::Stats,
        }
    }

    /// Structural errors stop the run before useful work begins.
    pub fn is_fatal(&self) -> bool {
        matches!(self.stage(), Stage::Config | Stage::Routing)
    }
}
