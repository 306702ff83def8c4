//! Query execution seam between workers and the store.
//!
//! Workers only see the `QueryExecutor` / `ExecutorFactory` traits, so the
//! engine can be driven by a real PostgreSQL session or by an in-memory
//! executor in tests.

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::postgres::{PgConnectOptions, PgConnection};
use sqlx::Connection;
use tracing::{debug, instrument};

use crate::error::{BenchError, Result};
use crate::types::{PartitionLabel, Record};

/// The single query shape being benchmarked: per-minute max/min CPU usage of
/// one host over a time range.
pub const CPU_USAGE_QUERY: &str = "SELECT host, DATE_TRUNC('minute', ts), max(usage), min(usage)
	FROM cpu_usage
	WHERE host = $1
	AND ts BETWEEN $2 AND $3
	GROUP BY host, DATE_TRUNC('minute', ts)";

/// A session able to run the benchmark query for one record at a time.
#[async_trait]
pub trait QueryExecutor: Send {
    /// Execute the query for `record`, returning the number of rows read.
    ///
    /// The result set itself is discarded. Deadlines are enforced by the
    /// caller; implementations must be cancel-safe in the sense that a
    /// dropped future leaves no state the next call depends on, or the
    /// caller must discard the executor afterwards (workers do the latter).
    async fn execute(&mut self, record: &Record) -> Result<u64>;
}

/// Opens one executor per worker.
#[async_trait]
pub trait ExecutorFactory: Send + Sync {
    async fn connect(&self, label: &PartitionLabel) -> Result<Box<dyn QueryExecutor>>;
}

/// `QueryExecutor` backed by a dedicated PostgreSQL connection.
pub struct PgExecutor {
    conn: PgConnection,
}

impl PgExecutor {
    pub async fn connect(options: &PgConnectOptions) -> Result<Self> {
        let conn = PgConnection::connect_with(options).await?;
        Ok(Self { conn })
    }
}

#[async_trait]
impl QueryExecutor for PgExecutor {
    async fn execute(&mut self, record: &Record) -> Result<u64> {
        let rows = sqlx::query(CPU_USAGE_QUERY)
            .bind(&record.partition_key)
            .bind(record.range_start)
            .bind(record.range_end)
            .fetch_all(&mut self.conn)
            .await?;
        Ok(rows.len() as u64)
    }
}

/// Connects a fresh PostgreSQL session for every worker.
#[derive(Clone)]
pub struct PgExecutorFactory {
    options: Arc<PgConnectOptions>,
}

impl PgExecutorFactory {
    pub fn new(options: PgConnectOptions) -> Self {
        Self {
            options: Arc::new(options),
        }
    }

    /// Parse a `postgres://` connection URL.
    pub fn from_url(url: &str) -> Result<Self> {
        let options: PgConnectOptions = url
            .parse()
            .map_err(|e: sqlx::Error| BenchError::Config(format!("invalid database url: {e}")))?;
        Ok(Self::new(options))
    }
}

#[async_trait]
impl ExecutorFactory for PgExecutorFactory {
    #[instrument(skip_all, fields(label = %label))]
    async fn connect(&self, label: &PartitionLabel) -> Result<Box<dyn QueryExecutor>> {
        let executor = PgExecutor::connect(&self.options).await?;
        debug!("worker session established");
        Ok(Box::new(executor))
    }
}
