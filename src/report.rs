//! Run report: latency summary plus the counters needed to judge it.

use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::error::{BenchError, Result};
use crate::stats::LatencySummary;
use crate::worker::WorkerSummary;

#[derive(Debug, Clone)]
pub struct RunReport {
    pub started_at: DateTime<Utc>,
    pub elapsed: Duration,
    pub workers: Vec<WorkerSummary>,
    /// Records handed to a worker, i.e. queries attempted.
    pub records_dispatched: u64,
    pub query_failures: u64,
    /// Rows skipped before dispatch because they could not be parsed.
    pub record_errors: u64,
    pub dispatch_failures: u64,
    /// `None` when no query succeeded.
    pub latency: Option<LatencySummary>,
}

impl RunReport {
    /// The finalized latency summary.
    ///
    /// # Errors
    /// `BenchError::EmptySample` when no query produced a latency.
    pub fn latency(&self) -> Result<&LatencySummary> {
        self.latency.as_ref().ok_or(BenchError::EmptySample)
    }

    pub fn successes(&self) -> u64 {
        self.latency.map(|l| l.count).unwrap_or(0)
    }

    pub fn total_failures(&self) -> u64 {
        self.query_failures + self.record_errors + self.dispatch_failures
    }

    pub fn to_json(&self) -> serde_json::Value {
        let latency = self.latency.map(|l| {
            serde_json::json!({
                "count": l.count,
                "total_ms": millis(l.total),
                "min_ms": millis(l.min),
                "max_ms": millis(l.max),
                "mean_ms": millis(l.average),
                "median_ms": millis(l.median),
            })
        });

        serde_json::json!({
            "timestamp": self.started_at.to_rfc3339(),
            "elapsed_secs": self.elapsed.as_secs_f64(),
            "records_dispatched": self.records_dispatched,
            "query_failures": self.query_failures,
            "record_errors": self.record_errors,
            "dispatch_failures": self.dispatch_failures,
            "workers": self.workers,
            "latency": latency,
        })
    }
}

fn millis(d: Duration) -> f64 {
    d.as_nanos() as f64 / 1_000_000.0
}

impl std::fmt::Display for RunReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "run started: {}", self.started_at.to_rfc3339())?;
        writeln!(f, "wall time: {:?}", self.elapsed)?;
        writeln!(f, "workers: {}", self.workers.len())?;
        writeln!(f, "total records attempted: {}", self.records_dispatched)?;
        writeln!(f, "failed queries: {}", self.query_failures)?;
        if self.record_errors > 0 {
            writeln!(f, "skipped malformed records: {}", self.record_errors)?;
        }
        if self.dispatch_failures > 0 {
            writeln!(f, "failed dispatches: {}", self.dispatch_failures)?;
        }
        writeln!(f, "total failures: {}", self.total_failures())?;
        match &self.latency {
            Some(summary) => write!(f, "{summary}"),
            None => writeln!(f, "no successful queries, latency statistics unavailable"),
        }
    }
}
