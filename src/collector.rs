//! Single consumer of the outcome sink.

use std::collections::BTreeMap;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::error::{BenchError, Stage};
use crate::stats::{LatencyStats, LatencySummary};
use crate::worker::Outcome;

/// What the collector saw by the time the sink closed.
#[derive(Debug)]
pub struct Collected {
    /// `Err(EmptySample)` when no query succeeded.
    pub latency: std::result::Result<LatencySummary, BenchError>,
    pub failures: BTreeMap<Stage, u64>,
}

impl Collected {
    pub fn failures_at(&self, stage: Stage) -> u64 {
        self.failures.get(&stage).copied().unwrap_or(0)
    }

    pub fn total_failures(&self) -> u64 {
        self.failures.values().sum()
    }
}

/// Drain `outcomes` until every sender is gone, then finalize.
pub fn spawn(outcomes: mpsc::Receiver<Outcome>) -> JoinHandle<Collected> {
    tokio::spawn(collect(outcomes))
}

pub async fn collect(mut outcomes: mpsc::Receiver<Outcome>) -> Collected {
    let mut stats = LatencyStats::new();
    let mut failures: BTreeMap<Stage, u64> = BTreeMap::new();

    while let Some(outcome) = outcomes.recv().await {
        match outcome {
            Outcome::Latency(latency) => stats.observe(latency),
            Outcome::Failure(e) => {
                let stage = e.stage();
                crate::metrics::QUERY_FAILURES_TOTAL
                    .with_label_values(&[&stage.to_string()])
                    .inc();
                debug!(stage = %stage, error = %e, "failure collected");
                *failures.entry(stage).or_insert(0) += 1;
            }
        }
    }

    info!(
        samples = stats.count(),
        failures = failures.values().sum::<u64>(),
        "outcome sink closed, finalizing"
    );

    Collected {
        latency: stats.finalize(),
        failures,
    }
}
