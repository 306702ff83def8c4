//! Online latency aggregation.
//!
//! Every observation is kept in two heaps, one with the minimum on top and one
//! with the maximum on top. Finalization peels both heaps in lock-step from
//! opposite ends of the distribution until the two cursors meet; the last
//! popped pair straddles the middle, which yields the exact median.

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, warn};

use crate::error::{BenchError, Result};

/// Finalized summary of a run's latencies.
///
/// `average` and `median` are floored to whole nanoseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LatencySummary {
    pub count: u64,
    pub total: Duration,
    pub min: Duration,
    pub max: Duration,
    pub average: Duration,
    pub median: Duration,
}

enum State {
    Observing {
        min_heap: BinaryHeap<Reverse<Duration>>,
        max_heap: BinaryHeap<Duration>,
    },
    Finalized(LatencySummary),
}

pub struct LatencyStats {
    count: u64,
    total: Duration,
    state: State,
}

impl LatencyStats {
    pub fn new() -> Self {
        Self {
            count: 0,
            total: Duration::ZERO,
            state: State::Observing {
                min_heap: BinaryHeap::new(),
                max_heap: BinaryHeap::new(),
            },
        }
    }

    /// Record one latency sample. Samples arriving after finalization are dropped.
    pub fn observe(&mut self, latency: Duration) {
        match &mut self.state {
            State::Observing { min_heap, max_heap } => {
                min_heap.push(Reverse(latency));
                max_heap.push(latency);
                self.count += 1;
                self.total += latency;
            }
            State::Finalized(_) => {
                warn!(latency_us = latency.as_micros() as u64, "sample observed after finalize, dropped");
            }
        }
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn total(&self) -> Duration {
        self.total
    }

    pub fn is_finalized(&self) -> bool {
        matches!(self.state, State::Finalized(_))
    }

    /// Compute the summary. The heaps are consumed on the first call; later
    /// calls return the cached summary.
    ///
    /// # Errors
    /// Returns `BenchError::EmptySample` if nothing was observed.
    pub fn finalize(&mut self) -> Result<LatencySummary> {
        let (min_heap, max_heap) = match &mut self.state {
            State::Finalized(summary) => return Ok(*summary),
            State::Observing { min_heap, max_heap } => (min_heap, max_heap),
        };

        if self.count == 0 {
            return Err(BenchError::EmptySample);
        }

        let (min, max) = match (min_heap.pop(), max_heap.pop()) {
            (Some(Reverse(lo)), Some(hi)) => (lo, hi),
            _ => return Err(BenchError::EmptySample),
        };

        let (mut lo, mut hi) = (min, max);
        let mut peeled = 1u64;
        while lo < hi {
            match (min_heap.pop(), max_heap.pop()) {
                (Some(Reverse(next_lo)), Some(next_hi)) => {
                    lo = next_lo;
                    hi = next_hi;
                    peeled += 1;
                }
                // Both heaps hold every sample, so the cursors cross before
                // either runs dry.
                _ => break,
            }
        }

        let median = Duration::from_nanos(((lo.as_nanos() + hi.as_nanos()) / 2) as u64);
        let average = Duration::from_nanos((self.total.as_nanos() / self.count as u128) as u64);

        let summary = LatencySummary {
            count: self.count,
            total: self.total,
            min,
            max,
            average,
            median,
        };

        debug!(count = self.count, peeled, "latency stats finalized");
        self.state = State::Finalized(summary);
        Ok(summary)
    }
}

impl Default for LatencyStats {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for LatencySummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "total number of queries: {}", self.count)?;
        writeln!(f, "total time spent: {:?}", self.total)?;
        writeln!(f, "maximum query time: {:?}", self.max)?;
        writeln!(f, "minimum query time: {:?}", self.min)?;
        writeln!(f, "average query time: {:?}", self.average)?;
        writeln!(f, "median query time: {:?}", self.median)
    }
}
