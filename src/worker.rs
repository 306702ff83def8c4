//! A worker owns one label's inbound queue and one store session, and runs
//! that label's queries strictly one at a time in arrival order.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use crate::error::{BenchError, Result};
use crate::executor::{ExecutorFactory, QueryExecutor};
use crate::types::{PartitionLabel, Record};

/// Per-query deadline used when none is configured.
pub const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(5);

/// Result of one record, as delivered to the outcome sink.
#[derive(Debug)]
pub enum Outcome {
    Latency(Duration),
    Failure(BenchError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerState {
    /// Session open, loop started, nothing dequeued yet.
    Idle,
    Running,
    /// Inbound queue closed; remaining queued records are still executed.
    Draining,
    Done,
}

#[derive(Debug, Clone, Copy)]
pub struct WorkerSettings {
    pub query_timeout: Duration,
    pub queue_capacity: usize,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            query_timeout: DEFAULT_QUERY_TIMEOUT,
            queue_capacity: 1,
        }
    }
}

/// Counters a worker reports once it is done.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct WorkerSummary {
    pub label: PartitionLabel,
    pub executed: u64,
    pub failed: u64,
}

pub struct Worker {
    label: PartitionLabel,
    inbox: Option<mpsc::Sender<Record>>,
    state: Arc<watch::Sender<WorkerState>>,
    handle: JoinHandle<WorkerSummary>,
}

impl Worker {
    /// Open a session through `factory` and start the execution loop.
    pub async fn start(
        label: PartitionLabel,
        factory: Arc<dyn ExecutorFactory>,
        outcomes: mpsc::Sender<Outcome>,
        settings: WorkerSettings,
    ) -> Result<Self> {
        let executor = factory.connect(&label).await?;

        let (inbox_tx, inbox_rx) = mpsc::channel(settings.queue_capacity.max(1));
        let (state_tx, _) = watch::channel(WorkerState::Idle);
        let state = Arc::new(state_tx);

        let run = WorkerLoop {
            label: label.clone(),
            executor: Some(executor),
            factory,
            inbox: inbox_rx,
            outcomes,
            state: state.clone(),
            query_timeout: settings.query_timeout,
            summary: WorkerSummary {
                label: label.clone(),
                executed: 0,
                failed: 0,
            },
        };
        let handle = tokio::spawn(run.run());

        crate::metrics::WORKERS_CREATED_TOTAL.inc();
        debug!(label = %label, "worker started");

        Ok(Self {
            label,
            inbox: Some(inbox_tx),
            state,
            handle,
        })
    }

    pub fn label(&self) -> &PartitionLabel {
        &self.label
    }

    pub fn state(&self) -> WorkerState {
        *self.state.borrow()
    }

    /// Subscribe to lifecycle transitions.
    pub fn watch_state(&self) -> watch::Receiver<WorkerState> {
        self.state.subscribe()
    }

    /// A handle for enqueueing without holding on to the worker itself.
    pub fn sender(&self) -> Result<mpsc::Sender<Record>> {
        self.inbox.clone().ok_or_else(|| BenchError::Dispatch {
            label: self.label.to_string(),
            reason: "inbound queue already closed".into(),
        })
    }

    /// Queue a record, waiting while the inbound queue is full.
    pub async fn enqueue(&self, record: Record) -> Result<()> {
        let sender = self.sender()?;
        enqueue_on(&self.label, &sender, record).await
    }

    /// Close the inbound queue. Records already queued are still executed.
    pub fn close(&mut self) {
        if self.inbox.take().is_some() {
            self.state.send_if_modified(|state| {
                if *state == WorkerState::Done {
                    return false;
                }
                *state = WorkerState::Draining;
                true
            });
        }
    }

    /// Close the queue and wait for the loop to finish its last record.
    pub async fn join(mut self) -> WorkerSummary {
        self.close();
        match self.handle.await {
            Ok(summary) => summary,
            Err(e) => {
                error!(label = %self.label, error = %e, "worker task aborted");
                self.state.send_replace(WorkerState::Done);
                WorkerSummary {
                    label: self.label,
                    executed: 0,
                    failed: 0,
                }
            }
        }
    }
}

/// Send `record` on a worker's inbound queue.
pub(crate) async fn enqueue_on(
    label: &PartitionLabel,
    sender: &mpsc::Sender<Record>,
    record: Record,
) -> Result<()> {
    sender.send(record).await.map_err(|_| BenchError::Dispatch {
        label: label.to_string(),
        reason: "worker is no longer accepting records".into(),
    })
}

struct WorkerLoop {
    label: PartitionLabel,
    /// `None` after the session was discarded; reopened on the next record.
    executor: Option<Box<dyn QueryExecutor>>,
    factory: Arc<dyn ExecutorFactory>,
    inbox: mpsc::Receiver<Record>,
    outcomes: mpsc::Sender<Outcome>,
    state: Arc<watch::Sender<WorkerState>>,
    query_timeout: Duration,
    summary: WorkerSummary,
}

impl WorkerLoop {
    async fn run(mut self) -> WorkerSummary {
        while let Some(record) = self.inbox.recv().await {
            self.state.send_if_modified(|state| {
                if *state == WorkerState::Idle {
                    *state = WorkerState::Running;
                    return true;
                }
                false
            });

            let outcome = self.execute(&record).await;
            self.summary.executed += 1;
            if let Outcome::Failure(ref e) = outcome {
                self.summary.failed += 1;
                warn!(
                    label = %self.label,
                    key = %record.partition_key,
                    error = %e,
                    "query failed"
                );
            }

            if self.outcomes.send(outcome).await.is_err() {
                // Only reachable if the collector died.
                error!(label = %self.label, "outcome sink closed, stopping worker");
                break;
            }
        }

        self.state.send_replace(WorkerState::Done);
        debug!(
            label = %self.label,
            executed = self.summary.executed,
            failed = self.summary.failed,
            "worker done"
        );
        self.summary
    }

    async fn execute(&mut self, record: &Record) -> Outcome {
        if self.executor.is_none() {
            match self.factory.connect(&self.label).await {
                Ok(executor) => self.executor = Some(executor),
                Err(e) => {
                    return Outcome::Failure(BenchError::Query {
                        label: self.label.to_string(),
                        reason: format!("reconnecting session: {e}"),
                    })
                }
            }
        }
        let Some(executor) = self.executor.as_mut() else {
            return Outcome::Failure(BenchError::Query {
                label: self.label.to_string(),
                reason: "worker has no session".into(),
            });
        };

        let start = Instant::now();
        let result = tokio::time::timeout(self.query_timeout, executor.execute(record)).await;
        let elapsed = start.elapsed();

        match result {
            Ok(Ok(rows)) => {
                crate::metrics::QUERIES_TOTAL
                    .with_label_values(&[self.label.as_str()])
                    .inc();
                crate::metrics::QUERY_DURATION
                    .with_label_values(&[self.label.as_str()])
                    .observe(elapsed.as_secs_f64());
                debug!(
                    label = %self.label,
                    key = %record.partition_key,
                    rows,
                    elapsed_us = elapsed.as_micros() as u64,
                    "query complete"
                );
                Outcome::Latency(elapsed)
            }
            Ok(Err(e)) => {
                if poisons_session(&e) {
                    self.executor = None;
                }
                Outcome::Failure(BenchError::Query {
                    label: self.label.to_string(),
                    reason: e.to_string(),
                })
            }
            Err(_) => {
                // The abandoned query may still be in flight on this session.
                self.executor = None;
                Outcome::Failure(BenchError::QueryTimeout {
                    label: self.label.to_string(),
                    timeout: self.query_timeout,
                })
            }
        }
    }
}

fn poisons_session(err: &BenchError) -> bool {
    matches!(
        err,
        BenchError::Database(sqlx::Error::Io(_))
            | BenchError::Database(sqlx::Error::Protocol(_))
            | BenchError::Database(sqlx::Error::Tls(_))
    )
}
