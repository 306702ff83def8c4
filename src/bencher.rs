//! Worker pool and run orchestration.
//!
//! Records are routed through the hash ring to a per-label worker. All
//! outcomes flow into one sink drained by the collector. Shutdown closes the
//! worker queues, joins every worker, and only then releases the last sink
//! sender, so the collector sees every outcome before it finalizes.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{info, instrument, warn};

use crate::collector::{self, Collected};
use crate::config::BenchConfig;
use crate::error::{BenchError, Result, Stage};
use crate::executor::ExecutorFactory;
use crate::report::RunReport;
use crate::ring::HashRing;
use crate::types::{PartitionLabel, Record};
use crate::worker::{enqueue_on, Outcome, Worker, WorkerSettings, WorkerState};

pub struct Bencher {
    ring: HashRing,
    /// Label to worker. Lookup-or-create happens under this one lock.
    workers: Mutex<HashMap<PartitionLabel, Worker>>,
    factory: Arc<dyn ExecutorFactory>,
    settings: WorkerSettings,
    outcomes: mpsc::Sender<Outcome>,
    collector: JoinHandle<Collected>,
    dispatched: AtomicU64,
    started_at: chrono::DateTime<Utc>,
    started: Instant,
}

impl Bencher {
    /// Build the ring over `config.workers` labels and start one worker per
    /// label, each with its own session from `factory`.
    #[instrument(skip(config, factory), fields(workers = config.workers))]
    pub async fn start(config: &BenchConfig, factory: Arc<dyn ExecutorFactory>) -> Result<Self> {
        if config.workers == 0 {
            return Err(BenchError::Config("worker count must be at least 1".into()));
        }
        let ring = HashRing::with_replicas(
            PartitionLabel::fixed_set(config.workers),
            config.ring_replicas,
        );
        Self::with_ring(
            ring,
            factory,
            config.worker_settings(),
            config.sink_capacity,
            true,
        )
        .await
    }

    /// Start over an explicit ring. With `prestart` unset, no worker exists
    /// until the first record resolves to its label.
    pub async fn with_ring(
        ring: HashRing,
        factory: Arc<dyn ExecutorFactory>,
        settings: WorkerSettings,
        sink_capacity: usize,
        prestart: bool,
    ) -> Result<Self> {
        if ring.is_empty() {
            return Err(BenchError::Routing("no nodes in hash ring".into()));
        }

        let (outcomes, sink) = mpsc::channel(sink_capacity.max(1));
        let collector = collector::spawn(sink);

        let mut workers = HashMap::new();
        if prestart {
            for label in ring.labels() {
                match Worker::start(label.clone(), factory.clone(), outcomes.clone(), settings).await
                {
                    Ok(worker) => {
                        workers.insert(label.clone(), worker);
                    }
                    Err(e) => {
                        for worker in workers.into_values() {
                            worker.join().await;
                        }
                        return Err(e);
                    }
                }
            }
        }

        info!(
            labels = ring.labels().len(),
            started = workers.len(),
            "worker pool ready"
        );

        Ok(Self {
            ring,
            workers: Mutex::new(workers),
            factory,
            settings,
            outcomes,
            collector,
            dispatched: AtomicU64::new(0),
            started_at: Utc::now(),
            started: Instant::now(),
        })
    }

    pub fn ring(&self) -> &HashRing {
        &self.ring
    }

    /// Records successfully handed to a worker so far.
    pub fn dispatched(&self) -> u64 {
        self.dispatched.load(Ordering::Relaxed)
    }

    pub async fn worker_states(&self) -> Vec<(PartitionLabel, WorkerState)> {
        let workers = self.workers.lock().await;
        let mut states: Vec<_> = workers
            .iter()
            .map(|(label, worker)| (label.clone(), worker.state()))
            .collect();
        states.sort_by(|a, b| a.0.cmp(&b.0));
        states
    }

    /// Route `record` to its label's worker, creating the worker if the label
    /// has none yet. Safe to call from several tasks at once.
    ///
    /// # Errors
    /// `BenchError::Routing` (fatal) if the ring cannot resolve the key;
    /// `BenchError::Dispatch` if the worker cannot be created or has stopped.
    pub async fn dispatch(&self, record: Record) -> Result<()> {
        let label = self
            .ring
            .resolve(&record.partition_key)
            .cloned()
            .ok_or_else(|| BenchError::Routing("no nodes in hash ring".into()))?;

        let sender = {
            let mut workers = self.workers.lock().await;
            match workers.entry(label.clone()) {
                Entry::Occupied(entry) => entry.get().sender()?,
                Entry::Vacant(slot) => {
                    // Not reached with a ring built from the prestarted labels.
                    warn!(label = %label, "no worker for label, creating one");
                    let worker = Worker::start(
                        label.clone(),
                        self.factory.clone(),
                        self.outcomes.clone(),
                        self.settings,
                    )
                    .await
                    .map_err(|e| BenchError::Dispatch {
                        label: label.to_string(),
                        reason: format!("starting worker: {e}"),
                    })?;
                    let sender = worker.sender()?;
                    slot.insert(worker);
                    sender
                }
            }
        };

        enqueue_on(&label, &sender, record).await?;
        self.dispatched.fetch_add(1, Ordering::Relaxed);
        crate::metrics::RECORDS_DISPATCHED_TOTAL.inc();
        Ok(())
    }

    /// Report a per-record failure raised outside the workers. Fatal errors
    /// are handed back instead.
    pub async fn report(&self, err: BenchError) -> Result<()> {
        if err.is_fatal() {
            return Err(err);
        }
        warn!(stage = %err.stage(), error = %err, "record skipped");
        self.outcomes
            .send(Outcome::Failure(err))
            .await
            .map_err(|_| BenchError::Internal("outcome sink closed before shutdown".into()))
    }

    /// Dispatch every record from `records` until the channel closes, then
    /// drain and return the report.
    pub async fn run(self, records: mpsc::Receiver<Result<Record>>) -> Result<RunReport> {
        self.run_until(records, None).await
    }

    /// Like `run`, but a `true` on `shutdown` is treated as end of stream.
    #[instrument(skip_all)]
    pub async fn run_until(
        self,
        records: mpsc::Receiver<Result<Record>>,
        shutdown: Option<watch::Receiver<bool>>,
    ) -> Result<RunReport> {
        let pumped = self.pump(records, shutdown).await;
        let report = self.finish().await?;
        pumped.map(|_| report)
    }

    async fn pump(
        &self,
        mut records: mpsc::Receiver<Result<Record>>,
        shutdown: Option<watch::Receiver<bool>>,
    ) -> Result<()> {
        let (mut shutdown, mut watching) = match shutdown {
            Some(rx) => (rx, true),
            None => (watch::channel(false).1, false),
        };

        loop {
            tokio::select! {
                biased;
                changed = shutdown.changed(), if watching => {
                    if changed.is_err() {
                        watching = false;
                    } else if *shutdown.borrow() {
                        warn!(dispatched = self.dispatched(), "shutdown requested, draining workers");
                        return Ok(());
                    }
                }
                item = records.recv() => match item {
                    None => return Ok(()),
                    Some(Ok(record)) => {
                        if let Err(e) = self.dispatch(record).await {
                            self.report(e).await?;
                        }
                    }
                    Some(Err(e)) => self.report(e).await?,
                },
            }
        }
    }

    /// Close every inbound queue, wait for all workers, close the sink and
    /// collect the finalized statistics.
    pub async fn finish(self) -> Result<RunReport> {
        let Bencher {
            workers,
            outcomes,
            collector,
            dispatched,
            started_at,
            started,
            ..
        } = self;

        let mut workers: Vec<Worker> = workers.into_inner().into_values().collect();
        for worker in workers.iter_mut() {
            worker.close();
        }

        let mut summaries =
            futures::future::join_all(workers.into_iter().map(Worker::join)).await;
        summaries.sort_by(|a, b| a.label.cmp(&b.label));

        // Workers held the other senders; this was the last one.
        drop(outcomes);
        let collected = collector
            .await
            .map_err(|e| BenchError::Internal(format!("collector task failed: {e}")))?;

        let report = RunReport {
            started_at,
            elapsed: started.elapsed(),
            workers: summaries,
            records_dispatched: dispatched.into_inner(),
            query_failures: collected.failures_at(Stage::Query),
            record_errors: collected.failures_at(Stage::Record),
            dispatch_failures: collected.failures_at(Stage::Dispatch),
            latency: collected.latency.ok(),
        };

        info!(
            dispatched = report.records_dispatched,
            succeeded = report.successes(),
            failed = report.total_failures(),
            elapsed_ms = report.elapsed.as_millis() as u64,
            "run complete"
        );
        Ok(report)
    }
}
