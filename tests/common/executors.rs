use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use tsbench::error::{BenchError, Result};
use tsbench::executor::{ExecutorFactory, QueryExecutor};
use tsbench::types::{PartitionLabel, Record};

/// One executed query as seen by the instrumented executor.
#[derive(Debug, Clone)]
pub struct Execution {
    pub label: PartitionLabel,
    pub record: Record,
}

#[derive(Default)]
struct Behaviour {
    fail_keys: HashSet<String>,
    hang_keys: HashSet<String>,
    latency: Duration,
    refuse_connect: bool,
}

/// Factory handing out executors that log every call in arrival order and
/// can be told to fail or hang for specific partition keys.
#[derive(Clone, Default)]
pub struct ScriptedFactory {
    behaviour: Arc<Behaviour>,
    log: Arc<Mutex<Vec<Execution>>>,
    connects: Arc<Mutex<HashMap<PartitionLabel, usize>>>,
}

impl ScriptedFactory {
    pub fn new() -> Self {
        Self::default()
    }

    fn with(self, f: impl FnOnce(&mut Behaviour)) -> Self {
        let mut behaviour = Behaviour {
            fail_keys: self.behaviour.fail_keys.clone(),
            hang_keys: self.behaviour.hang_keys.clone(),
            latency: self.behaviour.latency,
            refuse_connect: self.behaviour.refuse_connect,
        };
        f(&mut behaviour);
        Self {
            behaviour: Arc::new(behaviour),
            ..self
        }
    }

    /// Queries for `key` fail immediately.
    pub fn failing(self, key: &str) -> Self {
        let key = key.to_string();
        self.with(|b| {
            b.fail_keys.insert(key);
        })
    }

    /// Queries for `key` never return on their own.
    pub fn hanging(self, key: &str) -> Self {
        let key = key.to_string();
        self.with(|b| {
            b.hang_keys.insert(key);
        })
    }

    /// Every successful query sleeps for `latency` first.
    pub fn with_latency(self, latency: Duration) -> Self {
        self.with(|b| b.latency = latency)
    }

    /// `connect` always fails.
    pub fn refusing_connections(self) -> Self {
        self.with(|b| b.refuse_connect = true)
    }

    pub fn executions(&self) -> Vec<Execution> {
        self.log.lock().unwrap().clone()
    }

    pub fn connects(&self) -> HashMap<PartitionLabel, usize> {
        self.connects.lock().unwrap().clone()
    }

    pub fn as_factory(&self) -> Arc<dyn ExecutorFactory> {
        Arc::new(self.clone())
    }
}

#[async_trait]
impl ExecutorFactory for ScriptedFactory {
    async fn connect(&self, label: &PartitionLabel) -> Result<Box<dyn QueryExecutor>> {
        if self.behaviour.refuse_connect {
            return Err(BenchError::Query {
                label: label.to_string(),
                reason: "connection refused".into(),
            });
        }
        *self
            .connects
            .lock()
            .unwrap()
            .entry(label.clone())
            .or_insert(0) += 1;
        Ok(Box::new(ScriptedExecutor {
            label: label.clone(),
            behaviour: self.behaviour.clone(),
            log: self.log.clone(),
        }))
    }
}

struct ScriptedExecutor {
    label: PartitionLabel,
    behaviour: Arc<Behaviour>,
    log: Arc<Mutex<Vec<Execution>>>,
}

#[async_trait]
impl QueryExecutor for ScriptedExecutor {
    async fn execute(&mut self, record: &Record) -> Result<u64> {
        self.log.lock().unwrap().push(Execution {
            label: self.label.clone(),
            record: record.clone(),
        });

        if self.behaviour.fail_keys.contains(&record.partition_key) {
            return Err(BenchError::Query {
                label: self.label.to_string(),
                reason: format!("relation \"cpu_usage\" rejected {}", record.partition_key),
            });
        }
        if self.behaviour.hang_keys.contains(&record.partition_key) {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        if !self.behaviour.latency.is_zero() {
            tokio::time::sleep(self.behaviour.latency).await;
        }
        Ok(30)
    }
}
