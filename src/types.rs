use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::error::{BenchError, Result};

/// Timestamp layout used by the query parameter files.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Layouts tried in order when parsing a timestamp field.
pub const ACCEPTED_TIMESTAMP_FORMATS: &[&str] = &[
    TIMESTAMP_FORMAT,
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
];

/// One time-range lookup to replay against the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    /// Key used to pick a worker (the host identifier).
    pub partition_key: String,
    pub range_start: NaiveDateTime,
    pub range_end: NaiveDateTime,
}

impl Record {
    pub fn new(
        partition_key: impl Into<String>,
        range_start: NaiveDateTime,
        range_end: NaiveDateTime,
    ) -> Self {
        Self {
            partition_key: partition_key.into(),
            range_start,
            range_end,
        }
    }

    /// Build a record from raw fields. `line` is only used for error reporting.
    ///
    /// Fields beyond the first three are ignored.
    pub fn from_fields<S: AsRef<str>>(fields: &[S], line: u64) -> Result<Self> {
        if fields.len() < 3 {
            return Err(BenchError::Record {
                line,
                reason: format!("expected at least 3 fields, got {}", fields.len()),
            });
        }

        let partition_key = fields[0].as_ref().trim();
        if partition_key.is_empty() {
            return Err(BenchError::Record {
                line,
                reason: "empty partition key".into(),
            });
        }

        let range_start = parse_timestamp(fields[1].as_ref(), line)?;
        let range_end = parse_timestamp(fields[2].as_ref(), line)?;
        if range_start > range_end {
            return Err(BenchError::Record {
                line,
                reason: format!("range start {range_start} is after range end {range_end}"),
            });
        }

        Ok(Self::new(partition_key, range_start, range_end))
    }
}

fn parse_timestamp(raw: &str, line: u64) -> Result<NaiveDateTime> {
    let trimmed = raw.trim();
    ACCEPTED_TIMESTAMP_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(trimmed, format).ok())
        .ok_or_else(|| BenchError::Record {
            line,
            reason: format!(
                "invalid timestamp '{raw}': expected one of {}",
                ACCEPTED_TIMESTAMP_FORMATS.join(", ")
            ),
        })
}

/// Identifier of a node on the hash ring. Each label owns exactly one worker.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PartitionLabel(String);

impl PartitionLabel {
    pub fn new(label: impl Into<String>) -> Self {
        Self(label.into())
    }

    /// The fixed label set for a pool of `count` workers: "0", "1", ... "count-1".
    pub fn fixed_set(count: usize) -> Vec<PartitionLabel> {
        (0..count).map(|i| PartitionLabel(i.to_string())).collect()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for PartitionLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
