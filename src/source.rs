//! CSV record source.
//!
//! The file starts with a header row; every following row is
//! `hostname,start_time,end_time[,...]`.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use csv::{ErrorKind, ReaderBuilder, StringRecord};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::error::{BenchError, Result};
use crate::types::Record;

pub struct RecordSource<R: Read> {
    reader: csv::Reader<R>,
    header: Vec<String>,
    done: bool,
}

impl RecordSource<File> {
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| {
            BenchError::Config(format!("opening query params file {}: {e}", path.display()))
        })?;
        Self::from_reader(file)
    }
}

impl<R: Read> RecordSource<R> {
    /// Wrap `reader`, consuming the header row. A missing or unreadable
    /// header is a configuration error.
    pub fn from_reader(reader: R) -> Result<Self> {
        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let header: Vec<String> = reader
            .headers()
            .map_err(|e| BenchError::Config(format!("reading header row from csv: {e}")))?
            .iter()
            .map(str::to_string)
            .collect();
        if header.iter().all(|h| h.is_empty()) {
            return Err(BenchError::Config("csv has no header row".into()));
        }

        Ok(Self {
            reader,
            header,
            done: false,
        })
    }

    pub fn header(&self) -> &[String] {
        &self.header
    }
}

impl<R: Read> Iterator for RecordSource<R> {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let mut row = StringRecord::new();
        match self.reader.read_record(&mut row) {
            Ok(false) => {
                self.done = true;
                None
            }
            Ok(true) => {
                let line = row.position().map(|p| p.line()).unwrap_or(0);
                let fields: Vec<&str> = row.iter().collect();
                Some(Record::from_fields(&fields[..], line))
            }
            Err(e) => {
                // An I/O failure will not clear up by reading further.
                if matches!(e.kind(), ErrorKind::Io(_)) {
                    self.done = true;
                }
                let line = e.position().map(|p| p.line()).unwrap_or(0);
                Some(Err(BenchError::Record {
                    line,
                    reason: format!("reading record from csv: {e}"),
                }))
            }
        }
    }
}

/// Read `source` on a blocking thread, forwarding every item (records and
/// per-row errors alike) into a bounded channel. The channel closes at end
/// of stream. The join handle yields the number of rows forwarded.
pub fn spawn_producer<R>(
    source: RecordSource<R>,
    capacity: usize,
) -> (mpsc::Receiver<Result<Record>>, JoinHandle<u64>)
where
    R: Read + Send + 'static,
{
    let (tx, rx) = mpsc::channel(capacity.max(1));
    info!(header = %source.header().join(", "), "reading records");

    let handle = tokio::task::spawn_blocking(move || {
        let mut forwarded = 0u64;
        for item in source {
            if tx.blocking_send(item).is_err() {
                debug!(forwarded, "record consumer gone, stopping producer");
                break;
            }
            forwarded += 1;
        }
        forwarded
    });

    (rx, handle)
}
