use chrono::{Duration as ChronoDuration, NaiveDate, NaiveDateTime};
use tokio::sync::mpsc;

use tsbench::error::Result;
use tsbench::types::Record;

/// Base timestamp for generated records.
pub fn base_time() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2017, 1, 1)
        .unwrap()
        .and_hms_opt(8, 0, 0)
        .unwrap()
}

/// A record for `host` whose range starts `seq` minutes after the base time.
/// `seq` doubles as a sequence number recoverable via `seq_of`.
pub fn record(host: &str, seq: i64) -> Record {
    let start = base_time() + ChronoDuration::minutes(seq);
    Record::new(host, start, start + ChronoDuration::minutes(30))
}

pub fn seq_of(record: &Record) -> i64 {
    (record.range_start - base_time()).num_minutes()
}

/// `count` hosts named `host_000000`, `host_000001`, ...
pub fn hosts(count: usize) -> Vec<String> {
    (0..count).map(|i| format!("host_{i:06}")).collect()
}

/// Round-robin `per_host` records over `hosts`, numbering them in dispatch order.
pub fn interleaved(hosts: &[String], per_host: usize) -> Vec<Record> {
    let mut out = Vec::with_capacity(hosts.len() * per_host);
    let mut seq = 0;
    for _ in 0..per_host {
        for host in hosts {
            out.push(record(host, seq));
            seq += 1;
        }
    }
    out
}

/// Feed `items` into a channel that closes once they are all sent.
pub fn channel_of(items: Vec<Result<Record>>) -> mpsc::Receiver<Result<Record>> {
    let (tx, rx) = mpsc::channel(16);
    tokio::spawn(async move {
        for item in items {
            if tx.send(item).await.is_err() {
                break;
            }
        }
    });
    rx
}

pub fn ok_channel(records: Vec<Record>) -> mpsc::Receiver<Result<Record>> {
    channel_of(records.into_iter().map(Ok).collect())
}
