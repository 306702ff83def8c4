//! tsbench: replays time-range lookups against a time-series store and
//! reports latency statistics.

pub mod bencher;
pub mod collector;
pub mod config;
pub mod error;
pub mod executor;
pub mod metrics;
pub mod report;
pub mod ring;
pub mod source;
pub mod stats;
pub mod types;
pub mod worker;
