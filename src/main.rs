use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

use tsbench::bencher::Bencher;
use tsbench::config::Config;
use tsbench::executor::PgExecutorFactory;
use tsbench::source::{spawn_producer, RecordSource};

/// Benchmark time-range query latency against a TimescaleDB instance.
#[derive(Parser, Debug)]
#[command(name = "tsbench", version, about)]
struct Args {
    /// TOML config file (defaults to $TSBENCH_CONFIG if set)
    #[arg(long)]
    config: Option<String>,

    /// TimescaleDB hostname and port number
    #[arg(long)]
    host: Option<String>,

    /// TimescaleDB username
    #[arg(long)]
    user: Option<String>,

    /// TimescaleDB password
    #[arg(long)]
    password: Option<String>,

    /// TimescaleDB database name
    #[arg(long)]
    db: Option<String>,

    /// CSV file containing the query parameters
    #[arg(long)]
    file: Option<PathBuf>,

    /// Number of concurrent workers
    #[arg(short, long)]
    workers: Option<usize>,

    /// Per-query deadline in milliseconds
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Print the report as JSON
    #[arg(long, default_value_t = false)]
    json: bool,
}

impl Args {
    fn apply(&self, config: &mut Config) {
        if let Some(host) = &self.host {
            config.database.host = host.clone();
        }
        if let Some(user) = &self.user {
            config.database.user = user.clone();
        }
        if let Some(password) = &self.password {
            config.database.password = password.clone();
        }
        if let Some(db) = &self.db {
            config.database.dbname = db.clone();
        }
        if let Some(file) = &self.file {
            config.bench.input = Some(file.clone());
        }
        if let Some(workers) = self.workers {
            config.bench.workers = workers;
        }
        if let Some(timeout_ms) = self.timeout_ms {
            config.bench.query_timeout_ms = timeout_ms;
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env
    let _ = dotenvy::dotenv();

    let args = Args::parse();
    let mut config = Config::load(args.config.as_deref())?;
    args.apply(&mut config);
    config.validate()?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    match config.logging.format.as_str() {
        "json" => {
            tracing_subscriber::fmt()
                .json()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .init();
        }
        _ => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }

    tsbench::metrics::init();
    tracing::info!(workers = config.bench.workers, "tsbench starting");

    // Read the header before touching the database so a bad input file
    // fails before any query runs.
    let input = config
        .bench
        .input
        .clone()
        .context("no input file given, pass --file or set TSBENCH_INPUT")?;
    let source = RecordSource::open(&input)?;

    let factory = Arc::new(PgExecutorFactory::from_url(&config.database.url()?)?);
    let bencher = Bencher::start(&config.bench, factory)
        .await
        .context("connecting to TimescaleDB instance")?;

    let (records, producer) = spawn_producer(source, config.bench.sink_capacity);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = shutdown_tx.send(true);
        }
    });

    let report = bencher.run_until(records, Some(shutdown_rx)).await?;

    match producer.await {
        Ok(rows) => tracing::info!(rows, "record source closed"),
        Err(e) => tracing::warn!(error = %e, "record producer failed"),
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report.to_json())?);
    } else {
        print!("{report}");
    }

    report.latency()?;
    Ok(())
}
