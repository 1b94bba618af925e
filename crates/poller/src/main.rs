// crates/poller/src/main.rs
//! scarab-poll: upload a keyword export and wait for its workbook.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use scarab_poller::{ApiClient, JobPoller, PollFailure, PollerConfig};
use scarab_types::FilterOption;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "scarab-poll", version, about = "Submit a keyword export and poll until the analysis finishes")]
struct Cli {
    /// Keyword export to analyze (.csv or .xlsx).
    file: PathBuf,

    #[arg(long, env = "API_URL", default_value = "http://localhost:7000")]
    base_url: String,

    /// Keyword filter: `all` or `recommended`.
    #[arg(long, default_value = "all")]
    filter: FilterOption,

    #[arg(long, default_value_t = 60)]
    interval_secs: u64,

    /// Give up after this many seconds. Polls forever when unset.
    #[arg(long)]
    max_wait_secs: Option<u64>,

    /// Transport errors retried per status check.
    #[arg(long, default_value_t = 0)]
    retries: u32,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn,scarab_poller=info".into());
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let client = Arc::new(ApiClient::new(&cli.base_url).context("building HTTP client")?);
    let accepted = client
        .submit_file(&cli.file, cli.filter)
        .await
        .with_context(|| format!("submitting {}", cli.file.display()))?;
    tracing::info!(job_id = %accepted.job_id, file = %cli.file.display(), "analysis started");

    let config = PollerConfig {
        interval: Duration::from_secs(cli.interval_secs.max(1)),
        max_wait: cli.max_wait_secs.map(Duration::from_secs),
        max_transport_retries: cli.retries,
        ..PollerConfig::default()
    };
    let mut poller = JobPoller::new(Arc::clone(&client), config);

    let (tx, mut rx) = mpsc::channel::<Result<Value, PollFailure>>(1);
    let failed_tx = tx.clone();
    poller.track(
        accepted.job_id.clone(),
        move |payload| {
            let _ = tx.try_send(Ok(payload));
        },
        move |failure| {
            let _ = failed_tx.try_send(Err(failure));
        },
    );

    let outcome = tokio::select! {
        outcome = rx.recv() => outcome,
        _ = tokio::signal::ctrl_c() => {
            poller.clear();
            bail!("interrupted while waiting for job {}", accepted.job_id);
        }
    };

    match outcome {
        Some(Ok(payload)) => {
            let download = payload["downloadUrl"].as_str().unwrap_or_default();
            if download.is_empty() {
                bail!("job {} completed without a download URL", accepted.job_id);
            }
            println!("{}", client.url(download));
            Ok(())
        }
        Some(Err(failure)) => Err(failure).context(format!("job {} did not complete", accepted.job_id)),
        None => bail!("poller stopped without a result"),
    }
}
