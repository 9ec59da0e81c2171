use anyhow::Context;
use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::{debug, error, trace};

use wordshard::config::{ConfigLoader, JobConfig};
use wordshard::job::Job;
use wordshard::subprocess::SubprocessManager;
use wordshard::tokenizer::TokenPolicy;
use wordshard::worker::{map_payload, SegmentPayload};

/// Split, map and merge word statistics over a text corpus
#[derive(Parser)]
#[command(name = "wordshard", version)]
#[command(about = "Distributed word frequency and unique-word extraction", long_about = None)]
struct Cli {
    /// Enable verbose output (-v for debug, -vv for trace, -vvv for all)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Count word occurrences and write them as JSON
    Frequency {
        #[command(flatten)]
        job: JobArgs,
    },
    /// Extract the sorted set of distinct words, one per line
    Unique {
        #[command(flatten)]
        job: JobArgs,

        /// Bytes scanned around each split point
        #[arg(long)]
        window_size: Option<usize>,
    },
    /// Map one segment payload read from stdin (worker entry point)
    Map,
    /// Serve the worker endpoint over HTTP
    Serve {
        #[arg(long, default_value = "127.0.0.1:7878")]
        bind: SocketAddr,

        /// Accept file-range payloads for paths under this directory
        #[arg(long, value_name = "DIR")]
        allow_root: Option<PathBuf>,
    },
}

#[derive(clap::Args)]
struct JobArgs {
    /// Text file to process
    input: PathBuf,

    /// Where to write the result
    output: PathBuf,

    /// Path to a TOML job file
    #[arg(short = 'c', long)]
    config: Option<PathBuf>,

    /// Number of additional local workers
    #[arg(short = 'w', long)]
    workers: Option<usize>,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => "info",
        1 => "debug",
        2 => "trace",
        _ => "trace,hyper=debug,reqwest=debug",
    };

    // stdout carries results and the map protocol
    tracing_subscriber::fmt()
        .with_env_filter(log_level)
        .with_writer(std::io::stderr)
        .with_target(cli.verbose >= 2)
        .with_thread_ids(cli.verbose >= 3)
        .with_line_number(cli.verbose >= 3)
        .init();

    debug!("wordshard started with verbosity level: {}", cli.verbose);
    trace!("Full CLI args: {:?}", std::env::args().collect::<Vec<_>>());

    let result = match cli.command {
        Commands::Frequency { job } => run_job(TokenPolicy::Frequency, job, None).await,
        Commands::Unique { job, window_size } => {
            run_job(TokenPolicy::Unique, job, window_size).await
        }
        Commands::Map => run_map().await,
        Commands::Serve { bind, allow_root } => wordshard::server::serve(bind, allow_root).await,
    };

    if let Err(e) = result {
        error!("Fatal error: {:#}", e);
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

async fn load_config(args: &JobArgs, window_size: Option<usize>) -> anyhow::Result<JobConfig> {
    let mut config = ConfigLoader::load_or_default(args.config.as_deref()).await?;

    if let Some(window_size) = window_size {
        config.window_size = window_size;
    }
    if let Some(workers) = args.workers {
        config.add_local_workers(workers);
    }
    if config.workers.is_empty() && args.workers.is_none() {
        config.add_local_workers(1);
    }

    config.validate()?;
    Ok(config)
}

async fn run_job(
    policy: TokenPolicy,
    args: JobArgs,
    window_size: Option<usize>,
) -> anyhow::Result<()> {
    let config = load_config(&args, window_size).await?;
    let job = Job::new(config, SubprocessManager::production());

    let report = job.run(policy, &args.input, &args.output).await?;

    if policy == TokenPolicy::Unique {
        println!("unique_count = {}", report.token_count);
        println!("time_sec = {:.6}", report.elapsed.as_secs_f64());
    }
    Ok(())
}

async fn run_map() -> anyhow::Result<()> {
    let mut input = String::new();
    tokio::io::stdin()
        .read_to_string(&mut input)
        .await
        .context("reading payload from stdin")?;

    let payload: SegmentPayload =
        serde_json::from_str(&input).context("parsing segment payload")?;
    debug!("Mapping {} ({:?})", payload.segment, payload.policy);

    let partial = map_payload(payload).await?;
    let rendered = serde_json::to_string(&partial)?;

    let mut stdout = tokio::io::stdout();
    stdout.write_all(rendered.as_bytes()).await?;
    stdout.write_all(b"\n").await?;
    stdout.flush().await?;
    Ok(())
}
