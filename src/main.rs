//! ytdlp-driver - Drive yt-dlp downloads with structured progress events.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use ytdlp_driver::command::{CommandBuilder, CommandError};
use ytdlp_driver::config::{ConfigError, ConfigLoader, DriverConfig};
use ytdlp_driver::display;
use ytdlp_driver::runner::{
    DownloadPool, JobEvent, Oneshot, OneshotError, ProcessRunner, RunEvent, RunRequest,
};
use ytdlp_driver::sink::default_sink;

#[derive(Parser)]
#[command(
    name = "ytdlp-driver",
    about = "Drive yt-dlp downloads with structured progress",
    version
)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short = 'v', long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Config file to use instead of the default search paths.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Download one or more URLs.
    Download(DownloadArgs),
    /// Print metadata for a URL without downloading it.
    Info {
        url: String,
        /// Print the full metadata document as JSON.
        #[arg(long)]
        json: bool,
    },
    /// List the formats available for a URL.
    Formats { url: String },
}

#[derive(Args)]
struct DownloadArgs {
    /// URLs to download.
    #[arg(required = true)]
    urls: Vec<String>,
    /// Format selector.
    #[arg(short, long)]
    format: Option<String>,
    /// Output folder.
    #[arg(short, long)]
    output: Option<PathBuf>,
    /// Output file name template.
    #[arg(short = 't', long)]
    template: Option<String>,
    /// Extra downloader flags, e.g. --flag "--limit-rate 1M". Repeatable.
    #[arg(long = "flag", value_name = "FLAGS", allow_hyphen_values = true)]
    flags: Vec<String>,
    /// Downloads run at once.
    #[arg(long)]
    max_parallel: Option<usize>,
    /// Per-download time limit in seconds.
    #[arg(long)]
    timeout: Option<u64>,
    /// Print raw downloader output instead of classified events.
    #[arg(long)]
    raw: bool,
}

#[derive(thiserror::Error, Debug)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Command(#[from] CommandError),
    #[error(transparent)]
    Oneshot(#[from] OneshotError),
    #[error("Failed to encode metadata: {0}")]
    Json(#[from] serde_json::Error),
}

fn init_tracing(verbosity: u8) {
    let level = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

/// Cancel `token` on Ctrl-C.
fn cancel_on_ctrl_c(token: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, cancelling");
            token.cancel();
        }
    });
}

fn load_config(path: Option<&Path>) -> Result<DriverConfig, ConfigError> {
    match path {
        Some(path) => ConfigLoader::load_file(path),
        None => ConfigLoader::new().load(),
    }
}

fn oneshot(config: &DriverConfig) -> Result<Oneshot, CommandError> {
    let mut oneshot = Oneshot::new(config.executable_path()).extra_args(config.network_args()?);
    if let Some(timeout) = config.timeout() {
        oneshot = oneshot.timeout(timeout);
    }
    Ok(oneshot)
}

async fn download(config: &DriverConfig, args: DownloadArgs) -> Result<ExitCode, CliError> {
    let sink = default_sink();
    let executable = config.executable_path();
    let timeout = args
        .timeout
        .filter(|secs| *secs > 0)
        .map(Duration::from_secs)
        .or_else(|| config.timeout());

    let mut base = config.apply(CommandBuilder::new(Arc::clone(&sink)))?;
    if let Some(format) = &args.format {
        base = base.format(format)?;
    }
    if let Some(output) = &args.output {
        base = base.output_folder(output)?;
    }
    if let Some(template) = &args.template {
        base = base.output_template(template)?;
    }
    for raw in &args.flags {
        base = base.add_custom_flag(raw);
    }

    let runner = ProcessRunner::new(sink).with_thresholds(config.post_process);
    let max_parallel = args.max_parallel.unwrap_or(config.max_concurrent);
    let (mut pool, mut events) = DownloadPool::new(runner, max_parallel);
    cancel_on_ctrl_c(pool.cancellation_token());

    tracing::info!(urls = args.urls.len(), max_parallel = pool.max_concurrent(), executable = %executable.display(), "Starting downloads");

    for url in &args.urls {
        let mut builder = base.clone();
        let mut request = RunRequest::from_builder(&executable, &mut builder, url)?;
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }
        let id = pool.submit(url.clone(), request);
        display::print_job_start(id, url, args.raw);
    }

    let raw_mode = args.raw;
    let printer = tokio::spawn(async move {
        while let Some(JobEvent { job_id, event }) = events.recv().await {
            match event {
                RunEvent::Raw { stream, line } if raw_mode => {
                    display::print_raw_line(job_id, stream, &line);
                }
                RunEvent::Progress(event) if !raw_mode => {
                    display::print_event(job_id, &event, false);
                }
                _ => {}
            }
        }
    });

    while let Some(joined) = pool.join_next().await {
        match joined {
            Ok(job) => display::print_job_end(&job),
            Err(e) => display::print_error(&e.to_string()),
        }
    }

    let stats = pool.stats();
    drop(pool);
    if let Err(e) = printer.await {
        tracing::warn!(error = %e, "Event printer stopped");
    }
    display::print_summary(&stats);

    if stats.failed == 0 && stats.cancelled == 0 {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::FAILURE)
    }
}

async fn info(config: &DriverConfig, url: &str, json: bool) -> Result<ExitCode, CliError> {
    let cancel = CancellationToken::new();
    cancel_on_ctrl_c(cancel.clone());

    let metadata = oneshot(config)?.fetch_metadata(url, &cancel).await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&metadata)?);
    } else {
        display::print_metadata(&metadata);
    }
    Ok(ExitCode::SUCCESS)
}

async fn formats(config: &DriverConfig, url: &str) -> Result<ExitCode, CliError> {
    let cancel = CancellationToken::new();
    cancel_on_ctrl_c(cancel.clone());

    let rows = oneshot(config)?.list_formats(url, &cancel).await?;
    display::print_formats(&rows);
    Ok(ExitCode::SUCCESS)
}

async fn run(cli: Cli) -> Result<ExitCode, CliError> {
    let config = load_config(cli.config.as_deref())?;
    match cli.command {
        Commands::Download(args) => download(&config, args).await,
        Commands::Info { url, json } => info(&config, &url, json).await,
        Commands::Formats { url } => formats(&config, &url).await,
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            display::print_error(&e.to_string());
            ExitCode::FAILURE
        }
    }
}
