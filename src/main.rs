//! CLI entry point for the mediafetch tool.

use std::io::{self, IsTerminal, Read};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
#[cfg(unix)]
use mediafetch_core::actions::SignalListener;
use mediafetch_core::actions::SignalBinding;
use mediafetch_core::{
    BatchJob, ConfigError, Flags, HttpDownloader, JobContext, JobLogger, TerminalProgress,
    load_config,
};
#[cfg(not(unix))]
use tracing::warn;
use tracing::{debug, error, info};

mod cli;

use cli::Args;

/// Exit code for configuration errors.
const CONFIG_ERROR_EXIT: u8 = 2;

#[tokio::main]
async fn main() -> ExitCode {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    // Priority: RUST_LOG env var > quiet flag > verbose flag > default (info)
    let default_level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    debug!(?args, "CLI arguments parsed");

    match run(args).await {
        Ok(code) => ExitCode::from(u8::try_from(code).unwrap_or(1)),
        Err(err) => {
            error!("{err:#}");
            if err.downcast_ref::<ConfigError>().is_some() {
                ExitCode::from(CONFIG_ERROR_EXIT)
            } else {
                ExitCode::FAILURE
            }
        }
    }
}

async fn run(args: Args) -> Result<i32> {
    // Read input: from positional args or stdin
    let urls: Vec<String> = if !args.urls.is_empty() {
        args.urls.clone()
    } else if !io::stdin().is_terminal() {
        let mut buffer = String::new();
        io::stdin()
            .read_to_string(&mut buffer)
            .context("failed to read URLs from stdin")?;
        buffer
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .map(str::to_string)
            .collect()
    } else {
        Vec::new()
    };

    if urls.is_empty() {
        info!("No input provided. Pipe URLs via stdin or pass as arguments.");
        info!("Example: echo 'https://example.com/image.jpg' | mediafetch");
        return Ok(0);
    }

    let mut loaded = load_config(args.config.as_deref()).context("failed to load configuration")?;
    if let Some(path) = loaded.path.as_deref().filter(|_| loaded.loaded_from_file) {
        debug!(path = %path.display(), "using configuration file");
    }
    args.apply_overrides(&mut loaded.config.downloader.http);

    let settings = loaded
        .config
        .downloader
        .http
        .resolve()
        .context("invalid downloader.http configuration")?;
    let registry = loaded
        .config
        .action_registry()
        .context("invalid output.actions configuration")?;
    let signals = loaded
        .config
        .signal_bindings()
        .context("invalid output.signals configuration")?;

    let show_progress = settings.progress.is_some() && !args.quiet && io::stderr().is_terminal();
    let mut downloader = HttpDownloader::from_settings(settings)?
        .with_logger(JobLogger::new(Arc::new(registry)));
    if show_progress {
        downloader = downloader.with_progress(Arc::new(TerminalProgress::new()));
    }

    info!(urls = urls.len(), directory = %args.directory.display(), "Mediafetch starting");

    let flags = Arc::new(Flags::new());
    listen_for_signals(signals, &flags);

    let context = JobContext::new(flags);
    let mut job = BatchJob::new(downloader, &args.directory, &args.template, context);
    let report = job.run(&urls).await;

    if let Some(control) = &report.stopped_by {
        debug!(%control, "batch stopped early");
    }
    Ok(report.exit_code())
}

/// Spawns one listener per configured signal; an `exit` action ends the process.
#[cfg(unix)]
fn listen_for_signals(bindings: Vec<SignalBinding>, flags: &Arc<Flags>) {
    for binding in bindings {
        let Some(listener) = SignalListener::install(binding) else {
            continue;
        };
        let flags = Arc::clone(flags);
        tokio::spawn(async move {
            if let Some(code) = listener.run(flags).await {
                info!(code, "exit requested by signal action");
                std::process::exit(code);
            }
        });
    }
}

#[cfg(not(unix))]
fn listen_for_signals(bindings: Vec<SignalBinding>, _flags: &Arc<Flags>) {
    for binding in bindings {
        warn!("signal '{}' is not defined", binding.name);
    }
}
