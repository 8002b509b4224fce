//! Dubbing worker binary.
//!
//! `revoice-worker [--callback <url>] <video>...` submits each video as a
//! job, waits for every job to settle and prints the output paths.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use tokio::task::JoinSet;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use revoice_media::{check_ffmpeg, check_ffprobe, FfmpegToolkit};
use revoice_models::{CompletionPayload, JobSubmission};
use revoice_queue::JobHandle;
use revoice_speech::{AcapelaClient, WhisperClient};
use revoice_worker::metrics::install_prometheus;
use revoice_worker::{CallbackNotifier, JobExecutor, JobPipeline, WorkerConfig};

const USAGE: &str = "usage: revoice-worker [--callback <url>] <video>...";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing with colored output for dev, JSON for production
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = EnvFilter::from_default_env().add_directive("revoice=info".parse()?);

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }

    let (videos, callback) = parse_args(std::env::args().skip(1))?;
    let callback = callback.or_else(|| std::env::var("CALLBACK_URL").ok().filter(|u| !u.is_empty()));

    info!("Starting revoice-worker");

    let config = WorkerConfig::from_env();
    info!("Worker config: {:?}", config);

    if let Ok(addr) = std::env::var("METRICS_ADDR") {
        let addr: SocketAddr = addr.parse().context("METRICS_ADDR must be host:port")?;
        install_prometheus(addr)?;
        info!(%addr, "Serving Prometheus metrics");
    }

    check_ffmpeg()?;
    check_ffprobe()?;
    let api_key = std::env::var("WHISPER_API_KEY").context("WHISPER_API_KEY must be set")?;

    let pipeline = Arc::new(JobPipeline::new(
        config.clone(),
        Arc::new(FfmpegToolkit::new()),
        Arc::new(WhisperClient::from_env()?),
        Arc::new(AcapelaClient::from_env()?),
    ));
    let executor = Arc::new(JobExecutor::new(config, pipeline));
    let runner = tokio::spawn({
        let executor = Arc::clone(&executor);
        async move { executor.run().await }
    });

    let notifier = CallbackNotifier::new()?;
    let mut watchers = JoinSet::new();
    for video in videos {
        let mut submission = JobSubmission::new(video, api_key.clone());
        if let Some(url) = &callback {
            submission = submission.with_callback(url.clone());
        }
        let file_name = submission.file_name.clone();
        let callback_url = submission.callback_url.clone();
        let handle = executor.submit(submission)?;
        watchers.spawn(watch_job(handle, file_name, callback_url, notifier.clone()));
    }

    let settled = async {
        let mut failed = 0usize;
        while let Some(joined) = watchers.join_next().await {
            if !matches!(joined, Ok(true)) {
                failed += 1;
            }
        }
        failed
    };

    let failed = tokio::select! {
        failed = settled => Some(failed),
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
            None
        }
    };

    executor.shutdown();
    runner.await??;
    info!("Worker shutdown complete");

    match failed {
        Some(0) | None => Ok(()),
        Some(n) => bail!("{} job(s) failed", n),
    }
}

/// Split arguments into video paths and an optional callback URL.
fn parse_args(mut args: impl Iterator<Item = String>) -> anyhow::Result<(Vec<PathBuf>, Option<String>)> {
    let mut videos = Vec::new();
    let mut callback = None;
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--callback" => {
                callback = Some(args.next().context("--callback needs a URL")?);
            }
            "-h" | "--help" => bail!(USAGE),
            _ => videos.push(PathBuf::from(arg)),
        }
    }
    if videos.is_empty() {
        bail!(USAGE);
    }
    Ok((videos, callback))
}

/// Wait for one job, print its output and fire the callback. Returns success.
async fn watch_job(
    handle: JobHandle,
    file_name: String,
    callback_url: Option<String>,
    notifier: CallbackNotifier,
) -> bool {
    let job_id = handle.job_id().clone();
    match handle.wait().await {
        Ok(path) => {
            println!("{}", path.display());
            if let Some(url) = callback_url {
                if let Err(e) = notifier.notify(&url, &CompletionPayload::done(&path)).await {
                    warn!(job_id = %job_id, url, "Callback failed: {}", e);
                }
            }
            true
        }
        Err(e) => {
            error!(job_id = %job_id, file = %file_name, "Job failed: {}", e);
            false
        }
    }
}
