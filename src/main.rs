#![forbid(unsafe_code)]

//! `tasting-sync`: command-line front end for the feedback submission queue.
//!
//! Submits feedback reports, drains the offline queue on demand, lists what
//! is still waiting, or runs the periodic drain loop until interrupted.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use tasting_sync::models::{FeedbackCategory, FeedbackReport, QueuedFeedbackItem, Reporter};
use tasting_sync::persistence::{db, SqliteStore};
use tasting_sync::queue::spawn_drain_task;
use tasting_sync::sink::{FeedbackSink, HttpSink, OfflineSink};
use tasting_sync::{AppError, DurableSubmissionQueue, GlobalConfig, Result};

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(
    name = "tasting-sync",
    about = "Offline-durable feedback submission",
    version,
    long_about = None
)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long)]
    config: PathBuf,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Submit a feedback report, queueing it if the backend is unreachable.
    Submit {
        /// Feedback category (bug, feature, improvement, question, praise, other).
        #[arg(long)]
        category: String,
        /// Short summary.
        #[arg(long)]
        title: String,
        /// Report body.
        #[arg(long)]
        description: String,
        /// Satisfaction rating from 1 to 5.
        #[arg(long)]
        rating: Option<u8>,
        /// URL of an already uploaded screenshot.
        #[arg(long)]
        screenshot_url: Option<String>,
        /// Backend user id of the reporter.
        #[arg(long)]
        user_id: Option<String>,
        /// Contact e-mail of the reporter.
        #[arg(long)]
        email: Option<String>,
        /// Mark the reporter as enrolled in the beta program.
        #[arg(long)]
        beta_user: bool,
    },

    /// Resend every queued item once.
    Drain,

    /// Print queued items as JSON.
    Pending,

    /// Drain periodically until interrupted.
    Watch,
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.log_format)?;

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))?
        .block_on(run(args))
}

async fn run(args: Cli) -> Result<()> {
    let mut config = GlobalConfig::load_from_path(&args.config)?;
    config.load_credentials().await?;
    info!("configuration loaded");

    let db = Arc::new(db::connect(&config.storage.db_path).await?);
    info!(path = %config.storage.db_path.display(), "database connected");

    let sink: Arc<dyn FeedbackSink> = match config.sink {
        Some(ref sink_config) => Arc::new(HttpSink::new(sink_config)?),
        None => {
            warn!("no sink configured; submissions will only be queued");
            Arc::new(OfflineSink)
        }
    };

    let queue = Arc::new(DurableSubmissionQueue::new(
        Arc::new(SqliteStore::new(db)),
        sink,
        config.queue.storage_key.clone(),
    ));

    match args.command {
        Command::Submit {
            category,
            title,
            description,
            rating,
            screenshot_url,
            user_id,
            email,
            beta_user,
        } => {
            let category: FeedbackCategory = category.parse()?;
            let mut report = FeedbackReport::new(category, title, description);
            if let Some(rating) = rating {
                report = report.with_rating(rating);
            }
            if let Some(url) = screenshot_url {
                report = report.with_screenshot_url(url);
            }
            if beta_user {
                report = report.with_beta_user(true);
            }
            if user_id.is_some() || email.is_some() {
                report = report.with_reporter(Reporter {
                    user_id,
                    email,
                    username: None,
                });
            }

            let item = QueuedFeedbackItem::from_report(&report)?;
            let id = item.id.clone();
            match queue.submit(item).await {
                Ok(()) => println!("submitted {id}"),
                Err(err) if err.is_network() => {
                    println!("received {id}, will sync when the backend is reachable ({err})");
                }
                Err(err) => return Err(err),
            }
        }
        Command::Drain => {
            let report = queue.drain().await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::Pending => {
            let items = queue.pending().await?;
            println!("{}", serde_json::to_string_pretty(&items)?);
        }
        Command::Watch => {
            let ct = CancellationToken::new();
            let trigger = Arc::new(Notify::new());
            let handle = spawn_drain_task(
                Arc::clone(&queue),
                config.queue.drain_interval(),
                Arc::clone(&trigger),
                ct.clone(),
            );
            info!(
                interval_seconds = config.queue.drain_interval_seconds,
                "drain loop started"
            );

            #[cfg(unix)]
            spawn_hangup_trigger(Arc::clone(&trigger), ct.clone());

            shutdown_signal().await;
            info!("shutdown signal received");
            ct.cancel();
            let _ = handle.await;
        }
    }

    Ok(())
}

/// Drain immediately whenever the process receives `SIGHUP`.
#[cfg(unix)]
fn spawn_hangup_trigger(trigger: Arc<Notify>, cancel: CancellationToken) {
    use tokio::signal::unix::{signal, SignalKind};

    tokio::spawn(async move {
        let mut hangup = match signal(SignalKind::hangup()) {
            Ok(hangup) => hangup,
            Err(err) => {
                warn!(%err, "failed to register SIGHUP handler");
                return;
            }
        };

        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                received = hangup.recv() => {
                    if received.is_none() {
                        break;
                    }
                    info!("SIGHUP received, draining now");
                    trigger.notify_one();
                }
            }
        }
    });
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(err) => {
                tracing::warn!(%err, "failed to register SIGTERM handler, using ctrl-c only");
                let _ = ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(err) = ctrl_c.await {
            tracing::error!(%err, "ctrl-c signal handler failed");
        }
    }
}

fn init_tracing(log_format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr);

    match log_format {
        LogFormat::Text => subscriber
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
        LogFormat::Json => subscriber
            .json()
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
    }

    Ok(())
}
