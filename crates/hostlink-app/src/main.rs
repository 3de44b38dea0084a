//! Hostlink - host capabilities for the attendance tracker.
//!
//! Runs the host shim on a desktop:
//! - `update <url>` downloads a new version and hands it to the installer
//! - `save <file>` exports a report into the documents folder
//! - `serve` exposes the bridge channels as JSON lines on stdin/stdout

mod cli;
mod serve;

use std::panic;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use clap::Parser;
use tokio::io::BufReader;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use hostlink_bridge::{Bridge, BridgeServices};
use hostlink_core::desktop::{self, DesktopPlatform};
use hostlink_core::{DocumentExporter, HostSettings, UpdateEvent, UpdateOrchestrator, UpdateOutcome};

use crate::cli::{Args, Command};

/// Get the logs directory path.
fn logs_dir() -> Option<PathBuf> {
    desktop::project_dirs().map(|dirs| dirs.data_dir().join("logs"))
}

/// Default settings file path.
fn settings_path() -> Option<PathBuf> {
    desktop::project_dirs().map(|dirs| dirs.config_dir().join("settings.json"))
}

/// Initialize logging with file rotation.
///
/// Console output goes to stderr; stdout carries the `serve` protocol.
fn init_logging(args: &Args) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("hostlink={},warn", args.log_level())));

    if let Some(log_dir) = logs_dir() {
        if std::fs::create_dir_all(&log_dir).is_ok() {
            let file_appender = RollingFileAppender::builder()
                .rotation(Rotation::DAILY)
                .max_log_files(5)
                .filename_prefix("hostlink")
                .filename_suffix("log")
                .build(&log_dir)
                .ok();

            if let Some(appender) = file_appender {
                let (non_blocking, guard) = tracing_appender::non_blocking(appender);

                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(fmt::layer().with_writer(std::io::stderr))
                    .with(fmt::layer().with_writer(non_blocking).with_ansi(false))
                    .init();

                tracing::debug!("Logging to {:?}", log_dir);
                return Some(guard);
            }
        }
    }

    // Fallback: console logging only
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    tracing::warn!("File logging unavailable, using console only");
    None
}

/// Loads settings and applies command-line overrides.
fn load_settings(args: &Args) -> anyhow::Result<HostSettings> {
    let mut settings = match args.config.clone().or_else(settings_path) {
        Some(path) => HostSettings::load_or_default(&path)
            .with_context(|| format!("Failed to load settings from {}", path.display()))?,
        None => HostSettings::default(),
    };
    args.apply(&mut settings);
    Ok(settings)
}

/// Runs one update to its end.
async fn run_update(desktop: &DesktopPlatform, settings: &HostSettings, url: &str) -> anyhow::Result<()> {
    let updater = UpdateOrchestrator::new(desktop.platform(), &settings.app_id, &settings.updater);

    let mut events = updater.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                UpdateEvent::StateChanged(state) => tracing::info!(%state, "Update state"),
                UpdateEvent::Enqueued { task_id, url } => {
                    tracing::info!(%task_id, %url, "Downloading")
                }
                UpdateEvent::PermissionRedirect(redirect) => {
                    tracing::warn!(screen = %redirect.target, "Install permission required")
                }
                UpdateEvent::Finished(_) => break,
            }
        }
    });

    updater.start(url).context("Update request rejected")?;

    let outcome = tokio::select! {
        outcome = updater.wait() => outcome,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Interrupted, cancelling update");
            updater.cancel();
            updater.wait().await
        }
    };

    match outcome {
        Some(UpdateOutcome::HandedOff) => {
            println!("Update handed to the installer");
            Ok(())
        }
        Some(UpdateOutcome::PermissionDenied) => bail!(
            "Package installs are not allowed; set allow_package_installs in the settings file"
        ),
        Some(UpdateOutcome::Failed(e)) => Err(e).context("Update failed"),
        Some(UpdateOutcome::Cancelled) => bail!("Update cancelled"),
        None => bail!("Update never started"),
    }
}

/// Exports a file into the documents folder.
fn run_save(desktop: &DesktopPlatform, file: &Path, name: Option<&str>) -> anyhow::Result<()> {
    let bytes = std::fs::read(file).with_context(|| format!("Failed to read {}", file.display()))?;

    let name = match name {
        Some(name) => name.to_string(),
        None => file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .context("File has no name")?,
    };

    let location = DocumentExporter::new(desktop.document_store())
        .save(&name, &bytes)
        .context("Could not save file")?;
    println!("{location}");
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Keep guard alive for the duration of the program
    let _log_guard = init_logging(&args);

    tracing::info!("Starting Hostlink...");
    tracing::debug!("Args: {:?}", args);

    // Log panics before the default hook prints them
    let default_hook = panic::take_hook();
    panic::set_hook(Box::new(move |panic_info| {
        tracing::error!("PANIC: {}", panic_info);
        default_hook(panic_info);
    }));

    let settings = load_settings(&args)?;
    let desktop = DesktopPlatform::new(&settings).context("Failed to set up desktop platform")?;

    match &args.command {
        Command::Update { url } => run_update(&desktop, &settings, url).await?,
        Command::Save { file, name } => run_save(&desktop, file, name.as_deref())?,
        Command::Serve => {
            let bridge = Bridge::new(settings, BridgeServices::from_desktop(&desktop));
            tracing::info!(channels = ?bridge.channels(), "Serving bridge on stdio");
            serve::serve(&bridge, BufReader::new(tokio::io::stdin()), tokio::io::stdout()).await?;
        }
    }

    tracing::info!("Hostlink shutting down");
    Ok(())
}
