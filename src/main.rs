//! mapsynth - batch Beat Saber map generation
//!
//! Discovers audio files, drives one inference server per song and
//! writes playable map bundles to the output directory.

use chrono::Utc;
use clap::Parser;
use mapsynth::config::{Cli, Settings};
use mapsynth::events::{EventBus, GeneratorEvent};
use mapsynth::services::{FileScanner, JobScheduler};
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mapsynth=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    info!("Starting mapsynth {}", env!("CARGO_PKG_VERSION"));

    let settings = match Settings::resolve(cli) {
        Ok(settings) => settings,
        Err(e) => {
            error!("Configuration error: {}", e);
            std::process::exit(2);
        }
    };
    info!(
        out_dir = %settings.out_dir.display(),
        model = %settings.model,
        difficulty = %settings.difficulty,
        environment = %settings.environment,
        "Configuration resolved"
    );

    let bus = EventBus::new(1000);
    bus.emit_lossy(GeneratorEvent::ScanStarted {
        inputs: settings.inputs.len(),
        timestamp: Utc::now(),
    });
    let scanner = FileScanner::new();
    let files = match scanner.scan(&settings.inputs) {
        Ok(files) => files,
        Err(e) => {
            error!("Scan failed: {}", e);
            std::process::exit(2);
        }
    };
    bus.emit_lossy(GeneratorEvent::ScanCompleted {
        files: files.len(),
        timestamp: Utc::now(),
    });
    if files.is_empty() {
        info!("No supported audio files found, nothing to do");
        return;
    }
    info!(files = files.len(), "Scan complete");

    let scheduler = JobScheduler::new(bus);
    let batch = scheduler.run_batch(files, &settings);
    tokio::pin!(batch);
    let mut shutdown_requested = false;
    let summary = loop {
        tokio::select! {
            summary = &mut batch => break summary,
            _ = shutdown_signal(), if !shutdown_requested => {
                scheduler.cancel_all();
                shutdown_requested = true;
            }
        }
    };

    info!(
        succeeded = summary.succeeded,
        failed = summary.failed,
        skipped = summary.skipped,
        cancelled = summary.cancelled,
        "Done in {:.1}s",
        summary.duration_secs
    );
    if summary.failed > 0 {
        std::process::exit(1);
    }
}

/// Resolves when the process is asked to stop
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, cancelling batch");
        },
        _ = terminate => {
            info!("Received terminate signal, cancelling batch");
        },
    }
}
