//! `run` command implementation.

use anyhow::{Context, Result};
use std::time::Duration;
use tracing::{error, info, warn};

use crate::cli::RunArgs;
use crate::pipeline::{read_events, Pipeline, PipelineConfig};

/// Execute the `run` command
pub async fn run_pipeline(args: &RunArgs) -> Result<()> {
    info!(config = %args.config.display(), "Loading configuration");

    if !args.config.exists() {
        anyhow::bail!("Configuration file not found: {}", args.config.display());
    }

    let mut config = config_loader::ConfigLoader::load_from_path(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;

    // Apply CLI overrides, then re-check the result
    if let Some(size) = args.flush_queue_size {
        info!(flush_queue_size = size, "Overriding flush_queue_size from CLI");
        config.flush_queue_size = size;
        config_loader::ConfigLoader::validate(&config).context("Invalid CLI override")?;
    }

    info!(
        flush_queue_size = config.flush_queue_size,
        flush_mode = ?config.flush_mode,
        destinations = config.destinations.len(),
        tracking_plan_events = config.tracking_plan.track.len(),
        "Configuration loaded"
    );

    if args.dry_run {
        info!("Dry run mode - configuration is valid, exiting");
        print_config_summary(&config);
        return Ok(());
    }

    let events = read_events(&args.events)
        .with_context(|| format!("Failed to read events from {}", args.events.display()))?;
    info!(events = events.len(), path = %args.events.display(), "Events loaded");

    let pipeline = Pipeline::new(PipelineConfig {
        config,
        events,
        drop_events: args.drop_events.clone(),
        timeout: (args.timeout > 0).then(|| Duration::from_secs(args.timeout)),
        metrics_port: (args.metrics_port > 0).then_some(args.metrics_port),
    });

    let shutdown_signal = setup_shutdown_signal();

    info!("Starting replay...");

    tokio::select! {
        result = pipeline.run() => {
            let stats = result.context("Pipeline execution failed")?;
            info!(
                events_sent = stats.events_sent,
                events_rejected = stats.events_rejected,
                duration_secs = stats.duration.as_secs_f64(),
                "Pipeline completed successfully"
            );
            stats.print_summary();
        }
        _ = shutdown_signal => {
            warn!("Received shutdown signal, stopping replay...");
        }
    }

    info!("Analytics CLI finished");
    Ok(())
}

/// Resolve on Ctrl+C or SIGTERM
async fn setup_shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// Print configuration summary for dry-run mode
fn print_config_summary(config: &contracts::AnalyticsConfig) {
    println!("\n=== Configuration Summary ===\n");
    println!("Client:");
    println!("  Flush queue size: {}", config.flush_queue_size);
    println!("  Flush interval: {} ms", config.flush_interval_ms);
    println!("  Flush mode: {:?}", config.flush_mode);
    println!("  Log level: {:?}", config.log_level);

    println!("\nDestinations ({}):", config.destinations.len());
    for destination in &config.destinations {
        println!(
            "  - {} ({:?}, capacity {})",
            destination.name, destination.transport, destination.queue_capacity
        );
    }

    if !config.tracking_plan.track.is_empty() {
        println!("\nTracking plan ({} events)", config.tracking_plan.track.len());
    }

    println!();
}
