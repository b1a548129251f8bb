//! Config Pipeline Example
//!
//! Demonstrates loading a configuration file, building the client from it,
//! and watching destinations come up through the readiness registry.
//!
//! Run with: cargo run --bin config_pipeline [config_path]

use std::path::PathBuf;
use std::time::Duration;

use analytics::{Analytics, Options, Properties};
use config_loader::ConfigLoader;
use observability::ObservabilityConfig;
use serde_json::json;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = resolve_config_path();
    let config = ConfigLoader::load_from_path(&config_path)?;

    observability::init_with_config(ObservabilityConfig::for_log_level(config.log_level))?;
    info!(path = %config_path.display(), "Configuration loaded");

    // ==== Stage 1: Build client ====
    let destinations: Vec<String> = config.destinations.iter().map(|d| d.name.clone()).collect();
    let analytics = Analytics::from_config(config).build()?;

    // ==== Stage 2: Wait for destinations ====
    for name in &destinations {
        match tokio::time::timeout(Duration::from_secs(2), analytics.wait_integration_ready(name))
            .await
        {
            Ok(Ok(())) => info!(destination = %name, "Destination ready"),
            Ok(Err(e)) => info!(destination = %name, error = %e, "Destination unavailable"),
            Err(_) => info!(destination = %name, "Destination still initializing"),
        }
    }

    // ==== Stage 3: Send events ====
    analytics.identify(Some("user-42"), props(json!({ "plan": "pro" })), None)?;
    for i in 0..12 {
        let event = if i % 3 == 0 { "Button B Clicked" } else { "Button A Clicked" };
        analytics.track(event, props(json!({ "index": i })), None)?;
    }
    let no_adjust = Options::new().set_integration("Adjust", false);
    analytics.track("Checkout", props(json!({ "total": 42.5 })), Some(&no_adjust))?;

    // ==== Stage 4: Drain and report ====
    analytics.flush().await?;
    let snapshot = analytics.snapshot();
    println!("{}", serde_json::to_string_pretty(&snapshot)?);
    println!("{}", analytics.summary());

    analytics.shutdown().await;
    info!("Config Pipeline finished");
    Ok(())
}

fn resolve_config_path() -> PathBuf {
    std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(concat!(env!("CARGO_MANIFEST_DIR"), "/analytics.toml")))
}

fn props(value: serde_json::Value) -> Properties {
    match value {
        serde_json::Value::Object(map) => map,
        _ => Properties::new(),
    }
}
