//! `info` command implementation.

use anyhow::{Context, Result};
use contracts::AnalyticsConfig;
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use tracing::info;

use crate::cli::InfoArgs;

/// Configuration info for JSON output
#[derive(Serialize)]
struct ConfigInfo {
    client: ClientInfo,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    destinations: Vec<DestinationInfo>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    tracking_plan: BTreeMap<String, EventPlanInfo>,
}

#[derive(Serialize)]
struct ClientInfo {
    write_key: String,
    flush_queue_size: usize,
    flush_interval_ms: u64,
    flush_mode: String,
    log_level: String,
    track_application_lifecycle_events: bool,
    track_attribution_information: bool,
    record_screen_views: bool,
    experimental_nanosecond_timestamps: bool,
    retry_max_attempts: u32,
}

#[derive(Serialize)]
struct DestinationInfo {
    name: String,
    transport: String,
    queue_capacity: usize,
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    params: HashMap<String, String>,
    has_settings: bool,
}

#[derive(Serialize)]
struct EventPlanInfo {
    enabled: bool,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    integrations: BTreeMap<String, bool>,
}

/// Execute the `info` command
pub fn run_info(args: &InfoArgs) -> Result<()> {
    info!(config = %args.config.display(), "Loading configuration info");

    if !args.config.exists() {
        anyhow::bail!("Configuration file not found: {}", args.config.display());
    }

    let config = config_loader::ConfigLoader::load_from_path(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;

    if args.json {
        let info = build_config_info(&config, args);
        let json =
            serde_json::to_string_pretty(&info).context("Failed to serialize config info")?;
        println!("{}", json);
    } else {
        print_config_info(&config, args);
    }

    Ok(())
}

/// Only the first and last four characters of the write key are shown
fn mask_write_key(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() <= 8 {
        return "*".repeat(chars.len());
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{head}…{tail}")
}

fn build_config_info(config: &AnalyticsConfig, args: &InfoArgs) -> ConfigInfo {
    let destinations = if args.destinations {
        config
            .destinations
            .iter()
            .map(|d| DestinationInfo {
                name: d.name.clone(),
                transport: format!("{:?}", d.transport),
                queue_capacity: d.queue_capacity,
                params: d.params.clone(),
                has_settings: config.default_integration_settings.contains_key(&d.name),
            })
            .collect()
    } else {
        Vec::new()
    };

    let tracking_plan = if args.tracking_plan {
        config
            .tracking_plan
            .track
            .iter()
            .map(|(event, plan)| {
                (
                    event.clone(),
                    EventPlanInfo {
                        enabled: plan.enabled,
                        integrations: plan
                            .integrations
                            .iter()
                            .map(|(k, v)| (k.clone(), *v))
                            .collect(),
                    },
                )
            })
            .collect()
    } else {
        BTreeMap::new()
    };

    ConfigInfo {
        client: ClientInfo {
            write_key: mask_write_key(&config.write_key),
            flush_queue_size: config.flush_queue_size,
            flush_interval_ms: config.flush_interval_ms,
            flush_mode: format!("{:?}", config.flush_mode),
            log_level: format!("{:?}", config.log_level),
            track_application_lifecycle_events: config.track_application_lifecycle_events,
            track_attribution_information: config.track_attribution_information,
            record_screen_views: config.record_screen_views,
            experimental_nanosecond_timestamps: config.experimental_nanosecond_timestamps,
            retry_max_attempts: config.retry.max_attempts,
        },
        destinations,
        tracking_plan,
    }
}

fn print_config_info(config: &AnalyticsConfig, args: &InfoArgs) {
    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║               Analytics Client Configuration                 ║");
    println!("╚══════════════════════════════════════════════════════════════╝\n");

    println!("🔑 Client");
    println!("   ├─ Write key: {}", mask_write_key(&config.write_key));
    println!("   ├─ Flush queue size: {}", config.flush_queue_size);
    match config.flush_interval() {
        Some(interval) => println!("   ├─ Flush interval: {:?}", interval),
        None => println!("   ├─ Flush interval: disabled"),
    }
    println!("   ├─ Flush mode: {:?}", config.flush_mode);
    println!("   └─ Log level: {:?}", config.log_level);

    println!("\n⚙️  Features");
    println!(
        "   ├─ Lifecycle events: {}",
        config.track_application_lifecycle_events
    );
    println!("   ├─ Attribution: {}", config.track_attribution_information);
    println!("   ├─ Screen views: {}", config.record_screen_views);
    println!(
        "   └─ Nanosecond timestamps: {}",
        config.experimental_nanosecond_timestamps
    );

    println!("\n📤 Destinations ({})", config.destinations.len());
    for (i, destination) in config.destinations.iter().enumerate() {
        let is_last = i == config.destinations.len() - 1;
        let prefix = if is_last { "└─" } else { "├─" };
        let child_prefix = if is_last { "   " } else { "│  " };

        println!(
            "   {} {} ({:?})",
            prefix, destination.name, destination.transport
        );

        if args.destinations {
            println!(
                "   {}  ├─ Queue capacity: {}",
                child_prefix, destination.queue_capacity
            );
            let mut params: Vec<_> = destination.params.iter().collect();
            params.sort();
            for (key, value) in params {
                println!("   {}  ├─ {} = {}", child_prefix, key, value);
            }
            let mut settings = config.integration_settings(&destination.name);
            if let Some(Value::String(key)) = settings.get_mut("apiKey") {
                *key = mask_write_key(key);
            }
            println!("   {}  └─ Settings: {}", child_prefix, settings);
        }
    }

    if !config.tracking_plan.is_empty() {
        println!("\n📋 Tracking Plan ({} events)", config.tracking_plan.track.len());
        if args.tracking_plan {
            let mut events: Vec<_> = config.tracking_plan.track.iter().collect();
            events.sort_by(|a, b| a.0.cmp(b.0));
            for (i, (event, plan)) in events.iter().enumerate() {
                let is_last = i == events.len() - 1;
                let prefix = if is_last { "└─" } else { "├─" };
                let state = if plan.enabled { "enabled" } else { "disabled" };
                if plan.integrations.is_empty() {
                    println!("   {} {} ({})", prefix, event, state);
                } else {
                    println!(
                        "   {} {} ({}, integrations: {:?})",
                        prefix, event, state, plan.integrations
                    );
                }
            }
        }
    }

    println!();
}
