//! `validate` command implementation.

use anyhow::{Context, Result};
use contracts::{AnalyticsConfig, FlushMode, SEGMENT_DESTINATION};
use serde::Serialize;
use tracing::info;

use crate::cli::ValidateArgs;

/// Validation result for JSON output
#[derive(Serialize)]
struct ValidationResult {
    valid: bool,
    config_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    warnings: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<ConfigSummary>,
}

#[derive(Serialize)]
struct ConfigSummary {
    flush_queue_size: usize,
    flush_mode: String,
    destination_count: usize,
    tracking_plan_events: usize,
}

/// Execute the `validate` command
pub fn run_validate(args: &ValidateArgs) -> Result<()> {
    info!(config = %args.config.display(), "Validating configuration");

    let result = validate_config(args);

    if args.json {
        let json = serde_json::to_string_pretty(&result)
            .context("Failed to serialize validation result")?;
        println!("{}", json);
    } else {
        print_validation_result(&result);
    }

    if result.valid {
        Ok(())
    } else {
        anyhow::bail!("Configuration validation failed")
    }
}

fn validate_config(args: &ValidateArgs) -> ValidationResult {
    let config_path = args.config.display().to_string();

    if !args.config.exists() {
        return ValidationResult {
            valid: false,
            config_path,
            error: Some(format!("File not found: {}", args.config.display())),
            warnings: None,
            summary: None,
        };
    }

    match config_loader::ConfigLoader::load_from_path(&args.config) {
        Ok(config) => {
            let warnings = collect_warnings(&config);
            ValidationResult {
                valid: true,
                config_path,
                error: None,
                warnings: (!warnings.is_empty()).then_some(warnings),
                summary: Some(ConfigSummary {
                    flush_queue_size: config.flush_queue_size,
                    flush_mode: format!("{:?}", config.flush_mode),
                    destination_count: config.destinations.len(),
                    tracking_plan_events: config.tracking_plan.track.len(),
                }),
            }
        }
        Err(e) => ValidationResult {
            valid: false,
            config_path,
            error: Some(e.to_string()),
            warnings: None,
            summary: None,
        },
    }
}

/// Collect configuration warnings (non-fatal issues)
fn collect_warnings(config: &AnalyticsConfig) -> Vec<String> {
    let mut warnings = Vec::new();

    if !config.destinations.iter().any(|d| d.name == SEGMENT_DESTINATION) {
        warnings.push(format!(
            "No '{SEGMENT_DESTINATION}' destination - events disabled by the tracking plan go nowhere"
        ));
    }

    if config.flush_mode == FlushMode::Background && config.flush_interval().is_none() {
        warnings.push(
            "flush_interval_ms is 0 - events below flush_queue_size wait for an explicit flush"
                .to_string(),
        );
    }

    for name in config.default_integration_settings.keys() {
        if !config.destinations.iter().any(|d| &d.name == name) {
            warnings.push(format!(
                "default_integration_settings.{name} has no matching destination"
            ));
        }
    }

    let mut disabled: Vec<_> = config
        .tracking_plan
        .track
        .iter()
        .filter(|(_, plan)| !plan.enabled)
        .map(|(event, _)| event.as_str())
        .collect();
    disabled.sort_unstable();
    for event in disabled {
        warnings.push(format!(
            "tracking plan disables '{event}' for every destination except {SEGMENT_DESTINATION}"
        ));
    }

    warnings
}

fn print_validation_result(result: &ValidationResult) {
    if result.valid {
        println!("✓ Configuration is valid: {}", result.config_path);

        if let Some(ref summary) = result.summary {
            println!("\n  Flush queue size: {}", summary.flush_queue_size);
            println!("  Flush mode: {}", summary.flush_mode);
            println!("  Destinations: {}", summary.destination_count);
            println!("  Tracking plan events: {}", summary.tracking_plan_events);
        }

        if let Some(ref warnings) = result.warnings {
            println!("\n⚠ Warnings:");
            for warning in warnings {
                println!("  - {}", warning);
            }
        }
    } else {
        println!("✗ Configuration is invalid: {}", result.config_path);
        if let Some(ref error) = result.error {
            println!("\n  Error: {}", error);
        }
    }
}
