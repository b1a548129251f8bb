//! Sample App
//!
//! Configures a client the way a mobile host application would: nanosecond
//! timestamps, lifecycle and attribution tracking, Adjust settings, a source
//! middleware that rebuilds "Button B Clicked", and a Segment.io destination
//! middleware that forwards only that event.
//!
//! Run with: cargo run --bin sample_app

use std::time::Duration;

use analytics::{
    from_fn, Analytics, LifecycleEvent, LogLevel, MemoryTransport, PayloadType, Properties,
    SEGMENT_DESTINATION,
};
use observability::{LogFormat, ObservabilityConfig};
use serde_json::json;
use tracing::{debug, info};

const ANALYTICS_WRITE_KEY: &str = "1vCwH2CEddxqO0nsk7rKezv0gzFNlJGH";
const BUTTON_B: &str = "Button B Clicked";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init_with_config(ObservabilityConfig {
        log_format: LogFormat::Compact,
        ..ObservabilityConfig::for_log_level(LogLevel::Verbose)
    })?;

    info!("Starting Sample App");

    // Adjust delivers into memory so the run can report what it received
    let (adjust, adjust_recorder) = MemoryTransport::new("adjust");

    let analytics = Analytics::builder(ANALYTICS_WRITE_KEY)
        .experimental_nanosecond_timestamps()
        .track_application_lifecycle_events()
        .track_attribution_information()
        .integration_settings(
            "Adjust",
            json!({ "appToken": "<>", "trackAttributionData": true }),
        )
        .transport("Adjust", adjust)
        .add_source_middleware(from_fn(|chain| {
            let payload = chain.payload();
            if payload.kind() == PayloadType::Track && payload.is_event(BUTTON_B) {
                let rebuilt = payload.to_builder().build()?;
                return chain.proceed(rebuilt);
            }
            let payload = payload.clone();
            chain.proceed(payload)
        }))
        .add_destination_middleware(
            SEGMENT_DESTINATION,
            from_fn(|chain| {
                let payload = chain.payload();
                if payload.kind() == PayloadType::Track && payload.is_event(BUTTON_B) {
                    let rebuilt = payload.to_builder().build()?;
                    return chain.proceed(rebuilt);
                }
                debug!(message_id = payload.message_id(), "Not forwarded to Segment.io");
                Ok(())
            }),
        )
        .flush_queue_size(1)
        .log_level(LogLevel::Verbose)
        .record_screen_views()
        .build()?;

    analytics.on_integration_ready(SEGMENT_DESTINATION, |_| {
        info!("Segment integration ready.");
    })?;

    // ==== Host callbacks ====
    analytics.application_lifecycle(LifecycleEvent::Installed {
        version: "1.0.0".into(),
        build: "1".into(),
    })?;
    analytics.application_lifecycle(LifecycleEvent::Opened {
        version: "1.0.0".into(),
        build: "1".into(),
        from_background: false,
    })?;
    analytics.record_install_attribution(properties(json!({
        "provider": "Adjust",
        "campaign": { "source": "spring-launch" }
    })))?;
    analytics.record_screen_view("MainActivity")?;

    // ==== User actions ====
    analytics.track("Button A Clicked", Properties::new(), None)?;
    analytics.track(BUTTON_B, properties(json!({ "variant": "b" })), None)?;
    analytics.identify(
        Some("user-42"),
        properties(json!({ "email": "user42@example.com" })),
        None,
    )?;
    analytics.application_lifecycle(LifecycleEvent::Backgrounded)?;

    analytics.flush().await?;
    tokio::time::sleep(Duration::from_millis(50)).await;

    let summary = analytics.summary();
    println!("{summary}");
    println!("Adjust received: {:?}", adjust_recorder.events());
    if let Some(settings) = adjust_recorder.settings() {
        println!("Adjust settings: {settings}");
    }

    analytics.shutdown().await;
    info!("Sample App finished");
    Ok(())
}

fn properties(value: serde_json::Value) -> Properties {
    match value {
        serde_json::Value::Object(map) => map,
        _ => Properties::new(),
    }
}
