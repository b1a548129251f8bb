//! # Integration Tests
//!
//! 集成测试与端到端测试。
//!
//! 负责：
//! - 合约快照测试 (payload 线格式、配置默认值)
//! - 端到端测试：Analytics -> source 链 -> DispatchQueue -> Router -> MemoryTransport
//! - 目的地隔离、批量阈值、就绪回调

#[cfg(test)]
mod contract_tests {
    use contracts::{AnalyticsConfig, Payload, SEGMENT_DESTINATION};
    use dispatcher::PayloadEncoder;

    #[test]
    fn test_payload_wire_keys() {
        let payload = Payload::alias("new-id")
            .previous_id("old-id")
            .anonymous_id("anon")
            .build()
            .unwrap();
        let value = PayloadEncoder::default().to_value(&payload).unwrap();

        assert_eq!(value["type"], "alias");
        assert_eq!(value["userId"], "new-id");
        assert_eq!(value["previousId"], "old-id");
        assert_eq!(value["anonymousId"], "anon");
        assert!(value["messageId"].as_str().is_some_and(|id| !id.is_empty()));
        assert!(value.get("properties").is_none());
    }

    #[test]
    fn test_default_config_routes_to_builtin() {
        let config = AnalyticsConfig::new("qaz");
        assert_eq!(config.destinations.len(), 1);
        assert_eq!(config.destinations[0].name, SEGMENT_DESTINATION);
        assert!(config_loader::ConfigLoader::validate(&config).is_ok());
    }
}

#[cfg(test)]
mod e2e_tests {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use analytics::{
        from_fn, Analytics, AnalyticsBuilder, DestinationState, DropEvents, FlushMode,
        LifecycleEvent, MemoryRecorder, MemoryTransport, Options, Properties, Registration,
        RetryConfig, TrackingPlan, SEGMENT_DESTINATION,
    };
    use contracts::{EventPlan, PipelineError};
    use serde_json::{json, Value};

    const MIXPANEL: &str = "Mixpanel";
    const AMPLITUDE: &str = "Amplitude";

    struct Recorders {
        segment: MemoryRecorder,
        mixpanel: MemoryRecorder,
        amplitude: MemoryRecorder,
    }

    /// Inline flushing, no timer, three in-memory destinations
    fn builder(flush_queue_size: usize) -> (AnalyticsBuilder, Recorders) {
        let (segment, segment_rec) = MemoryTransport::new("segment");
        let (mixpanel, mixpanel_rec) = MemoryTransport::new("mixpanel");
        let (amplitude, amplitude_rec) = MemoryTransport::new("amplitude");

        let builder = Analytics::builder("qaz")
            .flush_queue_size(flush_queue_size)
            .flush_mode(FlushMode::Inline)
            .flush_interval(Duration::ZERO)
            .transport(SEGMENT_DESTINATION, segment)
            .transport(MIXPANEL, mixpanel)
            .transport(AMPLITUDE, amplitude);

        let recorders = Recorders {
            segment: segment_rec,
            mixpanel: mixpanel_rec,
            amplitude: amplitude_rec,
        };
        (builder, recorders)
    }

    fn props(value: Value) -> Properties {
        match value {
            Value::Object(map) => map,
            _ => Properties::new(),
        }
    }

    /// Pass-through middleware leaves the payload untouched
    #[tokio::test]
    async fn test_identity_pass_through() {
        let seen = Arc::new(support::Slot::default());
        let seen_clone = Arc::clone(&seen);
        let (builder, rec) = builder(1);
        let analytics = builder
            .add_source_middleware(from_fn(move |chain| {
                seen_clone.set(chain.payload().message_id().to_string());
                let payload = chain.payload().clone();
                chain.proceed(payload)
            }))
            .build()
            .unwrap();

        analytics
            .track("Button A Clicked", props(json!({ "plan": "pro" })), None)
            .unwrap();
        analytics.flush().await.unwrap();

        let delivered = rec.segment.payloads();
        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0]["messageId"], seen.get());
        assert_eq!(delivered[0]["properties"]["plan"], "pro");
        assert_eq!(rec.mixpanel.payloads(), delivered);
        analytics.shutdown().await;
    }

    /// Returning without proceeding drops silently
    #[tokio::test]
    async fn test_silent_drop_queues_nothing() {
        let (builder, rec) = builder(1);
        let analytics = builder
            .add_source_middleware(from_fn(|_chain| Ok(())))
            .build()
            .unwrap();

        assert!(analytics.track("Button A Clicked", Properties::new(), None).is_ok());
        analytics.flush().await.unwrap();

        assert_eq!(analytics.snapshot().flushes, 0);
        assert!(rec.segment.payloads().is_empty());
        assert_eq!(analytics.summary().total_dropped, 1);
        analytics.shutdown().await;
    }

    /// A second proceed is rejected and nothing is forwarded twice
    #[tokio::test]
    async fn test_double_proceed_delivers_once() {
        let rejected = Arc::new(AtomicBool::new(false));
        let rejected_clone = Arc::clone(&rejected);
        let (builder, rec) = builder(1);
        let analytics = builder
            .add_source_middleware(from_fn(move |chain| {
                let payload = chain.payload().clone();
                chain.proceed(payload.clone())?;
                if let Err(PipelineError::ChainReuse { .. }) = chain.proceed(payload) {
                    rejected_clone.store(true, Ordering::SeqCst);
                }
                Ok(())
            }))
            .build()
            .unwrap();

        analytics.track("Button A Clicked", Properties::new(), None).unwrap();
        analytics.flush().await.unwrap();

        assert!(rejected.load(Ordering::SeqCst));
        assert_eq!(rec.segment.payloads().len(), 1);
        analytics.shutdown().await;
    }

    /// Destination middleware only affects its own destination
    #[tokio::test]
    async fn test_destination_isolation() {
        let (builder, rec) = builder(1);
        let analytics = builder
            .add_destination_middleware(MIXPANEL, DropEvents::new(["Button B Clicked"]))
            .add_destination_middleware(
                AMPLITUDE,
                from_fn(|_chain| Err(PipelineError::interceptor("boom"))),
            )
            .build()
            .unwrap();

        analytics.track("Button A Clicked", Properties::new(), None).unwrap();
        analytics.track("Button B Clicked", Properties::new(), None).unwrap();
        analytics.flush().await.unwrap();

        assert_eq!(rec.segment.events(), vec!["Button A Clicked", "Button B Clicked"]);
        assert_eq!(rec.mixpanel.events(), vec!["Button A Clicked"]);
        assert!(rec.amplitude.events().is_empty());
        analytics.shutdown().await;
    }

    /// A slow or failing destination does not hold back the others
    #[tokio::test]
    async fn test_failed_destination_isolated() {
        let (segment, segment_rec) = MemoryTransport::new("segment");
        let (broken, broken_rec) = MemoryTransport::new("broken");
        let analytics = Analytics::builder("qaz")
            .flush_queue_size(1)
            .flush_mode(FlushMode::Inline)
            .transport(SEGMENT_DESTINATION, segment)
            .transport(MIXPANEL, broken.fail_initialize("bad token"))
            .build()
            .unwrap();

        assert!(analytics.wait_integration_ready(MIXPANEL).await.is_err());
        analytics.track("Button A Clicked", Properties::new(), None).unwrap();
        analytics.flush().await.unwrap();

        assert_eq!(segment_rec.events(), vec!["Button A Clicked"]);
        assert!(broken_rec.payloads().is_empty());
        assert_eq!(analytics.integration_state(MIXPANEL), DestinationState::Failed);
        analytics.shutdown().await;
    }

    /// Reaching flushQueueSize flushes exactly once, in enqueue order
    #[tokio::test]
    async fn test_flush_at_threshold_preserves_order() {
        let (builder, rec) = builder(3);
        let analytics = builder.build().unwrap();

        for event in ["first", "second", "third"] {
            analytics.track(event, Properties::new(), None).unwrap();
        }
        let snapshot = analytics.snapshot();
        assert_eq!(snapshot.flushes, 1);
        assert_eq!(snapshot.pending, 0);

        analytics.flush().await.unwrap();
        assert_eq!(rec.segment.events(), vec!["first", "second", "third"]);
        assert_eq!(analytics.snapshot().flushes, 1);
        analytics.shutdown().await;
    }

    /// Below the threshold nothing moves until an explicit flush
    #[tokio::test]
    async fn test_below_threshold_waits_for_flush() {
        let (builder, rec) = builder(5);
        let analytics = builder.build().unwrap();

        for i in 0..3 {
            analytics
                .track("Button A Clicked", props(json!({ "i": i })), None)
                .unwrap();
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(analytics.snapshot().pending, 3);
        assert_eq!(analytics.snapshot().flushes, 0);
        assert!(rec.segment.payloads().is_empty());

        let report = analytics.flush().await.unwrap();
        assert_eq!(report.payloads, 3);
        assert_eq!(rec.segment.payloads().len(), 3);
        analytics.shutdown().await;
    }

    /// flushQueueSize=1 and a source filter on the only event: no flush at all
    #[tokio::test]
    async fn test_filtered_event_never_flushes() {
        let (builder, rec) = builder(1);
        let analytics = builder
            .add_source_middleware(DropEvents::new(["Button B Clicked"]))
            .build()
            .unwrap();

        analytics.track("Button B Clicked", Properties::new(), None).unwrap();
        analytics.flush().await.unwrap();

        assert_eq!(analytics.snapshot().flushes, 0);
        assert!(rec.segment.payloads().is_empty());
        assert!(rec.mixpanel.payloads().is_empty());
        analytics.shutdown().await;
    }

    /// Callbacks fire exactly once, whether registered before or after ready
    #[tokio::test]
    async fn test_readiness_callbacks_fire_once() {
        let (builder, _rec) = builder(1);
        let analytics = builder.build().unwrap();

        let early = Arc::new(AtomicUsize::new(0));
        let early_clone = Arc::clone(&early);
        let registration = analytics
            .on_integration_ready(MIXPANEL, move |_| {
                early_clone.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        assert_ne!(registration, Registration::Discarded);

        analytics.wait_integration_ready(MIXPANEL).await.unwrap();
        assert_eq!(early.load(Ordering::SeqCst), 1);

        let late = Arc::new(AtomicUsize::new(0));
        let late_clone = Arc::clone(&late);
        let registration = analytics
            .on_integration_ready(MIXPANEL, move |_| {
                late_clone.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        assert_eq!(registration, Registration::Fired);
        assert_eq!(late.load(Ordering::SeqCst), 1);

        analytics.track("Button A Clicked", Properties::new(), None).unwrap();
        analytics.flush().await.unwrap();
        assert_eq!(early.load(Ordering::SeqCst), 1);
        analytics.shutdown().await;
    }

    /// Tracking plan rules layered under per-call options
    #[tokio::test]
    async fn test_tracking_plan_and_options() {
        let mut plan = TrackingPlan::default();
        plan.track.insert(
            "Button B Clicked".into(),
            EventPlan {
                enabled: false,
                ..Default::default()
            },
        );
        plan.track.insert(
            "Checkout".into(),
            EventPlan {
                enabled: true,
                integrations: [(AMPLITUDE.to_string(), false)].into_iter().collect(),
            },
        );

        let (builder, rec) = builder(1);
        let analytics = builder.tracking_plan(plan).build().unwrap();

        // Disabled by the plan: built-in only, options cannot re-enable
        let force = Options::new().set_integration(MIXPANEL, true);
        analytics
            .track("Button B Clicked", Properties::new(), Some(&force))
            .unwrap();
        // Plan toggle off for Amplitude
        analytics.track("Checkout", Properties::new(), None).unwrap();
        // Options re-enable what the plan toggled off
        let amplitude_on = Options::new().set_integration(AMPLITUDE, true);
        analytics
            .track("Checkout", Properties::new(), Some(&amplitude_on))
            .unwrap();
        // All off, one back on
        let only_mixpanel = Options::new()
            .set_integration("All", false)
            .set_integration(MIXPANEL, true);
        analytics
            .track("Button A Clicked", Properties::new(), Some(&only_mixpanel))
            .unwrap();
        analytics.flush().await.unwrap();

        assert_eq!(
            rec.segment.events(),
            vec!["Button B Clicked", "Checkout", "Checkout", "Button A Clicked"]
        );
        assert_eq!(
            rec.mixpanel.events(),
            vec!["Checkout", "Checkout", "Button A Clicked"]
        );
        assert_eq!(rec.amplitude.events(), vec!["Checkout"]);
        analytics.shutdown().await;
    }

    #[tokio::test]
    async fn test_nanosecond_timestamps() {
        let (builder, rec) = builder(1);
        let analytics = builder.experimental_nanosecond_timestamps().build().unwrap();

        analytics.track("Button A Clicked", Properties::new(), None).unwrap();
        analytics.flush().await.unwrap();

        let payloads = rec.segment.payloads();
        let timestamp = payloads[0]["timestamp"].as_str().unwrap();
        let fraction = timestamp
            .rsplit_once('.')
            .map(|(_, f)| f.trim_end_matches('Z'))
            .unwrap();
        assert_eq!(fraction.len(), 9);
        analytics.shutdown().await;
    }

    #[tokio::test]
    async fn test_identify_then_alias() {
        let (builder, rec) = builder(1);
        let analytics = builder.build().unwrap();
        let anonymous_id = analytics.anonymous_id();

        analytics.alias("early", None).unwrap();
        analytics
            .identify(Some("user-1"), props(json!({ "name": "Ada" })), None)
            .unwrap();
        analytics.alias("user-2", None).unwrap();
        analytics.track("Button A Clicked", Properties::new(), None).unwrap();
        analytics.flush().await.unwrap();

        let payloads = rec.segment.payloads();
        assert_eq!(payloads[0]["previousId"], anonymous_id.as_str());
        assert_eq!(payloads[1]["traits"]["name"], "Ada");
        assert_eq!(payloads[2]["previousId"], "user-1");
        assert_eq!(payloads[2]["userId"], "user-2");
        assert_eq!(payloads[3]["userId"], "user-1");
        assert_eq!(payloads[3]["context"]["traits"]["name"], "Ada");
        analytics.shutdown().await;
    }

    #[tokio::test]
    async fn test_reset_reaches_every_destination() {
        let (builder, rec) = builder(1);
        let analytics = builder.build().unwrap();
        analytics.identify(Some("user-1"), Properties::new(), None).unwrap();
        let before = analytics.anonymous_id();

        analytics.reset().await.unwrap();
        analytics.flush().await.unwrap();

        assert_ne!(analytics.anonymous_id(), before);
        assert_eq!(analytics.user_id(), None);
        assert_eq!(rec.segment.reset_count(), 1);
        assert_eq!(rec.mixpanel.reset_count(), 1);
        assert_eq!(rec.amplitude.reset_count(), 1);
        analytics.shutdown().await;
    }

    #[tokio::test]
    async fn test_opt_out_drops_until_opted_back_in() {
        let (builder, rec) = builder(1);
        let analytics = builder.build().unwrap();

        analytics.opt_out(true);
        analytics.track("hidden", Properties::new(), None).unwrap();
        analytics.opt_out(false);
        analytics.track("visible", Properties::new(), None).unwrap();
        analytics.flush().await.unwrap();

        assert_eq!(rec.segment.events(), vec!["visible"]);
        analytics.shutdown().await;
    }

    /// Shutdown drains pending events, closes transports and rejects new calls
    #[tokio::test]
    async fn test_shutdown_drains_and_closes() {
        let (builder, rec) = builder(10);
        let analytics = builder.build().unwrap();

        analytics.track("pending", Properties::new(), None).unwrap();
        analytics.shutdown().await;

        assert_eq!(rec.segment.events(), vec!["pending"]);
        assert!(rec.segment.is_closed());
        assert!(rec.amplitude.is_closed());

        let err = analytics
            .track("late", Properties::new(), None)
            .unwrap_err();
        assert!(err.is_shutdown());
        assert_eq!(
            err.to_string(),
            "Cannot enqueue messages after client is shutdown."
        );
        analytics.shutdown().await;
    }

    #[tokio::test]
    async fn test_retry_recovers_transient_failures() {
        let (segment, rec) = MemoryTransport::new("segment");
        let analytics = Analytics::builder("qaz")
            .flush_queue_size(1)
            .flush_mode(FlushMode::Inline)
            .retry(RetryConfig {
                max_attempts: 3,
                initial_backoff_ms: 1,
                max_backoff_ms: 2,
            })
            .transport(SEGMENT_DESTINATION, segment.fail_first(2))
            .build()
            .unwrap();

        analytics.track("Button A Clicked", Properties::new(), None).unwrap();
        analytics.flush().await.unwrap();

        assert_eq!(rec.events(), vec!["Button A Clicked"]);
        let snapshot = analytics.snapshot();
        assert_eq!(snapshot.destinations[0].metrics.retry_count, 2);
        assert_eq!(snapshot.destinations[0].metrics.delivered_count, 1);
        analytics.shutdown().await;
    }

    /// Host-reported events only flow when their feature flag is set
    #[tokio::test]
    async fn test_host_events_follow_flags() {
        let (builder, rec) = builder(1);
        let analytics = builder
            .track_application_lifecycle_events()
            .record_screen_views()
            .build()
            .unwrap();

        analytics
            .application_lifecycle(LifecycleEvent::Opened {
                version: "1.0".into(),
                build: "1".into(),
                from_background: false,
            })
            .unwrap();
        analytics.record_screen_view("MainActivity").unwrap();
        analytics
            .record_install_attribution(props(json!({ "campaign": "spring" })))
            .unwrap();
        analytics.flush().await.unwrap();

        let payloads = rec.segment.payloads();
        assert_eq!(payloads.len(), 2);
        assert_eq!(payloads[0]["event"], "Application Opened");
        assert_eq!(payloads[1]["type"], "screen");
        assert_eq!(payloads[1]["name"], "MainActivity");
        analytics.shutdown().await;
    }

    /// Background mode with a timer flushes without an explicit call
    #[tokio::test]
    async fn test_background_interval_flush() {
        let (segment, rec) = MemoryTransport::new("segment");
        let analytics = Analytics::builder("qaz")
            .flush_queue_size(100)
            .flush_interval(Duration::from_millis(20))
            .transport(SEGMENT_DESTINATION, segment)
            .build()
            .unwrap();

        analytics.track("Button A Clicked", Properties::new(), None).unwrap();

        let mut delivered = false;
        for _ in 0..50 {
            tokio::time::sleep(Duration::from_millis(10)).await;
            if !rec.payloads().is_empty() {
                delivered = true;
                break;
            }
        }
        assert!(delivered, "timer flush never happened");
        analytics.shutdown().await;
    }

    #[tokio::test]
    async fn test_integration_settings_reach_transport() {
        let (builder, rec) = builder(1);
        let analytics = builder
            .integration_settings(MIXPANEL, json!({ "token": "abc" }))
            .build()
            .unwrap();

        analytics.wait_integration_ready(MIXPANEL).await.unwrap();
        analytics.wait_integration_ready(AMPLITUDE).await.unwrap();
        assert_eq!(rec.mixpanel.settings().unwrap()["token"], "abc");
        assert_eq!(rec.amplitude.settings(), Some(Value::Null));
        analytics.shutdown().await;
    }

    #[tokio::test]
    async fn test_segment_settings_carry_write_key() {
        let (builder, rec) = builder(1);
        let analytics = builder
            .integration_settings(
                SEGMENT_DESTINATION,
                json!({ "appToken": "<>", "trackAttributionData": true }),
            )
            .build()
            .unwrap();

        analytics.wait_integration_ready(SEGMENT_DESTINATION).await.unwrap();
        let settings = rec.segment.settings().unwrap();
        assert_eq!(settings["apiKey"], "qaz");
        assert_eq!(settings["appToken"], "<>");
        assert_eq!(settings["trackAttributionData"], true);
        analytics.shutdown().await;
    }

    mod support {
        use std::sync::Mutex;

        /// Last value written by a middleware
        #[derive(Default)]
        pub struct Slot(Mutex<String>);

        impl Slot {
            pub fn set(&self, value: String) {
                *self.0.lock().unwrap() = value;
            }

            pub fn get(&self) -> String {
                self.0.lock().unwrap().clone()
            }
        }
    }
}

#[cfg(test)]
mod config_tests {
    use analytics::Analytics;
    use config_loader::{ConfigFormat, ConfigLoader};

    #[test]
    fn test_invalid_flush_queue_size_rejected() {
        let err = ConfigLoader::load_from_str(
            "write_key = \"qaz\"\nflush_queue_size = 0\n",
            ConfigFormat::Toml,
        )
        .unwrap_err();
        assert!(err.is_configuration());
        assert!(err.to_string().contains("flushQueueSize"));
    }

    #[tokio::test]
    async fn test_client_from_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("analytics.json");
        std::fs::write(
            &path,
            r#"{
                "write_key": "qaz",
                "flush_queue_size": 2,
                "flush_mode": "inline",
                "flush_interval_ms": 0,
                "destinations": [
                    { "name": "Segment.io", "transport": "log" },
                    { "name": "Mixpanel", "transport": "log" }
                ]
            }"#,
        )
        .unwrap();

        let config = ConfigLoader::load_from_path(&path).unwrap();
        let analytics = Analytics::from_config(config).build().unwrap();
        analytics.wait_integration_ready("Mixpanel").await.unwrap();

        analytics.track("a", Default::default(), None).unwrap();
        analytics.track("b", Default::default(), None).unwrap();
        let snapshot = analytics.snapshot();
        assert_eq!(snapshot.flushes, 1);
        assert_eq!(snapshot.destinations.len(), 2);
        analytics.shutdown().await;
    }
}
