//! RoutingPolicy - per-payload destination enablement
//!
//! Resolution order for a destination `D`:
//! 1. Track events disabled by the tracking plan only reach the built-in
//!    destination; per-call options cannot re-enable them.
//! 2. The built-in destination ignores integration toggles.
//! 3. `integrations[D]`, then `integrations["All"]`, then enabled. Plan
//!    toggles are layered under the payload's own toggles.

use contracts::{
    DestinationId, Payload, PayloadType, Properties, TrackingPlan, ALL_INTEGRATIONS_KEY,
};
use serde_json::Value;

#[derive(Debug, Clone, Default)]
pub struct RoutingPolicy {
    tracking_plan: TrackingPlan,
}

impl RoutingPolicy {
    pub fn new(tracking_plan: TrackingPlan) -> Self {
        Self { tracking_plan }
    }

    pub fn tracking_plan(&self) -> &TrackingPlan {
        &self.tracking_plan
    }

    /// Whether `payload` should be offered to `destination`
    pub fn is_enabled(&self, destination: &DestinationId, payload: &Payload) -> bool {
        let plan = match (payload.kind(), payload.event()) {
            (PayloadType::Track, Some(event)) => self.tracking_plan.event(event),
            _ => None,
        };

        if let Some(plan) = plan {
            if !plan.enabled {
                return destination.is_builtin();
            }
        }

        if destination.is_builtin() {
            return true;
        }

        match plan {
            Some(plan) if !plan.integrations.is_empty() => {
                let mut merged: Properties = plan
                    .integrations
                    .iter()
                    .map(|(k, v)| (k.clone(), Value::Bool(*v)))
                    .collect();
                for (k, v) in payload.integrations() {
                    merged.insert(k.clone(), v.clone());
                }
                integration_enabled(&merged, destination)
            }
            _ => integration_enabled(payload.integrations(), destination),
        }
    }
}

fn integration_enabled(integrations: &Properties, key: &str) -> bool {
    integrations
        .get(key)
        .or_else(|| integrations.get(ALL_INTEGRATIONS_KEY))
        .map_or(true, is_truthy)
}

// A settings object counts as enabled
fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Null => false,
        _ => true,
    }
}
