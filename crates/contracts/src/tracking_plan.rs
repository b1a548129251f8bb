//! TrackingPlan - project-level rules for track events

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Per-event routing rules
///
/// ```toml
/// [tracking_plan.track."Order Completed"]
/// enabled = true
/// integrations = { Mixpanel = false }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrackingPlan {
    /// Event name -> plan
    #[serde(default)]
    pub track: HashMap<String, EventPlan>,
}

/// Rules for a single track event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventPlan {
    /// Disabled events only reach the built-in destination
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Destination -> enabled, overridable by per-call options
    #[serde(default)]
    pub integrations: HashMap<String, bool>,
}

fn default_enabled() -> bool {
    true
}

impl Default for EventPlan {
    fn default() -> Self {
        Self {
            enabled: true,
            integrations: HashMap::new(),
        }
    }
}

impl TrackingPlan {
    /// Plan for `event`, if any
    pub fn event(&self, event: &str) -> Option<&EventPlan> {
        self.track.get(event)
    }

    pub fn is_empty(&self) -> bool {
        self.track.is_empty()
    }
}
