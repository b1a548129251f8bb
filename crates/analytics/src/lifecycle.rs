//! Application lifecycle events reported by the host

use contracts::Properties;
use serde_json::Value;

/// Lifecycle transition observed by the host application
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// First launch after install
    Installed { version: String, build: String },
    /// First launch after an upgrade
    Updated {
        previous_version: String,
        previous_build: String,
        version: String,
        build: String,
    },
    /// Launched or brought back to the foreground
    Opened {
        version: String,
        build: String,
        from_background: bool,
    },
    /// Sent to the background
    Backgrounded,
}

impl LifecycleEvent {
    /// Track event name
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::Installed { .. } => "Application Installed",
            Self::Updated { .. } => "Application Updated",
            Self::Opened { .. } => "Application Opened",
            Self::Backgrounded => "Application Backgrounded",
        }
    }

    /// Track event properties
    pub fn properties(&self) -> Properties {
        let mut properties = Properties::new();
        let mut put = |key: &str, value: Value| {
            properties.insert(key.to_string(), value);
        };

        match self {
            Self::Installed { version, build } => {
                put("version", version.as_str().into());
                put("build", build.as_str().into());
            }
            Self::Updated {
                previous_version,
                previous_build,
                version,
                build,
            } => {
                put("previous_version", previous_version.as_str().into());
                put("previous_build", previous_build.as_str().into());
                put("version", version.as_str().into());
                put("build", build.as_str().into());
            }
            Self::Opened {
                version,
                build,
                from_background,
            } => {
                put("version", version.as_str().into());
                put("build", build.as_str().into());
                put("from_background", Value::Bool(*from_background));
            }
            Self::Backgrounded => {}
        }
        properties
    }
}
