//! Event file format for `run`.
//!
//! One JSON object per line, tagged by `type`:
//!
//! ```text
//! {"type":"identify","userId":"prateek","traits":{"plan":"pro"}}
//! {"type":"track","event":"Button A Clicked","properties":{"color":"red"}}
//! {"type":"screen","name":"Main","integrations":{"Mixpanel":false}}
//! ```
//!
//! Blank lines and lines starting with `#` are skipped.

use std::collections::BTreeMap;
use std::path::Path;

use analytics::{Analytics, Options, Properties};
use serde::Deserialize;

use crate::error::{CliError, Result};

/// One replayed client call
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReplayEvent {
    Track {
        event: String,
        #[serde(default)]
        properties: Properties,
    },
    Identify {
        #[serde(default, rename = "userId")]
        user_id: Option<String>,
        #[serde(default)]
        traits: Properties,
    },
    Screen {
        #[serde(default)]
        category: Option<String>,
        #[serde(default)]
        name: Option<String>,
        #[serde(default)]
        properties: Properties,
    },
    Group {
        #[serde(rename = "groupId")]
        group_id: String,
        #[serde(default)]
        traits: Properties,
    },
    Alias {
        #[serde(rename = "userId")]
        user_id: String,
    },
}

/// A line of the event file: the call plus per-call destination toggles
#[derive(Debug, Clone, Deserialize)]
pub struct ReplayRecord {
    #[serde(flatten)]
    pub event: ReplayEvent,
    #[serde(default)]
    pub integrations: BTreeMap<String, bool>,
}

impl ReplayRecord {
    fn options(&self) -> Option<Options> {
        if self.integrations.is_empty() {
            return None;
        }
        let options = self
            .integrations
            .iter()
            .fold(Options::new(), |options, (name, enabled)| {
                options.set_integration(name.clone(), *enabled)
            });
        Some(options)
    }

    /// Issue the matching client call
    pub fn dispatch(&self, analytics: &Analytics) -> analytics::Result<()> {
        let options = self.options();
        let options = options.as_ref();
        match &self.event {
            ReplayEvent::Track { event, properties } => {
                analytics.track(event, properties.clone(), options)
            }
            ReplayEvent::Identify { user_id, traits } => {
                analytics.identify(user_id.as_deref(), traits.clone(), options)
            }
            ReplayEvent::Screen {
                category,
                name,
                properties,
            } => analytics.screen(
                category.as_deref(),
                name.as_deref(),
                properties.clone(),
                options,
            ),
            ReplayEvent::Group { group_id, traits } => {
                analytics.group(group_id, traits.clone(), options)
            }
            ReplayEvent::Alias { user_id } => analytics.alias(user_id, options),
        }
    }
}

/// Parse an event file
pub fn read_events(path: &Path) -> Result<Vec<ReplayRecord>> {
    let content =
        std::fs::read_to_string(path).map_err(|e| CliError::event_file(path, e))?;
    parse_events(&content)
}

fn parse_events(content: &str) -> Result<Vec<ReplayRecord>> {
    content
        .lines()
        .enumerate()
        .filter(|(_, line)| {
            let line = line.trim();
            !line.is_empty() && !line.starts_with('#')
        })
        .map(|(idx, line)| {
            serde_json::from_str(line).map_err(|e| CliError::event_parse(idx + 1, e.to_string()))
        })
        .collect()
}
