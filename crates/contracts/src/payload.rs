//! Payload - one immutable event record
//!
//! Payloads are produced by the client API, threaded through middleware
//! chains by value and serialized by the destination workers. Fields are
//! private; a modified copy is derived with [`Payload::to_builder`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use uuid::Uuid;

use crate::PipelineError;

/// String-keyed JSON mapping used for properties, traits, context and
/// integration toggles.
pub type Properties = Map<String, Value>;

/// Event kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayloadType {
    Identify,
    Track,
    Screen,
    Group,
    Alias,
}

impl PayloadType {
    /// Lowercase wire name
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Identify => "identify",
            Self::Track => "track",
            Self::Screen => "screen",
            Self::Group => "group",
            Self::Alias => "alias",
        }
    }
}

impl fmt::Display for PayloadType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable event record
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Payload {
    #[serde(rename = "type")]
    kind: PayloadType,
    message_id: String,
    timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    anonymous_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    event: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    group_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    previous_id: Option<String>,
    #[serde(skip_serializing_if = "Map::is_empty")]
    properties: Properties,
    #[serde(skip_serializing_if = "Map::is_empty")]
    traits: Properties,
    context: Properties,
    #[serde(skip_serializing_if = "Map::is_empty")]
    integrations: Properties,
}

impl Payload {
    /// Build a payload from its core fields.
    ///
    /// # Errors
    /// Returns [`PipelineError::Validation`] if `kind` is `Track` and `event`
    /// is missing or blank, or if the per-kind rules of
    /// [`PayloadBuilder::build`] reject the result.
    pub fn build(
        kind: PayloadType,
        event: Option<&str>,
        properties: Properties,
        context: Properties,
    ) -> Result<Self, PipelineError> {
        let mut builder = PayloadBuilder::new(kind)
            .properties(properties)
            .context(context);
        if let Some(event) = event {
            builder = builder.event(event);
        }
        builder.build()
    }

    /// Start a builder for the given kind
    pub fn builder(kind: PayloadType) -> PayloadBuilder {
        PayloadBuilder::new(kind)
    }

    /// Start a track builder
    pub fn track(event: impl Into<String>) -> PayloadBuilder {
        PayloadBuilder::new(PayloadType::Track).event(event)
    }

    /// Start an identify builder
    pub fn identify() -> PayloadBuilder {
        PayloadBuilder::new(PayloadType::Identify)
    }

    /// Start a screen builder
    pub fn screen() -> PayloadBuilder {
        PayloadBuilder::new(PayloadType::Screen)
    }

    /// Start a group builder
    pub fn group(group_id: impl Into<String>) -> PayloadBuilder {
        PayloadBuilder::new(PayloadType::Group).group_id(group_id)
    }

    /// Start an alias builder; `user_id` is the new identity
    pub fn alias(user_id: impl Into<String>) -> PayloadBuilder {
        PayloadBuilder::new(PayloadType::Alias).user_id(user_id)
    }

    /// Builder seeded with this payload's fields
    pub fn to_builder(&self) -> PayloadBuilder {
        PayloadBuilder {
            kind: self.kind,
            message_id: Some(self.message_id.clone()),
            timestamp: Some(self.timestamp),
            anonymous_id: self.anonymous_id.clone(),
            user_id: self.user_id.clone(),
            event: self.event.clone(),
            name: self.name.clone(),
            category: self.category.clone(),
            group_id: self.group_id.clone(),
            previous_id: self.previous_id.clone(),
            properties: self.properties.clone(),
            traits: self.traits.clone(),
            context: self.context.clone(),
            integrations: self.integrations.clone(),
        }
    }

    pub fn kind(&self) -> PayloadType {
        self.kind
    }

    pub fn message_id(&self) -> &str {
        &self.message_id
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn anonymous_id(&self) -> Option<&str> {
        self.anonymous_id.as_deref()
    }

    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    /// Event name (track only)
    pub fn event(&self) -> Option<&str> {
        self.event.as_deref()
    }

    /// Case-insensitive match against the track event name
    pub fn is_event(&self, name: &str) -> bool {
        self.event
            .as_deref()
            .is_some_and(|event| event.eq_ignore_ascii_case(name))
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn category(&self) -> Option<&str> {
        self.category.as_deref()
    }

    pub fn group_id(&self) -> Option<&str> {
        self.group_id.as_deref()
    }

    pub fn previous_id(&self) -> Option<&str> {
        self.previous_id.as_deref()
    }

    pub fn properties(&self) -> &Properties {
        &self.properties
    }

    pub fn traits(&self) -> &Properties {
        &self.traits
    }

    pub fn context(&self) -> &Properties {
        &self.context
    }

    /// Per-call destination toggles
    pub fn integrations(&self) -> &Properties {
        &self.integrations
    }
}

/// Mutable builder for [`Payload`]
#[derive(Debug, Clone)]
pub struct PayloadBuilder {
    kind: PayloadType,
    message_id: Option<String>,
    timestamp: Option<DateTime<Utc>>,
    anonymous_id: Option<String>,
    user_id: Option<String>,
    event: Option<String>,
    name: Option<String>,
    category: Option<String>,
    group_id: Option<String>,
    previous_id: Option<String>,
    properties: Properties,
    traits: Properties,
    context: Properties,
    integrations: Properties,
}

impl PayloadBuilder {
    /// Create an empty builder for `kind`
    pub fn new(kind: PayloadType) -> Self {
        Self {
            kind,
            message_id: None,
            timestamp: None,
            anonymous_id: None,
            user_id: None,
            event: None,
            name: None,
            category: None,
            group_id: None,
            previous_id: None,
            properties: Properties::new(),
            traits: Properties::new(),
            context: Properties::new(),
            integrations: Properties::new(),
        }
    }

    pub fn message_id(mut self, message_id: impl Into<String>) -> Self {
        self.message_id = Some(message_id.into());
        self
    }

    pub fn timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn anonymous_id(mut self, anonymous_id: impl Into<String>) -> Self {
        self.anonymous_id = Some(anonymous_id.into());
        self
    }

    pub fn user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn has_user_id(&self) -> bool {
        self.user_id.is_some()
    }

    pub fn event(mut self, event: impl Into<String>) -> Self {
        self.event = Some(event.into());
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn group_id(mut self, group_id: impl Into<String>) -> Self {
        self.group_id = Some(group_id.into());
        self
    }

    pub fn previous_id(mut self, previous_id: impl Into<String>) -> Self {
        self.previous_id = Some(previous_id.into());
        self
    }

    /// Replace all properties
    pub fn properties(mut self, properties: Properties) -> Self {
        self.properties = properties;
        self
    }

    /// Insert a single property
    pub fn property(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// Replace all traits
    pub fn traits(mut self, traits: Properties) -> Self {
        self.traits = traits;
        self
    }

    /// Replace the context map
    pub fn context(mut self, context: Properties) -> Self {
        self.context = context;
        self
    }

    /// Insert a single context entry
    pub fn context_value(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    /// Replace the per-call destination toggles
    pub fn integrations(mut self, integrations: Properties) -> Self {
        self.integrations = integrations;
        self
    }

    /// Validate and freeze into a [`Payload`]
    ///
    /// # Errors
    /// [`PipelineError::Validation`] when the kind's required fields are
    /// missing.
    pub fn build(self) -> Result<Payload, PipelineError> {
        self.validate()?;

        Ok(Payload {
            kind: self.kind,
            message_id: self.message_id.unwrap_or_else(new_message_id),
            timestamp: self.timestamp.unwrap_or_else(Utc::now),
            anonymous_id: self.anonymous_id,
            user_id: self.user_id,
            event: self.event,
            name: self.name,
            category: self.category,
            group_id: self.group_id,
            previous_id: self.previous_id,
            properties: self.properties,
            traits: self.traits,
            context: self.context,
            integrations: self.integrations,
        })
    }

    fn validate(&self) -> Result<(), PipelineError> {
        match self.kind {
            PayloadType::Track => {
                if is_blank(self.event.as_deref()) {
                    return Err(PipelineError::validation(
                        "event must not be null or empty.",
                    ));
                }
            }
            PayloadType::Identify => {
                if is_blank(self.user_id.as_deref()) && self.traits.is_empty() {
                    return Err(PipelineError::validation(
                        "Either userId or some traits must be provided.",
                    ));
                }
            }
            PayloadType::Screen => {
                if is_blank(self.name.as_deref()) && is_blank(self.category.as_deref()) {
                    return Err(PipelineError::validation(
                        "either category or name must be provided.",
                    ));
                }
            }
            PayloadType::Group => {
                if is_blank(self.group_id.as_deref()) {
                    return Err(PipelineError::validation(
                        "groupId must not be null or empty.",
                    ));
                }
            }
            PayloadType::Alias => {
                if is_blank(self.user_id.as_deref()) {
                    return Err(PipelineError::validation(
                        "not allowed to pass null or empty alias",
                    ));
                }
            }
        }
        Ok(())
    }
}

fn is_blank(value: Option<&str>) -> bool {
    value.is_none_or(|v| v.trim().is_empty())
}

/// Random RFC 4122 version 4 identifier
pub fn new_message_id() -> String {
    Uuid::new_v4().to_string()
}
