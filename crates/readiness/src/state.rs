use std::fmt;

/// Initialization state of a destination
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DestinationState {
    #[default]
    Unknown,
    Initializing,
    Ready,
    Failed,
}

impl DestinationState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Initializing => "initializing",
            Self::Ready => "ready",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Ready | Self::Failed)
    }

    /// Legal edges; `Unknown` may skip straight to a terminal state
    pub fn can_transition_to(&self, next: DestinationState) -> bool {
        use DestinationState::*;
        matches!(
            (self, next),
            (Unknown, Initializing) | (Unknown | Initializing, Ready) | (Unknown | Initializing, Failed)
        )
    }
}

impl fmt::Display for DestinationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
