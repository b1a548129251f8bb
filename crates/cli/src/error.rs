//! Error types for CLI operations.

use std::path::PathBuf;
use thiserror::Error;

/// Errors while reading an event file
#[derive(Error, Debug)]
pub enum CliError {
    /// Event file could not be read
    #[error("failed to read event file {path}: {source}")]
    EventFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A line is not a valid event
    #[error("invalid event at line {line}: {message}")]
    EventParse { line: usize, message: String },
}

impl CliError {
    pub fn event_file(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::EventFile {
            path: path.into(),
            source,
        }
    }

    pub fn event_parse(line: usize, message: impl Into<String>) -> Self {
        Self::EventParse {
            line,
            message: message.into(),
        }
    }
}

/// Result type alias for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;
