//! FileTransport - appends payloads to a JSON lines file

use contracts::{PipelineError, Transport};
use serde_json::Value;
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use tracing::{debug, error, instrument};

/// Configuration for FileTransport
#[derive(Debug, Clone)]
pub struct FileTransportConfig {
    /// Output file, one JSON object per line
    pub path: PathBuf,
}

impl FileTransportConfig {
    /// Create config from params map
    pub fn from_params(params: &HashMap<String, String>) -> Result<Self, String> {
        let path = params
            .get("path")
            .filter(|p| !p.trim().is_empty())
            .ok_or_else(|| "missing 'path' parameter".to_string())?;

        Ok(Self {
            path: PathBuf::from(path),
        })
    }
}

/// Transport that appends each payload as one line to a file
pub struct FileTransport {
    name: String,
    config: FileTransportConfig,
    writer: Option<BufWriter<File>>,
}

impl FileTransport {
    pub fn new(name: impl Into<String>, config: FileTransportConfig) -> Self {
        Self {
            name: name.into(),
            config,
            writer: None,
        }
    }

    /// Create from params map (for factory)
    pub fn from_params(
        name: impl Into<String>,
        params: &HashMap<String, String>,
    ) -> Result<Self, String> {
        Ok(Self::new(name, FileTransportConfig::from_params(params)?))
    }

    fn open(&mut self) -> std::io::Result<()> {
        if let Some(parent) = self.config.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.config.path)?;
        self.writer = Some(BufWriter::new(file));
        Ok(())
    }

    fn write_line(&mut self, payload: &[u8]) -> std::io::Result<()> {
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| std::io::Error::other("file not open"))?;
        writer.write_all(payload)?;
        writer.write_all(b"\n")
    }
}

impl Transport for FileTransport {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(name = "file_transport_initialize", skip(self, _settings), fields(path = ?self.config.path))]
    async fn initialize(&mut self, _settings: &Value) -> Result<(), PipelineError> {
        self.open()
            .map_err(|e| PipelineError::initialization(&self.name, e.to_string()))
    }

    #[instrument(
        name = "file_transport_deliver",
        skip(self, payload),
        fields(transport = %self.name)
    )]
    async fn deliver(&mut self, destination: &str, payload: &[u8]) -> Result<(), PipelineError> {
        self.write_line(payload).map_err(|e| {
            error!(transport = %self.name, error = %e, "Write failed");
            PipelineError::delivery(destination, e.to_string())
        })
    }

    #[instrument(name = "file_transport_flush", skip(self))]
    async fn flush(&mut self) -> Result<(), PipelineError> {
        if let Some(writer) = self.writer.as_mut() {
            writer.flush()?;
        }
        Ok(())
    }

    async fn reset(&mut self) -> Result<(), PipelineError> {
        Ok(())
    }

    #[instrument(name = "file_transport_close", skip(self))]
    async fn close(&mut self) -> Result<(), PipelineError> {
        if let Some(mut writer) = self.writer.take() {
            writer.flush()?;
        }
        debug!(transport = %self.name, "FileTransport closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_file_transport_appends_lines() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out").join("events.jsonl");
        let mut transport = FileTransport::new(
            "test_file",
            FileTransportConfig { path: path.clone() },
        );

        transport.initialize(&Value::Null).await.unwrap();
        transport.deliver("A", br#"{"event":"one"}"#).await.unwrap();
        transport.deliver("A", br#"{"event":"two"}"#).await.unwrap();
        transport.close().await.unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<_> = content.lines().collect();
        assert_eq!(lines, vec![r#"{"event":"one"}"#, r#"{"event":"two"}"#]);
    }

    #[tokio::test]
    async fn test_deliver_before_initialize_fails() {
        let dir = tempdir().unwrap();
        let mut transport = FileTransport::new(
            "test_file",
            FileTransportConfig {
                path: dir.path().join("events.jsonl"),
            },
        );
        let err = transport.deliver("A", b"{}").await.unwrap_err();
        assert!(matches!(err, PipelineError::Delivery { .. }));
    }

    #[test]
    fn test_config_requires_path() {
        assert!(FileTransportConfig::from_params(&HashMap::new()).is_err());

        let params = HashMap::from([("path".to_string(), "/tmp/events.jsonl".to_string())]);
        let config = FileTransportConfig::from_params(&params).unwrap();
        assert_eq!(config.path, PathBuf::from("/tmp/events.jsonl"));
    }
}
