//! NetworkTransport - one UDP datagram per payload

use contracts::{PipelineError, Transport};
use serde_json::Value;
use std::collections::HashMap;
use std::net::SocketAddr;
use tokio::net::UdpSocket;
use tracing::{debug, instrument};

/// Configuration for NetworkTransport
#[derive(Debug, Clone)]
pub struct NetworkTransportConfig {
    /// Target address
    pub addr: SocketAddr,
    /// Max datagram size (UDP typically 65507 for IPv4)
    pub max_packet_size: usize,
}

impl NetworkTransportConfig {
    /// Create config from params map
    pub fn from_params(params: &HashMap<String, String>) -> Result<Self, String> {
        let addr_str = params
            .get("addr")
            .ok_or_else(|| "missing 'addr' parameter".to_string())?;

        let addr: SocketAddr = addr_str
            .parse()
            .map_err(|e| format!("invalid address '{}': {}", addr_str, e))?;

        let max_packet_size = match params.get("max_packet_size") {
            Some(s) => s
                .parse()
                .map_err(|e| format!("invalid max_packet_size '{}': {}", s, e))?,
            None => 65000,
        };

        Ok(Self {
            addr,
            max_packet_size,
        })
    }
}

/// Transport that sends payloads over UDP
pub struct NetworkTransport {
    name: String,
    config: NetworkTransportConfig,
    socket: Option<UdpSocket>,
}

impl NetworkTransport {
    pub fn new(name: impl Into<String>, config: NetworkTransportConfig) -> Self {
        Self {
            name: name.into(),
            config,
            socket: None,
        }
    }

    /// Create from params (for factory)
    pub fn from_params(
        name: impl Into<String>,
        params: &HashMap<String, String>,
    ) -> Result<Self, String> {
        Ok(Self::new(name, NetworkTransportConfig::from_params(params)?))
    }

    fn socket(&self, destination: &str) -> Result<&UdpSocket, PipelineError> {
        self.socket
            .as_ref()
            .ok_or_else(|| PipelineError::delivery(destination, "socket not connected"))
    }
}

impl Transport for NetworkTransport {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(name = "network_transport_initialize", skip(self, _settings), fields(target = %self.config.addr))]
    async fn initialize(&mut self, _settings: &Value) -> Result<(), PipelineError> {
        let connect = async {
            // Bind to any available port
            let socket = UdpSocket::bind("0.0.0.0:0").await?;
            socket.connect(&self.config.addr).await?;
            Ok::<_, std::io::Error>(socket)
        };
        let socket = connect
            .await
            .map_err(|e| PipelineError::initialization(&self.name, e.to_string()))?;

        debug!(transport = %self.name, target = %self.config.addr, "NetworkTransport connected");
        self.socket = Some(socket);
        Ok(())
    }

    #[instrument(
        name = "network_transport_deliver",
        skip(self, payload),
        fields(transport = %self.name, bytes = payload.len())
    )]
    async fn deliver(&mut self, destination: &str, payload: &[u8]) -> Result<(), PipelineError> {
        if payload.len() > self.config.max_packet_size {
            return Err(PipelineError::delivery(
                destination,
                format!(
                    "payload of {} bytes exceeds max packet size {}",
                    payload.len(),
                    self.config.max_packet_size
                ),
            ));
        }

        let socket = self.socket(destination)?;
        let sent = socket
            .send(payload)
            .await
            .map_err(|e| PipelineError::delivery(destination, e.to_string()))?;
        debug!(transport = %self.name, bytes = sent, "Sent");
        Ok(())
    }

    async fn flush(&mut self) -> Result<(), PipelineError> {
        // UDP doesn't buffer
        Ok(())
    }

    async fn reset(&mut self) -> Result<(), PipelineError> {
        Ok(())
    }

    #[instrument(name = "network_transport_close", skip(self))]
    async fn close(&mut self) -> Result<(), PipelineError> {
        self.socket = None;
        debug!(transport = %self.name, "NetworkTransport closed");
        Ok(())
    }
}
