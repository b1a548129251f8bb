//! Transport implementations
//!
//! Contains LogTransport, FileTransport, NetworkTransport and MemoryTransport.

mod file;
mod log;
mod memory;
mod network;

pub use self::file::{FileTransport, FileTransportConfig};
pub use self::log::LogTransport;
pub use self::memory::{MemoryRecorder, MemoryTransport};
pub use self::network::{NetworkTransport, NetworkTransportConfig};
