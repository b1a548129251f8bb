//! # Contracts
//!
//! Frozen interface contracts shared by every pipeline crate: the payload
//! model, per-call options, configuration, the transport trait and the
//! unified error type. Business crates depend on this crate, never the
//! other way around.
//!
//! ## Time Model
//! - Payload timestamps are UTC wall-clock `chrono::DateTime<Utc>` values
//! - Precision on the wire is chosen at encode time (milliseconds or nanoseconds)

mod config;
mod destination_id;
mod error;
mod options;
mod payload;
mod tracking_plan;
mod transport;

pub use config::*;
pub use destination_id::{DestinationId, SEGMENT_DESTINATION};
pub use error::*;
pub use options::{Options, ALL_INTEGRATIONS_KEY};
pub use payload::{new_message_id, Payload, PayloadBuilder, PayloadType, Properties};
pub use tracking_plan::{EventPlan, TrackingPlan};
pub use transport::{LocalTransport, Transport};
