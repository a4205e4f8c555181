//! Messages exchanged with the device gateways, over MQTT as well as over REST.
//!
//! All payloads are JSON documents using camel-case field names.
mod ack;
mod commands;
mod measures;
mod message_id;

pub use ack::*;
pub use commands::*;
pub use measures::*;
pub use message_id::*;

/// A payload received from a gateway cannot be decoded
#[derive(thiserror::Error, Debug)]
pub enum GatewayApiError {
    #[error("Invalid acknowledgement batch: {0}")]
    InvalidAckBatch(#[source] serde_json::Error),

    #[error("Invalid command: {0}")]
    InvalidCommand(#[source] serde_json::Error),
}
