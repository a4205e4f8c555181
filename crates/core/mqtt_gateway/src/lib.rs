//! An MQTT client for the device gateway of the IoT services.
//!
//! A [GatewayClient] publishes measures on `measures/<device>`,
//! tracks each measure message until acknowledged on `ack/<device>`,
//! reports the rejected messages to an error handler
//! and forwards the commands received on `commands/<device>` to a command handler.
#![forbid(unsafe_code)]

mod client;
mod config;
mod correlator;
mod dispatch;
mod errors;
mod messages;
mod simulator;
mod topics;

pub use client::*;
pub use config::*;
pub use correlator::*;
pub use dispatch::*;
pub use errors::*;
pub use messages::*;
pub use simulator::*;
pub use topics::*;

pub use gateway_api::Command;
pub use gateway_api::Measure;
pub use gateway_api::MeasureEnvelope;
pub use gateway_api::MessageId;
pub use rumqttc::QoS;
