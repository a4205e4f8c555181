use crate::errors::MqttGatewayError;
use std::fmt::Display;
use std::fmt::Formatter;

/// An MQTT topic
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Topic {
    pub name: String,
}

impl Topic {
    /// Check if the topic name is valid and build a new topic.
    pub fn new(name: &str) -> Result<Topic, MqttGatewayError> {
        let name = String::from(name);
        if rumqttc::valid_topic(&name) {
            Ok(Topic { name })
        } else {
            Err(MqttGatewayError::InvalidTopic { name })
        }
    }

    /// Build a new topic, assuming the name is valid
    pub fn new_unchecked(name: &str) -> Topic {
        let name = String::from(name);
        Topic { name }
    }
}

impl Display for Topic {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.name)
    }
}

/// The per-device topics of the gateway
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum GatewayTopic {
    /// `measures/<device>`: measure messages published by the device
    Measures(String),

    /// `ack/<device>`: acknowledgements of the measure messages
    Ack(String),

    /// `commands/<device>`: commands sent to the device
    Commands(String),
}

impl GatewayTopic {
    pub fn parse(topic: &str) -> Option<GatewayTopic> {
        let (kind, device) = topic.split_once('/')?;
        if device.is_empty() {
            return None;
        }
        let device = device.to_string();
        match kind {
            "measures" => Some(GatewayTopic::Measures(device)),
            "ack" => Some(GatewayTopic::Ack(device)),
            "commands" => Some(GatewayTopic::Commands(device)),
            _ => None,
        }
    }

    pub fn device_alternate_id(&self) -> &str {
        match self {
            GatewayTopic::Measures(device)
            | GatewayTopic::Ack(device)
            | GatewayTopic::Commands(device) => device,
        }
    }

    pub fn to_topic(&self) -> Result<Topic, MqttGatewayError> {
        if self.device_alternate_id().is_empty() {
            return Err(MqttGatewayError::MissingDeviceId);
        }
        Topic::new(&self.to_string())
    }
}

impl Display for GatewayTopic {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            GatewayTopic::Measures(device) => write!(f, "measures/{device}"),
            GatewayTopic::Ack(device) => write!(f, "ack/{device}"),
            GatewayTopic::Commands(device) => write!(f, "commands/{device}"),
        }
    }
}
