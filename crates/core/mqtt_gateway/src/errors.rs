use crate::DuplicateKeyError;
use certificate::IdentityError;
use gateway_api::GatewayApiError;
use std::time::Duration;

/// An error raised by the MQTT gateway client
#[derive(thiserror::Error, Debug)]
pub enum MqttGatewayError {
    #[error("Invalid topic name: {name:?}")]
    InvalidTopic { name: String },

    #[error("A device alternate id must be provided")]
    MissingDeviceId,

    #[error("Invalid keep-alive interval {0:?}: must be zero or at least one second")]
    InvalidKeepAlive(Duration),

    #[error(transparent)]
    Identity(#[from] IdentityError),

    #[error("MQTT client error: {0}")]
    ClientError(#[from] rumqttc::ClientError),

    #[error("MQTT connection error: {0}")]
    ConnectionError(#[from] rumqttc::ConnectionError),

    #[error("The gateway closed the connection")]
    ConnectionClosed,

    #[error("The gateway rejected the subscription to {topic}")]
    SubscriptionRejected { topic: String },

    #[error("The gateway did not accept the connection within {0:?}")]
    ConnectTimeout(Duration),

    #[error("The gateway did not acknowledge the subscription to {topic} within {timeout:?}")]
    SubscriptionTimeout { topic: String, timeout: Duration },

    #[error("The client is already connected")]
    AlreadyConnected,

    #[error("The client is not connected")]
    NotConnected,

    #[error(transparent)]
    DuplicateKey(#[from] DuplicateKeyError),

    #[error("Fail to serialize the measure message: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error(transparent)]
    InvalidPayload(#[from] GatewayApiError),

    #[error("Invalid UTF8 payload: {from}: {input_excerpt}...")]
    InvalidUtf8Payload {
        input_excerpt: String,
        from: std::str::Utf8Error,
    },

    #[error("Invalid simulated measure {key:?}: {reason}")]
    InvalidSimulatedMeasure { key: String, reason: String },
}

impl MqttGatewayError {
    pub fn new_invalid_utf8_payload(bytes: &[u8], from: std::str::Utf8Error) -> MqttGatewayError {
        const EXCERPT_LEN: usize = 80;
        let index = from.valid_up_to();
        let input = std::str::from_utf8(&bytes[..index]).unwrap_or("");

        MqttGatewayError::InvalidUtf8Payload {
            input_excerpt: MqttGatewayError::input_prefix(input, EXCERPT_LEN),
            from,
        }
    }

    fn input_prefix(input: &str, len: usize) -> String {
        input
            .chars()
            .filter(|c| !c.is_whitespace())
            .take(len)
            .collect()
    }
}
