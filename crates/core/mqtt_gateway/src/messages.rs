use crate::errors::MqttGatewayError;
use crate::topics::Topic;
use rumqttc::Publish;
use rumqttc::QoS;

/// A message exchanged with the gateway: published measures, received acknowledgements and commands.
///
/// Messages are never retained by the gateway.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Message {
    pub topic: Topic,
    pub payload: Vec<u8>,
    pub qos: QoS,
}

impl Message {
    pub fn new(topic: &Topic, payload: impl Into<Vec<u8>>) -> Message {
        Message {
            topic: topic.clone(),
            payload: payload.into(),
            qos: QoS::AtLeastOnce,
        }
    }

    pub fn with_qos(self, qos: QoS) -> Self {
        Self { qos, ..self }
    }

    /// The gateway only sends JSON text
    pub fn payload_str(&self) -> Result<&str, MqttGatewayError> {
        std::str::from_utf8(&self.payload)
            .map_err(|err| MqttGatewayError::new_invalid_utf8_payload(&self.payload, err))
    }
}

impl From<Publish> for Message {
    fn from(incoming: Publish) -> Self {
        Message {
            topic: Topic::new_unchecked(&incoming.topic),
            payload: incoming.payload.to_vec(),
            qos: incoming.qos,
        }
    }
}
