use crate::GatewayApiError;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Map;
use serde_json::Value;

/// A command delivered to a device on `commands/<device>`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Command {
    pub capability_id: String,
    pub sensor_id: String,
    pub command: Map<String, Value>,
}

impl Command {
    pub fn from_json(payload: &str) -> Result<Self, GatewayApiError> {
        serde_json::from_str(payload).map_err(GatewayApiError::InvalidCommand)
    }
}

/// A command sent to a device through the REST gateway
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboundCommand {
    pub capability_alternate_id: String,
    pub sensor_alternate_id: String,
    pub command: Map<String, Value>,
}

impl OutboundCommand {
    pub fn new(
        capability_alternate_id: impl Into<String>,
        sensor_alternate_id: impl Into<String>,
        command: Map<String, Value>,
    ) -> Self {
        OutboundCommand {
            capability_alternate_id: capability_alternate_id.into(),
            sensor_alternate_id: sensor_alternate_id.into(),
            command,
        }
    }
}
