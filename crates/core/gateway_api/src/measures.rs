use crate::MessageId;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Map;
use serde_json::Value;

/// A set of measured values, as key-value pairs
pub type Measure = Map<String, Value>;

/// A measure message, as published on `measures/<device>` or posted to the REST gateway.
///
/// ```
/// use gateway_api::MeasureEnvelope;
/// use serde_json::json;
///
/// let measure = json!({"temperature": 21.5}).as_object().cloned().unwrap();
/// let envelope = MeasureEnvelope::new("cap-1", "sensor-1", vec![measure])
///     .with_timestamp(1617208797123);
///
/// assert_eq!(
///     serde_json::to_value(&envelope).unwrap(),
///     json!({
///         "timestamp": 1617208797123_i64,
///         "capabilityAlternateId": "cap-1",
///         "sensorAlternateId": "sensor-1",
///         "measures": [{"temperature": 21.5}]
///     })
/// );
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeasureEnvelope {
    /// UNIX time in milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,

    pub capability_alternate_id: String,

    pub sensor_alternate_id: String,

    /// Set to have the sensor auto-onboarded with this sensor type when unknown
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sensor_type_alternate_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub measure_message_id: Option<MessageId>,

    pub measures: Vec<Measure>,
}

impl MeasureEnvelope {
    pub fn new(
        capability_alternate_id: impl Into<String>,
        sensor_alternate_id: impl Into<String>,
        measures: Vec<Measure>,
    ) -> Self {
        MeasureEnvelope {
            timestamp: None,
            capability_alternate_id: capability_alternate_id.into(),
            sensor_alternate_id: sensor_alternate_id.into(),
            sensor_type_alternate_id: None,
            measure_message_id: None,
            measures,
        }
    }

    pub fn with_timestamp(self, timestamp: i64) -> Self {
        Self {
            timestamp: Some(timestamp),
            ..self
        }
    }

    pub fn with_message_id(self, message_id: MessageId) -> Self {
        Self {
            measure_message_id: Some(message_id),
            ..self
        }
    }

    pub fn with_sensor_type(self, sensor_type_alternate_id: impl Into<String>) -> Self {
        Self {
            sensor_type_alternate_id: Some(sensor_type_alternate_id.into()),
            ..self
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_json_diff::assert_json_eq;
    use serde_json::json;

    fn measure(value: Value) -> Measure {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn mqtt_measure_message() {
        let envelope = MeasureEnvelope::new(
            "cap-1",
            "sensor-1",
            vec![measure(json!({"temperature": 21.5, "humidity": 40}))],
        )
        .with_timestamp(1617208797123)
        .with_message_id(MessageId::from("27c0bd8b"));

        assert_json_eq!(
            serde_json::to_value(&envelope).unwrap(),
            json!({
                "timestamp": 1617208797123_i64,
                "capabilityAlternateId": "cap-1",
                "sensorAlternateId": "sensor-1",
                "measureMessageId": "27c0bd8b",
                "measures": [{"temperature": 21.5, "humidity": 40}]
            })
        );
    }

    #[test]
    fn rest_measure_message_with_auto_onboarding() {
        let envelope = MeasureEnvelope::new("cap-1", "sensor-1", vec![]).with_sensor_type("42");

        assert_json_eq!(
            serde_json::to_value(&envelope).unwrap(),
            json!({
                "capabilityAlternateId": "cap-1",
                "sensorAlternateId": "sensor-1",
                "sensorTypeAlternateId": "42",
                "measures": []
            })
        );
    }

    #[test]
    fn measure_messages_can_be_read_back() {
        let json = r#"{
            "capabilityAlternateId": "cap-1",
            "sensorAlternateId": "sensor-1",
            "measureMessageId": "27c0bd8b",
            "measures": [{"on": true}]
        }"#;

        let envelope: MeasureEnvelope = serde_json::from_str(json).unwrap();

        assert_eq!(envelope.timestamp, None);
        assert_eq!(envelope.measure_message_id, Some(MessageId::from("27c0bd8b")));
        assert_eq!(envelope.measures, vec![measure(json!({"on": true}))]);
    }
}
