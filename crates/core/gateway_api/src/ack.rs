use crate::GatewayApiError;
use crate::MessageId;
use serde::Deserialize;
use serde::Deserializer;
use serde::Serialize;
use serde_json::Value;

/// Codes acknowledging a measure message as processed
pub const SUCCESS_CODES: [u16; 2] = [200, 202];

/// The outcome of a measure message, as reported on `ack/<device>`.
///
/// The gateway reports these outcomes in batches: a JSON array of entries.
/// A `code` given as a numeric string is accepted; any other non-numeric code
/// is kept as `None`, i.e. as a failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AckEntry {
    pub id: MessageId,

    #[serde(default, deserialize_with = "lenient_code")]
    pub code: Option<u16>,

    #[serde(default, deserialize_with = "lenient_messages")]
    pub messages: Vec<String>,
}

impl AckEntry {
    pub fn is_success(&self) -> bool {
        self.code.is_some_and(|code| SUCCESS_CODES.contains(&code))
    }

    /// The failure reasons, joined in a single line
    pub fn reason(&self) -> String {
        self.messages.join(" ")
    }
}

/// An acknowledgement batch, decoded entry by entry
#[derive(Debug, Default)]
pub struct AckBatch {
    pub entries: Vec<AckEntry>,

    /// The entries that cannot be decoded, with the cause
    pub invalid_entries: Vec<(Value, serde_json::Error)>,
}

/// Decode an acknowledgement batch.
///
/// Only a payload that is not a JSON array is an error:
/// an invalid entry doesn't prevent the other entries of the batch to be processed.
pub fn parse_ack_batch(payload: &str) -> Result<AckBatch, GatewayApiError> {
    let values: Vec<Value> =
        serde_json::from_str(payload).map_err(GatewayApiError::InvalidAckBatch)?;

    let mut batch = AckBatch::default();
    for value in values {
        match AckEntry::deserialize(&value) {
            Ok(entry) => batch.entries.push(entry),
            Err(err) => batch.invalid_entries.push((value, err)),
        }
    }
    Ok(batch)
}

fn lenient_code<'de, D>(deserializer: D) -> Result<Option<u16>, D::Error>
where
    D: Deserializer<'de>,
{
    let code = match Option::<Value>::deserialize(deserializer)? {
        Some(Value::Number(number)) => number.as_u64().and_then(|code| u16::try_from(code).ok()),
        Some(Value::String(text)) => text.trim().parse().ok(),
        _ => None,
    };
    Ok(code)
}

fn lenient_messages<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let messages = match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => vec![],
        Some(Value::Array(items)) => items
            .into_iter()
            .filter(|item| !item.is_null())
            .map(as_text)
            .collect(),
        Some(other) => vec![as_text(other)],
    };
    Ok(messages)
}

fn as_text(value: Value) -> String {
    match value {
        Value::String(text) => text,
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(Some(200), true)]
    #[test_case(Some(202), true)]
    #[test_case(Some(201), false)]
    #[test_case(Some(400), false)]
    #[test_case(Some(500), false)]
    #[test_case(None, false)]
    fn success_codes(code: Option<u16>, success: bool) {
        let entry = AckEntry {
            id: MessageId::from("m1"),
            code,
            messages: vec![],
        };
        assert_eq!(entry.is_success(), success);
    }

    #[test]
    fn parse_a_batch_of_acknowledgements() -> anyhow::Result<()> {
        let payload = r#"[
            {"id": "m1", "code": 202},
            {"id": "m2", "code": 400, "messages": ["Invalid measure", "temperature is not a number"]}
        ]"#;

        let batch = parse_ack_batch(payload)?.entries;

        assert_eq!(batch.len(), 2);
        assert!(batch[0].is_success());
        assert!(!batch[1].is_success());
        assert_eq!(
            batch[1].reason(),
            "Invalid measure temperature is not a number"
        );
        Ok(())
    }

    #[test]
    fn an_ack_batch_is_an_array() {
        let payload = r#"{"id": "m1", "code": 202}"#;

        assert!(matches!(
            parse_ack_batch(payload),
            Err(GatewayApiError::InvalidAckBatch(_))
        ));
    }

    #[test]
    fn lenient_codes_and_messages() -> anyhow::Result<()> {
        let payload = r#"[
            {"id": "m1", "code": "202"},
            {"id": "m2", "code": 500, "messages": null},
            {"id": "m3", "code": "internal", "messages": "Server error"},
            {"id": "m4", "code": 70000, "messages": ["Bad value", 42, null]}
        ]"#;

        let batch = parse_ack_batch(payload)?;

        assert!(batch.invalid_entries.is_empty());
        let entries = batch.entries;
        assert_eq!(entries.len(), 4);
        assert_eq!(entries[0].code, Some(202));
        assert!(entries[0].is_success());
        assert_eq!(entries[1].code, Some(500));
        assert!(entries[1].messages.is_empty());
        assert_eq!(entries[2].code, None);
        assert_eq!(entries[2].reason(), "Server error");
        assert_eq!(entries[3].code, None);
        assert_eq!(entries[3].reason(), "Bad value 42");
        Ok(())
    }

    #[test]
    fn invalid_entries_are_set_apart() -> anyhow::Result<()> {
        let payload = r#"[
            {"id": "m1", "code": 200},
            {"code": 500},
            "m2",
            {"id": "m3", "code": 400, "messages": ["Invalid measure"]}
        ]"#;

        let batch = parse_ack_batch(payload)?;

        let ids: Vec<_> = batch.entries.iter().map(|entry| entry.id.as_str()).collect();
        assert_eq!(ids, vec!["m1", "m3"]);
        assert_eq!(batch.invalid_entries.len(), 2);
        assert_eq!(batch.invalid_entries[0].0, serde_json::json!({"code": 500}));
        Ok(())
    }
}
