use crate::RestGatewayError;
use reqwest::header::HeaderMap;
use reqwest::StatusCode;
use serde_json::Value;
use tracing::debug;

/// Reason given when a partial failure comes with no explanation
pub const UNKNOWN_BATCH_FAILURE: &str = "some measures have been rejected for an unknown reason";

/// A successful response of the gateway
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub status: StatusCode,
    pub headers: HeaderMap,

    /// The parsed JSON body, `Value::Null` if empty
    /// and a `Value::String` if not JSON.
    pub body: Value,
}

impl Response {
    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn status_code(&self) -> u16 {
        self.status.as_u16()
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn body(&self) -> &Value {
        &self.body
    }

    pub fn into_body(self) -> Value {
        self.body
    }
}

/// Sort the gateway responses into successes and failures.
///
/// - `207 Multi-Status`: some measures have been rejected, the reasons being aggregated
///   from the `messages` of the response entries.
/// - any other 2xx: success
/// - anything else: failure, explained by the body when possible, by the status line otherwise.
pub fn interpret_response(
    status: StatusCode,
    headers: HeaderMap,
    body: &str,
) -> Result<Response, RestGatewayError> {
    if status == StatusCode::MULTI_STATUS {
        let mut reasons = serde_json::from_str(body)
            .map(|json| body_reasons(&json))
            .unwrap_or_default();
        if reasons.is_empty() {
            reasons.push(UNKNOWN_BATCH_FAILURE.to_string());
        }
        return Err(RestGatewayError::GatewayBatchError { status, reasons });
    }

    if status.is_success() {
        let body = if body.trim().is_empty() {
            Value::Null
        } else {
            serde_json::from_str(body).unwrap_or_else(|_| Value::String(body.to_string()))
        };
        return Ok(Response {
            status,
            headers,
            body,
        });
    }

    debug!(target: "rest_gateway", %status, body, "Request rejected by the gateway");
    let reasons = serde_json::from_str(body)
        .map(|json| body_reasons(&json))
        .unwrap_or_default();
    let reason = if reasons.is_empty() {
        status.to_string()
    } else {
        reasons.join("; ")
    };
    Err(RestGatewayError::GatewayRequestError {
        status: Some(status),
        reason,
    })
}

/// Collect the explanations of a gateway response body.
///
/// The gateway answers either with an array of entries, each with a list of `messages`,
/// or with a single object carrying a `message` or a list of `messages`.
fn body_reasons(body: &Value) -> Vec<String> {
    match body {
        Value::Array(entries) => entries.iter().filter_map(entry_reason).collect(),
        Value::Object(_) => entry_reason(body).into_iter().collect(),
        _ => vec![],
    }
}

fn entry_reason(entry: &Value) -> Option<String> {
    let messages: Vec<&str> = match entry.get("messages") {
        Some(Value::Array(messages)) => messages.iter().filter_map(Value::as_str).collect(),
        _ => entry.get("message").and_then(Value::as_str).into_iter().collect(),
    };
    if messages.is_empty() {
        None
    } else {
        Some(messages.join(" "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use test_case::test_case;

    #[test_case(200, "", Value::Null ; "empty body")]
    #[test_case(202, r#"{"id":"m1"}"#, serde_json::json!({"id": "m1"}) ; "json body")]
    #[test_case(201, "created", Value::from("created") ; "plain text body")]
    fn successful_responses(status: u16, body: &str, expected: Value) {
        let status = StatusCode::from_u16(status).unwrap();

        let response = interpret_response(status, HeaderMap::new(), body).unwrap();

        assert_eq!(response.status, status);
        assert_eq!(response.body, expected);
    }

    #[test]
    fn partial_failures_aggregate_all_reasons() {
        let body = r#"[
            {"code": 202, "messages": []},
            {"code": 400, "messages": ["Invalid value", "for temperature"]},
            {"code": 400, "messages": ["Unknown sensor"]}
        ]"#;

        let err = interpret_response(StatusCode::MULTI_STATUS, HeaderMap::new(), body).unwrap_err();

        assert_matches!(
            &err,
            RestGatewayError::GatewayBatchError { reasons, .. }
                if reasons == &["Invalid value for temperature", "Unknown sensor"]
        );
        assert_eq!(
            err.to_string(),
            "Part of the measures have been rejected by the gateway (207 Multi-Status): \
             Invalid value for temperature; Unknown sensor"
        );
    }

    #[test_case("" ; "empty body")]
    #[test_case("not json" ; "invalid body")]
    #[test_case(r#"[{"code": 400}]"#  ; "no messages")]
    fn partial_failures_without_explanation(body: &str) {
        let err = interpret_response(StatusCode::MULTI_STATUS, HeaderMap::new(), body).unwrap_err();

        assert_matches!(
            err,
            RestGatewayError::GatewayBatchError { reasons, .. } if reasons == [UNKNOWN_BATCH_FAILURE]
        );
    }

    #[test_case(400, r#"[{"messages": ["Unknown capability"]}]"#, "Unknown capability" ; "array of entries")]
    #[test_case(401, r#"{"message": "Unauthorized device"}"#, "Unauthorized device" ; "object with message")]
    #[test_case(404, r#"{"messages": ["No such", "device"]}"#, "No such device" ; "object with messages")]
    #[test_case(500, "<html>oops</html>", "500 Internal Server Error" ; "unparseable body")]
    #[test_case(503, r#"{"code": 503}"#, "503 Service Unavailable" ; "no explanation")]
    fn failures_are_explained(status: u16, body: &str, expected: &str) {
        let status = StatusCode::from_u16(status).unwrap();

        let err = interpret_response(status, HeaderMap::new(), body).unwrap_err();

        assert_matches!(
            &err,
            RestGatewayError::GatewayRequestError { status: Some(s), reason } if *s == status && reason == expected
        );
        assert_eq!(err.status(), Some(status));
    }
}
