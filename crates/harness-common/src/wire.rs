//! JSON wire format between caller, supervisor and execution process.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ProtocolError;
use crate::handler::{Context, Event};

/// The only payload version this harness understands.
pub const PROTOCOL_VERSION: &str = "v1";

/// `error` of a result synthesized after the execution process was killed.
pub const TIMEOUT_MESSAGE: &str = "execution timed out";

/// A validated `{version, event, context}` payload.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InvocationRequest {
    pub event: Event,
    pub context: Context,
}

impl InvocationRequest {
    /// Parse and validate raw payload bytes.
    pub fn parse(bytes: &[u8]) -> Result<Self, ProtocolError> {
        let value: Value = serde_json::from_slice(bytes)?;
        Self::from_value(value)
    }

    /// Validate an already-decoded payload.
    ///
    /// `event` and `context` default to empty objects when omitted or null.
    pub fn from_value(value: Value) -> Result<Self, ProtocolError> {
        let Value::Object(mut payload) = value else {
            return Err(ProtocolError::NotAnObject);
        };

        match payload.get("version") {
            Some(Value::String(v)) if v == PROTOCOL_VERSION => {}
            found => {
                return Err(ProtocolError::UnsupportedVersion {
                    expected: PROTOCOL_VERSION,
                    found: found.map_or_else(|| "nothing".to_string(), Value::to_string),
                });
            }
        }

        let event = take_object(&mut payload, "event")?;
        let context = take_object(&mut payload, "context")?;
        Ok(Self { event, context })
    }
}

fn take_object(
    payload: &mut serde_json::Map<String, Value>,
    field: &'static str,
) -> Result<serde_json::Map<String, Value>, ProtocolError> {
    match payload.remove(field) {
        None | Some(Value::Null) => Ok(serde_json::Map::new()),
        Some(Value::Object(map)) => Ok(map),
        Some(_) => Err(ProtocolError::FieldNotAnObject(field)),
    }
}

/// Outcome of one invocation, in the shape every caller receives.
///
/// `result` is null whenever `error` is set. A handler may also return null
/// on success, in which case `error` is null as well.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExecutionResult {
    #[serde(default)]
    pub result: Value,
    pub logs: String,
    pub error: Option<String>,
    pub duration_ms: u64,
}

impl ExecutionResult {
    pub fn success(result: Value, logs: String, duration_ms: u64) -> Self {
        Self {
            result,
            logs,
            error: None,
            duration_ms,
        }
    }

    pub fn failure(error: impl Into<String>, logs: String, duration_ms: u64) -> Self {
        Self {
            result: Value::Null,
            logs,
            error: Some(error.into()),
            duration_ms,
        }
    }

    /// The result reported when the execution process outlived its budget.
    pub fn timed_out(timeout: Duration) -> Self {
        Self::failure(TIMEOUT_MESSAGE, String::new(), millis(timeout))
    }

    /// Serialize to a single line of JSON (no trailing newline).
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Parse exactly one result; trailing data is rejected.
    pub fn decode(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }
}

/// Truncating milliseconds conversion used for every `duration_ms`.
pub fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parse_full_request() {
        let req = InvocationRequest::parse(
            br#"{"version":"v1","event":{"a":10,"b":2},"context":{"region":"eu"}}"#,
        )
        .unwrap();
        assert_eq!(req.event["a"], 10);
        assert_eq!(req.event["b"], 2);
        assert_eq!(req.context["region"], "eu");
    }

    #[test]
    fn parse_defaults_event_and_context() {
        let req = InvocationRequest::parse(br#"{"version":"v1"}"#).unwrap();
        assert!(req.event.is_empty());
        assert!(req.context.is_empty());

        let req = InvocationRequest::parse(br#"{"version":"v1","event":null}"#).unwrap();
        assert!(req.event.is_empty());
    }

    #[test]
    fn parse_rejects_missing_version() {
        let err = InvocationRequest::parse(br#"{"event":{}}"#).unwrap_err();
        assert!(
            matches!(err, ProtocolError::UnsupportedVersion { ref found, .. } if found == "nothing"),
            "got: {err}"
        );
        assert!(err.to_string().contains("unsupported or missing version"));
    }

    #[test]
    fn parse_rejects_wrong_version() {
        let err = InvocationRequest::parse(br#"{"version":"v2"}"#).unwrap_err();
        assert_eq!(
            err.to_string(),
            r#"unsupported or missing version: expected "v1", got "v2""#
        );

        // Version must be the string, not a look-alike.
        let err = InvocationRequest::parse(br#"{"version":1}"#).unwrap_err();
        assert!(matches!(err, ProtocolError::UnsupportedVersion { .. }));
    }

    #[test]
    fn parse_rejects_invalid_json() {
        let err = InvocationRequest::parse(b"{not json").unwrap_err();
        assert!(matches!(err, ProtocolError::Json(_)), "got: {err}");
    }

    #[test]
    fn parse_rejects_non_object_payload_and_fields() {
        let err = InvocationRequest::parse(b"[1,2]").unwrap_err();
        assert!(matches!(err, ProtocolError::NotAnObject));

        let err = InvocationRequest::parse(br#"{"version":"v1","event":[1]}"#).unwrap_err();
        assert!(matches!(err, ProtocolError::FieldNotAnObject("event")));

        let err = InvocationRequest::parse(br#"{"version":"v1","context":"x"}"#).unwrap_err();
        assert!(matches!(err, ProtocolError::FieldNotAnObject("context")));
    }

    #[test]
    fn encode_is_single_line_with_all_fields() {
        let result = ExecutionResult::success(json!({"k": "multi\nline"}), "a\nb\n".into(), 7);
        let line = result.encode().unwrap();
        assert!(!line.contains('\n'));

        let value: Value = serde_json::from_str(&line).unwrap();
        assert_eq!(
            value,
            json!({"result": {"k": "multi\nline"}, "logs": "a\nb\n", "error": null, "duration_ms": 7})
        );
    }

    #[test]
    fn failure_has_null_result() {
        let result = ExecutionResult::failure("boom", String::new(), 3);
        assert_eq!(result.result, Value::Null);
        assert_eq!(result.error.as_deref(), Some("boom"));
    }

    #[test]
    fn timed_out_uses_budget_as_duration() {
        let result = ExecutionResult::timed_out(Duration::from_secs(10));
        assert_eq!(result.error.as_deref(), Some(TIMEOUT_MESSAGE));
        assert_eq!(result.duration_ms, 10_000);
        assert_eq!(result.result, Value::Null);
        assert!(result.logs.is_empty());
    }

    #[test]
    fn decode_restores_encoded_result() {
        let original = ExecutionResult::success(
            json!({
                "quotient": 5.0,
                "third": 0.1 + 0.2,
                "items": [1, -2, "three", null, true, {"nested": [1.5e300]}],
                "big": u64::MAX,
            }),
            "out\nerr\nINFO: log\n".into(),
            42,
        );
        let decoded = ExecutionResult::decode(&original.encode().unwrap()).unwrap();
        assert_eq!(decoded, original);
    }

    #[test]
    fn decode_keeps_null_success() {
        let original = ExecutionResult::success(Value::Null, String::new(), 0);
        let decoded = ExecutionResult::decode(&original.encode().unwrap()).unwrap();
        assert_eq!(decoded, original);
        assert_eq!(decoded.error, None);
    }

    #[test]
    fn decode_rejects_trailing_and_unknown_data() {
        let line = ExecutionResult::success(json!(1), String::new(), 0)
            .encode()
            .unwrap();
        assert!(ExecutionResult::decode(&format!("{line}\n")).is_ok());
        assert!(ExecutionResult::decode(&format!("{line}\n{line}")).is_err());
        assert!(
            ExecutionResult::decode(r#"{"logs":"","error":null,"duration_ms":0,"extra":1}"#)
                .is_err()
        );
        assert!(ExecutionResult::decode(r#"{"result":1,"error":null}"#).is_err());
    }
}
