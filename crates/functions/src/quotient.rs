//! The reference handler: divide two numbers from the event.

use anyhow::{Context as _, bail};
use harness_common::{Context, Event};
use serde_json::{Value, json};
use tracing::{error, info};

/// Divide `event.a` by `event.b`, writing to every output channel on the way.
pub(crate) fn handler(event: &Event, _context: &Context) -> anyhow::Result<Value> {
    println!("Hello from print");
    info!("Hello from logging");
    error!("Hello from error logging");

    let a = number(event, "a")?;
    let b = number(event, "b")?;
    if b == 0.0 {
        bail!("division by zero: cannot divide {a} by {b}");
    }
    Ok(json!({ "quotient": a / b }))
}

fn number(event: &Event, key: &str) -> anyhow::Result<f64> {
    event
        .get(key)
        .and_then(Value::as_f64)
        .with_context(|| format!("event field `{key}` must be a number"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(value: Value) -> Event {
        match value {
            Value::Object(map) => map,
            other => panic!("not an object: {other}"),
        }
    }

    #[test]
    fn divides() {
        let result = handler(&event(json!({"a": 10, "b": 2})), &Context::new()).unwrap();
        assert_eq!(result, json!({"quotient": 5.0}));
    }

    #[test]
    fn division_by_zero_fails() {
        let err = handler(&event(json!({"a": 10, "b": 0})), &Context::new()).unwrap_err();
        assert!(err.to_string().contains("division by zero"), "got: {err}");
    }

    #[test]
    fn missing_operand_fails() {
        let err = handler(&event(json!({"a": 1})), &Context::new()).unwrap_err();
        assert_eq!(err.to_string(), "event field `b` must be a number");
    }
}
