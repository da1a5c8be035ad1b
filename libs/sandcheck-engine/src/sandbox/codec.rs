// Values in and out of the sandbox
// Inputs become fresh JS literals for every call; outputs come back as tagged JSON

use crate::error::ExecutionError;
use sandcheck_common::value::Value;
use serde::Deserialize;
use serde_json::Value as Json;

/// What `__sc_invoke` / `__sc_collect` report
#[derive(Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Envelope {
    Ok(Json),
    Threw(String),
    Missing(String),
    Invalid(String),
    Pending(bool),
}

pub fn decode_envelope(text: &str) -> Result<Envelope, ExecutionError> {
    serde_json::from_str(text)
        .map_err(|e| ExecutionError::threw(format!("sandbox produced an unreadable result: {}", e)))
}

pub fn decode_value(json: Json) -> Result<Value, ExecutionError> {
    Value::try_from(json)
        .map_err(|e| ExecutionError::threw(format!("sandbox produced an unreadable value: {}", e)))
}

/// Render a value as a JavaScript expression that builds an equal, unshared value
pub fn to_js_literal(value: &Value) -> String {
    let mut out = String::new();
    write_literal(value, &mut out);
    out
}

fn write_literal(value: &Value, out: &mut String) {
    match value {
        Value::Undefined | Value::Opaque(_) => out.push_str("undefined"),
        Value::Null => out.push_str("null"),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Number(n) => {
            if n.is_nan() {
                out.push_str("NaN");
            } else if n.is_infinite() {
                out.push_str(if *n > 0.0 { "Infinity" } else { "-Infinity" });
            } else if *n == 0.0 && n.is_sign_negative() {
                out.push_str("-0");
            } else {
                out.push_str(&format!("{}", n));
            }
        }
        Value::String(s) => out.push_str(&Json::String(s.clone()).to_string()),
        Value::Array(items) => {
            out.push('[');
            for (idx, item) in items.iter().enumerate() {
                if idx > 0 {
                    out.push(',');
                }
                write_literal(item, out);
            }
            out.push(']');
        }
        Value::Object(map) => {
            out.push('{');
            for (idx, (key, item)) in map.iter().enumerate() {
                if idx > 0 {
                    out.push(',');
                }
                out.push_str(&Json::String(key.clone()).to_string());
                out.push(':');
                write_literal(item, out);
            }
            out.push('}');
        }
    }
}
