/// Typed values exchanged with the sandbox
///
/// **Comparison Rules:**
/// - No coercion between types: `1` vs `"1"`, `true` vs `1`, `null` vs
///   `undefined` are all different
/// - `NaN` equals `NaN` (a fixture may expect it)
/// - `-0` equals `0`
/// - Numbers compare exactly unless a tolerance is supplied
/// - Arrays: same length, element-wise equality
/// - Objects: identical key sets, recursive equality; a key holding
///   `undefined` is still a key
/// - Opaque values (functions, symbols, maps...) never equal anything but an
///   opaque value with the same description
///
/// **Serialized Form:**
/// Plain JSON, plus single-key tags for what JSON cannot express:
/// `{"$undefined": true}`, `{"$number": "NaN" | "Infinity" | "-Infinity" | "-0"}`,
/// `{"$opaque": "<description>"}`. A genuine single-key object whose key is
/// one of the tag names travels wrapped as `{"$object": {...}}`.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value as Json};
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(into = "Json", try_from = "Json")]
pub enum Value {
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Array(Vec<Value>),
    Object(BTreeMap<String, Value>),
    Opaque(String),
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValueError {
    #[error("unknown number tag: {0}")]
    UnknownNumberTag(String),
    #[error("malformed tag `{0}`")]
    MalformedTag(String),
    #[error("number cannot be represented: {0}")]
    UnrepresentableNumber(String),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
            Value::Opaque(_) => "opaque",
        }
    }

    /// Render the value, cutting it at `max_chars` characters
    pub fn preview(&self, max_chars: usize) -> String {
        let full = self.to_string();
        if full.chars().count() <= max_chars {
            return full;
        }
        let mut cut: String = full.chars().take(max_chars).collect();
        cut.push('…');
        cut
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        structurally_equal(self, other, None)
    }
}

/// Where and how two values first differ
#[derive(Debug, Clone, PartialEq)]
pub struct Difference {
    /// Access path from the root, e.g. `[1].name`; empty at the root
    pub path: String,
    pub kind: DifferenceKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DifferenceKind {
    TypeMismatch { expected: &'static str, actual: &'static str },
    ValueMismatch { expected: String, actual: String },
    LengthMismatch { expected: usize, actual: usize },
    MissingKey(String),
    UnexpectedKey(String),
}

impl fmt::Display for Difference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let location = if self.path.is_empty() {
            "at the top level".to_string()
        } else {
            format!("at {}", self.path)
        };
        match &self.kind {
            DifferenceKind::TypeMismatch { expected, actual } => {
                write!(f, "{}: expected a value of type {}, got {}", location, expected, actual)
            }
            DifferenceKind::ValueMismatch { expected, actual } => {
                write!(f, "{}: expected {}, got {}", location, expected, actual)
            }
            DifferenceKind::LengthMismatch { expected, actual } => write!(
                f,
                "{}: expected {} element{}, got {}",
                location,
                expected,
                if *expected == 1 { "" } else { "s" },
                actual
            ),
            DifferenceKind::MissingKey(key) => write!(f, "{}: missing key {:?}", location, key),
            DifferenceKind::UnexpectedKey(key) => write!(f, "{}: unexpected key {:?}", location, key),
        }
    }
}

/// Structural equality with an optional absolute tolerance for numbers
pub fn structurally_equal(expected: &Value, actual: &Value, tolerance: Option<f64>) -> bool {
    first_difference(expected, actual, tolerance).is_none()
}

/// Find the first point (depth-first, keys in sorted order) where `actual`
/// departs from `expected`
pub fn first_difference(expected: &Value, actual: &Value, tolerance: Option<f64>) -> Option<Difference> {
    let mut path = String::new();
    diff_at(expected, actual, tolerance, &mut path)
}

fn diff_at(expected: &Value, actual: &Value, tolerance: Option<f64>, path: &mut String) -> Option<Difference> {
    let here = |kind| Some(Difference { path: path.clone(), kind });

    match (expected, actual) {
        (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => None,
        (Value::Bool(a), Value::Bool(b)) if a == b => None,
        (Value::Number(a), Value::Number(b)) if numbers_equal(*a, *b, tolerance) => None,
        (Value::String(a), Value::String(b)) if a == b => None,
        (Value::Opaque(a), Value::Opaque(b)) if a == b => None,
        (Value::Array(a), Value::Array(b)) => {
            if a.len() != b.len() {
                return here(DifferenceKind::LengthMismatch { expected: a.len(), actual: b.len() });
            }
            for (idx, (x, y)) in a.iter().zip(b.iter()).enumerate() {
                let mark = path.len();
                path.push_str(&format!("[{}]", idx));
                let found = diff_at(x, y, tolerance, path);
                path.truncate(mark);
                if found.is_some() {
                    return found;
                }
            }
            None
        }
        (Value::Object(a), Value::Object(b)) => {
            if let Some(key) = a.keys().find(|k| !b.contains_key(*k)) {
                return here(DifferenceKind::MissingKey(key.clone()));
            }
            if let Some(key) = b.keys().find(|k| !a.contains_key(*k)) {
                return here(DifferenceKind::UnexpectedKey(key.clone()));
            }
            for (key, x) in a {
                let Some(y) = b.get(key) else { continue };
                let mark = path.len();
                push_key(path, key);
                let found = diff_at(x, y, tolerance, path);
                path.truncate(mark);
                if found.is_some() {
                    return found;
                }
            }
            None
        }
        (a, b) if a.type_name() != b.type_name() => here(DifferenceKind::TypeMismatch {
            expected: a.type_name(),
            actual: b.type_name(),
        }),
        (a, b) => here(DifferenceKind::ValueMismatch {
            expected: a.preview(80),
            actual: b.preview(80),
        }),
    }
}

fn push_key(path: &mut String, key: &str) {
    let plain = !key.is_empty()
        && key.chars().enumerate().all(|(i, c)| {
            c == '_' || c == '$' || c.is_ascii_alphabetic() || (i > 0 && c.is_ascii_digit())
        });
    if plain {
        path.push('.');
        path.push_str(key);
    } else {
        path.push_str(&format!("[{}]", Json::String(key.to_string())));
    }
}

fn numbers_equal(a: f64, b: f64, tolerance: Option<f64>) -> bool {
    if a.is_nan() || b.is_nan() {
        return a.is_nan() && b.is_nan();
    }
    if a == b {
        return true;
    }
    match tolerance {
        Some(eps) if a.is_finite() && b.is_finite() => (a - b).abs() <= eps,
        _ => false,
    }
}

fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string()
    } else if n == 0.0 && n.is_sign_negative() {
        "-0".to_string()
    } else if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => f.write_str("undefined"),
            Value::Null => f.write_str("null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Number(n) => f.write_str(&format_number(*n)),
            Value::String(s) => write!(f, "{}", Json::String(s.clone())),
            Value::Array(items) => {
                f.write_str("[")?;
                for (idx, item) in items.iter().enumerate() {
                    if idx > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{}", item)?;
                }
                f.write_str("]")
            }
            Value::Object(map) => {
                f.write_str("{")?;
                for (idx, (key, item)) in map.iter().enumerate() {
                    if idx > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{}:{}", Json::String(key.clone()), item)?;
                }
                f.write_str("}")
            }
            Value::Opaque(desc) => f.write_str(desc),
        }
    }
}

const TAGS: &[&str] = &["$undefined", "$number", "$opaque", "$object"];

fn tag(name: &str, value: Json) -> Json {
    let mut map = Map::new();
    map.insert(name.to_string(), value);
    Json::Object(map)
}

impl From<Value> for Json {
    fn from(value: Value) -> Self {
        match value {
            Value::Undefined => tag("$undefined", Json::Bool(true)),
            Value::Null => Json::Null,
            Value::Bool(b) => Json::Bool(b),
            Value::Number(n) => {
                if n.is_finite() && !(n == 0.0 && n.is_sign_negative()) {
                    if n.fract() == 0.0 && n.abs() < 9_007_199_254_740_992.0 {
                        Json::Number(Number::from(n as i64))
                    } else {
                        Number::from_f64(n).map(Json::Number).unwrap_or(Json::Null)
                    }
                } else {
                    tag("$number", Json::String(format_number(n)))
                }
            }
            Value::String(s) => Json::String(s),
            Value::Array(items) => Json::Array(items.into_iter().map(Json::from).collect()),
            Value::Object(map) => {
                let collides = map.len() == 1 && map.keys().all(|k| TAGS.contains(&k.as_str()));
                let inner = Json::Object(map.into_iter().map(|(k, v)| (k, Json::from(v))).collect());
                if collides {
                    tag("$object", inner)
                } else {
                    inner
                }
            }
            Value::Opaque(desc) => tag("$opaque", Json::String(desc)),
        }
    }
}

impl TryFrom<Json> for Value {
    type Error = ValueError;

    fn try_from(json: Json) -> Result<Self, Self::Error> {
        Ok(match json {
            Json::Null => Value::Null,
            Json::Bool(b) => Value::Bool(b),
            Json::Number(n) => Value::Number(
                n.as_f64().ok_or_else(|| ValueError::UnrepresentableNumber(n.to_string()))?,
            ),
            Json::String(s) => Value::String(s),
            Json::Array(items) => Value::Array(
                items.into_iter().map(Value::try_from).collect::<Result<_, _>>()?,
            ),
            Json::Object(map) => {
                if map.len() == 1 {
                    if let Some((key, inner)) = map.iter().next() {
                        match key.as_str() {
                            "$undefined" => return Ok(Value::Undefined),
                            "$number" => {
                                let text = inner
                                    .as_str()
                                    .ok_or_else(|| ValueError::MalformedTag(key.clone()))?;
                                return parse_number_tag(text).map(Value::Number);
                            }
                            "$opaque" => {
                                let text = inner
                                    .as_str()
                                    .ok_or_else(|| ValueError::MalformedTag(key.clone()))?;
                                return Ok(Value::Opaque(text.to_string()));
                            }
                            "$object" => {
                                let Some(Json::Object(fields)) = map.get(key).cloned() else {
                                    return Err(ValueError::MalformedTag(key.clone()));
                                };
                                return plain_object(fields);
                            }
                            _ => {}
                        }
                    }
                }
                plain_object(map)?
            }
        })
    }
}

fn plain_object(map: Map<String, Json>) -> Result<Value, ValueError> {
    Ok(Value::Object(
        map.into_iter()
            .map(|(k, v)| Value::try_from(v).map(|v| (k, v)))
            .collect::<Result<_, _>>()?,
    ))
}

/// Parse the text of a `$number` tag
pub fn parse_number_tag(text: &str) -> Result<f64, ValueError> {
    match text {
        "NaN" => Ok(f64::NAN),
        "Infinity" => Ok(f64::INFINITY),
        "-Infinity" => Ok(f64::NEG_INFINITY),
        "-0" => Ok(-0.0),
        other => Err(ValueError::UnknownNumberTag(other.to_string())),
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(n as f64)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::Array(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn v(json: Json) -> Value {
        Value::try_from(json).unwrap()
    }

    #[test]
    fn test_nan_equals_nan() {
        assert!(structurally_equal(&Value::Number(f64::NAN), &Value::Number(f64::NAN), None));
        assert!(!structurally_equal(&Value::Number(f64::NAN), &Value::Number(0.0), None));
    }

    #[test]
    fn test_negative_zero_equals_zero() {
        assert!(structurally_equal(&Value::Number(-0.0), &Value::Number(0.0), None));
        assert_eq!(Value::Number(-0.0).to_string(), "-0");
    }

    #[test]
    fn test_no_coercion() {
        assert!(!structurally_equal(&Value::from(1i64), &Value::from("1"), None));
        assert!(!structurally_equal(&Value::from(true), &Value::from(1i64), None));
        assert!(!structurally_equal(&Value::Null, &Value::Undefined, None));
    }

    #[test]
    fn test_tolerance() {
        let a = Value::Number(0.1 + 0.2);
        let b = Value::Number(0.3);
        assert!(!structurally_equal(&b, &a, None));
        assert!(structurally_equal(&b, &a, Some(1e-9)));
        assert!(!structurally_equal(&Value::Number(f64::INFINITY), &Value::Number(1e308), Some(1e300)));
    }

    #[test]
    fn test_array_length_difference() {
        let diff = first_difference(&v(json!([0, 1])), &v(json!([])), None).unwrap();
        assert_eq!(diff.path, "");
        assert_eq!(diff.kind, DifferenceKind::LengthMismatch { expected: 2, actual: 0 });
        assert_eq!(diff.to_string(), "at the top level: expected 2 elements, got 0");
    }

    #[test]
    fn test_nested_difference_path() {
        let expected = v(json!({"items": [{"name": "a"}, {"name": "b"}]}));
        let actual = v(json!({"items": [{"name": "a"}, {"name": "c"}]}));
        let diff = first_difference(&expected, &actual, None).unwrap();
        assert_eq!(diff.path, ".items[1].name");
        assert_eq!(diff.to_string(), "at .items[1].name: expected \"b\", got \"c\"");
    }

    #[test]
    fn test_object_key_sets() {
        let diff = first_difference(&v(json!({"a": 1})), &v(json!({"a": 1, "b": 2})), None).unwrap();
        assert_eq!(diff.kind, DifferenceKind::UnexpectedKey("b".to_string()));

        let with_undefined = Value::Object(BTreeMap::from([("a".to_string(), Value::Undefined)]));
        let empty = Value::Object(BTreeMap::new());
        assert!(!structurally_equal(&with_undefined, &empty, None));
    }

    #[test]
    fn test_display_matches_js_literals() {
        assert_eq!(v(json!([0, 1])).to_string(), "[0,1]");
        assert_eq!(v(json!([])).to_string(), "[]");
        assert_eq!(v(json!({"b": "x", "a": 1.5})).to_string(), "{\"a\":1.5,\"b\":\"x\"}");
        assert_eq!(Value::Undefined.to_string(), "undefined");
        assert_eq!(Value::Number(f64::NEG_INFINITY).to_string(), "-Infinity");
    }

    #[test]
    fn test_tagged_json() {
        let value = v(json!([{"$number": "NaN"}, {"$undefined": true}, {"$number": "-0"}, 3]));
        match &value {
            Value::Array(items) => {
                assert!(matches!(items[0], Value::Number(n) if n.is_nan()));
                assert!(matches!(items[1], Value::Undefined));
                assert!(matches!(items[2], Value::Number(n) if n == 0.0 && n.is_sign_negative()));
            }
            other => panic!("expected array, got {:?}", other),
        }
        let back = Json::from(value);
        assert_eq!(back, json!([{"$number": "NaN"}, {"$undefined": true}, {"$number": "-0"}, 3]));

        assert_eq!(
            Value::try_from(json!({"$number": "nan"})),
            Err(ValueError::UnknownNumberTag("nan".to_string()))
        );
    }

    #[test]
    fn test_object_shaped_like_a_tag() {
        let value = v(json!({"$object": {"$number": "five"}}));
        let expected = Value::Object(BTreeMap::from([("$number".to_string(), Value::from("five"))]));
        assert_eq!(value, expected);
        assert_eq!(Json::from(expected), json!({"$object": {"$number": "five"}}));
    }

    #[test]
    fn test_preview_truncates() {
        let long = Value::String("x".repeat(500));
        let preview = long.preview(10);
        assert_eq!(preview.chars().count(), 11);
        assert!(preview.ends_with('…'));
    }
}
