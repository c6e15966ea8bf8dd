//! Dynamically-typed scalar values carried by raw sensor readings.
//!
//! The sensor source emits loosely-typed JSON. Each field is captured as a
//! [`ScalarValue`] and converted to the type a consumer wants through one of
//! the explicit coercions below. Every coercion is total: it either yields a
//! value or `None`, never panics.

use serde::{Deserialize, Serialize};

/// A scalar field value as it arrived from the source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ScalarValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
}

impl ScalarValue {
    /// Convert a JSON value, rejecting null, arrays and objects.
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::Bool(b) => Some(ScalarValue::Bool(*b)),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Some(ScalarValue::Int(i))
                } else {
                    n.as_f64().map(ScalarValue::Float)
                }
            }
            serde_json::Value::String(s) => Some(ScalarValue::String(s.clone())),
            serde_json::Value::Null
            | serde_json::Value::Array(_)
            | serde_json::Value::Object(_) => None,
        }
    }

    /// Accepts floats and integers.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            ScalarValue::Float(f) => Some(*f),
            ScalarValue::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    /// Accepts integers and floats, rounding floats to the nearest integer.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            ScalarValue::Int(i) => Some(*i),
            ScalarValue::Float(f) if f.is_finite() => Some(f.round() as i64),
            _ => None,
        }
    }

    /// Accepts booleans, and numbers as "non-zero is true".
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ScalarValue::Bool(b) => Some(*b),
            ScalarValue::Int(i) => Some(*i != 0),
            ScalarValue::Float(f) => Some(*f != 0.0),
            ScalarValue::String(_) => None,
        }
    }

    /// Accepts any scalar, stringified canonically.
    ///
    /// Floats use six fixed decimals so `1.0` becomes `"1.000000"`.
    pub fn as_string(&self) -> String {
        match self {
            ScalarValue::String(s) => s.clone(),
            ScalarValue::Float(f) => format!("{f:.6}"),
            ScalarValue::Int(i) => i.to_string(),
            ScalarValue::Bool(b) => b.to_string(),
        }
    }

    /// Name of the variant, for diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            ScalarValue::Bool(_) => "bool",
            ScalarValue::Int(_) => "int",
            ScalarValue::Float(_) => "float",
            ScalarValue::String(_) => "string",
        }
    }
}

impl From<bool> for ScalarValue {
    fn from(value: bool) -> Self {
        ScalarValue::Bool(value)
    }
}

impl From<i64> for ScalarValue {
    fn from(value: i64) -> Self {
        ScalarValue::Int(value)
    }
}

impl From<i32> for ScalarValue {
    fn from(value: i32) -> Self {
        ScalarValue::Int(value.into())
    }
}

impl From<f64> for ScalarValue {
    fn from(value: f64) -> Self {
        ScalarValue::Float(value)
    }
}

impl From<&str> for ScalarValue {
    fn from(value: &str) -> Self {
        ScalarValue::String(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_as_bool() {
        let cases: Vec<(ScalarValue, Option<bool>)> = vec![
            (true.into(), Some(true)),
            (false.into(), Some(false)),
            (1i64.into(), Some(true)),
            (0i64.into(), Some(false)),
            ((-1i64).into(), Some(true)),
            ((-1.0).into(), Some(true)),
            (0.0.into(), Some(false)),
            ("test".into(), None),
        ];

        for (input, expected) in cases {
            assert_eq!(input.as_bool(), expected, "{input:?}");
        }
    }

    #[test]
    fn test_as_string() {
        let cases: Vec<(ScalarValue, &str)> = vec![
            ("test".into(), "test"),
            (0i64.into(), "0"),
            ((-1i64).into(), "-1"),
            (0.0.into(), "0.000000"),
            (1.0.into(), "1.000000"),
            (true.into(), "true"),
            (false.into(), "false"),
        ];

        for (input, expected) in cases {
            assert_eq!(input.as_string(), expected);
        }
    }

    #[test]
    fn test_as_float() {
        assert_eq!(ScalarValue::Float(0.0).as_float(), Some(0.0));
        assert_eq!(ScalarValue::Int(0).as_float(), Some(0.0));
        assert_eq!(ScalarValue::Int(-3).as_float(), Some(-3.0));
        assert_eq!(ScalarValue::from("test").as_float(), None);
        assert_eq!(ScalarValue::Bool(true).as_float(), None);
    }

    #[test]
    fn test_as_int() {
        assert_eq!(ScalarValue::Int(1).as_int(), Some(1));
        assert_eq!(ScalarValue::Int(-1).as_int(), Some(-1));
        assert_eq!(ScalarValue::Float(-1.0).as_int(), Some(-1));
        assert_eq!(ScalarValue::Float(2.5).as_int(), Some(3));
        assert_eq!(ScalarValue::Float(1.4).as_int(), Some(1));
        assert_eq!(ScalarValue::Bool(false).as_int(), None);
        assert_eq!(ScalarValue::from("test").as_int(), None);
    }

    #[test]
    fn test_from_json() {
        assert_eq!(ScalarValue::from_json(&json!(12)), Some(ScalarValue::Int(12)));
        assert_eq!(ScalarValue::from_json(&json!(12.5)), Some(ScalarValue::Float(12.5)));
        assert_eq!(ScalarValue::from_json(&json!("a")), Some(ScalarValue::from("a")));
        assert_eq!(ScalarValue::from_json(&json!(false)), Some(ScalarValue::Bool(false)));
        assert_eq!(ScalarValue::from_json(&json!(null)), None);
        assert_eq!(ScalarValue::from_json(&json!([1, 2])), None);
        assert_eq!(ScalarValue::from_json(&json!({"a": 1})), None);
    }
}
