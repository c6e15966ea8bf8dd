//! Reading types flowing through the pipeline.
//!
//! A raw [`Reading`] is decoded from one line of sensor output. Normalization
//! turns it into a [`NormalizedReading`] keyed by canonical field names, which
//! synthesis enriches before it is wrapped in an [`OutboundMessage`].

use crate::error::{Result, WeatherError};
use crate::reading::value::ScalarValue;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A raw sensor reading: field name to scalar value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Reading {
    fields: BTreeMap<String, ScalarValue>,
}

impl Reading {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode one line of sensor output.
    ///
    /// The line must be a JSON object. Members that are not scalars (null,
    /// arrays, nested objects) are dropped.
    pub fn from_json_line(line: &str) -> Result<Self> {
        let value: serde_json::Value = serde_json::from_str(line)?;
        let object = match value {
            serde_json::Value::Object(object) => object,
            _ => return Err(WeatherError::NotAnObject),
        };

        let fields = object
            .iter()
            .filter_map(|(key, value)| ScalarValue::from_json(value).map(|v| (key.clone(), v)))
            .collect();

        Ok(Self { fields })
    }

    /// Builder-style insert, handy for constructing readings by hand.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<ScalarValue>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<ScalarValue>) {
        self.fields.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&ScalarValue> {
        self.fields.get(key)
    }

    /// Extract a float (accepts float or integer).
    pub fn float(&self, key: &str) -> Result<f64> {
        self.extract(key, "float", ScalarValue::as_float)
    }

    /// Extract an integer (accepts integer or float, rounded).
    pub fn int(&self, key: &str) -> Result<i64> {
        self.extract(key, "int", ScalarValue::as_int)
    }

    /// Extract a boolean (accepts bool or non-zero number).
    pub fn bool(&self, key: &str) -> Result<bool> {
        self.extract(key, "bool", ScalarValue::as_bool)
    }

    /// Extract a string (accepts any scalar).
    pub fn string(&self, key: &str) -> Result<String> {
        self.extract(key, "string", |v| Some(v.as_string()))
    }

    fn extract<T>(
        &self,
        key: &str,
        expected: &'static str,
        coerce: impl Fn(&ScalarValue) -> Option<T>,
    ) -> Result<T> {
        self.fields
            .get(key)
            .and_then(coerce)
            .ok_or_else(|| WeatherError::Extraction {
                field: key.to_string(),
                expected,
            })
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// A normalized or synthesized field value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Bool(bool),
    Int(i64),
    Float(f64),
}

impl FieldValue {
    /// Numeric view of the value; booleans have none.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            FieldValue::Int(i) => Some(*i as f64),
            FieldValue::Float(f) => Some(*f),
            FieldValue::Bool(_) => None,
        }
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Bool(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Int(value)
    }
}

impl From<i32> for FieldValue {
    fn from(value: i32) -> Self {
        FieldValue::Int(value.into())
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        FieldValue::Float(value)
    }
}

/// Canonical field name to converted value.
///
/// Keys are kept sorted so the serialized payload is stable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NormalizedReading {
    fields: BTreeMap<String, FieldValue>,
}

/// A normalized reading after derived fields have been added.
pub type SynthesizedReading = NormalizedReading;

impl NormalizedReading {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<FieldValue>) {
        self.fields.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<FieldValue> {
        self.fields.get(key).copied()
    }

    /// Numeric value of `key`, if present and numeric.
    pub fn float(&self, key: &str) -> Option<f64> {
        self.get(key).and_then(|v| v.as_float())
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Serialize as a JSON object payload.
    pub fn to_payload(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| WeatherError::Encode(e.to_string()))
    }
}

/// A topic-tagged payload ready for the broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    pub topic: String,
    pub payload: Vec<u8>,
}

impl OutboundMessage {
    pub fn new(topic: impl Into<String>, payload: Vec<u8>) -> Self {
        Self {
            topic: topic.into(),
            payload,
        }
    }

    /// Payload as text, for logging.
    pub fn payload_str(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.payload)
    }
}
