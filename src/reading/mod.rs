//! Sensor reading types.
//!
//! Raw readings are loosely typed and consumed once. Everything downstream of
//! normalization works with canonical, typed fields.

pub mod types;
pub mod value;

// Re-export commonly used types
pub use types::{FieldValue, NormalizedReading, OutboundMessage, Reading, SynthesizedReading};
pub use value::ScalarValue;
