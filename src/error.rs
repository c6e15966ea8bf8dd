//! Error types for the weather sensor bridge.
//!
//! Per-item errors (`WeatherError`, `AccumulatorError`) are local to a stage:
//! the offending line, field or reading is logged and dropped. `SinkError` is
//! the one class that escalates to the supervisor and stops the pipeline.

use thiserror::Error;

/// Errors raised while decoding, normalizing or routing a single reading.
#[derive(Error, Debug)]
pub enum WeatherError {
    /// The input line was not valid JSON.
    #[error("malformed sensor line: {0}")]
    Decode(#[from] serde_json::Error),

    /// The input line was valid JSON but not an object.
    #[error("sensor line is not a JSON object")]
    NotAnObject,

    /// A field was absent or carried no accepted representation.
    #[error("field `{field}` is missing or not a {expected}")]
    Extraction {
        field: String,
        expected: &'static str,
    },

    /// Every field of the reading was unrecognized or filtered.
    #[error("reading has no normalizable data")]
    NoNormalizableData,

    /// None of `model`, `channel` or `id` were present.
    #[error("reading has no identifying data to build a topic")]
    NoIdentifyingData,

    /// The synthesized reading could not be serialized.
    #[error("failed to encode payload: {0}")]
    Encode(String),
}

/// Errors raised by a windowed accumulator.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccumulatorError {
    /// Statistics were requested from a window with no samples.
    #[error("accumulator window is empty")]
    EmptyWindow,
}

/// Errors raised by the broker connection. All of them are fatal to the pipeline.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SinkError {
    /// The broker connection failed.
    #[error("broker connection error: {0}")]
    Connection(String),

    /// A publish request could not be handed to the broker client.
    #[error("publish to `{topic}` failed: {message}")]
    Publish { topic: String, message: String },

    /// The broker closed the connection.
    #[error("broker disconnected")]
    Disconnected,
}

/// Configuration errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("environment variable {0} must not be blank")]
    Blank(&'static str),

    #[error("{0} is not set")]
    Missing(&'static str),

    #[error("environment variable {key} must be an integer, got `{value}`")]
    InvalidInteger { key: &'static str, value: String },

    #[error("{key} must be at least {min}, got {value}")]
    OutOfRange {
        key: &'static str,
        value: u64,
        min: u64,
    },

    #[error("unknown log level `{0}`")]
    InvalidLevel(String),

    #[error("broker URL `{url}` is invalid: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Serialize error: {0}")]
    Serialize(String),
}

/// Errors that end a pipeline run.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// The sink lost its broker connection.
    #[error(transparent)]
    Sink(#[from] SinkError),

    /// The sensor source command could not be started.
    #[error("failed to start `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// A stage thread could not be created.
    #[error("failed to spawn stage thread: {0}")]
    Thread(#[from] std::io::Error),

    /// A stage thread panicked instead of reporting.
    #[error("stage `{0}` panicked")]
    StagePanicked(&'static str),
}

/// Result alias for per-reading operations.
pub type Result<T> = std::result::Result<T, WeatherError>;
