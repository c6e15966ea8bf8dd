//! Weather Sensor Bridge - rtl_433 weather station readings to MQTT.
//!
//! This library turns the JSON lines printed by `rtl_433` for SwitchDoc
//! WeatherRack2 stations into normalized, enriched MQTT messages.
//!
//! # Processing
//!
//! - **Normalization**: raw sensor units become SI units, sentinel codes are dropped
//! - **Synthesis**: dewpoint, solar irradiance and windowed statistics are derived
//! - **Routing**: each reading is published under `<base>/<model>/<channel>/<id>`
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                     Weather Sensor Bridge                        │
//! ├──────────────────────────────────────────────────────────────────┤
//! │  ┌─────────────┐    ┌──────────────────┐    ┌─────────────┐      │
//! │  │   Source    │───▶│    Transform     │───▶│   Publish   │      │
//! │  │  (rtl_433)  │    │ normalize/synth  │    │   (MQTT)    │      │
//! │  └─────────────┘    └──────────────────┘    └─────────────┘      │
//! │         │                    │                     │             │
//! │         │             ┌─────────────┐              │             │
//! │         │             │ Accumulators│              │             │
//! │         │             └─────────────┘              │             │
//! │         └─────────────── Shutdown ─────────────────┘             │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use weather_sensor_bridge::{ConsoleBroker, Pipeline, Shutdown, SourceInput};
//!
//! let input = SourceInput::reader(std::io::BufReader::new(std::io::stdin()));
//! let pipeline = Pipeline::new(input, ConsoleBroker::stdout());
//!
//! pipeline.run(&Shutdown::new()).expect("pipeline failed");
//! ```

pub mod broker;
pub mod config;
pub mod core;
pub mod counters;
pub mod error;
pub mod pipeline;
pub mod reading;
pub mod weather;

// Re-export key types at crate root for convenience
pub use broker::{BrokerConnection, BrokerEvent, ConsoleBroker, MqttBroker, MqttSettings};
pub use config::{Config, LogLevel, SourceCommand};
pub use core::{Accumulator, Clock, ManualClock, Stats, SystemClock, WindowPolicy};
pub use counters::{CounterStats, PipelineCounters, SharedCounters};
pub use error::{AccumulatorError, ConfigError, PipelineError, SinkError, WeatherError};
pub use pipeline::{Pipeline, Shutdown, SourceInput};
pub use reading::{FieldValue, NormalizedReading, OutboundMessage, Reading, ScalarValue};
pub use weather::{normalize, SynthesisTable, Synthesizer, TopicBuilder};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
