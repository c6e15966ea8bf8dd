//! Broker connections the publish stage writes to.
//!
//! A [`BrokerConnection`] accepts `(topic, payload)` publishes and reports its
//! connection state on an event channel, so the publish stage can wait on it
//! alongside its input and the shutdown signal.

pub mod console;
pub mod mqtt;

use crate::error::SinkError;
use crossbeam_channel::Receiver;

pub use console::ConsoleBroker;
pub use mqtt::{MqttBroker, MqttSettings};

/// Connection state changes reported by a broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrokerEvent {
    /// The broker accepted the connection; publishing may start.
    ConnectionUp,
    /// An established connection failed.
    Error(String),
    /// The broker closed the connection.
    ServerDisconnect,
}

/// An outbound broker connection owned by the publish stage.
pub trait BrokerConnection: Send {
    /// Connection events, in the order they happened.
    fn events(&self) -> &Receiver<BrokerEvent>;

    /// Hand one message to the broker.
    fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<(), SinkError>;

    /// Close the connection. Called once, when the stage finishes.
    fn disconnect(&mut self);
}
