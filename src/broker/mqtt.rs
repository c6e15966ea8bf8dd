//! MQTT broker connection backed by the synchronous `rumqttc` client.

use crate::broker::{BrokerConnection, BrokerEvent};
use crate::error::SinkError;
use crossbeam_channel::{bounded, unbounded, Receiver, RecvTimeoutError, Sender};
use rumqttc::{Client, Connection, Event, MqttOptions, Outgoing, Packet, QoS};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, info, trace, warn};

/// Requests buffered between the client handle and the network driver.
const REQUEST_CAPACITY: usize = 10;

/// How long [`MqttBroker::disconnect`] waits for queued packets to flush.
const DISCONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Connection parameters for [`MqttBroker`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MqttSettings {
    pub host: String,
    pub port: u16,
    pub client_id: String,
    pub keep_alive: Duration,
    /// Wait between attempts until the first connection succeeds
    pub connect_retry_delay: Duration,
}

/// Publishes to an MQTT broker.
///
/// The network side runs on a dedicated driver thread that turns `rumqttc`
/// notifications into [`BrokerEvent`]s. Until the first ConnAck, failed
/// attempts are retried every `connect_retry_delay`. Once connected, any
/// connection error or server disconnect is reported and ends the driver.
pub struct MqttBroker {
    client: Client,
    events: Receiver<BrokerEvent>,
    /// Dropped to interrupt a pending retry wait
    stop: Option<Sender<()>>,
    closing: Arc<AtomicBool>,
    /// Disconnects when the driver thread exits
    finished: Receiver<()>,
    driver: Option<JoinHandle<()>>,
}

impl MqttBroker {
    /// Start connecting in the background.
    ///
    /// Returns as soon as the driver is running; watch [`BrokerConnection::events`]
    /// for [`BrokerEvent::ConnectionUp`].
    pub fn connect(settings: &MqttSettings) -> Result<Self, SinkError> {
        let mut options =
            MqttOptions::new(settings.client_id.as_str(), settings.host.as_str(), settings.port);
        options.set_keep_alive(settings.keep_alive);

        let (client, connection) = Client::new(options, REQUEST_CAPACITY);
        let (events_tx, events_rx) = unbounded();
        let (stop_tx, stop_rx) = bounded(0);
        let closing = Arc::new(AtomicBool::new(false));
        let (finished_tx, finished_rx) = bounded(0);

        info!(
            host = %settings.host,
            port = settings.port,
            client_id = %settings.client_id,
            "Connecting to MQTT broker"
        );

        let driver = Driver {
            events: events_tx,
            stop: stop_rx,
            closing: Arc::clone(&closing),
            retry_delay: settings.connect_retry_delay,
            _finished: finished_tx,
        };
        let handle = thread::Builder::new()
            .name("mqtt-driver".to_string())
            .spawn(move || driver.run(connection))
            .map_err(|e| SinkError::Connection(e.to_string()))?;

        Ok(Self {
            client,
            events: events_rx,
            stop: Some(stop_tx),
            closing,
            finished: finished_rx,
            driver: Some(handle),
        })
    }
}

impl BrokerConnection for MqttBroker {
    fn events(&self) -> &Receiver<BrokerEvent> {
        &self.events
    }

    fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<(), SinkError> {
        self.client
            .publish(topic, QoS::AtLeastOnce, false, payload.to_vec())
            .map_err(|e| SinkError::Publish {
                topic: topic.to_string(),
                message: e.to_string(),
            })
    }

    fn disconnect(&mut self) {
        if self.closing.swap(true, Ordering::SeqCst) {
            return;
        }
        self.stop.take();

        if let Err(e) = self.client.disconnect() {
            debug!(error = %e, "MQTT disconnect request not delivered");
        }

        // Queued publishes go out ahead of the disconnect packet
        match self.finished.recv_timeout(DISCONNECT_TIMEOUT) {
            Err(RecvTimeoutError::Disconnected) => {
                if let Some(handle) = self.driver.take() {
                    if handle.join().is_err() {
                        warn!("MQTT driver panicked");
                    }
                }
                info!("Disconnected from MQTT broker");
            }
            _ => warn!(
                timeout_s = DISCONNECT_TIMEOUT.as_secs(),
                "MQTT driver did not stop in time, abandoning it"
            ),
        }
    }
}

/// Owns the `rumqttc` connection and reports its state.
struct Driver {
    events: Sender<BrokerEvent>,
    stop: Receiver<()>,
    closing: Arc<AtomicBool>,
    retry_delay: Duration,
    _finished: Sender<()>,
}

impl Driver {
    fn run(self, mut connection: Connection) {
        let mut connected = false;

        for notification in connection.iter() {
            if self.closing.load(Ordering::SeqCst) {
                match notification {
                    Ok(Event::Outgoing(Outgoing::Disconnect)) | Err(_) => break,
                    _ => continue,
                }
            }

            match notification {
                Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                    info!(code = ?ack.code, "MQTT connection established");
                    connected = true;
                    if self.events.send(BrokerEvent::ConnectionUp).is_err() {
                        break;
                    }
                }
                Ok(Event::Incoming(Packet::Disconnect)) => {
                    warn!("MQTT broker closed the connection");
                    let _ = self.events.send(BrokerEvent::ServerDisconnect);
                    break;
                }
                Ok(Event::Outgoing(Outgoing::Disconnect)) => break,
                Ok(event) => trace!(?event, "MQTT event"),
                Err(e) if connected => {
                    error!(error = %e, "MQTT connection lost");
                    let _ = self.events.send(BrokerEvent::Error(e.to_string()));
                    break;
                }
                Err(e) => {
                    warn!(
                        error = %e,
                        retry_ms = self.retry_delay.as_millis() as u64,
                        "MQTT connect failed, retrying"
                    );
                    match self.stop.recv_timeout(self.retry_delay) {
                        Err(RecvTimeoutError::Timeout) => continue,
                        _ => break,
                    }
                }
            }
        }

        debug!("MQTT driver stopped");
    }
}
