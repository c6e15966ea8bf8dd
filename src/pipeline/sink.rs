//! Publish stage: hands outbound messages to the broker.

use crate::broker::{BrokerConnection, BrokerEvent};
use crate::counters::SharedCounters;
use crate::error::{PipelineError, SinkError};
use crate::pipeline::shutdown::Shutdown;
use crate::pipeline::stage::Stage;
use crate::reading::OutboundMessage;
use crossbeam_channel::{select, Receiver};
use tracing::{debug, info};

/// Last stage of the pipeline.
///
/// Waits for the broker to come up before taking any input, so upstream
/// stages stay blocked on their conduits until then. Any broker failure ends
/// the stage with an error, which the supervisor turns into a full shutdown.
pub struct PublishStage<B> {
    input: Receiver<OutboundMessage>,
    broker: B,
    counters: SharedCounters,
}

impl<B: BrokerConnection> PublishStage<B> {
    pub fn new(input: Receiver<OutboundMessage>, broker: B, counters: SharedCounters) -> Self {
        Self {
            input,
            broker,
            counters,
        }
    }

    fn publish_all(&mut self, shutdown: &Shutdown) -> Result<(), SinkError> {
        let events = self.broker.events().clone();

        if !await_connection(&events, shutdown)? {
            return Ok(());
        }
        info!("Broker connected, publishing");

        loop {
            if shutdown.is_triggered() {
                return Ok(());
            }

            select! {
                recv(events) -> event => {
                    if shutdown.is_triggered() {
                        return Ok(());
                    }
                    match event {
                        Ok(BrokerEvent::ConnectionUp) => debug!("Broker connection re-established"),
                        Ok(other) => return Err(connection_failure(other)),
                        Err(_) => return Err(SinkError::Connection("broker event channel closed".to_string())),
                    }
                }
                recv(self.input) -> msg => {
                    if shutdown.is_triggered() {
                        return Ok(());
                    }
                    let Ok(message) = msg else {
                        info!("Input closed, publish stage draining");
                        return Ok(());
                    };
                    self.broker.publish(&message.topic, &message.payload)?;
                    self.counters.record_published();
                    debug!(topic = %message.topic, "Published");
                }
                recv(shutdown.signal()) -> _ => return Ok(()),
            }
        }
    }
}

impl<B: BrokerConnection> Stage for PublishStage<B> {
    fn name(&self) -> &'static str {
        "publish"
    }

    fn run(mut self: Box<Self>, shutdown: &Shutdown) -> Result<(), PipelineError> {
        let result = self.publish_all(shutdown);
        self.broker.disconnect();
        result.map_err(PipelineError::from)
    }
}

/// Wait for the broker to accept the connection.
///
/// Returns `Ok(false)` if shutdown came first.
fn await_connection(events: &Receiver<BrokerEvent>, shutdown: &Shutdown) -> Result<bool, SinkError> {
    if shutdown.is_triggered() {
        return Ok(false);
    }

    select! {
        recv(events) -> event => {
            if shutdown.is_triggered() {
                return Ok(false);
            }
            match event {
                Ok(BrokerEvent::ConnectionUp) => Ok(true),
                Ok(other) => Err(connection_failure(other)),
                Err(_) => Err(SinkError::Connection("broker event channel closed".to_string())),
            }
        }
        recv(shutdown.signal()) -> _ => Ok(false),
    }
}

fn connection_failure(event: BrokerEvent) -> SinkError {
    match event {
        BrokerEvent::Error(message) => SinkError::Connection(message),
        BrokerEvent::ServerDisconnect | BrokerEvent::ConnectionUp => SinkError::Disconnected,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::ConsoleBroker;
    use crate::counters::PipelineCounters;
    use crate::pipeline::stage::conduit;
    use crossbeam_channel::{unbounded, Sender};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    /// Broker whose events are driven by the test.
    struct ScriptedBroker {
        events: Receiver<BrokerEvent>,
        published: Arc<Mutex<Vec<String>>>,
        disconnected: Arc<Mutex<bool>>,
    }

    impl BrokerConnection for ScriptedBroker {
        fn events(&self) -> &Receiver<BrokerEvent> {
            &self.events
        }

        fn publish(&mut self, topic: &str, _payload: &[u8]) -> Result<(), SinkError> {
            self.published.lock().unwrap().push(topic.to_string());
            Ok(())
        }

        fn disconnect(&mut self) {
            *self.disconnected.lock().unwrap() = true;
        }
    }

    fn scripted() -> (ScriptedBroker, Sender<BrokerEvent>, Arc<Mutex<Vec<String>>>, Arc<Mutex<bool>>) {
        let (tx, rx) = unbounded();
        let published = Arc::new(Mutex::new(Vec::new()));
        let disconnected = Arc::new(Mutex::new(false));
        let broker = ScriptedBroker {
            events: rx,
            published: Arc::clone(&published),
            disconnected: Arc::clone(&disconnected),
        };
        (broker, tx, published, disconnected)
    }

    #[test]
    fn test_publishes_in_order_until_input_closes() {
        let (messages_tx, messages_rx) = conduit();
        let counters = Arc::new(PipelineCounters::new());
        let stage = PublishStage::new(
            messages_rx,
            ConsoleBroker::new(Vec::new()),
            Arc::clone(&counters),
        );

        let shutdown = Shutdown::new();
        let handle = std::thread::spawn(move || Box::new(stage).run(&shutdown));
        for topic in ["a", "b", "c"] {
            messages_tx
                .send(OutboundMessage::new(topic, b"{}".to_vec()))
                .unwrap();
        }
        drop(messages_tx);

        handle.join().unwrap().unwrap();
        assert_eq!(counters.stats().messages_published, 3);
    }

    #[test]
    fn test_connection_error_is_fatal() {
        let (broker, events, published, disconnected) = scripted();
        let (_messages_tx, messages_rx) = conduit();
        let stage = PublishStage::new(messages_rx, broker, Arc::new(PipelineCounters::new()));

        events.send(BrokerEvent::ConnectionUp).unwrap();
        events.send(BrokerEvent::Error("connection reset".to_string())).unwrap();

        let result = Box::new(stage).run(&Shutdown::new());
        assert!(matches!(
            result,
            Err(PipelineError::Sink(SinkError::Connection(ref m))) if m == "connection reset"
        ));
        assert!(published.lock().unwrap().is_empty());
        assert!(*disconnected.lock().unwrap());
    }

    #[test]
    fn test_disconnect_before_connect_is_fatal() {
        let (broker, events, _, _) = scripted();
        let (_messages_tx, messages_rx) = conduit();
        let stage = PublishStage::new(messages_rx, broker, Arc::new(PipelineCounters::new()));

        events.send(BrokerEvent::ServerDisconnect).unwrap();

        let result = Box::new(stage).run(&Shutdown::new());
        assert!(matches!(
            result,
            Err(PipelineError::Sink(SinkError::Disconnected))
        ));
    }

    #[test]
    fn test_shutdown_while_connecting() {
        let (broker, _events, _, disconnected) = scripted();
        let (_messages_tx, messages_rx) = conduit();
        let stage = PublishStage::new(messages_rx, broker, Arc::new(PipelineCounters::new()));

        let shutdown = Shutdown::new();
        let trigger = shutdown.clone();
        let waker = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            trigger.trigger();
        });

        assert!(Box::new(stage).run(&shutdown).is_ok());
        assert!(*disconnected.lock().unwrap());
        waker.join().unwrap();
    }
}
