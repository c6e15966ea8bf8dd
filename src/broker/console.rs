//! Broker stand-in that prints messages instead of publishing them.

use crate::broker::{BrokerConnection, BrokerEvent};
use crate::error::SinkError;
use crossbeam_channel::{unbounded, Receiver, Sender};
use std::io::Write;

/// Writes one `topic payload` line per message.
///
/// Reports [`BrokerEvent::ConnectionUp`] immediately and never fails on its
/// own; write errors surface as publish errors.
pub struct ConsoleBroker<W: Write + Send> {
    out: W,
    events: Receiver<BrokerEvent>,
    // Held so the event channel never reads as disconnected
    _events_tx: Sender<BrokerEvent>,
}

impl<W: Write + Send> ConsoleBroker<W> {
    pub fn new(out: W) -> Self {
        let (events_tx, events) = unbounded();
        let _ = events_tx.send(BrokerEvent::ConnectionUp);
        Self {
            out,
            events,
            _events_tx: events_tx,
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl ConsoleBroker<std::io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }
}

impl<W: Write + Send> BrokerConnection for ConsoleBroker<W> {
    fn events(&self) -> &Receiver<BrokerEvent> {
        &self.events
    }

    fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<(), SinkError> {
        write_line(&mut self.out, topic, payload).map_err(|e| SinkError::Publish {
            topic: topic.to_string(),
            message: e.to_string(),
        })
    }

    fn disconnect(&mut self) {
        let _ = self.out.flush();
    }
}

fn write_line(out: &mut impl Write, topic: &str, payload: &[u8]) -> std::io::Result<()> {
    out.write_all(topic.as_bytes())?;
    out.write_all(b" ")?;
    out.write_all(payload)?;
    out.write_all(b"\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reports_up_and_writes_lines() {
        let mut broker = ConsoleBroker::new(Vec::new());
        assert_eq!(broker.events().try_recv(), Ok(BrokerEvent::ConnectionUp));

        broker.publish("sensor/rtl_433/a/1", br#"{"hum":40}"#).unwrap();
        broker.publish("sensor/rtl_433/b", b"{}").unwrap();
        broker.disconnect();

        let text = String::from_utf8(broker.into_inner()).unwrap();
        assert_eq!(text, "sensor/rtl_433/a/1 {\"hum\":40}\nsensor/rtl_433/b {}\n");
    }

    #[test]
    fn test_event_channel_stays_open() {
        let broker = ConsoleBroker::new(Vec::new());
        let _ = broker.events().try_recv();
        assert!(matches!(
            broker.events().try_recv(),
            Err(crossbeam_channel::TryRecvError::Empty)
        ));
    }
}
