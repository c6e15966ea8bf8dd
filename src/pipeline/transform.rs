//! Transform stage: routing, normalization and synthesis.

use crate::counters::SharedCounters;
use crate::error::{PipelineError, Result};
use crate::pipeline::shutdown::Shutdown;
use crate::pipeline::stage::{forward, receive, Forward, Received, Stage};
use crate::reading::{OutboundMessage, Reading};
use crate::weather::{normalize, Synthesizer, TopicBuilder};
use crossbeam_channel::{Receiver, Sender};
use tracing::{debug, error};

/// Turns raw readings into outbound messages.
///
/// Owns the synthesizer and with it every windowed accumulator, so all window
/// state is confined to this stage's thread.
pub struct WeatherStage {
    input: Receiver<Reading>,
    output: Sender<OutboundMessage>,
    topics: TopicBuilder,
    synthesizer: Synthesizer,
    counters: SharedCounters,
}

impl WeatherStage {
    pub fn new(
        input: Receiver<Reading>,
        output: Sender<OutboundMessage>,
        topics: TopicBuilder,
        synthesizer: Synthesizer,
        counters: SharedCounters,
    ) -> Self {
        Self {
            input,
            output,
            topics,
            synthesizer,
            counters,
        }
    }

    /// Build the message for one reading.
    ///
    /// The topic is resolved first so unroutable readings never reach the
    /// accumulators.
    pub fn process(&mut self, reading: &Reading) -> Result<OutboundMessage> {
        let topic = self.topics.build(reading)?;
        let normalized = normalize(reading)?;
        let synthesized = self.synthesizer.synthesize(normalized);
        let payload = synthesized.to_payload()?;

        Ok(OutboundMessage::new(topic, payload))
    }
}

impl Stage for WeatherStage {
    fn name(&self) -> &'static str {
        "transform"
    }

    fn run(mut self: Box<Self>, shutdown: &Shutdown) -> std::result::Result<(), PipelineError> {
        loop {
            let reading = match receive(&self.input, shutdown) {
                Received::Item(reading) => reading,
                Received::Closed | Received::Cancelled => break,
            };

            let message = match self.process(&reading) {
                Ok(message) => message,
                Err(e) => {
                    error!(error = %e, "Dropping reading");
                    self.counters.record_dropped();
                    continue;
                }
            };
            debug!(topic = %message.topic, payload = %message.payload_str(), "Reading processed");

            match forward(&self.output, message, shutdown) {
                Forward::Delivered => {}
                Forward::Closed | Forward::Cancelled => break,
            }
        }

        Ok(())
    }
}
