//! Broker topic construction.

use crate::error::{Result, WeatherError};
use crate::reading::Reading;

/// Default topic prefix for every published reading.
pub const BASE_TOPIC: &str = "sensor/rtl_433";

/// Reading fields appended to the base topic, in order.
const SEGMENT_FIELDS: [&str; 3] = ["model", "channel", "id"];

/// Builds `<base>[/model][/channel][/id]` topics from readings.
#[derive(Debug, Clone)]
pub struct TopicBuilder {
    base: String,
}

impl Default for TopicBuilder {
    fn default() -> Self {
        Self::new(BASE_TOPIC)
    }
}

impl TopicBuilder {
    pub fn new(base: impl Into<String>) -> Self {
        let base = base.into();
        Self {
            base: base.trim_end_matches('/').to_string(),
        }
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    /// Build the topic for `reading`.
    ///
    /// Fails with [`WeatherError::NoIdentifyingData`] if none of the segment
    /// fields are present, since such a reading cannot be routed.
    pub fn build(&self, reading: &Reading) -> Result<String> {
        let mut topic = self.base.clone();
        let mut segments = 0;

        for field in SEGMENT_FIELDS {
            let Ok(value) = reading.string(field) else {
                continue;
            };
            let segment = sanitize_segment(&value);
            if segment.is_empty() {
                continue;
            }
            topic = join_topic(&topic, &segment);
            segments += 1;
        }

        if segments == 0 {
            return Err(WeatherError::NoIdentifyingData);
        }

        Ok(topic)
    }
}

/// Join two topic fragments with a single `/`.
pub fn join_topic(prefix: &str, segment: &str) -> String {
    if prefix.is_empty() {
        return segment.to_string();
    }
    format!("{prefix}/{segment}")
}

/// Strip characters that would change a topic's level structure or act as wildcards.
pub fn sanitize_segment(raw: &str) -> String {
    raw.trim()
        .chars()
        .filter(|c| !matches!(c, '/' | '+' | '#') && !c.is_control())
        .collect()
}
