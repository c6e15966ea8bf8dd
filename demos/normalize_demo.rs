//! Demonstration of normalization and synthesis on a few sample readings.
//!
//! This example shows how to:
//! 1. Decode rtl_433 JSON lines into readings
//! 2. Build a topic and normalize raw sensor units
//! 3. Derive windowed statistics with a deterministic clock
//!
//! Run with: cargo run --example normalize_demo

use std::sync::Arc;

use chrono::Duration;
use weather_sensor_bridge::{
    core::{Clock, ManualClock},
    normalize, Reading, SynthesisTable, Synthesizer, TopicBuilder,
};

const SAMPLES: [&str; 4] = [
    r#"{"time":"2024-05-01 10:00:00","model":"SwitchDoc-WR2","id":52,"batterylow":0,"avewindspeed":23,"gustwindspeed":41,"winddirection":270,"cumulativerain":1043,"temperature":1120,"humidity":54,"light":12000,"uv":17}"#,
    r#"{"time":"2024-05-01 10:00:30","model":"SwitchDoc-WR2","id":52,"batterylow":0,"avewindspeed":31,"gustwindspeed":52,"winddirection":280,"cumulativerain":1046,"temperature":2047,"humidity":255,"light":12400,"uv":18}"#,
    r#"{"time":"2024-05-01 10:01:00","model":"SwitchDoc-WR2","id":52,"batterylow":0,"avewindspeed":18,"gustwindspeed":30,"winddirection":265,"cumulativerain":1050,"temperature":1128,"humidity":55,"light":131066,"uv":250}"#,
    r#"{"time":"2024-05-01 10:01:30","model":"SwitchDoc-WR2","batterylow":1}"#,
];

fn main() {
    println!("Weather Sensor Bridge - Normalize Demo");
    println!("======================================");
    println!();

    let clock = Arc::new(ManualClock::at_unix_epoch());
    let shared: Arc<dyn Clock> = clock.clone();
    let topics = TopicBuilder::default();
    let mut synthesizer = Synthesizer::new(&SynthesisTable::default(), shared);

    for line in SAMPLES {
        let reading = match Reading::from_json_line(line) {
            Ok(reading) => reading,
            Err(e) => {
                eprintln!("Skipping line: {e}");
                continue;
            }
        };

        let topic = match topics.build(&reading) {
            Ok(topic) => topic,
            Err(e) => {
                eprintln!("Skipping reading: {e}");
                continue;
            }
        };

        match normalize(&reading) {
            Ok(normalized) => {
                let synthesized = synthesizer.synthesize(normalized);
                let payload = serde_json::to_string_pretty(&synthesized)
                    .unwrap_or_else(|_| "Error".to_string());
                println!("[{}] {}", clock.now().format("%H:%M:%S"), topic);
                println!("{payload}");
                println!();
            }
            Err(e) => eprintln!("Skipping reading: {e}"),
        }

        clock.advance(Duration::seconds(30));
    }
}
