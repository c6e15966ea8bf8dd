//! Derived fields computed from normalized readings.
//!
//! Instantaneous fields (dewpoint, solar irradiance, gust direction) are pure
//! functions of a single reading. Windowed fields are routed through
//! [`Accumulator`]s according to a [`SynthesisTable`] fixed at startup.

use crate::core::accumulator::{Accumulator, Stats, WindowPolicy};
use crate::core::clock::Clock;
use crate::reading::{NormalizedReading, SynthesizedReading};
use crate::weather::normalize::keys;
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error};

/// Empirical lux to W/m² conversion factor for sunlight.
pub const LUX_PER_WATT_PER_SQUARE_METRE: f64 = 126.7;

/// Synthesized output keys.
///
/// Windowed outputs get their own keys; the raw `wspd`, `rain_acc` and
/// `wdir` fields they are computed from stay in the reading alongside them.
pub mod derived {
    pub const DEWPOINT: &str = "dewpoint";
    pub const SOLAR: &str = "solar";
    pub const GUST_DIRECTION: &str = "wdir_gust";
    pub const WIND_SPEED_2M: &str = "wspd_2m";
    pub const RAIN_1HR: &str = "rain_1hr";
    pub const RAIN_24HR: &str = "rain_24hr";
    pub const WIND_DIRECTION_2M: &str = "wdir_2m";
}

/// Which aggregate of a window is published.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Statistic {
    Average,
    PeriodDelta,
    Minimum,
    Maximum,
}

impl Statistic {
    pub fn select(self, stats: &Stats) -> f64 {
        match self {
            Statistic::Average => stats.average,
            Statistic::PeriodDelta => stats.period_delta,
            Statistic::Minimum => stats.minimum,
            Statistic::Maximum => stats.maximum,
        }
    }
}

/// One windowed derived field.
#[derive(Debug, Clone, PartialEq)]
pub struct WindowRoute {
    /// Normalized field fed into the window
    pub source: String,
    /// Key the selected statistic is written to
    pub output: String,
    pub period: Duration,
    pub policy: WindowPolicy,
    pub statistic: Statistic,
}

impl WindowRoute {
    pub fn new(
        source: &str,
        output: &str,
        period: Duration,
        policy: WindowPolicy,
        statistic: Statistic,
    ) -> Self {
        Self {
            source: source.to_string(),
            output: output.to_string(),
            period,
            policy,
            statistic,
        }
    }
}

/// Immutable routing table from normalized fields to windowed outputs.
#[derive(Debug, Clone, PartialEq)]
pub struct SynthesisTable {
    routes: Vec<WindowRoute>,
}

impl Default for SynthesisTable {
    fn default() -> Self {
        Self::new(vec![
            WindowRoute::new(
                keys::WIND_SPEED,
                derived::WIND_SPEED_2M,
                Duration::minutes(2),
                WindowPolicy::Rolling,
                Statistic::Average,
            ),
            WindowRoute::new(
                keys::RAIN,
                derived::RAIN_1HR,
                Duration::hours(1),
                WindowPolicy::Rolling,
                Statistic::PeriodDelta,
            ),
            WindowRoute::new(
                keys::RAIN,
                derived::RAIN_24HR,
                Duration::hours(24),
                WindowPolicy::Consecutive,
                Statistic::PeriodDelta,
            ),
            WindowRoute::new(
                keys::WIND_DIRECTION,
                derived::WIND_DIRECTION_2M,
                Duration::minutes(2),
                WindowPolicy::Rolling,
                Statistic::Average,
            ),
        ])
    }
}

impl SynthesisTable {
    pub fn new(routes: Vec<WindowRoute>) -> Self {
        Self { routes }
    }

    /// A table with no windowed outputs.
    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    pub fn routes(&self) -> &[WindowRoute] {
        &self.routes
    }
}

/// Enriches normalized readings with derived fields.
///
/// Owns one accumulator per route; it is meant to live on a single stage
/// worker for the lifetime of the process.
#[derive(Debug)]
pub struct Synthesizer {
    windows: Vec<(WindowRoute, Accumulator)>,
}

impl Synthesizer {
    pub fn new(table: &SynthesisTable, clock: Arc<dyn Clock>) -> Self {
        let windows = table
            .routes()
            .iter()
            .map(|route| {
                let acc = Accumulator::new(route.period, route.policy, Arc::clone(&clock));
                (route.clone(), acc)
            })
            .collect();

        Self { windows }
    }

    /// Add derived fields to `reading` and feed the windowed accumulators.
    pub fn synthesize(&mut self, mut reading: NormalizedReading) -> SynthesizedReading {
        if let (Some(humidity), Some(temperature)) = (
            reading.float(keys::HUMIDITY),
            reading.float(keys::TEMPERATURE),
        ) {
            reading.insert(derived::DEWPOINT, dewpoint(temperature, humidity));
        }

        if let Some(lux) = reading.float(keys::LIGHT) {
            reading.insert(derived::SOLAR, lux / LUX_PER_WATT_PER_SQUARE_METRE);
        }

        if let Some(direction) = reading.float(keys::WIND_DIRECTION) {
            reading.insert(derived::GUST_DIRECTION, direction);
        }

        for (route, acc) in &mut self.windows {
            let Some(value) = reading.float(&route.source) else {
                debug!(field = %route.source, output = %route.output, "field absent, window skipped");
                continue;
            };

            match acc.accumulate(value) {
                Ok(stats) => {
                    let out = route.statistic.select(&stats);
                    debug!("{}: {:.2}", route.output, out);
                    reading.insert(route.output.as_str(), out);
                }
                Err(e) => error!(output = %route.output, error = %e, "window statistics unavailable"),
            }
        }

        reading
    }
}

/// Approximate dewpoint in °C from temperature (°C) and relative humidity (%).
pub fn dewpoint(temperature: f64, humidity: f64) -> f64 {
    temperature - ((100.0 - humidity) / 5.0)
}
