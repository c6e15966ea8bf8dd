//! Windowed statistics over timestamped samples.
//!
//! An [`Accumulator`] keeps the samples of one derived field inside a time
//! window and recomputes [`Stats`] after every insert. Two window policies are
//! supported:
//!
//! - [`WindowPolicy::Rolling`]: a trailing window of `period` ending at the
//!   latest sample.
//! - [`WindowPolicy::Consecutive`]: fixed epoch buckets of width `period`
//!   aligned to the Unix epoch, cleared when a sample lands in a new bucket.

use crate::core::clock::Clock;
use crate::error::AccumulatorError;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;

/// A single sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimestampedValue {
    pub value: f64,
    pub timestamp: DateTime<Utc>,
}

/// How samples leave the window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowPolicy {
    /// Keep samples newer than `latest - period`.
    Rolling,
    /// Keep samples sharing the latest sample's epoch bucket.
    Consecutive,
}

/// Aggregates over the retained window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Stats {
    pub minimum: f64,
    pub maximum: f64,
    /// Most recent value minus the earliest retained value.
    pub period_delta: f64,
    /// Unweighted mean of the retained values.
    pub average: f64,
}

impl Stats {
    /// Compute statistics over samples in insertion order.
    ///
    /// Returns `None` for an empty window.
    pub fn from_samples<'a, I>(samples: I) -> Option<Self>
    where
        I: IntoIterator<Item = &'a TimestampedValue>,
    {
        let mut iter = samples.into_iter();
        let first = iter.next()?.value;

        let mut minimum = first;
        let mut maximum = first;
        let mut sum = first;
        let mut last = first;
        let mut count = 1usize;

        for sample in iter {
            minimum = minimum.min(sample.value);
            maximum = maximum.max(sample.value);
            sum += sample.value;
            last = sample.value;
            count += 1;
        }

        Some(Self {
            minimum,
            maximum,
            period_delta: last - first,
            average: sum / count as f64,
        })
    }
}

/// Bounded, time-ordered window of samples for one derived field.
pub struct Accumulator {
    samples: VecDeque<TimestampedValue>,
    period: Duration,
    policy: WindowPolicy,
    clock: Arc<dyn Clock>,
}

impl Accumulator {
    /// Create an empty accumulator.
    pub fn new(period: Duration, policy: WindowPolicy, clock: Arc<dyn Clock>) -> Self {
        Self {
            samples: VecDeque::new(),
            period,
            policy,
            clock,
        }
    }

    /// Insert `value` stamped with the current time and return the window's statistics.
    pub fn accumulate(&mut self, value: f64) -> Result<Stats, AccumulatorError> {
        let sample = TimestampedValue {
            value,
            timestamp: self.clock.now(),
        };

        match self.policy {
            WindowPolicy::Rolling => self.insert_rolling(sample),
            WindowPolicy::Consecutive => self.insert_consecutive(sample),
        }

        Stats::from_samples(&self.samples).ok_or(AccumulatorError::EmptyWindow)
    }

    fn insert_rolling(&mut self, sample: TimestampedValue) {
        self.samples.push_back(sample);

        // Timestamps are non-decreasing, so everything stale sits at the front.
        let cutoff = sample.timestamp - self.period;
        while let Some(front) = self.samples.front() {
            if front.timestamp < cutoff {
                self.samples.pop_front();
            } else {
                break;
            }
        }
    }

    fn insert_consecutive(&mut self, sample: TimestampedValue) {
        let bucket = self.epoch(sample.timestamp);

        if let Some(last) = self.samples.back() {
            if self.epoch(last.timestamp) != bucket {
                self.samples = VecDeque::new();
            }
        }

        self.samples.push_back(sample);
    }

    /// Start of the epoch bucket containing `timestamp`, in whole seconds.
    fn epoch(&self, timestamp: DateTime<Utc>) -> i64 {
        let width = self.period.num_seconds().max(1);
        let secs = timestamp.timestamp();
        secs - secs.rem_euclid(width)
    }

    /// Retained samples, oldest first.
    pub fn samples(&self) -> impl Iterator<Item = &TimestampedValue> {
        self.samples.iter()
    }

    /// Number of retained samples.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Check if no samples are retained.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn policy(&self) -> WindowPolicy {
        self.policy
    }
}

impl std::fmt::Debug for Accumulator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Accumulator")
            .field("period", &self.period)
            .field("policy", &self.policy)
            .field("samples", &self.samples.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::clock::ManualClock;

    fn stats(maximum: f64, minimum: f64, average: f64, period_delta: f64) -> Stats {
        Stats {
            minimum,
            maximum,
            period_delta,
            average,
        }
    }

    /// Feed `(value, delay)` pairs through an accumulator, advancing the clock before each insert.
    fn run(policy: WindowPolicy, period: Duration, inputs: &[(f64, i64)]) -> Vec<Stats> {
        let clock = Arc::new(ManualClock::at_unix_epoch());
        let mut acc = Accumulator::new(period, policy, clock.clone());

        inputs
            .iter()
            .map(|&(value, delay)| {
                clock.advance(Duration::seconds(delay));
                acc.accumulate(value).unwrap()
            })
            .collect()
    }

    #[test]
    fn test_rolling_window() {
        let outputs = run(
            WindowPolicy::Rolling,
            Duration::seconds(16),
            &[(1.0, 0), (2.0, 15), (2.0, 15)],
        );

        assert_eq!(outputs[0], stats(1.0, 1.0, 1.0, 0.0));
        assert_eq!(outputs[1], stats(2.0, 1.0, 1.5, 1.0));
        assert_eq!(outputs[2], stats(2.0, 2.0, 2.0, 0.0));
    }

    #[test]
    fn test_consecutive_window_matches_rolling_for_same_inputs() {
        let inputs = [(1.0, 0), (2.0, 15), (2.0, 15)];
        let rolling = run(WindowPolicy::Rolling, Duration::seconds(16), &inputs);
        let consecutive = run(WindowPolicy::Consecutive, Duration::seconds(16), &inputs);

        assert_eq!(rolling, consecutive);
    }

    #[test]
    fn test_first_sample_yields_flat_stats() {
        for policy in [WindowPolicy::Rolling, WindowPolicy::Consecutive] {
            let outputs = run(policy, Duration::minutes(2), &[(7.25, 0)]);
            assert_eq!(outputs[0], stats(7.25, 7.25, 7.25, 0.0));
        }
    }

    #[test]
    fn test_rolling_keeps_sample_exactly_one_period_old() {
        let outputs = run(
            WindowPolicy::Rolling,
            Duration::seconds(10),
            &[(1.0, 0), (3.0, 10)],
        );

        // The first sample sits exactly on the cutoff and is retained.
        assert_eq!(outputs[1], stats(3.0, 1.0, 2.0, 2.0));
    }

    #[test]
    fn test_rolling_retains_only_trailing_period() {
        let clock = Arc::new(ManualClock::at_unix_epoch());
        let period = Duration::seconds(30);
        let mut acc = Accumulator::new(period, WindowPolicy::Rolling, clock.clone());

        for (i, delay) in [0, 7, 3, 11, 19, 2, 40, 1, 5, 29].iter().enumerate() {
            clock.advance(Duration::seconds(*delay));
            acc.accumulate(i as f64).unwrap();

            let latest = clock.now();
            for sample in acc.samples() {
                assert!(sample.timestamp >= latest - period);
                assert!(sample.timestamp <= latest);
            }
        }
    }

    #[test]
    fn test_consecutive_resets_on_new_epoch() {
        let clock = Arc::new(ManualClock::at_unix_epoch());
        let mut acc = Accumulator::new(
            Duration::seconds(60),
            WindowPolicy::Consecutive,
            clock.clone(),
        );

        clock.advance(Duration::seconds(10));
        acc.accumulate(5.0).unwrap();
        clock.advance(Duration::seconds(40));
        let before = acc.accumulate(8.0).unwrap();
        assert_eq!(before.period_delta, 3.0);
        assert_eq!(acc.len(), 2);

        // t = 61 lands in the next bucket
        clock.advance(Duration::seconds(11));
        let after = acc.accumulate(9.0).unwrap();
        assert_eq!(acc.len(), 1);
        assert_eq!(after, stats(9.0, 9.0, 9.0, 0.0));
    }

    #[test]
    fn test_consecutive_samples_share_latest_epoch() {
        let clock = Arc::new(ManualClock::at_unix_epoch());
        let mut acc = Accumulator::new(
            Duration::seconds(16),
            WindowPolicy::Consecutive,
            clock.clone(),
        );

        for delay in [3, 5, 9, 1, 20, 2, 2, 40] {
            clock.advance(Duration::seconds(delay));
            acc.accumulate(delay as f64).unwrap();

            let bucket = clock.now().timestamp() / 16;
            assert!(acc.samples().all(|s| s.timestamp.timestamp() / 16 == bucket));
        }
    }

    #[test]
    fn test_period_delta_follows_time_order() {
        let outputs = run(
            WindowPolicy::Rolling,
            Duration::minutes(5),
            &[(10.0, 0), (4.0, 1), (12.0, 1), (6.0, 1)],
        );

        let last = outputs.last().unwrap();
        assert_eq!(last.period_delta, -4.0);
        assert_eq!(last.minimum, 4.0);
        assert_eq!(last.maximum, 12.0);
        assert_eq!(last.average, 8.0);
    }

    #[test]
    fn test_empty_window_has_no_stats() {
        assert!(Stats::from_samples(&VecDeque::<TimestampedValue>::new()).is_none());
    }
}
