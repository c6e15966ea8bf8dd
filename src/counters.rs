//! Per-run pipeline statistics.
//!
//! Stages record what happened to each item as it passes through; nothing
//! about reading contents is retained.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Atomic tallies shared by every stage of one pipeline run.
#[derive(Debug)]
pub struct PipelineCounters {
    /// Lines received from the source
    lines_read: AtomicU64,
    /// Lines that were not valid reading objects
    decode_errors: AtomicU64,
    /// Readings dropped by normalization or topic routing
    readings_dropped: AtomicU64,
    /// Messages accepted by the broker client
    messages_published: AtomicU64,
    started_at: DateTime<Utc>,
}

impl PipelineCounters {
    pub fn new() -> Self {
        Self {
            lines_read: AtomicU64::new(0),
            decode_errors: AtomicU64::new(0),
            readings_dropped: AtomicU64::new(0),
            messages_published: AtomicU64::new(0),
            started_at: Utc::now(),
        }
    }

    pub fn record_line(&self) {
        self.lines_read.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_decode_error(&self) {
        self.decode_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dropped(&self) {
        self.readings_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_published(&self) {
        self.messages_published.fetch_add(1, Ordering::Relaxed);
    }

    /// Get the current statistics.
    pub fn stats(&self) -> CounterStats {
        CounterStats {
            lines_read: self.lines_read.load(Ordering::Relaxed),
            decode_errors: self.decode_errors.load(Ordering::Relaxed),
            readings_dropped: self.readings_dropped.load(Ordering::Relaxed),
            messages_published: self.messages_published.load(Ordering::Relaxed),
            started_at: self.started_at,
            run_duration_secs: (Utc::now() - self.started_at).num_seconds().max(0) as u64,
        }
    }

    /// Get a summary string for display.
    pub fn summary(&self) -> String {
        let stats = self.stats();
        format!(
            "Pipeline Statistics:\n\
             - Lines read: {}\n\
             - Decode errors: {}\n\
             - Readings dropped: {}\n\
             - Messages published: {}\n\
             - Run duration: {} seconds",
            stats.lines_read,
            stats.decode_errors,
            stats.readings_dropped,
            stats.messages_published,
            stats.run_duration_secs
        )
    }
}

impl Default for PipelineCounters {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of pipeline statistics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterStats {
    pub lines_read: u64,
    pub decode_errors: u64,
    pub readings_dropped: u64,
    pub messages_published: u64,
    pub started_at: DateTime<Utc>,
    pub run_duration_secs: u64,
}

/// Counters shared between stage threads.
pub type SharedCounters = Arc<PipelineCounters>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counting() {
        let counters = PipelineCounters::new();

        counters.record_line();
        counters.record_line();
        counters.record_line();
        counters.record_decode_error();
        counters.record_dropped();
        counters.record_published();

        let stats = counters.stats();
        assert_eq!(stats.lines_read, 3);
        assert_eq!(stats.decode_errors, 1);
        assert_eq!(stats.readings_dropped, 1);
        assert_eq!(stats.messages_published, 1);
    }

    #[test]
    fn test_shared_across_threads() {
        let counters: SharedCounters = Arc::new(PipelineCounters::new());

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let counters = Arc::clone(&counters);
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        counters.record_published();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(counters.stats().messages_published, 400);
    }

    #[test]
    fn test_summary_format() {
        let summary = PipelineCounters::new().summary();

        assert!(summary.contains("Lines read: 0"));
        assert!(summary.contains("Messages published: 0"));
    }
}
