//! Core functionality for the weather sensor bridge.
//!
//! This module contains:
//! - A substitutable clock
//! - Windowed accumulators producing rolling and epoch-aligned statistics
//! - Numeric helpers for unit conversion

pub mod accumulator;
pub mod clock;
pub mod math;

// Re-export commonly used types
pub use accumulator::{Accumulator, Stats, TimestampedValue, WindowPolicy};
pub use clock::{Clock, ManualClock, SystemClock};
