//! Bounded sample storage for one streaming query.
//!
//! Every query accumulates decoded values into a [`Series`]: a fixed-capacity,
//! time-ordered ring that appends at the tail and evicts at the head. The
//! whole window is snapshotted on every update, so reads dominate writes.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// One decoded measurement.
///
/// `value` is `None` when the originating message failed to decode: a null
/// sample marks a decode failure at that instant, not a gap in the stream.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Arrival time in milliseconds since the Unix epoch.
    pub timestamp_ms: i64,
    /// Decoded numeric value, or `None` on decode failure.
    pub value: Option<f64>,
}

impl Sample {
    /// Create a new sample.
    pub fn new(timestamp_ms: i64, value: Option<f64>) -> Self {
        Self { timestamp_ms, value }
    }
}

/// Fixed-capacity, time-ordered store of samples.
///
/// Capacity is fixed at creation and never resized. Samples are kept in
/// arrival order; appending at capacity evicts the oldest sample first.
#[derive(Debug, Clone)]
pub struct Series {
    points: VecDeque<Sample>,
    capacity: usize,
}

impl Series {
    /// Create an empty series retaining at most `capacity` samples.
    ///
    /// A capacity of zero is clamped to one; an unappendable series is
    /// never useful.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            points: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a sample at the tail, evicting the head when at capacity.
    pub fn append(&mut self, sample: Sample) {
        if self.points.len() == self.capacity {
            self.points.pop_front();
        }
        self.points.push_back(sample);
    }

    /// Current contents in arrival order.
    pub fn snapshot(&self) -> Vec<Sample> {
        self.points.iter().copied().collect()
    }

    /// Number of retained samples.
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Whether the series holds no samples.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Maximum number of retained samples.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
