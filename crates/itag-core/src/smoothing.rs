//! Batch averaging of raw signal-strength samples.
//!
//! RSSI is noisy; a single reading can swing by 10 dBm between polls.
//! The session feeds every sample into a [`SmoothingWindow`] and only
//! acts on the mean of a full batch, which bounds the distance-update
//! cadence to one estimate per `capacity` samples.

/// Default number of samples per batch.
pub const DEFAULT_WINDOW_SIZE: usize = 10;

/// Fixed-capacity batch-average window for signal-strength samples.
///
/// This is a drain-on-full buffer, not a sliding window: once
/// `capacity` samples have accumulated, [`ingest`](Self::ingest)
/// returns their arithmetic mean and the window resets to empty.
#[derive(Debug, Clone)]
pub struct SmoothingWindow {
    samples: Vec<i16>,
    capacity: usize,
}

impl SmoothingWindow {
    /// Create a window with the given batch size.
    ///
    /// A zero capacity is treated as 1 so every sample passes through.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a sample; returns the batch mean when this sample fills
    /// the window, draining it.
    pub fn ingest(&mut self, sample: i16) -> Option<f64> {
        self.samples.push(sample);
        if self.samples.len() < self.capacity {
            return None;
        }

        let sum: i64 = self.samples.iter().map(|&s| i64::from(s)).sum();
        let mean = sum as f64 / self.samples.len() as f64;
        self.samples.clear();
        Some(mean)
    }

    /// Discard any partially accumulated batch.
    pub fn clear(&mut self) {
        self.samples.clear();
    }

    /// Number of samples currently accumulated.
    #[must_use]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Whether the window holds no samples.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Batch size.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for SmoothingWindow {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW_SIZE)
    }
}
