use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Progress of one upload, derived from the confirmed chunk count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressSnapshot {
    pub confirmed_count: usize,
    pub total_count: usize,
    /// Rounded percentage, 0 to 100.
    pub percentage: u8,
    /// `confirmed_count * chunk_size`, clamped to `total_bytes`.
    pub confirmed_bytes: u64,
    pub total_bytes: u64,
}

impl ProgressSnapshot {
    /// Computes a snapshot. An empty plan counts as fully done.
    pub fn compute(
        confirmed_count: usize,
        total_count: usize,
        chunk_size: u64,
        total_bytes: u64,
    ) -> Self {
        let percentage = if total_count == 0 {
            100
        } else {
            let ratio = confirmed_count.min(total_count) as f64 / total_count as f64;
            (ratio * 100.0).round() as u8
        };
        let confirmed_bytes = (confirmed_count as u64)
            .saturating_mul(chunk_size)
            .min(total_bytes);

        Self {
            confirmed_count,
            total_count,
            percentage,
            confirmed_bytes,
            total_bytes,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.confirmed_count >= self.total_count
    }

    /// Bytes not yet confirmed.
    pub fn remaining_bytes(&self) -> u64 {
        self.total_bytes - self.confirmed_bytes
    }
}

// ---------------------------------------------------------------------------
// SpeedCalculator
// ---------------------------------------------------------------------------

struct SpeedSample {
    bytes: u64,
    timestamp: Instant,
}

/// Calculates transfer speed using a sliding window of samples.
pub struct SpeedCalculator {
    inner: Mutex<SpeedInner>,
}

struct SpeedInner {
    samples: Vec<SpeedSample>,
    max_samples: usize,
    window_size: Duration,
}

impl SpeedCalculator {
    /// Creates a new calculator.
    ///
    /// - `window_size`: time window for speed calculation (default 5 s).
    /// - `max_samples`: maximum retained samples (default 100).
    pub fn new(window_size: Option<Duration>, max_samples: Option<usize>) -> Self {
        Self {
            inner: Mutex::new(SpeedInner {
                samples: Vec::new(),
                max_samples: max_samples.unwrap_or(100).max(2),
                window_size: window_size.unwrap_or(Duration::from_secs(5)),
            }),
        }
    }

    /// Records `bytes` transferred since the previous sample.
    pub fn add_sample(&self, bytes: u64) {
        self.add_sample_at(bytes, Instant::now());
    }

    fn add_sample_at(&self, bytes: u64, now: Instant) {
        let mut s = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        s.samples.push(SpeedSample {
            bytes,
            timestamp: now,
        });

        if let Some(cutoff) = now.checked_sub(s.window_size) {
            s.samples.retain(|sample| sample.timestamp >= cutoff);
        }

        if s.samples.len() > s.max_samples {
            let excess = s.samples.len() - s.max_samples;
            s.samples.drain(..excess);
        }
    }

    /// Average speed in bytes/second within the window.
    ///
    /// The first sample only marks the start of the window, so fewer than two
    /// samples yields 0.0.
    pub fn bytes_per_second(&self) -> f64 {
        let s = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let (Some(first), Some(last)) = (s.samples.first(), s.samples.last()) else {
            return 0.0;
        };
        let elapsed = last.timestamp.duration_since(first.timestamp);
        if elapsed.is_zero() {
            return 0.0;
        }

        let transferred: u64 = s.samples[1..].iter().map(|sample| sample.bytes).sum();
        transferred as f64 / elapsed.as_secs_f64()
    }

    /// Estimates the time needed for `remaining_bytes`, `None` while the
    /// speed is unknown.
    pub fn eta(&self, remaining_bytes: u64) -> Option<Duration> {
        let speed = self.bytes_per_second();
        if speed <= 0.0 {
            return None;
        }
        Some(Duration::from_secs_f64(remaining_bytes as f64 / speed))
    }

    /// Clears all recorded samples.
    pub fn reset(&self) {
        let mut s = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        s.samples.clear();
    }
}
