//! Throughput sampling for speed and ETA display

use std::collections::VecDeque;
use std::time::Duration;

use tokio::time::Instant;

use crate::utils::format::{format_time_remaining, INDETERMINATE};

/// Samples kept for smoothing
pub const DEFAULT_SAMPLE_CAPACITY: usize = 5;
/// Minimum spacing between samples; shorter intervals are folded into the next sample
pub const MIN_SAMPLE_INTERVAL: Duration = Duration::from_millis(500);

/// Throughput observed over one sampling interval
#[derive(Debug, Clone, Copy)]
pub struct SpeedSample {
    pub at: Instant,
    pub bytes: u64,
    pub elapsed: Duration,
}

impl SpeedSample {
    fn bytes_per_sec(&self) -> f64 {
        self.bytes as f64 / self.elapsed.as_secs_f64()
    }
}

/// Remaining-time estimate
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Eta {
    Seconds(f64),
    Indeterminate,
}

impl std::fmt::Display for Eta {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Seconds(s) => write!(f, "{}", format_time_remaining(*s)),
            Self::Indeterminate => write!(f, "{}", INDETERMINATE),
        }
    }
}

/// Sliding window of throughput samples
#[derive(Debug)]
pub struct SpeedTracker {
    started_at: Instant,
    last_sample_at: Instant,
    last_observed_at: Instant,
    pending_bytes: u64,
    total_bytes: u64,
    samples: VecDeque<SpeedSample>,
    capacity: usize,
}

impl SpeedTracker {
    pub fn new(started_at: Instant) -> Self {
        Self::with_capacity(started_at, DEFAULT_SAMPLE_CAPACITY)
    }

    pub fn with_capacity(started_at: Instant, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            started_at,
            last_sample_at: started_at,
            last_observed_at: started_at,
            pending_bytes: 0,
            total_bytes: 0,
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Record `bytes_delta` newly transferred bytes at `now`
    pub fn observe(&mut self, bytes_delta: u64, now: Instant) {
        self.total_bytes += bytes_delta;
        self.pending_bytes += bytes_delta;
        if now > self.last_observed_at {
            self.last_observed_at = now;
        }

        let elapsed = now.saturating_duration_since(self.last_sample_at);
        if elapsed < MIN_SAMPLE_INTERVAL {
            return;
        }

        if self.samples.len() >= self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(SpeedSample {
            at: now,
            bytes: self.pending_bytes,
            elapsed,
        });
        self.pending_bytes = 0;
        self.last_sample_at = now;
    }

    /// Smoothed throughput in bytes per second
    pub fn current_speed(&self) -> f64 {
        if self.samples.is_empty() {
            let elapsed = self
                .last_observed_at
                .saturating_duration_since(self.started_at)
                .as_secs_f64();
            if elapsed <= 0.0 {
                return 0.0;
            }
            return self.total_bytes as f64 / elapsed;
        }

        let sum: f64 = self.samples.iter().map(SpeedSample::bytes_per_sec).sum();
        sum / self.samples.len() as f64
    }

    pub fn estimate_remaining(&self, bytes_remaining: u64) -> Eta {
        let speed = self.current_speed();
        if speed <= 0.0 {
            return Eta::Indeterminate;
        }
        let seconds = bytes_remaining as f64 / speed;
        if seconds.is_finite() {
            Eta::Seconds(seconds)
        } else {
            Eta::Indeterminate
        }
    }

    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }

    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }
}
