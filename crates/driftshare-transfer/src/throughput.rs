//! Smoothed transfer-rate estimation.
//!
//! Callers feed cumulative byte counts per transfer id. A sample is accepted
//! only when at least [`SPEED_SAMPLE_INTERVAL`] has passed since the previous
//! accepted one; the reported speed is the mean of the last
//! [`SPEED_HISTORY_LEN`] instantaneous rates.

use std::collections::{HashMap, VecDeque};

use tokio::time::Instant;

use crate::protocol::{MAX_PLAUSIBLE_RATE, SPEED_HISTORY_LEN, SPEED_SAMPLE_INTERVAL};

#[derive(Debug)]
struct RateTrack {
    last_bytes: u64,
    last_time: Instant,
    history: VecDeque<f64>,
    speed: f64,
}

/// Per-id rate tracker. Entries live until [`dispose`](Self::dispose).
#[derive(Debug, Default)]
pub struct ThroughputEstimator {
    tracks: HashMap<String, RateTrack>,
}

impl ThroughputEstimator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `cumulative_bytes` for `id` at the current time.
    pub fn sample(&mut self, id: &str, cumulative_bytes: u64) -> Option<f64> {
        self.sample_at(id, cumulative_bytes, Instant::now())
    }

    /// Record a sample at an explicit instant. Returns the new speed when the
    /// reported value changed, `None` if the sample was only a baseline,
    /// arrived too early, or produced an implausible mean.
    pub fn sample_at(&mut self, id: &str, cumulative_bytes: u64, now: Instant) -> Option<f64> {
        let Some(track) = self.tracks.get_mut(id) else {
            self.tracks.insert(
                id.to_string(),
                RateTrack {
                    last_bytes: cumulative_bytes,
                    last_time: now,
                    history: VecDeque::with_capacity(SPEED_HISTORY_LEN),
                    speed: 0.0,
                },
            );
            return None;
        };

        let elapsed = now.saturating_duration_since(track.last_time);
        if elapsed < SPEED_SAMPLE_INTERVAL {
            return None;
        }

        let delta = cumulative_bytes.saturating_sub(track.last_bytes) as f64;
        let rate = delta / elapsed.as_secs_f64();
        track.last_bytes = cumulative_bytes;
        track.last_time = now;

        if track.history.len() == SPEED_HISTORY_LEN {
            track.history.pop_front();
        }
        track.history.push_back(rate);

        let mean = track.history.iter().sum::<f64>() / track.history.len() as f64;
        if !(0.0..MAX_PLAUSIBLE_RATE).contains(&mean) {
            return None;
        }
        track.speed = mean;
        Some(mean)
    }

    /// Last reported speed for `id` in bytes/sec, 0 if unknown.
    pub fn speed(&self, id: &str) -> f64 {
        self.tracks.get(id).map_or(0.0, |t| t.speed)
    }

    pub fn dispose(&mut self, id: &str) {
        self.tracks.remove(id);
    }

    /// Number of ids currently tracked.
    pub fn tracked(&self) -> usize {
        self.tracks.len()
    }
}

/// Human-readable rate, e.g. `"1.5 MB/s"`.
pub fn format_rate(bytes_per_sec: f64) -> String {
    const UNITS: [&str; 4] = ["KB/s", "MB/s", "GB/s", "TB/s"];
    if bytes_per_sec < 1024.0 {
        return format!("{} B/s", bytes_per_sec.max(0.0).round() as u64);
    }
    let mut value = bytes_per_sec / 1024.0;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{:.1} {}", value, UNITS[unit])
}
