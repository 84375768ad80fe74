// Tatakai Offline - Offline episode downloads for the Tatakai client
// Copyright (C) 2025 Tatakai contributors
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.


//! Throughput and ETA estimation
//!
//! Speed is recomputed from the delta between two samples at least
//! `interval` apart, not from a cumulative average, so a slowdown shows up
//! within one interval. ETA comes from remaining bytes over that speed, or
//! for HLS from remaining segments times the observed time per segment.
//!
//! Transfers report at most [`TRANSFER_PERCENT_CAP`]; the manifest write
//! takes the job to 100.

use std::time::{Duration, Instant};

/// Highest percent a transfer may report before the manifest is written
pub const TRANSFER_PERCENT_CAP: u8 = 95;

const KIB: f64 = 1024.0;
const MIB: f64 = 1024.0 * 1024.0;

/// Format bytes/second for display: `"2.4 MB/s"` or `"512 KB/s"`
pub fn format_speed(bytes_per_sec: f64) -> String {
    if bytes_per_sec >= MIB {
        format!("{:.1} MB/s", bytes_per_sec / MIB)
    } else {
        format!("{:.0} KB/s", (bytes_per_sec / KIB).max(0.0))
    }
}

/// Format remaining seconds: `"45s"`, `"3m 12s"` or `"1h 5m"`
pub fn format_eta(seconds: u64) -> String {
    if seconds < 60 {
        format!("{}s", seconds)
    } else if seconds < 3600 {
        format!("{}m {}s", seconds / 60, seconds % 60)
    } else {
        format!("{}h {}m", seconds / 3600, (seconds % 3600) / 60)
    }
}

/// Scale `done / total` onto 0..=95
pub fn transfer_percent(done: u64, total: u64) -> u8 {
    if total == 0 {
        return 0;
    }
    let ratio = (done.min(total) as f64) / (total as f64);
    (ratio * TRANSFER_PERCENT_CAP as f64).round() as u8
}

/// One throughput measurement
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpeedSample {
    pub bytes_per_sec: f64,
    /// Wall time covered by this sample
    pub elapsed: Duration,
}

/// Interval-based throughput meter
#[derive(Debug)]
pub struct ThroughputMeter {
    interval: Duration,
    last_instant: Instant,
    last_bytes: u64,
}

impl ThroughputMeter {
    pub fn new(interval: Duration) -> Self {
        Self::starting_at(interval, Instant::now())
    }

    pub fn starting_at(interval: Duration, start: Instant) -> Self {
        Self {
            interval,
            last_instant: start,
            last_bytes: 0,
        }
    }

    /// Record the running byte total; returns a sample once `interval` has
    /// passed since the previous one
    pub fn sample_at(&mut self, total_bytes: u64, now: Instant) -> Option<SpeedSample> {
        let elapsed = now.saturating_duration_since(self.last_instant);
        if elapsed < self.interval || elapsed.is_zero() {
            return None;
        }

        let delta = total_bytes.saturating_sub(self.last_bytes);
        self.last_instant = now;
        self.last_bytes = total_bytes;

        Some(SpeedSample {
            bytes_per_sec: delta as f64 / elapsed.as_secs_f64(),
            elapsed,
        })
    }
}

/// What the pipeline hands to the queue on a progress tick
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProgressUpdate {
    /// None while the total size is unknown
    pub percent: Option<u8>,
    pub speed: Option<String>,
    pub eta: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Unit {
    Bytes,
    Segments,
}

/// Turns raw transfer counters into throttled [`ProgressUpdate`]s
///
/// An update is produced only when the percent moves or a new speed sample
/// is taken, which keeps the event rate independent of chunk size.
#[derive(Debug)]
pub struct ProgressTracker {
    meter: ThroughputMeter,
    unit: Unit,
    total: Option<u64>,
    units_at_sample: u64,
    last_percent: Option<u8>,
    speed: Option<String>,
    eta: Option<String>,
}

impl ProgressTracker {
    /// Tracker for a byte transfer; `content_length` may be unknown
    pub fn bytes(content_length: Option<u64>, interval: Duration) -> Self {
        Self::new(Unit::Bytes, content_length.filter(|t| *t > 0), interval)
    }

    /// Tracker for an HLS transfer of `total` segments
    pub fn segments(total: u64, interval: Duration) -> Self {
        Self::new(Unit::Segments, Some(total), interval)
    }

    fn new(unit: Unit, total: Option<u64>, interval: Duration) -> Self {
        Self {
            meter: ThroughputMeter::new(interval),
            unit,
            total,
            units_at_sample: 0,
            last_percent: None,
            speed: None,
            eta: None,
        }
    }

    /// Adopt a content length reported after the tracker was created
    ///
    /// Ignored once a total is known, or when the length is zero.
    pub fn learn_total(&mut self, total: Option<u64>) {
        if self.total.is_none() {
            self.total = total.filter(|t| *t > 0);
        }
    }

    /// Record progress at `now`
    ///
    /// `units_done` counts bytes or segments depending on the tracker kind;
    /// `bytes_done` always counts bytes and feeds the throughput meter.
    pub fn record(&mut self, units_done: u64, bytes_done: u64, now: Instant) -> Option<ProgressUpdate> {
        let sampled = match self.meter.sample_at(bytes_done, now) {
            Some(sample) => {
                self.speed = Some(format_speed(sample.bytes_per_sec));
                self.eta = self.estimate(units_done, sample).map(format_eta);
                self.units_at_sample = units_done;
                true
            }
            None => false,
        };

        let percent = self.total.map(|total| transfer_percent(units_done, total));
        if !sampled && percent == self.last_percent {
            return None;
        }
        self.last_percent = percent;

        Some(ProgressUpdate {
            percent,
            speed: self.speed.clone(),
            eta: self.eta.clone(),
        })
    }

    fn estimate(&self, units_done: u64, sample: SpeedSample) -> Option<u64> {
        let total = self.total?;
        let remaining = total.saturating_sub(units_done);

        match self.unit {
            Unit::Bytes => {
                if sample.bytes_per_sec <= 0.0 {
                    return None;
                }
                Some((remaining as f64 / sample.bytes_per_sec).round() as u64)
            }
            Unit::Segments => {
                let finished = units_done.saturating_sub(self.units_at_sample);
                if finished == 0 {
                    return None;
                }
                let per_segment = sample.elapsed.as_secs_f64() / finished as f64;
                Some((remaining as f64 * per_segment).round() as u64)
            }
        }
    }
}
