//! Rolling frame-timing and memory telemetry.
//!
//! `record_frame` is called once per rendered frame with the frame delta and
//! the current instant. Timestamps are supplied by the caller so the recorder
//! can be driven deterministically.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Short FPS window (about one second at 60 fps).
pub const SHORT_WINDOW: usize = 60;
/// Long FPS window and frame-time history length.
pub const LONG_WINDOW: usize = 300;
/// Frames between memory samples.
pub const MEMORY_SAMPLE_INTERVAL: u64 = 60;
/// Memory samples older than this are evicted.
pub const MEMORY_RETENTION: Duration = Duration::from_secs(10 * 60);

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Fixed-capacity FIFO of samples.
#[derive(Debug, Clone)]
pub struct RollingWindow {
    samples: VecDeque<f32>,
    capacity: usize,
}

impl RollingWindow {
    pub fn new(capacity: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
        }
    }

    pub fn push(&mut self, value: f32) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(value);
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn last(&self) -> Option<f32> {
        self.samples.back().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = f32> + '_ {
        self.samples.iter().copied()
    }

    /// Mean of all samples, 0 when empty.
    pub fn mean(&self) -> f32 {
        mean(self.samples.iter().copied(), self.samples.len())
    }

    /// Mean of `count` samples ending `skip_newest` samples before the newest.
    fn mean_of_range(&self, skip_newest: usize, count: usize) -> f32 {
        let end = self.samples.len().saturating_sub(skip_newest);
        let start = end.saturating_sub(count);
        mean(self.samples.range(start..end).copied(), end - start)
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }
}

fn mean(values: impl Iterator<Item = f32>, n: usize) -> f32 {
    if n == 0 {
        return 0.0;
    }
    values.sum::<f32>() / n as f32
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trend {
    Improving,
    Stable,
    Degrading,
    /// Not enough history to compare two windows.
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryPressure {
    Low,
    Medium,
    High,
}

/// One heap reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemorySample {
    pub used_bytes: u64,
    pub limit_bytes: u64,
}

/// Source of memory readings; returns `None` where unavailable.
pub trait MemoryProbe: Send {
    fn sample(&self) -> Option<MemorySample>;
}

/// Probe for platforms without memory introspection.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoMemoryProbe;

impl MemoryProbe for NoMemoryProbe {
    fn sample(&self) -> Option<MemorySample> {
        None
    }
}

/// Resident set size from `/proc/self/status`, measured against a fixed budget.
#[cfg(target_os = "linux")]
#[derive(Debug, Clone, Copy)]
pub struct ProcessMemoryProbe {
    pub limit_bytes: u64,
}

#[cfg(target_os = "linux")]
impl ProcessMemoryProbe {
    pub fn with_budget_mb(budget_mb: u64) -> Self {
        Self {
            limit_bytes: budget_mb.saturating_mul(1024 * 1024),
        }
    }
}

#[cfg(target_os = "linux")]
impl MemoryProbe for ProcessMemoryProbe {
    fn sample(&self) -> Option<MemorySample> {
        let status = std::fs::read_to_string("/proc/self/status").ok()?;
        let kb: u64 = status
            .lines()
            .find_map(|l| l.strip_prefix("VmRSS:"))?
            .split_whitespace()
            .next()?
            .parse()
            .ok()?;
        Some(MemorySample {
            used_bytes: kb * 1024,
            limit_bytes: self.limit_bytes,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FpsMetrics {
    pub current: f32,
    pub rolling60: f32,
    pub rolling300: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameTimeMetrics {
    pub average_ms: f32,
    pub p95_ms: f32,
    /// 1 for perfectly even frame times, 0 for variance ≥ 100 ms².
    pub consistency: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MemoryMetrics {
    pub used_mb: Option<f32>,
    pub growth_mb_per_min: f32,
    pub pressure: MemoryPressure,
}

/// Snapshot returned by [`FrameTelemetry::metrics`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameMetrics {
    pub fps: FpsMetrics,
    pub trend: Trend,
    pub frame_time: FrameTimeMetrics,
    pub memory: MemoryMetrics,
    pub frames_recorded: u64,
}

pub struct FrameTelemetry {
    fps_short: RollingWindow,
    fps_long: RollingWindow,
    frame_times_ms: RollingWindow,
    memory: VecDeque<(Instant, MemorySample)>,
    probe: Box<dyn MemoryProbe>,
    current_fps: f32,
    frames: u64,
    last_frame: Option<Instant>,
}

impl Default for FrameTelemetry {
    fn default() -> Self {
        Self::new(Box::new(NoMemoryProbe))
    }
}

impl FrameTelemetry {
    pub fn new(probe: Box<dyn MemoryProbe>) -> Self {
        Self {
            fps_short: RollingWindow::new(SHORT_WINDOW),
            fps_long: RollingWindow::new(LONG_WINDOW),
            frame_times_ms: RollingWindow::new(LONG_WINDOW),
            memory: VecDeque::new(),
            probe,
            current_fps: 0.0,
            frames: 0,
            last_frame: None,
        }
    }

    /// Ingests one frame. Non-positive or non-finite deltas are ignored.
    pub fn record_frame(&mut self, delta_seconds: f32, now: Instant) {
        if !(delta_seconds.is_finite() && delta_seconds > 0.0) {
            log::trace!("Ignoring frame with delta {}", delta_seconds);
            return;
        }

        let fps = 1.0 / delta_seconds;
        self.current_fps = fps;
        self.fps_short.push(fps);
        self.fps_long.push(fps);

        // Wall-clock time between calls; the delta stands in for the first frame.
        let frame_ms = match self.last_frame {
            Some(prev) => now.saturating_duration_since(prev).as_secs_f32() * 1000.0,
            None => delta_seconds * 1000.0,
        };
        self.frame_times_ms.push(frame_ms);
        self.last_frame = Some(now);

        self.frames += 1;
        if self.frames % MEMORY_SAMPLE_INTERVAL == 0 {
            self.sample_memory(now);
        }
    }

    fn sample_memory(&mut self, now: Instant) {
        if let Some(sample) = self.probe.sample() {
            self.memory.push_back((now, sample));
        }
        while let Some((t, _)) = self.memory.front() {
            if now.saturating_duration_since(*t) > MEMORY_RETENTION {
                self.memory.pop_front();
            } else {
                break;
            }
        }
    }

    #[inline]
    pub fn frames_recorded(&self) -> u64 {
        self.frames
    }

    pub fn fps_short(&self) -> &RollingWindow {
        &self.fps_short
    }

    pub fn fps_long(&self) -> &RollingWindow {
        &self.fps_long
    }

    pub fn frame_times_ms(&self) -> &RollingWindow {
        &self.frame_times_ms
    }

    pub fn memory_samples(&self) -> usize {
        self.memory.len()
    }

    /// Compares the newest short window against the one before it.
    pub fn trend(&self) -> Trend {
        if self.fps_long.len() < 2 * SHORT_WINDOW {
            return Trend::Unknown;
        }
        let recent = self.fps_long.mean_of_range(0, SHORT_WINDOW);
        let previous = self.fps_long.mean_of_range(SHORT_WINDOW, SHORT_WINDOW);
        if previous <= f32::EPSILON {
            return Trend::Stable;
        }
        let change = (recent - previous) / previous;
        if change > 0.05 {
            Trend::Improving
        } else if change < -0.05 {
            Trend::Degrading
        } else {
            Trend::Stable
        }
    }

    fn frame_time_metrics(&self) -> FrameTimeMetrics {
        let n = self.frame_times_ms.len();
        if n == 0 {
            return FrameTimeMetrics {
                average_ms: 0.0,
                p95_ms: 0.0,
                consistency: 1.0,
            };
        }

        let avg = self.frame_times_ms.mean();
        let mut sorted: Vec<f32> = self.frame_times_ms.iter().collect();
        sorted.sort_by(|a, b| a.total_cmp(b));
        let rank = ((n as f32 * 0.95).ceil() as usize).clamp(1, n);
        let p95 = sorted[rank - 1];

        let variance = self
            .frame_times_ms
            .iter()
            .map(|t| (t - avg) * (t - avg))
            .sum::<f32>()
            / n as f32;

        FrameTimeMetrics {
            average_ms: avg,
            p95_ms: p95,
            consistency: (1.0 - variance / 100.0).max(0.0),
        }
    }

    fn memory_metrics(&self) -> MemoryMetrics {
        let latest = self.memory.back();

        let growth = match (self.memory.front(), latest) {
            (Some((t0, first)), Some((t1, last))) if self.memory.len() >= 2 => {
                let minutes = t1.saturating_duration_since(*t0).as_secs_f64() / 60.0;
                if minutes > 0.0 {
                    let delta_mb = (last.used_bytes as f64 - first.used_bytes as f64) / BYTES_PER_MB;
                    (delta_mb / minutes) as f32
                } else {
                    0.0
                }
            }
            _ => 0.0,
        };

        let pressure = match latest {
            Some((_, s)) if s.limit_bytes > 0 => {
                let ratio = s.used_bytes as f64 / s.limit_bytes as f64;
                if ratio >= 0.8 {
                    MemoryPressure::High
                } else if ratio >= 0.6 {
                    MemoryPressure::Medium
                } else {
                    MemoryPressure::Low
                }
            }
            _ => MemoryPressure::Low,
        };

        MemoryMetrics {
            used_mb: latest.map(|(_, s)| (s.used_bytes as f64 / BYTES_PER_MB) as f32),
            growth_mb_per_min: growth,
            pressure,
        }
    }

    pub fn metrics(&self) -> FrameMetrics {
        FrameMetrics {
            fps: FpsMetrics {
                current: self.current_fps,
                rolling60: self.fps_short.mean(),
                rolling300: self.fps_long.mean(),
            },
            trend: self.trend(),
            frame_time: self.frame_time_metrics(),
            memory: self.memory_metrics(),
            frames_recorded: self.frames,
        }
    }

    pub fn reset(&mut self) {
        self.fps_short.clear();
        self.fps_long.clear();
        self.frame_times_ms.clear();
        self.memory.clear();
        self.current_fps = 0.0;
        self.frames = 0;
        self.last_frame = None;
    }
}
