//! Adaptive quality controller.
//!
//! Owns the frame telemetry and the one-shot GPU classification, recomputes the
//! performance score when polled, and commits level changes through a
//! hysteresis gate:
//! 1. at least `hysteresis_delay_ms` since the last committed change, then
//! 2. the same recommendation must hold for `confirmation_ms`.
//!
//! A recommendation that flips while a change is pending replaces it.

use crate::error::{Error, Result};
use crate::gpu_tier::{GpuClassification, GpuTier};
use crate::quality::{performance_score, recommended_level, QualityLevel, QualitySettings};
use crate::telemetry::{FrameMetrics, FrameTelemetry, MemoryProbe, NoMemoryProbe};
use serde::Deserialize;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub enable_auto_adjust: bool,
    pub hysteresis_delay_ms: u64,
    pub confirmation_ms: u64,
    pub debug_mode: bool,
    /// Budget the process memory probe measures pressure against.
    pub memory_budget_mb: u64,
    pub initial_level: QualityLevelName,
}

/// Serde-friendly level name for configuration files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityLevelName {
    Full,
    Balanced,
    Performance,
    Emergency,
}

impl From<QualityLevelName> for QualityLevel {
    fn from(n: QualityLevelName) -> Self {
        match n {
            QualityLevelName::Full => QualityLevel::Full,
            QualityLevelName::Balanced => QualityLevel::Balanced,
            QualityLevelName::Performance => QualityLevel::Performance,
            QualityLevelName::Emergency => QualityLevel::Emergency,
        }
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            enable_auto_adjust: true,
            hysteresis_delay_ms: 5000,
            confirmation_ms: 1000,
            debug_mode: false,
            memory_budget_mb: 2048,
            initial_level: QualityLevelName::Balanced,
        }
    }
}

impl MonitorConfig {
    pub fn validate(&self) -> Result<()> {
        // Zero delays are allowed; they just disable the gate.
        if self.memory_budget_mb == 0 {
            return Err(Error::ZeroMemoryBudget);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionReason {
    Auto,
    Manual,
}

/// A committed level change.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QualityTransition {
    pub from: QualityLevel,
    pub to: QualityLevel,
    pub score: f32,
    pub reason: TransitionReason,
}

/// A scheduled, cancellable commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingTransition {
    pub level: QualityLevel,
    pub due: Instant,
}

pub struct PerformanceMonitor {
    config: MonitorConfig,
    telemetry: FrameTelemetry,
    gpu: Option<GpuClassification>,
    current: QualityLevel,
    last_change: Option<Instant>,
    pending: Option<PendingTransition>,
    manual_override: bool,
    last_score: f32,
}

impl PerformanceMonitor {
    pub fn new(config: MonitorConfig) -> Result<Self> {
        Self::with_probe(config, Box::new(NoMemoryProbe))
    }

    pub fn with_probe(config: MonitorConfig, probe: Box<dyn MemoryProbe>) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            current: config.initial_level.into(),
            config,
            telemetry: FrameTelemetry::new(probe),
            gpu: None,
            last_change: None,
            pending: None,
            manual_override: false,
            last_score: 100.0,
        })
    }

    /// Stores the startup GPU classification. Later calls are ignored.
    pub fn set_gpu(&mut self, gpu: GpuClassification) {
        if self.gpu.is_some() {
            log::debug!("GPU already classified; ignoring '{}'", gpu.renderer);
            return;
        }
        self.gpu = Some(gpu);
    }

    pub fn gpu(&self) -> Option<&GpuClassification> {
        self.gpu.as_ref()
    }

    pub fn gpu_tier(&self) -> Option<GpuTier> {
        self.gpu.as_ref().map(|g| g.tier)
    }

    /// True on every 60th recorded frame when debug logging is on.
    fn debug_summary_due(&self) -> bool {
        let frames = self.telemetry.frames_recorded();
        self.config.debug_mode && frames > 0 && frames % 60 == 0
    }

    pub fn record_frame(&mut self, delta_seconds: f32, now: Instant) {
        self.telemetry.record_frame(delta_seconds, now);

        if self.debug_summary_due() {
            let m = self.telemetry.metrics();
            log::debug!(
                "perf: fps={:.1} avg60={:.1} avg300={:.1} trend={:?} ft_avg={:.2}ms p95={:.2}ms consistency={:.2} mem_growth={:.2}MB/min pressure={:?} score={:.1} level={}",
                m.fps.current,
                m.fps.rolling60,
                m.fps.rolling300,
                m.trend,
                m.frame_time.average_ms,
                m.frame_time.p95_ms,
                m.frame_time.consistency,
                m.memory.growth_mb_per_min,
                m.memory.pressure,
                self.last_score,
                self.current
            );
        }
    }

    pub fn metrics(&self) -> FrameMetrics {
        self.telemetry.metrics()
    }

    pub fn telemetry(&self) -> &FrameTelemetry {
        &self.telemetry
    }

    pub fn calculate_performance_score(&self) -> f32 {
        performance_score(self.gpu.as_ref(), &self.telemetry.metrics())
    }

    pub fn recommended_quality_level(&self) -> QualityLevel {
        recommended_level(self.calculate_performance_score(), self.gpu_tier())
    }

    /// Polls the controller once per frame. Returns the transition if one was
    /// committed on this call.
    pub fn update(&mut self, now: Instant) -> Option<QualityTransition> {
        let score = self.calculate_performance_score();
        self.last_score = score;
        if self.manual_override || !self.config.enable_auto_adjust {
            return None;
        }
        let recommended = recommended_level(score, self.gpu_tier());
        self.apply_recommendation(recommended, score, now)
    }

    /// Runs one recommendation through the hysteresis gate.
    pub fn apply_recommendation(
        &mut self,
        recommended: QualityLevel,
        score: f32,
        now: Instant,
    ) -> Option<QualityTransition> {
        if self.manual_override {
            return None;
        }

        if recommended == self.current {
            if self.pending.take().is_some() {
                log::trace!("Pending quality change cancelled; {} holds", self.current);
            }
            return None;
        }

        let delay = Duration::from_millis(self.config.hysteresis_delay_ms);
        if let Some(last) = self.last_change {
            if now.saturating_duration_since(last) < delay {
                return None;
            }
        }

        match self.pending {
            Some(p) if p.level == recommended => {
                if now >= p.due {
                    self.pending = None;
                    return Some(self.commit(recommended, score, TransitionReason::Auto, now));
                }
                None
            }
            _ => {
                // New or flipped recommendation: cancel and reschedule.
                self.pending = Some(PendingTransition {
                    level: recommended,
                    due: now + Duration::from_millis(self.config.confirmation_ms),
                });
                None
            }
        }
    }

    /// Pins the level and suspends auto-adjustment until
    /// [`enable_auto_adjust`](Self::enable_auto_adjust) is called.
    pub fn manually_set_level(&mut self, level: QualityLevel, now: Instant) -> Option<QualityTransition> {
        self.manual_override = true;
        self.pending = None;
        if level == self.current {
            return None;
        }
        let score = self.last_score;
        Some(self.commit(level, score, TransitionReason::Manual, now))
    }

    pub fn enable_auto_adjust(&mut self) {
        if self.manual_override {
            log::info!("Quality auto-adjust re-enabled at {}", self.current);
        }
        self.manual_override = false;
        self.config.enable_auto_adjust = true;
    }

    fn commit(&mut self, to: QualityLevel, score: f32, reason: TransitionReason, now: Instant) -> QualityTransition {
        let from = self.current;
        self.current = to;
        self.last_change = Some(now);
        log::info!("Quality {} -> {} (score {:.1}, {:?})", from, to, score, reason);
        QualityTransition {
            from,
            to,
            score,
            reason,
        }
    }

    #[inline]
    pub fn current_level(&self) -> QualityLevel {
        self.current
    }

    pub fn settings(&self) -> &'static QualitySettings {
        self.current.settings()
    }

    pub fn pending(&self) -> Option<PendingTransition> {
        self.pending
    }

    pub fn is_manual(&self) -> bool {
        self.manual_override
    }

    pub fn last_score(&self) -> f32 {
        self.last_score
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn monitor() -> PerformanceMonitor {
        PerformanceMonitor::new(MonitorConfig::default()).unwrap()
    }

    fn ms(t0: Instant, ms: u64) -> Instant {
        t0 + Duration::from_millis(ms)
    }

    #[test]
    fn debug_summary_waits_for_recorded_frames() {
        let mut m = PerformanceMonitor::new(MonitorConfig {
            debug_mode: true,
            ..MonitorConfig::default()
        })
        .unwrap();
        let t0 = Instant::now();
        m.record_frame(0.0, t0);
        m.record_frame(f32::NAN, t0);
        assert!(!m.debug_summary_due());

        for i in 1..=60 {
            m.record_frame(1.0 / 60.0, ms(t0, i * 16));
            assert_eq!(m.debug_summary_due(), i == 60);
        }
    }

    #[test]
    fn change_commits_after_confirmation_window() {
        let mut m = monitor();
        let t0 = Instant::now();
        assert!(m.apply_recommendation(QualityLevel::Performance, 50.0, t0).is_none());
        assert_eq!(m.pending().map(|p| p.level), Some(QualityLevel::Performance));
        assert!(m.apply_recommendation(QualityLevel::Performance, 50.0, ms(t0, 999)).is_none());

        let t = m.apply_recommendation(QualityLevel::Performance, 50.0, ms(t0, 1000)).unwrap();
        assert_eq!(t.from, QualityLevel::Balanced);
        assert_eq!(t.to, QualityLevel::Performance);
        assert_eq!(m.current_level(), QualityLevel::Performance);
    }

    #[test]
    fn flip_replaces_pending_change() {
        let mut m = monitor();
        let t0 = Instant::now();
        m.apply_recommendation(QualityLevel::Performance, 50.0, t0);
        m.apply_recommendation(QualityLevel::Emergency, 30.0, ms(t0, 500));
        assert_eq!(m.pending().map(|p| p.level), Some(QualityLevel::Emergency));
        // Original due time has passed but the pending change was replaced.
        assert!(m.apply_recommendation(QualityLevel::Emergency, 30.0, ms(t0, 1200)).is_none());
        assert!(m.apply_recommendation(QualityLevel::Emergency, 30.0, ms(t0, 1500)).is_some());
    }

    #[test]
    fn returning_to_current_cancels_pending() {
        let mut m = monitor();
        let t0 = Instant::now();
        m.apply_recommendation(QualityLevel::Full, 90.0, t0);
        m.apply_recommendation(QualityLevel::Balanced, 70.0, ms(t0, 100));
        assert!(m.pending().is_none());
    }

    #[test]
    fn delay_gates_consecutive_changes() {
        let mut m = monitor();
        let t0 = Instant::now();
        m.apply_recommendation(QualityLevel::Performance, 50.0, t0);
        assert!(m.apply_recommendation(QualityLevel::Performance, 50.0, ms(t0, 1000)).is_some());

        // Within 5 s of the commit nothing is even scheduled.
        assert!(m.apply_recommendation(QualityLevel::Emergency, 10.0, ms(t0, 3000)).is_none());
        assert!(m.pending().is_none());

        m.apply_recommendation(QualityLevel::Emergency, 10.0, ms(t0, 6000));
        assert!(m.apply_recommendation(QualityLevel::Emergency, 10.0, ms(t0, 7000)).is_some());
    }

    #[test]
    fn manual_override_suspends_auto() {
        let mut m = monitor();
        let t0 = Instant::now();
        let t = m.manually_set_level(QualityLevel::Emergency, t0).unwrap();
        assert_eq!(t.reason, TransitionReason::Manual);
        assert!(m.is_manual());

        m.apply_recommendation(QualityLevel::Full, 100.0, ms(t0, 10_000));
        assert!(m.apply_recommendation(QualityLevel::Full, 100.0, ms(t0, 20_000)).is_none());
        assert_eq!(m.current_level(), QualityLevel::Emergency);

        m.enable_auto_adjust();
        m.apply_recommendation(QualityLevel::Full, 100.0, ms(t0, 30_000));
        assert!(m.apply_recommendation(QualityLevel::Full, 100.0, ms(t0, 31_000)).is_some());
    }

    #[test]
    fn update_without_frames_keeps_unresolved_gpu_sane() {
        let mut m = monitor();
        // No GPU, no frames: score stays 100, recommends FULL.
        assert_eq!(m.recommended_quality_level(), QualityLevel::Full);
        let t0 = Instant::now();
        assert!(m.update(t0).is_none());
        assert!(m.update(ms(t0, 1000)).is_some());
        assert_eq!(m.current_level(), QualityLevel::Full);
    }

    #[test]
    fn disabled_auto_adjust_never_commits() {
        let mut m = PerformanceMonitor::new(MonitorConfig {
            enable_auto_adjust: false,
            ..MonitorConfig::default()
        })
        .unwrap();
        let t0 = Instant::now();
        m.update(t0);
        assert!(m.update(ms(t0, 5000)).is_none());
        assert_eq!(m.current_level(), QualityLevel::Balanced);
    }
}
