//! Quality presets, the performance score, and score → level mapping.

use crate::error::{Error, Result};
use crate::gpu_tier::{GpuClassification, GpuTier};
use crate::telemetry::{FrameMetrics, MemoryPressure, Trend};
use std::fmt;
use std::str::FromStr;

/// Frame rate the score is measured against.
pub const SCORE_TARGET_FPS: f32 = 60.0;
/// Score floor while the GPU tier is still unresolved.
pub const UNRESOLVED_GPU_FLOOR: f32 = 35.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum QualityLevel {
    Full,
    Balanced,
    Performance,
    Emergency,
}

/// Static render settings bundled with each level.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QualitySettings {
    /// Subdivisions per side of the terrain mesh.
    pub terrain_segments: u32,
    pub shadows: bool,
    pub shadow_map_size: u32,
    pub dynamic_lighting: bool,
    pub grid: bool,
    pub grid_minor_lines: bool,
    pub effects: bool,
    pub antialias: bool,
    /// Render-target scale relative to the window.
    pub resolution_scale: f32,
}

const FULL: QualitySettings = QualitySettings {
    terrain_segments: 256,
    shadows: true,
    shadow_map_size: 2048,
    dynamic_lighting: true,
    grid: true,
    grid_minor_lines: true,
    effects: true,
    antialias: true,
    resolution_scale: 1.0,
};

const BALANCED: QualitySettings = QualitySettings {
    terrain_segments: 128,
    shadows: true,
    shadow_map_size: 1024,
    dynamic_lighting: true,
    grid: true,
    grid_minor_lines: true,
    effects: true,
    antialias: true,
    resolution_scale: 1.0,
};

const PERFORMANCE: QualitySettings = QualitySettings {
    terrain_segments: 64,
    shadows: false,
    shadow_map_size: 512,
    dynamic_lighting: false,
    grid: true,
    grid_minor_lines: false,
    effects: false,
    antialias: false,
    resolution_scale: 0.75,
};

const EMERGENCY: QualitySettings = QualitySettings {
    terrain_segments: 32,
    shadows: false,
    shadow_map_size: 256,
    dynamic_lighting: false,
    grid: false,
    grid_minor_lines: false,
    effects: false,
    antialias: false,
    resolution_scale: 0.5,
};

impl QualityLevel {
    pub const ALL: [QualityLevel; 4] = [
        QualityLevel::Full,
        QualityLevel::Balanced,
        QualityLevel::Performance,
        QualityLevel::Emergency,
    ];

    pub fn settings(self) -> &'static QualitySettings {
        match self {
            QualityLevel::Full => &FULL,
            QualityLevel::Balanced => &BALANCED,
            QualityLevel::Performance => &PERFORMANCE,
            QualityLevel::Emergency => &EMERGENCY,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            QualityLevel::Full => "FULL",
            QualityLevel::Balanced => "BALANCED",
            QualityLevel::Performance => "PERFORMANCE",
            QualityLevel::Emergency => "EMERGENCY",
        }
    }
}

impl fmt::Display for QualityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QualityLevel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "full" => Ok(QualityLevel::Full),
            "balanced" => Ok(QualityLevel::Balanced),
            "performance" => Ok(QualityLevel::Performance),
            "emergency" => Ok(QualityLevel::Emergency),
            _ => Err(Error::UnknownQualityLevel(s.to_string())),
        }
    }
}

/// Combines GPU tier and telemetry into a score in [0, 100].
///
/// FPS penalties only apply once at least one frame has been recorded.
pub fn performance_score(gpu: Option<&GpuClassification>, metrics: &FrameMetrics) -> f32 {
    let mut score = 100.0;

    if let Some(gpu) = gpu {
        score += gpu.score;
    }

    if metrics.frames_recorded > 0 {
        let avg_fps = metrics.fps.rolling60;
        if avg_fps < SCORE_TARGET_FPS {
            score -= 2.0 * (SCORE_TARGET_FPS - avg_fps);
        }
        if avg_fps < 30.0 {
            score -= 20.0;
        }
        if metrics.frame_time.consistency < 0.7 {
            score -= 15.0;
        }
    }

    if metrics.memory.growth_mb_per_min > 2.0 {
        score -= 10.0;
    }

    score -= match metrics.memory.pressure {
        MemoryPressure::High => 15.0,
        MemoryPressure::Medium => 5.0,
        MemoryPressure::Low => 0.0,
    };

    score += match metrics.trend {
        Trend::Degrading => -10.0,
        Trend::Improving => 5.0,
        Trend::Stable | Trend::Unknown => 0.0,
    };

    if gpu.is_none() {
        score = score.max(UNRESOLVED_GPU_FLOOR);
    }

    if score.is_nan() {
        return 0.0;
    }
    score.clamp(0.0, 100.0)
}

/// Maps a score to a level. Weak GPUs use stricter thresholds and never reach
/// `Full`.
pub fn recommended_level(score: f32, tier: Option<GpuTier>) -> QualityLevel {
    if tier.is_some_and(GpuTier::is_weak) {
        if score >= 95.0 {
            QualityLevel::Balanced
        } else if score >= 70.0 {
            QualityLevel::Performance
        } else {
            QualityLevel::Emergency
        }
    } else if score >= 85.0 {
        QualityLevel::Full
    } else if score >= 65.0 {
        QualityLevel::Balanced
    } else if score >= 45.0 {
        QualityLevel::Performance
    } else {
        QualityLevel::Emergency
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu_tier::{classify, GpuDescriptor};
    use crate::telemetry::{FpsMetrics, FrameTimeMetrics, MemoryMetrics};
    use proptest::prelude::*;

    fn metrics(fps: f32, consistency: f32, growth: f32, pressure: MemoryPressure, trend: Trend) -> FrameMetrics {
        FrameMetrics {
            fps: FpsMetrics {
                current: fps,
                rolling60: fps,
                rolling300: fps,
            },
            trend,
            frame_time: FrameTimeMetrics {
                average_ms: 1000.0 / fps.max(1.0),
                p95_ms: 1000.0 / fps.max(1.0),
                consistency,
            },
            memory: MemoryMetrics {
                used_mb: None,
                growth_mb_per_min: growth,
                pressure,
            },
            frames_recorded: 1,
        }
    }

    fn gpu(renderer: &str) -> GpuClassification {
        classify(Some(&GpuDescriptor::new(renderer, "test")))
    }

    #[test]
    fn healthy_high_end_scores_full() {
        let g = gpu("NVIDIA GeForce RTX 4080");
        let s = performance_score(Some(&g), &metrics(60.0, 1.0, 0.0, MemoryPressure::Low, Trend::Stable));
        assert_eq!(s, 100.0);
        assert_eq!(recommended_level(s, Some(g.tier)), QualityLevel::Full);
    }

    #[test]
    fn low_fps_stacks_penalties() {
        let g = gpu("NVIDIA GeForce RTX 4080");
        // 100 - 2*(60-25) - 20 - 15 = -5 → clamped.
        let s = performance_score(Some(&g), &metrics(25.0, 0.5, 0.0, MemoryPressure::Low, Trend::Stable));
        assert_eq!(s, 0.0);
    }

    #[test]
    fn memory_and_trend_adjustments() {
        let g = gpu("NVIDIA GeForce RTX 4080");
        let s = performance_score(Some(&g), &metrics(60.0, 1.0, 3.0, MemoryPressure::Medium, Trend::Degrading));
        assert_eq!(s, 75.0);
        let s = performance_score(Some(&g), &metrics(55.0, 1.0, 0.0, MemoryPressure::Low, Trend::Improving));
        assert_eq!(s, 95.0);
    }

    #[test]
    fn weak_gpus_never_reach_full() {
        assert_eq!(recommended_level(100.0, Some(GpuTier::Legacy)), QualityLevel::Balanced);
        assert_eq!(recommended_level(80.0, Some(GpuTier::Integrated)), QualityLevel::Performance);
        assert_eq!(recommended_level(69.9, Some(GpuTier::Legacy)), QualityLevel::Emergency);
    }

    #[test]
    fn standard_thresholds() {
        assert_eq!(recommended_level(85.0, Some(GpuTier::MidRange)), QualityLevel::Full);
        assert_eq!(recommended_level(65.0, None), QualityLevel::Balanced);
        assert_eq!(recommended_level(45.0, Some(GpuTier::HighEnd)), QualityLevel::Performance);
        assert_eq!(recommended_level(44.9, Some(GpuTier::HighEnd)), QualityLevel::Emergency);
    }

    #[test]
    fn unresolved_gpu_has_floor() {
        let s = performance_score(None, &metrics(10.0, 0.0, 10.0, MemoryPressure::High, Trend::Degrading));
        assert_eq!(s, UNRESOLVED_GPU_FLOOR);
    }

    #[test]
    fn parses_level_names() {
        assert_eq!("Balanced".parse::<QualityLevel>().unwrap(), QualityLevel::Balanced);
        assert!("ultra".parse::<QualityLevel>().is_err());
    }

    fn pressure() -> impl Strategy<Value = MemoryPressure> {
        prop_oneof![
            Just(MemoryPressure::Low),
            Just(MemoryPressure::Medium),
            Just(MemoryPressure::High)
        ]
    }

    fn trend() -> impl Strategy<Value = Trend> {
        prop_oneof![
            Just(Trend::Improving),
            Just(Trend::Stable),
            Just(Trend::Degrading),
            Just(Trend::Unknown)
        ]
    }

    fn tier() -> impl Strategy<Value = Option<GpuTier>> {
        prop_oneof![
            Just(None),
            Just(Some(GpuTier::HighEnd)),
            Just(Some(GpuTier::MidRange)),
            Just(Some(GpuTier::Legacy)),
            Just(Some(GpuTier::Integrated))
        ]
    }

    proptest! {
        #[test]
        fn score_is_always_clamped(
            fps in 0.0f32..500.0,
            consistency in 0.0f32..=1.0,
            growth in -50.0f32..50.0,
            p in pressure(),
            tr in trend(),
            t in tier(),
        ) {
            let g = t.map(|tier| GpuClassification {
                tier,
                score: tier.score(),
                renderer: String::new(),
                vendor: String::new(),
                matched: None,
            });
            let s = performance_score(g.as_ref(), &metrics(fps, consistency, growth, p, tr));
            prop_assert!((0.0..=100.0).contains(&s));
        }
    }
}
