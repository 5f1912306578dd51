//! One-shot GPU tier classification from the adapter's renderer string.

use std::fmt;

/// Coarse performance class of the graphics adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GpuTier {
    HighEnd,
    MidRange,
    Legacy,
    Integrated,
}

impl GpuTier {
    /// Adjustment applied to the performance score.
    #[inline]
    pub fn score(self) -> f32 {
        match self {
            GpuTier::HighEnd => 0.0,
            GpuTier::MidRange => -5.0,
            GpuTier::Legacy => -15.0,
            GpuTier::Integrated => -25.0,
        }
    }

    /// Weak tiers get the stricter quality thresholds.
    #[inline]
    pub fn is_weak(self) -> bool {
        matches!(self, GpuTier::Legacy | GpuTier::Integrated)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            GpuTier::HighEnd => "high-end",
            GpuTier::MidRange => "mid-range",
            GpuTier::Legacy => "legacy",
            GpuTier::Integrated => "integrated",
        }
    }
}

impl fmt::Display for GpuTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Renderer/vendor strings reported by the graphics context.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct GpuDescriptor {
    pub renderer: String,
    pub vendor: String,
}

impl GpuDescriptor {
    pub fn new(renderer: impl Into<String>, vendor: impl Into<String>) -> Self {
        Self {
            renderer: renderer.into(),
            vendor: vendor.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GpuClassification {
    pub tier: GpuTier,
    pub score: f32,
    pub renderer: String,
    pub vendor: String,
    /// Table pattern that decided the tier, if any.
    pub matched: Option<&'static str>,
}

/// Ordered substring table; first match wins. Patterns are upper-case and
/// compared against the upper-cased renderer string.
const TIER_PATTERNS: &[(&str, GpuTier)] = &[
    ("RTX 50", GpuTier::HighEnd),
    ("RTX 40", GpuTier::HighEnd),
    ("RTX 30", GpuTier::HighEnd),
    ("RX 9", GpuTier::HighEnd),
    ("RX 7", GpuTier::HighEnd),
    ("RX 6", GpuTier::HighEnd),
    ("APPLE M", GpuTier::MidRange),
    ("RTX 20", GpuTier::MidRange),
    ("GTX 16", GpuTier::MidRange),
    ("GTX 10", GpuTier::MidRange),
    ("RX 5", GpuTier::MidRange),
    ("ARC(TM) A", GpuTier::MidRange),
    ("ARC A", GpuTier::MidRange),
    ("GTX 9", GpuTier::Legacy),
    ("GTX 7", GpuTier::Legacy),
    ("GTX 6", GpuTier::Legacy),
    ("GT ", GpuTier::Legacy),
    ("RADEON HD", GpuTier::Legacy),
    ("RADEON R", GpuTier::Legacy),
    ("QUADRO", GpuTier::Legacy),
    ("INTEL", GpuTier::Integrated),
    ("UHD GRAPHICS", GpuTier::Integrated),
    ("IRIS", GpuTier::Integrated),
    ("VEGA 8", GpuTier::Integrated),
    ("MALI", GpuTier::Integrated),
    ("ADRENO", GpuTier::Integrated),
    ("POWERVR", GpuTier::Integrated),
    ("LLVMPIPE", GpuTier::Integrated),
    ("SWIFTSHADER", GpuTier::Integrated),
    ("BASIC RENDER", GpuTier::Integrated),
];

/// Matches a renderer string against the tier table. Unmatched strings are
/// treated as legacy hardware.
pub fn classify_renderer(renderer: &str) -> (GpuTier, Option<&'static str>) {
    let upper = renderer.to_ascii_uppercase();
    TIER_PATTERNS
        .iter()
        .find(|(pattern, _)| upper.contains(pattern))
        .map(|(pattern, tier)| (*tier, Some(*pattern)))
        .unwrap_or((GpuTier::Legacy, None))
}

/// Classifies the adapter. `None` means no graphics context could be created,
/// which fails closed to the weakest tier.
pub fn classify(descriptor: Option<&GpuDescriptor>) -> GpuClassification {
    let Some(desc) = descriptor else {
        log::warn!("No graphics context available; assuming integrated-class GPU.");
        return GpuClassification {
            tier: GpuTier::Integrated,
            score: GpuTier::Integrated.score(),
            renderer: "Unavailable".to_string(),
            vendor: "Unavailable".to_string(),
            matched: None,
        };
    };

    let renderer = if desc.renderer.trim().is_empty() {
        "Unknown".to_string()
    } else {
        desc.renderer.clone()
    };
    let vendor = if desc.vendor.trim().is_empty() {
        "Unknown".to_string()
    } else {
        desc.vendor.clone()
    };

    let (tier, matched) = classify_renderer(&renderer);
    match matched {
        Some(pattern) => log::info!("GPU '{}' ({}) classified {} via '{}'", renderer, vendor, tier, pattern),
        None => log::warn!("GPU '{}' ({}) not recognised; defaulting to {}", renderer, vendor, tier),
    }

    GpuClassification {
        tier,
        score: tier.score(),
        renderer,
        vendor,
        matched,
    }
}
