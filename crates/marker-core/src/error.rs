use thiserror::Error;

/// Construction-time errors. The per-frame path never returns these.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    #[error("optimizer needs at least one LOD level")]
    NoLodLevels,

    #[error("too many LOD levels: {got} (max {max})")]
    TooManyLodLevels { got: usize, max: usize },

    #[error("target FPS must be positive, got {0}")]
    InvalidTargetFps(f32),

    #[error("pixel size bounds are inverted or non-positive: min={min}, max={max}")]
    InvalidPixelBounds { min: f32, max: f32 },

    #[error("culling distance must be positive, got {0}")]
    InvalidCullingDistance(f32),

    #[error("instance capacity must be non-zero")]
    ZeroCapacity,

    #[error("instance capacity {got} exceeds {max}")]
    CapacityTooLarge { got: usize, max: usize },

    #[error("memory budget must be non-zero")]
    ZeroMemoryBudget,

    #[error("grid cell size must be positive, got {0}")]
    InvalidCellSize(f32),

    #[error("unrecognised color '{0}'")]
    InvalidColor(String),

    #[error("unknown quality level '{0}'")]
    UnknownQualityLevel(String),
}

pub type Result<T> = std::result::Result<T, Error>;
