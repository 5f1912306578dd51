//! CPU side of the terrain marker renderer.
//!
//! This library holds everything that decides *what* gets drawn each frame:
//! - GPU tier classification from the adapter's renderer string.
//! - Rolling frame telemetry and the adaptive quality-level controller.
//! - The screen-space optimizer (culling, LOD, adaptive sizing, priority).
//! - The CPU mirror of the instance buffers, including ray hit testing.
//!
//! Nothing here touches the GPU; `land_viewer` uploads the results.

pub mod error;
pub mod gpu_tier;
pub mod instances;
pub mod marker;
pub mod monitor;
pub mod optimizer;
pub mod quality;
pub mod spatial_grid;
pub mod telemetry;
pub mod view;

pub use error::{Error, Result};
pub use gpu_tier::{classify, GpuClassification, GpuDescriptor, GpuTier};
pub use instances::{AsRenderPoint, AttributeMask, EngineConfig, InstanceStaging, PointHit, HIT_RADIUS, MAX_POINTS};
pub use marker::{Marker, MarkerKind, MarkerState, MarkerStyle, RenderPoint, Rgb};
pub use monitor::{
    MonitorConfig, PendingTransition, PerformanceMonitor, QualityLevelName, QualityTransition, TransitionReason,
};
pub use optimizer::{
    LodLevel, MarkerDetail, OptimizationStats, OptimizedPoint, OptimizerConfig, ScreenSpaceOptimizer,
    MAX_LOD_LEVELS,
};
pub use quality::{QualityLevel, QualitySettings};
pub use spatial_grid::{GridPosition, SpatialGrid};
pub use telemetry::{FrameMetrics, FrameTelemetry, MemoryPressure, MemoryProbe, MemorySample, NoMemoryProbe, Trend};
pub use view::{CameraView, Frustum, Ray, Raycaster, ViewportSize};
