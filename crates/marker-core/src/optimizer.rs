//! Screen-space marker optimizer.
//!
//! One [`ScreenSpaceOptimizer::optimize_points`] call per frame turns the
//! host's marker list into the annotated, priority-sorted subset worth drawing.
//! Passes, in order:
//!
//! 1. distance cull, then frustum cull;
//! 2. LOD classification and deterministic density thinning;
//! 3. adaptive screen-space size and render priority;
//! 4. sort by priority, then thin or enrich depending on the optimizer's own
//!    rolling cost against the frame budget;
//! 5. rebuild the spatial grid from the result.

use crate::error::{Error, Result};
use crate::instances::AsRenderPoint;
use crate::marker::{Marker, MarkerKind, MarkerState, MarkerStyle, RenderPoint, Rgb};
use crate::spatial_grid::{GridPosition, SpatialGrid};
use crate::telemetry::RollingWindow;
use crate::view::{CameraView, Frustum, ViewportSize};
use glam::Vec3;
use serde::Deserialize;
use std::time::Instant;

/// Samples of optimizer cost kept for the dynamic mode.
pub const PASS_HISTORY: usize = 60;

/// Above this multiple of the frame budget the optimizer thins aggressively.
const THIN_ABOVE: f32 = 1.2;
/// Below this multiple of the frame budget it spends headroom on detail.
const ENHANCE_BELOW: f32 = 0.8;

/// Beyond this the doubling distance bands stop being meaningful.
pub const MAX_LOD_LEVELS: usize = 16;

const KEEP_PRIORITY: f32 = 0.8;
const THIN_HALF_BEYOND: f32 = 50.0;
const THIN_THIRD_BEYOND: f32 = 100.0;
const ENHANCE_WITHIN: f32 = 30.0;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct OptimizerConfig {
    pub min_pixel_size: f32,
    pub max_pixel_size: f32,
    pub base_pixel_size: f32,
    pub culling_distance: f32,
    pub lod_levels: usize,
    pub frustum_culling: bool,
    /// Accepted for config compatibility; no occlusion pass exists.
    pub occlusion_culling: bool,
    pub dynamic_lod: bool,
    pub target_fps: f32,
    pub grid_cell_size: f32,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            min_pixel_size: 2.0,
            max_pixel_size: 48.0,
            base_pixel_size: 12.0,
            culling_distance: 1000.0,
            lod_levels: 4,
            frustum_culling: true,
            occlusion_culling: false,
            dynamic_lod: true,
            target_fps: 60.0,
            grid_cell_size: 50.0,
        }
    }
}

impl OptimizerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.lod_levels == 0 {
            return Err(Error::NoLodLevels);
        }
        if self.lod_levels > MAX_LOD_LEVELS {
            return Err(Error::TooManyLodLevels {
                got: self.lod_levels,
                max: MAX_LOD_LEVELS,
            });
        }
        if !(self.target_fps.is_finite() && self.target_fps > 0.0) {
            return Err(Error::InvalidTargetFps(self.target_fps));
        }
        let (min, max) = (self.min_pixel_size, self.max_pixel_size);
        if !(min > 0.0 && max.is_finite() && min <= max) || !(self.base_pixel_size > 0.0) {
            return Err(Error::InvalidPixelBounds { min, max });
        }
        if !(self.culling_distance > 0.0) {
            return Err(Error::InvalidCullingDistance(self.culling_distance));
        }
        if !(self.grid_cell_size.is_finite() && self.grid_cell_size > 0.0) {
            return Err(Error::InvalidCellSize(self.grid_cell_size));
        }
        Ok(())
    }

    /// Frame budget in milliseconds.
    #[inline]
    pub fn target_frame_ms(&self) -> f32 {
        1000.0 / self.target_fps
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkerDetail {
    Detailed,
    Simple,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LodLevel {
    pub level: usize,
    /// Points closer than this belong to the level.
    pub distance_threshold: f32,
    pub size_multiplier: f32,
    pub quality_level: u32,
    /// Keep one point in `density_reduction` at this level.
    pub density_reduction: u32,
    pub marker_detail: MarkerDetail,
}

impl LodLevel {
    /// Doubling distance bands starting at 20 units.
    pub fn build(count: usize) -> Vec<LodLevel> {
        (0..count)
            .map(|i| LodLevel {
                level: i,
                distance_threshold: 20.0 * 2f32.powi(i as i32),
                size_multiplier: (1.0 - 0.2 * i as f32).max(0.2),
                quality_level: (count - i) as u32,
                density_reduction: 1u32.checked_shl(i as u32).unwrap_or(u32::MAX),
                marker_detail: if i < count / 2 {
                    MarkerDetail::Detailed
                } else {
                    MarkerDetail::Simple
                },
            })
            .collect()
    }
}

/// A marker that survived optimization, annotated for rendering.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OptimizedPoint {
    pub position: Vec3,
    pub color: Rgb,
    /// Author scale times the LOD size multiplier.
    pub scale: f32,
    /// Style requested by the host.
    pub style: MarkerStyle,
    pub state: MarkerState,
    pub kind: MarkerKind,
    pub distance: f32,
    pub lod_level: usize,
    /// Clip-space height, i.e. pixels / viewport height.
    pub screen_space_size: f32,
    pub quality: u32,
    /// Glyph actually drawn; simplified at coarse LOD tiers.
    pub marker_style: MarkerStyle,
    pub priority: f32,
    /// Index of the marker in the input slice.
    pub source_index: usize,
}

impl GridPosition for OptimizedPoint {
    #[inline]
    fn grid_position(&self) -> Vec3 {
        self.position
    }
}

impl AsRenderPoint for OptimizedPoint {
    fn render_point(&self) -> RenderPoint {
        RenderPoint {
            position: self.position,
            color: self.color,
            scale: self.scale,
            style: self.marker_style,
            state: self.state,
        }
    }
}

/// Counters for one pass.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct OptimizationStats {
    pub input: usize,
    pub malformed: usize,
    pub distance_culled: usize,
    pub frustum_culled: usize,
    pub density_skipped: usize,
    pub too_small: usize,
    pub thinned: usize,
    pub enhanced: usize,
    pub output: usize,
    pub elapsed_ms: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DynamicMode {
    Thin,
    Enhance,
    Hold,
}

pub struct ScreenSpaceOptimizer {
    config: OptimizerConfig,
    lod_levels: Vec<LodLevel>,
    grid: SpatialGrid<OptimizedPoint>,
    pass_times: RollingWindow,
    last_stats: OptimizationStats,
}

impl ScreenSpaceOptimizer {
    pub fn new(config: OptimizerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            lod_levels: LodLevel::build(config.lod_levels),
            grid: SpatialGrid::new(config.grid_cell_size)?,
            pass_times: RollingWindow::new(PASS_HISTORY),
            last_stats: OptimizationStats::default(),
            config,
        })
    }

    pub fn config(&self) -> &OptimizerConfig {
        &self.config
    }

    pub fn lod_levels(&self) -> &[LodLevel] {
        &self.lod_levels
    }

    pub fn spatial_grid(&self) -> &SpatialGrid<OptimizedPoint> {
        &self.grid
    }

    pub fn last_stats(&self) -> OptimizationStats {
        self.last_stats
    }

    /// Rolling mean of recorded pass times, or `None` before the first pass.
    pub fn average_frame_time_ms(&self) -> Option<f32> {
        (!self.pass_times.is_empty()).then(|| self.pass_times.mean())
    }

    /// Feeds an externally measured time into the history that drives the
    /// dynamic mode.
    pub fn record_frame_time(&mut self, ms: f32) {
        if ms.is_finite() && ms >= 0.0 {
            self.pass_times.push(ms);
        }
    }

    /// Linear scan over ascending thresholds; anything beyond the last band
    /// lands in the coarsest level.
    pub fn classify_lod(&self, distance: f32) -> &LodLevel {
        let last = self.lod_levels.len() - 1;
        let idx = self
            .lod_levels
            .iter()
            .position(|l| distance < l.distance_threshold)
            .unwrap_or(last);
        &self.lod_levels[idx]
    }

    pub fn optimize_points(
        &mut self,
        points: &[Marker],
        camera: &CameraView,
        viewport: ViewportSize,
    ) -> Vec<OptimizedPoint> {
        let started = Instant::now();
        let mut stats = OptimizationStats {
            input: points.len(),
            ..OptimizationStats::default()
        };

        let frustum = self
            .config
            .frustum_culling
            .then(|| Frustum::from_view_proj(camera.view_proj()));

        let height = viewport.height_px();
        let min_size = self.config.min_pixel_size / height;
        let max_size = self.config.max_pixel_size / height;
        let half_fov_tan = {
            let t = (camera.fov_y * 0.5).tan();
            if t.is_finite() {
                t
            } else {
                0.0
            }
        };

        let mut out = Vec::with_capacity(points.len().min(4096));

        for (source_index, marker) in points.iter().enumerate() {
            let Some(position) = marker.valid_position() else {
                stats.malformed += 1;
                continue;
            };

            let distance = position.distance(camera.position);
            if !(distance <= self.config.culling_distance) {
                stats.distance_culled += 1;
                continue;
            }

            if let Some(f) = &frustum {
                if !f.contains_point(position) {
                    stats.frustum_culled += 1;
                    continue;
                }
            }

            let lod = *self.classify_lod(distance);

            if lod.density_reduction > 1 && position_hash(position) % lod.density_reduction != 0 {
                stats.density_skipped += 1;
                continue;
            }

            let raw = self.config.base_pixel_size * lod.size_multiplier / height * 2.0 * distance * half_fov_tan;
            let size = raw.clamp(min_size, max_size);
            if !(size >= min_size) {
                stats.too_small += 1;
                continue;
            }

            let size_factor = (size / max_size).clamp(0.0, 1.0);
            let distance_factor = (1.0 - distance / self.config.culling_distance).max(0.1);
            let priority = size_factor * distance_factor * marker.kind.priority_weight();

            let marker_style = match lod.marker_detail {
                MarkerDetail::Detailed => marker.style,
                MarkerDetail::Simple => marker.style.simplified(),
            };

            out.push(OptimizedPoint {
                position,
                color: marker.color.unwrap_or(Rgb::WHITE),
                scale: marker.scale.filter(|s| s.is_finite()).unwrap_or(1.0) * lod.size_multiplier,
                style: marker.style,
                state: marker.state,
                kind: marker.kind,
                distance,
                lod_level: lod.level,
                screen_space_size: size,
                quality: lod.quality_level,
                marker_style,
                priority,
                source_index,
            });
        }

        out.sort_by(|a, b| b.priority.total_cmp(&a.priority));

        match self.dynamic_mode() {
            DynamicMode::Thin => {
                let before = out.len();
                out = thin(out);
                stats.thinned = before - out.len();
            }
            DynamicMode::Enhance => {
                stats.enhanced = enhance(&mut out, self.lod_levels.len() as u32);
            }
            DynamicMode::Hold => {}
        }

        self.grid.update_points(&out);

        let elapsed_ms = started.elapsed().as_secs_f32() * 1000.0;
        self.pass_times.push(elapsed_ms);

        stats.output = out.len();
        stats.elapsed_ms = elapsed_ms;
        self.last_stats = stats;
        log::trace!("optimize_points: {:?}", stats);

        out
    }

    fn dynamic_mode(&self) -> DynamicMode {
        if !self.config.dynamic_lod {
            return DynamicMode::Hold;
        }
        let Some(avg) = self.average_frame_time_ms() else {
            return DynamicMode::Hold;
        };
        let budget = self.config.target_frame_ms();
        if avg > budget * THIN_ABOVE {
            DynamicMode::Thin
        } else if avg < budget * ENHANCE_BELOW {
            DynamicMode::Enhance
        } else {
            DynamicMode::Hold
        }
    }
}

/// Spatial hash on the integer cell of the position. Deterministic across
/// frames so a static point is either always kept or always skipped.
#[inline]
fn position_hash(p: Vec3) -> u32 {
    let q = p.floor();
    let (x, y, z) = (q.x as i32, q.y as i32, q.z as i32);
    (x.wrapping_mul(73_856_093) ^ y.wrapping_mul(19_349_663) ^ z.wrapping_mul(83_492_791)) as u32
}

fn thin(points: Vec<OptimizedPoint>) -> Vec<OptimizedPoint> {
    points
        .into_iter()
        .enumerate()
        .filter(|(i, p)| {
            if p.priority > KEEP_PRIORITY {
                true
            } else if p.distance > THIN_THIRD_BEYOND {
                i % 3 == 0
            } else if p.distance > THIN_HALF_BEYOND {
                i % 2 == 0
            } else {
                true
            }
        })
        .map(|(_, p)| p)
        .collect()
}

fn enhance(points: &mut [OptimizedPoint], max_quality: u32) -> usize {
    let mut n = 0;
    for p in points.iter_mut().filter(|p| p.distance < ENHANCE_WITHIN) {
        p.quality = (p.quality + 1).min(max_quality);
        p.marker_style = p.style;
        n += 1;
    }
    n
}
