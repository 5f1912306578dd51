//! CPU mirror of the five per-instance attribute buffers.
//!
//! The GPU side only ever uploads what this staging area holds; it is also the
//! source of truth for ray hit testing, which keeps picking independent of any
//! GPU readback.

use crate::error::{Error, Result};
use crate::marker::RenderPoint;
use crate::view::Raycaster;
use glam::Vec3;
use serde::Deserialize;
use std::ops::{BitOr, BitOrAssign};

/// World-space radius of the bounding sphere used for picking. Not derived
/// from the instance's rendered size.
pub const HIT_RADIUS: f32 = 2.0;

/// Anything the engine can encode into an instance slot.
pub trait AsRenderPoint {
    fn render_point(&self) -> RenderPoint;
}

impl AsRenderPoint for RenderPoint {
    #[inline]
    fn render_point(&self) -> RenderPoint {
        *self
    }
}

/// Bit set over the attribute buffers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AttributeMask(u8);

impl AttributeMask {
    pub const NONE: AttributeMask = AttributeMask(0);
    pub const POSITION: AttributeMask = AttributeMask(1 << 0);
    pub const COLOR: AttributeMask = AttributeMask(1 << 1);
    pub const SCALE: AttributeMask = AttributeMask(1 << 2);
    pub const STYLE: AttributeMask = AttributeMask(1 << 3);
    pub const STATE: AttributeMask = AttributeMask(1 << 4);
    pub const ALL: AttributeMask = AttributeMask(0b1_1111);

    #[inline]
    pub fn contains(self, other: AttributeMask) -> bool {
        self.0 & other.0 == other.0
    }

    #[inline]
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for AttributeMask {
    type Output = AttributeMask;

    fn bitor(self, rhs: AttributeMask) -> AttributeMask {
        AttributeMask(self.0 | rhs.0)
    }
}

impl BitOrAssign for AttributeMask {
    fn bitor_assign(&mut self, rhs: AttributeMask) {
        self.0 |= rhs.0;
    }
}

/// Upper bound on instance capacity.
pub const MAX_POINTS: usize = 1_000_000;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub max_points: usize,
    /// Multiplier applied to every instance's scale in the vertex stage.
    pub global_scale: f32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_points: 10_000,
            global_scale: 1.0,
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_points == 0 {
            return Err(Error::ZeroCapacity);
        }
        if self.max_points > MAX_POINTS {
            return Err(Error::CapacityTooLarge {
                got: self.max_points,
                max: MAX_POINTS,
            });
        }
        Ok(())
    }
}

/// One ray hit against an instance's bounding sphere.
#[derive(Debug, Clone, PartialEq)]
pub struct PointHit<U> {
    /// Distance along the ray to the sphere surface.
    pub distance: f32,
    pub point: Vec3,
    pub index: usize,
    pub instance_id: usize,
    pub user_data: Option<U>,
}

/// Fixed-capacity attribute arrays plus per-slot user data.
///
/// Slots at or beyond [`count`](Self::count) hold stale data and are never
/// drawn or hit-tested.
#[derive(Debug, Clone)]
pub struct InstanceStaging<U> {
    max_points: usize,
    count: usize,
    positions: Vec<[f32; 3]>,
    colors: Vec<[f32; 3]>,
    scales: Vec<f32>,
    styles: Vec<f32>,
    states: Vec<f32>,
    user_data: Vec<Option<U>>,
    dirty: AttributeMask,
}

impl<U: Clone> InstanceStaging<U> {
    pub fn new(max_points: usize) -> Result<Self> {
        if max_points == 0 {
            return Err(Error::ZeroCapacity);
        }
        Ok(Self {
            max_points,
            count: 0,
            positions: vec![[0.0; 3]; max_points],
            colors: vec![[1.0; 3]; max_points],
            scales: vec![1.0; max_points],
            styles: vec![0.0; max_points],
            states: vec![0.0; max_points],
            user_data: vec![None; max_points],
            dirty: AttributeMask::NONE,
        })
    }

    /// Re-encodes the first `min(points.len(), max_points)` entries and marks
    /// every buffer dirty. Returns the new active count.
    pub fn update_points<P: AsRenderPoint>(&mut self, points: &[P]) -> usize {
        let n = points.len().min(self.max_points);
        if points.len() > self.max_points {
            log::trace!("Truncating {} points to capacity {}", points.len(), self.max_points);
        }

        for (i, p) in points.iter().take(n).enumerate() {
            let rp = p.render_point();
            self.positions[i] = rp.position.to_array();
            self.colors[i] = rp.color.0;
            self.scales[i] = rp.scale;
            self.styles[i] = rp.style.code();
            self.states[i] = rp.state.code();
        }

        self.count = n;
        self.dirty = AttributeMask::ALL;
        n
    }

    #[inline]
    pub fn count(&self) -> usize {
        self.count
    }

    #[inline]
    pub fn max_points(&self) -> usize {
        self.max_points
    }

    pub fn positions(&self) -> &[[f32; 3]] {
        &self.positions[..self.count]
    }

    pub fn colors(&self) -> &[[f32; 3]] {
        &self.colors[..self.count]
    }

    pub fn scales(&self) -> &[f32] {
        &self.scales[..self.count]
    }

    pub fn styles(&self) -> &[f32] {
        &self.styles[..self.count]
    }

    pub fn states(&self) -> &[f32] {
        &self.states[..self.count]
    }

    /// Active prefix of one attribute as raw bytes for upload. `attr` must be
    /// a single attribute; combined masks yield an empty slice.
    pub fn attribute_bytes(&self, attr: AttributeMask) -> &[u8] {
        match attr {
            AttributeMask::POSITION => bytemuck::cast_slice(self.positions()),
            AttributeMask::COLOR => bytemuck::cast_slice(self.colors()),
            AttributeMask::SCALE => bytemuck::cast_slice(self.scales()),
            AttributeMask::STYLE => bytemuck::cast_slice(self.styles()),
            AttributeMask::STATE => bytemuck::cast_slice(self.states()),
            _ => &[],
        }
    }

    #[inline]
    pub fn dirty(&self) -> AttributeMask {
        self.dirty
    }

    /// Returns and clears the dirty set.
    pub fn take_dirty(&mut self) -> AttributeMask {
        std::mem::take(&mut self.dirty)
    }

    /// Attaches host data to a slot. Returns `false` when `index` is out of
    /// capacity.
    pub fn set_point_user_data(&mut self, index: usize, data: U) -> bool {
        match self.user_data.get_mut(index) {
            Some(slot) => {
                *slot = Some(data);
                true
            }
            None => false,
        }
    }

    pub fn user_data(&self, index: usize) -> Option<&U> {
        self.user_data.get(index).and_then(Option::as_ref)
    }

    pub fn clear_user_data(&mut self) {
        self.user_data.iter_mut().for_each(|d| *d = None);
    }

    /// Ray against a [`HIT_RADIUS`] sphere around every active instance.
    /// Hits are sorted nearest first.
    pub fn get_intersections(&self, raycaster: &Raycaster) -> Vec<PointHit<U>> {
        let ray = &raycaster.ray;
        let mut hits: Vec<PointHit<U>> = self
            .positions()
            .iter()
            .enumerate()
            .filter_map(|(i, p)| {
                let t = ray.intersect_sphere(Vec3::from_array(*p), HIT_RADIUS)?;
                if t < raycaster.near || t > raycaster.far {
                    return None;
                }
                Some(PointHit {
                    distance: t,
                    point: ray.at(t),
                    index: i,
                    instance_id: i,
                    user_data: self.user_data[i].clone(),
                })
            })
            .collect();
        hits.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        hits
    }
}
