//! The instanced point engine: CPU staging for hit testing plus the GPU mesh
//! that draws it.

use crate::renderer::pipelines::markers::{largest_stream_bytes, GpuMarkerMesh, MarkerUniforms};
use anyhow::{bail, Result};
use marker_core::{AsRenderPoint, CameraView, EngineConfig, InstanceStaging, PointHit, Raycaster};

pub struct PointRenderingEngine<U> {
    staging: InstanceStaging<U>,
    gpu: Option<GpuMarkerMesh>,
    global_scale: f32,
    disposed: bool,
}

impl<U: Clone> PointRenderingEngine<U> {
    pub fn new(
        device: &wgpu::Device,
        color_fmt: wgpu::TextureFormat,
        depth_fmt: wgpu::TextureFormat,
        config: &EngineConfig,
    ) -> Result<Self> {
        let mut engine = Self::headless(config)?;
        check_buffer_limit(config.max_points, device.limits().max_buffer_size)?;
        engine.gpu = Some(GpuMarkerMesh::new(device, color_fmt, depth_fmt, config.max_points));
        log::info!("Point engine ready | capacity={}", config.max_points);
        Ok(engine)
    }

    /// CPU-only engine: staging and hit testing without GPU buffers.
    pub fn headless(config: &EngineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            staging: InstanceStaging::new(config.max_points)?,
            gpu: None,
            global_scale: config.global_scale,
            disposed: false,
        })
    }

    /// Encodes up to `max_points` points. Anything beyond capacity is dropped.
    pub fn update_points<P: AsRenderPoint>(&mut self, points: &[P]) -> usize {
        if self.disposed {
            return 0;
        }
        self.staging.update_points(points)
    }

    /// Pushes dirty attributes and the camera uniforms to the GPU.
    pub fn upload(&mut self, queue: &wgpu::Queue, camera: &CameraView) {
        let Some(gpu) = self.gpu.as_mut() else {
            return;
        };
        let dirty = self.staging.take_dirty();
        if !dirty.is_empty() {
            gpu.write(queue, &self.staging, dirty);
        }
        gpu.write_uniforms(
            queue,
            &MarkerUniforms::new(camera.view_proj(), camera.view, camera.position, self.global_scale),
        );
    }

    pub fn draw<'a>(&'a self, rpass: &mut wgpu::RenderPass<'a>) {
        if let Some(gpu) = &self.gpu {
            gpu.draw(rpass);
        }
    }

    /// Releases GPU buffers and stops drawing. Safe to call repeatedly.
    pub fn dispose(&mut self) {
        if let Some(gpu) = self.gpu.take() {
            gpu.destroy();
            log::debug!("Point engine GPU resources released");
        }
        if !self.disposed {
            self.staging.update_points::<marker_core::RenderPoint>(&[]);
            self.staging.clear_user_data();
            self.disposed = true;
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    pub fn set_point_user_data(&mut self, index: usize, data: U) -> bool {
        self.staging.set_point_user_data(index, data)
    }

    pub fn clear_user_data(&mut self) {
        self.staging.clear_user_data();
    }

    pub fn get_intersections(&self, raycaster: &Raycaster) -> Vec<PointHit<U>> {
        self.staging.get_intersections(raycaster)
    }

    pub fn count(&self) -> usize {
        self.staging.count()
    }

    pub fn max_points(&self) -> usize {
        self.staging.max_points()
    }

    pub fn global_scale(&self) -> f32 {
        self.global_scale
    }

    pub fn set_global_scale(&mut self, scale: f32) {
        if scale.is_finite() && scale > 0.0 {
            self.global_scale = scale;
        }
    }
}

/// Fails when the instance streams for `max_points` would not fit in a
/// single device buffer.
fn check_buffer_limit(max_points: usize, max_buffer_size: u64) -> Result<()> {
    let needed = largest_stream_bytes(max_points);
    if needed > max_buffer_size {
        bail!(
            "capacity of {} markers needs {} byte instance buffers, device allows {}",
            max_points,
            needed,
            max_buffer_size
        );
    }
    Ok(())
}

impl<U> Drop for PointRenderingEngine<U> {
    fn drop(&mut self) {
        if let Some(gpu) = self.gpu.take() {
            gpu.destroy();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;
    use marker_core::{Ray, RenderPoint};

    fn engine(max_points: usize) -> PointRenderingEngine<&'static str> {
        PointRenderingEngine::headless(&EngineConfig {
            max_points,
            ..EngineConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn rejects_zero_capacity() {
        assert!(PointRenderingEngine::<()>::headless(&EngineConfig {
            max_points: 0,
            ..EngineConfig::default()
        })
        .is_err());
    }

    #[test]
    fn capacity_must_fit_device_buffers() {
        let default_limit = wgpu::Limits::default().max_buffer_size;
        assert!(check_buffer_limit(10_000, default_limit).is_ok());
        assert_eq!(largest_stream_bytes(1000), 12_000);
        assert!(check_buffer_limit(1000, 11_999).is_err());
        assert!(check_buffer_limit(30_000_000, default_limit).is_err());
        assert!(PointRenderingEngine::<()>::headless(&EngineConfig {
            max_points: 30_000_000,
            ..EngineConfig::default()
        })
        .is_err());
    }

    #[test]
    fn update_truncates_to_capacity() {
        let mut e = engine(8);
        let points: Vec<RenderPoint> = (0..20).map(|i| RenderPoint::new(Vec3::new(i as f32, 0.0, 0.0))).collect();
        assert_eq!(e.update_points(&points), 8);
        assert_eq!(e.count(), 8);
        assert!(e.count() <= e.max_points());
        assert_eq!(e.update_points(&points[..3]), 3);
    }

    #[test]
    fn hit_carries_user_data() {
        let mut e = engine(4);
        e.update_points(&[
            RenderPoint::new(Vec3::new(0.0, 0.0, -10.0)),
            RenderPoint::new(Vec3::new(0.0, 0.0, -30.0)),
        ]);
        assert!(e.set_point_user_data(1, "far"));
        assert!(!e.set_point_user_data(4, "out of range"));

        let hits = e.get_intersections(&Raycaster::new(Ray::new(Vec3::ZERO, Vec3::NEG_Z)));
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].instance_id, 0);
        assert_eq!(hits[0].user_data, None);
        assert_eq!(hits[1].user_data, Some("far"));

        e.clear_user_data();
        let hits = e.get_intersections(&Raycaster::new(Ray::new(Vec3::ZERO, Vec3::NEG_Z)));
        assert!(hits.iter().all(|h| h.user_data.is_none()));
    }

    #[test]
    fn dispose_twice_is_a_no_op() {
        let mut e = engine(4);
        e.update_points(&[RenderPoint::new(Vec3::ZERO)]);
        e.dispose();
        assert!(e.is_disposed());
        assert_eq!(e.count(), 0);

        e.dispose();
        assert!(e.is_disposed());
        assert_eq!(e.count(), 0);
        assert_eq!(e.update_points(&[RenderPoint::new(Vec3::ZERO)]), 0);
    }

    #[test]
    fn global_scale_ignores_bad_values() {
        let mut e = engine(1);
        e.set_global_scale(2.5);
        e.set_global_scale(-1.0);
        e.set_global_scale(f32::NAN);
        assert_eq!(e.global_scale(), 2.5);
    }
}
