//! Camera, viewport and ray types shared by the optimizer and hit testing.
//!
//! Projection matrices follow the wgpu convention produced by
//! `Mat4::perspective_rh`: right-handed view space, clip depth in [0, 1].

use glam::{Mat4, Vec2, Vec3, Vec4};

/// Drawable size of the render target in physical pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViewportSize {
    pub width: u32,
    pub height: u32,
}

impl ViewportSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Height as f32, never below one pixel.
    #[inline]
    pub fn height_px(&self) -> f32 {
        self.height.max(1) as f32
    }

    #[inline]
    pub fn aspect(&self) -> f32 {
        self.width.max(1) as f32 / self.height_px()
    }
}

/// Snapshot of the active camera for one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraView {
    /// Camera position in world space.
    pub position: Vec3,
    /// Vertical field of view in radians.
    pub fov_y: f32,
    pub projection: Mat4,
    /// World → view transform (the camera's inverse world matrix).
    pub view: Mat4,
}

impl CameraView {
    pub fn look_at(
        position: Vec3,
        target: Vec3,
        fov_y: f32,
        aspect: f32,
        near: f32,
        far: f32,
    ) -> Self {
        Self {
            position,
            fov_y,
            projection: Mat4::perspective_rh(fov_y, aspect, near, far),
            view: Mat4::look_at_rh(position, target, Vec3::Y),
        }
    }

    #[inline]
    pub fn view_proj(&self) -> Mat4 {
        self.projection * self.view
    }
}

/// Plane in Hessian normal form: `normal · p + d >= 0` is inside.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Plane {
    pub normal: Vec3,
    pub d: f32,
}

impl Plane {
    fn from_row(v: Vec4) -> Self {
        let normal = v.truncate();
        let len = normal.length();
        if len > f32::EPSILON {
            Self {
                normal: normal / len,
                d: v.w / len,
            }
        } else {
            // Degenerate row: accept everything rather than culling the world.
            Self {
                normal: Vec3::ZERO,
                d: 0.0,
            }
        }
    }

    #[inline]
    pub fn signed_distance(&self, p: Vec3) -> f32 {
        self.normal.dot(p) + self.d
    }
}

/// Six clip planes extracted from a view-projection matrix.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Frustum {
    pub planes: [Plane; 6],
}

impl Frustum {
    /// Gribb–Hartmann extraction for a [0, 1] depth range.
    pub fn from_view_proj(m: Mat4) -> Self {
        let (r0, r1, r2, r3) = (m.row(0), m.row(1), m.row(2), m.row(3));
        Self {
            planes: [
                Plane::from_row(r3 + r0), // left
                Plane::from_row(r3 - r0), // right
                Plane::from_row(r3 + r1), // bottom
                Plane::from_row(r3 - r1), // top
                Plane::from_row(r2),      // near
                Plane::from_row(r3 - r2), // far
            ],
        }
    }

    #[inline]
    pub fn contains_point(&self, p: Vec3) -> bool {
        self.planes.iter().all(|pl| pl.signed_distance(p) >= 0.0)
    }
}

/// Half-line with a unit direction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ray {
    pub origin: Vec3,
    pub direction: Vec3,
}

impl Ray {
    pub fn new(origin: Vec3, direction: Vec3) -> Self {
        Self {
            origin,
            direction: direction.normalize_or_zero(),
        }
    }

    #[inline]
    pub fn at(&self, t: f32) -> Vec3 {
        self.origin + self.direction * t
    }

    /// Ray through a normalized-device coordinate (x right, y up, both in [-1, 1]).
    pub fn from_ndc(ndc: Vec2, camera: &CameraView) -> Self {
        let inv = camera.view_proj().inverse();
        let near = inv.project_point3(ndc.extend(0.0));
        let far = inv.project_point3(ndc.extend(1.0));
        Self::new(near, far - near)
    }

    /// Ray through a cursor position in physical pixels (origin top-left).
    pub fn from_viewport(cursor_px: Vec2, viewport: ViewportSize, camera: &CameraView) -> Self {
        let w = viewport.width.max(1) as f32;
        let h = viewport.height_px();
        let ndc = Vec2::new(cursor_px.x / w * 2.0 - 1.0, 1.0 - cursor_px.y / h * 2.0);
        Self::from_ndc(ndc, camera)
    }

    /// Distance along the ray to the first sphere surface hit. Returns the exit
    /// distance when the origin is inside the sphere.
    pub fn intersect_sphere(&self, center: Vec3, radius: f32) -> Option<f32> {
        let to_center = center - self.origin;
        let tca = to_center.dot(self.direction);
        let d2 = to_center.length_squared() - tca * tca;
        let r2 = radius * radius;
        if d2 > r2 {
            return None;
        }
        let thc = (r2 - d2).sqrt();
        let t0 = tca - thc;
        let t1 = tca + thc;
        if t1 < 0.0 {
            return None;
        }
        Some(if t0 < 0.0 { t1 } else { t0 })
    }
}

/// A ray plus the accepted distance interval.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Raycaster {
    pub ray: Ray,
    pub near: f32,
    pub far: f32,
}

impl Raycaster {
    pub fn new(ray: Ray) -> Self {
        Self {
            ray,
            near: 0.0,
            far: f32::INFINITY,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn camera() -> CameraView {
        CameraView::look_at(
            Vec3::new(0.0, 10.0, 30.0),
            Vec3::ZERO,
            60f32.to_radians(),
            16.0 / 9.0,
            0.1,
            2000.0,
        )
    }

    #[test]
    fn frustum_accepts_target_and_rejects_behind() {
        let cam = camera();
        let f = Frustum::from_view_proj(cam.view_proj());
        assert!(f.contains_point(Vec3::ZERO));
        assert!(!f.contains_point(Vec3::new(0.0, 10.0, 60.0)));
        assert!(!f.contains_point(Vec3::new(0.0, 0.0, -5000.0)));
        assert!(!f.contains_point(Vec3::new(500.0, 0.0, 0.0)));
    }

    #[test]
    fn center_of_viewport_ray_points_at_target() {
        let cam = camera();
        let vp = ViewportSize::new(1600, 900);
        let ray = Ray::from_viewport(Vec2::new(800.0, 450.0), vp, &cam);
        let expected = (Vec3::ZERO - cam.position).normalize();
        assert_relative_eq!(ray.direction.dot(expected), 1.0, epsilon = 1e-4);
    }

    #[test]
    fn sphere_hits_front_face_and_misses_offset() {
        let ray = Ray::new(Vec3::new(0.0, 0.0, 10.0), Vec3::NEG_Z);
        let t = ray.intersect_sphere(Vec3::ZERO, 2.0).unwrap();
        assert_relative_eq!(t, 8.0, epsilon = 1e-5);
        assert!(ray.intersect_sphere(Vec3::new(5.0, 0.0, 0.0), 2.0).is_none());
        assert!(ray.intersect_sphere(Vec3::new(0.0, 0.0, 20.0), 2.0).is_none());
    }

    #[test]
    fn origin_inside_sphere_reports_exit() {
        let ray = Ray::new(Vec3::ZERO, Vec3::X);
        let t = ray.intersect_sphere(Vec3::ZERO, 2.0).unwrap();
        assert_relative_eq!(t, 2.0, epsilon = 1e-5);
    }

    #[test]
    fn zero_height_viewport_is_guarded() {
        let vp = ViewportSize::new(0, 0);
        assert_eq!(vp.height_px(), 1.0);
        assert_eq!(vp.aspect(), 1.0);
    }
}
