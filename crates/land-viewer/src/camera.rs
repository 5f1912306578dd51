use glam::{Mat4, Vec3};
use marker_core::CameraView;
use winit::event::{ElementState, MouseButton, MouseScrollDelta, WindowEvent};

/// Cursor travel (px) below which a left press/release counts as a click.
const CLICK_SLOP_PX: f64 = 4.0;

#[derive(Debug, Clone)]
pub struct Camera {
    // --- Orbital Parameters ---
    /// Point on the ground the camera orbits around.
    pub target: Vec3,
    /// Distance from the camera to the target.
    pub radius: f32,
    /// Rotation around +Y (radians); 0 looks down -Z.
    pub azimuth_rad: f32,
    /// Angle above the ground plane (radians).
    pub elevation_rad: f32,

    // --- Projection ---
    pub fov_y_rad: f32,
    pub aspect: f32,
    pub near: f32,
    pub far: f32,

    /// Derived by `update()`.
    position: Vec3,
}

impl Camera {
    pub fn new(target: Vec3, radius: f32, aspect: f32) -> Self {
        let mut camera = Self {
            target,
            radius,
            azimuth_rad: 0.0,
            elevation_rad: 35f32.to_radians(),
            fov_y_rad: 60f32.to_radians(),
            aspect,
            near: 0.1,
            far: 5000.0,
            position: Vec3::ZERO,
        };
        camera.update();
        camera
    }

    /// Recomputes the position from the orbital parameters.
    pub fn update(&mut self) {
        let (sin_az, cos_az) = self.azimuth_rad.sin_cos();
        let (sin_el, cos_el) = self.elevation_rad.sin_cos();
        let offset = Vec3::new(
            self.radius * cos_el * sin_az,
            self.radius * sin_el,
            self.radius * cos_el * cos_az,
        );
        self.position = self.target + offset;
    }

    pub fn set_aspect(&mut self, width: u32, height: u32) {
        self.aspect = width.max(1) as f32 / height.max(1) as f32;
    }

    #[inline]
    pub fn position(&self) -> Vec3 {
        self.position
    }

    pub fn proj(&self) -> Mat4 {
        Mat4::perspective_rh(self.fov_y_rad, self.aspect, self.near, self.far)
    }

    pub fn view(&self) -> Mat4 {
        Mat4::look_at_rh(self.position, self.target, Vec3::Y)
    }

    /// Snapshot handed to the optimizer and hit testing.
    pub fn camera_view(&self) -> CameraView {
        CameraView {
            position: self.position,
            fov_y: self.fov_y_rad,
            projection: self.proj(),
            view: self.view(),
        }
    }
}

/// What the controller made of the last event.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PointerAction {
    None,
    /// Cursor moved to this physical-pixel position.
    Moved(f64, f64),
    /// Left button released without dragging.
    Click(f64, f64),
}

pub struct CameraController {
    mouse_down: bool,
    last_mouse: Option<(f64, f64)>,
    press_at: Option<(f64, f64)>,
    dragged: bool,
}

impl CameraController {
    pub fn new() -> Self {
        Self {
            mouse_down: false,
            last_mouse: None,
            press_at: None,
            dragged: false,
        }
    }

    pub fn handle_event(&mut self, event: &WindowEvent, camera: &mut Camera) -> PointerAction {
        match event {
            WindowEvent::MouseInput {
                button: MouseButton::Left,
                state,
                ..
            } => {
                let pressed = *state == ElementState::Pressed;
                self.mouse_down = pressed;
                if pressed {
                    self.press_at = self.last_mouse;
                    self.dragged = false;
                    PointerAction::None
                } else {
                    let click = !self.dragged;
                    self.press_at = None;
                    match (click, self.last_mouse) {
                        (true, Some((x, y))) => PointerAction::Click(x, y),
                        _ => PointerAction::None,
                    }
                }
            }
            WindowEvent::CursorMoved { position, .. } => {
                self.handle_cursor_orbit((position.x, position.y), camera);
                PointerAction::Moved(position.x, position.y)
            }
            WindowEvent::MouseWheel { delta, .. } => {
                let scroll = match delta {
                    MouseScrollDelta::LineDelta(_, y) => *y,
                    MouseScrollDelta::PixelDelta(pos) => pos.y as f32 / 120.0,
                };
                self.handle_scroll(scroll, camera);
                PointerAction::None
            }
            _ => PointerAction::None,
        }
    }

    fn handle_scroll(&mut self, delta: f32, camera: &mut Camera) {
        // Positive delta zooms in.
        camera.radius = (camera.radius * 1.1f32.powf(-delta)).clamp(2.0, 2000.0);
        camera.update();
    }

    fn handle_cursor_orbit(&mut self, xy: (f64, f64), camera: &mut Camera) {
        if let (Some(start), true) = (self.press_at, self.mouse_down) {
            let (dx, dy) = (xy.0 - start.0, xy.1 - start.1);
            if dx.hypot(dy) > CLICK_SLOP_PX {
                self.dragged = true;
            }
        }

        if let Some(last) = self.last_mouse {
            if self.mouse_down && self.dragged {
                let dx = ((xy.0 - last.0) * 0.005) as f32;
                let dy = ((xy.1 - last.1) * 0.005) as f32;

                camera.azimuth_rad -= dx;
                camera.elevation_rad = (camera.elevation_rad + dy).clamp(3f32.to_radians(), 89f32.to_radians());
                camera.update();
            }
        }
        self.last_mouse = Some(xy);
    }
}

impl Default for CameraController {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn orbit_position_sits_on_sphere_above_target() {
        let mut cam = Camera::new(Vec3::new(10.0, 0.0, -5.0), 100.0, 1.5);
        cam.azimuth_rad = 1.2;
        cam.update();
        assert_relative_eq!(cam.position().distance(cam.target), 100.0, epsilon = 1e-3);
        assert!(cam.position().y > 0.0);
    }

    #[test]
    fn camera_view_looks_at_target() {
        let cam = Camera::new(Vec3::ZERO, 50.0, 16.0 / 9.0);
        let v = cam.camera_view();
        let clip = v.view_proj().project_point3(cam.target);
        assert_relative_eq!(clip.x, 0.0, epsilon = 1e-4);
        assert_relative_eq!(clip.y, 0.0, epsilon = 1e-4);
        assert!((0.0..=1.0).contains(&clip.z));
        assert_eq!(v.position, cam.position());
    }

    #[test]
    fn scroll_zoom_is_clamped() {
        let mut cam = Camera::new(Vec3::ZERO, 50.0, 1.0);
        let mut ctl = CameraController::new();
        for _ in 0..200 {
            ctl.handle_scroll(5.0, &mut cam);
        }
        assert_relative_eq!(cam.radius, 2.0);
    }
}
