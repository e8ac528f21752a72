use glam::{Mat4, Vec3};

use crate::constants::*;
use crate::input::InputState;

const PITCH_LIMIT: f32 = 89.0;
const ZOOM_MIN: f32 = 1.0;
const ZOOM_MAX: f32 = 90.0;

/// Free-fly camera. Angles are in degrees.
#[derive(Debug, Clone)]
pub struct Camera {
    pub position: Vec3,
    pub yaw: f32,
    pub pitch: f32,
    pub speed: f32,
    pub sensitivity: f32,
    pub zoom: f32,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            position: Vec3::from_array(CAMERA_START),
            yaw: CAMERA_YAW,
            pitch: CAMERA_PITCH,
            speed: CAMERA_SPEED,
            sensitivity: CAMERA_SENSITIVITY,
            zoom: CAMERA_ZOOM,
        }
    }
}

impl Camera {
    pub fn forward(&self) -> Vec3 {
        let (yaw, pitch) = (self.yaw.to_radians(), self.pitch.to_radians());
        Vec3::new(yaw.cos() * pitch.cos(), pitch.sin(), yaw.sin() * pitch.cos()).normalize()
    }

    pub fn right(&self) -> Vec3 {
        self.forward().cross(Vec3::Y).normalize()
    }

    pub fn up(&self) -> Vec3 {
        self.right().cross(self.forward()).normalize()
    }

    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_at_rh(self.position, self.position + self.forward(), Vec3::Y)
    }

    pub fn projection_matrix(&self, aspect: f32) -> Mat4 {
        Mat4::perspective_rh(self.zoom.to_radians(), aspect, CAMERA_NEAR, CAMERA_FAR)
    }

    pub fn update(&mut self, dt: f32, input: &InputState) {
        let mut direction = Vec3::ZERO;
        if input.forward {
            direction += self.forward();
        }
        if input.backward {
            direction -= self.forward();
        }
        if input.right {
            direction += self.right();
        }
        if input.left {
            direction -= self.right();
        }
        if input.ascend {
            direction += Vec3::Y;
        }
        if input.descend {
            direction -= Vec3::Y;
        }

        if direction.length_squared() > 0.0 {
            self.position += direction.normalize() * self.speed * dt;
        }
    }

    pub fn rotate(&mut self, dx: f32, dy: f32) {
        self.yaw += dx * self.sensitivity;
        self.pitch = (self.pitch - dy * self.sensitivity).clamp(-PITCH_LIMIT, PITCH_LIMIT);
    }

    pub fn zoom_by(&mut self, amount: f32) {
        self.zoom = (self.zoom - amount).clamp(ZOOM_MIN, ZOOM_MAX);
    }

    /// Back to the initial pose. Speed is a user setting and is kept.
    pub fn reset(&mut self) {
        let speed = self.speed;
        *self = Self {
            speed,
            ..Self::default()
        };
    }

    pub fn snapshot(&self, width: u32, height: u32) -> CameraState {
        let aspect = width.max(1) as f32 / height.max(1) as f32;
        CameraState {
            position: self.position,
            view: self.view_matrix(),
            projection: self.projection_matrix(aspect),
            fov: self.zoom,
            forward: self.forward(),
            up: self.up(),
            viewport: [width, height],
        }
    }
}

/// Read-only view of the camera for one frame. This is all the rendering
/// layers get to see.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraState {
    pub position: Vec3,
    pub view: Mat4,
    pub projection: Mat4,
    /// Vertical field of view in degrees
    pub fov: f32,
    pub forward: Vec3,
    pub up: Vec3,
    pub viewport: [u32; 2],
}

impl CameraState {
    pub fn inverse_view(&self) -> Mat4 {
        self.view.inverse()
    }

    pub fn inverse_projection(&self) -> Mat4 {
        self.projection.inverse()
    }

    pub fn view_projection(&self) -> Mat4 {
        self.projection * self.view
    }

    pub fn resolution(&self) -> [f32; 2] {
        [self.viewport[0] as f32, self.viewport[1] as f32]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_camera_looks_down_negative_z() {
        let camera = Camera::default();
        let forward = camera.forward();
        assert!((forward - Vec3::NEG_Z).length() < 1e-5, "{:?}", forward);
        assert!((camera.right() - Vec3::X).length() < 1e-5);
    }

    #[test]
    fn pitch_is_limited() {
        let mut camera = Camera::default();
        camera.rotate(0.0, -10_000.0);
        assert_eq!(camera.pitch, 89.0);
        camera.rotate(0.0, 10_000.0);
        assert_eq!(camera.pitch, -89.0);
    }

    #[test]
    fn zoom_is_clamped() {
        let mut camera = Camera::default();
        camera.zoom_by(500.0);
        assert_eq!(camera.zoom, 1.0);
        camera.zoom_by(-500.0);
        assert_eq!(camera.zoom, 90.0);
    }

    #[test]
    fn movement_scales_with_speed_and_time() {
        let mut camera = Camera::default();
        let start = camera.position;
        let input = InputState {
            forward: true,
            ..Default::default()
        };
        camera.update(0.5, &input);
        let moved = camera.position - start;
        assert!((moved.length() - CAMERA_SPEED * 0.5).abs() < 1e-2);
    }

    #[test]
    fn reset_keeps_speed() {
        let mut camera = Camera::default();
        camera.speed = 42.0;
        camera.position = Vec3::splat(10.0);
        camera.rotate(100.0, 20.0);
        camera.reset();
        assert_eq!(camera.position, Vec3::from_array(CAMERA_START));
        assert_eq!(camera.yaw, CAMERA_YAW);
        assert_eq!(camera.speed, 42.0);
    }

    #[test]
    fn inverse_matrices_round_trip() {
        let state = Camera::default().snapshot(1280, 720);
        let identity = state.inverse_view() * state.view;
        assert!(identity.abs_diff_eq(Mat4::IDENTITY, 1e-4));
        assert_eq!(state.resolution(), [1280.0, 720.0]);
    }
}
