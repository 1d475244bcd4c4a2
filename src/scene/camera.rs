use glam::{Mat4, Vec3};

use crate::input::MoveKeys;

pub const PITCH_LIMIT_DEGREES: f32 = 89.0;

/// Free-fly camera driven by yaw and pitch (degrees).
#[derive(Clone, Copy, Debug)]
pub struct Camera {
    pub position: Vec3,
    pub front: Vec3,
    pub up: Vec3,
    pub right: Vec3,
    pub world_up: Vec3,
    pub yaw: f32,
    pub pitch: f32,
    pub fov_y_degrees: f32,
    pub aspect: f32,
    pub near: f32,
    pub far: f32,
    pub speed: f32,
    pub sensitivity: f32,
}

impl Camera {
    pub fn new(position: Vec3, yaw: f32, pitch: f32, aspect: f32) -> Self {
        let mut camera = Self {
            position,
            front: Vec3::NEG_Z,
            up: Vec3::Y,
            right: Vec3::X,
            world_up: Vec3::Y,
            yaw,
            pitch: pitch.clamp(-PITCH_LIMIT_DEGREES, PITCH_LIMIT_DEGREES),
            fov_y_degrees: 60.0,
            aspect,
            near: 0.1,
            far: 1000.0,
            speed: 5.0,
            sensitivity: 0.1,
        };
        camera.update_vectors();
        camera
    }

    /// Recomputes the orthonormal basis from yaw and pitch.
    pub fn update_vectors(&mut self) {
        let (yaw, pitch) = (self.yaw.to_radians(), self.pitch.to_radians());
        self.front = Vec3::new(yaw.cos() * pitch.cos(), pitch.sin(), yaw.sin() * pitch.cos())
            .normalize();
        self.right = self.front.cross(self.world_up).normalize();
        self.up = self.right.cross(self.front).normalize();
    }

    pub fn view(&self) -> Mat4 {
        Mat4::look_at_rh(self.position, self.position + self.front, self.up)
    }

    pub fn projection(&self) -> Mat4 {
        Mat4::perspective_rh(
            self.fov_y_degrees.to_radians(),
            self.aspect.max(f32::EPSILON),
            self.near,
            self.far,
        )
    }

    pub fn set_aspect(&mut self, width: u32, height: u32) {
        if width > 0 && height > 0 {
            self.aspect = width as f32 / height as f32;
        }
    }

    /// Camera seen in a horizontal mirror at `water_height`: position reflected
    /// across the plane, pitch negated and re-clamped.
    pub fn mirrored(&self, water_height: f32) -> Camera {
        let mut mirrored = *self;
        mirrored.position.y = 2.0 * water_height - self.position.y;
        mirrored.pitch = (-self.pitch).clamp(-PITCH_LIMIT_DEGREES, PITCH_LIMIT_DEGREES);
        mirrored.update_vectors();
        mirrored
    }

    pub fn process_keyboard(&mut self, keys: MoveKeys, dt: f32) {
        let velocity = self.speed * dt;
        if keys.contains(MoveKeys::FORWARD) {
            self.position += self.front * velocity;
        }
        if keys.contains(MoveKeys::BACKWARD) {
            self.position -= self.front * velocity;
        }
        if keys.contains(MoveKeys::LEFT) {
            self.position -= self.right * velocity;
        }
        if keys.contains(MoveKeys::RIGHT) {
            self.position += self.right * velocity;
        }
        if keys.contains(MoveKeys::DOWN) {
            self.position -= self.world_up * velocity;
        }
        if keys.contains(MoveKeys::UP) {
            self.position += self.world_up * velocity;
        }
    }

    /// Mouse deltas in pixels; screen y grows downwards.
    pub fn process_mouse(&mut self, dx: f32, dy: f32) {
        self.yaw += dx * self.sensitivity;
        self.pitch = (self.pitch - dy * self.sensitivity)
            .clamp(-PITCH_LIMIT_DEGREES, PITCH_LIMIT_DEGREES);
        self.update_vectors();
    }
}

impl Default for Camera {
    fn default() -> Self {
        Self::new(Vec3::new(0.0, 2.0, 8.0), -90.0, 0.0, 16.0 / 9.0)
    }
}
