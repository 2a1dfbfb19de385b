//! Time-driven model transforms.

use glam::{Mat4, Vec3};

/// Constant rotation about a fixed axis.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Spin {
    /// Rotation axis, normalized on construction
    pub axis: Vec3,
    pub degrees_per_second: f32,
}

impl Default for Spin {
    fn default() -> Self {
        Self {
            axis: Vec3::Z,
            degrees_per_second: 25.0,
        }
    }
}

impl Spin {
    /// A zero or non-finite axis falls back to +Z.
    pub fn new(axis: Vec3, degrees_per_second: f32) -> Self {
        Self {
            axis: axis.try_normalize().unwrap_or(Vec3::Z),
            degrees_per_second,
        }
    }

    /// Rotation angle in radians after `seconds`.
    pub fn angle(&self, seconds: f32) -> f32 {
        (seconds * self.degrees_per_second).to_radians()
    }

    /// Model matrix after `seconds`.
    pub fn model(&self, seconds: f32) -> Mat4 {
        Mat4::from_axis_angle(self.axis, self.angle(seconds))
    }
}
