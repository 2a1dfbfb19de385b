//! Look-at camera producing Vulkan-ready view and projection matrices.

use glam::{Mat4, Vec3};

/// A camera fixed on a target point.
#[derive(Clone, Debug, PartialEq)]
pub struct Camera {
    /// Camera position in world space
    pub eye: Vec3,
    /// Point the camera looks at
    pub target: Vec3,
    /// World up direction
    pub up: Vec3,
    /// Vertical field of view in radians
    pub fov_y: f32,
    pub near: f32,
    pub far: f32,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            eye: Vec3::new(2.0, 2.0, 2.0),
            target: Vec3::ZERO,
            up: Vec3::Z,
            fov_y: 45.0_f32.to_radians(),
            near: 0.1,
            far: 10.0,
        }
    }
}

impl Camera {
    pub fn new(eye: Vec3, target: Vec3, up: Vec3, fov_y: f32, near: f32, far: f32) -> Self {
        Self {
            eye,
            target,
            up,
            fov_y,
            near,
            far,
        }
    }

    /// Right-handed look-at view matrix.
    pub fn view(&self) -> Mat4 {
        Mat4::look_at_rh(self.eye, self.target, self.up)
    }

    /// Right-handed perspective with depth in [0, 1] and Y flipped for
    /// Vulkan's downward clip-space Y.
    ///
    /// A non-positive or non-finite `aspect` is treated as 1.0.
    pub fn projection(&self, aspect: f32) -> Mat4 {
        let aspect = if aspect.is_finite() && aspect > 0.0 {
            aspect
        } else {
            1.0
        };
        let mut proj = Mat4::perspective_rh(self.fov_y, aspect, self.near, self.far);
        // Flip Y for Vulkan coordinate system
        proj.y_axis.y *= -1.0;
        proj
    }

    /// Get the view-projection matrix.
    pub fn view_projection(&self, aspect: f32) -> Mat4 {
        self.projection(aspect) * self.view()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec4;

    const EPSILON: f32 = 1e-5;

    #[test]
    fn test_view_moves_eye_to_origin() {
        let camera = Camera::default();
        let eye_in_view = camera.view().transform_point3(camera.eye);
        assert!(eye_in_view.length() < EPSILON);

        // The target lies straight ahead on -Z.
        let target_in_view = camera.view().transform_point3(camera.target);
        assert!(target_in_view.x.abs() < EPSILON);
        assert!(target_in_view.y.abs() < EPSILON);
        assert!(target_in_view.z < 0.0);
    }

    #[test]
    fn test_projection_flips_y() {
        let camera = Camera::default();
        let flipped = camera.projection(1.0);
        let unflipped = Mat4::perspective_rh(camera.fov_y, 1.0, camera.near, camera.far);

        assert_eq!(flipped.y_axis.y, -unflipped.y_axis.y);
        assert_eq!(flipped.x_axis, unflipped.x_axis);
        assert_eq!(flipped.z_axis, unflipped.z_axis);
        assert_eq!(flipped.w_axis, unflipped.w_axis);
    }

    #[test]
    fn test_world_up_points_down_in_clip_space() {
        let camera = Camera::default();
        let above_target = camera.target + camera.up * 0.5;
        let clip = camera.view_projection(1.0) * Vec4::from((above_target, 1.0));
        assert!(clip.y / clip.w < 0.0);
    }

    #[test]
    fn test_depth_range_zero_to_one() {
        let camera = Camera::new(Vec3::ZERO, Vec3::NEG_Z, Vec3::Y, 1.0, 0.5, 20.0);
        let proj = camera.projection(1.0);

        let near = proj * Vec4::new(0.0, 0.0, -0.5, 1.0);
        let far = proj * Vec4::new(0.0, 0.0, -20.0, 1.0);
        assert!((near.z / near.w).abs() < EPSILON);
        assert!((far.z / far.w - 1.0).abs() < EPSILON);
    }

    #[test]
    fn test_degenerate_aspect_falls_back() {
        let camera = Camera::default();
        assert_eq!(camera.projection(0.0), camera.projection(1.0));
        assert_eq!(camera.projection(f32::NAN), camera.projection(1.0));
    }
}
