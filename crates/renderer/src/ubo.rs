//! Uniform buffer layout shared with `mesh.vert`.

use bytemuck::{Pod, Zeroable};
use glam::Mat4;

/// Per-frame transforms at binding 0.
///
/// # Memory Layout
///
/// - Offset 0: model matrix (64 bytes)
/// - Offset 64: view matrix (64 bytes)
/// - Offset 128: projection matrix (64 bytes)
/// - Total size: 192 bytes
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct UniformBufferObject {
    pub model: Mat4,
    pub view: Mat4,
    pub proj: Mat4,
}

impl UniformBufferObject {
    /// Size of the struct in bytes.
    pub const SIZE: usize = std::mem::size_of::<Self>();

    pub fn new(model: Mat4, view: Mat4, proj: Mat4) -> Self {
        Self { model, view, proj }
    }
}

impl Default for UniformBufferObject {
    fn default() -> Self {
        Self::new(Mat4::IDENTITY, Mat4::IDENTITY, Mat4::IDENTITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::mem::offset_of;

    #[test]
    fn test_layout_matches_shader() {
        assert_eq!(UniformBufferObject::SIZE, 192);
        assert_eq!(offset_of!(UniformBufferObject, model), 0);
        assert_eq!(offset_of!(UniformBufferObject, view), 64);
        assert_eq!(offset_of!(UniformBufferObject, proj), 128);
        assert_eq!(std::mem::align_of::<UniformBufferObject>() % 4, 0);
    }

    #[test]
    fn test_bytes_are_column_major() {
        let ubo = UniformBufferObject::new(
            Mat4::from_translation(glam::Vec3::new(1.0, 2.0, 3.0)),
            Mat4::IDENTITY,
            Mat4::IDENTITY,
        );
        let floats: &[f32] = bytemuck::cast_slice(bytemuck::bytes_of(&ubo));
        assert_eq!(floats.len(), 48);
        // Translation sits in the fourth column.
        assert_eq!(&floats[12..15], &[1.0, 2.0, 3.0]);
    }
}
