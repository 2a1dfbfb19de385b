//! Vertex layout shared by the asset loader and the pipeline.
//!
//! The attribute offsets below must match the `#[repr(C)]` layout of
//! [`Vertex`] exactly. A mismatch is not caught by Vulkan; it shows up as
//! garbage on screen. The tests pin both sides.

use ash::vk;
use bytemuck::{Pod, Zeroable};
use glam::{Vec2, Vec3};

/// Vertex with position, color and texture coordinates.
///
/// # Memory Layout
///
/// - Offset 0: position (12 bytes)
/// - Offset 12: color (12 bytes)
/// - Offset 24: tex_coord (8 bytes)
/// - Total size: 32 bytes
///
/// # Shader Locations
///
/// - location 0: position (vec3)
/// - location 1: color (vec3)
/// - location 2: tex_coord (vec2)
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub position: Vec3,
    pub color: Vec3,
    pub tex_coord: Vec2,
}

impl Vertex {
    #[inline]
    pub const fn new(position: Vec3, color: Vec3, tex_coord: Vec2) -> Self {
        Self {
            position,
            color,
            tex_coord,
        }
    }

    /// Bit patterns of every attribute, for exact-equality hashing.
    ///
    /// `-0.0` and `0.0` are distinct keys and so are differing NaN payloads.
    pub fn bit_key(&self) -> [u32; 8] {
        [
            self.position.x.to_bits(),
            self.position.y.to_bits(),
            self.position.z.to_bits(),
            self.color.x.to_bits(),
            self.color.y.to_bits(),
            self.color.z.to_bits(),
            self.tex_coord.x.to_bits(),
            self.tex_coord.y.to_bits(),
        ]
    }

    /// Binding 0, per-vertex rate.
    pub fn binding_description() -> vk::VertexInputBindingDescription {
        vk::VertexInputBindingDescription {
            binding: 0,
            stride: std::mem::size_of::<Self>() as u32,
            input_rate: vk::VertexInputRate::VERTEX,
        }
    }

    pub fn attribute_descriptions() -> [vk::VertexInputAttributeDescription; 3] {
        [
            vk::VertexInputAttributeDescription {
                binding: 0,
                location: 0,
                format: vk::Format::R32G32B32_SFLOAT,
                offset: std::mem::offset_of!(Vertex, position) as u32,
            },
            vk::VertexInputAttributeDescription {
                binding: 0,
                location: 1,
                format: vk::Format::R32G32B32_SFLOAT,
                offset: std::mem::offset_of!(Vertex, color) as u32,
            },
            vk::VertexInputAttributeDescription {
                binding: 0,
                location: 2,
                format: vk::Format::R32G32_SFLOAT,
                offset: std::mem::offset_of!(Vertex, tex_coord) as u32,
            },
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vertex_size() {
        assert_eq!(std::mem::size_of::<Vertex>(), 32);
    }

    #[test]
    fn test_vertex_binding_description() {
        let binding = Vertex::binding_description();
        assert_eq!(binding.binding, 0);
        assert_eq!(binding.stride, 32);
        assert_eq!(binding.input_rate, vk::VertexInputRate::VERTEX);
    }

    #[test]
    fn test_vertex_attribute_descriptions() {
        let attrs = Vertex::attribute_descriptions();

        assert_eq!(attrs[0].location, 0);
        assert_eq!(attrs[0].format, vk::Format::R32G32B32_SFLOAT);
        assert_eq!(attrs[0].offset, 0);

        assert_eq!(attrs[1].location, 1);
        assert_eq!(attrs[1].format, vk::Format::R32G32B32_SFLOAT);
        assert_eq!(attrs[1].offset, 12);

        assert_eq!(attrs[2].location, 2);
        assert_eq!(attrs[2].format, vk::Format::R32G32_SFLOAT);
        assert_eq!(attrs[2].offset, 24);

        assert!(attrs.iter().all(|a| a.binding == 0));
    }

    #[test]
    fn test_vertex_pod_cast() {
        let vertex = Vertex::new(
            Vec3::new(1.0, 2.0, 3.0),
            Vec3::ONE,
            Vec2::new(0.25, 0.75),
        );

        let bytes: &[u8] = bytemuck::bytes_of(&vertex);
        assert_eq!(bytes.len(), 32);
        let floats: &[f32] = bytemuck::cast_slice(bytes);
        assert_eq!(floats, &[1.0, 2.0, 3.0, 1.0, 1.0, 1.0, 0.25, 0.75]);
    }

    #[test]
    fn test_bit_key_distinguishes_signed_zero() {
        let a = Vertex::new(Vec3::ZERO, Vec3::ONE, Vec2::ZERO);
        let b = Vertex::new(Vec3::new(-0.0, 0.0, 0.0), Vec3::ONE, Vec2::ZERO);
        assert_ne!(a.bit_key(), b.bit_key());
        assert_eq!(a.bit_key(), a.bit_key());
    }
}
