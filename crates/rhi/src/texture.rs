//! Sampled 2D textures uploaded from RGBA8 pixels.
//!
//! The upload is a staged transfer: pixels go into a host-visible staging
//! buffer, then a one-shot command buffer transitions the image to
//! `TRANSFER_DST_OPTIMAL`, copies the buffer into it and transitions it to
//! `SHADER_READ_ONLY_OPTIMAL`. The call blocks until the copy completes.

use std::sync::Arc;

use ash::vk;
use tracing::info;

use crate::buffer::{Buffer, BufferUsage};
use crate::command::CommandPool;
use crate::device::Device;
use crate::error::{RhiError, RhiResult};
use crate::image::{Image, ImageDesc};
use crate::sampler::Sampler;

/// Color format of every texture created here.
pub const TEXTURE_FORMAT: vk::Format = vk::Format::R8G8B8A8_SRGB;

/// Device-local image, its view and a sampler.
pub struct Texture {
    image: Image,
    sampler: Sampler,
}

impl Texture {
    /// Uploads `pixels` (tightly packed RGBA8, row-major) as a `width`x`height`
    /// texture.
    pub fn from_rgba(
        device: Arc<Device>,
        pool: &CommandPool,
        width: u32,
        height: u32,
        pixels: &[u8],
    ) -> RhiResult<Self> {
        let expected = rgba_byte_len(width, height);
        if pixels.len() != expected {
            return Err(RhiError::InvalidArgument(format!(
                "Texture {}x{} needs {} bytes of RGBA8, got {}",
                width,
                height,
                expected,
                pixels.len()
            )));
        }

        let staging = Buffer::new_with_data(device.clone(), BufferUsage::Staging, pixels)?;

        let extent = vk::Extent2D { width, height };
        let image = Image::new(
            device.clone(),
            &ImageDesc {
                extent,
                format: TEXTURE_FORMAT,
                tiling: vk::ImageTiling::OPTIMAL,
                usage: vk::ImageUsageFlags::TRANSFER_DST | vk::ImageUsageFlags::SAMPLED,
                memory_flags: vk::MemoryPropertyFlags::DEVICE_LOCAL,
                aspect: vk::ImageAspectFlags::COLOR,
            },
        )?;

        let region = vk::BufferImageCopy {
            buffer_offset: 0,
            buffer_row_length: 0,
            buffer_image_height: 0,
            image_subresource: vk::ImageSubresourceLayers {
                aspect_mask: vk::ImageAspectFlags::COLOR,
                mip_level: 0,
                base_array_layer: 0,
                layer_count: 1,
            },
            image_offset: vk::Offset3D { x: 0, y: 0, z: 0 },
            image_extent: vk::Extent3D {
                width,
                height,
                depth: 1,
            },
        };

        pool.execute_one_time(device.graphics_queue(), |cmd| {
            image.cmd_transition_layout(
                cmd,
                vk::ImageLayout::UNDEFINED,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            )?;
            cmd.copy_buffer_to_image(
                staging.handle(),
                image.handle(),
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                &[region],
            );
            image.cmd_transition_layout(
                cmd,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            )
        })?;
        drop(staging);

        let sampler = Sampler::new(device)?;

        info!("Texture uploaded: {}x{}", width, height);
        Ok(Self { image, sampler })
    }

    #[inline]
    pub fn view(&self) -> vk::ImageView {
        self.image.view()
    }

    #[inline]
    pub fn sampler(&self) -> vk::Sampler {
        self.sampler.handle()
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.image.extent()
    }
}

fn rgba_byte_len(width: u32, height: u32) -> usize {
    width as usize * height as usize * 4
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rgba_byte_len() {
        assert_eq!(rgba_byte_len(1, 1), 4);
        assert_eq!(rgba_byte_len(512, 256), 512 * 256 * 4);
        assert_eq!(rgba_byte_len(0, 64), 0);
    }
}
