//! 2D images with dedicated memory and a single view.
//!
//! Used for the depth attachment and for sampled textures. Swapchain images
//! are owned by the presentation engine and are not represented here.

use std::sync::Arc;

use ash::vk;
use tracing::debug;

use crate::command::CommandBuffer;
use crate::device::Device;
use crate::error::{RhiError, RhiResult};
use crate::memory;

/// Parameters for [`Image::new`].
#[derive(Clone, Copy, Debug)]
pub struct ImageDesc {
    pub extent: vk::Extent2D,
    pub format: vk::Format,
    pub tiling: vk::ImageTiling,
    pub usage: vk::ImageUsageFlags,
    pub memory_flags: vk::MemoryPropertyFlags,
    pub aspect: vk::ImageAspectFlags,
}

/// Image, its backing memory and a 2D view over the whole image.
///
/// Drop order is view, image, memory.
pub struct Image {
    device: Arc<Device>,
    image: vk::Image,
    memory: vk::DeviceMemory,
    view: vk::ImageView,
    format: vk::Format,
    extent: vk::Extent2D,
}

impl Image {
    /// Creates the image, allocates and binds memory, and builds the view.
    pub fn new(device: Arc<Device>, desc: &ImageDesc) -> RhiResult<Self> {
        if desc.extent.width == 0 || desc.extent.height == 0 {
            return Err(RhiError::InvalidArgument(format!(
                "Image extent must be non-zero, got {}x{}",
                desc.extent.width, desc.extent.height
            )));
        }

        let image_info = vk::ImageCreateInfo::default()
            .image_type(vk::ImageType::TYPE_2D)
            .extent(vk::Extent3D {
                width: desc.extent.width,
                height: desc.extent.height,
                depth: 1,
            })
            .mip_levels(1)
            .array_layers(1)
            .format(desc.format)
            .tiling(desc.tiling)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .usage(desc.usage)
            .samples(vk::SampleCountFlags::TYPE_1)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let image = unsafe { device.handle().create_image(&image_info, None)? };

        let requirements = unsafe { device.handle().get_image_memory_requirements(image) };
        let memory = match memory::allocate(&device, requirements, desc.memory_flags) {
            Ok(memory) => memory,
            Err(e) => {
                unsafe { device.handle().destroy_image(image, None) };
                return Err(e);
            }
        };

        let mut this = Self {
            device,
            image,
            memory,
            view: vk::ImageView::null(),
            format: desc.format,
            extent: desc.extent,
        };

        unsafe {
            this.device
                .handle()
                .bind_image_memory(this.image, this.memory, 0)?;
        }
        this.view = create_view(&this.device, this.image, desc.format, desc.aspect)?;

        debug!(
            "Created {}x{} image ({:?})",
            desc.extent.width, desc.extent.height, desc.format
        );
        Ok(this)
    }

    #[inline]
    pub fn handle(&self) -> vk::Image {
        self.image
    }

    #[inline]
    pub fn view(&self) -> vk::ImageView {
        self.view
    }

    #[inline]
    pub fn format(&self) -> vk::Format {
        self.format
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    /// Records a layout transition barrier for the whole color image.
    pub fn cmd_transition_layout(
        &self,
        cmd: &CommandBuffer,
        old: vk::ImageLayout,
        new: vk::ImageLayout,
    ) -> RhiResult<()> {
        let transition = image_layout_transition(old, new)?;

        let barrier = vk::ImageMemoryBarrier::default()
            .old_layout(old)
            .new_layout(new)
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .image(self.image)
            .subresource_range(color_subresource_range())
            .src_access_mask(transition.src_access)
            .dst_access_mask(transition.dst_access);

        cmd.pipeline_barrier(transition.src_stage, transition.dst_stage, &[barrier]);
        Ok(())
    }
}

impl Drop for Image {
    fn drop(&mut self) {
        unsafe {
            if self.view != vk::ImageView::null() {
                self.device.handle().destroy_image_view(self.view, None);
            }
            self.device.handle().destroy_image(self.image, None);
            self.device.handle().free_memory(self.memory, None);
        }
        debug!(
            "Destroyed {}x{} image",
            self.extent.width, self.extent.height
        );
    }
}

/// Access masks and stages for one supported layout transition.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LayoutTransition {
    pub src_access: vk::AccessFlags,
    pub dst_access: vk::AccessFlags,
    pub src_stage: vk::PipelineStageFlags,
    pub dst_stage: vk::PipelineStageFlags,
}

/// Barrier parameters for `old -> new`.
///
/// Only the two transitions of a texture upload are supported:
/// `UNDEFINED -> TRANSFER_DST_OPTIMAL` and
/// `TRANSFER_DST_OPTIMAL -> SHADER_READ_ONLY_OPTIMAL`.
pub fn image_layout_transition(
    old: vk::ImageLayout,
    new: vk::ImageLayout,
) -> RhiResult<LayoutTransition> {
    match (old, new) {
        (vk::ImageLayout::UNDEFINED, vk::ImageLayout::TRANSFER_DST_OPTIMAL) => {
            Ok(LayoutTransition {
                src_access: vk::AccessFlags::empty(),
                dst_access: vk::AccessFlags::TRANSFER_WRITE,
                src_stage: vk::PipelineStageFlags::TOP_OF_PIPE,
                dst_stage: vk::PipelineStageFlags::TRANSFER,
            })
        }
        (vk::ImageLayout::TRANSFER_DST_OPTIMAL, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL) => {
            Ok(LayoutTransition {
                src_access: vk::AccessFlags::TRANSFER_WRITE,
                dst_access: vk::AccessFlags::SHADER_READ,
                src_stage: vk::PipelineStageFlags::TRANSFER,
                dst_stage: vk::PipelineStageFlags::FRAGMENT_SHADER,
            })
        }
        _ => Err(RhiError::UnsupportedLayoutTransition { old, new }),
    }
}

/// Subresource range covering mip 0, layer 0 of a color image.
pub fn color_subresource_range() -> vk::ImageSubresourceRange {
    vk::ImageSubresourceRange {
        aspect_mask: vk::ImageAspectFlags::COLOR,
        base_mip_level: 0,
        level_count: 1,
        base_array_layer: 0,
        layer_count: 1,
    }
}

/// Creates a 2D view over mip 0, layer 0 of `image`.
pub fn create_view(
    device: &Device,
    image: vk::Image,
    format: vk::Format,
    aspect: vk::ImageAspectFlags,
) -> RhiResult<vk::ImageView> {
    let create_info = vk::ImageViewCreateInfo::default()
        .image(image)
        .view_type(vk::ImageViewType::TYPE_2D)
        .format(format)
        .subresource_range(vk::ImageSubresourceRange {
            aspect_mask: aspect,
            ..color_subresource_range()
        });

    let view = unsafe { device.handle().create_image_view(&create_info, None)? };
    Ok(view)
}

/// Depth formats in order of preference.
pub const DEPTH_FORMAT_CANDIDATES: [vk::Format; 3] = [
    vk::Format::D32_SFLOAT,
    vk::Format::D32_SFLOAT_S8_UINT,
    vk::Format::D24_UNORM_S8_UINT,
];

/// First candidate usable as an optimally tiled depth attachment.
pub fn find_depth_format(device: &Device) -> RhiResult<vk::Format> {
    device.find_supported_format(
        &DEPTH_FORMAT_CANDIDATES,
        vk::ImageTiling::OPTIMAL,
        vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT,
    )
}

/// Depth attachment image sized to `extent`.
pub fn create_depth_image(
    device: Arc<Device>,
    extent: vk::Extent2D,
    format: vk::Format,
) -> RhiResult<Image> {
    Image::new(
        device,
        &ImageDesc {
            extent,
            format,
            tiling: vk::ImageTiling::OPTIMAL,
            usage: vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
            memory_flags: vk::MemoryPropertyFlags::DEVICE_LOCAL,
            aspect: depth_aspect(format),
        },
    )
}

/// Aspect flags for a depth format, including stencil when present.
pub fn depth_aspect(format: vk::Format) -> vk::ImageAspectFlags {
    if has_stencil_component(format) {
        vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
    } else {
        vk::ImageAspectFlags::DEPTH
    }
}

pub fn has_stencil_component(format: vk::Format) -> bool {
    matches!(
        format,
        vk::Format::D32_SFLOAT_S8_UINT | vk::Format::D24_UNORM_S8_UINT
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upload_transitions_supported() {
        let first = image_layout_transition(
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        )
        .unwrap();
        assert_eq!(first.src_access, vk::AccessFlags::empty());
        assert_eq!(first.dst_access, vk::AccessFlags::TRANSFER_WRITE);
        assert_eq!(first.src_stage, vk::PipelineStageFlags::TOP_OF_PIPE);
        assert_eq!(first.dst_stage, vk::PipelineStageFlags::TRANSFER);

        let second = image_layout_transition(
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        )
        .unwrap();
        assert_eq!(second.src_access, vk::AccessFlags::TRANSFER_WRITE);
        assert_eq!(second.dst_access, vk::AccessFlags::SHADER_READ);
        assert_eq!(second.dst_stage, vk::PipelineStageFlags::FRAGMENT_SHADER);
    }

    #[test]
    fn test_other_transitions_rejected() {
        let pairs = [
            (
                vk::ImageLayout::UNDEFINED,
                vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            ),
            (
                vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            ),
            (
                vk::ImageLayout::UNDEFINED,
                vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
            ),
        ];
        for (old, new) in pairs {
            match image_layout_transition(old, new) {
                Err(RhiError::UnsupportedLayoutTransition { old: o, new: n }) => {
                    assert_eq!((o, n), (old, new));
                }
                other => panic!("expected rejection for {:?} -> {:?}, got {:?}", old, new, other),
            }
        }
    }

    #[test]
    fn test_depth_aspect() {
        assert_eq!(
            depth_aspect(vk::Format::D32_SFLOAT),
            vk::ImageAspectFlags::DEPTH
        );
        assert_eq!(
            depth_aspect(vk::Format::D24_UNORM_S8_UINT),
            vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
        );
    }
}
