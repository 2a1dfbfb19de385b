//! Per-frame-in-flight resources.

use std::sync::Arc;

use ash::vk;
use tracing::{debug, info};

use ember_rhi::RhiResult;
use ember_rhi::buffer::{Buffer, BufferUsage};
use ember_rhi::command::{CommandBuffer, CommandPool};
use ember_rhi::descriptor::{DescriptorPool, DescriptorSetLayout, write_mesh_set};
use ember_rhi::device::Device;
use ember_rhi::sync::FrameSync;
use ember_rhi::texture::Texture;

use crate::MAX_FRAMES_IN_FLIGHT;
use crate::ubo::UniformBufferObject;

/// One slot of the frames-in-flight ring.
///
/// # Synchronization Flow
///
/// ```text
/// 1. Wait on in_flight_fence (CPU waits for previous use of this slot)
/// 2. Acquire swapchain image (signals image_available_semaphore)
/// 3. Write uniform_buffer through its persistent mapping
/// 4. Reset in_flight_fence, re-record command_buffer
/// 5. Submit command_buffer:
///    - Wait on image_available_semaphore
///    - Signal render_finished_semaphore
///    - Signal in_flight_fence
/// 6. Present (waits on render_finished_semaphore)
/// ```
pub struct FrameSlot {
    /// Freed with the command pool.
    command_buffer: CommandBuffer,
    sync: FrameSync,
    uniform_buffer: Buffer,
    /// Freed with the descriptor pool.
    descriptor_set: vk::DescriptorSet,
}

impl FrameSlot {
    #[inline]
    pub fn command_buffer(&self) -> &CommandBuffer {
        &self.command_buffer
    }

    #[inline]
    pub fn sync(&self) -> &FrameSync {
        &self.sync
    }

    #[inline]
    pub fn uniform_buffer(&self) -> &Buffer {
        &self.uniform_buffer
    }

    #[inline]
    pub fn descriptor_set(&self) -> vk::DescriptorSet {
        self.descriptor_set
    }
}

/// Creates the fixed ring of [`MAX_FRAMES_IN_FLIGHT`] slots.
///
/// Each slot's descriptor set points at its own uniform buffer and the
/// shared `texture`. Sets are written once here and never updated.
pub fn create_frame_slots(
    device: &Arc<Device>,
    command_pool: &CommandPool,
    descriptor_pool: &DescriptorPool,
    descriptor_set_layout: &DescriptorSetLayout,
    texture: &Texture,
) -> RhiResult<Vec<FrameSlot>> {
    let command_buffers = command_pool.allocate_command_buffers(MAX_FRAMES_IN_FLIGHT as u32)?;
    let layouts = [descriptor_set_layout.handle(); MAX_FRAMES_IN_FLIGHT];
    let descriptor_sets = descriptor_pool.allocate(&layouts)?;

    let mut slots = Vec::with_capacity(MAX_FRAMES_IN_FLIGHT);
    for (i, (command_buffer, descriptor_set)) in
        command_buffers.into_iter().zip(descriptor_sets).enumerate()
    {
        let uniform_buffer = Buffer::new(
            device.clone(),
            BufferUsage::Uniform,
            UniformBufferObject::SIZE as vk::DeviceSize,
        )?;
        uniform_buffer.write(&UniformBufferObject::default())?;
        write_mesh_set(device, descriptor_set, &uniform_buffer, texture);

        slots.push(FrameSlot {
            command_buffer,
            sync: FrameSync::new(device.clone())?,
            uniform_buffer,
            descriptor_set,
        });
        debug!("Created frame slot {}", i);
    }

    info!("Created {} frame slots", slots.len());
    Ok(slots)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_max_frames_in_flight_constant() {
        assert_eq!(MAX_FRAMES_IN_FLIGHT, 2);
    }

    #[test]
    fn test_frame_slot_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<FrameSlot>();
    }
}
