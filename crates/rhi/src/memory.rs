//! Device memory type selection and raw allocation.
//!
//! Buffers and images in this crate each own one dedicated
//! `VkDeviceMemory` allocation. The number of objects is small and fixed
//! (a mesh, a texture, a depth image and one uniform buffer per frame), so
//! there is no sub-allocator.

use ash::vk;
use tracing::debug;

use crate::device::Device;
use crate::error::{RhiError, RhiResult};

/// Returns the first memory type index that is allowed by `type_filter`
/// and whose property flags contain all of `required`.
///
/// # Errors
///
/// [`RhiError::NoSuitableMemoryType`] when nothing matches. This is a
/// configuration problem and is not retried.
pub fn find_memory_type(
    memory_properties: &vk::PhysicalDeviceMemoryProperties,
    type_filter: u32,
    required: vk::MemoryPropertyFlags,
) -> RhiResult<u32> {
    let count = memory_properties.memory_type_count.min(vk::MAX_MEMORY_TYPES as u32);

    (0..count)
        .find(|&i| {
            (type_filter >> i) & 1 == 1
                && memory_properties.memory_types[i as usize]
                    .property_flags
                    .contains(required)
        })
        .ok_or(RhiError::NoSuitableMemoryType {
            type_filter,
            required,
        })
}

/// Allocates memory satisfying `requirements` with at least `flags`.
pub(crate) fn allocate(
    device: &Device,
    requirements: vk::MemoryRequirements,
    flags: vk::MemoryPropertyFlags,
) -> RhiResult<vk::DeviceMemory> {
    let memory_type_index = device.memory_type_index(&requirements, flags)?;

    let alloc_info = vk::MemoryAllocateInfo::default()
        .allocation_size(requirements.size)
        .memory_type_index(memory_type_index);

    let memory = unsafe { device.handle().allocate_memory(&alloc_info, None)? };
    debug!(
        "Allocated {} bytes from memory type {} ({:?})",
        requirements.size, memory_type_index, flags
    );
    Ok(memory)
}
