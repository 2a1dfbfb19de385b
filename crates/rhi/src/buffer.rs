//! GPU buffer management.
//!
//! - [`BufferUsage`] picks the Vulkan usage flags and memory properties
//! - [`Buffer`] owns a VkBuffer and its dedicated VkDeviceMemory
//!
//! Host-visible buffers (uniform, staging) are mapped once at creation and
//! stay mapped until drop. Vertex and index buffers live in device-local
//! memory and are filled through a staged transfer.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use ember_rhi::device::Device;
//! use ember_rhi::buffer::{Buffer, BufferUsage};
//! use ember_rhi::command::CommandPool;
//!
//! # fn example(device: Arc<Device>, pool: &CommandPool) -> Result<(), ember_rhi::RhiError> {
//! let indices: [u32; 3] = [0, 1, 2];
//! let index_buffer = Buffer::new_device_local(
//!     device,
//!     pool,
//!     BufferUsage::Index,
//!     bytemuck::cast_slice(&indices),
//! )?;
//! # Ok(())
//! # }
//! ```

use std::ptr::NonNull;
use std::sync::Arc;

use ash::vk;
use tracing::debug;

use crate::command::CommandPool;
use crate::device::Device;
use crate::error::{RhiError, RhiResult};
use crate::memory;

/// Buffer usage type.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BufferUsage {
    /// Vertex buffer, device-local, filled by staged transfer
    Vertex,
    /// Index buffer, device-local, filled by staged transfer
    Index,
    /// Uniform buffer, host-visible and persistently mapped
    Uniform,
    /// Staging buffer, host-visible source of a transfer
    Staging,
}

impl BufferUsage {
    /// Converts to Vulkan buffer usage flags.
    pub fn to_vk_usage(self) -> vk::BufferUsageFlags {
        match self {
            BufferUsage::Vertex => {
                vk::BufferUsageFlags::VERTEX_BUFFER | vk::BufferUsageFlags::TRANSFER_DST
            }
            BufferUsage::Index => {
                vk::BufferUsageFlags::INDEX_BUFFER | vk::BufferUsageFlags::TRANSFER_DST
            }
            BufferUsage::Uniform => vk::BufferUsageFlags::UNIFORM_BUFFER,
            BufferUsage::Staging => vk::BufferUsageFlags::TRANSFER_SRC,
        }
    }

    /// Memory properties the backing allocation must have.
    pub fn memory_flags(self) -> vk::MemoryPropertyFlags {
        match self {
            BufferUsage::Vertex | BufferUsage::Index => vk::MemoryPropertyFlags::DEVICE_LOCAL,
            BufferUsage::Uniform | BufferUsage::Staging => {
                vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT
            }
        }
    }

    /// Whether the buffer is mapped for its whole lifetime.
    pub fn is_host_visible(self) -> bool {
        self.memory_flags()
            .contains(vk::MemoryPropertyFlags::HOST_VISIBLE)
    }

    /// Returns a human-readable name for the buffer type.
    pub fn name(self) -> &'static str {
        match self {
            BufferUsage::Vertex => "vertex",
            BufferUsage::Index => "index",
            BufferUsage::Uniform => "uniform",
            BufferUsage::Staging => "staging",
        }
    }
}

/// GPU buffer with a dedicated memory allocation.
///
/// Drop destroys the buffer before freeing the memory bound to it.
pub struct Buffer {
    device: Arc<Device>,
    buffer: vk::Buffer,
    memory: vk::DeviceMemory,
    mapped: Option<NonNull<u8>>,
    size: vk::DeviceSize,
    usage: BufferUsage,
}

impl Buffer {
    /// Creates a buffer of `size` bytes with memory chosen for `usage`.
    ///
    /// # Errors
    ///
    /// [`RhiError::InvalidArgument`] for a zero size,
    /// [`RhiError::NoSuitableMemoryType`] when no memory type fits, or the
    /// Vulkan error from creation, allocation, binding or mapping.
    pub fn new(device: Arc<Device>, usage: BufferUsage, size: vk::DeviceSize) -> RhiResult<Self> {
        if size == 0 {
            return Err(RhiError::InvalidArgument(
                "Buffer size must be greater than 0".to_string(),
            ));
        }

        let buffer_info = vk::BufferCreateInfo::default()
            .size(size)
            .usage(usage.to_vk_usage())
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let buffer = unsafe { device.handle().create_buffer(&buffer_info, None)? };

        let requirements = unsafe { device.handle().get_buffer_memory_requirements(buffer) };
        let memory = match memory::allocate(&device, requirements, usage.memory_flags()) {
            Ok(memory) => memory,
            Err(e) => {
                unsafe { device.handle().destroy_buffer(buffer, None) };
                return Err(e);
            }
        };

        // From here on `Drop` cleans up both handles on early return.
        let mut this = Self {
            device,
            buffer,
            memory,
            mapped: None,
            size,
            usage,
        };

        unsafe {
            this.device
                .handle()
                .bind_buffer_memory(this.buffer, this.memory, 0)?;
        }

        if usage.is_host_visible() {
            let ptr = unsafe {
                this.device.handle().map_memory(
                    this.memory,
                    0,
                    vk::WHOLE_SIZE,
                    vk::MemoryMapFlags::empty(),
                )?
            };
            this.mapped = NonNull::new(ptr.cast::<u8>());
        }

        debug!("Created {} buffer: {} bytes", usage.name(), size);
        Ok(this)
    }

    /// Creates a host-visible buffer and copies `data` into it.
    pub fn new_with_data(device: Arc<Device>, usage: BufferUsage, data: &[u8]) -> RhiResult<Self> {
        let buffer = Self::new(device, usage, data.len() as vk::DeviceSize)?;
        buffer.write_data(0, data)?;
        Ok(buffer)
    }

    /// Creates a device-local buffer holding `data` via a staged transfer.
    ///
    /// A staging buffer is filled through its mapping, copied on the
    /// graphics queue with a one-shot command buffer, and released once the
    /// copy has completed.
    pub fn new_device_local(
        device: Arc<Device>,
        pool: &CommandPool,
        usage: BufferUsage,
        data: &[u8],
    ) -> RhiResult<Self> {
        if usage.is_host_visible() {
            return Err(RhiError::InvalidArgument(format!(
                "{} buffers are host-visible and need no staging",
                usage.name()
            )));
        }

        let staging = Self::new_with_data(device.clone(), BufferUsage::Staging, data)?;
        let buffer = Self::new(device.clone(), usage, data.len() as vk::DeviceSize)?;

        let region = vk::BufferCopy {
            src_offset: 0,
            dst_offset: 0,
            size: buffer.size,
        };
        pool.execute_one_time(device.graphics_queue(), |cmd| {
            cmd.copy_buffer(staging.handle(), buffer.handle(), &[region]);
            Ok(())
        })?;

        debug!(
            "Uploaded {} bytes into {} buffer",
            data.len(),
            usage.name()
        );
        Ok(buffer)
    }

    /// Writes `data` through the persistent mapping at `offset`.
    ///
    /// # Errors
    ///
    /// [`RhiError::InvalidArgument`] if the buffer is not host-visible or
    /// the write would run past the end of the buffer.
    pub fn write_data(&self, offset: vk::DeviceSize, data: &[u8]) -> RhiResult<()> {
        if data.is_empty() {
            return Ok(());
        }

        let end = offset + data.len() as vk::DeviceSize;
        if end > self.size {
            return Err(RhiError::InvalidArgument(format!(
                "Write exceeds buffer size: offset {} + data {} > buffer {}",
                offset,
                data.len(),
                self.size
            )));
        }

        let mapped = self.mapped.ok_or_else(|| {
            RhiError::InvalidArgument(format!("{} buffer is not mapped", self.usage.name()))
        })?;

        unsafe {
            let dst = mapped.as_ptr().add(offset as usize);
            std::ptr::copy_nonoverlapping(data.as_ptr(), dst, data.len());
        }

        Ok(())
    }

    /// Writes a plain-old-data value at the start of the buffer.
    pub fn write<T: bytemuck::Pod>(&self, value: &T) -> RhiResult<()> {
        self.write_data(0, bytemuck::bytes_of(value))
    }

    /// Returns the Vulkan buffer handle.
    #[inline]
    pub fn handle(&self) -> vk::Buffer {
        self.buffer
    }

    /// Returns the buffer size in bytes.
    #[inline]
    pub fn size(&self) -> vk::DeviceSize {
        self.size
    }
}

/// Uploads `data` into a new device-local buffer of the given usage.
pub fn upload_buffer<T: bytemuck::Pod>(
    device: Arc<Device>,
    pool: &CommandPool,
    usage: BufferUsage,
    data: &[T],
) -> RhiResult<Buffer> {
    Buffer::new_device_local(device, pool, usage, bytemuck::cast_slice(data))
}

impl Drop for Buffer {
    fn drop(&mut self) {
        unsafe {
            if self.mapped.take().is_some() {
                self.device.handle().unmap_memory(self.memory);
            }
            self.device.handle().destroy_buffer(self.buffer, None);
            self.device.handle().free_memory(self.memory, None);
        }

        debug!("Destroyed {} buffer", self.usage.name());
    }
}

// Safety: the mapping is owned by this buffer and only written through
// `&self` methods that copy bytes; the GPU side is synchronized by fences.
unsafe impl Send for Buffer {}

impl std::fmt::Debug for Buffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Buffer")
            .field("usage", &self.usage)
            .field("size", &self.size)
            .field("mapped", &self.mapped.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_usage_to_vk_usage() {
        assert!(
            BufferUsage::Vertex
                .to_vk_usage()
                .contains(vk::BufferUsageFlags::VERTEX_BUFFER | vk::BufferUsageFlags::TRANSFER_DST)
        );
        assert!(
            BufferUsage::Index
                .to_vk_usage()
                .contains(vk::BufferUsageFlags::INDEX_BUFFER | vk::BufferUsageFlags::TRANSFER_DST)
        );
        assert!(
            BufferUsage::Uniform
                .to_vk_usage()
                .contains(vk::BufferUsageFlags::UNIFORM_BUFFER)
        );
        assert_eq!(
            BufferUsage::Staging.to_vk_usage(),
            vk::BufferUsageFlags::TRANSFER_SRC
        );
    }

    #[test]
    fn test_buffer_usage_memory_flags() {
        assert_eq!(
            BufferUsage::Vertex.memory_flags(),
            vk::MemoryPropertyFlags::DEVICE_LOCAL
        );
        assert_eq!(
            BufferUsage::Index.memory_flags(),
            vk::MemoryPropertyFlags::DEVICE_LOCAL
        );
        let host = vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT;
        assert_eq!(BufferUsage::Uniform.memory_flags(), host);
        assert_eq!(BufferUsage::Staging.memory_flags(), host);
    }

    #[test]
    fn test_only_host_buffers_are_mapped() {
        assert!(BufferUsage::Uniform.is_host_visible());
        assert!(BufferUsage::Staging.is_host_visible());
        assert!(!BufferUsage::Vertex.is_host_visible());
        assert!(!BufferUsage::Index.is_host_visible());
    }

    #[test]
    fn test_buffer_usage_name() {
        assert_eq!(BufferUsage::Vertex.name(), "vertex");
        assert_eq!(BufferUsage::Index.name(), "index");
        assert_eq!(BufferUsage::Uniform.name(), "uniform");
        assert_eq!(BufferUsage::Staging.name(), "staging");
    }

    #[test]
    fn test_buffer_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<Buffer>();
    }
}
