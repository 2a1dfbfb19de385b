//! Vulkan logical device and queue management.
//!
//! The [`Device`] owns the `VkDevice`, the graphics and present queues, and
//! the memory properties of the adapter it was created from. Everything
//! else in this crate holds an `Arc<Device>` and must be dropped before it.
//!
//! # Example
//!
//! ```no_run
//! use ember_rhi::instance::Instance;
//! use ember_rhi::physical_device::{Requirements, select_physical_device};
//! use ember_rhi::device::Device;
//! use ash::vk;
//!
//! let instance = Instance::new("demo", &[], false).expect("Failed to create instance");
//! let surface: vk::SurfaceKHR = vk::SurfaceKHR::null(); // placeholder
//! let surface_loader = ash::khr::surface::Instance::new(instance.entry(), instance.handle());
//!
//! let info = select_physical_device(
//!     instance.handle(),
//!     surface,
//!     &surface_loader,
//!     &Requirements::default(),
//! )
//! .expect("No suitable GPU found");
//!
//! let device = Device::new(&instance, &info).expect("Failed to create logical device");
//! let graphics_queue = device.graphics_queue();
//! ```

use std::ffi::{CStr, c_char};
use std::sync::Arc;

use ash::vk;
use tracing::{debug, error, info};

use crate::error::{RhiError, RhiResult};
use crate::instance::Instance;
use crate::memory::find_memory_type;
use crate::physical_device::PhysicalDeviceInfo;

/// Required device extensions.
pub const DEVICE_EXTENSIONS: &[&CStr] = &[ash::khr::swapchain::NAME];

/// Vulkan logical device wrapper.
///
/// Shared through `Arc`. Queue submission is externally synchronized by the
/// single render thread.
pub struct Device {
    device: ash::Device,
    instance: ash::Instance,
    physical_device: vk::PhysicalDevice,
    properties: vk::PhysicalDeviceProperties,
    memory_properties: vk::PhysicalDeviceMemoryProperties,
    graphics_queue: vk::Queue,
    present_queue: vk::Queue,
    graphics_family: u32,
    present_family: u32,
}

impl Device {
    /// Creates the logical device with [`DEVICE_EXTENSIONS`] and sampler
    /// anisotropy enabled, and fetches queue 0 of the graphics and present
    /// families.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::InvalidArgument`] if the queue families were not
    /// resolved during selection, or the Vulkan error from device creation.
    pub fn new(instance: &Instance, info: &PhysicalDeviceInfo) -> RhiResult<Arc<Self>> {
        let (Some(graphics_family), Some(present_family)) = (
            info.queue_families.graphics_family,
            info.queue_families.present_family,
        ) else {
            return Err(RhiError::InvalidArgument(
                "physical device has no graphics/present queue family".into(),
            ));
        };

        let unique_families = info.queue_families.unique_families();
        let queue_priorities = [1.0f32];

        let queue_create_infos: Vec<vk::DeviceQueueCreateInfo> = unique_families
            .iter()
            .map(|&family| {
                vk::DeviceQueueCreateInfo::default()
                    .queue_family_index(family)
                    .queue_priorities(&queue_priorities)
            })
            .collect();

        debug!(
            "Creating {} queue(s) for families: {:?}",
            queue_create_infos.len(),
            unique_families
        );

        let features = vk::PhysicalDeviceFeatures::default().sampler_anisotropy(true);

        let extension_names: Vec<*const c_char> =
            DEVICE_EXTENSIONS.iter().map(|ext| ext.as_ptr()).collect();

        let create_info = vk::DeviceCreateInfo::default()
            .queue_create_infos(&queue_create_infos)
            .enabled_extension_names(&extension_names)
            .enabled_features(&features);

        let device = unsafe {
            instance
                .handle()
                .create_device(info.device, &create_info, None)?
        };

        info!(
            "Logical device created with {} extension(s)",
            DEVICE_EXTENSIONS.len()
        );

        let graphics_queue = unsafe { device.get_device_queue(graphics_family, 0) };
        let present_queue = unsafe { device.get_device_queue(present_family, 0) };
        debug!(
            "Queues retrieved: graphics family {}, present family {}",
            graphics_family, present_family
        );

        Ok(Arc::new(Self {
            device,
            instance: instance.handle().clone(),
            physical_device: info.device,
            properties: info.properties,
            memory_properties: info.memory_properties,
            graphics_queue,
            present_queue,
            graphics_family,
            present_family,
        }))
    }

    /// Returns the Vulkan logical device handle.
    #[inline]
    pub fn handle(&self) -> &ash::Device {
        &self.device
    }

    /// Returns the physical device handle.
    #[inline]
    pub fn physical_device(&self) -> vk::PhysicalDevice {
        self.physical_device
    }

    #[inline]
    pub fn graphics_queue(&self) -> vk::Queue {
        self.graphics_queue
    }

    #[inline]
    pub fn present_queue(&self) -> vk::Queue {
        self.present_queue
    }

    #[inline]
    pub fn graphics_family(&self) -> u32 {
        self.graphics_family
    }

    #[inline]
    pub fn present_family(&self) -> u32 {
        self.present_family
    }

    /// Device limits (anisotropy, alignment, ...).
    #[inline]
    pub fn limits(&self) -> &vk::PhysicalDeviceLimits {
        &self.properties.limits
    }

    /// Memory type index for `requirements` with at least `flags`.
    pub fn memory_type_index(
        &self,
        requirements: &vk::MemoryRequirements,
        flags: vk::MemoryPropertyFlags,
    ) -> RhiResult<u32> {
        find_memory_type(&self.memory_properties, requirements.memory_type_bits, flags)
    }

    /// First format in `candidates` whose `tiling` features include `features`.
    pub fn find_supported_format(
        &self,
        candidates: &[vk::Format],
        tiling: vk::ImageTiling,
        features: vk::FormatFeatureFlags,
    ) -> RhiResult<vk::Format> {
        candidates
            .iter()
            .copied()
            .find(|&format| {
                let props = unsafe {
                    self.instance
                        .get_physical_device_format_properties(self.physical_device, format)
                };
                match tiling {
                    vk::ImageTiling::LINEAR => props.linear_tiling_features.contains(features),
                    vk::ImageTiling::OPTIMAL => props.optimal_tiling_features.contains(features),
                    _ => false,
                }
            })
            .ok_or_else(|| RhiError::NoSupportedFormat(candidates.to_vec()))
    }

    /// Waits for the device to become idle.
    ///
    /// Blocks until all outstanding work on every queue has completed.
    pub fn wait_idle(&self) -> RhiResult<()> {
        unsafe { self.device.device_wait_idle()? };
        Ok(())
    }

    /// Submits command buffers to the graphics queue.
    ///
    /// # Safety
    ///
    /// The caller must ensure:
    /// - All command buffers are valid and fully recorded
    /// - Wait and signal semaphores are not in use by another pending submission
    /// - The fence (if not null) is unsignaled and not in use
    pub unsafe fn submit_graphics(
        &self,
        submit_infos: &[vk::SubmitInfo],
        fence: vk::Fence,
    ) -> RhiResult<()> {
        unsafe {
            self.device
                .queue_submit(self.graphics_queue, submit_infos, fence)?;
        }
        Ok(())
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        unsafe {
            if let Err(e) = self.device.device_wait_idle() {
                error!("Failed to wait for device idle during drop: {:?}", e);
            }
            self.device.destroy_device(None);
        }
        info!("Logical device destroyed");
    }
}

// Safety: ash::Device and ash::Instance are function tables, the remaining
// fields are plain handles and data. Queue access is serialized by callers.
unsafe impl Send for Device {}
unsafe impl Sync for Device {}
