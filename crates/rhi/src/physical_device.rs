//! Physical device (GPU) selection.
//!
//! Selection is first-fit: adapters are visited in enumeration order and the
//! first one passing every check in [`check_suitability`] is taken. There is
//! no scoring.
//!
//! The checks run on an [`AdapterCandidate`], a plain snapshot of everything
//! the driver reports about an adapter, so the policy can be exercised
//! without a GPU.
//!
//! # Example
//!
//! ```no_run
//! use ember_rhi::instance::Instance;
//! use ember_rhi::physical_device::{Requirements, select_physical_device};
//! use ash::vk;
//!
//! let instance = Instance::new("demo", &[], false).expect("Failed to create instance");
//! let surface: vk::SurfaceKHR = vk::SurfaceKHR::null(); // placeholder
//! let surface_loader = ash::khr::surface::Instance::new(instance.entry(), instance.handle());
//!
//! let device_info = select_physical_device(
//!     instance.handle(),
//!     surface,
//!     &surface_loader,
//!     &Requirements::default(),
//! )
//! .expect("Failed to select physical device");
//!
//! println!("Selected GPU: {:?}", device_info.device_name());
//! ```

use std::ffi::CStr;

use ash::vk;
use tracing::{debug, info, warn};

use crate::device::DEVICE_EXTENSIONS;
use crate::error::{RhiError, RhiResult};
use crate::instance::API_VERSION;

/// Queue family indices for the two queue roles the engine uses.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct QueueFamilyIndices {
    /// Index of the queue family that supports graphics operations.
    pub graphics_family: Option<u32>,
    /// Index of the queue family that supports presentation to the surface.
    pub present_family: Option<u32>,
}

impl QueueFamilyIndices {
    /// Both graphics and present families were found.
    #[inline]
    pub fn is_complete(&self) -> bool {
        self.graphics_family.is_some() && self.present_family.is_some()
    }

    /// Returns the unique queue family indices, graphics first.
    ///
    /// Used when creating the logical device so a shared family gets a
    /// single queue create info.
    pub fn unique_families(&self) -> Vec<u32> {
        let mut families = Vec::with_capacity(2);

        if let Some(graphics) = self.graphics_family {
            families.push(graphics);
        }
        if let Some(present) = self.present_family
            && !families.contains(&present)
        {
            families.push(present);
        }

        families
    }
}

/// Device features an adapter must expose.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RequiredFeatures {
    pub sampler_anisotropy: bool,
    pub geometry_shader: bool,
}

impl RequiredFeatures {
    fn satisfied_by(&self, features: &vk::PhysicalDeviceFeatures) -> bool {
        (!self.sampler_anisotropy || features.sampler_anisotropy == vk::TRUE)
            && (!self.geometry_shader || features.geometry_shader == vk::TRUE)
    }
}

/// Everything an adapter must satisfy to be selected.
#[derive(Clone, Debug)]
pub struct Requirements {
    /// Lowest acceptable `VkPhysicalDeviceProperties::apiVersion`.
    pub min_api_version: u32,
    /// Required adapter class.
    pub device_type: vk::PhysicalDeviceType,
    pub features: RequiredFeatures,
    pub extensions: Vec<&'static CStr>,
}

impl Default for Requirements {
    fn default() -> Self {
        Self {
            min_api_version: API_VERSION,
            device_type: vk::PhysicalDeviceType::DISCRETE_GPU,
            features: RequiredFeatures {
                sampler_anisotropy: true,
                geometry_shader: true,
            },
            extensions: DEVICE_EXTENSIONS.to_vec(),
        }
    }
}

/// Why an adapter was rejected. Checks run in the order listed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Unsuitable {
    ApiVersionTooLow { found: u32, required: u32 },
    WrongDeviceType(vk::PhysicalDeviceType),
    MissingFeatures,
    NoGraphicsQueue,
    NoPresentQueue,
    MissingExtension(String),
    NoSurfaceFormats,
    NoPresentModes,
}

impl std::fmt::Display for Unsuitable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ApiVersionTooLow { found, required } => write!(
                f,
                "API version {}.{} below required {}.{}",
                vk::api_version_major(*found),
                vk::api_version_minor(*found),
                vk::api_version_major(*required),
                vk::api_version_minor(*required)
            ),
            Self::WrongDeviceType(ty) => write!(f, "device type {:?} not accepted", ty),
            Self::MissingFeatures => write!(f, "required device features missing"),
            Self::NoGraphicsQueue => write!(f, "no graphics queue family"),
            Self::NoPresentQueue => write!(f, "no queue family can present to the surface"),
            Self::MissingExtension(name) => write!(f, "extension {} not supported", name),
            Self::NoSurfaceFormats => write!(f, "surface reports no formats"),
            Self::NoPresentModes => write!(f, "surface reports no present modes"),
        }
    }
}

/// Snapshot of an adapter's capabilities relevant to selection.
#[derive(Clone, Debug, Default)]
pub struct AdapterCandidate {
    pub properties: vk::PhysicalDeviceProperties,
    pub features: vk::PhysicalDeviceFeatures,
    pub queue_families: Vec<vk::QueueFamilyProperties>,
    /// Present support for the target surface, indexed like `queue_families`.
    pub present_support: Vec<bool>,
    pub extensions: Vec<String>,
    pub surface_format_count: usize,
    pub present_mode_count: usize,
}

impl AdapterCandidate {
    /// Query a real adapter.
    pub fn query(
        instance: &ash::Instance,
        device: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
        surface_loader: &ash::khr::surface::Instance,
    ) -> RhiResult<Self> {
        let properties = unsafe { instance.get_physical_device_properties(device) };
        let features = unsafe { instance.get_physical_device_features(device) };
        let queue_families = unsafe { instance.get_physical_device_queue_family_properties(device) };

        let mut present_support = Vec::with_capacity(queue_families.len());
        for index in 0..queue_families.len() as u32 {
            let supported = unsafe {
                surface_loader.get_physical_device_surface_support(device, index, surface)?
            };
            present_support.push(supported);
        }

        let extensions = unsafe { instance.enumerate_device_extension_properties(device)? }
            .iter()
            .filter_map(|ext| ext.extension_name_as_c_str().ok())
            .map(|name| name.to_string_lossy().into_owned())
            .collect();

        let surface_format_count =
            unsafe { surface_loader.get_physical_device_surface_formats(device, surface)? }.len();
        let present_mode_count = unsafe {
            surface_loader.get_physical_device_surface_present_modes(device, surface)?
        }
        .len();

        Ok(Self {
            properties,
            features,
            queue_families,
            present_support,
            extensions,
            surface_format_count,
            present_mode_count,
        })
    }

    /// Returns the device name as a string.
    pub fn device_name(&self) -> String {
        self.properties
            .device_name_as_c_str()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|_| "Unknown Device".to_string())
    }
}

/// Finds the graphics family and a present family for it.
///
/// Graphics is the first family with `GRAPHICS`. Present reuses that family
/// when it can present, otherwise the first family that can.
pub fn find_queue_families(
    queue_families: &[vk::QueueFamilyProperties],
    present_support: &[bool],
) -> QueueFamilyIndices {
    let graphics_family = queue_families
        .iter()
        .position(|family| {
            family.queue_count > 0 && family.queue_flags.contains(vk::QueueFlags::GRAPHICS)
        })
        .map(|i| i as u32);

    let supports_present = |i: u32| present_support.get(i as usize).copied().unwrap_or(false);

    let present_family = match graphics_family {
        Some(g) if supports_present(g) => Some(g),
        _ => (0..queue_families.len() as u32)
            .find(|&i| queue_families[i as usize].queue_count > 0 && supports_present(i)),
    };

    QueueFamilyIndices {
        graphics_family,
        present_family,
    }
}

/// Runs every suitability check against `candidate`, in order.
///
/// Returns the queue families to use on success, or the first failed check.
pub fn check_suitability(
    candidate: &AdapterCandidate,
    requirements: &Requirements,
) -> Result<QueueFamilyIndices, Unsuitable> {
    let props = &candidate.properties;

    if props.api_version < requirements.min_api_version {
        return Err(Unsuitable::ApiVersionTooLow {
            found: props.api_version,
            required: requirements.min_api_version,
        });
    }

    if props.device_type != requirements.device_type {
        return Err(Unsuitable::WrongDeviceType(props.device_type));
    }

    if !requirements.features.satisfied_by(&candidate.features) {
        return Err(Unsuitable::MissingFeatures);
    }

    let indices = find_queue_families(&candidate.queue_families, &candidate.present_support);
    if indices.graphics_family.is_none() {
        return Err(Unsuitable::NoGraphicsQueue);
    }
    if indices.present_family.is_none() {
        return Err(Unsuitable::NoPresentQueue);
    }

    for required in &requirements.extensions {
        let required = required.to_string_lossy();
        if !candidate.extensions.iter().any(|ext| *ext == required) {
            return Err(Unsuitable::MissingExtension(required.into_owned()));
        }
    }

    if candidate.surface_format_count == 0 {
        return Err(Unsuitable::NoSurfaceFormats);
    }
    if candidate.present_mode_count == 0 {
        return Err(Unsuitable::NoPresentModes);
    }

    Ok(indices)
}

/// Information about the selected physical device.
#[derive(Clone)]
pub struct PhysicalDeviceInfo {
    /// Vulkan physical device handle.
    pub device: vk::PhysicalDevice,
    /// Device properties (name, limits, API version, etc.).
    pub properties: vk::PhysicalDeviceProperties,
    /// Supported device features.
    pub features: vk::PhysicalDeviceFeatures,
    /// Memory heaps and types, consulted by every allocation.
    pub memory_properties: vk::PhysicalDeviceMemoryProperties,
    /// Queue family indices chosen during selection.
    pub queue_families: QueueFamilyIndices,
}

impl PhysicalDeviceInfo {
    /// Returns the device name as a string.
    pub fn device_name(&self) -> &str {
        self.properties
            .device_name_as_c_str()
            .ok()
            .and_then(|name| name.to_str().ok())
            .unwrap_or("Unknown Device")
    }

    /// Returns a human-readable string for the device type.
    pub fn device_type_name(&self) -> &'static str {
        device_type_name(self.properties.device_type)
    }

    /// Returns the Vulkan API version supported by the device.
    pub fn api_version(&self) -> (u32, u32, u32) {
        let version = self.properties.api_version;
        (
            vk::api_version_major(version),
            vk::api_version_minor(version),
            vk::api_version_patch(version),
        )
    }
}

impl std::fmt::Debug for PhysicalDeviceInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (major, minor, patch) = self.api_version();
        f.debug_struct("PhysicalDeviceInfo")
            .field("name", &self.device_name())
            .field("type", &self.device_type_name())
            .field("api_version", &format!("{}.{}.{}", major, minor, patch))
            .field("queue_families", &self.queue_families)
            .finish()
    }
}

fn device_type_name(ty: vk::PhysicalDeviceType) -> &'static str {
    match ty {
        vk::PhysicalDeviceType::DISCRETE_GPU => "Discrete GPU",
        vk::PhysicalDeviceType::INTEGRATED_GPU => "Integrated GPU",
        vk::PhysicalDeviceType::VIRTUAL_GPU => "Virtual GPU",
        vk::PhysicalDeviceType::CPU => "CPU",
        _ => "Other",
    }
}

/// Index of the first candidate passing every check.
pub fn first_suitable(
    candidates: &[AdapterCandidate],
    requirements: &Requirements,
) -> Option<(usize, QueueFamilyIndices)> {
    candidates.iter().enumerate().find_map(|(i, candidate)| {
        match check_suitability(candidate, requirements) {
            Ok(indices) => Some((i, indices)),
            Err(reason) => {
                debug!("GPU '{}' skipped: {}", candidate.device_name(), reason);
                None
            }
        }
    })
}

/// Selects the first physical device that satisfies `requirements`.
///
/// # Errors
///
/// Returns [`RhiError::NoSuitableGpu`] if no adapter passes.
pub fn select_physical_device(
    instance: &ash::Instance,
    surface: vk::SurfaceKHR,
    surface_loader: &ash::khr::surface::Instance,
    requirements: &Requirements,
) -> RhiResult<PhysicalDeviceInfo> {
    let devices = unsafe { instance.enumerate_physical_devices()? };

    if devices.is_empty() {
        warn!("No Vulkan-capable GPUs found");
        return Err(RhiError::NoSuitableGpu);
    }

    info!("Found {} GPU(s)", devices.len());

    let candidates = devices
        .iter()
        .map(|&device| AdapterCandidate::query(instance, device, surface, surface_loader))
        .collect::<RhiResult<Vec<_>>>()?;

    let Some((index, queue_families)) = first_suitable(&candidates, requirements) else {
        warn!("No GPU satisfies the required capabilities");
        return Err(RhiError::NoSuitableGpu);
    };

    let device = devices[index];
    let candidate = &candidates[index];
    let selected = PhysicalDeviceInfo {
        device,
        properties: candidate.properties,
        features: candidate.features,
        memory_properties: unsafe { instance.get_physical_device_memory_properties(device) },
        queue_families,
    };

    let (major, minor, patch) = selected.api_version();
    info!(
        "Selected GPU: '{}' ({}) - Vulkan {}.{}.{}, graphics family {:?}, present family {:?}",
        selected.device_name(),
        selected.device_type_name(),
        major,
        minor,
        patch,
        queue_families.graphics_family,
        queue_families.present_family,
    );

    Ok(selected)
}
