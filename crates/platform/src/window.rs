//! Window management using winit.
//!
//! Provides the window, the Vulkan surface created from it, and the
//! framebuffer-extent source used while the swapchain is being rebuilt.

use std::ffi::c_char;
use std::sync::Arc;
use std::time::Duration;

use ash::vk;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use winit::dpi::PhysicalSize;
use winit::event_loop::ActiveEventLoop;
use winit::window::{Window as WinitWindow, WindowAttributes};

use ember_core::config::WindowConfig;
use ember_core::{Error, Result};
use ember_rhi::instance::Instance;

/// How long [`ExtentSource::wait_events`] sleeps on a winit window.
pub const EXTENT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Source of the current framebuffer size.
///
/// Swapchain recreation blocks on this while the framebuffer has zero area,
/// calling [`wait_events`](Self::wait_events) between polls.
pub trait ExtentSource {
    /// Current framebuffer size in pixels. Zero while minimised.
    fn framebuffer_extent(&self) -> vk::Extent2D;

    /// Gives the windowing system a chance to deliver a new size.
    fn wait_events(&self);
}

/// Whether `extent` has zero area.
#[inline]
pub fn is_zero_extent(extent: vk::Extent2D) -> bool {
    extent.width == 0 || extent.height == 0
}

/// RAII wrapper for a Vulkan surface.
///
/// The instance that created it must outlive it.
pub struct Surface {
    handle: vk::SurfaceKHR,
    surface_loader: ash::khr::surface::Instance,
}

impl Surface {
    #[inline]
    pub fn handle(&self) -> vk::SurfaceKHR {
        self.handle
    }

    /// Surface loader, for capability, format and present-mode queries.
    #[inline]
    pub fn loader(&self) -> &ash::khr::surface::Instance {
        &self.surface_loader
    }
}

impl Drop for Surface {
    fn drop(&mut self) {
        // SAFETY: the handle came from ash_window::create_surface on the same
        // instance as the loader, and is destroyed only here.
        unsafe {
            self.surface_loader.destroy_surface(self.handle, None);
        }
        tracing::debug!("Vulkan surface destroyed");
    }
}

/// A winit window plus the raw handles needed for surface creation.
pub struct Window {
    window: Arc<WinitWindow>,
}

impl Window {
    pub fn new(event_loop: &ActiveEventLoop, config: &WindowConfig) -> Result<Self> {
        let attrs = WindowAttributes::default()
            .with_title(config.title.as_str())
            .with_inner_size(PhysicalSize::new(config.width, config.height))
            .with_resizable(true);

        let window = event_loop
            .create_window(attrs)
            .map_err(|e| Error::Window(e.to_string()))?;

        tracing::info!("Window created: {}x{}", config.width, config.height);

        Ok(Self {
            window: Arc::new(window),
        })
    }

    pub fn is_minimized(&self) -> bool {
        is_zero_extent(self.framebuffer_extent())
    }

    pub fn request_redraw(&self) {
        self.window.request_redraw();
    }

    /// Instance extensions needed to create a surface for this window.
    pub fn required_extensions(&self) -> Result<Vec<*const c_char>> {
        let display_handle = self
            .window
            .display_handle()
            .map_err(|e| Error::Window(format!("Failed to get display handle: {}", e)))?;

        required_extensions(display_handle.as_raw())
    }

    /// Creates a Vulkan surface for this window.
    pub fn create_surface(&self, instance: &Instance) -> Result<Surface> {
        let display_handle = self
            .window
            .display_handle()
            .map_err(|e| Error::Window(format!("Failed to get display handle: {}", e)))?;

        let window_handle = self
            .window
            .window_handle()
            .map_err(|e| Error::Window(format!("Failed to get window handle: {}", e)))?;

        // SAFETY: the entry and instance are alive for the duration of the
        // call, and the handles come from a live winit window.
        let handle = unsafe {
            ash_window::create_surface(
                instance.entry(),
                instance.handle(),
                display_handle.as_raw(),
                window_handle.as_raw(),
                None,
            )
            .map_err(|e| Error::Vulkan(format!("Failed to create Vulkan surface: {}", e)))?
        };

        let surface_loader = ash::khr::surface::Instance::new(instance.entry(), instance.handle());

        tracing::info!("Vulkan surface created");

        Ok(Surface {
            handle,
            surface_loader,
        })
    }
}

impl ExtentSource for Window {
    fn framebuffer_extent(&self) -> vk::Extent2D {
        let size = self.window.inner_size();
        vk::Extent2D {
            width: size.width,
            height: size.height,
        }
    }

    // winit 0.30 delivers events only through the running event loop, so
    // this cannot pump it. Sleeping lets the OS-side size settle; the driver
    // also skips frames while minimised, so this loop rarely spins.
    fn wait_events(&self) {
        std::thread::sleep(EXTENT_POLL_INTERVAL);
    }
}

/// Instance extensions needed to create a surface on `display_handle`.
///
/// The pointers refer to static strings owned by `ash-window`.
pub fn required_extensions(
    display_handle: raw_window_handle::RawDisplayHandle,
) -> Result<Vec<*const c_char>> {
    let extensions = ash_window::enumerate_required_extensions(display_handle)
        .map_err(|e| Error::Vulkan(format!("Failed to enumerate required extensions: {}", e)))?;

    tracing::debug!(
        "Required Vulkan extensions for surface: {:?}",
        extensions
            .iter()
            // SAFETY: ash_window returns pointers to static, null-terminated names.
            .map(|&ext| unsafe { std::ffi::CStr::from_ptr(ext) })
            .collect::<Vec<_>>()
    );

    Ok(extensions.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_zero_extent() {
        let extent = |width, height| vk::Extent2D { width, height };
        assert!(is_zero_extent(extent(0, 0)));
        assert!(is_zero_extent(extent(800, 0)));
        assert!(is_zero_extent(extent(0, 600)));
        assert!(!is_zero_extent(extent(800, 600)));
    }

    #[test]
    fn test_extent_source_is_object_safe() {
        struct Fixed;
        impl ExtentSource for Fixed {
            fn framebuffer_extent(&self) -> vk::Extent2D {
                vk::Extent2D {
                    width: 640,
                    height: 480,
                }
            }
            fn wait_events(&self) {}
        }

        let source: &dyn ExtentSource = &Fixed;
        source.wait_events();
        assert_eq!(source.framebuffer_extent().width, 640);
    }
}
