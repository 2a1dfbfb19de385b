//! The engine facade: owns every GPU object and runs one frame at a time.
//!
//! # Resource Destruction Order
//!
//! Fields of [`Engine`] are declared in reverse creation order, so Rust's
//! drop glue releases them dependents-first once [`Drop`] has waited for the
//! device to go idle:
//!
//! 1. Frame slots (uniform buffers, sync objects)
//! 2. Descriptor pool (frees the descriptor sets)
//! 3. Texture, index and vertex buffers
//! 4. Render targets (framebuffers, pipeline, render pass, depth, swapchain)
//! 5. Shaders and descriptor set layout
//! 6. Command pool (frees the command buffers)
//! 7. Device (last `Arc` reference)
//! 8. Surface
//! 9. Instance

use std::path::Path;
use std::sync::Arc;

use ash::vk;
use tracing::{debug, error, info};

use ember_core::config::{AssetsConfig, PipelineRebuild, PresentModePreference, RendererConfig};
use ember_platform::{ExtentSource, Surface, Window};
use ember_resources::{MeshData, TextureData, load_obj, load_rgba};
use ember_rhi::RhiError;
use ember_rhi::buffer::{Buffer, BufferUsage, upload_buffer};
use ember_rhi::command::CommandPool;
use ember_rhi::descriptor::{DescriptorPool, DescriptorSetLayout, mesh_bindings, pool_sizes};
use ember_rhi::device::Device;
use ember_rhi::image::find_depth_format;
use ember_rhi::instance::Instance;
use ember_rhi::physical_device::{Requirements, select_physical_device};
use ember_rhi::pipeline::{scissor, viewport};
use ember_rhi::render_pass::clear_values;
use ember_rhi::shader::{Shader, ShaderStage};
use ember_rhi::swapchain::{AcquireOutcome, PresentOutcome};
use ember_rhi::texture::Texture;

use crate::MAX_FRAMES_IN_FLIGHT;
use crate::error::{CreationContext, EngineError, EngineResult};
use crate::frame::{FrameSlot, create_frame_slots};
use crate::scheduler::{FrameBackend, FrameOutcome, FrameScheduler};
use crate::targets::{RenderTargets, TargetContext, wait_for_nonzero_extent};
use crate::ubo::UniformBufferObject;

/// Side length of the fallback checkerboard texture.
const FALLBACK_TEXTURE_SIZE: u32 = 256;
const FALLBACK_TEXTURE_CELLS: u32 = 8;

/// CPU-side data the engine uploads at start-up.
pub struct EngineAssets {
    pub mesh: MeshData,
    pub texture: TextureData,
    pub vertex_spirv: Vec<u8>,
    pub fragment_spirv: Vec<u8>,
}

impl EngineAssets {
    /// Loads the configured assets, substituting a cube and a checkerboard
    /// for an unset model or texture. Shaders are always read from disk.
    pub fn load(config: &AssetsConfig) -> EngineResult<Self> {
        let mesh = match &config.model {
            Some(path) => load_obj(path)?,
            None => {
                info!("No model configured, using built-in cube");
                MeshData::textured_cube()
            }
        };

        let texture = match &config.texture {
            Some(path) => load_rgba(path)?,
            None => {
                info!("No texture configured, using checkerboard");
                TextureData::checkerboard(FALLBACK_TEXTURE_SIZE, FALLBACK_TEXTURE_CELLS)
            }
        };

        Ok(Self {
            mesh,
            texture,
            vertex_spirv: read_spirv(&config.vertex_shader)?,
            fragment_spirv: read_spirv(&config.fragment_shader)?,
        })
    }
}

fn read_spirv(path: &Path) -> EngineResult<Vec<u8>> {
    std::fs::read(path).map_err(|e| {
        ember_core::Error::Shader(format!("Failed to read '{}': {}", path.display(), e)).into()
    })
}

/// Maps the configured preference to a Vulkan present mode.
pub fn present_mode(preference: PresentModePreference) -> vk::PresentModeKHR {
    match preference {
        PresentModePreference::Mailbox => vk::PresentModeKHR::MAILBOX,
        PresentModePreference::Fifo => vk::PresentModeKHR::FIFO,
    }
}

/// Settings fixed at start-up that every target rebuild needs.
#[derive(Clone, Copy, Debug)]
struct TargetSettings {
    depth_format: vk::Format,
    present_mode: vk::PresentModeKHR,
    pipeline_rebuild: PipelineRebuild,
}

/// The rendering engine.
///
/// Single-threaded: every method must be called from the thread that owns
/// the window.
pub struct Engine {
    scheduler: FrameScheduler,
    frames: Vec<FrameSlot>,
    descriptor_pool: DescriptorPool,
    texture: Texture,
    index_buffer: Buffer,
    vertex_buffer: Buffer,
    index_count: u32,
    targets: RenderTargets,
    fragment_shader: Shader,
    vertex_shader: Shader,
    descriptor_set_layout: DescriptorSetLayout,
    command_pool: CommandPool,
    device: Arc<Device>,
    surface: Surface,
    instance: Instance,
    settings: TargetSettings,
    clear_color: [f32; 4],
}

impl Engine {
    /// Creates every GPU object and uploads `assets`.
    ///
    /// # Errors
    ///
    /// Any failure here is fatal. GPU object failures are reported as
    /// [`EngineError::Creation`] naming the object.
    pub fn initialize(
        window: &Window,
        assets: EngineAssets,
        config: &RendererConfig,
    ) -> EngineResult<Self> {
        let extent = window.framebuffer_extent();
        info!(
            "Initializing engine ({}x{}, validation: {})",
            extent.width, extent.height, config.validation
        );

        let surface_extensions = window.required_extensions()?;
        let instance =
            Instance::new("ember", &surface_extensions, config.validation).creating("instance")?;
        let surface = window.create_surface(&instance)?;

        let physical_device = select_physical_device(
            instance.handle(),
            surface.handle(),
            surface.loader(),
            &Requirements::default(),
        )?;
        let device = Device::new(&instance, &physical_device).creating("logical device")?;

        let command_pool =
            CommandPool::new(device.clone(), device.graphics_family()).creating("command pool")?;
        let descriptor_set_layout = DescriptorSetLayout::new(device.clone(), &mesh_bindings())
            .creating("descriptor set layout")?;

        let vertex_shader =
            Shader::from_spirv_bytes(device.clone(), &assets.vertex_spirv, ShaderStage::Vertex)
                .creating("vertex shader")?;
        let fragment_shader = Shader::from_spirv_bytes(
            device.clone(),
            &assets.fragment_spirv,
            ShaderStage::Fragment,
        )
        .creating("fragment shader")?;

        let settings = TargetSettings {
            depth_format: find_depth_format(&device).creating("depth format")?,
            present_mode: present_mode(config.preferred_present_mode),
            pipeline_rebuild: config.pipeline_rebuild,
        };
        debug!("Target settings: {:?}", settings);

        let ctx = TargetContext {
            instance: &instance,
            surface: &surface,
            descriptor_set_layout: &descriptor_set_layout,
            vertex_shader: &vertex_shader,
            fragment_shader: &fragment_shader,
            depth_format: settings.depth_format,
            present_mode: settings.present_mode,
            pipeline_rebuild: settings.pipeline_rebuild,
        };
        let targets = RenderTargets::new(device.clone(), &ctx, wait_for_nonzero_extent(window))
            .creating("render targets")?;

        let vertex_buffer = upload_buffer(
            device.clone(),
            &command_pool,
            BufferUsage::Vertex,
            &assets.mesh.vertices,
        )
        .creating("vertex buffer")?;
        let index_buffer = upload_buffer(
            device.clone(),
            &command_pool,
            BufferUsage::Index,
            &assets.mesh.indices,
        )
        .creating("index buffer")?;

        let texture = Texture::from_rgba(
            device.clone(),
            &command_pool,
            assets.texture.width,
            assets.texture.height,
            &assets.texture.pixels,
        )
        .creating("texture")?;

        let sets = MAX_FRAMES_IN_FLIGHT as u32;
        let descriptor_pool = DescriptorPool::new(device.clone(), sets, &pool_sizes(sets))
            .creating("descriptor pool")?;

        let frames = create_frame_slots(
            &device,
            &command_pool,
            &descriptor_pool,
            &descriptor_set_layout,
            &texture,
        )
        .creating("frame slots")?;

        info!(
            "Engine initialized: {} swapchain images, {} frames in flight, {} vertices, {} indices",
            targets.swapchain().image_count(),
            MAX_FRAMES_IN_FLIGHT,
            assets.mesh.vertices.len(),
            assets.mesh.indices.len()
        );

        Ok(Self {
            scheduler: FrameScheduler::new(),
            frames,
            descriptor_pool,
            texture,
            index_buffer,
            vertex_buffer,
            index_count: assets.mesh.index_count(),
            targets,
            fragment_shader,
            vertex_shader,
            descriptor_set_layout,
            command_pool,
            device,
            surface,
            instance,
            settings,
            clear_color: config.clear_color,
        })
    }

    /// Runs one frame.
    ///
    /// `uniforms` receives the current swapchain extent and is called at most
    /// once, after an image has been acquired. It is not called when the
    /// frame is skipped.
    ///
    /// # Errors
    ///
    /// Any GPU failure other than a stale swapchain. The render loop should
    /// stop.
    pub fn render_frame<E, F>(&mut self, window: &E, uniforms: F) -> EngineResult<FrameOutcome>
    where
        E: ExtentSource + ?Sized,
        F: FnOnce(vk::Extent2D) -> UniformBufferObject,
    {
        let Self {
            scheduler,
            frames,
            vertex_buffer,
            index_buffer,
            index_count,
            targets,
            fragment_shader,
            vertex_shader,
            descriptor_set_layout,
            device,
            surface,
            instance,
            settings,
            clear_color,
            ..
        } = self;

        let mut backend = VulkanBackend {
            device,
            ctx: TargetContext {
                instance,
                surface,
                descriptor_set_layout,
                vertex_shader,
                fragment_shader,
                depth_format: settings.depth_format,
                present_mode: settings.present_mode,
                pipeline_rebuild: settings.pipeline_rebuild,
            },
            targets,
            frames,
            vertex_buffer,
            index_buffer,
            index_count: *index_count,
            clear_color: *clear_color,
            window,
            uniforms: Some(uniforms),
        };

        scheduler.run_iteration(&mut backend)
    }

    /// Marks the swapchain stale; it is rebuilt after the next present.
    pub fn notify_resized(&mut self) {
        debug!("Resize notified");
        self.scheduler.notify_resized();
    }

    /// Blocks until the GPU has finished all submitted work.
    pub fn wait_idle(&self) -> EngineResult<()> {
        self.device.wait_idle()?;
        Ok(())
    }

    /// Drains the GPU and releases everything in reverse creation order.
    pub fn shutdown(self) -> EngineResult<()> {
        self.wait_idle()?;
        drop(self);
        Ok(())
    }

    /// Current swapchain extent.
    pub fn extent(&self) -> vk::Extent2D {
        self.targets.extent()
    }

    /// Number of swapchain rebuilds so far.
    pub fn swapchain_generation(&self) -> u64 {
        self.targets.generation()
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        // Wait for all GPU work to complete before destroying resources
        if let Err(e) = self.device.wait_idle() {
            error!("Failed to wait for device idle during engine drop: {:?}", e);
        }
        info!("Shutting down engine");
    }
}

/// The Vulkan side of one frame iteration, borrowing the engine's fields.
struct VulkanBackend<'a, E: ?Sized, F> {
    device: &'a Arc<Device>,
    ctx: TargetContext<'a>,
    targets: &'a mut RenderTargets,
    frames: &'a [FrameSlot],
    vertex_buffer: &'a Buffer,
    index_buffer: &'a Buffer,
    index_count: u32,
    clear_color: [f32; 4],
    window: &'a E,
    uniforms: Option<F>,
}

impl<E, F> FrameBackend for VulkanBackend<'_, E, F>
where
    E: ExtentSource + ?Sized,
    F: FnOnce(vk::Extent2D) -> UniformBufferObject,
{
    type Error = EngineError;

    fn wait_for_fence(&mut self, slot: usize) -> EngineResult<()> {
        self.frames[slot].sync().in_flight_fence().wait(u64::MAX)?;
        Ok(())
    }

    fn acquire_image(&mut self, slot: usize) -> EngineResult<AcquireOutcome> {
        let semaphore = self.frames[slot].sync().image_available_semaphore().handle();
        Ok(self.targets.swapchain().acquire_next_image(semaphore)?)
    }

    fn recreate_swapchain(&mut self) -> EngineResult<()> {
        let extent = wait_for_nonzero_extent(self.window);
        self.targets
            .rebuild(&self.ctx, extent)
            .creating("render targets")
    }

    fn update_uniforms(&mut self, slot: usize) -> EngineResult<()> {
        if let Some(uniforms) = self.uniforms.take() {
            let ubo = uniforms(self.targets.extent());
            self.frames[slot].uniform_buffer().write(&ubo)?;
        }
        Ok(())
    }

    fn reset_fence(&mut self, slot: usize) -> EngineResult<()> {
        self.frames[slot].sync().in_flight_fence().reset()?;
        Ok(())
    }

    fn record(&mut self, slot: usize, image_index: u32) -> EngineResult<()> {
        let frame = &self.frames[slot];
        let cmd = frame.command_buffer();
        let framebuffer = self.targets.framebuffer(image_index).ok_or_else(|| {
            RhiError::InvalidHandle(format!("No framebuffer for swapchain image {}", image_index))
        })?;
        let extent = self.targets.extent();
        let pipeline = self.targets.pipeline();

        cmd.reset()?;
        cmd.begin()?;

        cmd.begin_render_pass(
            self.targets.render_pass().handle(),
            framebuffer.handle(),
            extent,
            &clear_values(self.clear_color),
        );
        cmd.bind_pipeline(pipeline.bind_point(), pipeline.handle());
        cmd.set_viewport(&viewport(extent));
        cmd.set_scissor(&scissor(extent));
        cmd.bind_vertex_buffers(0, &[self.vertex_buffer.handle()], &[0]);
        cmd.bind_index_buffer(self.index_buffer.handle(), 0, vk::IndexType::UINT32);
        cmd.bind_descriptor_sets(
            pipeline.bind_point(),
            self.targets.pipeline_layout().handle(),
            0,
            &[frame.descriptor_set()],
        );
        cmd.draw_indexed(self.index_count, 1, 0, 0, 0);
        cmd.end_render_pass();

        cmd.end()?;
        Ok(())
    }

    fn submit(&mut self, slot: usize) -> EngineResult<()> {
        let frame = &self.frames[slot];

        let wait_semaphores = [frame.sync().image_available_semaphore().handle()];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let signal_semaphores = [frame.sync().render_finished_semaphore().handle()];
        let command_buffers = [frame.command_buffer().handle()];

        let submit_info = vk::SubmitInfo::default()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);

        // SAFETY: the command buffer was fully recorded by `record`, the
        // fence was reset by `reset_fence`, and the slot's semaphores are not
        // used by any other pending submission because its fence was waited on.
        unsafe {
            self.device
                .submit_graphics(&[submit_info], frame.sync().in_flight_fence().handle())?;
        }
        Ok(())
    }

    fn present(&mut self, slot: usize, image_index: u32) -> EngineResult<PresentOutcome> {
        let semaphore = self.frames[slot].sync().render_finished_semaphore().handle();
        Ok(self
            .targets
            .swapchain()
            .present(self.device.present_queue(), image_index, semaphore)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_present_mode_mapping() {
        assert_eq!(
            present_mode(PresentModePreference::Mailbox),
            vk::PresentModeKHR::MAILBOX
        );
        assert_eq!(
            present_mode(PresentModePreference::Fifo),
            vk::PresentModeKHR::FIFO
        );
    }

    #[test]
    fn test_missing_shader_is_shader_error() {
        let config = AssetsConfig {
            model: None,
            texture: None,
            vertex_shader: "does/not/exist.vert.spv".into(),
            fragment_shader: "does/not/exist.frag.spv".into(),
        };

        // Shaders are mandatory, so a missing file is a shader error.
        match EngineAssets::load(&config) {
            Err(EngineError::Core(ember_core::Error::Shader(message))) => {
                assert!(message.contains("exist.vert.spv"), "{}", message);
            }
            Err(other) => panic!("expected shader error, got {:?}", other),
            Ok(_) => panic!("expected shader error, got assets"),
        }
    }

    #[test]
    fn test_missing_model_is_resource_error() {
        let config = AssetsConfig {
            model: Some("does/not/exist.obj".into()),
            ..AssetsConfig::default()
        };
        assert!(matches!(
            EngineAssets::load(&config),
            Err(EngineError::Resource(_))
        ));
    }
}
