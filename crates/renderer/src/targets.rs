//! Everything that depends on the swapchain, rebuilt as one unit.
//!
//! Creation order is swapchain, depth image, render pass, pipeline layout,
//! pipeline, framebuffers. Fields are declared in the reverse order so the
//! default drop glue tears them down correctly.

use std::sync::Arc;

use ash::vk;
use tracing::{debug, info};

use ember_core::config::PipelineRebuild;
use ember_platform::{ExtentSource, Surface, is_zero_extent};
use ember_rhi::RhiResult;
use ember_rhi::descriptor::DescriptorSetLayout;
use ember_rhi::device::Device;
use ember_rhi::image::{Image, create_depth_image};
use ember_rhi::instance::Instance;
use ember_rhi::pipeline::{CullMode, FrontFace, GraphicsPipelineBuilder, Pipeline, PipelineLayout};
use ember_rhi::render_pass::{Framebuffer, RenderPass};
use ember_rhi::shader::Shader;
use ember_rhi::swapchain::Swapchain;
use ember_rhi::vertex::Vertex;

/// Long-lived objects the swapchain-dependent bundle is built against.
pub struct TargetContext<'a> {
    pub instance: &'a Instance,
    pub surface: &'a Surface,
    pub descriptor_set_layout: &'a DescriptorSetLayout,
    pub vertex_shader: &'a Shader,
    pub fragment_shader: &'a Shader,
    pub depth_format: vk::Format,
    pub present_mode: vk::PresentModeKHR,
    pub pipeline_rebuild: PipelineRebuild,
}

/// Swapchain, depth image, render pass, pipeline and framebuffers.
pub struct RenderTargets {
    framebuffers: Vec<Framebuffer>,
    pipeline: Pipeline,
    pipeline_layout: PipelineLayout,
    render_pass: RenderPass,
    depth: Image,
    swapchain: Swapchain,
    device: Arc<Device>,
    /// Incremented on every rebuild.
    generation: u64,
}

impl RenderTargets {
    pub fn new(device: Arc<Device>, ctx: &TargetContext<'_>, extent: vk::Extent2D) -> RhiResult<Self> {
        let swapchain = Swapchain::new(
            ctx.instance,
            device.clone(),
            ctx.surface.handle(),
            extent,
            ctx.present_mode,
            vk::SwapchainKHR::null(),
        )?;
        let depth = create_depth_image(device.clone(), swapchain.extent(), ctx.depth_format)?;
        let render_pass = RenderPass::new(device.clone(), swapchain.format(), ctx.depth_format)?;
        let pipeline_layout =
            PipelineLayout::new(device.clone(), &[ctx.descriptor_set_layout.handle()])?;
        let pipeline = create_pipeline(device.clone(), ctx, &render_pass, &pipeline_layout)?;
        let framebuffers = create_framebuffers(&device, &swapchain, &depth, &render_pass)?;

        info!(
            "Render targets created: {}x{}, {} framebuffers",
            swapchain.extent().width,
            swapchain.extent().height,
            framebuffers.len()
        );

        Ok(Self {
            framebuffers,
            pipeline,
            pipeline_layout,
            render_pass,
            depth,
            swapchain,
            device,
            generation: 0,
        })
    }

    /// Rebuilds the bundle for `extent`.
    ///
    /// Waits for the device to go idle first, since in-flight command
    /// buffers may still reference the old framebuffers. The old swapchain is
    /// handed to the new one as `old_swapchain` and destroyed afterwards. The
    /// render pass and pipeline follow [`PipelineRebuild`].
    pub fn rebuild(&mut self, ctx: &TargetContext<'_>, extent: vk::Extent2D) -> RhiResult<()> {
        self.device.wait_idle()?;

        self.framebuffers.clear();

        let swapchain = Swapchain::new(
            ctx.instance,
            self.device.clone(),
            ctx.surface.handle(),
            extent,
            ctx.present_mode,
            self.swapchain.handle(),
        )?;
        let old_format = self.swapchain.format();
        self.swapchain = swapchain;

        self.depth = create_depth_image(self.device.clone(), self.swapchain.extent(), ctx.depth_format)?;

        let new_format = self.swapchain.format();
        if needs_pipeline_rebuild(ctx.pipeline_rebuild, old_format, new_format) {
            let render_pass = RenderPass::new(self.device.clone(), new_format, ctx.depth_format)?;
            let pipeline_layout =
                PipelineLayout::new(self.device.clone(), &[ctx.descriptor_set_layout.handle()])?;
            let pipeline =
                create_pipeline(self.device.clone(), ctx, &render_pass, &pipeline_layout)?;

            self.pipeline = pipeline;
            self.pipeline_layout = pipeline_layout;
            self.render_pass = render_pass;
            debug!("Render pass and pipeline rebuilt for {:?}", new_format);
        }

        self.framebuffers =
            create_framebuffers(&self.device, &self.swapchain, &self.depth, &self.render_pass)?;
        self.generation += 1;

        info!(
            "Render targets rebuilt (generation {}): {}x{}",
            self.generation,
            self.swapchain.extent().width,
            self.swapchain.extent().height
        );
        Ok(())
    }

    #[inline]
    pub fn swapchain(&self) -> &Swapchain {
        &self.swapchain
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.swapchain.extent()
    }

    #[inline]
    pub fn render_pass(&self) -> &RenderPass {
        &self.render_pass
    }

    #[inline]
    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    #[inline]
    pub fn pipeline_layout(&self) -> &PipelineLayout {
        &self.pipeline_layout
    }

    /// Framebuffer wrapping swapchain image `image_index`.
    pub fn framebuffer(&self, image_index: u32) -> Option<&Framebuffer> {
        self.framebuffers.get(image_index as usize)
    }

    #[inline]
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

/// Whether a rebuild must recreate the render pass and pipeline.
pub fn needs_pipeline_rebuild(
    policy: PipelineRebuild,
    old_format: vk::Format,
    new_format: vk::Format,
) -> bool {
    match policy {
        PipelineRebuild::Always => true,
        PipelineRebuild::OnFormatChange => old_format != new_format,
    }
}

/// Polls `source` until the framebuffer has a non-zero area.
///
/// Blocks for as long as the window stays minimised.
pub fn wait_for_nonzero_extent<E: ExtentSource + ?Sized>(source: &E) -> vk::Extent2D {
    let mut extent = source.framebuffer_extent();
    if is_zero_extent(extent) {
        debug!("Framebuffer has zero area, waiting for restore");
    }
    while is_zero_extent(extent) {
        source.wait_events();
        extent = source.framebuffer_extent();
    }
    extent
}

fn create_pipeline(
    device: Arc<Device>,
    ctx: &TargetContext<'_>,
    render_pass: &RenderPass,
    layout: &PipelineLayout,
) -> RhiResult<Pipeline> {
    GraphicsPipelineBuilder::new()
        .vertex_shader(ctx.vertex_shader)
        .fragment_shader(ctx.fragment_shader)
        .vertex_binding(Vertex::binding_description())
        .vertex_attributes(&Vertex::attribute_descriptions())
        .cull_mode(CullMode::Back)
        .front_face(FrontFace::CounterClockwise)
        .depth_test_enable(true)
        .depth_write_enable(true)
        .render_pass(render_pass.handle(), 0)
        .build(device, layout)
}

/// One framebuffer per swapchain image, each sharing the depth view.
fn create_framebuffers(
    device: &Arc<Device>,
    swapchain: &Swapchain,
    depth: &Image,
    render_pass: &RenderPass,
) -> RhiResult<Vec<Framebuffer>> {
    swapchain
        .image_views()
        .iter()
        .map(|&view| {
            Framebuffer::new(
                device.clone(),
                render_pass,
                &[view, depth.view()],
                swapchain.extent(),
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    use ember_rhi::swapchain::choose_extent;

    /// Reports a zero extent for the first `zero_polls` queries.
    struct MinimizedWindow {
        zero_polls: Cell<u32>,
        restored: vk::Extent2D,
        waits: Cell<u32>,
    }

    impl ExtentSource for MinimizedWindow {
        fn framebuffer_extent(&self) -> vk::Extent2D {
            let remaining = self.zero_polls.get();
            if remaining > 0 {
                self.zero_polls.set(remaining - 1);
                vk::Extent2D {
                    width: 0,
                    height: 0,
                }
            } else {
                self.restored
            }
        }

        fn wait_events(&self) {
            self.waits.set(self.waits.get() + 1);
        }
    }

    fn window(zero_polls: u32) -> MinimizedWindow {
        MinimizedWindow {
            zero_polls: Cell::new(zero_polls),
            restored: vk::Extent2D {
                width: 800,
                height: 600,
            },
            waits: Cell::new(0),
        }
    }

    #[test]
    fn test_waits_through_zero_extent() {
        let source = window(3);
        let extent = wait_for_nonzero_extent(&source);

        assert_eq!((extent.width, extent.height), (800, 600));
        assert_eq!(source.waits.get(), 3);
    }

    #[test]
    fn test_no_wait_when_visible() {
        let source = window(0);
        wait_for_nonzero_extent(&source);
        assert_eq!(source.waits.get(), 0);
    }

    #[test]
    fn test_restored_extent_is_clamped_into_surface_bounds() {
        let source = window(5);
        let caps = vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D {
                width: u32::MAX,
                height: u32::MAX,
            },
            min_image_extent: vk::Extent2D {
                width: 1,
                height: 1,
            },
            max_image_extent: vk::Extent2D {
                width: 4096,
                height: 4096,
            },
            ..Default::default()
        };

        let extent = choose_extent(&caps, wait_for_nonzero_extent(&source));
        assert_eq!((extent.width, extent.height), (800, 600));

        let narrow = vk::SurfaceCapabilitiesKHR {
            max_image_extent: vk::Extent2D {
                width: 640,
                height: 4096,
            },
            ..caps
        };
        let extent = choose_extent(&narrow, wait_for_nonzero_extent(&window(1)));
        assert_eq!((extent.width, extent.height), (640, 600));
    }

    #[test]
    fn test_pipeline_rebuild_policy() {
        let srgb = vk::Format::B8G8R8A8_SRGB;
        let unorm = vk::Format::B8G8R8A8_UNORM;

        assert!(needs_pipeline_rebuild(PipelineRebuild::Always, srgb, srgb));
        assert!(needs_pipeline_rebuild(PipelineRebuild::Always, srgb, unorm));
        assert!(!needs_pipeline_rebuild(PipelineRebuild::OnFormatChange, srgb, srgb));
        assert!(needs_pipeline_rebuild(PipelineRebuild::OnFormatChange, srgb, unorm));
    }
}
