//! Vulkan renderer for the overlay
//!
//! Owns every GPU object of one overlay variant and implements
//! [`FrameBackend`] so the frame scheduler can drive it. Field order is the
//! teardown order: per-frame objects, scene resources, the pipeline, the
//! current swapchain generation, the render pass, the command pool and
//! finally the context.
//!
//! The render pass and pipeline follow the surface: when a recreation finds
//! a new image format or composite alpha mode, both are rebuilt before the
//! next swapchain generation.

use ash::vk;

use crate::config::{OverlayConfig, ShaderConfig};
use crate::render::effects::EffectPushConstants;
use crate::render::frame::{AcquireOutcome, FrameBackend, PresentOutcome};
use crate::render::geometry::{self, ColorVertex, TexturedVertex};
use crate::render::vulkan::buffer::{IndexBuffer, VertexBuffer};
use crate::render::vulkan::commands::{CommandPool, CommandRecorder};
use crate::render::vulkan::descriptor_set::GlyphDescriptors;
use crate::render::vulkan::framebuffer::Framebuffer;
use crate::render::vulkan::generation::GenerationSlot;
use crate::render::vulkan::render_pass::RenderPass;
use crate::render::vulkan::shader::{BlendMode, GraphicsPipeline, PipelineBuilder, ShaderModule};
use crate::render::vulkan::swapchain::{PresentationTarget, Swapchain};
use crate::render::vulkan::sync::FrameSync;
use crate::render::vulkan::texture::Texture;
use crate::render::vulkan::{VulkanContext, VulkanError, VulkanResult};
use crate::render::window::Window;
use crate::text::GlyphTexture;

/// What the overlay draws
#[derive(Debug, Clone)]
pub enum Scene {
    /// Three-vertex colored triangle
    Triangle,
    /// Textured quad showing rasterized text
    Text {
        /// Glyph bitmap to upload
        glyphs: GlyphTexture,
        /// Half-height of the quad in NDC
        quad_scale: f32,
    },
}

enum SceneResources {
    Triangle {
        vertices: VertexBuffer,
    },
    Text {
        descriptors: GlyphDescriptors,
        texture: Texture,
        vertices: VertexBuffer,
        indices: IndexBuffer,
        quad_scale: f32,
    },
}

impl SceneResources {
    fn descriptor_set_layout(&self) -> Option<vk::DescriptorSetLayout> {
        match self {
            Self::Triangle { .. } => None,
            Self::Text { descriptors, .. } => Some(descriptors.layout()),
        }
    }
}

/// One swapchain generation and the framebuffers built on its views
struct SwapchainResources {
    framebuffers: Vec<Framebuffer>,
    swapchain: Swapchain,
}

impl SwapchainResources {
    fn new(
        context: &VulkanContext,
        render_pass: &RenderPass,
        target: &PresentationTarget,
        extent: vk::Extent2D,
        generation: u64,
    ) -> VulkanResult<Self> {
        let swapchain = Swapchain::new(context, extent, target)?;

        let framebuffers = Framebuffer::for_views(
            &context.raw_device(),
            render_pass.handle(),
            swapchain.image_views(),
            swapchain.extent(),
        )?;

        log::debug!("Swapchain generation {} ready", generation);
        Ok(Self { framebuffers, swapchain })
    }
}

/// Complete GPU state for one overlay window
pub struct VulkanRenderer {
    frame_sync: Vec<FrameSync>,
    command_buffers: Vec<vk::CommandBuffer>,
    scene: SceneResources,
    pipeline: GraphicsPipeline,
    swapchain: GenerationSlot<SwapchainResources>,
    render_pass: RenderPass,
    command_pool: CommandPool,
    context: VulkanContext,
    target: PresentationTarget,
    shaders: ShaderConfig,
    clear_color: [f32; 4],
    acquire_timeout_ns: u64,
    transparent: bool,
}

impl VulkanRenderer {
    /// Build the context, first swapchain, pipeline and scene resources
    pub fn new(window: &Window, config: &OverlayConfig, scene: Scene) -> VulkanResult<Self> {
        let context = VulkanContext::new(window, &config.application_name, config.renderer.validation_enabled())?;
        let device = context.raw_device();
        let transparent = config.window.transparent;

        let (width, height) = window.framebuffer_extent();
        let extent = vk::Extent2D { width, height };

        let target = PresentationTarget::query(&context, transparent)?;
        let render_pass = RenderPass::new_overlay_pass(device.clone(), target.surface_format.format)?;

        let mut swapchain = GenerationSlot::new();
        swapchain.replace_with(|generation| {
            SwapchainResources::new(&context, &render_pass, &target, extent, generation)
        })?;

        let command_pool = CommandPool::new(device.clone(), context.queue_family())?;
        let slots = config.renderer.max_frames_in_flight;
        let command_buffers = command_pool.allocate_command_buffers(slots as u32)?;
        let frame_sync = FrameSync::for_slots(&device, slots)?;

        let scene = Self::create_scene(&context, &command_pool, scene, (width, height))?;
        let pipeline = Self::create_pipeline(&context, &render_pass, &config.shaders, &scene, target.blend_mode())?;

        log::info!(
            "Renderer ready: {} frame slots, transparent: {}",
            slots,
            transparent
        );

        Ok(Self {
            frame_sync,
            command_buffers,
            scene,
            pipeline,
            swapchain,
            render_pass,
            command_pool,
            context,
            target,
            shaders: config.shaders.clone(),
            clear_color: config.renderer.clear_color,
            acquire_timeout_ns: config.renderer.acquire_timeout_ns,
            transparent,
        })
    }

    fn create_scene(
        context: &VulkanContext,
        command_pool: &CommandPool,
        scene: Scene,
        window_extent: (u32, u32),
    ) -> VulkanResult<SceneResources> {
        match scene {
            Scene::Triangle => {
                let vertices = VertexBuffer::new(context, &geometry::TRIANGLE_VERTICES)?;
                Ok(SceneResources::Triangle { vertices })
            }
            Scene::Text { glyphs, quad_scale } => {
                let texture = Texture::from_glyphs(context, command_pool, &glyphs)?;
                let descriptors = GlyphDescriptors::new(&context.raw_device())?;
                descriptors.write_texture(&texture);

                let quad = geometry::text_quad((glyphs.width, glyphs.height), window_extent, quad_scale);
                let vertices = VertexBuffer::new(context, &quad)?;
                let indices = IndexBuffer::new(context, &geometry::QUAD_INDICES)?;

                Ok(SceneResources::Text {
                    descriptors,
                    texture,
                    vertices,
                    indices,
                    quad_scale,
                })
            }
        }
    }

    fn create_pipeline(
        context: &VulkanContext,
        render_pass: &RenderPass,
        shaders: &ShaderConfig,
        scene: &SceneResources,
        blend_mode: BlendMode,
    ) -> VulkanResult<GraphicsPipeline> {
        let device = context.raw_device();
        let vertex = ShaderModule::from_file(device.clone(), &shaders.vertex_shader_path)?;
        let fragment = ShaderModule::from_file(device.clone(), &shaders.fragment_shader_path)?;

        let builder = PipelineBuilder::new(device, render_pass.handle())
            .stage(&vertex, vk::ShaderStageFlags::VERTEX)
            .stage(&fragment, vk::ShaderStageFlags::FRAGMENT)
            .push_constants::<EffectPushConstants>(vk::ShaderStageFlags::FRAGMENT)
            .blend_mode(blend_mode);

        let builder = match scene {
            SceneResources::Triangle { .. } => builder.vertex_layout::<ColorVertex>(),
            SceneResources::Text { .. } => builder.vertex_layout::<TexturedVertex>(),
        };

        match scene.descriptor_set_layout() {
            Some(layout) => builder.descriptor_set_layout(layout).build(),
            None => builder.build(),
        }
    }

    /// Replace the glyph texture after the text changed
    ///
    /// Idles the device, uploads the new bitmap and repoints the descriptor
    /// set. Does nothing for the triangle scene.
    pub fn replace_glyph_texture(&mut self, glyphs: &GlyphTexture) -> VulkanResult<()> {
        let window_extent = self.current_extent();

        let SceneResources::Text {
            descriptors,
            texture,
            vertices,
            quad_scale,
            ..
        } = &mut self.scene
        else {
            log::warn!("Ignoring glyph texture update for the triangle scene");
            return Ok(());
        };

        self.context.wait_idle()?;

        let replacement = Texture::from_glyphs(&self.context, &self.command_pool, glyphs)?;
        descriptors.write_texture(&replacement);
        *texture = replacement;

        let quad = geometry::text_quad((glyphs.width, glyphs.height), window_extent, *quad_scale);
        vertices.update(&quad)?;

        log::debug!("Replaced glyph texture ({}x{})", glyphs.width, glyphs.height);
        Ok(())
    }

    fn current_extent(&self) -> (u32, u32) {
        self.swapchain
            .get()
            .map(|resources| {
                let extent = resources.swapchain.extent();
                (extent.width, extent.height)
            })
            .unwrap_or((1, 1))
    }

    fn swapchain_resources(&self) -> VulkanResult<&SwapchainResources> {
        self.swapchain.get().ok_or(VulkanError::SwapchainUnavailable)
    }

    /// Block until every submitted frame has finished
    pub fn wait_idle(&self) -> VulkanResult<()> {
        self.context.wait_idle()
    }

    /// Rebuild the render pass and pipeline for a new presentation target
    ///
    /// The current swapchain generation is released first since its
    /// framebuffers belong to the old render pass. The device must be idle.
    fn rebuild_pipeline(&mut self, target: &PresentationTarget) -> VulkanResult<()> {
        log::info!(
            "Surface changed to {:?} ({:?}), rebuilding render pass and pipeline",
            target.surface_format.format,
            target.composite_alpha
        );

        self.swapchain.clear();
        let render_pass = RenderPass::new_overlay_pass(self.context.raw_device(), target.surface_format.format)?;
        self.pipeline = Self::create_pipeline(
            &self.context,
            &render_pass,
            &self.shaders,
            &self.scene,
            target.blend_mode(),
        )?;
        self.render_pass = render_pass;
        Ok(())
    }
}

impl FrameBackend for VulkanRenderer {
    fn frame_slots(&self) -> usize {
        self.frame_sync.len()
    }

    fn wait_for_slot(&mut self, slot: usize) -> VulkanResult<()> {
        self.frame_sync[slot].in_flight.wait(u64::MAX)
    }

    fn acquire(&mut self, slot: usize) -> VulkanResult<AcquireOutcome> {
        let resources = self.swapchain_resources()?;

        let result = unsafe {
            self.context.swapchain_loader().acquire_next_image(
                resources.swapchain.handle(),
                self.acquire_timeout_ns,
                self.frame_sync[slot].image_available.handle(),
                vk::Fence::null(),
            )
        };

        match result {
            Ok((image_index, suboptimal)) => Ok(AcquireOutcome::Acquired { image_index, suboptimal }),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(AcquireOutcome::OutOfDate),
            Err(vk::Result::TIMEOUT | vk::Result::NOT_READY) => Ok(AcquireOutcome::Timeout),
            Err(e) => Err(VulkanError::Api(e)),
        }
    }

    fn record(&mut self, slot: usize, image_index: u32, effects: &EffectPushConstants) -> VulkanResult<()> {
        let resources = self.swapchain_resources()?;
        let extent = resources.swapchain.extent();
        let framebuffer = resources
            .framebuffers
            .get(image_index as usize)
            .ok_or_else(|| VulkanError::InvalidOperation {
                reason: format!("No framebuffer for swapchain image {}", image_index),
            })?
            .handle();

        let clear_values = [vk::ClearValue {
            color: vk::ClearColorValue {
                float32: self.clear_color,
            },
        }];
        let render_area = vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent,
        };

        let mut recorder = CommandRecorder::new(self.command_buffers[slot], self.context.raw_device());
        recorder.reset_and_begin()?;
        {
            let mut pass = recorder.begin_render_pass(self.render_pass.handle(), framebuffer, render_area, &clear_values)?;
            pass.cmd_bind_pipeline(self.pipeline.handle());
            pass.set_full_viewport(extent);
            pass.cmd_push_constants(self.pipeline.layout(), self.pipeline.push_constant_stages(), effects.as_bytes());

            match &self.scene {
                SceneResources::Triangle { vertices } => {
                    pass.cmd_bind_vertex_buffer(vertices.handle());
                    pass.cmd_draw(vertices.vertex_count());
                }
                SceneResources::Text {
                    descriptors,
                    vertices,
                    indices,
                    ..
                } => {
                    pass.cmd_bind_vertex_buffer(vertices.handle());
                    pass.cmd_bind_index_buffer(indices.handle());
                    pass.cmd_bind_descriptor_sets(self.pipeline.layout(), &[descriptors.set()]);
                    pass.cmd_draw_indexed(indices.index_count());
                }
            }
        }
        recorder.end()?;

        log::trace!("Recorded slot {} for image {}", slot, image_index);
        Ok(())
    }

    fn submit(&mut self, slot: usize) -> VulkanResult<()> {
        let sync = &self.frame_sync[slot];
        sync.in_flight.reset()?;

        let wait_semaphores = [sync.image_available.handle()];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let command_buffers = [self.command_buffers[slot]];
        let signal_semaphores = [sync.render_finished.handle()];
        let submit_info = vk::SubmitInfo::builder()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);

        unsafe {
            self.context
                .device()
                .device
                .queue_submit(self.context.queue(), &[submit_info.build()], sync.in_flight.handle())
                .map_err(VulkanError::Api)
        }
    }

    fn present(&mut self, slot: usize, image_index: u32) -> VulkanResult<PresentOutcome> {
        let resources = self.swapchain_resources()?;

        let wait_semaphores = [self.frame_sync[slot].render_finished.handle()];
        let swapchains = [resources.swapchain.handle()];
        let image_indices = [image_index];
        let present_info = vk::PresentInfoKHR::builder()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        match unsafe {
            self.context
                .swapchain_loader()
                .queue_present(self.context.queue(), &present_info)
        } {
            Ok(false) => Ok(PresentOutcome::Presented),
            Ok(true) => Ok(PresentOutcome::Suboptimal),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(PresentOutcome::OutOfDate),
            Err(e) => Err(VulkanError::Api(e)),
        }
    }

    fn recreate_swapchain(&mut self, extent: (u32, u32)) -> VulkanResult<()> {
        self.context.wait_idle()?;

        let target = PresentationTarget::query(&self.context, self.transparent)?;
        if target.needs_new_pipeline(&self.target) {
            self.rebuild_pipeline(&target)?;
        }
        self.target = target;

        let context = &self.context;
        let render_pass = &self.render_pass;
        let desired = vk::Extent2D {
            width: extent.0,
            height: extent.1,
        };

        let resources = self.swapchain.replace_with(|generation| {
            SwapchainResources::new(context, render_pass, &target, desired, generation)
        })?;
        let actual = resources.swapchain.extent();

        if let SceneResources::Text {
            texture,
            vertices,
            quad_scale,
            ..
        } = &mut self.scene
        {
            let texture_extent = texture.extent();
            let quad = geometry::text_quad(
                (texture_extent.width, texture_extent.height),
                (actual.width, actual.height),
                *quad_scale,
            );
            vertices.update(&quad)?;
        }

        log::info!(
            "Recreated swapchain at {}x{} (generation {})",
            actual.width,
            actual.height,
            self.swapchain.generation()
        );
        Ok(())
    }
}

impl Drop for VulkanRenderer {
    fn drop(&mut self) {
        if let Err(e) = self.context.wait_idle() {
            log::error!("Device wait failed during shutdown: {}", e);
        }
        log::debug!("Releasing renderer resources");
    }
}
