//! Shader modules and graphics pipeline construction
//!
//! SPIR-V is produced ahead of time by the build script. A missing or
//! malformed binary is a startup error; nothing is compiled at runtime.

use ash::{vk, Device};
use std::ffi::CStr;
use std::marker::PhantomData;
use std::mem::size_of;
use std::path::Path;

use crate::render::vulkan::vertex_layout::VertexLayout;
use crate::render::vulkan::{VulkanError, VulkanResult};

const SPIRV_MAGIC: u32 = 0x0723_0203;
const SPIRV_HEADER_WORDS: usize = 5;
const ENTRY_POINT: &CStr = c"main";

/// Validate a SPIR-V binary and convert it to words
pub fn parse_spirv(bytes: &[u8]) -> Result<Vec<u32>, String> {
    if bytes.len() % 4 != 0 {
        return Err(format!("size {} is not a multiple of 4", bytes.len()));
    }
    if bytes.len() < SPIRV_HEADER_WORDS * 4 {
        return Err(format!("size {} is smaller than the SPIR-V header", bytes.len()));
    }

    let words: Vec<u32> = bytes
        .chunks_exact(4)
        .map(|chunk| u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect();

    if words[0] != SPIRV_MAGIC {
        return Err(format!("bad magic number {:#010x}", words[0]));
    }

    Ok(words)
}

/// Shader module wrapper with RAII cleanup
pub struct ShaderModule {
    device: Device,
    module: vk::ShaderModule,
}

impl ShaderModule {
    /// Create shader module from SPIR-V bytecode
    pub fn from_bytes(device: Device, bytes: &[u8], origin: &str) -> VulkanResult<Self> {
        let words = parse_spirv(bytes).map_err(|reason| VulkanError::ShaderLoad {
            path: origin.to_string(),
            reason,
        })?;

        let create_info = vk::ShaderModuleCreateInfo::builder().code(&words);

        let module = unsafe { device.create_shader_module(&create_info, None).map_err(VulkanError::Api)? };

        Ok(Self { device, module })
    }

    /// Load shader from SPIR-V file
    pub fn from_file<P: AsRef<Path>>(device: Device, path: P) -> VulkanResult<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|e| VulkanError::ShaderLoad {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;

        log::debug!("Loaded shader {} ({} bytes)", path.display(), bytes.len());
        Self::from_bytes(device, &bytes, &path.display().to_string())
    }

    /// Get shader module handle
    pub fn handle(&self) -> vk::ShaderModule {
        self.module
    }

    /// Create shader stage create info
    pub fn create_stage_info(&self, stage: vk::ShaderStageFlags) -> vk::PipelineShaderStageCreateInfo {
        vk::PipelineShaderStageCreateInfo::builder()
            .stage(stage)
            .module(self.module)
            .name(ENTRY_POINT)
            .build()
    }
}

impl Drop for ShaderModule {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_shader_module(self.module, None);
        }
    }
}

/// How fragment color is written, matched to the compositor's alpha mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlendMode {
    /// Color weighted by source alpha; for OPAQUE, INHERIT and PRE_MULTIPLIED
    Premultiplied,
    /// Color written unweighted; the compositor applies alpha (POST_MULTIPLIED)
    Straight,
}

impl BlendMode {
    /// Blend mode that composites correctly under `composite_alpha`
    pub fn for_composite_alpha(composite_alpha: vk::CompositeAlphaFlagsKHR) -> Self {
        if composite_alpha == vk::CompositeAlphaFlagsKHR::POST_MULTIPLIED {
            Self::Straight
        } else {
            Self::Premultiplied
        }
    }

    fn src_color_factor(self) -> vk::BlendFactor {
        match self {
            Self::Premultiplied => vk::BlendFactor::SRC_ALPHA,
            Self::Straight => vk::BlendFactor::ONE,
        }
    }
}

/// Alpha blending into the color attachment
///
/// Premultiplied color: `src * src.a + dst * (1 - src.a)`. Straight color:
/// `src + dst * (1 - src.a)`. Alpha is always `src.a + dst.a * (1 - src.a)`,
/// so a cleared alpha of zero stays zero wherever nothing is drawn.
pub fn alpha_blend_attachment(mode: BlendMode) -> vk::PipelineColorBlendAttachmentState {
    vk::PipelineColorBlendAttachmentState::builder()
        .color_write_mask(vk::ColorComponentFlags::RGBA)
        .blend_enable(true)
        .src_color_blend_factor(mode.src_color_factor())
        .dst_color_blend_factor(vk::BlendFactor::ONE_MINUS_SRC_ALPHA)
        .color_blend_op(vk::BlendOp::ADD)
        .src_alpha_blend_factor(vk::BlendFactor::ONE)
        .dst_alpha_blend_factor(vk::BlendFactor::ONE_MINUS_SRC_ALPHA)
        .alpha_blend_op(vk::BlendOp::ADD)
        .build()
}

/// Push-constant range covering exactly one `P` at offset 0
pub fn push_constant_range<P>(stages: vk::ShaderStageFlags) -> vk::PushConstantRange {
    vk::PushConstantRange {
        stage_flags: stages,
        offset: 0,
        size: size_of::<P>() as u32,
    }
}

/// Graphics pipeline wrapper with RAII cleanup
pub struct GraphicsPipeline {
    device: Device,
    pipeline: vk::Pipeline,
    layout: vk::PipelineLayout,
    push_constant_stages: vk::ShaderStageFlags,
}

impl GraphicsPipeline {
    /// Get pipeline handle
    pub fn handle(&self) -> vk::Pipeline {
        self.pipeline
    }

    /// Get layout handle
    pub fn layout(&self) -> vk::PipelineLayout {
        self.layout
    }

    /// Stages the push-constant range is visible to
    pub fn push_constant_stages(&self) -> vk::ShaderStageFlags {
        self.push_constant_stages
    }
}

impl Drop for GraphicsPipeline {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_pipeline(self.pipeline, None);
            self.device.destroy_pipeline_layout(self.layout, None);
        }
    }
}

/// Fluent builder for the overlay's graphics pipelines
///
/// Fixed state: triangle list, no culling, dynamic viewport and scissor,
/// alpha blending, no depth. The result is immutable; a new surface format
/// or blend mode means building a new render pass and pipeline.
pub struct PipelineBuilder<'a> {
    device: Device,
    render_pass: vk::RenderPass,
    stages: Vec<vk::PipelineShaderStageCreateInfo>,
    binding: Option<vk::VertexInputBindingDescription>,
    attributes: Vec<vk::VertexInputAttributeDescription>,
    push_constant_ranges: Vec<vk::PushConstantRange>,
    set_layouts: Vec<vk::DescriptorSetLayout>,
    blend_mode: BlendMode,
    _modules: PhantomData<&'a ShaderModule>,
}

impl<'a> PipelineBuilder<'a> {
    /// Start a pipeline for the given render pass
    pub fn new(device: Device, render_pass: vk::RenderPass) -> Self {
        Self {
            device,
            render_pass,
            stages: Vec::new(),
            binding: None,
            attributes: Vec::new(),
            push_constant_ranges: Vec::new(),
            set_layouts: Vec::new(),
            blend_mode: BlendMode::Premultiplied,
            _modules: PhantomData,
        }
    }

    /// Add a shader stage; the module must outlive the build call
    pub fn stage(mut self, module: &'a ShaderModule, stage: vk::ShaderStageFlags) -> Self {
        self.stages.push(module.create_stage_info(stage));
        self
    }

    /// Vertex input from a single interleaved buffer of `V`
    pub fn vertex_layout<V: VertexLayout>(mut self) -> Self {
        self.binding = Some(V::binding_description());
        self.attributes = V::attribute_descriptions();
        self
    }

    /// One push-constant range sized to `P`
    pub fn push_constants<P>(mut self, stages: vk::ShaderStageFlags) -> Self {
        self.push_constant_ranges.push(push_constant_range::<P>(stages));
        self
    }

    /// Descriptor set layout bound at the next set index
    pub fn descriptor_set_layout(mut self, layout: vk::DescriptorSetLayout) -> Self {
        self.set_layouts.push(layout);
        self
    }

    /// Color blend factors for the swapchain's composite alpha mode
    pub fn blend_mode(mut self, mode: BlendMode) -> Self {
        self.blend_mode = mode;
        self
    }

    /// Create the pipeline layout and pipeline
    pub fn build(self) -> VulkanResult<GraphicsPipeline> {
        if self.stages.is_empty() {
            return Err(VulkanError::InvalidOperation {
                reason: "Pipeline needs at least one shader stage".to_string(),
            });
        }

        let bindings: Vec<_> = self.binding.into_iter().collect();
        let vertex_input_info = vk::PipelineVertexInputStateCreateInfo::builder()
            .vertex_binding_descriptions(&bindings)
            .vertex_attribute_descriptions(&self.attributes);

        let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::builder()
            .topology(vk::PrimitiveTopology::TRIANGLE_LIST)
            .primitive_restart_enable(false);

        // Counts only; the rectangles are set every frame
        let viewport_state = vk::PipelineViewportStateCreateInfo::builder()
            .viewport_count(1)
            .scissor_count(1);

        let dynamic_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
        let dynamic_state = vk::PipelineDynamicStateCreateInfo::builder().dynamic_states(&dynamic_states);

        let rasterizer = vk::PipelineRasterizationStateCreateInfo::builder()
            .depth_clamp_enable(false)
            .rasterizer_discard_enable(false)
            .polygon_mode(vk::PolygonMode::FILL)
            .line_width(1.0)
            .cull_mode(vk::CullModeFlags::NONE)
            .front_face(vk::FrontFace::CLOCKWISE)
            .depth_bias_enable(false);

        let multisampling = vk::PipelineMultisampleStateCreateInfo::builder()
            .sample_shading_enable(false)
            .rasterization_samples(vk::SampleCountFlags::TYPE_1);

        let color_blend_attachments = [alpha_blend_attachment(self.blend_mode)];
        let color_blending = vk::PipelineColorBlendStateCreateInfo::builder()
            .logic_op_enable(false)
            .attachments(&color_blend_attachments);

        let layout_info = vk::PipelineLayoutCreateInfo::builder()
            .set_layouts(&self.set_layouts)
            .push_constant_ranges(&self.push_constant_ranges);
        let layout = unsafe {
            self.device
                .create_pipeline_layout(&layout_info, None)
                .map_err(VulkanError::Api)?
        };

        let pipeline_info = vk::GraphicsPipelineCreateInfo::builder()
            .stages(&self.stages)
            .vertex_input_state(&vertex_input_info)
            .input_assembly_state(&input_assembly)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterizer)
            .multisample_state(&multisampling)
            .color_blend_state(&color_blending)
            .dynamic_state(&dynamic_state)
            .layout(layout)
            .render_pass(self.render_pass)
            .subpass(0);

        let created = unsafe {
            self.device
                .create_graphics_pipelines(vk::PipelineCache::null(), &[pipeline_info.build()], None)
        };

        let pipeline = match created {
            Ok(pipelines) => pipelines[0],
            Err((_, err)) => {
                unsafe { self.device.destroy_pipeline_layout(layout, None) };
                return Err(VulkanError::Api(err));
            }
        };

        let push_constant_stages = self
            .push_constant_ranges
            .iter()
            .fold(vk::ShaderStageFlags::empty(), |acc, range| acc | range.stage_flags);

        log::debug!(
            "Built graphics pipeline ({} stages, {} push-constant bytes)",
            self.stages.len(),
            self.push_constant_ranges.iter().map(|r| r.size).sum::<u32>()
        );

        Ok(GraphicsPipeline {
            device: self.device,
            pipeline,
            layout,
            push_constant_stages,
        })
    }
}
