//! Graphics pipeline construction.
//!
//! The builder accumulates a pipeline description, validates it, and only
//! then touches the Vulkan API. Validation failures surface before any
//! driver call is made. Pipelines target dynamic rendering with dynamic
//! viewport and scissor state, so no render pass objects are involved and
//! pipelines survive window resizes.

use crate::error::{GpuError, Result};
use ash::vk;
use std::ffi::CStr;

const SHADER_ENTRY: &CStr = c"main";

/// Create a shader module from SPIR-V words.
///
/// # Safety
/// The device must be valid and `code` must be valid SPIR-V.
pub unsafe fn create_shader_module(device: &ash::Device, code: &[u32]) -> Result<vk::ShaderModule> {
    let create_info = vk::ShaderModuleCreateInfo::default().code(code);
    let module = device.create_shader_module(&create_info, None)?;
    Ok(module)
}

/// A compiled graphics pipeline and the layout it was built against.
pub struct GraphicsPipeline {
    pub pipeline: vk::Pipeline,
    pub layout: vk::PipelineLayout,
}

impl GraphicsPipeline {
    /// Bind the pipeline into a command buffer.
    ///
    /// # Safety
    /// The command buffer must be in the recording state.
    pub unsafe fn bind(&self, device: &ash::Device, command_buffer: vk::CommandBuffer) {
        device.cmd_bind_pipeline(
            command_buffer,
            vk::PipelineBindPoint::GRAPHICS,
            self.pipeline,
        );
    }

    /// Destroy the pipeline. The layout is owned by the caller.
    ///
    /// # Safety
    /// The device must be valid and the pipeline must not be in use.
    pub unsafe fn destroy(&self, device: &ash::Device) {
        device.destroy_pipeline(self.pipeline, None);
    }
}

/// Check that a stage list forms a renderable pipeline.
///
/// Rejects empty stage lists, duplicate stages, and a fragment stage
/// without a vertex stage.
fn validate_stages(stages: &[vk::ShaderStageFlags]) -> Result<()> {
    if stages.is_empty() {
        return Err(GpuError::InvalidPipeline(
            "pipeline has no shader stages".to_string(),
        ));
    }

    for (i, &stage) in stages.iter().enumerate() {
        if stages[..i].contains(&stage) {
            return Err(GpuError::InvalidPipeline(format!(
                "duplicate shader stage {stage:?}"
            )));
        }
    }

    let has_vertex = stages.contains(&vk::ShaderStageFlags::VERTEX);
    let has_fragment = stages.contains(&vk::ShaderStageFlags::FRAGMENT);
    if has_fragment && !has_vertex {
        return Err(GpuError::InvalidPipeline(
            "fragment stage requires a vertex stage".to_string(),
        ));
    }

    Ok(())
}

/// Graphics pipeline builder.
///
/// Consumed by `build`; a second build requires a fresh builder.
pub struct GraphicsPipelineBuilder {
    stages: Vec<(vk::ShaderStageFlags, vk::ShaderModule)>,
    vertex_bindings: Vec<vk::VertexInputBindingDescription>,
    vertex_attributes: Vec<vk::VertexInputAttributeDescription>,
    topology: vk::PrimitiveTopology,
    cull_mode: vk::CullModeFlags,
    front_face: vk::FrontFace,
    samples: vk::SampleCountFlags,
    depth_test: bool,
    depth_write: bool,
    depth_compare: vk::CompareOp,
    blend_enable: bool,
    color_format: vk::Format,
    depth_format: Option<vk::Format>,
}

impl GraphicsPipelineBuilder {
    /// Create a builder with renderer defaults: triangle lists, back-face
    /// culling, depth test and write enabled, no blending.
    pub fn new() -> Self {
        Self {
            stages: Vec::new(),
            vertex_bindings: Vec::new(),
            vertex_attributes: Vec::new(),
            topology: vk::PrimitiveTopology::TRIANGLE_LIST,
            cull_mode: vk::CullModeFlags::BACK,
            front_face: vk::FrontFace::COUNTER_CLOCKWISE,
            samples: vk::SampleCountFlags::TYPE_1,
            depth_test: true,
            depth_write: true,
            depth_compare: vk::CompareOp::LESS,
            blend_enable: false,
            color_format: vk::Format::B8G8R8A8_SRGB,
            depth_format: None,
        }
    }

    /// Append a shader stage.
    pub fn stage(mut self, stage: vk::ShaderStageFlags, module: vk::ShaderModule) -> Self {
        self.stages.push((stage, module));
        self
    }

    /// Append the vertex shader stage.
    pub fn vertex_shader(self, module: vk::ShaderModule) -> Self {
        self.stage(vk::ShaderStageFlags::VERTEX, module)
    }

    /// Append the fragment shader stage.
    pub fn fragment_shader(self, module: vk::ShaderModule) -> Self {
        self.stage(vk::ShaderStageFlags::FRAGMENT, module)
    }

    /// Describe one vertex buffer binding.
    pub fn vertex_binding(mut self, binding: u32, stride: u32) -> Self {
        self.vertex_bindings.push(
            vk::VertexInputBindingDescription::default()
                .binding(binding)
                .stride(stride)
                .input_rate(vk::VertexInputRate::VERTEX),
        );
        self
    }

    /// Describe one vertex attribute.
    pub fn vertex_attribute(
        mut self,
        location: u32,
        binding: u32,
        format: vk::Format,
        offset: u32,
    ) -> Self {
        self.vertex_attributes.push(
            vk::VertexInputAttributeDescription::default()
                .location(location)
                .binding(binding)
                .format(format)
                .offset(offset),
        );
        self
    }

    /// Set the primitive topology.
    pub fn topology(mut self, topology: vk::PrimitiveTopology) -> Self {
        self.topology = topology;
        self
    }

    /// Set the cull mode.
    pub fn cull_mode(mut self, cull_mode: vk::CullModeFlags) -> Self {
        self.cull_mode = cull_mode;
        self
    }

    /// Set the front-face winding.
    pub fn front_face(mut self, front_face: vk::FrontFace) -> Self {
        self.front_face = front_face;
        self
    }

    /// Set the rasterization sample count.
    pub fn samples(mut self, samples: vk::SampleCountFlags) -> Self {
        self.samples = samples;
        self
    }

    /// Configure depth testing.
    pub fn depth(mut self, test: bool, write: bool, compare: vk::CompareOp) -> Self {
        self.depth_test = test;
        self.depth_write = write;
        self.depth_compare = compare;
        self
    }

    /// Enable alpha blending on the color attachment.
    pub fn blending(mut self, enable: bool) -> Self {
        self.blend_enable = enable;
        self
    }

    /// Set the color attachment format for dynamic rendering.
    pub fn color_format(mut self, format: vk::Format) -> Self {
        self.color_format = format;
        self
    }

    /// Set the depth attachment format for dynamic rendering.
    pub fn depth_format(mut self, format: vk::Format) -> Self {
        self.depth_format = Some(format);
        self
    }

    /// Validate the accumulated description without building.
    pub fn validate(&self) -> Result<()> {
        let stage_flags: Vec<_> = self.stages.iter().map(|(flags, _)| *flags).collect();
        validate_stages(&stage_flags)
    }

    /// Build the pipeline, consuming the builder.
    ///
    /// Validates the description first; an invalid description fails
    /// without creating any Vulkan object.
    ///
    /// # Safety
    /// The device, layout, and all shader modules must be valid.
    pub unsafe fn build(
        self,
        device: &ash::Device,
        layout: vk::PipelineLayout,
    ) -> Result<GraphicsPipeline> {
        self.validate()?;

        let stage_infos: Vec<vk::PipelineShaderStageCreateInfo> = self
            .stages
            .iter()
            .map(|&(stage, module)| {
                vk::PipelineShaderStageCreateInfo::default()
                    .stage(stage)
                    .module(module)
                    .name(SHADER_ENTRY)
            })
            .collect();

        let vertex_input = vk::PipelineVertexInputStateCreateInfo::default()
            .vertex_binding_descriptions(&self.vertex_bindings)
            .vertex_attribute_descriptions(&self.vertex_attributes);

        let input_assembly =
            vk::PipelineInputAssemblyStateCreateInfo::default().topology(self.topology);

        // Viewport and scissor are dynamic; only counts matter here.
        let viewport_state = vk::PipelineViewportStateCreateInfo::default()
            .viewport_count(1)
            .scissor_count(1);

        let rasterization = vk::PipelineRasterizationStateCreateInfo::default()
            .polygon_mode(vk::PolygonMode::FILL)
            .cull_mode(self.cull_mode)
            .front_face(self.front_face)
            .line_width(1.0);

        let multisample = vk::PipelineMultisampleStateCreateInfo::default()
            .rasterization_samples(self.samples)
            .sample_shading_enable(self.samples != vk::SampleCountFlags::TYPE_1)
            .min_sample_shading(0.2);

        let depth_stencil = vk::PipelineDepthStencilStateCreateInfo::default()
            .depth_test_enable(self.depth_test)
            .depth_write_enable(self.depth_write)
            .depth_compare_op(self.depth_compare);

        let color_blend_attachment = if self.blend_enable {
            vk::PipelineColorBlendAttachmentState::default()
                .blend_enable(true)
                .src_color_blend_factor(vk::BlendFactor::SRC_ALPHA)
                .dst_color_blend_factor(vk::BlendFactor::ONE_MINUS_SRC_ALPHA)
                .color_blend_op(vk::BlendOp::ADD)
                .src_alpha_blend_factor(vk::BlendFactor::ONE)
                .dst_alpha_blend_factor(vk::BlendFactor::ZERO)
                .alpha_blend_op(vk::BlendOp::ADD)
                .color_write_mask(vk::ColorComponentFlags::RGBA)
        } else {
            vk::PipelineColorBlendAttachmentState::default()
                .color_write_mask(vk::ColorComponentFlags::RGBA)
        };

        let attachments = [color_blend_attachment];
        let color_blend = vk::PipelineColorBlendStateCreateInfo::default().attachments(&attachments);

        let dynamic_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
        let dynamic_state =
            vk::PipelineDynamicStateCreateInfo::default().dynamic_states(&dynamic_states);

        let color_formats = [self.color_format];
        let mut rendering_info =
            vk::PipelineRenderingCreateInfo::default().color_attachment_formats(&color_formats);
        if let Some(depth_format) = self.depth_format {
            rendering_info = rendering_info.depth_attachment_format(depth_format);
        }

        let create_info = vk::GraphicsPipelineCreateInfo::default()
            .stages(&stage_infos)
            .vertex_input_state(&vertex_input)
            .input_assembly_state(&input_assembly)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterization)
            .multisample_state(&multisample)
            .depth_stencil_state(&depth_stencil)
            .color_blend_state(&color_blend)
            .dynamic_state(&dynamic_state)
            .layout(layout)
            .push_next(&mut rendering_info);

        let pipelines = device
            .create_graphics_pipelines(vk::PipelineCache::null(), &[create_info], None)
            .map_err(|(_, e)| GpuError::PipelineCreation(e.to_string()))?;

        Ok(GraphicsPipeline {
            pipeline: pipelines[0],
            layout,
        })
    }
}

impl Default for GraphicsPipelineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::Handle;

    fn dummy_module() -> vk::ShaderModule {
        vk::ShaderModule::from_raw(1)
    }

    #[test]
    fn empty_stage_list_is_rejected() {
        let builder = GraphicsPipelineBuilder::new();
        assert!(matches!(
            builder.validate(),
            Err(GpuError::InvalidPipeline(_))
        ));
    }

    #[test]
    fn duplicate_stage_is_rejected() {
        let builder = GraphicsPipelineBuilder::new()
            .vertex_shader(dummy_module())
            .vertex_shader(dummy_module());
        assert!(matches!(
            builder.validate(),
            Err(GpuError::InvalidPipeline(_))
        ));
    }

    #[test]
    fn fragment_without_vertex_is_rejected() {
        let builder = GraphicsPipelineBuilder::new().fragment_shader(dummy_module());
        assert!(matches!(
            builder.validate(),
            Err(GpuError::InvalidPipeline(_))
        ));
    }

    #[test]
    fn vertex_fragment_pair_is_accepted() {
        let builder = GraphicsPipelineBuilder::new()
            .vertex_shader(dummy_module())
            .fragment_shader(dummy_module());
        assert!(builder.validate().is_ok());
    }

    #[test]
    fn vertex_only_pipeline_is_accepted() {
        let builder = GraphicsPipelineBuilder::new().vertex_shader(dummy_module());
        assert!(builder.validate().is_ok());
    }
}
