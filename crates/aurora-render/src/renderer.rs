//! The scene renderer: PBR and skybox pipelines over dynamic rendering.

use crate::cubemap::{transition_image_layout, CubemapPass, CubemapTarget};
use crate::error::{RenderError, Result};
use crate::scene::{RenderScene, TextureRole, Vertex};
use crate::state::{update_camera, RenderState};
use aurora_gpu::context::GpuContext;
use aurora_gpu::descriptors::{
    write_combined_image_sampler, write_uniform_buffer, DescriptorSetLayoutBuilder,
    PipelineLayoutBuilder,
};
use aurora_gpu::frame::FrameContext;
use aurora_gpu::memory::{GpuBuffer, GpuImage};
use aurora_gpu::pipeline::{GraphicsPipeline, GraphicsPipelineBuilder};
use ash::vk;
use gpu_allocator::MemoryLocation;
use tracing::{debug, info};

/// Number of combined-image-sampler bindings in the scene set: five
/// material roles plus the environment and irradiance cubemaps.
const SCENE_BINDING_COUNT: u32 = 7;
const ENVIRONMENT_CUBEMAP_BINDING: u32 = 5;
const IRRADIANCE_CUBEMAP_BINDING: u32 = 6;

const CUBEMAP_FORMAT: vk::Format = vk::Format::R32G32B32A32_SFLOAT;
const CUBEMAP_SIZE: u32 = 256;

/// Renderer construction parameters.
#[derive(Debug, Clone, Copy)]
pub struct RendererConfig {
    /// Swapchain color format the pipelines render into.
    pub color_format: vk::Format,
    /// Initial output extent.
    pub extent: vk::Extent2D,
    /// Number of frame slots; one uniform buffer and frame set each.
    pub frames_in_flight: usize,
    /// Rasterization sample count for the scene pipelines.
    pub samples: vk::SampleCountFlags,
}

/// Detects changes of the active environment index.
struct EnvironmentTracker {
    current: u32,
}

impl EnvironmentTracker {
    fn new(initial: u32) -> Self {
        Self { current: initial }
    }

    /// True exactly once per index change.
    fn changed(&mut self, requested: u32) -> bool {
        if requested == self.current {
            return false;
        }
        self.current = requested;
        true
    }
}

/// Offscreen attachments sized to the output extent.
struct RenderTargets {
    /// Multisampled color target; absent when rendering single-sampled.
    msaa_color: Option<(GpuImage, vk::ImageView)>,
    depth: GpuImage,
    depth_view: vk::ImageView,
}

impl RenderTargets {
    unsafe fn new(
        gpu: &GpuContext,
        color_format: vk::Format,
        depth_format: vk::Format,
        extent: vk::Extent2D,
        samples: vk::SampleCountFlags,
    ) -> Result<Self> {
        let msaa_color = if samples == vk::SampleCountFlags::TYPE_1 {
            None
        } else {
            let create_info = vk::ImageCreateInfo::default()
                .image_type(vk::ImageType::TYPE_2D)
                .format(color_format)
                .extent(vk::Extent3D {
                    width: extent.width,
                    height: extent.height,
                    depth: 1,
                })
                .mip_levels(1)
                .array_layers(1)
                .samples(samples)
                .tiling(vk::ImageTiling::OPTIMAL)
                .usage(
                    vk::ImageUsageFlags::COLOR_ATTACHMENT
                        | vk::ImageUsageFlags::TRANSIENT_ATTACHMENT,
                )
                .initial_layout(vk::ImageLayout::UNDEFINED);

            let image = gpu.allocator().lock().create_image(
                &create_info,
                MemoryLocation::GpuOnly,
                "msaa color",
            )?;

            let view_info = vk::ImageViewCreateInfo::default()
                .image(image.image)
                .view_type(vk::ImageViewType::TYPE_2D)
                .format(color_format)
                .subresource_range(
                    vk::ImageSubresourceRange::default()
                        .aspect_mask(vk::ImageAspectFlags::COLOR)
                        .level_count(1)
                        .layer_count(1),
                );
            let view = gpu.device().create_image_view(&view_info, None)?;

            Some((image, view))
        };

        let depth_info = vk::ImageCreateInfo::default()
            .image_type(vk::ImageType::TYPE_2D)
            .format(depth_format)
            .extent(vk::Extent3D {
                width: extent.width,
                height: extent.height,
                depth: 1,
            })
            .mip_levels(1)
            .array_layers(1)
            .samples(samples)
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT)
            .initial_layout(vk::ImageLayout::UNDEFINED);

        let depth =
            gpu.allocator()
                .lock()
                .create_image(&depth_info, MemoryLocation::GpuOnly, "depth")?;

        let depth_view_info = vk::ImageViewCreateInfo::default()
            .image(depth.image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(depth_format)
            .subresource_range(
                vk::ImageSubresourceRange::default()
                    .aspect_mask(vk::ImageAspectFlags::DEPTH)
                    .level_count(1)
                    .layer_count(1),
            );
        let depth_view = gpu.device().create_image_view(&depth_view_info, None)?;

        Ok(Self {
            msaa_color,
            depth,
            depth_view,
        })
    }

    unsafe fn destroy(&mut self, gpu: &GpuContext) -> Result<()> {
        if let Some((mut image, view)) = self.msaa_color.take() {
            gpu.device().destroy_image_view(view, None);
            gpu.allocator().lock().free_image(&mut image)?;
        }
        gpu.device().destroy_image_view(self.depth_view, None);
        gpu.allocator().lock().free_image(&mut self.depth)?;
        Ok(())
    }
}

/// Pick a depth format the device supports for optimal-tiling attachments.
///
/// # Safety
/// The GPU context must be valid.
pub unsafe fn find_depth_format(gpu: &GpuContext) -> Result<vk::Format> {
    let candidates = [
        vk::Format::D32_SFLOAT,
        vk::Format::D32_SFLOAT_S8_UINT,
        vk::Format::D24_UNORM_S8_UINT,
    ];

    for format in candidates {
        let props = gpu
            .instance()
            .get_physical_device_format_properties(gpu.physical_device(), format);
        if props
            .optimal_tiling_features
            .contains(vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT)
        {
            return Ok(format);
        }
    }

    Err(RenderError::NoDepthFormat)
}

/// Renders a scene with a PBR mesh pass and a skybox pass.
///
/// Pipelines use dynamic viewport and scissor, so window resizes only
/// rebuild the offscreen attachments, never the pipelines.
pub struct SceneRenderer {
    extent: vk::Extent2D,
    color_format: vk::Format,
    depth_format: vk::Format,
    samples: vk::SampleCountFlags,

    frame_set_layout: vk::DescriptorSetLayout,
    scene_set_layout: vk::DescriptorSetLayout,
    pipeline_layout: vk::PipelineLayout,
    pbr_pipeline: GraphicsPipeline,
    skybox_pipeline: GraphicsPipeline,

    uniform_buffers: Vec<GpuBuffer>,
    frame_sets: Vec<vk::DescriptorSet>,
    scene_set: vk::DescriptorSet,

    hdri_to_cube: CubemapPass,
    irradiance_pass: CubemapPass,
    environment_cubemap: CubemapTarget,
    irradiance_cubemap: CubemapTarget,

    targets: RenderTargets,
    environment: EnvironmentTracker,
}

impl SceneRenderer {
    /// Build the renderer: layouts, pipelines, per-frame uniforms, and the
    /// precomputed environment cubemaps.
    ///
    /// # Safety
    /// The GPU context and all scene handles must be valid.
    pub unsafe fn init(
        gpu: &GpuContext,
        scene: &dyn RenderScene,
        state: &RenderState,
        config: &RendererConfig,
    ) -> Result<Self> {
        let depth_format = find_depth_format(gpu)?;

        let frame_set_layout = DescriptorSetLayoutBuilder::new()
            .uniform_buffer(vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT)
            .build(gpu.device())?;

        let mut scene_layout_builder = DescriptorSetLayoutBuilder::new();
        for _ in 0..SCENE_BINDING_COUNT {
            scene_layout_builder = scene_layout_builder.combined_image_sampler(
                vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT,
            );
        }
        let scene_set_layout = scene_layout_builder.build(gpu.device())?;

        let pipeline_layout = PipelineLayoutBuilder::new()
            .set_layout(frame_set_layout)
            .set_layout(scene_set_layout)
            .build(gpu.device())?;

        let pbr_pipeline = GraphicsPipelineBuilder::new()
            .vertex_shader(scene.pbr_vertex_shader())
            .fragment_shader(scene.pbr_fragment_shader())
            .vertex_binding(0, Vertex::STRIDE)
            .vertex_attribute(0, 0, vk::Format::R32G32B32_SFLOAT, 0)
            .vertex_attribute(1, 0, vk::Format::R32G32B32_SFLOAT, 12)
            .vertex_attribute(2, 0, vk::Format::R32G32_SFLOAT, 24)
            .samples(config.samples)
            .color_format(config.color_format)
            .depth_format(depth_format)
            .build(gpu.device(), pipeline_layout)?;

        let skybox_pipeline = GraphicsPipelineBuilder::new()
            .vertex_shader(scene.skybox_vertex_shader())
            .fragment_shader(scene.skybox_fragment_shader())
            .vertex_binding(0, Vertex::STRIDE)
            .vertex_attribute(0, 0, vk::Format::R32G32B32_SFLOAT, 0)
            .vertex_attribute(1, 0, vk::Format::R32G32B32_SFLOAT, 12)
            .vertex_attribute(2, 0, vk::Format::R32G32_SFLOAT, 24)
            .samples(config.samples)
            .color_format(config.color_format)
            .depth_format(depth_format)
            .build(gpu.device(), pipeline_layout)?;

        // One uniform buffer and frame set per slot so updates never race
        // in-flight frames.
        let ubo_size = std::mem::size_of::<RenderState>() as u64;
        let mut uniform_buffers = Vec::with_capacity(config.frames_in_flight);
        for i in 0..config.frames_in_flight {
            uniform_buffers.push(gpu.allocator().lock().create_buffer(
                ubo_size,
                vk::BufferUsageFlags::UNIFORM_BUFFER,
                MemoryLocation::CpuToGpu,
                &format!("frame uniforms {i}"),
            )?);
        }

        let frame_layouts = vec![frame_set_layout; config.frames_in_flight];
        let frame_sets = gpu
            .descriptor_pool()
            .lock()
            .allocate(gpu.device(), &frame_layouts)?;

        for (set, buffer) in frame_sets.iter().zip(&uniform_buffers) {
            write_uniform_buffer(gpu.device(), *set, 0, buffer.buffer, 0, ubo_size);
        }

        let scene_set = gpu
            .descriptor_pool()
            .lock()
            .allocate(gpu.device(), &[scene_set_layout])?[0];

        let environment_cubemap = CubemapTarget::new(gpu, CUBEMAP_FORMAT, CUBEMAP_SIZE)?;
        let irradiance_cubemap = CubemapTarget::new(gpu, CUBEMAP_FORMAT, CUBEMAP_SIZE)?;

        let hdri_to_cube = CubemapPass::new(
            gpu,
            scene.cube_vertex_shader(),
            scene.hdri_to_cube_fragment_shader(),
            CUBEMAP_FORMAT,
        )?;
        let irradiance_pass = CubemapPass::new(
            gpu,
            scene.cube_vertex_shader(),
            scene.irradiance_fragment_shader(),
            CUBEMAP_FORMAT,
        )?;

        let targets = RenderTargets::new(
            gpu,
            config.color_format,
            depth_format,
            config.extent,
            config.samples,
        )?;

        let mut renderer = Self {
            extent: config.extent,
            color_format: config.color_format,
            depth_format,
            samples: config.samples,
            frame_set_layout,
            scene_set_layout,
            pipeline_layout,
            pbr_pipeline,
            skybox_pipeline,
            uniform_buffers,
            frame_sets,
            scene_set,
            hdri_to_cube,
            irradiance_pass,
            environment_cubemap,
            irradiance_cubemap,
            targets,
            environment: EnvironmentTracker::new(state.current_environment),
        };

        renderer.set_environment(gpu, scene, state.current_environment)?;

        for role in TextureRole::ALL {
            let texture = scene.texture(role);
            write_combined_image_sampler(
                gpu.device(),
                renderer.scene_set,
                role.binding(),
                texture.image_view,
                texture.sampler,
            );
        }

        info!(
            frames_in_flight = config.frames_in_flight,
            samples = ?config.samples,
            depth_format = ?depth_format,
            "scene renderer initialized"
        );

        Ok(renderer)
    }

    /// Update camera and uniforms for the slot about to be recorded.
    ///
    /// Re-runs the environment precomputation exactly once when the active
    /// environment index changed.
    ///
    /// # Safety
    /// The GPU context and scene must be valid; `frame_index` must come
    /// from the frame manager.
    pub unsafe fn update(
        &mut self,
        gpu: &GpuContext,
        state: &mut RenderState,
        scene: &dyn RenderScene,
        frame_index: usize,
        time_secs: f32,
    ) -> Result<()> {
        update_camera(state, time_secs, self.extent.width, self.extent.height);

        if self.environment.changed(state.current_environment) {
            self.set_environment(gpu, scene, state.current_environment)?;
        }

        self.uniform_buffers[frame_index].write(&[*state])?;
        Ok(())
    }

    /// Re-render the environment and irradiance cubemaps from the indexed
    /// HDR texture and rebind them in the scene set.
    ///
    /// # Safety
    /// The GPU context and scene must be valid; no frame may be in flight
    /// that samples the cubemaps.
    pub unsafe fn set_environment(
        &mut self,
        gpu: &GpuContext,
        scene: &dyn RenderScene,
        index: u32,
    ) -> Result<()> {
        let count = scene.environment_count();
        if index as usize >= count {
            return Err(RenderError::EnvironmentOutOfRange { index, count });
        }

        debug!(index, "environment change");

        transition_image_layout(
            gpu,
            self.environment_cubemap.image(),
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            1,
            6,
        )?;
        self.hdri_to_cube.render(
            gpu,
            scene.environment_texture(index as usize),
            &self.environment_cubemap,
        )?;
        transition_image_layout(
            gpu,
            self.environment_cubemap.image(),
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            1,
            6,
        )?;

        transition_image_layout(
            gpu,
            self.irradiance_cubemap.image(),
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            1,
            6,
        )?;
        self.irradiance_pass
            .render(gpu, self.environment_cubemap.binding(), &self.irradiance_cubemap)?;
        transition_image_layout(
            gpu,
            self.irradiance_cubemap.image(),
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            1,
            6,
        )?;

        write_combined_image_sampler(
            gpu.device(),
            self.scene_set,
            ENVIRONMENT_CUBEMAP_BINDING,
            self.environment_cubemap.cube_view(),
            self.environment_cubemap.sampler(),
        );
        write_combined_image_sampler(
            gpu.device(),
            self.scene_set,
            IRRADIANCE_CUBEMAP_BINDING,
            self.irradiance_cubemap.cube_view(),
            self.irradiance_cubemap.sampler(),
        );

        Ok(())
    }

    /// Record the skybox and PBR passes into the frame's command buffer.
    ///
    /// # Safety
    /// The frame context must come from a matching `begin_frame` call and
    /// the scene handles must be valid.
    pub unsafe fn render(
        &mut self,
        gpu: &GpuContext,
        scene: &dyn RenderScene,
        frame: &FrameContext,
    ) -> Result<()> {
        // The frame manager rebuilds the swapchain on its own when
        // presentation reports it out of date; no resize event arrives in
        // that case, so the offscreen attachments must follow the frame's
        // extent here.
        if attachments_outdated(self.extent, frame.extent) {
            self.resize(gpu, frame.extent)?;
        }

        let device = gpu.device();
        let cmd = frame.command_buffer;

        // Attachments are cleared, so transitioning from UNDEFINED is safe
        // every frame.
        let mut barriers = vec![
            image_barrier(
                frame.image,
                vk::ImageLayout::UNDEFINED,
                vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
                vk::ImageAspectFlags::COLOR,
            ),
            image_barrier(
                self.targets.depth.image,
                vk::ImageLayout::UNDEFINED,
                vk::ImageLayout::DEPTH_ATTACHMENT_OPTIMAL,
                vk::ImageAspectFlags::DEPTH,
            ),
        ];
        if let Some((ref image, _)) = self.targets.msaa_color {
            barriers.push(image_barrier(
                image.image,
                vk::ImageLayout::UNDEFINED,
                vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
                vk::ImageAspectFlags::COLOR,
            ));
        }
        let (src_stages, dst_stages) = attachment_barrier_stages();
        device.cmd_pipeline_barrier(
            cmd,
            src_stages,
            dst_stages,
            vk::DependencyFlags::empty(),
            &[],
            &[],
            &barriers,
        );

        let clear_color = vk::ClearValue {
            color: vk::ClearColorValue {
                float32: [0.0, 0.0, 0.0, 1.0],
            },
        };

        let color_attachment = match self.targets.msaa_color {
            Some((_, msaa_view)) => vk::RenderingAttachmentInfo::default()
                .image_view(msaa_view)
                .image_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
                .resolve_mode(vk::ResolveModeFlags::AVERAGE)
                .resolve_image_view(frame.image_view)
                .resolve_image_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
                .load_op(vk::AttachmentLoadOp::CLEAR)
                .store_op(vk::AttachmentStoreOp::DONT_CARE)
                .clear_value(clear_color),
            None => vk::RenderingAttachmentInfo::default()
                .image_view(frame.image_view)
                .image_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
                .load_op(vk::AttachmentLoadOp::CLEAR)
                .store_op(vk::AttachmentStoreOp::STORE)
                .clear_value(clear_color),
        };

        let depth_attachment = vk::RenderingAttachmentInfo::default()
            .image_view(self.targets.depth_view)
            .image_layout(vk::ImageLayout::DEPTH_ATTACHMENT_OPTIMAL)
            .load_op(vk::AttachmentLoadOp::CLEAR)
            .store_op(vk::AttachmentStoreOp::DONT_CARE)
            .clear_value(vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue {
                    depth: 1.0,
                    stencil: 0,
                },
            });

        let color_attachments = [color_attachment];
        let rendering_info = vk::RenderingInfo::default()
            .render_area(vk::Rect2D::default().extent(frame.extent))
            .layer_count(1)
            .color_attachments(&color_attachments)
            .depth_attachment(&depth_attachment);

        device.cmd_begin_rendering(cmd, &rendering_info);

        let viewport = vk::Viewport::default()
            .width(frame.extent.width as f32)
            .height(frame.extent.height as f32)
            .max_depth(1.0);
        let scissor = vk::Rect2D::default().extent(frame.extent);
        device.cmd_set_viewport(cmd, 0, &[viewport]);
        device.cmd_set_scissor(cmd, 0, &[scissor]);

        let sets = [self.frame_sets[frame.frame_index], self.scene_set];

        self.skybox_pipeline.bind(device, cmd);
        device.cmd_bind_descriptor_sets(
            cmd,
            vk::PipelineBindPoint::GRAPHICS,
            self.pipeline_layout,
            0,
            &sets,
            &[],
        );
        draw_mesh(device, cmd, scene.skybox());

        self.pbr_pipeline.bind(device, cmd);
        device.cmd_bind_descriptor_sets(
            cmd,
            vk::PipelineBindPoint::GRAPHICS,
            self.pipeline_layout,
            0,
            &sets,
            &[],
        );
        draw_mesh(device, cmd, scene.mesh());

        device.cmd_end_rendering(cmd);

        let present_barrier = image_barrier(
            frame.image,
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            vk::ImageLayout::PRESENT_SRC_KHR,
            vk::ImageAspectFlags::COLOR,
        );
        device.cmd_pipeline_barrier(
            cmd,
            vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
            vk::PipelineStageFlags::BOTTOM_OF_PIPE,
            vk::DependencyFlags::empty(),
            &[],
            &[],
            &[present_barrier],
        );

        Ok(())
    }

    /// Adopt a new output extent, rebuilding the offscreen attachments.
    ///
    /// # Safety
    /// The GPU context must be valid. Waits for device idle before
    /// replacing attachments still referenced by in-flight frames.
    pub unsafe fn resize(&mut self, gpu: &GpuContext, extent: vk::Extent2D) -> Result<()> {
        if extent.width == 0 || extent.height == 0 {
            return Ok(());
        }

        self.extent = extent;

        gpu.wait_idle().map_err(RenderError::Gpu)?;
        self.targets.destroy(gpu)?;
        self.targets = RenderTargets::new(
            gpu,
            self.color_format,
            self.depth_format,
            extent,
            self.samples,
        )?;

        Ok(())
    }

    /// Destroy all renderer resources in reverse creation order.
    ///
    /// # Safety
    /// The GPU context must be valid and no frame may be in flight.
    pub unsafe fn shutdown(&mut self, gpu: &GpuContext) -> Result<()> {
        self.targets.destroy(gpu)?;

        self.hdri_to_cube.destroy(gpu)?;
        self.irradiance_pass.destroy(gpu)?;
        self.environment_cubemap.destroy(gpu)?;
        self.irradiance_cubemap.destroy(gpu)?;

        {
            let mut pool = gpu.descriptor_pool().lock();
            pool.free(gpu.device(), &[self.scene_set])?;
            pool.free(gpu.device(), &self.frame_sets)?;
        }
        self.frame_sets.clear();

        {
            let mut allocator = gpu.allocator().lock();
            for buffer in &mut self.uniform_buffers {
                allocator.free_buffer(buffer)?;
            }
        }
        self.uniform_buffers.clear();

        self.pbr_pipeline.destroy(gpu.device());
        self.skybox_pipeline.destroy(gpu.device());
        gpu.device()
            .destroy_pipeline_layout(self.pipeline_layout, None);
        gpu.device()
            .destroy_descriptor_set_layout(self.scene_set_layout, None);
        gpu.device()
            .destroy_descriptor_set_layout(self.frame_set_layout, None);

        Ok(())
    }
}

/// Bind a mesh's buffers and issue the indexed draw.
///
/// # Safety
/// The command buffer must be recording inside a render pass instance.
unsafe fn draw_mesh(device: &ash::Device, cmd: vk::CommandBuffer, mesh: crate::scene::MeshBuffers) {
    device.cmd_bind_vertex_buffers(cmd, 0, &[mesh.vertex_buffer], &[0]);
    device.cmd_bind_index_buffer(cmd, mesh.index_buffer, 0, vk::IndexType::UINT32);
    device.cmd_draw_indexed(cmd, mesh.index_count, 1, 0, 0, 0);
}

/// True when the presented extent no longer matches the extent the
/// offscreen attachments were built for.
fn attachments_outdated(attachments: vk::Extent2D, presented: vk::Extent2D) -> bool {
    attachments.width != presented.width || attachments.height != presented.height
}

/// Stages for the pre-render attachment transitions. The image-available
/// semaphore blocks only the color-output stage, so the source mask must
/// include it for the swapchain-image transition to execute after the
/// semaphore wait.
fn attachment_barrier_stages() -> (vk::PipelineStageFlags, vk::PipelineStageFlags) {
    (
        vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
        vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
            | vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS,
    )
}

fn image_barrier(
    image: vk::Image,
    old_layout: vk::ImageLayout,
    new_layout: vk::ImageLayout,
    aspect: vk::ImageAspectFlags,
) -> vk::ImageMemoryBarrier<'static> {
    let dst_access = match new_layout {
        vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL => vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
        vk::ImageLayout::DEPTH_ATTACHMENT_OPTIMAL => {
            vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE
        }
        _ => vk::AccessFlags::empty(),
    };
    let src_access = match old_layout {
        vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL => vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
        _ => vk::AccessFlags::empty(),
    };

    vk::ImageMemoryBarrier::default()
        .old_layout(old_layout)
        .new_layout(new_layout)
        .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .src_access_mask(src_access)
        .dst_access_mask(dst_access)
        .image(image)
        .subresource_range(
            vk::ImageSubresourceRange::default()
                .aspect_mask(aspect)
                .level_count(1)
                .layer_count(1),
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn environment_change_fires_once_per_index() {
        let mut tracker = EnvironmentTracker::new(0);

        assert!(!tracker.changed(0));
        assert!(tracker.changed(1));
        assert!(!tracker.changed(1));
        assert!(!tracker.changed(1));
        assert!(tracker.changed(0));
    }

    #[test]
    fn attachments_follow_a_silently_rebuilt_swapchain() {
        let built = vk::Extent2D {
            width: 800,
            height: 600,
        };

        assert!(!attachments_outdated(
            built,
            vk::Extent2D {
                width: 800,
                height: 600,
            }
        ));
        // An out-of-date present rebuilds the swapchain without a resize
        // event; the next frame arrives with a new extent.
        assert!(attachments_outdated(
            built,
            vk::Extent2D {
                width: 1024,
                height: 600,
            }
        ));
        assert!(attachments_outdated(
            built,
            vk::Extent2D {
                width: 800,
                height: 768,
            }
        ));
    }

    #[test]
    fn acquire_barrier_chains_with_the_image_available_wait() {
        let (src, dst) = attachment_barrier_stages();

        // The semaphore wait blocks COLOR_ATTACHMENT_OUTPUT only; a
        // source of TOP_OF_PIPE would let the transition run before it.
        assert!(src.contains(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT));
        assert!(!src.contains(vk::PipelineStageFlags::TOP_OF_PIPE));
        assert!(dst.contains(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT));
        assert!(dst.contains(vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS));
    }

    #[test]
    fn present_barrier_releases_color_writes() {
        let barrier = image_barrier(
            vk::Image::null(),
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            vk::ImageLayout::PRESENT_SRC_KHR,
            vk::ImageAspectFlags::COLOR,
        );
        assert_eq!(barrier.src_access_mask, vk::AccessFlags::COLOR_ATTACHMENT_WRITE);
        assert_eq!(barrier.dst_access_mask, vk::AccessFlags::empty());
    }

    #[test]
    fn depth_barrier_targets_depth_writes() {
        let barrier = image_barrier(
            vk::Image::null(),
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::DEPTH_ATTACHMENT_OPTIMAL,
            vk::ImageAspectFlags::DEPTH,
        );
        assert_eq!(
            barrier.dst_access_mask,
            vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE
        );
    }
}
