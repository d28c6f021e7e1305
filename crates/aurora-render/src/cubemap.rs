//! Offline cubemap rendering.
//!
//! Cubemaps for image-based lighting are precomputed outside the frame
//! loop: a single-time command submission renders each of the six faces
//! with a per-face view-projection matrix pushed as a constant. The same
//! pass type drives both the equirectangular-to-cube conversion and the
//! diffuse irradiance convolution.

use crate::error::Result;
use aurora_gpu::command::execute_single_time_commands;
use aurora_gpu::context::GpuContext;
use aurora_gpu::descriptors::{
    write_combined_image_sampler, DescriptorSetLayoutBuilder, PipelineLayoutBuilder,
};
use aurora_gpu::memory::GpuImage;
use aurora_gpu::pipeline::{GraphicsPipeline, GraphicsPipelineBuilder};
use ash::vk;
use glam::{Mat4, Vec3};
use gpu_allocator::MemoryLocation;

const CUBE_FACE_COUNT: usize = 6;
const CUBE_VERTEX_COUNT: u32 = 36;

/// View-projection matrix for one cubemap face.
///
/// 90 degree frustum, unit aspect, looking down the face axis.
pub fn face_view_projection(face: usize) -> Mat4 {
    let (dir, up) = match face {
        0 => (Vec3::X, -Vec3::Y),
        1 => (-Vec3::X, -Vec3::Y),
        2 => (Vec3::Y, Vec3::Z),
        3 => (-Vec3::Y, -Vec3::Z),
        4 => (Vec3::Z, -Vec3::Y),
        _ => (-Vec3::Z, -Vec3::Y),
    };

    let proj = Mat4::perspective_rh(90.0_f32.to_radians(), 1.0, 0.1, 10.0);
    let view = Mat4::look_at_rh(Vec3::ZERO, dir, up);
    proj * view
}

/// Record an image layout transition through a single-time command buffer.
///
/// # Safety
/// The GPU context and image must be valid and the image must not be in
/// use by in-flight work.
pub unsafe fn transition_image_layout(
    gpu: &GpuContext,
    image: vk::Image,
    old_layout: vk::ImageLayout,
    new_layout: vk::ImageLayout,
    mip_levels: u32,
    layer_count: u32,
) -> Result<()> {
    execute_single_time_commands(
        gpu.device(),
        gpu.command_pool(),
        gpu.graphics_queue(),
        |cmd| {
            let (src_access, dst_access, src_stage, dst_stage) =
                barrier_masks(old_layout, new_layout);

            let barrier = vk::ImageMemoryBarrier::default()
                .old_layout(old_layout)
                .new_layout(new_layout)
                .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                .image(image)
                .src_access_mask(src_access)
                .dst_access_mask(dst_access)
                .subresource_range(
                    vk::ImageSubresourceRange::default()
                        .aspect_mask(vk::ImageAspectFlags::COLOR)
                        .base_mip_level(0)
                        .level_count(mip_levels)
                        .base_array_layer(0)
                        .layer_count(layer_count),
                );

            unsafe {
                gpu.device().cmd_pipeline_barrier(
                    cmd,
                    src_stage,
                    dst_stage,
                    vk::DependencyFlags::empty(),
                    &[],
                    &[],
                    &[barrier],
                );
            }
        },
    )?;
    Ok(())
}

/// Access and stage masks for the layout transitions the renderer uses.
fn barrier_masks(
    old_layout: vk::ImageLayout,
    new_layout: vk::ImageLayout,
) -> (
    vk::AccessFlags,
    vk::AccessFlags,
    vk::PipelineStageFlags,
    vk::PipelineStageFlags,
) {
    let (src_access, src_stage) = match old_layout {
        vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL => (
            vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
            vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
        ),
        vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL => (
            vk::AccessFlags::SHADER_READ,
            vk::PipelineStageFlags::FRAGMENT_SHADER,
        ),
        _ => (
            vk::AccessFlags::empty(),
            vk::PipelineStageFlags::TOP_OF_PIPE,
        ),
    };

    let (dst_access, dst_stage) = match new_layout {
        vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL => (
            vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
            vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
        ),
        vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL => (
            vk::AccessFlags::SHADER_READ,
            vk::PipelineStageFlags::FRAGMENT_SHADER,
        ),
        _ => (
            vk::AccessFlags::empty(),
            vk::PipelineStageFlags::BOTTOM_OF_PIPE,
        ),
    };

    (src_access, dst_access, src_stage, dst_stage)
}

/// A renderable, sampleable cubemap.
pub struct CubemapTarget {
    image: GpuImage,
    /// Cube view sampled by the scene shaders.
    cube_view: vk::ImageView,
    /// One view per face, used as a color attachment.
    face_views: [vk::ImageView; CUBE_FACE_COUNT],
    sampler: vk::Sampler,
    format: vk::Format,
    size: u32,
}

impl CubemapTarget {
    /// Create a cubemap target of `size` x `size` per face.
    ///
    /// The image starts in shader-read layout so it can be bound before
    /// its first render.
    ///
    /// # Safety
    /// The GPU context must be valid.
    pub unsafe fn new(gpu: &GpuContext, format: vk::Format, size: u32) -> Result<Self> {
        let create_info = vk::ImageCreateInfo::default()
            .image_type(vk::ImageType::TYPE_2D)
            .format(format)
            .extent(vk::Extent3D {
                width: size,
                height: size,
                depth: 1,
            })
            .mip_levels(1)
            .array_layers(CUBE_FACE_COUNT as u32)
            .samples(vk::SampleCountFlags::TYPE_1)
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::SAMPLED)
            .flags(vk::ImageCreateFlags::CUBE_COMPATIBLE)
            .initial_layout(vk::ImageLayout::UNDEFINED);

        let image =
            gpu.allocator()
                .lock()
                .create_image(&create_info, MemoryLocation::GpuOnly, "cubemap")?;

        let cube_view_info = vk::ImageViewCreateInfo::default()
            .image(image.image)
            .view_type(vk::ImageViewType::CUBE)
            .format(format)
            .subresource_range(
                vk::ImageSubresourceRange::default()
                    .aspect_mask(vk::ImageAspectFlags::COLOR)
                    .level_count(1)
                    .layer_count(CUBE_FACE_COUNT as u32),
            );
        let cube_view = gpu.device().create_image_view(&cube_view_info, None)?;

        let mut face_views = [vk::ImageView::null(); CUBE_FACE_COUNT];
        for (face, view) in face_views.iter_mut().enumerate() {
            let face_view_info = vk::ImageViewCreateInfo::default()
                .image(image.image)
                .view_type(vk::ImageViewType::TYPE_2D)
                .format(format)
                .subresource_range(
                    vk::ImageSubresourceRange::default()
                        .aspect_mask(vk::ImageAspectFlags::COLOR)
                        .level_count(1)
                        .base_array_layer(face as u32)
                        .layer_count(1),
                );
            *view = gpu.device().create_image_view(&face_view_info, None)?;
        }

        let sampler_info = vk::SamplerCreateInfo::default()
            .mag_filter(vk::Filter::LINEAR)
            .min_filter(vk::Filter::LINEAR)
            .mipmap_mode(vk::SamplerMipmapMode::LINEAR)
            .address_mode_u(vk::SamplerAddressMode::CLAMP_TO_EDGE)
            .address_mode_v(vk::SamplerAddressMode::CLAMP_TO_EDGE)
            .address_mode_w(vk::SamplerAddressMode::CLAMP_TO_EDGE)
            .max_lod(1.0);
        let sampler = gpu.device().create_sampler(&sampler_info, None)?;

        transition_image_layout(
            gpu,
            image.image,
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            1,
            CUBE_FACE_COUNT as u32,
        )?;

        Ok(Self {
            image,
            cube_view,
            face_views,
            sampler,
            format,
            size,
        })
    }

    /// The raw image handle.
    pub fn image(&self) -> vk::Image {
        self.image.image
    }

    /// The cube view for sampling.
    pub fn cube_view(&self) -> vk::ImageView {
        self.cube_view
    }

    /// The cubemap sampler.
    pub fn sampler(&self) -> vk::Sampler {
        self.sampler
    }

    /// The cubemap as a sampled texture binding.
    pub fn binding(&self) -> crate::scene::TextureBinding {
        crate::scene::TextureBinding {
            image_view: self.cube_view,
            sampler: self.sampler,
        }
    }

    /// The per-face color format.
    pub fn format(&self) -> vk::Format {
        self.format
    }

    /// Destroy views, sampler, and the image.
    ///
    /// # Safety
    /// The GPU context must be valid and the cubemap must not be in use.
    pub unsafe fn destroy(&mut self, gpu: &GpuContext) -> Result<()> {
        gpu.device().destroy_sampler(self.sampler, None);
        for view in self.face_views {
            gpu.device().destroy_image_view(view, None);
        }
        gpu.device().destroy_image_view(self.cube_view, None);
        gpu.allocator().lock().free_image(&mut self.image)?;
        Ok(())
    }
}

/// Offline single-pass cubemap renderer.
///
/// Holds the pipeline that renders a source texture into the six faces of
/// a [`CubemapTarget`].
pub struct CubemapPass {
    set_layout: vk::DescriptorSetLayout,
    pipeline_layout: vk::PipelineLayout,
    pipeline: GraphicsPipeline,
    descriptor_set: vk::DescriptorSet,
}

impl CubemapPass {
    /// Build the pass for a target format.
    ///
    /// # Safety
    /// The GPU context and shader modules must be valid.
    pub unsafe fn new(
        gpu: &GpuContext,
        vertex_shader: vk::ShaderModule,
        fragment_shader: vk::ShaderModule,
        target_format: vk::Format,
    ) -> Result<Self> {
        let set_layout = DescriptorSetLayoutBuilder::new()
            .combined_image_sampler(vk::ShaderStageFlags::FRAGMENT)
            .build(gpu.device())?;

        let pipeline_layout = PipelineLayoutBuilder::new()
            .set_layout(set_layout)
            .push_constant_range(
                vk::ShaderStageFlags::VERTEX,
                0,
                std::mem::size_of::<Mat4>() as u32,
            )
            .build(gpu.device())?;

        // The cube is generated in the vertex shader; no vertex input.
        let pipeline = GraphicsPipelineBuilder::new()
            .vertex_shader(vertex_shader)
            .fragment_shader(fragment_shader)
            .cull_mode(vk::CullModeFlags::NONE)
            .depth(false, false, vk::CompareOp::ALWAYS)
            .color_format(target_format)
            .build(gpu.device(), pipeline_layout)?;

        let descriptor_set = gpu
            .descriptor_pool()
            .lock()
            .allocate(gpu.device(), &[set_layout])?[0];

        Ok(Self {
            set_layout,
            pipeline_layout,
            pipeline,
            descriptor_set,
        })
    }

    /// Render `source` into every face of `target` and wait for completion.
    ///
    /// The target must be in color-attachment layout.
    ///
    /// # Safety
    /// All handles must be valid.
    pub unsafe fn render(
        &self,
        gpu: &GpuContext,
        source: crate::scene::TextureBinding,
        target: &CubemapTarget,
    ) -> Result<()> {
        write_combined_image_sampler(
            gpu.device(),
            self.descriptor_set,
            0,
            source.image_view,
            source.sampler,
        );

        let device = gpu.device();
        execute_single_time_commands(device, gpu.command_pool(), gpu.graphics_queue(), |cmd| {
            let extent = vk::Extent2D {
                width: target.size,
                height: target.size,
            };

            let viewport = vk::Viewport::default()
                .width(target.size as f32)
                .height(target.size as f32)
                .max_depth(1.0);
            let scissor = vk::Rect2D::default().extent(extent);

            for (face, &face_view) in target.face_views.iter().enumerate() {
                let color_attachment = vk::RenderingAttachmentInfo::default()
                    .image_view(face_view)
                    .image_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
                    .load_op(vk::AttachmentLoadOp::CLEAR)
                    .store_op(vk::AttachmentStoreOp::STORE)
                    .clear_value(vk::ClearValue {
                        color: vk::ClearColorValue {
                            float32: [0.0, 0.0, 0.0, 1.0],
                        },
                    });

                let attachments = [color_attachment];
                let rendering_info = vk::RenderingInfo::default()
                    .render_area(vk::Rect2D::default().extent(extent))
                    .layer_count(1)
                    .color_attachments(&attachments);

                unsafe {
                    device.cmd_begin_rendering(cmd, &rendering_info);
                    device.cmd_set_viewport(cmd, 0, &[viewport]);
                    device.cmd_set_scissor(cmd, 0, &[scissor]);
                    self.pipeline.bind(device, cmd);
                    device.cmd_bind_descriptor_sets(
                        cmd,
                        vk::PipelineBindPoint::GRAPHICS,
                        self.pipeline_layout,
                        0,
                        &[self.descriptor_set],
                        &[],
                    );
                    device.cmd_push_constants(
                        cmd,
                        self.pipeline_layout,
                        vk::ShaderStageFlags::VERTEX,
                        0,
                        bytemuck::bytes_of(&face_view_projection(face)),
                    );
                    device.cmd_draw(cmd, CUBE_VERTEX_COUNT, 1, 0, 0);
                    device.cmd_end_rendering(cmd);
                }
            }
        })?;

        Ok(())
    }

    /// Destroy the pass resources.
    ///
    /// # Safety
    /// The GPU context must be valid and the pass must not be in use.
    pub unsafe fn destroy(&self, gpu: &GpuContext) -> Result<()> {
        gpu.descriptor_pool()
            .lock()
            .free(gpu.device(), &[self.descriptor_set])?;
        self.pipeline.destroy(gpu.device());
        gpu.device()
            .destroy_pipeline_layout(self.pipeline_layout, None);
        gpu.device()
            .destroy_descriptor_set_layout(self.set_layout, None);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn face_matrices_are_distinct() {
        for a in 0..CUBE_FACE_COUNT {
            for b in (a + 1)..CUBE_FACE_COUNT {
                assert_ne!(
                    face_view_projection(a),
                    face_view_projection(b),
                    "faces {a} and {b} share a view-projection"
                );
            }
        }
    }

    #[test]
    fn face_matrices_look_outward() {
        // A point along each face axis must project in front of the camera.
        let axes = [
            Vec3::X,
            -Vec3::X,
            Vec3::Y,
            -Vec3::Y,
            Vec3::Z,
            -Vec3::Z,
        ];
        for (face, axis) in axes.iter().enumerate() {
            let clip = face_view_projection(face) * (*axis).extend(1.0);
            assert!(clip.w > 0.0, "face {face} does not face its axis");
        }
    }

    #[test]
    fn attachment_transitions_use_color_and_shader_stages() {
        let (src_access, dst_access, _, _) = barrier_masks(
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        );
        assert_eq!(src_access, vk::AccessFlags::SHADER_READ);
        assert_eq!(dst_access, vk::AccessFlags::COLOR_ATTACHMENT_WRITE);

        let (src_access, dst_access, _, _) = barrier_masks(
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        );
        assert_eq!(src_access, vk::AccessFlags::COLOR_ATTACHMENT_WRITE);
        assert_eq!(dst_access, vk::AccessFlags::SHADER_READ);
    }
}
