//! The contract between the renderer and the application's scene data.
//!
//! The renderer never loads assets; it consumes shader modules, mesh
//! buffers, and texture bindings the application uploaded through the GPU
//! layer.

use ash::vk;
use bytemuck::{Pod, Zeroable};

/// Semantic role of a material texture in the scene descriptor set.
///
/// The discriminant is the descriptor binding index of the role.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum TextureRole {
    Albedo = 0,
    Normal = 1,
    AmbientOcclusion = 2,
    Shading = 3,
    Emission = 4,
}

impl TextureRole {
    /// All material roles, in binding order.
    pub const ALL: [Self; 5] = [
        Self::Albedo,
        Self::Normal,
        Self::AmbientOcclusion,
        Self::Shading,
        Self::Emission,
    ];

    /// The descriptor binding this role occupies in the scene set.
    pub fn binding(self) -> u32 {
        self as u32
    }
}

/// A sampled texture as the renderer sees it.
#[derive(Debug, Clone, Copy)]
pub struct TextureBinding {
    pub image_view: vk::ImageView,
    pub sampler: vk::Sampler,
}

/// Vertex format shared by all scene meshes.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct Vertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub uv: [f32; 2],
}

impl Vertex {
    /// Stride of one vertex in bytes.
    pub const STRIDE: u32 = std::mem::size_of::<Self>() as u32;

    /// Vertex buffer binding description at binding 0.
    pub fn binding_description() -> vk::VertexInputBindingDescription {
        vk::VertexInputBindingDescription::default()
            .binding(0)
            .stride(Self::STRIDE)
            .input_rate(vk::VertexInputRate::VERTEX)
    }

    /// Attribute descriptions: position, normal, uv at locations 0..3.
    pub fn attribute_descriptions() -> [vk::VertexInputAttributeDescription; 3] {
        [
            vk::VertexInputAttributeDescription::default()
                .location(0)
                .binding(0)
                .format(vk::Format::R32G32B32_SFLOAT)
                .offset(0),
            vk::VertexInputAttributeDescription::default()
                .location(1)
                .binding(0)
                .format(vk::Format::R32G32B32_SFLOAT)
                .offset(12),
            vk::VertexInputAttributeDescription::default()
                .location(2)
                .binding(0)
                .format(vk::Format::R32G32_SFLOAT)
                .offset(24),
        ]
    }
}

/// Uploaded mesh geometry, indexed with u32 indices.
#[derive(Debug, Clone, Copy)]
pub struct MeshBuffers {
    pub vertex_buffer: vk::Buffer,
    pub index_buffer: vk::Buffer,
    pub index_count: u32,
}

/// Scene data accessor implemented by the application.
///
/// All handles must stay valid for as long as the renderer holds frames
/// in flight that reference them.
pub trait RenderScene {
    /// PBR vertex shader module.
    fn pbr_vertex_shader(&self) -> vk::ShaderModule;
    /// PBR fragment shader module.
    fn pbr_fragment_shader(&self) -> vk::ShaderModule;
    /// Skybox vertex shader module.
    fn skybox_vertex_shader(&self) -> vk::ShaderModule;
    /// Skybox fragment shader module.
    fn skybox_fragment_shader(&self) -> vk::ShaderModule;
    /// Unit-cube vertex shader used by the offline cubemap passes.
    fn cube_vertex_shader(&self) -> vk::ShaderModule;
    /// Equirectangular-to-cubemap fragment shader.
    fn hdri_to_cube_fragment_shader(&self) -> vk::ShaderModule;
    /// Diffuse irradiance convolution fragment shader.
    fn irradiance_fragment_shader(&self) -> vk::ShaderModule;

    /// The scene mesh.
    fn mesh(&self) -> MeshBuffers;
    /// The skybox cube mesh.
    fn skybox(&self) -> MeshBuffers;

    /// Material texture for a semantic role.
    fn texture(&self, role: TextureRole) -> TextureBinding;

    /// Number of loaded HDR environments.
    fn environment_count(&self) -> usize;
    /// Equirectangular HDR environment texture by index.
    fn environment_texture(&self, index: usize) -> TextureBinding;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn texture_roles_map_to_scene_bindings() {
        let bindings: Vec<u32> = TextureRole::ALL.iter().map(|r| r.binding()).collect();
        assert_eq!(bindings, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn vertex_attributes_cover_the_stride() {
        let attributes = Vertex::attribute_descriptions();
        assert_eq!(attributes[0].offset, 0);
        assert_eq!(attributes[1].offset, 12);
        assert_eq!(attributes[2].offset, 24);
        assert_eq!(Vertex::STRIDE, 32);
    }
}
