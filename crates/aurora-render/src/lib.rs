//! Scene rendering for the Aurora engine.
//!
//! Provides the PBR + skybox frame renderer, the per-frame render state,
//! and the offline cubemap passes used for image-based lighting.

pub mod cubemap;
pub mod error;
pub mod renderer;
pub mod scene;
pub mod state;

pub use cubemap::{CubemapPass, CubemapTarget};
pub use error::{RenderError, Result};
pub use renderer::{RendererConfig, SceneRenderer};
pub use scene::{MeshBuffers, RenderScene, TextureBinding, TextureRole, Vertex};
pub use state::RenderState;
