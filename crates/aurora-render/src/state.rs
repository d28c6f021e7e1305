//! Per-frame render state.

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3, Vec4};

const ORBIT_ROTATION_SPEED: f32 = 0.3;
const CAMERA_FOV_DEGREES: f32 = 60.0;
const CAMERA_Z_NEAR: f32 = 0.1;
const CAMERA_Z_FAR: f32 = 1000.0;

/// Uniform payload uploaded once per frame.
///
/// Layout matches the std140 uniform block shared by the PBR and skybox
/// shaders.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct RenderState {
    pub world: Mat4,
    pub view: Mat4,
    pub proj: Mat4,
    /// Camera position in world space; w is unused padding.
    pub camera_pos: Vec4,
    /// Index of the active HDR environment.
    pub current_environment: u32,
    pub _padding: [u32; 3],
}

impl Default for RenderState {
    fn default() -> Self {
        Self {
            world: Mat4::IDENTITY,
            view: Mat4::IDENTITY,
            proj: Mat4::IDENTITY,
            camera_pos: Vec4::ZERO,
            current_environment: 0,
            _padding: [0; 3],
        }
    }
}

/// Update the orbit camera for the elapsed time and output extent.
///
/// The camera circles the origin around the world Z axis. Projection is a
/// perspective transform with the Y axis flipped for Vulkan clip space.
pub fn update_camera(state: &mut RenderState, time_secs: f32, width: u32, height: u32) {
    let up = Vec3::Z;
    let camera_pos = Vec3::new(2.0, 2.0, 2.0);

    let angle = time_secs * ORBIT_ROTATION_SPEED * 90.0_f32.to_radians();
    let rotation = Mat4::from_axis_angle(up, angle);

    let aspect = width as f32 / height.max(1) as f32;

    state.world = Mat4::IDENTITY;
    state.view = Mat4::look_at_rh(camera_pos, Vec3::ZERO, up) * rotation;

    let mut proj = Mat4::perspective_rh(
        CAMERA_FOV_DEGREES.to_radians(),
        aspect,
        CAMERA_Z_NEAR,
        CAMERA_Z_FAR,
    );
    proj.y_axis.y *= -1.0;
    state.proj = proj;

    state.camera_pos = rotation.transpose() * camera_pos.extend(1.0);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_size_matches_std140_block() {
        // 3 mat4 + vec4 + uvec4
        assert_eq!(std::mem::size_of::<RenderState>(), 3 * 64 + 16 + 16);
    }

    #[test]
    fn projection_flips_y_for_vulkan() {
        let mut state = RenderState::default();
        update_camera(&mut state, 0.0, 800, 600);
        assert!(state.proj.y_axis.y < 0.0);
    }

    #[test]
    fn camera_orbits_around_the_origin() {
        let mut state = RenderState::default();

        update_camera(&mut state, 0.0, 800, 600);
        let start = state.camera_pos;

        update_camera(&mut state, 2.0, 800, 600);
        let later = state.camera_pos;

        assert!((start - later).truncate().length() > 1e-3);
        // Orbit radius stays constant
        assert!((start.truncate().length() - later.truncate().length()).abs() < 1e-4);
    }

    #[test]
    fn zero_height_does_not_divide_by_zero() {
        let mut state = RenderState::default();
        update_camera(&mut state, 1.0, 800, 0);
        assert!(state.proj.x_axis.x.is_finite());
    }
}
