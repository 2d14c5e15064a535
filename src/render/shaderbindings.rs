use bytemuck::{Pod, Zeroable};
use glm::{Mat4, Vec3};

// -- root parameter slots, must match the root signature the shaders are built against
pub const ROOT_PARAM_TRANSFORM: u32 = 0;
pub const ROOT_PARAM_LIGHT: u32 = 1;
pub const ROOT_PARAM_MATERIAL: u32 = 2;
pub const ROOT_PARAM_PASS: u32 = 3;

// -- glm matrices are column-major; the shader side declares column_major
pub fn mat4_to_array(m: &Mat4) -> [[f32; 4]; 4] {
    let mut result = [[0.0; 4]; 4];
    for c in 0..4 {
        for r in 0..4 {
            result[c][r] = m[(r, c)];
        }
    }
    result
}

pub fn vec3_to_array(v: &Vec3) -> [f32; 3] {
    [v.x, v.y, v.z]
}

#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct STransform {
    pub world: [[f32; 4]; 4],
    pub view: [[f32; 4]; 4],
    pub proj: [[f32; 4]; 4],
}

impl STransform {
    pub fn new(world: &Mat4, view: &Mat4, proj: &Mat4) -> Self {
        Self {
            world: mat4_to_array(world),
            view: mat4_to_array(view),
            proj: mat4_to_array(proj),
        }
    }
}

// -- range is point/spot only, direction is directional/spot only, position is point/spot only
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct SLight {
    pub color: [f32; 3],
    pub range: f32,
    pub direction: [f32; 3],
    pub spot_power: f32,
    pub position: [f32; 3],
    pub pad: f32,
}

#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct SLightBuffer {
    pub dir_light: SLight,
    pub point_light: SLight,
    pub spot_light: SLight,
}

#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct SMaterialBuffer {
    pub diffuse: [f32; 3],
    pub alpha: f32,
    pub specular: [f32; 3],
    pub shininess: f32,
}

#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct SPassConstants {
    pub camera_position: [f32; 3],
    pub pad0: f32,
    pub ambient_light: [f32; 4],
    pub diffuse_map_usable: i32,
    pub specular_map_usable: i32,
    pub shininess_map_usable: i32,
    pub normal_map_usable: i32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::mem::size_of;

    #[test]
    fn test_layouts_match_hlsl_packing() {
        assert_eq!(size_of::<STransform>(), 192);
        assert_eq!(size_of::<SLight>(), 48);
        assert_eq!(size_of::<SLightBuffer>(), 144);
        assert_eq!(size_of::<SMaterialBuffer>(), 32);
        assert_eq!(size_of::<SPassConstants>(), 48);
    }

    #[test]
    fn test_mat4_columns() {
        let m = glm::translation(&glm::vec3(1.0, 2.0, 3.0));
        let a = mat4_to_array(&m);
        assert_eq!(a[3], [1.0, 2.0, 3.0, 1.0]);
        assert_eq!(a[0], [1.0, 0.0, 0.0, 0.0]);
    }
}
