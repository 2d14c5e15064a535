use glm::{Mat4, Vec4};

use super::shaderbindings::SMaterialBuffer;

// -- imported mesh, as the renderer needs it. Vertex/index upload happens outside this crate.
#[derive(Clone, Debug)]
pub struct SMeshDesc {
    pub world: Mat4,
    pub material: SMaterialBuffer,
    pub index_count: u32,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ERenderItemVariant {
    Normal,
    // -- the mesh flattened onto the shadow plane along the directional light
    PlanarShadow,
}

// -- one draw. data_index picks this item's element in every per-frame constant buffer array.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct SRenderItem {
    pub data_index: usize,
    pub mesh: usize,
    pub variant: ERenderItemVariant,
}

pub const SHADOW_MATERIAL: SMaterialBuffer = SMaterialBuffer {
    diffuse: [0.0, 0.0, 0.0],
    alpha: 0.5,
    specular: [0.0, 0.0, 0.0],
    shininess: 1.0,
};

pub fn build_render_items(meshes: &[SMeshDesc], planar_shadows: bool) -> Vec<SRenderItem> {
    let per_mesh = if planar_shadows { 2 } else { 1 };
    let mut items = Vec::with_capacity(meshes.len() * per_mesh);

    for mesh in 0..meshes.len() {
        items.push(SRenderItem {
            data_index: items.len(),
            mesh: mesh,
            variant: ERenderItemVariant::Normal,
        });
        if planar_shadows {
            items.push(SRenderItem {
                data_index: items.len(),
                mesh: mesh,
                variant: ERenderItemVariant::PlanarShadow,
            });
        }
    }

    items
}

// -- projects onto `plane` (ax + by + cz + d = 0) along `light`. w = 0 treats light as a direction.
pub fn planar_shadow_matrix(plane: &Vec4, light: &Vec4) -> Mat4 {
    let len = glm::length(&plane.xyz());
    let p = if len > 0.0 { plane / len } else { *plane };
    let d = glm::dot(&p, light);

    let mut result = Mat4::identity() * d;
    result -= light * p.transpose();
    result
}

impl SRenderItem {
    pub fn world(&self, meshes: &[SMeshDesc], shadow: &Mat4) -> Mat4 {
        let world = meshes[self.mesh].world;
        match self.variant {
            ERenderItemVariant::Normal => world,
            ERenderItemVariant::PlanarShadow => shadow * world,
        }
    }

    pub fn material(&self, meshes: &[SMeshDesc]) -> SMaterialBuffer {
        match self.variant {
            ERenderItemVariant::Normal => meshes[self.mesh].material,
            ERenderItemVariant::PlanarShadow => SHADOW_MATERIAL,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mesh(world: Mat4) -> SMeshDesc {
        SMeshDesc {
            world: world,
            material: SMaterialBuffer::default(),
            index_count: 36,
        }
    }

    #[test]
    fn test_items_have_sequential_data_indices() {
        let meshes = vec![mesh(Mat4::identity()), mesh(Mat4::identity())];

        let items = build_render_items(&meshes, true);
        assert_eq!(items.len(), 4);
        for (i, item) in items.iter().enumerate() {
            assert_eq!(item.data_index, i);
            assert_eq!(item.mesh, i / 2);
        }
        assert_eq!(items[1].variant, ERenderItemVariant::PlanarShadow);

        let items = build_render_items(&meshes, false);
        assert_eq!(items.len(), 2);
        assert!(items.iter().all(|i| i.variant == ERenderItemVariant::Normal));
    }

    #[test]
    fn test_shadow_lands_on_plane() {
        let plane = glm::vec4(0.0, 1.0, 0.0, 0.0);
        let light = glm::vec4(0.3, -1.0, 0.5, 0.0);
        let shadow = planar_shadow_matrix(&plane, &light);

        let point = glm::vec4(1.0, 2.0, -3.0, 1.0);
        let projected = shadow * point;
        let projected = projected / projected.w;

        assert!(projected.y.abs() < 1e-5);
        // -- moved along the light direction
        let delta = projected.xyz() - point.xyz();
        assert!(glm::length(&glm::cross(&delta, &light.xyz())) < 1e-4);
    }

    #[test]
    fn test_points_on_plane_are_fixed() {
        let plane = glm::vec4(0.0, 2.0, 0.0, 0.0);
        let shadow = planar_shadow_matrix(&plane, &glm::vec4(0.0, -1.0, 1.0, 0.0));
        let point = glm::vec4(4.0, 0.0, 5.0, 1.0);
        let projected = shadow * point;
        let projected = projected / projected.w;
        assert!(glm::distance(&projected, &point) < 1e-5);
    }

    #[test]
    fn test_item_world_and_material() {
        let world = glm::translation(&glm::vec3(0.0, 1.0, 0.0));
        let meshes = vec![mesh(world)];
        let items = build_render_items(&meshes, true);
        let shadow = planar_shadow_matrix(&glm::vec4(0.0, 1.0, 0.0, 0.0), &glm::vec4(0.0, -1.0, 0.0, 0.0));

        assert_eq!(items[0].world(&meshes, &shadow), world);
        assert_eq!(items[1].world(&meshes, &shadow), shadow * world);
        assert_eq!(items[1].material(&meshes), SHADOW_MATERIAL);
    }
}
