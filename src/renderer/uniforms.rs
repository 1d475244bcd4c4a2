// renderer/uniforms.rs
use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3, Vec4};

use super::arena::{UniformArena, UniformRange};
use crate::error::ArenaError;
use crate::scene::{Camera, Entity, Light};

/// Lights beyond this count are not uploaded.
pub const MAX_LIGHTS: usize = 16;
/// Size of one `Light` element in the shaders' `Globals` block.
pub const LIGHT_STRIDE: usize = 64;
/// Offset of the light array inside `Globals` (after `cam_pos` and `light_count`).
pub const LIGHTS_OFFSET: usize = 16;
pub const GLOBALS_SIZE: usize = LIGHTS_OFFSET + MAX_LIGHTS * LIGHT_STRIDE;

/// Per-entity block.
#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable, Debug, PartialEq)]
pub struct LocalParams {
    pub world: [[f32; 4]; 4],
    pub world_view_proj: [[f32; 4]; 4],
    /// Transforms normals; stays correct under non-uniform scale.
    pub normal_matrix: [[f32; 4]; 4],
}

impl LocalParams {
    pub fn new(world: Mat4, view_proj: Mat4) -> Self {
        Self {
            world: world.to_cols_array_2d(),
            world_view_proj: (view_proj * world).to_cols_array_2d(),
            normal_matrix: normal_matrix(world).to_cols_array_2d(),
        }
    }
}

/// Inverse transpose of `world`. A degenerate transform keeps `world` itself.
pub fn normal_matrix(world: Mat4) -> Mat4 {
    if world.determinant().abs() <= f32::EPSILON {
        return world;
    }
    world.inverse().transpose()
}

/// Per-pass block: camera matrices, clip plane, viewport and effect parameters.
#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable, Debug, PartialEq)]
pub struct PassUniforms {
    pub view: [[f32; 4]; 4],
    pub proj: [[f32; 4]; 4],
    pub inv_view: [[f32; 4]; 4],
    pub inv_proj: [[f32; 4]; 4],
    pub clip_plane: [f32; 4],
    /// width, height, 1/width, 1/height
    pub viewport: [f32; 4],
    /// ssao radius, ssao bias, time, water height
    pub params: [f32; 4],
}

/// Everything a stage upload needs besides the scene itself.
#[derive(Clone, Copy, Debug)]
pub struct StageParams {
    pub clip_plane: Vec4,
    pub viewport: (u32, u32),
    pub ssao_radius: f32,
    pub ssao_bias: f32,
    pub time: f32,
    pub water_height: f32,
}

impl PassUniforms {
    pub fn new(camera: &Camera, params: &StageParams) -> Self {
        let view = camera.view();
        let proj = camera.projection();
        let (w, h) = (params.viewport.0.max(1) as f32, params.viewport.1.max(1) as f32);
        Self {
            view: view.to_cols_array_2d(),
            proj: proj.to_cols_array_2d(),
            inv_view: view.inverse().to_cols_array_2d(),
            inv_proj: proj.inverse().to_cols_array_2d(),
            clip_plane: params.clip_plane.to_array(),
            viewport: [w, h, 1.0 / w, 1.0 / h],
            params: [
                params.ssao_radius,
                params.ssao_bias,
                params.time,
                params.water_height,
            ],
        }
    }
}

/// Ranges of the shared blocks written by one upload. Entity ranges are stored on the entities.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StageRanges {
    pub globals: UniformRange,
    pub pass: UniformRange,
}

/// Serialises one stage into an already mapped arena: global block (camera position,
/// light count, lights), pass block, then one [`LocalParams`] per entity. Every block
/// starts on the arena's binding alignment.
pub fn write_stage(
    arena: &mut UniformArena,
    camera: &Camera,
    lights: &[Light],
    entities: &mut [Entity],
    params: &StageParams,
) -> Result<StageRanges, ArenaError> {
    arena.align_to_binding()?;
    let globals_start = arena.head();
    write_globals(arena, camera.position, lights)?;
    arena.reserve_to(globals_start + GLOBALS_SIZE)?;

    arena.align_to_binding()?;
    let pass = PassUniforms::new(camera, params);
    let pass_offset = arena.push(&pass)?;

    let view_proj = camera.projection() * camera.view();
    for entity in entities.iter_mut() {
        arena.align_to_binding()?;
        let offset = arena.push(&LocalParams::new(entity.world, view_proj))?;
        entity.local_params = UniformRange {
            offset: offset as u32,
            size: std::mem::size_of::<LocalParams>() as u32,
        };
    }

    Ok(StageRanges {
        globals: UniformRange {
            offset: globals_start as u32,
            size: GLOBALS_SIZE as u32,
        },
        pass: UniformRange {
            offset: pass_offset as u32,
            size: std::mem::size_of::<PassUniforms>() as u32,
        },
    })
}

fn write_globals(
    arena: &mut UniformArena,
    camera_position: Vec3,
    lights: &[Light],
) -> Result<(), ArenaError> {
    let count = lights.len().min(MAX_LIGHTS);
    arena.push_vec3(camera_position)?;
    arena.push_u32(count as u32)?;
    for light in &lights[..count] {
        arena.align_head(16)?;
        arena.push_u32(light.kind.code())?;
        arena.push_vec3(light.color)?;
        arena.push_vec3(light.direction)?;
        arena.push_vec3(light.position)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asset::Handle;
    use crate::scene::{LightKind, SceneStore};

    fn params() -> StageParams {
        StageParams {
            clip_plane: Vec4::ZERO,
            viewport: (1280, 720),
            ssao_radius: 0.5,
            ssao_bias: 0.02,
            time: 0.0,
            water_height: 0.0,
        }
    }

    fn light(kind: LightKind, x: f32) -> Light {
        Light {
            kind,
            color: Vec3::ONE,
            direction: Vec3::NEG_Y,
            position: Vec3::new(x, 2.0, 0.0),
        }
    }

    #[test]
    fn block_sizes_match_shader_layout() {
        assert_eq!(std::mem::size_of::<LocalParams>(), 192);
        assert_eq!(std::mem::size_of::<PassUniforms>(), 304);
        assert_eq!(GLOBALS_SIZE, 1040);
    }

    #[test]
    fn normals_stay_perpendicular_under_non_uniform_scale() {
        let world = Mat4::from_scale_rotation_translation(
            Vec3::new(14.0, 7.0, 14.0),
            glam::Quat::from_rotation_y(0.6),
            Vec3::new(0.0, -3.5, 0.0),
        );
        let normal = Vec3::new(1.0, 1.0, 0.0).normalize();
        let tangent = Vec3::new(1.0, -1.0, 0.0);

        let params = LocalParams::new(world, Mat4::IDENTITY);
        let n = Mat4::from_cols_array_2d(&params.normal_matrix).transform_vector3(normal);
        let t = world.transform_vector3(tangent);
        assert!(n.normalize().dot(t.normalize()).abs() < 1e-5);

        // the world matrix alone skews the normal
        let skewed = world.transform_vector3(normal);
        assert!(skewed.normalize().dot(t.normalize()).abs() > 0.1);
    }

    #[test]
    fn degenerate_world_keeps_its_own_normal_matrix() {
        let flat = Mat4::from_scale(Vec3::new(1.0, 0.0, 1.0));
        assert_eq!(normal_matrix(flat), flat);
        assert_eq!(normal_matrix(Mat4::IDENTITY), Mat4::IDENTITY);
    }

    #[test]
    fn entity_blocks_are_aligned_and_disjoint() {
        let mut store = SceneStore::new();
        for i in 0..5 {
            store.add_entity(Handle::new(0), Mat4::from_translation(Vec3::X * i as f32));
        }
        store.add_light(light(LightKind::Point, 1.0));

        let mut arena = UniformArena::new(65536, 256);
        arena.begin_write().unwrap();
        let lights = store.lights().to_vec();
        let ranges = write_stage(
            &mut arena,
            &Camera::default(),
            &lights,
            store.entities_mut(),
            &params(),
        )
        .unwrap();
        arena.end_write().unwrap();

        let mut all: Vec<UniformRange> = vec![ranges.globals, ranges.pass];
        all.extend(store.entities().iter().map(|e| e.local_params));
        for range in &all {
            assert_eq!(range.offset % 256, 0);
            assert!(range.end() as usize <= arena.head());
        }
        for (i, a) in all.iter().enumerate() {
            for b in &all[i + 1..] {
                assert!(!a.overlaps(b), "{a:?} overlaps {b:?}");
            }
        }
    }

    #[test]
    fn globals_follow_block_layout() {
        let mut arena = UniformArena::new(65536, 256);
        arena.begin_write().unwrap();
        let lights = [
            light(LightKind::Directional, 0.0),
            light(LightKind::Point, 4.0),
        ];
        let camera = Camera::default();
        write_stage(&mut arena, &camera, &lights, &mut [], &params()).unwrap();
        let bytes = arena.written();

        let read_f32 = |at: usize| f32::from_le_bytes(bytes[at..at + 4].try_into().unwrap());
        let read_u32 = |at: usize| u32::from_le_bytes(bytes[at..at + 4].try_into().unwrap());

        assert_eq!(read_f32(4), camera.position.y);
        assert_eq!(read_u32(12), 2);
        let second = LIGHTS_OFFSET + LIGHT_STRIDE;
        assert_eq!(read_u32(second), LightKind::Point.code());
        // position is the fourth member, at +48
        assert_eq!(read_f32(second + 48), 4.0);
    }

    #[test]
    fn lights_beyond_limit_are_dropped() {
        let mut arena = UniformArena::new(65536, 256);
        arena.begin_write().unwrap();
        let lights = vec![light(LightKind::Point, 0.0); MAX_LIGHTS + 3];
        let ranges = write_stage(&mut arena, &Camera::default(), &lights, &mut [], &params())
            .unwrap();
        let count = u32::from_le_bytes(arena.written()[12..16].try_into().unwrap());
        assert_eq!(count as usize, MAX_LIGHTS);
        assert_eq!(ranges.pass.offset as usize, crate::renderer::arena::align_up(GLOBALS_SIZE, 256));
    }

    #[test]
    fn too_many_entities_overflow() {
        let mut store = SceneStore::new();
        for _ in 0..64 {
            store.add_entity(Handle::new(0), Mat4::IDENTITY);
        }
        let mut arena = UniformArena::new(4096, 256);
        arena.begin_write().unwrap();
        let result = write_stage(
            &mut arena,
            &Camera::default(),
            &[],
            store.entities_mut(),
            &params(),
        );
        assert!(matches!(result, Err(ArenaError::Overflow { .. })));
    }
}
