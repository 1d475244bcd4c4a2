//! Startup scene: imported models or a built-in island, the configured lights, and
//! a marker entity per light.

use glam::{Mat4, Quat, Vec3, Vec4};

use super::camera::Camera;
use super::store::{Light, LightKind, SceneStore};
use crate::asset::import_gltf;
use crate::error::RenderError;
use crate::renderer::mesh::Mesh;
use crate::renderer::uniforms::MAX_LIGHTS;
use crate::renderer::{primitives, Material, Model, ModelId, Registry, Renderer};
use crate::settings::{LightSettings, RenderSettings};

/// Registers a single-submesh model drawn in a flat colour.
fn solid_model(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    registry: &mut Registry,
    name: &str,
    mesh: Mesh,
    color: Vec4,
) -> Result<ModelId, RenderError> {
    let mesh = registry.add_mesh(mesh)?;
    let material = registry.add_material(device, queue, Material::new(name).with_albedo(color));
    Ok(registry.add_model(Model {
        name: name.to_string(),
        mesh,
        materials: vec![material],
    }))
}

fn light_from(settings: &LightSettings) -> Light {
    Light {
        kind: settings.kind,
        color: settings.color,
        direction: settings.direction.try_normalize().unwrap_or(Vec3::NEG_Y),
        position: settings.position,
    }
}

/// World transform of the marker drawn for `light`: a small sphere at a point
/// light, a thin box along the direction of a directional light.
pub fn marker_transform(light: &Light) -> Mat4 {
    match light.kind {
        LightKind::Point => Mat4::from_scale_rotation_translation(
            Vec3::splat(0.2),
            Quat::IDENTITY,
            light.position,
        ),
        LightKind::Directional => Mat4::from_scale_rotation_translation(
            Vec3::new(0.1, 0.1, 0.8),
            Quat::from_rotation_arc(Vec3::Z, light.direction),
            light.position,
        ),
    }
}

/// Shore, rocks and a sea floor around the water plane at `water_height`.
fn builtin_island(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    registry: &mut Registry,
    store: &mut SceneStore,
    water_height: f32,
) -> Result<(), RenderError> {
    let sea_floor = solid_model(
        device,
        queue,
        registry,
        "sea floor",
        primitives::plane(80.0, 16.0),
        Vec4::new(0.76, 0.7, 0.5, 1.0),
    )?;
    let sand = solid_model(
        device,
        queue,
        registry,
        "sand",
        primitives::sphere(48, 24),
        Vec4::new(0.85, 0.78, 0.55, 1.0),
    )?;
    let rock = solid_model(
        device,
        queue,
        registry,
        "rock",
        primitives::cube(),
        Vec4::new(0.45, 0.43, 0.4, 1.0),
    )?;
    let foliage = solid_model(
        device,
        queue,
        registry,
        "foliage",
        primitives::sphere(24, 12),
        Vec4::new(0.25, 0.55, 0.2, 1.0),
    )?;

    store.add_entity(
        sea_floor,
        Mat4::from_translation(Vec3::new(0.0, water_height - 2.5, 0.0)),
    );
    store.add_entity(
        sand,
        Mat4::from_translation(Vec3::new(0.0, water_height - 3.0, 0.0))
            * Mat4::from_scale(Vec3::new(14.0, 7.0, 14.0)),
    );

    let rocks = [
        (Vec3::new(-2.0, 0.9, 1.0), 1.2, 0.3),
        (Vec3::new(1.5, 0.7, -1.5), 0.9, 1.1),
        (Vec3::new(5.5, -0.2, 3.0), 1.4, 0.7),
        (Vec3::new(-6.0, -0.4, -2.0), 1.6, 2.2),
    ];
    for (offset, size, yaw) in rocks {
        store.add_entity(
            rock,
            Mat4::from_scale_rotation_translation(
                Vec3::splat(size),
                Quat::from_rotation_y(yaw),
                offset + Vec3::Y * water_height,
            ),
        );
    }
    for offset in [Vec3::new(0.0, 1.6, 0.5), Vec3::new(-1.0, 1.3, -1.0)] {
        store.add_entity(
            foliage,
            Mat4::from_translation(offset + Vec3::Y * water_height) * Mat4::from_scale(Vec3::splat(1.5)),
        );
    }
    Ok(())
}

/// Builds the startup scene and camera from `settings`.
///
/// Models that fail to import are logged and left out; an empty model list, or one
/// where nothing imported, falls back to the built-in island.
pub fn build_scene(
    renderer: &mut Renderer,
    settings: &RenderSettings,
) -> Result<(SceneStore, Camera), RenderError> {
    let aspect = renderer.aspect_ratio();
    let Renderer {
        context, registry, ..
    } = renderer;
    let (device, queue) = (&context.device, &context.queue);
    let mut store = SceneStore::new();

    for model in &settings.scene.models {
        match import_gltf(device, queue, registry, &model.path) {
            Ok(imported) => {
                let world = Mat4::from_translation(model.position)
                    * Mat4::from_scale(Vec3::splat(model.scale));
                store.add_entity(imported.model, world);
            }
            Err(err) => log::error!("Skipping model: {}", err),
        }
    }
    if store.is_empty() {
        log::info!("No models imported, using the built-in scene");
        builtin_island(device, queue, registry, &mut store, settings.water_height)?;
    }

    let lights: Vec<Light> = settings.scene.lights.iter().map(light_from).collect();
    if lights.len() > MAX_LIGHTS {
        log::warn!(
            "{} lights configured, only the first {} are lit",
            lights.len(),
            MAX_LIGHTS
        );
    }

    if settings.scene.light_markers && !lights.is_empty() {
        let point_mesh = registry.add_mesh(primitives::sphere(16, 8))?;
        let directional_mesh = registry.add_mesh(primitives::cube())?;
        for light in &lights {
            let mesh = match light.kind {
                LightKind::Point => point_mesh,
                LightKind::Directional => directional_mesh,
            };
            let color = light.color.max_element().max(f32::EPSILON);
            let material = registry.add_material(
                device,
                queue,
                Material::new("light marker").with_albedo((light.color / color).extend(1.0)),
            );
            let marker = registry.add_model(Model {
                name: "light marker".to_string(),
                mesh,
                materials: vec![material],
            });
            store.add_entity(marker, marker_transform(light));
        }
    }

    for light in lights {
        store.add_light(light);
    }

    let cam = settings.scene.camera;
    let camera = Camera::new(cam.position, cam.yaw, cam.pitch, aspect);
    log::info!(
        "Scene ready: {} entities, {} lights",
        store.len(),
        store.lights().len()
    );
    Ok((store, camera))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn light(kind: LightKind, direction: Vec3) -> Light {
        Light {
            kind,
            color: Vec3::ONE,
            direction,
            position: Vec3::new(1.0, 2.0, 3.0),
        }
    }

    #[test]
    fn point_marker_sits_at_the_light() {
        let world = marker_transform(&light(LightKind::Point, Vec3::NEG_Y));
        assert!(world
            .transform_point3(Vec3::ZERO)
            .abs_diff_eq(Vec3::new(1.0, 2.0, 3.0), 1e-6));
    }

    #[test]
    fn directional_marker_points_along_the_light() {
        let direction = Vec3::new(1.0, -1.0, 0.0).normalize();
        let world = marker_transform(&light(LightKind::Directional, direction));
        let axis = world.transform_vector3(Vec3::Z).normalize();
        assert!(axis.abs_diff_eq(direction, 1e-5));
    }

    #[test]
    fn degenerate_light_direction_points_down() {
        let settings = LightSettings {
            kind: LightKind::Directional,
            color: Vec3::ONE,
            direction: Vec3::ZERO,
            position: Vec3::ZERO,
        };
        assert_eq!(light_from(&settings).direction, Vec3::NEG_Y);
    }
}
