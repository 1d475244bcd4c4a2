//! Screen-space conventions shared by the SSAO and water shaders.
//!
//! - Right-handed view space (camera looks down -Z).
//! - Clip/NDC depth range is [0, 1]. Near -> 0, Far -> 1.
//! - Full-screen UVs have origin at top-left (v = 0 at top, v = 1 at bottom).
use glam::{Vec2, Vec3, Vec4};
use rand::rngs::SmallRng;
use rand::SeedableRng;
use shoreline::renderer::ssao::{generate_kernel, occlusion, OcclusionQuery};
use shoreline::scene::Camera;

fn uv_to_ndc_xy(uv: Vec2) -> Vec2 {
    Vec2::new(uv.x * 2.0 - 1.0, 1.0 - uv.y * 2.0)
}

fn ndc_xy_to_uv(ndc_xy: Vec2) -> Vec2 {
    Vec2::new(ndc_xy.x * 0.5 + 0.5, 0.5 - ndc_xy.y * 0.5)
}

fn project_to_uv_depth(camera: &Camera, world: Vec3) -> (Vec2, f32) {
    let clip: Vec4 = camera.projection() * camera.view() * world.extend(1.0);
    let ndc = clip.truncate() / clip.w;
    (ndc_xy_to_uv(ndc.truncate()), ndc.z)
}

/// World-space ray through `uv`, built the way the water pass builds it.
fn view_ray(camera: &Camera, uv: Vec2) -> Vec3 {
    let inv_proj = camera.projection().inverse();
    let inv_view = camera.view().inverse();
    let far = inv_proj * uv_to_ndc_xy(uv).extend(1.0).extend(1.0);
    let dir = (far.truncate() / far.w).normalize();
    (inv_view * dir.extend(0.0)).truncate().normalize()
}

fn approx_eq3(a: Vec3, b: Vec3, eps: f32) -> bool {
    (a - b).abs().max_element() <= eps
}

#[test]
fn uv_ndc_y_flip_roundtrip_is_consistent() {
    for uv in [
        Vec2::new(0.0, 0.0),
        Vec2::new(0.25, 0.75),
        Vec2::new(0.5, 0.5),
        Vec2::new(1.0, 1.0),
    ] {
        let back = ndc_xy_to_uv(uv_to_ndc_xy(uv));
        assert!((uv - back).abs().max_element() < 1e-6, "uv {:?} -> {:?}", uv, back);
    }
}

#[test]
fn camera_projection_maps_near_far_to_depth_range() {
    let camera = Camera::new(Vec3::ZERO, -90.0, 0.0, 16.0 / 9.0);
    let (_, near) = project_to_uv_depth(&camera, Vec3::new(0.0, 0.0, -camera.near));
    let (_, far) = project_to_uv_depth(&camera, Vec3::new(0.0, 0.0, -camera.far));
    assert!(near.abs() < 1e-5, "near -> {}", near);
    assert!((far - 1.0).abs() < 1e-4, "far -> {}", far);
}

#[test]
fn view_ray_through_a_projected_point_hits_it() {
    let camera = Camera::new(Vec3::new(1.0, 4.0, 6.0), -100.0, -25.0, 16.0 / 9.0);
    for target in [
        Vec3::new(0.0, 0.0, 0.0),
        Vec3::new(2.0, 0.0, -3.0),
        Vec3::new(-1.5, 1.0, 1.0),
    ] {
        let (uv, depth) = project_to_uv_depth(&camera, target);
        assert!(depth > 0.0 && depth < 1.0);

        let dir = view_ray(&camera, uv);
        let expected = (target - camera.position).normalize();
        assert!(approx_eq3(dir, expected, 1e-3), "{:?} vs {:?}", dir, expected);
    }
}

#[test]
fn rays_below_the_horizon_reach_the_water_in_front() {
    let water_height = 0.0;
    let camera = Camera::new(Vec3::new(0.0, 3.0, 0.0), -90.0, -20.0, 1.0);
    let dir = view_ray(&camera, Vec2::new(0.5, 0.5));
    let t = (water_height - camera.position.y) / dir.y;
    assert!(t > 0.0);

    let hit = camera.position + dir * t;
    assert!(hit.y.abs() < 1e-4);
    // linear depth of the hit, as compared against the G-buffer depth attachment
    let hit_depth = -(camera.view() * hit.extend(1.0)).z;
    assert!((hit_depth - t).abs() < 1e-3);
}

#[test]
fn occluder_over_half_the_screen_partly_occludes() {
    let kernel = generate_kernel(&mut SmallRng::seed_from_u64(7));
    let camera = Camera::new(Vec3::ZERO, -90.0, 0.0, 16.0 / 9.0);
    let query = OcclusionQuery {
        position: Vec3::new(0.0, 0.0, -5.0),
        normal: Vec3::Z,
        random: Vec3::X,
        kernel: &kernel,
        radius: 0.5,
        bias: 0.02,
        projection: camera.projection(),
    };

    let open = occlusion(&query, |_| -5.0);
    let covered = occlusion(&query, |_| -4.6);
    let half = occlusion(&query, |uv| if uv.x < 0.5 { -4.6 } else { -5.0 });

    assert_eq!(open, 1.0);
    assert!(covered < half && half < open, "{covered} < {half} < {open}");
}
