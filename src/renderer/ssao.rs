//! Screen-space ambient occlusion: sample kernel, rotation noise, and a CPU reference
//! of the shader's occlusion estimate.

use glam::{Mat3, Mat4, Vec2, Vec3, Vec4};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use wgpu::util::DeviceExt;

use super::texture::Texture;

pub const KERNEL_SIZE: usize = 64;
pub const NOISE_DIM: u32 = 4;
const SEED: u64 = 0x5eed_a0;

/// Hemisphere samples around +Z, denser near the origin.
pub fn generate_kernel(rng: &mut impl Rng) -> Vec<Vec3> {
    (0..KERNEL_SIZE)
        .map(|i| {
            let sample = Vec3::new(
                rng.gen::<f32>() * 2.0 - 1.0,
                rng.gen::<f32>() * 2.0 - 1.0,
                rng.gen::<f32>(),
            )
            .normalize_or_zero()
                * rng.gen::<f32>();
            let t = i as f32 / KERNEL_SIZE as f32;
            sample * (0.1 + 0.9 * t * t)
        })
        .collect()
}

/// Random tangent-plane rotations, one per texel of the tiled noise texture.
pub fn generate_noise(rng: &mut impl Rng) -> Vec<Vec3> {
    (0..NOISE_DIM * NOISE_DIM)
        .map(|_| Vec3::new(rng.gen::<f32>() * 2.0 - 1.0, rng.gen::<f32>() * 2.0 - 1.0, 0.0))
        .collect()
}

/// Tangent frame around `normal`, oriented by `random` (Gram-Schmidt).
pub fn tangent_frame(normal: Vec3, random: Vec3) -> Mat3 {
    let mut tangent = random - normal * random.dot(normal);
    if tangent.length_squared() < 1e-8 {
        tangent = normal.any_orthonormal_vector();
    }
    let tangent = tangent.normalize();
    let bitangent = normal.cross(tangent);
    Mat3::from_cols(tangent, bitangent, normal)
}

fn view_to_uv(projection: Mat4, view_pos: Vec3) -> Vec2 {
    let clip = projection * view_pos.extend(1.0);
    let ndc = clip.truncate() / clip.w;
    Vec2::new(ndc.x * 0.5 + 0.5, 0.5 - ndc.y * 0.5)
}

/// Inputs of one occlusion estimate, all in view space.
pub struct OcclusionQuery<'a> {
    pub position: Vec3,
    pub normal: Vec3,
    pub random: Vec3,
    pub kernel: &'a [Vec3],
    pub radius: f32,
    pub bias: f32,
    pub projection: Mat4,
}

/// Same estimate the SSAO shader makes. `surface_depth` returns the view-space z of the
/// visible surface at a screen uv. A sample counts as occluded only when that surface is
/// strictly in front of it (plus bias). 1.0 means unoccluded.
pub fn occlusion(query: &OcclusionQuery<'_>, surface_depth: impl Fn(Vec2) -> f32) -> f32 {
    let frame = tangent_frame(query.normal, query.random);
    let mut occluded = 0.0;
    for kernel_sample in query.kernel {
        let sample = query.position + frame * *kernel_sample * query.radius;
        let uv = view_to_uv(query.projection, sample);
        let depth = surface_depth(uv);
        let distance = (query.position.z - depth).abs().max(1e-6);
        let range = smoothstep(0.0, 1.0, query.radius / distance);
        if depth > sample.z + query.bias {
            occluded += range;
        }
    }
    1.0 - occluded / query.kernel.len().max(1) as f32
}

fn smoothstep(edge0: f32, edge1: f32, x: f32) -> f32 {
    let t = ((x - edge0) / (edge1 - edge0)).clamp(0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}

/// GPU side: kernel uniform buffer and the noise texture.
pub struct SsaoResources {
    pub kernel: Vec<Vec3>,
    pub kernel_buffer: wgpu::Buffer,
    pub noise: Texture,
}

impl SsaoResources {
    pub fn new(device: &wgpu::Device, queue: &wgpu::Queue) -> Self {
        let mut rng = SmallRng::seed_from_u64(SEED);
        let kernel = generate_kernel(&mut rng);
        let noise = generate_noise(&mut rng);

        let padded: Vec<[f32; 4]> = kernel.iter().map(|k| k.extend(0.0).to_array()).collect();
        let kernel_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("SSAO Kernel"),
            contents: bytemuck::cast_slice(&padded),
            usage: wgpu::BufferUsages::UNIFORM,
        });

        let texels: Vec<[f32; 4]> = noise.iter().map(|n| Vec4::from((*n, 0.0)).to_array()).collect();
        let noise = Texture::rgba16f_tiled(device, queue, &texels, NOISE_DIM, NOISE_DIM, "SSAO Noise");

        log::info!("SSAO kernel of {} samples generated", kernel.len());
        Self {
            kernel,
            kernel_buffer,
            noise,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kernel() -> Vec<Vec3> {
        generate_kernel(&mut SmallRng::seed_from_u64(SEED))
    }

    #[test]
    fn kernel_lies_in_the_unit_hemisphere() {
        let kernel = kernel();
        assert_eq!(kernel.len(), KERNEL_SIZE);
        for (i, sample) in kernel.iter().enumerate() {
            assert!(sample.z >= 0.0, "sample {i} below the surface: {sample:?}");
            let t = i as f32 / KERNEL_SIZE as f32;
            assert!(sample.length() <= 0.1 + 0.9 * t * t + 1e-5);
        }
    }

    #[test]
    fn kernel_is_deterministic_for_a_seed() {
        assert_eq!(kernel(), kernel());
    }

    #[test]
    fn noise_rotates_in_the_tangent_plane() {
        let noise = generate_noise(&mut SmallRng::seed_from_u64(1));
        assert_eq!(noise.len(), 16);
        assert!(noise.iter().all(|n| n.z == 0.0 && n.x.abs() <= 1.0 && n.y.abs() <= 1.0));
    }

    #[test]
    fn tangent_frame_is_orthonormal() {
        let frame = tangent_frame(Vec3::Z, Vec3::new(0.3, -0.8, 0.0));
        assert!((frame.x_axis.dot(frame.y_axis)).abs() < 1e-5);
        assert!((frame.x_axis.length() - 1.0).abs() < 1e-5);
        assert_eq!(frame.z_axis, Vec3::Z);

        // parallel random vector falls back to any perpendicular axis
        let degenerate = tangent_frame(Vec3::X, Vec3::X);
        assert!(degenerate.x_axis.dot(Vec3::X).abs() < 1e-5);
    }

    fn facing_plane_query(kernel: &[Vec3], bias: f32) -> OcclusionQuery<'_> {
        OcclusionQuery {
            position: Vec3::new(0.0, 0.0, -5.0),
            normal: Vec3::Z,
            random: Vec3::new(1.0, 0.0, 0.0),
            kernel,
            radius: 0.5,
            bias,
            projection: Mat4::perspective_rh(60f32.to_radians(), 16.0 / 9.0, 0.1, 100.0),
        }
    }

    #[test]
    fn flat_plane_facing_the_camera_is_unoccluded() {
        let kernel = kernel();
        let query = facing_plane_query(&kernel, 0.0);
        assert_eq!(occlusion(&query, |_| -5.0), 1.0);
    }

    #[test]
    fn surface_in_front_of_the_samples_occludes() {
        let kernel = kernel();
        let query = facing_plane_query(&kernel, 0.02);
        // a wall 0.6 in front of the plane hides every sample
        let ao = occlusion(&query, |_| -4.4);
        assert!(ao < 0.5, "ao = {ao}");
    }

    #[test]
    fn distant_occluders_are_faded_out() {
        let kernel = kernel();
        let query = facing_plane_query(&kernel, 0.02);
        let near = occlusion(&query, |_| -4.4);
        let far = occlusion(&query, |_| -1.0);
        assert!(far > near);
    }
}
