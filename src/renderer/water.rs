//! Planar water: clip planes for the refraction and reflection passes and the
//! distortion map the water surface scrolls.

use glam::{Vec3, Vec4};

use super::texture::DecodedImage;

/// Clip plane that keeps everything. Geometry shaders discard where
/// `dot(plane, vec4(world, 1)) < 0`.
pub const NO_CLIP: Vec4 = Vec4::ZERO;

/// Keeps geometry at or below the water surface.
pub fn refraction_plane(water_height: f32) -> Vec4 {
    Vec4::new(0.0, -1.0, 0.0, water_height)
}

/// Keeps geometry at or above the water surface.
pub fn reflection_plane(water_height: f32) -> Vec4 {
    Vec4::new(0.0, 1.0, 0.0, -water_height)
}

pub fn keeps(plane: Vec4, point: Vec3) -> bool {
    plane.dot(point.extend(1.0)) >= 0.0
}

/// Tileable distortion map used when no dudv texture is configured. Red and green
/// hold a distortion vector biased around 0.5.
pub fn procedural_dudv(size: u32) -> DecodedImage {
    let size = size.max(1);
    let tau = std::f32::consts::TAU;
    let mut rgba = Vec::with_capacity((size * size * 4) as usize);
    for y in 0..size {
        for x in 0..size {
            let u = x as f32 / size as f32;
            let v = y as f32 / size as f32;
            let du = (tau * (u * 3.0 + v)).sin() * 0.5 + (tau * v * 5.0).cos() * 0.25;
            let dv = (tau * (v * 2.0 - u)).cos() * 0.5 + (tau * u * 4.0).sin() * 0.25;
            let to_byte = |d: f32| ((d / 1.5 * 0.5 + 0.5).clamp(0.0, 1.0) * 255.0) as u8;
            rgba.extend_from_slice(&[to_byte(du), to_byte(dv), 0, 255]);
        }
    }
    DecodedImage {
        rgba,
        width: size,
        height: size,
    }
}
