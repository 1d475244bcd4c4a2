use glam::{Vec3, Vec4};

use super::TextureId;

/// Surface description. Each texture slot is `None` when the source had no image for
/// it or the image failed to load.
#[derive(Debug, Clone, PartialEq)]
pub struct Material {
    pub name: String,
    pub albedo: Vec4,
    pub emissive: Vec3,
    pub smoothness: f32,
    pub albedo_map: Option<TextureId>,
    pub emissive_map: Option<TextureId>,
    pub specular_map: Option<TextureId>,
    pub normal_map: Option<TextureId>,
    pub bump_map: Option<TextureId>,
}

impl Material {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            albedo: Vec4::ONE,
            emissive: Vec3::ZERO,
            smoothness: 0.5,
            albedo_map: None,
            emissive_map: None,
            specular_map: None,
            normal_map: None,
            bump_map: None,
        }
    }

    pub fn with_albedo(mut self, albedo: Vec4) -> Self {
        self.albedo = albedo;
        self
    }

    pub fn with_albedo_map(mut self, texture: Option<TextureId>) -> Self {
        self.albedo_map = texture;
        self
    }

    /// 8-bit RGBA of the flat albedo colour.
    pub fn albedo_rgba8(&self) -> [u8; 4] {
        let c = (self.albedo.clamp(Vec4::ZERO, Vec4::ONE) * 255.0).round();
        [c.x as u8, c.y as u8, c.z as u8, c.w as u8]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_material_has_no_textures() {
        let m = Material::new("plain");
        assert!(m.albedo_map.is_none() && m.normal_map.is_none() && m.bump_map.is_none());
        assert_eq!(m.albedo_rgba8(), [255, 255, 255, 255]);
    }

    #[test]
    fn albedo_color_is_clamped() {
        let m = Material::new("hot").with_albedo(Vec4::new(2.0, 0.5, -1.0, 1.0));
        assert_eq!(m.albedo_rgba8(), [255, 128, 0, 255]);
    }
}
