use std::path::PathBuf;

use glam::Vec3;
use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::renderer::RenderMode;
use crate::scene::LightKind;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderSettings {
    #[serde(default)]
    pub resolution: Resolution,
    #[serde(default)]
    pub present_mode: PresentModeSetting,
    /// Capacity of the per-frame uniform arena.
    #[serde(default = "RenderSettings::default_uniform_arena_bytes")]
    pub uniform_arena_bytes: u32,
    #[serde(default = "RenderSettings::default_shader_dir")]
    pub shader_dir: PathBuf,
    #[serde(default)]
    pub water_height: f32,
    /// Distortion map for the water surface. A procedural one is used when unset.
    #[serde(default)]
    pub water_dudv: Option<PathBuf>,
    #[serde(default = "RenderSettings::default_ssao_radius")]
    pub ssao_radius: f32,
    #[serde(default = "RenderSettings::default_ssao_bias")]
    pub ssao_bias: f32,
    #[serde(default)]
    pub start_mode: RenderMode,
    #[serde(default)]
    pub scene: SceneSettings,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            resolution: Resolution::default(),
            present_mode: PresentModeSetting::default(),
            uniform_arena_bytes: Self::default_uniform_arena_bytes(),
            shader_dir: Self::default_shader_dir(),
            water_height: 0.0,
            water_dudv: None,
            ssao_radius: Self::default_ssao_radius(),
            ssao_bias: Self::default_ssao_bias(),
            start_mode: RenderMode::default(),
            scene: SceneSettings::default(),
        }
    }
}

impl RenderSettings {
    pub fn load() -> Self {
        Self::load_from_path("settings.json")
    }

    pub fn load_from_path<P: AsRef<std::path::Path>>(path: P) -> Self {
        use std::fs;

        let path = path.as_ref();
        match fs::read_to_string(path) {
            Ok(contents) => match serde_json::from_str::<RenderSettings>(&contents) {
                Ok(settings) => {
                    info!("Loaded render settings from {:?}", path);
                    settings.validate()
                }
                Err(err) => {
                    warn!(
                        "Failed to parse {:?} ({}). Falling back to default render settings.",
                        path, err
                    );
                    RenderSettings::default()
                }
            },
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                info!(
                    "Render settings file {:?} not found. Using default settings.",
                    path
                );
                RenderSettings::default()
            }
            Err(err) => {
                warn!(
                    "Failed to read {:?} ({}). Falling back to default render settings.",
                    path, err
                );
                RenderSettings::default()
            }
        }
    }

    fn validate(mut self) -> Self {
        if self.resolution.width == 0 || self.resolution.height == 0 {
            warn!("Resolution must be greater than zero. Using default resolution.");
            self.resolution = Resolution::default();
        }

        if self.uniform_arena_bytes < Self::MIN_UNIFORM_ARENA_BYTES {
            warn!(
                "Uniform arena of {} bytes is too small. Using {} bytes.",
                self.uniform_arena_bytes,
                Self::MIN_UNIFORM_ARENA_BYTES
            );
            self.uniform_arena_bytes = Self::MIN_UNIFORM_ARENA_BYTES;
        }

        if !(self.ssao_radius.is_finite() && self.ssao_radius > 0.0) {
            warn!("SSAO radius must be positive. Using default value.");
            self.ssao_radius = Self::default_ssao_radius();
        }

        if !self.ssao_bias.is_finite() || self.ssao_bias < 0.0 {
            warn!("SSAO bias must be non-negative. Using default value.");
            self.ssao_bias = Self::default_ssao_bias();
        }

        if !self.water_height.is_finite() {
            warn!("Water height must be finite. Using 0.");
            self.water_height = 0.0;
        }

        for model in &mut self.scene.models {
            if !(model.scale.is_finite() && model.scale > 0.0) {
                warn!("Model {:?} has scale {}. Using 1.", model.path, model.scale);
                model.scale = 1.0;
            }
        }

        self
    }

    pub fn present_mode(&self, available: &[wgpu::PresentMode]) -> wgpu::PresentMode {
        let desired = self.present_mode.to_wgpu();
        if available.contains(&desired) {
            return desired;
        }

        warn!(
            "Requested present mode {:?} is not supported. Falling back to FIFO.",
            desired
        );

        if available.contains(&wgpu::PresentMode::Fifo) {
            wgpu::PresentMode::Fifo
        } else {
            available
                .first()
                .copied()
                .unwrap_or(wgpu::PresentMode::Fifo)
        }
    }

    /// Room for the global and pass blocks plus a handful of entities at the
    /// largest common offset alignment.
    const MIN_UNIFORM_ARENA_BYTES: u32 = 4096;

    const fn default_uniform_arena_bytes() -> u32 {
        65536
    }

    fn default_shader_dir() -> PathBuf {
        PathBuf::from("src/shader")
    }

    const fn default_ssao_radius() -> f32 {
        0.5
    }

    const fn default_ssao_bias() -> f32 {
        0.02
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Default for Resolution {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PresentModeSetting {
    #[default]
    Fifo,
    FifoRelaxed,
    Immediate,
    Mailbox,
    AutoVsync,
    AutoNoVsync,
}

impl PresentModeSetting {
    fn to_wgpu(&self) -> wgpu::PresentMode {
        match self {
            PresentModeSetting::Fifo => wgpu::PresentMode::Fifo,
            PresentModeSetting::FifoRelaxed => wgpu::PresentMode::FifoRelaxed,
            PresentModeSetting::Immediate => wgpu::PresentMode::Immediate,
            PresentModeSetting::Mailbox => wgpu::PresentMode::Mailbox,
            PresentModeSetting::AutoVsync => wgpu::PresentMode::AutoVsync,
            PresentModeSetting::AutoNoVsync => wgpu::PresentMode::AutoNoVsync,
        }
    }
}

/// Scene file placed at startup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSettings {
    pub path: PathBuf,
    #[serde(default)]
    pub position: Vec3,
    #[serde(default = "ModelSettings::default_scale")]
    pub scale: f32,
}

impl ModelSettings {
    const fn default_scale() -> f32 {
        1.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LightSettings {
    pub kind: LightKind,
    #[serde(default = "LightSettings::default_color")]
    pub color: Vec3,
    #[serde(default = "LightSettings::default_direction")]
    pub direction: Vec3,
    #[serde(default)]
    pub position: Vec3,
}

impl LightSettings {
    fn default_color() -> Vec3 {
        Vec3::ONE
    }

    fn default_direction() -> Vec3 {
        Vec3::new(-0.3, -1.0, -0.4)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CameraSettings {
    pub position: Vec3,
    /// Degrees.
    pub yaw: f32,
    /// Degrees.
    pub pitch: f32,
}

impl Default for CameraSettings {
    fn default() -> Self {
        Self {
            position: Vec3::new(0.0, 3.0, 10.0),
            yaw: -90.0,
            pitch: -10.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneSettings {
    /// When empty, a built-in scene of primitives is used.
    #[serde(default)]
    pub models: Vec<ModelSettings>,
    #[serde(default = "SceneSettings::default_lights")]
    pub lights: Vec<LightSettings>,
    #[serde(default)]
    pub camera: CameraSettings,
    /// Add a marker entity at every light.
    #[serde(default = "SceneSettings::default_light_markers")]
    pub light_markers: bool,
}

impl Default for SceneSettings {
    fn default() -> Self {
        Self {
            models: Vec::new(),
            lights: Self::default_lights(),
            camera: CameraSettings::default(),
            light_markers: Self::default_light_markers(),
        }
    }
}

impl SceneSettings {
    fn default_lights() -> Vec<LightSettings> {
        vec![
            LightSettings {
                kind: LightKind::Directional,
                color: Vec3::splat(0.8),
                direction: LightSettings::default_direction(),
                position: Vec3::new(0.0, 8.0, 0.0),
            },
            LightSettings {
                kind: LightKind::Point,
                color: Vec3::new(1.0, 0.7, 0.4),
                direction: Vec3::NEG_Y,
                position: Vec3::new(2.0, 2.5, 2.0),
            },
        ]
    }

    const fn default_light_markers() -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn invalid_settings() -> RenderSettings {
        RenderSettings {
            resolution: Resolution {
                width: 0,
                height: 0,
            },
            uniform_arena_bytes: 16,
            ssao_radius: -1.0,
            ssao_bias: f32::NAN,
            water_height: f32::INFINITY,
            ..RenderSettings::default()
        }
    }

    #[test]
    fn validate_replaces_invalid_values_with_defaults() {
        let validated = invalid_settings().validate();
        let defaults = RenderSettings::default();

        assert_eq!(validated.resolution.width, Resolution::default().width);
        assert_eq!(validated.resolution.height, Resolution::default().height);
        assert_eq!(
            validated.uniform_arena_bytes,
            RenderSettings::MIN_UNIFORM_ARENA_BYTES
        );
        assert_eq!(validated.ssao_radius, defaults.ssao_radius);
        assert_eq!(validated.ssao_bias, defaults.ssao_bias);
        assert_eq!(validated.water_height, 0.0);
    }

    #[test]
    fn validate_preserves_valid_values() {
        let valid = RenderSettings {
            resolution: Resolution {
                width: 1920,
                height: 1080,
            },
            present_mode: PresentModeSetting::Mailbox,
            uniform_arena_bytes: 1 << 20,
            water_height: -1.5,
            ssao_radius: 1.25,
            ssao_bias: 0.0,
            ..RenderSettings::default()
        };

        let validated = valid.clone().validate();

        assert_eq!(validated.resolution.width, valid.resolution.width);
        assert_eq!(validated.resolution.height, valid.resolution.height);
        assert_eq!(validated.uniform_arena_bytes, valid.uniform_arena_bytes);
        assert_eq!(validated.water_height, valid.water_height);
        assert_eq!(validated.ssao_radius, valid.ssao_radius);
        assert_eq!(validated.ssao_bias, valid.ssao_bias);
    }

    #[test]
    fn missing_fields_take_their_defaults() {
        let settings: RenderSettings = serde_json::from_str(
            r#"{
                "start_mode": "forward",
                "scene": {
                    "models": [{ "path": "assets/island.glb" }],
                    "lights": [{ "kind": "point", "position": [1.0, 2.0, 3.0] }]
                }
            }"#,
        )
        .unwrap();

        assert_eq!(settings.start_mode, RenderMode::Forward);
        assert_eq!(settings.uniform_arena_bytes, 65536);
        assert_eq!(settings.shader_dir, PathBuf::from("src/shader"));
        assert_eq!(settings.scene.models[0].scale, 1.0);
        assert_eq!(settings.scene.models[0].position, Vec3::ZERO);
        assert_eq!(settings.scene.lights[0].color, Vec3::ONE);
        assert_eq!(settings.scene.lights[0].position, Vec3::new(1.0, 2.0, 3.0));
        assert!(settings.scene.light_markers);
    }

    #[test]
    fn non_positive_model_scale_is_reset() {
        let mut settings = RenderSettings::default();
        settings.scene.models.push(ModelSettings {
            path: PathBuf::from("a.gltf"),
            position: Vec3::ZERO,
            scale: 0.0,
        });
        assert_eq!(settings.validate().scene.models[0].scale, 1.0);
    }

    #[test]
    fn missing_file_gives_defaults() {
        let settings = RenderSettings::load_from_path("does/not/exist/settings.json");
        assert_eq!(settings.uniform_arena_bytes, 65536);
        assert_eq!(settings.start_mode, RenderMode::Deferred);
    }

    #[test]
    fn present_mode_returns_desired_when_available() {
        let settings = RenderSettings {
            present_mode: PresentModeSetting::Mailbox,
            ..RenderSettings::default()
        };

        let available = [
            wgpu::PresentMode::Fifo,
            wgpu::PresentMode::Mailbox,
            wgpu::PresentMode::Immediate,
        ];

        assert_eq!(
            settings.present_mode(&available),
            wgpu::PresentMode::Mailbox
        );
    }

    #[test]
    fn present_mode_falls_back_to_fifo_when_desired_missing() {
        let settings = RenderSettings {
            present_mode: PresentModeSetting::Mailbox,
            ..RenderSettings::default()
        };

        let available = [wgpu::PresentMode::Fifo, wgpu::PresentMode::Immediate];

        assert_eq!(settings.present_mode(&available), wgpu::PresentMode::Fifo);
    }

    #[test]
    fn present_mode_uses_first_available_when_fifo_missing() {
        let settings = RenderSettings {
            present_mode: PresentModeSetting::Mailbox,
            ..RenderSettings::default()
        };

        let available = [wgpu::PresentMode::Immediate];

        assert_eq!(
            settings.present_mode(&available),
            wgpu::PresentMode::Immediate
        );
    }
}
