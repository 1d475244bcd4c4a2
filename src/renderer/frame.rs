//! Frame orchestration.
//!
//! A deferred frame runs in three stages. Each stage uploads the uniform arena for
//! one camera and clip plane, then encodes and submits the passes that read that
//! upload before the next stage overwrites it:
//!
//! 1. refraction: clipped G-buffer below the water, lit into `WaterRefractionDeferred`
//! 2. reflection: mirrored camera, clipped above the water, lit into `WaterReflectionDeferred`
//! 3. main: G-buffer, SSAO, SSAO blur, water surface, final composite to the surface
//!
//! The forward mode is a single stage drawing the forward program to the surface.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use glam::Vec4;
use serde::{Deserialize, Serialize};
use winit::dpi::PhysicalSize;

use super::arena::GpuUniformArena;
use super::context::GpuContext;
use super::material::Material;
use super::passes::{
    self, Attachments, GeometryBindings, ScreenGroups, ScreenKey, ScreenPass, SubmeshDraw,
    ALBEDO_MAP, ALBEDO_SAMPLER, FRAME_GROUP, GLOBALS, LOCALS, LOCAL_GROUP, PASS_DATA,
};
use super::primitives;
use super::program::{ProgramTargets, SlotResource};
use super::registry::Registry;
use super::ssao::SsaoResources;
use super::targets::{gbuffer, BufferView, FrameBuffer, RenderTargets, DEPTH_FORMAT};
use super::texture::{DecodedImage, Texture};
use super::uniforms::{write_stage, StageParams, StageRanges};
use super::water::{self, NO_CLIP};
use super::{MaterialId, MeshId, ProgramId, TextureId};
use crate::error::RenderError;
use crate::scene::{Camera, SceneStore};
use crate::settings::RenderSettings;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RenderMode {
    Forward,
    #[default]
    Deferred,
}

impl RenderMode {
    pub const ALL: [RenderMode; 2] = [RenderMode::Forward, RenderMode::Deferred];

    pub fn next(self) -> Self {
        match self {
            RenderMode::Forward => RenderMode::Deferred,
            RenderMode::Deferred => RenderMode::Forward,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            RenderMode::Forward => "Forward",
            RenderMode::Deferred => "Deferred",
        }
    }
}

/// Switches the debug keys and the debug window change between frames.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameOptions {
    pub mode: RenderMode,
    pub buffer_view: BufferView,
    /// Darken the final composite with the blurred occlusion term.
    pub ssao_enabled: bool,
    pub ssao_radius: f32,
    pub ssao_bias: f32,
}

impl FrameOptions {
    pub fn from_settings(settings: &RenderSettings) -> Self {
        Self {
            mode: settings.start_mode,
            buffer_view: BufferView::Main,
            ssao_enabled: true,
            ssao_radius: settings.ssao_radius,
            ssao_bias: settings.ssao_bias,
        }
    }
}

/// What a program renders into, resolved to formats once the surface is known.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetKind {
    /// Scene geometry straight to the surface with the surface depth buffer.
    SurfaceScene,
    /// Full-screen pass to the surface.
    SurfaceScreen,
    /// Scene geometry into a G-buffer.
    GBuffer,
    /// Full-screen pass into a single 8-bit attachment.
    Offscreen,
}

impl TargetKind {
    pub fn targets(self, surface: wgpu::TextureFormat) -> ProgramTargets {
        let offscreen = wgpu::TextureFormat::Rgba8Unorm;
        match self {
            TargetKind::SurfaceScene => ProgramTargets::scene(vec![surface], DEPTH_FORMAT),
            TargetKind::SurfaceScreen => ProgramTargets::screen(surface),
            TargetKind::GBuffer => ProgramTargets::scene(
                super::targets::GBUFFER_LAYOUT.iter().map(|f| f.wgpu()).collect(),
                DEPTH_FORMAT,
            ),
            TargetKind::Offscreen => ProgramTargets::screen(offscreen),
        }
    }
}

pub struct ProgramSource {
    pub file: &'static str,
    pub define: &'static str,
    pub target: TargetKind,
}

pub const FORWARD: ProgramSource = ProgramSource {
    file: "forward.glsl",
    define: "FORWARD",
    target: TargetKind::SurfaceScene,
};
pub const GEOMETRY: ProgramSource = ProgramSource {
    file: "geometry.glsl",
    define: "GEOMETRY",
    target: TargetKind::GBuffer,
};
pub const FB_COMPOSITE: ProgramSource = ProgramSource {
    file: "deferred_lighting.glsl",
    define: "FB_COMPOSITE",
    target: TargetKind::Offscreen,
};
pub const FINAL_COMPOSITE: ProgramSource = ProgramSource {
    file: "deferred_lighting.glsl",
    define: "FINAL_COMPOSITE",
    target: TargetKind::SurfaceScreen,
};
pub const FINAL_COMPOSITE_SSAO: ProgramSource = ProgramSource {
    file: "deferred_lighting.glsl",
    define: "FINAL_COMPOSITE_SSAO",
    target: TargetKind::SurfaceScreen,
};
pub const SSAO: ProgramSource = ProgramSource {
    file: "ssao.glsl",
    define: "SSAO",
    target: TargetKind::Offscreen,
};
pub const BLUR: ProgramSource = ProgramSource {
    file: "blur.glsl",
    define: "BLUR",
    target: TargetKind::Offscreen,
};
pub const WATER: ProgramSource = ProgramSource {
    file: "water.glsl",
    define: "WATER",
    target: TargetKind::Offscreen,
};

/// Every program the renderer loads at startup.
pub const PROGRAM_SOURCES: [&ProgramSource; 8] = [
    &FORWARD,
    &GEOMETRY,
    &FB_COMPOSITE,
    &FINAL_COMPOSITE,
    &FINAL_COMPOSITE_SSAO,
    &SSAO,
    &BLUR,
    &WATER,
];

pub struct ProgramSet {
    pub forward: ProgramId,
    pub geometry: ProgramId,
    pub fb_composite: ProgramId,
    pub final_composite: ProgramId,
    pub final_composite_ssao: ProgramId,
    pub ssao: ProgramId,
    pub blur: ProgramId,
    pub water: ProgramId,
}

impl ProgramSet {
    pub fn load(
        device: &wgpu::Device,
        registry: &mut Registry,
        shader_dir: &Path,
        surface: wgpu::TextureFormat,
    ) -> Self {
        let mut load = |source: &ProgramSource| {
            registry.load_program(
                device,
                shader_dir.join(source.file),
                source.define,
                source.target.targets(surface),
            )
        };
        Self {
            forward: load(&FORWARD),
            geometry: load(&GEOMETRY),
            fb_composite: load(&FB_COMPOSITE),
            final_composite: load(&FINAL_COMPOSITE),
            final_composite_ssao: load(&FINAL_COMPOSITE_SSAO),
            ssao: load(&SSAO),
            blur: load(&BLUR),
            water: load(&WATER),
        }
    }
}

/// Background of the forward path. Matches the sky colour of the deferred composite.
const SKY: wgpu::Color = wgpu::Color {
    r: 0.53,
    g: 0.7,
    b: 0.88,
    a: 1.0,
};

/// Where a geometry pass draws.
enum PassTarget<'a> {
    GBuffer(BufferView),
    Surface(&'a wgpu::TextureView),
}

/// Surface frame handed to overlay drawing (the debug UI) after the scene is composited.
pub struct OverlayTarget<'a> {
    pub device: &'a wgpu::Device,
    pub queue: &'a wgpu::Queue,
    pub encoder: &'a mut wgpu::CommandEncoder,
    pub view: &'a wgpu::TextureView,
    pub size: [u32; 2],
}

fn gbuffer_resources<'a>(
    frame: &'a FrameBuffer,
    sampler: &'a wgpu::Sampler,
) -> [(&'static str, SlotResource<'a>); 6] {
    [
        ("albedo_tex", SlotResource::Texture(frame.view(gbuffer::ALBEDO))),
        ("normal_tex", SlotResource::Texture(frame.view(gbuffer::NORMAL))),
        ("position_tex", SlotResource::Texture(frame.view(gbuffer::POSITION))),
        ("viewdir_tex", SlotResource::Texture(frame.view(gbuffer::VIEW_DIR))),
        ("depth_tex", SlotResource::Texture(frame.view(gbuffer::DEPTH))),
        ("gbuffer_sampler", SlotResource::Sampler(sampler)),
    ]
}

/// The renderer context: GPU device, resources, targets and per-program caches.
pub struct Renderer {
    pub context: GpuContext,
    pub registry: Registry,
    pub targets: RenderTargets,
    pub programs: ProgramSet,
    pub options: FrameOptions,
    pub water_height: f32,
    arena: GpuUniformArena,
    ssao: SsaoResources,
    quad: MeshId,
    default_material: MaterialId,
    dudv: TextureId,
    arena_groups: HashMap<(ProgramId, u32), wgpu::BindGroup>,
    material_groups: HashMap<(ProgramId, MaterialId), wgpu::BindGroup>,
    screen_groups: ScreenGroups,
    degraded_reported: HashSet<ProgramId>,
}

impl Renderer {
    pub fn new(context: GpuContext, settings: &RenderSettings) -> Result<Self, RenderError> {
        let device = &context.device;
        let queue = &context.queue;

        let mut registry = Registry::new(device, queue);
        let programs = ProgramSet::load(
            device,
            &mut registry,
            &settings.shader_dir,
            context.surface_format(),
        );

        let (width, height) = (context.config.width, context.config.height);
        let targets = RenderTargets::new(device, width, height);
        let arena = GpuUniformArena::new(device, settings.uniform_arena_bytes);
        let ssao = SsaoResources::new(device, queue);

        let quad = registry.add_mesh(primitives::fullscreen_quad())?;
        let default_material = registry.add_material(device, queue, Material::new("default"));

        let dudv = settings
            .water_dudv
            .as_ref()
            .and_then(|path| registry.load_tiling_texture(device, queue, path))
            .or_else(|| {
                registry.textures.load_with("#procedural-dudv", || {
                    let image: DecodedImage = water::procedural_dudv(128);
                    Ok(Texture::tiling(device, queue, &image, "procedural dudv"))
                })
            })
            .unwrap_or(registry.defaults.black);

        log::info!(
            "Renderer ready: {}x{} targets, {} programs",
            width,
            height,
            registry.programs.len()
        );

        Ok(Self {
            options: FrameOptions::from_settings(settings),
            water_height: settings.water_height,
            context,
            registry,
            targets,
            programs,
            arena,
            ssao,
            quad,
            default_material,
            dudv,
            arena_groups: HashMap::new(),
            material_groups: HashMap::new(),
            screen_groups: ScreenGroups::default(),
            degraded_reported: HashSet::new(),
        })
    }

    pub fn resize(&mut self, size: PhysicalSize<u32>) {
        self.context.resize(size);
    }

    pub fn aspect_ratio(&self) -> f32 {
        self.context.config.width as f32 / self.context.config.height.max(1) as f32
    }

    /// Renders one frame. `overlay` draws on top of the finished surface image.
    /// Returns an error only for conditions that should stop the application.
    pub fn render_frame(
        &mut self,
        scene: &mut SceneStore,
        camera: &Camera,
        time: f32,
        overlay: impl FnOnce(&mut OverlayTarget<'_>),
    ) -> Result<(), RenderError> {
        let frame = match self.context.surface.get_current_texture() {
            Ok(frame) => frame,
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                log::warn!("Surface lost or outdated, reconfiguring");
                self.context.resize(self.context.size);
                return Ok(());
            }
            Err(wgpu::SurfaceError::Timeout) => {
                log::warn!("Surface acquire timed out, skipping frame");
                return Ok(());
            }
            Err(err) => return Err(err.into()),
        };
        let view = frame
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        match self.options.mode {
            RenderMode::Forward => self.forward_frame(scene, camera, time, &view, overlay)?,
            RenderMode::Deferred => self.deferred_frame(scene, camera, time, &view, overlay)?,
        }

        frame.present();
        Ok(())
    }

    fn forward_frame(
        &mut self,
        scene: &mut SceneStore,
        camera: &Camera,
        time: f32,
        surface: &wgpu::TextureView,
        overlay: impl FnOnce(&mut OverlayTarget<'_>),
    ) -> Result<(), RenderError> {
        let viewport = (self.context.config.width, self.context.config.height);
        let ranges = self.upload_stage(scene, camera, NO_CLIP, time, viewport)?;

        let mut encoder = self.encoder("Forward Stage");
        let program = self.programs.forward;
        self.geometry_pass(
            &mut encoder,
            scene,
            ranges,
            program,
            "Forward",
            PassTarget::Surface(surface),
        )?;
        self.draw_overlay(&mut encoder, surface, overlay);
        self.context.queue.submit(Some(encoder.finish()));
        Ok(())
    }

    fn deferred_frame(
        &mut self,
        scene: &mut SceneStore,
        camera: &Camera,
        time: f32,
        surface: &wgpu::TextureView,
        overlay: impl FnOnce(&mut OverlayTarget<'_>),
    ) -> Result<(), RenderError> {
        let viewport = (self.targets.gbuffer.width, self.targets.gbuffer.height);
        let geometry = self.programs.geometry;
        let height = self.water_height;

        let ranges = self.upload_stage(scene, camera, water::refraction_plane(height), time, viewport)?;
        let mut encoder = self.encoder("Refraction Stage");
        self.geometry_pass(
            &mut encoder,
            scene,
            ranges,
            geometry,
            "WaterRefraction",
            PassTarget::GBuffer(BufferView::Refraction),
        )?;
        self.composite_pass(&mut encoder, ranges, BufferView::Refraction)?;
        self.context.queue.submit(Some(encoder.finish()));

        let mirrored = camera.mirrored(height);
        let ranges = self.upload_stage(scene, &mirrored, water::reflection_plane(height), time, viewport)?;
        let mut encoder = self.encoder("Reflection Stage");
        self.geometry_pass(
            &mut encoder,
            scene,
            ranges,
            geometry,
            "WaterReflection",
            PassTarget::GBuffer(BufferView::Reflection),
        )?;
        self.composite_pass(&mut encoder, ranges, BufferView::Reflection)?;
        self.context.queue.submit(Some(encoder.finish()));

        let ranges = self.upload_stage(scene, camera, NO_CLIP, time, viewport)?;
        let mut encoder = self.encoder("Main Stage");
        self.geometry_pass(
            &mut encoder,
            scene,
            ranges,
            geometry,
            "GBuffer",
            PassTarget::GBuffer(BufferView::Main),
        )?;
        self.ssao_pass(&mut encoder, ranges)?;
        self.blur_pass(&mut encoder, ranges)?;
        self.water_pass(&mut encoder, ranges)?;
        self.final_pass(&mut encoder, ranges, surface)?;
        self.draw_overlay(&mut encoder, surface, overlay);
        self.context.queue.submit(Some(encoder.finish()));
        Ok(())
    }

    fn encoder(&self, label: &str) -> wgpu::CommandEncoder {
        self.context
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some(label) })
    }

    fn draw_overlay(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        surface: &wgpu::TextureView,
        overlay: impl FnOnce(&mut OverlayTarget<'_>),
    ) {
        let mut target = OverlayTarget {
            device: &self.context.device,
            queue: &self.context.queue,
            encoder,
            view: surface,
            size: [self.context.config.width, self.context.config.height],
        };
        overlay(&mut target);
    }

    /// Writes the global, pass and per-entity blocks for one camera and clip plane.
    fn upload_stage(
        &mut self,
        scene: &mut SceneStore,
        camera: &Camera,
        clip_plane: Vec4,
        time: f32,
        viewport: (u32, u32),
    ) -> Result<StageRanges, RenderError> {
        let params = StageParams {
            clip_plane,
            viewport,
            ssao_radius: self.options.ssao_radius,
            ssao_bias: self.options.ssao_bias,
            time,
            water_height: self.water_height,
        };
        let (lights, entities) = scene.lights_and_entities_mut();
        let arena = self.arena.begin_write()?;
        let written = write_stage(arena, camera, lights, entities, &params);
        self.arena.end_write(&self.context.queue)?;
        Ok(written?)
    }

    fn frame_offsets(ranges: StageRanges) -> [(&'static str, u32); 2] {
        [
            (GLOBALS, ranges.globals.offset),
            (PASS_DATA, ranges.pass.offset),
        ]
    }

    /// Returns whether `program` can draw, reporting a degraded program once.
    fn usable(&mut self, program: ProgramId) -> Result<bool, RenderError> {
        let linked = self.registry.program(program)?.is_linked();
        if !linked && self.degraded_reported.insert(program) {
            log::warn!(
                "Skipping passes of program {} until it links",
                self.registry.program(program)?.name
            );
        }
        Ok(linked)
    }

    fn ensure_arena_group(&mut self, program_id: ProgramId, group: u32) -> Result<(), RenderError> {
        if self.arena_groups.contains_key(&(program_id, group)) {
            return Ok(());
        }
        let buffer = self.arena.buffer();
        let group_binding = self.registry.program(program_id)?.create_bind_group(
            &self.context.device,
            group,
            &[
                (GLOBALS, SlotResource::Buffer(buffer)),
                (PASS_DATA, SlotResource::Buffer(buffer)),
                (LOCALS, SlotResource::Buffer(buffer)),
            ],
        )?;
        self.arena_groups.insert((program_id, group), group_binding);
        Ok(())
    }

    fn ensure_material_group(
        &mut self,
        program_id: ProgramId,
        material: MaterialId,
    ) -> Result<(), RenderError> {
        if self.material_groups.contains_key(&(program_id, material)) {
            return Ok(());
        }
        let texture_id = self.registry.albedo_texture(material);
        let texture = self
            .registry
            .texture(texture_id)
            .ok_or(RenderError::UnknownHandle {
                kind: "texture",
                index: texture_id.index(),
            })?;
        let group = self.registry.program(program_id)?.create_bind_group(
            &self.context.device,
            passes::MATERIAL_GROUP,
            &[
                (ALBEDO_MAP, SlotResource::Texture(&texture.view)),
                (ALBEDO_SAMPLER, SlotResource::Sampler(&texture.sampler)),
            ],
        )?;
        self.material_groups.insert((program_id, material), group);
        Ok(())
    }

    fn arena_group(&self, program_id: ProgramId, group: u32) -> Result<&wgpu::BindGroup, RenderError> {
        self.arena_groups
            .get(&(program_id, group))
            .ok_or(RenderError::UnknownHandle {
                kind: "bind group",
                index: group as usize,
            })
    }

    /// Draws every entity with `program_id`. Each entity binds its own slice of the
    /// arena; each submesh binds its material and draws its own index range.
    fn geometry_pass(
        &mut self,
        encoder: &mut wgpu::CommandEncoder,
        scene: &SceneStore,
        ranges: StageRanges,
        program_id: ProgramId,
        label: &str,
        target: PassTarget<'_>,
    ) -> Result<(), RenderError> {
        let usable = self.usable(program_id)?;
        let draws = if usable {
            let draws = passes::build_draw_list(
                &self.context.device,
                &mut self.registry,
                scene.entities(),
                program_id,
                self.default_material,
            )?;
            self.ensure_arena_group(program_id, FRAME_GROUP)?;
            self.ensure_arena_group(program_id, LOCAL_GROUP)?;
            for item in &draws {
                self.ensure_material_group(program_id, item.material)?;
            }
            draws
        } else {
            Vec::new()
        };

        let (attachments, clear_color) = match target {
            PassTarget::GBuffer(view) => {
                let frame = self.targets.gbuffer_for(view);
                let attachments = Attachments {
                    colors: frame.colors.iter().map(|a| &a.view).collect(),
                    depth: Some(&frame.depth.view),
                };
                (attachments, wgpu::Color::TRANSPARENT)
            }
            PassTarget::Surface(view) => {
                let attachments = Attachments {
                    colors: vec![view],
                    depth: Some(&self.context.depth.view),
                };
                (attachments, SKY)
            }
        };

        if !usable {
            passes::clear(encoder, label, &attachments, clear_color);
            return Ok(());
        }

        let program = self.registry.program(program_id)?;
        let bindings = GeometryBindings {
            frame: self.arena_group(program_id, FRAME_GROUP)?,
            frame_offsets: program.dynamic_offsets(FRAME_GROUP, &Self::frame_offsets(ranges))?,
            locals: self.arena_group(program_id, LOCAL_GROUP)?,
            materials: &self.material_groups,
            program: program_id,
        };
        passes::encode_geometry(encoder, label, &attachments, clear_color, &bindings, &draws);
        Ok(())
    }

    /// The full-screen quad bound for `program_id`, or `None` if the program is degraded.
    fn quad_for(&mut self, program_id: ProgramId) -> Result<Option<SubmeshDraw>, RenderError> {
        if !self.usable(program_id)? {
            return Ok(None);
        }
        passes::resolve_submesh(&self.context.device, &mut self.registry, self.quad, 0, program_id)
            .map(Some)
    }

    /// Makes sure the bind groups of `key` exist. Degraded programs get none. Takes
    /// the fields it needs so `resources` can borrow the rest of the renderer.
    fn prepare_screen(
        groups: &mut ScreenGroups,
        device: &wgpu::Device,
        registry: &Registry,
        key: ScreenKey,
        linked: bool,
        resources: &[(&str, SlotResource<'_>)],
    ) -> Result<(), RenderError> {
        if !linked {
            return Ok(());
        }
        groups.ensure(device, registry.program(key.program)?, key, resources)
    }

    fn run_screen(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        key: ScreenKey,
        quad: Option<&SubmeshDraw>,
        screen: &ScreenPass<'_>,
    ) -> Result<(), RenderError> {
        match (quad, self.screen_groups.get(&key)) {
            (Some(quad), Some(groups)) => passes::encode_screen(
                encoder,
                self.registry.program(key.program)?,
                groups,
                quad,
                screen,
            ),
            _ => {
                let attachments = Attachments {
                    colors: vec![screen.target],
                    depth: None,
                };
                passes::clear(encoder, screen.label, &attachments, wgpu::Color::BLACK);
                Ok(())
            }
        }
    }

    /// Lights a water G-buffer into its composite target.
    fn composite_pass(
        &mut self,
        encoder: &mut wgpu::CommandEncoder,
        ranges: StageRanges,
        view: BufferView,
    ) -> Result<(), RenderError> {
        let program = self.programs.fb_composite;
        let quad = self.quad_for(program)?;
        let key = ScreenKey {
            program,
            pass: match view {
                BufferView::Reflection => "WaterReflectionDeferred",
                _ => "WaterRefractionDeferred",
            },
            view,
        };

        let buffer = self.arena.buffer();
        let mut resources = vec![
            (GLOBALS, SlotResource::Buffer(buffer)),
            (PASS_DATA, SlotResource::Buffer(buffer)),
        ];
        resources.extend(gbuffer_resources(
            self.targets.gbuffer_for(view),
            &self.targets.sampler,
        ));
        Self::prepare_screen(
            &mut self.screen_groups,
            &self.context.device,
            &self.registry,
            key,
            quad.is_some(),
            &resources,
        )?;

        let target = match view {
            BufferView::Reflection => self.targets.reflection_composite.view(0),
            _ => self.targets.refraction_composite.view(0),
        };
        self.run_screen(
            encoder,
            key,
            quad.as_ref(),
            &ScreenPass {
                label: key.pass,
                target,
                offsets: &Self::frame_offsets(ranges),
            },
        )
    }

    fn ssao_pass(&mut self, encoder: &mut wgpu::CommandEncoder, ranges: StageRanges) -> Result<(), RenderError> {
        let program = self.programs.ssao;
        let quad = self.quad_for(program)?;
        let key = ScreenKey {
            program,
            pass: "Ssao",
            view: BufferView::Main,
        };

        let buffer = self.arena.buffer();
        let mut resources = vec![
            (GLOBALS, SlotResource::Buffer(buffer)),
            (PASS_DATA, SlotResource::Buffer(buffer)),
            ("ssao_kernel", SlotResource::Buffer(&self.ssao.kernel_buffer)),
            ("noise_tex", SlotResource::Texture(&self.ssao.noise.view)),
            ("noise_sampler", SlotResource::Sampler(&self.ssao.noise.sampler)),
        ];
        resources.extend(gbuffer_resources(&self.targets.gbuffer, &self.targets.sampler));
        Self::prepare_screen(
            &mut self.screen_groups,
            &self.context.device,
            &self.registry,
            key,
            quad.is_some(),
            &resources,
        )?;

        let offsets = Self::frame_offsets(ranges);
        let offsets = [offsets[0], offsets[1], ("ssao_kernel", 0)];
        self.run_screen(
            encoder,
            key,
            quad.as_ref(),
            &ScreenPass {
                label: key.pass,
                target: self.targets.ssao.view(0),
                offsets: &offsets,
            },
        )
    }

    fn blur_pass(&mut self, encoder: &mut wgpu::CommandEncoder, ranges: StageRanges) -> Result<(), RenderError> {
        let program = self.programs.blur;
        let quad = self.quad_for(program)?;
        let key = ScreenKey {
            program,
            pass: "SsaoBlur",
            view: BufferView::Main,
        };

        let buffer = self.arena.buffer();
        let resources = [
            (GLOBALS, SlotResource::Buffer(buffer)),
            (PASS_DATA, SlotResource::Buffer(buffer)),
            ("ssao_tex", SlotResource::Texture(self.targets.ssao.view(0))),
            ("gbuffer_sampler", SlotResource::Sampler(&self.targets.sampler)),
        ];
        Self::prepare_screen(
            &mut self.screen_groups,
            &self.context.device,
            &self.registry,
            key,
            quad.is_some(),
            &resources,
        )?;

        self.run_screen(
            encoder,
            key,
            quad.as_ref(),
            &ScreenPass {
                label: key.pass,
                target: self.targets.ssao_blur.view(0),
                offsets: &Self::frame_offsets(ranges),
            },
        )
    }

    fn water_pass(&mut self, encoder: &mut wgpu::CommandEncoder, ranges: StageRanges) -> Result<(), RenderError> {
        let program = self.programs.water;
        let quad = self.quad_for(program)?;
        let key = ScreenKey {
            program,
            pass: "Water",
            view: BufferView::Main,
        };

        let dudv = self
            .registry
            .texture(self.dudv)
            .ok_or(RenderError::UnknownHandle {
                kind: "texture",
                index: self.dudv.index(),
            })?;
        let buffer = self.arena.buffer();
        let targets = &self.targets;
        let resources = [
            (GLOBALS, SlotResource::Buffer(buffer)),
            (PASS_DATA, SlotResource::Buffer(buffer)),
            ("reflection_tex", SlotResource::Texture(targets.reflection_composite.view(0))),
            ("refraction_tex", SlotResource::Texture(targets.refraction_composite.view(0))),
            (
                "refraction_depth_tex",
                SlotResource::Texture(targets.refraction.view(gbuffer::DEPTH)),
            ),
            ("depth_tex", SlotResource::Texture(targets.gbuffer.view(gbuffer::DEPTH))),
            ("gbuffer_sampler", SlotResource::Sampler(&targets.sampler)),
            ("dudv_tex", SlotResource::Texture(&dudv.view)),
            ("dudv_sampler", SlotResource::Sampler(&dudv.sampler)),
        ];
        Self::prepare_screen(
            &mut self.screen_groups,
            &self.context.device,
            &self.registry,
            key,
            quad.is_some(),
            &resources,
        )?;

        self.run_screen(
            encoder,
            key,
            quad.as_ref(),
            &ScreenPass {
                label: key.pass,
                target: self.targets.water.view(0),
                offsets: &Self::frame_offsets(ranges),
            },
        )
    }

    /// Lights the selected G-buffer onto the surface, with occlusion when enabled and
    /// the water surface blended over it by alpha.
    fn final_pass(
        &mut self,
        encoder: &mut wgpu::CommandEncoder,
        ranges: StageRanges,
        surface: &wgpu::TextureView,
    ) -> Result<(), RenderError> {
        let program = if self.options.ssao_enabled {
            self.programs.final_composite_ssao
        } else {
            self.programs.final_composite
        };
        let quad = self.quad_for(program)?;
        let key = ScreenKey {
            program,
            pass: "FinalComposite",
            view: self.options.buffer_view,
        };

        let buffer = self.arena.buffer();
        let mut resources = vec![
            (GLOBALS, SlotResource::Buffer(buffer)),
            (PASS_DATA, SlotResource::Buffer(buffer)),
            ("ssao_tex", SlotResource::Texture(self.targets.ssao_blur.view(0))),
            ("water_tex", SlotResource::Texture(self.targets.water.view(0))),
        ];
        resources.extend(gbuffer_resources(
            self.targets.gbuffer_for(key.view),
            &self.targets.sampler,
        ));
        Self::prepare_screen(
            &mut self.screen_groups,
            &self.context.device,
            &self.registry,
            key,
            quad.is_some(),
            &resources,
        )?;

        self.run_screen(
            encoder,
            key,
            quad.as_ref(),
            &ScreenPass {
                label: key.pass,
                target: surface,
                offsets: &Self::frame_offsets(ranges),
            },
        )
    }
}
