//! Draw lists and render-pass encoding shared by the frame stages.
//!
//! Geometry programs follow a fixed binding layout: group 0 holds the per-stage
//! blocks (`globals`, `pass_data`), group 1 the per-entity block (`locals`) and
//! group 2 the material's albedo texture. Screen-space programs keep group 0 and
//! take their textures in the groups after it.

use std::collections::HashMap;

use super::program::{Program, SlotResource};
use super::registry::Registry;
use super::targets::BufferView;
use super::vertex_binder;
use super::{MaterialId, MeshId, ProgramId};
use crate::error::RenderError;
use crate::scene::Entity;

pub const GLOBALS: &str = "globals";
pub const PASS_DATA: &str = "pass_data";
pub const LOCALS: &str = "locals";
pub const ALBEDO_MAP: &str = "albedo_map";
pub const ALBEDO_SAMPLER: &str = "albedo_sampler";

pub const FRAME_GROUP: u32 = 0;
pub const LOCAL_GROUP: u32 = 1;
pub const MATERIAL_GROUP: u32 = 2;

/// Everything needed to draw one submesh with an already resolved binding.
#[derive(Clone)]
pub struct SubmeshDraw {
    pub pipeline: wgpu::RenderPipeline,
    pub vertex_buffer: wgpu::Buffer,
    pub index_buffer: wgpu::Buffer,
    pub vertex_offset: u64,
    pub first_index: u32,
    pub index_count: u32,
}

impl SubmeshDraw {
    fn encode(&self, pass: &mut wgpu::RenderPass<'_>) {
        pass.set_pipeline(&self.pipeline);
        pass.set_vertex_buffer(0, self.vertex_buffer.slice(self.vertex_offset..));
        pass.set_index_buffer(self.index_buffer.slice(..), wgpu::IndexFormat::Uint32);
        pass.draw_indexed(
            self.first_index..self.first_index + self.index_count,
            0,
            0..1,
        );
    }
}

/// One entity submesh in a geometry pass.
pub struct DrawItem {
    pub draw: SubmeshDraw,
    pub local_offset: u32,
    pub material: MaterialId,
}

/// Resolves `mesh.submeshes[submesh]` for `program_id` through the vertex binder.
pub fn resolve_submesh(
    device: &wgpu::Device,
    registry: &mut Registry,
    mesh_id: MeshId,
    submesh: usize,
    program_id: ProgramId,
) -> Result<SubmeshDraw, RenderError> {
    let program = registry
        .programs
        .get(program_id)
        .ok_or(RenderError::UnknownHandle {
            kind: "program",
            index: program_id.index(),
        })?;
    let mesh = registry
        .meshes
        .get_mut(mesh_id)
        .ok_or(RenderError::UnknownHandle {
            kind: "mesh",
            index: mesh_id.index(),
        })?;

    let vao = vertex_binder::resolve(device, mesh, submesh, program_id, program)?;
    let (pipeline, vertex_offset) = (vao.pipeline.clone(), vao.vertex_offset);
    let target = &mesh.submeshes[submesh];
    let (first_index, index_count) = (target.first_index(), target.index_count);
    let gpu = mesh.gpu().ok_or_else(|| RenderError::InvalidMesh {
        mesh: mesh.name.clone(),
        reason: "buffers missing after upload".to_string(),
    })?;

    Ok(SubmeshDraw {
        pipeline,
        vertex_buffer: gpu.vertex.clone(),
        index_buffer: gpu.index.clone(),
        vertex_offset,
        first_index,
        index_count,
    })
}

/// One draw per (entity, submesh), in entity insertion order. Submeshes without a
/// material of their own use `fallback`.
pub fn build_draw_list(
    device: &wgpu::Device,
    registry: &mut Registry,
    entities: &[Entity],
    program_id: ProgramId,
    fallback: MaterialId,
) -> Result<Vec<DrawItem>, RenderError> {
    let mut draws = Vec::new();
    for entity in entities {
        let model = registry.model(entity.model)?;
        let mesh_id = model.mesh;
        let materials = model.materials.clone();
        let submesh_count = registry
            .meshes
            .get(mesh_id)
            .map_or(0, |mesh| mesh.submeshes.len());

        for submesh in 0..submesh_count {
            let draw = resolve_submesh(device, registry, mesh_id, submesh, program_id)?;
            draws.push(DrawItem {
                draw,
                local_offset: entity.local_params.offset,
                material: materials.get(submesh).copied().unwrap_or(fallback),
            });
        }
    }
    Ok(draws)
}

/// Colour and depth views a pass renders into.
pub struct Attachments<'a> {
    pub colors: Vec<&'a wgpu::TextureView>,
    pub depth: Option<&'a wgpu::TextureView>,
}

fn begin<'e>(
    encoder: &'e mut wgpu::CommandEncoder,
    label: &str,
    attachments: &Attachments<'_>,
    clear: wgpu::Color,
) -> wgpu::RenderPass<'e> {
    let colors: Vec<Option<wgpu::RenderPassColorAttachment>> = attachments
        .colors
        .iter()
        .map(|&view| {
            Some(wgpu::RenderPassColorAttachment {
                view,
                resolve_target: None,
                depth_slice: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(clear),
                    store: wgpu::StoreOp::Store,
                },
            })
        })
        .collect();

    encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
        label: Some(label),
        color_attachments: &colors,
        depth_stencil_attachment: attachments.depth.map(|view| {
            wgpu::RenderPassDepthStencilAttachment {
                view,
                depth_ops: Some(wgpu::Operations {
                    load: wgpu::LoadOp::Clear(1.0),
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: None,
            }
        }),
        timestamp_writes: None,
        occlusion_query_set: None,
    })
}

/// Clears `attachments` without drawing. Used when a pass's program is degraded.
pub fn clear(
    encoder: &mut wgpu::CommandEncoder,
    label: &str,
    attachments: &Attachments<'_>,
    color: wgpu::Color,
) {
    let _ = begin(encoder, label, attachments, color);
}

/// Bind groups of a geometry program. The material lookup is filled in beforehand
/// for every material the draw list uses.
pub struct GeometryBindings<'a> {
    pub frame: &'a wgpu::BindGroup,
    pub frame_offsets: Vec<u32>,
    pub locals: &'a wgpu::BindGroup,
    pub materials: &'a HashMap<(ProgramId, MaterialId), wgpu::BindGroup>,
    pub program: ProgramId,
}

pub fn encode_geometry(
    encoder: &mut wgpu::CommandEncoder,
    label: &str,
    attachments: &Attachments<'_>,
    clear_color: wgpu::Color,
    bindings: &GeometryBindings<'_>,
    draws: &[DrawItem],
) {
    let mut pass = begin(encoder, label, attachments, clear_color);
    pass.set_bind_group(FRAME_GROUP, bindings.frame, &bindings.frame_offsets);
    for item in draws {
        let Some(material) = bindings.materials.get(&(bindings.program, item.material)) else {
            log::warn!("{}: material {:?} has no bind group", label, item.material);
            continue;
        };
        pass.set_bind_group(LOCAL_GROUP, bindings.locals, &[item.local_offset]);
        pass.set_bind_group(MATERIAL_GROUP, material, &[]);
        item.draw.encode(&mut pass);
    }
}

/// A full-screen pass. Uniform slots get their dynamic offset from `offsets`.
pub struct ScreenPass<'a> {
    pub label: &'a str,
    pub target: &'a wgpu::TextureView,
    pub offsets: &'a [(&'a str, u32)],
}

/// Identifies the inputs of a screen pass. One program can run in several passes
/// (the lighting composite runs for both water G-buffers), and the final composite
/// reads whichever G-buffer is selected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScreenKey {
    pub program: ProgramId,
    pub pass: &'static str,
    pub view: BufferView,
}

/// Bind groups of screen passes, built on first use. The resources they point at
/// live as long as the renderer.
pub struct ScreenGroups<G = wgpu::BindGroup> {
    groups: HashMap<ScreenKey, Vec<G>>,
}

impl<G> Default for ScreenGroups<G> {
    fn default() -> Self {
        Self {
            groups: HashMap::new(),
        }
    }
}

impl<G> ScreenGroups<G> {
    pub fn ensure_with(
        &mut self,
        key: ScreenKey,
        build: impl FnOnce() -> Result<Vec<G>, RenderError>,
    ) -> Result<(), RenderError> {
        if !self.groups.contains_key(&key) {
            self.groups.insert(key, build()?);
        }
        Ok(())
    }

    pub fn get(&self, key: &ScreenKey) -> Option<&[G]> {
        self.groups.get(key).map(Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

impl ScreenGroups {
    /// Builds every bind group of `program` from `resources` by slot name, unless
    /// `key` already has them.
    pub fn ensure(
        &mut self,
        device: &wgpu::Device,
        program: &Program,
        key: ScreenKey,
        resources: &[(&str, SlotResource<'_>)],
    ) -> Result<(), RenderError> {
        self.ensure_with(key, || {
            (0..program.group_count())
                .map(|group| program.create_bind_group(device, group, resources))
                .collect()
        })
    }
}

pub fn encode_screen(
    encoder: &mut wgpu::CommandEncoder,
    program: &Program,
    groups: &[wgpu::BindGroup],
    quad: &SubmeshDraw,
    screen: &ScreenPass<'_>,
) -> Result<(), RenderError> {
    let offsets = (0..groups.len() as u32)
        .map(|group| program.dynamic_offsets(group, screen.offsets))
        .collect::<Result<Vec<_>, RenderError>>()?;

    let attachments = Attachments {
        colors: vec![screen.target],
        depth: None,
    };
    let mut pass = begin(encoder, screen.label, &attachments, wgpu::Color::BLACK);
    for (index, (group, offsets)) in groups.iter().zip(&offsets).enumerate() {
        pass.set_bind_group(index as u32, group, offsets);
    }
    quad.encode(&mut pass);
    Ok(())
}
