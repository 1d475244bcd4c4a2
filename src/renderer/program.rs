//! Shader programs: one GLSL file, two separately compiled stages, reflected layout.
//!
//! Loading never fails outright. A program whose stages don't compile or link is
//! still registered, with its diagnostics logged, and every pass that uses it is
//! skipped.

use std::num::NonZeroU64;
use std::path::{Path, PathBuf};

use naga::front::glsl::{ErrorKind, Frontend};
use naga::ShaderStage;

use super::pipeline_builder::PipelineBuilder;
use super::preprocess::{self, FRAGMENT_DEFINE, VERTEX_DEFINE};
use super::reflect;
pub use super::reflect::{BindingKind, ReflectedBinding, ShaderInput, ShaderLayout};
use crate::error::{RenderError, ShaderError};

/// GLSL names both entry points `main`.
pub const VERTEX_ENTRY: &str = "main";
pub const FRAGMENT_ENTRY: &str = "main";

/// Attachment formats a program renders into.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgramTargets {
    pub colors: Vec<wgpu::TextureFormat>,
    pub depth: Option<wgpu::TextureFormat>,
    pub cull: bool,
}

impl ProgramTargets {
    /// Full-screen pass into a single colour attachment.
    pub fn screen(format: wgpu::TextureFormat) -> Self {
        Self {
            colors: vec![format],
            depth: None,
            cull: false,
        }
    }

    /// Depth-tested scene geometry.
    pub fn scene(colors: Vec<wgpu::TextureFormat>, depth: wgpu::TextureFormat) -> Self {
        Self {
            colors,
            depth: Some(depth),
            cull: true,
        }
    }
}

/// Resource handed to [`Program::create_bind_group`] under a slot name.
#[derive(Clone, Copy)]
pub enum SlotResource<'a> {
    Buffer(&'a wgpu::Buffer),
    Texture(&'a wgpu::TextureView),
    Sampler(&'a wgpu::Sampler),
}

/// Result of compiling one stage.
#[derive(Debug)]
pub struct CompiledStage {
    pub module: naga::Module,
    /// The validated module written back out for wgpu.
    pub wgsl: String,
}

/// What linking learns about a program.
#[derive(Debug, Clone)]
pub struct LinkInfo {
    pub shader_layout: ShaderLayout,
    pub bindings: Vec<ReflectedBinding>,
}

struct LinkedProgram {
    vertex_module: wgpu::ShaderModule,
    fragment_module: wgpu::ShaderModule,
    pipeline_layout: wgpu::PipelineLayout,
    bind_group_layouts: Vec<wgpu::BindGroupLayout>,
}

pub struct Program {
    pub name: String,
    pub path: PathBuf,
    pub shader_layout: ShaderLayout,
    /// Sorted by (group, binding).
    pub bindings: Vec<ReflectedBinding>,
    pub targets: ProgramTargets,
    linked: Option<LinkedProgram>,
}

fn stage_name(stage_define: &str) -> &'static str {
    if stage_define == VERTEX_DEFINE {
        "vertex"
    } else {
        "fragment"
    }
}

/// Parses one stage of `source` through naga's GLSL frontend, with the program
/// and stage defines set, validates it and writes it out as WGSL.
pub fn compile_stage(
    name: &str,
    source: &str,
    program_define: &str,
    stage_define: &str,
) -> Result<CompiledStage, ShaderError> {
    let stage = stage_name(stage_define);
    let source = preprocess::stage_source(source);
    let options = preprocess::stage_options(program_define, stage_define);

    let module = Frontend::default()
        .parse(&options, &source)
        .map_err(|errors| {
            let directive = errors
                .errors
                .iter()
                .find(|err| matches!(err.kind, ErrorKind::PreprocessorError(_)));
            match directive {
                Some(err) => ShaderError::Preprocess {
                    name: name.to_string(),
                    stage,
                    line: preprocess::file_line(err.meta.location(&source).line_number as usize),
                    message: err.kind.to_string(),
                },
                None => ShaderError::Compile {
                    name: name.to_string(),
                    stage,
                    diagnostic: errors.emit_to_string(&source),
                },
            }
        })?;

    let mut validator = naga::valid::Validator::new(
        naga::valid::ValidationFlags::all(),
        naga::valid::Capabilities::all(),
    );
    let info = validator
        .validate(&module)
        .map_err(|err| ShaderError::Compile {
            name: name.to_string(),
            stage,
            diagnostic: err.emit_to_string(&source),
        })?;

    let wgsl = naga::back::wgsl::write_string(&module, &info, naga::back::wgsl::WriterFlags::empty())
        .map_err(|err| ShaderError::Compile {
            name: name.to_string(),
            stage,
            diagnostic: format!("WGSL generation error: {err}"),
        })?;

    Ok(CompiledStage { module, wgsl })
}

/// Checks that the two stages fit together and fit `targets`, and reflects the
/// program's vertex inputs and resource slots.
pub fn link(
    name: &str,
    vertex: &naga::Module,
    fragment: &naga::Module,
    targets: &ProgramTargets,
) -> Result<LinkInfo, ShaderError> {
    let fail = |reason: String| ShaderError::Link {
        name: name.to_string(),
        reason,
    };

    if !reflect::has_entry_point(vertex, ShaderStage::Vertex, VERTEX_ENTRY) {
        return Err(fail(format!("vertex stage has no {VERTEX_ENTRY}()")));
    }
    if !reflect::has_entry_point(fragment, ShaderStage::Fragment, FRAGMENT_ENTRY) {
        return Err(fail(format!("fragment stage has no {FRAGMENT_ENTRY}()")));
    }

    let varyings = reflect::stage_outputs(vertex, ShaderStage::Vertex, VERTEX_ENTRY);
    for input in reflect::stage_inputs(fragment, ShaderStage::Fragment, FRAGMENT_ENTRY) {
        if !varyings.iter().any(|v| v.location == input.location) {
            return Err(fail(format!(
                "fragment input at location {} is not written by the vertex stage",
                input.location
            )));
        }
    }

    let outputs = reflect::stage_outputs(fragment, ShaderStage::Fragment, FRAGMENT_ENTRY);
    if outputs.len() != targets.colors.len() {
        return Err(fail(format!(
            "fragment stage writes {} colour outputs, target has {} attachments",
            outputs.len(),
            targets.colors.len()
        )));
    }

    let bindings = reflect::merge_bindings(
        reflect::bindings(vertex, wgpu::ShaderStages::VERTEX),
        reflect::bindings(fragment, wgpu::ShaderStages::FRAGMENT),
    )
    .map_err(fail)?;

    Ok(LinkInfo {
        shader_layout: reflect::vertex_layout(vertex, VERTEX_ENTRY),
        bindings,
    })
}

fn layout_entry(binding: &ReflectedBinding) -> wgpu::BindGroupLayoutEntry {
    let ty = match binding.kind {
        BindingKind::Uniform { size } => wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: true,
            min_binding_size: NonZeroU64::new(size as u64),
        },
        BindingKind::Texture { sample_type } => wgpu::BindingType::Texture {
            sample_type,
            view_dimension: wgpu::TextureViewDimension::D2,
            multisampled: false,
        },
        BindingKind::Sampler { comparison: true } => {
            wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Comparison)
        }
        BindingKind::Sampler { comparison: false } => {
            wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering)
        }
    };
    wgpu::BindGroupLayoutEntry {
        binding: binding.binding,
        visibility: binding.visibility,
        ty,
        count: None,
    }
}

impl Program {
    /// Reads, compiles and links `path` with `define` as the program-name define.
    /// Failures are logged and produce an unlinked program.
    pub fn load(
        device: &wgpu::Device,
        path: &Path,
        define: &str,
        targets: ProgramTargets,
    ) -> Program {
        let mut program = Program {
            name: define.to_string(),
            path: path.to_path_buf(),
            shader_layout: ShaderLayout::default(),
            bindings: Vec::new(),
            targets,
            linked: None,
        };

        match program.try_link(device) {
            Ok(()) => log::info!(
                "Loaded program {} from {:?} ({} vertex inputs, {} bindings)",
                program.name,
                program.path,
                program.shader_layout.inputs.len(),
                program.bindings.len()
            ),
            Err(err) => log::error!("{}", err),
        }
        program
    }

    fn try_link(&mut self, device: &wgpu::Device) -> Result<(), ShaderError> {
        let source = std::fs::read_to_string(&self.path).map_err(|source| ShaderError::Io {
            path: self.path.clone(),
            source,
        })?;

        let vertex = compile_stage(&self.name, &source, &self.name, VERTEX_DEFINE)?;
        let fragment = compile_stage(&self.name, &source, &self.name, FRAGMENT_DEFINE)?;
        let info = link(&self.name, &vertex.module, &fragment.module, &self.targets)?;

        device.push_error_scope(wgpu::ErrorFilter::Validation);
        let vertex_module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(&format!("{} vertex", self.name)),
            source: wgpu::ShaderSource::Wgsl(vertex.wgsl.into()),
        });
        let fragment_module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(&format!("{} fragment", self.name)),
            source: wgpu::ShaderSource::Wgsl(fragment.wgsl.into()),
        });

        let group_count = info
            .bindings
            .iter()
            .map(|b| b.group + 1)
            .max()
            .unwrap_or(0);
        let bind_group_layouts: Vec<wgpu::BindGroupLayout> = (0..group_count)
            .map(|group| {
                let entries: Vec<wgpu::BindGroupLayoutEntry> = info
                    .bindings
                    .iter()
                    .filter(|b| b.group == group)
                    .map(layout_entry)
                    .collect();
                device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                    label: Some(&format!("{} group {}", self.name, group)),
                    entries: &entries,
                })
            })
            .collect();
        let layout_refs: Vec<&wgpu::BindGroupLayout> = bind_group_layouts.iter().collect();
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some(&format!("{} layout", self.name)),
            bind_group_layouts: &layout_refs,
            push_constant_ranges: &[],
        });

        if let Some(error) = pollster::block_on(device.pop_error_scope()) {
            return Err(ShaderError::Link {
                name: self.name.clone(),
                reason: error.to_string(),
            });
        }

        self.shader_layout = info.shader_layout;
        self.bindings = info.bindings;
        self.linked = Some(LinkedProgram {
            vertex_module,
            fragment_module,
            pipeline_layout,
            bind_group_layouts,
        });
        Ok(())
    }

    pub fn is_linked(&self) -> bool {
        self.linked.is_some()
    }

    pub fn slot(&self, name: &str) -> Option<&ReflectedBinding> {
        self.bindings.iter().find(|b| b.name == name)
    }

    pub fn group_count(&self) -> u32 {
        self.linked
            .as_ref()
            .map_or(0, |linked| linked.bind_group_layouts.len() as u32)
    }

    fn linked(&self) -> Result<&LinkedProgram, RenderError> {
        self.linked.as_ref().ok_or_else(|| RenderError::ProgramNotLinked {
            program: self.name.clone(),
        })
    }

    pub fn build_pipeline(
        &self,
        device: &wgpu::Device,
        vertex_buffer: wgpu::VertexBufferLayout<'_>,
    ) -> Result<wgpu::RenderPipeline, RenderError> {
        let linked = self.linked()?;
        let mut builder = PipelineBuilder::new(
            device,
            &linked.pipeline_layout,
            &linked.vertex_module,
            &linked.fragment_module,
        )
        .with_label(&self.name)
        .with_vertex_buffer(vertex_buffer);
        for format in &self.targets.colors {
            builder = builder.with_color_target(*format, None);
        }
        if let Some(depth) = self.targets.depth {
            builder = builder.with_depth_stencil(depth, true, wgpu::CompareFunction::Less);
        }
        if !self.targets.cull {
            builder = builder.with_no_culling();
        }
        Ok(builder.build())
    }

    /// Builds the bind group for `group` by looking up each reflected slot by name.
    pub fn create_bind_group(
        &self,
        device: &wgpu::Device,
        group: u32,
        resources: &[(&str, SlotResource<'_>)],
    ) -> Result<wgpu::BindGroup, RenderError> {
        let linked = self.linked()?;
        let layout = linked
            .bind_group_layouts
            .get(group as usize)
            .ok_or(RenderError::UnknownHandle {
                kind: "bind group",
                index: group as usize,
            })?;

        let mut entries = Vec::new();
        for slot in self.bindings.iter().filter(|b| b.group == group) {
            let resource = resources
                .iter()
                .find(|(name, _)| *name == slot.name)
                .map(|(_, resource)| *resource)
                .ok_or_else(|| RenderError::MissingBinding {
                    program: self.name.clone(),
                    name: slot.name.clone(),
                })?;
            let resource = match (resource, slot.kind) {
                (SlotResource::Buffer(buffer), BindingKind::Uniform { size }) => {
                    wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                        buffer,
                        offset: 0,
                        size: NonZeroU64::new(size as u64),
                    })
                }
                (SlotResource::Texture(view), BindingKind::Texture { .. }) => {
                    wgpu::BindingResource::TextureView(view)
                }
                (SlotResource::Sampler(sampler), BindingKind::Sampler { .. }) => {
                    wgpu::BindingResource::Sampler(sampler)
                }
                _ => {
                    return Err(RenderError::MissingBinding {
                        program: self.name.clone(),
                        name: format!("{} (wrong resource kind)", slot.name),
                    })
                }
            };
            entries.push(wgpu::BindGroupEntry {
                binding: slot.binding,
                resource,
            });
        }

        Ok(device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(&format!("{} group {}", self.name, group)),
            layout,
            entries: &entries,
        }))
    }

    /// Dynamic offsets for `group`, in binding order, looked up by slot name.
    pub fn dynamic_offsets(&self, group: u32, offsets: &[(&str, u32)]) -> Result<Vec<u32>, RenderError> {
        self.bindings
            .iter()
            .filter(|b| b.group == group && matches!(b.kind, BindingKind::Uniform { .. }))
            .map(|slot| {
                offsets
                    .iter()
                    .find(|(name, _)| *name == slot.name)
                    .map(|(_, offset)| *offset)
                    .ok_or_else(|| RenderError::MissingBinding {
                        program: self.name.clone(),
                        name: slot.name.clone(),
                    })
            })
            .collect()
    }
}
