//! Introspection of compiled naga modules: vertex inputs, stage interface and resource bindings.

use naga::{AddressSpace, Binding, ImageClass, Module, ScalarKind, ShaderStage, TypeInner};

/// One vertex input a program consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShaderInput {
    pub location: u32,
    pub components: u8,
}

/// Vertex inputs ordered by location.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShaderLayout {
    pub inputs: Vec<ShaderInput>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingKind {
    /// Uniform block of `size` bytes, bound with a dynamic offset.
    Uniform { size: u32 },
    Texture {
        sample_type: wgpu::TextureSampleType,
    },
    Sampler {
        comparison: bool,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReflectedBinding {
    pub name: String,
    pub group: u32,
    pub binding: u32,
    pub kind: BindingKind,
    pub visibility: wgpu::ShaderStages,
}

fn components_of(inner: &TypeInner) -> Option<u8> {
    match inner {
        TypeInner::Scalar(_) => Some(1),
        TypeInner::Vector { size, .. } => Some(*size as u8),
        _ => None,
    }
}

/// Locations of an entry point's arguments or result, descending into struct members.
fn collect_locations(
    module: &Module,
    binding: Option<&Binding>,
    ty: naga::Handle<naga::Type>,
    out: &mut Vec<ShaderInput>,
) {
    let inner = &module.types[ty].inner;
    match (binding, inner) {
        (Some(Binding::Location { location, .. }), _) => {
            if let Some(components) = components_of(inner) {
                out.push(ShaderInput {
                    location: *location,
                    components,
                });
            }
        }
        (None, TypeInner::Struct { members, .. }) => {
            for member in members {
                collect_locations(module, member.binding.as_ref(), member.ty, out);
            }
        }
        _ => {}
    }
}

fn entry_point<'m>(
    module: &'m Module,
    stage: ShaderStage,
    name: &str,
) -> Option<&'m naga::EntryPoint> {
    module
        .entry_points
        .iter()
        .find(|ep| ep.stage == stage && ep.name == name)
}

pub fn has_entry_point(module: &Module, stage: ShaderStage, name: &str) -> bool {
    entry_point(module, stage, name).is_some()
}

/// Location inputs of the named entry point, sorted by location.
pub fn stage_inputs(module: &Module, stage: ShaderStage, name: &str) -> Vec<ShaderInput> {
    let mut inputs = Vec::new();
    if let Some(ep) = entry_point(module, stage, name) {
        for argument in &ep.function.arguments {
            collect_locations(module, argument.binding.as_ref(), argument.ty, &mut inputs);
        }
    }
    inputs.sort_by_key(|input| input.location);
    inputs
}

/// Location outputs of the named entry point, sorted by location.
pub fn stage_outputs(module: &Module, stage: ShaderStage, name: &str) -> Vec<ShaderInput> {
    let mut outputs = Vec::new();
    if let Some(result) = entry_point(module, stage, name).and_then(|ep| ep.function.result.as_ref()) {
        collect_locations(module, result.binding.as_ref(), result.ty, &mut outputs);
    }
    outputs.sort_by_key(|output| output.location);
    outputs
}

pub fn vertex_layout(module: &Module, entry: &str) -> ShaderLayout {
    ShaderLayout {
        inputs: stage_inputs(module, ShaderStage::Vertex, entry),
    }
}

/// Every global resource declared in `module`, tagged with `visibility`.
pub fn bindings(module: &Module, visibility: wgpu::ShaderStages) -> Vec<ReflectedBinding> {
    let mut found = Vec::new();
    for (_, global) in module.global_variables.iter() {
        let Some(resource) = &global.binding else {
            continue;
        };
        let inner = &module.types[global.ty].inner;
        let kind = match (global.space, inner) {
            (AddressSpace::Uniform, _) => BindingKind::Uniform {
                size: inner.size(module.to_ctx()),
            },
            (AddressSpace::Handle, TypeInner::Image { class, .. }) => {
                let sample_type = match class {
                    ImageClass::Sampled { kind, .. } => match kind {
                        ScalarKind::Sint => wgpu::TextureSampleType::Sint,
                        ScalarKind::Uint => wgpu::TextureSampleType::Uint,
                        _ => wgpu::TextureSampleType::Float { filterable: true },
                    },
                    ImageClass::Depth { .. } => wgpu::TextureSampleType::Depth,
                    _ => {
                        log::warn!(
                            "Ignoring unsupported image binding {:?}",
                            global.name
                        );
                        continue;
                    }
                };
                BindingKind::Texture { sample_type }
            }
            (AddressSpace::Handle, TypeInner::Sampler { comparison }) => BindingKind::Sampler {
                comparison: *comparison,
            },
            _ => {
                log::warn!("Ignoring unsupported binding {:?}", global.name);
                continue;
            }
        };
        found.push(ReflectedBinding {
            name: global.name.clone().unwrap_or_default(),
            group: resource.group,
            binding: resource.binding,
            kind,
            visibility,
        });
    }
    found.sort_by_key(|b| (b.group, b.binding));
    found
}

/// Union of two stages' bindings. A slot declared by both gets both visibilities.
pub fn merge_bindings(
    mut vertex: Vec<ReflectedBinding>,
    fragment: Vec<ReflectedBinding>,
) -> Result<Vec<ReflectedBinding>, String> {
    for binding in fragment {
        match vertex
            .iter_mut()
            .find(|b| b.group == binding.group && b.binding == binding.binding)
        {
            Some(existing) => {
                if existing.name != binding.name || existing.kind != binding.kind {
                    return Err(format!(
                        "set {} binding {} is {:?} in the vertex stage but {:?} in the fragment stage",
                        binding.group, binding.binding, existing.name, binding.name
                    ));
                }
                existing.visibility |= binding.visibility;
            }
            None => vertex.push(binding),
        }
    }
    vertex.sort_by_key(|b| (b.group, b.binding));
    Ok(vertex)
}
