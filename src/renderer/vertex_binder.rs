//! Per-(submesh, program) vertex bindings.
//!
//! A binding pairs a submesh's interleaved layout with the vertex inputs a program
//! declares. It is built on first use and cached on the submesh for the rest of the
//! run; nothing ever evicts it.

use super::mesh::{Mesh, VertexLayout};
use super::program::{Program, ShaderLayout};
use super::ProgramId;
use crate::error::RenderError;

/// Pipeline specialised for one submesh layout, plus where its vertices start in the
/// mesh's shared vertex buffer.
#[derive(Debug, Clone)]
pub struct Vao {
    pub program: ProgramId,
    pub pipeline: wgpu::RenderPipeline,
    pub vertex_offset: u64,
}

/// Cache keyed by program, owned by a submesh.
pub struct VertexBindings<T> {
    entries: Vec<(ProgramId, T)>,
}

impl<T> VertexBindings<T> {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    pub fn get(&self, program: ProgramId) -> Option<&T> {
        self.entries
            .iter()
            .find(|(id, _)| *id == program)
            .map(|(_, binding)| binding)
    }

    /// Returns the cached binding for `program`, calling `create` only on a miss.
    /// A failed `create` caches nothing.
    pub fn resolve<E>(
        &mut self,
        program: ProgramId,
        create: impl FnOnce() -> Result<T, E>,
    ) -> Result<&T, E> {
        let index = match self.entries.iter().position(|(id, _)| *id == program) {
            Some(index) => index,
            None => {
                let binding = create()?;
                self.entries.push((program, binding));
                self.entries.len() - 1
            }
        };
        Ok(&self.entries[index].1)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<T> Default for VertexBindings<T> {
    fn default() -> Self {
        Self::new()
    }
}

pub fn vertex_format(components: u8) -> wgpu::VertexFormat {
    match components {
        1 => wgpu::VertexFormat::Float32,
        2 => wgpu::VertexFormat::Float32x2,
        3 => wgpu::VertexFormat::Float32x3,
        _ => wgpu::VertexFormat::Float32x4,
    }
}

/// For each input the program declares, finds the submesh attribute with the same
/// location. Fails with the first location the submesh can't provide.
pub fn match_layout(
    shader: &ShaderLayout,
    submesh: &VertexLayout,
) -> Result<Vec<wgpu::VertexAttribute>, u32> {
    shader
        .inputs
        .iter()
        .map(|input| {
            submesh
                .find(input.location)
                .map(|attribute| wgpu::VertexAttribute {
                    format: vertex_format(attribute.components),
                    offset: attribute.offset as u64,
                    shader_location: input.location,
                })
                .ok_or(input.location)
        })
        .collect()
}

/// Looks up or builds the binding of `mesh.submeshes[submesh]` for `program`.
/// Uploads the mesh's shared buffers first if this is the first time it's drawn.
pub fn resolve<'m>(
    device: &wgpu::Device,
    mesh: &'m mut Mesh,
    submesh: usize,
    program_id: ProgramId,
    program: &Program,
) -> Result<&'m Vao, RenderError> {
    mesh.ensure_uploaded(device);
    let mesh_name = mesh.name.as_str();
    let Some(target) = mesh.submeshes.get_mut(submesh) else {
        return Err(RenderError::UnknownHandle {
            kind: "submesh",
            index: submesh,
        });
    };

    let layout = &target.layout;
    let vertex_offset = target.vertex_offset;
    target.vaos.resolve(program_id, || {
        let attributes =
            match_layout(&program.shader_layout, layout).map_err(|location| {
                RenderError::LayoutMismatch {
                    program: program.name.clone(),
                    mesh: mesh_name.to_string(),
                    submesh,
                    location,
                }
            })?;
        log::debug!(
            "Binding {} submesh {} to program {}",
            mesh_name,
            submesh,
            program.name
        );
        let pipeline = program.build_pipeline(
            device,
            wgpu::VertexBufferLayout {
                array_stride: layout.stride as u64,
                step_mode: wgpu::VertexStepMode::Vertex,
                attributes: &attributes,
            },
        )?;
        Ok(Vao {
            program: program_id,
            pipeline,
            vertex_offset,
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asset::Handle;
    use crate::renderer::program::ShaderInput;

    fn shader(locations: &[(u32, u8)]) -> ShaderLayout {
        ShaderLayout {
            inputs: locations
                .iter()
                .map(|&(location, components)| ShaderInput {
                    location,
                    components,
                })
                .collect(),
        }
    }

    #[test]
    fn second_resolve_reuses_the_cached_binding() {
        let mut cache: VertexBindings<u32> = VertexBindings::new();
        let program = Handle::new(2);
        let mut created = 0;

        for _ in 0..3 {
            let value = cache
                .resolve::<()>(program, || {
                    created += 1;
                    Ok(7)
                })
                .unwrap();
            assert_eq!(*value, 7);
        }

        assert_eq!(created, 1);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn bindings_are_keyed_by_program() {
        let mut cache: VertexBindings<&str> = VertexBindings::new();
        cache.resolve::<()>(Handle::new(0), || Ok("geometry")).unwrap();
        cache.resolve::<()>(Handle::new(1), || Ok("forward")).unwrap();
        assert_eq!(cache.get(Handle::new(1)), Some(&"forward"));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn failed_creation_is_not_cached() {
        let mut cache: VertexBindings<u32> = VertexBindings::new();
        let program = Handle::new(0);
        assert!(cache.resolve(program, || Err("mismatch")).is_err());
        assert!(cache.is_empty());
    }

    #[test]
    fn match_layout_uses_submesh_offsets() {
        let layout = VertexLayout::packed(&[(0, 3), (1, 3), (2, 2)]);
        let attributes = match_layout(&shader(&[(0, 3), (2, 2)]), &layout).unwrap();
        assert_eq!(attributes.len(), 2);
        assert_eq!(attributes[1].shader_location, 2);
        assert_eq!(attributes[1].offset, 24);
        assert_eq!(attributes[1].format, wgpu::VertexFormat::Float32x2);
    }

    #[test]
    fn missing_location_is_reported() {
        let layout = VertexLayout::packed(&[(0, 3), (1, 3), (2, 2)]);
        let result = match_layout(&shader(&[(0, 3), (3, 3)]), &layout);
        assert_eq!(result.unwrap_err(), 3);
    }
}
