use wgpu::util::DeviceExt;

use super::vertex_binder::{Vao, VertexBindings};
use super::MaterialId;
use crate::error::RenderError;

/// Semantic attribute locations shared by the importer, the built-in meshes and the shaders.
pub mod location {
    pub const POSITION: u32 = 0;
    pub const NORMAL: u32 = 1;
    pub const TEXCOORD: u32 = 2;
    pub const TANGENT: u32 = 3;
    pub const BITANGENT: u32 = 4;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VertexAttribute {
    pub location: u32,
    /// Number of f32 components.
    pub components: u8,
    /// Byte offset within one vertex.
    pub offset: u32,
}

/// Interleaved f32 vertex layout of one submesh.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct VertexLayout {
    pub attributes: Vec<VertexAttribute>,
    pub stride: u32,
}

impl VertexLayout {
    /// Packs `(location, components)` pairs tightly in the given order.
    pub fn packed(entries: &[(u32, u8)]) -> Self {
        let mut offset = 0;
        let attributes = entries
            .iter()
            .map(|&(location, components)| {
                let attribute = VertexAttribute {
                    location,
                    components,
                    offset,
                };
                offset += components as u32 * 4;
                attribute
            })
            .collect();
        Self {
            attributes,
            stride: offset,
        }
    }

    pub fn find(&self, location: u32) -> Option<&VertexAttribute> {
        self.attributes.iter().find(|a| a.location == location)
    }
}

/// Drawable range of a [`Mesh`]. Offsets are bytes into the owning mesh's shared buffers.
pub struct SubMesh {
    pub layout: VertexLayout,
    pub vertex_offset: u64,
    pub vertex_count: u32,
    pub index_offset: u64,
    pub index_count: u32,
    pub vaos: VertexBindings<Vao>,
}

impl SubMesh {
    pub fn new(
        layout: VertexLayout,
        vertex_offset: u64,
        vertex_count: u32,
        index_offset: u64,
        index_count: u32,
    ) -> Self {
        Self {
            layout,
            vertex_offset,
            vertex_count,
            index_offset,
            index_count,
            vaos: VertexBindings::new(),
        }
    }

    /// First index of this submesh in the shared u32 index buffer.
    pub fn first_index(&self) -> u32 {
        (self.index_offset / 4) as u32
    }
}

pub struct GpuMeshBuffers {
    pub vertex: wgpu::Buffer,
    pub index: wgpu::Buffer,
}

/// One vertex buffer and one u32 index buffer shared by all submeshes.
///
/// The CPU payload is kept so GPU buffers can be created the first time a submesh is bound.
pub struct Mesh {
    pub name: String,
    pub vertex_data: Vec<u8>,
    pub index_data: Vec<u32>,
    pub submeshes: Vec<SubMesh>,
    gpu: Option<GpuMeshBuffers>,
}

impl Mesh {
    pub fn new(
        name: impl Into<String>,
        vertex_data: Vec<u8>,
        index_data: Vec<u32>,
        submeshes: Vec<SubMesh>,
    ) -> Self {
        Self {
            name: name.into(),
            vertex_data,
            index_data,
            submeshes,
            gpu: None,
        }
    }

    /// Checks every submesh range against the shared payloads.
    pub fn validate(&self) -> Result<(), RenderError> {
        let vertex_len = self.vertex_data.len() as u64;
        let index_len = self.index_data.len() as u64 * 4;
        let invalid = |reason: String| RenderError::InvalidMesh {
            mesh: self.name.clone(),
            reason,
        };

        for (i, submesh) in self.submeshes.iter().enumerate() {
            if submesh.vertex_offset % 4 != 0 || submesh.index_offset % 4 != 0 {
                return Err(invalid(format!("submesh {i} offsets are not 4-byte aligned")));
            }
            let vertex_end =
                submesh.vertex_offset + submesh.vertex_count as u64 * submesh.layout.stride as u64;
            if vertex_end > vertex_len {
                return Err(invalid(format!(
                    "submesh {i} vertices end at {vertex_end}, buffer holds {vertex_len}"
                )));
            }
            let index_end = submesh.index_offset + submesh.index_count as u64 * 4;
            if index_end > index_len {
                return Err(invalid(format!(
                    "submesh {i} indices end at {index_end}, buffer holds {index_len}"
                )));
            }
            let first = submesh.first_index() as usize;
            let indices = &self.index_data[first..first + submesh.index_count as usize];
            if let Some(bad) = indices.iter().find(|&&idx| idx >= submesh.vertex_count) {
                return Err(invalid(format!(
                    "submesh {i} index {bad} exceeds its {} vertices",
                    submesh.vertex_count
                )));
            }
            for attribute in &submesh.layout.attributes {
                if attribute.offset + attribute.components as u32 * 4 > submesh.layout.stride {
                    return Err(invalid(format!(
                        "submesh {i} attribute at location {} lies outside the stride",
                        attribute.location
                    )));
                }
            }
        }
        Ok(())
    }

    /// Creates the shared GPU buffers if they don't exist yet.
    pub fn ensure_uploaded(&mut self, device: &wgpu::Device) -> &GpuMeshBuffers {
        let name = &self.name;
        let vertex_data = &self.vertex_data;
        let index_data = &self.index_data;
        self.gpu.get_or_insert_with(|| {
            log::debug!("Uploading mesh {}", name);
            let vertex = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(&format!("{name} vertices")),
                contents: vertex_data,
                usage: wgpu::BufferUsages::VERTEX,
            });
            let index = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(&format!("{name} indices")),
                contents: bytemuck::cast_slice(index_data),
                usage: wgpu::BufferUsages::INDEX,
            });
            GpuMeshBuffers { vertex, index }
        })
    }

    pub fn gpu(&self) -> Option<&GpuMeshBuffers> {
        self.gpu.as_ref()
    }
}

/// A mesh plus one material per submesh.
pub struct Model {
    pub name: String,
    pub mesh: super::MeshId,
    pub materials: Vec<MaterialId>,
}

/// Helper for building a mesh out of several interleaved primitives.
#[derive(Default)]
pub struct MeshBuilder {
    vertex_data: Vec<u8>,
    index_data: Vec<u32>,
    submeshes: Vec<SubMesh>,
}

impl MeshBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a submesh. `vertices` holds `layout.stride / 4` floats per vertex and
    /// indices are relative to this submesh's first vertex.
    pub fn push(&mut self, layout: VertexLayout, vertices: &[f32], indices: &[u32]) -> usize {
        let floats_per_vertex = (layout.stride / 4).max(1) as usize;
        let vertex_offset = self.vertex_data.len() as u64;
        let index_offset = self.index_data.len() as u64 * 4;
        self.vertex_data
            .extend_from_slice(bytemuck::cast_slice(vertices));
        self.index_data.extend_from_slice(indices);
        self.submeshes.push(SubMesh::new(
            layout,
            vertex_offset,
            (vertices.len() / floats_per_vertex) as u32,
            index_offset,
            indices.len() as u32,
        ));
        self.submeshes.len() - 1
    }

    pub fn build(self, name: impl Into<String>) -> Mesh {
        Mesh::new(name, self.vertex_data, self.index_data, self.submeshes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn triangle_layout() -> VertexLayout {
        VertexLayout::packed(&[(location::POSITION, 3), (location::TEXCOORD, 2)])
    }

    #[test]
    fn packed_layout_offsets_and_stride() {
        let layout = VertexLayout::packed(&[(0, 3), (1, 3), (2, 2)]);
        let offsets: Vec<u32> = layout.attributes.iter().map(|a| a.offset).collect();
        assert_eq!(offsets, vec![0, 12, 24]);
        assert_eq!(layout.stride, 32);
        assert_eq!(layout.find(2).map(|a| a.components), Some(2));
        assert!(layout.find(3).is_none());
    }

    #[test]
    fn builder_records_byte_offsets_into_shared_buffers() {
        let mut builder = MeshBuilder::new();
        let tri = [0.0f32; 15];
        builder.push(triangle_layout(), &tri, &[0, 1, 2]);
        builder.push(triangle_layout(), &tri, &[2, 1, 0]);
        let mesh = builder.build("two triangles");

        let second = &mesh.submeshes[1];
        assert_eq!(second.vertex_offset, 60);
        assert_eq!(second.index_offset, 12);
        assert_eq!(second.first_index(), 3);
        assert_eq!(second.vertex_count, 3);
        assert!(mesh.validate().is_ok());
    }

    #[test]
    fn validate_rejects_ranges_past_the_buffers() {
        let mut builder = MeshBuilder::new();
        builder.push(triangle_layout(), &[0.0; 15], &[0, 1, 2]);
        let mut mesh = builder.build("broken");
        mesh.submeshes[0].index_count = 4;
        assert!(matches!(
            mesh.validate(),
            Err(RenderError::InvalidMesh { .. })
        ));
    }

    #[test]
    fn validate_rejects_out_of_range_indices() {
        let mut builder = MeshBuilder::new();
        builder.push(triangle_layout(), &[0.0; 15], &[0, 1, 3]);
        assert!(builder.build("bad index").validate().is_err());
    }
}
