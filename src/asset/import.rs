//! glTF / GLB import.
//!
//! A file becomes one [`Mesh`] with a submesh per triangle primitive and one
//! [`Model`] carrying a material per submesh. Node transforms are baked into the
//! vertices, so the model is placed with a single entity transform.
//!
//! [`read_gltf`] does all the CPU work and is usable without a device;
//! [`import_gltf`] registers its result.

use std::path::{Path, PathBuf};

use glam::{Mat3, Mat4, Vec3, Vec4};

use crate::error::AssetError;
use crate::renderer::mesh::{location, MeshBuilder, VertexLayout};
use crate::renderer::{Material, Mesh, Model, ModelId, Registry, TextureId};

/// Where an image referenced by the file comes from.
#[derive(Debug, Clone, PartialEq)]
pub enum ImageSource {
    File(PathBuf),
    /// Embedded bytes; `key` is unique per file and image.
    Bytes { key: String, bytes: Vec<u8> },
    /// Could not be resolved; materials that use it fall back to their colour.
    Missing,
}

/// Material before its textures are loaded. Texture fields index `GltfScene::images`.
#[derive(Debug, Clone, PartialEq)]
pub struct MaterialDesc {
    pub name: String,
    pub albedo: Vec4,
    pub emissive: Vec3,
    pub smoothness: f32,
    pub albedo_map: Option<usize>,
    pub emissive_map: Option<usize>,
    pub specular_map: Option<usize>,
    pub normal_map: Option<usize>,
    pub bump_map: Option<usize>,
}

impl Default for MaterialDesc {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
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
}

/// Everything read from one file.
pub struct GltfScene {
    pub name: String,
    pub mesh: Mesh,
    pub materials: Vec<MaterialDesc>,
    /// Index into `materials` per submesh.
    pub submesh_materials: Vec<usize>,
    pub images: Vec<ImageSource>,
}

pub struct ImportedModel {
    pub model: ModelId,
    pub submeshes: usize,
    pub textures: usize,
}

fn malformed(path: &Path, reason: impl Into<String>) -> AssetError {
    AssetError::Malformed {
        path: path.to_path_buf(),
        reason: reason.into(),
    }
}

fn decode_data_uri(uri: &str) -> Option<Vec<u8>> {
    let rest = uri.strip_prefix("data:")?;
    let (header, payload) = rest.split_once(',')?;
    if !header.ends_with(";base64") {
        return None;
    }
    base64::decode(payload).ok()
}

fn read_images(path: &Path, document: &gltf::Document, buffers: &[gltf::buffer::Data]) -> Vec<ImageSource> {
    let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
    let file_key = path.to_string_lossy();

    document
        .images()
        .map(|image| {
            let key = format!("{}#image{}", file_key, image.index());
            match image.source() {
                gltf::image::Source::Uri { uri, .. } if uri.starts_with("data:") => {
                    match decode_data_uri(uri) {
                        Some(bytes) => ImageSource::Bytes { key, bytes },
                        None => {
                            log::warn!("Image {} of {:?} has an unreadable data URI", image.index(), path);
                            ImageSource::Missing
                        }
                    }
                }
                gltf::image::Source::Uri { uri, .. } => ImageSource::File(base_dir.join(uri)),
                gltf::image::Source::View { view, .. } => {
                    let start = view.offset();
                    let end = start + view.length();
                    match buffers.get(view.buffer().index()).and_then(|b| b.get(start..end)) {
                        Some(bytes) => ImageSource::Bytes {
                            key,
                            bytes: bytes.to_vec(),
                        },
                        None => {
                            log::warn!("Image {} of {:?} points outside its buffer", image.index(), path);
                            ImageSource::Missing
                        }
                    }
                }
            }
        })
        .collect()
}

fn read_materials(document: &gltf::Document) -> Vec<MaterialDesc> {
    let image_of = |texture: gltf::Texture<'_>| Some(texture.source().index());

    document
        .materials()
        .map(|material| {
            let pbr = material.pbr_metallic_roughness();
            let name = material
                .name()
                .map(str::to_string)
                .unwrap_or_else(|| format!("material{}", material.index().unwrap_or(0)));
            MaterialDesc {
                name,
                albedo: Vec4::from_array(pbr.base_color_factor()),
                emissive: Vec3::from_array(material.emissive_factor()),
                smoothness: 1.0 - pbr.roughness_factor().clamp(0.0, 1.0),
                albedo_map: pbr.base_color_texture().and_then(|t| image_of(t.texture())),
                emissive_map: material.emissive_texture().and_then(|t| image_of(t.texture())),
                specular_map: pbr
                    .metallic_roughness_texture()
                    .and_then(|t| image_of(t.texture())),
                normal_map: material.normal_texture().and_then(|t| image_of(t.texture())),
                bump_map: None,
            }
        })
        .collect()
}

/// Vertices of one primitive transformed by `world`, interleaved for `layout`.
struct PrimitiveData {
    layout: VertexLayout,
    vertices: Vec<f32>,
    indices: Vec<u32>,
}

/// Area-weighted vertex normals for a triangle list.
pub fn compute_normals(positions: &[Vec3], indices: &[u32]) -> Vec<Vec3> {
    let mut normals = vec![Vec3::ZERO; positions.len()];
    for tri in indices.chunks_exact(3) {
        let [a, b, c] = [tri[0] as usize, tri[1] as usize, tri[2] as usize];
        if a >= positions.len() || b >= positions.len() || c >= positions.len() {
            continue;
        }
        let face = (positions[b] - positions[a]).cross(positions[c] - positions[a]);
        normals[a] += face;
        normals[b] += face;
        normals[c] += face;
    }
    normals
        .into_iter()
        .map(|n| n.try_normalize().unwrap_or(Vec3::Y))
        .collect()
}

fn read_primitive(
    primitive: &gltf::Primitive<'_>,
    buffers: &[gltf::buffer::Data],
    world: Mat4,
) -> Option<PrimitiveData> {
    let reader = primitive.reader(|buffer| buffers.get(buffer.index()).map(|data| &data[..]));

    let positions: Vec<Vec3> = reader
        .read_positions()?
        .map(|p| world.transform_point3(Vec3::from_array(p)))
        .collect();
    if positions.is_empty() {
        return None;
    }

    let mut indices: Vec<u32> = match reader.read_indices() {
        Some(indices) => indices.into_u32().collect(),
        None => (0..positions.len() as u32).collect(),
    };
    indices.truncate(indices.len() / 3 * 3);
    if world.determinant() < 0.0 {
        for tri in indices.chunks_exact_mut(3) {
            tri.swap(1, 2);
        }
    }

    let normal_matrix = Mat3::from_mat4(world).inverse().transpose();
    let normals: Vec<Vec3> = match reader.read_normals() {
        Some(normals) => normals
            .map(|n| (normal_matrix * Vec3::from_array(n)).normalize_or_zero())
            .collect(),
        None => compute_normals(&positions, &indices),
    };
    let uvs: Vec<[f32; 2]> = match reader.read_tex_coords(0) {
        Some(uvs) => uvs.into_f32().collect(),
        None => vec![[0.0, 0.0]; positions.len()],
    };
    let tangents: Option<Vec<[f32; 4]>> = reader.read_tangents().map(|t| t.collect());

    let mut entries = vec![
        (location::POSITION, 3),
        (location::NORMAL, 3),
        (location::TEXCOORD, 2),
    ];
    if tangents.is_some() {
        entries.push((location::TANGENT, 3));
        entries.push((location::BITANGENT, 3));
    }
    let layout = VertexLayout::packed(&entries);

    let tangent_matrix = Mat3::from_mat4(world);
    let mut vertices = Vec::with_capacity(positions.len() * (layout.stride / 4) as usize);
    for (i, position) in positions.iter().enumerate() {
        let normal = normals.get(i).copied().unwrap_or(Vec3::Y);
        let uv = uvs.get(i).copied().unwrap_or([0.0, 0.0]);
        vertices.extend_from_slice(&position.to_array());
        vertices.extend_from_slice(&normal.to_array());
        vertices.extend_from_slice(&uv);
        if let Some(tangents) = &tangents {
            let [x, y, z, w] = tangents.get(i).copied().unwrap_or([1.0, 0.0, 0.0, 1.0]);
            let tangent = (tangent_matrix * Vec3::new(x, y, z)).normalize_or_zero();
            let bitangent = normal.cross(tangent) * w;
            vertices.extend_from_slice(&tangent.to_array());
            vertices.extend_from_slice(&bitangent.to_array());
        }
    }

    Some(PrimitiveData {
        layout,
        vertices,
        indices,
    })
}

/// Parses `path` and bakes its node hierarchy into one mesh.
pub fn read_gltf(path: impl AsRef<Path>) -> Result<GltfScene, AssetError> {
    let path = path.as_ref();
    let gltf_error = |source| AssetError::Gltf {
        path: path.to_path_buf(),
        source,
    };

    let gltf::Gltf { document, blob } = gltf::Gltf::open(path).map_err(gltf_error)?;
    let buffers = gltf::import_buffers(&document, path.parent(), blob).map_err(gltf_error)?;

    let images = read_images(path, &document, &buffers);
    let mut materials = read_materials(&document);
    let fallback_material = materials.len();
    let mut uses_fallback = false;

    let roots: Vec<gltf::Node<'_>> = match document.default_scene().or_else(|| document.scenes().next()) {
        Some(scene) => scene.nodes().collect(),
        None => document.nodes().collect(),
    };

    let mut builder = MeshBuilder::new();
    let mut submesh_materials = Vec::new();
    let mut worklist: Vec<(gltf::Node<'_>, Mat4)> =
        roots.into_iter().map(|node| (node, Mat4::IDENTITY)).collect();

    while let Some((node, parent)) = worklist.pop() {
        let world = parent * Mat4::from_cols_array_2d(&node.transform().matrix());
        if let Some(mesh) = node.mesh() {
            for primitive in mesh.primitives() {
                if primitive.mode() != gltf::mesh::Mode::Triangles {
                    log::warn!(
                        "Skipping {:?} primitive of mesh {:?} in {:?}",
                        primitive.mode(),
                        mesh.name().unwrap_or("unnamed"),
                        path
                    );
                    continue;
                }
                let Some(data) = read_primitive(&primitive, &buffers, world) else {
                    log::warn!("Skipping primitive without positions in {:?}", path);
                    continue;
                };
                builder.push(data.layout, &data.vertices, &data.indices);
                let material = match primitive.material().index() {
                    Some(index) if index < fallback_material => index,
                    _ => {
                        uses_fallback = true;
                        fallback_material
                    }
                };
                submesh_materials.push(material);
            }
        }
        worklist.extend(node.children().map(|child| (child, world)));
    }

    if submesh_materials.is_empty() {
        return Err(malformed(path, "no triangle primitives"));
    }
    if uses_fallback {
        materials.push(MaterialDesc::default());
    }

    let name = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "model".to_string());
    log::debug!(
        "Read {:?}: {} submeshes, {} materials, {} images",
        path,
        submesh_materials.len(),
        materials.len(),
        images.len()
    );

    Ok(GltfScene {
        mesh: builder.build(name.clone()),
        name,
        materials,
        submesh_materials,
        images,
    })
}

fn load_image(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    registry: &mut Registry,
    source: &ImageSource,
) -> Option<TextureId> {
    match source {
        ImageSource::File(path) => registry.load_texture(device, queue, path),
        ImageSource::Bytes { key, bytes } => registry.load_texture_bytes(device, queue, key, bytes),
        ImageSource::Missing => None,
    }
}

/// Reads `path` and registers its textures, materials, mesh and model.
pub fn import_gltf(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    registry: &mut Registry,
    path: impl AsRef<Path>,
) -> Result<ImportedModel, AssetError> {
    let path = path.as_ref();
    let scene = read_gltf(path)?;

    let textures: Vec<Option<TextureId>> = scene
        .images
        .iter()
        .map(|source| load_image(device, queue, registry, source))
        .collect();
    let texture = |slot: Option<usize>| slot.and_then(|i| textures.get(i).copied().flatten());

    let material_ids: Vec<_> = scene
        .materials
        .iter()
        .map(|desc| {
            let mut material = Material::new(desc.name.clone())
                .with_albedo(desc.albedo)
                .with_albedo_map(texture(desc.albedo_map));
            material.emissive = desc.emissive;
            material.smoothness = desc.smoothness;
            material.emissive_map = texture(desc.emissive_map);
            material.specular_map = texture(desc.specular_map);
            material.normal_map = texture(desc.normal_map);
            material.bump_map = texture(desc.bump_map);
            registry.add_material(device, queue, material)
        })
        .collect();

    let submeshes = scene.submesh_materials.len();
    let mesh = registry
        .add_mesh(scene.mesh)
        .map_err(|err| malformed(path, err.to_string()))?;
    let model = registry.add_model(Model {
        name: scene.name,
        mesh,
        materials: scene
            .submesh_materials
            .iter()
            .map(|&i| material_ids[i])
            .collect(),
    });

    let loaded = textures.iter().flatten().count();
    log::info!(
        "Imported {:?}: {} submeshes, {} of {} textures",
        path,
        submeshes,
        loaded,
        textures.len()
    );

    Ok(ImportedModel {
        model,
        submeshes,
        textures: loaded,
    })
}
