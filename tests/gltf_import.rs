use std::path::PathBuf;

use glam::Vec3;
use shoreline::asset::import::read_gltf;
use shoreline::error::AssetError;

/// One triangle in the XZ plane, wound to face +Y, plus its u16 indices.
fn triangle_buffer() -> Vec<u8> {
    let positions: [f32; 9] = [0.0, 0.0, 0.0, 0.0, 0.0, 1.0, 1.0, 0.0, 0.0];
    let indices: [u16; 4] = [0, 1, 2, 0];
    let mut bytes = bytemuck::cast_slice::<f32, u8>(&positions).to_vec();
    bytes.extend_from_slice(bytemuck::cast_slice(&indices));
    bytes
}

fn write_gltf(name: &str, mode: u32) -> PathBuf {
    let buffer = triangle_buffer();
    let json = serde_json::json!({
        "asset": { "version": "2.0" },
        "scene": 0,
        "scenes": [{ "nodes": [0] }],
        "nodes": [
            { "translation": [0.0, 2.0, 0.0], "children": [1] },
            { "mesh": 0, "scale": [2.0, 2.0, 2.0] }
        ],
        "meshes": [{
            "primitives": [{ "attributes": { "POSITION": 0 }, "indices": 1, "mode": mode }]
        }],
        "buffers": [{
            "byteLength": buffer.len(),
            "uri": format!("data:application/octet-stream;base64,{}", base64::encode(&buffer))
        }],
        "bufferViews": [
            { "buffer": 0, "byteOffset": 0, "byteLength": 36 },
            { "buffer": 0, "byteOffset": 36, "byteLength": 6 }
        ],
        "accessors": [
            {
                "bufferView": 0, "componentType": 5126, "count": 3, "type": "VEC3",
                "min": [0.0, 0.0, 0.0], "max": [1.0, 0.0, 1.0]
            },
            { "bufferView": 1, "componentType": 5123, "count": 3, "type": "SCALAR" }
        ]
    });

    let path = std::env::temp_dir().join(format!("shoreline_{}_{}.gltf", name, std::process::id()));
    std::fs::write(&path, serde_json::to_vec(&json).unwrap()).unwrap();
    path
}

fn floats(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}

#[test]
fn node_transforms_are_baked_into_vertices() {
    let path = write_gltf("baked", 4);
    let scene = read_gltf(&path).unwrap();
    std::fs::remove_file(&path).ok();

    assert_eq!(scene.mesh.submeshes.len(), 1);
    let submesh = &scene.mesh.submeshes[0];
    assert_eq!(submesh.layout.stride, 32);
    assert!(submesh.layout.find(3).is_none());
    assert_eq!(submesh.index_count, 3);

    let data = floats(&scene.mesh.vertex_data);
    let vertex = |i: usize| Vec3::new(data[i * 8], data[i * 8 + 1], data[i * 8 + 2]);
    let normal = |i: usize| Vec3::new(data[i * 8 + 3], data[i * 8 + 4], data[i * 8 + 5]);
    assert_eq!(vertex(0), Vec3::new(0.0, 2.0, 0.0));
    assert_eq!(vertex(1), Vec3::new(0.0, 2.0, 2.0));
    assert_eq!(vertex(2), Vec3::new(2.0, 2.0, 0.0));
    for i in 0..3 {
        assert!((normal(i) - Vec3::Y).length() < 1e-5);
    }
    assert!(scene.mesh.validate().is_ok());
}

#[test]
fn primitives_without_material_share_a_default() {
    let path = write_gltf("default_material", 4);
    let scene = read_gltf(&path).unwrap();
    std::fs::remove_file(&path).ok();

    assert_eq!(scene.materials.len(), 1);
    assert_eq!(scene.submesh_materials, vec![0]);
    assert_eq!(scene.materials[0].albedo_map, None);
    assert!(scene.images.is_empty());
}

#[test]
fn files_without_triangles_are_rejected() {
    // mode 0 = POINTS
    let path = write_gltf("points", 0);
    let result = read_gltf(&path);
    std::fs::remove_file(&path).ok();

    assert!(matches!(result, Err(AssetError::Malformed { .. })));
}

#[test]
fn missing_file_is_an_import_error() {
    let result = read_gltf(std::env::temp_dir().join("shoreline_does_not_exist.gltf"));
    assert!(matches!(result, Err(AssetError::Gltf { .. })));
}
