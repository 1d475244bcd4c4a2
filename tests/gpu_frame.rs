//! Resource setup on a real device. Needs a GPU adapter, so ignored by default:
//! run with `cargo test -- --ignored`.

use std::path::PathBuf;

use shoreline::error::RenderError;
use shoreline::renderer::arena::GpuUniformArena;
use shoreline::renderer::frame::{GEOMETRY, PROGRAM_SOURCES};
use shoreline::renderer::mesh::{MeshBuilder, VertexLayout};
use shoreline::renderer::targets::RenderTargets;
use shoreline::renderer::{primitives, vertex_binder, Registry};

const SURFACE: wgpu::TextureFormat = wgpu::TextureFormat::Bgra8UnormSrgb;

fn headless_device() -> (wgpu::Device, wgpu::Queue) {
    pollster::block_on(async {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor::default());
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions::default())
            .await
            .expect("Failed to find adapter");
        adapter
            .request_device(&wgpu::DeviceDescriptor {
                required_limits: adapter.limits(),
                ..Default::default()
            })
            .await
            .expect("Failed to create device")
    })
}

fn shader_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("src").join("shader")
}

#[test]
#[ignore]
fn arena_capacity_respects_the_device_limit() {
    let (device, queue) = headless_device();
    let limit = device.limits().max_uniform_buffer_binding_size;
    let requested = 1 << 20;
    let mut arena = GpuUniformArena::new(&device, requested);
    assert_eq!(arena.cpu().capacity(), requested.min(limit) as usize);

    let cpu = arena.begin_write().unwrap();
    cpu.push_vec4(glam::Vec4::ONE).unwrap();
    cpu.align_to_binding().unwrap();
    let second = cpu.push_f32(2.0).unwrap();
    assert_eq!(second % cpu.alignment(), 0);
    arena.end_write(&queue).unwrap();
    assert!(!arena.cpu().is_mapped());
}

#[test]
#[ignore]
fn all_targets_are_created_at_display_size() {
    let (device, _queue) = headless_device();
    let targets = RenderTargets::new(&device, 320, 180);
    for frame in [&targets.gbuffer, &targets.refraction, &targets.reflection] {
        assert_eq!(frame.colors.len(), 5);
        assert_eq!((frame.width, frame.height), (320, 180));
    }
    for frame in [
        &targets.ssao,
        &targets.ssao_blur,
        &targets.refraction_composite,
        &targets.reflection_composite,
        &targets.water,
    ] {
        assert_eq!(frame.colors.len(), 1);
    }
}

#[test]
#[ignore]
fn every_program_links_on_the_device() {
    let (device, queue) = headless_device();
    let mut registry = Registry::new(&device, &queue);
    for source in PROGRAM_SOURCES {
        let id = registry.load_program(
            &device,
            shader_dir().join(source.file),
            source.define,
            source.target.targets(SURFACE),
        );
        assert!(registry.program(id).unwrap().is_linked(), "{}", source.define);
    }
    assert_eq!(registry.programs.len(), PROGRAM_SOURCES.len());
}

#[test]
#[ignore]
fn vertex_bindings_are_cached_per_program() {
    let (device, queue) = headless_device();
    let mut registry = Registry::new(&device, &queue);
    let program_id = registry.load_program(
        &device,
        shader_dir().join(GEOMETRY.file),
        GEOMETRY.define,
        GEOMETRY.target.targets(SURFACE),
    );
    let cube = registry.add_mesh(primitives::cube()).unwrap();

    let program = registry.programs.get(program_id).unwrap();
    let mesh = registry.meshes.get_mut(cube).unwrap();
    vertex_binder::resolve(&device, mesh, 0, program_id, program).unwrap();
    vertex_binder::resolve(&device, mesh, 0, program_id, program).unwrap();
    assert_eq!(mesh.submeshes[0].vaos.len(), 1);
    assert!(mesh.gpu().is_some());
}

#[test]
#[ignore]
fn position_only_mesh_does_not_fit_the_geometry_program() {
    let (device, queue) = headless_device();
    let mut registry = Registry::new(&device, &queue);
    let program_id = registry.load_program(
        &device,
        shader_dir().join(GEOMETRY.file),
        GEOMETRY.define,
        GEOMETRY.target.targets(SURFACE),
    );

    let mut builder = MeshBuilder::new();
    builder.push(
        VertexLayout::packed(&[(0, 3)]),
        &[0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0],
        &[0, 1, 2],
    );
    let bare = registry.add_mesh(builder.build("bare")).unwrap();

    let program = registry.programs.get(program_id).unwrap();
    let mesh = registry.meshes.get_mut(bare).unwrap();
    let err = vertex_binder::resolve(&device, mesh, 0, program_id, program).unwrap_err();
    assert!(matches!(err, RenderError::LayoutMismatch { location: 1, .. }), "{err}");
}
