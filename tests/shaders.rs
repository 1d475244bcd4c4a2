//! Every shipped program variant must compile, validate and link against the
//! attachments it is created for. No GPU needed.

use std::path::PathBuf;

use shoreline::renderer::frame::{TargetKind, PROGRAM_SOURCES};
use shoreline::renderer::preprocess::{FRAGMENT_DEFINE, VERTEX_DEFINE};
use shoreline::renderer::program::{compile_stage, link, BindingKind, LinkInfo};

const SURFACE: wgpu::TextureFormat = wgpu::TextureFormat::Bgra8UnormSrgb;

fn shader_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("src").join("shader")
}

fn link_program(file: &str, define: &str, target: TargetKind) -> LinkInfo {
    let source = std::fs::read_to_string(shader_dir().join(file)).unwrap();
    let vertex = compile_stage(define, &source, define, VERTEX_DEFINE)
        .unwrap_or_else(|err| panic!("{define} vertex: {err}"));
    let fragment = compile_stage(define, &source, define, FRAGMENT_DEFINE)
        .unwrap_or_else(|err| panic!("{define} fragment: {err}"));
    link(define, &vertex.module, &fragment.module, &target.targets(SURFACE))
        .unwrap_or_else(|err| panic!("{define} link: {err}"))
}

fn slot<'a>(info: &'a LinkInfo, name: &str) -> &'a shoreline::renderer::program::ReflectedBinding {
    info.bindings
        .iter()
        .find(|b| b.name == name)
        .unwrap_or_else(|| panic!("no slot named {name}"))
}

#[test]
fn every_program_links() {
    for source in PROGRAM_SOURCES {
        link_program(source.file, source.define, source.target);
    }
}

#[test]
fn geometry_programs_read_the_uniform_blocks() {
    for source in PROGRAM_SOURCES.iter().filter(|s| {
        matches!(s.target, TargetKind::GBuffer | TargetKind::SurfaceScene)
    }) {
        let info = link_program(source.file, source.define, source.target);
        let locals = slot(&info, "locals");
        assert_eq!((locals.group, locals.binding), (1, 0));
        assert_eq!(locals.kind, BindingKind::Uniform { size: 192 });
        assert!(locals.visibility.contains(wgpu::ShaderStages::VERTEX));

        let pass = slot(&info, "pass_data");
        assert_eq!(pass.kind, BindingKind::Uniform { size: 304 });
        assert_eq!(slot(&info, "albedo_map").group, 2);
    }
}

#[test]
fn globals_block_matches_host_layout() {
    let info = link_program("forward.glsl", "FORWARD", TargetKind::SurfaceScene);
    assert_eq!(slot(&info, "globals").kind, BindingKind::Uniform { size: 1040 });
}

#[test]
fn composite_variants_differ_only_in_their_inputs() {
    let fb = link_program("deferred_lighting.glsl", "FB_COMPOSITE", TargetKind::Offscreen);
    let plain = link_program("deferred_lighting.glsl", "FINAL_COMPOSITE", TargetKind::SurfaceScreen);
    let with_ao = link_program(
        "deferred_lighting.glsl",
        "FINAL_COMPOSITE_SSAO",
        TargetKind::SurfaceScreen,
    );

    let names = |info: &LinkInfo| info.bindings.iter().map(|b| b.name.clone()).collect::<Vec<_>>();
    assert!(!names(&fb).contains(&"water_tex".to_string()));
    assert!(names(&plain).contains(&"water_tex".to_string()));
    assert!(!names(&plain).contains(&"ssao_tex".to_string()));
    assert!(names(&with_ao).contains(&"ssao_tex".to_string()));
}

#[test]
fn ssao_kernel_holds_sixty_four_samples() {
    let info = link_program("ssao.glsl", "SSAO", TargetKind::Offscreen);
    let kernel = slot(&info, "ssao_kernel");
    assert_eq!(kernel.kind, BindingKind::Uniform { size: 64 * 16 });
    assert_eq!(kernel.group, 2);
}

#[test]
fn geometry_pass_writes_five_attachments() {
    let targets = TargetKind::GBuffer.targets(SURFACE);
    assert_eq!(targets.colors.len(), 5);
    link_program("geometry.glsl", "GEOMETRY", TargetKind::GBuffer);
}
