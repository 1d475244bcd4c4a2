//! Per-stage compile options for the GLSL program sources.
//!
//! Every program is one source file holding both stages. A stage is compiled from
//! the shared version header plus the file, with the program name and `VERTEX` or
//! `FRAGMENT` handed to naga's preprocessor as defines. `#ifdef` blocks in the file
//! select the stage and the program variant.

use naga::front::glsl::Options;
use naga::{FastHashMap, ShaderStage};

pub const VERTEX_DEFINE: &str = "VERTEX";
pub const FRAGMENT_DEFINE: &str = "FRAGMENT";

/// Prepended to every stage; program files carry no `#version` line of their own.
pub const VERSION_HEADER: &str = "#version 450\n";

/// Lines added in front of the file, for mapping diagnostics back to it.
pub const HEADER_LINES: usize = 1;

pub fn stage_of(stage_define: &str) -> ShaderStage {
    if stage_define == VERTEX_DEFINE {
        ShaderStage::Vertex
    } else {
        ShaderStage::Fragment
    }
}

/// Version header plus source.
pub fn stage_source(source: &str) -> String {
    format!("{VERSION_HEADER}{source}")
}

pub fn stage_defines(program_define: &str, stage_define: &str) -> FastHashMap<String, String> {
    let mut defines = FastHashMap::default();
    defines.insert(program_define.to_string(), String::new());
    defines.insert(stage_define.to_string(), String::new());
    defines
}

pub fn stage_options(program_define: &str, stage_define: &str) -> Options {
    Options {
        stage: stage_of(stage_define),
        defines: stage_defines(program_define, stage_define),
    }
}

/// 1-based line in the program file for a line of the composed stage source.
pub fn file_line(stage_line: usize) -> usize {
    stage_line.saturating_sub(HEADER_LINES).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use naga::front::glsl::Frontend;

    const SOURCE: &str = "\
#ifdef VERTEX
layout(location = 0) in vec3 position;
void main() { gl_Position = vec4(position, 1.0); }
#else
layout(location = 0) out vec4 color;
void main() {
#ifdef TINTED
    color = vec4(0.5);
#else
    color = vec4(1.0);
#endif
}
#endif
";

    fn parse(program: &str, stage: &str) -> naga::Module {
        Frontend::default()
            .parse(&stage_options(program, stage), &stage_source(SOURCE))
            .unwrap_or_else(|errors| panic!("{program} {stage}: {errors}"))
    }

    #[test]
    fn header_leads_every_stage() {
        let composed = stage_source(SOURCE);
        assert!(composed.starts_with("#version 450\n#ifdef VERTEX"));
        assert_eq!(composed.lines().count(), SOURCE.lines().count() + HEADER_LINES);
    }

    #[test]
    fn defines_name_program_and_stage() {
        let defines = stage_defines("FINAL_COMPOSITE_SSAO", FRAGMENT_DEFINE);
        assert_eq!(defines.len(), 2);
        assert!(defines.contains_key("FINAL_COMPOSITE_SSAO"));
        assert!(defines.contains_key(FRAGMENT_DEFINE));
        assert_eq!(stage_options("P", VERTEX_DEFINE).stage, ShaderStage::Vertex);
    }

    #[test]
    fn stage_define_selects_the_entry_point() {
        let vertex = parse("PLAIN", VERTEX_DEFINE);
        assert_eq!(vertex.entry_points.len(), 1);
        assert_eq!(vertex.entry_points[0].stage, ShaderStage::Vertex);

        let fragment = parse("PLAIN", FRAGMENT_DEFINE);
        assert_eq!(fragment.entry_points[0].stage, ShaderStage::Fragment);
    }

    #[test]
    fn program_define_selects_the_variant() {
        let plain = parse("PLAIN", FRAGMENT_DEFINE);
        let tinted = parse("TINTED", FRAGMENT_DEFINE);
        assert_ne!(
            format!("{:?}", plain.entry_points[0].function.expressions),
            format!("{:?}", tinted.entry_points[0].function.expressions)
        );
    }

    #[test]
    fn diagnostics_map_back_to_file_lines() {
        assert_eq!(file_line(1), 1);
        assert_eq!(file_line(6), 5);
    }

    #[test]
    fn unbalanced_blocks_fail_to_parse() {
        let broken = stage_source("#ifdef VERTEX\nvoid main() {}\n#endif\n#endif\n");
        let result = Frontend::default().parse(&stage_options("P", VERTEX_DEFINE), &broken);
        assert!(result.is_err());
    }
}
