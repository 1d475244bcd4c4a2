use std::path::PathBuf;

use thiserror::Error;

/// Failures while reading scene files and images from disk.
#[derive(Debug, Error)]
pub enum AssetError {
    #[error("failed to read {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to decode image {path:?}: {source}")]
    Image {
        path: String,
        #[source]
        source: image::ImageError,
    },
    #[error("image {path:?} has {channels} channels, expected 3 or 4")]
    UnsupportedChannels { path: String, channels: u8 },
    #[error("failed to import glTF {path:?}: {source}")]
    Gltf {
        path: PathBuf,
        #[source]
        source: gltf::Error,
    },
    #[error("malformed glTF {path:?}: {reason}")]
    Malformed { path: PathBuf, reason: String },
}

/// Shader loading failures. Each variant carries the full diagnostic text.
#[derive(Debug, Error)]
pub enum ShaderError {
    #[error("failed to read shader {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{stage} stage of {name}: preprocessor error at line {line}: {message}")]
    Preprocess {
        name: String,
        stage: &'static str,
        line: usize,
        message: String,
    },
    #[error("{stage} stage of {name} failed to compile:\n{diagnostic}")]
    Compile {
        name: String,
        stage: &'static str,
        diagnostic: String,
    },
    #[error("program {name} failed to link: {reason}")]
    Link { name: String, reason: String },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ArenaError {
    #[error("uniform arena overflow: {requested} bytes at offset {head} exceeds capacity {capacity}")]
    Overflow {
        head: usize,
        requested: usize,
        capacity: usize,
    },
    #[error("uniform arena written while not mapped")]
    NotMapped,
    #[error("uniform arena mapped twice")]
    AlreadyMapped,
}

/// Conditions that stop the frame loop.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error(transparent)]
    Arena(#[from] ArenaError),
    #[error(
        "program {program} expects vertex attribute at location {location}, \
         which submesh {submesh} of mesh {mesh} does not provide"
    )]
    LayoutMismatch {
        program: String,
        mesh: String,
        submesh: usize,
        location: u32,
    },
    #[error("program {program} did not link")]
    ProgramNotLinked { program: String },
    #[error("no {kind} registered for handle {index}")]
    UnknownHandle { kind: &'static str, index: usize },
    #[error("binding {name:?} required by program {program} has no resource")]
    MissingBinding { program: String, name: String },
    #[error("surface error: {0}")]
    Surface(#[from] wgpu::SurfaceError),
    #[error("failed to create surface: {0}")]
    CreateSurface(#[from] wgpu::CreateSurfaceError),
    #[error("no suitable GPU adapter: {0}")]
    Adapter(#[from] wgpu::RequestAdapterError),
    #[error("failed to create device: {0}")]
    Device(#[from] wgpu::RequestDeviceError),
    #[error("invalid mesh {mesh}: {reason}")]
    InvalidMesh { mesh: String, reason: String },
    #[error("failed to create window: {0}")]
    Window(#[from] winit::error::OsError),
}
