pub mod arena;
pub mod context;
pub mod frame;
pub mod material;
pub mod mesh;
pub mod passes;
pub mod pipeline_builder;
pub mod preprocess;
pub mod primitives;
pub mod program;
pub mod reflect;
pub mod registry;
pub mod ssao;
pub mod targets;
pub mod texture;
pub mod uniforms;
pub mod vertex_binder;
pub mod water;

use crate::asset::Handle;

pub use context::GpuContext;
pub use frame::{FrameOptions, RenderMode, Renderer};
pub use material::Material;
pub use mesh::{Mesh, Model};
pub use program::Program;
pub use registry::Registry;
pub use targets::BufferView;
pub use texture::Texture;

pub type TextureId = Handle<Texture>;
pub type ProgramId = Handle<Program>;
pub type MaterialId = Handle<Material>;
pub type MeshId = Handle<Mesh>;
pub type ModelId = Handle<Model>;
