pub mod handle;
pub mod import;
pub mod table;

pub use handle::Handle;
pub use import::{import_gltf, ImportedModel};
pub use table::ResourceTable;
