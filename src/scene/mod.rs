pub mod camera;
pub mod setup;
pub mod store;

pub use camera::Camera;
pub use setup::build_scene;
pub use store::{Entity, Light, LightKind, SceneStore};
