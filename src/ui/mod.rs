#[cfg(feature = "egui")]
mod egui_integration;

#[cfg(feature = "egui")]
mod debug_window;

#[cfg(feature = "egui")]
pub use egui_integration::{EguiContext, PreparedUi};

#[cfg(feature = "egui")]
pub use debug_window::{DebugWindow, FrameTimes, Thumbnails};

#[cfg(feature = "egui")]
pub use egui;
