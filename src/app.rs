use std::sync::Arc;
use std::time::Instant;

use winit::{
    application::ApplicationHandler,
    dpi::PhysicalSize,
    event::*,
    event_loop::ActiveEventLoop,
    keyboard::{KeyCode, PhysicalKey},
    window::{Window, WindowId},
};

use crate::error::RenderError;
use crate::input::{DebugAction, InputState};
use crate::renderer::{FrameOptions, GpuContext, Renderer};
use crate::scene::{build_scene, Camera, SceneStore};
use crate::settings::RenderSettings;

#[cfg(feature = "egui")]
struct UiState {
    egui: crate::ui::EguiContext,
    debug: crate::ui::DebugWindow,
}

struct Running {
    window: Arc<Window>,
    renderer: Renderer,
    scene: SceneStore,
    camera: Camera,
    #[cfg(feature = "egui")]
    ui: UiState,
}

pub struct App {
    settings: RenderSettings,
    running: Option<Running>,
    input: InputState,
    last_frame: Instant,
    elapsed: f32,
}

/// Applies one debug key to the frame options.
pub fn apply_debug_action(options: &mut FrameOptions, action: DebugAction) {
    match action {
        DebugAction::CycleRenderMode => {
            options.mode = options.mode.next();
            log::info!("Render mode: {}", options.mode.label());
        }
        DebugAction::CycleBufferView => {
            options.buffer_view = options.buffer_view.next();
            log::info!("Buffer view: {}", options.buffer_view.label());
        }
        DebugAction::ToggleSsao => {
            options.ssao_enabled = !options.ssao_enabled;
            log::info!("Ambient occlusion: {}", options.ssao_enabled);
        }
    }
}

impl App {
    pub fn new(settings: RenderSettings) -> Self {
        Self {
            settings,
            running: None,
            input: InputState::default(),
            last_frame: Instant::now(),
            elapsed: 0.0,
        }
    }

    fn start(&self, event_loop: &ActiveEventLoop) -> Result<Running, RenderError> {
        let resolution = &self.settings.resolution;
        let window = event_loop
            .create_window(
                Window::default_attributes()
                    .with_title("shoreline")
                    .with_inner_size(PhysicalSize::new(resolution.width, resolution.height)),
            )?;
        let window = Arc::new(window);

        let context = pollster::block_on(GpuContext::new(window.clone(), &self.settings))?;
        let mut renderer = Renderer::new(context, &self.settings)?;
        let (scene, camera) = build_scene(&mut renderer, &self.settings)?;

        #[cfg(feature = "egui")]
        let ui = {
            let mut egui = crate::ui::EguiContext::new(
                &renderer.context.device,
                renderer.context.surface_format(),
                &window,
            );
            let thumbnails = crate::ui::Thumbnails::register(
                &mut egui.renderer,
                &renderer.context.device,
                &renderer.targets,
            );
            let debug = crate::ui::DebugWindow::new(&renderer.context.adapter_info, Some(thumbnails));
            UiState { egui, debug }
        };

        Ok(Running {
            window,
            renderer,
            scene,
            camera,
            #[cfg(feature = "egui")]
            ui,
        })
    }

    fn redraw(&mut self, event_loop: &ActiveEventLoop) {
        let Some(running) = self.running.as_mut() else {
            return;
        };

        let now = Instant::now();
        let dt = (now - self.last_frame).as_secs_f32();
        self.last_frame = now;
        self.elapsed += dt;

        running.camera.process_keyboard(self.input.held(), dt);
        let (dx, dy) = self.input.take_mouse_delta();
        if dx != 0.0 || dy != 0.0 {
            running.camera.process_mouse(dx, dy);
        }

        #[cfg(feature = "egui")]
        let result = {
            let ui = &mut running.ui;
            let options = &mut running.renderer.options;
            ui.debug.record_frame(dt);
            let prepared = ui.egui.run(&running.window, |ctx| ui.debug.show(ctx, options));
            running.renderer.render_frame(
                &mut running.scene,
                &running.camera,
                self.elapsed,
                |target| ui.egui.render(target, prepared),
            )
        };
        #[cfg(not(feature = "egui"))]
        let result = running.renderer.render_frame(
            &mut running.scene,
            &running.camera,
            self.elapsed,
            |_| {},
        );

        match result {
            Ok(()) => running.window.request_redraw(),
            Err(err) => {
                log::error!("Fatal render error: {}", err);
                event_loop.exit();
            }
        }
    }

    fn resize(&mut self, size: PhysicalSize<u32>) {
        if let Some(running) = self.running.as_mut() {
            running.renderer.resize(size);
            running.camera.set_aspect(size.width, size.height);
        }
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.running.is_some() {
            return;
        }
        match self.start(event_loop) {
            Ok(running) => {
                running.window.request_redraw();
                self.last_frame = Instant::now();
                self.running = Some(running);
            }
            Err(err) => {
                log::error!("Failed to start renderer: {}", err);
                event_loop.exit();
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, id: WindowId, event: WindowEvent) {
        let Some(running) = self.running.as_mut() else {
            return;
        };
        if running.window.id() != id {
            return;
        }

        #[cfg(feature = "egui")]
        let consumed = running.ui.egui.handle_event(&running.window, &event);
        #[cfg(not(feature = "egui"))]
        let consumed = false;
        #[cfg(feature = "egui")]
        let pointer_on_ui = consumed || running.ui.egui.wants_pointer();
        #[cfg(not(feature = "egui"))]
        let pointer_on_ui = false;

        match event {
            WindowEvent::CloseRequested | WindowEvent::Destroyed => {
                event_loop.exit();
            }
            WindowEvent::Resized(size) => {
                self.resize(size);
            }
            WindowEvent::ScaleFactorChanged { .. } => {
                let size = running.window.inner_size();
                self.resize(size);
            }
            WindowEvent::RedrawRequested => {
                self.redraw(event_loop);
            }
            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        physical_key: PhysicalKey::Code(code),
                        state,
                        repeat,
                        ..
                    },
                ..
            } => {
                if code == KeyCode::Escape && state == ElementState::Pressed {
                    event_loop.exit();
                    return;
                }
                if state == ElementState::Pressed && !repeat {
                    if let Some(action) = DebugAction::from_key(code) {
                        apply_debug_action(&mut running.renderer.options, action);
                    }
                }
                // releases always reach the input state so keys never stick
                if !consumed || state == ElementState::Released {
                    self.input.key(code, state);
                }
            }
            WindowEvent::MouseInput { state, button, .. } => {
                if button_reaches_scene(pointer_on_ui, state) {
                    self.input.mouse_button(button, state);
                }
            }
            WindowEvent::CursorMoved { position, .. } => {
                self.input.cursor_moved(position.x, position.y);
            }
            _ => {}
        }
    }
}

/// Presses over the debug UI don't start camera drags. Releases always get through
/// so a drag never sticks.
fn button_reaches_scene(pointer_on_ui: bool, state: ElementState) -> bool {
    !pointer_on_ui || state == ElementState::Released
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::{BufferView, RenderMode};

    #[test]
    fn presses_over_the_ui_stay_out_of_the_scene() {
        assert!(!button_reaches_scene(true, ElementState::Pressed));
        assert!(button_reaches_scene(true, ElementState::Released));
        assert!(button_reaches_scene(false, ElementState::Pressed));
    }

    #[test]
    fn debug_keys_cycle_options() {
        let mut options = FrameOptions::from_settings(&RenderSettings::default());
        assert_eq!(options.mode, RenderMode::Deferred);

        apply_debug_action(&mut options, DebugAction::CycleRenderMode);
        assert_eq!(options.mode, RenderMode::Forward);

        apply_debug_action(&mut options, DebugAction::CycleBufferView);
        apply_debug_action(&mut options, DebugAction::CycleBufferView);
        assert_eq!(options.buffer_view, BufferView::Reflection);

        let ssao = options.ssao_enabled;
        apply_debug_action(&mut options, DebugAction::ToggleSsao);
        assert_eq!(options.ssao_enabled, !ssao);
    }
}
