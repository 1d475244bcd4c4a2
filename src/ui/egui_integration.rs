use egui_wgpu::ScreenDescriptor;
use winit::event::WindowEvent;
use winit::window::Window;

use crate::renderer::frame::OverlayTarget;

/// egui state plus the wgpu renderer that draws it over the finished frame.
pub struct EguiContext {
    ctx: egui::Context,
    state: egui_winit::State,
    pub renderer: egui_wgpu::Renderer,
}

/// A finished UI pass waiting for the surface frame.
pub struct PreparedUi {
    output: egui::FullOutput,
    pixels_per_point: f32,
}

impl EguiContext {
    pub fn new(device: &wgpu::Device, output_format: wgpu::TextureFormat, window: &Window) -> Self {
        let ctx = egui::Context::default();
        let viewport_id = ctx.viewport_id();

        let state = egui_winit::State::new(
            ctx.clone(),
            viewport_id,
            window,
            Some(window.scale_factor() as f32),
            None,
            Some(2048),
        );

        let renderer = egui_wgpu::Renderer::new(
            device,
            output_format,
            egui_wgpu::RendererOptions {
                depth_stencil_format: None,
                msaa_samples: 1,
                dithering: true,
                predictable_texture_filtering: false,
            },
        );

        Self {
            ctx,
            state,
            renderer,
        }
    }

    /// Returns true when egui used the event and the camera should ignore it.
    pub fn handle_event(&mut self, window: &Window, event: &WindowEvent) -> bool {
        self.state.on_window_event(window, event).consumed
    }

    pub fn wants_pointer(&self) -> bool {
        self.ctx.wants_pointer_input()
    }

    /// Runs `build` for one frame and returns what it drew.
    pub fn run(&mut self, window: &Window, build: impl FnOnce(&egui::Context)) -> PreparedUi {
        let raw_input = self.state.take_egui_input(window);
        self.ctx.begin_pass(raw_input);
        build(&self.ctx);
        let output = self.ctx.end_pass();
        self.state
            .handle_platform_output(window, output.platform_output.clone());
        PreparedUi {
            output,
            pixels_per_point: window.scale_factor() as f32,
        }
    }

    pub fn render(&mut self, target: &mut OverlayTarget<'_>, prepared: PreparedUi) {
        if target.size[0] == 0 || target.size[1] == 0 {
            return;
        }
        let PreparedUi {
            output,
            pixels_per_point,
        } = prepared;

        let screen_descriptor = ScreenDescriptor {
            size_in_pixels: target.size,
            pixels_per_point,
        };

        for (id, delta) in &output.textures_delta.set {
            self.renderer
                .update_texture(target.device, target.queue, *id, delta);
        }

        let primitives = self.ctx.tessellate(output.shapes, output.pixels_per_point);
        self.renderer.update_buffers(
            target.device,
            target.queue,
            target.encoder,
            &primitives,
            &screen_descriptor,
        );

        // loads the composited scene and draws on top
        let pass = target
            .encoder
            .begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("DebugUi"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: target.view,
                    depth_slice: None,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Load,
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });

        // egui-wgpu wants a 'static pass
        let mut pass = pass.forget_lifetime();
        self.renderer
            .render(&mut pass, &primitives, &screen_descriptor);
        drop(pass);

        for id in &output.textures_delta.free {
            self.renderer.free_texture(id);
        }
    }
}
