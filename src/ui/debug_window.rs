use std::collections::VecDeque;

use egui::{vec2, ComboBox, RichText, Slider};

use crate::renderer::targets::RenderTargets;
use crate::renderer::{BufferView, FrameOptions, RenderMode};

const FPS_WINDOW_SECONDS: f32 = 1.0;
const THUMBNAIL_WIDTH: f32 = 160.0;
const ATTACHMENT_NAMES: [&str; 5] = ["albedo", "normal", "position", "view dir", "depth"];

/// Frame times over the last second.
#[derive(Debug, Default)]
pub struct FrameTimes {
    samples: VecDeque<f32>,
    total: f32,
}

impl FrameTimes {
    pub fn record(&mut self, dt: f32) {
        let dt = dt.max(0.0);
        self.samples.push_back(dt);
        self.total += dt;
        while self.total > FPS_WINDOW_SECONDS && self.samples.len() > 1 {
            if let Some(old) = self.samples.pop_front() {
                self.total -= old;
            }
        }
    }

    pub fn fps(&self) -> f32 {
        if self.total > 0.0 {
            self.samples.len() as f32 / self.total
        } else {
            0.0
        }
    }

    pub fn average_ms(&self) -> f32 {
        if self.samples.is_empty() {
            0.0
        } else {
            self.total * 1000.0 / self.samples.len() as f32
        }
    }
}

/// egui texture ids for the colour attachments of every G-buffer, in `BufferView::ALL` order.
pub struct Thumbnails {
    views: Vec<Vec<egui::TextureId>>,
    aspect: f32,
}

impl Thumbnails {
    /// Targets are created once at startup, so registering once is enough.
    pub fn register(
        renderer: &mut egui_wgpu::Renderer,
        device: &wgpu::Device,
        targets: &RenderTargets,
    ) -> Self {
        let views = BufferView::ALL
            .iter()
            .map(|&view| {
                targets
                    .gbuffer_for(view)
                    .colors
                    .iter()
                    .map(|attachment| {
                        renderer.register_native_texture(
                            device,
                            &attachment.view,
                            wgpu::FilterMode::Linear,
                        )
                    })
                    .collect()
            })
            .collect();
        let frame = &targets.gbuffer;
        Self {
            views,
            aspect: frame.height as f32 / frame.width.max(1) as f32,
        }
    }

    fn for_view(&self, view: BufferView) -> &[egui::TextureId] {
        BufferView::ALL
            .iter()
            .position(|&v| v == view)
            .and_then(|i| self.views.get(i))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

pub struct DebugWindow {
    pub open: bool,
    adapter: String,
    frame_times: FrameTimes,
    thumbnails: Option<Thumbnails>,
}

impl DebugWindow {
    pub fn new(adapter: &wgpu::AdapterInfo, thumbnails: Option<Thumbnails>) -> Self {
        Self {
            open: true,
            adapter: format!("{} ({:?})", adapter.name, adapter.backend),
            frame_times: FrameTimes::default(),
            thumbnails,
        }
    }

    pub fn record_frame(&mut self, dt: f32) {
        self.frame_times.record(dt);
    }

    pub fn show(&mut self, ctx: &egui::Context, options: &mut FrameOptions) {
        let mut open = self.open;
        egui::Window::new("Renderer")
            .default_width(360.0)
            .open(&mut open)
            .show(ctx, |ui| {
                ui.label(format!(
                    "FPS: {:.1} ({:.2} ms)",
                    self.frame_times.fps(),
                    self.frame_times.average_ms()
                ));
                ui.label(RichText::new(&self.adapter).weak());
                ui.separator();

                ComboBox::from_label("Render mode")
                    .selected_text(options.mode.label())
                    .show_ui(ui, |ui| {
                        for mode in RenderMode::ALL {
                            ui.selectable_value(&mut options.mode, mode, mode.label());
                        }
                    });

                ui.add_enabled_ui(options.mode == RenderMode::Deferred, |ui| {
                    ComboBox::from_label("Buffer")
                        .selected_text(options.buffer_view.label())
                        .show_ui(ui, |ui| {
                            for view in BufferView::ALL {
                                ui.selectable_value(&mut options.buffer_view, view, view.label());
                            }
                        });

                    ui.checkbox(&mut options.ssao_enabled, "Ambient occlusion");
                    ui.add(Slider::new(&mut options.ssao_radius, 0.05..=3.0).text("SSAO radius"));
                    ui.add(Slider::new(&mut options.ssao_bias, 0.0..=0.2).text("SSAO bias"));

                    if let Some(thumbnails) = &self.thumbnails {
                        ui.separator();
                        let size = vec2(THUMBNAIL_WIDTH, THUMBNAIL_WIDTH * thumbnails.aspect);
                        ui.horizontal_wrapped(|ui| {
                            for (id, name) in thumbnails
                                .for_view(options.buffer_view)
                                .iter()
                                .zip(ATTACHMENT_NAMES)
                            {
                                ui.vertical(|ui| {
                                    ui.label(name);
                                    ui.image((*id, size));
                                });
                            }
                        });
                    }
                });
            });
        self.open = open;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fps_averages_over_the_last_second() {
        let mut times = FrameTimes::default();
        for _ in 0..120 {
            times.record(1.0 / 60.0);
        }
        assert!((times.fps() - 60.0).abs() < 1.0);
        assert!((times.average_ms() - 16.67).abs() < 0.1);
    }

    #[test]
    fn empty_history_reports_zero() {
        let times = FrameTimes::default();
        assert_eq!(times.fps(), 0.0);
        assert_eq!(times.average_ms(), 0.0);
    }

    #[test]
    fn a_single_long_frame_is_kept() {
        let mut times = FrameTimes::default();
        times.record(2.5);
        assert_eq!(times.fps(), 0.4);
    }
}
