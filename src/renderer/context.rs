use winit::dpi::PhysicalSize;
use winit::window::Window;

use super::targets::DEPTH_FORMAT;
use crate::error::RenderError;
use crate::settings::RenderSettings;

/// Depth buffer for passes that draw straight to the surface.
pub struct Depth {
    pub view: wgpu::TextureView,
}

impl Depth {
    pub fn new(device: &wgpu::Device, size: PhysicalSize<u32>) -> Self {
        let tex = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Surface Depth"),
            size: wgpu::Extent3d {
                width: size.width.max(1),
                height: size.height.max(1),
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: DEPTH_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        });
        let view = tex.create_view(&wgpu::TextureViewDescriptor::default());
        Self { view }
    }
}

pub struct GpuContext {
    pub surface: wgpu::Surface<'static>,
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub config: wgpu::SurfaceConfiguration,
    pub size: PhysicalSize<u32>,
    pub depth: Depth,
    pub adapter_info: wgpu::AdapterInfo,
}

impl GpuContext {
    pub async fn new(
        window: std::sync::Arc<Window>,
        settings: &RenderSettings,
    ) -> Result<Self, RenderError> {
        let size = window.inner_size();
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });
        let surface = instance.create_surface(window)?;
        log::info!("Surface created successfully!");

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await?;

        let adapter_info = adapter.get_info();
        log::info!("Using adapter: {:?}", adapter_info);
        log::info!("Using backend: {:?}", adapter_info.backend);

        // The G-buffer needs more colour bytes per sample than the WebGPU baseline,
        // so ask for whatever the adapter supports.
        let limits = adapter.limits();
        log::info!(
            "Adapter limits: {} colour attachments, {} bytes per sample, {} byte uniform bindings",
            limits.max_color_attachments,
            limits.max_color_attachment_bytes_per_sample,
            limits.max_uniform_buffer_binding_size
        );

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("Device"),
                required_features: wgpu::Features::empty(),
                required_limits: limits,
                experimental_features: wgpu::ExperimentalFeatures::disabled(),
                memory_hints: wgpu::MemoryHints::Performance,
                trace: wgpu::Trace::Off,
            })
            .await?;

        device.on_uncaptured_error(std::sync::Arc::new(|error: wgpu::Error| {
            log::error!("wgpu error: {}", error);
        }));

        let surface_caps = surface.get_capabilities(&adapter);
        let format = surface_caps
            .formats
            .iter()
            .copied()
            .find(|f| !f.is_srgb())
            .or_else(|| surface_caps.formats.first().copied())
            .unwrap_or(wgpu::TextureFormat::Bgra8Unorm);

        let present_mode = settings.present_mode(&surface_caps.present_modes);

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode,
            alpha_mode: surface_caps
                .alpha_modes
                .first()
                .copied()
                .unwrap_or(wgpu::CompositeAlphaMode::Auto),
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &config);

        let depth = Depth::new(&device, size);

        Ok(Self {
            surface,
            device,
            queue,
            config,
            size,
            depth,
            adapter_info,
        })
    }

    /// Reconfigures the surface only. Offscreen targets keep their creation size.
    pub fn resize(&mut self, new_size: PhysicalSize<u32>) {
        if new_size.width == 0 || new_size.height == 0 {
            return;
        }
        self.size = new_size;
        self.config.width = new_size.width;
        self.config.height = new_size.height;
        self.surface.configure(&self.device, &self.config);
        self.depth = Depth::new(&self.device, new_size);
    }

    pub fn surface_format(&self) -> wgpu::TextureFormat {
        self.config.format
    }
}
