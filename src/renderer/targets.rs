//! Offscreen render targets.
//!
//! Every target is created once at the display size with its colour attachments in
//! draw-buffer order plus a depth attachment. Targets are validated against the
//! device limits when created; a failed check is logged and the target is still used.

use thiserror::Error;

pub const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth24Plus;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachmentFormat {
    /// 8-bit normalised RGBA.
    Unorm8,
    /// 16-bit float RGBA.
    Float16,
}

impl AttachmentFormat {
    pub fn wgpu(self) -> wgpu::TextureFormat {
        match self {
            AttachmentFormat::Unorm8 => wgpu::TextureFormat::Rgba8Unorm,
            AttachmentFormat::Float16 => wgpu::TextureFormat::Rgba16Float,
        }
    }
}

/// Attachment layout shared by the main, refraction and reflection G-buffers:
/// albedo, normals, positions, view directions, linear depth.
pub const GBUFFER_LAYOUT: [AttachmentFormat; 5] = [
    AttachmentFormat::Unorm8,
    AttachmentFormat::Float16,
    AttachmentFormat::Float16,
    AttachmentFormat::Float16,
    AttachmentFormat::Float16,
];

pub mod gbuffer {
    pub const ALBEDO: usize = 0;
    pub const NORMAL: usize = 1;
    pub const POSITION: usize = 2;
    pub const VIEW_DIR: usize = 3;
    pub const DEPTH: usize = 4;
}

/// Why a target would be rejected when bound for drawing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompletenessError {
    #[error("zero-sized attachments")]
    ZeroSize,
    #[error("dimension {size} exceeds {max}")]
    TooLarge { size: u32, max: u32 },
    #[error("no colour attachments")]
    NoAttachments,
    #[error("{count} colour attachments, device allows {max}")]
    TooManyAttachments { count: usize, max: u32 },
    #[error("{0:?} is not renderable")]
    UnrenderableFormat(wgpu::TextureFormat),
    #[error("{bytes} bytes per sample, device allows {max}")]
    BytesPerSample { bytes: u32, max: u32 },
}

/// Checks what a driver would reject when the target is bound for drawing.
pub fn check_completeness(
    width: u32,
    height: u32,
    formats: &[wgpu::TextureFormat],
    limits: &wgpu::Limits,
) -> Result<(), CompletenessError> {
    if width == 0 || height == 0 {
        return Err(CompletenessError::ZeroSize);
    }
    let largest = width.max(height);
    if largest > limits.max_texture_dimension_2d {
        return Err(CompletenessError::TooLarge {
            size: largest,
            max: limits.max_texture_dimension_2d,
        });
    }
    if formats.is_empty() {
        return Err(CompletenessError::NoAttachments);
    }
    if formats.len() > limits.max_color_attachments as usize {
        return Err(CompletenessError::TooManyAttachments {
            count: formats.len(),
            max: limits.max_color_attachments,
        });
    }

    let mut bytes = 0u32;
    for format in formats {
        let (Some(cost), Some(alignment)) = (
            format.target_pixel_byte_cost(),
            format.target_component_alignment(),
        ) else {
            return Err(CompletenessError::UnrenderableFormat(*format));
        };
        bytes = bytes.div_ceil(alignment) * alignment + cost;
    }
    if bytes > limits.max_color_attachment_bytes_per_sample {
        return Err(CompletenessError::BytesPerSample {
            bytes,
            max: limits.max_color_attachment_bytes_per_sample,
        });
    }
    Ok(())
}

pub struct Attachment {
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
    pub format: wgpu::TextureFormat,
}

pub struct FrameBuffer {
    pub label: String,
    pub width: u32,
    pub height: u32,
    pub colors: Vec<Attachment>,
    pub depth: Attachment,
}

fn create_attachment(
    device: &wgpu::Device,
    label: &str,
    width: u32,
    height: u32,
    format: wgpu::TextureFormat,
    usage: wgpu::TextureUsages,
) -> Attachment {
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some(label),
        size: wgpu::Extent3d {
            width: width.max(1),
            height: height.max(1),
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format,
        usage,
        view_formats: &[],
    });
    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    Attachment {
        texture,
        view,
        format,
    }
}

impl FrameBuffer {
    /// Colour attachments in `formats` order plus a depth attachment, all `width`x`height`.
    pub fn new(
        device: &wgpu::Device,
        label: &str,
        width: u32,
        height: u32,
        formats: &[AttachmentFormat],
    ) -> Self {
        let color_formats: Vec<wgpu::TextureFormat> = formats.iter().map(|f| f.wgpu()).collect();
        match check_completeness(width, height, &color_formats, &device.limits()) {
            Ok(()) => log::info!(
                "Render target {} complete ({} attachments, {}x{})",
                label,
                formats.len(),
                width,
                height
            ),
            Err(err) => log::error!("Render target {} is incomplete: {}", label, err),
        }

        let colors = color_formats
            .iter()
            .enumerate()
            .map(|(i, format)| {
                create_attachment(
                    device,
                    &format!("{label} color {i}"),
                    width,
                    height,
                    *format,
                    wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
                )
            })
            .collect();
        let depth = create_attachment(
            device,
            &format!("{label} depth"),
            width,
            height,
            DEPTH_FORMAT,
            wgpu::TextureUsages::RENDER_ATTACHMENT,
        );

        Self {
            label: label.to_string(),
            width,
            height,
            colors,
            depth,
        }
    }

    pub fn single(device: &wgpu::Device, label: &str, width: u32, height: u32) -> Self {
        Self::new(device, label, width, height, &[AttachmentFormat::Unorm8])
    }

    pub fn color_formats(&self) -> Vec<wgpu::TextureFormat> {
        self.colors.iter().map(|a| a.format).collect()
    }

    pub fn view(&self, attachment: usize) -> &wgpu::TextureView {
        &self.colors[attachment.min(self.colors.len() - 1)].view
    }
}

/// Which G-buffer the debug views and final composite read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BufferView {
    #[default]
    Main,
    Refraction,
    Reflection,
}

impl BufferView {
    pub const ALL: [BufferView; 3] = [BufferView::Main, BufferView::Refraction, BufferView::Reflection];

    pub fn next(self) -> Self {
        match self {
            BufferView::Main => BufferView::Refraction,
            BufferView::Refraction => BufferView::Reflection,
            BufferView::Reflection => BufferView::Main,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            BufferView::Main => "MAIN",
            BufferView::Refraction => "REFRACTION",
            BufferView::Reflection => "REFLECTION",
        }
    }
}

/// All offscreen targets of the deferred pipeline.
pub struct RenderTargets {
    pub gbuffer: FrameBuffer,
    pub refraction: FrameBuffer,
    pub reflection: FrameBuffer,
    pub ssao: FrameBuffer,
    pub ssao_blur: FrameBuffer,
    pub refraction_composite: FrameBuffer,
    pub reflection_composite: FrameBuffer,
    pub water: FrameBuffer,
    /// Sampler for reading attachments: nearest, clamped.
    pub sampler: wgpu::Sampler,
}

impl RenderTargets {
    pub fn new(device: &wgpu::Device, width: u32, height: u32) -> Self {
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Attachment Sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Nearest,
            min_filter: wgpu::FilterMode::Nearest,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        Self {
            gbuffer: FrameBuffer::new(device, "GBuffer", width, height, &GBUFFER_LAYOUT),
            refraction: FrameBuffer::new(device, "WaterRefraction", width, height, &GBUFFER_LAYOUT),
            reflection: FrameBuffer::new(device, "WaterReflection", width, height, &GBUFFER_LAYOUT),
            ssao: FrameBuffer::single(device, "Ssao", width, height),
            ssao_blur: FrameBuffer::single(device, "SsaoBlur", width, height),
            refraction_composite: FrameBuffer::single(
                device,
                "WaterRefractionDeferred",
                width,
                height,
            ),
            reflection_composite: FrameBuffer::single(
                device,
                "WaterReflectionDeferred",
                width,
                height,
            ),
            water: FrameBuffer::single(device, "Water", width, height),
            sampler,
        }
    }

    pub fn gbuffer_for(&self, view: BufferView) -> &FrameBuffer {
        match view {
            BufferView::Main => &self.gbuffer,
            BufferView::Refraction => &self.refraction,
            BufferView::Reflection => &self.reflection,
        }
    }
}
