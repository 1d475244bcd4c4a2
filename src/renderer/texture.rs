// renderer/texture.rs (with mipmaps)

use std::path::Path;

use crate::error::AssetError;

/// RGBA8 pixels decoded from a file or an embedded image.
#[derive(Debug, Clone)]
pub struct DecodedImage {
    pub rgba: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl DecodedImage {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, AssetError> {
        let path = path.as_ref();
        let img = image::open(path).map_err(|source| AssetError::Image {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_dynamic(path.display().to_string(), img)
    }

    pub fn from_bytes(label: &str, bytes: &[u8]) -> Result<Self, AssetError> {
        let img = image::load_from_memory(bytes).map_err(|source| AssetError::Image {
            path: label.to_string(),
            source,
        })?;
        Self::from_dynamic(label.to_string(), img)
    }

    /// Only three- and four-channel images are accepted.
    fn from_dynamic(label: String, img: image::DynamicImage) -> Result<Self, AssetError> {
        let channels = img.color().channel_count();
        if channels != 3 && channels != 4 {
            return Err(AssetError::UnsupportedChannels {
                path: label,
                channels,
            });
        }
        let rgba = img.to_rgba8();
        let (width, height) = rgba.dimensions();
        Ok(Self {
            rgba: rgba.into_raw(),
            width,
            height,
        })
    }
}

struct RgbaTextureSource<'a> {
    data: &'a [u8],
    width: u32,
    height: u32,
    address_mode: wgpu::AddressMode,
    label: Option<&'a str>,
}

#[derive(Debug)]
pub struct Texture {
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
    pub sampler: wgpu::Sampler,
}

impl Texture {
    /// Calculate the number of mip levels for a given texture size
    fn calculate_mip_levels(width: u32, height: u32) -> u32 {
        let max_dimension = width.max(height).max(1);
        u32::BITS - max_dimension.leading_zeros()
    }

    /// Mipmapped, edge-clamped texture from decoded pixels.
    pub fn from_image(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        image: &DecodedImage,
        label: &str,
    ) -> Self {
        log::info!("Uploading texture {} ({}x{})", label, image.width, image.height);
        Self::from_rgba8(
            device,
            queue,
            RgbaTextureSource {
                data: &image.rgba,
                width: image.width,
                height: image.height,
                address_mode: wgpu::AddressMode::ClampToEdge,
                label: Some(label),
            },
        )
    }

    /// Mipmapped texture that tiles, for scrolling distortion maps.
    pub fn tiling(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        image: &DecodedImage,
        label: &str,
    ) -> Self {
        Self::from_rgba8(
            device,
            queue,
            RgbaTextureSource {
                data: &image.rgba,
                width: image.width,
                height: image.height,
                address_mode: wgpu::AddressMode::Repeat,
                label: Some(label),
            },
        )
    }

    /// Create a solid color 1x1 texture (no mipmaps needed)
    pub fn from_color(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        color: [u8; 4],
        label: &str,
    ) -> Self {
        Self::from_rgba8(
            device,
            queue,
            RgbaTextureSource {
                data: &color,
                width: 1,
                height: 1,
                address_mode: wgpu::AddressMode::ClampToEdge,
                label: Some(label),
            },
        )
    }

    /// Create texture from rgba8 data with mipmaps
    fn from_rgba8(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        source: RgbaTextureSource<'_>,
    ) -> Self {
        let format = wgpu::TextureFormat::Rgba8Unorm;
        let mip_level_count = Self::calculate_mip_levels(source.width, source.height);

        let size = wgpu::Extent3d {
            width: source.width,
            height: source.height,
            depth_or_array_layers: 1,
        };

        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: source.label,
            size,
            mip_level_count,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage: wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::COPY_DST
                | wgpu::TextureUsages::RENDER_ATTACHMENT, // Needed for mipmap generation
            view_formats: &[],
        });

        // Upload base mip level (mip 0)
        queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            source.data,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(4 * source.width),
                rows_per_image: Some(source.height),
            },
            size,
        );

        Self::generate_mipmaps(device, queue, &texture, mip_level_count, format);

        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            address_mode_u: source.address_mode,
            address_mode_v: source.address_mode,
            address_mode_w: source.address_mode,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });

        Self {
            texture,
            view,
            sampler,
        }
    }

    /// Small RGBA16F texture sampled with nearest filtering and repeat wrapping.
    pub fn rgba16f_tiled(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        texels: &[[f32; 4]],
        width: u32,
        height: u32,
        label: &str,
    ) -> Self {
        let size = wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        };
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba16Float,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });

        let halves: Vec<u16> = texels
            .iter()
            .flat_map(|texel| texel.iter().map(|v| half::f16::from_f32(*v).to_bits()))
            .collect();
        queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            bytemuck::cast_slice(&halves),
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(8 * width),
                rows_per_image: Some(height),
            },
            size,
        );

        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some(label),
            address_mode_u: wgpu::AddressMode::Repeat,
            address_mode_v: wgpu::AddressMode::Repeat,
            address_mode_w: wgpu::AddressMode::Repeat,
            mag_filter: wgpu::FilterMode::Nearest,
            min_filter: wgpu::FilterMode::Nearest,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        Self {
            texture,
            view,
            sampler,
        }
    }

    /// Generate mipmaps using GPU rendering
    fn generate_mipmaps(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        texture: &wgpu::Texture,
        mip_level_count: u32,
        format: wgpu::TextureFormat,
    ) {
        if mip_level_count <= 1 {
            return;
        }

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Blit Shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("blit.wgsl").into()),
        });

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Blit Bind Group Layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Blit Pipeline Layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Blit Pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: Some("vs_main"),
                buffers: &[],
                compilation_options: Default::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: Some("fs_main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format,
                    blend: None,
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: Default::default(),
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                ..Default::default()
            },
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Mip Sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Mipmap Generator"),
        });

        for target_mip in 1..mip_level_count {
            let mip_view = |mip: u32, usage: wgpu::TextureUsages| {
                texture.create_view(&wgpu::TextureViewDescriptor {
                    label: Some("Mip View"),
                    format: Some(format),
                    dimension: Some(wgpu::TextureViewDimension::D2),
                    aspect: wgpu::TextureAspect::All,
                    base_mip_level: mip,
                    mip_level_count: Some(1),
                    base_array_layer: 0,
                    array_layer_count: Some(1),
                    usage: Some(usage),
                })
            };
            let src_view = mip_view(target_mip - 1, wgpu::TextureUsages::TEXTURE_BINDING);
            let dst_view = mip_view(target_mip, wgpu::TextureUsages::RENDER_ATTACHMENT);

            let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("Mip Bind Group"),
                layout: &bind_group_layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: wgpu::BindingResource::TextureView(&src_view),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: wgpu::BindingResource::Sampler(&sampler),
                    },
                ],
            });

            let mut rpass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Mipmap Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &dst_view,
                    resolve_target: None,
                    depth_slice: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            rpass.set_pipeline(&pipeline);
            rpass.set_bind_group(0, &bind_group, &[]);
            rpass.draw(0..3, 0..1); // Fullscreen triangle
        }

        queue.submit(Some(encoder.finish()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mip_levels_use_the_larger_dimension() {
        assert_eq!(Texture::calculate_mip_levels(1, 1), 1);
        assert_eq!(Texture::calculate_mip_levels(4, 4), 3);
        assert_eq!(Texture::calculate_mip_levels(256, 128), 9);
        assert_eq!(Texture::calculate_mip_levels(300, 200), 9);
        assert_eq!(Texture::calculate_mip_levels(1920, 1080), 11);
    }

    fn encode_png(img: image::DynamicImage) -> Vec<u8> {
        let mut bytes = Vec::new();
        img.write_to(&mut std::io::Cursor::new(&mut bytes), image::ImageFormat::Png)
            .unwrap();
        bytes
    }

    #[test]
    fn rgb_images_expand_to_rgba() {
        let png = encode_png(image::DynamicImage::ImageRgb8(image::RgbImage::from_pixel(
            2,
            3,
            image::Rgb([10, 20, 30]),
        )));
        let decoded = DecodedImage::from_bytes("rgb", &png).unwrap();
        assert_eq!((decoded.width, decoded.height), (2, 3));
        assert_eq!(&decoded.rgba[..4], &[10, 20, 30, 255]);
    }

    #[test]
    fn grayscale_images_are_rejected() {
        let png = encode_png(image::DynamicImage::ImageLuma8(image::GrayImage::new(2, 2)));
        let err = DecodedImage::from_bytes("gray", &png).unwrap_err();
        assert!(matches!(err, AssetError::UnsupportedChannels { channels: 1, .. }));
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(DecodedImage::from_file("does/not/exist.png").is_err());
    }

    // Requires a GPU
    #[test]
    #[ignore]
    fn uploaded_texture_has_full_mip_chain() {
        pollster::block_on(async {
            let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor::default());
            let adapter = instance
                .request_adapter(&wgpu::RequestAdapterOptions::default())
                .await
                .expect("Failed to find adapter");
            let (device, queue) = adapter
                .request_device(&wgpu::DeviceDescriptor::default())
                .await
                .expect("Failed to create device");

            let image = DecodedImage {
                rgba: vec![255u8; 8 * 8 * 4],
                width: 8,
                height: 8,
            };
            let texture = Texture::from_image(&device, &queue, &image, "test");
            assert_eq!(texture.texture.mip_level_count(), 4);

            let white = Texture::from_color(&device, &queue, [255; 4], "white");
            assert_eq!(white.texture.mip_level_count(), 1);
        });
    }
}
