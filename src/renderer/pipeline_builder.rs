// src/renderer/pipeline_builder.rs

/// Builder for render pipelines with the defaults every program here shares.
///
/// Vertex and fragment stages come from separate modules because each stage of a
/// program is compiled on its own.
pub struct PipelineBuilder<'a> {
    device: &'a wgpu::Device,
    label: Option<&'a str>,
    layout: &'a wgpu::PipelineLayout,
    vertex_module: &'a wgpu::ShaderModule,
    fragment_module: &'a wgpu::ShaderModule,
    vertex_buffers: Vec<wgpu::VertexBufferLayout<'a>>,
    color_targets: Vec<Option<wgpu::ColorTargetState>>,
    depth_stencil: Option<wgpu::DepthStencilState>,
    primitive: wgpu::PrimitiveState,
}

impl<'a> PipelineBuilder<'a> {
    pub fn new(
        device: &'a wgpu::Device,
        layout: &'a wgpu::PipelineLayout,
        vertex_module: &'a wgpu::ShaderModule,
        fragment_module: &'a wgpu::ShaderModule,
    ) -> Self {
        Self {
            device,
            label: None,
            layout,
            vertex_module,
            fragment_module,
            vertex_buffers: Vec::new(),
            color_targets: Vec::new(),
            depth_stencil: None,
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                cull_mode: Some(wgpu::Face::Back),
                front_face: wgpu::FrontFace::Ccw,
                polygon_mode: wgpu::PolygonMode::Fill,
                ..Default::default()
            },
        }
    }

    pub fn with_label(mut self, label: &'a str) -> Self {
        self.label = Some(label);
        self
    }

    pub fn with_vertex_buffer(mut self, layout: wgpu::VertexBufferLayout<'a>) -> Self {
        self.vertex_buffers.push(layout);
        self
    }

    pub fn with_color_target(
        mut self,
        format: wgpu::TextureFormat,
        blend: Option<wgpu::BlendState>,
    ) -> Self {
        self.color_targets.push(Some(wgpu::ColorTargetState {
            format,
            blend,
            write_mask: wgpu::ColorWrites::ALL,
        }));
        self
    }

    pub fn with_depth_stencil(
        mut self,
        format: wgpu::TextureFormat,
        depth_write: bool,
        depth_compare: wgpu::CompareFunction,
    ) -> Self {
        self.depth_stencil = Some(wgpu::DepthStencilState {
            format,
            depth_write_enabled: depth_write,
            depth_compare,
            stencil: wgpu::StencilState::default(),
            bias: wgpu::DepthBiasState::default(),
        });
        self
    }

    /// Disable backface culling
    pub fn with_no_culling(mut self) -> Self {
        self.primitive.cull_mode = None;
        self
    }

    pub fn build(self) -> wgpu::RenderPipeline {
        self.device
            .create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: self.label,
                layout: Some(self.layout),
                vertex: wgpu::VertexState {
                    module: self.vertex_module,
                    // each stage module holds exactly one entry point
                    entry_point: None,
                    buffers: &self.vertex_buffers,
                    compilation_options: Default::default(),
                },
                fragment: Some(wgpu::FragmentState {
                    module: self.fragment_module,
                    entry_point: None,
                    targets: &self.color_targets,
                    compilation_options: Default::default(),
                }),
                primitive: self.primitive,
                depth_stencil: self.depth_stencil,
                multisample: wgpu::MultisampleState::default(),
                multiview: None,
                cache: None,
            })
    }
}
