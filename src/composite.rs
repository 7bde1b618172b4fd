use crate::binding;
use crate::error::Result;
use crate::resources::ImageResource;
use crate::shader::{self, CompiledShader, ENTRY_POINT};

/// Viewport rectangle applied to the composite draw.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Viewport {
    /// Shrinks the rectangle to fit a `width` x `height` target. A viewport
    /// reaching past its attachment is a validation error.
    pub fn clamped_to(self, width: u32, height: u32) -> Self {
        Self {
            width: self.width.min(width),
            height: self.height.min(height),
        }
    }
}

/// Full-screen pass sampling the ray-traced image.
pub struct CompositeStage {
    pipeline: wgpu::RenderPipeline,
    bind_group: wgpu::BindGroup,
    // Kept alive alongside the bind group that references it.
    _sampler: wgpu::Sampler,
}

impl CompositeStage {
    pub async fn new(
        device: &wgpu::Device,
        vertex: &CompiledShader,
        fragment: &CompiledShader,
        target_format: wgpu::TextureFormat,
        image: &ImageResource,
    ) -> Result<Self> {
        binding::validate_composite(&shader::reflect(&fragment.ir, ENTRY_POINT)?)?;

        let layout = binding::composite_group_lay(device);
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Composite pipeline layout"),
            bind_group_layouts: &[&layout],
            push_constant_ranges: &[],
        });

        let pipeline = shader::link(device, &fragment.label, || {
            device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some("Composite pipeline"),
                layout: Some(&pipeline_layout),
                vertex: wgpu::VertexState {
                    module: &vertex.module,
                    entry_point: Some(ENTRY_POINT),
                    buffers: &[],
                    compilation_options: Default::default(),
                },
                fragment: Some(wgpu::FragmentState {
                    module: &fragment.module,
                    entry_point: Some(ENTRY_POINT),
                    targets: &[Some(wgpu::ColorTargetState {
                        format: target_format,
                        blend: Some(wgpu::BlendState::REPLACE),
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                    compilation_options: Default::default(),
                }),
                primitive: wgpu::PrimitiveState {
                    topology: wgpu::PrimitiveTopology::TriangleStrip,
                    strip_index_format: None,
                    front_face: wgpu::FrontFace::Ccw,
                    cull_mode: None,
                    polygon_mode: wgpu::PolygonMode::Fill,
                    unclipped_depth: false,
                    conservative: false,
                },
                depth_stencil: None,
                multisample: wgpu::MultisampleState::default(),
                multiview: None,
                cache: None,
            })
        })
        .await?;

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Composite sampler"),
            address_mode_u: wgpu::AddressMode::Repeat,
            address_mode_v: wgpu::AddressMode::Repeat,
            address_mode_w: wgpu::AddressMode::Repeat,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        let bind_group = binding::composite_bind_group(device, image.view(), &sampler, &layout);

        Ok(Self {
            pipeline,
            bind_group,
            _sampler: sampler,
        })
    }

    /// Records a render pass drawing the image over `target`.
    pub fn draw(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        target: &wgpu::TextureView,
        viewport: Viewport,
    ) {
        let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Composite pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: target,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
        });
        render_pass.set_viewport(
            0.0,
            0.0,
            viewport.width as f32,
            viewport.height as f32,
            0.0,
            1.0,
        );
        render_pass.set_pipeline(&self.pipeline);
        render_pass.set_bind_group(binding::GROUP, &self.bind_group, &[]);
        render_pass.draw(0..4, 0..1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn viewport_never_exceeds_the_target() {
        let viewport = Viewport {
            width: 1280,
            height: 960,
        };
        assert_eq!(
            viewport.clamped_to(640, 480),
            Viewport {
                width: 640,
                height: 480
            }
        );
        assert_eq!(
            viewport.clamped_to(2000, 600),
            Viewport {
                width: 1280,
                height: 600
            }
        );

        let small = Viewport {
            width: 320,
            height: 240,
        };
        assert_eq!(small.clamped_to(640, 480), small);
    }
}
