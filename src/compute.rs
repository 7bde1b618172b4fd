use crate::binding::{self, ComputeContract};
use crate::dispatch::DispatchGrid;
use crate::error::Result;
use crate::resources::{ImageResource, StorageBuffer};
use crate::shader::{self, CompiledShader, ENTRY_POINT};

/// The ray-trace compute pipeline with its rays and output image bound.
pub struct ComputeStage {
    pipeline: wgpu::ComputePipeline,
    bind_group: wgpu::BindGroup,
    grid: DispatchGrid,
}

impl ComputeStage {
    /// Checks the shader's declared interface against `contract`, then builds
    /// the pipeline and binds `image`, `directions` and `origins` at the
    /// contract's slots.
    pub async fn new(
        device: &wgpu::Device,
        shader: &CompiledShader,
        contract: &ComputeContract,
        grid: DispatchGrid,
        image: &ImageResource,
        directions: &StorageBuffer,
        origins: &StorageBuffer,
    ) -> Result<Self> {
        let reflection = shader::reflect(&shader.ir, ENTRY_POINT)?;
        contract.validate(&reflection)?;

        let layout = binding::ray_trace_group_lay(device, contract);
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Ray trace pipeline layout"),
            bind_group_layouts: &[&layout],
            push_constant_ranges: &[],
        });

        let pipeline = shader::link(device, &shader.label, || {
            device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some("Ray trace pipeline"),
                layout: Some(&pipeline_layout),
                module: &shader.module,
                entry_point: Some(ENTRY_POINT),
                compilation_options: Default::default(),
                cache: None,
            })
        })
        .await?;

        let bind_group = binding::ray_trace_bind_group(
            device,
            contract,
            image.view(),
            directions.binding_resource(),
            origins.binding_resource(),
            &layout,
        );

        log::debug!(
            "Ray trace stage ready: {}x{} groups of {}",
            grid.groups_x,
            grid.groups_y,
            grid.work_group_size
        );
        Ok(Self {
            pipeline,
            bind_group,
            grid,
        })
    }

    pub fn grid(&self) -> DispatchGrid {
        self.grid
    }

    /// Records one pass writing every pixel of the bound image.
    pub fn dispatch(&self, encoder: &mut wgpu::CommandEncoder) {
        let mut compute_pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some("Ray trace pass"),
            ..Default::default()
        });
        compute_pass.set_pipeline(&self.pipeline);
        compute_pass.set_bind_group(binding::GROUP, &self.bind_group, &[]);
        compute_pass.dispatch_workgroups(self.grid.groups_x, self.grid.groups_y, self.grid.groups_z);
    }
}
