//! Bind group layouts for both stages, and the typed contract the host keeps
//! with the compute shader's declared interface.

use crate::config::RenderConfig;
use crate::error::{Error, Result};
use crate::shader::{Reflection, ResourceKind};

/// Bind group used by both stages.
pub const GROUP: u32 = 0;

pub const IMAGE_SLOT: u32 = 0;
pub const DIRECTION_SLOT: u32 = 1;
pub const ORIGIN_SLOT: u32 = 2;

pub const TEXTURE_SLOT: u32 = 0;
pub const SAMPLER_SLOT: u32 = 1;

/// Format of the image the compute stage writes.
pub const IMAGE_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct StorageBufferContract {
    pub slot: u32,
    pub stride_bytes: u32,
    pub element_count: u32,
}

impl StorageBufferContract {
    pub fn size_bytes(&self) -> u64 {
        self.stride_bytes as u64 * self.element_count as u64
    }

    /// The uploaded buffer must hold exactly one entry per pixel.
    pub fn validate_len(&self, bytes: u64) -> Result<()> {
        if bytes != self.size_bytes() {
            return Err(Error::binding(format!(
                "slot {} expects {} entries of {} bytes ({} bytes), got {} bytes",
                self.slot,
                self.element_count,
                self.stride_bytes,
                self.size_bytes(),
                bytes
            )));
        }
        Ok(())
    }

    fn validate(&self, reflection: &Reflection) -> Result<()> {
        let reflected = reflection
            .binding(GROUP, self.slot)
            .ok_or_else(|| Error::binding(format!("shader declares nothing at slot {}", self.slot)))?;
        match reflected.kind {
            ResourceKind::StorageBuffer { stride, .. } if stride == self.stride_bytes => Ok(()),
            ResourceKind::StorageBuffer { stride, .. } => Err(Error::binding(format!(
                "slot {} has a {}-byte element in the shader, host uploads {} bytes",
                self.slot, stride, self.stride_bytes
            ))),
            ref other => Err(Error::binding(format!(
                "slot {} is {:?} in the shader, expected a storage buffer",
                self.slot, other
            ))),
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct StorageImageContract {
    pub slot: u32,
    pub format: wgpu::TextureFormat,
}

impl StorageImageContract {
    fn validate(&self, reflection: &Reflection) -> Result<()> {
        let reflected = reflection
            .binding(GROUP, self.slot)
            .ok_or_else(|| Error::binding(format!("shader declares nothing at slot {}", self.slot)))?;
        let expected = storage_format(self.format)
            .ok_or_else(|| Error::binding(format!("{:?} is not a storage format", self.format)))?;
        match reflected.kind {
            ResourceKind::StorageImage { format } if format == expected => Ok(()),
            ref other => Err(Error::binding(format!(
                "slot {} is {:?} in the shader, expected a {:?} storage image",
                self.slot, other, expected
            ))),
        }
    }
}

/// What the host binds for the ray-trace pass, checked against the compiled
/// shader before any pipeline is built.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ComputeContract {
    pub image: StorageImageContract,
    pub directions: StorageBufferContract,
    pub origins: StorageBufferContract,
    pub workgroup_size: [u32; 3],
}

impl ComputeContract {
    pub fn for_config(config: &RenderConfig) -> Self {
        let element_count = config.width * config.height;
        let stride_bytes = (config.stride * std::mem::size_of::<f32>()) as u32;
        Self {
            image: StorageImageContract {
                slot: IMAGE_SLOT,
                format: IMAGE_FORMAT,
            },
            directions: StorageBufferContract {
                slot: DIRECTION_SLOT,
                stride_bytes,
                element_count,
            },
            origins: StorageBufferContract {
                slot: ORIGIN_SLOT,
                stride_bytes,
                element_count,
            },
            workgroup_size: [config.work_group_size, config.work_group_size, 1],
        }
    }

    pub fn validate(&self, reflection: &Reflection) -> Result<()> {
        if reflection.stage != naga::ShaderStage::Compute {
            return Err(Error::binding(format!(
                "expected a compute entry point, found {:?}",
                reflection.stage
            )));
        }
        if reflection.workgroup_size != self.workgroup_size {
            return Err(Error::binding(format!(
                "shader work-group size is {:?}, host dispatches for {:?}",
                reflection.workgroup_size, self.workgroup_size
            )));
        }
        self.image.validate(reflection)?;
        self.directions.validate(reflection)?;
        self.origins.validate(reflection)
    }
}

/// Texture and sampler slots of the composite fragment stage.
pub fn validate_composite(reflection: &Reflection) -> Result<()> {
    let expect = |slot: u32, kind: ResourceKind| match reflection.binding(GROUP, slot) {
        Some(b) if b.kind == kind => Ok(()),
        Some(b) => Err(Error::binding(format!(
            "fragment slot {} is {:?}, expected {:?}",
            slot, b.kind, kind
        ))),
        None => Err(Error::binding(format!("fragment declares nothing at slot {slot}"))),
    };
    expect(TEXTURE_SLOT, ResourceKind::SampledTexture)?;
    expect(SAMPLER_SLOT, ResourceKind::Sampler)
}

fn storage_format(format: wgpu::TextureFormat) -> Option<naga::StorageFormat> {
    Some(match format {
        wgpu::TextureFormat::Rgba8Unorm => naga::StorageFormat::Rgba8Unorm,
        wgpu::TextureFormat::Rgba8Snorm => naga::StorageFormat::Rgba8Snorm,
        wgpu::TextureFormat::Rgba16Float => naga::StorageFormat::Rgba16Float,
        wgpu::TextureFormat::Rgba32Float => naga::StorageFormat::Rgba32Float,
        wgpu::TextureFormat::Bgra8Unorm => naga::StorageFormat::Bgra8Unorm,
        _ => return None,
    })
}

pub fn storage_buf_entry(binding: u32, size: u64) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Storage { read_only: true },
            has_dynamic_offset: false,
            min_binding_size: wgpu::BufferSize::new(size),
        },
        count: None,
    }
}

pub fn storage_img_entry(binding: u32, format: wgpu::TextureFormat) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::StorageTexture {
            access: wgpu::StorageTextureAccess::WriteOnly,
            format,
            view_dimension: wgpu::TextureViewDimension::D2,
        },
        count: None,
    }
}

pub fn sampled_tex_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Texture {
            multisampled: false,
            view_dimension: wgpu::TextureViewDimension::D2,
            sample_type: wgpu::TextureSampleType::Float { filterable: true },
        },
        count: None,
    }
}

pub fn sampler_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
        count: None,
    }
}

pub fn ray_trace_group_lay(
    device: &wgpu::Device,
    contract: &ComputeContract,
) -> wgpu::BindGroupLayout {
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("Ray trace image and rays"),
        entries: &[
            storage_img_entry(contract.image.slot, contract.image.format),
            storage_buf_entry(contract.directions.slot, contract.directions.size_bytes()),
            storage_buf_entry(contract.origins.slot, contract.origins.size_bytes()),
        ],
    })
}

pub fn ray_trace_bind_group<'a, 'b>(
    device: &wgpu::Device,
    contract: &ComputeContract,
    image_view: &wgpu::TextureView,
    directions_rs: wgpu::BindingResource<'a>,
    origins_rs: wgpu::BindingResource<'b>,
    layout: &wgpu::BindGroupLayout,
) -> wgpu::BindGroup {
    device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("Ray trace bind group"),
        layout,
        entries: &[
            wgpu::BindGroupEntry {
                binding: contract.image.slot,
                resource: wgpu::BindingResource::TextureView(image_view),
            },
            wgpu::BindGroupEntry {
                binding: contract.directions.slot,
                resource: directions_rs,
            },
            wgpu::BindGroupEntry {
                binding: contract.origins.slot,
                resource: origins_rs,
            },
        ],
    })
}

pub fn composite_group_lay(device: &wgpu::Device) -> wgpu::BindGroupLayout {
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("Composite texture"),
        entries: &[sampled_tex_entry(TEXTURE_SLOT), sampler_entry(SAMPLER_SLOT)],
    })
}

pub fn composite_bind_group(
    device: &wgpu::Device,
    texture_view: &wgpu::TextureView,
    sampler: &wgpu::Sampler,
    layout: &wgpu::BindGroupLayout,
) -> wgpu::BindGroup {
    device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("Composite bind group"),
        layout,
        entries: &[
            wgpu::BindGroupEntry {
                binding: TEXTURE_SLOT,
                resource: wgpu::BindingResource::TextureView(texture_view),
            },
            wgpu::BindGroupEntry {
                binding: SAMPLER_SLOT,
                resource: wgpu::BindingResource::Sampler(sampler),
            },
        ],
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shader::{self, ShaderSources, ENTRY_POINT};

    fn reflect_compute(source: &str) -> Reflection {
        let module = shader::parse("compute", source).unwrap();
        shader::reflect(&module, ENTRY_POINT).unwrap()
    }

    #[test]
    fn shipped_compute_shader_matches_contract() {
        let reflection = reflect_compute(&ShaderSources::default().compute);
        ComputeContract::for_config(&RenderConfig::default())
            .validate(&reflection)
            .unwrap();
    }

    #[test]
    fn shipped_fragment_shader_matches_contract() {
        let module = shader::parse("fragment", &ShaderSources::default().fragment).unwrap();
        validate_composite(&shader::reflect(&module, ENTRY_POINT).unwrap()).unwrap();
    }

    #[test]
    fn unpadded_host_stride_is_caught() {
        let reflection = reflect_compute(&ShaderSources::default().compute);
        let mut config = RenderConfig::default();
        config.stride = 3;
        let err = ComputeContract::for_config(&config)
            .validate(&reflection)
            .unwrap_err();
        assert!(matches!(err, Error::BindingMismatch(_)));
    }

    #[test]
    fn work_group_size_mismatch_is_caught() {
        let source = ShaderSources::default()
            .compute
            .replace("@workgroup_size(16, 16, 1)", "@workgroup_size(8, 8, 1)");
        let reflection = reflect_compute(&source);
        assert!(ComputeContract::for_config(&RenderConfig::default())
            .validate(&reflection)
            .is_err());
    }

    #[test]
    fn swapped_slots_are_caught() {
        let source = ShaderSources::default()
            .compute
            .replace("@binding(0) var output_image", "@binding(3) var output_image");
        let reflection = reflect_compute(&source);
        let err = ComputeContract::for_config(&RenderConfig::default())
            .validate(&reflection)
            .unwrap_err();
        assert!(err.to_string().contains("slot 0"));
    }

    #[test]
    fn buffer_length_must_match_pixel_count() {
        let contract = ComputeContract::for_config(&RenderConfig::default());
        assert_eq!(contract.directions.size_bytes(), 640 * 480 * 16);
        contract.directions.validate_len(640 * 480 * 16).unwrap();
        assert!(contract.directions.validate_len(640 * 480 * 12).is_err());
    }
}
