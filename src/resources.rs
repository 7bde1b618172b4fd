use wgpu::util::DeviceExt;

use crate::binding::{StorageBufferContract, IMAGE_FORMAT};
use crate::error::{Error, Result};

/// Host-written, device-read storage buffer bound at a fixed slot.
pub struct StorageBuffer {
    buffer: wgpu::Buffer,
}

impl StorageBuffer {
    /// Uploads `contents` once. The buffer is never written again nor read
    /// back, so `STORAGE` is the only usage requested.
    pub fn create(
        device: &wgpu::Device,
        label: &str,
        contents: &[u8],
        contract: &StorageBufferContract,
    ) -> Result<Self> {
        contract.validate_len(contents.len() as u64)?;
        let buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(label),
            contents,
            usage: wgpu::BufferUsages::STORAGE,
        });
        log::debug!(
            "{} buffer: {} bytes at slot {}",
            label,
            contents.len(),
            contract.slot
        );
        Ok(Self { buffer })
    }

    pub fn size(&self) -> u64 {
        self.buffer.size()
    }

    pub fn binding_resource(&self) -> wgpu::BindingResource<'_> {
        self.buffer.as_entire_binding()
    }

    pub fn release(self) {
        self.buffer.destroy();
    }
}

/// The 2D image written by the compute stage and sampled by the composite
/// stage.
///
/// One texture and one view serve both bindings, so the two stages always
/// see the same storage.
pub struct ImageResource {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    width: u32,
    height: u32,
}

impl ImageResource {
    /// Contents are left uninitialized; the first dispatch overwrites every
    /// pixel.
    pub fn create(device: &wgpu::Device, width: u32, height: u32) -> Self {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Ray trace image"),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: IMAGE_FORMAT,
            usage: wgpu::TextureUsages::STORAGE_BINDING
                | wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        log::debug!("Image: {}x{} {:?}", width, height, IMAGE_FORMAT);
        Self {
            texture,
            view,
            width,
            height,
        }
    }

    pub fn view(&self) -> &wgpu::TextureView {
        &self.view
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Copies the image back to the host as tightly packed RGBA8 rows.
    ///
    /// Blocks until the device has finished all previously submitted work.
    #[cfg(not(target_arch = "wasm32"))]
    pub fn read_pixels(&self, device: &wgpu::Device, queue: &wgpu::Queue) -> Result<Vec<u8>> {
        let unpadded = 4 * self.width;
        let padded = img_bytes_per_row(self.width);

        let staging = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Image readback"),
            size: padded as u64 * self.height as u64,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Readback Encoder"),
        });
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture: &self.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &staging,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(padded),
                    rows_per_image: Some(self.height),
                },
            },
            wgpu::Extent3d {
                width: self.width,
                height: self.height,
                depth_or_array_layers: 1,
            },
        );
        queue.submit(std::iter::once(encoder.finish()));

        let slice = staging.slice(..);
        let (tx, rx) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |res| {
            let _ = tx.send(res);
        });
        let _ = device.poll(wgpu::Maintain::Wait);
        rx.recv()
            .map_err(|e| Error::Readback(e.to_string()))?
            .map_err(|e| Error::Readback(e.to_string()))?;

        let mapped = slice.get_mapped_range();
        let mut pixels = Vec::with_capacity((unpadded * self.height) as usize);
        for row in mapped.chunks_exact(padded as usize) {
            pixels.extend_from_slice(&row[..unpadded as usize]);
        }
        drop(mapped);
        staging.unmap();
        Ok(pixels)
    }

    pub fn release(self) {
        self.texture.destroy();
    }
}

pub fn img_bytes_per_row(width: u32) -> u32 {
    let bytes_per_row = std::mem::size_of::<u32>() as u32 * width;
    let alignment = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
    bytes_per_row.div_ceil(alignment) * alignment
}
