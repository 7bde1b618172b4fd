use std::iter;

use crate::binding::ComputeContract;
use crate::composite::{CompositeStage, Viewport};
use crate::compute::ComputeStage;
use crate::config::RenderConfig;
use crate::dispatch::DispatchGrid;
use crate::error::{Error, Result};
use crate::ray::RayField;
use crate::resources::{ImageResource, StorageBuffer};
use crate::shader::{self, ShaderSources};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FrameState {
    Uninitialized,
    Ready,
    Failed,
    Terminated,
}

/// Every device object the frame loop owns, in allocation order.
#[derive(Default)]
struct FrameResources {
    directions: Option<StorageBuffer>,
    origins: Option<StorageBuffer>,
    image: Option<ImageResource>,
    composite: Option<CompositeStage>,
    compute: Option<ComputeStage>,
}

impl FrameResources {
    /// Releases in reverse allocation order. Each slot is emptied as it goes,
    /// so a second call finds nothing left to release.
    fn release(&mut self) -> usize {
        let mut released = 0;
        if self.compute.take().is_some() {
            released += 1;
        }
        if self.composite.take().is_some() {
            released += 1;
        }
        if let Some(image) = self.image.take() {
            image.release();
            released += 1;
        }
        if let Some(buf) = self.origins.take() {
            buf.release();
            released += 1;
        }
        if let Some(buf) = self.directions.take() {
            buf.release();
            released += 1;
        }
        released
    }
}

/// Drives the compute-then-composite frame.
///
/// `Uninitialized -> Ready -> Terminated`, or `Uninitialized -> Failed` when
/// setup does not complete. Each [`Renderer::update`] records the ray-trace
/// dispatch and the composite draw into one encoder; wgpu orders the
/// storage write before the sampled read, so no barrier is recorded between
/// them.
pub struct Renderer {
    device: wgpu::Device,
    queue: wgpu::Queue,
    config: RenderConfig,
    state: FrameState,
    resources: FrameResources,
    viewport: Viewport,
    frames: u64,
}

impl Renderer {
    pub fn new(device: wgpu::Device, queue: wgpu::Queue, config: RenderConfig) -> Self {
        let viewport = Viewport {
            width: config.width,
            height: config.height,
        };
        Self {
            device,
            queue,
            config,
            state: FrameState::Uninitialized,
            resources: FrameResources::default(),
            viewport,
            frames: 0,
        }
    }

    pub fn state(&self) -> FrameState {
        self.state
    }

    pub fn config(&self) -> &RenderConfig {
        &self.config
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    pub fn image(&self) -> Option<&ImageResource> {
        self.resources.image.as_ref()
    }

    pub fn grid(&self) -> Option<DispatchGrid> {
        self.resources.compute.as_ref().map(ComputeStage::grid)
    }

    /// Sets up with the shader sources named by the config.
    pub async fn initialize(&mut self) -> Result<()> {
        let sources = ShaderSources::resolve(&self.config).await;
        match sources {
            Ok(sources) => self.initialize_with(sources).await,
            Err(err) => {
                log::error!("Could not load shaders: {}", err);
                if self.state == FrameState::Uninitialized {
                    self.state = FrameState::Failed;
                }
                Err(err)
            }
        }
    }

    pub async fn initialize_with(&mut self, sources: ShaderSources) -> Result<()> {
        if self.state != FrameState::Uninitialized {
            return Err(Error::NotReady("initialize may only run once"));
        }

        match self.setup(&sources).await {
            Ok(resources) => {
                self.resources = resources;
                self.state = FrameState::Ready;
                log::info!(
                    "Ready: {}x{} image, fov {}",
                    self.config.width,
                    self.config.height,
                    self.config.fov_degrees
                );
                Ok(())
            }
            Err(err) => {
                log::error!("Setup failed: {}", err);
                self.state = FrameState::Failed;
                Err(err)
            }
        }
    }

    async fn setup(&self, sources: &ShaderSources) -> Result<FrameResources> {
        let config = &self.config;
        config.validate()?;

        let grid = DispatchGrid::new(config.width, config.height, config.work_group_size)?;
        let contract = ComputeContract::for_config(config);

        let vertex = shader::compile(&self.device, "fullscreen vertex", &sources.vertex)?;
        let fragment = shader::compile(&self.device, "texture fragment", &sources.fragment)?;
        let ray_trace = shader::compile(&self.device, "ray trace compute", &sources.compute)?;

        let field = RayField::generate(
            config.width,
            config.height,
            config.fov_degrees,
            &config.look_at,
        )?;
        let (directions, origins) = field.flatten(config.stride)?;

        let directions = StorageBuffer::create(
            &self.device,
            "Direction",
            bytemuck::cast_slice(&directions),
            &contract.directions,
        )?;
        let origins = StorageBuffer::create(
            &self.device,
            "Origin",
            bytemuck::cast_slice(&origins),
            &contract.origins,
        )?;
        let image = ImageResource::create(&self.device, config.width, config.height);

        let composite = CompositeStage::new(
            &self.device,
            &vertex,
            &fragment,
            config.target_format,
            &image,
        )
        .await?;
        let compute = ComputeStage::new(
            &self.device,
            &ray_trace,
            &contract,
            grid,
            &image,
            &directions,
            &origins,
        )
        .await?;

        Ok(FrameResources {
            directions: Some(directions),
            origins: Some(origins),
            image: Some(image),
            composite: Some(composite),
            compute: Some(compute),
        })
    }

    /// Only the viewport follows the window; the image keeps its size.
    pub fn reshape(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        log::debug!("Viewport {}x{}", width, height);
        self.viewport = Viewport { width, height };
    }

    /// Ray traces into the image and composites it onto `target`.
    ///
    /// The viewport set by [`Renderer::reshape`] is clipped to the target's
    /// extent.
    pub fn update(&mut self, time: f32, target: &wgpu::Texture) -> Result<()> {
        if self.state != FrameState::Ready {
            return Err(Error::NotReady("update needs a ready frame loop"));
        }
        let (Some(compute), Some(composite)) =
            (self.resources.compute.as_ref(), self.resources.composite.as_ref())
        else {
            return Err(Error::NotReady("stages are missing"));
        };

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Frame Encoder"),
            });

        let view = target.create_view(&wgpu::TextureViewDescriptor::default());
        let extent = target.size();
        let viewport = self.viewport.clamped_to(extent.width, extent.height);

        compute.dispatch(&mut encoder);
        composite.draw(&mut encoder, &view, viewport);

        self.queue.submit(iter::once(encoder.finish()));
        self.frames += 1;
        log::trace!("Frame {} at {:.3}s", self.frames, time);
        Ok(())
    }

    /// Captures the current contents of the ray-traced image.
    #[cfg(not(target_arch = "wasm32"))]
    pub fn read_image(&self) -> Result<Vec<u8>> {
        let image = self
            .resources
            .image
            .as_ref()
            .ok_or(Error::NotReady("no image allocated"))?;
        image.read_pixels(&self.device, &self.queue)
    }

    /// Releases every device resource and returns how many were released.
    /// Calling it again releases nothing.
    pub fn terminate(&mut self) -> usize {
        let released = self.resources.release();
        if self.state != FrameState::Terminated {
            log::info!("Terminated after {} frames, released {} resources", self.frames, released);
        }
        self.state = FrameState::Terminated;
        released
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        self.terminate();
    }
}
