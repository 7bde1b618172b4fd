use std::{cell::RefCell, rc::Rc, sync::Arc};

#[cfg(target_arch = "wasm32")]
use wasm_bindgen::prelude::*;

pub mod binding;
pub mod camera;
pub mod composite;
pub mod compute;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod gpu;
pub mod ray;
pub mod renderer;
pub mod resources;
pub mod shader;

pub use crate::config::RenderConfig;
pub use crate::error::{Error, Result};
pub use crate::gpu::Gpu;
pub use crate::renderer::{FrameState, Renderer};

use winit::{
    application::ApplicationHandler,
    event::*,
    event_loop::{ActiveEventLoop, EventLoop, EventLoopProxy},
    window::{Window, WindowId},
};

#[cfg(target_arch = "wasm32")]
use winit::platform::web::{EventLoopExtWebSys, WindowExtWebSys};

pub enum AppEvent {
    InitStateDone { window: Arc<Window> },
    InitFailed(String),
}

/// Window, surface and the frame loop drawing into it.
struct Host {
    window: Arc<Window>,
    surface: wgpu::Surface<'static>,
    surface_config: wgpu::SurfaceConfiguration,
    gpu: Gpu,
    renderer: Renderer,
}

impl Host {
    async fn new(window: Arc<Window>, config: RenderConfig) -> Result<Self> {
        let instance = Gpu::instance();
        let surface = instance.create_surface(Arc::clone(&window))?;
        let gpu = Gpu::new(instance, Some(&surface)).await?;

        let surface_caps = surface.get_capabilities(&gpu.adapter);
        let surface_format = surface_caps
            .formats
            .iter()
            .copied()
            .find(|f| !f.is_srgb())
            .or_else(|| surface_caps.formats.first().copied())
            .ok_or_else(|| Error::Startup("surface reports no formats".into()))?;

        let size = window.inner_size();
        let surface_config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode: surface_caps.present_modes[0],
            alpha_mode: surface_caps.alpha_modes[0],
            desired_maximum_frame_latency: 2,
            view_formats: vec![],
        };
        surface.configure(&gpu.device, &surface_config);

        let mut renderer = Renderer::new(
            gpu.device.clone(),
            gpu.queue.clone(),
            config.with_target_format(surface_format),
        );
        renderer.initialize().await?;
        renderer.reshape(surface_config.width, surface_config.height);

        Ok(Self {
            window,
            surface,
            surface_config,
            gpu,
            renderer,
        })
    }

    fn window(&self) -> &Window {
        &self.window
    }

    fn on_resize(&mut self, new_size: winit::dpi::PhysicalSize<u32>) -> bool {
        log::debug!("w={}, h={}", new_size.width, new_size.height);
        if new_size.width > 0 && new_size.height > 0 {
            self.surface_config.width = new_size.width;
            self.surface_config.height = new_size.height;
            self.surface.configure(&self.gpu.device, &self.surface_config);
            self.renderer.reshape(new_size.width, new_size.height);
            return true;
        }
        false
    }

    fn render(&mut self, time: f32) -> std::result::Result<(), wgpu::SurfaceError> {
        let output = self.surface.get_current_texture()?;
        if let Err(e) = self.renderer.update(time, &output.texture) {
            log::error!("Frame skipped: {}", e);
        }
        output.present();
        Ok(())
    }
}

pub struct App {
    state: Rc<RefCell<Option<Host>>>,
    event_proxy: Arc<EventLoopProxy<AppEvent>>,
    config: RenderConfig,
    surface_configured: bool,
    start: web_time::Instant,
    failure: Option<String>,
}

impl App {
    pub fn new(event_proxy: EventLoopProxy<AppEvent>, config: RenderConfig) -> Self {
        Self {
            state: Rc::new(RefCell::new(None)),
            event_proxy: Arc::new(event_proxy),
            config,
            surface_configured: false,
            start: web_time::Instant::now(),
            failure: None,
        }
    }

    fn terminate(&mut self) {
        if let Ok(mut state) = self.state.try_borrow_mut() {
            if let Some(state) = state.as_mut() {
                state.renderer.terminate();
            }
        }
    }

    fn init_host(&self, window: Window) {
        let window = Arc::new(window);
        let state_clone = self.state.clone();
        let event_proxy_clone = self.event_proxy.clone();
        let config = self.config.clone();

        let init = async move {
            let event = match Host::new(window, config).await {
                Ok(new_state) => {
                    let window = new_state.window.clone();
                    match state_clone.try_borrow_mut() {
                        Ok(mut state_obj) => {
                            *state_obj = Some(new_state);
                            AppEvent::InitStateDone { window }
                        }
                        Err(_) => AppEvent::InitFailed("could not borrow for initialisation".into()),
                    }
                }
                Err(e) => AppEvent::InitFailed(e.to_string()),
            };
            if event_proxy_clone.send_event(event).is_err() {
                log::warn!("Event loop closed before initialisation finished");
            }
        };

        #[cfg(target_arch = "wasm32")]
        wasm_bindgen_futures::spawn_local(init);
        #[cfg(not(target_arch = "wasm32"))]
        pollster::block_on(init);
    }
}

impl ApplicationHandler<AppEvent> for App {
    fn user_event(&mut self, event_loop: &ActiveEventLoop, event: AppEvent) {
        match event {
            AppEvent::InitStateDone { window } => {
                log::info!("State initialisation is done");
                self.surface_configured = false;
                if let Ok(mut state) = self.state.try_borrow_mut() {
                    if let Some(state) = state.as_mut() {
                        self.surface_configured = state.on_resize(window.inner_size());
                    }
                }
                window.request_redraw();
            }
            AppEvent::InitFailed(reason) => {
                log::error!("Initialisation failed: {}", reason);
                self.failure = Some(reason);
                event_loop.exit();
            }
        }
    }

    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.state.borrow().is_some() {
            return;
        }

        let window_attributes = Window::default_attributes()
            .with_title("raygrid")
            .with_inner_size(winit::dpi::PhysicalSize::new(
                self.config.width,
                self.config.height,
            ))
            .with_resizable(false);
        let window = match event_loop.create_window(window_attributes) {
            Ok(window) => window,
            Err(e) => {
                log::error!("Could not create window: {}", e);
                self.failure = Some(e.to_string());
                event_loop.exit();
                return;
            }
        };

        #[cfg(target_arch = "wasm32")]
        {
            let attached = web_sys::window()
                .and_then(|win| win.document())
                .and_then(|doc| doc.body())
                .and_then(|body| {
                    body.append_child(&web_sys::Element::from(window.canvas()?))
                        .ok()?;
                    Some(())
                });
            if attached.is_none() {
                log::error!("Couldn't append canvas to document body.");
            }
        }

        self.init_host(window);
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        window_id: WindowId,
        event: WindowEvent,
    ) {
        match event {
            WindowEvent::CloseRequested
            | WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        state: ElementState::Pressed,
                        physical_key:
                            winit::keyboard::PhysicalKey::Code(winit::keyboard::KeyCode::Escape),
                        ..
                    },
                ..
            } => {
                self.terminate();
                event_loop.exit();
            }

            WindowEvent::Resized(physical_size) => {
                if let Ok(mut state) = self.state.try_borrow_mut() {
                    if let Some(state) = state.as_mut() {
                        if window_id == state.window().id() {
                            self.surface_configured = state.on_resize(physical_size);
                        }
                    }
                }
            }

            WindowEvent::RedrawRequested => {
                let time = self.start.elapsed().as_secs_f32();
                if let Ok(mut state) = self.state.try_borrow_mut() {
                    if let Some(state) = state.as_mut() {
                        if window_id == state.window().id() && self.surface_configured {
                            match state.render(time) {
                                Ok(_) => {}
                                Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                                    log::warn!("Surface lost, reconfiguring");
                                    let size = state.window().inner_size();
                                    self.surface_configured = state.on_resize(size);
                                }
                                Err(wgpu::SurfaceError::OutOfMemory) => {
                                    log::error!("Out of memory");
                                    event_loop.exit();
                                }
                                Err(wgpu::SurfaceError::Timeout) => {
                                    log::warn!("Surface timeout");
                                }
                                Err(wgpu::SurfaceError::Other) => {
                                    log::warn!("Unknown surface error");
                                }
                            };
                        }
                    }
                }
            }
            _ => {}
        };
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Ok(state) = self.state.try_borrow() {
            if let Some(state) = state.as_ref() {
                state.window().request_redraw();
            }
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        self.terminate();
    }
}

/// Opens the window and runs frames until it is closed.
#[cfg(not(target_arch = "wasm32"))]
pub fn run(config: RenderConfig) -> Result<()> {
    let event_loop = EventLoop::<AppEvent>::with_user_event().build()?;
    let mut app = App::new(event_loop.create_proxy(), config);
    event_loop.run_app(&mut app)?;
    match app.failure {
        Some(reason) => Err(Error::Startup(reason)),
        None => Ok(()),
    }
}

#[cfg(target_arch = "wasm32")]
#[wasm_bindgen(start)]
pub fn start() -> std::result::Result<(), JsValue> {
    std::panic::set_hook(Box::new(console_error_panic_hook::hook));
    console_log::init_with_level(log::Level::Info)
        .map_err(|e| JsValue::from_str(&e.to_string()))?;

    let event_loop = EventLoop::<AppEvent>::with_user_event()
        .build()
        .map_err(|e| JsValue::from_str(&e.to_string()))?;
    let my_app = App::new(event_loop.create_proxy(), RenderConfig::default());

    event_loop.spawn_app(my_app);
    Ok(())
}
