//! Error type shared by every setup and frame-loop operation.

/// Why a ray field could not be produced.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RayFieldError {
    #[error("image dimensions must be non-zero, got {width}x{height}")]
    ZeroDimensions { width: u32, height: u32 },

    #[error("stride must be 3 or 4 scalars, got {0}")]
    BadStride(usize),

    #[error("buffer holds {capacity} scalars, {needed} needed")]
    BufferTooSmall { needed: usize, capacity: usize },
}

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Ray field error: {0}")]
    RayField(#[from] RayFieldError),

    #[error("Shader `{label}` failed: {diagnostic}")]
    Shader { label: String, diagnostic: String },

    #[error("Binding mismatch: {0}")]
    BindingMismatch(String),

    #[error("Dispatch error: {0}")]
    Dispatch(String),

    #[error("No suitable GPU adapter")]
    Adapter,

    #[error("Device error: {0}")]
    Device(#[from] wgpu::RequestDeviceError),

    #[error("Surface error: {0}")]
    Surface(#[from] wgpu::CreateSurfaceError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Frame loop is not ready: {0}")]
    NotReady(&'static str),

    #[error("Event loop error: {0}")]
    EventLoop(#[from] winit::error::EventLoopError),

    #[error("Startup failed: {0}")]
    Startup(String),

    #[error("Readback error: {0}")]
    Readback(String),
}

impl Error {
    pub fn shader<L: ToString, D: ToString>(label: L, diagnostic: D) -> Self {
        Error::Shader {
            label: label.to_string(),
            diagnostic: diagnostic.to_string(),
        }
    }

    pub fn binding<T: ToString>(msg: T) -> Self {
        Error::BindingMismatch(msg.to_string())
    }

    pub fn config<T: ToString>(msg: T) -> Self {
        Error::InvalidConfig(msg.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
