use std::path::PathBuf;

use crate::camera::{LookAt, Vector3f};
use crate::error::{Error, Result};

pub const SHADER_DIR_ENV: &str = "RAYGRID_SHADER_DIR";

/// Everything the frame loop needs to know before setup.
#[derive(Clone, Debug)]
pub struct RenderConfig {
    pub width: u32,
    pub height: u32,
    pub work_group_size: u32,
    /// Vertical field of view.
    pub fov_degrees: f32,
    /// Scalars per ray entry on the host side.
    pub stride: usize,
    pub look_at: LookAt,
    pub target_format: wgpu::TextureFormat,
    /// Where to read WGSL sources from instead of the embedded copies. A
    /// base URL on the web.
    pub shader_dir: Option<PathBuf>,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
            work_group_size: 16,
            fov_degrees: 30.0,
            stride: 4,
            look_at: LookAt::default(),
            target_format: wgpu::TextureFormat::Rgba8Unorm,
            shader_dir: None,
        }
    }
}

impl RenderConfig {
    /// Defaults, with the shader directory taken from `RAYGRID_SHADER_DIR`.
    pub fn from_env() -> Self {
        Self {
            shader_dir: std::env::var_os(SHADER_DIR_ENV).map(PathBuf::from),
            ..Self::default()
        }
    }

    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    pub fn with_camera(mut self, eye: Vector3f, center: Vector3f, up: Vector3f) -> Self {
        self.look_at = LookAt::new(eye, center, up);
        self
    }

    pub fn with_target_format(mut self, format: wgpu::TextureFormat) -> Self {
        self.target_format = format;
        self
    }

    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    pub fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(Error::config(format!(
                "image must not be empty ({}x{})",
                self.width, self.height
            )));
        }
        if !(self.fov_degrees > 0.0 && self.fov_degrees < 180.0) {
            return Err(Error::config(format!(
                "field of view must lie in (0, 180), got {}",
                self.fov_degrees
            )));
        }
        if !(3..=4).contains(&self.stride) {
            return Err(Error::config(format!(
                "stride must be 3 or 4, got {}",
                self.stride
            )));
        }
        if self.work_group_size == 0 {
            return Err(Error::config("work-group size must be non-zero"));
        }
        if self.width % self.work_group_size != 0 || self.height % self.work_group_size != 0 {
            return Err(Error::config(format!(
                "{}x{} is not a multiple of the {}-pixel work-group",
                self.width, self.height, self.work_group_size
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = RenderConfig::default();
        config.validate().unwrap();
        assert_eq!(config.pixel_count(), 640 * 480);
    }

    #[test]
    fn rejects_remainder_pixels() {
        let config = RenderConfig::default().with_size(650, 480);
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn rejects_degenerate_fov_and_stride() {
        let mut config = RenderConfig::default();
        config.fov_degrees = 180.0;
        assert!(config.validate().is_err());

        let mut config = RenderConfig::default();
        config.fov_degrees = f32::NAN;
        assert!(config.validate().is_err());

        let mut config = RenderConfig::default();
        config.stride = 2;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_empty_image() {
        assert!(RenderConfig::default().with_size(0, 480).validate().is_err());
    }
}
