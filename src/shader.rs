//! WGSL loading, compilation and reflection.
//!
//! Sources are validated with naga before the device sees them so a broken
//! shader surfaces as an [`Error::Shader`] carrying readable diagnostics
//! instead of a device-lost callback. The parsed module is kept around for
//! [`reflect`], which the binding contract checks against.

use std::borrow::Cow;

#[cfg(target_arch = "wasm32")]
use wasm_bindgen::prelude::*;

use crate::config::RenderConfig;
use crate::error::{Error, Result};

pub const VERTEX_FILE: &str = "fullscreen.wgsl";
pub const FRAGMENT_FILE: &str = "texture.wgsl";
pub const COMPUTE_FILE: &str = "raytrace.wgsl";

pub const ENTRY_POINT: &str = "main";

/// Text of the three stages, in WGSL.
#[derive(Clone, Debug)]
pub struct ShaderSources {
    pub vertex: String,
    pub fragment: String,
    pub compute: String,
}

impl Default for ShaderSources {
    fn default() -> Self {
        Self {
            vertex: include_str!("../www/public/shaders/fullscreen.wgsl").to_owned(),
            fragment: include_str!("../www/public/shaders/texture.wgsl").to_owned(),
            compute: include_str!("../www/public/shaders/raytrace.wgsl").to_owned(),
        }
    }
}

impl ShaderSources {
    #[cfg(not(target_arch = "wasm32"))]
    pub fn load_dir(dir: &std::path::Path) -> Result<Self> {
        log::info!("Loading shaders from {}", dir.display());
        Ok(Self {
            vertex: std::fs::read_to_string(dir.join(VERTEX_FILE))?,
            fragment: std::fs::read_to_string(dir.join(FRAGMENT_FILE))?,
            compute: std::fs::read_to_string(dir.join(COMPUTE_FILE))?,
        })
    }

    /// Embedded sources unless the config points at a shader directory. On
    /// the web the directory is a base URL the sources are fetched from.
    pub async fn resolve(config: &RenderConfig) -> Result<Self> {
        match config.shader_dir.as_deref() {
            #[cfg(not(target_arch = "wasm32"))]
            Some(dir) => Self::load_dir(dir),
            #[cfg(target_arch = "wasm32")]
            Some(dir) => Self::fetch(&dir.to_string_lossy()).await,
            None => Ok(Self::default()),
        }
    }

    #[cfg(target_arch = "wasm32")]
    pub async fn fetch(base_url: &str) -> Result<Self> {
        let base = base_url.trim_end_matches('/');
        Ok(Self {
            vertex: fetch_shader(&format!("{base}/{VERTEX_FILE}")).await?,
            fragment: fetch_shader(&format!("{base}/{FRAGMENT_FILE}")).await?,
            compute: fetch_shader(&format!("{base}/{COMPUTE_FILE}")).await?,
        })
    }
}

#[cfg(target_arch = "wasm32")]
async fn fetch_shader(shader_path: &str) -> Result<String> {
    use wasm_bindgen_futures::JsFuture;
    use web_sys::{Request, RequestInit, RequestMode, Response};

    let js_err = |e: JsValue| Error::shader(shader_path, format!("{e:?}"));

    let opts = RequestInit::new();
    opts.set_method("GET");
    opts.set_mode(RequestMode::Cors);

    let request = Request::new_with_str_and_init(shader_path, &opts).map_err(js_err)?;

    let window = web_sys::window().ok_or_else(|| Error::shader(shader_path, "no web window"))?;
    let resp_value = JsFuture::from(window.fetch_with_request(&request))
        .await
        .map_err(js_err)?;
    let resp: Response = resp_value.dyn_into().map_err(js_err)?;

    let text = JsFuture::from(resp.text().map_err(js_err)?)
        .await
        .map_err(js_err)?;
    text.as_string()
        .ok_or_else(|| Error::shader(shader_path, "response is not text"))
}

/// A shader module accepted by both naga and the device.
pub struct CompiledShader {
    pub label: String,
    pub module: wgpu::ShaderModule,
    pub ir: naga::Module,
}

/// Parses and validates `source`, returning the IR or the rendered
/// diagnostic.
pub fn parse(label: &str, source: &str) -> Result<naga::Module> {
    let module = naga::front::wgsl::parse_str(source)
        .map_err(|e| Error::shader(label, e.emit_to_string(source)))?;

    naga::valid::Validator::new(
        naga::valid::ValidationFlags::all(),
        naga::valid::Capabilities::all(),
    )
    .validate(&module)
    .map_err(|e| Error::shader(label, e.emit_to_string(source)))?;

    Ok(module)
}

pub fn compile(device: &wgpu::Device, label: &str, source: &str) -> Result<CompiledShader> {
    let ir = parse(label, source)?;
    let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(label),
        source: wgpu::ShaderSource::Wgsl(Cow::Borrowed(source)),
    });
    log::debug!("Compiled shader `{}`", label);
    Ok(CompiledShader {
        label: label.to_owned(),
        module,
        ir,
    })
}

/// Runs `create` inside a validation error scope, turning a captured device
/// error into [`Error::Shader`].
pub async fn link<T>(device: &wgpu::Device, label: &str, create: impl FnOnce() -> T) -> Result<T> {
    device.push_error_scope(wgpu::ErrorFilter::Validation);
    let value = create();
    match device.pop_error_scope().await {
        Some(err) => Err(Error::shader(label, err)),
        None => Ok(value),
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum ResourceKind {
    StorageBuffer { stride: u32, read_only: bool },
    UniformBuffer,
    StorageImage { format: naga::StorageFormat },
    SampledTexture,
    Sampler,
    Other,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ReflectedBinding {
    pub group: u32,
    pub binding: u32,
    pub name: Option<String>,
    pub kind: ResourceKind,
}

/// Interface of one entry point as the device will see it.
#[derive(Clone, Debug, PartialEq)]
pub struct Reflection {
    pub stage: naga::ShaderStage,
    pub workgroup_size: [u32; 3],
    pub bindings: Vec<ReflectedBinding>,
}

impl Reflection {
    pub fn binding(&self, group: u32, binding: u32) -> Option<&ReflectedBinding> {
        self.bindings
            .iter()
            .find(|b| b.group == group && b.binding == binding)
    }
}

/// Lists the entry point's stage and work-group size along with every bound
/// global of the module.
pub fn reflect(module: &naga::Module, entry_point: &str) -> Result<Reflection> {
    let entry = module
        .entry_points
        .iter()
        .find(|ep| ep.name == entry_point)
        .ok_or_else(|| Error::binding(format!("no entry point named `{entry_point}`")))?;

    let mut bindings = Vec::new();
    for (_, var) in module.global_variables.iter() {
        let Some(binding) = var.binding.as_ref() else {
            continue;
        };

        let kind = match (&var.space, &module.types[var.ty].inner) {
            (naga::AddressSpace::Storage { access }, naga::TypeInner::Array { stride, .. }) => {
                ResourceKind::StorageBuffer {
                    stride: *stride,
                    read_only: !access.contains(naga::StorageAccess::STORE),
                }
            }
            (naga::AddressSpace::Uniform, _) => ResourceKind::UniformBuffer,
            (
                naga::AddressSpace::Handle,
                naga::TypeInner::Image {
                    class: naga::ImageClass::Storage { format, .. },
                    ..
                },
            ) => ResourceKind::StorageImage { format: *format },
            (naga::AddressSpace::Handle, naga::TypeInner::Image { .. }) => {
                ResourceKind::SampledTexture
            }
            (naga::AddressSpace::Handle, naga::TypeInner::Sampler { .. }) => ResourceKind::Sampler,
            _ => ResourceKind::Other,
        };

        bindings.push(ReflectedBinding {
            group: binding.group,
            binding: binding.binding,
            name: var.name.clone(),
            kind,
        });
    }
    bindings.sort_by_key(|b| (b.group, b.binding));

    Ok(Reflection {
        stage: entry.stage,
        workgroup_size: entry.workgroup_size,
        bindings,
    })
}
