#[cfg(not(target_arch = "wasm32"))]
fn main() -> Result<(), raygrid::Error> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    raygrid::run(raygrid::RenderConfig::from_env())
}

#[cfg(target_arch = "wasm32")]
fn main() {}
