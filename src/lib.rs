pub mod bootstrap;
pub mod cloud;
pub mod config;
pub mod error;
pub mod forge;
pub mod ingress;
pub mod metrics;
pub mod model;
pub mod queue;
pub mod reaper;
pub mod scaleup;
pub mod secrets;

/// Sets up `tracing-subscriber` from `RUST_LOG` (default `info`), the way
/// every binary in this crate initialises logging before doing anything else.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(true)
        .init();
}
