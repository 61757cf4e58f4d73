//! Logging initialization

pub use log::{debug, error, info, trace, warn};

/// Initialize the logging system.
///
/// Honours `RUST_LOG`; defaults to `info` so swapchain and device choices are
/// visible without extra setup.
pub fn init() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();
}
