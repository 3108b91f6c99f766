//! Logging utilities and structured logging support

pub use log::{debug, info, warn, error, trace};

/// Initialize the logging system
///
/// Honors `RUST_LOG`; defaults to `info` when it is unset.
pub fn init() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .try_init();
}

/// Initialize logging for tests (captured output, repeated calls are fine)
pub fn init_for_tests() {
    let _ = env_logger::builder().is_test(true).try_init();
}
