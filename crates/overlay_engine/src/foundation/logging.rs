//! Logging setup

pub use log::{debug, error, info, trace, warn};

/// Level used when `RUST_LOG` is unset
pub const DEFAULT_FILTER: &str = "info";

/// Initialize `env_logger`, honoring `RUST_LOG` and falling back to `info`
///
/// Safe to call more than once; later calls are ignored.
pub fn init() {
    let env = env_logger::Env::default().default_filter_or(DEFAULT_FILTER);
    let _ = env_logger::Builder::from_env(env).format_timestamp_millis().try_init();
}
