//! Colored triangle in an opaque window
//!
//! Usage: `triangle [config.toml|config.ron]`

use overlay_engine::foundation::logging;
use overlay_engine::prelude::*;
use std::process::ExitCode;

fn main() -> ExitCode {
    logging::init();

    let path = std::env::args().nth(1);
    let result = load_config(path.as_deref(), Variant::Triangle)
        .and_then(|config| run(&config, Variant::Triangle, path.as_deref()));

    match result {
        Ok(_) => ExitCode::from(EXIT_SUCCESS),
        Err(e) => {
            log::error!("Triangle demo failed: {}", e);
            ExitCode::from(e.exit_code())
        }
    }
}
