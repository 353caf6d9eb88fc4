//! Transparent, always-on-top text overlay
//!
//! `1`-`9`/`0` set the opacity, `E` cycles Normal/Outline/Shadow/Glow,
//! Escape quits.
//!
//! Usage: `transparent_text [config.toml|config.ron]`
//!
//! Edits to the text section of the config file show up while running.

use overlay_engine::foundation::logging;
use overlay_engine::prelude::*;
use std::process::ExitCode;

fn main() -> ExitCode {
    logging::init();

    let path = std::env::args().nth(1);
    let config = match load_config(path.as_deref(), Variant::TransparentText) {
        Ok(config) => config,
        Err(e) => {
            log::error!("{}", e);
            return ExitCode::from(e.exit_code());
        }
    };

    match run(&config, Variant::TransparentText, path.as_deref()) {
        Ok(stats) => {
            log::info!("Overlay closed after {} frames", stats.presented);
            ExitCode::from(EXIT_SUCCESS)
        }
        Err(e) => {
            log::error!("Overlay failed: {}", e);
            ExitCode::from(e.exit_code())
        }
    }
}
