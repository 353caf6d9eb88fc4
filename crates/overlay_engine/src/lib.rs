//! # Overlay Engine
//!
//! Vulkan rendering core for a small 2D overlay: either a colored triangle
//! in an ordinary window, or styled text in a transparent, always-on-top
//! window.
//!
//! ## Layout
//!
//! - **render::vulkan**: device selection, swapchain lifecycle, render pass,
//!   pipelines and the renderer that ties them together
//! - **render::frame**: the frame state machine and its failure policy
//! - **render::effects**: opacity and text effect parameters pushed to the
//!   fragment shader every frame
//! - **render::window**: GLFW window and key bindings
//! - **text**: font loading and glyph rasterization
//! - **config**: TOML/RON configuration with per-variant defaults
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use overlay_engine::prelude::*;
//!
//! fn main() -> Result<(), AppError> {
//!     overlay_engine::foundation::logging::init();
//!     let config = load_config(None, Variant::TransparentText)?;
//!     let stats = run(&config, Variant::TransparentText, None)?;
//!     println!("{}", stats);
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]

pub mod config;
pub mod foundation;
pub mod render;
pub mod text;

mod app;

pub use app::{handle_event, load_config, reload_text, run, AppError, LoopControl, Variant, EXIT_FAILURE, EXIT_SUCCESS};

/// Common imports for overlay binaries
pub mod prelude {
    pub use crate::{
        config::{Config, ConfigError, OverlayConfig},
        load_config,
        render::{
            effects::{EffectKind, EffectParameters, SharedEffectParameters},
            frame::{FrameScheduler, FrameStats},
            vulkan::{VulkanError, VulkanResult},
            window::{Window, WindowError},
        },
        run, AppError, Variant, EXIT_FAILURE, EXIT_SUCCESS,
    };
}
