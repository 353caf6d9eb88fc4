//! Overlay application lifecycle
//!
//! Wires the window, renderer, frame scheduler and effect parameters into
//! the main loop shared by both binaries.

use std::time::Duration;
use thiserror::Error;

use crate::config::{Config, ConfigError, ConfigWatcher, OverlayConfig, TextConfig};
use crate::render::effects::{EffectParameters, SharedEffectParameters};
use crate::render::frame::{FrameBackend, FrameOutcome, FrameScheduler, FrameStats, SkipReason};
use crate::render::vulkan::{Scene, VulkanError, VulkanRenderer};
use crate::render::window::{InputAction, Window, WindowError, WindowEvent};
use crate::text::{GlyphError, GlyphRasterizer, GlyphTexture};

/// Process exit code for a normal shutdown
pub const EXIT_SUCCESS: u8 = 0;
/// Process exit code for any fatal error
pub const EXIT_FAILURE: u8 = 1;

const MINIMIZED_POLL_INTERVAL: Duration = Duration::from_millis(16);
const CONFIG_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Application-level errors
#[derive(Error, Debug)]
pub enum AppError {
    /// Configuration could not be loaded or is invalid
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Window system failure
    #[error("Window error: {0}")]
    Window(#[from] WindowError),

    /// Device, surface, shader or frame failure
    #[error("Vulkan error: {0}")]
    Vulkan(#[from] VulkanError),

    /// Font loading or text rasterization failure
    #[error("Glyph error: {0}")]
    Glyph(#[from] GlyphError),
}

impl AppError {
    /// Process exit code for this error
    pub fn exit_code(&self) -> u8 {
        EXIT_FAILURE
    }
}

/// Which overlay to run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Variant {
    /// Opaque window with the colored triangle
    Triangle,
    /// Transparent always-on-top window with styled text
    TransparentText,
}

impl Variant {
    /// Built-in configuration for this variant
    pub fn default_config(self) -> OverlayConfig {
        match self {
            Self::Triangle => OverlayConfig::triangle(),
            Self::TransparentText => OverlayConfig::transparent_text(),
        }
    }
}

/// Configuration from `path` when given, the variant defaults otherwise
pub fn load_config(path: Option<&str>, variant: Variant) -> Result<OverlayConfig, AppError> {
    let config = match path {
        Some(path) => {
            log::info!("Loading configuration from {}", path);
            OverlayConfig::load_from_file(path)?
        }
        None => variant.default_config(),
    };
    config.validate()?;
    Ok(config)
}

/// What the main loop should do after an event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopControl {
    /// Keep running
    Continue,
    /// Leave the loop
    Exit,
}

/// Apply one window event to the effect state and scheduler
pub fn handle_event(event: WindowEvent, effects: &SharedEffectParameters, scheduler: &mut FrameScheduler) -> LoopControl {
    match event {
        WindowEvent::Resized(width, height) => {
            scheduler.notify_resize(width, height);
            LoopControl::Continue
        }
        WindowEvent::CloseRequested => LoopControl::Exit,
        WindowEvent::Input(InputAction::SetOpacity(value)) => {
            let opacity = effects.update(|p| {
                p.set_opacity(value);
                p.opacity()
            });
            log::info!("Opacity: {:.0}%", opacity * 100.0);
            LoopControl::Continue
        }
        WindowEvent::Input(InputAction::CycleEffect) => {
            let effect = effects.update(EffectParameters::cycle_effect);
            log::info!("Effect: {}", effect);
            LoopControl::Continue
        }
    }
}

fn rasterize_text(text: &TextConfig) -> Result<GlyphTexture, GlyphError> {
    let rasterizer = GlyphRasterizer::from_candidates(&text.font_paths)?;
    rasterizer.rasterize(&text.content, text.font_size, text.texture_width, text.texture_height)
}

fn build_scene(config: &OverlayConfig, variant: Variant) -> Result<Scene, AppError> {
    match variant {
        Variant::Triangle => Ok(Scene::Triangle),
        Variant::TransparentText => Ok(Scene::Text {
            glyphs: rasterize_text(&config.text)?,
            quad_scale: config.text.quad_scale,
        }),
    }
}

/// New glyphs when a reloaded configuration changes the text section
///
/// `current` is only updated once the new text rasterized. Reload and
/// rasterization failures are logged and keep the text on screen.
pub fn reload_text(current: &mut TextConfig, reloaded: Result<OverlayConfig, ConfigError>) -> Option<GlyphTexture> {
    let config = match reloaded {
        Ok(config) => config,
        Err(e) => {
            log::warn!("Ignoring configuration change: {}", e);
            return None;
        }
    };

    if config.text == *current {
        log::debug!("Text unchanged after reload");
        return None;
    }

    match rasterize_text(&config.text) {
        Ok(glyphs) => {
            *current = config.text;
            Some(glyphs)
        }
        Err(e) => {
            log::warn!("Keeping previous text: {}", e);
            None
        }
    }
}

/// Run an overlay until the window closes or a fatal error occurs
///
/// With a `config_path`, the text overlay re-rasterizes its text whenever
/// the file's text section changes.
pub fn run(config: &OverlayConfig, variant: Variant, config_path: Option<&str>) -> Result<FrameStats, AppError> {
    config.validate()?;
    log::info!("Starting {} ({:?})", config.application_name, variant);

    let mut window = Window::new(&config.window)?;
    let scene = build_scene(config, variant)?;
    let mut renderer = VulkanRenderer::new(&window, config, scene)?;
    let mut scheduler = FrameScheduler::new(renderer.frame_slots(), window.framebuffer_extent())?;
    let effects = SharedEffectParameters::new(EffectParameters::from_config(&config.effects));

    let mut text_source = match (variant, config_path) {
        (Variant::TransparentText, Some(path)) => {
            log::info!("Watching {} for text changes", path);
            Some((ConfigWatcher::new(path, CONFIG_POLL_INTERVAL), config.text.clone()))
        }
        _ => None,
    };

    if variant == Variant::TransparentText {
        log::info!("Keys: 1-9/0 set opacity, E cycles effects, Escape quits");
    }

    let result = main_loop(&mut window, &mut renderer, &mut scheduler, &effects, &mut text_source);

    // Drain the GPU whether the loop ended cleanly or not
    let idle = renderer.wait_idle();

    let stats = scheduler.stats();
    log::info!("Frame stats: {}", stats);
    result?;
    idle?;
    Ok(stats)
}

fn main_loop(
    window: &mut Window,
    renderer: &mut VulkanRenderer,
    scheduler: &mut FrameScheduler,
    effects: &SharedEffectParameters,
    text_source: &mut Option<(ConfigWatcher, TextConfig)>,
) -> Result<(), AppError> {
    while !window.should_close() {
        for event in window.poll() {
            if handle_event(event, effects, scheduler) == LoopControl::Exit {
                log::info!("Close requested");
                window.request_close();
            }
        }
        if window.should_close() {
            break;
        }

        if let Some((watcher, text)) = text_source.as_mut() {
            if let Some(glyphs) = watcher.poll().and_then(|reloaded| reload_text(text, reloaded)) {
                renderer.replace_glyph_texture(&glyphs)?;
                log::info!("Text updated from {}", watcher.path());
            }
        }

        let snapshot = effects.snapshot().to_push_constants();
        match scheduler.tick(renderer, &snapshot) {
            Ok(FrameOutcome::Skipped(SkipReason::Minimized)) => std::thread::sleep(MINIMIZED_POLL_INTERVAL),
            Ok(_) => {}
            Err(e) => {
                log::error!("Frame failed: {}", e);
                return Err(e.into());
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::effects::EffectKind;
    use approx::assert_relative_eq;

    fn setup() -> (SharedEffectParameters, FrameScheduler) {
        (
            SharedEffectParameters::new(EffectParameters::default()),
            FrameScheduler::new(2, (800, 600)).unwrap(),
        )
    }

    #[test]
    fn test_opacity_keys_update_shared_state() {
        let (effects, mut scheduler) = setup();

        let control = handle_event(
            WindowEvent::Input(InputAction::SetOpacity(0.3)),
            &effects,
            &mut scheduler,
        );
        assert_eq!(control, LoopControl::Continue);
        assert_relative_eq!(effects.snapshot().opacity(), 0.3);
    }

    #[test]
    fn test_effect_key_cycles() {
        let (effects, mut scheduler) = setup();

        for expected in [EffectKind::Outline, EffectKind::Shadow, EffectKind::Glow, EffectKind::Normal] {
            handle_event(WindowEvent::Input(InputAction::CycleEffect), &effects, &mut scheduler);
            assert_eq!(effects.snapshot().effect(), expected);
        }
    }

    #[test]
    fn test_resize_schedules_recreation() {
        let (effects, mut scheduler) = setup();
        assert!(!scheduler.recreate_pending());

        handle_event(WindowEvent::Resized(1024, 768), &effects, &mut scheduler);
        assert!(scheduler.recreate_pending());
    }

    #[test]
    fn test_close_exits() {
        let (effects, mut scheduler) = setup();
        assert_eq!(
            handle_event(WindowEvent::CloseRequested, &effects, &mut scheduler),
            LoopControl::Exit
        );
    }

    #[test]
    fn test_variant_defaults() {
        let triangle = Variant::Triangle.default_config();
        assert!(!triangle.window.transparent);

        let text = Variant::TransparentText.default_config();
        assert!(text.window.transparent);
        assert!(text.window.always_on_top);
        assert_relative_eq!(text.renderer.clear_color[3], 0.0);
    }

    #[test]
    fn test_every_error_is_a_failure_exit() {
        let errors = [
            AppError::from(VulkanError::NoSuitableDevice),
            AppError::from(VulkanError::NoAlphaCompositeMode),
            AppError::from(ConfigError::Invalid("bad".to_string())),
            AppError::from(GlyphError::EmptyText),
            AppError::from(WindowError::CreationFailed),
        ];
        for error in errors {
            assert_eq!(error.exit_code(), EXIT_FAILURE);
        }
    }

    #[test]
    fn test_missing_config_file() {
        let err = load_config(Some("/nonexistent/overlay.toml"), Variant::Triangle).unwrap_err();
        assert!(matches!(err, AppError::Config(ConfigError::Io(_))));
    }

    #[test]
    fn test_reload_with_same_text_keeps_texture() {
        let mut current = OverlayConfig::transparent_text().text;
        let mut reloaded = OverlayConfig::transparent_text();
        reloaded.effects.opacity = 0.4;

        assert!(reload_text(&mut current, Ok(reloaded)).is_none());
        assert_eq!(current, OverlayConfig::transparent_text().text);
    }

    #[test]
    fn test_reload_errors_keep_current_text() {
        let mut current = OverlayConfig::transparent_text().text;

        let parse_error = Err(ConfigError::Parse("expected `=`".to_string()));
        assert!(reload_text(&mut current, parse_error).is_none());

        // Changed text, but no font can be loaded to rasterize it
        let mut reloaded = OverlayConfig::transparent_text();
        reloaded.text.content = "Changed".to_string();
        reloaded.text.font_paths = vec!["/nonexistent/font.ttf".to_string()];
        assert!(reload_text(&mut current, Ok(reloaded)).is_none());
        assert_eq!(current, OverlayConfig::transparent_text().text);
    }

    #[test]
    fn test_no_config_file_uses_variant_defaults() {
        let config = load_config(None, Variant::TransparentText).unwrap();
        assert_eq!(config, OverlayConfig::transparent_text());
    }
}
