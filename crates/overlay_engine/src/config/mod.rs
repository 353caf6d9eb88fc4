//! # Overlay Configuration
//!
//! Every tunable of the overlay lives here: window behaviour, renderer
//! settings, shader locations, effect defaults and the text content handed to
//! the glyph rasterizer. Defaults are enough to run; a `.toml` or `.ron` file
//! can override any section.

pub mod watch;

pub use serde::{Deserialize, Serialize};
pub use watch::ConfigWatcher;

use std::path::Path;

use crate::render::effects::EffectKind;

/// Serializable configuration loaded from disk
pub trait Config: Serialize + for<'de> Deserialize<'de> + Default {
    /// Load configuration from a `.toml` or `.ron` file
    fn load_from_file(path: &str) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(ConfigError::Io)?;

        if path.ends_with(".toml") {
            toml::from_str(&contents).map_err(|e| ConfigError::Parse(e.to_string()))
        } else if path.ends_with(".ron") {
            ron::from_str(&contents).map_err(|e| ConfigError::Parse(e.to_string()))
        } else {
            Err(ConfigError::UnsupportedFormat(path.to_string()))
        }
    }

    /// Save configuration to a `.toml` or `.ron` file
    fn save_to_file(&self, path: &str) -> Result<(), ConfigError> {
        let contents = if path.ends_with(".toml") {
            toml::to_string_pretty(self).map_err(|e| ConfigError::Serialize(e.to_string()))?
        } else if path.ends_with(".ron") {
            ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())
                .map_err(|e| ConfigError::Serialize(e.to_string()))?
        } else {
            return Err(ConfigError::UnsupportedFormat(path.to_string()));
        };

        std::fs::write(path, contents).map_err(ConfigError::Io)
    }
}

/// Configuration errors
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Parse error
    #[error("Parse error: {0}")]
    Parse(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialize(String),

    /// Unsupported format
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// A value is outside its accepted range
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Locations of the SPIR-V binaries produced by the build script
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShaderConfig {
    /// Path to the vertex shader SPIR-V file
    pub vertex_shader_path: String,
    /// Path to the fragment shader SPIR-V file
    pub fragment_shader_path: String,
}

impl ShaderConfig {
    /// Create a new shader configuration
    pub fn new(vertex_path: impl Into<String>, fragment_path: impl Into<String>) -> Self {
        Self {
            vertex_shader_path: vertex_path.into(),
            fragment_shader_path: fragment_path.into(),
        }
    }

    /// Create shader config with automatic path resolution
    ///
    /// Tries the usual output locations so the binaries work from the
    /// workspace root as well as from inside `target/`.
    pub fn with_path_resolution(base_vertex: &str, base_fragment: &str) -> Self {
        let shader_dirs = [
            "target/shaders/",
            "../target/shaders/",
            "shaders/",
            "resources/shaders/",
            "./",
        ];

        let resolve = |name: &str| {
            shader_dirs
                .iter()
                .map(|dir| format!("{}{}", dir, name))
                .find(|candidate| Path::new(candidate).exists())
                .unwrap_or_else(|| format!("target/shaders/{}", name))
        };

        Self {
            vertex_shader_path: resolve(base_vertex),
            fragment_shader_path: resolve(base_fragment),
        }
    }

    /// Shaders for the colored triangle
    pub fn triangle() -> Self {
        Self::with_path_resolution("triangle.vert.spv", "triangle.frag.spv")
    }

    /// Shaders for the textured text quad
    pub fn text() -> Self {
        Self::with_path_resolution("text.vert.spv", "text.frag.spv")
    }
}

impl Default for ShaderConfig {
    fn default() -> Self {
        Self::triangle()
    }
}

/// Window collaborator settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowConfig {
    /// Window title
    pub title: String,
    /// Initial width in screen coordinates
    pub width: u32,
    /// Initial height in screen coordinates
    pub height: u32,
    /// Request a transparent framebuffer and an alpha-preserving swapchain
    pub transparent: bool,
    /// Keep the window above all others
    pub always_on_top: bool,
    /// Show window decorations
    pub decorated: bool,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: "Vulkan Triangle".to_string(),
            width: 800,
            height: 600,
            transparent: false,
            always_on_top: false,
            decorated: true,
        }
    }
}

/// Frame loop and device settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RendererConfig {
    /// Number of in-flight frame slots (2 or 3)
    pub max_frames_in_flight: usize,
    /// Whether to enable Vulkan validation layers; `None` follows the build type
    pub enable_validation: Option<bool>,
    /// Color the single attachment is cleared to every frame
    pub clear_color: [f32; 4],
    /// Upper bound on a single swapchain image acquisition, in nanoseconds
    pub acquire_timeout_ns: u64,
}

impl RendererConfig {
    /// Resolve the validation setting against the build type
    pub fn validation_enabled(&self) -> bool {
        self.enable_validation.unwrap_or(cfg!(debug_assertions))
    }
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            max_frames_in_flight: 2,
            enable_validation: None,
            clear_color: [0.0, 0.0, 0.0, 1.0],
            acquire_timeout_ns: 1_000_000_000,
        }
    }
}

/// Initial values for the effect parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EffectConfig {
    /// Starting opacity, clamped into [0.1, 1.0] on use
    pub opacity: f32,
    /// Starting effect
    pub effect: EffectKind,
    /// Outline sampling radius multiplier, in texels
    pub outline_width: f32,
    /// Shadow displacement, in texels (positive = right/down)
    pub shadow_offset: [f32; 2],
}

impl Default for EffectConfig {
    fn default() -> Self {
        Self {
            opacity: 1.0,
            effect: EffectKind::Normal,
            outline_width: 2.0,
            shadow_offset: [3.0, 3.0],
        }
    }
}

/// Text handed to the glyph rasterizer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextConfig {
    /// UTF-8 text, `\n` separates lines
    pub content: String,
    /// Pixel size of the rasterized glyphs
    pub font_size: f32,
    /// Candidate font files, first readable one wins; defaults are system fonts
    pub font_paths: Vec<String>,
    /// Width of the fixed glyph texture
    pub texture_width: u32,
    /// Height of the fixed glyph texture
    pub texture_height: u32,
    /// Half-height of the text quad in normalized device coordinates
    pub quad_scale: f32,
}

impl Default for TextConfig {
    fn default() -> Self {
        Self {
            content: "GPU accelerated overlay\nPress 1-9/0 for opacity\nPress E for effects".to_string(),
            font_size: 48.0,
            font_paths: vec![
                "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf".to_string(),
                "/usr/share/fonts/TTF/DejaVuSans.ttf".to_string(),
                "/System/Library/Fonts/Supplemental/Arial.ttf".to_string(),
                "C:\\Windows\\Fonts\\arial.ttf".to_string(),
            ],
            texture_width: 512,
            texture_height: 256,
            quad_scale: 0.5,
        }
    }
}

/// Complete overlay configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OverlayConfig {
    /// Application name for Vulkan instance creation
    pub application_name: String,
    /// Window settings
    pub window: WindowConfig,
    /// Renderer settings
    pub renderer: RendererConfig,
    /// Shader locations
    pub shaders: ShaderConfig,
    /// Effect defaults
    pub effects: EffectConfig,
    /// Text settings (transparent text variant)
    pub text: TextConfig,
}

impl OverlayConfig {
    /// Defaults for the opaque colored-triangle variant
    pub fn triangle() -> Self {
        Self {
            application_name: "Vulkan Triangle".to_string(),
            window: WindowConfig::default(),
            renderer: RendererConfig::default(),
            shaders: ShaderConfig::triangle(),
            effects: EffectConfig::default(),
            text: TextConfig::default(),
        }
    }

    /// Defaults for the transparent always-on-top text overlay
    pub fn transparent_text() -> Self {
        Self {
            application_name: "Transparent Text Overlay".to_string(),
            window: WindowConfig {
                title: "Transparent Text Overlay (Vulkan)".to_string(),
                transparent: true,
                always_on_top: true,
                ..WindowConfig::default()
            },
            renderer: RendererConfig {
                clear_color: [0.0, 0.0, 0.0, 0.0],
                ..RendererConfig::default()
            },
            shaders: ShaderConfig::text(),
            effects: EffectConfig::default(),
            text: TextConfig::default(),
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.application_name.is_empty() {
            return Err(ConfigError::Invalid("Application name cannot be empty".to_string()));
        }

        if !(2..=3).contains(&self.renderer.max_frames_in_flight) {
            return Err(ConfigError::Invalid(format!(
                "max_frames_in_flight must be 2 or 3, got {}",
                self.renderer.max_frames_in_flight
            )));
        }

        if self.window.width == 0 || self.window.height == 0 {
            return Err(ConfigError::Invalid(format!(
                "Window extent must be non-zero, got {}x{}",
                self.window.width, self.window.height
            )));
        }

        if !(self.text.font_size > 0.0) {
            return Err(ConfigError::Invalid("Font size must be positive".to_string()));
        }

        if self.text.texture_width == 0 || self.text.texture_height == 0 {
            return Err(ConfigError::Invalid("Glyph texture extent must be non-zero".to_string()));
        }

        if self.renderer.clear_color.iter().any(|c| !(0.0..=1.0).contains(c)) {
            return Err(ConfigError::Invalid("Clear color components must be within [0, 1]".to_string()));
        }

        Ok(())
    }
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self::triangle()
    }
}

impl Config for OverlayConfig {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_configs_are_valid() {
        assert!(OverlayConfig::triangle().validate().is_ok());
        assert!(OverlayConfig::transparent_text().validate().is_ok());
    }

    #[test]
    fn test_transparent_variant_clears_to_zero_alpha() {
        let config = OverlayConfig::transparent_text();
        assert!(config.window.transparent);
        assert!(config.window.always_on_top);
        assert_eq!(config.renderer.clear_color[3], 0.0);
    }

    #[test]
    fn test_frame_slot_count_bounds() {
        let mut config = OverlayConfig::triangle();
        config.renderer.max_frames_in_flight = 1;
        assert!(config.validate().is_err());
        config.renderer.max_frames_in_flight = 4;
        assert!(config.validate().is_err());
        config.renderer.max_frames_in_flight = 3;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_window_rejected() {
        let mut config = OverlayConfig::triangle();
        config.window.height = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: OverlayConfig = toml::from_str(
            r#"
            application_name = "Custom"

            [renderer]
            max_frames_in_flight = 3
            clear_color = [0.0, 0.0, 0.0, 0.0]
            acquire_timeout_ns = 500000000
            "#,
        )
        .unwrap();

        assert_eq!(config.application_name, "Custom");
        assert_eq!(config.renderer.max_frames_in_flight, 3);
        assert_eq!(config.renderer.enable_validation, None);
        assert_eq!(config.text.texture_width, 512);
    }

    #[test]
    fn test_default_fonts_are_system_paths() {
        let text = TextConfig::default();
        assert!(!text.font_paths.is_empty());
        for path in &text.font_paths {
            assert!(
                path.starts_with('/') || path.starts_with("C:\\"),
                "{} is not a system font location",
                path
            );
        }
    }

    #[test]
    fn test_unsupported_extension() {
        let result = OverlayConfig::load_from_file("overlay.json");
        assert!(matches!(result, Err(ConfigError::Io(_)) | Err(ConfigError::UnsupportedFormat(_))));
    }
}
