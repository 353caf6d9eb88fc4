//! End-to-end checks that need no GPU
//!
//! Input events flow through the same handler the main loop uses, the
//! resulting push constants go through the CPU copy of the text shader,
//! and the blended output is inspected.

use approx::assert_relative_eq;
use overlay_engine::config::{Config, OverlayConfig};
use overlay_engine::render::effects::reference::{self, CoverageMap, OUTLINE_COLOR};
use overlay_engine::render::effects::{EffectKind, EffectParameters, SharedEffectParameters};
use overlay_engine::render::frame::FrameScheduler;
use overlay_engine::render::geometry::{centroid, interpolate_color, pixel_to_ndc, TRIANGLE_VERTICES};
use overlay_engine::render::window::{InputAction, WindowEvent};
use overlay_engine::text::GlyphTexture;
use overlay_engine::{handle_event, LoopControl};

fn temp_path(name: &str) -> String {
    let dir = std::env::temp_dir().join(format!("overlay_engine_{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    dir.join(name).display().to_string()
}

/// 128x64 RGBA glyph texture with one filled 10x10 block at (40, 20)
fn block_glyphs() -> GlyphTexture {
    let (width, height) = (128u32, 64u32);
    let mut coverage = vec![0u8; (width * height) as usize];
    for y in 20..30 {
        for x in 40..50 {
            coverage[(y * width + x) as usize] = 255;
        }
    }
    GlyphTexture::from_coverage(width, height, &coverage, 0)
}

#[test]
fn test_outline_at_half_opacity_from_key_presses() {
    let effects = SharedEffectParameters::new(EffectParameters::default());
    let mut scheduler = FrameScheduler::new(2, (800, 600)).unwrap();

    // E once selects Outline, 5 sets 50%
    for event in [
        WindowEvent::Input(InputAction::CycleEffect),
        WindowEvent::Input(InputAction::SetOpacity(0.5)),
    ] {
        assert_eq!(handle_event(event, &effects, &mut scheduler), LoopControl::Continue);
    }

    let block = effects.snapshot().to_push_constants();
    assert_eq!(block.effect_type, EffectKind::Outline.id());
    assert_relative_eq!(block.opacity, 0.5);

    let glyphs = block_glyphs();
    let map = CoverageMap::from_rgba(glyphs.width, glyphs.height, &glyphs.rgba);

    // Glyph interior: white text at half alpha
    let inside = reference::shade(&map, 45, 25, &block);
    assert_relative_eq!(inside[0], 1.0);
    assert_relative_eq!(inside[3], 0.5);

    // Just outside the glyph: outline color, outline strength times opacity
    let ring = reference::shade(&map, 39, 25, &block);
    assert_eq!(&ring[..3], &OUTLINE_COLOR);
    assert_relative_eq!(ring[3], 0.8 * 0.5);
}

#[test]
fn test_transparent_overlay_background_alpha_is_zero() {
    let config = OverlayConfig::transparent_text();
    let glyphs = block_glyphs();
    let map = CoverageMap::from_rgba(glyphs.width, glyphs.height, &glyphs.rgba);

    for effect in EffectKind::ALL {
        let params = EffectParameters::new(
            0.7,
            effect,
            config.effects.outline_width,
            config.effects.shadow_offset,
        );
        let frame = reference::render(&map, &params.to_push_constants(), config.renderer.clear_color);

        for (x, y) in [(0u32, 0u32), (127, 0), (0, 63), (127, 63), (100, 50)] {
            let pixel = frame[(y * glyphs.width + x) as usize];
            assert_relative_eq!(pixel[3], 0.0);
        }

        // Text pixels carry the configured opacity
        assert_relative_eq!(frame[(25 * glyphs.width + 45) as usize][3], 0.7);
    }
}

#[test]
fn test_triangle_centroid_is_an_even_blend() {
    let center = centroid(&TRIANGLE_VERTICES);
    let color = interpolate_color(&TRIANGLE_VERTICES, center).unwrap();
    for channel in color {
        assert_relative_eq!(channel, 1.0 / 3.0, epsilon = 1e-5);
    }

    // Middle pixel of an 800x600 framebuffer lies inside the triangle
    let ndc = pixel_to_ndc(400, 300, (800, 600));
    assert!(interpolate_color(&TRIANGLE_VERTICES, ndc).is_some());
    // Top-left corner is background
    assert!(interpolate_color(&TRIANGLE_VERTICES, pixel_to_ndc(0, 0, (800, 600))).is_none());
}

#[test]
fn test_config_round_trip_toml() {
    let path = temp_path("overlay.toml");
    let mut config = OverlayConfig::transparent_text();
    config.effects.effect = EffectKind::Glow;
    config.effects.opacity = 0.4;
    config.renderer.max_frames_in_flight = 3;

    config.save_to_file(&path).unwrap();
    let loaded = OverlayConfig::load_from_file(&path).unwrap();
    assert_eq!(loaded, config);
    loaded.validate().unwrap();

    std::fs::remove_file(&path).unwrap();
}

#[test]
fn test_config_round_trip_ron() {
    let path = temp_path("overlay.ron");
    let mut config = OverlayConfig::triangle();
    config.window.title = "Round trip".to_string();
    config.renderer.enable_validation = Some(false);

    config.save_to_file(&path).unwrap();
    let loaded = OverlayConfig::load_from_file(&path).unwrap();
    assert_eq!(loaded, config);

    std::fs::remove_file(&path).unwrap();
}

#[test]
fn test_loaded_effect_defaults_reach_push_constants() {
    let path = temp_path("effects.toml");
    std::fs::write(
        &path,
        "[effects]\nopacity = 3.0\neffect = \"Shadow\"\noutline_width = 1.5\nshadow_offset = [2.0, 4.0]\n",
    )
    .unwrap();

    let config = OverlayConfig::load_from_file(&path).unwrap();
    let block = EffectParameters::from_config(&config.effects).to_push_constants();

    // Out-of-range opacity from disk is clamped like any other input
    assert_relative_eq!(block.opacity, 1.0);
    assert_eq!(block.effect_type, EffectKind::Shadow.id());
    assert_relative_eq!(block.shadow_offset[1], 4.0);

    std::fs::remove_file(&path).unwrap();
}
