//! CPU mirror of `text.frag` and the pipeline blend state
//!
//! Evaluated at texel centers with nearest sampling; texels outside the map
//! read zero, like the GPU sampler's transparent border. Used to check effect
//! behaviour and transparency without a device.

use super::EffectPushConstants;
use crate::render::vulkan::BlendMode;

/// Color of unstyled glyph pixels
pub const TEXT_COLOR: [f32; 3] = [1.0, 1.0, 1.0];
/// Outline effect color
pub const OUTLINE_COLOR: [f32; 3] = [1.0, 1.0, 0.0];
/// Glow effect color
pub const GLOW_COLOR: [f32; 3] = [0.2, 0.8, 1.0];

const OUTLINE_RADIUS: i32 = 2;
const OUTLINE_STRENGTH: f32 = 0.8;
const SHADOW_DARKEN: f32 = 0.3;
const SHADOW_STRENGTH: f32 = 0.6;
const GLOW_RADIUS: i32 = 3;
const GLOW_SPACING: f32 = 2.0;

/// Glyph coverage, one alpha value per texel
#[derive(Debug, Clone, PartialEq)]
pub struct CoverageMap {
    width: u32,
    height: u32,
    alpha: Vec<f32>,
}

impl CoverageMap {
    /// Empty map
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            alpha: vec![0.0; width as usize * height as usize],
        }
    }

    /// Alpha channel of an RGBA8 bitmap
    pub fn from_rgba(width: u32, height: u32, rgba: &[u8]) -> Self {
        let alpha = rgba.chunks_exact(4).map(|px| f32::from(px[3]) / 255.0).collect();
        Self { width, height, alpha }
    }

    /// Set one texel's coverage
    pub fn set(&mut self, x: u32, y: u32, value: f32) {
        if x < self.width && y < self.height {
            self.alpha[(y * self.width + x) as usize] = value;
        }
    }

    /// Fill a rectangle of texels
    pub fn fill_rect(&mut self, x0: u32, y0: u32, width: u32, height: u32, value: f32) {
        for y in y0..y0 + height {
            for x in x0..x0 + width {
                self.set(x, y, value);
            }
        }
    }

    /// Nearest texel at a (possibly fractional) texel position; zero outside
    pub fn sample(&self, x: f32, y: f32) -> f32 {
        let (xi, yi) = (x.round(), y.round());
        if xi < 0.0 || yi < 0.0 || xi >= self.width as f32 || yi >= self.height as f32 {
            return 0.0;
        }
        self.alpha[(yi as u32 * self.width + xi as u32) as usize]
    }

    /// Map width in texels
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Map height in texels
    pub fn height(&self) -> u32 {
        self.height
    }
}

fn mix(a: [f32; 3], b: [f32; 3], t: f32) -> [f32; 3] {
    [
        a[0] + (b[0] - a[0]) * t,
        a[1] + (b[1] - a[1]) * t,
        a[2] + (b[2] - a[2]) * t,
    ]
}

fn scale(c: [f32; 3], s: f32) -> [f32; 3] {
    [c[0] * s, c[1] * s, c[2] * s]
}

/// Fragment output (straight alpha) at texel `(x, y)`
pub fn shade(map: &CoverageMap, x: u32, y: u32, pc: &EffectPushConstants) -> [f32; 4] {
    let (fx, fy) = (x as f32, y as f32);
    let alpha = map.sample(fx, fy);

    let (color, coverage) = match pc.effect_type {
        1 => {
            let mut outline: f32 = 0.0;
            for dx in -OUTLINE_RADIUS..=OUTLINE_RADIUS {
                for dy in -OUTLINE_RADIUS..=OUTLINE_RADIUS {
                    let sx = fx + dx as f32 * pc.outline_width;
                    let sy = fy + dy as f32 * pc.outline_width;
                    outline = outline.max(map.sample(sx, sy));
                }
            }
            (mix(OUTLINE_COLOR, TEXT_COLOR, alpha), alpha.max(outline * OUTLINE_STRENGTH))
        }
        2 => {
            let shadow = map.sample(fx - pc.shadow_offset[0], fy - pc.shadow_offset[1]);
            (
                mix(scale(TEXT_COLOR, SHADOW_DARKEN), TEXT_COLOR, alpha),
                alpha.max(shadow * SHADOW_STRENGTH),
            )
        }
        3 => {
            let mut glow = 0.0;
            for dx in -GLOW_RADIUS..=GLOW_RADIUS {
                for dy in -GLOW_RADIUS..=GLOW_RADIUS {
                    let dist = ((dx * dx + dy * dy) as f32).sqrt();
                    glow += map.sample(fx + dx as f32 * GLOW_SPACING, fy + dy as f32 * GLOW_SPACING) / (1.0 + dist);
                }
            }
            (
                mix(scale(GLOW_COLOR, (glow * 0.5).min(1.0)), TEXT_COLOR, alpha),
                alpha.max((glow * 0.3).min(1.0)),
            )
        }
        _ => (TEXT_COLOR, alpha),
    };

    [color[0], color[1], color[2], coverage * pc.opacity]
}

/// Pipeline blend for `mode`; alpha is ONE/ONE_MINUS_SRC_ALPHA in both
pub fn blend(mode: BlendMode, src: [f32; 4], dst: [f32; 4]) -> [f32; 4] {
    let a = src[3];
    let weight = match mode {
        BlendMode::Premultiplied => a,
        BlendMode::Straight => 1.0,
    };
    [
        src[0] * weight + dst[0] * (1.0 - a),
        src[1] * weight + dst[1] * (1.0 - a),
        src[2] * weight + dst[2] * (1.0 - a),
        a + dst[3] * (1.0 - a),
    ]
}

/// Premultiplied pipeline blend: color SRC_ALPHA/ONE_MINUS_SRC_ALPHA
pub fn blend_over(src: [f32; 4], dst: [f32; 4]) -> [f32; 4] {
    blend(BlendMode::Premultiplied, src, dst)
}

/// Whole frame at texture resolution, blended over `clear`
pub fn render(map: &CoverageMap, pc: &EffectPushConstants, clear: [f32; 4]) -> Vec<[f32; 4]> {
    (0..map.height)
        .flat_map(|y| (0..map.width).map(move |x| (x, y)))
        .map(|(x, y)| blend_over(shade(map, x, y, pc), clear))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::effects::{EffectKind, EffectParameters};
    use approx::assert_relative_eq;

    const CLEAR: [f32; 4] = [0.0, 0.0, 0.0, 0.0];

    /// 64x32 map with a solid 8x8 "glyph" at (20, 12)
    fn glyph_map() -> CoverageMap {
        let mut map = CoverageMap::new(64, 32);
        map.fill_rect(20, 12, 8, 8, 1.0);
        map
    }

    fn block(effect: EffectKind, opacity: f32) -> EffectPushConstants {
        let mut params = EffectParameters::new(opacity, effect, 1.0, [3.0, 3.0]);
        params.set_effect(effect);
        params.to_push_constants()
    }

    #[test]
    fn test_normal_is_white_times_opacity() {
        let map = glyph_map();
        let pc = block(EffectKind::Normal, 0.5);

        let inside = shade(&map, 23, 15, &pc);
        assert_eq!(&inside[..3], &TEXT_COLOR);
        assert_relative_eq!(inside[3], 0.5);

        assert_relative_eq!(shade(&map, 2, 2, &pc)[3], 0.0);
    }

    #[test]
    fn test_outline_surrounds_glyph() {
        let map = glyph_map();
        let pc = block(EffectKind::Outline, 1.0);

        // One texel left of the glyph: outside coverage, within the 5x5 window
        let edge = shade(&map, 19, 15, &pc);
        assert_eq!(&edge[..3], &OUTLINE_COLOR);
        assert_relative_eq!(edge[3], 0.8);

        // Glyph interior keeps the text color
        let inside = shade(&map, 23, 15, &pc);
        assert_eq!(&inside[..3], &TEXT_COLOR);
        assert_relative_eq!(inside[3], 1.0);

        // Beyond the radius nothing is drawn
        assert_relative_eq!(shade(&map, 16, 15, &pc)[3], 0.0);
    }

    #[test]
    fn test_outline_width_scales_radius() {
        let map = glyph_map();
        let mut pc = block(EffectKind::Outline, 1.0);
        pc.outline_width = 2.0;
        // Four texels away is reachable with offsets of 2 texels
        assert_relative_eq!(shade(&map, 16, 15, &pc)[3], 0.8);
    }

    #[test]
    fn test_shadow_sits_beneath_text() {
        let map = glyph_map();
        let pc = block(EffectKind::Shadow, 1.0);

        // Past the glyph's bottom-right corner, inside the shifted copy
        let shadow = shade(&map, 29, 21, &pc);
        assert_relative_eq!(shadow[0], 0.3);
        assert_relative_eq!(shadow[3], 0.6);

        // Direct sample always wins over the shadow
        let overlap = shade(&map, 26, 18, &pc);
        assert_eq!(&overlap[..3], &TEXT_COLOR);
        assert_relative_eq!(overlap[3], 1.0);

        // Opposite side has no shadow
        assert_relative_eq!(shade(&map, 18, 10, &pc)[3], 0.0);
    }

    #[test]
    fn test_glow_fades_with_distance() {
        let map = glyph_map();
        let pc = block(EffectKind::Glow, 1.0);

        let near = shade(&map, 18, 15, &pc)[3];
        let far = shade(&map, 14, 15, &pc)[3];
        assert!(near > 0.0);
        assert!(far > 0.0);
        assert!(near >= far);

        let color = shade(&map, 18, 15, &pc);
        assert!(color[2] > color[0], "glow should be tinted blue: {:?}", color);

        assert_relative_eq!(shade(&map, 60, 2, &pc)[3], 0.0);
    }

    #[test]
    fn test_background_stays_transparent_for_every_effect() {
        let map = glyph_map();
        for effect in EffectKind::ALL {
            let frame = render(&map, &block(effect, 0.5), CLEAR);
            assert_relative_eq!(frame[0][3], 0.0);
            assert_relative_eq!(frame[(31 * 64 + 63) as usize][3], 0.0);

            // Glyph interior is visible at the requested opacity
            assert_relative_eq!(frame[(15 * 64 + 23) as usize][3], 0.5);
        }
    }

    #[test]
    fn test_blend_over_opaque_clear() {
        let out = blend_over([1.0, 0.0, 0.0, 0.5], [0.0, 0.0, 1.0, 1.0]);
        assert_relative_eq!(out[0], 0.5);
        assert_relative_eq!(out[2], 0.5);
        assert_relative_eq!(out[3], 1.0);
    }

    #[test]
    fn test_post_multiplied_compositor_sees_same_color() {
        // Half-covered glyph edge over the transparent clear
        let src = [1.0, 1.0, 1.0, 0.5];

        let pre = blend(BlendMode::Premultiplied, src, CLEAR);
        let straight = blend(BlendMode::Straight, src, CLEAR);
        assert_relative_eq!(straight[0], 1.0);
        assert_relative_eq!(straight[3], pre[3]);

        // POST_MULTIPLIED compositors multiply color by alpha themselves
        for channel in 0..3 {
            assert_relative_eq!(straight[channel] * straight[3], pre[channel]);
        }
    }

    #[test]
    fn test_from_rgba_reads_alpha() {
        let map = CoverageMap::from_rgba(2, 1, &[255, 255, 255, 0, 255, 255, 255, 255]);
        assert_relative_eq!(map.sample(0.0, 0.0), 0.0);
        assert_relative_eq!(map.sample(1.0, 0.0), 1.0);
        assert_relative_eq!(map.sample(2.0, 0.0), 0.0);
    }
}
