//! Glyph rasterization for the text overlay
//!
//! Text is laid out once with `fontdue` and rasterized into a fixed-size
//! coverage buffer, then expanded to white RGBA with alpha = coverage. The
//! buffer never grows: glyph pixels that fall outside it are clipped and
//! counted.

use fontdue::layout::{CoordinateSystem, Layout, LayoutSettings, TextStyle};
use fontdue::{Font, FontSettings};
use std::path::Path;

/// Result type for glyph operations
pub type GlyphResult<T> = Result<T, GlyphError>;

/// Errors that can occur while preparing glyphs
#[derive(Debug, thiserror::Error)]
pub enum GlyphError {
    /// Font data could not be parsed
    #[error("Failed to load font: {0}")]
    LoadError(String),

    /// None of the candidate font files could be read
    #[error("No usable font found (tried: {})", .0.join(", "))]
    NoFont(Vec<String>),

    /// Nothing to rasterize
    #[error("Text is empty")]
    EmptyText,

    /// Target texture has no area
    #[error("Glyph texture extent must be non-zero, got {0}x{1}")]
    ZeroExtent(u32, u32),
}

/// Rasterized text ready for upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlyphTexture {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Tightly packed RGBA8; RGB is white, A is coverage
    pub rgba: Vec<u8>,
    /// Glyph pixels that did not fit and were dropped
    pub clipped_pixels: usize,
}

impl GlyphTexture {
    /// Expand a single-channel coverage buffer to RGBA
    pub fn from_coverage(width: u32, height: u32, coverage: &[u8], clipped_pixels: usize) -> Self {
        let rgba = coverage.iter().flat_map(|&a| [255u8, 255, 255, a]).collect();
        Self {
            width,
            height,
            rgba,
            clipped_pixels,
        }
    }

    /// Alpha of the pixel at `(x, y)`
    pub fn alpha_at(&self, x: u32, y: u32) -> u8 {
        self.rgba[((y * self.width + x) * 4 + 3) as usize]
    }
}

/// Single-channel coverage buffer of fixed size
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoverageBuffer {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl CoverageBuffer {
    /// Zeroed buffer
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            data: vec![0; width as usize * height as usize],
        }
    }

    /// Copy a glyph bitmap with its top-left corner at `(x, y)`
    ///
    /// Overlapping glyphs keep the higher coverage. Returns how many covered
    /// glyph pixels fell outside the buffer.
    pub fn blit(&mut self, x: i32, y: i32, glyph_width: usize, glyph_height: usize, bitmap: &[u8]) -> usize {
        let mut clipped = 0;

        for row in 0..glyph_height {
            for col in 0..glyph_width {
                let value = bitmap[row * glyph_width + col];
                let px = x + col as i32;
                let py = y + row as i32;
                if px < 0 || py < 0 || px >= self.width as i32 || py >= self.height as i32 {
                    if value > 0 {
                        clipped += 1;
                    }
                    continue;
                }

                let index = (py as u32 * self.width + px as u32) as usize;
                self.data[index] = self.data[index].max(value);
            }
        }

        clipped
    }

    /// Coverage at `(x, y)`
    pub fn get(&self, x: u32, y: u32) -> u8 {
        self.data[(y * self.width + x) as usize]
    }

    /// Raw coverage values, row-major
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }
}

/// Lays out and rasterizes text with one font
pub struct GlyphRasterizer {
    font: Font,
}

impl GlyphRasterizer {
    /// Load TrueType/OpenType font data
    pub fn from_bytes(font_data: &[u8]) -> GlyphResult<Self> {
        let font = Font::from_bytes(font_data, FontSettings::default())
            .map_err(|e| GlyphError::LoadError(format!("fontdue error: {}", e)))?;
        Ok(Self { font })
    }

    /// Load a font file
    pub fn from_file<P: AsRef<Path>>(path: P) -> GlyphResult<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|e| GlyphError::LoadError(format!("{}: {}", path.display(), e)))?;
        let rasterizer = Self::from_bytes(&bytes)?;
        log::info!("Loaded font {}", path.display());
        Ok(rasterizer)
    }

    /// First candidate that loads
    pub fn from_candidates(paths: &[String]) -> GlyphResult<Self> {
        for path in paths {
            match Self::from_file(path) {
                Ok(rasterizer) => return Ok(rasterizer),
                Err(e) => log::debug!("Skipping font candidate: {}", e),
            }
        }
        Err(GlyphError::NoFont(paths.to_vec()))
    }

    /// Rasterize `text` at `px` into a `width` x `height` texture
    ///
    /// Lines break on `\n` and wrap at the texture width.
    pub fn rasterize(&self, text: &str, px: f32, width: u32, height: u32) -> GlyphResult<GlyphTexture> {
        if text.trim().is_empty() {
            return Err(GlyphError::EmptyText);
        }
        if width == 0 || height == 0 {
            return Err(GlyphError::ZeroExtent(width, height));
        }

        let mut layout = Layout::new(CoordinateSystem::PositiveYDown);
        layout.reset(&LayoutSettings {
            max_width: Some(width as f32),
            ..LayoutSettings::default()
        });
        layout.append(&[&self.font], &TextStyle::new(text, px, 0));

        let mut coverage = CoverageBuffer::new(width, height);
        let mut clipped = 0;

        for glyph in layout.glyphs() {
            if glyph.width == 0 || glyph.height == 0 {
                continue;
            }
            let (metrics, bitmap) = self.font.rasterize_config(glyph.key);
            clipped += coverage.blit(glyph.x as i32, glyph.y as i32, metrics.width, metrics.height, &bitmap);
        }

        if clipped > 0 {
            log::warn!(
                "{} glyph pixels did not fit the {}x{} texture and were clipped",
                clipped,
                width,
                height
            );
        }

        log::debug!("Rasterized {} glyphs at {}px", layout.glyphs().len(), px);
        Ok(GlyphTexture::from_coverage(width, height, coverage.as_slice(), clipped))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blit_inside() {
        let mut buffer = CoverageBuffer::new(8, 4);
        let clipped = buffer.blit(3, 1, 2, 2, &[10, 20, 30, 40]);

        assert_eq!(clipped, 0);
        assert_eq!(buffer.get(3, 1), 10);
        assert_eq!(buffer.get(4, 1), 20);
        assert_eq!(buffer.get(3, 2), 30);
        assert_eq!(buffer.get(4, 2), 40);
        assert_eq!(buffer.as_slice().iter().filter(|&&a| a > 0).count(), 4);
    }

    #[test]
    fn test_blit_clips_and_counts() {
        let mut buffer = CoverageBuffer::new(4, 4);

        // 3x3 glyph hanging two columns off the right edge and one row off the top
        let clipped = buffer.blit(3, -1, 3, 3, &[255u8; 9]);
        assert_eq!(clipped, 7);
        assert_eq!(buffer.get(3, 0), 255);
        assert_eq!(buffer.get(3, 1), 255);
        assert_eq!(buffer.as_slice().iter().filter(|&&a| a > 0).count(), 2);
    }

    #[test]
    fn test_blit_ignores_empty_pixels_when_counting() {
        let mut buffer = CoverageBuffer::new(2, 2);
        assert_eq!(buffer.blit(-5, -5, 2, 2, &[0u8; 4]), 0);
    }

    #[test]
    fn test_overlapping_glyphs_keep_max() {
        let mut buffer = CoverageBuffer::new(2, 1);
        buffer.blit(0, 0, 2, 1, &[200, 50]);
        buffer.blit(0, 0, 2, 1, &[100, 150]);
        assert_eq!(buffer.as_slice(), &[200, 150]);
    }

    #[test]
    fn test_coverage_expands_to_white_rgba() {
        let texture = GlyphTexture::from_coverage(2, 1, &[0, 128], 0);
        assert_eq!(texture.rgba, vec![255, 255, 255, 0, 255, 255, 255, 128]);
        assert_eq!(texture.alpha_at(1, 0), 128);
    }

    #[test]
    fn test_invalid_font_data() {
        assert!(matches!(
            GlyphRasterizer::from_bytes(b"not a font"),
            Err(GlyphError::LoadError(_))
        ));
    }

    #[test]
    fn test_no_candidates_readable() {
        let paths = vec!["/nonexistent/a.ttf".to_string(), "/nonexistent/b.ttf".to_string()];
        match GlyphRasterizer::from_candidates(&paths) {
            Err(GlyphError::NoFont(tried)) => assert_eq!(tried, paths),
            Err(other) => panic!("unexpected error: {}", other),
            Ok(_) => panic!("nonexistent fonts loaded"),
        }
    }
}
