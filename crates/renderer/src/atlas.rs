//! CPU side of the glyph atlas: rasterising a gradient into a strip image.
//!
//! The strip is `cell_size × glyph_count` pixels wide and `cell_size` tall.
//! Glyph *i* sits on a baseline shared by every cell, with the font's line box
//! centred vertically and the glyph's advance centred horizontally. Glyphs are
//! drawn white on an opaque black background so the fragment shader can treat
//! the red channel as coverage.

use std::path::{Path, PathBuf};

use fontdue::{Font, FontSettings};
use image::{Rgba, RgbaImage};
use tracing::{debug, warn};

/// Pixel size of one atlas cell unless configured otherwise.
pub const DEFAULT_CELL_SIZE: u32 = 64;

/// Glyphs are drawn at this fraction of the cell size.
pub const GLYPH_SCALE: f32 = 0.8;

const PRIMARY_FONT_CANDIDATES: &[&str] = &[
    "/usr/share/fonts/TTF/DejaVuSansMono.ttf",
    "/usr/share/fonts/dejavu/DejaVuSansMono.ttf",
    "/usr/share/fonts/truetype/dejavu/DejaVuSansMono.ttf",
    "/usr/share/fonts/noto/NotoSansMono-Regular.ttf",
    "/usr/share/fonts/truetype/noto/NotoSansMono-Regular.ttf",
    "/usr/share/fonts/TTF/JetBrainsMono-Regular.ttf",
    "/usr/share/fonts/liberation/LiberationMono-Regular.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationMono-Regular.ttf",
    "/System/Library/Fonts/Menlo.ttc",
    "C:\\Windows\\Fonts\\consola.ttf",
];

const FALLBACK_FONT_CANDIDATES: &[&str] = &[
    "/usr/share/fonts/noto/NotoSansSymbols-Regular.ttf",
    "/usr/share/fonts/noto/NotoSansSymbols2-Regular.ttf",
    "/usr/share/fonts/truetype/noto/NotoSansSymbols2-Regular.ttf",
    "/usr/share/fonts/noto/NotoEmoji-Regular.ttf",
    "/usr/share/fonts/truetype/noto/NotoEmoji-Regular.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/System/Library/Fonts/Apple Symbols.ttf",
    "C:\\Windows\\Fonts\\seguisym.ttf",
];

#[derive(Debug, thiserror::Error)]
pub enum AtlasError {
    #[error("gradient contains no glyphs")]
    EmptyGradient,
    #[error("atlas cell size must be at least 1 pixel")]
    ZeroCellSize,
    #[error("no usable monospace font found (tried {0} locations)")]
    NoFont(usize),
    #[error("failed to load font {path}: {reason}")]
    FontLoad { path: PathBuf, reason: String },
    #[error("atlas of {width}px exceeds the GPU texture limit of {limit}px")]
    TooWide { width: u32, limit: u32 },
}

/// Coverage bitmap for a single codepoint plus its placement metrics.
///
/// `xmin` is the offset of the bitmap's left edge from the pen position and
/// `ymin` the offset of its bottom edge from the baseline, positive upwards.
#[derive(Debug, Clone, PartialEq)]
pub struct GlyphBitmap {
    pub width: usize,
    pub height: usize,
    pub xmin: i32,
    pub ymin: i32,
    pub advance: f32,
    pub coverage: Vec<u8>,
}

/// Vertical extent of a line of text; `descent` is negative below the baseline.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LineExtent {
    pub ascent: f32,
    pub descent: f32,
}

impl LineExtent {
    /// Proportions of a typical Latin monospace face.
    pub fn typical(px: f32) -> Self {
        Self {
            ascent: px * 0.75,
            descent: px * -0.25,
        }
    }
}

/// Turns a codepoint into a coverage bitmap at a given pixel size.
pub trait GlyphRasterizer {
    /// Returns `None` when no loaded font can draw `ch`.
    fn rasterize(&mut self, ch: char, px: f32) -> Option<GlyphBitmap>;

    /// Line box used to place the shared baseline.
    fn line_extent(&mut self, px: f32) -> LineExtent {
        LineExtent::typical(px)
    }
}

/// `fontdue`-backed rasteriser with lazily loaded symbol fallbacks.
pub struct FontStack {
    primary: Font,
    fallbacks: Vec<Font>,
    fallback_paths: Vec<PathBuf>,
}

impl FontStack {
    /// Loads the primary font from `preferred` if given, otherwise from the
    /// first well-known system location that parses.
    pub fn discover(preferred: Option<&Path>) -> Result<Self, AtlasError> {
        if let Some(path) = preferred {
            let primary = load_font(path)?;
            return Ok(Self::with_primary(primary));
        }

        for candidate in PRIMARY_FONT_CANDIDATES {
            let path = Path::new(candidate);
            if !path.exists() {
                continue;
            }
            match load_font(path) {
                Ok(font) => {
                    debug!(font = %path.display(), "loaded atlas font");
                    return Ok(Self::with_primary(font));
                }
                Err(err) => warn!(error = %err, "skipping unusable font"),
            }
        }
        Err(AtlasError::NoFont(PRIMARY_FONT_CANDIDATES.len()))
    }

    fn with_primary(primary: Font) -> Self {
        Self {
            primary,
            fallbacks: Vec::new(),
            fallback_paths: FALLBACK_FONT_CANDIDATES.iter().map(PathBuf::from).collect(),
        }
    }

    fn load_fallbacks(&mut self) {
        let paths = std::mem::take(&mut self.fallback_paths);
        for path in paths.iter().filter(|path| path.exists()) {
            match load_font(path) {
                Ok(font) => self.fallbacks.push(font),
                Err(err) => debug!(error = %err, "ignoring fallback font"),
            }
        }
        debug!(count = self.fallbacks.len(), "loaded fallback fonts");
    }
}

impl GlyphRasterizer for FontStack {
    fn rasterize(&mut self, ch: char, px: f32) -> Option<GlyphBitmap> {
        let font = if self.primary.lookup_glyph_index(ch) != 0 {
            &self.primary
        } else {
            if !self.fallback_paths.is_empty() {
                self.load_fallbacks();
            }
            self.fallbacks
                .iter()
                .find(|font| font.lookup_glyph_index(ch) != 0)?
        };
        let (metrics, coverage) = font.rasterize(ch, px);
        Some(GlyphBitmap {
            width: metrics.width,
            height: metrics.height,
            xmin: metrics.xmin,
            ymin: metrics.ymin,
            advance: metrics.advance_width,
            coverage,
        })
    }

    fn line_extent(&mut self, px: f32) -> LineExtent {
        self.primary
            .horizontal_line_metrics(px)
            .map(|line| LineExtent {
                ascent: line.ascent,
                descent: line.descent,
            })
            .unwrap_or_else(|| LineExtent::typical(px))
    }
}

fn load_font(path: &Path) -> Result<Font, AtlasError> {
    let bytes = std::fs::read(path).map_err(|err| AtlasError::FontLoad {
        path: path.to_path_buf(),
        reason: err.to_string(),
    })?;
    Font::from_bytes(bytes, FontSettings::default()).map_err(|reason| AtlasError::FontLoad {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    })
}

/// Rasterises `glyphs` into a horizontal strip.
pub fn build_atlas_image<R>(
    glyphs: &[String],
    cell_size: u32,
    rasterizer: &mut R,
) -> Result<RgbaImage, AtlasError>
where
    R: GlyphRasterizer + ?Sized,
{
    if glyphs.is_empty() {
        return Err(AtlasError::EmptyGradient);
    }
    if cell_size == 0 {
        return Err(AtlasError::ZeroCellSize);
    }

    let width = cell_size * glyphs.len() as u32;
    let mut image = RgbaImage::from_pixel(width, cell_size, Rgba([0, 0, 0, 255]));
    let px = cell_size as f32 * GLYPH_SCALE;
    let baseline = baseline_row(cell_size, rasterizer.line_extent(px));

    for (index, glyph) in glyphs.iter().enumerate() {
        let origin_x = index as u32 * cell_size;
        // Combining marks and variation selectors share the cell with their base.
        for ch in glyph.chars().filter(|ch| !is_zero_width(*ch)) {
            match rasterizer.rasterize(ch, px) {
                Some(bitmap) => blit_on_baseline(&mut image, &bitmap, origin_x, cell_size, baseline),
                None if ch.is_whitespace() => {}
                None => warn!(glyph = %glyph, codepoint = %ch.escape_unicode(), "glyph missing from fonts"),
            }
        }
    }

    Ok(image)
}

fn is_zero_width(ch: char) -> bool {
    matches!(ch, '\u{200D}' | '\u{FE00}'..='\u{FE0F}' | '\u{20E3}')
}

/// Row of the baseline, counted from the top, that centres the line box in the cell.
fn baseline_row(cell_size: u32, line: LineExtent) -> i64 {
    (cell_size as f32 / 2.0 + (line.ascent + line.descent) / 2.0).round() as i64
}

fn blit_on_baseline(
    image: &mut RgbaImage,
    bitmap: &GlyphBitmap,
    origin_x: u32,
    cell_size: u32,
    baseline: i64,
) {
    let cell = cell_size as i64;
    let offset_x = if bitmap.advance > 0.0 {
        ((cell_size as f32 - bitmap.advance) / 2.0).round() as i64 + bitmap.xmin as i64
    } else {
        (cell - bitmap.width as i64) / 2
    };
    let offset_y = baseline - bitmap.ymin as i64 - bitmap.height as i64;

    for y in 0..bitmap.height {
        for x in 0..bitmap.width {
            let alpha = bitmap.coverage[y * bitmap.width + x];
            if alpha == 0 {
                continue;
            }
            let cx = x as i64 + offset_x;
            let cy = y as i64 + offset_y;
            if cx < 0 || cy < 0 || cx >= cell || cy >= cell {
                continue;
            }
            let pixel = image.get_pixel_mut(origin_x + cx as u32, cy as u32);
            let value = pixel[0].max(alpha);
            *pixel = Rgba([value, value, value, 255]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::charsets::Charset;

    /// Draws every non-space codepoint as a solid square of half the pixel size
    /// resting on the baseline. `-` floats at mid height and `_` hangs below.
    struct SquareRasterizer {
        calls: Vec<char>,
    }

    impl GlyphRasterizer for SquareRasterizer {
        fn rasterize(&mut self, ch: char, px: f32) -> Option<GlyphBitmap> {
            self.calls.push(ch);
            let side = (px / 2.0) as usize;
            if ch == ' ' {
                return Some(GlyphBitmap {
                    width: 0,
                    height: 0,
                    xmin: 0,
                    ymin: 0,
                    advance: side as f32,
                    coverage: Vec::new(),
                });
            }
            let (height, ymin) = match ch {
                '-' => (2, (px / 4.0) as i32),
                '_' => (2, -2),
                _ => (side, 0),
            };
            Some(GlyphBitmap {
                width: side,
                height,
                xmin: 0,
                ymin,
                advance: side as f32,
                coverage: vec![255; side * height],
            })
        }
    }

    fn lit_rows(image: &RgbaImage, cell: u32, cell_size: u32) -> Vec<u32> {
        (0..cell_size)
            .filter(|&y| (0..cell_size).any(|x| image.get_pixel(cell * cell_size + x, y)[0] > 0))
            .collect()
    }

    fn squares() -> SquareRasterizer {
        SquareRasterizer { calls: Vec::new() }
    }

    #[test]
    fn atlas_width_is_cells_times_glyphs() {
        let glyphs = Charset::Standard.glyphs();
        let image = build_atlas_image(&glyphs, 64, &mut squares()).unwrap();
        assert_eq!(image.width(), 640);
        assert_eq!(image.height(), 64);

        let binary = build_atlas_image(&Charset::Binary.glyphs(), 32, &mut squares()).unwrap();
        assert_eq!(binary.width(), 64);
    }

    #[test]
    fn blank_cell_stays_black_and_glyph_is_centred() {
        let glyphs = vec![" ".to_owned(), "#".to_owned()];
        let image = build_atlas_image(&glyphs, 40, &mut squares()).unwrap();

        assert!(image
            .enumerate_pixels()
            .filter(|(x, _, _)| *x < 40)
            .all(|(_, _, p)| p.0 == [0, 0, 0, 255]));

        // 0.8 × 40 = 32px, square side 16 centred on its advance: x from 12.
        // Line box 24 up / 8 down puts the baseline at 20 + 8 = 28, top at 12.
        assert_eq!(image.get_pixel(40 + 12, 12).0, [255, 255, 255, 255]);
        assert_eq!(image.get_pixel(40 + 27, 27).0, [255, 255, 255, 255]);
        assert_eq!(image.get_pixel(40 + 11, 12).0, [0, 0, 0, 255]);
        assert_eq!(image.get_pixel(40 + 28, 28).0, [0, 0, 0, 255]);
    }

    #[test]
    fn glyphs_share_a_baseline_instead_of_centring_their_ink() {
        let glyphs = vec![".".to_owned(), "-".to_owned(), "_".to_owned()];
        let image = build_atlas_image(&glyphs, 40, &mut squares()).unwrap();

        // Baseline at row 28; `-` sits 8px above it, `_` hangs 2px below.
        assert_eq!(lit_rows(&image, 0, 40), (12..28).collect::<Vec<_>>());
        assert_eq!(lit_rows(&image, 1, 40), vec![18, 19]);
        assert_eq!(lit_rows(&image, 2, 40), vec![28, 29]);
    }

    #[test]
    fn building_twice_is_identical() {
        let glyphs = Charset::Blocks.glyphs();
        let first = build_atlas_image(&glyphs, 16, &mut squares()).unwrap();
        let second = build_atlas_image(&glyphs, 16, &mut squares()).unwrap();
        assert_eq!(first.as_raw(), second.as_raw());
    }

    #[test]
    fn multi_codepoint_glyph_skips_zero_width_parts() {
        let glyphs = vec!["☀\u{FE0F}".to_owned()];
        let mut rasterizer = squares();
        build_atlas_image(&glyphs, 16, &mut rasterizer).unwrap();
        assert_eq!(rasterizer.calls, vec!['☀']);
    }

    #[test]
    fn rejects_degenerate_input() {
        assert!(matches!(
            build_atlas_image(&[], 64, &mut squares()),
            Err(AtlasError::EmptyGradient)
        ));
        assert!(matches!(
            build_atlas_image(&Charset::Binary.glyphs(), 0, &mut squares()),
            Err(AtlasError::ZeroCellSize)
        ));
    }
}
