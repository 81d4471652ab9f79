use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::atlas::DEFAULT_CELL_SIZE;
use crate::charsets::Charset;
use crate::uniforms::MAX_TRAIL_LENGTH;

/// Ordered-noise applied to luminance before the glyph lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Dither {
    #[default]
    None,
    /// 4×4 Bayer matrix.
    Bayer,
    /// Per-cell hash noise.
    Noise,
}

impl Dither {
    /// Value written into the uniform block.
    pub fn shader_mode(self) -> u32 {
        match self {
            Dither::None => 0,
            Dither::Bayer => 1,
            Dither::Noise => 2,
        }
    }
}

impl fmt::Display for Dither {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Dither::None => "none",
            Dither::Bayer => "bayer",
            Dither::Noise => "noise",
        })
    }
}

impl FromStr for Dither {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "none" | "off" => Ok(Dither::None),
            "bayer" | "ordered" => Ok(Dither::Bayer),
            "noise" | "random" => Ok(Dither::Noise),
            other => Err(format!(
                "unknown dither mode '{other}' (expected none, bayer or noise)"
            )),
        }
    }
}

/// Linear RGB colour with components in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rgb(pub [f32; 3]);

impl Rgb {
    pub const WHITE: Rgb = Rgb([1.0, 1.0, 1.0]);
}

impl Default for Rgb {
    fn default() -> Self {
        Self::WHITE
    }
}

impl FromStr for Rgb {
    type Err = String;

    /// Parses `#rrggbb` or `#rgb` (the leading `#` is optional).
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let hex = value.trim().trim_start_matches('#');
        if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(format!("invalid colour '{value}' (expected #rrggbb)"));
        }
        let expanded: String = match hex.len() {
            3 => hex.chars().flat_map(|c| [c, c]).collect(),
            6 => hex.to_owned(),
            _ => return Err(format!("invalid colour '{value}' (expected #rrggbb)")),
        };
        let channel = |index: usize| {
            u8::from_str_radix(&expanded[index * 2..index * 2 + 2], 16)
                .map(|byte| byte as f32 / 255.0)
                .map_err(|_| format!("invalid colour '{value}' (expected #rrggbb)"))
        };
        Ok(Rgb([channel(0)?, channel(1)?, channel(2)?]))
    }
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [r, g, b] = self.0.map(|c| (c.clamp(0.0, 1.0) * 255.0).round() as u8);
        write!(f, "#{r:02x}{g:02x}{b:02x}")
    }
}

/// How the base glyph pass looks.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderOptions {
    /// Requested number of glyph columns.
    pub columns: u32,
    /// Tint glyphs with the source colour instead of `foreground`.
    pub colored: bool,
    /// Mix factor toward the original frame, `0..=1`.
    pub blend: f32,
    /// Strength of the source-coloured cell background, `0..=1`.
    pub highlight: f32,
    /// Luminance multiplier.
    pub brightness: f32,
    pub dither: Dither,
    pub charset: Charset,
    /// Glyph colour when `colored` is false.
    pub foreground: Rgb,
    /// Atlas cell size in pixels.
    pub cell_size: u32,
    /// Font used for the atlas; system monospace fonts are tried otherwise.
    pub font_path: Option<PathBuf>,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            columns: 120,
            colored: true,
            blend: 0.0,
            highlight: 0.0,
            brightness: 1.0,
            dither: Dither::None,
            charset: Charset::Standard,
            foreground: Rgb::WHITE,
            cell_size: DEFAULT_CELL_SIZE,
            font_path: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MouseOptions {
    pub enabled: bool,
    /// Clamped to [`MAX_TRAIL_LENGTH`].
    pub trail_length: usize,
}

impl Default for MouseOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            trail_length: MAX_TRAIL_LENGTH,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RippleOptions {
    pub enabled: bool,
    /// Ring speed in grid cells per second.
    pub speed: f32,
}

impl Default for RippleOptions {
    fn default() -> Self {
        Self {
            enabled: false,
            speed: 40.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AudioOptions {
    pub enabled: bool,
    /// How strongly loudness modulates brightness, `0..=100`.
    pub reactivity: f32,
    /// Width of the brightness swing, `0..=100`.
    pub sensitivity: f32,
}

impl Default for AudioOptions {
    fn default() -> Self {
        Self {
            enabled: false,
            reactivity: 50.0,
            sensitivity: 50.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct EffectsConfig {
    pub mouse: MouseOptions,
    pub ripple: RippleOptions,
    pub audio: AudioOptions,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaybackOptions {
    /// Start playing as soon as the source is open.
    pub autoplay: bool,
    /// Restart videos when they reach the end.
    pub looping: bool,
    /// Space toggles play/pause.
    pub spacebar_toggle: bool,
    /// Show fps, frame time and grid size in the window title.
    pub show_stats: bool,
}

impl Default for PlaybackOptions {
    fn default() -> Self {
        Self {
            autoplay: true,
            looping: true,
            spacebar_toggle: false,
            show_stats: false,
        }
    }
}

/// GPU adapter preference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GpuPowerPreference {
    #[default]
    Low,
    High,
}

/// Immutable configuration passed to the renderer at start-up.
///
/// `RendererConfig` mirrors the merged CLI flags and config file: which media
/// to open, how the glyph pass looks, and which effects start enabled.
#[derive(Debug, Clone, PartialEq)]
pub struct RendererConfig {
    /// Initial window size in physical pixels.
    pub surface_size: (u32, u32),
    /// Video or image to render.
    pub media: PathBuf,
    pub render: RenderOptions,
    pub effects: EffectsConfig,
    pub playback: PlaybackOptions,
    pub gpu_power: GpuPowerPreference,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            surface_size: (1280, 720),
            media: PathBuf::new(),
            render: RenderOptions::default(),
            effects: EffectsConfig::default(),
            playback: PlaybackOptions::default(),
            gpu_power: GpuPowerPreference::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_hex_colours() {
        assert_eq!("#ffffff".parse::<Rgb>().unwrap(), Rgb::WHITE);
        assert_eq!("0f0".parse::<Rgb>().unwrap(), Rgb([0.0, 1.0, 0.0]));
        assert!("#12345".parse::<Rgb>().is_err());
        assert!("#gg0000".parse::<Rgb>().is_err());
        assert!("aébcd".parse::<Rgb>().is_err());
        assert!("#é0".parse::<Rgb>().is_err());
        assert_eq!(Rgb([1.0, 0.5, 0.0]).to_string(), "#ff8000");
    }

    #[test]
    fn parses_dither_modes() {
        assert_eq!("Bayer".parse::<Dither>().unwrap(), Dither::Bayer);
        assert_eq!("none".parse::<Dither>().unwrap().shader_mode(), 0);
        assert_eq!(Dither::Noise.shader_mode(), 2);
        assert!("floyd".parse::<Dither>().is_err());
    }

    #[test]
    fn defaults_match_component_defaults() {
        let config = RendererConfig::default();
        assert!(config.render.colored);
        assert_eq!(config.render.brightness, 1.0);
        assert_eq!(config.render.charset, Charset::Standard);
        assert!(config.effects.mouse.enabled);
        assert_eq!(config.effects.mouse.trail_length, 24);
        assert!(!config.effects.ripple.enabled);
        assert_eq!(config.effects.ripple.speed, 40.0);
        assert!(!config.effects.audio.enabled);
        assert!(config.playback.autoplay && config.playback.looping);
    }
}
