//! On-disk configuration for glyphcast.
//!
//! Every field is optional: the file only overrides what it names, and the
//! binary layers CLI flags on top before falling back to renderer defaults.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Highest trail length the renderer keeps.
pub const MAX_TRAIL_LENGTH: u32 = 24;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("failed to serialise configuration: {0}")]
    Serialise(#[from] toml::ser::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DitherSetting {
    None,
    Bayer,
    Noise,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PowerSetting {
    Low,
    High,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct CastConfig {
    #[serde(default = "default_version")]
    pub version: u32,
    /// Media opened when none is given on the command line.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media: Option<PathBuf>,
    #[serde(default)]
    pub window: WindowSection,
    #[serde(default)]
    pub render: RenderSection,
    #[serde(default)]
    pub mouse: MouseSection,
    #[serde(default)]
    pub ripple: RippleSection,
    #[serde(default)]
    pub audio: AudioSection,
    #[serde(default)]
    pub playback: PlaybackSection,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct WindowSection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gpu_power: Option<PowerSetting>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct RenderSection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub columns: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub colored: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blend: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub highlight: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brightness: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dither: Option<DitherSetting>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub charset: Option<String>,
    /// `#rrggbb` or `#rgb`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub foreground: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cell_size: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub font: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct MouseSection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trail_length: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct RippleSection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    /// Grid cells per second.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed: Option<f32>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct AudioSection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reactivity: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sensitivity: Option<f32>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct PlaybackSection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub autoplay: Option<bool>,
    #[serde(
        default,
        rename = "loop",
        skip_serializing_if = "Option::is_none"
    )]
    pub looping: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spacebar_toggle: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub show_stats: Option<bool>,
}

fn default_version() -> u32 {
    1
}

impl Default for CastConfig {
    fn default() -> Self {
        Self {
            version: default_version(),
            media: None,
            window: WindowSection::default(),
            render: RenderSection::default(),
            mouse: MouseSection::default(),
            ripple: RippleSection::default(),
            audio: AudioSection::default(),
            playback: PlaybackSection::default(),
        }
    }
}

impl CastConfig {
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        let raw: CastConfig = toml::from_str(input)?;
        raw.validate()?;
        Ok(raw)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.version != 1 {
            return Err(ConfigError::Invalid(format!(
                "unsupported config version {}; expected 1",
                self.version
            )));
        }

        if let Some(media) = &self.media {
            if media.as_os_str().is_empty() {
                return Err(ConfigError::Invalid("media path may not be empty".into()));
            }
        }

        if self.window.width == Some(0) || self.window.height == Some(0) {
            return Err(ConfigError::Invalid(
                "window width and height must be greater than zero".into(),
            ));
        }

        let render = &self.render;
        if render.columns == Some(0) {
            return Err(ConfigError::Invalid(
                "render.columns must be greater than zero".into(),
            ));
        }
        check_unit("render.blend", render.blend)?;
        check_unit("render.highlight", render.highlight)?;
        if let Some(brightness) = render.brightness {
            if !(brightness.is_finite() && brightness > 0.0) {
                return Err(ConfigError::Invalid(format!(
                    "render.brightness must be > 0 (got {brightness})"
                )));
            }
        }
        if let Some(charset) = &render.charset {
            if charset.trim().is_empty() {
                return Err(ConfigError::Invalid("render.charset may not be empty".into()));
            }
        }
        if let Some(foreground) = &render.foreground {
            if !is_hex_colour(foreground) {
                return Err(ConfigError::Invalid(format!(
                    "render.foreground '{foreground}' is not a #rrggbb colour"
                )));
            }
        }
        if render.cell_size == Some(0) {
            return Err(ConfigError::Invalid(
                "render.cell_size must be greater than zero".into(),
            ));
        }

        if let Some(length) = self.mouse.trail_length {
            if length > MAX_TRAIL_LENGTH {
                return Err(ConfigError::Invalid(format!(
                    "mouse.trail_length must be <= {MAX_TRAIL_LENGTH} (got {length})"
                )));
            }
        }

        if let Some(speed) = self.ripple.speed {
            if !(speed.is_finite() && speed > 0.0) {
                return Err(ConfigError::Invalid(format!(
                    "ripple.speed must be > 0 (got {speed})"
                )));
            }
        }

        check_percent("audio.reactivity", self.audio.reactivity)?;
        check_percent("audio.sensitivity", self.audio.sensitivity)?;

        Ok(())
    }
}

fn check_unit(name: &str, value: Option<f32>) -> Result<(), ConfigError> {
    match value {
        Some(v) if !(0.0..=1.0).contains(&v) => Err(ConfigError::Invalid(format!(
            "{name} must be within 0..=1 (got {v})"
        ))),
        _ => Ok(()),
    }
}

fn check_percent(name: &str, value: Option<f32>) -> Result<(), ConfigError> {
    match value {
        Some(v) if !(0.0..=100.0).contains(&v) => Err(ConfigError::Invalid(format!(
            "{name} must be within 0..=100 (got {v})"
        ))),
        _ => Ok(()),
    }
}

fn is_hex_colour(value: &str) -> bool {
    let hex = value.trim().trim_start_matches('#');
    matches!(hex.len(), 3 | 6) && hex.chars().all(|ch| ch.is_ascii_hexdigit())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r##"
version = 1
media = "~/Videos/loop.mp4"

[window]
width = 1600
height = 900
gpu_power = "high"

[render]
columns = 160
colored = false
blend = 0.2
brightness = 1.3
dither = "bayer"
charset = "blocks"
foreground = "#33ff66"

[mouse]
trail_length = 12

[ripple]
enabled = true
speed = 55.0

[audio]
enabled = true
reactivity = 70
sensitivity = 40

[playback]
loop = false
spacebar_toggle = true
show_stats = true
"##;

    #[test]
    fn parses_sample_config() {
        let config = CastConfig::from_toml_str(SAMPLE).expect("parse config");
        assert_eq!(config.version, 1);
        assert_eq!(config.window.gpu_power, Some(PowerSetting::High));
        assert_eq!(config.render.columns, Some(160));
        assert_eq!(config.render.dither, Some(DitherSetting::Bayer));
        assert_eq!(config.render.charset.as_deref(), Some("blocks"));
        assert_eq!(config.mouse.trail_length, Some(12));
        assert_eq!(config.mouse.enabled, None);
        assert_eq!(config.ripple.speed, Some(55.0));
        assert_eq!(config.audio.reactivity, Some(70.0));
        assert_eq!(config.playback.looping, Some(false));
        assert_eq!(config.playback.autoplay, None);
    }

    #[test]
    fn empty_file_is_all_defaults() {
        let config = CastConfig::from_toml_str("").unwrap();
        assert_eq!(config.version, 1);
        assert_eq!(config.render, RenderSection::default());
        assert!(config.media.is_none());
    }

    #[test]
    fn rejects_out_of_range_values() {
        for input in [
            "[render]\ncolumns = 0",
            "[render]\nblend = 1.5",
            "[render]\nbrightness = 0.0",
            "[render]\nforeground = \"green\"",
            "[mouse]\ntrail_length = 40",
            "[ripple]\nspeed = -1.0",
            "[audio]\nsensitivity = 101",
            "version = 2",
        ] {
            let err = CastConfig::from_toml_str(input).unwrap_err();
            assert!(matches!(err, ConfigError::Invalid(_)), "{input}: {err}");
        }
    }

    #[test]
    fn rejects_unknown_dither() {
        let err = CastConfig::from_toml_str("[render]\ndither = \"floyd\"").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn serialises_back_to_equivalent_toml() {
        let config = CastConfig::from_toml_str(SAMPLE).unwrap();
        let text = config.to_toml().unwrap();
        assert!(text.contains("loop = false"));
        assert!(!text.contains("autoplay"));
        assert_eq!(CastConfig::from_toml_str(&text).unwrap(), config);
    }
}
