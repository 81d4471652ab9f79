use anyhow::{anyhow, Result};
use castconfig::{
    AudioSection, CastConfig, DitherSetting, MouseSection, PlaybackSection, PowerSetting,
    RenderSection, RippleSection, WindowSection,
};
use renderer::{Charset, Dither, GpuPowerPreference, RendererConfig, Rgb};

pub fn map_dither(setting: DitherSetting) -> Dither {
    match setting {
        DitherSetting::None => Dither::None,
        DitherSetting::Bayer => Dither::Bayer,
        DitherSetting::Noise => Dither::Noise,
    }
}

fn dither_setting(dither: Dither) -> DitherSetting {
    match dither {
        Dither::None => DitherSetting::None,
        Dither::Bayer => DitherSetting::Bayer,
        Dither::Noise => DitherSetting::Noise,
    }
}

pub fn map_power(setting: PowerSetting) -> GpuPowerPreference {
    match setting {
        PowerSetting::Low => GpuPowerPreference::Low,
        PowerSetting::High => GpuPowerPreference::High,
    }
}

fn power_setting(power: GpuPowerPreference) -> PowerSetting {
    match power {
        GpuPowerPreference::Low => PowerSetting::Low,
        GpuPowerPreference::High => PowerSetting::High,
    }
}

/// Overlays every value the file sets onto `config`.
pub fn apply_file(config: &mut RendererConfig, file: &CastConfig) -> Result<()> {
    if let Some(media) = &file.media {
        config.media = media.clone();
    }

    let window = &file.window;
    if let Some(width) = window.width {
        config.surface_size.0 = width;
    }
    if let Some(height) = window.height {
        config.surface_size.1 = height;
    }
    if let Some(power) = window.gpu_power {
        config.gpu_power = map_power(power);
    }

    let render = &file.render;
    let options = &mut config.render;
    if let Some(columns) = render.columns {
        options.columns = columns;
    }
    if let Some(colored) = render.colored {
        options.colored = colored;
    }
    if let Some(blend) = render.blend {
        options.blend = blend;
    }
    if let Some(highlight) = render.highlight {
        options.highlight = highlight;
    }
    if let Some(brightness) = render.brightness {
        options.brightness = brightness;
    }
    if let Some(dither) = render.dither {
        options.dither = map_dither(dither);
    }
    if let Some(charset) = &render.charset {
        options.charset = charset
            .parse::<Charset>()
            .map_err(|err| anyhow!("render.charset: {err}"))?;
    }
    if let Some(foreground) = &render.foreground {
        options.foreground = foreground
            .parse::<Rgb>()
            .map_err(|err| anyhow!("render.foreground: {err}"))?;
    }
    if let Some(cell_size) = render.cell_size {
        options.cell_size = cell_size;
    }
    if let Some(font) = &render.font {
        options.font_path = Some(font.clone());
    }

    let effects = &mut config.effects;
    if let Some(enabled) = file.mouse.enabled {
        effects.mouse.enabled = enabled;
    }
    if let Some(length) = file.mouse.trail_length {
        effects.mouse.trail_length = length as usize;
    }
    if let Some(enabled) = file.ripple.enabled {
        effects.ripple.enabled = enabled;
    }
    if let Some(speed) = file.ripple.speed {
        effects.ripple.speed = speed;
    }
    if let Some(enabled) = file.audio.enabled {
        effects.audio.enabled = enabled;
    }
    if let Some(reactivity) = file.audio.reactivity {
        effects.audio.reactivity = reactivity;
    }
    if let Some(sensitivity) = file.audio.sensitivity {
        effects.audio.sensitivity = sensitivity;
    }

    let playback = &mut config.playback;
    if let Some(autoplay) = file.playback.autoplay {
        playback.autoplay = autoplay;
    }
    if let Some(looping) = file.playback.looping {
        playback.looping = looping;
    }
    if let Some(toggle) = file.playback.spacebar_toggle {
        playback.spacebar_toggle = toggle;
    }
    if let Some(show_stats) = file.playback.show_stats {
        playback.show_stats = show_stats;
    }

    Ok(())
}

/// Fully populated file model describing `config`.
pub fn to_cast_config(config: &RendererConfig) -> CastConfig {
    let render = &config.render;
    let effects = &config.effects;
    let playback = &config.playback;
    CastConfig {
        media: (!config.media.as_os_str().is_empty()).then(|| config.media.clone()),
        window: WindowSection {
            width: Some(config.surface_size.0),
            height: Some(config.surface_size.1),
            gpu_power: Some(power_setting(config.gpu_power)),
        },
        render: RenderSection {
            columns: Some(render.columns),
            colored: Some(render.colored),
            blend: Some(render.blend),
            highlight: Some(render.highlight),
            brightness: Some(render.brightness),
            dither: Some(dither_setting(render.dither)),
            charset: Some(render.charset.id().to_string()),
            foreground: Some(render.foreground.to_string()),
            cell_size: Some(render.cell_size),
            font: render.font_path.clone(),
        },
        mouse: MouseSection {
            enabled: Some(effects.mouse.enabled),
            trail_length: Some(effects.mouse.trail_length as u32),
        },
        ripple: RippleSection {
            enabled: Some(effects.ripple.enabled),
            speed: Some(effects.ripple.speed),
        },
        audio: AudioSection {
            enabled: Some(effects.audio.enabled),
            reactivity: Some(effects.audio.reactivity),
            sensitivity: Some(effects.audio.sensitivity),
        },
        playback: PlaybackSection {
            autoplay: Some(playback.autoplay),
            looping: Some(playback.looping),
            spacebar_toggle: Some(playback.spacebar_toggle),
            show_stats: Some(playback.show_stats),
        },
        ..CastConfig::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_values_override_defaults() {
        let file = CastConfig::from_toml_str(
            r##"
[render]
columns = 80
charset = "dots"
foreground = "#00ff00"
dither = "noise"

[ripple]
enabled = true
"##,
        )
        .unwrap();
        let mut config = RendererConfig::default();
        apply_file(&mut config, &file).unwrap();
        assert_eq!(config.render.columns, 80);
        assert_eq!(config.render.charset, Charset::Dots);
        assert_eq!(config.render.foreground, Rgb([0.0, 1.0, 0.0]));
        assert_eq!(config.render.dither, Dither::Noise);
        assert!(config.effects.ripple.enabled);
        assert!(config.effects.mouse.enabled);
    }

    #[test]
    fn unknown_charset_is_an_error() {
        let file = CastConfig::from_toml_str("[render]\ncharset = \"runes\"").unwrap();
        let err = apply_file(&mut RendererConfig::default(), &file).unwrap_err();
        assert!(err.to_string().contains("render.charset"));
    }

    #[test]
    fn resolved_config_round_trips_through_the_file_model() {
        let mut config = RendererConfig::default();
        config.render.charset = Charset::Arrows;
        config.effects.audio.enabled = true;
        let file = to_cast_config(&config);
        file.validate().unwrap();

        let mut restored = RendererConfig::default();
        apply_file(&mut restored, &file).unwrap();
        assert_eq!(restored, config);
    }
}
