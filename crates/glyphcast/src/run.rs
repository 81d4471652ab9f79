use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use castconfig::CastConfig;
use renderer::{catalog, Renderer, RendererConfig};
use tracing_subscriber::EnvFilter;

use crate::bindings::{apply_file, to_cast_config};
use crate::cli::{Cli, Command, RunArgs};
use crate::paths::AppPaths;

pub fn run(cli: Cli) -> Result<()> {
    initialise_tracing();

    let paths = AppPaths::discover()?;
    tracing::debug!(config = %paths.config_dir().display(), "resolved glyphcast paths");

    if let Some(Command::Charsets) = cli.command {
        print_charsets();
        return Ok(());
    }

    let file = load_config(cli.run.config.as_deref(), &paths)?;
    let config = resolve(&cli.run, &file)?;

    if let Some(Command::Config) = cli.command {
        let text = to_cast_config(&config)
            .to_toml()
            .context("failed to serialise resolved configuration")?;
        print!("{text}");
        return Ok(());
    }

    if config.media.as_os_str().is_empty() {
        bail!(
            "no media given; pass a video or image path or set `media` in {}",
            paths.config_file().display()
        );
    }

    tracing::info!(
        media = %config.media.display(),
        columns = config.render.columns,
        charset = %config.render.charset,
        "starting glyphcast"
    );
    Renderer::new(config).run()
}

fn initialise_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn print_charsets() {
    for definition in catalog() {
        println!(
            "{:<10} {:>3}  {:<10} {}",
            definition.id,
            definition.glyph_count(),
            definition.display_name,
            definition.gradient
        );
    }
}

/// Reads the explicit `--config` file, or the default one when it exists.
fn load_config(explicit: Option<&Path>, paths: &AppPaths) -> Result<CastConfig> {
    let path = match explicit {
        Some(path) => path.to_path_buf(),
        None => {
            let path = paths.config_file();
            if !path.is_file() {
                tracing::debug!(path = %path.display(), "no config file; using defaults");
                return Ok(CastConfig::default());
            }
            path
        }
    };

    let text = fs::read_to_string(&path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    let config = CastConfig::from_toml_str(&text)
        .with_context(|| format!("failed to load config {}", path.display()))?;
    tracing::debug!(path = %path.display(), "loaded config file");
    Ok(config)
}

/// Renderer defaults, then the config file, then command-line flags.
pub fn resolve(args: &RunArgs, file: &CastConfig) -> Result<RendererConfig> {
    let mut config = RendererConfig::default();
    apply_file(&mut config, file)?;
    apply_args(&mut config, args);
    Ok(config)
}

fn apply_args(config: &mut RendererConfig, args: &RunArgs) {
    if let Some(media) = &args.media {
        config.media = media.clone();
    }
    if let Some(size) = args.size {
        config.surface_size = size;
    }
    if let Some(power) = args.gpu_power {
        config.gpu_power = power;
    }

    let render = &mut config.render;
    if let Some(columns) = args.columns {
        render.columns = columns;
    }
    if let Some(charset) = args.charset {
        render.charset = charset;
    }
    if let Some(dither) = args.dither {
        render.dither = dither;
    }
    if args.monochrome {
        render.colored = false;
    }
    if let Some(foreground) = args.foreground {
        render.foreground = foreground;
    }
    if let Some(blend) = args.blend {
        render.blend = blend;
    }
    if let Some(highlight) = args.highlight {
        render.highlight = highlight;
    }
    if let Some(brightness) = args.brightness {
        render.brightness = brightness;
    }
    if let Some(font) = &args.font {
        render.font_path = Some(font.clone());
    }
    if let Some(cell_size) = args.cell_size {
        render.cell_size = cell_size;
    }

    let effects = &mut config.effects;
    if args.no_mouse {
        effects.mouse.enabled = false;
    }
    if let Some(length) = args.trail_length {
        effects.mouse.trail_length = length as usize;
    }
    if args.ripple {
        effects.ripple.enabled = true;
    }
    if let Some(speed) = args.ripple_speed {
        effects.ripple.speed = speed;
    }
    if args.audio {
        effects.audio.enabled = true;
    }
    if let Some(reactivity) = args.reactivity {
        effects.audio.reactivity = reactivity;
    }
    if let Some(sensitivity) = args.sensitivity {
        effects.audio.sensitivity = sensitivity;
    }

    let playback = &mut config.playback;
    if args.no_autoplay {
        playback.autoplay = false;
    }
    if args.no_loop {
        playback.looping = false;
    }
    if args.spacebar_toggle {
        playback.spacebar_toggle = true;
    }
    if args.stats {
        playback.show_stats = true;
    }
}
