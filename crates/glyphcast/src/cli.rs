use std::path::PathBuf;

use clap::{Parser, Subcommand};
use renderer::{Charset, Dither, GpuPowerPreference, Rgb};

#[derive(Parser, Debug)]
#[command(
    name = "glyphcast",
    author,
    version,
    about = "Render video and images as live text glyphs",
    arg_required_else_help = false
)]
pub struct Cli {
    #[command(flatten)]
    pub run: RunArgs,
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Parser, Debug, Default)]
pub struct RunArgs {
    /// Video or image to render.
    #[arg(value_name = "MEDIA")]
    pub media: Option<PathBuf>,

    /// Configuration file; defaults to `config.toml` in the config directory.
    #[arg(long, value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,

    /// Initial window size (e.g. `1280x720`).
    #[arg(long, value_name = "WIDTHxHEIGHT", value_parser = parse_size)]
    pub size: Option<(u32, u32)>,

    /// Number of glyph columns.
    #[arg(long, value_name = "N", value_parser = clap::value_parser!(u32).range(1..))]
    pub columns: Option<u32>,

    /// Glyph gradient (see `glyphcast charsets`).
    #[arg(long, value_name = "ID", value_parser = parse_charset)]
    pub charset: Option<Charset>,

    /// Dither mode: `none`, `bayer`, or `noise`.
    #[arg(long, value_name = "MODE", value_parser = parse_dither)]
    pub dither: Option<Dither>,

    /// Draw every glyph in `--foreground` instead of the source colour.
    #[arg(long)]
    pub monochrome: bool,

    /// Glyph colour in monochrome mode (`#rrggbb`).
    #[arg(long, value_name = "COLOUR", value_parser = parse_colour)]
    pub foreground: Option<Rgb>,

    /// Mix toward the original frame, 0-1.
    #[arg(long, value_name = "AMOUNT", value_parser = parse_unit)]
    pub blend: Option<f32>,

    /// Source-coloured cell background strength, 0-1.
    #[arg(long, value_name = "AMOUNT", value_parser = parse_unit)]
    pub highlight: Option<f32>,

    /// Luminance multiplier.
    #[arg(long, value_name = "FACTOR", value_parser = parse_positive)]
    pub brightness: Option<f32>,

    /// Font used to rasterise glyphs.
    #[arg(long, value_name = "PATH")]
    pub font: Option<PathBuf>,

    /// Atlas cell size in pixels.
    #[arg(long, value_name = "PX", value_parser = clap::value_parser!(u32).range(1..))]
    pub cell_size: Option<u32>,

    /// Disable the pointer trail.
    #[arg(long)]
    pub no_mouse: bool,

    /// Pointer trail length (max 24).
    #[arg(long, value_name = "N", value_parser = clap::value_parser!(u32).range(0..=24))]
    pub trail_length: Option<u32>,

    /// Enable click ripples.
    #[arg(long)]
    pub ripple: bool,

    /// Ripple speed in grid cells per second.
    #[arg(long, value_name = "CELLS", value_parser = parse_positive)]
    pub ripple_speed: Option<f32>,

    /// Enable audio-reactive brightness.
    #[arg(long)]
    pub audio: bool,

    /// Audio reactivity, 0-100.
    #[arg(long, value_name = "PERCENT", value_parser = parse_percent)]
    pub reactivity: Option<f32>,

    /// Audio sensitivity, 0-100.
    #[arg(long, value_name = "PERCENT", value_parser = parse_percent)]
    pub sensitivity: Option<f32>,

    /// Wait for the space bar instead of playing immediately.
    #[arg(long)]
    pub no_autoplay: bool,

    /// Stop at the end of the video instead of looping.
    #[arg(long)]
    pub no_loop: bool,

    /// Let the space bar toggle play/pause.
    #[arg(long)]
    pub spacebar_toggle: bool,

    /// Show fps, frame time and grid size in the window title.
    #[arg(long)]
    pub stats: bool,

    /// GPU adapter preference: `low` or `high`.
    #[arg(long, value_name = "POWER", value_parser = parse_gpu_power)]
    pub gpu_power: Option<GpuPowerPreference>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List the built-in glyph gradients.
    Charsets,
    /// Print the configuration that would be used, as TOML.
    Config,
}

pub fn parse() -> Cli {
    Cli::parse()
}

pub fn parse_size(value: &str) -> Result<(u32, u32), String> {
    let (width, height) = value
        .trim()
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("invalid size '{value}'; expected WIDTHxHEIGHT"))?;
    let width: u32 = width
        .trim()
        .parse()
        .map_err(|_| format!("invalid width in '{value}'"))?;
    let height: u32 = height
        .trim()
        .parse()
        .map_err(|_| format!("invalid height in '{value}'"))?;
    if width == 0 || height == 0 {
        return Err("size must be greater than zero".to_string());
    }
    Ok((width, height))
}

pub fn parse_charset(value: &str) -> Result<Charset, String> {
    value.parse()
}

pub fn parse_dither(value: &str) -> Result<Dither, String> {
    value.parse()
}

pub fn parse_colour(value: &str) -> Result<Rgb, String> {
    value.parse()
}

pub fn parse_gpu_power(value: &str) -> Result<GpuPowerPreference, String> {
    match value.trim().to_ascii_lowercase().as_str() {
        "low" | "low-power" => Ok(GpuPowerPreference::Low),
        "high" | "high-performance" => Ok(GpuPowerPreference::High),
        other => Err(format!("unknown GPU power '{other}'; expected low or high")),
    }
}

fn parse_float(value: &str) -> Result<f32, String> {
    let parsed: f32 = value
        .trim()
        .parse()
        .map_err(|_| format!("'{value}' is not a number"))?;
    if !parsed.is_finite() {
        return Err(format!("'{value}' is not a finite number"));
    }
    Ok(parsed)
}

pub fn parse_unit(value: &str) -> Result<f32, String> {
    let parsed = parse_float(value)?;
    if !(0.0..=1.0).contains(&parsed) {
        return Err(format!("{parsed} is outside 0-1"));
    }
    Ok(parsed)
}

pub fn parse_percent(value: &str) -> Result<f32, String> {
    let parsed = parse_float(value)?;
    if !(0.0..=100.0).contains(&parsed) {
        return Err(format!("{parsed} is outside 0-100"));
    }
    Ok(parsed)
}

pub fn parse_positive(value: &str) -> Result<f32, String> {
    let parsed = parse_float(value)?;
    if parsed <= 0.0 {
        return Err(format!("{parsed} must be greater than zero"));
    }
    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_sizes() {
        assert_eq!(parse_size("1280x720"), Ok((1280, 720)));
        assert_eq!(parse_size(" 640X480 "), Ok((640, 480)));
        assert!(parse_size("1280").is_err());
        assert!(parse_size("0x720").is_err());
    }

    #[test]
    fn validates_ranges() {
        assert_eq!(parse_unit("0.5"), Ok(0.5));
        assert!(parse_unit("1.5").is_err());
        assert!(parse_percent("101").is_err());
        assert!(parse_positive("0").is_err());
        assert!(parse_positive("nan").is_err());
    }

    #[test]
    fn parses_run_flags() {
        let cli = Cli::try_parse_from([
            "glyphcast",
            "clip.mp4",
            "--columns",
            "90",
            "--charset",
            "blocks",
            "--dither",
            "noise",
            "--ripple",
            "--stats",
        ])
        .unwrap();
        assert_eq!(cli.run.media, Some(PathBuf::from("clip.mp4")));
        assert_eq!(cli.run.columns, Some(90));
        assert_eq!(cli.run.charset, Some(Charset::Blocks));
        assert_eq!(cli.run.dither, Some(Dither::Noise));
        assert!(cli.run.ripple && cli.run.stats);
        assert!(cli.command.is_none());
    }

    #[test]
    fn subcommand_names_win_over_media() {
        let cli = Cli::try_parse_from(["glyphcast", "charsets"]).unwrap();
        assert!(matches!(cli.command, Some(Command::Charsets)));
        assert!(cli.run.media.is_none());
    }

    #[test]
    fn rejects_unknown_charset() {
        assert!(Cli::try_parse_from(["glyphcast", "--charset", "runes"]).is_err());
        assert!(Cli::try_parse_from(["glyphcast", "--trail-length", "30"]).is_err());
    }

    #[test]
    fn rejects_non_ascii_foreground_without_panicking() {
        assert!(Cli::try_parse_from(["glyphcast", "--foreground", "aébcd"]).is_err());
        assert!(Cli::try_parse_from(["glyphcast", "--foreground", "#33ff66"]).is_ok());
    }
}
