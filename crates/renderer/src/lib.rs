//! Renderer crate for glyphcast.
//!
//! Turns a video or still image into a live grid of text glyphs on the GPU.
//! Each grid cell samples the average colour of the source region it covers,
//! maps that luminance onto a glyph gradient and draws the glyph from a
//! pre-rasterised atlas, all inside one full-screen fragment pass:
//!
//! ```text
//!   CLI / glyphcast
//!          │ RendererConfig
//!          ▼
//!   Renderer::run ──▶ WindowState ──▶ winit event loop ──▶ GpuState::tick()
//!                          │                                   │
//!                          ├─ MediaSource (image / ffmpeg)     ├─ frame upload
//!                          └─ Effects ─▶ UniformRegistry ──────┴─▶ uniforms ─▶ draw
//! ```
//!
//! The CPU-side building blocks (`charsets`, `grid`, `atlas`, `registry`,
//! `effects`, `media`) have no GPU dependency and are usable on their own.

pub mod atlas;
pub mod charsets;
mod compile;
pub mod effects;
mod gpu;
pub mod grid;
pub mod media;
pub mod registry;
pub mod runtime;
pub mod stats;
pub mod types;
pub mod uniforms;
mod window;

use anyhow::Result;

pub use atlas::{
    build_atlas_image, AtlasError, FontStack, GlyphBitmap, GlyphRasterizer, LineExtent,
};
pub use charsets::{catalog, Charset, CharsetDefinition};
pub use compile::{ProgramError, ProgramStage};
pub use grid::{compute_grid, GridDimensions};
pub use registry::{FrameContext, UniformRegistry, UniformWriter};
pub use stats::Stats;
pub use types::{
    AudioOptions, Dither, EffectsConfig, GpuPowerPreference, MouseOptions, PlaybackOptions,
    RenderOptions, RendererConfig, Rgb, RippleOptions,
};
pub use uniforms::AsciiUniforms;

/// High-level entry point that owns the chosen configuration.
pub struct Renderer {
    config: RendererConfig,
}

impl Renderer {
    pub fn new(config: RendererConfig) -> Self {
        Self { config }
    }

    /// Opens the media and the window, then runs until the window closes.
    ///
    /// Fails when the media cannot be opened or no GPU surface is available.
    /// Missing fonts or a failed shader program leave the window idle instead.
    pub fn run(self) -> Result<()> {
        window::run_window(self.config)
    }
}
