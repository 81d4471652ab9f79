//! GPU side of the glyph renderer.
//!
//! - `context` owns wgpu instance/device/surface wiring and reconfigures the
//!   swapchain when the window resizes or the surface is lost.
//! - `pipeline` holds the bind group layouts and the single glyph pipeline.
//! - `atlas` uploads a rasterised glyph strip and destroys it on rebuild.
//! - `frame` keeps one media texture with a full mip chain and refreshes it
//!   in place.
//! - `state` glues everything together and runs one tick per redraw.

mod atlas;
mod context;
mod frame;
mod pipeline;
mod state;

pub(crate) use state::{GpuState, IdleReason, TickInputs, TickOutcome};
