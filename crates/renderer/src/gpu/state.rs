use std::time::Instant;

use anyhow::Result;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use tracing::{debug, error};
use wgpu::util::DeviceExt;
use winit::dpi::PhysicalSize;

use crate::atlas::{AtlasError, GlyphRasterizer};
use crate::charsets::Charset;
use crate::grid::{compute_grid, GridDimensions};
use crate::media::MediaSource;
use crate::registry::{FrameContext, UniformRegistry};
use crate::stats::{FrameStats, Stats};
use crate::types::{GpuPowerPreference, RenderOptions};
use crate::uniforms::AsciiUniforms;

use super::atlas::GlyphAtlas;
use super::context::GpuContext;
use super::frame::FrameTexture;
use super::pipeline::{GlyphPipeline, PipelineLayouts};

/// Everything one tick needs from outside the GPU state.
pub(crate) struct TickInputs<'a> {
    pub media: &'a mut dyn MediaSource,
    pub registry: &'a mut UniformRegistry,
    pub options: &'a RenderOptions,
    /// Seconds since the render loop started.
    pub time: f32,
    pub now: Instant,
}

/// Why a tick drew nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum IdleReason {
    NoProgram,
    NoAtlas,
    NoFrame,
    ZeroSizedSource,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum TickOutcome {
    Idle(IdleReason),
    Rendered {
        grid: GridDimensions,
        stats: Option<Stats>,
    },
}

pub(crate) struct GpuState {
    context: GpuContext,
    layouts: PipelineLayouts,
    pipeline: Option<GlyphPipeline>,
    atlas: Option<GlyphAtlas>,
    frame_texture: Option<FrameTexture>,
    texture_bind_group: Option<wgpu::BindGroup>,
    uniform_buffer: wgpu::Buffer,
    uniform_bind_group: wgpu::BindGroup,
    uniforms: AsciiUniforms,
    stats: FrameStats,
}

impl GpuState {
    pub(crate) fn new<T>(
        target: &T,
        initial_size: PhysicalSize<u32>,
        gpu_power: GpuPowerPreference,
    ) -> Result<Self>
    where
        T: HasDisplayHandle + HasWindowHandle,
    {
        let context = GpuContext::new(target, initial_size, gpu_power)?;
        let layouts = PipelineLayouts::new(&context.device);

        let pipeline = match GlyphPipeline::new(&context.device, &layouts, context.surface_format)
        {
            Ok(pipeline) => Some(pipeline),
            Err(err) => {
                error!(error = %err, "glyph program failed to build; renderer stays idle");
                None
            }
        };

        let uniforms = AsciiUniforms::default();
        let uniform_buffer = context
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("ascii uniforms"),
                contents: bytemuck::bytes_of(&uniforms),
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            });
        let uniform_bind_group = context
            .device
            .create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("uniform bind group"),
                layout: &layouts.uniform_layout,
                entries: &[wgpu::BindGroupEntry {
                    binding: 0,
                    resource: uniform_buffer.as_entire_binding(),
                }],
            });

        Ok(Self {
            context,
            layouts,
            pipeline,
            atlas: None,
            frame_texture: None,
            texture_bind_group: None,
            uniform_buffer,
            uniform_bind_group,
            uniforms,
            stats: FrameStats::default(),
        })
    }

    pub(crate) fn size(&self) -> PhysicalSize<u32> {
        self.context.size
    }

    pub(crate) fn resize(&mut self, new_size: PhysicalSize<u32>) {
        self.context.resize(new_size);
    }

    pub(crate) fn reconfigure(&mut self) {
        self.context.reconfigure();
    }

    pub(crate) fn atlas_charset(&self) -> Option<Charset> {
        self.atlas.as_ref().map(|atlas| atlas.charset)
    }

    /// Builds the atlas for `charset` unless the current one already matches.
    ///
    /// On failure the previous atlas stays bound.
    pub(crate) fn rebuild_atlas<R>(
        &mut self,
        charset: Charset,
        cell_size: u32,
        rasterizer: &mut R,
    ) -> Result<(), AtlasError>
    where
        R: GlyphRasterizer + ?Sized,
    {
        if self
            .atlas
            .as_ref()
            .is_some_and(|atlas| atlas.matches(charset, cell_size))
        {
            return Ok(());
        }
        let atlas = GlyphAtlas::build(
            &self.context.device,
            &self.context.queue,
            charset,
            cell_size,
            self.context.max_texture_dimension,
            rasterizer,
        )?;
        if let Some(previous) = self.atlas.replace(atlas) {
            previous.destroy();
        }
        self.texture_bind_group = None;
        Ok(())
    }

    /// Runs one render-loop iteration.
    ///
    /// Missing program, atlas or frame make the tick idle; only surface
    /// acquisition can fail.
    pub(crate) fn tick(
        &mut self,
        inputs: TickInputs<'_>,
    ) -> Result<TickOutcome, wgpu::SurfaceError> {
        let started = Instant::now();
        let TickInputs {
            media,
            registry,
            options,
            time,
            now,
        } = inputs;

        if self.pipeline.is_none() {
            return Ok(TickOutcome::Idle(IdleReason::NoProgram));
        }
        let Some(glyph_count) = self.atlas.as_ref().map(|atlas| atlas.glyph_count) else {
            return Ok(TickOutcome::Idle(IdleReason::NoAtlas));
        };
        let Some(source) = self.prepare_frame(media, now) else {
            return Ok(TickOutcome::Idle(IdleReason::NoFrame));
        };
        let Some(grid) = layout_grid(media.intrinsic_size(), source, options.columns) else {
            return Ok(TickOutcome::Idle(IdleReason::ZeroSizedSource));
        };
        self.ensure_texture_bind_group();

        let output = (self.context.config.width, self.context.config.height);
        let ctx = FrameContext {
            time,
            media_time: media.media_time(now),
            grid,
            surface: output,
        };
        prepare_uniforms(
            &mut self.uniforms,
            options,
            &ctx,
            source,
            glyph_count,
            registry,
        );
        self.context.queue.write_buffer(
            &self.uniform_buffer,
            0,
            bytemuck::bytes_of(&self.uniforms),
        );

        let surface_texture = self.context.surface.get_current_texture()?;
        let view = surface_texture
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        let mut encoder =
            self.context
                .device
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("glyph encoder"),
                });
        {
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("glyph pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    depth_slice: None,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                occlusion_query_set: None,
                timestamp_writes: None,
            });
            if let (Some(pipeline), Some(bind_group)) =
                (self.pipeline.as_ref(), self.texture_bind_group.as_ref())
            {
                render_pass.set_pipeline(&pipeline.pipeline);
                render_pass.set_bind_group(0, &self.uniform_bind_group, &[]);
                render_pass.set_bind_group(1, bind_group, &[]);
                render_pass.draw(0..3, 0..1);
            }
        }
        self.context.queue.submit(std::iter::once(encoder.finish()));
        surface_texture.present();

        let stats = self.stats.record(started, grid);
        if let Some(stats) = stats {
            debug!(
                fps = stats.fps,
                frame_time_ms = stats.frame_time_ms,
                columns = stats.columns,
                rows = stats.rows,
                "render stats"
            );
        }
        Ok(TickOutcome::Rendered { grid, stats })
    }

    /// Polls the media and uploads its current frame. Returns the source size
    /// once a frame is resident.
    fn prepare_frame(&mut self, media: &mut dyn MediaSource, now: Instant) -> Option<(u32, u32)> {
        let frame = media.poll_frame(now)?;
        if frame.levels.is_empty() {
            return None;
        }
        let reusable = self
            .frame_texture
            .as_ref()
            .is_some_and(|texture| texture.fits(frame));
        if !reusable {
            if let Some(previous) = self.frame_texture.take() {
                previous.destroy();
            }
            self.frame_texture = Some(FrameTexture::new(
                &self.context.device,
                frame.size(),
                frame.levels.len() as u32,
            ));
            self.texture_bind_group = None;
        }
        let texture = self.frame_texture.as_mut()?;
        texture.upload(&self.context.queue, frame);
        Some(texture.size())
    }

    fn ensure_texture_bind_group(&mut self) {
        if self.texture_bind_group.is_some() {
            return;
        }
        let (Some(frame), Some(atlas)) = (self.frame_texture.as_ref(), self.atlas.as_ref()) else {
            return;
        };
        self.texture_bind_group = Some(self.context.device.create_bind_group(
            &wgpu::BindGroupDescriptor {
                label: Some("texture bind group"),
                layout: &self.layouts.texture_layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: wgpu::BindingResource::TextureView(&frame.view),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: wgpu::BindingResource::Sampler(&frame.sampler),
                    },
                    wgpu::BindGroupEntry {
                        binding: 2,
                        resource: wgpu::BindingResource::TextureView(&atlas.view),
                    },
                    wgpu::BindGroupEntry {
                        binding: 3,
                        resource: wgpu::BindingResource::Sampler(&atlas.sampler),
                    },
                ],
            },
        ));
    }

    /// Frees the textures explicitly. Used on teardown.
    pub(crate) fn release(mut self) {
        self.texture_bind_group = None;
        if let Some(atlas) = self.atlas.take() {
            atlas.destroy();
        }
        if let Some(frame) = self.frame_texture.take() {
            frame.destroy();
        }
        self.uniform_buffer.destroy();
        debug!("released GPU resources");
    }
}

/// Grid for the source's native size, falling back to the uploaded frame
/// size until the source reports it.
pub(crate) fn layout_grid(
    intrinsic: Option<(u32, u32)>,
    uploaded: (u32, u32),
    columns: u32,
) -> Option<GridDimensions> {
    let (width, height) = intrinsic
        .filter(|&(width, height)| width > 0 && height > 0)
        .unwrap_or(uploaded);
    compute_grid(width, height, columns)
}

/// Builds this tick's uniform block: neutral effect fields first, then the
/// base glyph parameters, then every registered writer in order.
pub(crate) fn prepare_uniforms(
    uniforms: &mut AsciiUniforms,
    options: &RenderOptions,
    ctx: &FrameContext,
    source: (u32, u32),
    glyph_count: usize,
    registry: &mut UniformRegistry,
) {
    uniforms.set_time(ctx.time);
    uniforms.reset_effects();
    uniforms.set_surface(ctx.surface, source);
    uniforms.set_grid(ctx.grid.columns, ctx.grid.rows, glyph_count);
    uniforms.set_tone(
        options.brightness,
        options.blend,
        options.highlight,
        options.colored,
    );
    uniforms.set_ink(options.foreground.0, options.dither.shader_mode());
    registry.run_all(ctx, uniforms);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effects::{MouseTrail, Ripples};
    use crate::registry::test_context;
    use crate::types::Dither;
    use crate::uniforms::NO_POINTER;

    #[test]
    fn grid_follows_native_size_once_known() {
        let decoded = (1280, 536);
        let before = layout_grid(None, decoded, 120).unwrap();
        assert_eq!(before.rows, 25);

        let native = layout_grid(Some((800, 600)), decoded, 120).unwrap();
        assert_eq!((native.columns, native.rows), (120, 45));

        let unknown = layout_grid(Some((0, 0)), (800, 600), 120).unwrap();
        assert_eq!(unknown.rows, 45);
        assert!(layout_grid(None, (0, 0), 120).is_none());
    }

    #[test]
    fn base_uniforms_follow_options() {
        let options = RenderOptions {
            brightness: 1.5,
            blend: 0.25,
            colored: false,
            dither: Dither::Bayer,
            ..RenderOptions::default()
        };
        let mut uniforms = AsciiUniforms::default();
        let mut registry = UniformRegistry::new();
        prepare_uniforms(
            &mut uniforms,
            &options,
            &test_context(2.0),
            (1280, 720),
            10,
            &mut registry,
        );
        assert_eq!(uniforms.surface, [800.0, 600.0, 1280.0, 720.0]);
        assert_eq!(uniforms.grid, [120.0, 45.0, 10.0, 0.0]);
        assert_eq!(uniforms.tone, [1.5, 0.25, 0.0, 0.0]);
        assert_eq!(uniforms.ink, [1.0, 1.0, 1.0, 1.0]);
        assert_eq!(uniforms.time(), 2.0);
    }

    #[test]
    fn disabled_effects_are_neutral_on_the_next_tick() {
        let options = RenderOptions::default();
        let mut registry = UniformRegistry::new();
        let mut mouse = MouseTrail::new(24);
        let mut ripples = Ripples::new(40.0);
        mouse.set_enabled(true, &mut registry);
        ripples.set_enabled(true, &mut registry);
        mouse.pointer_moved([0.2, 0.2]);
        mouse.pointer_moved([0.3, 0.3]);
        ripples.click([0.5, 0.5], 0.5);

        let mut uniforms = AsciiUniforms::default();
        prepare_uniforms(
            &mut uniforms,
            &options,
            &test_context(1.0),
            (800, 600),
            10,
            &mut registry,
        );
        assert_eq!(uniforms.active_ripples(), 1);
        assert_eq!(uniforms.pointer[..2], [0.3, 0.3]);

        mouse.set_enabled(false, &mut registry);
        ripples.set_enabled(false, &mut registry);
        prepare_uniforms(
            &mut uniforms,
            &options,
            &test_context(1.1),
            (800, 600),
            10,
            &mut registry,
        );
        assert_eq!(uniforms.pointer[..2], NO_POINTER);
        assert_eq!(uniforms.trail_length(), 0);
        assert!(!uniforms.ripple_enabled());
        assert_eq!(uniforms.active_ripples(), 0);
        assert_eq!(uniforms.audio_level(), 0.0);
        assert_eq!(uniforms.time(), 1.1);
    }
}
