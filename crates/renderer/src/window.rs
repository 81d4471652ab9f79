use std::sync::Arc;
use std::time::Instant;

use anyhow::{anyhow, Context, Result};
use winit::dpi::{PhysicalPosition, PhysicalSize};
use winit::event::{ElementState, Event, MouseButton, WindowEvent};
use winit::event_loop::{ControlFlow, EventLoopBuilder};
use winit::keyboard::{Key, NamedKey};
use winit::window::{Window, WindowBuilder};

use tracing::{debug, error, info, warn};

use crate::atlas::FontStack;
use crate::effects::Effects;
use crate::gpu::{GpuState, IdleReason, TickInputs, TickOutcome};
use crate::media::{open_media, MediaSource};
use crate::registry::UniformRegistry;
use crate::runtime::{LoopControl, SystemTimeSource, TimeSource};
use crate::types::{PlaybackOptions, RenderOptions, RendererConfig};

/// Columns added or removed per `[` / `]` press.
const COLUMN_STEP: u32 = 10;

/// Keyboard commands understood by the preview window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum KeyAction {
    TogglePlayback,
    CycleCharset,
    FewerColumns,
    MoreColumns,
    ToggleMouse,
    ToggleRipple,
    ToggleAudio,
    Quit,
}

impl KeyAction {
    pub(crate) fn from_key(key: &Key) -> Option<Self> {
        match key {
            Key::Named(NamedKey::Escape) => Some(KeyAction::Quit),
            Key::Named(NamedKey::Space) => Some(KeyAction::TogglePlayback),
            Key::Character(value) => match value.as_str() {
                " " => Some(KeyAction::TogglePlayback),
                "c" | "C" => Some(KeyAction::CycleCharset),
                "[" => Some(KeyAction::FewerColumns),
                "]" => Some(KeyAction::MoreColumns),
                "m" | "M" => Some(KeyAction::ToggleMouse),
                "r" | "R" => Some(KeyAction::ToggleRipple),
                "a" | "A" => Some(KeyAction::ToggleAudio),
                _ => None,
            },
            _ => None,
        }
    }
}

/// Maps a cursor position to `[0, 1]` surface coordinates with a top-left
/// origin.
pub(crate) fn normalize_cursor(
    position: PhysicalPosition<f64>,
    size: PhysicalSize<u32>,
) -> Option<[f32; 2]> {
    if size.width == 0 || size.height == 0 {
        return None;
    }
    let x = (position.x / size.width as f64).clamp(0.0, 1.0) as f32;
    let y = (position.y / size.height as f64).clamp(0.0, 1.0) as f32;
    Some([x, y])
}

/// Aggregates GPU state, media and effects for the preview window.
struct WindowState {
    window: Arc<Window>,
    title: String,
    gpu: Option<GpuState>,
    media: Box<dyn MediaSource>,
    registry: UniformRegistry,
    effects: Effects,
    fonts: Option<FontStack>,
    options: RenderOptions,
    playback: PlaybackOptions,
    clock: SystemTimeSource,
    control: LoopControl,
    cursor: Option<[f32; 2]>,
    last_idle: Option<IdleReason>,
}

impl WindowState {
    fn new(
        window: Arc<Window>,
        title: String,
        config: &RendererConfig,
        media: Box<dyn MediaSource>,
    ) -> Result<Self> {
        let size = window.inner_size();
        let gpu = GpuState::new(window.as_ref(), size, config.gpu_power)?;

        let fonts = match FontStack::discover(config.render.font_path.as_deref()) {
            Ok(fonts) => Some(fonts),
            Err(err) => {
                error!(error = %err, "no font available for the glyph atlas; renderer stays idle");
                None
            }
        };

        let mut registry = UniformRegistry::new();
        let effects = Effects::new(&config.effects, &mut registry);

        let mut state = Self {
            window,
            title,
            gpu: Some(gpu),
            media,
            registry,
            effects,
            fonts,
            options: config.render.clone(),
            playback: config.playback,
            clock: SystemTimeSource::new(),
            control: LoopControl::default(),
            cursor: None,
            last_idle: None,
        };
        state.rebuild_atlas();
        if state.playback.autoplay {
            state.start_playback(Instant::now());
        }
        Ok(state)
    }

    fn window(&self) -> &Window {
        self.window.as_ref()
    }

    fn rebuild_atlas(&mut self) {
        let (Some(gpu), Some(fonts)) = (self.gpu.as_mut(), self.fonts.as_mut()) else {
            return;
        };
        let charset = self.options.charset;
        match gpu.rebuild_atlas(charset, self.options.cell_size, fonts) {
            Ok(()) => info!(%charset, "glyph atlas ready"),
            Err(err) => {
                error!(error = %err, %charset, "failed to build glyph atlas");
                if let Some(previous) = gpu.atlas_charset() {
                    self.options.charset = previous;
                }
            }
        }
    }

    fn start_playback(&mut self, now: Instant) {
        match self.media.play(now) {
            Ok(()) => {
                debug!(source = %self.media.describe(), "playback started");
                self.effects.audio.connect(self.media.as_mut());
            }
            Err(err) => warn!(error = %err, "playback was rejected"),
        }
    }

    fn toggle_playback(&mut self) {
        let now = Instant::now();
        if self.media.is_playing() {
            self.media.pause(now);
            self.effects.audio.suspend();
            debug!("playback paused");
        } else {
            self.start_playback(now);
        }
    }

    fn handle_key(&mut self, action: KeyAction) -> bool {
        match action {
            KeyAction::Quit => return false,
            KeyAction::TogglePlayback => {
                if self.playback.spacebar_toggle {
                    self.toggle_playback();
                }
            }
            KeyAction::CycleCharset => {
                self.options.charset = self.options.charset.next();
                self.rebuild_atlas();
            }
            KeyAction::FewerColumns => {
                self.options.columns = self
                    .options
                    .columns
                    .saturating_sub(COLUMN_STEP)
                    .max(COLUMN_STEP);
                info!(columns = self.options.columns, "column count changed");
            }
            KeyAction::MoreColumns => {
                self.options.columns = self.options.columns.saturating_add(COLUMN_STEP);
                info!(columns = self.options.columns, "column count changed");
            }
            KeyAction::ToggleMouse => {
                let enabled = !self.effects.mouse.is_enabled();
                self.effects.mouse.set_enabled(enabled, &mut self.registry);
                if enabled {
                    if let Some(cursor) = self.cursor {
                        self.effects.mouse.pointer_moved(cursor);
                    }
                }
            }
            KeyAction::ToggleRipple => {
                let enabled = !self.effects.ripple.is_enabled();
                self.effects.ripple.set_enabled(enabled, &mut self.registry);
            }
            KeyAction::ToggleAudio => {
                let enabled = !self.effects.audio.is_enabled();
                self.effects.audio.set_enabled(enabled, &mut self.registry);
                if enabled && self.media.is_playing() {
                    self.effects.audio.connect(self.media.as_mut());
                }
            }
        }
        true
    }

    fn handle_cursor_moved(&mut self, position: PhysicalPosition<f64>) {
        self.cursor = normalize_cursor(position, self.window.inner_size());
        if let Some(cursor) = self.cursor {
            self.effects.mouse.pointer_moved(cursor);
        }
    }

    fn handle_cursor_left(&mut self) {
        self.cursor = None;
        self.effects.mouse.pointer_left();
    }

    fn handle_click(&mut self) {
        if let Some(cursor) = self.cursor {
            self.effects.ripple.click(cursor, self.clock.peek());
        }
    }

    fn resize(&mut self, new_size: PhysicalSize<u32>) {
        if let Some(gpu) = self.gpu.as_mut() {
            gpu.resize(new_size);
        }
    }

    fn size(&self) -> PhysicalSize<u32> {
        self.gpu
            .as_ref()
            .map(GpuState::size)
            .unwrap_or_else(|| self.window.inner_size())
    }

    fn render_frame(&mut self) -> Result<(), wgpu::SurfaceError> {
        if !self.control.should_tick() {
            return Ok(());
        }
        let Some(gpu) = self.gpu.as_mut() else {
            return Ok(());
        };
        let sample = self.clock.sample();
        let outcome = gpu.tick(TickInputs {
            media: self.media.as_mut(),
            registry: &mut self.registry,
            options: &self.options,
            time: sample.seconds,
            now: Instant::now(),
        })?;

        match outcome {
            TickOutcome::Idle(reason) => {
                if self.last_idle != Some(reason) {
                    debug!(?reason, "render loop idle");
                    self.last_idle = Some(reason);
                }
            }
            TickOutcome::Rendered { stats, .. } => {
                self.last_idle = None;
                if let (true, Some(stats)) = (self.playback.show_stats, stats) {
                    self.window.set_title(&format!("{} | {stats}", self.title));
                }
            }
        }
        Ok(())
    }

    fn reconfigure(&mut self) {
        if let Some(gpu) = self.gpu.as_mut() {
            gpu.reconfigure();
        }
    }

    /// Stops playback, unregisters every effect and frees GPU resources.
    /// Later ticks are no-ops.
    fn teardown(&mut self) {
        if self.control.is_torn_down() {
            return;
        }
        self.control.teardown();
        self.effects.disable_all(&mut self.registry);
        self.media.pause(Instant::now());
        if let Some(gpu) = self.gpu.take() {
            gpu.release();
        }
        info!("renderer torn down");
    }
}

/// Opens the media, creates the window and drives the render loop until the
/// window closes.
pub(crate) fn run_window(config: RendererConfig) -> Result<()> {
    let media = open_media(&config.media, config.playback.looping)
        .with_context(|| format!("failed to open media {}", config.media.display()))?;
    info!(source = %media.describe(), "opened media");

    let event_loop = EventLoopBuilder::new()
        .build()
        .map_err(|err| anyhow!("failed to create event loop: {err}"))?;

    let title = match config.media.file_name() {
        Some(name) => format!("glyphcast: {}", name.to_string_lossy()),
        None => "glyphcast".to_string(),
    };
    let window_size = PhysicalSize::new(config.surface_size.0, config.surface_size.1);
    let window = WindowBuilder::new()
        .with_title(title.clone())
        .with_inner_size(window_size)
        .build(&event_loop)
        .map_err(|err| anyhow!("failed to create window: {err}"))?;
    let window = Arc::new(window);

    let mut state = WindowState::new(window, title, &config, media)
        .context("failed to initialise window renderer")?;
    state.window().request_redraw();

    let run_result = event_loop.run(move |event, elwt| match event {
        Event::WindowEvent { window_id, event } if window_id == state.window().id() => {
            match event {
                WindowEvent::CloseRequested | WindowEvent::Destroyed => {
                    state.teardown();
                    elwt.exit();
                }
                WindowEvent::KeyboardInput { event, .. } => {
                    if event.state != ElementState::Pressed || event.repeat {
                        return;
                    }
                    if let Some(action) = KeyAction::from_key(&event.logical_key) {
                        if !state.handle_key(action) {
                            state.teardown();
                            elwt.exit();
                        }
                    }
                }
                WindowEvent::CursorMoved { position, .. } => {
                    state.handle_cursor_moved(position);
                }
                WindowEvent::CursorLeft { .. } => {
                    state.handle_cursor_left();
                }
                WindowEvent::MouseInput {
                    state: ElementState::Pressed,
                    button: MouseButton::Left,
                    ..
                } => {
                    state.handle_click();
                }
                WindowEvent::Resized(new_size) => {
                    state.resize(new_size);
                }
                WindowEvent::ScaleFactorChanged {
                    mut inner_size_writer,
                    ..
                } => {
                    let _ = inner_size_writer.request_inner_size(state.size());
                }
                WindowEvent::Occluded(occluded) => {
                    if occluded {
                        state.control.pause();
                    } else {
                        state.control.resume();
                    }
                    debug!(occluded, "window visibility changed");
                }
                WindowEvent::RedrawRequested => match state.render_frame() {
                    Ok(()) => {}
                    Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                        state.reconfigure();
                    }
                    Err(wgpu::SurfaceError::OutOfMemory) => {
                        error!("surface out of memory; exiting");
                        state.teardown();
                        elwt.exit();
                    }
                    Err(wgpu::SurfaceError::Timeout) => {
                        debug!("surface timeout; retrying next frame");
                    }
                    Err(other) => {
                        warn!(error = ?other, "surface error; retrying next frame");
                    }
                },
                _ => {}
            }
        }
        Event::AboutToWait => {
            if state.control.should_tick() {
                state.window().request_redraw();
            }
            elwt.set_control_flow(ControlFlow::Wait);
        }
        Event::LoopExiting => {
            state.teardown();
        }
        _ => {}
    });

    run_result.map_err(|err| anyhow!("window event loop error: {err}"))
}

#[cfg(test)]
mod tests {
    use winit::keyboard::SmolStr;

    use super::*;

    #[test]
    fn maps_interactive_keys() {
        let key = |value: &str| Key::Character(SmolStr::new(value));
        assert_eq!(KeyAction::from_key(&key("c")), Some(KeyAction::CycleCharset));
        assert_eq!(KeyAction::from_key(&key("[")), Some(KeyAction::FewerColumns));
        assert_eq!(KeyAction::from_key(&key("]")), Some(KeyAction::MoreColumns));
        assert_eq!(KeyAction::from_key(&key("M")), Some(KeyAction::ToggleMouse));
        assert_eq!(KeyAction::from_key(&key("r")), Some(KeyAction::ToggleRipple));
        assert_eq!(KeyAction::from_key(&key("a")), Some(KeyAction::ToggleAudio));
        assert_eq!(KeyAction::from_key(&key("x")), None);
        assert_eq!(
            KeyAction::from_key(&Key::Named(NamedKey::Space)),
            Some(KeyAction::TogglePlayback)
        );
        assert_eq!(
            KeyAction::from_key(&Key::Named(NamedKey::Escape)),
            Some(KeyAction::Quit)
        );
    }

    #[test]
    fn cursor_is_normalised_with_top_left_origin() {
        let size = PhysicalSize::new(800, 600);
        assert_eq!(
            normalize_cursor(PhysicalPosition::new(400.0, 150.0), size),
            Some([0.5, 0.25])
        );
        assert_eq!(
            normalize_cursor(PhysicalPosition::new(-5.0, 900.0), size),
            Some([0.0, 1.0])
        );
        assert_eq!(
            normalize_cursor(PhysicalPosition::new(1.0, 1.0), PhysicalSize::new(0, 0)),
            None
        );
    }
}
