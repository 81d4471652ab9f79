use bytemuck::{Pod, Zeroable};

/// Hard cap on trail positions the shader iterates over.
pub const MAX_TRAIL_LENGTH: usize = 24;
/// Hard cap on simultaneously visible ripples.
pub const MAX_RIPPLES: usize = 8;

/// Pointer coordinate meaning "not over the surface".
pub const NO_POINTER: [f32; 2] = [-1.0, -1.0];

/// Per-frame shader inputs shared by the base renderer and every effect.
///
/// Every member is a `vec4` so the Rust layout matches std140 without manual
/// padding. The GLSL block in `compile.rs` must stay in the same order.
#[repr(C, align(16))]
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AsciiUniforms {
    /// xy: output size in pixels, zw: source size in pixels.
    pub surface: [f32; 4],
    /// x: columns, y: rows, z: glyph count.
    pub grid: [f32; 4],
    /// x: brightness, y: blend, z: highlight, w: coloured flag.
    pub tone: [f32; 4],
    /// rgb: monochrome foreground, w: dither mode.
    pub ink: [f32; 4],
    /// xy: pointer in normalised surface space, z: trail length.
    pub pointer: [f32; 4],
    /// x: enabled flag, y: speed in cells/second, z: time, w: lifetime.
    pub ripple: [f32; 4],
    /// x: smoothed level, y: reactivity, z: sensitivity.
    pub audio: [f32; 4],
    /// xy of each trail entry, most recent first.
    pub trail: [[f32; 4]; MAX_TRAIL_LENGTH],
    /// xy: origin, z: start time, w: active flag.
    pub ripples: [[f32; 4]; MAX_RIPPLES],
}

unsafe impl Zeroable for AsciiUniforms {}
unsafe impl Pod for AsciiUniforms {}

impl Default for AsciiUniforms {
    fn default() -> Self {
        let mut uniforms = Self::zeroed();
        uniforms.tone = [1.0, 0.0, 0.0, 1.0];
        uniforms.ink = [1.0, 1.0, 1.0, 0.0];
        uniforms.reset_effects();
        uniforms
    }
}

impl AsciiUniforms {
    /// Restores every effect-owned field to its neutral value.
    ///
    /// Called at the start of each tick so a writer that was unregistered
    /// leaves no stale state behind.
    pub fn reset_effects(&mut self) {
        self.pointer = [NO_POINTER[0], NO_POINTER[1], 0.0, 0.0];
        self.trail = [[NO_POINTER[0], NO_POINTER[1], 0.0, 0.0]; MAX_TRAIL_LENGTH];
        self.ripple = [0.0, 0.0, self.ripple[2], 0.0];
        self.ripples = [[0.0; 4]; MAX_RIPPLES];
        self.audio = [0.0; 4];
    }

    pub fn set_surface(&mut self, output: (u32, u32), source: (u32, u32)) {
        self.surface = [
            output.0 as f32,
            output.1 as f32,
            source.0 as f32,
            source.1 as f32,
        ];
    }

    pub fn set_grid(&mut self, columns: u32, rows: u32, glyph_count: usize) {
        self.grid = [columns as f32, rows as f32, glyph_count as f32, 0.0];
    }

    pub fn set_tone(&mut self, brightness: f32, blend: f32, highlight: f32, colored: bool) {
        self.tone = [
            brightness,
            blend.clamp(0.0, 1.0),
            highlight.clamp(0.0, 1.0),
            if colored { 1.0 } else { 0.0 },
        ];
    }

    pub fn set_ink(&mut self, foreground: [f32; 3], dither_mode: u32) {
        self.ink = [foreground[0], foreground[1], foreground[2], dither_mode as f32];
    }

    pub fn set_time(&mut self, seconds: f32) {
        self.ripple[2] = seconds;
    }

    pub fn time(&self) -> f32 {
        self.ripple[2]
    }

    pub fn set_pointer(&mut self, position: [f32; 2]) {
        self.pointer[0] = position[0];
        self.pointer[1] = position[1];
    }

    /// Writes `positions` into the trail slots; unused slots get [`NO_POINTER`].
    /// The published length is the number of recorded positions.
    pub fn set_trail(&mut self, positions: &[[f32; 2]]) {
        self.pointer[2] = positions.len().min(MAX_TRAIL_LENGTH) as f32;
        for (index, slot) in self.trail.iter_mut().enumerate() {
            let point = positions.get(index).copied().unwrap_or(NO_POINTER);
            *slot = [point[0], point[1], 0.0, 0.0];
        }
    }

    pub fn set_ripple_params(&mut self, speed: f32, lifetime: f32) {
        self.ripple[0] = 1.0;
        self.ripple[1] = speed;
        self.ripple[3] = lifetime;
    }

    pub fn set_ripple_slot(&mut self, index: usize, origin: [f32; 2], start: f32) {
        if let Some(slot) = self.ripples.get_mut(index) {
            *slot = [origin[0], origin[1], start, 1.0];
        }
    }

    pub fn set_audio(&mut self, level: f32, reactivity: f32, sensitivity: f32) {
        self.audio = [level, reactivity, sensitivity, 0.0];
    }

    pub fn trail_length(&self) -> usize {
        self.pointer[2] as usize
    }

    pub fn ripple_enabled(&self) -> bool {
        self.ripple[0] > 0.5
    }

    pub fn active_ripples(&self) -> usize {
        self.ripples.iter().filter(|slot| slot[3] > 0.5).count()
    }

    pub fn audio_level(&self) -> f32 {
        self.audio[0]
    }
}
