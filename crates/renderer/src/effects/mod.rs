//! Interactive effects layered on top of the base glyph render.
//!
//! Each effect owns its state behind an `Rc<RefCell<_>>` shared with the one
//! writer it registers in the [`UniformRegistry`](crate::registry::UniformRegistry).
//! Input handlers mutate the state; the writer copies it into the uniform
//! block once per tick. Disabling an effect unregisters its writer, and the
//! render loop resets the fields it owned back to neutral on the next tick.

mod audio;
mod mouse;
mod ripple;

pub use audio::AudioReactivity;
pub use mouse::MouseTrail;
pub use ripple::Ripples;

use crate::registry::UniformRegistry;
use crate::types::EffectsConfig;

/// Coarse lifecycle of an effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EffectStatus {
    /// No writer registered.
    Disabled,
    /// Writer registered but currently contributing neutral values.
    Idle,
    /// Writer registered and shaping the output.
    Active,
}

/// All effects driven by the window.
pub struct Effects {
    pub mouse: MouseTrail,
    pub ripple: Ripples,
    pub audio: AudioReactivity,
}

impl Effects {
    /// Builds the effects and registers those enabled in `config`.
    pub fn new(config: &EffectsConfig, registry: &mut UniformRegistry) -> Self {
        let mut effects = Self {
            mouse: MouseTrail::new(config.mouse.trail_length),
            ripple: Ripples::new(config.ripple.speed),
            audio: AudioReactivity::new(config.audio.reactivity, config.audio.sensitivity),
        };
        effects.mouse.set_enabled(config.mouse.enabled, registry);
        effects.ripple.set_enabled(config.ripple.enabled, registry);
        effects.audio.set_enabled(config.audio.enabled, registry);
        effects
    }

    /// Unregisters every writer. Used on teardown.
    pub fn disable_all(&mut self, registry: &mut UniformRegistry) {
        self.mouse.set_enabled(false, registry);
        self.ripple.set_enabled(false, registry);
        self.audio.set_enabled(false, registry);
    }
}
