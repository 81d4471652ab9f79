use std::cell::RefCell;
use std::rc::Rc;

use super::EffectStatus;
use crate::registry::{FrameContext, UniformRegistry};
use crate::uniforms::{AsciiUniforms, MAX_TRAIL_LENGTH, NO_POINTER};

#[derive(Debug)]
struct TrailState {
    pointer: [f32; 2],
    /// Most recent first.
    trail: Vec<[f32; 2]>,
    trail_length: usize,
}

impl TrailState {
    fn has_pointer(&self) -> bool {
        self.pointer[0] >= 0.0
    }
}

/// Glow that follows the pointer and its recent positions.
pub struct MouseTrail {
    state: Rc<RefCell<TrailState>>,
    enabled: bool,
}

impl MouseTrail {
    pub const WRITER_ID: &'static str = "mouse-trail";

    pub fn new(trail_length: usize) -> Self {
        Self {
            state: Rc::new(RefCell::new(TrailState {
                pointer: NO_POINTER,
                trail: Vec::with_capacity(MAX_TRAIL_LENGTH),
                trail_length: trail_length.min(MAX_TRAIL_LENGTH),
            })),
            enabled: false,
        }
    }

    pub fn set_enabled(&mut self, enabled: bool, registry: &mut UniformRegistry) {
        if enabled == self.enabled {
            return;
        }
        self.enabled = enabled;
        if enabled {
            let state = self.state.clone();
            registry.register(
                Self::WRITER_ID,
                move |_: &FrameContext, uniforms: &mut AsciiUniforms| {
                    let state = state.borrow();
                    uniforms.set_pointer(state.pointer);
                    uniforms.set_trail(&state.trail);
                },
            );
        } else {
            registry.unregister(Self::WRITER_ID);
            self.pointer_left();
        }
        tracing::debug!(enabled, "mouse trail toggled");
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn status(&self) -> EffectStatus {
        if !self.enabled {
            EffectStatus::Disabled
        } else if self.state.borrow().has_pointer() {
            EffectStatus::Active
        } else {
            EffectStatus::Idle
        }
    }

    /// Records a pointer position in normalised `[0, 1]` surface coordinates.
    pub fn pointer_moved(&self, position: [f32; 2]) {
        if !self.enabled {
            return;
        }
        let mut state = self.state.borrow_mut();
        if state.has_pointer() {
            let previous = state.pointer;
            state.trail.insert(0, previous);
            let cap = state.trail_length;
            state.trail.truncate(cap);
        }
        state.pointer = position;
    }

    /// Pointer left the surface: forget the trail.
    pub fn pointer_left(&self) {
        let mut state = self.state.borrow_mut();
        state.pointer = NO_POINTER;
        state.trail.clear();
    }

    pub fn trail(&self) -> Vec<[f32; 2]> {
        self.state.borrow().trail.clone()
    }

    pub fn pointer(&self) -> [f32; 2] {
        self.state.borrow().pointer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::test_context;

    fn enabled_trail(length: usize) -> (MouseTrail, UniformRegistry) {
        let mut registry = UniformRegistry::new();
        let mut trail = MouseTrail::new(length);
        trail.set_enabled(true, &mut registry);
        (trail, registry)
    }

    #[test]
    fn trail_is_most_recent_first_and_capped() {
        let (trail, _registry) = enabled_trail(3);
        for i in 0..6 {
            trail.pointer_moved([i as f32 / 10.0, 0.5]);
        }
        assert_eq!(trail.pointer(), [0.5, 0.5]);
        assert_eq!(trail.trail(), vec![[0.4, 0.5], [0.3, 0.5], [0.2, 0.5]]);
    }

    #[test]
    fn requested_length_is_clamped_to_hard_cap() {
        let (trail, _registry) = enabled_trail(100);
        for i in 0..60 {
            trail.pointer_moved([i as f32 / 100.0, 0.1]);
        }
        assert_eq!(trail.trail().len(), MAX_TRAIL_LENGTH);
    }

    #[test]
    fn first_move_does_not_record_sentinel() {
        let (trail, _registry) = enabled_trail(8);
        trail.pointer_moved([0.2, 0.2]);
        assert!(trail.trail().is_empty());
        assert_eq!(trail.status(), EffectStatus::Active);
    }

    #[test]
    fn leave_resets_pointer_and_trail() {
        let (trail, mut registry) = enabled_trail(8);
        trail.pointer_moved([0.2, 0.2]);
        trail.pointer_moved([0.3, 0.3]);
        trail.pointer_left();
        assert_eq!(trail.pointer(), NO_POINTER);
        assert!(trail.trail().is_empty());
        assert_eq!(trail.status(), EffectStatus::Idle);

        let mut uniforms = AsciiUniforms::default();
        registry.run_all(&test_context(0.0), &mut uniforms);
        assert_eq!(uniforms.pointer[..2], NO_POINTER);
        assert_eq!(uniforms.trail_length(), 0);
        assert_eq!(uniforms.trail[0][..2], NO_POINTER);
    }

    #[test]
    fn writer_publishes_pointer_and_trail() {
        let (trail, mut registry) = enabled_trail(24);
        trail.pointer_moved([0.25, 0.75]);
        trail.pointer_moved([0.5, 0.5]);

        let mut uniforms = AsciiUniforms::default();
        registry.run_all(&test_context(0.0), &mut uniforms);
        assert_eq!(uniforms.pointer[..3], [0.5, 0.5, 1.0]);
        assert_eq!(uniforms.trail[0][..2], [0.25, 0.75]);
        assert_eq!(uniforms.trail[1][..2], NO_POINTER);

        trail.pointer_moved([0.75, 0.25]);
        registry.run_all(&test_context(0.1), &mut uniforms);
        assert_eq!(uniforms.trail_length(), 2);
    }

    #[test]
    fn disabled_trail_ignores_input_and_unregisters() {
        let (mut trail, mut registry) = enabled_trail(8);
        trail.pointer_moved([0.2, 0.2]);
        trail.set_enabled(false, &mut registry);
        assert!(!registry.contains(MouseTrail::WRITER_ID));
        assert_eq!(trail.status(), EffectStatus::Disabled);

        trail.pointer_moved([0.4, 0.4]);
        assert_eq!(trail.pointer(), NO_POINTER);
    }
}
