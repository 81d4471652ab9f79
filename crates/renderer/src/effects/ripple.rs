use std::cell::RefCell;
use std::rc::Rc;

use super::EffectStatus;
use crate::grid::GridDimensions;
use crate::registry::{FrameContext, UniformRegistry};
use crate::uniforms::{AsciiUniforms, MAX_RIPPLES};

/// Seconds a ripple lingers after its ring has crossed the whole grid.
const FADE_MARGIN: f32 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ripple {
    pub origin: [f32; 2],
    pub start: f32,
}

#[derive(Debug)]
struct RippleState {
    /// Newest first.
    ripples: Vec<Ripple>,
    speed: f32,
}

impl RippleState {
    fn prune(&mut self, now: f32, lifetime: f32) {
        self.ripples.retain(|ripple| now - ripple.start < lifetime);
    }
}

/// Time a ring needs to cross `grid` at `speed` cells per second, plus fade.
pub fn ripple_lifetime(grid: GridDimensions, speed: f32) -> f32 {
    grid.diagonal() / speed.max(f32::EPSILON) + FADE_MARGIN
}

/// Rings expanding from click positions.
pub struct Ripples {
    state: Rc<RefCell<RippleState>>,
    enabled: bool,
}

impl Ripples {
    pub const WRITER_ID: &'static str = "ripple";

    pub fn new(speed: f32) -> Self {
        Self {
            state: Rc::new(RefCell::new(RippleState {
                ripples: Vec::with_capacity(MAX_RIPPLES),
                speed,
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
                move |ctx: &FrameContext, uniforms: &mut AsciiUniforms| {
                    let mut state = state.borrow_mut();
                    let lifetime = ripple_lifetime(ctx.grid, state.speed);
                    state.prune(ctx.time, lifetime);
                    uniforms.set_ripple_params(state.speed, lifetime);
                    for (index, ripple) in state.ripples.iter().enumerate() {
                        uniforms.set_ripple_slot(index, ripple.origin, ripple.start);
                    }
                },
            );
        } else {
            registry.unregister(Self::WRITER_ID);
            self.state.borrow_mut().ripples.clear();
        }
        tracing::debug!(enabled, "ripples toggled");
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn status(&self) -> EffectStatus {
        if !self.enabled {
            EffectStatus::Disabled
        } else if self.state.borrow().ripples.is_empty() {
            EffectStatus::Idle
        } else {
            EffectStatus::Active
        }
    }

    /// Starts a ripple at a normalised surface position at loop time `now`.
    pub fn click(&self, origin: [f32; 2], now: f32) {
        if !self.enabled {
            return;
        }
        let mut state = self.state.borrow_mut();
        state.ripples.insert(0, Ripple { origin, start: now });
        state.ripples.truncate(MAX_RIPPLES);
    }

    pub fn ripples(&self) -> Vec<Ripple> {
        self.state.borrow().ripples.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::test_context;

    fn enabled_ripples(speed: f32) -> (Ripples, UniformRegistry) {
        let mut registry = UniformRegistry::new();
        let mut ripples = Ripples::new(speed);
        ripples.set_enabled(true, &mut registry);
        (ripples, registry)
    }

    #[test]
    fn keeps_only_the_newest_eight() {
        let (ripples, _registry) = enabled_ripples(40.0);
        for i in 0..10 {
            ripples.click([0.1 * i as f32, 0.5], i as f32 * 0.01);
        }
        let kept = ripples.ripples();
        assert_eq!(kept.len(), MAX_RIPPLES);
        assert_eq!(kept[0].start, 9.0 * 0.01);
        assert_eq!(kept[7].start, 2.0 * 0.01);
    }

    #[test]
    fn lifetime_follows_grid_diagonal() {
        let grid = GridDimensions {
            columns: 30,
            rows: 40,
        };
        assert!((ripple_lifetime(grid, 10.0) - 6.0).abs() < 1e-5);
    }

    #[test]
    fn single_click_scenario() {
        // 120×45 grid at speed 40: diagonal ≈ 128.16, lifetime ≈ 4.204s.
        let (ripples, mut registry) = enabled_ripples(40.0);
        ripples.click([0.5, 0.5], 10.0);

        let mut uniforms = AsciiUniforms::default();
        registry.run_all(&test_context(11.0), &mut uniforms);
        assert!(uniforms.ripple_enabled());
        assert_eq!(uniforms.ripple[1], 40.0);
        assert_eq!(uniforms.active_ripples(), 1);
        assert_eq!(uniforms.ripples[0], [0.5, 0.5, 10.0, 1.0]);
        assert!((uniforms.ripple[3] - 4.204).abs() < 1e-2);

        let mut uniforms = AsciiUniforms::default();
        registry.run_all(&test_context(14.0), &mut uniforms);
        assert_eq!(uniforms.active_ripples(), 1);

        let mut uniforms = AsciiUniforms::default();
        registry.run_all(&test_context(14.3), &mut uniforms);
        assert_eq!(uniforms.active_ripples(), 0);
        assert!(ripples.ripples().is_empty());
        assert_eq!(ripples.status(), EffectStatus::Idle);
    }

    #[test]
    fn disabled_ripples_ignore_clicks() {
        let (mut ripples, mut registry) = enabled_ripples(40.0);
        ripples.click([0.1, 0.1], 0.0);
        ripples.set_enabled(false, &mut registry);
        assert!(ripples.ripples().is_empty());
        ripples.click([0.1, 0.1], 1.0);
        assert!(ripples.ripples().is_empty());
        assert!(!registry.contains(Ripples::WRITER_ID));
    }
}
