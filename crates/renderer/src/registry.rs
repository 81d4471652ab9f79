//! Named per-frame uniform writers.
//!
//! Effects never talk to each other or to the render loop directly. Each one
//! registers a single writer under a stable id; once per tick the render loop
//! resets effect fields to neutral and runs every writer in registration
//! order against the shared [`AsciiUniforms`] block before the single draw.

use crate::grid::GridDimensions;
use crate::uniforms::AsciiUniforms;

/// Read-only facts about the tick being rendered.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameContext {
    /// Seconds since the render loop started.
    pub time: f32,
    /// Playback position of the source media in seconds.
    pub media_time: f32,
    pub grid: GridDimensions,
    /// Output surface size in physical pixels.
    pub surface: (u32, u32),
}

/// Contribution of one effect to the shared uniform block.
pub trait UniformWriter {
    fn write(&mut self, ctx: &FrameContext, uniforms: &mut AsciiUniforms);
}

impl<F> UniformWriter for F
where
    F: FnMut(&FrameContext, &mut AsciiUniforms),
{
    fn write(&mut self, ctx: &FrameContext, uniforms: &mut AsciiUniforms) {
        self(ctx, uniforms)
    }
}

struct Entry {
    id: String,
    writer: Box<dyn UniformWriter>,
}

/// Ordered id → writer map.
#[derive(Default)]
pub struct UniformRegistry {
    entries: Vec<Entry>,
}

impl UniformRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `writer` under `id`. An existing writer with the same id is
    /// replaced in its original slot.
    pub fn register<W>(&mut self, id: impl Into<String>, writer: W)
    where
        W: UniformWriter + 'static,
    {
        let id = id.into();
        let writer: Box<dyn UniformWriter> = Box::new(writer);
        match self.entries.iter_mut().find(|entry| entry.id == id) {
            Some(entry) => {
                tracing::trace!(%id, "replacing uniform writer");
                entry.writer = writer;
            }
            None => {
                tracing::trace!(%id, "registering uniform writer");
                self.entries.push(Entry { id, writer });
            }
        }
    }

    /// Removes the writer for `id`; unknown ids are ignored.
    pub fn unregister(&mut self, id: &str) -> bool {
        let before = self.entries.len();
        self.entries.retain(|entry| entry.id != id);
        let removed = self.entries.len() != before;
        if removed {
            tracing::trace!(%id, "unregistered uniform writer");
        }
        removed
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.iter().any(|entry| entry.id == id)
    }

    pub fn run_all(&mut self, ctx: &FrameContext, uniforms: &mut AsciiUniforms) {
        for entry in &mut self.entries {
            entry.writer.write(ctx, uniforms);
        }
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|entry| entry.id.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl std::fmt::Debug for UniformRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.ids()).finish()
    }
}

#[cfg(test)]
pub(crate) fn test_context(time: f32) -> FrameContext {
    FrameContext {
        time,
        media_time: time,
        grid: GridDimensions {
            columns: 120,
            rows: 45,
        },
        surface: (800, 600),
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;

    #[test]
    fn writers_run_in_registration_order() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut registry = UniformRegistry::new();
        for id in ["a", "b", "c"] {
            let log = log.clone();
            registry.register(id, move |_: &FrameContext, _: &mut AsciiUniforms| {
                log.borrow_mut().push(id);
            });
        }

        registry.run_all(&test_context(0.0), &mut AsciiUniforms::default());
        assert_eq!(*log.borrow(), vec!["a", "b", "c"]);
    }

    #[test]
    fn re_register_replaces_in_place() {
        let mut registry = UniformRegistry::new();
        registry.register("first", |_: &FrameContext, u: &mut AsciiUniforms| {
            u.set_audio(0.1, 0.0, 0.0)
        });
        registry.register("second", |_: &FrameContext, u: &mut AsciiUniforms| {
            u.set_audio(u.audio_level() + 1.0, 0.0, 0.0)
        });
        registry.register("first", |_: &FrameContext, u: &mut AsciiUniforms| {
            u.set_audio(0.5, 0.0, 0.0)
        });

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.ids().collect::<Vec<_>>(), vec!["first", "second"]);

        let mut uniforms = AsciiUniforms::default();
        registry.run_all(&test_context(0.0), &mut uniforms);
        assert_eq!(uniforms.audio_level(), 1.5);
    }

    #[test]
    fn unregister_unknown_is_noop() {
        let mut registry = UniformRegistry::new();
        registry.register("mouse", |_: &FrameContext, _: &mut AsciiUniforms| {});
        assert!(!registry.unregister("ripple"));
        assert!(registry.unregister("mouse"));
        assert!(registry.is_empty());
        assert!(!registry.unregister("mouse"));
    }
}
