use std::cell::RefCell;
use std::rc::Rc;

use super::EffectStatus;
use crate::media::audio::average_level;
use crate::media::{AudioError, FrequencyTap, MediaId, MediaSource};
use crate::registry::{FrameContext, UniformRegistry};
use crate::uniforms::AsciiUniforms;

/// Weight of the previous level in the exponential smoothing.
const LEVEL_RETAIN: f32 = 0.7;

struct AudioState {
    level: f32,
    reactivity: f32,
    sensitivity: f32,
    tap: Option<Box<dyn FrequencyTap>>,
    connected: Option<MediaId>,
    bins: Vec<u8>,
}

impl AudioState {
    fn sample(&mut self, media_time: f32) {
        let Some(tap) = self.tap.as_mut() else {
            return;
        };
        self.bins.resize(tap.frequency_bin_count(), 0);
        tap.byte_frequency_data(media_time, &mut self.bins);
        let average = average_level(&self.bins);
        self.level = LEVEL_RETAIN * self.level + (1.0 - LEVEL_RETAIN) * average;
    }
}

/// Scales glyph intensity with the loudness of the source soundtrack.
pub struct AudioReactivity {
    state: Rc<RefCell<AudioState>>,
    enabled: bool,
}

impl AudioReactivity {
    pub const WRITER_ID: &'static str = "audio";

    /// `reactivity` and `sensitivity` are percentages in `0..=100`.
    pub fn new(reactivity: f32, sensitivity: f32) -> Self {
        Self {
            state: Rc::new(RefCell::new(AudioState {
                level: 0.0,
                reactivity: reactivity.clamp(0.0, 100.0),
                sensitivity: sensitivity.clamp(0.0, 100.0),
                tap: None,
                connected: None,
                bins: Vec::new(),
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
                    state.sample(ctx.media_time);
                    uniforms.set_audio(
                        state.level,
                        state.reactivity / 100.0,
                        state.sensitivity / 100.0,
                    );
                },
            );
        } else {
            registry.unregister(Self::WRITER_ID);
            let mut state = self.state.borrow_mut();
            if let Some(tap) = state.tap.as_mut() {
                tap.suspend();
            }
            state.level = 0.0;
        }
        tracing::debug!(enabled, "audio reactivity toggled");
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn status(&self) -> EffectStatus {
        if !self.enabled {
            return EffectStatus::Disabled;
        }
        let state = self.state.borrow();
        match &state.tap {
            Some(tap) if tap.is_running() => EffectStatus::Active,
            _ => EffectStatus::Idle,
        }
    }

    /// Routes `media` into the analyser. Called when playback starts.
    ///
    /// A source is attached at most once; connecting the same source again
    /// only resumes the existing tap. A source without audio is remembered
    /// and left idle; any other failure is logged and retried on the next
    /// call.
    pub fn connect(&self, media: &mut dyn MediaSource) {
        if !self.enabled {
            return;
        }
        let mut state = self.state.borrow_mut();
        if state.connected == Some(media.id()) {
            if let Some(tap) = state.tap.as_mut() {
                tap.resume();
            }
            return;
        }

        state.level = 0.0;
        state.tap = None;
        state.connected = None;
        match media.attach_audio() {
            Ok(mut tap) => {
                tap.resume();
                tracing::info!(source = %media.describe(), "audio analysis connected");
                state.tap = Some(tap);
                state.connected = Some(media.id());
            }
            Err(AudioError::NoAudioTrack(path)) => {
                tracing::info!(path = %path.display(), "source has no audio; audio effect idle");
                state.connected = Some(media.id());
            }
            Err(err) => {
                tracing::warn!(error = %err, "failed to connect audio analysis");
            }
        }
    }

    /// Playback paused; stop sampling until the next `connect`.
    pub fn suspend(&self) {
        if let Some(tap) = self.state.borrow_mut().tap.as_mut() {
            tap.suspend();
        }
    }

    pub fn level(&self) -> f32 {
        self.state.borrow().level
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::time::Instant;

    use super::*;
    use crate::media::{Frame, PlaybackError};
    use crate::registry::test_context;

    struct ConstantTap {
        value: u8,
        running: bool,
    }

    impl FrequencyTap for ConstantTap {
        fn resume(&mut self) {
            self.running = true;
        }
        fn suspend(&mut self) {
            self.running = false;
        }
        fn is_running(&self) -> bool {
            self.running
        }
        fn frequency_bin_count(&self) -> usize {
            128
        }
        fn byte_frequency_data(&mut self, _media_time: f32, out: &mut [u8]) {
            out.fill(if self.running { self.value } else { 0 });
        }
    }

    struct FakeMedia {
        id: MediaId,
        attaches: Rc<Cell<u32>>,
        attached: bool,
        failures: u32,
        has_audio: bool,
    }

    impl MediaSource for FakeMedia {
        fn id(&self) -> MediaId {
            self.id
        }
        fn intrinsic_size(&self) -> Option<(u32, u32)> {
            Some((4, 4))
        }
        fn poll_frame(&mut self, _now: Instant) -> Option<&Frame> {
            None
        }
        fn play(&mut self, _now: Instant) -> Result<(), PlaybackError> {
            Ok(())
        }
        fn pause(&mut self, _now: Instant) {}
        fn is_playing(&self) -> bool {
            true
        }
        fn media_time(&self, _now: Instant) -> f32 {
            0.0
        }
        fn attach_audio(&mut self) -> Result<Box<dyn FrequencyTap>, AudioError> {
            self.attaches.set(self.attaches.get() + 1);
            if !self.has_audio {
                return Err(AudioError::NoAudioTrack("silent.mp4".into()));
            }
            if self.failures > 0 {
                self.failures -= 1;
                return Err(AudioError::Decode("device busy".into()));
            }
            if self.attached {
                return Err(AudioError::AlreadyAttached);
            }
            self.attached = true;
            Ok(Box::new(ConstantTap {
                value: 255,
                running: false,
            }))
        }
        fn describe(&self) -> String {
            "fake".into()
        }
    }

    fn fake_media() -> (FakeMedia, Rc<Cell<u32>>) {
        let attaches = Rc::new(Cell::new(0));
        (
            FakeMedia {
                id: MediaId::next(),
                attaches: attaches.clone(),
                attached: false,
                failures: 0,
                has_audio: true,
            },
            attaches,
        )
    }

    #[test]
    fn level_is_smoothed_towards_average() {
        let mut registry = UniformRegistry::new();
        let mut audio = AudioReactivity::new(50.0, 80.0);
        audio.set_enabled(true, &mut registry);
        let (mut media, _) = fake_media();
        audio.connect(&mut media);

        let mut uniforms = AsciiUniforms::default();
        registry.run_all(&test_context(0.0), &mut uniforms);
        assert!((uniforms.audio_level() - 0.3).abs() < 1e-6);
        assert_eq!(uniforms.audio[1], 0.5);
        assert_eq!(uniforms.audio[2], 0.8);

        registry.run_all(&test_context(0.1), &mut uniforms);
        assert!((uniforms.audio_level() - 0.51).abs() < 1e-6);
        assert_eq!(audio.status(), EffectStatus::Active);
    }

    #[test]
    fn reconnecting_same_source_resumes_instead_of_reattaching() {
        let mut registry = UniformRegistry::new();
        let mut audio = AudioReactivity::new(50.0, 50.0);
        audio.set_enabled(true, &mut registry);
        let (mut media, attaches) = fake_media();

        audio.connect(&mut media);
        audio.suspend();
        assert_eq!(audio.status(), EffectStatus::Idle);
        audio.connect(&mut media);

        assert_eq!(attaches.get(), 1);
        assert_eq!(audio.status(), EffectStatus::Active);
    }

    #[test]
    fn failed_attach_is_retried_on_next_connect() {
        let mut registry = UniformRegistry::new();
        let mut audio = AudioReactivity::new(50.0, 50.0);
        audio.set_enabled(true, &mut registry);
        let (mut media, attaches) = fake_media();
        media.failures = 1;

        audio.connect(&mut media);
        assert_eq!(audio.status(), EffectStatus::Idle);

        audio.connect(&mut media);
        assert_eq!(attaches.get(), 2);
        assert_eq!(audio.status(), EffectStatus::Active);
    }

    #[test]
    fn source_without_audio_is_not_attached_again() {
        let mut registry = UniformRegistry::new();
        let mut audio = AudioReactivity::new(50.0, 50.0);
        audio.set_enabled(true, &mut registry);
        let (mut media, attaches) = fake_media();
        media.has_audio = false;

        audio.connect(&mut media);
        audio.connect(&mut media);
        assert_eq!(attaches.get(), 1);
        assert_eq!(audio.status(), EffectStatus::Idle);
    }

    #[test]
    fn without_audio_the_effect_stays_idle() {
        let mut registry = UniformRegistry::new();
        let mut audio = AudioReactivity::new(50.0, 50.0);
        audio.set_enabled(true, &mut registry);

        let mut uniforms = AsciiUniforms::default();
        registry.run_all(&test_context(0.0), &mut uniforms);
        assert_eq!(uniforms.audio_level(), 0.0);
        assert_eq!(uniforms.audio[1], 0.5);
        assert_eq!(audio.status(), EffectStatus::Idle);
    }

    #[test]
    fn disabled_effect_never_connects() {
        let audio = AudioReactivity::new(50.0, 50.0);
        let (mut media, attaches) = fake_media();
        audio.connect(&mut media);
        assert_eq!(attaches.get(), 0);
        assert_eq!(audio.status(), EffectStatus::Disabled);
    }
}
