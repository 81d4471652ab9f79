//! Source media collaborators.
//!
//! - `video` streams decoded frames from an `ffmpeg` subprocess on a worker
//!   thread and paces them against a [`PlaybackClock`].
//! - `audio` decodes the soundtrack to mono PCM and exposes WebAudio-style
//!   byte frequency data through [`FrequencyTap`].
//!
//! The render thread only ever sees the [`MediaSource`] trait: it polls for
//! the latest frame once per tick and never blocks on decoding.

pub mod audio;
mod video;

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use anyhow::{Context, Result};
use image::imageops::{self, FilterType};
use image::RgbaImage;

use crate::runtime::PlaybackClock;

pub use audio::{AudioError, FrequencyAnalyser, FrequencyTap, PcmTap};
pub use video::VideoStream;

/// Process-unique identity of an opened media source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MediaId(u64);

impl MediaId {
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

/// A decoded frame with its precomputed mip chain.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Increments every time the source produces new pixels.
    pub generation: u64,
    /// `levels[0]` is full resolution; each next level halves both sides.
    pub levels: Vec<RgbaImage>,
}

impl Frame {
    pub fn size(&self) -> (u32, u32) {
        self.levels
            .first()
            .map(|level| level.dimensions())
            .unwrap_or((0, 0))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PlaybackError {
    #[error("media decoder stopped: {0}")]
    DecoderGone(String),
}

/// Anything that can feed frames into the renderer.
pub trait MediaSource {
    fn id(&self) -> MediaId;

    /// Native pixel size once known; video reports it after probing
    /// finishes. The grid layout follows this size, not the decode size.
    fn intrinsic_size(&self) -> Option<(u32, u32)>;

    /// Advances decoding state and returns the frame to show at `now`.
    fn poll_frame(&mut self, now: Instant) -> Option<&Frame>;

    fn play(&mut self, now: Instant) -> Result<(), PlaybackError>;

    fn pause(&mut self, now: Instant);

    fn is_playing(&self) -> bool;

    /// Playback position in seconds.
    fn media_time(&self, now: Instant) -> f32;

    /// Routes the soundtrack into analysis. Allowed once per source.
    fn attach_audio(&mut self) -> Result<Box<dyn FrequencyTap>, AudioError>;

    fn describe(&self) -> String;
}

/// A decoded still image. It has exactly one frame generation.
pub struct StillImage {
    id: MediaId,
    path: PathBuf,
    frame: Frame,
    clock: PlaybackClock,
}

impl StillImage {
    pub fn open(path: &Path) -> Result<Self> {
        let image = image::open(path)
            .with_context(|| format!("failed to decode image {}", path.display()))?
            .to_rgba8();
        Ok(Self::from_image(path.to_path_buf(), image))
    }

    pub fn from_image(path: PathBuf, image: RgbaImage) -> Self {
        tracing::debug!(
            path = %path.display(),
            width = image.width(),
            height = image.height(),
            "loaded still image"
        );
        Self {
            id: MediaId::next(),
            path,
            frame: Frame {
                generation: 1,
                levels: mip_chain(image),
            },
            clock: PlaybackClock::stopped(),
        }
    }
}

impl MediaSource for StillImage {
    fn id(&self) -> MediaId {
        self.id
    }

    fn intrinsic_size(&self) -> Option<(u32, u32)> {
        Some(self.frame.size())
    }

    fn poll_frame(&mut self, _now: Instant) -> Option<&Frame> {
        Some(&self.frame)
    }

    fn play(&mut self, now: Instant) -> Result<(), PlaybackError> {
        self.clock.resume_at(now);
        Ok(())
    }

    fn pause(&mut self, now: Instant) {
        self.clock.pause_at(now);
    }

    fn is_playing(&self) -> bool {
        self.clock.is_running()
    }

    fn media_time(&self, now: Instant) -> f32 {
        self.clock.position_at(now).as_secs_f32()
    }

    fn attach_audio(&mut self) -> Result<Box<dyn FrequencyTap>, AudioError> {
        Err(AudioError::NoAudioTrack(self.path.clone()))
    }

    fn describe(&self) -> String {
        format!("image {}", self.path.display())
    }
}

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp", "gif", "webp"];

/// Opens `path` as a still image or a video depending on its extension.
pub fn open_media(path: &Path, looping: bool) -> Result<Box<dyn MediaSource>> {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    if IMAGE_EXTENSIONS.contains(&extension.as_str()) {
        Ok(Box::new(StillImage::open(path)?))
    } else {
        Ok(Box::new(VideoStream::open(path, looping)?))
    }
}

/// Number of levels in a full mip chain for a `width`×`height` texture.
pub fn mip_level_count(width: u32, height: u32) -> u32 {
    32 - width.max(height).max(1).leading_zeros()
}

/// Builds the full mip chain, halving each side per level down to 1×1.
pub fn mip_chain(base: RgbaImage) -> Vec<RgbaImage> {
    let (width, height) = base.dimensions();
    let count = mip_level_count(width, height);
    let mut levels = Vec::with_capacity(count as usize);
    levels.push(base);
    for level in 1..count {
        let w = (width >> level).max(1);
        let h = (height >> level).max(1);
        let previous = &levels[levels.len() - 1];
        let next = if previous.width() > 1 && previous.height() > 1 {
            imageops::thumbnail(previous, w, h)
        } else {
            imageops::resize(previous, w, h, FilterType::Triangle)
        };
        levels.push(next);
    }
    levels
}

#[cfg(test)]
mod tests {
    use image::Rgba;

    use super::*;

    #[test]
    fn mip_level_counts() {
        assert_eq!(mip_level_count(1, 1), 1);
        assert_eq!(mip_level_count(2, 1), 2);
        assert_eq!(mip_level_count(1920, 1080), 11);
        assert_eq!(mip_level_count(640, 480), 10);
    }

    #[test]
    fn mip_chain_halves_down_to_one_pixel() {
        let levels = mip_chain(RgbaImage::from_pixel(8, 4, Rgba([200, 100, 50, 255])));
        let sizes: Vec<_> = levels.iter().map(|level| level.dimensions()).collect();
        assert_eq!(sizes, vec![(8, 4), (4, 2), (2, 1), (1, 1)]);
        let last = levels.last().unwrap().get_pixel(0, 0);
        assert!((last[0] as i32 - 200).abs() <= 1);
    }

    #[test]
    fn still_image_is_a_single_generation() {
        let mut still =
            StillImage::from_image(PathBuf::from("test.png"), RgbaImage::new(16, 9));
        let now = Instant::now();
        assert_eq!(still.intrinsic_size(), Some((16, 9)));
        assert_eq!(still.poll_frame(now).map(|f| f.generation), Some(1));
        assert_eq!(still.poll_frame(now).map(|f| f.generation), Some(1));
        assert!(matches!(
            still.attach_audio(),
            Err(AudioError::NoAudioTrack(_))
        ));
    }

    #[test]
    fn media_ids_are_unique() {
        assert_ne!(MediaId::next(), MediaId::next());
    }
}
