use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::Instant;

use anyhow::{anyhow, bail, Context, Result};
use crossbeam_channel::{bounded, Receiver, Sender, TryRecvError};
use image::RgbaImage;
use serde::Deserialize;
use tracing::{debug, info, warn};

use super::audio::{AudioError, FrequencyTap, PcmTap};
use super::{mip_chain, Frame, MediaId, MediaSource, PlaybackError};
use crate::runtime::PlaybackClock;

/// Frames wider than this are scaled down by the decoder.
const MAX_DECODE_WIDTH: u32 = 1280;
/// Decoded frames buffered ahead of the render thread.
const FRAME_QUEUE_DEPTH: usize = 4;
const FALLBACK_FPS: f64 = 30.0;

/// Facts learned from `ffprobe`.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaInfo {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub duration: Option<f64>,
    pub has_audio: bool,
}

impl MediaInfo {
    /// Decode size: the intrinsic size capped at [`MAX_DECODE_WIDTH`] with
    /// the aspect ratio kept and an even height.
    pub fn decode_size(&self) -> (u32, u32) {
        if self.width <= MAX_DECODE_WIDTH {
            return (self.width, self.height);
        }
        let scale = MAX_DECODE_WIDTH as f64 / self.width as f64;
        let height = ((self.height as f64 * scale / 2.0).round() as u32 * 2).max(2);
        (MAX_DECODE_WIDTH, height)
    }
}

#[derive(Deserialize)]
struct RawStream {
    codec_type: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    avg_frame_rate: Option<String>,
    r_frame_rate: Option<String>,
}

#[derive(Deserialize)]
struct RawFormat {
    duration: Option<String>,
}

#[derive(Deserialize)]
struct StreamReport {
    streams: Vec<RawStream>,
    format: Option<RawFormat>,
}

fn parse_ratio(value: &str) -> Option<f64> {
    let (num, den) = value.split_once('/')?;
    let num: f64 = num.trim().parse().ok()?;
    let den: f64 = den.trim().parse().ok()?;
    (den > 0.0 && num > 0.0).then(|| num / den)
}

fn parse_report(json: &[u8]) -> Result<MediaInfo> {
    let parsed: StreamReport =
        serde_json::from_slice(json).context("failed to parse ffprobe output")?;
    let video = parsed
        .streams
        .iter()
        .find(|stream| stream.codec_type.as_deref() == Some("video"))
        .ok_or_else(|| anyhow!("no video stream found"))?;
    let width = video
        .width
        .filter(|w| *w > 0)
        .ok_or_else(|| anyhow!("ffprobe reported no video width"))?;
    let height = video
        .height
        .filter(|h| *h > 0)
        .ok_or_else(|| anyhow!("ffprobe reported no video height"))?;
    let fps = video
        .avg_frame_rate
        .as_deref()
        .and_then(parse_ratio)
        .or_else(|| video.r_frame_rate.as_deref().and_then(parse_ratio))
        .unwrap_or(FALLBACK_FPS);
    let duration = parsed
        .format
        .as_ref()
        .and_then(|format| format.duration.as_deref())
        .and_then(|value| value.parse::<f64>().ok())
        .filter(|d| *d > 0.0);
    let has_audio = parsed
        .streams
        .iter()
        .any(|stream| stream.codec_type.as_deref() == Some("audio"));

    Ok(MediaInfo {
        width,
        height,
        fps,
        duration,
        has_audio,
    })
}

fn inspect(path: &Path) -> Result<MediaInfo> {
    let output = Command::new("ffprobe")
        .args([
            "-v",
            "error",
            "-print_format",
            "json",
            "-show_streams",
            "-show_format",
        ])
        .arg(path)
        .output()
        .context("failed to run ffprobe")?;
    if !output.status.success() {
        bail!(
            "ffprobe failed for {}: {}",
            path.display(),
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }
    parse_report(&output.stdout)
}

struct DecodedFrame {
    /// Presentation time on the unbounded (looped) timeline.
    pts: f64,
    levels: Vec<RgbaImage>,
}

enum DecoderMessage {
    Metadata(MediaInfo),
    Frame(DecodedFrame),
    EndOfStream,
    Failed(String),
}

struct DecoderJob {
    path: PathBuf,
    looping: bool,
    tx: Sender<DecoderMessage>,
}

impl DecoderJob {
    fn run(self) {
        let info = match inspect(&self.path) {
            Ok(info) => info,
            Err(err) => {
                let _ = self.tx.send(DecoderMessage::Failed(format!("{err:#}")));
                return;
            }
        };
        if self.tx.send(DecoderMessage::Metadata(info.clone())).is_err() {
            return;
        }

        let mut pass_start = 0.0f64;
        loop {
            match self.decode_pass(&info, pass_start) {
                Ok(Some(frames)) if frames > 0 => {
                    pass_start += frames as f64 / info.fps;
                }
                Ok(Some(_)) => {
                    let _ = self
                        .tx
                        .send(DecoderMessage::Failed("video produced no frames".into()));
                    return;
                }
                // Receiver dropped.
                Ok(None) => return,
                Err(err) => {
                    let _ = self.tx.send(DecoderMessage::Failed(format!("{err:#}")));
                    return;
                }
            }
            if !self.looping {
                let _ = self.tx.send(DecoderMessage::EndOfStream);
                return;
            }
            debug!(path = %self.path.display(), pass_start, "looping video");
        }
    }

    /// Streams one pass over the file. Returns the frame count, or `None`
    /// once the render side has gone away.
    fn decode_pass(&self, info: &MediaInfo, pass_start: f64) -> Result<Option<u64>> {
        let (width, height) = info.decode_size();
        let mut child = spawn_ffmpeg(&self.path, width, height)?;
        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| anyhow!("ffmpeg stdout unavailable"))?;

        let frame_bytes = width as usize * height as usize * 4;
        let mut index = 0u64;
        let outcome = loop {
            let mut buffer = vec![0u8; frame_bytes];
            match stdout.read_exact(&mut buffer) {
                Ok(()) => {}
                Err(err) if err.kind() == std::io::ErrorKind::UnexpectedEof => {
                    break Ok(Some(index));
                }
                Err(err) => break Err(anyhow!("failed to read ffmpeg output: {err}")),
            }
            let Some(image) = RgbaImage::from_raw(width, height, buffer) else {
                break Err(anyhow!("decoded frame has the wrong size"));
            };
            let frame = DecodedFrame {
                pts: pass_start + index as f64 / info.fps,
                levels: mip_chain(image),
            };
            if self.tx.send(DecoderMessage::Frame(frame)).is_err() {
                break Ok(None);
            }
            index += 1;
        };

        reap(&mut child);
        outcome
    }
}

fn spawn_ffmpeg(path: &Path, width: u32, height: u32) -> Result<Child> {
    Command::new("ffmpeg")
        .args(["-v", "error", "-nostdin", "-i"])
        .arg(path)
        .args([
            "-an",
            "-f",
            "rawvideo",
            "-pix_fmt",
            "rgba",
            "-s",
            &format!("{width}x{height}"),
            "pipe:1",
        ])
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .context("failed to spawn ffmpeg")
}

fn reap(child: &mut Child) {
    if let Ok(None) = child.try_wait() {
        let _ = child.kill();
    }
    let _ = child.wait();
}

/// Video file decoded by an `ffmpeg` subprocess on a worker thread.
pub struct VideoStream {
    id: MediaId,
    path: PathBuf,
    looping: bool,
    rx: Receiver<DecoderMessage>,
    info: Option<MediaInfo>,
    pending: Option<DecodedFrame>,
    current: Option<Frame>,
    generation: u64,
    clock: PlaybackClock,
    audio_attached: bool,
    failure: Option<String>,
    finished: bool,
}

impl VideoStream {
    /// Starts probing and decoding `path` in the background.
    pub fn open(path: &Path, looping: bool) -> Result<Self> {
        if !path.exists() {
            bail!("media file {} does not exist", path.display());
        }
        let (tx, rx) = bounded(FRAME_QUEUE_DEPTH);
        let job = DecoderJob {
            path: path.to_path_buf(),
            looping,
            tx,
        };
        thread::Builder::new()
            .name("glyphcast-decoder".into())
            .spawn(move || job.run())
            .context("failed to spawn video decoder thread")?;
        info!(path = %path.display(), looping, "opened video");

        Ok(Self {
            id: MediaId::next(),
            path: path.to_path_buf(),
            looping,
            rx,
            info: None,
            pending: None,
            current: None,
            generation: 0,
            clock: PlaybackClock::stopped(),
            audio_attached: false,
            failure: None,
            finished: false,
        })
    }

    fn drain(&mut self, now: Instant) {
        let position = self.clock.position_at(now).as_secs_f64();
        loop {
            if self.pending.is_none() {
                match self.rx.try_recv() {
                    Ok(DecoderMessage::Metadata(info)) => {
                        debug!(
                            width = info.width,
                            height = info.height,
                            fps = info.fps,
                            duration = ?info.duration,
                            has_audio = info.has_audio,
                            "video metadata"
                        );
                        self.info = Some(info);
                        continue;
                    }
                    Ok(DecoderMessage::Frame(frame)) => self.pending = Some(frame),
                    Ok(DecoderMessage::EndOfStream) => {
                        self.finished = true;
                        self.clock.pause_at(now);
                        break;
                    }
                    Ok(DecoderMessage::Failed(reason)) => {
                        warn!(path = %self.path.display(), %reason, "video decoding failed");
                        self.failure = Some(reason);
                        break;
                    }
                    Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
                }
            }

            let due = self
                .pending
                .as_ref()
                .is_some_and(|frame| frame.pts <= position || self.current.is_none());
            if !due {
                break;
            }
            if let Some(frame) = self.pending.take() {
                self.generation += 1;
                self.current = Some(Frame {
                    generation: self.generation,
                    levels: frame.levels,
                });
            }
        }
    }
}

impl MediaSource for VideoStream {
    fn id(&self) -> MediaId {
        self.id
    }

    fn intrinsic_size(&self) -> Option<(u32, u32)> {
        self.info.as_ref().map(|info| (info.width, info.height))
    }

    fn poll_frame(&mut self, now: Instant) -> Option<&Frame> {
        self.drain(now);
        self.current.as_ref()
    }

    fn play(&mut self, now: Instant) -> Result<(), PlaybackError> {
        if let Some(reason) = &self.failure {
            return Err(PlaybackError::DecoderGone(reason.clone()));
        }
        if self.finished {
            debug!(path = %self.path.display(), "play requested after end of stream");
            return Ok(());
        }
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
        let position = self.clock.position_at(now).as_secs_f64();
        let duration = self.info.as_ref().and_then(|info| info.duration);
        match duration {
            Some(duration) if self.looping => (position % duration) as f32,
            _ => position as f32,
        }
    }

    fn attach_audio(&mut self) -> Result<Box<dyn FrequencyTap>, AudioError> {
        if self.audio_attached {
            return Err(AudioError::AlreadyAttached);
        }
        if let Some(info) = &self.info {
            if !info.has_audio {
                return Err(AudioError::NoAudioTrack(self.path.clone()));
            }
        }
        self.audio_attached = true;
        Ok(Box::new(PcmTap::spawn(&self.path)))
    }

    fn describe(&self) -> String {
        format!("video {}", self.path.display())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_REPORT: &str = r#"{
        "streams": [
            {"codec_type": "video", "width": 1920, "height": 1080,
             "avg_frame_rate": "30000/1001", "r_frame_rate": "30000/1001"},
            {"codec_type": "audio"}
        ],
        "format": {"duration": "12.5"}
    }"#;

    #[test]
    fn parses_stream_report() {
        let info = parse_report(SAMPLE_REPORT.as_bytes()).unwrap();
        assert_eq!((info.width, info.height), (1920, 1080));
        assert!((info.fps - 29.97).abs() < 0.01);
        assert_eq!(info.duration, Some(12.5));
        assert!(info.has_audio);
    }

    #[test]
    fn zero_frame_rate_falls_back() {
        let json = r#"{"streams": [{"codec_type": "video", "width": 4, "height": 2,
            "avg_frame_rate": "0/0", "r_frame_rate": "25/1"}]}"#;
        let info = parse_report(json.as_bytes()).unwrap();
        assert_eq!(info.fps, 25.0);
        assert_eq!(info.duration, None);
        assert!(!info.has_audio);
    }

    #[test]
    fn audio_only_file_is_rejected() {
        let json = r#"{"streams": [{"codec_type": "audio"}]}"#;
        assert!(parse_report(json.as_bytes()).is_err());
    }

    #[test]
    fn decode_size_caps_width() {
        let info = parse_report(SAMPLE_REPORT.as_bytes()).unwrap();
        assert_eq!(info.decode_size(), (1280, 720));

        let small = MediaInfo {
            width: 640,
            height: 360,
            fps: 30.0,
            duration: None,
            has_audio: false,
        };
        assert_eq!(small.decode_size(), (640, 360));
    }

    #[test]
    fn open_missing_file_fails() {
        assert!(VideoStream::open(Path::new("/nonexistent/clip.mp4"), true).is_err());
    }
}
