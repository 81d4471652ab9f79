use std::collections::VecDeque;
use std::f32::consts::PI;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;

use crossbeam_channel::{bounded, Receiver, Sender, TryRecvError};
use tracing::{debug, warn};

/// Window size of the analyser; yields `FFT_SIZE / 2` frequency bins.
pub const FFT_SIZE: usize = 256;
/// Temporal smoothing between successive analyser frames.
pub const SMOOTHING: f32 = 0.8;
pub const MIN_DECIBELS: f32 = -100.0;
pub const MAX_DECIBELS: f32 = -30.0;
/// PCM rate requested from the decoder.
pub const SAMPLE_RATE: u32 = 44_100;

#[derive(Debug, thiserror::Error)]
pub enum AudioError {
    #[error("audio for this source is already routed to an analyser")]
    AlreadyAttached,
    #[error("{} has no audio track", .0.display())]
    NoAudioTrack(PathBuf),
    #[error("audio decode failed: {0}")]
    Decode(String),
}

/// Live view of a source's spectrum.
pub trait FrequencyTap {
    fn resume(&mut self);
    fn suspend(&mut self);
    fn is_running(&self) -> bool;
    /// Number of bins `byte_frequency_data` fills.
    fn frequency_bin_count(&self) -> usize;
    /// Writes byte-scaled magnitudes for the audio around `media_time`.
    fn byte_frequency_data(&mut self, media_time: f32, out: &mut [u8]);
}

/// Blackman-windowed DFT with WebAudio `AnalyserNode` semantics.
#[derive(Debug, Clone)]
pub struct FrequencyAnalyser {
    window: Vec<f32>,
    smoothed: Vec<f32>,
    smoothing: f32,
}

impl FrequencyAnalyser {
    pub fn new(fft_size: usize, smoothing: f32) -> Self {
        let n = fft_size as f32;
        let window = (0..fft_size)
            .map(|i| {
                let phase = 2.0 * PI * i as f32 / n;
                0.42 - 0.5 * phase.cos() + 0.08 * (2.0 * phase).cos()
            })
            .collect();
        Self {
            window,
            smoothed: vec![0.0; fft_size / 2],
            smoothing: smoothing.clamp(0.0, 1.0),
        }
    }

    pub fn fft_size(&self) -> usize {
        self.window.len()
    }

    pub fn bin_count(&self) -> usize {
        self.smoothed.len()
    }

    /// Analyses the most recent `fft_size` samples of `samples` (zero padded
    /// at the front when shorter) and writes one byte per bin into `out`.
    pub fn process(&mut self, samples: &[f32], out: &mut [u8]) {
        let size = self.fft_size();
        let pad = size.saturating_sub(samples.len());
        let tail = &samples[samples.len().saturating_sub(size)..];

        let frame: Vec<f32> = std::iter::repeat(0.0)
            .take(pad)
            .chain(tail.iter().copied())
            .zip(&self.window)
            .map(|(sample, weight)| sample * weight)
            .collect();

        let n = size as f32;
        for (k, smoothed) in self.smoothed.iter_mut().enumerate() {
            let mut re = 0.0f32;
            let mut im = 0.0f32;
            for (i, value) in frame.iter().enumerate() {
                let angle = -2.0 * PI * (k * i) as f32 / n;
                re += value * angle.cos();
                im += value * angle.sin();
            }
            let magnitude = (re * re + im * im).sqrt() / n;
            *smoothed = self.smoothing * *smoothed + (1.0 - self.smoothing) * magnitude;
        }

        let range = MAX_DECIBELS - MIN_DECIBELS;
        for (byte, magnitude) in out.iter_mut().zip(&self.smoothed) {
            let db = if *magnitude > 0.0 {
                20.0 * magnitude.log10()
            } else {
                f32::NEG_INFINITY
            };
            let scaled = 255.0 / range * (db - MIN_DECIBELS);
            *byte = scaled.clamp(0.0, 255.0) as u8;
        }
    }
}

/// Average of the byte bins normalised to `[0, 1]`.
pub fn average_level(bins: &[u8]) -> f32 {
    if bins.is_empty() {
        return 0.0;
    }
    let sum: u32 = bins.iter().map(|&b| b as u32).sum();
    sum as f32 / bins.len() as f32 / 255.0
}

/// Samples carried by one decoder message.
const CHUNK_SAMPLES: usize = 4096;
/// Decoded chunks the decoder may run ahead of playback.
const CHUNKS_AHEAD: usize = 16;
/// Samples kept around the playhead: one analyser window plus one chunk of overshoot.
const WINDOW_CAPACITY: usize = FFT_SIZE + CHUNK_SAMPLES;
/// A playhead further than this past the decoded audio restarts the decoder there.
const MAX_LAG_SAMPLES: u64 = SAMPLE_RATE as u64 * 2;

type PcmChunk = Result<Vec<f32>, AudioError>;
type StartDecoder = Box<dyn FnMut(u64) -> Receiver<PcmChunk>>;

/// Frequency tap over a mono PCM stream decoded just ahead of the playhead.
///
/// Only a short window of samples is held; seeking backwards or far forwards
/// restarts the decoder at the new position.
pub struct PcmTap {
    start_decoder: StartDecoder,
    feed: Option<Receiver<PcmChunk>>,
    window: VecDeque<f32>,
    /// Absolute index one past the newest sample in `window`.
    window_end: u64,
    exhausted: bool,
    failed: bool,
    analyser: FrequencyAnalyser,
    running: bool,
}

impl PcmTap {
    /// Starts streaming the soundtrack of `path` from the beginning.
    pub fn spawn(path: &Path) -> Self {
        let path = path.to_path_buf();
        Self::with_decoder(Box::new(move |from: u64| spawn_decoder(path.clone(), from)))
    }

    fn with_decoder(mut start_decoder: StartDecoder) -> Self {
        let feed = start_decoder(0);
        Self {
            start_decoder,
            feed: Some(feed),
            window: VecDeque::with_capacity(WINDOW_CAPACITY),
            window_end: 0,
            exhausted: false,
            failed: false,
            analyser: FrequencyAnalyser::new(FFT_SIZE, SMOOTHING),
            running: false,
        }
    }

    fn window_start(&self) -> u64 {
        self.window_end - self.window.len() as u64
    }

    fn restart(&mut self, from: u64) {
        debug!(from, "restarting audio decode");
        self.window.clear();
        self.window_end = from;
        self.exhausted = false;
        self.feed = Some((self.start_decoder)(from));
    }

    /// Pulls decoded chunks until the window reaches `end` or the decoder has
    /// nothing ready.
    fn advance_to(&mut self, end: u64) {
        if self.failed {
            return;
        }
        let behind = end < self.window_start();
        let far_ahead = !self.exhausted && end > self.window_end + MAX_LAG_SAMPLES;
        if behind || far_ahead {
            self.restart(end.saturating_sub(FFT_SIZE as u64));
        }

        while self.window_end < end {
            let Some(feed) = &self.feed else {
                break;
            };
            match feed.try_recv() {
                Ok(Ok(chunk)) => {
                    self.window_end += chunk.len() as u64;
                    self.window.extend(chunk);
                    let excess = self.window.len().saturating_sub(WINDOW_CAPACITY);
                    self.window.drain(..excess);
                }
                Ok(Err(err)) => {
                    warn!(error = %err, "audio analysis unavailable");
                    self.failed = true;
                    self.feed = None;
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    self.exhausted = true;
                    self.feed = None;
                }
            }
        }
    }

    /// Up to `FFT_SIZE` samples ending at `end`, clipped to what is decoded.
    fn samples_before(&self, end: u64) -> Vec<f32> {
        let start = self.window_start();
        let end = end.min(self.window_end);
        if end <= start {
            return Vec::new();
        }
        let from = end.saturating_sub(FFT_SIZE as u64).max(start);
        self.window
            .range((from - start) as usize..(end - start) as usize)
            .copied()
            .collect()
    }
}

impl FrequencyTap for PcmTap {
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
        self.analyser.bin_count()
    }

    fn byte_frequency_data(&mut self, media_time: f32, out: &mut [u8]) {
        if !self.running {
            out.fill(0);
            return;
        }
        let end = (media_time.max(0.0) * SAMPLE_RATE as f32) as u64;
        self.advance_to(end);
        let window = self.samples_before(end);
        self.analyser.process(&window, out);
    }
}

fn spawn_decoder(path: PathBuf, from: u64) -> Receiver<PcmChunk> {
    let (tx, rx) = bounded(CHUNKS_AHEAD);
    let spawned = thread::Builder::new()
        .name("glyphcast-audio".into())
        .spawn(move || stream_pcm_mono(&path, from, &tx));
    if let Err(err) = spawned {
        warn!(error = %err, "failed to spawn audio decoder thread");
    }
    rx
}

/// Decodes `path` from sample `from` onwards into `tx` until the receiver
/// goes away or the track ends.
fn stream_pcm_mono(path: &Path, from: u64, tx: &Sender<PcmChunk>) {
    let seek = format!("{:.6}", from as f64 / SAMPLE_RATE as f64);
    let spawned = Command::new("ffmpeg")
        .args(["-v", "error", "-ss", &seek, "-i"])
        .arg(path)
        .args([
            "-vn",
            "-f",
            "f32le",
            "-acodec",
            "pcm_f32le",
            "-ac",
            "1",
            "-ar",
            &SAMPLE_RATE.to_string(),
            "pipe:1",
        ])
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn();
    let mut child = match spawned {
        Ok(child) => child,
        Err(err) => {
            let _ = tx.send(Err(AudioError::Decode(format!("failed to run ffmpeg: {err}"))));
            return;
        }
    };
    let Some(mut stdout) = child.stdout.take() else {
        let _ = child.kill();
        return;
    };

    let mut bytes = vec![0u8; CHUNK_SAMPLES * 4];
    let mut decoded_any = false;
    loop {
        let filled = match fill(&mut stdout, &mut bytes) {
            Ok(filled) => filled,
            Err(err) => {
                let _ = tx.send(Err(AudioError::Decode(err.to_string())));
                let _ = child.kill();
                return;
            }
        };
        if filled >= 4 {
            decoded_any = true;
            if tx.send(Ok(pcm_samples(&bytes[..filled]))).is_err() {
                debug!("audio decoder no longer needed");
                let _ = child.kill();
                let _ = child.wait();
                return;
            }
        }
        if filled < bytes.len() {
            break;
        }
    }

    let mut message = String::new();
    if let Some(mut stderr) = child.stderr.take() {
        let _ = stderr.read_to_string(&mut message);
    }
    match child.wait() {
        Ok(status) if status.success() => {}
        Ok(_) => {
            let _ = tx.send(Err(classify_failure(path, &message, decoded_any)));
        }
        Err(err) => {
            let _ = tx.send(Err(AudioError::Decode(err.to_string())));
        }
    }
}

fn classify_failure(path: &Path, message: &str, decoded_any: bool) -> AudioError {
    let no_stream =
        message.contains("does not contain any stream") || message.contains("matches no streams");
    if no_stream && !decoded_any {
        AudioError::NoAudioTrack(path.to_path_buf())
    } else {
        AudioError::Decode(message.trim().to_owned())
    }
}

/// Reads until `buf` is full or the stream ends; returns the bytes read.
fn fill(reader: &mut impl Read, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(err) if err.kind() == std::io::ErrorKind::Interrupted => {}
            Err(err) => return Err(err),
        }
    }
    Ok(filled)
}

fn pcm_samples(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}
