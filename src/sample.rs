use std::fs::File;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use arc_swap::ArcSwapOption;
use symphonia::core::audio::{AudioBuffer, AudioBufferRef, Signal};
use symphonia::core::codecs::{CODEC_TYPE_NULL, DecoderOptions};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::default::{get_codecs, get_probe};
use tracing::{info, warn};

use crate::pitch::BASE_FREQUENCY;

/// Peak amplitude of the synthesized fallback tone.
const FALLBACK_AMPLITUDE: f32 = 0.3;
/// Exponential decay constant of the fallback tone, per second.
const FALLBACK_DECAY: f32 = 3.0;
const FALLBACK_DURATION_SECS: f32 = 1.0;

#[derive(Debug, thiserror::Error)]
pub enum SampleError {
    #[error("failed to open sample: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to read sample: {0}")]
    Audio(#[from] SymphoniaError),
    #[error("no decodable audio track in sample file")]
    NoAudioTrack,
    #[error("sample rate not specified by container or codec")]
    UnknownSampleRate,
}

/// The one recording every voice plays back. Interleaved f32 frames,
/// immutable once constructed.
#[derive(Debug, Clone)]
pub struct BaseSample {
    frames: Vec<f32>,
    channels: u16,
    sample_rate: u32,
}

impl BaseSample {
    pub fn new(frames: Vec<f32>, channels: u16, sample_rate: u32) -> Self {
        debug_assert!(channels > 0);
        debug_assert!(sample_rate > 0);
        Self {
            frames,
            channels,
            sample_rate,
        }
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn num_frames(&self) -> usize {
        self.frames.len() / self.channels as usize
    }

    pub fn duration_secs(&self) -> f32 {
        self.num_frames() as f32 / self.sample_rate as f32
    }

    /// Left/right values of one frame. Mono is duplicated to both sides;
    /// channels past the second are ignored.
    pub fn frame(&self, idx: usize) -> (f32, f32) {
        let ch = self.channels as usize;
        let base = idx * ch;
        let left = self.frames[base];
        let right = if ch > 1 { self.frames[base + 1] } else { left };
        (left, right)
    }
}

/// Decodes an entire audio file (any container/codec symphonia knows)
/// into an interleaved f32 buffer.
pub fn decode_file<P: AsRef<Path>>(path: P) -> Result<BaseSample, SampleError> {
    let path = path.as_ref();
    let file = File::open(path)?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(extension) = path.extension().and_then(|ext| ext.to_str()) {
        hint.with_extension(extension);
    }

    let meta_opts: MetadataOptions = Default::default();
    let fmt_opts: FormatOptions = Default::default();
    let probed = get_probe().format(&hint, mss, &fmt_opts, &meta_opts)?;
    let mut format_reader = probed.format;

    let track = format_reader
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or(SampleError::NoAudioTrack)?;
    let track_id = track.id;
    let params = &track.codec_params;
    let sample_rate = params.sample_rate.ok_or(SampleError::UnknownSampleRate)?;

    let decoder_opts: DecoderOptions = Default::default();
    let mut decoder = get_codecs().make(params, &decoder_opts)?;

    let mut frames: Vec<f32> = Vec::new();
    let mut channels: u16 = params.channels.map(|c| c.count() as u16).unwrap_or(0);

    loop {
        let packet = match format_reader.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::ResetRequired) => {
                decoder.reset();
                continue;
            }
            Err(SymphoniaError::IoError(e))
                if e.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            // Some decoders signal EOF with a decode error instead.
            Err(SymphoniaError::DecodeError(_)) => break,
            Err(e) => return Err(e.into()),
        };
        if packet.track_id() != track_id {
            continue;
        }
        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(SymphoniaError::ResetRequired) => {
                decoder.reset();
                decoder.decode(&packet)?
            }
            Err(e) => return Err(e.into()),
        };
        let (samples, decoded_channels) = buffer_to_f32(decoded);
        if channels == 0 {
            channels = decoded_channels as u16;
        }
        frames.extend_from_slice(&samples);
    }

    if channels == 0 || frames.is_empty() {
        return Err(SampleError::NoAudioTrack);
    }

    Ok(BaseSample::new(frames, channels, sample_rate))
}

/// Deterministic substitute for the recorded sample: one second of a sine
/// at the reference frequency with an exponential decay,
/// `sin(2π·f·t) · exp(-3t) · 0.3`.
pub fn synthesized_fallback(sample_rate: u32) -> BaseSample {
    let length = (sample_rate as f32 * FALLBACK_DURATION_SECS) as usize;
    let mut frames = Vec::with_capacity(length);
    for i in 0..length {
        let t = i as f32 / sample_rate as f32;
        let envelope = (-t * FALLBACK_DECAY).exp();
        frames.push((2.0 * std::f32::consts::PI * BASE_FREQUENCY * t).sin()
            * envelope
            * FALLBACK_AMPLITUDE);
    }
    BaseSample::new(frames, 1, sample_rate)
}

/// Loads and decodes the sample asset, absorbing every failure into the
/// synthesized fallback. The instrument never goes silent over a missing
/// or unreadable asset.
pub fn load_or_fallback<P: AsRef<Path>>(path: P, sample_rate: u32) -> BaseSample {
    match decode_file(path.as_ref()) {
        Ok(sample) => {
            info!(
                path = %path.as_ref().display(),
                channels = sample.channels(),
                duration_secs = sample.duration_secs(),
                "sample loaded"
            );
            sample
        }
        Err(e) => {
            warn!(
                path = %path.as_ref().display(),
                error = %e,
                "sample unavailable, using synthesized fallback"
            );
            synthesized_fallback(sample_rate)
        }
    }
}

/// Init-once cell for the session's base sample: claimed by the first key
/// press, published by the loader thread, read from anywhere without
/// locking.
#[derive(Default)]
pub struct SampleCell {
    slot: ArcSwapOption<BaseSample>,
    claimed: AtomicBool,
}

impl SampleCell {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims the one-time load. Only the first caller gets `true`; the
    /// winner is expected to eventually call `publish`.
    pub fn begin(&self) -> bool {
        !self.claimed.swap(true, Ordering::AcqRel)
    }

    pub fn publish(&self, sample: BaseSample) {
        self.slot.store(Some(Arc::new(sample)));
    }

    /// `None` until the load completes; triggers arriving before then are
    /// dropped by the caller.
    pub fn get(&self) -> Option<Arc<BaseSample>> {
        self.slot.load_full()
    }
}

fn buffer_to_f32(decoded: AudioBufferRef) -> (Vec<f32>, usize) {
    match decoded {
        AudioBufferRef::F32(buf) => interleave(&buf, |s| s),
        AudioBufferRef::F64(buf) => interleave(&buf, |s| s as f32),
        AudioBufferRef::S8(buf) => interleave(&buf, |s| s as f32 / (1i64 << 7) as f32),
        AudioBufferRef::S16(buf) => interleave(&buf, |s| s as f32 / (1i64 << 15) as f32),
        AudioBufferRef::S24(buf) => {
            interleave(&buf, |s| s.inner() as f32 / (1i64 << 23) as f32)
        }
        AudioBufferRef::S32(buf) => interleave(&buf, |s| s as f32 / (1i64 << 31) as f32),
        AudioBufferRef::U8(buf) => {
            interleave(&buf, |s| (s as f32 / u8::MAX as f32) * 2.0 - 1.0)
        }
        AudioBufferRef::U16(buf) => {
            interleave(&buf, |s| (s as f32 / u16::MAX as f32) * 2.0 - 1.0)
        }
        AudioBufferRef::U24(buf) => interleave(&buf, |s| {
            (s.inner() as f32 / ((1u32 << 24) - 1) as f32) * 2.0 - 1.0
        }),
        AudioBufferRef::U32(buf) => {
            interleave(&buf, |s| (s as f32 / u32::MAX as f32) * 2.0 - 1.0)
        }
    }
}

fn interleave<T, F>(buf: &AudioBuffer<T>, convert: F) -> (Vec<f32>, usize)
where
    T: symphonia::core::sample::Sample,
    F: Fn(T) -> f32,
{
    let num_frames = buf.frames();
    let channels = buf.spec().channels.count();
    let planes = buf.planes();
    let mut samples = Vec::with_capacity(num_frames * channels);
    for frame_idx in 0..num_frames {
        for ch_idx in 0..channels {
            samples.push(convert(planes.planes()[ch_idx][frame_idx]));
        }
    }
    (samples, channels)
}
