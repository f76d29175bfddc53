use std::path::PathBuf;
use std::sync::Arc;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use crossbeam::channel::{Receiver, Sender};
use ringbuf::{
    HeapCons, HeapProd, HeapRb,
    traits::{Consumer, Producer, Split},
};
use tracing::{debug, error, info};

use crate::keys::{KeyEffect, KeyEvent, KeyTracker};
use crate::pitch::Note;
use crate::sample::{self, BaseSample, SampleCell};
use crate::voice::Voice;

/// Room for 256 in-flight triggers is far beyond what fingers produce in
/// one callback period.
const TRIGGER_QUEUE_CAPACITY: usize = 256;

#[derive(Debug, Clone)]
pub enum EngineCommand {
    NoteOn(Note),
    NoteOff(Note),
}

#[derive(Debug, Clone)]
pub enum EngineUpdate {
    /// Current visual held set, sent after every key transition.
    HeldKeys(Vec<Note>),
    /// The one-time sample load finished (recorded asset or fallback).
    SampleReady,
    Error { message: String },
}

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("no audio output device")]
    NoOutputDevice,
    #[error("failed to query output config: {0}")]
    Config(#[from] cpal::DefaultStreamConfigError),
    #[error("failed to build output stream: {0}")]
    BuildStream(#[from] cpal::BuildStreamError),
    #[error("failed to start output stream: {0}")]
    PlayStream(#[from] cpal::PlayStreamError),
}

pub struct EngineHandle {
    pub command_tx: Sender<EngineCommand>,
    pub update_rx: Receiver<EngineUpdate>,
}

pub fn spawn_engine(sample_path: PathBuf) -> EngineHandle {
    let (command_tx, command_rx) = crossbeam::channel::unbounded();
    let (update_tx, update_rx) = crossbeam::channel::unbounded();

    std::thread::spawn(move || {
        engine_thread(sample_path, command_rx, update_tx);
    });

    EngineHandle {
        command_tx,
        update_rx,
    }
}

/// One queued trigger: everything the callback needs to spawn a voice.
struct VoiceEvent {
    sample: Arc<BaseSample>,
    pitch_ratio: f32,
}

struct AudioOutput {
    _stream: cpal::Stream,
    producer: HeapProd<VoiceEvent>,
    sample_rate: u32,
}

struct EngineState {
    sample_path: PathBuf,
    keys: KeyTracker,
    cell: Arc<SampleCell>,
    audio: Option<AudioOutput>,
}

fn engine_thread(
    sample_path: PathBuf,
    command_rx: Receiver<EngineCommand>,
    update_tx: Sender<EngineUpdate>,
) {
    let mut state = EngineState {
        sample_path,
        keys: KeyTracker::new(),
        cell: Arc::new(SampleCell::new()),
        audio: None,
    };

    while let Ok(command) = command_rx.recv() {
        match command {
            EngineCommand::NoteOn(note) => {
                // Audio output and the sample load both wait for the
                // first user interaction.
                if state.audio.is_none() {
                    match setup_audio() {
                        Ok(audio) => state.audio = Some(audio),
                        Err(e) => {
                            let _ = update_tx.send(EngineUpdate::Error {
                                message: format!("Failed to start audio: {}", e),
                            });
                        }
                    }
                }
                if let Some(ref audio) = state.audio {
                    begin_sample_load(&state, audio.sample_rate, &update_tx);
                }

                let effect = state.keys.apply(KeyEvent::Press(note));
                if let (Some(KeyEffect::Trigger(note)), Some(audio)) =
                    (effect, state.audio.as_mut())
                {
                    // No sample yet means the press is silently dropped,
                    // never queued for later.
                    if let Some(event) = trigger_event(&state.cell, note) {
                        if audio.producer.try_push(event).is_err() {
                            debug!(%note, "trigger queue full, dropping");
                        }
                    }
                }

                let _ = update_tx.send(EngineUpdate::HeldKeys(state.keys.held().collect()));
            }
            EngineCommand::NoteOff(note) => {
                // Visual only. Voices already triggered play out in full.
                state.keys.apply(KeyEvent::Release(note));
                let _ = update_tx.send(EngineUpdate::HeldKeys(state.keys.held().collect()));
            }
        }
    }
}

/// Claims the one-time load on first call and hands it to a loader
/// thread; later calls are no-ops. Failures never surface here: the
/// loader publishes the synthesized fallback instead.
fn begin_sample_load(state: &EngineState, sample_rate: u32, update_tx: &Sender<EngineUpdate>) {
    if !state.cell.begin() {
        return;
    }
    let path = state.sample_path.clone();
    let cell = state.cell.clone();
    let update_tx = update_tx.clone();
    std::thread::spawn(move || {
        let loaded = sample::load_or_fallback(&path, sample_rate);
        cell.publish(loaded);
        let _ = update_tx.send(EngineUpdate::SampleReady);
    });
}

fn trigger_event(cell: &SampleCell, note: Note) -> Option<VoiceEvent> {
    let sample = cell.get()?;
    Some(VoiceEvent {
        sample,
        pitch_ratio: note.pitch_ratio(),
    })
}

struct CallbackState {
    voices: Vec<Voice>,
    consumer: HeapCons<VoiceEvent>,
    sample_rate: u32,
    num_channels: usize,
}

fn setup_audio() -> Result<AudioOutput, EngineError> {
    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or(EngineError::NoOutputDevice)?;
    let config = device.default_output_config()?;
    let stream_config: cpal::StreamConfig = config.into();

    let sample_rate = stream_config.sample_rate;
    let num_channels = stream_config.channels as usize;
    info!(sample_rate, num_channels, "audio output ready");

    let ring_buffer = HeapRb::<VoiceEvent>::new(TRIGGER_QUEUE_CAPACITY);
    let (producer, consumer) = ring_buffer.split();

    let mut callback_state = CallbackState {
        voices: Vec::new(),
        consumer,
        sample_rate,
        num_channels,
    };

    let stream = device.build_output_stream(
        &stream_config,
        move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
            audio_callback(data, &mut callback_state);
        },
        |err| error!("audio stream error: {}", err),
        None,
    )?;

    stream.play()?;

    Ok(AudioOutput {
        _stream: stream,
        producer,
        sample_rate,
    })
}

/// Runs on the realtime audio thread: drains queued triggers into new
/// voices, mixes every live voice into the buffer, drops finished ones.
/// Envelope ramps and stop times are counted in this thread's own frames,
/// so input-thread stalls never shift note timing.
fn audio_callback(data: &mut [f32], state: &mut CallbackState) {
    while let Some(event) = state.consumer.try_pop() {
        state
            .voices
            .push(Voice::new(event.sample, event.pitch_ratio, state.sample_rate));
    }

    data.fill(0.0);

    for frame in data.chunks_mut(state.num_channels) {
        let mut left = 0.0;
        let mut right = 0.0;
        for voice in &mut state.voices {
            if let Some((l, r)) = voice.next_frame() {
                left += l;
                right += r;
            }
        }

        if frame.len() >= 2 {
            frame[0] = left;
            frame[1] = right;
        } else if !frame.is_empty() {
            frame[0] = 0.5 * (left + right);
        }
    }

    state.voices.retain(|v| !v.finished());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn triggers_are_dropped_until_the_sample_is_published() {
        let cell = SampleCell::new();
        assert!(trigger_event(&cell, Note::A).is_none());

        cell.publish(sample::synthesized_fallback(48000));
        let event = trigger_event(&cell, Note::A).expect("sample is ready");
        assert!((event.pitch_ratio - Note::A.pitch_ratio()).abs() < 1e-6);
    }

    #[test]
    fn every_trigger_gets_its_own_voice_event() {
        let cell = SampleCell::new();
        cell.publish(sample::synthesized_fallback(48000));
        let a = trigger_event(&cell, Note::C).expect("ready");
        let b = trigger_event(&cell, Note::C).expect("ready");
        // Same shared sample, independent events.
        assert!(Arc::ptr_eq(&a.sample, &b.sample));
    }
}
