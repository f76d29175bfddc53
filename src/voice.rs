use std::sync::Arc;

use crate::sample::BaseSample;

/// Length of the click-removal ramps at both ends of a voice.
pub const FADE_SECS: f32 = 0.005;
/// Plateau gain between the ramps. Matches the shipped instrument's
/// headroom-boosted unity gain.
pub const VOICE_GAIN: f32 = 5.0;

/// One fire-and-forget playback of the base sample at a fixed pitch
/// ratio. Rendered frame by frame inside the audio callback; finished
/// voices are dropped by the caller and are never queried or cancelled.
pub struct Voice {
    sample: Arc<BaseSample>,
    /// Fractional read position into the source, advanced by `step` per
    /// output frame. Resampling this way shifts pitch and duration
    /// together.
    position: f64,
    step: f64,
    frames_done: u64,
    total_frames: u64,
    fade_frames: u64,
    fade_out_start: u64,
}

impl Voice {
    pub fn new(sample: Arc<BaseSample>, pitch_ratio: f32, output_rate: u32) -> Self {
        let step = pitch_ratio as f64 * sample.sample_rate() as f64 / output_rate as f64;
        let total_frames = (sample.num_frames() as f64 / step).ceil() as u64;
        let fade_frames = ((FADE_SECS * output_rate as f32) as u64).max(1);
        // When the whole voice is shorter than both ramps, the fade-out
        // may never start before the fade-in ends.
        let fade_out_start = total_frames.saturating_sub(fade_frames).max(fade_frames);
        Self {
            sample,
            position: 0.0,
            step,
            frames_done: 0,
            total_frames,
            fade_frames,
            fade_out_start,
        }
    }

    /// Scheduled playback length in output frames: `duration / ratio`
    /// worth of the output clock.
    pub fn total_frames(&self) -> u64 {
        self.total_frames
    }

    pub fn finished(&self) -> bool {
        self.frames_done >= self.total_frames
    }

    /// Renders one output frame, or `None` once the scheduled stop time
    /// has passed.
    pub fn next_frame(&mut self) -> Option<(f32, f32)> {
        if self.finished() {
            return None;
        }

        let last = self.sample.num_frames() - 1;
        let idx = (self.position as usize).min(last);
        let frac = (self.position - idx as f64) as f32;
        let (l0, r0) = self.sample.frame(idx);
        let (l1, r1) = self.sample.frame((idx + 1).min(last));

        let gain = self.gain_at(self.frames_done);
        let left = (l0 + (l1 - l0) * frac) * gain;
        let right = (r0 + (r1 - r0) * frac) * gain;

        self.position += self.step;
        self.frames_done += 1;
        Some((left, right))
    }

    /// Linear envelope: 0 at the first frame, `VOICE_GAIN` after the 5ms
    /// ramp, held until 5ms before the stop time, back to 0 at the end.
    fn gain_at(&self, frame: u64) -> f32 {
        let fade = self.fade_frames as f32;
        let ramp_in = (frame as f32 / fade).min(1.0);
        let ramp_out = if frame >= self.fade_out_start {
            let into_fade = (frame - self.fade_out_start) as f32;
            (1.0 - into_fade / fade).max(0.0)
        } else {
            1.0
        };
        VOICE_GAIN * ramp_in * ramp_out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sample::{BaseSample, synthesized_fallback};

    const RATE: u32 = 44100;

    fn one_second_sample() -> Arc<BaseSample> {
        Arc::new(synthesized_fallback(RATE))
    }

    fn drain(voice: &mut Voice) -> u64 {
        let mut rendered = 0;
        while voice.next_frame().is_some() {
            rendered += 1;
        }
        rendered
    }

    #[test]
    fn duration_is_base_duration_over_ratio() {
        let sample = one_second_sample();
        let mut unity = Voice::new(sample.clone(), 1.0, RATE);
        assert_eq!(unity.total_frames(), RATE as u64);
        assert_eq!(drain(&mut unity), RATE as u64);

        let mut octave_up = Voice::new(sample.clone(), 2.0, RATE);
        assert_eq!(octave_up.total_frames(), (RATE / 2) as u64);

        let mut fifth = Voice::new(sample, 1.5, RATE);
        assert_eq!(fifth.total_frames(), RATE as u64 / 3 * 2);
    }

    #[test]
    fn envelope_starts_and_ends_at_zero() {
        let sample = Arc::new(BaseSample::new(vec![1.0; RATE as usize], 1, RATE));
        let mut voice = Voice::new(sample, 1.0, RATE);

        let (first, _) = voice.next_frame().expect("first frame");
        assert_eq!(first, 0.0);

        let mut last = f32::NAN;
        let mut peak: f32 = 0.0;
        while let Some((l, _)) = voice.next_frame() {
            last = l;
            peak = peak.max(l.abs());
        }
        // Final frame is one step into the fade-out ramp from zero gain.
        assert!(last.abs() < VOICE_GAIN / 100.0);
        assert!((peak - VOICE_GAIN).abs() < 1e-3);
    }

    #[test]
    fn fade_ramps_last_five_ms() {
        let sample = Arc::new(BaseSample::new(vec![1.0; RATE as usize], 1, RATE));
        let mut voice = Voice::new(sample, 1.0, RATE);
        let fade = (FADE_SECS * RATE as f32) as u64;
        for n in 0..=fade {
            let (l, _) = voice.next_frame().expect("frame");
            let expected = VOICE_GAIN * (n as f32 / fade as f32).min(1.0);
            assert!((l - expected).abs() < 1e-3, "frame {n}: {l} vs {expected}");
        }
    }

    #[test]
    fn tiny_voices_clamp_without_inverted_ramps() {
        // 100 source frames at ratio 4 is ~0.57ms of playback, far below
        // the combined 10ms of ramps.
        let sample = Arc::new(BaseSample::new(vec![1.0; 100], 1, RATE));
        let voice = Voice::new(sample, 4.0, RATE);
        assert!(voice.total_frames() < voice.fade_frames * 2);
        assert!(voice.fade_out_start >= voice.fade_frames);
    }

    #[test]
    fn voices_are_independent() {
        let sample = one_second_sample();
        let mut low = Voice::new(sample.clone(), 1.0, RATE);
        let mut high = Voice::new(sample, 2.0, RATE);

        // Interleave rendering; each voice keeps its own schedule.
        let mut low_frames = 0;
        let mut high_frames = 0;
        loop {
            let a = low.next_frame();
            let b = high.next_frame();
            if a.is_some() {
                low_frames += 1;
            }
            if b.is_some() {
                high_frames += 1;
            }
            if a.is_none() && b.is_none() {
                break;
            }
        }
        assert_eq!(low_frames, RATE as u64);
        assert_eq!(high_frames, (RATE / 2) as u64);
    }

    #[test]
    fn stereo_samples_keep_their_channels() {
        // Left channel constant 1.0, right channel constant -1.0.
        let mut frames = Vec::new();
        for _ in 0..RATE {
            frames.push(1.0);
            frames.push(-1.0);
        }
        let sample = Arc::new(BaseSample::new(frames, 2, RATE));
        let mut voice = Voice::new(sample, 1.0, RATE);
        for _ in 0..1000 {
            let (l, r) = voice.next_frame().expect("frame");
            assert!(l >= 0.0);
            assert!(r <= 0.0);
        }
    }
}
