//! Uniform pull-model sample producers.
//!
//! Three source kinds back the radio effects:
//!
//! - [`RecordedSampleSource`] plays a decoded PCM clip, either once (the
//!   side-tone click) or looped (crackle, AC bus hum).
//! - [`SineToneSource`] generates the 180 Hz block tone.
//! - [`PinkNoiseGenerator`] generates the background noise floor.
//!
//! All of them implement [`SampleSource`] and are constructed lazily by the
//! mixer when a radio needs them, then dropped when they report
//! [`SourceStatus::End`] or the radio goes quiet.

use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use atcvoice_core::{SAMPLE_RATE_HZ, SampleSource, SourceStatus};

// ---------------------------------------------------------------------------
// RecordedSampleSource
// ---------------------------------------------------------------------------

/// Plays a PCM clip from an [`crate::resources::EffectResources`] asset.
///
/// Looped sources wrap around and never end; one-shot sources zero-pad the
/// final partial frame and report [`SourceStatus::End`] on the next pull.
pub struct RecordedSampleSource {
    samples: Arc<Vec<f32>>,
    position: usize,
    looped: bool,
}

impl RecordedSampleSource {
    /// Create a source over `samples`, starting at the beginning.
    pub fn new(samples: Arc<Vec<f32>>, looped: bool) -> Self {
        RecordedSampleSource {
            samples,
            position: 0,
            looped,
        }
    }
}

impl SampleSource for RecordedSampleSource {
    fn get_audio_frame(&mut self, buffer_out: &mut [f32]) -> SourceStatus {
        if self.samples.is_empty() {
            return SourceStatus::End;
        }
        if !self.looped && self.position >= self.samples.len() {
            return SourceStatus::End;
        }
        for out in buffer_out.iter_mut() {
            if self.position >= self.samples.len() {
                if self.looped {
                    self.position = 0;
                } else {
                    *out = 0.0;
                    continue;
                }
            }
            *out = self.samples[self.position];
            self.position += 1;
        }
        SourceStatus::Ok
    }
}

// ---------------------------------------------------------------------------
// SineToneSource
// ---------------------------------------------------------------------------

/// A continuous sine tone at a fixed frequency and unit amplitude.
pub struct SineToneSource {
    phase: f32,
    increment: f32,
}

impl SineToneSource {
    /// Create a tone source at `frequency_hz`.
    pub fn new(frequency_hz: f32) -> Self {
        SineToneSource {
            phase: 0.0,
            increment: std::f32::consts::TAU * frequency_hz / SAMPLE_RATE_HZ as f32,
        }
    }
}

impl SampleSource for SineToneSource {
    fn get_audio_frame(&mut self, buffer_out: &mut [f32]) -> SourceStatus {
        for out in buffer_out.iter_mut() {
            *out = self.phase.sin();
            self.phase += self.increment;
            if self.phase >= std::f32::consts::TAU {
                self.phase -= std::f32::consts::TAU;
            }
        }
        SourceStatus::Ok
    }
}

// ---------------------------------------------------------------------------
// PinkNoiseGenerator
// ---------------------------------------------------------------------------

/// Pink (1/f) noise via the Kellet filter-bank approximation.
///
/// White noise from a seeded PRNG is shaped by six one-pole filters; the
/// result sits around -1..1 after scaling and has the gentle high-frequency
/// roll-off expected of a radio noise floor.
pub struct PinkNoiseGenerator {
    rng: StdRng,
    b: [f32; 7],
}

impl PinkNoiseGenerator {
    /// Create a generator seeded from the OS.
    pub fn new() -> Self {
        Self::with_seed(rand::rng().random())
    }

    /// Create a generator with a fixed seed (deterministic output).
    pub fn with_seed(seed: u64) -> Self {
        PinkNoiseGenerator {
            rng: StdRng::seed_from_u64(seed),
            b: [0.0; 7],
        }
    }

    fn next_sample(&mut self) -> f32 {
        let white: f32 = self.rng.random_range(-1.0..1.0);
        let b = &mut self.b;
        b[0] = 0.99886 * b[0] + white * 0.0555179;
        b[1] = 0.99332 * b[1] + white * 0.0750759;
        b[2] = 0.96900 * b[2] + white * 0.1538520;
        b[3] = 0.86650 * b[3] + white * 0.3104856;
        b[4] = 0.55000 * b[4] + white * 0.5329522;
        b[5] = -0.7616 * b[5] - white * 0.0168980;
        let pink = b[0] + b[1] + b[2] + b[3] + b[4] + b[5] + b[6] + white * 0.5362;
        b[6] = white * 0.115926;
        pink * 0.11
    }
}

impl Default for PinkNoiseGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl SampleSource for PinkNoiseGenerator {
    fn get_audio_frame(&mut self, buffer_out: &mut [f32]) -> SourceStatus {
        for out in buffer_out.iter_mut() {
            *out = self.next_sample();
        }
        SourceStatus::Ok
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use atcvoice_core::FRAME_SIZE_SAMPLES;

    #[test]
    fn one_shot_clip_ends() {
        // Clip shorter than a frame: first pull pads with zeros, second
        // pull reports End.
        let clip = Arc::new(vec![0.5_f32; 100]);
        let mut src = RecordedSampleSource::new(clip, false);
        let mut buf = [1.0_f32; FRAME_SIZE_SAMPLES];

        assert_eq!(src.get_audio_frame(&mut buf), SourceStatus::Ok);
        assert_eq!(buf[0], 0.5);
        assert_eq!(buf[99], 0.5);
        assert_eq!(buf[100], 0.0);

        assert_eq!(src.get_audio_frame(&mut buf), SourceStatus::End);
    }

    #[test]
    fn looped_clip_wraps() {
        let clip = Arc::new(vec![1.0_f32, 2.0, 3.0]);
        let mut src = RecordedSampleSource::new(clip, true);
        let mut buf = [0.0_f32; FRAME_SIZE_SAMPLES];
        assert_eq!(src.get_audio_frame(&mut buf), SourceStatus::Ok);
        assert_eq!(&buf[0..6], &[1.0, 2.0, 3.0, 1.0, 2.0, 3.0]);
        // A looped source never ends.
        for _ in 0..10 {
            assert_eq!(src.get_audio_frame(&mut buf), SourceStatus::Ok);
        }
    }

    #[test]
    fn empty_clip_ends_immediately() {
        let mut src = RecordedSampleSource::new(Arc::new(vec![]), true);
        let mut buf = [0.0_f32; FRAME_SIZE_SAMPLES];
        assert_eq!(src.get_audio_frame(&mut buf), SourceStatus::End);
    }

    #[test]
    fn sine_tone_period() {
        // 480 Hz divides the sample rate evenly: exactly 100 samples per
        // cycle, so sample 0 and sample 100 should match closely.
        let mut src = SineToneSource::new(480.0);
        let mut buf = [0.0_f32; FRAME_SIZE_SAMPLES];
        assert_eq!(src.get_audio_frame(&mut buf), SourceStatus::Ok);
        assert!((buf[0] - buf[100]).abs() < 1e-3);
        // Peak amplitude is 1.0.
        let peak = buf.iter().fold(0.0_f32, |m, s| m.max(s.abs()));
        assert!(peak > 0.99 && peak <= 1.0 + 1e-6);
    }

    #[test]
    fn sine_tone_continuous_across_frames() {
        let mut src = SineToneSource::new(180.0);
        let mut a = [0.0_f32; FRAME_SIZE_SAMPLES];
        let mut b = [0.0_f32; FRAME_SIZE_SAMPLES];
        src.get_audio_frame(&mut a);
        src.get_audio_frame(&mut b);
        // The first sample of the second frame continues the phase of the
        // last sample of the first: no discontinuity bigger than one step.
        let step = std::f32::consts::TAU * 180.0 / SAMPLE_RATE_HZ as f32;
        assert!((b[0] - a[FRAME_SIZE_SAMPLES - 1]).abs() < 2.0 * step);
    }

    #[test]
    fn pink_noise_bounded_and_nonzero() {
        let mut src = PinkNoiseGenerator::with_seed(0xA1C0);
        let mut buf = [0.0_f32; FRAME_SIZE_SAMPLES];
        assert_eq!(src.get_audio_frame(&mut buf), SourceStatus::Ok);
        let peak = buf.iter().fold(0.0_f32, |m, s| m.max(s.abs()));
        assert!(peak > 0.0, "noise must not be silent");
        assert!(peak < 1.5, "noise must stay bounded, got {peak}");
    }

    #[test]
    fn pink_noise_deterministic_with_seed() {
        let mut a = PinkNoiseGenerator::with_seed(7);
        let mut b = PinkNoiseGenerator::with_seed(7);
        let mut fa = [0.0_f32; FRAME_SIZE_SAMPLES];
        let mut fb = [0.0_f32; FRAME_SIZE_SAMPLES];
        a.get_audio_frame(&mut fa);
        b.get_audio_frame(&mut fb);
        assert_eq!(fa, fb);
    }
}
