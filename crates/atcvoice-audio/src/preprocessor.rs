//! Optional microphone input filter chain.
//!
//! When input filters are enabled, every microphone frame passes through
//! this chain before compression: a fourth-order high-pass that strips
//! rumble and plosive energy below the voice band, a small makeup gain,
//! and a soft limiter that keeps hot microphones from clipping the
//! encoder.

use crate::filter::BiquadFilter;

/// High-pass corner for the speech band, in hertz.
const SPEECH_HPF_HZ: f64 = 120.0;

/// Linear makeup gain applied after filtering.
const MAKEUP_GAIN: f32 = 1.15;

/// Microphone frame preprocessor: high-pass plus soft limiter.
pub struct MicrophonePreprocessor {
    hpf: [BiquadFilter; 2],
}

impl MicrophonePreprocessor {
    /// Create the chain with default tuning.
    pub fn new() -> Self {
        MicrophonePreprocessor {
            hpf: [
                BiquadFilter::high_pass(SPEECH_HPF_HZ, 0.54),
                BiquadFilter::high_pass(SPEECH_HPF_HZ, 1.31),
            ],
        }
    }

    /// Process one frame in place.
    pub fn process_frame(&mut self, frame: &mut [f32]) {
        for stage in &mut self.hpf {
            for sample in frame.iter_mut() {
                *sample = stage.process(*sample);
            }
        }
        for sample in frame.iter_mut() {
            // tanh soft knee: transparent at speech levels, saturating
            // gracefully toward +/-1.
            *sample = (*sample * MAKEUP_GAIN).tanh();
        }
    }
}

impl Default for MicrophonePreprocessor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use atcvoice_core::{FRAME_SIZE_SAMPLES, SAMPLE_RATE_HZ};

    #[test]
    fn output_is_bounded() {
        let mut pre = MicrophonePreprocessor::new();
        let mut frame = vec![10.0_f32; FRAME_SIZE_SAMPLES];
        pre.process_frame(&mut frame);
        for s in frame {
            assert!(s.abs() <= 1.0, "limiter must bound output, got {s}");
        }
    }

    #[test]
    fn attenuates_rumble() {
        let mut pre = MicrophonePreprocessor::new();
        // 30 Hz rumble, several frames so the filter settles.
        let mut rumble: Vec<f32> = (0..FRAME_SIZE_SAMPLES * 10)
            .map(|n| {
                0.5 * (std::f32::consts::TAU * 30.0 * n as f32 / SAMPLE_RATE_HZ as f32).sin()
            })
            .collect();
        pre.process_frame(&mut rumble);
        let tail = &rumble[FRAME_SIZE_SAMPLES * 5..];
        let peak = tail.iter().fold(0.0_f32, |m, s| m.max(s.abs()));
        assert!(peak < 0.1, "30 Hz rumble should be attenuated, peak {peak}");
    }

    #[test]
    fn passes_speech_band() {
        let mut pre = MicrophonePreprocessor::new();
        let mut voice: Vec<f32> = (0..FRAME_SIZE_SAMPLES * 10)
            .map(|n| {
                0.25 * (std::f32::consts::TAU * 1000.0 * n as f32 / SAMPLE_RATE_HZ as f32).sin()
            })
            .collect();
        pre.process_frame(&mut voice);
        let tail = &voice[FRAME_SIZE_SAMPLES * 5..];
        let peak = tail.iter().fold(0.0_f32, |m, s| m.max(s.abs()));
        assert!(peak > 0.2, "1 kHz voice should pass, peak {peak}");
    }
}
