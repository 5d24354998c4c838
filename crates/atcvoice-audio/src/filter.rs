//! Biquad filters and the per-hardware VHF band-pass cascade.
//!
//! [`VhfFilter`] emulates the audio response of a specific radio hardware
//! model: a cascade of second-order sections that band-limits decoded voice
//! to the familiar narrow VHF passband. Coefficients follow the RBJ audio
//! EQ cookbook; the cascade is applied in place, one frame at a time, on
//! the audio output thread.

use atcvoice_core::{HardwareType, SAMPLE_RATE_HZ};

// ---------------------------------------------------------------------------
// BiquadFilter
// ---------------------------------------------------------------------------

/// One second-order IIR section, transposed direct form II.
#[derive(Debug, Clone)]
pub struct BiquadFilter {
    b0: f32,
    b1: f32,
    b2: f32,
    a1: f32,
    a2: f32,
    z1: f32,
    z2: f32,
}

impl BiquadFilter {
    fn from_normalized(b0: f64, b1: f64, b2: f64, a0: f64, a1: f64, a2: f64) -> Self {
        BiquadFilter {
            b0: (b0 / a0) as f32,
            b1: (b1 / a0) as f32,
            b2: (b2 / a0) as f32,
            a1: (a1 / a0) as f32,
            a2: (a2 / a0) as f32,
            z1: 0.0,
            z2: 0.0,
        }
    }

    /// Second-order high-pass at `f0` hertz with quality `q`.
    pub fn high_pass(f0: f64, q: f64) -> Self {
        let w0 = std::f64::consts::TAU * f0 / SAMPLE_RATE_HZ as f64;
        let (sin_w0, cos_w0) = w0.sin_cos();
        let alpha = sin_w0 / (2.0 * q);
        let b0 = (1.0 + cos_w0) / 2.0;
        let b1 = -(1.0 + cos_w0);
        let b2 = (1.0 + cos_w0) / 2.0;
        let a0 = 1.0 + alpha;
        let a1 = -2.0 * cos_w0;
        let a2 = 1.0 - alpha;
        Self::from_normalized(b0, b1, b2, a0, a1, a2)
    }

    /// Second-order low-pass at `f0` hertz with quality `q`.
    pub fn low_pass(f0: f64, q: f64) -> Self {
        let w0 = std::f64::consts::TAU * f0 / SAMPLE_RATE_HZ as f64;
        let (sin_w0, cos_w0) = w0.sin_cos();
        let alpha = sin_w0 / (2.0 * q);
        let b0 = (1.0 - cos_w0) / 2.0;
        let b1 = 1.0 - cos_w0;
        let b2 = (1.0 - cos_w0) / 2.0;
        let a0 = 1.0 + alpha;
        let a1 = -2.0 * cos_w0;
        let a2 = 1.0 - alpha;
        Self::from_normalized(b0, b1, b2, a0, a1, a2)
    }

    /// Peaking EQ at `f0` hertz, quality `q`, gain in decibels.
    pub fn peaking(f0: f64, q: f64, gain_db: f64) -> Self {
        let a = 10.0_f64.powf(gain_db / 40.0);
        let w0 = std::f64::consts::TAU * f0 / SAMPLE_RATE_HZ as f64;
        let (sin_w0, cos_w0) = w0.sin_cos();
        let alpha = sin_w0 / (2.0 * q);
        let b0 = 1.0 + alpha * a;
        let b1 = -2.0 * cos_w0;
        let b2 = 1.0 - alpha * a;
        let a0 = 1.0 + alpha / a;
        let a1 = -2.0 * cos_w0;
        let a2 = 1.0 - alpha / a;
        Self::from_normalized(b0, b1, b2, a0, a1, a2)
    }

    /// Process one sample.
    #[inline]
    pub fn process(&mut self, x: f32) -> f32 {
        let y = self.b0 * x + self.z1;
        self.z1 = self.b1 * x - self.a1 * y + self.z2;
        self.z2 = self.b2 * x - self.a2 * y;
        y
    }

    /// Zero the delay line.
    pub fn reset(&mut self) {
        self.z1 = 0.0;
        self.z2 = 0.0;
    }
}

// ---------------------------------------------------------------------------
// VhfFilter
// ---------------------------------------------------------------------------

/// The VHF band-limiting cascade for one radio.
///
/// `NoHardware` yields an empty cascade (audio passes untouched); the three
/// hardware models differ in passband corners and presence emphasis.
pub struct VhfFilter {
    hardware: HardwareType,
    stages: Vec<BiquadFilter>,
}

impl VhfFilter {
    /// Build the cascade for `hardware`.
    pub fn new(hardware: HardwareType) -> Self {
        // Fourth-order Butterworth band edges are realized as two cascaded
        // second-order sections with Q 0.54 / 1.31.
        let stages = match hardware {
            HardwareType::SchmidEd137b => vec![
                BiquadFilter::high_pass(310.0, 0.54),
                BiquadFilter::high_pass(310.0, 1.31),
                BiquadFilter::low_pass(2700.0, 0.54),
                BiquadFilter::low_pass(2700.0, 1.31),
                BiquadFilter::peaking(2000.0, 1.0, 3.0),
            ],
            HardwareType::RockwellCollins2100 => vec![
                BiquadFilter::high_pass(300.0, 0.54),
                BiquadFilter::high_pass(300.0, 1.31),
                BiquadFilter::low_pass(3000.0, 0.54),
                BiquadFilter::low_pass(3000.0, 1.31),
                BiquadFilter::peaking(1800.0, 0.8, 2.0),
            ],
            HardwareType::Garex220 => vec![
                BiquadFilter::high_pass(360.0, 0.54),
                BiquadFilter::high_pass(360.0, 1.31),
                BiquadFilter::low_pass(2500.0, 0.54),
                BiquadFilter::low_pass(2500.0, 1.31),
            ],
            HardwareType::NoHardware => vec![],
        };
        VhfFilter { hardware, stages }
    }

    /// The hardware model this cascade emulates.
    pub fn hardware(&self) -> HardwareType {
        self.hardware
    }

    /// Filter one frame in place.
    pub fn transform_frame(&mut self, frame: &mut [f32]) {
        for stage in &mut self.stages {
            for sample in frame.iter_mut() {
                *sample = stage.process(*sample);
            }
        }
    }

    /// Zero all delay lines.
    pub fn reset(&mut self) {
        for stage in &mut self.stages {
            stage.reset();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use atcvoice_core::FRAME_SIZE_SAMPLES;

    fn tone(freq: f64, frames: usize) -> Vec<f32> {
        (0..FRAME_SIZE_SAMPLES * frames)
            .map(|n| {
                (std::f64::consts::TAU * freq * n as f64 / SAMPLE_RATE_HZ as f64).sin() as f32
            })
            .collect()
    }

    fn rms(buf: &[f32]) -> f32 {
        (buf.iter().map(|s| s * s).sum::<f32>() / buf.len() as f32).sqrt()
    }

    #[test]
    fn no_hardware_is_identity() {
        let mut filter = VhfFilter::new(HardwareType::NoHardware);
        let mut frame: Vec<f32> = tone(1000.0, 1);
        let before = frame.clone();
        filter.transform_frame(&mut frame);
        assert_eq!(frame, before);
    }

    #[test]
    fn rejects_dc() {
        let mut filter = VhfFilter::new(HardwareType::SchmidEd137b);
        let mut frame = vec![1.0_f32; FRAME_SIZE_SAMPLES];
        // Run a few frames so the high-pass settles.
        for _ in 0..10 {
            filter.transform_frame(&mut frame);
            frame.fill(1.0);
        }
        filter.transform_frame(&mut frame);
        assert!(rms(&frame) < 0.05, "DC should be rejected, rms {}", rms(&frame));
    }

    #[test]
    fn passes_voice_band_attenuates_out_of_band() {
        for hw in [
            HardwareType::SchmidEd137b,
            HardwareType::RockwellCollins2100,
            HardwareType::Garex220,
        ] {
            let mut filter = VhfFilter::new(hw);
            let mut mid = tone(1000.0, 10);
            filter.transform_frame(&mut mid);
            let mid_rms = rms(&mid[FRAME_SIZE_SAMPLES * 5..]);

            let mut filter = VhfFilter::new(hw);
            let mut high = tone(8000.0, 10);
            filter.transform_frame(&mut high);
            let high_rms = rms(&high[FRAME_SIZE_SAMPLES * 5..]);

            let mut filter = VhfFilter::new(hw);
            let mut low = tone(60.0, 10);
            filter.transform_frame(&mut low);
            let low_rms = rms(&low[FRAME_SIZE_SAMPLES * 5..]);

            assert!(
                mid_rms > 4.0 * high_rms,
                "{hw}: 1 kHz ({mid_rms}) should dominate 8 kHz ({high_rms})"
            );
            assert!(
                mid_rms > 4.0 * low_rms,
                "{hw}: 1 kHz ({mid_rms}) should dominate 60 Hz ({low_rms})"
            );
        }
    }

    #[test]
    fn reset_clears_state() {
        let mut filter = VhfFilter::new(HardwareType::Garex220);
        let mut frame = tone(1000.0, 1);
        filter.transform_frame(&mut frame);
        filter.reset();

        let mut fresh = VhfFilter::new(HardwareType::Garex220);
        let mut a = tone(1000.0, 1);
        let mut b = a.clone();
        filter.transform_frame(&mut a);
        fresh.transform_frame(&mut b);
        assert_eq!(a, b);
    }
}
