//! Decoded PCM effect assets.
//!
//! [`EffectResources`] holds the sample clips the radio effects play:
//! the side-tone click, the crackle bed, the AC bus hum, and the VHF/HF
//! noise floors. Clips are decoded once at startup from a resource
//! directory of WAV files and shared by reference with every effect
//! instance the mixer creates.

use std::path::Path;
use std::sync::Arc;

use atcvoice_core::{Error, Result, SAMPLE_RATE_HZ};

/// Shared, decoded PCM clips for all radio effects.
pub struct EffectResources {
    /// End-of-receive side-tone click (one-shot).
    pub click: Arc<Vec<f32>>,
    /// Distance crackle bed (looped).
    pub crackle: Arc<Vec<f32>>,
    /// AC bus hum (looped).
    pub ac_bus: Arc<Vec<f32>>,
    /// VHF noise floor (looped).
    pub vhf_white_noise: Arc<Vec<f32>>,
    /// HF noise floor (looped).
    pub hf_white_noise: Arc<Vec<f32>>,
}

impl EffectResources {
    /// Load all clips from WAV files under `base_path`.
    ///
    /// Expects `click.wav`, `crackle.wav`, `ac_bus.wav`, `vhf_noise.wav`,
    /// and `hf_noise.wav`. Multi-channel files are downmixed to mono.
    pub fn load(base_path: &Path) -> Result<Self> {
        Ok(EffectResources {
            click: Arc::new(read_wav_mono(&base_path.join("click.wav"))?),
            crackle: Arc::new(read_wav_mono(&base_path.join("crackle.wav"))?),
            ac_bus: Arc::new(read_wav_mono(&base_path.join("ac_bus.wav"))?),
            vhf_white_noise: Arc::new(read_wav_mono(&base_path.join("vhf_noise.wav"))?),
            hf_white_noise: Arc::new(read_wav_mono(&base_path.join("hf_noise.wav"))?),
        })
    }

    /// Build resources from raw sample buffers. Used by tests and by hosts
    /// that ship assets in another container format.
    pub fn from_samples(
        click: Vec<f32>,
        crackle: Vec<f32>,
        ac_bus: Vec<f32>,
        vhf_white_noise: Vec<f32>,
        hf_white_noise: Vec<f32>,
    ) -> Self {
        EffectResources {
            click: Arc::new(click),
            crackle: Arc::new(crackle),
            ac_bus: Arc::new(ac_bus),
            vhf_white_noise: Arc::new(vhf_white_noise),
            hf_white_noise: Arc::new(hf_white_noise),
        }
    }
}

/// Read a WAV file as mono f32 samples.
///
/// 16-bit integer and 32-bit float WAVs are accepted; multi-channel
/// content is downmixed by averaging. A sample rate other than the
/// protocol rate is rejected rather than resampled.
pub fn read_wav_mono(path: &Path) -> Result<Vec<f32>> {
    let mut reader = hound::WavReader::open(path)
        .map_err(|e| Error::AudioDevice(format!("cannot open {}: {e}", path.display())))?;
    let spec = reader.spec();
    if spec.sample_rate != SAMPLE_RATE_HZ {
        return Err(Error::InvalidParameter(format!(
            "{}: sample rate {} != {}",
            path.display(),
            spec.sample_rate,
            SAMPLE_RATE_HZ
        )));
    }

    let interleaved: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<std::result::Result<_, _>>()
            .map_err(|e| Error::Protocol(format!("{}: {e}", path.display())))?,
        hound::SampleFormat::Int => reader
            .samples::<i16>()
            .map(|s| s.map(|v| v as f32 / i16::MAX as f32))
            .collect::<std::result::Result<_, _>>()
            .map_err(|e| Error::Protocol(format!("{}: {e}", path.display())))?,
    };

    let channels = spec.channels as usize;
    if channels <= 1 {
        return Ok(interleaved);
    }
    Ok(interleaved
        .chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_samples_shares_clips() {
        let res = EffectResources::from_samples(
            vec![1.0; 8],
            vec![0.5; 8],
            vec![],
            vec![],
            vec![],
        );
        let clip = res.click.clone();
        assert_eq!(clip.len(), 8);
        assert_eq!(Arc::strong_count(&res.click), 2);
    }

    #[test]
    fn read_wav_mono_roundtrip() {
        let dir = std::env::temp_dir().join("atcvoice-resources-test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("click.wav");

        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: SAMPLE_RATE_HZ,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(&path, spec).unwrap();
        for v in [0_i16, 16384, -16384, 32767] {
            writer.write_sample(v).unwrap();
        }
        writer.finalize().unwrap();

        let samples = read_wav_mono(&path).unwrap();
        assert_eq!(samples.len(), 4);
        assert!((samples[1] - 0.5).abs() < 1e-3);
        assert!((samples[3] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn read_wav_downmixes_stereo() {
        let dir = std::env::temp_dir().join("atcvoice-resources-test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("stereo.wav");

        let spec = hound::WavSpec {
            channels: 2,
            sample_rate: SAMPLE_RATE_HZ,
            bits_per_sample: 32,
            sample_format: hound::SampleFormat::Float,
        };
        let mut writer = hound::WavWriter::create(&path, spec).unwrap();
        for v in [1.0_f32, 0.0, 0.5, 0.5] {
            writer.write_sample(v).unwrap();
        }
        writer.finalize().unwrap();

        let samples = read_wav_mono(&path).unwrap();
        assert_eq!(samples.len(), 2);
        assert!((samples[0] - 0.5).abs() < 1e-6);
        assert!((samples[1] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn read_wav_rejects_wrong_rate() {
        let dir = std::env::temp_dir().join("atcvoice-resources-test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("wrong_rate.wav");

        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 44_100,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(&path, spec).unwrap();
        writer.write_sample(0_i16).unwrap();
        writer.finalize().unwrap();

        assert!(read_wav_mono(&path).is_err());
    }

    #[test]
    fn load_missing_directory_fails() {
        let r = EffectResources::load(Path::new("/nonexistent/atcvoice"));
        assert!(r.is_err());
    }
}
