//! Opus implementations of the core voice codec traits.
//!
//! The voice protocol carries one 20 ms Opus frame per datagram, mono at
//! 48 kHz, VoIP profile. These wrappers adapt the `opus` crate to the
//! [`VoiceEncoder`] / [`VoiceDecoder`] seams; the stack itself never sees
//! the codec library.

use atcvoice_core::{Error, FRAME_SIZE_SAMPLES, Result, SAMPLE_RATE_HZ, VoiceDecoder, VoiceEncoder};

/// Upper bound for one compressed frame. The Opus maximum packet is
/// 1275 bytes; headroom costs nothing here.
const MAX_COMPRESSED_BYTES: usize = 2048;

/// Target encoder bitrate in bits per second.
const ENCODER_BITRATE: i32 = 16_384;

fn codec_err(e: opus::Error) -> Error {
    Error::Codec(e.to_string())
}

/// Opus mono VoIP encoder at the protocol sample rate.
pub struct OpusVoiceEncoder {
    encoder: opus::Encoder,
}

impl OpusVoiceEncoder {
    /// Create an encoder configured for the voice protocol.
    pub fn new() -> Result<Self> {
        let mut encoder =
            opus::Encoder::new(SAMPLE_RATE_HZ, opus::Channels::Mono, opus::Application::Voip)
                .map_err(codec_err)?;
        encoder
            .set_bitrate(opus::Bitrate::Bits(ENCODER_BITRATE))
            .map_err(codec_err)?;
        Ok(OpusVoiceEncoder { encoder })
    }
}

impl VoiceEncoder for OpusVoiceEncoder {
    fn encode(&mut self, pcm: &[f32]) -> Result<Vec<u8>> {
        if pcm.len() != FRAME_SIZE_SAMPLES {
            return Err(Error::Codec(format!(
                "encoder fed {} samples, expected {FRAME_SIZE_SAMPLES}",
                pcm.len()
            )));
        }
        self.encoder
            .encode_vec_float(pcm, MAX_COMPRESSED_BYTES)
            .map_err(codec_err)
    }

    fn reset(&mut self) {
        let _ = self.encoder.reset_state();
    }
}

/// Opus mono decoder at the protocol sample rate.
pub struct OpusVoiceDecoder {
    decoder: opus::Decoder,
}

impl OpusVoiceDecoder {
    /// Create a decoder configured for the voice protocol.
    pub fn new() -> Result<Self> {
        let decoder =
            opus::Decoder::new(SAMPLE_RATE_HZ, opus::Channels::Mono).map_err(codec_err)?;
        Ok(OpusVoiceDecoder { decoder })
    }
}

impl VoiceDecoder for OpusVoiceDecoder {
    fn decode(&mut self, packet: &[u8], pcm_out: &mut [f32]) -> Result<usize> {
        self.decoder
            .decode_float(packet, pcm_out, false)
            .map_err(codec_err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_decode_roundtrip_preserves_energy() {
        let mut enc = OpusVoiceEncoder::new().unwrap();
        let mut dec = OpusVoiceDecoder::new().unwrap();

        // A 440 Hz tone at moderate level.
        let pcm: Vec<f32> = (0..FRAME_SIZE_SAMPLES)
            .map(|n| {
                0.5 * (std::f32::consts::TAU * 440.0 * n as f32 / SAMPLE_RATE_HZ as f32).sin()
            })
            .collect();

        // Prime the codec with a couple of frames; Opus needs a little
        // lookahead before output is representative.
        let mut out = vec![0.0_f32; FRAME_SIZE_SAMPLES];
        for _ in 0..3 {
            let packet = enc.encode(&pcm).unwrap();
            assert!(!packet.is_empty());
            let n = dec.decode(&packet, &mut out).unwrap();
            assert_eq!(n, FRAME_SIZE_SAMPLES);
        }

        let energy: f32 = out.iter().map(|s| s * s).sum();
        assert!(energy > 1.0, "decoded tone should carry energy, got {energy}");
    }

    #[test]
    fn encode_rejects_wrong_frame_size() {
        let mut enc = OpusVoiceEncoder::new().unwrap();
        let r = enc.encode(&[0.0; 100]);
        assert!(matches!(r, Err(Error::Codec(_))));
    }

    #[test]
    fn decode_rejects_garbage() {
        let mut dec = OpusVoiceDecoder::new().unwrap();
        let mut out = vec![0.0_f32; FRAME_SIZE_SAMPLES];
        // Random bytes are not a valid Opus TOC sequence in general; either
        // an error or a decoded frame is acceptable, but never a panic.
        let _ = dec.decode(&[0xFF, 0xFF, 0xFF], &mut out);
    }
}
