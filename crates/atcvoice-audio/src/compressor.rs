//! Transmit-side compression front end.
//!
//! [`VoiceCompressionSink`] validates frame geometry and hands PCM to the
//! configured [`VoiceEncoder`]. The radio stack feeds it one microphone
//! frame per period while PTT (or ATIS record) is active and forwards the
//! returned packet to its own datagram assembly, so packets leave in
//! exactly the order the encoder produced them.

use atcvoice_core::{Error, FRAME_SIZE_SAMPLES, Result, VoiceEncoder};

/// Frame-validating wrapper around a [`VoiceEncoder`].
pub struct VoiceCompressionSink {
    encoder: Box<dyn VoiceEncoder>,
}

impl VoiceCompressionSink {
    /// Wrap `encoder`.
    pub fn new(encoder: Box<dyn VoiceEncoder>) -> Self {
        VoiceCompressionSink { encoder }
    }

    /// Compress one frame, returning the codec packet.
    pub fn compress(&mut self, pcm: &[f32]) -> Result<Vec<u8>> {
        if pcm.len() != FRAME_SIZE_SAMPLES {
            return Err(Error::Codec(format!(
                "compressor fed {} samples, expected {FRAME_SIZE_SAMPLES}",
                pcm.len()
            )));
        }
        self.encoder.encode(pcm)
    }

    /// Drop all codec state, as after a session reset.
    pub fn reset(&mut self) {
        self.encoder.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct CountingEncoder {
        frames: u32,
        resets: u32,
    }

    impl VoiceEncoder for CountingEncoder {
        fn encode(&mut self, _pcm: &[f32]) -> Result<Vec<u8>> {
            self.frames += 1;
            Ok(vec![self.frames as u8])
        }

        fn reset(&mut self) {
            self.resets += 1;
        }
    }

    #[test]
    fn compress_forwards_to_encoder() {
        let mut sink = VoiceCompressionSink::new(Box::new(CountingEncoder {
            frames: 0,
            resets: 0,
        }));
        let frame = vec![0.0_f32; FRAME_SIZE_SAMPLES];
        assert_eq!(sink.compress(&frame).unwrap(), vec![1]);
        assert_eq!(sink.compress(&frame).unwrap(), vec![2]);
    }

    #[test]
    fn compress_rejects_short_frame() {
        let mut sink = VoiceCompressionSink::new(Box::new(CountingEncoder {
            frames: 0,
            resets: 0,
        }));
        assert!(matches!(
            sink.compress(&[0.0; 10]),
            Err(Error::Codec(_))
        ));
    }
}
