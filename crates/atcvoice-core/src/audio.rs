//! Audio frame contracts and the voice codec seam.
//!
//! Everything in the stack moves audio in fixed 20 ms mono frames of
//! [`FRAME_SIZE_SAMPLES`] `f32` samples at [`SAMPLE_RATE_HZ`]. The frame
//! geometry is fixed by the voice protocol: a compressed voice datagram
//! always carries exactly one such frame.
//!
//! [`SampleSource`] is the pull contract: the platform audio output thread
//! asks for one frame per callback period. [`SampleSink`] is the push
//! contract for the microphone path. Neither trait is async -- both are
//! driven from real-time audio callbacks and must never block on I/O.
//!
//! [`VoiceEncoder`] / [`VoiceDecoder`] isolate the voice codec. The
//! production implementations wrap Opus (in `atcvoice-audio`); tests use
//! trivial substitutes.

use crate::error::Result;

/// Voice protocol sample rate in hertz.
pub const SAMPLE_RATE_HZ: u32 = 48_000;

/// Duration of one audio frame in milliseconds.
pub const FRAME_LENGTH_MS: u32 = 20;

/// Samples per mono audio frame (20 ms at 48 kHz).
pub const FRAME_SIZE_SAMPLES: usize = (SAMPLE_RATE_HZ as usize / 1000) * FRAME_LENGTH_MS as usize;

/// Result of pulling one frame from a [`SampleSource`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceStatus {
    /// The buffer was filled with one frame of audio.
    Ok,
    /// The source has nothing more to produce. One-shot sources report
    /// this once their clip is exhausted; a voice source reports it when
    /// its jitter buffer is empty.
    End,
}

/// A pull-model producer of fixed-size audio frames.
///
/// `buffer_out` is always exactly [`FRAME_SIZE_SAMPLES`] long. On
/// [`SourceStatus::End`] the buffer contents are unspecified and must not
/// be mixed.
pub trait SampleSource: Send {
    /// Produce one frame of audio into `buffer_out`.
    fn get_audio_frame(&mut self, buffer_out: &mut [f32]) -> SourceStatus;
}

/// A pull-model producer of per-ear audio frames.
///
/// Used instead of [`SampleSource`] when the output device is stereo and
/// radios are panned per ear. `left_out` and `right_out` are each
/// [`FRAME_SIZE_SAMPLES`] long.
pub trait SplitSampleSource: Send {
    /// Produce one frame of audio per ear.
    fn get_split_audio_frame(&mut self, left_out: &mut [f32], right_out: &mut [f32])
    -> SourceStatus;
}

/// A push-model consumer of fixed-size audio frames.
///
/// The microphone input thread delivers one frame per callback period.
pub trait SampleSink: Send {
    /// Accept one frame of audio.
    fn put_audio_frame(&mut self, buffer_in: &[f32]);
}

/// Hook invoked at the top of every microphone frame period.
///
/// Installed via the stack's `set_tick`; exists so tests can drive a
/// deterministic clock through the transmit path.
pub trait Tick: Send {
    /// Called once per frame period before any metering or encoding.
    fn tick(&mut self);
}

/// Compresses one PCM frame into an opaque codec packet.
pub trait VoiceEncoder: Send {
    /// Encode exactly one frame of [`FRAME_SIZE_SAMPLES`] samples.
    fn encode(&mut self, pcm: &[f32]) -> Result<Vec<u8>>;

    /// Drop all internal codec state, as after a disconnect.
    fn reset(&mut self);
}

/// Decompresses one codec packet into one PCM frame.
pub trait VoiceDecoder: Send {
    /// Decode one packet into `pcm_out` (exactly [`FRAME_SIZE_SAMPLES`]
    /// long). Returns the number of samples written.
    fn decode(&mut self, packet: &[u8], pcm_out: &mut [f32]) -> Result<usize>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_geometry() {
        // 20 ms at 48 kHz is 960 samples; the SIMD mixer additionally
        // requires a multiple of 4.
        assert_eq!(FRAME_SIZE_SAMPLES, 960);
        assert_eq!(FRAME_SIZE_SAMPLES % 4, 0);
    }

    #[test]
    fn source_status_equality() {
        assert_eq!(SourceStatus::Ok, SourceStatus::Ok);
        assert_ne!(SourceStatus::Ok, SourceStatus::End);
    }
}
