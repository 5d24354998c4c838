//! atcvoice-stack: the ATC radio mixing stack.
//!
//! This crate is the real-time heart of atcvoice. [`AtcRadioStack`] owns:
//!
//! - the per-frequency radio state map,
//! - the per-callsign inbound voice stream table,
//! - the two output-device mixing pipelines (headset and speaker),
//! - the PTT-gated transmit path with sequence numbering and ATIS
//!   record/playback,
//! - the periodic maintenance of stale inbound streams.
//!
//! Three execution contexts cooperate: the audio output threads call
//! [`AtcRadioStack::get_audio_frame`] once per device per 20 ms, the audio
//! input thread calls [`AtcRadioStack::put_audio_frame`], and the tokio
//! event loop delivers decoded voice datagrams, runs the maintenance
//! sweep, and serves the control plane. Two locks serialize them -- the
//! radio-state lock and the stream-map lock -- and whenever both are held
//! the radio-state lock is acquired first.

pub mod radio;
pub mod remote_voice;
pub mod stack;

pub use radio::RadioState;
pub use remote_voice::RemoteVoiceSource;
pub use stack::{
    AtcRadioStack, COMPRESSED_SOURCE_CACHE_TIMEOUT, DecoderFactory, MAINTENANCE_INTERVAL,
    MicrophoneSink, OutputAudioDevice,
};
