//! atcvoice-core: Core traits, types, and error definitions for atcvoice.
//!
//! This crate defines the transport- and platform-agnostic abstractions that
//! the rest of the atcvoice workspace builds on. The radio mixing stack, the
//! audio device adapters, and the UDP voice channel all depend on these types
//! without pulling in any I/O machinery.
//!
//! # Key types
//!
//! - [`SampleSource`] / [`SampleSink`] -- the pull/push audio frame contracts
//! - [`VoiceEncoder`] / [`VoiceDecoder`] -- the voice codec seam
//! - [`VoiceChannel`] -- the datagram channel contract the stack consumes
//! - [`ClientEvent`] -- asynchronous state change notifications
//! - [`Error`] / [`Result`] -- error handling

pub mod audio;
pub mod channel;
pub mod dto;
pub mod error;
pub mod events;
pub mod helpers;
pub mod types;

// Re-export key types at crate root for ergonomic `use atcvoice_core::*`.
pub use audio::{
    FRAME_LENGTH_MS, FRAME_SIZE_SAMPLES, SAMPLE_RATE_HZ, SampleSink, SampleSource, SourceStatus,
    SplitSampleSource, Tick, VoiceDecoder, VoiceEncoder,
};
pub use channel::{DtoHandler, VoiceChannel};
pub use dto::{
    AudioRxOnTransceivers, AudioTxOnTransceivers, CrossCoupleGroup, RxTransceiver,
    StationTransceiver, Transceiver,
};
pub use error::{Error, Result};
pub use events::ClientEvent;
pub use helpers::format_freq_mhz;
pub use types::{ClientPosition, HardwareType, PlaybackChannel};
