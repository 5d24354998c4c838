//! atcvoice-audio: DSP building blocks and platform audio I/O for atcvoice.
//!
//! Everything the radio mixing stack needs below the mixing layer lives
//! here:
//!
//! - [`mix`] -- the SIMD-friendly mix primitive and channel interleaver
//! - [`buffers`] -- aligned per-device PCM scratch buffers
//! - [`sources`] -- looped clips, sine tone, pink noise
//! - [`filter`] -- biquad cascades and the per-hardware VHF band-pass
//! - [`vu`] -- the bounded-window peak/VU meter
//! - [`resources`] -- decoded PCM effect assets (click, crackle, noise)
//! - [`codec`] -- Opus implementations of the core codec traits
//! - [`preprocessor`] -- the optional microphone input filter chain
//! - [`compressor`] -- the transmit-side compression front end
//! - [`device`] -- cpal device enumeration and the frame-accumulating
//!   callback bridge

pub mod buffers;
pub mod codec;
pub mod compressor;
pub mod device;
pub mod filter;
pub mod mix;
pub mod preprocessor;
pub mod resources;
pub mod sources;
pub mod vu;

pub use buffers::{AlignedFrame, OutputDeviceState};
pub use codec::{OpusVoiceDecoder, OpusVoiceEncoder};
pub use compressor::VoiceCompressionSink;
pub use device::{AudioDevice, AudioDeviceInfo, list_audio_devices};
pub use filter::{BiquadFilter, VhfFilter};
pub use mix::{interleave, mix_buffers};
pub use preprocessor::MicrophonePreprocessor;
pub use resources::EffectResources;
pub use sources::{PinkNoiseGenerator, RecordedSampleSource, SineToneSource};
pub use vu::RollingAverage;
