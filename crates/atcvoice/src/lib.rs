//! # atcvoice -- Voice Client Stack for Simulated Air Traffic Control
//!
//! `atcvoice` is an asynchronous Rust library implementing the real-time
//! voice stack of an air-traffic-control client: multiple simultaneous
//! radio frequencies, per-callsign inbound voice streams with VHF radio
//! artefacts, dual headset/speaker mixing, a PTT-gated transmit path, and
//! ATIS record/playback.
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::path::Path;
//! use std::sync::Arc;
//! use atcvoice::{AtcClient, EffectResources, HardwareType};
//!
//! #[tokio::main]
//! async fn main() -> atcvoice::Result<()> {
//!     let resources = Arc::new(EffectResources::load(Path::new("resources"))?);
//!     let client = AtcClient::new(resources)?;
//!
//!     client.set_callsign("LFPG_TWR");
//!     client.add_frequency(118_100_000, true, "LFPG_TWR", HardwareType::SchmidEd137b);
//!     client.connect_voice("198.51.100.7:3782".parse().unwrap()).await?;
//!     client.start_audio()?;
//!     client.set_ptt(true);
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! The library is organized as a workspace of focused crates:
//!
//! | Crate                 | Purpose                                         |
//! |-----------------------|-------------------------------------------------|
//! | `atcvoice-core`       | Types, DTOs + wire codec, errors, events, traits |
//! | `atcvoice-audio`      | DSP, effect assets, Opus codec, cpal devices    |
//! | `atcvoice-stack`      | The radio mixing stack (the real-time core)     |
//! | `atcvoice-transport`  | UDP voice channel                               |
//! | **`atcvoice`**        | This facade crate -- client orchestration       |
//!
//! ## Event Subscription
//!
//! The stack and the client emit [`ClientEvent`]s through a broadcast
//! channel. Subscribe to receive RX open/close transitions, PTT state,
//! and session health without polling:
//!
//! ```no_run
//! # async fn example(client: &atcvoice::AtcClient) {
//! let mut events = client.subscribe();
//! while let Ok(event) = events.recv().await {
//!     println!("{event:?}");
//! }
//! # }
//! ```

pub mod client;
pub mod session;

pub use atcvoice_core::*;

/// DSP building blocks, effect assets, and platform audio devices.
pub use atcvoice_audio as audio;

/// The radio mixing stack.
pub use atcvoice_stack as stack;

/// The UDP voice channel.
pub use atcvoice_transport as transport;

pub use atcvoice_audio::{AudioDevice, EffectResources, list_audio_devices};
pub use atcvoice_stack::AtcRadioStack;
pub use atcvoice_transport::UdpVoiceChannel;
pub use client::AtcClient;
pub use session::TransceiverPublisher;
