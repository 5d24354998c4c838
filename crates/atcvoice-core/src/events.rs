//! Asynchronous client event types.
//!
//! Events are emitted by the radio stack and the client through a
//! [`tokio::sync::broadcast`] channel (the channel itself lives with the
//! emitters; this crate only defines the event type). Host applications
//! subscribe for UI updates -- receive indicators, PTT state, session
//! health -- without polling.
//!
//! Delivery is best-effort through a bounded channel; a slow consumer may
//! miss events under load.

use std::collections::HashMap;

/// An event emitted by the voice client when its state changes.
#[derive(Debug, Clone)]
pub enum ClientEvent {
    /// Voice started arriving on a receive-enabled frequency.
    RxOpen {
        /// Frequency in hertz.
        freq: u32,
    },

    /// The last concurrent voice stream on a frequency went quiet.
    RxClosed {
        /// Frequency in hertz.
        freq: u32,
    },

    /// Push-to-talk engaged; the client is transmitting.
    PttOpen,

    /// Push-to-talk released.
    PttClosed,

    /// The voice server connection was established.
    VoiceServerConnected,

    /// The voice server connection went away.
    VoiceServerDisconnected,

    /// The voice server connection failed.
    VoiceServerError {
        /// Human-readable failure description.
        message: String,
    },

    /// The API session came up.
    ApiServerConnected,

    /// The API session went down.
    ApiServerDisconnected,

    /// The API session failed.
    ApiServerError {
        /// Human-readable failure description.
        message: String,
    },

    /// An audio device could not be opened or failed mid-stream.
    AudioError {
        /// Human-readable failure description.
        message: String,
    },

    /// The station alias list was refreshed from the API server.
    StationAliasesUpdated,

    /// New transceivers were received for a station.
    StationTransceiversUpdated {
        /// Station name the transceivers belong to.
        station: String,
    },

    /// A VCCS frequency map was received for a station.
    VccsReceived {
        /// Station name the map belongs to.
        station: String,
        /// Position name to frequency (hertz).
        frequencies: HashMap<String, u32>,
    },
}
