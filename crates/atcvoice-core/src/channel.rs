//! The voice datagram channel contract.
//!
//! The radio stack does not own a socket. It consumes this narrow contract:
//! named handler registration for inbound datagrams and a non-blocking send
//! for outbound ones. The production implementation
//! (`atcvoice-transport::UdpVoiceChannel`) runs over plain UDP; the
//! encrypted framing used by the live network is an external collaborator
//! layered below this contract.
//!
//! Handlers are invoked on the channel's receive task with the raw DTO
//! payload (datagram name already stripped). [`VoiceChannel::send_dto`] must
//! be callable from non-async contexts -- the stack calls it from the
//! compressor completion path -- and must never block; implementations queue
//! or drop.

use crate::dto::AudioTxOnTransceivers;
use crate::error::Result;

/// Callback invoked with the payload of each inbound datagram of the
/// registered name.
pub type DtoHandler = Box<dyn Fn(&[u8]) + Send + Sync>;

/// A named-datagram channel to the voice server.
pub trait VoiceChannel: Send + Sync {
    /// Register `handler` for inbound datagrams named `name`, replacing any
    /// previous handler of that name.
    fn register_dto_handler(&self, name: &str, handler: DtoHandler);

    /// Remove the handler for `name`, if any.
    fn unregister_dto_handler(&self, name: &str);

    /// Queue one outbound voice datagram.
    ///
    /// Returns `Ok(())` when the datagram was accepted for sending. A closed
    /// channel reports [`crate::Error::NotConnected`]; callers on the
    /// transmit path drop the datagram silently in that case.
    fn send_dto(&self, dto: &AudioTxOnTransceivers) -> Result<()>;

    /// Whether the channel is currently connected.
    fn is_open(&self) -> bool;
}
