//! atcvoice-transport: the UDP voice channel.
//!
//! This crate provides [`UdpVoiceChannel`], the production implementation
//! of the [`VoiceChannel`](atcvoice_core::VoiceChannel) contract the radio
//! stack consumes. Datagrams are two ASCII bytes of DTO name followed by
//! the DTO payload; the channel dispatches inbound datagrams to registered
//! handlers and drains outbound ones through a bounded queue so the
//! transmit path never blocks on the socket.

pub mod udp;

pub use udp::UdpVoiceChannel;
