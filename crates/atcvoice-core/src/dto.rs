//! Voice server data transfer objects and their binary wire codec.
//!
//! The voice UDP channel carries named datagrams: two ASCII bytes of DTO
//! name followed by the DTO payload. Only two DTOs travel over UDP --
//! [`AudioRxOnTransceivers`] (`AR`, server to client) and
//! [`AudioTxOnTransceivers`] (`AT`, client to server). The remaining types
//! here ([`Transceiver`], [`CrossCoupleGroup`], [`StationTransceiver`]) are
//! control-plane objects posted over the voice session's HTTP surface and
//! never serialized by this module.
//!
//! All wire integers are big-endian. Strings are a `u16` byte length
//! followed by UTF-8. Lists are a `u16` element count followed by the
//! elements. This is a pure codec with no I/O dependencies; all functions
//! operate on byte buffers and return parsed structures or errors.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{Error, Result};

/// DTO name for inbound voice datagrams (server to client).
pub const DTO_AUDIO_RX: &str = "AR";

/// DTO name for outbound voice datagrams (client to server).
pub const DTO_AUDIO_TX: &str = "AT";

// ---------------------------------------------------------------------------
// Wire primitives
// ---------------------------------------------------------------------------

fn put_string(buf: &mut BytesMut, s: &str) {
    buf.put_u16(s.len() as u16);
    buf.put_slice(s.as_bytes());
}

fn get_string(buf: &mut Bytes) -> Result<String> {
    if buf.remaining() < 2 {
        return Err(Error::Protocol("truncated string length".into()));
    }
    let len = buf.get_u16() as usize;
    if buf.remaining() < len {
        return Err(Error::Protocol(format!(
            "truncated string: need {len} bytes, have {}",
            buf.remaining()
        )));
    }
    let raw = buf.copy_to_bytes(len);
    String::from_utf8(raw.to_vec()).map_err(|e| Error::Protocol(format!("invalid UTF-8: {e}")))
}

fn put_bytes(buf: &mut BytesMut, b: &[u8]) {
    buf.put_u16(b.len() as u16);
    buf.put_slice(b);
}

fn get_bytes(buf: &mut Bytes) -> Result<Vec<u8>> {
    if buf.remaining() < 2 {
        return Err(Error::Protocol("truncated byte-field length".into()));
    }
    let len = buf.get_u16() as usize;
    if buf.remaining() < len {
        return Err(Error::Protocol(format!(
            "truncated byte field: need {len} bytes, have {}",
            buf.remaining()
        )));
    }
    Ok(buf.copy_to_bytes(len).to_vec())
}

fn need(buf: &Bytes, n: usize, what: &str) -> Result<()> {
    if buf.remaining() < n {
        return Err(Error::Protocol(format!(
            "truncated {what}: need {n} bytes, have {}",
            buf.remaining()
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Transceiver DTOs
// ---------------------------------------------------------------------------

/// A receiving transceiver as attached to an inbound voice datagram.
///
/// `distance_ratio` is the server-computed proximity measure in `[0, 1]`;
/// higher means closer. It drives the crackle/voice gain curve in the mixer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RxTransceiver {
    /// Transceiver ID as assigned in the last transceiver update.
    pub id: u16,
    /// Frequency in hertz.
    pub frequency: u32,
    /// Proximity measure in `[0, 1]`, higher is closer.
    pub distance_ratio: f32,
}

/// A geolocated transceiver as posted to the voice server.
///
/// IDs are assigned sequentially across one whole emission by the
/// transceiver DTO assembly; see the stack's `make_transceiver_dto`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transceiver {
    /// Globally unique ID within one transceiver update.
    pub id: u16,
    /// Frequency in hertz.
    pub frequency: u32,
    /// Latitude in decimal degrees.
    pub lat_deg: f64,
    /// Longitude in decimal degrees.
    pub lon_deg: f64,
    /// Height above mean sea level in metres.
    pub height_msl_m: f64,
    /// Height above ground level in metres.
    pub height_agl_m: f64,
}

/// A station transceiver as returned by the API server (no ID, no
/// frequency -- those are assigned when the station is linked to a radio).
#[derive(Debug, Clone, PartialEq)]
pub struct StationTransceiver {
    /// Station-assigned transceiver name.
    pub name: String,
    /// Latitude in decimal degrees.
    pub lat_deg: f64,
    /// Longitude in decimal degrees.
    pub lon_deg: f64,
    /// Height above mean sea level in metres.
    pub height_msl_m: f64,
    /// Height above ground level in metres.
    pub height_agl_m: f64,
}

/// A cross-couple group: transceivers the server relays between when any
/// one of them transmits.
///
/// The client always posts exactly one group with ID 0, even when the
/// member list is empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrossCoupleGroup {
    /// Group ID; always 0 for this client.
    pub id: u16,
    /// IDs of the coupled transceivers.
    pub transceiver_ids: Vec<u16>,
}

// ---------------------------------------------------------------------------
// AudioRxOnTransceivers ("AR")
// ---------------------------------------------------------------------------

/// An inbound voice datagram: one compressed frame from one callsign,
/// heard on one or more transceivers.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioRxOnTransceivers {
    /// Callsign of the transmitting party.
    pub callsign: String,
    /// Transmitter's frame sequence counter.
    pub sequence: u32,
    /// Whether this is the final datagram of the transmission.
    pub last_packet: bool,
    /// One compressed codec frame.
    pub audio: Vec<u8>,
    /// Transceivers this stream was heard on.
    pub transceivers: Vec<RxTransceiver>,
}

impl AudioRxOnTransceivers {
    /// Encode the DTO payload (without the two-byte datagram name).
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = BytesMut::with_capacity(16 + self.audio.len() + self.callsign.len());
        put_string(&mut buf, &self.callsign);
        buf.put_u32(self.sequence);
        buf.put_u8(self.last_packet as u8);
        put_bytes(&mut buf, &self.audio);
        buf.put_u16(self.transceivers.len() as u16);
        for t in &self.transceivers {
            buf.put_u16(t.id);
            buf.put_u32(t.frequency);
            buf.put_f32(t.distance_ratio);
        }
        buf.to_vec()
    }

    /// Decode a DTO payload (without the two-byte datagram name).
    pub fn decode(data: &[u8]) -> Result<Self> {
        let mut buf = Bytes::copy_from_slice(data);
        let callsign = get_string(&mut buf)?;
        need(&buf, 5, "AR header")?;
        let sequence = buf.get_u32();
        let last_packet = buf.get_u8() != 0;
        let audio = get_bytes(&mut buf)?;
        need(&buf, 2, "AR transceiver count")?;
        let count = buf.get_u16() as usize;
        let mut transceivers = Vec::with_capacity(count);
        for _ in 0..count {
            need(&buf, 10, "AR transceiver")?;
            transceivers.push(RxTransceiver {
                id: buf.get_u16(),
                frequency: buf.get_u32(),
                distance_ratio: buf.get_f32(),
            });
        }
        Ok(AudioRxOnTransceivers {
            callsign,
            sequence,
            last_packet,
            audio,
            transceivers,
        })
    }
}

// ---------------------------------------------------------------------------
// AudioTxOnTransceivers ("AT")
// ---------------------------------------------------------------------------

/// An outbound voice datagram: one compressed frame from this client,
/// transmitted on the listed transceiver IDs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AudioTxOnTransceivers {
    /// This client's frame sequence counter.
    pub sequence: u32,
    /// This client's callsign (or ATIS callsign during playback).
    pub callsign: String,
    /// One compressed codec frame.
    pub audio: Vec<u8>,
    /// Whether this is the final datagram of the transmission.
    pub last_packet: bool,
    /// IDs of the transceivers carrying the transmission.
    pub transceivers: Vec<u16>,
}

impl AudioTxOnTransceivers {
    /// Encode the DTO payload (without the two-byte datagram name).
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = BytesMut::with_capacity(16 + self.audio.len() + self.callsign.len());
        buf.put_u32(self.sequence);
        put_string(&mut buf, &self.callsign);
        buf.put_u8(self.last_packet as u8);
        put_bytes(&mut buf, &self.audio);
        buf.put_u16(self.transceivers.len() as u16);
        for id in &self.transceivers {
            buf.put_u16(*id);
        }
        buf.to_vec()
    }

    /// Decode a DTO payload (without the two-byte datagram name).
    pub fn decode(data: &[u8]) -> Result<Self> {
        let mut buf = Bytes::copy_from_slice(data);
        need(&buf, 4, "AT sequence")?;
        let sequence = buf.get_u32();
        let callsign = get_string(&mut buf)?;
        need(&buf, 1, "AT flags")?;
        let last_packet = buf.get_u8() != 0;
        let audio = get_bytes(&mut buf)?;
        need(&buf, 2, "AT transceiver count")?;
        let count = buf.get_u16() as usize;
        let mut transceivers = Vec::with_capacity(count);
        for _ in 0..count {
            need(&buf, 2, "AT transceiver id")?;
            transceivers.push(buf.get_u16());
        }
        Ok(AudioTxOnTransceivers {
            sequence,
            callsign,
            audio,
            last_packet,
            transceivers,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ar_roundtrip() {
        let dto = AudioRxOnTransceivers {
            callsign: "AFR123".into(),
            sequence: 4711,
            last_packet: false,
            audio: vec![0x10, 0x20, 0x30],
            transceivers: vec![
                RxTransceiver {
                    id: 3,
                    frequency: 118_100_000,
                    distance_ratio: 0.5,
                },
                RxTransceiver {
                    id: 9,
                    frequency: 121_500_000,
                    distance_ratio: 1.0,
                },
            ],
        };
        let decoded = AudioRxOnTransceivers::decode(&dto.encode()).unwrap();
        assert_eq!(decoded, dto);
    }

    #[test]
    fn at_roundtrip() {
        let dto = AudioTxOnTransceivers {
            sequence: 99,
            callsign: "LFPG_TWR".into(),
            audio: vec![1, 2, 3, 4],
            last_packet: true,
            transceivers: vec![0, 1, 2],
        };
        let decoded = AudioTxOnTransceivers::decode(&dto.encode()).unwrap();
        assert_eq!(decoded, dto);
    }

    #[test]
    fn ar_truncated_rejected() {
        let dto = AudioRxOnTransceivers {
            callsign: "AFR123".into(),
            sequence: 1,
            last_packet: false,
            audio: vec![0xAB; 32],
            transceivers: vec![RxTransceiver {
                id: 0,
                frequency: 118_100_000,
                distance_ratio: 0.2,
            }],
        };
        let encoded = dto.encode();
        // Chop the buffer at every possible point; none may panic, all
        // must error.
        for cut in 0..encoded.len() {
            let r = AudioRxOnTransceivers::decode(&encoded[..cut]);
            assert!(r.is_err(), "decode of {cut}-byte prefix should fail");
        }
    }

    #[test]
    fn ar_invalid_utf8_rejected() {
        // Length-2 string with invalid UTF-8 contents.
        let raw = [0x00, 0x02, 0xFF, 0xFE];
        let r = AudioRxOnTransceivers::decode(&raw);
        assert!(matches!(r, Err(Error::Protocol(_))));
    }

    #[test]
    fn at_empty_transceivers_roundtrip() {
        // A PTT release while no radio is transmit-enabled produces an AT
        // datagram with no transceivers; it must still be representable.
        let dto = AudioTxOnTransceivers {
            sequence: 7,
            callsign: "EDDF_APP".into(),
            audio: vec![],
            last_packet: true,
            transceivers: vec![],
        };
        let decoded = AudioTxOnTransceivers::decode(&dto.encode()).unwrap();
        assert_eq!(decoded, dto);
    }
}
