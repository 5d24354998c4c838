//! Per-callsign remote voice source: jitter buffer plus decoder.

use std::collections::VecDeque;
use std::time::Instant;

use atcvoice_core::{FRAME_SIZE_SAMPLES, SampleSource, SourceStatus, VoiceDecoder};

/// Upper bound on buffered packets per callsign. A remote client bursting
/// faster than real time (or a long mixer stall) hits this before memory
/// does; the oldest frames are dropped.
const MAX_QUEUED_PACKETS: usize = 50;

/// Decodes one callsign's packet stream into fixed-size PCM frames.
///
/// Packets are queued as they arrive from the network thread and decoded
/// one per mixer frame on the audio thread; both sides are serialized by
/// the stack's stream-map lock. Late or duplicate packets (sequence not
/// beyond the last accepted one) are discarded.
///
/// Each source carries a stack-assigned `id` used as the key of the
/// mixer's per-frame sample cache; an address would be ambiguous across
/// entry replacement.
pub struct RemoteVoiceSource {
    id: u64,
    decoder: Box<dyn VoiceDecoder>,
    queue: VecDeque<Vec<u8>>,
    last_sequence: Option<u32>,
    last_activity: Instant,
}

impl RemoteVoiceSource {
    /// Create a source with the given stack-unique id.
    pub fn new(id: u64, decoder: Box<dyn VoiceDecoder>) -> Self {
        RemoteVoiceSource {
            id,
            decoder,
            queue: VecDeque::new(),
            last_sequence: None,
            last_activity: Instant::now(),
        }
    }

    /// Stable identity for the per-frame sample cache.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Queue one compressed frame from the network.
    pub fn append_packet(&mut self, sequence: u32, audio: Vec<u8>, last_packet: bool) {
        if let Some(last) = self.last_sequence {
            if sequence <= last {
                tracing::trace!(sequence, last, "dropping late or duplicate voice packet");
                return;
            }
        }
        self.last_sequence = Some(sequence);
        self.last_activity = Instant::now();
        if self.queue.len() >= MAX_QUEUED_PACKETS {
            self.queue.pop_front();
            tracing::trace!("voice queue overflow, dropping oldest frame");
        }
        self.queue.push_back(audio);
        if last_packet {
            tracing::trace!(sequence, "transmission ended");
        }
    }

    /// Whether a pull right now could produce audio.
    pub fn is_active(&self) -> bool {
        !self.queue.is_empty()
    }

    /// When this source last received a packet. Drives timer-based
    /// eviction from the stream table.
    pub fn last_activity(&self) -> Instant {
        self.last_activity
    }

    #[cfg(test)]
    pub(crate) fn set_last_activity(&mut self, t: Instant) {
        self.last_activity = t;
    }
}

impl SampleSource for RemoteVoiceSource {
    fn get_audio_frame(&mut self, buffer_out: &mut [f32]) -> SourceStatus {
        let Some(packet) = self.queue.pop_front() else {
            return SourceStatus::End;
        };
        match self.decoder.decode(&packet, buffer_out) {
            Ok(n) => {
                if n < buffer_out.len() {
                    buffer_out[n..].fill(0.0);
                }
                debug_assert!(n <= FRAME_SIZE_SAMPLES);
                SourceStatus::Ok
            }
            Err(e) => {
                // Transient stream fault: skip this frame, keep the entry.
                tracing::debug!(error = %e, "voice frame failed to decode");
                SourceStatus::End
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use atcvoice_core::{Error, Result};

    /// Fills the frame with `packet[0]` scaled to `[0, 1]`; errors on an
    /// empty packet.
    struct TestDecoder;

    impl VoiceDecoder for TestDecoder {
        fn decode(&mut self, packet: &[u8], pcm_out: &mut [f32]) -> Result<usize> {
            let Some(&value) = packet.first() else {
                return Err(Error::Codec("empty packet".into()));
            };
            pcm_out.fill(value as f32 / 255.0);
            Ok(pcm_out.len())
        }
    }

    fn source() -> RemoteVoiceSource {
        RemoteVoiceSource::new(1, Box::new(TestDecoder))
    }

    #[test]
    fn decodes_in_arrival_order() {
        let mut src = source();
        src.append_packet(1, vec![255], false);
        src.append_packet(2, vec![0], true);
        assert!(src.is_active());

        let mut buf = [0.0_f32; FRAME_SIZE_SAMPLES];
        assert_eq!(src.get_audio_frame(&mut buf), SourceStatus::Ok);
        assert_eq!(buf[0], 1.0);
        assert_eq!(src.get_audio_frame(&mut buf), SourceStatus::Ok);
        assert_eq!(buf[0], 0.0);
        assert_eq!(src.get_audio_frame(&mut buf), SourceStatus::End);
        assert!(!src.is_active());
    }

    #[test]
    fn drops_late_and_duplicate_packets() {
        let mut src = source();
        src.append_packet(5, vec![1], false);
        src.append_packet(5, vec![2], false);
        src.append_packet(4, vec![3], false);
        src.append_packet(6, vec![4], false);
        assert_eq!(src.queue.len(), 2);
    }

    #[test]
    fn empty_queue_reports_end() {
        let mut src = source();
        let mut buf = [0.0_f32; FRAME_SIZE_SAMPLES];
        assert_eq!(src.get_audio_frame(&mut buf), SourceStatus::End);
    }

    #[test]
    fn decode_fault_skips_frame() {
        let mut src = source();
        src.append_packet(1, vec![], false);
        src.append_packet(2, vec![128], false);
        let mut buf = [0.0_f32; FRAME_SIZE_SAMPLES];
        // Bad frame is consumed and skipped.
        assert_eq!(src.get_audio_frame(&mut buf), SourceStatus::End);
        // The stream recovers on the next frame.
        assert_eq!(src.get_audio_frame(&mut buf), SourceStatus::Ok);
    }

    #[test]
    fn queue_is_bounded() {
        let mut src = source();
        for i in 0..(MAX_QUEUED_PACKETS as u32 + 10) {
            src.append_packet(i + 1, vec![i as u8], false);
        }
        assert_eq!(src.queue.len(), MAX_QUEUED_PACKETS);
    }

    #[test]
    fn activity_updates_on_append() {
        let mut src = source();
        let before = src.last_activity();
        std::thread::sleep(std::time::Duration::from_millis(5));
        src.append_packet(1, vec![0], false);
        assert!(src.last_activity() > before);
    }
}
