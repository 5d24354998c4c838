//! Per-frequency radio state.

use atcvoice_audio::{PinkNoiseGenerator, RecordedSampleSource, SineToneSource, VhfFilter};
use atcvoice_core::{HardwareType, PlaybackChannel, Transceiver};

/// The internal state object for one radio (one frequency) within the
/// stack.
///
/// Tracks configuration flags, the assigned transceivers, and the lazily
/// constructed effect instances whose playback position carries across
/// mixer frames. A radio is "active" iff it is present in the stack's map;
/// a non-ATIS radio is erased automatically when `rx`, `tx`, and `xc` are
/// all cleared.
pub struct RadioState {
    /// Frequency in hertz.
    pub frequency: u32,
    /// Station name this radio was added for (e.g. `"LFPG_TWR"`).
    pub station_name: String,
    /// Receive enabled.
    pub rx: bool,
    /// Transmit enabled.
    pub tx: bool,
    /// Cross-couple enabled.
    pub xc: bool,
    /// This is an ATIS playback station.
    pub is_atis: bool,
    /// Routed to the headset device (false routes to the speaker).
    pub on_headset: bool,
    /// Skip VHF filtering and effects for this radio.
    pub bypass_effects: bool,
    /// Linear receive gain.
    pub gain: f32,
    /// Stereo bus this radio mixes onto.
    pub playback_channel: PlaybackChannel,
    /// Hardware model selecting the VHF filter response.
    pub hardware: HardwareType,
    /// Transceivers assigned to this radio, IDs stamped by the last
    /// transceiver DTO assembly.
    pub transceivers: Vec<Transceiver>,
    /// Callsign of the most recent transmission heard on this frequency.
    pub last_transmit_callsign: String,

    pub(crate) click: Option<RecordedSampleSource>,
    pub(crate) crackle: Option<RecordedSampleSource>,
    pub(crate) white_noise: Option<PinkNoiseGenerator>,
    pub(crate) block_tone: Option<SineToneSource>,
    pub(crate) vhf_filter: VhfFilter,
    /// Concurrent voice streams mixed into this radio on the previous
    /// frame; drives the RxOpen/RxClosed transitions and the click.
    pub(crate) last_rx_count: u32,
}

impl RadioState {
    /// Initialize a radio with default flags (`rx` on, `tx`/`xc` off).
    ///
    /// Station names containing `"_ATIS"` mark an ATIS station: those come
    /// up with everything off and `is_atis` set, so the radio stays in the
    /// map until ATIS playback is stopped.
    pub fn new(frequency: u32, on_headset: bool, station_name: String, hardware: HardwareType) -> Self {
        let is_atis = station_name.contains("_ATIS");
        RadioState {
            frequency,
            station_name,
            rx: !is_atis,
            tx: false,
            xc: false,
            is_atis,
            on_headset,
            bypass_effects: false,
            gain: 1.0,
            playback_channel: PlaybackChannel::Both,
            hardware,
            transceivers: Vec::new(),
            last_transmit_callsign: String::new(),
            click: None,
            crackle: None,
            white_noise: None,
            block_tone: None,
            vhf_filter: VhfFilter::new(hardware),
            last_rx_count: 0,
        }
    }

    /// Release effect instances.
    ///
    /// With `except_click` the pending click survives (the end-of-receive
    /// click must still play out after the streams stop); otherwise the
    /// click is dropped too and the receive counter is cleared.
    pub(crate) fn reset_fx(&mut self, except_click: bool) {
        if !except_click {
            self.click = None;
            self.last_rx_count = 0;
        }
        self.block_tone = None;
        self.crackle = None;
        self.white_noise = None;
    }

    /// Whether the auto-erase rule applies: nothing left enabled and not
    /// an ATIS station.
    pub(crate) fn is_unused(&self) -> bool {
        !self.rx && !self.tx && !self.xc && !self.is_atis
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let r = RadioState::new(118_100_000, true, "LFPG_TWR".into(), HardwareType::SchmidEd137b);
        assert!(r.rx);
        assert!(!r.tx);
        assert!(!r.xc);
        assert!(!r.is_atis);
        assert!(r.on_headset);
        assert_eq!(r.gain, 1.0);
        assert_eq!(r.playback_channel, PlaybackChannel::Both);
        assert!(r.transceivers.is_empty());
    }

    #[test]
    fn atis_station_name_disables_rx() {
        let r = RadioState::new(
            136_000_000,
            false,
            "LFPG_ATIS".into(),
            HardwareType::NoHardware,
        );
        assert!(r.is_atis);
        assert!(!r.rx);
        assert!(!r.tx);
        assert!(!r.xc);
        // ATIS radios are never auto-erased.
        assert!(!r.is_unused());
    }

    #[test]
    fn unused_rule() {
        let mut r = RadioState::new(118_100_000, true, "LFPG_TWR".into(), HardwareType::NoHardware);
        assert!(!r.is_unused());
        r.rx = false;
        assert!(r.is_unused());
        r.xc = true;
        assert!(!r.is_unused());
    }

    #[test]
    fn reset_fx_keeps_click_when_asked() {
        let mut r = RadioState::new(118_100_000, true, "T".into(), HardwareType::NoHardware);
        r.click = Some(RecordedSampleSource::new(
            std::sync::Arc::new(vec![1.0; 16]),
            false,
        ));
        r.block_tone = Some(SineToneSource::new(180.0));
        r.last_rx_count = 3;

        r.reset_fx(true);
        assert!(r.click.is_some());
        assert!(r.block_tone.is_none());
        assert_eq!(r.last_rx_count, 3);

        r.reset_fx(false);
        assert!(r.click.is_none());
        assert_eq!(r.last_rx_count, 0);
    }
}
