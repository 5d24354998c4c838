//! The ATC radio mixing stack.
//!
//! [`AtcRadioStack`] is shared behind an [`Arc`] between the platform audio
//! callbacks, the network receive path, and the control plane. Interior
//! state is split across two domain locks plus a handful of small
//! single-purpose mutexes and word-sized atomics:
//!
//! - the **radio-state lock** guards the frequency map and the
//!   transmit-side transceiver lookup,
//! - the **stream-map lock** guards the inbound per-callsign stream table.
//!
//! When both are held, the radio-state lock is always acquired first; the
//! mixer below demonstrates the order. The mixer holds them only for the
//! duration of one frame's work and never touches the network.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::broadcast;

use atcvoice_audio::{
    EffectResources, MicrophonePreprocessor, OpusVoiceDecoder, OpusVoiceEncoder,
    OutputDeviceState, PinkNoiseGenerator, RecordedSampleSource, RollingAverage, SineToneSource,
    VoiceCompressionSink, mix_buffers,
};
use atcvoice_core::dto::{DTO_AUDIO_RX, RxTransceiver};
use atcvoice_core::{
    AudioRxOnTransceivers, AudioTxOnTransceivers, ClientEvent, ClientPosition, CrossCoupleGroup,
    FRAME_LENGTH_MS, FRAME_SIZE_SAMPLES, HardwareType, PlaybackChannel, Result, SampleSink,
    SampleSource, SourceStatus, SplitSampleSource, StationTransceiver, Tick, Transceiver,
    VoiceChannel, VoiceDecoder, VoiceEncoder,
};

use crate::radio::RadioState;
use crate::remote_voice::RemoteVoiceSource;

/// Gain of the end-of-receive click.
const CLICK_GAIN: f32 = 1.3;

/// Gain of the concurrent-transmission block tone.
const BLOCK_TONE_GAIN: f32 = 0.25;

/// Frequency of the block tone in hertz.
const BLOCK_TONE_FREQ_HZ: f32 = 180.0;

/// Gain of the background noise floor.
const WHITE_NOISE_GAIN: f32 = 0.01;

/// How often the stream table is swept for stale entries.
pub const MAINTENANCE_INTERVAL: Duration = Duration::from_millis(30_000);

/// Idle time after which an inbound stream entry is evicted.
pub const COMPRESSED_SOURCE_CACHE_TIMEOUT: Duration = Duration::from_millis(10_000);

/// Event broadcast capacity; slow subscribers lose oldest events.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Factory for per-callsign voice decoders.
pub type DecoderFactory = Box<dyn Fn() -> Result<Box<dyn VoiceDecoder>> + Send + Sync>;

type FrameBuf = [f32; FRAME_SIZE_SAMPLES];

/// Per-callsign inbound stream entry: the voice source plus the
/// transceiver set from that callsign's most recent packet.
struct CallsignMeta {
    source: RemoteVoiceSource,
    transceivers: Vec<RxTransceiver>,
}

/// ATIS recorder/player state: the stored compressed frames, the playback
/// cursor, and the callsign the loop is announced under.
#[derive(Default)]
struct AtisStore {
    frames: Vec<Vec<u8>>,
    cursor: usize,
    callsign: String,
}

/// Device routing decision for one radio.
///
/// A radio normally follows its `on_headset` assignment. With relay
/// transmit (RT) active, headset radios additionally fan out to the
/// speaker path and are suppressed on the headset to avoid duplication.
fn routes_to_device(radio_on_headset: bool, is_headset: bool, rt: bool) -> bool {
    let positive_rt_override = !is_headset && radio_on_headset && rt;
    let negative_rt_override = is_headset && radio_on_headset && rt;
    positive_rt_override || (radio_on_headset == is_headset && !negative_rt_override)
}

/// Pull one frame from `effect` and mix it into the channel bus.
///
/// Returns `false` when the effect is exhausted and must be released by
/// the caller; an absent effect or a zero gain is a no-op success.
fn mix_effect(
    effect: Option<&mut dyn SampleSource>,
    gain: f32,
    state: &mut OutputDeviceState,
) -> bool {
    let Some(effect) = effect else {
        return true;
    };
    if gain <= 0.0 {
        return true;
    }
    if effect.get_audio_frame(&mut state.fetch.0) != SourceStatus::Ok {
        return false;
    }
    mix_buffers(&mut state.channel.0, &state.fetch.0, gain);
    true
}

// ---------------------------------------------------------------------------
// AtcRadioStack
// ---------------------------------------------------------------------------

/// The radio mixing stack: per-frequency radio state, inbound voice
/// streams, the dual output mixing pipeline, and the PTT-gated transmit
/// path with ATIS record/playback.
pub struct AtcRadioStack {
    resources: Arc<EffectResources>,
    event_tx: broadcast::Sender<ClientEvent>,

    /// Radio-state lock; acquired first whenever both locks are held.
    radio_state: Mutex<HashMap<u32, RadioState>>,
    /// Stream-map lock; acquired second whenever both locks are held.
    incoming_streams: Mutex<HashMap<String, CallsignMeta>>,

    headset_state: Mutex<OutputDeviceState>,
    speaker_state: Mutex<OutputDeviceState>,

    channel: Mutex<Option<Arc<dyn VoiceChannel>>>,
    compressor: Mutex<VoiceCompressionSink>,
    voice_filter: Mutex<Option<MicrophonePreprocessor>>,
    decoder_factory: DecoderFactory,
    tick: Mutex<Option<Box<dyn Tick>>>,
    vu_meter: Mutex<RollingAverage>,
    client_position: Mutex<ClientPosition>,
    callsign: Mutex<String>,
    atis: Mutex<AtisStore>,

    ptt: AtomicBool,
    last_frame_ptt: AtomicBool,
    rt: AtomicBool,
    atis_record: AtomicBool,
    atis_playback: AtomicBool,
    /// Number of inbound streams successfully pulled on the most recent
    /// device frame.
    incoming_audio_streams: AtomicU32,
    /// Transmit frame counter; strictly monotone across all emitted
    /// datagrams and ticked even while idle so gaps stay auditable.
    tx_sequence: AtomicU32,
    next_source_id: AtomicU64,
}

impl AtcRadioStack {
    /// Create a stack with an explicit codec configuration.
    pub fn new(
        resources: Arc<EffectResources>,
        encoder: Box<dyn VoiceEncoder>,
        decoder_factory: DecoderFactory,
    ) -> Arc<Self> {
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Arc::new(AtcRadioStack {
            resources,
            event_tx,
            radio_state: Mutex::new(HashMap::new()),
            incoming_streams: Mutex::new(HashMap::new()),
            headset_state: Mutex::new(OutputDeviceState::new()),
            speaker_state: Mutex::new(OutputDeviceState::new()),
            channel: Mutex::new(None),
            compressor: Mutex::new(VoiceCompressionSink::new(encoder)),
            voice_filter: Mutex::new(None),
            decoder_factory,
            tick: Mutex::new(None),
            vu_meter: Mutex::new(RollingAverage::new((300 / FRAME_LENGTH_MS) as usize)),
            client_position: Mutex::new(ClientPosition::default()),
            callsign: Mutex::new(String::new()),
            atis: Mutex::new(AtisStore::default()),
            ptt: AtomicBool::new(false),
            last_frame_ptt: AtomicBool::new(false),
            rt: AtomicBool::new(false),
            atis_record: AtomicBool::new(false),
            atis_playback: AtomicBool::new(false),
            incoming_audio_streams: AtomicU32::new(0),
            tx_sequence: AtomicU32::new(0),
            next_source_id: AtomicU64::new(1),
        })
    }

    /// Create a stack using the Opus voice codec.
    pub fn with_opus(resources: Arc<EffectResources>) -> Result<Arc<Self>> {
        let encoder = Box::new(OpusVoiceEncoder::new()?);
        let factory: DecoderFactory = Box::new(|| {
            Ok(Box::new(OpusVoiceDecoder::new()?) as Box<dyn VoiceDecoder>)
        });
        Ok(Self::new(resources, encoder, factory))
    }

    /// Subscribe to client events.
    pub fn subscribe(&self) -> broadcast::Receiver<ClientEvent> {
        self.event_tx.subscribe()
    }

    /// The event channel sender, for hosts that emit their own
    /// client-level events onto the same stream.
    pub fn event_sender(&self) -> broadcast::Sender<ClientEvent> {
        self.event_tx.clone()
    }

    // -- devices ------------------------------------------------------------

    /// A headset-path frame source holding a weak reference back to this
    /// stack, so an audio thread holding the device alive does not extend
    /// the stack's lifetime.
    pub fn headset_device(self: &Arc<Self>) -> OutputAudioDevice {
        OutputAudioDevice {
            stack: Arc::downgrade(self),
            on_headset: true,
        }
    }

    /// The speaker-path counterpart of [`headset_device`](Self::headset_device).
    pub fn speaker_device(self: &Arc<Self>) -> OutputAudioDevice {
        OutputAudioDevice {
            stack: Arc::downgrade(self),
            on_headset: false,
        }
    }

    /// A microphone sink delivering input frames into the transmit path.
    pub fn microphone_sink(self: &Arc<Self>) -> MicrophoneSink {
        MicrophoneSink {
            stack: Arc::downgrade(self),
        }
    }

    // -- channel ------------------------------------------------------------

    /// Attach or detach the voice datagram channel.
    ///
    /// The stack registers exactly one handler, for `AR` datagrams. A
    /// datagram that fails to decode is logged and dropped.
    pub fn set_udp_channel(self: &Arc<Self>, channel: Option<Arc<dyn VoiceChannel>>) {
        let mut guard = self.channel.lock();
        if let Some(old) = guard.take() {
            old.unregister_dto_handler(DTO_AUDIO_RX);
        }
        if let Some(channel) = channel {
            let weak = Arc::downgrade(self);
            channel.register_dto_handler(
                DTO_AUDIO_RX,
                Box::new(move |payload| match AudioRxOnTransceivers::decode(payload) {
                    Ok(pkt) => {
                        if let Some(stack) = weak.upgrade() {
                            stack.rx_voice_packet(pkt);
                        }
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, len = payload.len(), "unable to decode voice datagram");
                    }
                }),
            );
            *guard = Some(channel);
        }
    }

    // -- receive path -------------------------------------------------------

    /// Ingest one inbound voice datagram.
    ///
    /// The packet is accepted only if some present, receive-enabled radio
    /// matches one of its transceiver frequencies; that radio records the
    /// callsign as its last transmitter. Accepted packets are appended to
    /// the per-callsign voice source (created on first arrival) and the
    /// stored transceiver set is replaced.
    pub fn rx_voice_packet(&self, pkt: AudioRxOnTransceivers) {
        let listening = {
            let mut radios = self.radio_state.lock();
            let mut hit = false;
            for trans in &pkt.transceivers {
                if let Some(radio) = radios.get_mut(&trans.frequency) {
                    if radio.rx {
                        radio.last_transmit_callsign = pkt.callsign.clone();
                        hit = true;
                        break;
                    }
                }
            }
            hit
        };
        if !listening {
            tracing::trace!(callsign = %pkt.callsign, "voice packet matches no listening radio");
            return;
        }

        let mut streams = self.incoming_streams.lock();
        let meta = match streams.entry(pkt.callsign.clone()) {
            std::collections::hash_map::Entry::Occupied(e) => e.into_mut(),
            std::collections::hash_map::Entry::Vacant(v) => {
                let decoder = match (self.decoder_factory)() {
                    Ok(d) => d,
                    Err(e) => {
                        tracing::warn!(error = %e, "cannot create voice decoder");
                        return;
                    }
                };
                let id = self.next_source_id.fetch_add(1, Ordering::Relaxed);
                v.insert(CallsignMeta {
                    source: RemoteVoiceSource::new(id, decoder),
                    transceivers: Vec::new(),
                })
            }
        };
        meta.source
            .append_packet(pkt.sequence, pkt.audio, pkt.last_packet);
        meta.transceivers = pkt.transceivers;
    }

    /// Evict inbound stream entries idle longer than
    /// [`COMPRESSED_SOURCE_CACHE_TIMEOUT`].
    pub fn maintain_incoming_streams(&self) {
        let now = Instant::now();
        let mut streams = self.incoming_streams.lock();
        streams.retain(|callsign, meta| {
            let keep =
                now.duration_since(meta.source.last_activity()) <= COMPRESSED_SOURCE_CACHE_TIMEOUT;
            if !keep {
                tracing::debug!(callsign = %callsign, "evicting idle voice stream");
            }
            keep
        });
    }

    /// Run the maintenance sweep every [`MAINTENANCE_INTERVAL`] on the
    /// tokio runtime until the stack is dropped.
    pub fn spawn_maintenance(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let weak = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(MAINTENANCE_INTERVAL);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                match weak.upgrade() {
                    Some(stack) => stack.maintain_incoming_streams(),
                    None => break,
                }
            }
        })
    }

    // -- output mixer -------------------------------------------------------

    /// Produce one mono output frame for a device.
    ///
    /// Called once per output device per frame period by the audio output
    /// thread. Holds the radio-state lock and then the stream-map lock for
    /// the duration of the frame so the mix sees a consistent snapshot.
    pub fn get_audio_frame(&self, buffer_out: &mut [f32], on_headset: bool) -> SourceStatus {
        debug_assert_eq!(buffer_out.len(), FRAME_SIZE_SAMPLES);
        let state_lock = if on_headset {
            &self.headset_state
        } else {
            &self.speaker_state
        };

        let mut radios = self.radio_state.lock();
        let mut streams = self.incoming_streams.lock();
        let mut state = state_lock.lock();

        self.mix_into_state(&mut radios, &mut streams, &mut state, on_headset);

        for (i, out) in buffer_out.iter_mut().enumerate() {
            *out = state.mixing.0[i] + state.left_mixing.0[i] + state.right_mixing.0[i];
        }
        SourceStatus::Ok
    }

    /// Produce one frame per ear for a stereo device.
    ///
    /// Radios panned `Both` appear in both ears; radios panned `Left` or
    /// `Right` only in theirs.
    pub fn get_split_audio_frame(
        &self,
        left_out: &mut [f32],
        right_out: &mut [f32],
        on_headset: bool,
    ) -> SourceStatus {
        debug_assert_eq!(left_out.len(), FRAME_SIZE_SAMPLES);
        debug_assert_eq!(right_out.len(), FRAME_SIZE_SAMPLES);
        let state_lock = if on_headset {
            &self.headset_state
        } else {
            &self.speaker_state
        };

        let mut radios = self.radio_state.lock();
        let mut streams = self.incoming_streams.lock();
        let mut state = state_lock.lock();

        self.mix_into_state(&mut radios, &mut streams, &mut state, on_headset);

        for i in 0..FRAME_SIZE_SAMPLES {
            left_out[i] = state.mixing.0[i] + state.left_mixing.0[i];
            right_out[i] = state.mixing.0[i] + state.right_mixing.0[i];
        }
        SourceStatus::Ok
    }

    fn mix_into_state(
        &self,
        radios: &mut HashMap<u32, RadioState>,
        streams: &mut HashMap<String, CallsignMeta>,
        state: &mut OutputDeviceState,
        on_headset: bool,
    ) {
        let rt = self.rt.load(Ordering::Acquire);

        // Source prefetch: pull one frame from every active source routed
        // to this device, keyed by stable source id. A source that fails
        // to produce is omitted this frame (eviction is timer-driven).
        let mut sample_cache: HashMap<u64, FrameBuf> = HashMap::new();
        let mut all_streams = 0_u32;
        for meta in streams.values_mut() {
            let Some(first) = meta.transceivers.first() else {
                continue;
            };
            if first.frequency == 0 {
                continue;
            }
            let Some(radio) = radios.get(&first.frequency) else {
                continue;
            };
            if !routes_to_device(radio.on_headset, on_headset, rt) {
                continue;
            }
            if !meta.source.is_active() {
                continue;
            }
            if sample_cache.contains_key(&meta.source.id()) {
                continue;
            }
            let mut frame = [0.0_f32; FRAME_SIZE_SAMPLES];
            if meta.source.get_audio_frame(&mut frame) == SourceStatus::Ok {
                sample_cache.insert(meta.source.id(), frame);
                all_streams += 1;
            }
        }
        self.incoming_audio_streams
            .store(all_streams, Ordering::Release);

        state.clear_mixing_buses();

        let freqs: Vec<u32> = radios.keys().copied().collect();
        for freq in freqs {
            let routed = {
                let radio = &radios[&freq];
                routes_to_device(radio.on_headset, on_headset, rt)
            };
            if routed {
                let radio = radios.get_mut(&freq).expect("freq collected from map");
                self.process_radio(radio, streams, &sample_cache, state);
            }
        }
    }

    fn process_radio(
        &self,
        radio: &mut RadioState,
        streams: &HashMap<String, CallsignMeta>,
        sample_cache: &HashMap<u64, FrameBuf>,
        state: &mut OutputDeviceState,
    ) {
        state.channel.clear();

        if self.ptt.load(Ordering::Acquire) && radio.tx {
            // Transmitting on this radio: the operator does not hear their
            // own sidetone through the stack.
            radio.reset_fx(false);
            return;
        }

        let mut crackle_gain = 0.0_f32;
        let mut concurrent_streams = 0_u32;
        for meta in streams.values() {
            let Some(frame) = sample_cache.get(&meta.source.id()) else {
                continue;
            };
            let Some(closest) = meta
                .transceivers
                .iter()
                .filter(|t| t.frequency == radio.frequency)
                .max_by(|a, b| a.distance_ratio.total_cmp(&b.distance_ratio))
            else {
                continue;
            };

            let mut voice_gain = 1.0_f32;
            if !radio.bypass_effects {
                let dr = closest.distance_ratio as f64;
                let crackle_factor =
                    ((dr.exp() * dr.powi(-4) / 350.0) - 0.007_766_52).clamp(0.0, 0.20) as f32;
                crackle_gain = crackle_factor * 2.0;
                voice_gain = 1.0 - crackle_factor * 3.7;
            }
            mix_buffers(&mut state.channel.0, frame, voice_gain * radio.gain);
            concurrent_streams += 1;
        }

        if concurrent_streams > 0 {
            if radio.last_rx_count == 0 {
                let _ = self.event_tx.send(ClientEvent::RxOpen {
                    freq: radio.frequency,
                });
            }
            if !radio.bypass_effects {
                // Band-limit the mixed voice first so the noise bed and
                // crackle stay outside the filter.
                radio.vhf_filter.transform_frame(&mut state.channel.0);

                if radio.white_noise.is_none() {
                    radio.white_noise = Some(PinkNoiseGenerator::new());
                }
                if crackle_gain > 0.0 && radio.crackle.is_none() {
                    radio.crackle = Some(RecordedSampleSource::new(
                        self.resources.crackle.clone(),
                        true,
                    ));
                }
                if !mix_effect(
                    radio.crackle.as_mut().map(|e| e as &mut dyn SampleSource),
                    crackle_gain * radio.gain,
                    state,
                ) {
                    radio.crackle = None;
                }
                if !mix_effect(
                    radio
                        .white_noise
                        .as_mut()
                        .map(|e| e as &mut dyn SampleSource),
                    WHITE_NOISE_GAIN * radio.gain,
                    state,
                ) {
                    radio.white_noise = None;
                }
            }
            if concurrent_streams > 1 {
                if radio.block_tone.is_none() {
                    radio.block_tone = Some(SineToneSource::new(BLOCK_TONE_FREQ_HZ));
                }
                if !mix_effect(
                    radio
                        .block_tone
                        .as_mut()
                        .map(|e| e as &mut dyn SampleSource),
                    BLOCK_TONE_GAIN * radio.gain,
                    state,
                ) {
                    radio.block_tone = None;
                }
            } else {
                radio.block_tone = None;
            }
        } else {
            radio.reset_fx(true);
            if radio.last_rx_count > 0 {
                radio.click = Some(RecordedSampleSource::new(self.resources.click.clone(), false));
                let _ = self.event_tx.send(ClientEvent::RxClosed {
                    freq: radio.frequency,
                });
            }
        }
        radio.last_rx_count = concurrent_streams;

        // A pending click plays out regardless of stream count.
        if !mix_effect(
            radio.click.as_mut().map(|e| e as &mut dyn SampleSource),
            CLICK_GAIN * radio.gain,
            state,
        ) {
            radio.click = None;
        }

        let OutputDeviceState {
            channel,
            mixing,
            left_mixing,
            right_mixing,
            ..
        } = state;
        let bus = match radio.playback_channel {
            PlaybackChannel::Both => mixing,
            PlaybackChannel::Left => left_mixing,
            PlaybackChannel::Right => right_mixing,
        };
        mix_buffers(&mut bus.0, &channel.0, 1.0);
    }

    // -- transmit path ------------------------------------------------------

    /// Accept one microphone frame.
    ///
    /// Meters the frame, drives ATIS playback, and -- while PTT or ATIS
    /// record is active -- runs the frame through the optional input
    /// filter and the compressor. Silence is never transmitted, but the
    /// sequence counter still advances every frame period.
    pub fn put_audio_frame(&self, buffer_in: &[f32]) {
        if let Some(tick) = self.tick.lock().as_mut() {
            tick.tick();
        }
        if buffer_in.len() != FRAME_SIZE_SAMPLES {
            tracing::warn!(len = buffer_in.len(), "microphone frame has wrong size");
            return;
        }

        let mut peak = 0.0_f32;
        for &s in buffer_in {
            peak = peak.max(s.abs());
        }
        let peak_db = (20.0 * (peak as f64).log10()).clamp(-40.0, 0.0);
        self.vu_meter.lock().add_datum(peak_db);

        if self.atis_playback.load(Ordering::Acquire) {
            self.send_cached_atis_frame();
        }

        if !self.ptt.load(Ordering::Acquire)
            && !self.last_frame_ptt.load(Ordering::Acquire)
            && !self.atis_record.load(Ordering::Acquire)
        {
            // Nothing downstream consumes this frame, so tick the sequence
            // here; during ATIS playback the cached-frame send already did.
            if !self.atis_playback.load(Ordering::Acquire) {
                self.tx_sequence.fetch_add(1, Ordering::AcqRel);
            }
            return;
        }

        let packet = {
            let mut filter = self.voice_filter.lock();
            let mut compressor = self.compressor.lock();
            match filter.as_mut() {
                Some(filter) => {
                    let mut processed = [0.0_f32; FRAME_SIZE_SAMPLES];
                    processed.copy_from_slice(buffer_in);
                    filter.process_frame(&mut processed);
                    compressor.compress(&processed)
                }
                None => compressor.compress(buffer_in),
            }
        };
        match packet {
            Ok(bytes) => self.process_compressed_frame(bytes),
            Err(e) => tracing::warn!(error = %e, "voice frame failed to compress"),
        }
    }

    /// Completion path for one compressed frame.
    ///
    /// While ATIS record is active the frame is stored instead of sent.
    /// Otherwise a voice datagram is assembled under the radio-state lock
    /// and sent if the channel is open; the sequence number is consumed
    /// either way so gaps stay auditable.
    pub fn process_compressed_frame(&self, audio: Vec<u8>) {
        if self.atis_record.load(Ordering::Acquire) {
            self.atis.lock().frames.push(audio);
            return;
        }

        let (transceivers, last_packet) = {
            let radios = self.radio_state.lock();
            let ptt = self.ptt.load(Ordering::Acquire);
            self.last_frame_ptt.store(ptt, Ordering::Release);
            let mut ids = Vec::new();
            for radio in radios.values() {
                if !radio.tx {
                    continue;
                }
                ids.extend(radio.transceivers.iter().map(|t| t.id));
            }
            (ids, !ptt)
        };

        let dto = AudioTxOnTransceivers {
            sequence: self.tx_sequence.fetch_add(1, Ordering::AcqRel),
            callsign: self.callsign.lock().clone(),
            audio,
            last_packet,
            transceivers,
        };
        self.send_if_open(dto);
    }

    /// Emit the next stored ATIS frame, wrapping cyclically.
    fn send_cached_atis_frame(&self) {
        let (audio, callsign) = {
            let mut atis = self.atis.lock();
            if atis.frames.is_empty() {
                return;
            }
            let audio = atis.frames[atis.cursor].clone();
            atis.cursor += 1;
            if atis.cursor >= atis.frames.len() {
                atis.cursor = 0;
            }
            (audio, atis.callsign.clone())
        };

        let transceivers = {
            let radios = self.radio_state.lock();
            radios
                .values()
                .filter(|r| r.is_atis)
                .flat_map(|r| r.transceivers.iter().map(|t| t.id))
                .collect()
        };

        let dto = AudioTxOnTransceivers {
            sequence: self.tx_sequence.fetch_add(1, Ordering::AcqRel),
            callsign,
            audio,
            last_packet: false,
            transceivers,
        };
        self.send_if_open(dto);
    }

    fn send_if_open(&self, dto: AudioTxOnTransceivers) {
        let channel = self.channel.lock();
        if let Some(channel) = channel.as_ref() {
            if channel.is_open() {
                if let Err(e) = channel.send_dto(&dto) {
                    tracing::trace!(error = %e, "voice datagram dropped");
                }
            }
        }
    }

    // -- radio configuration ------------------------------------------------

    /// Add a radio for `freq`. `rx` comes up enabled, `tx`/`xc` disabled;
    /// a station name containing `"_ATIS"` marks an ATIS station with
    /// everything disabled instead.
    pub fn add_frequency(
        &self,
        freq: u32,
        on_headset: bool,
        station_name: &str,
        hardware: HardwareType,
    ) {
        let mut radios = self.radio_state.lock();
        radios.insert(
            freq,
            RadioState::new(freq, on_headset, station_name.to_string(), hardware),
        );
    }

    /// Remove the radio for `freq`, if present.
    pub fn remove_frequency(&self, freq: u32) {
        self.radio_state.lock().remove(&freq);
    }

    /// Whether a radio exists for `freq`.
    pub fn is_frequency_active(&self, freq: u32) -> bool {
        self.radio_state.lock().contains_key(&freq)
    }

    /// Enable or disable receive. Clearing the last enabled flag on a
    /// non-ATIS radio erases it.
    pub fn set_rx(&self, freq: u32, rx: bool) {
        let mut radios = self.radio_state.lock();
        if let Some(radio) = radios.get_mut(&freq) {
            radio.rx = rx;
            if radio.is_unused() {
                radios.remove(&freq);
            }
        }
    }

    /// Enable or disable transmit; same auto-erase rule as [`set_rx`](Self::set_rx).
    pub fn set_tx(&self, freq: u32, tx: bool) {
        let mut radios = self.radio_state.lock();
        if let Some(radio) = radios.get_mut(&freq) {
            radio.tx = tx;
            if radio.is_unused() {
                radios.remove(&freq);
            }
        }
    }

    /// Enable or disable cross-couple; same auto-erase rule as [`set_rx`](Self::set_rx).
    pub fn set_xc(&self, freq: u32, xc: bool) {
        let mut radios = self.radio_state.lock();
        if let Some(radio) = radios.get_mut(&freq) {
            radio.xc = xc;
            if radio.is_unused() {
                radios.remove(&freq);
            }
        }
    }

    /// Route a radio to the headset or the speaker.
    pub fn set_on_headset(&self, freq: u32, on_headset: bool) {
        if let Some(radio) = self.radio_state.lock().get_mut(&freq) {
            radio.on_headset = on_headset;
        }
    }

    /// Pan a radio onto the main, left, or right output bus.
    pub fn set_playback_channel(&self, freq: u32, channel: PlaybackChannel) {
        if let Some(radio) = self.radio_state.lock().get_mut(&freq) {
            radio.playback_channel = channel;
        }
    }

    /// Set one radio's linear receive gain.
    pub fn set_gain(&self, freq: u32, gain: f32) {
        if let Some(radio) = self.radio_state.lock().get_mut(&freq) {
            radio.gain = gain;
        }
    }

    /// Set every radio's linear receive gain.
    pub fn set_gain_all(&self, gain: f32) {
        for radio in self.radio_state.lock().values_mut() {
            radio.gain = gain;
        }
    }

    /// Replace a radio's transceiver set from API station data. IDs are
    /// zeroed here and stamped by the next [`make_transceiver_dto`](Self::make_transceiver_dto).
    pub fn set_transceivers(&self, freq: u32, transceivers: &[StationTransceiver]) {
        if let Some(radio) = self.radio_state.lock().get_mut(&freq) {
            radio.transceivers = transceivers
                .iter()
                .map(|t| Transceiver {
                    id: 0,
                    frequency: freq,
                    lat_deg: t.lat_deg,
                    lon_deg: t.lon_deg,
                    height_msl_m: t.height_msl_m,
                    height_agl_m: t.height_agl_m,
                })
                .collect();
        }
    }

    /// Position used for synthetic transceivers.
    pub fn set_client_position(&self, position: ClientPosition) {
        *self.client_position.lock() = position;
    }

    /// Assemble the transceiver list for the voice session to post.
    ///
    /// Radios with no stored transceivers get one synthesized at the
    /// client position. IDs are assigned sequentially across the whole
    /// emission and stamped back into the radio state so the cross-couple
    /// assembly can reference them.
    pub fn make_transceiver_dto(&self) -> Vec<Transceiver> {
        let position = *self.client_position.lock();
        let mut radios = self.radio_state.lock();
        let mut out = Vec::new();
        let mut next_id: u16 = 0;
        for (freq, radio) in radios.iter_mut() {
            if radio.transceivers.is_empty() {
                let synthetic = Transceiver {
                    id: next_id,
                    frequency: *freq,
                    lat_deg: position.lat_deg,
                    lon_deg: position.lon_deg,
                    height_msl_m: position.height_msl_m,
                    height_agl_m: position.height_agl_m,
                };
                radio.transceivers = vec![synthetic];
                out.push(synthetic);
                next_id += 1;
            } else {
                for trans in radio.transceivers.iter_mut() {
                    trans.id = next_id;
                    out.push(*trans);
                    next_id += 1;
                }
            }
        }
        out
    }

    /// Assemble the cross-couple DTO: one group (ID 0) with the
    /// transceiver IDs of every radio with both `xc` and `tx` set. The
    /// group is emitted even when empty.
    pub fn make_cross_couple_group_dto(&self) -> Vec<CrossCoupleGroup> {
        let radios = self.radio_state.lock();
        let mut group = CrossCoupleGroup {
            id: 0,
            transceiver_ids: Vec::new(),
        };
        for radio in radios.values() {
            if !radio.xc || !radio.tx {
                continue;
            }
            group
                .transceiver_ids
                .extend(radio.transceivers.iter().map(|t| t.id));
        }
        vec![group]
    }

    // -- queries ------------------------------------------------------------

    /// Last callsign heard on `freq`, or empty.
    pub fn last_transmit_on_freq(&self, freq: u32) -> String {
        self.radio_state
            .lock()
            .get(&freq)
            .map(|r| r.last_transmit_callsign.clone())
            .unwrap_or_default()
    }

    /// Whether `freq` has receive enabled.
    pub fn get_rx_state(&self, freq: u32) -> bool {
        self.radio_state.lock().get(&freq).map_or(false, |r| r.rx)
    }

    /// Whether `freq` has transmit enabled.
    pub fn get_tx_state(&self, freq: u32) -> bool {
        self.radio_state.lock().get(&freq).map_or(false, |r| r.tx)
    }

    /// Whether `freq` has cross-couple enabled.
    pub fn get_xc_state(&self, freq: u32) -> bool {
        self.radio_state.lock().get(&freq).map_or(false, |r| r.xc)
    }

    /// Whether `freq` is currently keyed: transmit-enabled and PTT down.
    pub fn get_tx_active(&self, freq: u32) -> bool {
        let radios = self.radio_state.lock();
        match radios.get(&freq) {
            Some(radio) => radio.tx && self.ptt.load(Ordering::Acquire),
            None => false,
        }
    }

    /// Whether `freq` is currently hearing voice: receive-enabled with
    /// streams mixed on the previous frame.
    pub fn get_rx_active(&self, freq: u32) -> bool {
        let radios = self.radio_state.lock();
        match radios.get(&freq) {
            Some(radio) => radio.rx && radio.last_rx_count > 0,
            None => false,
        }
    }

    /// Number of inbound streams pulled on the most recent device frame.
    pub fn incoming_audio_streams(&self) -> u32 {
        self.incoming_audio_streams.load(Ordering::Acquire)
    }

    /// Current transmit sequence counter.
    pub fn tx_sequence(&self) -> u32 {
        self.tx_sequence.load(Ordering::Acquire)
    }

    /// Input VU (windowed mean peak), floored at -40 dB.
    pub fn vu(&self) -> f64 {
        self.vu_meter.lock().average().max(-40.0)
    }

    /// Input peak over the metering window, floored at -40 dB.
    pub fn peak(&self) -> f64 {
        self.vu_meter.lock().max().max(-40.0)
    }

    // -- transmit configuration ---------------------------------------------

    /// Key or release push-to-talk.
    pub fn set_ptt(&self, pressed: bool) {
        self.ptt.store(pressed, Ordering::Release);
    }

    /// Enable or disable relay transmit (headset audio fans out to the
    /// speaker path).
    pub fn set_rt(&self, active: bool) {
        self.rt.store(active, Ordering::Release);
    }

    /// Set the callsign stamped on outbound voice datagrams.
    pub fn set_callsign(&self, callsign: &str) {
        *self.callsign.lock() = callsign.to_string();
    }

    /// Install or remove the microphone input filter chain.
    pub fn set_enable_input_filters(&self, enable: bool) {
        let mut filter = self.voice_filter.lock();
        if enable {
            if filter.is_none() {
                *filter = Some(MicrophonePreprocessor::new());
            }
        } else {
            *filter = None;
        }
    }

    /// Whether the microphone input filter chain is installed.
    pub fn enable_input_filters(&self) -> bool {
        self.voice_filter.lock().is_some()
    }

    /// Enable or disable receive effects (VHF filter, crackle, noise) on
    /// every radio.
    pub fn set_enable_output_effects(&self, enable: bool) {
        for radio in self.radio_state.lock().values_mut() {
            radio.bypass_effects = !enable;
        }
    }

    /// Install the per-frame tick hook (deterministic test clocks).
    pub fn set_tick(&self, tick: Option<Box<dyn Tick>>) {
        *self.tick.lock() = tick;
    }

    // -- ATIS ---------------------------------------------------------------

    /// Start or stop ATIS recording. Starting clears previously stored
    /// frames.
    pub fn set_record_atis(&self, recording: bool) {
        if recording && !self.atis_record.load(Ordering::Acquire) {
            let mut atis = self.atis.lock();
            atis.frames.clear();
            atis.cursor = 0;
        }
        self.atis_record.store(recording, Ordering::Release);
    }

    /// Whether ATIS recording is active.
    pub fn atis_recording(&self) -> bool {
        self.atis_record.load(Ordering::Acquire)
    }

    /// Begin looping the stored ATIS frames under `atis_callsign`.
    /// Ignored while recording.
    pub fn start_atis_playback(&self, atis_callsign: &str) {
        if self.atis_record.load(Ordering::Acquire) {
            return;
        }
        self.atis.lock().callsign = atis_callsign.to_string();
        self.atis_playback.store(true, Ordering::Release);
    }

    /// Stop ATIS playback and remove all ATIS stations from the radio map.
    pub fn stop_atis_playback(&self) {
        self.atis_playback.store(false, Ordering::Release);
        self.atis.lock().callsign.clear();
        self.radio_state.lock().retain(|_, radio| !radio.is_atis);
    }

    /// Whether ATIS playback is active.
    pub fn is_atis_playing_back(&self) -> bool {
        self.atis_playback.load(Ordering::Acquire)
    }

    /// Enable or disable receive on all ATIS stations (monitoring one's
    /// own broadcast).
    pub fn listen_to_atis(&self, listen: bool) {
        for radio in self.radio_state.lock().values_mut() {
            if radio.is_atis {
                radio.rx = listen;
            }
        }
    }

    /// Whether any ATIS station has receive enabled.
    pub fn is_atis_listening(&self) -> bool {
        self.radio_state
            .lock()
            .values()
            .any(|r| r.is_atis && r.rx)
    }

    // -- teardown -----------------------------------------------------------

    /// Clear all radios and inbound streams, release PTT, zero the
    /// sequence counter, and reset the compressor.
    pub fn reset(&self) {
        self.incoming_streams.lock().clear();
        self.radio_state.lock().clear();
        self.tx_sequence.store(0, Ordering::Release);
        self.ptt.store(false, Ordering::Release);
        self.last_frame_ptt.store(false, Ordering::Release);
        self.compressor.lock().reset();
    }
}

// ---------------------------------------------------------------------------
// Device-facing adapters
// ---------------------------------------------------------------------------

/// Frame source handed to a platform output device.
///
/// Holds only a weak reference: once the stack is gone the device plays
/// silence and reports [`SourceStatus::End`].
pub struct OutputAudioDevice {
    stack: Weak<AtcRadioStack>,
    on_headset: bool,
}

impl SampleSource for OutputAudioDevice {
    fn get_audio_frame(&mut self, buffer_out: &mut [f32]) -> SourceStatus {
        match self.stack.upgrade() {
            Some(stack) => stack.get_audio_frame(buffer_out, self.on_headset),
            None => {
                buffer_out.fill(0.0);
                SourceStatus::End
            }
        }
    }
}

impl SplitSampleSource for OutputAudioDevice {
    fn get_split_audio_frame(
        &mut self,
        left_out: &mut [f32],
        right_out: &mut [f32],
    ) -> SourceStatus {
        match self.stack.upgrade() {
            Some(stack) => stack.get_split_audio_frame(left_out, right_out, self.on_headset),
            None => {
                left_out.fill(0.0);
                right_out.fill(0.0);
                SourceStatus::End
            }
        }
    }
}

/// Frame sink handed to the platform input device; forwards microphone
/// frames into the transmit path through a weak reference.
pub struct MicrophoneSink {
    stack: Weak<AtcRadioStack>,
}

impl SampleSink for MicrophoneSink {
    fn put_audio_frame(&mut self, buffer_in: &[f32]) {
        if let Some(stack) = self.stack.upgrade() {
            stack.put_audio_frame(buffer_in);
        }
    }
}
