//! Client orchestration: wiring the stack to the channel, the audio
//! devices, and the control plane.
//!
//! [`AtcClient`] owns one [`AtcRadioStack`] plus the collaborators around
//! it. Its main responsibilities beyond delegation:
//!
//! - **PTT guarding**: keying up while a transceiver update is still in
//!   flight would transmit on stale transceiver IDs, so PTT is held off
//!   (`want_ptt`) until the post completes, then opened.
//! - **Transceiver update scheduling**: radio changes queue an immediate
//!   post of the transceiver and cross-couple DTOs through the
//!   [`TransceiverPublisher`] seam, and a background task re-posts
//!   periodically.
//! - **Audio device lifecycle**: the headset device carries the microphone
//!   and the headset mix; the speaker device carries the speaker mix.
//!   Open failures surface as [`ClientEvent::AudioError`].

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::broadcast;

use atcvoice_audio::{AudioDevice, EffectResources};
use atcvoice_core::{
    ClientEvent, ClientPosition, HardwareType, PlaybackChannel, Result, StationTransceiver,
    VoiceChannel,
};
use atcvoice_stack::AtcRadioStack;
use atcvoice_transport::UdpVoiceChannel;

use crate::session::TransceiverPublisher;

/// How often the transceiver list is re-posted while connected.
const TRANSCEIVER_UPDATE_INTERVAL: Duration = Duration::from_secs(20);

/// The ATC voice client.
pub struct AtcClient {
    stack: Arc<AtcRadioStack>,
    event_tx: broadcast::Sender<ClientEvent>,

    channel: Mutex<Option<Arc<UdpVoiceChannel>>>,
    publisher: Mutex<Option<Arc<dyn TransceiverPublisher>>>,

    headset_device: Mutex<Option<AudioDevice>>,
    speaker_device: Mutex<Option<AudioDevice>>,
    input_device_name: Mutex<Option<String>>,
    output_device_name: Mutex<Option<String>>,
    speaker_device_name: Mutex<Option<String>>,

    want_ptt: AtomicBool,
    ptt: AtomicBool,
    tx_update_pending: AtomicBool,

    maintenance_task: Mutex<Option<tokio::task::JoinHandle<()>>>,
    update_task: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl AtcClient {
    /// Create a client with the Opus codec and the given effect assets.
    pub fn new(resources: Arc<EffectResources>) -> Result<Arc<Self>> {
        Ok(Self::with_stack(AtcRadioStack::with_opus(resources)?))
    }

    /// Create a client around an existing stack (tests, custom codecs).
    pub fn with_stack(stack: Arc<AtcRadioStack>) -> Arc<Self> {
        let event_tx = stack.event_sender();
        Arc::new(AtcClient {
            stack,
            event_tx,
            channel: Mutex::new(None),
            publisher: Mutex::new(None),
            headset_device: Mutex::new(None),
            speaker_device: Mutex::new(None),
            input_device_name: Mutex::new(None),
            output_device_name: Mutex::new(None),
            speaker_device_name: Mutex::new(None),
            want_ptt: AtomicBool::new(false),
            ptt: AtomicBool::new(false),
            tx_update_pending: AtomicBool::new(false),
            maintenance_task: Mutex::new(None),
            update_task: Mutex::new(None),
        })
    }

    /// The underlying radio stack, for hosts that need direct access.
    pub fn stack(&self) -> &Arc<AtcRadioStack> {
        &self.stack
    }

    /// Subscribe to client events.
    pub fn subscribe(&self) -> broadcast::Receiver<ClientEvent> {
        self.event_tx.subscribe()
    }

    /// Install the control-plane seam used for transceiver updates.
    pub fn set_publisher(&self, publisher: Option<Arc<dyn TransceiverPublisher>>) {
        *self.publisher.lock() = publisher;
    }

    // -- voice connection ---------------------------------------------------

    /// Open the UDP voice channel to `addr` and start the background
    /// maintenance and update tasks.
    pub async fn connect_voice(self: &Arc<Self>, addr: SocketAddr) -> Result<()> {
        let channel = Arc::new(UdpVoiceChannel::connect(addr).await?);
        self.stack
            .set_udp_channel(Some(channel.clone() as Arc<dyn VoiceChannel>));
        *self.channel.lock() = Some(channel);

        *self.maintenance_task.lock() = Some(self.stack.spawn_maintenance());
        self.queue_transceiver_update();

        tracing::info!(remote = %addr, "voice channel connected");
        let _ = self.event_tx.send(ClientEvent::VoiceServerConnected);
        Ok(())
    }

    /// Tear down the voice connection: release PTT, detach the stack's
    /// handler, close the channel, stop the background tasks, and reset
    /// the stack.
    pub fn disconnect_voice(&self) {
        self.set_ptt(false);
        self.stack.set_udp_channel(None);

        if let Some(channel) = self.channel.lock().take() {
            channel.close();
        }
        if let Some(task) = self.maintenance_task.lock().take() {
            task.abort();
        }
        if let Some(task) = self.update_task.lock().take() {
            task.abort();
        }
        self.tx_update_pending.store(false, Ordering::Release);
        self.stack.reset();

        tracing::info!("voice channel disconnected");
        let _ = self.event_tx.send(ClientEvent::VoiceServerDisconnected);
    }

    /// Whether a voice channel is currently open.
    pub fn is_voice_connected(&self) -> bool {
        self.channel.lock().as_ref().is_some_and(|c| c.is_open())
    }

    // -- PTT ----------------------------------------------------------------

    /// Request push-to-talk.
    ///
    /// Keying is deferred while a transceiver update is pending and opened
    /// automatically once the post succeeds. Release is immediate.
    pub fn set_ptt(&self, pressed: bool) {
        self.want_ptt.store(pressed, Ordering::Release);
        if pressed && self.tx_update_pending.load(Ordering::Acquire) {
            tracing::debug!("PTT guarded: transceiver update in flight");
            return;
        }
        self.apply_want_ptt();
    }

    /// Open PTT if it was guarded and is still wanted.
    fn unguard_ptt(&self) {
        if self.want_ptt.load(Ordering::Acquire) && !self.ptt.load(Ordering::Acquire) {
            tracing::debug!("PTT unguarded");
            self.apply_want_ptt();
        }
    }

    fn apply_want_ptt(&self) {
        let want = self.want_ptt.load(Ordering::Acquire);
        if want == self.ptt.swap(want, Ordering::AcqRel) {
            return;
        }
        self.stack.set_ptt(want);
        let _ = self.event_tx.send(if want {
            ClientEvent::PttOpen
        } else {
            ClientEvent::PttClosed
        });
    }

    /// Whether PTT is currently open (not merely requested).
    pub fn ptt_open(&self) -> bool {
        self.ptt.load(Ordering::Acquire)
    }

    // -- transceiver updates ------------------------------------------------

    /// Restart the periodic transceiver update task, posting immediately.
    ///
    /// Requires a tokio runtime; called outside one (e.g. configuring
    /// radios before startup) the update is deferred to the next queue.
    pub fn queue_transceiver_update(self: &Arc<Self>) {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            tracing::debug!("no async runtime, transceiver update deferred");
            return;
        };
        let weak = Arc::downgrade(self);
        let task = handle.spawn(async move {
            let mut interval = tokio::time::interval(TRANSCEIVER_UPDATE_INTERVAL);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                let Some(client) = weak.upgrade() else { break };
                client.post_transceiver_update().await;
            }
        });
        if let Some(old) = self.update_task.lock().replace(task) {
            old.abort();
        }
    }

    /// Post the transceiver and cross-couple DTOs through the publisher.
    ///
    /// PTT stays guarded from the start of the post until it succeeds; a
    /// failed post leaves the guard in place for the next attempt.
    async fn post_transceiver_update(&self) {
        let Some(publisher) = self.publisher.lock().clone() else {
            return;
        };
        self.tx_update_pending.store(true, Ordering::Release);

        let transceivers = self.stack.make_transceiver_dto();
        let groups = self.stack.make_cross_couple_group_dto();

        match publisher.post_transceiver_update(transceivers).await {
            Ok(()) => {
                self.tx_update_pending.store(false, Ordering::Release);
                self.unguard_ptt();
            }
            Err(e) => {
                tracing::warn!(error = %e, "transceiver update failed");
                return;
            }
        }

        if let Err(e) = publisher.post_cross_couple_update(groups).await {
            tracing::warn!(error = %e, "cross-couple update failed");
        }
    }

    // -- audio devices ------------------------------------------------------

    /// Select the audio API input device (microphone).
    pub fn set_audio_input_device(&self, name: &str) {
        *self.input_device_name.lock() = Some(name.to_string());
    }

    /// Select the headset output device.
    pub fn set_audio_output_device(&self, name: &str) {
        *self.output_device_name.lock() = Some(name.to_string());
    }

    /// Select the speaker output device.
    pub fn set_speaker_output_device(&self, name: &str) {
        *self.speaker_device_name.lock() = Some(name.to_string());
    }

    /// Open the configured audio devices and start streaming.
    ///
    /// The headset device carries the microphone input and the headset
    /// mix; the speaker device carries the speaker mix only. A failure
    /// closes whatever was opened and emits [`ClientEvent::AudioError`].
    pub fn start_audio(&self) -> Result<()> {
        let result = self.start_audio_inner();
        if let Err(e) = &result {
            tracing::error!(error = %e, "unable to open audio devices");
            self.stop_audio();
            let _ = self.event_tx.send(ClientEvent::AudioError {
                message: e.to_string(),
            });
        }
        result
    }

    fn start_audio_inner(&self) -> Result<()> {
        let output_name = self.output_device_name.lock().clone();
        let input_name = self.input_device_name.lock().clone();
        let speaker_name = self.speaker_device_name.lock().clone();

        {
            let mut guard = self.headset_device.lock();
            if guard.is_none() {
                tracing::info!("initialising headset audio");
                let mut device = AudioDevice::new(output_name, input_name);
                device.set_split_source(Box::new(self.stack.headset_device()));
                device.set_sink(Box::new(self.stack.microphone_sink()));
                device.open()?;
                *guard = Some(device);
            } else {
                tracing::warn!("headset audio device already open");
            }
        }

        if speaker_name.is_some() {
            let mut guard = self.speaker_device.lock();
            if guard.is_none() {
                tracing::info!("initialising speaker audio");
                let mut device = AudioDevice::new(speaker_name, None);
                device.set_split_source(Box::new(self.stack.speaker_device()));
                device.open()?;
                *guard = Some(device);
            } else {
                tracing::warn!("speaker audio device already open");
            }
        }

        Ok(())
    }

    /// Close both audio devices.
    pub fn stop_audio(&self) {
        if let Some(mut device) = self.headset_device.lock().take() {
            device.close();
        }
        if let Some(mut device) = self.speaker_device.lock().take() {
            device.close();
        }
    }

    /// Log device underflow/overflow counters.
    pub fn log_audio_statistics(&self) {
        if let Some(device) = self.headset_device.lock().as_ref() {
            tracing::info!(
                underflows = device.output_underflows.load(Ordering::Relaxed),
                overflows = device.input_overflows.load(Ordering::Relaxed),
                "headset audio statistics"
            );
        }
        if let Some(device) = self.speaker_device.lock().as_ref() {
            tracing::info!(
                underflows = device.output_underflows.load(Ordering::Relaxed),
                "speaker audio statistics"
            );
        }
    }

    // -- radio configuration (delegation + update scheduling) ---------------

    /// Add a radio and schedule a transceiver update.
    pub fn add_frequency(
        self: &Arc<Self>,
        freq: u32,
        on_headset: bool,
        station_name: &str,
        hardware: HardwareType,
    ) {
        self.stack
            .add_frequency(freq, on_headset, station_name, hardware);
        self.queue_transceiver_update();
    }

    /// Remove a radio and schedule a transceiver update.
    pub fn remove_frequency(self: &Arc<Self>, freq: u32) {
        self.stack.remove_frequency(freq);
        self.queue_transceiver_update();
    }

    /// Enable/disable receive on a radio and schedule an update.
    pub fn set_rx(self: &Arc<Self>, freq: u32, active: bool) {
        self.stack.set_rx(freq, active);
        self.queue_transceiver_update();
    }

    /// Enable/disable transmit on a radio and schedule an update.
    pub fn set_tx(self: &Arc<Self>, freq: u32, active: bool) {
        self.stack.set_tx(freq, active);
        self.queue_transceiver_update();
    }

    /// Enable/disable cross-couple on a radio and schedule an update.
    pub fn set_xc(self: &Arc<Self>, freq: u32, active: bool) {
        self.stack.set_xc(freq, active);
        self.queue_transceiver_update();
    }

    /// Replace a radio's transceivers from station data and schedule an
    /// update.
    pub fn set_transceivers(self: &Arc<Self>, freq: u32, transceivers: &[StationTransceiver]) {
        self.stack.set_transceivers(freq, transceivers);
        self.queue_transceiver_update();
    }

    /// Whether a radio exists for `freq`.
    pub fn is_frequency_active(&self, freq: u32) -> bool {
        self.stack.is_frequency_active(freq)
    }

    /// Route a radio to headset or speaker.
    pub fn set_on_headset(&self, freq: u32, on_headset: bool) {
        self.stack.set_on_headset(freq, on_headset);
    }

    /// Pan a radio onto the main, left, or right bus.
    pub fn set_playback_channel(&self, freq: u32, channel: PlaybackChannel) {
        self.stack.set_playback_channel(freq, channel);
    }

    /// Set one radio's receive gain.
    pub fn set_radio_gain(&self, freq: u32, gain: f32) {
        self.stack.set_gain(freq, gain);
    }

    /// Set every radio's receive gain.
    pub fn set_radio_gain_all(&self, gain: f32) {
        self.stack.set_gain_all(gain);
    }

    /// Enable relay transmit.
    pub fn set_rt(&self, active: bool) {
        self.stack.set_rt(active);
    }

    /// Set the callsign used on outbound datagrams.
    pub fn set_callsign(&self, callsign: &str) {
        self.stack.set_callsign(callsign);
    }

    /// Set the client position used for synthetic transceivers.
    pub fn set_client_position(&self, position: ClientPosition) {
        self.stack.set_client_position(position);
    }

    /// Install or remove the microphone input filters.
    pub fn set_enable_input_filters(&self, enable: bool) {
        self.stack.set_enable_input_filters(enable);
    }

    /// Whether microphone input filters are installed.
    pub fn enable_input_filters(&self) -> bool {
        self.stack.enable_input_filters()
    }

    /// Enable or disable receive effects on all radios.
    pub fn set_enable_output_effects(&self, enable: bool) {
        self.stack.set_enable_output_effects(enable);
    }

    /// Last callsign heard on `freq`.
    pub fn last_transmit_on_freq(&self, freq: u32) -> String {
        self.stack.last_transmit_on_freq(freq)
    }

    /// Input VU level, floored at -40 dB.
    pub fn input_vu(&self) -> f64 {
        self.stack.vu()
    }

    /// Input peak level, floored at -40 dB.
    pub fn input_peak(&self) -> f64 {
        self.stack.peak()
    }

    // -- ATIS ----------------------------------------------------------------

    /// Start or stop ATIS recording.
    pub fn set_record_atis(&self, recording: bool) {
        self.stack.set_record_atis(recording);
    }

    /// Whether ATIS recording is active.
    pub fn atis_recording(&self) -> bool {
        self.stack.atis_recording()
    }

    /// Start looping the recorded ATIS under `atis_callsign`.
    pub fn start_atis_playback(&self, atis_callsign: &str) {
        self.stack.start_atis_playback(atis_callsign);
    }

    /// Stop ATIS playback.
    pub fn stop_atis_playback(&self) {
        self.stack.stop_atis_playback();
    }

    /// Whether ATIS playback is active.
    pub fn is_atis_playing_back(&self) -> bool {
        self.stack.is_atis_playing_back()
    }
}

impl Drop for AtcClient {
    fn drop(&mut self) {
        // PTT down and handler detached before the channel goes away, so a
        // late compressor completion cannot touch a dead channel.
        self.stack.set_ptt(false);
        self.stack.set_udp_channel(None);
        if let Some(channel) = self.channel.lock().take() {
            channel.close();
        }
        if let Some(task) = self.maintenance_task.lock().take() {
            task.abort();
        }
        if let Some(task) = self.update_task.lock().take() {
            task.abort();
        }
        self.stop_audio();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use atcvoice_core::{
        CrossCoupleGroup, Error, Result, Transceiver, VoiceDecoder, VoiceEncoder,
    };

    struct NullEncoder;

    impl VoiceEncoder for NullEncoder {
        fn encode(&mut self, _pcm: &[f32]) -> Result<Vec<u8>> {
            Ok(vec![0])
        }
        fn reset(&mut self) {}
    }

    struct NullDecoder;

    impl VoiceDecoder for NullDecoder {
        fn decode(&mut self, _packet: &[u8], pcm_out: &mut [f32]) -> Result<usize> {
            pcm_out.fill(0.0);
            Ok(pcm_out.len())
        }
    }

    fn test_client() -> Arc<AtcClient> {
        let resources = Arc::new(EffectResources::from_samples(
            vec![1.0; 16],
            vec![0.5; 16],
            vec![],
            vec![],
            vec![],
        ));
        let stack = AtcRadioStack::new(
            resources,
            Box::new(NullEncoder),
            Box::new(|| Ok(Box::new(NullDecoder) as Box<dyn VoiceDecoder>)),
        );
        AtcClient::with_stack(stack)
    }

    struct MockPublisher {
        fail: AtomicBool,
        transceiver_posts: Mutex<Vec<Vec<Transceiver>>>,
        cross_couple_posts: Mutex<Vec<Vec<CrossCoupleGroup>>>,
    }

    impl MockPublisher {
        fn new(fail: bool) -> Arc<Self> {
            Arc::new(MockPublisher {
                fail: AtomicBool::new(fail),
                transceiver_posts: Mutex::new(Vec::new()),
                cross_couple_posts: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl TransceiverPublisher for MockPublisher {
        async fn post_transceiver_update(&self, transceivers: Vec<Transceiver>) -> Result<()> {
            if self.fail.load(Ordering::Acquire) {
                return Err(Error::Timeout);
            }
            self.transceiver_posts.lock().push(transceivers);
            Ok(())
        }

        async fn post_cross_couple_update(&self, groups: Vec<CrossCoupleGroup>) -> Result<()> {
            self.cross_couple_posts.lock().push(groups);
            Ok(())
        }
    }

    fn drain(rx: &mut broadcast::Receiver<ClientEvent>) -> Vec<ClientEvent> {
        let mut out = Vec::new();
        while let Ok(ev) = rx.try_recv() {
            out.push(ev);
        }
        out
    }

    #[tokio::test]
    async fn ptt_opens_and_closes_with_events() {
        let client = test_client();
        let mut events = client.subscribe();

        client.set_ptt(true);
        assert!(client.ptt_open());
        client.set_ptt(false);
        assert!(!client.ptt_open());

        let events = drain(&mut events);
        assert!(matches!(events[0], ClientEvent::PttOpen));
        assert!(matches!(events[1], ClientEvent::PttClosed));
    }

    #[tokio::test]
    async fn ptt_guarded_while_update_pending() {
        let client = test_client();
        let publisher = MockPublisher::new(false);
        client.set_publisher(Some(publisher.clone() as Arc<dyn TransceiverPublisher>));
        let mut events = client.subscribe();

        client.tx_update_pending.store(true, Ordering::Release);
        client.set_ptt(true);
        assert!(!client.ptt_open(), "PTT must stay guarded");
        assert!(drain(&mut events).is_empty());

        // A successful post lifts the guard.
        client.tx_update_pending.store(false, Ordering::Release);
        client.post_transceiver_update().await;
        assert!(client.ptt_open());
        let events = drain(&mut events);
        assert!(matches!(events[0], ClientEvent::PttOpen));
    }

    #[tokio::test]
    async fn failed_update_keeps_guard() {
        let client = test_client();
        let publisher = MockPublisher::new(true);
        client.set_publisher(Some(publisher.clone() as Arc<dyn TransceiverPublisher>));

        client.tx_update_pending.store(true, Ordering::Release);
        client.set_ptt(true);
        client.post_transceiver_update().await;

        assert!(!client.ptt_open(), "failed post must not open PTT");
        assert!(client.tx_update_pending.load(Ordering::Acquire));
    }

    #[tokio::test]
    async fn ptt_release_is_never_guarded() {
        let client = test_client();
        client.set_ptt(true);
        client.tx_update_pending.store(true, Ordering::Release);
        client.set_ptt(false);
        assert!(!client.ptt_open());
    }

    #[tokio::test]
    async fn post_sends_transceivers_and_cross_couple() {
        let client = test_client();
        let publisher = MockPublisher::new(false);
        client.set_publisher(Some(publisher.clone() as Arc<dyn TransceiverPublisher>));

        client.add_frequency(118_100_000, true, "LFPG_TWR", HardwareType::SchmidEd137b);
        client.post_transceiver_update().await;

        let posts = publisher.transceiver_posts.lock();
        assert!(!posts.is_empty());
        assert_eq!(
            posts.last().unwrap().len(),
            1,
            "bare radio gets a synthetic transceiver"
        );
        let groups = publisher.cross_couple_posts.lock();
        assert!(!groups.is_empty());
        assert_eq!(
            groups.last().unwrap().len(),
            1,
            "cross-couple is always a single group"
        );
    }

    #[tokio::test]
    async fn connect_and_disconnect_voice() {
        let server = tokio::net::UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let client = test_client();
        let mut events = client.subscribe();

        client
            .connect_voice(server.local_addr().unwrap())
            .await
            .unwrap();
        assert!(client.is_voice_connected());

        client.stack().add_frequency(118_100_000, true, "LFPG_TWR", HardwareType::NoHardware);
        client.disconnect_voice();
        assert!(!client.is_voice_connected());
        assert!(!client.is_frequency_active(118_100_000), "disconnect resets the stack");

        let events = drain(&mut events);
        assert!(matches!(events.first(), Some(ClientEvent::VoiceServerConnected)));
        assert!(matches!(events.last(), Some(ClientEvent::VoiceServerDisconnected)));
    }

    #[tokio::test]
    async fn periodic_update_task_reposts() {
        tokio::time::pause();
        let client = test_client();
        let publisher = MockPublisher::new(false);
        client.set_publisher(Some(publisher.clone() as Arc<dyn TransceiverPublisher>));

        client.queue_transceiver_update();
        tokio::time::sleep(TRANSCEIVER_UPDATE_INTERVAL * 2 + Duration::from_secs(1)).await;

        let posts = publisher.transceiver_posts.lock().len();
        assert!(posts >= 2, "expected periodic posts, got {posts}");
    }
}
