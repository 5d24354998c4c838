//! cpal-based platform audio device adapter.
//!
//! [`AudioDevice`] opens the platform audio devices via [`cpal`] and
//! bridges the OS callback model to the stack's frame contracts:
//!
//! - **Output**: the cpal output callback drains an [`SampleSource`] (or a
//!   [`SplitSampleSource`] on stereo hardware) one 960-sample frame at a
//!   time through an accumulator, since callback buffer sizes are set by
//!   the OS and rarely match the protocol frame.
//! - **Input**: the cpal input callback downmixes to mono and accumulates
//!   until a full frame is available, then pushes it into the
//!   [`SampleSink`].
//!
//! Callbacks run on high-priority OS audio threads; nothing here blocks or
//! allocates beyond the initial accumulators.
//!
//! # Platform support
//!
//! | Platform   | Backend   |
//! |------------|-----------|
//! | Linux/BSD  | ALSA      |
//! | macOS/iOS  | CoreAudio |
//! | Windows    | WASAPI    |

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use cpal::SampleFormat;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};

use atcvoice_core::{
    Error, FRAME_SIZE_SAMPLES, Result, SAMPLE_RATE_HZ, SampleSink, SampleSource, SourceStatus,
    SplitSampleSource,
};

/// Input accumulator bound: beyond this backlog the oldest samples are
/// discarded and an overflow is counted.
const MAX_PENDING_SAMPLES: usize = FRAME_SIZE_SAMPLES * 8;

// ---------------------------------------------------------------------------
// Sample format conversion helpers
// ---------------------------------------------------------------------------

/// Convert a 16-bit signed integer audio sample to f32 in `[-1.0, 1.0]`.
#[inline]
pub fn i16_to_f32(sample: i16) -> f32 {
    sample as f32 / i16::MAX as f32
}

/// Convert an f32 audio sample to 16-bit signed integer, clamping first.
#[inline]
pub fn f32_to_i16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16
}

// ---------------------------------------------------------------------------
// Device enumeration
// ---------------------------------------------------------------------------

/// Information about an available audio device.
#[derive(Debug, Clone)]
pub struct AudioDeviceInfo {
    /// Device name as reported by the OS audio subsystem.
    pub name: String,
    /// Whether this device supports audio input (microphone).
    pub is_input: bool,
    /// Whether this device supports audio output (headset / speaker).
    pub is_output: bool,
}

/// List all available audio input and output devices.
///
/// Uses the platform's default audio host. Devices plugged in after the
/// program started may not appear until re-enumeration; call again to
/// refresh.
pub fn list_audio_devices() -> Result<Vec<AudioDeviceInfo>> {
    let host = cpal::default_host();

    let mut input_names = std::collections::HashSet::new();
    if let Ok(inputs) = host.input_devices() {
        for device in inputs {
            if let Ok(name) = device.name() {
                input_names.insert(name);
            }
        }
    }

    let mut output_names = std::collections::HashSet::new();
    if let Ok(outputs) = host.output_devices() {
        for device in outputs {
            if let Ok(name) = device.name() {
                output_names.insert(name);
            }
        }
    }

    let all_names: std::collections::HashSet<&str> = input_names
        .iter()
        .chain(output_names.iter())
        .map(|s| s.as_str())
        .collect();

    let mut devices: Vec<AudioDeviceInfo> = all_names
        .into_iter()
        .map(|name| AudioDeviceInfo {
            name: name.to_string(),
            is_input: input_names.contains(name),
            is_output: output_names.contains(name),
        })
        .collect();

    devices.sort_by(|a, b| a.name.cmp(&b.name));

    Ok(devices)
}

/// Find an audio device by name, searching input or output devices.
fn find_device(name: &str, for_input: bool) -> Result<cpal::Device> {
    let host = cpal::default_host();
    let devices = if for_input {
        host.input_devices()
            .map_err(|e| Error::AudioDevice(format!("failed to enumerate input devices: {e}")))?
    } else {
        host.output_devices()
            .map_err(|e| Error::AudioDevice(format!("failed to enumerate output devices: {e}")))?
    };

    for device in devices {
        if let Ok(device_name) = device.name() {
            if device_name == name {
                return Ok(device);
            }
        }
    }

    Err(Error::AudioDevice(format!("audio device not found: {name}")))
}

// ---------------------------------------------------------------------------
// Output puller: SampleSource/SplitSampleSource -> interleaved hw buffer
// ---------------------------------------------------------------------------

enum OutputSource {
    Mono(Box<dyn SampleSource>),
    Split(Box<dyn SplitSampleSource>),
}

/// Drains a frame source into arbitrarily-sized interleaved hardware
/// buffers, one protocol frame at a time.
struct OutputPuller {
    source: OutputSource,
    left: Vec<f32>,
    right: Vec<f32>,
    pos: usize,
    underflows: Arc<AtomicU32>,
}

impl OutputPuller {
    fn new(source: OutputSource, underflows: Arc<AtomicU32>) -> Self {
        OutputPuller {
            source,
            left: vec![0.0; FRAME_SIZE_SAMPLES],
            right: vec![0.0; FRAME_SIZE_SAMPLES],
            // Start exhausted so the first callback pulls a fresh frame.
            pos: FRAME_SIZE_SAMPLES,
            underflows,
        }
    }

    fn refill(&mut self) {
        let status = match &mut self.source {
            OutputSource::Mono(src) => {
                let status = src.get_audio_frame(&mut self.left);
                self.right.copy_from_slice(&self.left);
                status
            }
            OutputSource::Split(src) => src.get_split_audio_frame(&mut self.left, &mut self.right),
        };
        if status != SourceStatus::Ok {
            self.left.fill(0.0);
            self.right.fill(0.0);
            self.underflows.fetch_add(1, Ordering::Relaxed);
        }
        self.pos = 0;
    }

    fn fill(&mut self, data: &mut [f32], channels: usize) {
        for out_frame in data.chunks_mut(channels) {
            if self.pos >= FRAME_SIZE_SAMPLES {
                self.refill();
            }
            let l = self.left[self.pos];
            let r = self.right[self.pos];
            self.pos += 1;
            match out_frame.len() {
                1 => out_frame[0] = 0.5 * (l + r),
                _ => {
                    out_frame[0] = l;
                    out_frame[1] = r;
                    for extra in out_frame[2..].iter_mut() {
                        *extra = 0.0;
                    }
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Input pusher: interleaved hw buffer -> mono frames -> SampleSink
// ---------------------------------------------------------------------------

/// Accumulates downmixed input samples until full frames can be pushed.
struct InputPusher {
    sink: Box<dyn SampleSink>,
    channels: usize,
    pending: Vec<f32>,
    frame: Vec<f32>,
    overflows: Arc<AtomicU32>,
}

impl InputPusher {
    fn new(sink: Box<dyn SampleSink>, channels: usize, overflows: Arc<AtomicU32>) -> Self {
        InputPusher {
            sink,
            channels: channels.max(1),
            pending: Vec::with_capacity(MAX_PENDING_SAMPLES),
            frame: vec![0.0; FRAME_SIZE_SAMPLES],
            overflows,
        }
    }

    fn push(&mut self, data: &[f32]) {
        for hw_frame in data.chunks_exact(self.channels) {
            self.pending
                .push(hw_frame.iter().sum::<f32>() / self.channels as f32);
        }
        if self.pending.len() > MAX_PENDING_SAMPLES {
            let excess = self.pending.len() - MAX_PENDING_SAMPLES;
            self.pending.drain(..excess);
            self.overflows.fetch_add(1, Ordering::Relaxed);
        }
        while self.pending.len() >= FRAME_SIZE_SAMPLES {
            self.frame.clear();
            self.frame
                .extend(self.pending.drain(..FRAME_SIZE_SAMPLES));
            self.sink.put_audio_frame(&self.frame);
        }
    }
}

// ---------------------------------------------------------------------------
// AudioDevice
// ---------------------------------------------------------------------------

/// A platform audio device pair: one output (headset or speaker) and an
/// optional input (microphone).
///
/// cpal [`Stream`](cpal::Stream)s are not `Send` on every platform, so
/// [`open()`](AudioDevice::open) builds and holds them on a dedicated
/// audio-owner thread; this struct only keeps the thread handle and stays
/// `Send`. Closing (or dropping) the device signals the thread, which
/// drops the streams and exits.
pub struct AudioDevice {
    output_device_name: Option<String>,
    input_device_name: Option<String>,
    source: Option<OutputSource>,
    sink: Option<Box<dyn SampleSink>>,
    worker: Option<StreamWorker>,
    /// Count of output periods with no source data (silence substituted).
    pub output_underflows: Arc<AtomicU32>,
    /// Count of input accumulator overruns (oldest samples discarded).
    pub input_overflows: Arc<AtomicU32>,
}

/// Handle to the thread that owns the live cpal streams.
struct StreamWorker {
    /// Dropping this sender wakes the thread and releases the streams.
    shutdown_tx: std::sync::mpsc::Sender<()>,
    thread: std::thread::JoinHandle<()>,
}

impl AudioDevice {
    /// Create an unopened device targeting the named OS devices.
    ///
    /// Either name may be `None` to skip that direction entirely (the
    /// speaker device, for example, has no input).
    pub fn new(output_device_name: Option<String>, input_device_name: Option<String>) -> Self {
        AudioDevice {
            output_device_name,
            input_device_name,
            source: None,
            sink: None,
            worker: None,
            output_underflows: Arc::new(AtomicU32::new(0)),
            input_overflows: Arc::new(AtomicU32::new(0)),
        }
    }

    /// Install the mono frame source played on the output.
    pub fn set_source(&mut self, source: Box<dyn SampleSource>) {
        self.source = Some(OutputSource::Mono(source));
    }

    /// Install a per-ear frame source played on the output. Takes
    /// precedence over [`set_source`](Self::set_source) on stereo hardware;
    /// on mono hardware the two ears are averaged.
    pub fn set_split_source(&mut self, source: Box<dyn SplitSampleSource>) {
        self.source = Some(OutputSource::Split(source));
    }

    /// Install the sink that receives microphone frames.
    pub fn set_sink(&mut self, sink: Box<dyn SampleSink>) {
        self.sink = Some(sink);
    }

    /// Open the configured streams and start them.
    ///
    /// The installed source and sink are moved into the audio callbacks.
    /// Returns [`Error::AudioDevice`] if a named device is missing or a
    /// stream fails to build or start.
    pub fn open(&mut self) -> Result<()> {
        if self.worker.is_some() {
            return Err(Error::AudioDevice("device already open".into()));
        }

        let output = match (self.output_device_name.clone(), self.source.take()) {
            (Some(name), Some(source)) => Some((name, source)),
            _ => None,
        };
        let input = match (self.input_device_name.clone(), self.sink.take()) {
            (Some(name), Some(sink)) => Some((name, sink)),
            _ => None,
        };
        let underflows = Arc::clone(&self.output_underflows);
        let overflows = Arc::clone(&self.input_overflows);

        let (ready_tx, ready_rx) = std::sync::mpsc::channel::<Result<()>>();
        let (shutdown_tx, shutdown_rx) = std::sync::mpsc::channel::<()>();

        let thread = std::thread::Builder::new()
            .name("atcvoice-audio-device".into())
            .spawn(move || {
                let streams = open_streams(output, input, underflows, overflows);
                match streams {
                    Ok(streams) => {
                        let _ = ready_tx.send(Ok(()));
                        // Park until the handle is closed, then drop the
                        // streams on this thread.
                        let _ = shutdown_rx.recv();
                        drop(streams);
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                    }
                }
            })
            .map_err(Error::Io)?;

        match ready_rx.recv() {
            Ok(Ok(())) => {
                self.worker = Some(StreamWorker {
                    shutdown_tx,
                    thread,
                });
                Ok(())
            }
            Ok(Err(e)) => {
                let _ = thread.join();
                Err(e)
            }
            Err(_) => {
                let _ = thread.join();
                Err(Error::AudioDevice("audio thread died during open".into()))
            }
        }
    }

    /// Stop and release all streams.
    pub fn close(&mut self) {
        if let Some(worker) = self.worker.take() {
            drop(worker.shutdown_tx);
            let _ = worker.thread.join();
        }
    }
}

impl Drop for AudioDevice {
    fn drop(&mut self) {
        self.close();
    }
}

/// Streams live and die on the audio-owner thread; this bundle never
/// leaves it.
struct OpenStreams {
    _output: Option<cpal::Stream>,
    _input: Option<cpal::Stream>,
}

fn open_streams(
    output: Option<(String, OutputSource)>,
    input: Option<(String, Box<dyn SampleSink>)>,
    underflows: Arc<AtomicU32>,
    overflows: Arc<AtomicU32>,
) -> Result<OpenStreams> {
    let output_stream = match output {
        Some((name, source)) => {
            let stream = build_output_stream(&name, source, underflows)?;
            stream
                .play()
                .map_err(|e| Error::AudioDevice(format!("failed to start output stream: {e}")))?;
            Some(stream)
        }
        None => None,
    };

    let input_stream = match input {
        Some((name, sink)) => {
            let stream = build_input_stream(&name, sink, overflows)?;
            stream
                .play()
                .map_err(|e| Error::AudioDevice(format!("failed to start input stream: {e}")))?;
            Some(stream)
        }
        None => None,
    };

    Ok(OpenStreams {
        _output: output_stream,
        _input: input_stream,
    })
}

fn build_output_stream(
    name: &str,
    source: OutputSource,
    underflows: Arc<AtomicU32>,
) -> Result<cpal::Stream> {
    let device = find_device(name, false)?;
    let supported = device
        .default_output_config()
        .map_err(|e| Error::AudioDevice(format!("no default output config: {e}")))?;
    let sample_format = supported.sample_format();
    let sample_rate = supported.sample_rate().0;
    let channels = supported.channels() as usize;
    let config: cpal::StreamConfig = supported.into();

    if sample_rate != SAMPLE_RATE_HZ {
        tracing::warn!(
            device = %name,
            rate = sample_rate,
            "output device rate differs from protocol rate; audio will be pitch-shifted"
        );
    }

    let mut puller = OutputPuller::new(source, underflows);

    let stream = match sample_format {
        SampleFormat::F32 => device
            .build_output_stream(
                &config,
                move |data: &mut [f32], _info: &cpal::OutputCallbackInfo| {
                    puller.fill(data, channels);
                },
                |err| {
                    tracing::error!("cpal output stream error: {}", err);
                },
                None,
            )
            .map_err(|e| Error::AudioDevice(format!("failed to build output stream: {e}")))?,
        SampleFormat::I16 => {
            let mut staging: Vec<f32> = Vec::new();
            device
                .build_output_stream(
                    &config,
                    move |data: &mut [i16], _info: &cpal::OutputCallbackInfo| {
                        staging.resize(data.len(), 0.0);
                        puller.fill(&mut staging, channels);
                        for (out, &s) in data.iter_mut().zip(staging.iter()) {
                            *out = f32_to_i16(s);
                        }
                    },
                    |err| {
                        tracing::error!("cpal output stream error: {}", err);
                    },
                    None,
                )
                .map_err(|e| Error::AudioDevice(format!("failed to build output stream: {e}")))?
        }
        other => {
            return Err(Error::AudioDevice(format!(
                "unsupported output sample format: {other}"
            )));
        }
    };

    Ok(stream)
}

fn build_input_stream(
    name: &str,
    sink: Box<dyn SampleSink>,
    overflows: Arc<AtomicU32>,
) -> Result<cpal::Stream> {
    let device = find_device(name, true)?;
    let supported = device
        .default_input_config()
        .map_err(|e| Error::AudioDevice(format!("no default input config: {e}")))?;
    let sample_format = supported.sample_format();
    let sample_rate = supported.sample_rate().0;
    let channels = supported.channels() as usize;
    let config: cpal::StreamConfig = supported.into();

    if sample_rate != SAMPLE_RATE_HZ {
        tracing::warn!(
            device = %name,
            rate = sample_rate,
            "input device rate differs from protocol rate; audio will be pitch-shifted"
        );
    }

    let mut pusher = InputPusher::new(sink, channels, overflows);

    let stream = match sample_format {
        SampleFormat::F32 => device
            .build_input_stream(
                &config,
                move |data: &[f32], _info: &cpal::InputCallbackInfo| {
                    pusher.push(data);
                },
                |err| {
                    tracing::error!("cpal input stream error: {}", err);
                },
                None,
            )
            .map_err(|e| Error::AudioDevice(format!("failed to build input stream: {e}")))?,
        SampleFormat::I16 => {
            let mut staging: Vec<f32> = Vec::new();
            device
                .build_input_stream(
                    &config,
                    move |data: &[i16], _info: &cpal::InputCallbackInfo| {
                        staging.clear();
                        staging.extend(data.iter().map(|&s| i16_to_f32(s)));
                        pusher.push(&staging);
                    },
                    |err| {
                        tracing::error!("cpal input stream error: {}", err);
                    },
                    None,
                )
                .map_err(|e| Error::AudioDevice(format!("failed to build input stream: {e}")))?
        }
        other => {
            return Err(Error::AudioDevice(format!(
                "unsupported input sample format: {other}"
            )));
        }
    };

    Ok(stream)
}
