// atcvoice test application -- CLI tool for exercising the radio mixing
// stack without a live voice server.
//
// Usage:
//   atcvoice-test-app list-devices
//   atcvoice-test-app mix-demo --output demo.wav
//   atcvoice-test-app mix-demo --output demo.wav --seconds 4 --concurrent
//
// The mix demo synthesizes a voice transmission, runs it through the full
// receive pipeline (Opus decode, VHF filter, noise, crackle, click), and
// renders the headset output to a WAV file.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use atcvoice::audio::{OpusVoiceEncoder, PinkNoiseGenerator, SineToneSource, interleave};
use atcvoice::stack::AtcRadioStack;
use atcvoice::{
    AudioRxOnTransceivers, ClientEvent, EffectResources, FRAME_SIZE_SAMPLES, HardwareType,
    PlaybackChannel, RxTransceiver, SAMPLE_RATE_HZ, SampleSource, VoiceEncoder, format_freq_mhz,
    list_audio_devices,
};

/// atcvoice test application -- exercises the voice stack from the
/// command line.
#[derive(Parser)]
#[command(name = "atcvoice-test-app", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List audio input and output devices.
    ListDevices,

    /// Render a simulated receive through the full mixing pipeline.
    MixDemo {
        /// Output WAV path.
        #[arg(long, default_value = "mix-demo.wav")]
        output: String,

        /// Seconds of voice to synthesize.
        #[arg(long, default_value_t = 2)]
        seconds: u32,

        /// Frequency of the simulated radio, in hertz.
        #[arg(long, default_value_t = 118_100_000)]
        freq: u32,

        /// Add a second concurrent transmission (triggers the block tone).
        #[arg(long)]
        concurrent: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::ListDevices => list_devices(),
        Command::MixDemo {
            output,
            seconds,
            freq,
            concurrent,
        } => mix_demo(&output, seconds, freq, concurrent),
    }
}

fn list_devices() -> Result<()> {
    let devices = list_audio_devices().context("enumerating audio devices")?;
    if devices.is_empty() {
        println!("No audio devices found.");
        return Ok(());
    }
    println!("{:<50} {:>6} {:>7}", "Device", "Input", "Output");
    for device in devices {
        println!(
            "{:<50} {:>6} {:>7}",
            device.name,
            if device.is_input { "yes" } else { "-" },
            if device.is_output { "yes" } else { "-" },
        );
    }
    Ok(())
}

/// Build effect assets procedurally so the demo runs without a resource
/// directory: a short decaying click and pink-noise beds.
fn synthetic_resources() -> Arc<EffectResources> {
    let click: Vec<f32> = (0..FRAME_SIZE_SAMPLES / 4)
        .map(|n| {
            let t = n as f32 / SAMPLE_RATE_HZ as f32;
            (-t * 400.0).exp() * (std::f32::consts::TAU * 2200.0 * t).sin()
        })
        .collect();

    let mut noise = PinkNoiseGenerator::with_seed(0x5EED);
    let mut bed = vec![0.0_f32; SAMPLE_RATE_HZ as usize];
    for chunk in bed.chunks_mut(FRAME_SIZE_SAMPLES) {
        noise.get_audio_frame(chunk);
    }

    let crackle: Vec<f32> = bed.iter().map(|s| s * 2.0).collect();
    Arc::new(EffectResources::from_samples(
        click,
        crackle,
        bed.clone(),
        bed.clone(),
        bed,
    ))
}

fn mix_demo(output: &str, seconds: u32, freq: u32, concurrent: bool) -> Result<()> {
    let stack = AtcRadioStack::with_opus(synthetic_resources()).context("creating stack")?;
    let mut events = stack.subscribe();

    stack.add_frequency(freq, true, "LFPG_TWR", HardwareType::SchmidEd137b);
    // Pan the radio left so the stereo render shows the split path.
    stack.set_playback_channel(freq, PlaybackChannel::Left);
    println!("Simulating receive on {}", format_freq_mhz(freq));

    // Synthesize the "voice": a wobbling tone, Opus-encoded frame by frame
    // and delivered as AR datagrams the way the network path would.
    let mut encoder = OpusVoiceEncoder::new().context("creating encoder")?;
    let mut tone = SineToneSource::new(300.0);
    let mut encoder2 = OpusVoiceEncoder::new().context("creating second encoder")?;
    let mut tone2 = SineToneSource::new(420.0);

    let voice_frames = seconds * 1000 / 20;
    let tail_frames = 25; // half a second for the click and fade-out

    let spec = hound::WavSpec {
        channels: 2,
        sample_rate: SAMPLE_RATE_HZ,
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };
    let mut writer = hound::WavWriter::create(output, spec).context("creating WAV")?;

    let mut pcm = vec![0.0_f32; FRAME_SIZE_SAMPLES];
    let mut left = vec![0.0_f32; FRAME_SIZE_SAMPLES];
    let mut right = vec![0.0_f32; FRAME_SIZE_SAMPLES];
    let mut stereo = vec![0.0_f32; FRAME_SIZE_SAMPLES * 2];
    for n in 0..(voice_frames + tail_frames) {
        if n < voice_frames {
            tone.get_audio_frame(&mut pcm);
            for s in pcm.iter_mut() {
                *s *= 0.4;
            }
            stack.rx_voice_packet(AudioRxOnTransceivers {
                callsign: "AFR123".into(),
                sequence: n,
                last_packet: n + 1 == voice_frames,
                audio: encoder.encode(&pcm)?,
                transceivers: vec![RxTransceiver {
                    id: 1,
                    frequency: freq,
                    distance_ratio: 0.6,
                }],
            });

            if concurrent {
                tone2.get_audio_frame(&mut pcm);
                for s in pcm.iter_mut() {
                    *s *= 0.4;
                }
                stack.rx_voice_packet(AudioRxOnTransceivers {
                    callsign: "DLH456".into(),
                    sequence: n,
                    last_packet: n + 1 == voice_frames,
                    audio: encoder2.encode(&pcm)?,
                    transceivers: vec![RxTransceiver {
                        id: 2,
                        frequency: freq,
                        distance_ratio: 0.2,
                    }],
                });
            }
        }

        stack.get_split_audio_frame(&mut left, &mut right, true);
        interleave(&left, &right, &mut stereo);
        for &s in &stereo {
            writer.write_sample(s)?;
        }
    }
    writer.finalize()?;

    while let Ok(event) = events.try_recv() {
        match event {
            ClientEvent::RxOpen { freq } => println!("  RxOpen  {}", format_freq_mhz(freq)),
            ClientEvent::RxClosed { freq } => println!("  RxClosed {}", format_freq_mhz(freq)),
            other => println!("  {other:?}"),
        }
    }
    println!(
        "Wrote {} ({} voice frames, last transmitter {})",
        output,
        voice_frames,
        stack.last_transmit_on_freq(freq)
    );
    Ok(())
}
