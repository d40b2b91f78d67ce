//! crossbeat - headless two-deck mix demo
//!
//! Drives the mixing engine against the default output device: loads a test
//! tone on each deck, sweeps the crossfader A -> B -> A while metering the
//! mix, and records the sweep into an in-memory artifact.

use std::f32::consts::PI;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::Context;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};

use crossbeat_engine::{AudioEngine, DeckSource, HostEncoderFactory, DEFAULT_TONE_HZ};
use crossbeat_runtime::Runtime;

/// Control loop cadence (~30 updates per second)
const TICK: Duration = Duration::from_millis(33);

/// Length of the scripted crossfade sweep
const SWEEP_SECS: f32 = 6.0;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .context("no audio output device found")?;
    let config = device
        .default_output_config()
        .context("failed to get audio output config")?;

    let sample_rate = config.sample_rate().0;
    let channels = config.channels() as usize;
    tracing::info!(sample_rate, channels, "audio device ready");

    let runtime = Runtime::new(sample_rate);
    let mut engine = AudioEngine::new(
        runtime.clone(),
        Arc::new(HostEncoderFactory::new(sample_rate)),
    )?;

    engine.deck_a.load(DeckSource::Tone {
        frequency: DEFAULT_TONE_HZ,
    });
    engine.deck_b.load(DeckSource::Tone { frequency: 330.0 });
    engine.connect();
    engine.deck_a.play();
    engine.deck_b.play();

    // Pre-allocated stereo buffer for channel-count conversion in the
    // callback
    let render_runtime = runtime.clone();
    let mut stereo_buffer = vec![0.0f32; 16384];

    let stream = device
        .build_output_stream(
            &config.into(),
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                if channels == 2 {
                    render_runtime.try_render(data);
                } else {
                    let frames = data.len() / channels;
                    let stereo = &mut stereo_buffer[..frames * 2];
                    render_runtime.try_render(stereo);
                    for (i, frame) in data.chunks_mut(channels).enumerate() {
                        let left = stereo[i * 2];
                        let right = stereo[i * 2 + 1];
                        match frame.len() {
                            1 => frame[0] = (left + right) * 0.5,
                            _ => {
                                frame[0] = left;
                                frame[1] = right;
                                for extra in frame.iter_mut().skip(2) {
                                    *extra = 0.0;
                                }
                            }
                        }
                    }
                }
            },
            |err| {
                tracing::error!(error = %err, "audio stream error");
            },
            None,
        )
        .context("failed to create audio stream")?;
    stream.play().context("failed to start audio stream")?;

    // Scripted set: record while sweeping the crossfader A -> B -> A
    engine.start_recording()?;
    tracing::info!(container = %engine.recorder.media_type(), "recording started");

    let start = Instant::now();
    let mut last_meter = Instant::now();
    while start.elapsed().as_secs_f32() < SWEEP_SECS {
        let t = start.elapsed().as_secs_f32();
        let position = 0.5 - 0.5 * (t * 2.0 * PI / SWEEP_SECS).cos();
        engine.set_crossfader(position);

        if last_meter.elapsed() >= Duration::from_secs(1) {
            tracing::info!(
                crossfader = engine.crossfader_position(),
                rms = engine.analyser.rms(),
                clock_secs = runtime.now(),
                "mix level"
            );
            last_meter = Instant::now();
        }

        thread::sleep(TICK);
    }

    let artifact = engine.stop_recording();
    tracing::info!(
        bytes = artifact.len(),
        container = %artifact.media_type(),
        "capture complete"
    );

    engine.deck_a.pause();
    engine.deck_b.pause();
    engine.disconnect();
    Ok(())
}
