//! AudioEngine - two decks into an equal-power crossfade bus
//!
//! Composition root of the core. Owns both decks, the crossfader gain pair,
//! the master gain, the metering tap, and the recorder's capture sink, and
//! wires them into one graph:
//!
//! deckA -> cfGainA \
//!                    master -> analyser -> destination
//! deckB -> cfGainB /        \
//!                             capture sink
//!
//! The crossfader follows the equal-power law: gainA = cos(x*pi/2),
//! gainB = cos((1-x)*pi/2), so gainA^2 + gainB^2 = 1 at every position and
//! perceived loudness holds constant through the sweep. Both gains are
//! applied as smoothed ramps, never written directly.

use std::f32::consts::FRAC_PI_2;
use std::sync::Arc;

use crossbeat_runtime::{EncoderFactory, NodeId, Runtime};

use crate::analyser::Analyser;
use crate::deck::Deck;
use crate::error::{EngineError, RecorderError};
use crate::recorder::{Artifact, Recorder, RecorderState};
use crate::RAMP_TAU;

/// The two-deck mixing engine
pub struct AudioEngine {
    runtime: Runtime,
    pub deck_a: Deck,
    pub deck_b: Deck,
    pub analyser: Analyser,
    pub recorder: Recorder,
    crossfader_gain_a: NodeId,
    crossfader_gain_b: NodeId,
    master_gain: NodeId,
    capture_sink: NodeId,
    crossfader_position: f32,
}

impl AudioEngine {
    /// Build the engine against a host runtime and encoder capability.
    /// Fails when the host offers no encoder at all - an engine that cannot
    /// record is a construction-time fault, not a latent one.
    pub fn new(
        runtime: Runtime,
        encoders: Arc<dyn EncoderFactory>,
    ) -> Result<Self, EngineError> {
        let deck_a = Deck::new(&runtime);
        let deck_b = Deck::new(&runtime);
        let analyser = Analyser::new(&runtime);

        let crossfader_gain_a = runtime.create_gain(1.0);
        let crossfader_gain_b = runtime.create_gain(1.0);
        let master_gain = runtime.create_gain(1.0);

        let (chunk_tx, chunk_rx) = crossbeam_channel::unbounded();
        let capture_sink = runtime.create_capture(chunk_tx);
        let recorder = Recorder::new(runtime.clone(), capture_sink, encoders, chunk_rx)?;

        let mut engine = Self {
            runtime,
            deck_a,
            deck_b,
            analyser,
            recorder,
            crossfader_gain_a,
            crossfader_gain_b,
            master_gain,
            capture_sink,
            crossfader_position: 0.5,
        };
        engine.set_crossfader(0.5);
        Ok(engine)
    }

    /// Wire the full graph. Idempotent: repeated calls re-establish the same
    /// edge set without duplicates.
    pub fn connect(&self) {
        self.deck_a.connect(self.crossfader_gain_a);
        self.deck_b.connect(self.crossfader_gain_b);
        self.runtime.connect(self.crossfader_gain_a, self.master_gain);
        self.runtime.connect(self.crossfader_gain_b, self.master_gain);

        // Master -> analyser -> host output for playback
        self.runtime.connect(self.master_gain, self.analyser.node());
        self.runtime
            .connect(self.analyser.node(), self.runtime.destination());

        // Parallel tap for recording
        self.runtime.connect(self.master_gain, self.capture_sink);

        tracing::debug!("engine graph connected");
    }

    /// Tear down every edge `connect` established. Safe to call when never
    /// connected.
    pub fn disconnect(&self) {
        self.deck_a.disconnect();
        self.deck_b.disconnect();
        self.runtime.disconnect(self.crossfader_gain_a);
        self.runtime.disconnect(self.crossfader_gain_b);
        self.runtime.disconnect(self.master_gain);
        self.runtime.disconnect(self.analyser.node());

        tracing::debug!("engine graph disconnected");
    }

    /// Move the crossfader. Position is clamped into [0, 1]; both gains ramp
    /// toward their equal-power targets.
    pub fn set_crossfader(&mut self, position: f32) {
        let position = position.clamp(0.0, 1.0);
        self.crossfader_position = position;

        let gain_a = (position * FRAC_PI_2).cos();
        let gain_b = ((1.0 - position) * FRAC_PI_2).cos();

        self.runtime
            .ramp_gain(self.crossfader_gain_a, gain_a, RAMP_TAU);
        self.runtime
            .ramp_gain(self.crossfader_gain_b, gain_b, RAMP_TAU);
    }

    pub fn crossfader_position(&self) -> f32 {
        self.crossfader_position
    }

    /// The raw master gain node, for diagnostic and metering consumers
    pub fn master_gain(&self) -> NodeId {
        self.master_gain
    }

    pub fn start_recording(&mut self) -> Result<(), RecorderError> {
        self.recorder.start()
    }

    pub fn stop_recording(&mut self) -> Artifact {
        self.recorder.stop()
    }

    pub fn recording_state(&self) -> RecorderState {
        self.recorder.state()
    }

    /// The host runtime this engine is built on
    pub fn runtime(&self) -> &Runtime {
        &self.runtime
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deck::{DeckSource, DEFAULT_TONE_HZ};
    use crossbeat_runtime::HostEncoderFactory;

    fn engine() -> AudioEngine {
        let runtime = Runtime::new(48000);
        let encoders = Arc::new(HostEncoderFactory::new(48000));
        AudioEngine::new(runtime, encoders).unwrap()
    }

    fn sorted_edges(engine: &AudioEngine) -> Vec<(NodeId, NodeId)> {
        let mut edges = engine.runtime().edges();
        edges.sort_by_key(|&(a, b)| (format!("{:?}", a), format!("{:?}", b)));
        edges
    }

    #[test]
    fn test_crossfader_initialized_at_center() {
        let engine = engine();
        assert_eq!(engine.crossfader_position(), 0.5);

        let center = (0.5f32 * FRAC_PI_2).cos();
        let target_a = engine
            .runtime()
            .gain_target(engine.crossfader_gain_a)
            .unwrap();
        let target_b = engine
            .runtime()
            .gain_target(engine.crossfader_gain_b)
            .unwrap();
        assert!((target_a - center).abs() < 1e-6);
        assert!((target_b - center).abs() < 1e-6);
        assert!((center - 0.70711).abs() < 1e-5);
    }

    #[test]
    fn test_crossfader_equal_power_law() {
        let mut engine = engine();
        for i in 0..=20 {
            let x = i as f32 / 20.0;
            engine.set_crossfader(x);

            let gain_a = engine
                .runtime()
                .gain_target(engine.crossfader_gain_a)
                .unwrap();
            let gain_b = engine
                .runtime()
                .gain_target(engine.crossfader_gain_b)
                .unwrap();

            assert!((gain_a - (x * FRAC_PI_2).cos()).abs() < 1e-6);
            assert!((gain_b - ((1.0 - x) * FRAC_PI_2).cos()).abs() < 1e-6);
            assert!(
                (gain_a * gain_a + gain_b * gain_b - 1.0).abs() < 1e-6,
                "power not constant at x={}",
                x
            );
        }
    }

    #[test]
    fn test_crossfader_endpoints() {
        let mut engine = engine();

        engine.set_crossfader(0.0);
        assert!((engine.runtime().gain_target(engine.crossfader_gain_a).unwrap() - 1.0).abs() < 1e-6);
        assert!(engine.runtime().gain_target(engine.crossfader_gain_b).unwrap().abs() < 1e-6);

        engine.set_crossfader(1.0);
        assert!(engine.runtime().gain_target(engine.crossfader_gain_a).unwrap().abs() < 1e-6);
        assert!((engine.runtime().gain_target(engine.crossfader_gain_b).unwrap() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_crossfader_clamps_position() {
        let mut engine = engine();

        engine.set_crossfader(-0.5);
        assert_eq!(engine.crossfader_position(), 0.0);

        engine.set_crossfader(1.5);
        assert_eq!(engine.crossfader_position(), 1.0);
    }

    #[test]
    fn test_crossfader_ramps_rather_than_jumps() {
        let mut engine = engine();
        engine.connect();

        // Settle the center-position ramp first
        let mut output = vec![0.0f32; 512];
        for _ in 0..100 {
            engine.runtime().render(&mut output);
        }

        engine.set_crossfader(0.0);
        let value = engine
            .runtime()
            .gain_value(engine.crossfader_gain_a)
            .unwrap();
        // Target moved, current has not yet
        assert!((value - 0.70711).abs() < 1e-3);

        engine.runtime().render(&mut output);
        let after = engine
            .runtime()
            .gain_value(engine.crossfader_gain_a)
            .unwrap();
        assert!(after > value && after < 1.0);
    }

    #[test]
    fn test_connect_establishes_expected_edges() {
        let engine = engine();
        engine.connect();

        let rt = engine.runtime();
        assert!(rt.connected(engine.deck_a.output(), engine.crossfader_gain_a));
        assert!(rt.connected(engine.deck_b.output(), engine.crossfader_gain_b));
        assert!(rt.connected(engine.crossfader_gain_a, engine.master_gain));
        assert!(rt.connected(engine.crossfader_gain_b, engine.master_gain));
        assert!(rt.connected(engine.master_gain, engine.analyser.node()));
        assert!(rt.connected(engine.analyser.node(), rt.destination()));
        assert!(rt.connected(engine.master_gain, engine.capture_sink));
    }

    #[test]
    fn test_connect_is_idempotent() {
        let engine = engine();
        engine.connect();
        let once = sorted_edges(&engine);
        engine.connect();
        assert_eq!(once, sorted_edges(&engine));
    }

    #[test]
    fn test_disconnect_connect_round_trip() {
        let engine = engine();
        engine.connect();
        let original = sorted_edges(&engine);

        engine.disconnect();
        engine.connect();
        assert_eq!(original, sorted_edges(&engine));
    }

    #[test]
    fn test_disconnect_before_connect_is_safe() {
        let engine = engine();
        engine.disconnect();
        // Deck EQ chains are internal wiring, untouched by engine teardown
        assert!(!engine.runtime().edges().is_empty());
    }

    #[test]
    fn test_full_a_crossfade_silences_deck_b() {
        let mut engine = engine();
        engine.deck_b.load(DeckSource::Tone {
            frequency: DEFAULT_TONE_HZ,
        });
        engine.deck_b.play();
        engine.connect();
        engine.set_crossfader(0.0);

        // Let the gain ramps settle, then meter a fresh window
        let mut output = vec![0.0f32; 2048];
        for _ in 0..50 {
            engine.runtime().render(&mut output);
        }
        assert!(
            engine.analyser.rms() < 0.01,
            "deck B should be inaudible at full A"
        );

        engine.set_crossfader(1.0);
        for _ in 0..50 {
            engine.runtime().render(&mut output);
        }
        assert!(
            engine.analyser.rms() > 0.1,
            "deck B should be audible at full B"
        );
    }

    #[test]
    fn test_recording_rendered_mix_yields_artifact() {
        let mut engine = engine();
        engine.deck_a.load(DeckSource::Tone { frequency: 330.0 });
        engine.deck_a.play();
        engine.connect();

        engine.start_recording().unwrap();
        assert_eq!(engine.recording_state(), RecorderState::Recording);

        let mut output = vec![0.0f32; 4096];
        for _ in 0..10 {
            engine.runtime().render(&mut output);
        }

        let artifact = engine.stop_recording();
        assert_eq!(engine.recording_state(), RecorderState::Idle);
        assert!(!artifact.is_empty());
        assert_eq!(artifact.media_type().essence(), "audio/wav");
    }

    #[test]
    fn test_stop_recording_while_idle_is_lenient() {
        let mut engine = engine();
        let artifact = engine.stop_recording();
        assert!(artifact.is_empty());
    }

    #[test]
    fn test_construction_fails_without_encoders() {
        use crossbeat_runtime::{Encoder, EncoderError, MediaType};

        struct NullFactory;
        impl EncoderFactory for NullFactory {
            fn supports(&self, _requested: &MediaType) -> Option<MediaType> {
                None
            }
            fn default_media_type(&self) -> Option<MediaType> {
                None
            }
            fn create(&self, mt: &MediaType) -> Result<Box<dyn Encoder>, EncoderError> {
                Err(EncoderError::Unsupported(mt.to_string()))
            }
        }

        let runtime = Runtime::new(48000);
        let result = AudioEngine::new(runtime, Arc::new(NullFactory));
        assert!(matches!(
            result,
            Err(EngineError::Recorder(RecorderError::EncoderUnavailable))
        ));
    }
}
