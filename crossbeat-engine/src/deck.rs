//! Deck - one playback source through a fixed 3-band EQ chain
//!
//! The chain is built once at construction: low shelf (320Hz) -> peaking
//! (1kHz, Q 0.5) -> high shelf (3.2kHz) -> output gain. A source connects to
//! the front of the chain only while playing; pausing detaches it without
//! tearing the chain down.
//!
//! Every operation is a total function over the current state. Combinations
//! that make no sense (rate on a tone, play on an empty deck) are defined
//! no-ops, never errors.

use std::sync::Arc;

use crossbeat_runtime::{FilterShape, NodeId, Runtime};

use crate::RAMP_TAU;

/// Low shelf corner frequency
const LOW_SHELF_HZ: f32 = 320.0;
/// Peaking band center frequency
const MID_PEAK_HZ: f32 = 1000.0;
/// Peaking band width
const MID_PEAK_Q: f32 = 0.5;
/// High shelf corner frequency
const HIGH_SHELF_HZ: f32 = 3200.0;

/// Default test-tone frequency for a freshly loaded tone deck
pub const DEFAULT_TONE_HZ: f32 = 220.0;

/// Map a 0-100 control value onto the EQ's decibel range (-40dB .. +6dB)
pub fn map_to_db(value: f32) -> f32 {
    value / 100.0 * 46.0 - 40.0
}

/// Per-band EQ control values, each in 0-100
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EqSettings {
    pub low: f32,
    pub mid: f32,
    pub high: f32,
}

/// What to load into a deck
pub enum DeckSource {
    /// Sawtooth test tone at the given frequency
    Tone { frequency: f32 },
    /// Interleaved stereo sample buffer
    Sample { buffer: Arc<Vec<f32>> },
}

/// The deck's installed source. A tone handle starts at most once; pausing
/// replaces it with a fresh handle at the same frequency so the next play
/// has something it can start.
enum Source {
    Empty,
    Tone {
        node: NodeId,
        frequency: f32,
        started: bool,
    },
    Sample {
        node: NodeId,
    },
}

/// One playback + EQ signal chain
pub struct Deck {
    runtime: Runtime,
    source: Source,
    low: NodeId,
    mid: NodeId,
    high: NodeId,
    output: NodeId,
    playing: bool,
}

impl Deck {
    pub fn new(runtime: &Runtime) -> Self {
        let low = runtime.create_filter(FilterShape::LowShelf, LOW_SHELF_HZ, 0.707);
        let mid = runtime.create_filter(FilterShape::Peaking, MID_PEAK_HZ, MID_PEAK_Q);
        let high = runtime.create_filter(FilterShape::HighShelf, HIGH_SHELF_HZ, 0.707);
        let output = runtime.create_gain(1.0);

        runtime.connect(low, mid);
        runtime.connect(mid, high);
        runtime.connect(high, output);

        Self {
            runtime: runtime.clone(),
            source: Source::Empty,
            low,
            mid,
            high,
            output,
            playing: false,
        }
    }

    /// Install a new source, discarding any current one. Does not start
    /// playback.
    pub fn load(&mut self, source: DeckSource) {
        match &self.source {
            Source::Tone { node, .. } | Source::Sample { node } => {
                self.runtime.release(*node);
            }
            Source::Empty => {}
        }

        self.source = match source {
            DeckSource::Tone { frequency } => Source::Tone {
                node: self.runtime.create_tone(frequency),
                frequency,
                started: false,
            },
            DeckSource::Sample { buffer } => Source::Sample {
                node: self.runtime.create_sample(buffer),
            },
        };
    }

    /// Connect the source into the chain and start it if needed. No-op when
    /// already playing or when nothing is loaded.
    pub fn play(&mut self) {
        if self.playing {
            return;
        }
        match &mut self.source {
            Source::Empty => {}
            Source::Tone { node, started, .. } => {
                if !*started {
                    self.runtime.start_source(*node);
                    *started = true;
                }
                self.runtime.connect(*node, self.low);
                self.playing = true;
            }
            Source::Sample { node } => {
                self.runtime.connect(*node, self.low);
                self.playing = true;
            }
        }
    }

    /// Detach the source from the chain. A tone handle can only be started
    /// once, so pausing a tone discards it and installs a fresh handle at
    /// the same frequency for the next play. No-op when not playing.
    pub fn pause(&mut self) {
        if !self.playing {
            return;
        }
        match &mut self.source {
            Source::Empty => {}
            Source::Tone {
                node,
                frequency,
                started,
            } => {
                self.runtime.stop_source(*node);
                self.runtime.release(*node);
                *node = self.runtime.create_tone(*frequency);
                *started = false;
                self.playing = false;
            }
            Source::Sample { node } => {
                self.runtime.disconnect(*node);
                self.playing = false;
            }
        }
    }

    /// Set the playback rate. Applies only to sample sources; silently does
    /// nothing for tones and empty decks.
    pub fn set_rate(&mut self, rate: f32) {
        if let Source::Sample { node } = &self.source {
            self.runtime.set_playback_rate(*node, rate);
        }
    }

    /// Ramp each band toward its mapped decibel target. Control values are
    /// clamped into 0-100.
    pub fn set_eq(&mut self, eq: EqSettings) {
        self.runtime
            .ramp_filter_gain_db(self.low, map_to_db(eq.low.clamp(0.0, 100.0)), RAMP_TAU);
        self.runtime
            .ramp_filter_gain_db(self.mid, map_to_db(eq.mid.clamp(0.0, 100.0)), RAMP_TAU);
        self.runtime
            .ramp_filter_gain_db(self.high, map_to_db(eq.high.clamp(0.0, 100.0)), RAMP_TAU);
    }

    /// Attach the deck's output to a destination node
    pub fn connect(&self, destination: NodeId) {
        self.runtime.connect(self.output, destination);
    }

    /// Detach the deck's output from everything downstream
    pub fn disconnect(&self) {
        self.runtime.disconnect(self.output);
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    /// The node other components connect to
    pub fn output(&self) -> NodeId {
        self.output
    }
}
