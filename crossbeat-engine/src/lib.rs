//! Two-deck mixing core for crossbeat
//!
//! This crate arranges host runtime nodes into a DJ mixing graph:
//! - Deck: one playback source (tone or sample buffer) through a fixed
//!   3-band EQ chain into an output gain
//! - AudioEngine: two decks into an equal-power crossfade bus, a master
//!   gain, a metering tap, and a capture sink
//! - Analyser: RMS and time/frequency snapshots of the mixed signal
//! - Recorder: captures the mix into an encoded in-memory artifact
//!
//! The engine owns no DSP: every audible operation is expressed through
//! `crossbeat_runtime` handles, and every audible parameter change is a
//! smoothed ramp rather than an immediate write.

mod analyser;
mod deck;
mod engine;
mod error;
mod recorder;

pub use analyser::Analyser;
pub use deck::{map_to_db, Deck, DeckSource, EqSettings, DEFAULT_TONE_HZ};
pub use engine::AudioEngine;
pub use error::{EngineError, RecorderError};
pub use recorder::{Artifact, Recorder, RecorderState};

// Convenience re-exports for callers wiring an engine up
pub use crossbeat_runtime::{
    EncoderFactory, HostEncoderFactory, MediaType, NodeId, Runtime,
};

/// Time constant for every audible parameter ramp (EQ gains, crossfader
/// gains): short enough to feel immediate, long enough to avoid clicks.
pub(crate) const RAMP_TAU: f32 = 0.01;
