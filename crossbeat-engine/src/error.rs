//! Engine error types
//!
//! Graph wiring and parameter operations are total and cannot fail after
//! construction. The one systemic failure mode is the host encoder
//! capability being unavailable, which surfaces as a construction-time
//! error instead of being masked.

use crossbeat_runtime::EncoderError;
use thiserror::Error;

/// Errors from the recording subsystem
#[derive(Error, Debug)]
pub enum RecorderError {
    #[error("no encoder capability available on this host")]
    EncoderUnavailable,
    #[error(transparent)]
    Encoder(#[from] EncoderError),
}

/// Errors from engine construction
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("recorder unavailable: {0}")]
    Recorder(#[from] RecorderError),
}
