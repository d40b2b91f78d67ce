//! Graph node implementations
//!
//! Each node renders one quantum at a time: it receives the summed output of
//! its upstream nodes as interleaved stereo and writes the same number of
//! samples to its own output buffer. Sources ignore their input; sinks write
//! silence.

mod analyser;
mod capture;
mod filter;
mod gain;
mod sample;
mod tone;

pub use analyser::{AnalyserNode, ANALYSIS_WINDOW, BIN_COUNT};
pub use capture::CaptureNode;
pub use filter::{FilterNode, FilterShape};
pub use gain::GainNode;
pub use sample::SampleNode;
pub use tone::ToneNode;
