//! Host audio runtime for crossbeat
//!
//! Everything the mixing engine needs from its host, behind opaque handles:
//! - Graph: node store, wiring, and pull-based quantum rendering
//! - Nodes: gain stages, shelf/peaking filters, tone generator, sample
//!   player, analysis tap, capture sink
//! - Param: smoothed parameters - every audible value ramps, never jumps
//! - Encoder: container negotiation and incremental fragment delivery
//!
//! The engine crate talks to all of this exclusively through `Runtime` and
//! `NodeId`; a different host could substitute its own implementation of the
//! same surface.

mod encoder;
mod graph;
mod nodes;
mod param;

pub use encoder::{
    negotiate, Encoder, EncoderError, EncoderFactory, HostEncoderFactory, MediaType, PcmEncoder,
    WavEncoder,
};
pub use graph::{Graph, NodeId, Runtime};
pub use nodes::{FilterShape, ANALYSIS_WINDOW, BIN_COUNT};
pub use param::SmoothedParam;
