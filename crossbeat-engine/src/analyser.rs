//! Analyser - loudness and waveform metering over the mix bus
//!
//! A thin wrapper over the runtime's analysis tap. Owns one reusable byte
//! scratch so the metering paths never allocate per call.

use crossbeat_runtime::{NodeId, Runtime, BIN_COUNT};

/// Metering front-end over an analysis tap node
pub struct Analyser {
    runtime: Runtime,
    node: NodeId,
    scratch: Box<[u8; BIN_COUNT]>,
}

impl Analyser {
    pub fn new(runtime: &Runtime) -> Self {
        Self {
            runtime: runtime.clone(),
            node: runtime.create_analyser(),
            scratch: Box::new([128; BIN_COUNT]),
        }
    }

    /// The tap node, for wiring into the graph
    pub fn node(&self) -> NodeId {
        self.node
    }

    /// Number of samples a snapshot buffer should hold
    pub fn bin_count(&self) -> usize {
        BIN_COUNT
    }

    /// Root-mean-square loudness of the current window, in [0, 1].
    /// A silent tap reads all-midpoint bytes and yields exactly 0.
    pub fn rms(&mut self) -> f32 {
        self.runtime
            .time_domain_bytes(self.node, self.scratch.as_mut_slice());
        let mut sum = 0.0f32;
        for &byte in self.scratch.iter() {
            let v = (byte as f32 - 128.0) / 128.0;
            sum += v * v;
        }
        (sum / BIN_COUNT as f32).sqrt()
    }

    /// Copy the current time-domain snapshot into a caller-supplied buffer
    pub fn time_domain(&self, out: &mut [u8]) {
        self.runtime.time_domain_bytes(self.node, out);
    }

    /// Copy the current smoothed spectrum snapshot into a caller-supplied
    /// buffer
    pub fn frequency(&self, out: &mut [u8]) {
        self.runtime.frequency_bytes(self.node, out);
    }
}
