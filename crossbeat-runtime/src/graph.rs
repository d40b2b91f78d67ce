//! Audio node graph - wiring, parameter automation, and pull rendering
//!
//! The graph owns every node and a deduplicated edge set. Rendering pulls
//! one quantum at a time: nodes that can reach a terminal sink (destination,
//! capture, analyser) are processed in dependency order, fan-in is summed,
//! and the destination's output becomes the rendered quantum. Nodes that
//! cannot reach a sink do not render, so a disconnected source holds its
//! position.
//!
//! `Runtime` is the shared facade: the graph behind a mutex, cloned into
//! whoever needs a handle. Control-side calls take the lock briefly; the
//! real-time render callback uses `try_render` and emits silence on
//! contention rather than blocking.

use std::sync::Arc;

use crossbeam_channel::Sender;
use parking_lot::Mutex;

use crate::encoder::Encoder;
use crate::nodes::{
    AnalyserNode, CaptureNode, FilterNode, FilterShape, GainNode, SampleNode, ToneNode,
};

/// Default time constant for parameter ramps created without an explicit tau
const DEFAULT_TAU: f32 = 0.01;

/// Pre-allocated per-node buffer size (2048 stereo frames)
const MAX_QUANTUM: usize = 4096;

/// Opaque handle to a graph node. Generation-tagged: a handle to a released
/// node never resolves again, even if its slot is reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId {
    index: u32,
    generation: u32,
}

enum NodeKind {
    Gain(GainNode),
    Filter(FilterNode),
    Tone(ToneNode),
    Sample(SampleNode),
    Analyser(AnalyserNode),
    Capture(CaptureNode),
    Destination,
}

struct NodeSlot {
    kind: NodeKind,
    buffer: Vec<f32>,
}

impl NodeSlot {
    fn new(kind: NodeKind) -> Self {
        Self {
            kind,
            buffer: vec![0.0; MAX_QUANTUM],
        }
    }
}

struct Slot {
    generation: u32,
    node: Option<NodeSlot>,
}

/// The node store, edge set, and render state
pub struct Graph {
    sample_rate: u32,
    slots: Vec<Slot>,
    free: Vec<usize>,
    edges: Vec<(NodeId, NodeId)>,
    destination: NodeId,
    frames_rendered: u64,
    order: Vec<usize>,
    order_dirty: bool,
    mix_buffer: Vec<f32>,
}

impl Graph {
    pub fn new(sample_rate: u32) -> Self {
        let mut graph = Self {
            sample_rate,
            slots: Vec::new(),
            free: Vec::new(),
            edges: Vec::new(),
            destination: NodeId {
                index: 0,
                generation: 0,
            },
            frames_rendered: 0,
            order: Vec::new(),
            order_dirty: true,
            mix_buffer: vec![0.0; MAX_QUANTUM],
        };
        graph.destination = graph.insert(NodeKind::Destination);
        graph
    }

    fn insert(&mut self, kind: NodeKind) -> NodeId {
        let node = NodeSlot::new(kind);
        let index = match self.free.pop() {
            Some(index) => {
                self.slots[index].node = Some(node);
                index
            }
            None => {
                self.slots.push(Slot {
                    generation: 0,
                    node: Some(node),
                });
                self.slots.len() - 1
            }
        };
        self.order_dirty = true;
        NodeId {
            index: index as u32,
            generation: self.slots[index].generation,
        }
    }

    /// Resolve a handle to a slot index, or None if released/stale
    fn index_of(&self, node: NodeId) -> Option<usize> {
        let idx = node.index as usize;
        let slot = self.slots.get(idx)?;
        (slot.generation == node.generation && slot.node.is_some()).then_some(idx)
    }

    fn kind(&self, node: NodeId) -> Option<&NodeKind> {
        let idx = self.index_of(node)?;
        self.slots[idx].node.as_ref().map(|n| &n.kind)
    }

    fn kind_mut(&mut self, node: NodeId) -> Option<&mut NodeKind> {
        let idx = self.index_of(node)?;
        self.slots[idx].node.as_mut().map(|n| &mut n.kind)
    }

    // -- factories ----------------------------------------------------------

    pub fn create_gain(&mut self, initial: f32) -> NodeId {
        self.insert(NodeKind::Gain(GainNode::new(
            initial,
            DEFAULT_TAU,
            self.sample_rate,
        )))
    }

    pub fn create_filter(&mut self, shape: FilterShape, frequency: f32, q: f32) -> NodeId {
        self.insert(NodeKind::Filter(FilterNode::new(
            shape,
            frequency,
            q,
            DEFAULT_TAU,
            self.sample_rate,
        )))
    }

    pub fn create_tone(&mut self, frequency: f32) -> NodeId {
        self.insert(NodeKind::Tone(ToneNode::new(
            frequency,
            DEFAULT_TAU,
            self.sample_rate,
        )))
    }

    pub fn create_sample(&mut self, buffer: Arc<Vec<f32>>) -> NodeId {
        self.insert(NodeKind::Sample(SampleNode::new(buffer)))
    }

    pub fn create_analyser(&mut self) -> NodeId {
        self.insert(NodeKind::Analyser(AnalyserNode::new()))
    }

    pub fn create_capture(&mut self, chunk_tx: Sender<Vec<u8>>) -> NodeId {
        self.insert(NodeKind::Capture(CaptureNode::new(chunk_tx)))
    }

    pub fn destination(&self) -> NodeId {
        self.destination
    }

    // -- wiring -------------------------------------------------------------

    /// Add an edge. Idempotent: an existing edge is left untouched.
    pub fn connect(&mut self, from: NodeId, to: NodeId) {
        if from == to || self.index_of(from).is_none() || self.index_of(to).is_none() {
            return;
        }
        if !self.edges.contains(&(from, to)) {
            self.edges.push((from, to));
            self.order_dirty = true;
        }
    }

    /// Remove every outgoing edge of `node`
    pub fn disconnect(&mut self, node: NodeId) {
        let before = self.edges.len();
        self.edges.retain(|&(from, _)| from != node);
        if self.edges.len() != before {
            self.order_dirty = true;
        }
    }

    /// Drop the node entirely, with all edges touching it
    pub fn release(&mut self, node: NodeId) {
        if node == self.destination {
            return;
        }
        let Some(idx) = self.index_of(node) else {
            return;
        };
        self.edges.retain(|&(from, to)| from != node && to != node);
        self.slots[idx].node = None;
        self.slots[idx].generation = self.slots[idx].generation.wrapping_add(1);
        self.free.push(idx);
        self.order_dirty = true;
    }

    pub fn connected(&self, from: NodeId, to: NodeId) -> bool {
        self.edges.contains(&(from, to))
    }

    pub fn edges(&self) -> Vec<(NodeId, NodeId)> {
        self.edges.clone()
    }

    // -- parameter automation ----------------------------------------------

    /// Ramp a gain node's level toward `target` with time constant `tau`
    pub fn ramp_gain(&mut self, node: NodeId, target: f32, tau: f32) {
        let sample_rate = self.sample_rate;
        if let Some(NodeKind::Gain(g)) = self.kind_mut(node) {
            g.gain().set_tau(tau, sample_rate);
            g.gain().ramp_to(target);
        }
    }

    pub fn gain_value(&self, node: NodeId) -> Option<f32> {
        match self.kind(node) {
            Some(NodeKind::Gain(g)) => Some(g.gain_value()),
            _ => None,
        }
    }

    pub fn gain_target(&self, node: NodeId) -> Option<f32> {
        match self.kind(node) {
            Some(NodeKind::Gain(g)) => Some(g.gain_target()),
            _ => None,
        }
    }

    /// Ramp a filter's gain (dB) toward `target` with time constant `tau`
    pub fn ramp_filter_gain_db(&mut self, node: NodeId, target: f32, tau: f32) {
        let sample_rate = self.sample_rate;
        if let Some(NodeKind::Filter(f)) = self.kind_mut(node) {
            f.gain_db().set_tau(tau, sample_rate);
            f.gain_db().ramp_to(target);
        }
    }

    pub fn filter_gain_db_value(&self, node: NodeId) -> Option<f32> {
        match self.kind(node) {
            Some(NodeKind::Filter(f)) => Some(f.gain_db_value()),
            _ => None,
        }
    }

    pub fn filter_gain_db_target(&self, node: NodeId) -> Option<f32> {
        match self.kind(node) {
            Some(NodeKind::Filter(f)) => Some(f.gain_db_target()),
            _ => None,
        }
    }

    /// Ramp a filter or tone frequency toward `target`
    pub fn ramp_frequency(&mut self, node: NodeId, target: f32, tau: f32) {
        let sample_rate = self.sample_rate;
        match self.kind_mut(node) {
            Some(NodeKind::Filter(f)) => {
                f.frequency().set_tau(tau, sample_rate);
                f.frequency().ramp_to(target);
            }
            Some(NodeKind::Tone(t)) => {
                t.frequency().set_tau(tau, sample_rate);
                t.frequency().ramp_to(target);
            }
            _ => {}
        }
    }

    pub fn tone_frequency(&self, node: NodeId) -> Option<f32> {
        match self.kind(node) {
            Some(NodeKind::Tone(t)) => Some(t.frequency_value()),
            _ => None,
        }
    }

    /// Set a sample player's playback rate. Applied immediately.
    pub fn set_playback_rate(&mut self, node: NodeId, rate: f32) {
        if let Some(NodeKind::Sample(s)) = self.kind_mut(node) {
            s.set_rate(rate);
        }
    }

    pub fn playback_rate(&self, node: NodeId) -> Option<f32> {
        match self.kind(node) {
            Some(NodeKind::Sample(s)) => Some(s.rate()),
            _ => None,
        }
    }

    pub fn sample_position(&self, node: NodeId) -> Option<f64> {
        match self.kind(node) {
            Some(NodeKind::Sample(s)) => Some(s.position()),
            _ => None,
        }
    }

    // -- source lifecycle ---------------------------------------------------

    /// Start a tone. No-op for anything else, or for a consumed tone.
    pub fn start_source(&mut self, node: NodeId) {
        if let Some(NodeKind::Tone(t)) = self.kind_mut(node) {
            t.start();
        }
    }

    /// Permanently stop a tone
    pub fn stop_source(&mut self, node: NodeId) {
        if let Some(NodeKind::Tone(t)) = self.kind_mut(node) {
            t.stop();
        }
    }

    // -- analysis -----------------------------------------------------------

    /// Time-domain snapshot from an analyser tap. Fills the neutral midpoint
    /// (128) if `node` is not an analyser.
    pub fn time_domain_bytes(&self, node: NodeId, out: &mut [u8]) {
        match self.kind(node) {
            Some(NodeKind::Analyser(a)) => a.time_domain_bytes(out),
            _ => out.fill(128),
        }
    }

    /// Spectral snapshot from an analyser tap. Fills zero if `node` is not
    /// an analyser.
    pub fn frequency_bytes(&mut self, node: NodeId, out: &mut [u8]) {
        match self.kind_mut(node) {
            Some(NodeKind::Analyser(a)) => a.frequency_bytes(out),
            _ => out.fill(0),
        }
    }

    // -- capture ------------------------------------------------------------

    /// Arm a capture sink with an encoder
    pub fn arm_capture(&mut self, node: NodeId, encoder: Box<dyn Encoder>) {
        if let Some(NodeKind::Capture(c)) = self.kind_mut(node) {
            c.arm(encoder);
        }
    }

    /// Disarm a capture sink, flushing the encoder's trailing bytes
    pub fn disarm_capture(&mut self, node: NodeId) {
        if let Some(NodeKind::Capture(c)) = self.kind_mut(node) {
            c.disarm();
        }
    }

    pub fn capture_armed(&self, node: NodeId) -> bool {
        matches!(self.kind(node), Some(NodeKind::Capture(c)) if c.is_armed())
    }

    // -- clock --------------------------------------------------------------

    /// Seconds of audio rendered so far (the monotonic audio clock)
    pub fn now(&self) -> f64 {
        self.frames_rendered as f64 / self.sample_rate as f64
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    // -- rendering ----------------------------------------------------------

    fn rebuild_order(&mut self) {
        fn visit(
            idx: usize,
            edges: &[(NodeId, NodeId)],
            visited: &mut [bool],
            order: &mut Vec<usize>,
        ) {
            if visited[idx] {
                return;
            }
            visited[idx] = true;
            for &(src, dst) in edges {
                if dst.index as usize == idx {
                    visit(src.index as usize, edges, visited, order);
                }
            }
            order.push(idx);
        }

        let mut visited = vec![false; self.slots.len()];
        let mut order = Vec::with_capacity(self.slots.len());

        for (idx, slot) in self.slots.iter().enumerate() {
            let is_sink = matches!(
                slot.node.as_ref().map(|n| &n.kind),
                Some(NodeKind::Destination | NodeKind::Capture(_) | NodeKind::Analyser(_))
            );
            if is_sink {
                visit(idx, &self.edges, &mut visited, &mut order);
            }
        }

        self.order = order;
        self.order_dirty = false;
    }

    /// Render one quantum of interleaved stereo into `output`
    pub fn render(&mut self, output: &mut [f32]) {
        let len = output.len() & !1;
        let frames = len / 2;
        output.fill(0.0);
        if frames == 0 {
            return;
        }

        if self.order_dirty {
            self.rebuild_order();
        }
        if self.mix_buffer.len() < len {
            self.mix_buffer.resize(len, 0.0);
        }

        let sample_rate = self.sample_rate;
        for i in 0..self.order.len() {
            let idx = self.order[i];

            // Sum upstream outputs into the mix scratch
            self.mix_buffer[..len].fill(0.0);
            for &(src, dst) in &self.edges {
                if dst.index as usize != idx {
                    continue;
                }
                if let Some(upstream) = self
                    .slots
                    .get(src.index as usize)
                    .and_then(|s| s.node.as_ref())
                {
                    for (acc, &v) in self.mix_buffer[..len]
                        .iter_mut()
                        .zip(&upstream.buffer[..len])
                    {
                        *acc += v;
                    }
                }
            }

            let Some(slot) = self.slots.get_mut(idx).and_then(|s| s.node.as_mut()) else {
                continue;
            };
            if slot.buffer.len() < len {
                slot.buffer.resize(len, 0.0);
            }
            let input = &self.mix_buffer[..len];
            let out = &mut slot.buffer[..len];
            match &mut slot.kind {
                NodeKind::Gain(g) => g.process(input, out),
                NodeKind::Filter(f) => f.process(input, out),
                NodeKind::Tone(t) => t.process(out, sample_rate),
                NodeKind::Sample(s) => s.process(out),
                NodeKind::Analyser(a) => a.process(input, out),
                NodeKind::Capture(c) => {
                    out.fill(0.0);
                    c.process(input);
                }
                NodeKind::Destination => out.copy_from_slice(input),
            }
        }

        if let Some(dest) = self
            .slots
            .get(self.destination.index as usize)
            .and_then(|s| s.node.as_ref())
        {
            output[..len].copy_from_slice(&dest.buffer[..len]);
        }
        self.frames_rendered += frames as u64;
    }
}

/// Shared handle to the graph - the host audio runtime as seen by the engine
#[derive(Clone)]
pub struct Runtime {
    inner: Arc<Mutex<Graph>>,
}

impl Runtime {
    pub fn new(sample_rate: u32) -> Self {
        tracing::debug!(sample_rate, "audio runtime created");
        Self {
            inner: Arc::new(Mutex::new(Graph::new(sample_rate))),
        }
    }

    pub fn create_gain(&self, initial: f32) -> NodeId {
        self.inner.lock().create_gain(initial)
    }

    pub fn create_filter(&self, shape: FilterShape, frequency: f32, q: f32) -> NodeId {
        self.inner.lock().create_filter(shape, frequency, q)
    }

    pub fn create_tone(&self, frequency: f32) -> NodeId {
        self.inner.lock().create_tone(frequency)
    }

    pub fn create_sample(&self, buffer: Arc<Vec<f32>>) -> NodeId {
        self.inner.lock().create_sample(buffer)
    }

    pub fn create_analyser(&self) -> NodeId {
        self.inner.lock().create_analyser()
    }

    pub fn create_capture(&self, chunk_tx: Sender<Vec<u8>>) -> NodeId {
        self.inner.lock().create_capture(chunk_tx)
    }

    pub fn destination(&self) -> NodeId {
        self.inner.lock().destination()
    }

    pub fn connect(&self, from: NodeId, to: NodeId) {
        self.inner.lock().connect(from, to);
    }

    pub fn disconnect(&self, node: NodeId) {
        self.inner.lock().disconnect(node);
    }

    pub fn release(&self, node: NodeId) {
        self.inner.lock().release(node);
    }

    pub fn connected(&self, from: NodeId, to: NodeId) -> bool {
        self.inner.lock().connected(from, to)
    }

    pub fn edges(&self) -> Vec<(NodeId, NodeId)> {
        self.inner.lock().edges()
    }

    pub fn ramp_gain(&self, node: NodeId, target: f32, tau: f32) {
        self.inner.lock().ramp_gain(node, target, tau);
    }

    pub fn gain_value(&self, node: NodeId) -> Option<f32> {
        self.inner.lock().gain_value(node)
    }

    pub fn gain_target(&self, node: NodeId) -> Option<f32> {
        self.inner.lock().gain_target(node)
    }

    pub fn ramp_filter_gain_db(&self, node: NodeId, target: f32, tau: f32) {
        self.inner.lock().ramp_filter_gain_db(node, target, tau);
    }

    pub fn filter_gain_db_value(&self, node: NodeId) -> Option<f32> {
        self.inner.lock().filter_gain_db_value(node)
    }

    pub fn filter_gain_db_target(&self, node: NodeId) -> Option<f32> {
        self.inner.lock().filter_gain_db_target(node)
    }

    pub fn ramp_frequency(&self, node: NodeId, target: f32, tau: f32) {
        self.inner.lock().ramp_frequency(node, target, tau);
    }

    pub fn tone_frequency(&self, node: NodeId) -> Option<f32> {
        self.inner.lock().tone_frequency(node)
    }

    pub fn set_playback_rate(&self, node: NodeId, rate: f32) {
        self.inner.lock().set_playback_rate(node, rate);
    }

    pub fn playback_rate(&self, node: NodeId) -> Option<f32> {
        self.inner.lock().playback_rate(node)
    }

    pub fn sample_position(&self, node: NodeId) -> Option<f64> {
        self.inner.lock().sample_position(node)
    }

    pub fn start_source(&self, node: NodeId) {
        self.inner.lock().start_source(node);
    }

    pub fn stop_source(&self, node: NodeId) {
        self.inner.lock().stop_source(node);
    }

    pub fn time_domain_bytes(&self, node: NodeId, out: &mut [u8]) {
        self.inner.lock().time_domain_bytes(node, out);
    }

    pub fn frequency_bytes(&self, node: NodeId, out: &mut [u8]) {
        self.inner.lock().frequency_bytes(node, out);
    }

    pub fn arm_capture(&self, node: NodeId, encoder: Box<dyn Encoder>) {
        self.inner.lock().arm_capture(node, encoder);
    }

    pub fn disarm_capture(&self, node: NodeId) {
        self.inner.lock().disarm_capture(node);
    }

    pub fn capture_armed(&self, node: NodeId) -> bool {
        self.inner.lock().capture_armed(node)
    }

    pub fn now(&self) -> f64 {
        self.inner.lock().now()
    }

    pub fn sample_rate(&self) -> u32 {
        self.inner.lock().sample_rate()
    }

    /// Render a quantum, blocking on the graph lock. Control-side callers
    /// and tests use this.
    pub fn render(&self, output: &mut [f32]) {
        self.inner.lock().render(output);
    }

    /// Render a quantum without blocking: on lock contention, emit silence
    /// and report false. Real-time callbacks use this.
    pub fn try_render(&self, output: &mut [f32]) -> bool {
        match self.inner.try_lock() {
            Some(mut graph) => {
                graph.render(output);
                true
            }
            None => {
                output.fill(0.0);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connect_is_idempotent() {
        let mut g = Graph::new(48000);
        let a = g.create_gain(1.0);
        let b = g.create_gain(1.0);
        g.connect(a, b);
        g.connect(a, b);
        assert_eq!(g.edges().len(), 1);
        assert!(g.connected(a, b));
    }

    #[test]
    fn test_self_edge_rejected() {
        let mut g = Graph::new(48000);
        let a = g.create_gain(1.0);
        g.connect(a, a);
        assert!(g.edges().is_empty());
    }

    #[test]
    fn test_disconnect_removes_outgoing_only() {
        let mut g = Graph::new(48000);
        let a = g.create_gain(1.0);
        let b = g.create_gain(1.0);
        let c = g.create_gain(1.0);
        g.connect(a, b);
        g.connect(b, c);
        g.connect(c, a);

        g.disconnect(b);
        assert!(g.connected(a, b));
        assert!(!g.connected(b, c));
        assert!(g.connected(c, a));
    }

    #[test]
    fn test_release_removes_node_and_edges() {
        let mut g = Graph::new(48000);
        let a = g.create_gain(1.0);
        let b = g.create_gain(1.0);
        g.connect(a, b);
        g.release(a);
        assert!(g.edges().is_empty());
        assert!(g.gain_value(a).is_none());
    }

    #[test]
    fn test_stale_handle_does_not_alias_reused_slot() {
        let mut g = Graph::new(48000);
        let old = g.create_tone(220.0);
        g.release(old);
        let new = g.create_tone(440.0);

        // The freed slot is reused, but the old handle stays dead
        assert_eq!(g.tone_frequency(old), None);
        assert_eq!(g.tone_frequency(new), Some(440.0));
        assert_ne!(old, new);
    }

    #[test]
    fn test_render_tone_through_gain() {
        let mut g = Graph::new(48000);
        let tone = g.create_tone(220.0);
        let gain = g.create_gain(0.5);
        g.connect(tone, gain);
        g.connect(gain, g.destination());
        g.start_source(tone);

        let mut output = vec![0.0f32; 512];
        g.render(&mut output);

        let peak = output.iter().fold(0.0f32, |m, s| m.max(s.abs()));
        assert!(peak > 0.1, "tone should be audible, peak {}", peak);
        assert!(peak <= 0.5 + 1e-3, "gain should cap at 0.5, peak {}", peak);
    }

    #[test]
    fn test_unconnected_tone_is_inaudible() {
        let mut g = Graph::new(48000);
        let tone = g.create_tone(220.0);
        g.start_source(tone);

        let mut output = vec![0.0f32; 256];
        g.render(&mut output);
        assert!(output.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_disconnected_sample_holds_position() {
        let mut g = Graph::new(48000);
        let sample = g.create_sample(Arc::new(vec![0.5f32; 100_000]));
        g.connect(sample, g.destination());

        let mut output = vec![0.0f32; 256];
        g.render(&mut output);
        let pos = g.sample_position(sample).unwrap();
        assert!(pos > 0.0);

        g.disconnect(sample);
        g.render(&mut output);
        assert_eq!(g.sample_position(sample).unwrap(), pos);
    }

    #[test]
    fn test_fan_in_sums() {
        let mut g = Graph::new(48000);
        let a = g.create_sample(Arc::new(vec![0.25f32; 1024]));
        let b = g.create_sample(Arc::new(vec![0.25f32; 1024]));
        g.connect(a, g.destination());
        g.connect(b, g.destination());

        let mut output = vec![0.0f32; 64];
        g.render(&mut output);
        assert!(output.iter().all(|&s| (s - 0.5).abs() < 1e-6));
    }

    #[test]
    fn test_clock_advances_with_rendered_frames() {
        let mut g = Graph::new(48000);
        assert_eq!(g.now(), 0.0);

        let mut output = vec![0.0f32; 96000]; // 48000 frames
        g.render(&mut output);
        assert!((g.now() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_param_ops_on_wrong_kind_are_noops() {
        let mut g = Graph::new(48000);
        let tone = g.create_tone(220.0);
        g.ramp_gain(tone, 0.0, 0.01);
        g.set_playback_rate(tone, 2.0);
        assert!(g.gain_value(tone).is_none());
        assert!(g.playback_rate(tone).is_none());
    }

    #[test]
    fn test_runtime_handle_shares_graph() {
        let rt = Runtime::new(48000);
        let handle = rt.clone();
        let gain = rt.create_gain(1.0);
        handle.ramp_gain(gain, 0.25, 0.01);
        assert_eq!(rt.gain_target(gain), Some(0.25));
    }
}
