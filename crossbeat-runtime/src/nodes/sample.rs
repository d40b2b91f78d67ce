//! Sample-buffer player
//!
//! Plays an interleaved stereo buffer with linear interpolation at a
//! caller-set playback rate. Renders only while reachable in the graph, so
//! disconnecting it freezes the position - that is how a deck pauses a
//! sample without discarding the handle.

use std::sync::Arc;

/// Buffer playback node
pub struct SampleNode {
    /// Interleaved stereo samples, shared with the loading side
    buffer: Arc<Vec<f32>>,
    /// Playhead in samples (even index = left channel)
    position: f64,
    /// Playback speed, 1.0 = native rate. Applied immediately, not ramped.
    rate: f32,
}

impl SampleNode {
    pub fn new(buffer: Arc<Vec<f32>>) -> Self {
        Self {
            buffer,
            position: 0.0,
            rate: 1.0,
        }
    }

    pub fn set_rate(&mut self, rate: f32) {
        self.rate = rate;
    }

    pub fn rate(&self) -> f32 {
        self.rate
    }

    pub fn position(&self) -> f64 {
        self.position
    }

    pub fn process(&mut self, output: &mut [f32]) {
        let len = self.buffer.len();

        for frame in output.chunks_exact_mut(2) {
            let pos = self.position as usize;
            if pos + 1 >= len {
                // Past the end: silence, playhead parked
                frame[0] = 0.0;
                frame[1] = 0.0;
                continue;
            }

            // Linear interpolation at non-integer positions
            let frac = self.position.fract() as f32;
            let pos_even = pos & !1;

            if pos_even + 3 < len {
                let l0 = self.buffer[pos_even];
                let r0 = self.buffer[pos_even + 1];
                let l1 = self.buffer[pos_even + 2];
                let r1 = self.buffer[pos_even + 3];
                frame[0] = l0 + frac * (l1 - l0);
                frame[1] = r0 + frac * (r1 - r0);
            } else {
                frame[0] = self.buffer[pos_even];
                frame[1] = self.buffer[pos_even + 1];
            }

            self.position += 2.0 * self.rate as f64;
        }
    }
}
