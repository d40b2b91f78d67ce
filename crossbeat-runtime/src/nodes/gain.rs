//! Gain stage with a smoothed level parameter

use crate::param::SmoothedParam;

/// A gain node: multiplies its summed input by a smoothed linear gain
pub struct GainNode {
    gain: SmoothedParam,
}

impl GainNode {
    pub fn new(initial: f32, tau: f32, sample_rate: u32) -> Self {
        Self {
            gain: SmoothedParam::new(initial, tau, sample_rate),
        }
    }

    pub fn gain(&mut self) -> &mut SmoothedParam {
        &mut self.gain
    }

    pub fn gain_value(&self) -> f32 {
        self.gain.value()
    }

    pub fn gain_target(&self) -> f32 {
        self.gain.target()
    }

    /// Apply the gain per stereo frame, advancing the ramp per frame so a
    /// moving target never produces a step
    pub fn process(&mut self, input: &[f32], output: &mut [f32]) {
        for (frame_in, frame_out) in input.chunks_exact(2).zip(output.chunks_exact_mut(2)) {
            let g = self.gain.step();
            frame_out[0] = frame_in[0] * g;
            frame_out[1] = frame_in[1] * g;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settled_gain_scales_input() {
        let mut node = GainNode::new(0.5, 0.01, 48000);
        let input = vec![1.0f32; 8];
        let mut output = vec![0.0f32; 8];
        node.process(&input, &mut output);
        for s in &output {
            assert!((s - 0.5).abs() < 1e-6);
        }
    }

    #[test]
    fn test_ramped_gain_moves_gradually() {
        let mut node = GainNode::new(0.0, 0.01, 48000);
        node.gain().ramp_to(1.0);

        let input = vec![1.0f32; 64];
        let mut output = vec![0.0f32; 64];
        node.process(&input, &mut output);

        // First frame barely moved, later frames closer to target
        assert!(output[0] < 0.01);
        assert!(output[62] > output[0]);
        assert!(output[62] < 1.0);
    }
}
