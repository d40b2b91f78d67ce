//! Smoothed parameter - click-free automation of audible values
//!
//! Every audible parameter in the graph (gain, filter gain, frequency) is a
//! `SmoothedParam`: a current value that approaches a target exponentially
//! with time constant tau. Control code only ever moves the target; the
//! render path advances the current value. Playback rate is the one value
//! applied immediately, via `set`.

/// Snap threshold: once within this distance of the target, lock to it
const SETTLE_EPSILON: f32 = 1e-4;

/// A parameter that ramps toward its target instead of jumping
#[derive(Debug, Clone)]
pub struct SmoothedParam {
    current: f32,
    target: f32,
    tau: f32,
    /// Per-frame decay rate: 1 / (sample_rate * tau)
    rate: f32,
}

impl SmoothedParam {
    /// Create a settled parameter at `value` with time constant `tau` seconds
    pub fn new(value: f32, tau: f32, sample_rate: u32) -> Self {
        let tau = tau.max(1e-6);
        Self {
            current: value,
            target: value,
            tau,
            rate: 1.0 / (sample_rate as f32 * tau),
        }
    }

    /// Schedule an exponential approach toward `target`, starting now
    pub fn ramp_to(&mut self, target: f32) {
        self.target = target;
    }

    /// Change the time constant for subsequent ramps
    pub fn set_tau(&mut self, tau: f32, sample_rate: u32) {
        self.tau = tau.max(1e-6);
        self.rate = 1.0 / (sample_rate as f32 * self.tau);
    }

    /// Immediate jump: current and target both move to `value`
    pub fn set(&mut self, value: f32) {
        self.current = value;
        self.target = value;
    }

    /// Advance by one frame, returning the new current value
    #[inline]
    pub fn step(&mut self) -> f32 {
        self.advance(1)
    }

    /// Advance by `frames` frames at once, returning the new current value
    ///
    /// Exact for any block size: the exponential is evaluated for the whole
    /// span rather than iterated per frame.
    pub fn advance(&mut self, frames: usize) -> f32 {
        if self.is_settled() {
            self.current = self.target;
            return self.current;
        }
        let coeff = 1.0 - (-(frames as f32) * self.rate).exp();
        self.current += (self.target - self.current) * coeff;
        if (self.target - self.current).abs() < SETTLE_EPSILON {
            self.current = self.target;
        }
        self.current
    }

    /// Current (smoothed) value
    pub fn value(&self) -> f32 {
        self.current
    }

    /// Target the parameter is ramping toward
    pub fn target(&self) -> f32 {
        self.target
    }

    /// True once the ramp has converged onto the target
    pub fn is_settled(&self) -> bool {
        (self.target - self.current).abs() < SETTLE_EPSILON
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ramp_converges_monotonically() {
        let mut p = SmoothedParam::new(0.0, 0.01, 48000);
        p.ramp_to(1.0);

        let mut last = 0.0;
        for _ in 0..48000 {
            let v = p.step();
            assert!(v >= last, "ramp went backwards: {} -> {}", last, v);
            assert!(v <= 1.0);
            last = v;
        }
        assert!(p.is_settled());
        assert_eq!(p.value(), 1.0);
    }

    #[test]
    fn test_ramp_reaches_tau_fraction() {
        // After exactly tau seconds the ramp covers 1 - 1/e of the distance
        let mut p = SmoothedParam::new(0.0, 0.01, 48000);
        p.ramp_to(1.0);
        p.advance(480); // 0.01s at 48kHz

        let expected = 1.0 - (-1.0f32).exp();
        assert!(
            (p.value() - expected).abs() < 1e-3,
            "expected ~{}, got {}",
            expected,
            p.value()
        );
    }

    #[test]
    fn test_set_jumps_immediately() {
        let mut p = SmoothedParam::new(0.0, 0.01, 48000);
        p.ramp_to(1.0);
        p.set(2.0);
        assert_eq!(p.value(), 2.0);
        assert_eq!(p.target(), 2.0);
        assert!(p.is_settled());
    }

    #[test]
    fn test_ramp_does_not_touch_current() {
        let mut p = SmoothedParam::new(0.5, 0.01, 48000);
        p.ramp_to(1.0);
        assert_eq!(p.value(), 0.5);
        assert_eq!(p.target(), 1.0);
    }

    #[test]
    fn test_block_advance_matches_per_frame() {
        let mut per_frame = SmoothedParam::new(0.0, 0.01, 48000);
        let mut block = SmoothedParam::new(0.0, 0.01, 48000);
        per_frame.ramp_to(1.0);
        block.ramp_to(1.0);

        for _ in 0..256 {
            per_frame.step();
        }
        block.advance(256);

        assert!((per_frame.value() - block.value()).abs() < 1e-3);
    }
}
