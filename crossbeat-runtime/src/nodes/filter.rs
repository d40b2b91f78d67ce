//! Biquad filter node - low shelf, peaking, high shelf
//!
//! RBJ Audio EQ Cookbook coefficients. Gain (dB) and corner/center frequency
//! are smoothed parameters; coefficients are recomputed once per quantum when
//! either has moved, so a gain sweep is click-free without paying a
//! per-sample coefficient update.

use std::f32::consts::PI;

use crate::param::SmoothedParam;

/// Filter response shape
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterShape {
    LowShelf,
    Peaking,
    HighShelf,
}

/// Biquad filter coefficients
#[derive(Clone, Copy, Default)]
struct BiquadCoeffs {
    a0: f32,
    a1: f32,
    a2: f32,
    b1: f32,
    b2: f32,
}

impl BiquadCoeffs {
    /// Unity passthrough
    fn identity() -> Self {
        Self {
            a0: 1.0,
            ..Self::default()
        }
    }
}

/// Biquad filter state for a single channel
#[derive(Default, Clone)]
struct BiquadState {
    x1: f32,
    x2: f32,
    y1: f32,
    y2: f32,
}

impl BiquadState {
    #[inline]
    fn process(&mut self, input: f32, c: &BiquadCoeffs) -> f32 {
        let output =
            c.a0 * input + c.a1 * self.x1 + c.a2 * self.x2 - c.b1 * self.y1 - c.b2 * self.y2;
        self.x2 = self.x1;
        self.x1 = input;
        self.y2 = self.y1;
        self.y1 = output;
        output
    }
}

/// Recompute coefficients when smoothed values have moved at least this far
const COEFF_EPSILON: f32 = 1e-3;

/// A shelf or peaking filter stage with smoothed gain and frequency
pub struct FilterNode {
    shape: FilterShape,
    sample_rate: f32,
    q: f32,

    gain_db: SmoothedParam,
    frequency: SmoothedParam,

    coeffs: BiquadCoeffs,
    state_l: BiquadState,
    state_r: BiquadState,

    // Values the current coefficients were computed from
    applied_gain_db: f32,
    applied_frequency: f32,
}

impl FilterNode {
    pub fn new(shape: FilterShape, frequency: f32, q: f32, tau: f32, sample_rate: u32) -> Self {
        let mut node = Self {
            shape,
            sample_rate: sample_rate as f32,
            q,
            gain_db: SmoothedParam::new(0.0, tau, sample_rate),
            frequency: SmoothedParam::new(frequency, tau, sample_rate),
            coeffs: BiquadCoeffs::identity(),
            state_l: BiquadState::default(),
            state_r: BiquadState::default(),
            applied_gain_db: 0.0,
            applied_frequency: frequency,
        };
        node.update_coefficients();
        node
    }

    pub fn shape(&self) -> FilterShape {
        self.shape
    }

    pub fn gain_db(&mut self) -> &mut SmoothedParam {
        &mut self.gain_db
    }

    pub fn frequency(&mut self) -> &mut SmoothedParam {
        &mut self.frequency
    }

    pub fn gain_db_value(&self) -> f32 {
        self.gain_db.value()
    }

    pub fn gain_db_target(&self) -> f32 {
        self.gain_db.target()
    }

    fn update_coefficients(&mut self) {
        let gain_db = self.gain_db.value();
        let freq = self.frequency.value();

        // A near-flat stage is an exact passthrough
        self.coeffs = if gain_db.abs() < 0.01 {
            BiquadCoeffs::identity()
        } else {
            match self.shape {
                FilterShape::LowShelf => self.low_shelf_coeffs(freq, gain_db),
                FilterShape::Peaking => self.peaking_coeffs(freq, gain_db, self.q),
                FilterShape::HighShelf => self.high_shelf_coeffs(freq, gain_db),
            }
        };
        self.applied_gain_db = gain_db;
        self.applied_frequency = freq;
    }

    fn low_shelf_coeffs(&self, freq: f32, gain_db: f32) -> BiquadCoeffs {
        let a = 10.0f32.powf(gain_db / 40.0);
        let omega = 2.0 * PI * freq / self.sample_rate;
        let sin_omega = omega.sin();
        let cos_omega = omega.cos();
        let alpha = sin_omega / 2.0 * (2.0f32).sqrt(); // shelf slope 1
        let two_sqrt_a_alpha = 2.0 * a.sqrt() * alpha;

        let a0 = (a + 1.0) + (a - 1.0) * cos_omega + two_sqrt_a_alpha;

        BiquadCoeffs {
            a0: (a * ((a + 1.0) - (a - 1.0) * cos_omega + two_sqrt_a_alpha)) / a0,
            a1: (2.0 * a * ((a - 1.0) - (a + 1.0) * cos_omega)) / a0,
            a2: (a * ((a + 1.0) - (a - 1.0) * cos_omega - two_sqrt_a_alpha)) / a0,
            b1: (-2.0 * ((a - 1.0) + (a + 1.0) * cos_omega)) / a0,
            b2: ((a + 1.0) + (a - 1.0) * cos_omega - two_sqrt_a_alpha) / a0,
        }
    }

    fn high_shelf_coeffs(&self, freq: f32, gain_db: f32) -> BiquadCoeffs {
        let a = 10.0f32.powf(gain_db / 40.0);
        let omega = 2.0 * PI * freq / self.sample_rate;
        let sin_omega = omega.sin();
        let cos_omega = omega.cos();
        let alpha = sin_omega / 2.0 * (2.0f32).sqrt();
        let two_sqrt_a_alpha = 2.0 * a.sqrt() * alpha;

        let a0 = (a + 1.0) - (a - 1.0) * cos_omega + two_sqrt_a_alpha;

        BiquadCoeffs {
            a0: (a * ((a + 1.0) + (a - 1.0) * cos_omega + two_sqrt_a_alpha)) / a0,
            a1: (-2.0 * a * ((a - 1.0) + (a + 1.0) * cos_omega)) / a0,
            a2: (a * ((a + 1.0) + (a - 1.0) * cos_omega - two_sqrt_a_alpha)) / a0,
            b1: (2.0 * ((a - 1.0) - (a + 1.0) * cos_omega)) / a0,
            b2: ((a + 1.0) - (a - 1.0) * cos_omega - two_sqrt_a_alpha) / a0,
        }
    }

    fn peaking_coeffs(&self, freq: f32, gain_db: f32, q: f32) -> BiquadCoeffs {
        let a = 10.0f32.powf(gain_db / 40.0);
        let omega = 2.0 * PI * freq / self.sample_rate;
        let sin_omega = omega.sin();
        let cos_omega = omega.cos();
        let alpha = sin_omega / (2.0 * q);

        let a0 = 1.0 + alpha / a;

        BiquadCoeffs {
            a0: (1.0 + alpha * a) / a0,
            a1: (-2.0 * cos_omega) / a0,
            a2: (1.0 - alpha * a) / a0,
            b1: (-2.0 * cos_omega) / a0,
            b2: (1.0 - alpha / a) / a0,
        }
    }

    pub fn process(&mut self, input: &[f32], output: &mut [f32]) {
        let frames = input.len() / 2;
        self.gain_db.advance(frames);
        self.frequency.advance(frames);

        if (self.gain_db.value() - self.applied_gain_db).abs() > COEFF_EPSILON
            || (self.frequency.value() - self.applied_frequency).abs() > COEFF_EPSILON
        {
            self.update_coefficients();
        }

        for (frame_in, frame_out) in input.chunks_exact(2).zip(output.chunks_exact_mut(2)) {
            frame_out[0] = self.state_l.process(frame_in[0], &self.coeffs);
            frame_out[1] = self.state_r.process(frame_in[1], &self.coeffs);
        }
    }
}
