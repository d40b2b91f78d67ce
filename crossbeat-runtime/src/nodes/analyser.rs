//! Analysis tap - time-domain and spectral snapshots of the signal
//!
//! A pass-through node that keeps the most recent analysis window of the
//! (mono-downmixed) signal in a ring buffer. Time-domain snapshots are byte
//! samples centered on 128; spectral snapshots are Blackman-windowed FFT
//! magnitudes, smoothed against the previous frame and mapped from
//! [-100dB, -30dB] to the byte range. The time-domain path never
//! allocates; the FFT scratch is allocated once at construction.

use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};
use std::f32::consts::PI;
use std::sync::Arc;

/// Analysis window size in samples (one FFT frame)
pub const ANALYSIS_WINDOW: usize = 2048;

/// Number of snapshot bins (half the window)
pub const BIN_COUNT: usize = ANALYSIS_WINDOW / 2;

/// Smoothing applied between successive spectral frames
const SPECTRUM_SMOOTHING: f32 = 0.8;

/// Decibel range mapped onto the byte snapshot
const MIN_DB: f32 = -100.0;
const MAX_DB: f32 = -30.0;

/// Metering tap node
pub struct AnalyserNode {
    /// Ring of the last ANALYSIS_WINDOW mono samples
    ring: Box<[f32; ANALYSIS_WINDOW]>,
    write_pos: usize,

    fft: Arc<dyn Fft<f32>>,
    window: Vec<f32>,
    fft_buffer: Vec<Complex<f32>>,
    smoothed_magnitudes: Vec<f32>,
}

impl AnalyserNode {
    pub fn new() -> Self {
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(ANALYSIS_WINDOW);

        // Blackman window
        let window: Vec<f32> = (0..ANALYSIS_WINDOW)
            .map(|i| {
                let x = 2.0 * PI * i as f32 / ANALYSIS_WINDOW as f32;
                0.42 - 0.5 * x.cos() + 0.08 * (2.0 * x).cos()
            })
            .collect();

        Self {
            ring: Box::new([0.0; ANALYSIS_WINDOW]),
            write_pos: 0,
            fft,
            window,
            fft_buffer: vec![Complex::new(0.0, 0.0); ANALYSIS_WINDOW],
            smoothed_magnitudes: vec![0.0; BIN_COUNT],
        }
    }

    /// Pass the signal through while feeding the analysis ring
    pub fn process(&mut self, input: &[f32], output: &mut [f32]) {
        output.copy_from_slice(input);

        for frame in input.chunks_exact(2) {
            self.ring[self.write_pos] = (frame[0] + frame[1]) * 0.5;
            self.write_pos = (self.write_pos + 1) % ANALYSIS_WINDOW;
        }
    }

    /// Copy the most recent samples into `out` as unsigned bytes, oldest
    /// first. Silence maps to exactly 128.
    pub fn time_domain_bytes(&self, out: &mut [u8]) {
        let n = out.len().min(ANALYSIS_WINDOW);
        // Oldest of the last n samples sits n steps behind the write head
        let start = (self.write_pos + ANALYSIS_WINDOW - n) % ANALYSIS_WINDOW;
        for (i, slot) in out.iter_mut().take(n).enumerate() {
            let sample = self.ring[(start + i) % ANALYSIS_WINDOW];
            let byte = (128.0 * (1.0 + sample)).floor();
            *slot = byte.clamp(0.0, 255.0) as u8;
        }
    }

    /// Spectral snapshot: smoothed magnitudes of the current window, mapped
    /// onto bytes. `out` is filled up to BIN_COUNT entries.
    pub fn frequency_bytes(&mut self, out: &mut [u8]) {
        // Window the ring chronologically into the FFT buffer
        let start = self.write_pos; // oldest sample
        for i in 0..ANALYSIS_WINDOW {
            let sample = self.ring[(start + i) % ANALYSIS_WINDOW];
            self.fft_buffer[i] = Complex::new(sample * self.window[i], 0.0);
        }

        self.fft.process(&mut self.fft_buffer);

        let n = out.len().min(BIN_COUNT);
        let scale = 1.0 / ANALYSIS_WINDOW as f32;
        for (k, slot) in out.iter_mut().take(n).enumerate() {
            let magnitude = self.fft_buffer[k].norm() * scale;
            let smoothed = SPECTRUM_SMOOTHING * self.smoothed_magnitudes[k]
                + (1.0 - SPECTRUM_SMOOTHING) * magnitude;
            self.smoothed_magnitudes[k] = smoothed;

            let db = if smoothed > 1e-10 {
                20.0 * smoothed.log10()
            } else {
                MIN_DB
            };
            let normalized = (db - MIN_DB) / (MAX_DB - MIN_DB);
            *slot = (normalized.clamp(0.0, 1.0) * 255.0) as u8;
        }
    }
}

impl Default for AnalyserNode {
    fn default() -> Self {
        Self::new()
    }
}
