//! Minimum-phase reconstruction of a power envelope via the real cepstrum.

use std::sync::Arc;

use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};

use crate::constants::SAFE_GUARD_MINIMUM;

pub struct MinimumPhase {
    fft_size: usize,
    forward: Arc<dyn Fft<f64>>,
    inverse: Arc<dyn Fft<f64>>,
}

impl MinimumPhase {
    pub fn new(fft_size: usize) -> Self {
        let mut planner = FftPlanner::new();
        Self {
            fft_size,
            forward: planner.plan_fft_forward(fft_size),
            inverse: planner.plan_fft_inverse(fft_size),
        }
    }

    pub fn fft_size(&self) -> usize {
        self.fft_size
    }

    /// Minimum-phase spectrum, bins `0..=fft_size/2`, for one power-envelope
    /// frame of `fft_size/2 + 1` bins.
    ///
    /// The log magnitude is mirrored to a full spectrum, transformed to the
    /// cepstrum, folded onto its causal half and exponentiated back.
    pub fn spectrum(&self, envelope: &[f64]) -> Vec<Complex<f64>> {
        let n = self.fft_size;
        let mut buffer: Vec<Complex<f64>> = (0..n)
            .map(|i| {
                let bin = if i <= n / 2 { i } else { n - i };
                Complex::new(envelope[bin].max(SAFE_GUARD_MINIMUM).ln() / 2.0, 0.0)
            })
            .collect();
        self.inverse.process(&mut buffer);
        let scale = 1.0 / n as f64;
        buffer[0] *= scale;
        for c in buffer[1..n / 2].iter_mut() {
            *c *= 2.0 * scale;
        }
        buffer[n / 2] *= scale;
        for c in buffer[n / 2 + 1..].iter_mut() {
            *c = Complex::new(0.0, 0.0);
        }
        self.forward.process(&mut buffer);
        buffer.truncate(n / 2 + 1);
        for c in buffer.iter_mut() {
            *c = c.exp();
        }
        buffer
    }
}

#[cfg(test)]
mod tests {
    use super::MinimumPhase;
    use approx::assert_abs_diff_eq;

    #[test]
    fn flat_envelope_gives_flat_real_spectrum() {
        let minimum_phase = MinimumPhase::new(64);
        let envelope = vec![4.0; 33];
        let spectrum = minimum_phase.spectrum(&envelope);
        assert_eq!(spectrum.len(), 33);
        for c in &spectrum {
            // The square root of the power envelope, with no phase.
            assert_abs_diff_eq!(c.re, 2.0, epsilon = 1e-9);
            assert_abs_diff_eq!(c.im, 0.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn magnitude_matches_the_envelope() {
        let minimum_phase = MinimumPhase::new(64);
        let envelope: Vec<f64> = (0..33).map(|i| 1.0 + 0.05 * i as f64).collect();
        let spectrum = minimum_phase.spectrum(&envelope);
        for (c, &e) in spectrum.iter().zip(&envelope) {
            assert_abs_diff_eq!(c.norm(), e.sqrt(), epsilon = 1e-6);
        }
    }
}
