//! Pulse-synchronous excitation backend.
//!
//! Instead of the additive synthesis primitive, this pipeline keeps an
//! explicit per-frame excitation spectrum: the windowed waveform around
//! each frame's nearest glottal pulse, deconvolved by the minimum-phase
//! reconstruction of the frame's envelope. Resynthesis re-convolves and
//! overlap-adds one impulse response per output pulse.
//!
//! Residual rows are packed real spectra of `fft_size` values:
//! `[dc, re1, im1, re2, im2, ..., nyquist]`.

mod minimum_phase;
mod pulses;

pub use minimum_phase::MinimumPhase;

use std::f64::consts::PI;

use rustfft::FftPlanner;
use rustfft::num_complex::Complex;

use crate::constants::{DEFAULT_F0, FLOOR_F0, SAFE_GUARD_MINIMUM};
use crate::spectrum::Spectrogram;
use crate::vocoder::output_length;

/// Per-frame excitation spectra for an analyzed segment.
pub fn analyze(
    samples: &[f64],
    fs: i32,
    time_axis: &[f64],
    f0: &[f64],
    envelope: &Spectrogram,
    fft_size: usize,
) -> Spectrogram {
    let mut residual = Spectrogram::new(f0.len(), fft_size, SAFE_GUARD_MINIMUM);
    if f0.len() < 2 || time_axis.len() < 2 || samples.len() < 2 || envelope.is_empty() {
        return residual;
    }
    let frame_period = time_axis[1] - time_axis[0];
    let pulse_locations = pulses::analysis_pulses(samples, fs, f0, time_axis, frame_period);

    let minimum_phase = MinimumPhase::new(fft_size);
    let mut planner = FftPlanner::new();
    let forward = planner.plan_fft_forward(fft_size);

    let mut buffer = vec![Complex::new(0.0, 0.0); fft_size];
    for i in 0..f0.len() {
        let current_f0 = if f0[i] <= FLOOR_F0 { DEFAULT_F0 } else { f0[i] };
        let phase_spectrum = minimum_phase.spectrum(envelope.frame(i));

        let current_time = i as f64 * frame_period;
        let pulse_index = nearest_pulse_index(&pulse_locations, current_time, fs);

        // Window two periods of waveform around the pulse.
        let t0 = fs as f64 / current_f0;
        let window_length = ((t0 * 2.0).round() as usize).min(fft_size);
        let offset = pulse_index - t0.round() as i64;
        buffer.fill(Complex::new(0.0, 0.0));
        for (j, slot) in buffer[..window_length].iter_mut().enumerate() {
            let src = (j as i64 + offset).clamp(0, samples.len() as i64 - 1) as usize;
            let window =
                0.5 - 0.5 * (2.0 * PI * (j as f64 + 1.0) / (window_length as f64 + 1.0)).cos();
            *slot = Complex::new(samples[src] * window, 0.0);
        }
        forward.process(&mut buffer);

        // Deconvolve: the packed quotient spectrum is the residual.
        let row = residual.frame_mut(i);
        row[0] = buffer[0].re / phase_spectrum[0].re;
        for k in 1..fft_size / 2 {
            let quotient = buffer[k] / phase_spectrum[k];
            row[2 * k - 1] = quotient.re;
            row[2 * k] = quotient.im;
        }
        row[fft_size - 1] = buffer[fft_size / 2].re / phase_spectrum[fft_size / 2].re;
    }
    residual
}

/// Waveform from F0, envelope and packed residual spectra: one
/// minimum-phase-convolved impulse response per output pulse, overlap-added.
pub fn resynthesize(
    f0: &[f64],
    envelope: &Spectrogram,
    residual: &Spectrogram,
    fft_size: usize,
    frame_ms: f64,
    fs: i32,
) -> Vec<f64> {
    let y_len = output_length(f0.len(), frame_ms, fs);
    let mut y = vec![0.0; y_len];
    if f0.len() < 2 || envelope.is_empty() || residual.is_empty() {
        return y;
    }
    let frame_period = frame_ms / 1000.0;
    let pulse_locations = pulses::target_pulses(f0, frame_period, fs, y_len);

    let minimum_phase = MinimumPhase::new(fft_size);
    let mut planner = FftPlanner::new();
    let inverse = planner.plan_fft_inverse(fft_size);

    let mut spectrum = vec![Complex::new(0.0, 0.0); fft_size];
    for &location in &pulse_locations {
        let pulse_index = (location * fs as f64).round() as usize;
        let frame = ((location / frame_period) as usize).min(f0.len() - 1);

        let phase_spectrum = minimum_phase.spectrum(envelope.frame(frame));
        let row = residual.frame(frame);
        spectrum[0] = Complex::new(phase_spectrum[0].re * row[0], 0.0);
        for k in 1..fft_size / 2 {
            spectrum[k] = phase_spectrum[k] * Complex::new(row[2 * k - 1], row[2 * k]);
        }
        spectrum[fft_size / 2] =
            Complex::new(phase_spectrum[fft_size / 2].re * row[fft_size - 1], 0.0);
        for k in fft_size / 2 + 1..fft_size {
            spectrum[k] = spectrum[fft_size - k].conj();
        }
        inverse.process(&mut spectrum);

        let end = (pulse_index + fft_size / 2).min(y_len.saturating_sub(1));
        for j in pulse_index..end {
            y[j] += spectrum[j - pulse_index].re / fft_size as f64;
        }
    }
    y
}

fn nearest_pulse_index(pulse_locations: &[f64], current_time: f64, fs: i32) -> i64 {
    pulse_locations
        .iter()
        .copied()
        .min_by(|a, b| {
            (a - current_time)
                .abs()
                .partial_cmp(&(b - current_time).abs())
                .unwrap()
        })
        .map(|location| (location * fs as f64).round() as i64)
        .unwrap_or(0)
}
