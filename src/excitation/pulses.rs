//! Glottal-pulse placement from an F0 contour.
//!
//! Both directions of the excitation pipeline need per-sample pulse
//! positions: analysis marks them on the recorded waveform, resynthesis on
//! the output time base. A pulse sits wherever the wrapped phase of the
//! accumulated contour jumps by more than pi between adjacent samples.

use std::f64::consts::PI;

use crate::constants::DEFAULT_F0;

/// Linear interpolation of `ys` over knots `xs` onto the sample grid
/// `0, 1/fs, 2/fs, ...`, clamped at both ends. `xs` must be increasing and
/// hold at least two knots.
fn interpolate_onto_samples(xs: &[f64], ys: &[f64], count: usize, fs: i32) -> Vec<f64> {
    let mut out = Vec::with_capacity(count);
    let mut seg = 0usize;
    for i in 0..count {
        let t = i as f64 / fs as f64;
        while seg + 2 < xs.len() && xs[seg + 1] <= t {
            seg += 1;
        }
        let u = ((t - xs[seg]) / (xs[seg + 1] - xs[seg])).clamp(0.0, 1.0);
        out.push(ys[seg] * (1.0 - u) + ys[seg + 1] * u);
    }
    out
}

/// Like [`interpolate_onto_samples`] for knots at `0, spacing, 2*spacing, ...`.
fn interpolate_uniform(ys: &[f64], spacing: f64, count: usize, fs: i32) -> Vec<f64> {
    let mut out = Vec::with_capacity(count);
    for i in 0..count {
        let pos = i as f64 / fs as f64 / spacing;
        let idx = (pos as usize).min(ys.len() - 2);
        let u = (pos - idx as f64).clamp(0.0, 1.0);
        out.push(ys[idx] * (1.0 - u) + ys[idx + 1] * u);
    }
    out
}

/// Accumulated phase, one entry per sample, of a per-sample F0 contour.
fn cumulative_phase(contour: &[f64], fs: i32) -> Vec<f64> {
    let mut phase = Vec::with_capacity(contour.len());
    let mut acc = 0.0;
    for &f in contour {
        acc += 2.0 * PI * f / fs as f64;
        phase.push(acc);
    }
    phase
}

/// Frame-index runs of constant voicing state.
fn contour_runs(f0: &[f64]) -> Vec<(usize, usize)> {
    let mut runs = Vec::new();
    if f0.is_empty() {
        return runs;
    }
    let mut start = 0;
    for i in 1..f0.len() {
        if (f0[i] == 0.0) != (f0[i - 1] == 0.0) {
            runs.push((start, i - 1));
            start = i;
        }
    }
    runs.push((start, f0.len() - 1));
    runs
}

/// Sample of maximum absolute amplitude within one period of a run's center
/// frame; the phase reference for pulse marking in that run.
fn wedge_index(
    samples: &[f64],
    fs: i32,
    f0: &[f64],
    frame_period: f64,
    start: usize,
    end: usize,
) -> usize {
    let center_time = (start + end + 1) / 2;
    let center_f0 = if f0[center_time] == 0.0 {
        DEFAULT_F0
    } else {
        f0[center_time]
    };
    let t0 = (fs as f64 / center_f0).round() as i64;
    let center_index = ((1 + center_time) as f64 * frame_period * fs as f64).round() as i64;
    let mut wedge = 0usize;
    let mut peak = 0.0;
    for j in 0..(2 * t0 + 1) {
        let index = (center_index - t0 + j).clamp(0, samples.len() as i64 - 1) as usize;
        if samples[index].abs() > peak {
            peak = samples[index].abs();
            wedge = index;
        }
    }
    wedge
}

/// Pulse locations (seconds) on the recorded waveform. Requires at least
/// two frames and two samples.
pub(crate) fn analysis_pulses(
    samples: &[f64],
    fs: i32,
    f0: &[f64],
    time_axis: &[f64],
    frame_period: f64,
) -> Vec<f64> {
    let fixed: Vec<f64> = f0
        .iter()
        .map(|&f| if f == 0.0 { DEFAULT_F0 } else { f })
        .collect();
    let contour = interpolate_onto_samples(time_axis, &fixed, samples.len(), fs);
    let total_phase = cumulative_phase(&contour, fs);

    let mut pulses = Vec::new();
    for (start, end) in contour_runs(f0) {
        let wedge = wedge_index(samples, fs, f0, frame_period, start, end);
        let lo = ((fs as f64 * start as f64 * frame_period).round() as i64).max(0) as usize;
        let hi = ((fs as f64 * (end as f64 + 1.0) * frame_period).round() as i64)
            .min(samples.len() as i64 - 1) as usize;
        // Re-reference phase zero to the wedge sample.
        let reference = total_phase[wedge];
        let offset = reference - 2.0 * PI * (total_phase[0] - reference / (2.0 * PI)).floor();
        for i in lo..hi {
            let a = (total_phase[i + 1] - offset).rem_euclid(2.0 * PI);
            let b = (total_phase[i] - offset).rem_euclid(2.0 * PI);
            if (a - b).abs() > PI {
                pulses.push(i as f64 / fs as f64);
            }
        }
    }
    pulses
}

/// Pulse locations (seconds) on the output time base of `y_len` samples.
/// The contour gets one extrapolated guard frame, is interpolated per
/// sample, and unvoiced stretches run at the stand-in F0 so phase keeps
/// accumulating. Requires at least two frames.
pub(crate) fn target_pulses(f0: &[f64], frame_period: f64, fs: i32, y_len: usize) -> Vec<f64> {
    let n = f0.len();
    let mut coarse_f0 = f0.to_vec();
    coarse_f0.push(2.0 * f0[n - 1] - f0[n - 2]);
    let mut coarse_vuv: Vec<f64> = f0
        .iter()
        .map(|&f| if f == 0.0 { 0.0 } else { 1.0 })
        .collect();
    coarse_vuv.push(2.0 * coarse_vuv[n - 1] - coarse_vuv[n - 2]);

    let f0_per_sample = interpolate_uniform(&coarse_f0, frame_period, y_len, fs);
    let vuv_per_sample = interpolate_uniform(&coarse_vuv, frame_period, y_len, fs);
    let contour: Vec<f64> = f0_per_sample
        .iter()
        .zip(&vuv_per_sample)
        .map(|(&f, &v)| if v > 0.5 { f } else { DEFAULT_F0 })
        .collect();
    let total_phase = cumulative_phase(&contour, fs);

    let mut pulses = Vec::new();
    for i in 0..y_len.saturating_sub(1) {
        let a = total_phase[i + 1].rem_euclid(2.0 * PI);
        let b = total_phase[i].rem_euclid(2.0 * PI);
        if (a - b).abs() > PI {
            pulses.push(i as f64 / fs as f64);
        }
    }
    pulses
}
