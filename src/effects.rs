//! Spectral effects and output gain staging.

use crate::spectrum::Spectrogram;

/// Peak absolute amplitude of a waveform.
pub fn max_abs(samples: &[f64]) -> f64 {
    samples.iter().fold(0.0, |acc: f64, &s| acc.max(s.abs()))
}

/// Breathiness multiplier for a flag value in [-100, 100]. Negative values
/// attenuate twice as slowly as positive values amplify.
pub fn breathiness_from_flag(value: f64) -> f64 {
    if value < 0.0 {
        1.0 + value * 0.01
    } else {
        1.0 + value * 0.02
    }
}

/// Breathiness multiplier for a normalized curve value (0.5 neutral).
pub fn breathiness_from_curve(value: f64) -> f64 {
    if value > 0.5 { value * 4.0 } else { value * 2.0 }
}

/// Normalized curve value (0.5 neutral) to the flag scale [-100, 100].
pub fn curve_bias(value: f64) -> f64 {
    (value - 0.5) * 200.0
}

fn gender_weights(width: usize, ratio: f64) -> (Vec<usize>, Vec<f64>) {
    let mut indexes = vec![0usize; width];
    let mut weights = vec![0.0; width];
    for i in 0..width {
        let p = i as f64 * ratio;
        let i1 = (p.floor() as isize).clamp(0, width as isize - 1);
        let i2 = (p.ceil() as isize).clamp(0, width as isize - 1);
        if i1 == i2 {
            if i1 == 0 {
                indexes[i] = 1;
                weights[i] = 1.0;
            } else {
                indexes[i] = i1 as usize;
                weights[i] = 0.0;
            }
        } else {
            indexes[i] = i1 as usize;
            weights[i] = p - p.floor();
        }
    }
    (indexes, weights)
}

/// Warp one spectral frame along the frequency axis by `2^(value / 100)`,
/// shifting formants down for positive values and up for negative ones.
/// No-op when the ratio is 1 or the frame is too narrow to interpolate.
pub fn shift_gender_frame(frame: &mut [f64], value: f64) {
    let ratio = 2.0f64.powf(value * 0.01);
    let width = frame.len();
    if ratio == 1.0 || ratio <= 0.0 || width < 2 {
        return;
    }
    let (indexes, weights) = gender_weights(width, ratio);
    let buffer = frame.to_vec();
    for i in 0..width {
        // Source bins sit one below the computed index; at index 0 the
        // lower neighbor does not exist and the first pair is used instead.
        let lo = indexes[i].max(1) - 1;
        let t = weights[i];
        frame[i] = buffer[lo] * (1.0 - t) + buffer[lo + 1] * t;
    }
}

/// [`shift_gender_frame`] over every frame of an envelope.
pub fn shift_gender(envelope: &mut Spectrogram, value: f64) {
    for frame in envelope.iter_frames_mut() {
        shift_gender_frame(frame, value);
    }
}

/// Per-bin tension multipliers for one frame.
///
/// Builds a spline through control points spaced one harmonic apart: the
/// first two harmonics get `-1.5 * v`, harmonics below 250 Hz get
/// `4 * v` (negative v) or `2 * v` (positive v), the 250-350 Hz band is
/// left free, and everything above returns to 0. The exponentiated spline
/// is the multiplier curve. Unvoiced frames (F0 below 50 Hz) get a flat 1.
pub fn tension_coefficients(f0: f64, fs: i32, value: f64, width: usize) -> Vec<f64> {
    let mut envelope = vec![1.0; width];
    if f0 < 50.0 {
        return envelope;
    }
    let v = value * 0.01;
    let s0 = -1.5 * v;
    let s1 = if v < 0.0 { 4.0 * v } else { 2.0 * v };
    let f0_bins = f0 / (fs / 2) as f64 * width as f64;
    let mut px = Vec::new();
    let mut py = Vec::new();
    let mut x = 0;
    px.push(x as f64 * f0_bins);
    py.push(s0);
    x += 1;
    px.push(x as f64 * f0_bins);
    py.push(s0);
    x += 3;
    while (x as f64) * f0_bins < 250.0 {
        px.push(x as f64 * f0_bins);
        py.push(s1);
        x += 1;
    }
    while (x as f64) * f0_bins < 350.0 {
        x += 1;
    }
    while (x as f64) * f0_bins < width as f64 + f0_bins {
        px.push(x as f64 * f0_bins);
        py.push(0.0);
        x += 1;
    }
    let spline = CubicSpline::new(px, py);
    for (i, bin) in envelope.iter_mut().enumerate() {
        *bin = spline.eval(i as f64).exp();
    }
    envelope
}

/// Scale a synthesized waveform to a target peak, weighing the source peak
/// against the synthesized peak by the voiced ratio so mostly-unvoiced
/// segments (consonants) are not over-amplified.
pub fn auto_gain(
    samples: &mut [f64],
    src_max: f64,
    out_max: f64,
    voiced_ratio: f64,
    volume: f64,
    peak_compression: i32,
) {
    let weight = 1.0 / (1.0 + (5.0 - 10.0 * voiced_ratio).exp());
    let max = out_max * weight + src_max * (1.0 - weight);
    let gain = volume * 0.01;
    let auto = if max == 0.0 {
        1.0
    } else {
        (0.5 / max).powf(peak_compression as f64 * 0.01)
    };
    if auto * gain != 1.0 {
        for sample in samples.iter_mut() {
            *sample *= auto * gain;
        }
    }
}

/// Natural cubic spline with linear extrapolation outside the knot range.
struct CubicSpline {
    x: Vec<f64>,
    y: Vec<f64>,
    /// Second derivatives at the knots.
    m: Vec<f64>,
}

impl CubicSpline {
    fn new(x: Vec<f64>, y: Vec<f64>) -> Self {
        let n = x.len();
        let mut m = vec![0.0; n];
        if n >= 3 {
            // Thomas algorithm on the natural-spline tridiagonal system.
            let mut sub = vec![0.0; n];
            let mut diag = vec![0.0; n];
            let mut sup = vec![0.0; n];
            let mut rhs = vec![0.0; n];
            for i in 1..n - 1 {
                let h0 = x[i] - x[i - 1];
                let h1 = x[i + 1] - x[i];
                sub[i] = h0;
                diag[i] = 2.0 * (h0 + h1);
                sup[i] = h1;
                rhs[i] = 6.0 * ((y[i + 1] - y[i]) / h1 - (y[i] - y[i - 1]) / h0);
            }
            for i in 2..n - 1 {
                let w = sub[i] / diag[i - 1];
                diag[i] -= w * sup[i - 1];
                rhs[i] -= w * rhs[i - 1];
            }
            for i in (1..n - 1).rev() {
                m[i] = (rhs[i] - sup[i] * m[i + 1]) / diag[i];
            }
        }
        Self { x, y, m }
    }

    fn eval(&self, at: f64) -> f64 {
        let n = self.x.len();
        match n {
            0 => return 0.0,
            1 => return self.y[0],
            _ => {}
        }
        if at <= self.x[0] {
            let h = self.x[1] - self.x[0];
            let slope = (self.y[1] - self.y[0]) / h - h * self.m[1] / 6.0;
            return self.y[0] + slope * (at - self.x[0]);
        }
        if at >= self.x[n - 1] {
            let h = self.x[n - 1] - self.x[n - 2];
            let slope = (self.y[n - 1] - self.y[n - 2]) / h + h * self.m[n - 2] / 6.0;
            return self.y[n - 1] + slope * (at - self.x[n - 1]);
        }
        let i = match self
            .x
            .binary_search_by(|probe| probe.partial_cmp(&at).unwrap())
        {
            Ok(i) => i.min(n - 2),
            Err(i) => i - 1,
        };
        let h = self.x[i + 1] - self.x[i];
        let t = at - self.x[i];
        self.y[i]
            + t * ((self.y[i + 1] - self.y[i]) / h - h * (2.0 * self.m[i] + self.m[i + 1]) / 6.0)
            + t * t * self.m[i] / 2.0
            + t * t * t * (self.m[i + 1] - self.m[i]) / (6.0 * h)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn gender_zero_is_a_no_op() {
        let mut frame = vec![1.0, 2.0, 3.0, 4.0];
        shift_gender_frame(&mut frame, 0.0);
        assert_eq!(frame, vec![1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn gender_downshift_pulls_bins_from_above() {
        let mut frame = vec![1.0, 2.0, 3.0, 4.0];
        shift_gender_frame(&mut frame, 100.0);
        assert_eq!(frame, vec![2.0, 2.0, 3.0, 3.0]);
    }

    #[test]
    fn gender_upshift_interpolates_within_range() {
        let mut frame = vec![1.0, 2.0, 3.0, 4.0];
        shift_gender_frame(&mut frame, -100.0);
        assert_abs_diff_eq!(frame[0], 2.0);
        assert_abs_diff_eq!(frame[1], 1.5);
        assert_abs_diff_eq!(frame[2], 1.0);
        assert_abs_diff_eq!(frame[3], 1.5);
    }

    #[test]
    fn tension_is_flat_for_unvoiced_or_neutral_frames() {
        let flat = tension_coefficients(0.0, 44100, 40.0, 16);
        assert!(flat.iter().all(|&c| c == 1.0));
        let neutral = tension_coefficients(220.0, 44100, 0.0, 1025);
        for &c in &neutral {
            assert_abs_diff_eq!(c, 1.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn tension_boosts_low_harmonics_for_negative_values() {
        let coefficients = tension_coefficients(220.0, 44100, -50.0, 1025);
        // First harmonic region carries exp(-1.5 * v) with v = -0.5.
        let first = (220.0 / 22050.0 * 1025.0) as usize;
        assert!(coefficients[first] > 1.0);
        // High bins return to 1.
        assert_abs_diff_eq!(coefficients[1000], 1.0, epsilon = 0.05);
    }

    #[test]
    fn auto_gain_unity_leaves_samples_untouched() {
        let mut samples = vec![0.25, -0.5, 0.125];
        auto_gain(&mut samples, 0.5, 0.5, 1.0, 100.0, 0);
        assert_eq!(samples, vec![0.25, -0.5, 0.125]);
    }

    #[test]
    fn auto_gain_applies_volume() {
        let mut samples = vec![0.25, -0.5];
        auto_gain(&mut samples, 0.5, 0.5, 1.0, 50.0, 0);
        assert_abs_diff_eq!(samples[0], 0.125);
        assert_abs_diff_eq!(samples[1], -0.25);
    }

    #[test]
    fn auto_gain_normalizes_toward_half_scale() {
        let mut samples = vec![0.1, -0.1];
        // Fully voiced, so the synthesized peak dominates the weighting.
        auto_gain(&mut samples, 0.1, 0.1, 10.0, 100.0, 100);
        assert_abs_diff_eq!(samples[0], 0.5, epsilon = 1e-9);
    }

    #[test]
    fn spline_interpolates_knots_exactly() {
        let spline = CubicSpline::new(vec![0.0, 1.0, 2.0, 3.0], vec![0.0, 1.0, 0.0, 1.0]);
        assert_abs_diff_eq!(spline.eval(1.0), 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(spline.eval(3.0), 1.0, epsilon = 1e-12);
        // Extrapolation is linear.
        let slope = (spline.eval(4.0) - spline.eval(3.0)).abs();
        let slope2 = (spline.eval(5.0) - spline.eval(4.0)).abs();
        assert_abs_diff_eq!(slope, slope2, epsilon = 1e-12);
    }
}
