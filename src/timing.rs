//! Time-stretch mapping from output frames to input positions.
//!
//! The mapping is one input position (ms, on the un-trimmed sample's axis)
//! per output frame. The consonant part plays at a fixed rate set by the
//! consonant velocity; the vowel part stretches or compresses to fill the
//! remaining requested length, but never plays faster than recorded.

use crate::request::SynthRequest;

/// Length of the input region in ms. A negative `cut_off` is an explicit
/// region length; otherwise the region runs from `offset` to `cut_off` ms
/// before the end of the sample.
pub fn in_total_ms(total_ms: f64, request: &SynthRequest) -> f64 {
    if request.cut_off < 0.0 {
        -request.cut_off
    } else {
        total_ms - request.offset - request.cut_off
    }
}

/// Input position for every output frame, starting at `request.offset`.
pub fn get_time_mapping(total_ms: f64, frame_ms: f64, request: &SynthRequest) -> Vec<f64> {
    let consonant_speed = 0.5f64.powf(1.0 - request.con_vel / 100.0);
    let in_total = in_total_ms(total_ms, request);
    let in_consonant = request.consonant.max(1.0);
    let in_vowel = (in_total - in_consonant).max(1.0);
    let out_consonant = in_consonant / consonant_speed;
    let out_vowel = (request.required_length - out_consonant).max(0.0) + frame_ms;
    let vowel_speed = (in_vowel / out_vowel).clamp(0.0, 1.0);

    let mut mapping = Vec::new();
    let mut position = request.offset;
    let mut out_ms = 0.0;
    while out_ms <= request.required_length {
        mapping.push(position);
        if out_ms <= out_consonant {
            position += consonant_speed * frame_ms;
        } else {
            position += vowel_speed * frame_ms;
        }
        out_ms += frame_ms;
    }
    mapping
}

/// Add a constant to every entry.
pub fn shift_time_mapping(mapping: &mut [f64], delta: f64) {
    for position in mapping.iter_mut() {
        *position += delta;
    }
}

/// Prepend `n` copies of the first entry and append `n` copies of the last,
/// so remapping can interpolate safely at both output boundaries.
pub fn pad_time_mapping(mapping: &mut Vec<f64>, n: usize) {
    if mapping.is_empty() {
        return;
    }
    let first = mapping[0];
    let last = mapping[mapping.len() - 1];
    mapping.splice(0..0, std::iter::repeat_n(first, n));
    mapping.extend(std::iter::repeat_n(last, n));
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    const FRAME_MS: f64 = 5.0;
    const TOTAL_MS: f64 = 1000.0;

    fn request(con_vel: f64, cut_off: f64) -> SynthRequest {
        SynthRequest {
            con_vel,
            offset: 100.0,
            required_length: 500.0,
            consonant: 100.0,
            cut_off,
            ..SynthRequest::default()
        }
    }

    #[test]
    fn no_stretch() {
        let mapping = get_time_mapping(TOTAL_MS, FRAME_MS, &request(100.0, 100.0));
        let expected: Vec<f64> = (0..=500).step_by(5).map(|i| 100.0 + i as f64).collect();
        assert_eq!(mapping.len(), expected.len());
        for (got, want) in mapping.iter().zip(&expected) {
            assert_abs_diff_eq!(got, want, epsilon = 1e-9);
        }
    }

    #[test]
    fn vowel_stretch() {
        // cut_off -200 leaves a 100 ms vowel to cover 400 ms of output.
        let mapping = get_time_mapping(TOTAL_MS, FRAME_MS, &request(100.0, -200.0));
        assert_eq!(mapping.len(), 101);
        assert_abs_diff_eq!(mapping[0], 100.0);
        assert_abs_diff_eq!(mapping[20], 200.0, epsilon = 1e-9);
        assert!(mapping[100] > 300.0);
        assert!(mapping[100] <= 305.0);
    }

    #[test]
    fn consonant_stretch() {
        let mapping = get_time_mapping(TOTAL_MS, FRAME_MS, &request(50.0, 100.0));
        assert_eq!(mapping.len(), 101);
        assert_abs_diff_eq!(mapping[0], 100.0);
        assert!(mapping[20] > 170.0);
        assert!(mapping[20] <= 171.0);
        assert!(mapping[28] <= 200.0);
        assert!(mapping[29] > 200.0);
        assert!(mapping[98] <= 550.0);
        assert!(mapping[99] > 550.0);
    }

    #[test]
    fn consonant_compress_vowel_stretch() {
        let mapping = get_time_mapping(TOTAL_MS, FRAME_MS, &request(150.0, -200.0));
        assert_eq!(mapping.len(), 101);
        assert_abs_diff_eq!(mapping[0], 100.0);
        assert!(mapping[14] <= 200.0);
        assert!(mapping[15] > 200.0);
        assert!(mapping[100] > 300.0);
        assert!(mapping[100] <= 305.0);
    }

    #[test]
    fn pad_duplicates_both_ends() {
        let mut mapping = vec![10.0, 20.0, 30.0];
        pad_time_mapping(&mut mapping, 2);
        assert_eq!(mapping, vec![10.0, 10.0, 10.0, 20.0, 30.0, 30.0, 30.0]);
        shift_time_mapping(&mut mapping, -10.0);
        assert_eq!(mapping[0], 0.0);
        assert_eq!(mapping[6], 20.0);
    }
}
