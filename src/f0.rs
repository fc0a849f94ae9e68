//! Fundamental-frequency estimation strategies.
//!
//! Five interchangeable estimators behind one contract: the raw trackers of
//! the external library (standard with refinement, high-accuracy,
//! monophonic) plus two wrappers of our own: a supersampled variant that
//! tracks at a fifth of the frame period and averages voiced sub-frames, and
//! a file-based estimator reading a pre-computed pitch curve.

use crate::constants::FLOOR_F0_REFINED;
use crate::frq::{FrqData, FrqError};
use crate::vocoder::{PitchTracker, Vocoder};

/// Number of analysis frames a tracker produces for a sample buffer.
pub fn frame_count(samples: usize, fs: i32, frame_ms: f64) -> usize {
    (samples as f64 / fs as f64 * 1000.0 / frame_ms) as usize + 1
}

fn frame_time_axis(frames: usize, frame_ms: f64) -> Vec<f64> {
    (0..frames).map(|i| i as f64 * frame_ms / 1000.0).collect()
}

/// One F0 estimation strategy. Pure and deterministic; returns the contour
/// (Hz, 0 marks unvoiced) and its time axis (seconds).
pub trait F0Estimator: Send + Sync {
    fn estimate(
        &self,
        samples: &[f64],
        fs: i32,
        frame_ms: f64,
        vocoder: &dyn Vocoder,
    ) -> (Vec<f64>, Vec<f64>);
}

/// Standard tracker followed by the library's stabilization pass.
pub struct StandardEstimator;

impl F0Estimator for StandardEstimator {
    fn estimate(
        &self,
        samples: &[f64],
        fs: i32,
        frame_ms: f64,
        vocoder: &dyn Vocoder,
    ) -> (Vec<f64>, Vec<f64>) {
        let track = vocoder.track_pitch(PitchTracker::Standard, samples, fs, frame_ms);
        let refined = vocoder.refine_pitch(samples, fs, &track.time_axis, &track.f0);
        (refined, track.time_axis)
    }
}

/// Runs [`StandardEstimator`] at a fifth of the requested frame period and
/// averages the voiced sub-frame values per output frame. Trades cost for
/// less frame-to-frame jitter.
pub struct SupersampledEstimator;

const SUPERSAMPLING: usize = 5;

impl F0Estimator for SupersampledEstimator {
    fn estimate(
        &self,
        samples: &[f64],
        fs: i32,
        frame_ms: f64,
        vocoder: &dyn Vocoder,
    ) -> (Vec<f64>, Vec<f64>) {
        let (sub_f0, _) = StandardEstimator.estimate(
            samples,
            fs,
            frame_ms / SUPERSAMPLING as f64,
            vocoder,
        );
        let frames = frame_count(samples.len(), fs, frame_ms);
        let mut f0 = Vec::with_capacity(frames);
        for i in 0..frames {
            let start = (i * SUPERSAMPLING).min(sub_f0.len());
            let end = (start + SUPERSAMPLING).min(sub_f0.len());
            let voiced: Vec<f64> = sub_f0[start..end]
                .iter()
                .copied()
                .filter(|&f| f > FLOOR_F0_REFINED)
                .collect();
            if voiced.is_empty() {
                f0.push(0.0);
            } else {
                f0.push(voiced.iter().sum::<f64>() / voiced.len() as f64);
            }
        }
        (f0, frame_time_axis(frames, frame_ms))
    }
}

/// High-accuracy tracker, no refinement pass.
pub struct HighAccuracyEstimator;

impl F0Estimator for HighAccuracyEstimator {
    fn estimate(
        &self,
        samples: &[f64],
        fs: i32,
        frame_ms: f64,
        vocoder: &dyn Vocoder,
    ) -> (Vec<f64>, Vec<f64>) {
        let track = vocoder.track_pitch(PitchTracker::HighAccuracy, samples, fs, frame_ms);
        (track.f0, track.time_axis)
    }
}

/// Monophonic-singing tracker. Its raw frames run half a hop late relative
/// to the other trackers, so the first frame is dropped to realign.
pub struct MonophonicEstimator;

impl F0Estimator for MonophonicEstimator {
    fn estimate(
        &self,
        samples: &[f64],
        fs: i32,
        frame_ms: f64,
        vocoder: &dyn Vocoder,
    ) -> (Vec<f64>, Vec<f64>) {
        let track = vocoder.track_pitch(PitchTracker::Monophonic, samples, fs, frame_ms);
        if track.f0.is_empty() {
            return (track.f0, track.time_axis);
        }
        let f0: Vec<f64> = track.f0[1..].to_vec();
        let time_axis: Vec<f64> = track.time_axis[..f0.len()].to_vec();
        (f0, time_axis)
    }
}

/// Estimator backed by a pre-computed pitch curve ([`FrqData`]), resampling
/// the curve's hop spacing onto the requested frame period.
pub struct FrqEstimator {
    data: FrqData,
}

impl FrqEstimator {
    pub fn new(bytes: &[u8]) -> Result<Self, FrqError> {
        let data = FrqData::parse(bytes)?;
        if data.hop_size <= 0 {
            eprintln!(
                "pitch curve declares hop size {}; treating as 1",
                data.hop_size
            );
        }
        Ok(Self { data })
    }

    pub fn from_data(data: FrqData) -> Self {
        Self { data }
    }
}

impl F0Estimator for FrqEstimator {
    fn estimate(
        &self,
        samples: &[f64],
        fs: i32,
        frame_ms: f64,
        _vocoder: &dyn Vocoder,
    ) -> (Vec<f64>, Vec<f64>) {
        let frames = frame_count(samples.len(), fs, frame_ms);
        let hop = self.data.hop_size.max(1) as f64;
        let samples_per_frame = fs as f64 * frame_ms / 1000.0;
        let mut f0 = Vec::with_capacity(frames);
        for i in 0..frames {
            let start = (i as f64 * samples_per_frame / hop) as usize;
            let end = ((i + 1) as f64 * samples_per_frame / hop) as usize;
            let start = start.min(self.data.frames.len());
            let end = end.min(self.data.frames.len());
            if end <= start {
                f0.push(0.0);
            } else {
                let sum: f64 = self.data.frames[start..end].iter().map(|f| f.f0).sum();
                f0.push(sum / (end - start) as f64);
            }
        }
        (f0, frame_time_axis(frames, frame_ms))
    }
}

/// Strategy selector for the flat entry point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum F0Method {
    Standard,
    Supersampled,
    HighAccuracy,
    Monophonic,
}

impl F0Method {
    pub fn estimator(self) -> Box<dyn F0Estimator> {
        match self {
            F0Method::Standard => Box::new(StandardEstimator),
            F0Method::Supersampled => Box::new(SupersampledEstimator),
            F0Method::HighAccuracy => Box::new(HighAccuracyEstimator),
            F0Method::Monophonic => Box::new(MonophonicEstimator),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frq::FrqFrame;
    use crate::vocoder::stub::StubVocoder;

    const FS: i32 = 44100;
    const FRAME_MS: f64 = 10.0;

    fn second_of_samples() -> Vec<f64> {
        vec![0.0; FS as usize]
    }

    #[test]
    fn standard_refines_voiced_frames_only() {
        let samples = second_of_samples();
        let (f0, ts) = StandardEstimator.estimate(&samples, FS, FRAME_MS, &StubVocoder);
        assert_eq!(f0.len(), 101);
        assert_eq!(f0.len(), ts.len());
        assert_eq!(f0[0], 221.0);
        assert_eq!(f0[1], 0.0);
    }

    #[test]
    fn supersampled_averages_voiced_subframes() {
        let samples = second_of_samples();
        let (f0, _) = SupersampledEstimator.estimate(&samples, FS, FRAME_MS, &StubVocoder);
        assert_eq!(f0.len(), 101);
        // The sub-track alternates 221/0; averaging voiced-only keeps 221.
        // An unweighted mean over all sub-frames would give ~132.6.
        for &f in &f0 {
            assert_eq!(f, 221.0);
        }
    }

    #[test]
    fn monophonic_drops_the_first_raw_frame() {
        let samples = second_of_samples();
        let (f0, ts) = MonophonicEstimator.estimate(&samples, FS, FRAME_MS, &StubVocoder);
        assert_eq!(f0.len(), 100);
        assert_eq!(f0[0], 201.0);
        assert_eq!(ts[0], 0.0);
    }

    #[test]
    fn frq_estimator_averages_hop_ranges() {
        // 441 samples per frame at 44100 Hz / 10 ms; hop 220 gives two
        // curve samples per output frame.
        let data = FrqData {
            hop_size: 220,
            average_f0: 200.0,
            frames: (0..10)
                .map(|i| FrqFrame {
                    f0: 100.0 + i as f64,
                    amplitude: 1.0,
                })
                .collect(),
        };
        let estimator = FrqEstimator::from_data(data);
        let samples = second_of_samples();
        let (f0, _) = estimator.estimate(&samples, FS, FRAME_MS, &StubVocoder);
        assert_eq!(f0.len(), 101);
        assert_eq!(f0[0], 100.5);
        assert_eq!(f0[1], 102.5);
        // Ranges past the end of the curve are empty.
        assert_eq!(f0[50], 0.0);
    }
}
