//! Per-segment acoustic model: waveform plus its frame-level analysis.

use std::sync::Arc;

use crate::constants::FLOOR_F0_REFINED;
use crate::excitation;
use crate::f0::F0Estimator;
use crate::spectrum::Spectrogram;
use crate::vocoder::{SynthParams, Vocoder};

/// One recorded segment and the frame data derived from it.
///
/// Built in stages: the waveform comes in through [`Model::new`], then
/// `build_f0` / `build_envelope` / `build_aperiodicity` (or
/// `build_residual`) fill the analysis, and `synth` replaces the waveform
/// with the re-synthesized one. Frame operations (`trim`, `remap`) apply to
/// whichever analysis stages exist at that point.
pub struct Model {
    samples: Vec<f64>,
    fs: i32,
    frame_ms: f64,
    fft_size: usize,
    f0: Vec<f64>,
    time_axis: Vec<f64>,
    envelope: Spectrogram,
    aperiodicity: Spectrogram,
    residual: Spectrogram,
    estimator: Option<Box<dyn F0Estimator>>,
    vocoder: Arc<dyn Vocoder>,
}

impl Model {
    pub fn new(
        samples: Vec<f64>,
        fs: i32,
        frame_ms: f64,
        estimator: Box<dyn F0Estimator>,
        vocoder: Arc<dyn Vocoder>,
    ) -> Self {
        Self {
            samples,
            fs,
            frame_ms,
            fft_size: 0,
            f0: Vec::new(),
            time_axis: Vec::new(),
            envelope: Spectrogram::default(),
            aperiodicity: Spectrogram::default(),
            residual: Spectrogram::default(),
            estimator: Some(estimator),
            vocoder,
        }
    }

    /// A model assembled from already-analyzed frames, with no backing
    /// waveform until `synth` produces one.
    pub fn from_frames(
        fs: i32,
        frame_ms: f64,
        fft_size: usize,
        f0: Vec<f64>,
        envelope: Spectrogram,
        aperiodicity: Spectrogram,
        vocoder: Arc<dyn Vocoder>,
    ) -> Self {
        Self {
            samples: Vec::new(),
            fs,
            frame_ms,
            fft_size,
            f0,
            time_axis: Vec::new(),
            envelope,
            aperiodicity,
            residual: Spectrogram::default(),
            estimator: None,
            vocoder,
        }
    }

    pub fn samples(&self) -> &[f64] {
        &self.samples
    }

    pub fn samples_mut(&mut self) -> &mut [f64] {
        &mut self.samples
    }

    pub fn take_samples(&mut self) -> Vec<f64> {
        std::mem::take(&mut self.samples)
    }

    pub fn fs(&self) -> i32 {
        self.fs
    }

    pub fn frame_ms(&self) -> f64 {
        self.frame_ms
    }

    pub fn fft_size(&self) -> usize {
        self.fft_size
    }

    pub fn f0(&self) -> &[f64] {
        &self.f0
    }

    pub fn f0_mut(&mut self) -> &mut [f64] {
        &mut self.f0
    }

    pub fn time_axis(&self) -> &[f64] {
        &self.time_axis
    }

    pub fn envelope(&self) -> &Spectrogram {
        &self.envelope
    }

    pub fn envelope_mut(&mut self) -> &mut Spectrogram {
        &mut self.envelope
    }

    pub fn aperiodicity(&self) -> &Spectrogram {
        &self.aperiodicity
    }

    pub fn residual(&self) -> &Spectrogram {
        &self.residual
    }

    pub fn build_f0(&mut self) {
        let Some(estimator) = self.estimator.as_deref() else {
            return;
        };
        let (f0, time_axis) =
            estimator.estimate(&self.samples, self.fs, self.frame_ms, &*self.vocoder);
        self.f0 = f0;
        self.time_axis = time_axis;
    }

    pub fn build_envelope(&mut self) {
        self.fft_size = self.vocoder.fft_size(self.fs);
        self.envelope = self.vocoder.envelope(
            &self.samples,
            self.fs,
            &self.time_axis,
            &self.f0,
            self.fft_size,
        );
    }

    pub fn build_aperiodicity(&mut self) {
        self.aperiodicity = self.vocoder.aperiodicity(
            &self.samples,
            self.fs,
            &self.time_axis,
            &self.f0,
            self.fft_size,
        );
    }

    /// Packed per-frame excitation spectra, the alternative to
    /// `build_aperiodicity` for the pulse-synchronous backend.
    pub fn build_residual(&mut self) {
        self.residual = excitation::analyze(
            &self.samples,
            self.fs,
            &self.time_axis,
            &self.f0,
            &self.envelope,
            self.fft_size,
        );
    }

    /// Additive synthesis of the current frames; replaces the waveform.
    pub fn synth(&mut self, params: &SynthParams) {
        self.samples = self.vocoder.synthesize(
            &self.f0,
            &self.envelope,
            &self.aperiodicity,
            params,
            self.fft_size,
            self.frame_ms,
            self.fs,
        );
    }

    /// Pulse-synchronous resynthesis from the packed residual spectra.
    pub fn synth_residual(&mut self) {
        self.samples = excitation::resynthesize(
            &self.f0,
            &self.envelope,
            &self.residual,
            self.fft_size,
            self.frame_ms,
            self.fs,
        );
    }

    /// Keep frames `[start, start + length)` and the matching sample span;
    /// the time axis is re-zeroed at the new first frame.
    pub fn trim(&mut self, start: usize, length: usize) {
        let start_samples = self.ms_to_samples(self.frame_ms * start as f64);
        let length_samples = self.ms_to_samples(self.frame_ms * length as f64);
        if start_samples < self.samples.len() {
            self.samples.drain(..start_samples);
            self.samples.truncate(length_samples);
        } else {
            self.samples.clear();
        }
        let trim_vec = |vec: &mut Vec<f64>| {
            if !vec.is_empty() {
                vec.drain(..start.min(vec.len()));
                vec.truncate(length);
            }
        };
        trim_vec(&mut self.f0);
        trim_vec(&mut self.time_axis);
        if let Some(&t0) = self.time_axis.first() {
            for t in self.time_axis.iter_mut() {
                *t -= t0;
            }
        }
        for spectra in [
            &mut self.envelope,
            &mut self.aperiodicity,
            &mut self.residual,
        ] {
            if !spectra.is_empty() {
                spectra.trim(start, length);
            }
        }
    }

    /// Re-sample the frame sequences onto `mapping` (input positions in ms)
    /// by linear interpolation between neighboring frames.
    pub fn remap(&mut self, mapping: &[f64]) {
        if self.f0.is_empty() {
            return;
        }
        let last = self.f0.len() - 1;
        let use_aperiodicity = !self.aperiodicity.is_empty();
        let other = if use_aperiodicity {
            &self.aperiodicity
        } else {
            &self.residual
        };

        let mut new_f0 = Vec::with_capacity(mapping.len());
        let mut new_envelope = Spectrogram::with_capacity(mapping.len(), self.envelope.width());
        let mut new_other = Spectrogram::with_capacity(mapping.len(), other.width());
        for &p in mapping {
            let pos = p / self.frame_ms;
            let idx = pos as usize;
            let t = pos - idx as f64;
            let i0 = idx.min(last);
            let i1 = (idx + 1).min(last);
            new_f0.push(self.f0[i0] * (1.0 - t) + self.f0[i1] * t);
            new_envelope.push_lerp(&self.envelope, i0, i1, t);
            new_other.push_lerp(other, i0, i1, t);
        }
        self.f0 = new_f0;
        self.envelope = new_envelope;
        if use_aperiodicity {
            self.aperiodicity = new_other;
        } else {
            self.residual = new_other;
        }
    }

    /// Fraction of frames confidently voiced.
    pub fn voiced_ratio(&self) -> f64 {
        if self.f0.is_empty() {
            return 0.0;
        }
        let voiced = self.f0.iter().filter(|&&f| f > FLOOR_F0_REFINED).count();
        voiced as f64 / self.f0.len() as f64
    }

    pub fn ms_to_samples(&self, ms: f64) -> usize {
        (ms * self.fs as f64 / 1000.0) as usize
    }

    pub fn total_ms(&self) -> f64 {
        self.samples.len() as f64 / self.fs as f64 * 1000.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::f0::StandardEstimator;
    use crate::vocoder::stub::StubVocoder;
    use approx::assert_abs_diff_eq;

    const FS: i32 = 44100;
    const FRAME_MS: f64 = 10.0;

    fn analyzed_model() -> Model {
        let mut model = Model::new(
            vec![0.0; FS as usize],
            FS,
            FRAME_MS,
            Box::new(StandardEstimator),
            Arc::new(StubVocoder),
        );
        model.build_f0();
        model.build_envelope();
        model.build_aperiodicity();
        model
    }

    #[test]
    fn identity_remap_keeps_frames() {
        let mut model = analyzed_model();
        let f0_before = model.f0().to_vec();
        let envelope_before = model.envelope().clone();
        let mapping: Vec<f64> = (0..f0_before.len()).map(|i| i as f64 * FRAME_MS).collect();
        model.remap(&mapping);
        for (a, b) in model.f0().iter().zip(&f0_before) {
            assert_abs_diff_eq!(a, b, epsilon = 1e-12);
        }
        for (a, b) in model
            .envelope()
            .iter_frames()
            .zip(envelope_before.iter_frames())
        {
            assert_abs_diff_eq!(a[0], b[0], epsilon = 1e-12);
        }
    }

    #[test]
    fn remap_interpolates_between_frames() {
        let mut model = analyzed_model();
        let expected = (model.f0()[0] + model.f0()[1]) / 2.0;
        model.remap(&[FRAME_MS / 2.0]);
        assert_eq!(model.f0().len(), 1);
        assert_abs_diff_eq!(model.f0()[0], expected, epsilon = 1e-12);
    }

    #[test]
    fn trim_rezeroes_the_time_axis() {
        let mut model = analyzed_model();
        model.trim(10, 20);
        assert_eq!(model.f0().len(), 20);
        assert_abs_diff_eq!(model.time_axis()[0], 0.0);
        assert_abs_diff_eq!(model.time_axis()[1], FRAME_MS / 1000.0, epsilon = 1e-12);
        assert_eq!(model.samples().len(), model.ms_to_samples(20.0 * FRAME_MS));
    }

    #[test]
    fn voiced_ratio_counts_confident_frames() {
        let model = analyzed_model();
        // The stub alternates voiced and unvoiced frames; 101 frames means
        // 51 voiced.
        assert_abs_diff_eq!(model.voiced_ratio(), 51.0 / 101.0, epsilon = 1e-12);
    }
}
