//! Phrase pipeline: crossfade several analyzed segments on a shared frame
//! axis, apply phrase-wide expression curves, and synthesize once.

use std::sync::Arc;

use crate::constants::{FRAME_MS, PADDING, SAFE_GUARD_MINIMUM};
use crate::effects::{
    auto_gain, breathiness_from_curve, curve_bias, max_abs, shift_gender_frame,
    tension_coefficients,
};
use crate::f0::{F0Estimator, FrqEstimator, MonophonicEstimator};
use crate::frq::FrqError;
use crate::model::Model;
use crate::request::SynthRequest;
use crate::spectrum::Spectrogram;
use crate::timing::{get_time_mapping, in_total_ms, pad_time_mapping, shift_time_mapping};
use crate::vocoder::{SynthParams, Vocoder};

#[derive(Debug, thiserror::Error)]
pub enum PhraseError {
    #[error("no segments added to the phrase")]
    NoSegments,
    #[error("phrase curves not set")]
    MissingCurves,
    #[error("segment covers no frames")]
    DegenerateSegment,
    #[error(transparent)]
    Frq(#[from] FrqError),
}

/// Placement of one segment on the phrase's global frame axis.
///
/// `p0..p1` fades in, `p1..p3` holds full weight, `p3..p4` fades out.
/// `skip` drops leading frames of the segment; `left_extra` is the
/// segment's own analysis padding.
struct SegmentTiming {
    left_extra: i64,
    skip: i64,
    p0: i64,
    p1: i64,
    p3: i64,
    p4: i64,
}

pub struct PhraseSynth {
    vocoder: Arc<dyn Vocoder>,
    models: Vec<Model>,
    timings: Vec<SegmentTiming>,
    f0: Vec<f64>,
    gender: Vec<f64>,
    tension: Vec<f64>,
    breathiness: Vec<f64>,
    voicing: Vec<f64>,
}

impl PhraseSynth {
    pub fn new(vocoder: Arc<dyn Vocoder>) -> Self {
        Self {
            vocoder,
            models: Vec::new(),
            timings: Vec::new(),
            f0: Vec::new(),
            gender: Vec::new(),
            tension: Vec::new(),
            breathiness: Vec::new(),
            voicing: Vec::new(),
        }
    }

    /// Analyze and place one segment: the single-segment pipeline through
    /// remapping, but gain-staged against the segment's own trimmed peak
    /// and with the analysis padding retained for crossfading.
    pub fn add_request(
        &mut self,
        request: &SynthRequest,
        pos_ms: f64,
        skip_ms: f64,
        length_ms: f64,
        fade_in_ms: f64,
        fade_out_ms: f64,
    ) -> Result<(), PhraseError> {
        let estimator: Box<dyn F0Estimator> = if request.frq.is_empty() {
            Box::new(MonophonicEstimator)
        } else {
            Box::new(FrqEstimator::new(&request.frq)?)
        };
        let mut model = Model::new(
            request.samples.clone(),
            request.sample_fs,
            FRAME_MS,
            estimator,
            self.vocoder.clone(),
        );

        let src_max = max_abs(model.samples());
        model.build_f0();

        let mut mapping = get_time_mapping(model.total_ms(), FRAME_MS, request);

        let in_start_ms = request.offset;
        let in_length_ms = in_total_ms(model.total_ms(), request);
        let in_start_frame = (in_start_ms / FRAME_MS) as usize;
        let in_length_frame =
            (((in_start_ms + in_length_ms).ceil() / FRAME_MS) as usize).saturating_sub(in_start_frame);
        let left_trimmed = in_start_frame as f64 * FRAME_MS;

        model.trim(in_start_frame, in_length_frame);
        if model.f0().is_empty() {
            return Err(PhraseError::DegenerateSegment);
        }

        let seg_max = max_abs(model.samples());
        let voiced_ratio = model.voiced_ratio();
        auto_gain(
            model.samples_mut(),
            src_max,
            seg_max,
            voiced_ratio,
            request.volume,
            request.flag_peak_compression,
        );

        model.build_envelope();
        model.build_aperiodicity();

        shift_time_mapping(&mut mapping, -left_trimmed);
        pad_time_mapping(&mut mapping, PADDING);

        model.remap(&mapping);

        let frame = FRAME_MS;
        let mut timing = SegmentTiming {
            left_extra: PADDING as i64,
            skip: (skip_ms / frame).round() as i64,
            p0: (pos_ms / frame).round() as i64,
            p1: ((pos_ms + fade_in_ms) / frame).round() as i64,
            p3: ((pos_ms + length_ms - fade_out_ms) / frame).round() as i64,
            p4: ((pos_ms + length_ms) / frame).round() as i64,
        };
        timing.p0 = timing.p0.max(0);
        timing.p1 = timing.p1.max(timing.p0 + 1);
        timing.p3 = timing.p3.min(timing.p4 - 1);
        // A placement that ends at or before the phrase start covers nothing.
        if timing.p4 <= timing.p0 {
            return Err(PhraseError::DegenerateSegment);
        }
        self.models.push(model);
        self.timings.push(timing);
        Ok(())
    }

    /// Append phrase-wide expression curves, one entry per global frame.
    /// All curves are normalized with 0.5 neutral, except `f0` (absolute
    /// Hz) and `voicing` (1.0 neutral).
    pub fn set_curves(
        &mut self,
        f0: &[f64],
        gender: &[f64],
        tension: &[f64],
        breathiness: &[f64],
        voicing: &[f64],
    ) {
        self.f0.extend_from_slice(f0);
        self.gender.extend_from_slice(gender);
        self.tension.extend_from_slice(tension);
        self.breathiness.extend_from_slice(breathiness);
        self.voicing.extend_from_slice(voicing);
    }

    pub fn synth(&mut self) -> Result<Vec<f64>, PhraseError> {
        let Some(first) = self.models.first() else {
            return Err(PhraseError::NoSegments);
        };
        if self.f0.is_empty()
            || self.gender.is_empty()
            || self.tension.is_empty()
            || self.breathiness.is_empty()
            || self.voicing.is_empty()
        {
            return Err(PhraseError::MissingCurves);
        }
        let fs = first.fs();
        let frame_ms = first.frame_ms();
        let fft_size = first.fft_size();
        let width = first.envelope().width();

        let mut f0: Vec<f64> = Vec::new();
        let mut sp = Spectrogram::with_capacity(0, width);
        let mut ap = Spectrogram::with_capacity(0, width);
        let mut dirty: Vec<bool> = Vec::new();

        for (model, timing) in self.models.iter().zip(&self.timings) {
            let p4 = timing.p4.max(0) as usize;
            f0.resize(p4.max(f0.len()), 0.0);
            if sp.frames() < p4 {
                sp.resize(p4, SAFE_GUARD_MINIMUM);
                ap.resize(p4, 1.0);
            }
            dirty.resize(p4.max(dirty.len()), false);

            let last_frame = model.f0().len().saturating_sub(1) as i64;
            for i in timing.p0..timing.p4 {
                let mut weight = 1.0;
                if i < timing.p1 {
                    weight = (i - timing.p0) as f64 / (timing.p1 - timing.p0) as f64;
                } else if i >= timing.p3 {
                    weight = (timing.p4 - i) as f64 / (timing.p4 - timing.p3) as f64;
                }
                let model_i = timing.left_extra + timing.skip + i - timing.p0;
                if model_i < timing.left_extra {
                    continue;
                }
                let model_i = model_i.min(last_frame) as usize;
                let i = i as usize;
                if !dirty[i] || weight > 0.5 {
                    f0[i] = model.f0()[model_i];
                }
                let envelope_frame = model.envelope().frame(model_i);
                for (acc, &v) in sp.frame_mut(i).iter_mut().zip(envelope_frame) {
                    *acc += v * weight;
                }
                let (wa, wb) = if dirty[i] { (1.0 - weight, weight) } else { (0.0, 1.0) };
                let aperiodicity_frame = model.aperiodicity().frame(model_i);
                for (acc, &v) in ap.frame_mut(i).iter_mut().zip(aperiodicity_frame) {
                    *acc = *acc * wa + v * wb;
                }
                dirty[i] = true;
            }
        }

        // One guard frame past the end keeps synthesis from reading short.
        let length = f0.len() + 1;
        f0.resize(length, *f0.last().unwrap_or(&0.0));
        sp.extend_with_last(length);
        ap.extend_with_last(length);

        for curve in [
            &mut self.f0,
            &mut self.gender,
            &mut self.tension,
            &mut self.breathiness,
            &mut self.voicing,
        ] {
            let last = curve.last().copied().unwrap_or(0.0);
            curve.resize(length, last);
        }

        let mut params = SynthParams::neutral(length, width);
        for i in 0..length {
            if f0[i] > 0.0 {
                f0[i] = self.f0[i];
            }
            shift_gender_frame(sp.frame_mut(i), curve_bias(self.gender[i]));
            params.breathiness[i] = breathiness_from_curve(self.breathiness[i]);
            let coefficients =
                tension_coefficients(self.f0[i], fs, curve_bias(self.tension[i]), width);
            params.tension.frame_mut(i).copy_from_slice(&coefficients);
            params.voicing[i] = self.voicing[i];
        }

        let mut final_model =
            Model::from_frames(fs, frame_ms, fft_size, f0, sp, ap, self.vocoder.clone());
        final_model.synth(&params);
        let mut samples = final_model.take_samples();

        // 10 ms fade out to ease the abrupt ending.
        let fade_out_samples = (fs as f64 * 10.0 / 1000.0) as usize;
        let total = samples.len();
        for i in 0..fade_out_samples.min(total) {
            samples[total - 1 - i] *= i as f64 / fade_out_samples as f64;
        }
        Ok(samples)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frq::{FrqData, FrqFrame};
    use crate::resampler::Resampler;
    use crate::vocoder::stub::StubVocoder;
    use approx::assert_abs_diff_eq;

    const FS: i32 = 44100;

    fn flat_frq(f0: f64, frames: usize) -> Vec<u8> {
        FrqData {
            hop_size: 441,
            average_f0: f0,
            frames: vec![
                FrqFrame {
                    f0,
                    amplitude: 1.0
                };
                frames
            ],
        }
        .serialize()
    }

    fn request() -> SynthRequest {
        SynthRequest {
            samples: vec![0.01; FS as usize],
            frq: flat_frq(300.0, 1000),
            tone: 69,
            offset: 100.0,
            required_length: 500.0,
            consonant: 100.0,
            cut_off: 100.0,
            flag_peak_compression: 0,
            ..SynthRequest::default()
        }
    }

    fn neutral_curves(synth: &mut PhraseSynth, frames: usize) {
        synth.set_curves(
            &vec![440.0; frames],
            &vec![0.5; frames],
            &vec![0.5; frames],
            &vec![0.5; frames],
            &vec![1.0; frames],
        );
    }

    #[test]
    fn empty_phrase_is_an_error() {
        let mut synth = PhraseSynth::new(Arc::new(StubVocoder));
        assert!(matches!(synth.synth(), Err(PhraseError::NoSegments)));
    }

    #[test]
    fn missing_curves_are_an_error() {
        let mut synth = PhraseSynth::new(Arc::new(StubVocoder));
        synth
            .add_request(&request(), 0.0, 0.0, 500.0, 0.0, 0.0)
            .unwrap();
        assert!(matches!(synth.synth(), Err(PhraseError::MissingCurves)));
    }

    #[test]
    fn single_segment_phrase_matches_the_resampler() {
        // With neutral curves and a neutral request, the phrase pipeline
        // reduces to the single-segment pipeline up to its crossfade ramp
        // at the very start and the fade-out at the very end.
        let mut phrase = PhraseSynth::new(Arc::new(StubVocoder));
        phrase
            .add_request(&request(), 0.0, 0.0, 500.0, 0.0, 0.0)
            .unwrap();
        neutral_curves(&mut phrase, 51);
        let phrase_samples = phrase.synth().unwrap();

        let mut resampler = Resampler::new(request(), Arc::new(StubVocoder)).unwrap();
        let resampled = resampler.resample();

        assert_eq!(resampled.len(), 22050);
        assert!(phrase_samples.len() >= resampled.len());

        let frame_samples = 441;
        let compare_until = resampled.len() - frame_samples;
        for s in frame_samples..compare_until {
            assert_abs_diff_eq!(phrase_samples[s], resampled[s], epsilon = 1e-6);
        }
    }

    #[test]
    fn zero_length_region_is_a_degenerate_segment() {
        let mut phrase = PhraseSynth::new(Arc::new(StubVocoder));
        let mut request = request();
        // offset 100 and cut_off 900 on a 1000 ms sample leave no frames.
        request.cut_off = 900.0;
        let result = phrase.add_request(&request, 0.0, 0.0, 500.0, 0.0, 0.0);
        assert!(matches!(result, Err(PhraseError::DegenerateSegment)));
    }

    #[test]
    fn segment_ending_before_the_phrase_is_degenerate() {
        let mut phrase = PhraseSynth::new(Arc::new(StubVocoder));
        let result = phrase.add_request(&request(), -500.0, 0.0, 300.0, 0.0, 0.0);
        assert!(matches!(result, Err(PhraseError::DegenerateSegment)));
        // The rejected segment leaves the phrase usable.
        phrase
            .add_request(&request(), 0.0, 0.0, 500.0, 0.0, 0.0)
            .unwrap();
        neutral_curves(&mut phrase, 51);
        assert!(phrase.synth().is_ok());
    }

    #[test]
    fn crossfade_weights_blend_two_segments() {
        let mut phrase = PhraseSynth::new(Arc::new(StubVocoder));
        phrase
            .add_request(&request(), 0.0, 0.0, 300.0, 0.0, 100.0)
            .unwrap();
        phrase
            .add_request(&request(), 200.0, 0.0, 300.0, 100.0, 0.0)
            .unwrap();
        neutral_curves(&mut phrase, 51);
        let samples = phrase.synth().unwrap();
        assert_eq!(samples.len(), 22051);
        assert!(samples.iter().all(|s| s.is_finite()));
        // Fade-out zeroes the final sample.
        assert_eq!(samples[22050], 0.0);
    }
}
