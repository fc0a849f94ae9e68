//! Single-segment pipeline: stretch, re-pitch and re-synthesize one
//! recorded segment to a synthesis request.

use std::sync::Arc;

use crate::constants::{FLOOR_F0, FRAME_MS, PADDING, SEMITONE_RATIO};
use crate::effects::{
    auto_gain, breathiness_from_flag, max_abs, shift_gender, tension_coefficients,
};
use crate::f0::{F0Estimator, FrqEstimator, MonophonicEstimator};
use crate::frq::FrqError;
use crate::model::Model;
use crate::request::SynthRequest;
use crate::timing::{get_time_mapping, in_total_ms, pad_time_mapping, shift_time_mapping};
use crate::vocoder::{SynthParams, Vocoder};

pub struct Resampler {
    request: SynthRequest,
    model: Model,
}

impl Resampler {
    /// Fails only when the request carries pitch-curve bytes that do not
    /// parse; without curve bytes the pitch is tracked from the waveform.
    pub fn new(mut request: SynthRequest, vocoder: Arc<dyn Vocoder>) -> Result<Self, FrqError> {
        let estimator: Box<dyn F0Estimator> = if request.frq.is_empty() {
            Box::new(MonophonicEstimator)
        } else {
            Box::new(FrqEstimator::new(&request.frq)?)
        };
        let samples = std::mem::take(&mut request.samples);
        let model = Model::new(samples, request.sample_fs, FRAME_MS, estimator, vocoder);
        Ok(Self { request, model })
    }

    pub fn resample(&mut self) -> Vec<f64> {
        let src_max = max_abs(self.model.samples());

        self.model.build_f0();

        // The stretch mapping is computed against the un-trimmed sample.
        let mut mapping = get_time_mapping(self.model.total_ms(), FRAME_MS, &self.request);

        let start_ms = self.request.offset;
        let length_ms = in_total_ms(self.model.total_ms(), &self.request);
        let start_frame = (start_ms / FRAME_MS) as usize;
        let length_frame =
            (((start_ms + length_ms).ceil() / FRAME_MS) as usize).saturating_sub(start_frame);
        let left_trimmed = start_frame as f64 * FRAME_MS;
        let mut left_extra = start_ms - left_trimmed;

        self.model.trim(start_frame, length_frame);
        shift_time_mapping(&mut mapping, -left_trimmed);

        self.model.build_envelope();
        self.model.build_aperiodicity();

        pad_time_mapping(&mut mapping, PADDING);
        left_extra += FRAME_MS * PADDING as f64;

        self.model.remap(&mapping);

        self.apply_pitch();
        let params = self.apply_effects();
        self.model.synth(&params);

        let mut samples = self.model.take_samples();
        let left_extra_samples = self.model.ms_to_samples(left_extra);
        let length_samples = self.model.ms_to_samples(self.request.required_length);
        samples.drain(..left_extra_samples.min(samples.len()));
        samples.resize(length_samples, 0.0);

        let out_max = max_abs(&samples);
        auto_gain(
            &mut samples,
            src_max,
            out_max,
            self.model.voiced_ratio(),
            self.request.volume,
            self.request.flag_peak_compression,
        );
        samples
    }

    /// Overwrite voiced frames with the target pitch: tone plus the
    /// pitch-bend curve in cents, converted through equal temperament.
    /// Unvoiced frames stay at 0. Positions outside the curve clamp to its
    /// first/last value; the first values cover the padding frames too.
    fn apply_pitch(&mut self) {
        let step_ms = 60000.0 / self.request.tempo / 480.0 * 5.0;
        let bend = &self.request.pitch_bend;
        let left_pitch = bend.first().copied().unwrap_or(0) as f64;
        let right_pitch = bend.last().copied().unwrap_or(0) as f64;
        let frame_ms = self.model.frame_ms();
        let tone = self.request.tone as f64;

        let mut time_ms = 0.0;
        for f in self.model.f0_mut() {
            let pos = time_ms / step_ms;
            time_ms += frame_ms;
            if *f < FLOOR_F0 {
                continue;
            }
            let index = pos as usize;
            let t = pos - index as f64;
            let pitch = if index < PADDING {
                left_pitch
            } else {
                let k = index - PADDING;
                if k < bend.len() {
                    let next = bend.get(k + 1).map(|&v| v as f64).unwrap_or(right_pitch);
                    bend[k] as f64 * (1.0 - t) + next * t
                } else {
                    right_pitch
                }
            };
            let target = tone + pitch * 0.01;
            *f = 440.0 * SEMITONE_RATIO.powf(target - 69.0);
        }
    }

    fn apply_effects(&mut self) -> SynthParams {
        if self.request.flag_gender != 0 {
            shift_gender(self.model.envelope_mut(), self.request.flag_gender as f64);
        }

        let frames = self.model.f0().len();
        let width = self.model.envelope().width();
        let mut params = SynthParams::neutral(frames, width);
        for i in 0..frames {
            let coefficients = tension_coefficients(
                self.model.f0()[i],
                self.model.fs(),
                self.request.flag_tension as f64,
                width,
            );
            params.tension.frame_mut(i).copy_from_slice(&coefficients);
        }
        let breathiness = breathiness_from_flag(self.request.flag_breathiness as f64);
        params.breathiness.fill(breathiness);
        params.voicing.fill(self.request.flag_voicing as f64 * 0.01);
        params
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frq::{FrqData, FrqFrame};
    use crate::vocoder::stub::StubVocoder;
    use approx::assert_abs_diff_eq;

    const FS: i32 = 44100;

    fn request() -> SynthRequest {
        SynthRequest {
            samples: vec![0.01; FS as usize],
            tone: 69,
            offset: 100.0,
            required_length: 500.0,
            consonant: 100.0,
            cut_off: 100.0,
            flag_peak_compression: 0,
            ..SynthRequest::default()
        }
    }

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

    #[test]
    fn resample_produces_the_requested_length() {
        let mut resampler = Resampler::new(request(), Arc::new(StubVocoder)).unwrap();
        let samples = resampler.resample();
        assert_eq!(samples.len(), 22050);
        assert!(samples.iter().all(|s| s.is_finite()));
        assert!(max_abs(&samples) > 0.0);
    }

    #[test]
    fn bad_pitch_curve_bytes_fail_construction() {
        let mut request = request();
        request.frq = vec![0u8; 16];
        assert!(Resampler::new(request, Arc::new(StubVocoder)).is_err());
    }

    #[test]
    fn apply_pitch_respects_voicing_and_bend() {
        let mut request = request();
        request.frq = flat_frq(300.0, 1000);
        request.pitch_bend = vec![0, 1200];
        // One curve tick per 20 ms, so frame i sits at tick 0.5 * i.
        request.tempo = 31.25;
        let mut resampler = Resampler::new(request, Arc::new(StubVocoder)).unwrap();
        resampler.model.build_f0();
        resampler.model.f0_mut()[9] = 0.0;
        resampler.apply_pitch();

        // Frames before the curve clamp to its first value: tone 69, 440 Hz.
        assert_abs_diff_eq!(resampler.model.f0()[0], 440.0, epsilon = 0.01);
        // Frame 5 is halfway up the +1200 cent ramp.
        assert_abs_diff_eq!(
            resampler.model.f0()[5],
            440.0 * 2f64.powf(0.5),
            epsilon = 0.01
        );
        // Frame 6 reaches the curve end, one octave up.
        assert_abs_diff_eq!(resampler.model.f0()[6], 880.0, epsilon = 0.01);
        // Unvoiced frames are left alone.
        assert_eq!(resampler.model.f0()[9], 0.0);
    }
}
