//! Singing-voice resampling and phrase-assembly engine.
//!
//! The crate reshapes recorded voice segments to a target pitch and timing
//! (the classic one-segment resampler contract) and assembles whole phrases
//! by crossfading several analyzed segments before synthesizing once.
//! Spectral analysis and additive synthesis primitives are driven through
//! the [`vocoder::Vocoder`] seam; everything above that seam lives here:
//! timing stretch, pitch application, spectral effects, crossfade blending,
//! and the pulse-synchronous excitation backend.
//!
//! Entry points:
//! - [`resampler::Resampler`]: one segment, one request, one waveform.
//! - [`phrase::PhraseSynth`]: add segments, set phrase curves, synthesize.
//! - the flat helpers below for direct frame-level access.

pub mod constants;
pub mod effects;
pub mod excitation;
pub mod f0;
pub mod frq;
pub mod model;
pub mod phrase;
pub mod request;
pub mod resampler;
pub mod spectrum;
pub mod timing;
pub mod vocoder;

pub use f0::F0Method;
pub use frq::{FrqData, FrqError};
pub use phrase::{PhraseError, PhraseSynth};
pub use request::SynthRequest;
pub use resampler::Resampler;
pub use spectrum::Spectrogram;
pub use vocoder::{SynthParams, Vocoder};

use effects::{breathiness_from_curve, curve_bias, shift_gender_frame, tension_coefficients};

/// Estimate an F0 contour; returns the contour and its time axis (seconds).
pub fn extract_f0(
    method: F0Method,
    samples: &[f64],
    fs: i32,
    frame_ms: f64,
    vocoder: &dyn Vocoder,
) -> (Vec<f64>, Vec<f64>) {
    method.estimator().estimate(samples, fs, frame_ms, vocoder)
}

/// Codec passthrough: mel-generalized cepstrum frames to envelope frames.
pub fn decode_envelope_frames(
    cepstrum: &Spectrogram,
    fft_size: usize,
    fs: i32,
    vocoder: &dyn Vocoder,
) -> Spectrogram {
    vocoder.decode_envelope(cepstrum, fft_size, fs)
}

/// Codec passthrough: band aperiodicity frames to full-width frames.
pub fn decode_aperiodicity_frames(
    band_aperiodicity: &Spectrogram,
    fft_size: usize,
    fs: i32,
    vocoder: &dyn Vocoder,
) -> Spectrogram {
    vocoder.decode_aperiodicity(band_aperiodicity, fft_size, fs)
}

/// Optional per-frame expression curves for [`synthesize_frames`], all
/// normalized with 0.5 neutral (voicing is taken verbatim). A missing curve
/// leaves that parameter neutral.
#[derive(Debug, Clone, Copy, Default)]
pub struct FrameCurves<'a> {
    pub gender: Option<&'a [f64]>,
    pub tension: Option<&'a [f64]>,
    pub breathiness: Option<&'a [f64]>,
    pub voicing: Option<&'a [f64]>,
}

/// Direct synthesis from supplied frames, applying expression curves first.
#[allow(clippy::too_many_arguments)]
pub fn synthesize_frames(
    f0: &[f64],
    mut envelope: Spectrogram,
    aperiodicity: &Spectrogram,
    curves: FrameCurves<'_>,
    fft_size: usize,
    frame_ms: f64,
    fs: i32,
    vocoder: &dyn Vocoder,
) -> Vec<f64> {
    let frames = f0.len();
    let width = envelope.width();

    if let Some(gender) = curves.gender {
        for (frame, &g) in envelope.iter_frames_mut().zip(gender) {
            shift_gender_frame(frame, curve_bias(g));
        }
    }

    let mut params = SynthParams::neutral(frames, width);
    if let Some(tension) = curves.tension {
        for i in 0..frames.min(tension.len()) {
            let coefficients = tension_coefficients(f0[i], fs, curve_bias(tension[i]), width);
            params.tension.frame_mut(i).copy_from_slice(&coefficients);
        }
    }
    if let Some(breathiness) = curves.breathiness {
        for (out, &b) in params.breathiness.iter_mut().zip(breathiness) {
            *out = breathiness_from_curve(b);
        }
    }
    if let Some(voicing) = curves.voicing {
        for (out, &v) in params.voicing.iter_mut().zip(voicing) {
            *out = v;
        }
    }

    vocoder.synthesize(f0, &envelope, aperiodicity, &params, fft_size, frame_ms, fs)
}
