//! Seam to the external vocoder primitive library.
//!
//! The engine does not implement spectral-envelope extraction, aperiodicity
//! extraction, raw pitch detection or the additive synthesis transform
//! itself; it drives them through [`Vocoder`] as pure functions. Pipelines
//! hold an `Arc<dyn Vocoder>` and stay agnostic of the backing library.

use crate::spectrum::Spectrogram;

/// Which raw pitch-detection primitive to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PitchTracker {
    /// Fast tracker; pair with [`Vocoder::refine_pitch`] for stable output.
    Standard,
    /// Slower tracker with better octave stability, no refinement needed.
    HighAccuracy,
    /// Third-party tracker tuned for monophonic singing.
    Monophonic,
}

/// A raw pitch-detection result: contour plus its frame time axis (seconds).
#[derive(Debug, Clone, Default)]
pub struct PitchTrack {
    pub f0: Vec<f64>,
    pub time_axis: Vec<f64>,
}

/// Per-frame shaping curves handed to the additive synthesis primitive.
#[derive(Debug, Clone)]
pub struct SynthParams {
    /// Per-frame, per-bin spectral tilt multipliers.
    pub tension: Spectrogram,
    pub breathiness: Vec<f64>,
    pub voicing: Vec<f64>,
}

impl SynthParams {
    /// All-ones parameters, the primitive's neutral setting.
    pub fn neutral(frames: usize, width: usize) -> Self {
        Self {
            tension: Spectrogram::new(frames, width, 1.0),
            breathiness: vec![1.0; frames],
            voicing: vec![1.0; frames],
        }
    }
}

/// Number of output samples the synthesis primitive produces for a frame
/// sequence: one frame period per frame gap, plus the final sample.
pub fn output_length(frames: usize, frame_ms: f64, fs: i32) -> usize {
    (fs as f64 * (frames.saturating_sub(1)) as f64 * frame_ms / 1000.0) as usize + 1
}

/// Analysis/synthesis primitives of the external vocoder library.
pub trait Vocoder: Send + Sync {
    /// Analysis FFT size for a sample rate; envelope/aperiodicity frames
    /// have `fft_size / 2 + 1` bins.
    fn fft_size(&self, fs: i32) -> usize;

    /// Run a raw pitch-detection primitive.
    fn track_pitch(
        &self,
        tracker: PitchTracker,
        samples: &[f64],
        fs: i32,
        frame_ms: f64,
    ) -> PitchTrack;

    /// Stabilization pass correcting octave/voicing errors of
    /// [`PitchTracker::Standard`] output.
    fn refine_pitch(&self, samples: &[f64], fs: i32, time_axis: &[f64], f0: &[f64]) -> Vec<f64>;

    /// Extract the spectral envelope, one frame per contour entry.
    fn envelope(
        &self,
        samples: &[f64],
        fs: i32,
        time_axis: &[f64],
        f0: &[f64],
        fft_size: usize,
    ) -> Spectrogram;

    /// Extract aperiodicity, shaped like the envelope.
    fn aperiodicity(
        &self,
        samples: &[f64],
        fs: i32,
        time_axis: &[f64],
        f0: &[f64],
        fft_size: usize,
    ) -> Spectrogram;

    /// Additive synthesis from frames; output length is
    /// [`output_length`]`(f0.len(), frame_ms, fs)`.
    #[allow(clippy::too_many_arguments)]
    fn synthesize(
        &self,
        f0: &[f64],
        envelope: &Spectrogram,
        aperiodicity: &Spectrogram,
        params: &SynthParams,
        fft_size: usize,
        frame_ms: f64,
        fs: i32,
    ) -> Vec<f64>;

    /// Codec passthrough: mel-generalized cepstrum frames to envelope frames.
    fn decode_envelope(&self, cepstrum: &Spectrogram, fft_size: usize, fs: i32) -> Spectrogram;

    /// Codec passthrough: band aperiodicity frames to full-width frames.
    fn decode_aperiodicity(
        &self,
        band_aperiodicity: &Spectrogram,
        fft_size: usize,
        fs: i32,
    ) -> Spectrogram;
}
