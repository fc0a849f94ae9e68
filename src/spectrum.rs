//! Frame-major spectral data, stored as one flat buffer with a row stride.

/// A sequence of equally sized spectral frames (envelope, aperiodicity or
/// packed residual spectra). One flat allocation; 2D views only at the seams.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Spectrogram {
    width: usize,
    data: Vec<f64>,
}

impl Spectrogram {
    pub fn new(frames: usize, width: usize, fill: f64) -> Self {
        Self {
            width,
            data: vec![fill; frames * width],
        }
    }

    pub fn with_capacity(frames: usize, width: usize) -> Self {
        Self {
            width,
            data: Vec::with_capacity(frames * width),
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn frames(&self) -> usize {
        if self.width == 0 {
            0
        } else {
            self.data.len() / self.width
        }
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn frame(&self, index: usize) -> &[f64] {
        &self.data[index * self.width..(index + 1) * self.width]
    }

    pub fn frame_mut(&mut self, index: usize) -> &mut [f64] {
        &mut self.data[index * self.width..(index + 1) * self.width]
    }

    pub fn iter_frames(&self) -> impl Iterator<Item = &[f64]> {
        self.data.chunks_exact(self.width)
    }

    pub fn iter_frames_mut(&mut self) -> impl Iterator<Item = &mut [f64]> {
        self.data.chunks_exact_mut(self.width)
    }

    pub fn push_frame(&mut self, frame: &[f64]) {
        debug_assert_eq!(frame.len(), self.width);
        self.data.extend_from_slice(frame);
    }

    /// Linear interpolation between two frames, appended as a new frame.
    pub fn push_lerp(&mut self, other: &Spectrogram, i0: usize, i1: usize, t: f64) {
        for j in 0..self.width {
            let a = other.frame(i0)[j];
            let b = other.frame(i1)[j];
            self.data.push(a * (1.0 - t) + b * t);
        }
    }

    /// Keep only frames `[start, start + length)`.
    pub fn trim(&mut self, start: usize, length: usize) {
        self.data.drain(..start * self.width);
        self.data.truncate(length * self.width);
    }

    /// Resize to `frames`, filling new frames with `fill`.
    pub fn resize(&mut self, frames: usize, fill: f64) {
        self.data.resize(frames * self.width, fill);
    }

    /// Grow to `frames` by repeating the last frame; no-op when there is no
    /// frame to repeat.
    pub fn extend_with_last(&mut self, frames: usize) {
        if self.data.is_empty() {
            return;
        }
        while self.frames() < frames {
            let last = self.data[self.data.len() - self.width..].to_vec();
            self.data.extend_from_slice(&last);
        }
    }
}
