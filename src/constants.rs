/// Analysis frame period in milliseconds.
pub const FRAME_MS: f64 = 10.0;

/// Frames of padding added to each end of a time mapping before remapping,
/// so boundary frames always have two interpolation neighbours.
pub const PADDING: usize = 2;

/// F0 floor of the analysis primitives; frames below it count as unvoiced.
pub const FLOOR_F0: f64 = 71.0;

/// F0 floor of the refined trackers, used for voiced-ratio statistics.
pub const FLOOR_F0_REFINED: f64 = 40.0;

/// Stand-in F0 for unvoiced regions when a continuous contour is needed.
pub const DEFAULT_F0: f64 = 500.0;

/// Floor for spectral magnitudes, keeps logs and divisions finite.
pub const SAFE_GUARD_MINIMUM: f64 = 0.000000000001;

/// 2^(1/12), equal-temperament semitone ratio.
pub const SEMITONE_RATIO: f64 = 1.05946309436;
