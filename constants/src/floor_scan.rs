/// Sliding window of accepted floor height samples.
pub const FLOOR_SAMPLE_WINDOW: usize = 40;

/// Samples required before the spread test may lock the floor.
pub const FLOOR_MIN_STABLE_SAMPLES: usize = 12;

/// Sample count that locks the floor regardless of spread.
pub const FLOOR_FORCE_LOCK_SAMPLES: usize = 25;

/// Maximum p80 - p20 spread (metres) for a stable lock.
pub const FLOOR_MAX_SPREAD_M: f32 = 0.04;

/// Lower percentile used as the locked floor height.
pub const FLOOR_LOW_PERCENTILE: f32 = 0.20;

/// Upper percentile of the spread test.
pub const FLOOR_HIGH_PERCENTILE: f32 = 0.80;

/// Minimum Y component of a hit normal (cos 41°).
pub const HIT_NORMAL_MIN_UP: f32 = 0.75;

/// Camera forward Y must be at or below this (about 8.6° below horizontal).
pub const CAMERA_FORWARD_MAX_Y: f32 = -0.15;

/// Accepted ray parameter window when projecting the reticle onto the floor.
pub const RETICLE_RAY_T_MIN: f32 = 0.05;
pub const RETICLE_RAY_T_MAX: f32 = 12.0;
