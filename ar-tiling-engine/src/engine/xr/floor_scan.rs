use bevy::prelude::*;
use constants::floor_scan::*;
use std::collections::VecDeque;

/// Thresholds for turning hit-test heights into a locked floor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FloorScanConfig {
    pub window: usize,
    pub min_stable_samples: usize,
    pub force_lock_samples: usize,
    pub max_spread: f32,
    pub low_percentile: f32,
    pub high_percentile: f32,
    pub normal_min_up: f32,
    pub camera_forward_max_y: f32,
}

impl Default for FloorScanConfig {
    fn default() -> Self {
        Self {
            window: FLOOR_SAMPLE_WINDOW,
            min_stable_samples: FLOOR_MIN_STABLE_SAMPLES,
            force_lock_samples: FLOOR_FORCE_LOCK_SAMPLES,
            max_spread: FLOOR_MAX_SPREAD_M,
            low_percentile: FLOOR_LOW_PERCENTILE,
            high_percentile: FLOOR_HIGH_PERCENTILE,
            normal_min_up: HIT_NORMAL_MIN_UP,
            camera_forward_max_y: CAMERA_FORWARD_MAX_Y,
        }
    }
}

/// One hit-test result in the session's local reference space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HitSample {
    pub position: Vec3,
    pub normal: Vec3,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScanOutcome {
    /// Hit not usable: wall-like normal or camera not looking down.
    Rejected,
    Sampling { samples: usize, spread: f32 },
    Locked { floor_y: f32, forced: bool },
    /// Already locked; further samples are ignored.
    AlreadyLocked,
}

/// Sliding-window floor height estimator. Scanning until locked, then fixed.
#[derive(Resource, Debug, Clone, Default)]
pub struct FloorEstimator {
    config: FloorScanConfig,
    samples: VecDeque<f32>,
    locked: Option<f32>,
}

impl FloorEstimator {
    pub fn new(config: FloorScanConfig) -> Self {
        Self {
            config,
            samples: VecDeque::with_capacity(config.window),
            locked: None,
        }
    }

    pub fn reset(&mut self) {
        self.samples.clear();
        self.locked = None;
    }

    pub fn locked_height(&self) -> Option<f32> {
        self.locked
    }

    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }

    pub fn accepts(&self, hit: &HitSample, camera_forward: Vec3) -> bool {
        let normal = hit.normal.normalize_or_zero();
        let forward = camera_forward.normalize_or_zero();
        normal.y >= self.config.normal_min_up && forward.y <= self.config.camera_forward_max_y
    }

    pub fn offer(&mut self, hit: HitSample, camera_forward: Vec3) -> ScanOutcome {
        if self.locked.is_some() {
            return ScanOutcome::AlreadyLocked;
        }
        if !self.accepts(&hit, camera_forward) {
            return ScanOutcome::Rejected;
        }

        if self.samples.len() == self.config.window {
            self.samples.pop_front();
        }
        self.samples.push_back(hit.position.y);

        let mut sorted: Vec<f32> = self.samples.iter().copied().collect();
        sorted.sort_by(f32::total_cmp);
        let low = percentile(&sorted, self.config.low_percentile);
        let spread = percentile(&sorted, self.config.high_percentile) - low;
        let count = sorted.len();

        let stable = count >= self.config.min_stable_samples && spread < self.config.max_spread;
        let forced = count >= self.config.force_lock_samples;
        if stable || forced {
            self.locked = Some(low);
            info!(
                "[FLOOR] Locked at {:.3} m from {} samples (spread {:.3}, forced: {})",
                low,
                count,
                spread,
                !stable
            );
            return ScanOutcome::Locked { floor_y: low, forced: !stable };
        }

        ScanOutcome::Sampling { samples: count, spread }
    }
}

/// `sorted[floor((n - 1) * p)]`; zero for an empty slice.
pub fn percentile(sorted: &[f32], p: f32) -> f32 {
    if sorted.is_empty() {
        return 0.0;
    }
    let index = ((sorted.len() - 1) as f32 * p.clamp(0.0, 1.0)).floor() as usize;
    sorted[index.min(sorted.len() - 1)]
}
