//! Texture streaming, scheduling and selection timings. Durations in seconds.

/// Hard bounds for concurrent decode work.
pub const MIN_CONCURRENT_LOADS: usize = 1;
pub const MAX_CONCURRENT_LOADS: usize = 4;

/// Tighter ceiling while an XR session is running.
pub const XR_MAX_CONCURRENT_LOADS: usize = 2;

/// Device memory cutoffs (GB).
pub const LOW_DEVICE_MEMORY_GB: f32 = 2.0;
pub const MID_DEVICE_MEMORY_GB: f32 = 4.0;

/// CPU core cutoffs.
pub const LOW_CPU_CORES: u32 = 2;
pub const MID_CPU_CORES: u32 = 4;

/// Downlink below this (Mbps) counts as a constrained network.
pub const LOW_DOWNLINK_MBPS: f32 = 1.5;

/// Round-trip time above this (ms) tightens concurrency.
pub const HIGH_RTT_MS: f32 = 300.0;

/// Smoothing factor of the per-kind load time moving average.
pub const LOAD_TIME_EMA_ALPHA: f64 = 0.25;

/// Albedo load time average above which the preferred tier stays at 1k.
pub const PREFER_2K_MAX_ALBEDO_SECS: f64 = 1.5;

/// Outside the final phase: wait this long after albedo for secondary maps.
pub const SECONDARY_MAP_WAIT_SECS: f64 = 0.26;

/// Final phase: bounded wait for the normal map once albedo is in.
pub const FINAL_NORMAL_WAIT_SECS: f64 = 0.35;

/// Delay before upgrading a committed selection to the preferred tier.
pub const UPGRADE_DELAY_SECS: f64 = 0.6;

/// Heavy map (AO, height) streaming: settle window plus extra delay.
pub const HEAVY_MAP_SETTLE_SECS: f64 = 0.35;
pub const HEAVY_MAP_DELAY_SECS: f64 = 1.2;

/// Albedo crossfade duration in the final visualization phase.
pub const CROSSFADE_SECS: f64 = 0.14;

/// Neighbour prefetch debounce and best-effort normal wait.
pub const PREFETCH_DEBOUNCE_SECS: f64 = 0.18;
pub const PREFETCH_NORMAL_WAIT_SECS: f64 = 0.22;

/// Progress indicator: show after this long, then keep visible at least this long.
pub const PROGRESS_SHOW_DELAY_SECS: f64 = 2.0;
pub const PROGRESS_MIN_VISIBLE_SECS: f64 = 0.45;

/// Auto exposure clamp for albedo gain.
pub const AUTO_EXPOSURE_MIN: f32 = 0.70;
pub const AUTO_EXPOSURE_MAX: f32 = 1.00;

/// Mean linear luminance at which auto exposure reaches its maximum.
pub const AUTO_EXPOSURE_FULL_LUMA: f32 = 0.25;

/// Local asset root used for relative texture and palette paths.
pub const ASSET_ROOT: &str = "assets";

/// Default location of the shape catalog inside the asset root.
pub const CATALOG_PATH: &str = "catalog/shapes.json";
