//! Product-tuned thresholds shared by the AR tiling engine.
//!
//! Values here are tuning decisions, not derived quantities. Runtime
//! structures lift them into `Default` impls so hosts and tests can override.

pub mod drawing;
pub mod floor_scan;
pub mod render_settings;
pub mod streaming;
pub mod xr;
