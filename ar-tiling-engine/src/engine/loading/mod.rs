//! Texture and palette loading.
//!
//! Fetches run off the frame loop and report back through inbox resources;
//! systems drain those inboxes each frame and advance the pure state held in
//! the scheduler and resolver.

/// Shape catalog asset loading and per-shape palette fetching.
pub mod catalog_loader;

/// Device and network signals, scheduler bound policy and preferred tier.
pub mod device_signals;

/// Delayed progress indicator for final-phase loads.
pub mod progress;

/// Candidate walk, resolved-URL cache, quality ceilings and load telemetry.
pub mod resolver;

/// Bounded-concurrency priority queue gating every fetch and decode.
pub mod scheduler;

/// Byte fetching, image decoding and GPU image construction.
pub mod texture_fetch;
