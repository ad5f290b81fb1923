//! Catalog and palette data consumed by the engine.
//!
//! Everything here is read-only input: records are parsed and normalized
//! once at ingestion, then shared by the loading and selection layers.

/// Shape catalog asset and the active palette in display order.
pub mod catalog;

/// Palette records, normalization into tiles, and relative URL resolution.
pub mod palette;

/// Texture URL conventions: map kinds, quality tiers, canonical keys and candidates.
pub mod texture_files;
