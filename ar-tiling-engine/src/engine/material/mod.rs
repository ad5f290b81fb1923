//! Floor fill material: GPU material definition, map and parameter setters,
//! albedo crossfade, and the CPU reference of the shading model.

pub mod builder;
pub mod shading;
pub mod tile_material;
