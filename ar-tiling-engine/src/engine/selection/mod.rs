//! Tile selection: the token-guarded controller, the systems applying its
//! output to the floor material, and neighbour prefetch with GPU warmup.

pub mod apply;
pub mod controller;
pub mod prefetch;
pub mod warmup;
