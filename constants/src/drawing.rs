/// Placements closer than this to the previous point are ignored (metres).
pub const MIN_POINT_SPACING_M: f32 = 0.04;

/// Placing within this radius of the first point closes the ring (metres).
pub const SNAP_CLOSE_RADIUS_M: f32 = 0.10;

/// Minimum points for a closed ring.
pub const MIN_RING_POINTS: usize = 3;

/// Fill mesh lift above the floor to avoid z-fighting with the grid (metres).
pub const FILL_LIFT_M: f32 = 0.003;

/// Guide lift, slightly above the fill.
pub const GUIDE_LIFT_M: f32 = 0.006;
