//! Render geometry for the drawn floor: the triangulated fill and the
//! guide markers shown while drawing.

/// Polygon-with-holes fill mesh laid onto the locked floor.
pub mod fill_mesh;

/// Vertex markers, ring edges and the live preview edge.
pub mod guides;
