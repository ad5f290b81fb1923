//! Floor contour drawing.
//!
//! The user traces the floor outline point by point on the detected plane,
//! optionally cuts holes, then finalises the shape so the tile material can
//! be applied to it.
//!
//! ## Phase Flow
//!
//! ```text
//! Idle ─start_session─> Scanning ─lock_floor─> Drawing
//!   Drawing ─snap to first point─> MaskPreview
//!   MaskPreview ─begin_hole─> HoleDrawing ─snap─> MaskPreview
//!   MaskPreview ─finish─> Final
//!   MaskPreview/Final ─edit_shape─> Drawing
//! ```
//!
//! ## Input Sources
//!
//! - **RPC**: `place_point`, `undo_point`, `begin_hole`, `cancel_hole`,
//!   `edit_shape`, `finish_shape` from the host page
//! - **Pointer**: left click on the desktop preview places at the reticle
//! - **Keyboard** (native only): Space places, Backspace undoes, H starts a
//!   hole, Escape cancels it, E edits, Enter finishes
//!
//! Every input becomes a `ContourActionEvent`. Accepted actions are broadcast
//! to the host as `contour_updated`, phase changes as `phase_changed`.

/// Contour editor state machine, anchor frame and area computation.
pub mod contour;

/// Contour action events, input handling and host notifications.
pub mod tool_manager;
