//! JSON-RPC 2.0 communication layer for the host page.
//!
//! The engine runs inside an iframe. The host page drives it through
//! postMessage and receives state updates as notifications.
//!
//! ## Message Flow
//!
//! ```text
//! Host (Parent Window)  <──postMessage──>  Bevy (iframe)
//!        │                                        │
//!        ├─ Request (with ID) ──────────────────> │
//!        │                                        ├─ Process request
//!        │ <───────────────── Response (with ID) ─┤
//!        │                                        │
//!        ├─ Request (no ID) ────────────────────> ├─ Process, no reply
//!        │                                        │
//!        │ <────────── Notification (no ID) ─────┤
//! ```
//!
//! ## Error Handling
//!
//! - `-32601`: Method not found
//! - `-32602`: Invalid params (missing fields, unknown tile or layout)
//!
//! Messages that fail to parse are logged and dropped.
//!
//! ## Inbound Methods
//!
//! ### Session
//! - `start_ar`, `stop_ar`, `reset_ar`
//!
//! ### Catalog and Tiles
//! - `select_shape` `{ shape_id }`: load that shape's palette
//! - `select_tile` `{ tile_id }`: stream and apply a tile from the active palette
//! - `set_layout` `{ mode }`: `straight`, `diagonal` or `half_offset`
//!
//! ### Contour
//! - `place_point` `{ x, y, z }?`: at the given point, otherwise at the reticle
//! - `undo_point`, `begin_hole`, `cancel_hole`, `edit_shape`, `finish_shape`
//! - `rescan_floor`: drop the drawing and lock the floor again
//! - `get_area`: `{ area_m2, closed }`
//!
//! ### Diagnostics
//! - `get_state`: session, contour snapshot, shape, tile and layout
//! - `device_signals`: partial device and network hints, camelCase
//! - `get_fps`
//!
//! ## Outbound Notifications
//!
//! - `engine_ready`, `ar_session_state`, `ar_unavailable`, `floor_locked`
//! - `phase_changed`, `contour_updated`
//! - `palette_loaded`, `tile_selected`, `tile_load_failed`, `loading_progress`
//! - `fps_update`

/// Request dispatch, notification queue and the wasm message listener.
pub mod web_rpc;
