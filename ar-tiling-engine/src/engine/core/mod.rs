//! Core application setup and state management.
//!
//! Handles application lifecycle, window configuration and plugin
//! initialisation for both native and WASM targets.

/// Application setup and plugin configuration for the Bevy engine.
///
/// Registers resources, events and system ordering for streaming,
/// selection, drawing and the AR session.
pub mod app_setup;

/// Application state: catalog loading, then ready.
pub mod app_state;

/// Frame rate notifications for the host and the native overlay.
pub mod fps_tracking;

/// Platform-specific window configuration for native and WASM builds.
///
/// Configures a transparent canvas for web targets and vsync settings.
pub mod window_config;
