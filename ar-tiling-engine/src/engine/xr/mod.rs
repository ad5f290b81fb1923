//! AR session plumbing: browser gating, the WebXR bridge, floor acquisition
//! and the reticle.
//!
//! ```text
//! start_ar / reset_ar RPC
//!   └─> ArCommand
//!       └─> ArSession (no-session → requesting → active → ending)
//!           └─> bridge::request_session ──> XrInbox ──> process_xr_messages
//!                                            └─> XrFrame ──> apply_xr_frame
//!                                                 ├─> ViewerPose / ArCamera
//!                                                 └─> FloorEstimator ──> ContourEditor::lock_floor
//! ```
//!
//! Native builds replace the bridge with the desktop preview: sessions
//! start immediately and the floor locks at y = 0.

pub mod bridge;
#[cfg(not(target_arch = "wasm32"))]
pub mod desktop;
pub mod entry_gate;
pub mod floor_scan;
pub mod reticle;
pub mod session;

use crate::rpc::web_rpc::WebRpcInterface;
use crate::tools::contour::{AnchorFrame, ArPhase, ContourEditor};
use bevy::prelude::*;
use bevy::render::camera::ClearColorConfig;
use bridge::{XrInbox, XrMessage};
use entry_gate::{ArEntryFailure, remediation_actions};
use floor_scan::{FloorEstimator, ScanOutcome};
use reticle::{Reticle, ViewerPose};
use session::{ArSession, SessionCommand, SessionState};

/// Session requests from the host page.
#[derive(Event, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArCommand {
    Start,
    Stop,
    /// Tear the session down and request a fresh one.
    Reset,
}

/// The camera whose pose follows the XR viewer.
#[derive(Component)]
pub struct ArCamera;

pub struct XrPlugin;

impl Plugin for XrPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<ArSession>()
            .init_resource::<FloorEstimator>()
            .init_resource::<XrInbox>()
            .init_resource::<ViewerPose>()
            .init_resource::<Reticle>()
            .add_event::<ArCommand>()
            .add_systems(Startup, (spawn_ar_camera, reticle::spawn_reticle))
            .add_systems(
                Update,
                (
                    handle_ar_commands,
                    process_xr_messages,
                    tick_ar_session,
                    apply_xr_frame,
                    reticle::update_reticle,
                    reticle::draw_reticle,
                )
                    .chain(),
            );

        #[cfg(not(target_arch = "wasm32"))]
        app.init_resource::<desktop::PreviewCamera>().add_systems(
            Update,
            (
                desktop::lock_desktop_floor.after(process_xr_messages),
                desktop::desktop_camera_controller,
                desktop::update_desktop_pointer
                    .after(desktop::desktop_camera_controller)
                    .before(reticle::update_reticle),
                desktop::desktop_pointer_clicks.after(reticle::update_reticle),
            ),
        );
    }
}

fn spawn_ar_camera(mut commands: Commands, viewer: Res<ViewerPose>) {
    commands.spawn((
        Camera3d::default(),
        Camera {
            clear_color: ClearColorConfig::Custom(Color::NONE),
            ..default()
        },
        Transform::from_translation(viewer.origin).looking_to(viewer.forward, Vec3::Y),
        ArCamera,
    ));
}

fn handle_ar_commands(
    mut events: EventReader<ArCommand>,
    mut session: ResMut<ArSession>,
    inbox: Res<XrInbox>,
    time: Res<Time>,
    mut rpc_interface: ResMut<WebRpcInterface>,
) {
    let now = time.elapsed_secs_f64();
    for command in events.read() {
        let requesting = matches!(command, ArCommand::Start | ArCommand::Reset);
        if requesting && session.state() == SessionState::NoSession {
            if let Err(failure) = gate_browser() {
                session.on_unavailable(failure);
                notify_unavailable(&mut rpc_interface, failure);
                continue;
            }
        }

        let next = match command {
            ArCommand::Start => session.start(),
            ArCommand::Stop => session.stop(now),
            ArCommand::Reset => session.restart(now),
        };
        info!("[XR] {:?} -> {}", command, session.state().as_str());
        if let Some(next) = next {
            run_command(next, &inbox);
        }
        notify_session_state(&mut rpc_interface, &session);
    }
}

fn process_xr_messages(
    inbox: Res<XrInbox>,
    mut session: ResMut<ArSession>,
    mut editor: ResMut<ContourEditor>,
    mut estimator: ResMut<FloorEstimator>,
    mut rpc_interface: ResMut<WebRpcInterface>,
    time: Res<Time>,
) {
    for message in inbox.drain() {
        match message {
            XrMessage::Started => {
                if session.on_started() {
                    editor.start_session(AnchorFrame::default());
                    estimator.reset();
                    notify_session_state(&mut rpc_interface, &session);
                    if let Some(next) = session.take_queued_restart(time.elapsed_secs_f64()) {
                        notify_session_state(&mut rpc_interface, &session);
                        run_command(next, &inbox);
                    }
                }
            }
            XrMessage::Unavailable(failure) => {
                session.on_unavailable(failure);
                notify_unavailable(&mut rpc_interface, failure);
                notify_session_state(&mut rpc_interface, &session);
            }
            XrMessage::StartFailed { name } => {
                let failure = session.on_start_failed(&name);
                notify_unavailable(&mut rpc_interface, failure);
                notify_session_state(&mut rpc_interface, &session);
            }
            XrMessage::Ended => {
                if !matches!(session.state(), SessionState::Active | SessionState::Ending { .. }) {
                    debug!("[XR] Ignoring late end event");
                    continue;
                }
                release_platform_session();
                let next = session.on_ended();
                end_drawing(&mut editor, &mut estimator);
                notify_session_state(&mut rpc_interface, &session);
                if let Some(next) = next {
                    run_command(next, &inbox);
                }
            }
        }
    }
}

fn tick_ar_session(
    mut session: ResMut<ArSession>,
    inbox: Res<XrInbox>,
    time: Res<Time>,
    mut editor: ResMut<ContourEditor>,
    mut estimator: ResMut<FloorEstimator>,
    mut rpc_interface: ResMut<WebRpcInterface>,
) {
    let before = session.state();
    let next = session.bypass_change_detection().tick(time.elapsed_secs_f64());
    if session.state() == before {
        return;
    }
    session.set_changed();
    release_platform_session();
    end_drawing(&mut editor, &mut estimator);
    notify_session_state(&mut rpc_interface, &session);
    if let Some(next) = next {
        run_command(next, &inbox);
    }
}

/// Viewer pose drives the camera; hit results feed the floor estimator
/// while scanning.
fn apply_xr_frame(
    inbox: Res<XrInbox>,
    mut viewer: ResMut<ViewerPose>,
    mut camera_query: Query<(&mut Transform, &mut Projection), With<ArCamera>>,
    mut editor: ResMut<ContourEditor>,
    mut estimator: ResMut<FloorEstimator>,
    mut rpc_interface: ResMut<WebRpcInterface>,
) {
    let Some(frame) = inbox.take_frame() else {
        return;
    };

    *viewer = ViewerPose {
        origin: frame.viewer_position,
        forward: frame.viewer_rotation * Vec3::NEG_Z,
        rotation: frame.viewer_rotation,
    };
    if let Ok((mut transform, mut projection)) = camera_query.single_mut() {
        transform.translation = frame.viewer_position;
        transform.rotation = frame.viewer_rotation;
        if let (Some(fov), Projection::Perspective(perspective)) = (frame.vertical_fov, &mut *projection) {
            perspective.fov = fov;
        }
    }

    if editor.phase() != ArPhase::Scanning {
        return;
    }
    if estimator.locked_height().is_some() {
        debug!("[FLOOR] Editor rescanning, estimator reset");
        estimator.reset();
    }
    let Some(hit) = frame.hit else {
        return;
    };
    match estimator.offer(hit, viewer.forward) {
        ScanOutcome::Locked { floor_y, forced } => {
            if editor.lock_floor(floor_y) {
                rpc_interface.send_notification(
                    "floor_locked",
                    serde_json::json!({ "floor_y": floor_y, "forced": forced }),
                );
            }
        }
        ScanOutcome::Sampling { samples, spread } => {
            debug!("[FLOOR] {} samples, spread {:.3}", samples, spread);
        }
        ScanOutcome::Rejected | ScanOutcome::AlreadyLocked => {}
    }
}

fn end_drawing(editor: &mut ContourEditor, estimator: &mut FloorEstimator) {
    editor.end_session();
    estimator.reset();
}

fn notify_session_state(rpc_interface: &mut WebRpcInterface, session: &ArSession) {
    rpc_interface.send_notification(
        "ar_session_state",
        serde_json::json!({ "state": session.state().as_str() }),
    );
}

fn notify_unavailable(rpc_interface: &mut WebRpcInterface, failure: ArEntryFailure) {
    rpc_interface.send_notification(
        "ar_unavailable",
        serde_json::json!({
            "reason": failure,
            "message": failure.message(),
            "actions": remediation_actions(failure, &page_url()),
        }),
    );
}

fn run_command(command: SessionCommand, inbox: &XrInbox) {
    match command {
        SessionCommand::Request => request_platform_session(inbox),
        SessionCommand::End => end_platform_session(inbox),
    }
}

#[cfg(target_arch = "wasm32")]
fn gate_browser() -> Result<(), ArEntryFailure> {
    entry_gate::check_browser(&bridge::user_agent(), bridge::has_webxr())
}

#[cfg(not(target_arch = "wasm32"))]
fn gate_browser() -> Result<(), ArEntryFailure> {
    Ok(())
}

#[cfg(target_arch = "wasm32")]
fn page_url() -> String {
    bridge::page_url()
}

#[cfg(not(target_arch = "wasm32"))]
fn page_url() -> String {
    String::new()
}

#[cfg(target_arch = "wasm32")]
fn request_platform_session(inbox: &XrInbox) {
    let features = entry_gate::session_features(&bridge::user_agent());
    info!("[XR] Requesting immersive-ar with {:?}", features);
    bridge::request_session(inbox.clone(), features);
}

#[cfg(not(target_arch = "wasm32"))]
fn request_platform_session(inbox: &XrInbox) {
    info!("[XR] Starting desktop preview session");
    inbox.push(XrMessage::Started);
}

#[cfg(target_arch = "wasm32")]
fn end_platform_session(inbox: &XrInbox) {
    if let Err(error) = bridge::end_session() {
        warn!("[XR] Could not end session: {}", error);
        inbox.push(XrMessage::Ended);
    }
}

#[cfg(not(target_arch = "wasm32"))]
fn end_platform_session(inbox: &XrInbox) {
    inbox.push(XrMessage::Ended);
}

#[cfg(target_arch = "wasm32")]
fn release_platform_session() {
    bridge::release_session();
}

#[cfg(not(target_arch = "wasm32"))]
fn release_platform_session() {}

#[cfg(test)]
mod tests {
    use super::*;

    fn app() -> App {
        let mut app = App::new();
        app.add_plugins(MinimalPlugins)
            .init_resource::<WebRpcInterface>()
            .init_resource::<ContourEditor>()
            .init_resource::<ArSession>()
            .init_resource::<FloorEstimator>()
            .init_resource::<XrInbox>()
            .init_resource::<ViewerPose>()
            .add_event::<ArCommand>()
            .add_systems(Update, (handle_ar_commands, process_xr_messages, apply_xr_frame).chain());
        app
    }

    #[test]
    fn start_command_opens_session_and_starts_scanning() {
        let mut app = app();
        app.world_mut().send_event(ArCommand::Start);
        app.update();
        assert!(app.world().resource::<ArSession>().is_active());
        assert_eq!(app.world().resource::<ContourEditor>().phase(), ArPhase::Scanning);
    }

    #[test]
    fn frames_lock_floor_while_scanning() {
        let mut app = app();
        app.world_mut().send_event(ArCommand::Start);
        app.update();
        app.update();

        for _ in 0..12 {
            app.world().resource::<XrInbox>().set_frame(bridge::XrFrame {
                viewer_position: Vec3::new(0.0, 0.0, 0.0),
                viewer_rotation: Quat::from_rotation_x(-0.8),
                vertical_fov: None,
                hit: Some(floor_scan::HitSample {
                    position: Vec3::new(0.0, -1.42, -1.2),
                    normal: Vec3::Y,
                }),
            });
            app.update();
        }

        let editor = app.world().resource::<ContourEditor>();
        assert_eq!(editor.phase(), ArPhase::Drawing);
        assert!((editor.floor_y() + 1.42).abs() < 1e-6);
    }

    #[test]
    fn rejected_request_is_reported() {
        let mut app = app();
        app.world_mut().resource_mut::<ArSession>().start();
        app.world()
            .resource::<XrInbox>()
            .push(XrMessage::StartFailed { name: "NotAllowedError".into() });
        app.update();
        let session = app.world().resource::<ArSession>();
        assert_eq!(session.state(), SessionState::NoSession);
        assert_eq!(session.last_failure(), Some(ArEntryFailure::CameraDenied));
    }

    fn floor_frame(y: f32) -> bridge::XrFrame {
        bridge::XrFrame {
            viewer_position: Vec3::ZERO,
            viewer_rotation: Quat::from_rotation_x(-0.8),
            vertical_fov: None,
            hit: Some(floor_scan::HitSample {
                position: Vec3::new(0.0, y, -1.2),
                normal: Vec3::Y,
            }),
        }
    }

    #[test]
    fn rescan_relocks_at_new_height() {
        let mut app = app();
        app.world_mut().send_event(ArCommand::Start);
        app.update();
        for _ in 0..12 {
            app.world().resource::<XrInbox>().set_frame(floor_frame(-1.42));
            app.update();
        }
        assert_eq!(app.world().resource::<ContourEditor>().phase(), ArPhase::Drawing);

        assert!(app.world_mut().resource_mut::<ContourEditor>().rescan());
        for _ in 0..12 {
            app.world().resource::<XrInbox>().set_frame(floor_frame(-1.1));
            app.update();
        }

        let editor = app.world().resource::<ContourEditor>();
        assert_eq!(editor.phase(), ArPhase::Drawing);
        assert!((editor.floor_y() + 1.1).abs() < 1e-6);
    }

    #[test]
    fn reset_during_request_restarts_once_active() {
        let mut app = app();
        app.world_mut().resource_mut::<ArSession>().start();
        app.world_mut().send_event(ArCommand::Reset);
        app.update();
        assert_eq!(app.world().resource::<ArSession>().state(), SessionState::Requesting);

        app.world().resource::<XrInbox>().push(XrMessage::Started);
        app.update();
        assert!(matches!(
            app.world().resource::<ArSession>().state(),
            SessionState::Ending { restart: true, .. }
        ));

        // Desktop ends at once and re-requests; the new session starts next frame.
        app.update();
        app.update();
        assert!(app.world().resource::<ArSession>().is_active());
        assert_eq!(app.world().resource::<ContourEditor>().phase(), ArPhase::Scanning);
    }
}
