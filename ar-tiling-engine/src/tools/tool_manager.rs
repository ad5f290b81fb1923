use crate::engine::xr::reticle::Reticle;
use crate::rpc::web_rpc::WebRpcInterface;
use crate::tools::contour::{ArPhase, ContourEditor, PlacementOutcome};
use bevy::prelude::*;

/// Drawing actions available to the host page and the desktop preview.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ContourAction {
    /// Place a point at the current reticle position.
    PlacePoint,
    PlaceAt(Vec3),
    Undo,
    BeginHole,
    CancelHole,
    EditShape,
    Finish,
    /// Drop the drawing and scan for the floor again.
    Rescan,
}

impl ContourAction {
    /// Convert RPC method name to action.
    pub fn from_method(method: &str) -> Option<Self> {
        match method {
            "place_point" => Some(Self::PlacePoint),
            "undo_point" => Some(Self::Undo),
            "begin_hole" => Some(Self::BeginHole),
            "cancel_hole" => Some(Self::CancelHole),
            "edit_shape" => Some(Self::EditShape),
            "finish_shape" => Some(Self::Finish),
            "rescan_floor" => Some(Self::Rescan),
            _ => None,
        }
    }

    pub fn to_string(&self) -> &'static str {
        match self {
            Self::PlacePoint | Self::PlaceAt(_) => "place_point",
            Self::Undo => "undo_point",
            Self::BeginHole => "begin_hole",
            Self::CancelHole => "cancel_hole",
            Self::EditShape => "edit_shape",
            Self::Finish => "finish_shape",
            Self::Rescan => "rescan_floor",
        }
    }
}

/// Source of an action for debugging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionSource {
    Rpc,
    Keyboard,
    Pointer,
}

#[derive(Event, Debug, Clone, Copy)]
pub struct ContourActionEvent {
    pub action: ContourAction,
    pub source: ActionSource,
}

/// Apply one action to the editor. Returns whether anything changed.
pub fn apply_contour_action(
    editor: &mut ContourEditor,
    action: ContourAction,
    reticle: Option<Vec3>,
) -> bool {
    match action {
        ContourAction::PlacePoint => match reticle {
            Some(point) => placed(editor.place_at(point)),
            None => false,
        },
        ContourAction::PlaceAt(point) => placed(editor.place_at(point)),
        ContourAction::Undo => editor.undo(),
        ContourAction::BeginHole => editor.begin_hole(),
        ContourAction::CancelHole => editor.cancel_hole(),
        ContourAction::EditShape => editor.edit_shape(),
        ContourAction::Finish => editor.finish(),
        ContourAction::Rescan => editor.rescan(),
    }
}

fn placed(outcome: PlacementOutcome) -> bool {
    debug!("[CONTOUR] Placement: {:?}", outcome);
    matches!(
        outcome,
        PlacementOutcome::Added | PlacementOutcome::Closed | PlacementOutcome::HoleClosed
    )
}

/// Contour snapshot shared by notifications and `get_state`.
pub fn contour_snapshot(editor: &ContourEditor) -> serde_json::Value {
    let ring = |points: &[Vec2]| -> Vec<[f32; 2]> { points.iter().map(|p| [p.x, p.y]).collect() };
    serde_json::json!({
        "phase": editor.phase(),
        "points": ring(editor.points()),
        "holes": editor.holes().iter().map(|hole| ring(hole)).collect::<Vec<_>>(),
        "hole_points": ring(editor.hole_points()),
        "closed": editor.is_closed(),
        "floor_locked": editor.is_floor_locked(),
        "area_m2": editor.area_m2(),
    })
}

/// System applying queued contour actions to the editor.
pub fn handle_contour_action_events(
    mut events: EventReader<ContourActionEvent>,
    mut editor: ResMut<ContourEditor>,
    reticle: Res<Reticle>,
) {
    for event in events.read() {
        // Check through a plain borrow so rejected actions leave change detection untouched.
        let mut scratch = editor.bypass_change_detection().clone();
        if apply_contour_action(&mut scratch, event.action, reticle.position) {
            *editor = scratch;
            info!(
                "[CONTOUR] {} via {:?}, phase {}",
                event.action.to_string(),
                event.source,
                editor.phase().as_str()
            );
        } else {
            debug!("[CONTOUR] {} ignored in phase {}", event.action.to_string(), editor.phase().as_str());
        }
    }
}

/// Push `contour_updated` and `phase_changed` to the host when the editor changes.
pub fn broadcast_contour_changes(
    editor: Res<ContourEditor>,
    mut last_phase: Local<Option<ArPhase>>,
    mut rpc_interface: ResMut<WebRpcInterface>,
) {
    if !editor.is_changed() {
        return;
    }
    if *last_phase != Some(editor.phase()) {
        *last_phase = Some(editor.phase());
        rpc_interface.send_notification(
            "phase_changed",
            serde_json::json!({ "phase": editor.phase() }),
        );
    }
    rpc_interface.send_notification("contour_updated", contour_snapshot(&editor));
}

/// Keyboard shortcuts for the desktop preview (native builds only).
#[cfg(not(target_arch = "wasm32"))]
pub fn handle_contour_keyboard_shortcuts(
    keyboard: Res<ButtonInput<KeyCode>>,
    mut actions: EventWriter<ContourActionEvent>,
) {
    let bindings = [
        (KeyCode::Space, ContourAction::PlacePoint),
        (KeyCode::Backspace, ContourAction::Undo),
        (KeyCode::KeyH, ContourAction::BeginHole),
        (KeyCode::Escape, ContourAction::CancelHole),
        (KeyCode::KeyE, ContourAction::EditShape),
        (KeyCode::Enter, ContourAction::Finish),
        (KeyCode::KeyR, ContourAction::Rescan),
    ];
    for (key, action) in bindings {
        if keyboard.just_pressed(key) {
            actions.write(ContourActionEvent {
                action,
                source: ActionSource::Keyboard,
            });
        }
    }
}

/// No keyboard shortcuts in WASM builds; the host drives drawing over RPC.
#[cfg(target_arch = "wasm32")]
pub fn handle_contour_keyboard_shortcuts() {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::contour::AnchorFrame;

    #[test]
    fn place_point_uses_reticle() {
        let mut editor = ContourEditor::default();
        editor.start_session(AnchorFrame::default());
        editor.lock_floor(-1.0);

        assert!(!apply_contour_action(&mut editor, ContourAction::PlacePoint, None));
        assert!(apply_contour_action(
            &mut editor,
            ContourAction::PlacePoint,
            Some(Vec3::new(0.5, -1.0, -1.0))
        ));
        assert_eq!(editor.points(), &[Vec2::new(0.5, -1.0)]);
        // Duplicate click does not count as a change.
        assert!(!apply_contour_action(
            &mut editor,
            ContourAction::PlaceAt(Vec3::new(0.51, -1.0, -1.0)),
            None
        ));
    }

    #[test]
    fn rpc_methods_map_to_actions() {
        for method in ["place_point", "undo_point", "begin_hole", "cancel_hole", "edit_shape", "finish_shape", "rescan_floor"] {
            let action = ContourAction::from_method(method).expect("known method");
            assert_eq!(action.to_string(), method);
        }
        assert!(ContourAction::from_method("set_layout").is_none());
    }

    #[test]
    fn snapshot_reports_phase_and_area() {
        let mut editor = ContourEditor::default();
        editor.start_session(AnchorFrame::default());
        editor.lock_floor(0.0);
        for (x, z) in [(0.0, 0.0), (2.0, 0.0), (2.0, 1.0), (0.0, 1.0), (0.0, 0.02)] {
            editor.place_at(Vec3::new(x, 0.0, z));
        }
        let snapshot = contour_snapshot(&editor);
        assert_eq!(snapshot["phase"], "mask_preview");
        assert_eq!(snapshot["closed"], true);
        assert_eq!(snapshot["points"].as_array().map(Vec::len), Some(4));
        assert!((snapshot["area_m2"].as_f64().unwrap_or_default() - 2.0).abs() < 1e-6);
    }
}
