//! Desktop preview for native builds: the floor locks at y = 0, the mouse
//! ray stands in for the XR viewer's gaze and left clicks place points.

use super::ArCamera;
use super::reticle::{Reticle, ViewerPose};
use crate::rpc::web_rpc::WebRpcInterface;
use crate::tools::contour::{ArPhase, ContourEditor};
use crate::tools::tool_manager::{ActionSource, ContourAction, ContourActionEvent};
use bevy::input::mouse::{MouseMotion, MouseScrollUnit, MouseWheel};
use bevy::math::EulerRot;
use bevy::prelude::*;
use bevy::window::PrimaryWindow;

pub const DESKTOP_FLOOR_Y: f32 = 0.0;

/// Orbit camera state for the preview.
#[derive(Resource, Debug, Clone)]
pub struct PreviewCamera {
    pub focus: Vec3,
    pub distance: f32,
    pub yaw: f32,
    pub pitch: f32,
}

impl Default for PreviewCamera {
    fn default() -> Self {
        Self {
            focus: Vec3::new(0.0, DESKTOP_FLOOR_Y, -1.5),
            distance: 3.0,
            yaw: 0.0,
            pitch: -0.7,
        }
    }
}

impl PreviewCamera {
    pub fn rotation(&self) -> Quat {
        Quat::from_euler(EulerRot::YXZ, self.yaw, self.pitch, 0.0)
    }

    pub fn eye(&self) -> Vec3 {
        self.focus + self.rotation() * Vec3::Z * self.distance
    }
}

/// Desktop sessions have no hit-test: lock the preview floor straight away.
pub fn lock_desktop_floor(
    mut editor: ResMut<ContourEditor>,
    mut rpc_interface: ResMut<WebRpcInterface>,
) {
    if editor.phase() != ArPhase::Scanning {
        return;
    }
    if editor.lock_floor(DESKTOP_FLOOR_Y) {
        rpc_interface.send_notification(
            "floor_locked",
            serde_json::json!({ "floor_y": DESKTOP_FLOOR_Y, "forced": false }),
        );
    }
}

/// Right drag orbits, wheel zooms, WASD pans the focus point.
pub fn desktop_camera_controller(
    mut camera_query: Query<&mut Transform, With<ArCamera>>,
    mut preview: ResMut<PreviewCamera>,
    mouse_button: Res<ButtonInput<MouseButton>>,
    mut mouse_motion: EventReader<MouseMotion>,
    mut scroll_events: EventReader<MouseWheel>,
    keyboard: Res<ButtonInput<KeyCode>>,
    time: Res<Time>,
) {
    let Ok(mut camera_transform) = camera_query.single_mut() else {
        return;
    };

    let mouse_delta: Vec2 = mouse_motion.read().map(|m| m.delta).sum();
    if mouse_button.pressed(MouseButton::Right) && mouse_delta != Vec2::ZERO {
        preview.yaw -= mouse_delta.x * 0.0035;
        preview.pitch = (preview.pitch - mouse_delta.y * 0.0030).clamp(-1.5, -0.1);
    }

    let scroll: f32 = scroll_events
        .read()
        .map(|ev| match ev.unit {
            MouseScrollUnit::Line => ev.y,
            MouseScrollUnit::Pixel => ev.y * 0.05,
        })
        .sum();
    if scroll.abs() > f32::EPSILON {
        preview.distance = (preview.distance - scroll * 0.25).clamp(0.5, 12.0);
    }

    let mut move_input = Vec2::ZERO;
    if keyboard.pressed(KeyCode::KeyW) {
        move_input.y -= 1.0;
    }
    if keyboard.pressed(KeyCode::KeyS) {
        move_input.y += 1.0;
    }
    if keyboard.pressed(KeyCode::KeyD) {
        move_input.x += 1.0;
    }
    if keyboard.pressed(KeyCode::KeyA) {
        move_input.x -= 1.0;
    }
    if move_input != Vec2::ZERO {
        let heading = Quat::from_rotation_y(preview.yaw);
        let delta = heading * Vec3::new(move_input.x, 0.0, move_input.y).normalize();
        preview.focus += delta * 1.5 * time.delta_secs();
    }

    let lerp = (12.0 * time.delta_secs()).min(1.0);
    let target_translation = preview.eye();
    let target_rotation = preview.rotation();
    camera_transform.translation = camera_transform.translation.lerp(target_translation, lerp);
    camera_transform.rotation = camera_transform.rotation.slerp(target_rotation, lerp);
}

/// Mouse ray as the viewer's pointing ray so the reticle follows the cursor.
pub fn update_desktop_pointer(
    windows: Query<&Window, With<PrimaryWindow>>,
    camera_query: Query<(&Camera, &GlobalTransform), With<ArCamera>>,
    mut viewer: ResMut<ViewerPose>,
) {
    let Ok(window) = windows.single() else {
        return;
    };
    let Ok((camera, camera_transform)) = camera_query.single() else {
        return;
    };
    let Some(cursor) = window.cursor_position() else {
        return;
    };
    let Ok(ray) = camera.viewport_to_world(camera_transform, cursor) else {
        return;
    };
    let pose = ViewerPose {
        origin: ray.origin,
        forward: *ray.direction,
        rotation: camera_transform.rotation(),
    };
    if *viewer != pose {
        *viewer = pose;
    }
}

pub fn desktop_pointer_clicks(
    mouse_button: Res<ButtonInput<MouseButton>>,
    reticle: Res<Reticle>,
    mut actions: EventWriter<ContourActionEvent>,
) {
    if mouse_button.just_pressed(MouseButton::Left) && reticle.position.is_some() {
        actions.write(ContourActionEvent {
            action: ContourAction::PlacePoint,
            source: ActionSource::Pointer,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preview_camera_looks_down_at_focus() {
        let preview = PreviewCamera::default();
        let forward = preview.rotation() * Vec3::NEG_Z;
        assert!(forward.y < 0.0);
        let to_focus = (preview.focus - preview.eye()).normalize();
        assert!(to_focus.dot(forward) > 0.999);
        assert!(preview.eye().y > DESKTOP_FLOOR_Y);
    }
}
