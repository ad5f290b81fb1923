use crate::tools::contour::ContourEditor;
use bevy::prelude::*;
use constants::floor_scan::{RETICLE_RAY_T_MAX, RETICLE_RAY_T_MIN};
use constants::render_settings::{OUTER_GUIDE_COLOUR, RETICLE_RADIUS};

/// Pointing ray of the viewer: the XR camera forward vector, or the mouse
/// ray in the desktop preview.
#[derive(Resource, Debug, Clone, Copy, PartialEq)]
pub struct ViewerPose {
    pub origin: Vec3,
    pub forward: Vec3,
    pub rotation: Quat,
}

impl Default for ViewerPose {
    fn default() -> Self {
        Self {
            origin: Vec3::new(0.0, 1.4, 0.0),
            forward: Vec3::NEG_Z,
            rotation: Quat::IDENTITY,
        }
    }
}

/// Current floor target, if the pointing ray hits the locked floor.
#[derive(Resource, Debug, Clone, Copy, Default, PartialEq)]
pub struct Reticle {
    pub position: Option<Vec3>,
}

#[derive(Component)]
pub struct ReticleMarker;

/// Ray/plane intersection with the horizontal plane at `floor_y`.
/// Intersections outside the (t_min, t_max) window are discarded.
pub fn project_reticle(origin: Vec3, forward: Vec3, floor_y: f32) -> Option<Vec3> {
    let direction = forward.normalize_or_zero();
    if direction.y.abs() < 1e-4 {
        return None;
    }
    let t = (floor_y - origin.y) / direction.y;
    if t > RETICLE_RAY_T_MIN && t < RETICLE_RAY_T_MAX {
        Some(origin + direction * t)
    } else {
        None
    }
}

pub fn update_reticle(
    viewer: Res<ViewerPose>,
    editor: Res<ContourEditor>,
    mut reticle: ResMut<Reticle>,
) {
    let position = if editor.is_floor_locked() {
        project_reticle(viewer.origin, viewer.forward, editor.floor_y())
    } else {
        None
    };
    if reticle.position != position {
        reticle.position = position;
    }
}

pub fn spawn_reticle(
    mut commands: Commands,
    mut meshes: ResMut<Assets<Mesh>>,
    mut materials: ResMut<Assets<StandardMaterial>>,
) {
    commands.spawn((
        Mesh3d(meshes.add(Annulus::new(RETICLE_RADIUS * 0.7, RETICLE_RADIUS))),
        MeshMaterial3d(materials.add(StandardMaterial {
            base_color: OUTER_GUIDE_COLOUR,
            unlit: true,
            ..default()
        })),
        Transform::from_rotation(Quat::from_rotation_x(-std::f32::consts::FRAC_PI_2)),
        Visibility::Hidden,
        ReticleMarker,
    ));
}

pub fn draw_reticle(
    reticle: Res<Reticle>,
    mut query: Query<(&mut Transform, &mut Visibility), With<ReticleMarker>>,
) {
    if !reticle.is_changed() {
        return;
    }
    for (mut transform, mut visibility) in &mut query {
        match reticle.position {
            Some(position) => {
                transform.translation = position + Vec3::Y * constants::drawing::GUIDE_LIFT_M;
                *visibility = Visibility::Visible;
            }
            None => *visibility = Visibility::Hidden,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn projects_forward_ray_onto_floor() {
        let hit = project_reticle(Vec3::new(0.0, 0.0, 0.0), Vec3::new(0.0, -1.0, -1.0), -1.5);
        let hit = hit.expect("ray points at the floor");
        assert!((hit - Vec3::new(0.0, -1.5, -1.5)).length() < 1e-5);
    }

    #[test]
    fn rejects_rays_outside_parameter_window() {
        // Looking up: negative t.
        assert!(project_reticle(Vec3::ZERO, Vec3::Y, -1.5).is_none());
        // Grazing: intersection far beyond 12 m.
        assert!(project_reticle(Vec3::ZERO, Vec3::new(0.0, -0.01, -1.0), -1.5).is_none());
        // Camera resting on the plane.
        assert!(project_reticle(Vec3::new(0.0, -1.49, 0.0), Vec3::NEG_Y, -1.5).is_none());
        // Horizontal.
        assert!(project_reticle(Vec3::ZERO, Vec3::NEG_Z, -1.5).is_none());
    }
}
