use crate::engine::xr::reticle::Reticle;
use crate::tools::contour::{ArPhase, ContourEditor};
use bevy::prelude::*;
use constants::drawing::GUIDE_LIFT_M;
use constants::render_settings::{
    DRAW_LINE_WIDTH, DRAW_VERTEX_SIZE, HOLE_GUIDE_COLOUR, OUTER_GUIDE_COLOUR, PREVIEW_GUIDE_COLOUR,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuideKind {
    Outer,
    Hole,
    Preview,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GuideSegment {
    pub start: Vec3,
    pub end: Vec3,
    pub kind: GuideKind,
}

/// Vertex markers and ring edges.
#[derive(Component)]
pub struct ContourGuide;

/// Live edge from the last point to the reticle.
#[derive(Component)]
pub struct PreviewGuide;

#[derive(Resource)]
pub struct GuideAssets {
    vertex_mesh: Handle<Mesh>,
    outer: Handle<StandardMaterial>,
    hole: Handle<StandardMaterial>,
    preview: Handle<StandardMaterial>,
}

impl FromWorld for GuideAssets {
    fn from_world(world: &mut World) -> Self {
        let vertex_mesh = world
            .resource_mut::<Assets<Mesh>>()
            .add(Sphere::new(DRAW_VERTEX_SIZE * 0.5));
        let mut materials = world.resource_mut::<Assets<StandardMaterial>>();
        let mut unlit = |colour: Color| {
            materials.add(StandardMaterial {
                base_color: colour,
                alpha_mode: AlphaMode::Blend,
                unlit: true,
                ..default()
            })
        };
        Self {
            vertex_mesh,
            outer: unlit(OUTER_GUIDE_COLOUR),
            hole: unlit(HOLE_GUIDE_COLOUR),
            preview: unlit(PREVIEW_GUIDE_COLOUR),
        }
    }
}

impl GuideAssets {
    fn material(&self, kind: GuideKind) -> Handle<StandardMaterial> {
        match kind {
            GuideKind::Outer => self.outer.clone(),
            GuideKind::Hole => self.hole.clone(),
            GuideKind::Preview => self.preview.clone(),
        }
    }
}

fn guide_point(editor: &ContourEditor, local: Vec2) -> Vec3 {
    editor.to_world(local) + Vec3::Y * GUIDE_LIFT_M
}

fn ring_segments(editor: &ContourEditor, ring: &[Vec2], closed: bool, kind: GuideKind) -> Vec<GuideSegment> {
    let mut segments: Vec<GuideSegment> = ring
        .windows(2)
        .map(|pair| GuideSegment {
            start: guide_point(editor, pair[0]),
            end: guide_point(editor, pair[1]),
            kind,
        })
        .collect();
    if closed && ring.len() >= 3 {
        if let (Some(last), Some(first)) = (ring.last(), ring.first()) {
            segments.push(GuideSegment {
                start: guide_point(editor, *last),
                end: guide_point(editor, *first),
                kind,
            });
        }
    }
    segments
}

/// Edges of the outer ring, finished holes and the hole in progress.
pub fn contour_segments(editor: &ContourEditor) -> Vec<GuideSegment> {
    let mut segments = ring_segments(editor, editor.points(), editor.is_closed(), GuideKind::Outer);
    for hole in editor.holes() {
        segments.extend(ring_segments(editor, hole, true, GuideKind::Hole));
    }
    segments.extend(ring_segments(editor, editor.hole_points(), false, GuideKind::Hole));
    segments
}

pub fn contour_vertices(editor: &ContourEditor) -> Vec<(Vec3, GuideKind)> {
    let outer = editor.points().iter().map(|p| (guide_point(editor, *p), GuideKind::Outer));
    let holes = editor
        .holes()
        .iter()
        .flatten()
        .chain(editor.hole_points())
        .map(|p| (guide_point(editor, *p), GuideKind::Hole));
    outer.chain(holes).collect()
}

/// Rubber-band edge while a ring is being drawn.
pub fn preview_segment(editor: &ContourEditor, reticle: Option<Vec3>) -> Option<GuideSegment> {
    let ring = match editor.phase() {
        ArPhase::Drawing if !editor.is_closed() => editor.points(),
        ArPhase::HoleDrawing => editor.hole_points(),
        _ => return None,
    };
    let last = ring.last()?;
    let target = reticle?;
    Some(GuideSegment {
        start: guide_point(editor, *last),
        end: Vec3::new(target.x, editor.floor_y() + GUIDE_LIFT_M, target.z),
        kind: GuideKind::Preview,
    })
}

fn segment_bundle(
    segment: &GuideSegment,
    meshes: &mut Assets<Mesh>,
    assets: &GuideAssets,
) -> Option<(Mesh3d, MeshMaterial3d<StandardMaterial>, Transform)> {
    let direction = segment.end - segment.start;
    let length = direction.length();
    if length < 1e-4 {
        return None;
    }
    let rotation = Quat::from_rotation_arc(Vec3::X, direction / length);
    Some((
        Mesh3d(meshes.add(Cuboid::new(length, DRAW_LINE_WIDTH * 0.5, DRAW_LINE_WIDTH))),
        MeshMaterial3d(assets.material(segment.kind)),
        Transform::from_translation((segment.start + segment.end) * 0.5).with_rotation(rotation),
    ))
}

pub fn update_contour_guides(
    mut commands: Commands,
    editor: Res<ContourEditor>,
    assets: Res<GuideAssets>,
    mut meshes: ResMut<Assets<Mesh>>,
    existing: Query<Entity, With<ContourGuide>>,
) {
    if !editor.is_changed() {
        return;
    }
    for entity in existing.iter() {
        commands.entity(entity).despawn();
    }
    // Guides give way to the tile floor in the final visualization.
    if editor.phase() == ArPhase::Final {
        return;
    }

    for (position, kind) in contour_vertices(&editor) {
        commands.spawn((
            Mesh3d(assets.vertex_mesh.clone()),
            MeshMaterial3d(assets.material(kind)),
            Transform::from_translation(position),
            ContourGuide,
        ));
    }
    for segment in contour_segments(&editor) {
        if let Some(bundle) = segment_bundle(&segment, &mut meshes, &assets) {
            commands.spawn((bundle, ContourGuide));
        }
    }
}

pub fn update_preview_guide(
    mut commands: Commands,
    editor: Res<ContourEditor>,
    reticle: Res<Reticle>,
    assets: Res<GuideAssets>,
    mut meshes: ResMut<Assets<Mesh>>,
    existing: Query<Entity, With<PreviewGuide>>,
) {
    if !editor.is_changed() && !reticle.is_changed() {
        return;
    }
    for entity in existing.iter() {
        commands.entity(entity).despawn();
    }
    if let Some(segment) = preview_segment(&editor, reticle.position) {
        if let Some(bundle) = segment_bundle(&segment, &mut meshes, &assets) {
            commands.spawn((bundle, PreviewGuide));
        }
    }
}
