//! Flat fill mesh for the drawn floor: outer ring minus holes.
//!
//! The shape is built in a 2D plane as `(x, -z)` and rotated onto the floor
//! by -90° about X, which maps it back to `(x, z)`. Triangulating `(x, z)`
//! directly would mirror the fill and its holes against the guide markers.

use crate::engine::material::builder::FloorMaterial;
use crate::engine::material::tile_material::TileMaterial;
use crate::tools::contour::{AnchorFrame, ArPhase, ContourEditor};
use bevy::asset::RenderAssetUsages;
use bevy::prelude::*;
use bevy::render::mesh::{Indices, PrimitiveTopology};
use constants::drawing::{FILL_LIFT_M, MIN_RING_POINTS};
use constants::render_settings::MASK_FILL_COLOUR;

#[derive(Component)]
pub struct FloorFill;

/// Translucent material shown until a tile is on the floor.
#[derive(Resource)]
pub struct MaskMaterial(pub Handle<StandardMaterial>);

impl FromWorld for MaskMaterial {
    fn from_world(world: &mut World) -> Self {
        let mut materials = world.resource_mut::<Assets<StandardMaterial>>();
        Self(materials.add(StandardMaterial {
            base_color: MASK_FILL_COLOUR,
            alpha_mode: AlphaMode::Blend,
            unlit: true,
            double_sided: true,
            cull_mode: None,
            ..default()
        }))
    }
}

/// Triangulated fill in shape space. Positions are `(x, -z, 0)`, UVs are
/// local floor metres `(x, z)`.
#[derive(Debug, Clone, PartialEq)]
pub struct FillGeometry {
    pub positions: Vec<[f32; 3]>,
    pub uvs: Vec<[f32; 2]>,
    pub indices: Vec<u32>,
}

pub fn build_fill(outer: &[Vec2], holes: &[Vec<Vec2>]) -> Option<FillGeometry> {
    if outer.len() < MIN_RING_POINTS {
        return None;
    }

    let rings = std::iter::once(outer).chain(
        holes
            .iter()
            .map(Vec::as_slice)
            .filter(|hole| hole.len() >= MIN_RING_POINTS),
    );

    let mut points: Vec<Vec2> = Vec::new();
    let mut hole_starts = Vec::new();
    for (i, ring) in rings.enumerate() {
        if i > 0 {
            hole_starts.push(points.len());
        }
        points.extend_from_slice(ring);
    }

    let coords: Vec<f64> = points
        .iter()
        .flat_map(|p| [p.x as f64, -p.y as f64])
        .collect();
    let triangles = earcutr::earcut(&coords, &hole_starts, 2).ok()?;
    if triangles.is_empty() {
        return None;
    }

    let positions: Vec<[f32; 3]> = points.iter().map(|p| [p.x, -p.y, 0.0]).collect();
    let mut indices = Vec::with_capacity(triangles.len());
    for tri in triangles.chunks_exact(3) {
        let (a, b, c) = (tri[0], tri[1], tri[2]);
        // Faces must point +Z in shape space so they face up once laid flat.
        let pa = Vec2::from_slice(&positions[a][..2]);
        let pb = Vec2::from_slice(&positions[b][..2]);
        let pc = Vec2::from_slice(&positions[c][..2]);
        if (pb - pa).perp_dot(pc - pa) < 0.0 {
            indices.extend([a as u32, c as u32, b as u32]);
        } else {
            indices.extend([a as u32, b as u32, c as u32]);
        }
    }

    Some(FillGeometry {
        uvs: points.iter().map(|p| [p.x, p.y]).collect(),
        positions,
        indices,
    })
}

pub fn fill_mesh(geometry: FillGeometry) -> Mesh {
    let normals = vec![[0.0, 0.0, 1.0]; geometry.positions.len()];
    Mesh::new(PrimitiveTopology::TriangleList, RenderAssetUsages::default())
        .with_inserted_attribute(Mesh::ATTRIBUTE_POSITION, geometry.positions)
        .with_inserted_attribute(Mesh::ATTRIBUTE_NORMAL, normals)
        .with_inserted_attribute(Mesh::ATTRIBUTE_UV_0, geometry.uvs)
        .with_inserted_indices(Indices::U32(geometry.indices))
}

/// Lays shape space onto the floor of the anchor frame, lifted off the plane.
pub fn fill_transform(anchor: AnchorFrame, floor_y: f32) -> Transform {
    Transform::from_translation(Vec3::new(anchor.origin.x, floor_y + FILL_LIFT_M, anchor.origin.z))
        .with_rotation(
            Quat::from_rotation_y(-anchor.yaw) * Quat::from_rotation_x(-std::f32::consts::FRAC_PI_2),
        )
}

fn shows_tile(phase: ArPhase) -> bool {
    phase == ArPhase::Final
}

/// Rebuilds the fill when the contour changes or the tile material appears.
pub fn rebuild_floor_fill(
    mut commands: Commands,
    editor: Res<ContourEditor>,
    floor_material: Res<FloorMaterial>,
    mask: Res<MaskMaterial>,
    mut meshes: ResMut<Assets<Mesh>>,
    existing: Query<Entity, With<FloorFill>>,
    mut last_material: Local<Option<AssetId<TileMaterial>>>,
) {
    let tile_handle = floor_material.handle.clone().filter(|_| shows_tile(editor.phase()));
    let material_id = tile_handle.as_ref().map(Handle::id);
    if !editor.is_changed() && *last_material == material_id {
        return;
    }
    *last_material = material_id;

    for entity in existing.iter() {
        commands.entity(entity).despawn();
    }
    if !editor.is_closed() {
        return;
    }
    let Some(geometry) = build_fill(editor.points(), editor.holes()) else {
        debug!("[CONTOUR] Fill triangulation produced no triangles");
        return;
    };

    let mesh = Mesh3d(meshes.add(fill_mesh(geometry)));
    let transform = fill_transform(editor.anchor(), editor.floor_y());
    match tile_handle {
        Some(handle) => {
            commands.spawn((mesh, MeshMaterial3d(handle), transform, FloorFill));
        }
        None => {
            commands.spawn((mesh, MeshMaterial3d(mask.0.clone()), transform, FloorFill));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(size: f32) -> Vec<Vec2> {
        vec![
            Vec2::new(0.0, 0.0),
            Vec2::new(size, 0.0),
            Vec2::new(size, size),
            Vec2::new(0.0, size),
        ]
    }

    fn triangle_area(geometry: &FillGeometry) -> f32 {
        geometry
            .indices
            .chunks_exact(3)
            .map(|tri| {
                let p = |i: u32| Vec2::from_slice(&geometry.positions[i as usize][..2]);
                (p(tri[1]) - p(tri[0])).perp_dot(p(tri[2]) - p(tri[0])) * 0.5
            })
            .sum()
    }

    #[test]
    fn fill_faces_up_after_laying_flat() {
        let geometry = build_fill(&square(1.0), &[]).expect("square triangulates");
        let transform = fill_transform(AnchorFrame::default(), -1.0);
        for tri in geometry.indices.chunks_exact(3) {
            let world = |i: u32| transform.transform_point(Vec3::from_array(geometry.positions[i as usize]));
            let normal = (world(tri[1]) - world(tri[0])).cross(world(tri[2]) - world(tri[0]));
            assert!(normal.y > 0.0);
        }
    }

    #[test]
    fn shape_space_maps_back_onto_guides() {
        let anchor = AnchorFrame { origin: Vec3::new(1.0, 0.0, 2.0), yaw: 0.6 };
        let outer = square(2.0);
        let geometry = build_fill(&outer, &[]).expect("square triangulates");
        let transform = fill_transform(anchor, -1.3);
        for (i, local) in outer.iter().enumerate() {
            let placed = transform.transform_point(Vec3::from_array(geometry.positions[i]));
            let expected = anchor.to_world(*local, -1.3 + FILL_LIFT_M);
            assert!((placed - expected).length() < 1e-5, "{placed} vs {expected}");
        }
    }

    #[test]
    fn holes_are_cut_out() {
        let hole = vec![Vec2::new(0.25, 0.25), Vec2::new(0.75, 0.25), Vec2::new(0.75, 0.75), Vec2::new(0.25, 0.75)];
        let geometry = build_fill(&square(1.0), &[hole]).expect("square with hole triangulates");
        assert_eq!(geometry.positions.len(), 8);
        assert!((triangle_area(&geometry) - 0.75).abs() < 1e-5);
        assert_eq!(geometry.uvs[5], [0.75, 0.25]);
    }

    #[test]
    fn degenerate_rings_are_ignored() {
        assert!(build_fill(&[Vec2::ZERO, Vec2::X], &[]).is_none());
        let short_hole = vec![Vec2::new(0.5, 0.5), Vec2::new(0.6, 0.5)];
        let geometry = build_fill(&square(1.0), &[short_hole]).expect("outer still fills");
        assert_eq!(geometry.positions.len(), 4);
    }
}
