use bevy::asset::RenderAssetUsages;
use bevy::prelude::*;
use bevy::render::camera::RenderTarget;
use bevy::render::render_resource::{Extent3d, TextureDimension, TextureFormat, TextureUsages};
use bevy::render::view::RenderLayers;
use constants::render_settings::WARMUP_RENDER_LAYER;

use super::prefetch::WarmupRequest;
use crate::engine::material::builder::apply_map;
use crate::engine::material::tile_material::TileMaterial;

/// Frames a warmup quad stays alive; one draw is enough to force the upload.
const WARMUP_FRAMES: u8 = 2;

#[derive(Component)]
pub struct WarmupCamera;

#[derive(Component)]
pub struct WarmupQuad {
    frames_left: u8,
}

#[derive(Resource)]
pub struct WarmupTarget {
    quad: Handle<Mesh>,
}

/// Off-screen 1x1 camera that only sees the warmup layer. Inactive until needed.
pub fn setup_warmup_target(
    mut commands: Commands,
    mut images: ResMut<Assets<Image>>,
    mut meshes: ResMut<Assets<Mesh>>,
) {
    let mut target = Image::new_fill(
        Extent3d { width: 1, height: 1, depth_or_array_layers: 1 },
        TextureDimension::D2,
        &[0, 0, 0, 0],
        TextureFormat::Bgra8UnormSrgb,
        RenderAssetUsages::default(),
    );
    target.texture_descriptor.usage =
        TextureUsages::TEXTURE_BINDING | TextureUsages::COPY_DST | TextureUsages::RENDER_ATTACHMENT;
    let target = images.add(target);

    commands.spawn((
        Camera3d::default(),
        Camera {
            target: RenderTarget::Image(target.into()),
            is_active: false,
            order: -1,
            clear_color: ClearColorConfig::Custom(Color::NONE),
            ..default()
        },
        Transform::from_xyz(0.0, 1.0, 0.0).looking_at(Vec3::ZERO, Vec3::Z),
        RenderLayers::layer(WARMUP_RENDER_LAYER),
        WarmupCamera,
    ));

    commands.insert_resource(WarmupTarget {
        quad: meshes.add(Plane3d::default().mesh().size(1.0, 1.0)),
    });
}

pub fn spawn_warmup_quads(
    mut requests: EventReader<WarmupRequest>,
    target: Option<Res<WarmupTarget>>,
    mut materials: ResMut<Assets<TileMaterial>>,
    mut cameras: Query<&mut Camera, With<WarmupCamera>>,
    mut commands: Commands,
) {
    let Some(target) = target else {
        requests.clear();
        return;
    };

    let mut spawned = false;
    for request in requests.read() {
        let mut material = TileMaterial::default();
        for texture in &request.textures {
            apply_map(&mut material, texture.kind, Some(texture));
        }
        if material.albedo.is_none() {
            continue;
        }
        debug!(
            "[SELECT] Warming {} textures for '{}'",
            request.textures.len(),
            request.tile_id
        );
        commands.spawn((
            Mesh3d(target.quad.clone()),
            MeshMaterial3d(materials.add(material)),
            Transform::default(),
            RenderLayers::layer(WARMUP_RENDER_LAYER),
            WarmupQuad { frames_left: WARMUP_FRAMES },
        ));
        spawned = true;
    }

    if spawned {
        for mut camera in &mut cameras {
            camera.is_active = true;
        }
    }
}

/// Despawn quads after their frames and park the camera when nothing is left.
pub fn retire_warmup_quads(
    mut quads: Query<(Entity, &mut WarmupQuad, &MeshMaterial3d<TileMaterial>)>,
    mut cameras: Query<&mut Camera, With<WarmupCamera>>,
    mut materials: ResMut<Assets<TileMaterial>>,
    mut commands: Commands,
) {
    let mut alive = 0;
    for (entity, mut quad, material) in &mut quads {
        if quad.frames_left == 0 {
            materials.remove(&material.0);
            commands.entity(entity).despawn();
        } else {
            quad.frames_left -= 1;
            alive += 1;
        }
    }
    if alive == 0 {
        for mut camera in &mut cameras {
            if camera.is_active {
                camera.is_active = false;
            }
        }
    }
}
