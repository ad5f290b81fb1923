use bevy::prelude::*;

use super::controller::{SelectionContext, SelectionController, SelectionOutput, SelectionTimings};
use super::prefetch::{PrefetchEvent, PrefetchQueue};
use crate::engine::assets::catalog::ActivePalette;
use crate::engine::assets::texture_files::MapKind;
use crate::engine::loading::device_signals::{DeviceSignals, preferred_quality};
use crate::engine::loading::progress::ProgressChange;
use crate::engine::loading::resolver::TextureResolver;
use crate::engine::material::builder::{FloorMaterial, apply_map, apply_tile_params};
use crate::engine::material::tile_material::TileMaterial;
use crate::engine::xr::session::{ArSession, SessionState};
use crate::rpc::web_rpc::WebRpcInterface;
use crate::tools::contour::{ArPhase, ContourEditor};

#[derive(Event, Debug, Clone)]
pub struct SelectTileEvent {
    pub tile_id: String,
}

pub fn handle_select_tile_events(
    time: Res<Time>,
    mut events: EventReader<SelectTileEvent>,
    palette: Res<ActivePalette>,
    signals: Res<DeviceSignals>,
    editor: Res<ContourEditor>,
    mut resolver: ResMut<TextureResolver>,
    mut controller: ResMut<SelectionController>,
) {
    for event in events.read() {
        let Some(tile) = palette.tile(&event.tile_id).cloned() else {
            warn!("[SELECT] Unknown tile '{}'", event.tile_id);
            continue;
        };
        let context = SelectionContext {
            final_phase: editor.phase() == ArPhase::Final,
            slow_network: signals.is_slow_network(),
            preferred: preferred_quality(&signals, resolver.load_time_ema(MapKind::Albedo)),
        };
        controller.select(tile, context, resolver.as_mut(), time.elapsed_secs_f64());
    }
}

/// Host or test overrides of the selection timings.
pub fn sync_selection_timings(timings: Res<SelectionTimings>, mut controller: ResMut<SelectionController>) {
    if timings.is_changed() {
        controller.set_timings(timings.clone());
    }
}

/// The floor material and selection live for one AR session. Once the
/// session is gone the material asset is released, queued prefetches are
/// dropped and settled textures are evicted.
pub fn reset_selection_on_session_end(
    session: Res<ArSession>,
    mut last_state: Local<Option<SessionState>>,
    mut controller: ResMut<SelectionController>,
    mut floor: ResMut<FloorMaterial>,
    mut materials: ResMut<Assets<TileMaterial>>,
    mut prefetch: ResMut<PrefetchQueue>,
    mut resolver: ResMut<TextureResolver>,
) {
    let state = session.state();
    let previous = last_state.replace(state);
    if state != SessionState::NoSession
        || !matches!(previous, Some(SessionState::Active | SessionState::Ending { .. }))
    {
        return;
    }

    if let Some(handle) = floor.handle.take() {
        materials.remove(&handle);
    }
    *floor = FloorMaterial {
        layout: floor.layout,
        ..default()
    };
    controller.end_session();
    prefetch.clear();
    let evicted = resolver.evict_settled();
    info!("[SELECT] Session ended, floor material released ({} textures evicted)", evicted);
}

/// Advance the controller and apply its outputs to the single floor material.
pub fn update_selection(
    time: Res<Time>,
    mut controller: ResMut<SelectionController>,
    mut resolver: ResMut<TextureResolver>,
    mut floor: ResMut<FloorMaterial>,
    mut materials: ResMut<Assets<TileMaterial>>,
    mut rpc_interface: ResMut<WebRpcInterface>,
    mut prefetch: EventWriter<PrefetchEvent>,
) {
    let now = time.elapsed_secs_f64();
    let outputs = controller.update(resolver.as_mut(), now);

    for output in outputs {
        match output {
            SelectionOutput::MaterialCommit { token, tile, albedo, maps, crossfade } => {
                if !controller.is_current(token) {
                    continue;
                }
                let handle = match floor.handle.clone() {
                    Some(handle) => handle,
                    None => {
                        info!("[SELECT] Creating floor material");
                        let handle = materials.add(TileMaterial::default());
                        floor.handle = Some(handle.clone());
                        handle
                    }
                };
                let Some(material) = materials.get_mut(&handle) else {
                    continue;
                };

                apply_tile_params(material, &tile, albedo.mean_luma, floor.layout);
                if crossfade {
                    floor.begin_crossfade(material, &albedo, now);
                } else {
                    floor.set_albedo(material, &albedo);
                }
                for (kind, texture) in &maps {
                    apply_map(material, *kind, texture.as_ref());
                }
                floor.tile_id = Some(tile.id.clone());
                floor.token = token;

                rpc_interface.send_notification(
                    "tile_selected",
                    serde_json::json!({
                        "tile_id": tile.id,
                        "name": tile.name,
                        "quality": albedo.quality.as_str(),
                    }),
                );
            }
            SelectionOutput::MapUpdate { token, texture, crossfade } => {
                if !controller.is_current(token) || floor.token != token {
                    continue;
                }
                let Some(handle) = floor.handle.clone() else {
                    continue;
                };
                let Some(material) = materials.get_mut(&handle) else {
                    continue;
                };
                match (texture.kind, crossfade) {
                    (MapKind::Albedo, true) => floor.begin_crossfade(material, &texture, now),
                    (MapKind::Albedo, false) => floor.set_albedo(material, &texture),
                    (kind, _) => apply_map(material, kind, Some(&texture)),
                }
            }
            SelectionOutput::Failed { tile_id, .. } => {
                rpc_interface.send_notification(
                    "tile_load_failed",
                    serde_json::json!({ "tile_id": tile_id, "map": MapKind::Albedo.as_str() }),
                );
            }
            SelectionOutput::Prefetch { token, tile_id } => {
                if controller.is_current(token) {
                    prefetch.write(PrefetchEvent { tile_id });
                }
            }
            SelectionOutput::Progress(change) => {
                let params = match change {
                    ProgressChange::Show { loaded, total } | ProgressChange::Update { loaded, total } => {
                        serde_json::json!({ "visible": true, "loaded": loaded, "total": total })
                    }
                    ProgressChange::Hide => serde_json::json!({ "visible": false }),
                };
                rpc_interface.send_notification("loading_progress", params);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::assets::palette::{PaletteRecord, normalize_palette};
    use crate::engine::loading::scheduler::LoadScheduler;
    use crate::engine::loading::texture_fetch::FetchError;
    use crate::engine::material::tile_material::LayoutMode;

    fn app() -> App {
        let record: PaletteRecord = serde_json::from_value(serde_json::json!({
            "items": [{ "id": "oak", "maps": {
                "albedo": "oak/1k/oak_albedo.webp",
                "roughness": "oak/1k/oak_roughness.webp"
            } }]
        }))
        .expect("palette parses");

        let mut app = App::new();
        app.add_plugins(MinimalPlugins)
            .insert_resource(ActivePalette {
                shape_id: Some("hex".into()),
                tiles: normalize_palette(&record, Some("surfaces/hex/palette.json")),
            })
            .init_resource::<DeviceSignals>()
            .init_resource::<ContourEditor>()
            .init_resource::<TextureResolver>()
            .init_resource::<LoadScheduler>()
            .init_resource::<SelectionController>()
            .init_resource::<FloorMaterial>()
            .init_resource::<Assets<TileMaterial>>()
            .init_resource::<WebRpcInterface>()
            .add_event::<SelectTileEvent>()
            .add_event::<PrefetchEvent>()
            .add_systems(Update, (handle_select_tile_events, update_selection).chain());
        app
    }

    /// Finish every queued fetch, succeeding only for URLs `respond` accepts.
    fn settle_loads(app: &mut App, respond: impl Fn(&str) -> bool) {
        let world = app.world_mut();
        let mut scheduler = world.remove_resource::<LoadScheduler>().expect("scheduler");
        let mut resolver = world.resource_mut::<TextureResolver>();
        loop {
            resolver.dispatch(&mut scheduler);
            let admitted = scheduler.admit();
            if admitted.is_empty() {
                break;
            }
            for (ticket, job) in admitted {
                scheduler.finish(ticket);
                let result = if respond(&job.url) {
                    Ok((Handle::default(), Some(0.3)))
                } else {
                    Err(FetchError::Status { url: job.url.clone(), status: 404 })
                };
                resolver.complete(ticket, result, 0.0);
            }
        }
        world.insert_resource(scheduler);
    }

    fn notifications(app: &App, method: &str) -> usize {
        app.world()
            .resource::<WebRpcInterface>()
            .pending_notifications()
            .iter()
            .filter(|n| n.method == method)
            .count()
    }

    #[test]
    fn unknown_tile_is_ignored() {
        let mut app = app();
        app.world_mut().send_event(SelectTileEvent { tile_id: "pine".into() });
        app.update();
        assert_eq!(app.world().resource::<SelectionController>().token(), 0);
        assert!(app.world().resource::<FloorMaterial>().handle.is_none());
    }

    #[test]
    fn committed_selection_creates_one_material_with_loaded_maps() {
        let mut app = app();
        app.world_mut().send_event(SelectTileEvent { tile_id: "oak".into() });
        app.update();
        assert_eq!(app.world().resource::<SelectionController>().token(), 1);
        assert!(app.world().resource::<FloorMaterial>().handle.is_none());

        settle_loads(&mut app, |url| url.contains("_albedo.webp") || url.contains("_roughness.webp"));
        app.update();

        let floor = app.world().resource::<FloorMaterial>();
        assert_eq!(floor.tile_id.as_deref(), Some("oak"));
        let handle = floor.handle.clone().expect("material created");
        let materials = app.world().resource::<Assets<TileMaterial>>();
        let uniforms = materials.get(&handle).expect("material").uniforms;
        assert_eq!((uniforms.has_roughness, uniforms.has_normal, uniforms.has_ao), (1, 0, 0));
        assert_eq!(materials.len(), 1);
        assert_eq!(notifications(&app, "tile_selected"), 1);
    }

    #[test]
    fn missing_albedo_keeps_previous_material() {
        let mut app = app();
        app.world_mut().send_event(SelectTileEvent { tile_id: "oak".into() });
        app.update();

        settle_loads(&mut app, |_| false);
        app.update();

        assert!(app.world().resource::<FloorMaterial>().handle.is_none());
        assert_eq!(notifications(&app, "tile_load_failed"), 1);
        assert_eq!(notifications(&app, "tile_selected"), 0);
    }

    #[test]
    fn session_end_releases_floor_material() {
        let mut app = app();
        app.init_resource::<ArSession>()
            .init_resource::<PrefetchQueue>()
            .add_systems(Update, reset_selection_on_session_end.after(update_selection));
        app.world_mut().resource_mut::<ArSession>().start();
        app.world_mut().resource_mut::<ArSession>().on_started();
        app.world_mut().resource_mut::<FloorMaterial>().layout = LayoutMode::Diagonal;

        app.world_mut().send_event(SelectTileEvent { tile_id: "oak".into() });
        app.update();
        settle_loads(&mut app, |_| true);
        app.update();
        assert!(app.world().resource::<FloorMaterial>().handle.is_some());

        let session_end = {
            let mut session = app.world_mut().resource_mut::<ArSession>();
            session.stop(1.0);
            session.on_ended()
        };
        assert_eq!(session_end, None);
        app.update();

        let floor = app.world().resource::<FloorMaterial>();
        assert!(floor.handle.is_none());
        assert!(floor.tile_id.is_none());
        assert_eq!(floor.layout, LayoutMode::Diagonal);
        assert_eq!(app.world().resource::<Assets<TileMaterial>>().len(), 0);
        assert_eq!(app.world().resource::<SelectionController>().committed_tile(), None);
    }
}
