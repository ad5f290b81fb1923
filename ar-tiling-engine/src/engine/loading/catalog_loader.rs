use bevy::prelude::*;
use constants::streaming::CATALOG_PATH;
use std::sync::{Arc, Mutex};

use crate::engine::assets::catalog::{ActivePalette, ShapeCatalog};
use crate::engine::assets::palette::{PaletteRecord, normalize_palette};
use crate::engine::core::app_state::AppState;
use crate::engine::loading::texture_fetch::{FetchError, spawn_request};
use crate::rpc::web_rpc::WebRpcInterface;

#[derive(Resource, Default)]
pub struct CatalogLoader {
    handle: Option<Handle<ShapeCatalog>>,
}

/// Request to switch the active shape and fetch its palette.
#[derive(Event, Debug, Clone)]
pub struct SelectShapeEvent {
    pub shape_id: String,
}

struct PaletteOutcome {
    shape_id: String,
    path: String,
    result: Result<PaletteRecord, FetchError>,
}

/// Palette fetches in flight and the shape whose palette should win.
#[derive(Resource, Default)]
pub struct PaletteRequests {
    requested: Option<String>,
    inbox: Arc<Mutex<Vec<PaletteOutcome>>>,
}

pub fn start_catalog_loading(mut loader: ResMut<CatalogLoader>, asset_server: Res<AssetServer>) {
    info!("[PALETTE] Loading catalog from {}", CATALOG_PATH);
    loader.handle = Some(asset_server.load(CATALOG_PATH));
}

/// Insert the catalog resource once parsed and leave the loading state.
pub fn load_catalog_system(
    loader: Res<CatalogLoader>,
    catalogs: Res<Assets<ShapeCatalog>>,
    asset_server: Res<AssetServer>,
    mut commands: Commands,
    mut next_state: ResMut<NextState<AppState>>,
) {
    let Some(handle) = loader.handle.as_ref() else {
        return;
    };

    if let Some(catalog) = catalogs.get(handle) {
        info!("[PALETTE] Catalog loaded: {} shapes", catalog.shapes.len());
        commands.insert_resource(catalog.clone());
        next_state.set(AppState::Ready);
        return;
    }

    if let Some(bevy::asset::LoadState::Failed(error)) = asset_server.get_load_state(handle) {
        warn!("[PALETTE] Catalog unavailable ({}), continuing without it", error);
        commands.insert_resource(ShapeCatalog::default());
        next_state.set(AppState::Ready);
    }
}

/// Start fetching the palette of each newly selected shape.
pub fn handle_select_shape_events(
    mut events: EventReader<SelectShapeEvent>,
    catalog: Option<Res<ShapeCatalog>>,
    mut requests: ResMut<PaletteRequests>,
) {
    for event in events.read() {
        let path = catalog
            .as_ref()
            .and_then(|catalog| catalog.shape(&event.shape_id))
            .map(|shape| shape.palette_path())
            .unwrap_or_else(|| crate::engine::assets::texture_files::surface_palette_path(&event.shape_id));

        info!("[PALETTE] Fetching palette for '{}' from {}", event.shape_id, path);
        requests.requested = Some(event.shape_id.clone());

        let inbox = requests.inbox.clone();
        let shape_id = event.shape_id.clone();
        let request_path = path.clone();
        spawn_request(path, move |bytes| {
            let result = bytes.and_then(|bytes| {
                serde_json::from_slice::<PaletteRecord>(&bytes).map_err(|source| FetchError::Json {
                    url: request_path.clone(),
                    source,
                })
            });
            if let Ok(mut queue) = inbox.lock() {
                queue.push(PaletteOutcome { shape_id, path: request_path, result });
            }
        });
    }
}

/// Normalize fetched palettes into the active palette. Superseded shapes are dropped.
pub fn receive_palettes(
    mut requests: ResMut<PaletteRequests>,
    catalog: Option<Res<ShapeCatalog>>,
    mut palette: ResMut<ActivePalette>,
    mut rpc_interface: ResMut<WebRpcInterface>,
) {
    let outcomes = match requests.inbox.lock() {
        Ok(mut queue) => std::mem::take(&mut *queue),
        Err(_) => return,
    };

    for outcome in outcomes {
        if requests.requested.as_deref() != Some(outcome.shape_id.as_str()) {
            debug!("[PALETTE] Dropping stale palette for '{}'", outcome.shape_id);
            continue;
        }
        requests.requested = None;

        match outcome.result {
            Ok(record) => {
                let tiles = normalize_palette(&record, Some(&outcome.path));
                let tiles = match catalog.as_ref().and_then(|c| c.shape(&outcome.shape_id)) {
                    Some(shape) => shape.display_order(tiles),
                    None => tiles,
                };
                info!("[PALETTE] '{}' palette ready: {} tiles", outcome.shape_id, tiles.len());

                let summary: Vec<serde_json::Value> = tiles
                    .iter()
                    .map(|tile| {
                        serde_json::json!({
                            "id": tile.id,
                            "name": tile.name,
                            "preview": tile.preview,
                        })
                    })
                    .collect();
                rpc_interface.send_notification(
                    "palette_loaded",
                    serde_json::json!({ "shape_id": outcome.shape_id, "tiles": summary }),
                );

                palette.shape_id = Some(outcome.shape_id);
                palette.tiles = tiles;
            }
            Err(error) => {
                warn!("[PALETTE] Palette for '{}' failed: {}", outcome.shape_id, error);
                rpc_interface.send_notification(
                    "palette_loaded",
                    serde_json::json!({
                        "shape_id": outcome.shape_id,
                        "tiles": [],
                        "error": error.to_string(),
                    }),
                );
            }
        }
    }
}
