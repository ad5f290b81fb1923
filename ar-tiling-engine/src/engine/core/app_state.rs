use bevy::prelude::*;

/// Loading covers the shape catalog; everything interactive runs in Ready.
#[derive(Debug, Clone, Copy, Default, Eq, PartialEq, Hash, States)]
pub enum AppState {
    #[default]
    Loading,
    Ready,
}

#[derive(Component)]
pub struct FpsText;

/// Tell the host the engine is ready for `select_shape`.
pub fn announce_ready(
    catalog: Option<Res<crate::engine::assets::catalog::ShapeCatalog>>,
    mut rpc_interface: ResMut<crate::rpc::web_rpc::WebRpcInterface>,
) {
    let shapes: Vec<serde_json::Value> = catalog
        .map(|catalog| {
            catalog
                .shapes
                .iter()
                .map(|shape| serde_json::json!({ "id": shape.id, "name": shape.name, "icon": shape.icon }))
                .collect()
        })
        .unwrap_or_default();
    info!("→ Engine ready with {} shapes", shapes.len());
    rpc_interface.send_notification("engine_ready", serde_json::json!({ "shapes": shapes }));
}
