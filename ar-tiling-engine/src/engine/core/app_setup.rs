use bevy::asset::AssetMetaCheck;
use bevy::diagnostic::FrameTimeDiagnosticsPlugin;
use bevy::prelude::*;
use bevy_common_assets::json::JsonAssetPlugin;

use crate::engine::assets::catalog::{ActivePalette, ShapeCatalog};
use crate::engine::core::app_state::{AppState, announce_ready};
use crate::engine::core::fps_tracking::fps_notification_system;
#[cfg(not(target_arch = "wasm32"))]
use crate::engine::core::{app_state::FpsText, fps_tracking::fps_text_update_system};
use crate::engine::core::window_config::create_window_config;
use crate::engine::loading::catalog_loader::{
    CatalogLoader, PaletteRequests, SelectShapeEvent, handle_select_shape_events,
    load_catalog_system, receive_palettes, start_catalog_loading,
};
use crate::engine::loading::device_signals::{
    ConcurrencyPolicy, DeviceSignals, SignalsChanged, detect_device_signals,
    refresh_device_signals, update_load_concurrency,
};
use crate::engine::loading::resolver::{TextureResolver, drive_texture_loading};
use crate::engine::loading::scheduler::LoadScheduler;
use crate::engine::loading::texture_fetch::FetchInbox;
use crate::engine::material::builder::{FloorMaterial, advance_crossfade_system};
use crate::engine::material::tile_material::TileMaterial;
use crate::engine::scene::fill_mesh::{MaskMaterial, rebuild_floor_fill};
use crate::engine::scene::guides::{GuideAssets, update_contour_guides, update_preview_guide};
use crate::engine::selection::apply::{
    SelectTileEvent, handle_select_tile_events, reset_selection_on_session_end, sync_selection_timings,
    update_selection,
};
use crate::engine::selection::controller::{SelectionController, SelectionTimings};
use crate::engine::selection::prefetch::{
    PrefetchEvent, PrefetchQueue, WarmupRequest, handle_prefetch_events, poll_prefetch,
    reset_prefetch_on_palette_change,
};
use crate::engine::selection::warmup::{retire_warmup_quads, setup_warmup_target, spawn_warmup_quads};
use crate::engine::xr::XrPlugin;
use crate::rpc::web_rpc::WebRpcPlugin;
use crate::tools::contour::ContourEditor;
use crate::tools::tool_manager::{
    ContourActionEvent, broadcast_contour_changes, handle_contour_action_events,
    handle_contour_keyboard_shortcuts,
};

pub fn create_app() -> App {
    let mut app = App::new();

    app.add_plugins(create_default_plugins())
        .init_state::<AppState>()
        .add_plugins(FrameTimeDiagnosticsPlugin::default())
        // Registers the shape catalog as a loadable asset type.
        .add_plugins(JsonAssetPlugin::<ShapeCatalog>::new(&["shapes.json"]))
        .add_plugins(MaterialPlugin::<TileMaterial>::default())
        .add_plugins(WebRpcPlugin)
        .add_plugins(XrPlugin);

    // Initialise resources early
    app.init_resource::<CatalogLoader>()
        .init_resource::<PaletteRequests>()
        .init_resource::<ActivePalette>()
        .init_resource::<DeviceSignals>()
        .init_resource::<SignalsChanged>()
        .init_resource::<ConcurrencyPolicy>()
        .init_resource::<LoadScheduler>()
        .init_resource::<FetchInbox>()
        .init_resource::<TextureResolver>()
        .init_resource::<SelectionTimings>()
        .init_resource::<SelectionController>()
        .init_resource::<PrefetchQueue>()
        .init_resource::<FloorMaterial>()
        .init_resource::<ContourEditor>()
        .init_resource::<MaskMaterial>()
        .init_resource::<GuideAssets>()
        .add_event::<SelectShapeEvent>()
        .add_event::<SelectTileEvent>()
        .add_event::<PrefetchEvent>()
        .add_event::<WarmupRequest>()
        .add_event::<ContourActionEvent>();

    app.add_systems(
        Startup,
        (start_catalog_loading, detect_device_signals, setup_warmup_target),
    )
    .add_systems(
        Update,
        load_catalog_system.run_if(in_state(AppState::Loading)),
    )
    .add_systems(OnEnter(AppState::Ready), announce_ready);

    // Texture streaming and tile selection.
    app.add_systems(
        Update,
        (
            refresh_device_signals,
            update_load_concurrency,
            handle_select_shape_events,
            receive_palettes,
            reset_prefetch_on_palette_change,
            sync_selection_timings,
            reset_selection_on_session_end,
            handle_select_tile_events,
            drive_texture_loading,
            update_selection,
            advance_crossfade_system,
            handle_prefetch_events,
            poll_prefetch,
            spawn_warmup_quads,
            retire_warmup_quads,
        )
            .chain()
            .run_if(in_state(AppState::Ready)),
    );

    // Drawing and floor geometry.
    app.add_systems(
        Update,
        (
            handle_contour_keyboard_shortcuts, // Native shortcuts or no-op for WASM
            handle_contour_action_events,
            broadcast_contour_changes,
            rebuild_floor_fill,
            update_contour_guides,
            update_preview_guide,
        )
            .chain(),
    )
    .add_systems(Update, fps_notification_system);

    // FPS overlay only for native builds.
    #[cfg(not(target_arch = "wasm32"))]
    {
        app.add_systems(Startup, create_native_overlays)
            .add_systems(Update, fps_text_update_system);
    }

    app
}

#[cfg(not(target_arch = "wasm32"))]
fn create_native_overlays(mut commands: Commands) {
    commands
        .spawn(Node {
            width: Val::Percent(100.0),
            height: Val::Percent(100.0),
            ..default()
        })
        .with_children(|parent| {
            parent.spawn((
                Text::new("FPS: "),
                TextFont {
                    font_size: 16.0,
                    ..default()
                },
                TextColor(Color::srgb(1., 0., 0.)),
                Node {
                    position_type: PositionType::Absolute,
                    bottom: Val::Px(12.0),
                    right: Val::Px(12.0),
                    ..default()
                },
                FpsText,
            ));
        });
}

fn create_default_plugins() -> impl PluginGroup {
    let window_config = WindowPlugin {
        primary_window: Some(create_window_config()),
        ..default()
    };

    let asset_config = AssetPlugin {
        meta_check: AssetMetaCheck::Never,
        ..default()
    };

    DefaultPlugins.set(window_config).set(asset_config)
}
