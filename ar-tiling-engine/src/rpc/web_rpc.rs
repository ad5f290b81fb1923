use crate::engine::assets::catalog::ActivePalette;
use crate::engine::core::fps_tracking::smoothed_fps;
use crate::engine::loading::device_signals::DeviceSignals;
use crate::engine::loading::catalog_loader::SelectShapeEvent;
use crate::engine::material::builder::{FloorMaterial, apply_layout};
use crate::engine::material::tile_material::{LayoutMode, TileMaterial};
use crate::engine::selection::apply::SelectTileEvent;
use crate::engine::xr::ArCommand;
use crate::engine::xr::session::ArSession;
use crate::tools::contour::ContourEditor;
use crate::tools::tool_manager::{ActionSource, ContourAction, ContourActionEvent, contour_snapshot};
use bevy::diagnostic::DiagnosticsStore;
use bevy::ecs::system::SystemParam;
use bevy::prelude::*;
use serde::{Deserialize, Serialize};

#[cfg(target_arch = "wasm32")]
use wasm_bindgen::prelude::*;

#[cfg(target_arch = "wasm32")]
use wasm_bindgen::JsValue;

#[cfg(target_arch = "wasm32")]
use web_sys::{MessageEvent, window};

/// JSON-RPC 2.0 request structure.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct RpcRequest {
    pub jsonrpc: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
    pub id: Option<serde_json::Value>,
}

/// JSON-RPC 2.0 response structure.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct RpcResponse {
    pub jsonrpc: String,
    pub result: Option<serde_json::Value>,
    pub error: Option<RpcError>,
    pub id: Option<serde_json::Value>,
}

/// JSON-RPC 2.0 notification structure for one-way communication.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct RpcNotification {
    pub jsonrpc: String,
    pub method: String,
    pub params: serde_json::Value,
}

/// JSON-RPC 2.0 error object.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct RpcError {
    pub code: i32,
    pub message: String,
    pub data: Option<serde_json::Value>,
}

/// Resource managing bidirectional RPC communication between the host page
/// and Bevy. Handles both request-response patterns and notification broadcasting.
#[derive(Resource, Default)]
pub struct WebRpcInterface {
    outgoing_notifications: Vec<RpcNotification>,
    outgoing_responses: Vec<RpcResponse>,
}

impl WebRpcInterface {
    /// Send notification to the host without expecting response.
    pub fn send_notification(&mut self, method: &str, params: serde_json::Value) {
        self.outgoing_notifications.push(RpcNotification {
            jsonrpc: "2.0".to_string(),
            method: method.to_string(),
            params,
        });
    }

    /// Queue response for transmission to the host.
    fn queue_response(&mut self, response: RpcResponse) {
        self.outgoing_responses.push(response);
    }

    /// Notifications queued this frame, oldest first.
    pub fn pending_notifications(&self) -> &[RpcNotification] {
        &self.outgoing_notifications
    }

    #[cfg(test)]
    fn pending_responses(&self) -> &[RpcResponse] {
        &self.outgoing_responses
    }
}

/// Plugin establishing the postMessage RPC layer for iframe-based deployment.
pub struct WebRpcPlugin;

impl Plugin for WebRpcPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<WebRpcInterface>()
            .add_event::<IncomingRpcMessage>()
            .add_systems(PreUpdate, (process_incoming_messages, handle_rpc_messages).chain())
            .add_systems(Last, send_outgoing_messages);

        #[cfg(target_arch = "wasm32")]
        app.add_systems(Startup, setup_message_listener);
    }
}

#[cfg(target_arch = "wasm32")]
fn setup_message_listener(mut commands: Commands) {
    use std::sync::Arc;
    use std::sync::Mutex;

    // Thread-safe message queue for cross-thread communication.
    let message_queue: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let queue_clone = message_queue.clone();

    let closure = Closure::wrap(Box::new(move |event: MessageEvent| {
        // Filter messages to ensure they contain string data.
        if let Ok(data) = event.data().dyn_into::<js_sys::JsString>() {
            let message_str: String = data.into();

            if message_str.contains("jsonrpc") {
                if let Ok(mut queue) = queue_clone.lock() {
                    queue.push(message_str);
                }
            }
        }
    }) as Box<dyn FnMut(MessageEvent)>);

    match window() {
        Some(window) => {
            if let Err(e) =
                window.add_event_listener_with_callback("message", closure.as_ref().unchecked_ref())
            {
                error!("[RPC] Failed to register message listener: {:?}", e);
            }
        }
        None => error!("[RPC] Window object not available"),
    }

    // Prevent closure from being dropped by transferring ownership to JS.
    closure.forget();
    commands.insert_resource(MessageQueue(message_queue));
}

/// Resource wrapping thread-safe message queue for WASM event handling.
#[derive(Resource)]
struct MessageQueue(std::sync::Arc<std::sync::Mutex<Vec<String>>>);

/// Event representing incoming RPC message from the host.
#[derive(Event)]
struct IncomingRpcMessage {
    content: String,
}

fn process_incoming_messages(
    message_queue: Option<Res<MessageQueue>>,
    mut message_events: EventWriter<IncomingRpcMessage>,
) {
    let Some(queue_res) = message_queue else {
        return;
    };

    let messages = if let Ok(mut queue) = queue_res.0.lock() {
        std::mem::take(&mut *queue)
    } else {
        Vec::new()
    };

    for message_str in messages {
        message_events.write(IncomingRpcMessage {
            content: message_str,
        });
    }
}

/// Everything an RPC method may read or dispatch to.
#[derive(SystemParam)]
struct RpcContext<'w> {
    diagnostics: Res<'w, DiagnosticsStore>,
    session: Res<'w, ArSession>,
    editor: Res<'w, ContourEditor>,
    palette: Res<'w, ActivePalette>,
    signals: ResMut<'w, DeviceSignals>,
    floor: ResMut<'w, FloorMaterial>,
    materials: ResMut<'w, Assets<TileMaterial>>,
    ar_commands: EventWriter<'w, ArCommand>,
    shape_events: EventWriter<'w, SelectShapeEvent>,
    tile_events: EventWriter<'w, SelectTileEvent>,
    contour_actions: EventWriter<'w, ContourActionEvent>,
}

fn handle_rpc_messages(
    mut events: EventReader<IncomingRpcMessage>,
    mut rpc_interface: ResMut<WebRpcInterface>,
    mut context: RpcContext,
) {
    for event in events.read() {
        match serde_json::from_str::<RpcRequest>(&event.content) {
            Ok(request) => {
                debug!("[RPC] {}", request.method);
                if let Some(response) = handle_rpc_request(&request, &mut context) {
                    rpc_interface.queue_response(response);
                }
            }
            Err(parse_error) => {
                warn!("[RPC] Parse error: {}", parse_error);
            }
        }
    }
}

/// Run the method, then answer if the request carried an id. Notifications
/// (no id) still execute.
fn handle_rpc_request(request: &RpcRequest, context: &mut RpcContext) -> Option<RpcResponse> {
    let result = dispatch(&request.method, &request.params, context);
    let id = request.id.clone()?;

    match result {
        Ok(result_value) => Some(RpcResponse {
            jsonrpc: "2.0".to_string(),
            result: Some(result_value),
            error: None,
            id: Some(id),
        }),
        Err(error) => Some(RpcResponse {
            jsonrpc: "2.0".to_string(),
            result: None,
            error: Some(error),
            id: Some(id),
        }),
    }
}

fn dispatch(
    method: &str,
    params: &serde_json::Value,
    context: &mut RpcContext,
) -> Result<serde_json::Value, RpcError> {
    match method {
        "start_ar" => handle_ar_command(ArCommand::Start, context),
        "stop_ar" => handle_ar_command(ArCommand::Stop, context),
        "reset_ar" => handle_ar_command(ArCommand::Reset, context),
        "select_shape" => handle_select_shape(params, context),
        "select_tile" => handle_select_tile(params, context),
        "set_layout" => handle_set_layout(params, context),
        "get_area" => Ok(serde_json::json!({
            "area_m2": context.editor.area_m2(),
            "closed": context.editor.is_closed(),
        })),
        "get_state" => Ok(handle_get_state(context)),
        "device_signals" => handle_device_signals(params, context),
        "get_fps" => Ok(serde_json::json!({ "fps": smoothed_fps(&context.diagnostics) })),
        _ => match ContourAction::from_method(method) {
            Some(action) => handle_contour_action(action, params, context),
            None => {
                warn!("[RPC] Unknown method: {}", method);
                Err(RpcError::method_not_found(method))
            }
        },
    }
}

fn handle_ar_command(
    command: ArCommand,
    context: &mut RpcContext,
) -> Result<serde_json::Value, RpcError> {
    context.ar_commands.write(command);
    Ok(serde_json::json!({
        "success": true,
        "state": context.session.state().as_str(),
    }))
}

fn handle_select_shape(
    params: &serde_json::Value,
    context: &mut RpcContext,
) -> Result<serde_json::Value, RpcError> {
    #[derive(serde::Deserialize)]
    struct SelectShapeParams {
        shape_id: String,
    }

    let shape_params = serde_json::from_value::<SelectShapeParams>(params.clone())
        .map_err(|_| RpcError::invalid_params("Expected 'shape_id' parameter"))?;

    context.shape_events.write(SelectShapeEvent {
        shape_id: shape_params.shape_id.clone(),
    });

    Ok(serde_json::json!({
        "success": true,
        "shape_id": shape_params.shape_id
    }))
}

fn handle_select_tile(
    params: &serde_json::Value,
    context: &mut RpcContext,
) -> Result<serde_json::Value, RpcError> {
    #[derive(serde::Deserialize)]
    struct SelectTileParams {
        tile_id: String,
    }

    let tile_params = serde_json::from_value::<SelectTileParams>(params.clone())
        .map_err(|_| RpcError::invalid_params("Expected 'tile_id' parameter"))?;

    if context.palette.tile(&tile_params.tile_id).is_none() {
        return Err(RpcError::invalid_params(&format!(
            "Unknown tile: {}",
            tile_params.tile_id
        )));
    }

    context.tile_events.write(SelectTileEvent {
        tile_id: tile_params.tile_id.clone(),
    });
    info!("[RPC] Tile selection dispatched: {}", tile_params.tile_id);

    Ok(serde_json::json!({
        "success": true,
        "tile_id": tile_params.tile_id
    }))
}

fn handle_contour_action(
    action: ContourAction,
    params: &serde_json::Value,
    context: &mut RpcContext,
) -> Result<serde_json::Value, RpcError> {
    #[derive(serde::Deserialize)]
    struct PointParams {
        x: f32,
        y: f32,
        z: f32,
    }

    // `place_point` may carry an explicit world position instead of using the reticle.
    let action = match (action, serde_json::from_value::<PointParams>(params.clone())) {
        (ContourAction::PlacePoint, Ok(point)) => {
            ContourAction::PlaceAt(Vec3::new(point.x, point.y, point.z))
        }
        (action, _) => action,
    };

    context.contour_actions.write(ContourActionEvent {
        action,
        source: ActionSource::Rpc,
    });

    Ok(serde_json::json!({
        "success": true,
        "action": action.to_string(),
        "phase": context.editor.phase(),
    }))
}

fn handle_set_layout(
    params: &serde_json::Value,
    context: &mut RpcContext,
) -> Result<serde_json::Value, RpcError> {
    #[derive(serde::Deserialize)]
    struct LayoutParams {
        mode: String,
    }

    let layout_params = serde_json::from_value::<LayoutParams>(params.clone())
        .map_err(|_| RpcError::invalid_params("Expected 'mode' parameter"))?;
    let layout = LayoutMode::from_string(&layout_params.mode).ok_or_else(|| {
        RpcError::invalid_params(&format!("Unknown layout: {}", layout_params.mode))
    })?;

    apply_layout(&mut context.floor, &mut context.materials, layout);
    info!("[RPC] Layout set to {:?}", layout);

    Ok(serde_json::json!({
        "success": true,
        "mode": layout
    }))
}

fn handle_get_state(context: &RpcContext) -> serde_json::Value {
    serde_json::json!({
        "session": context.session.state().as_str(),
        "failure": context.session.last_failure(),
        "shape_id": context.palette.shape_id,
        "tile_id": context.floor.tile_id,
        "layout": context.floor.layout,
        "contour": contour_snapshot(&context.editor),
    })
}

fn handle_device_signals(
    params: &serde_json::Value,
    context: &mut RpcContext,
) -> Result<serde_json::Value, RpcError> {
    let update = serde_json::from_value::<DeviceSignals>(params.clone())
        .map_err(|e| RpcError::invalid_params(&format!("Invalid device signals: {e}")))?;
    context.signals.merge(update);

    Ok(serde_json::json!({
        "success": true,
        "slow_network": context.signals.is_slow_network()
    }))
}

/// Send queued notifications and responses to the host.
fn send_outgoing_messages(mut rpc_interface: ResMut<WebRpcInterface>) {
    // Send notifications first.
    for notification in rpc_interface.outgoing_notifications.drain(..) {
        send_message_to_parent(&notification);
    }

    // Send responses second to maintain order.
    for response in rpc_interface.outgoing_responses.drain(..) {
        send_message_to_parent(&response);
    }
}

/// Send serialized message to parent window (host page).
fn send_message_to_parent<T: Serialize>(message: &T) {
    #[cfg(target_arch = "wasm32")]
    {
        match serde_json::to_string(message) {
            Ok(json) => {
                if let Some(window) = window() {
                    if let Some(parent) = window.parent().ok().flatten() {
                        if let Err(e) = parent.post_message(&JsValue::from_str(&json), "*") {
                            error!("[RPC] Failed to send message to parent: {:?}", e);
                        }
                    } else {
                        warn!("[RPC] No parent window available for message transmission");
                    }
                } else {
                    error!("[RPC] Window object not available");
                }
            }
            Err(e) => {
                error!("[RPC] Failed to serialize message: {}", e);
            }
        }
    }

    #[cfg(not(target_arch = "wasm32"))]
    {
        // No-op for non-WASM targets.
        let _ = message;
    }
}

/// Standard RPC error codes and constructors.
impl RpcError {
    pub fn method_not_found(method: &str) -> Self {
        Self {
            code: -32601,
            message: "Method not found".to_string(),
            data: Some(serde_json::json!({ "method": method })),
        }
    }

    pub fn invalid_params(message: &str) -> Self {
        Self {
            code: -32602,
            message: message.to_string(),
            data: None,
        }
    }
}
