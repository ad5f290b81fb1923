//! WebXR bridge. The browser session lives on the JS side; everything it
//! reports reaches the ECS through `XrInbox`, drained once per frame.
//!
//! WebXR is reached through `js_sys::Reflect` so no unstable web-sys
//! bindings are required.

use super::entry_gate::ArEntryFailure;
use super::floor_scan::HitSample;
use bevy::prelude::*;
use std::cell::Cell;
use std::sync::{Arc, Mutex};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("`{0}` is not available")]
    Missing(&'static str),
    #[error("`{method}` rejected with {name}")]
    Rejected { method: &'static str, name: String },
    #[error("immersive-ar sessions are not supported")]
    NotSupported,
    #[error("no running XR session")]
    NoSession,
}

#[derive(Debug, Clone, PartialEq)]
pub enum XrMessage {
    Unavailable(ArEntryFailure),
    Started,
    /// `requestSession` rejected; carries the DOMException name.
    StartFailed { name: String },
    Ended,
}

/// Viewer pose and the first hit-test result of one XR frame, in the
/// session's local reference space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct XrFrame {
    pub viewer_position: Vec3,
    pub viewer_rotation: Quat,
    pub vertical_fov: Option<f32>,
    pub hit: Option<HitSample>,
}

/// Inbox shared with JS callbacks. Lifecycle messages queue up; only the
/// newest frame is kept.
#[derive(Resource, Clone, Default)]
pub struct XrInbox {
    messages: Arc<Mutex<Vec<XrMessage>>>,
    frame: Arc<Mutex<Option<XrFrame>>>,
}

impl XrInbox {
    pub fn push(&self, message: XrMessage) {
        if let Ok(mut messages) = self.messages.lock() {
            messages.push(message);
        }
    }

    pub fn drain(&self) -> Vec<XrMessage> {
        self.messages
            .lock()
            .map(|mut messages| std::mem::take(&mut *messages))
            .unwrap_or_default()
    }

    pub fn set_frame(&self, frame: XrFrame) {
        if let Ok(mut slot) = self.frame.lock() {
            *slot = Some(frame);
        }
    }

    pub fn take_frame(&self) -> Option<XrFrame> {
        self.frame.lock().ok().and_then(|mut slot| slot.take())
    }
}

/// Lifecycle flags shared by a session's JS callbacks and the engine. The
/// browser keeps calling the callbacks until the session has ended, so they
/// may only be dropped once the session has ended and the engine let go.
#[cfg_attr(not(target_arch = "wasm32"), allow(dead_code))]
#[derive(Debug, Default)]
struct SessionLinks {
    ended: Cell<bool>,
    retired: Cell<bool>,
    frame_request: Cell<Option<u32>>,
}

#[cfg_attr(not(target_arch = "wasm32"), allow(dead_code))]
impl SessionLinks {
    /// Record the session's `end` event. Returns false when the engine has
    /// already released the session and the event must not be reported.
    fn mark_ended(&self) -> bool {
        self.ended.set(true);
        !self.retired.get()
    }

    /// Detach the engine. Returns the animation frame still pending.
    fn retire(&self) -> Option<u32> {
        self.retired.set(true);
        self.frame_request.take()
    }

    fn should_rearm(&self) -> bool {
        !self.ended.get() && !self.retired.get()
    }

    fn set_frame_request(&self, handle: u32) {
        self.frame_request.set(Some(handle));
    }

    fn callbacks_droppable(&self) -> bool {
        self.ended.get() && self.retired.get()
    }
}

#[cfg(target_arch = "wasm32")]
pub use web::{end_session, has_webxr, page_url, release_session, request_session, user_agent};

#[cfg(target_arch = "wasm32")]
mod web {
    use super::*;
    use crate::engine::xr::entry_gate::{SessionFeatures, check_support};
    use js_sys::{Array, Function, Object, Promise, Reflect};
    use std::cell::RefCell;
    use std::rc::Rc;
    use wasm_bindgen::JsCast;
    use wasm_bindgen::prelude::*;
    use wasm_bindgen_futures::JsFuture;

    type FrameLoop = Rc<RefCell<Option<Closure<dyn FnMut(f64, JsValue)>>>>;

    struct ActiveSession {
        session: JsValue,
        hit_source: JsValue,
        links: Rc<SessionLinks>,
        frame_loop: FrameLoop,
        _on_end: Closure<dyn FnMut()>,
    }

    impl ActiveSession {
        /// Stop the frame loop and hit testing. The callbacks are parked in
        /// `RETIRED` until the browser reports the end of the session.
        fn retire(self) {
            if let Some(handle) = self.links.retire() {
                if let Err(error) = call(&self.session, "cancelAnimationFrame", &[JsValue::from(handle)]) {
                    debug!("[XR] cancelAnimationFrame failed: {}", error);
                }
            }
            cancel_hit_source(&self.hit_source);
            RETIRED.with(|retired| retired.borrow_mut().push(self));
            prune_retired();
        }
    }

    thread_local! {
        static ACTIVE: RefCell<Option<ActiveSession>> = const { RefCell::new(None) };
        static RETIRED: RefCell<Vec<ActiveSession>> = const { RefCell::new(Vec::new()) };
    }

    /// Drop retired sessions whose `end` event has fired.
    fn prune_retired() {
        RETIRED.with(|retired| {
            retired.borrow_mut().retain(|session| {
                if session.links.callbacks_droppable() {
                    session.frame_loop.borrow_mut().take();
                    false
                } else {
                    true
                }
            });
        });
    }

    fn cancel_hit_source(hit_source: &JsValue) {
        if let Err(error) = call(hit_source, "cancel", &[]) {
            debug!("[XR] Hit-test source cancel failed: {}", error);
        }
    }

    fn frame_handle(value: &JsValue) -> Option<u32> {
        value.as_f64().map(|handle| handle as u32)
    }

    fn get(target: &JsValue, key: &'static str) -> Result<JsValue, BridgeError> {
        Reflect::get(target, &JsValue::from_str(key))
            .ok()
            .filter(|value| !value.is_undefined() && !value.is_null())
            .ok_or(BridgeError::Missing(key))
    }

    fn set(target: &JsValue, key: &str, value: &JsValue) {
        let _ = Reflect::set(target, &JsValue::from_str(key), value);
    }

    fn call(target: &JsValue, method: &'static str, args: &[JsValue]) -> Result<JsValue, BridgeError> {
        let function: Function = get(target, method)?
            .dyn_into()
            .map_err(|_| BridgeError::Missing(method))?;
        let args: Array = args.iter().collect();
        function.apply(target, &args).map_err(|error| BridgeError::Rejected {
            method,
            name: error_name(&error),
        })
    }

    async fn resolve(promise: JsValue, method: &'static str) -> Result<JsValue, BridgeError> {
        JsFuture::from(Promise::resolve(&promise))
            .await
            .map_err(|error| BridgeError::Rejected {
                method,
                name: error_name(&error),
            })
    }

    fn error_name(error: &JsValue) -> String {
        Reflect::get(error, &JsValue::from_str("name"))
            .ok()
            .and_then(|name| name.as_string())
            .unwrap_or_else(|| "UnknownError".to_string())
    }

    fn navigator() -> Result<JsValue, BridgeError> {
        let window = web_sys::window().ok_or(BridgeError::Missing("window"))?;
        Ok(window.navigator().into())
    }

    pub fn user_agent() -> String {
        web_sys::window()
            .and_then(|window| window.navigator().user_agent().ok())
            .unwrap_or_default()
    }

    pub fn has_webxr() -> bool {
        navigator().and_then(|navigator| get(&navigator, "xr")).is_ok()
    }

    pub fn page_url() -> String {
        web_sys::window()
            .and_then(|window| window.location().href().ok())
            .unwrap_or_default()
    }

    /// Check support, request the session and start the frame loop. The
    /// outcome arrives in the inbox.
    pub fn request_session(inbox: XrInbox, features: SessionFeatures) {
        wasm_bindgen_futures::spawn_local(async move {
            let message = match start(&inbox, &features).await {
                Ok(()) => XrMessage::Started,
                Err(BridgeError::NotSupported) => XrMessage::Unavailable(ArEntryFailure::ArNotSupported),
                Err(BridgeError::Missing("xr")) => XrMessage::Unavailable(ArEntryFailure::NoWebXr),
                Err(BridgeError::Rejected { method, name }) => {
                    warn!("[XR] {} rejected: {}", method, name);
                    XrMessage::StartFailed { name }
                }
                Err(error) => {
                    warn!("[XR] Session start failed: {}", error);
                    XrMessage::StartFailed { name: error.to_string() }
                }
            };
            inbox.push(message);
        });
    }

    async fn start(inbox: &XrInbox, features: &SessionFeatures) -> Result<(), BridgeError> {
        prune_retired();
        let xr = get(&navigator()?, "xr")?;
        let supported = resolve(
            call(&xr, "isSessionSupported", &[JsValue::from_str("immersive-ar")])?,
            "isSessionSupported",
        )
        .await?;
        check_support(supported.as_bool().unwrap_or(false)).map_err(|_| BridgeError::NotSupported)?;

        let window = web_sys::window().ok_or(BridgeError::Missing("window"))?;
        let document: JsValue = window.document().ok_or(BridgeError::Missing("document"))?.into();

        let init = Object::new();
        let strings = |list: &[&str]| -> Array { list.iter().map(|s| JsValue::from_str(s)).collect() };
        set(&init, "requiredFeatures", &strings(&features.required_features));
        set(&init, "optionalFeatures", &strings(&features.optional_features));
        let overlay = Object::new();
        set(&overlay, "root", &get(&document, "body")?);
        set(&init, "domOverlay", &overlay);

        let session = resolve(
            call(&xr, "requestSession", &[JsValue::from_str("immersive-ar"), init.into()])?,
            "requestSession",
        )
        .await?;

        match attach(inbox, &session, &window, &document).await {
            Ok(active) => {
                let replaced = ACTIVE.with(|slot| slot.borrow_mut().replace(active));
                if let Some(previous) = replaced {
                    previous.retire();
                }
                Ok(())
            }
            Err(error) => {
                if let Err(end_error) = call(&session, "end", &[]) {
                    debug!("[XR] Ending half-started session failed: {}", end_error);
                }
                Err(error)
            }
        }
    }

    /// Wire a granted session to the engine: base layer, reference spaces,
    /// hit testing and the frame loop.
    async fn attach(
        inbox: &XrInbox,
        session: &JsValue,
        window: &web_sys::Window,
        document: &JsValue,
    ) -> Result<ActiveSession, BridgeError> {
        // The Bevy canvas sits in the DOM overlay; the session only needs a
        // compatible base layer to keep producing frames.
        let canvas = call(document, "createElement", &[JsValue::from_str("canvas")])?;
        let context_options = Object::new();
        set(&context_options, "xrCompatible", &JsValue::TRUE);
        set(&context_options, "alpha", &JsValue::TRUE);
        let gl = call(&canvas, "getContext", &[JsValue::from_str("webgl2"), context_options.into()])?;
        let layer_type: Function = get(&JsValue::from(window.clone()), "XRWebGLLayer")?
            .dyn_into()
            .map_err(|_| BridgeError::Missing("XRWebGLLayer"))?;
        let layer = Reflect::construct(&layer_type, &Array::of2(session, &gl)).map_err(|error| {
            BridgeError::Rejected {
                method: "XRWebGLLayer",
                name: error_name(&error),
            }
        })?;
        let render_state = Object::new();
        set(&render_state, "baseLayer", &layer);
        call(session, "updateRenderState", &[render_state.into()])?;

        let local = resolve(
            call(session, "requestReferenceSpace", &[JsValue::from_str("local")])?,
            "requestReferenceSpace",
        )
        .await?;
        let viewer = resolve(
            call(session, "requestReferenceSpace", &[JsValue::from_str("viewer")])?,
            "requestReferenceSpace",
        )
        .await?;
        let hit_options = Object::new();
        set(&hit_options, "space", &viewer);
        let hit_source = resolve(
            call(session, "requestHitTestSource", &[hit_options.into()])?,
            "requestHitTestSource",
        )
        .await?;

        let links = Rc::new(SessionLinks::default());
        let end_inbox = inbox.clone();
        let end_links = links.clone();
        let on_end = Closure::wrap(Box::new(move || {
            if end_links.mark_ended() {
                info!("[XR] Session end event");
                end_inbox.push(XrMessage::Ended);
            } else {
                debug!("[XR] End event of a released session");
            }
        }) as Box<dyn FnMut()>);
        if let Err(error) = call(
            session,
            "addEventListener",
            &[JsValue::from_str("end"), on_end.as_ref().clone()],
        ) {
            cancel_hit_source(&hit_source);
            return Err(error);
        }

        let frame_loop: FrameLoop = Rc::new(RefCell::new(None));
        let next = frame_loop.clone();
        let loop_session = session.clone();
        let loop_hit_source = hit_source.clone();
        let loop_links = links.clone();
        let frame_inbox = inbox.clone();
        *frame_loop.borrow_mut() = Some(Closure::wrap(Box::new(move |_time: f64, frame: JsValue| {
            if !loop_links.should_rearm() {
                return;
            }
            if let Some(sample) = read_frame(&frame, &local, &loop_hit_source) {
                frame_inbox.set_frame(sample);
            }
            if let Some(callback) = next.borrow().as_ref() {
                match call(&loop_session, "requestAnimationFrame", &[callback.as_ref().clone()]) {
                    Ok(handle) => {
                        if let Some(handle) = frame_handle(&handle) {
                            loop_links.set_frame_request(handle);
                        }
                    }
                    Err(error) => warn!("[XR] Frame loop stopped: {}", error),
                }
            }
        }) as Box<dyn FnMut(f64, JsValue)>));

        let first_frame = frame_loop
            .borrow()
            .as_ref()
            .map(|callback| call(session, "requestAnimationFrame", &[callback.as_ref().clone()]));
        let active = ActiveSession {
            session: session.clone(),
            hit_source,
            links,
            frame_loop,
            _on_end: on_end,
        };
        match first_frame {
            Some(Ok(handle)) => {
                if let Some(handle) = frame_handle(&handle) {
                    active.links.set_frame_request(handle);
                }
                Ok(active)
            }
            Some(Err(error)) => {
                active.retire();
                Err(error)
            }
            None => {
                active.retire();
                Err(BridgeError::Missing("requestAnimationFrame"))
            }
        }
    }

    fn vec3(value: &JsValue) -> Option<Vec3> {
        let axis = |key: &'static str| get(value, key).ok()?.as_f64();
        Some(Vec3::new(axis("x")? as f32, axis("y")? as f32, axis("z")? as f32))
    }

    fn quat(value: &JsValue) -> Option<Quat> {
        let axis = |key: &'static str| get(value, key).ok()?.as_f64();
        Some(Quat::from_xyzw(
            axis("x")? as f32,
            axis("y")? as f32,
            axis("z")? as f32,
            axis("w")? as f32,
        ))
    }

    fn read_pose(pose: &JsValue) -> Option<(Vec3, Quat)> {
        let transform = get(pose, "transform").ok()?;
        let position = vec3(&get(&transform, "position").ok()?)?;
        let rotation = quat(&get(&transform, "orientation").ok()?)?;
        Some((position, rotation.normalize()))
    }

    fn read_frame(frame: &JsValue, local: &JsValue, hit_source: &JsValue) -> Option<XrFrame> {
        let pose = call(frame, "getViewerPose", &[local.clone()]).ok()?;
        let (viewer_position, viewer_rotation) = read_pose(&pose)?;

        let vertical_fov = get(&pose, "views")
            .ok()
            .and_then(|views| Reflect::get_u32(&views, 0).ok())
            .and_then(|view| get(&view, "projectionMatrix").ok())
            .map(|matrix| js_sys::Float32Array::new(&matrix).to_vec())
            .filter(|matrix| matrix.len() == 16 && matrix[5] > 0.0)
            .map(|matrix| 2.0 * (1.0 / matrix[5]).atan());

        let hit = call(frame, "getHitTestResults", &[hit_source.clone()])
            .ok()
            .and_then(|results| Reflect::get_u32(&results, 0).ok())
            .filter(|result| !result.is_undefined())
            .and_then(|result| call(&result, "getPose", &[local.clone()]).ok())
            .and_then(|pose| read_pose(&pose))
            .map(|(position, rotation)| HitSample {
                position,
                normal: rotation * Vec3::Y,
            });

        Some(XrFrame {
            viewer_position,
            viewer_rotation,
            vertical_fov,
            hit,
        })
    }

    pub fn end_session() -> Result<(), BridgeError> {
        ACTIVE.with(|active| {
            let active = active.borrow();
            let active = active.as_ref().ok_or(BridgeError::NoSession)?;
            call(&active.session, "end", &[]).map(|_| ())
        })
    }

    /// Detach the engine from the current session. Its callbacks are
    /// dropped once the session's `end` event has fired.
    pub fn release_session() {
        let released = ACTIVE.with(|active| active.borrow_mut().take());
        if let Some(session) = released {
            session.retire();
        }
        prune_retired();
    }
}
