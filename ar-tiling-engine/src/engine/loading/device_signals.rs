use bevy::prelude::*;
use constants::streaming::{
    HIGH_RTT_MS, LOW_CPU_CORES, LOW_DEVICE_MEMORY_GB, LOW_DOWNLINK_MBPS, MAX_CONCURRENT_LOADS,
    MID_CPU_CORES, MID_DEVICE_MEMORY_GB, MIN_CONCURRENT_LOADS, PREFER_2K_MAX_ALBEDO_SECS,
    XR_MAX_CONCURRENT_LOADS,
};
use serde::{Deserialize, Serialize};

use crate::engine::assets::texture_files::Quality;
use crate::engine::loading::scheduler::LoadScheduler;
use crate::engine::xr::session::ArSession;

/// Device and network hints. Every field is optional because browsers expose
/// different subsets, and the host may push partial updates over RPC.
#[derive(Resource, Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceSignals {
    pub device_memory_gb: Option<f32>,
    pub hardware_concurrency: Option<u32>,
    pub effective_type: Option<String>,
    pub downlink_mbps: Option<f32>,
    pub rtt_ms: Option<f32>,
    pub save_data: Option<bool>,
}

impl DeviceSignals {
    /// Overlay the fields present in `update`.
    pub fn merge(&mut self, update: DeviceSignals) {
        self.device_memory_gb = update.device_memory_gb.or(self.device_memory_gb);
        self.hardware_concurrency = update.hardware_concurrency.or(self.hardware_concurrency);
        self.effective_type = update.effective_type.or(self.effective_type.take());
        self.downlink_mbps = update.downlink_mbps.or(self.downlink_mbps);
        self.rtt_ms = update.rtt_ms.or(self.rtt_ms);
        self.save_data = update.save_data.or(self.save_data);
    }

    fn effective_type_is(&self, values: &[&str]) -> bool {
        self.effective_type
            .as_deref()
            .is_some_and(|kind| values.contains(&kind))
    }

    /// Save-data, a 2g/3g class connection, or low downlink.
    /// Prefetch and height streaming are skipped under these conditions.
    pub fn is_slow_network(&self) -> bool {
        self.save_data.unwrap_or(false)
            || self.effective_type_is(&["slow-2g", "2g", "3g"])
            || self.downlink_mbps.is_some_and(|mbps| mbps < LOW_DOWNLINK_MBPS)
    }
}

/// Cutoffs used to derive the scheduler bound from device signals.
#[derive(Resource, Debug, Clone, PartialEq)]
pub struct ConcurrencyPolicy {
    pub min: usize,
    pub max: usize,
    pub xr_max: usize,
    pub low_memory_gb: f32,
    pub mid_memory_gb: f32,
    pub low_cores: u32,
    pub mid_cores: u32,
    pub low_downlink_mbps: f32,
    pub high_rtt_ms: f32,
}

impl Default for ConcurrencyPolicy {
    fn default() -> Self {
        Self {
            min: MIN_CONCURRENT_LOADS,
            max: MAX_CONCURRENT_LOADS,
            xr_max: XR_MAX_CONCURRENT_LOADS,
            low_memory_gb: LOW_DEVICE_MEMORY_GB,
            mid_memory_gb: MID_DEVICE_MEMORY_GB,
            low_cores: LOW_CPU_CORES,
            mid_cores: MID_CPU_CORES,
            low_downlink_mbps: LOW_DOWNLINK_MBPS,
            high_rtt_ms: HIGH_RTT_MS,
        }
    }
}

impl ConcurrencyPolicy {
    pub fn compute_concurrency(&self, signals: &DeviceSignals, xr_active: bool) -> usize {
        let mut bound = self.max;

        if let Some(memory) = signals.device_memory_gb {
            if memory <= self.low_memory_gb {
                bound = bound.min(2);
            } else if memory < self.mid_memory_gb {
                bound = bound.min(3);
            }
        }
        if let Some(cores) = signals.hardware_concurrency {
            if cores <= self.low_cores {
                bound = bound.min(2);
            } else if cores < self.mid_cores {
                bound = bound.min(3);
            }
        }

        if signals.save_data.unwrap_or(false) || signals.effective_type_is(&["slow-2g", "2g"]) {
            bound = 1;
        } else if signals.effective_type_is(&["3g"])
            || signals.downlink_mbps.is_some_and(|mbps| mbps < self.low_downlink_mbps)
            || signals.rtt_ms.is_some_and(|rtt| rtt > self.high_rtt_ms)
        {
            bound = bound.min(2);
        }

        if xr_active {
            bound = bound.min(self.xr_max);
        }

        bound
            .min(self.max.min(MAX_CONCURRENT_LOADS))
            .max(self.min.max(MIN_CONCURRENT_LOADS))
    }
}

/// Tier that background upgrades aim for.
pub fn preferred_quality(signals: &DeviceSignals, albedo_load_ema: Option<f64>) -> Quality {
    let memory_ok = signals
        .device_memory_gb
        .is_none_or(|memory| memory >= MID_DEVICE_MEMORY_GB);
    let fast_enough = albedo_load_ema.is_none_or(|secs| secs < PREFER_2K_MAX_ALBEDO_SECS);
    if !signals.is_slow_network() && memory_ok && fast_enough {
        Quality::TwoK
    } else {
        Quality::OneK
    }
}

/// Set when the browser reports a connection change.
#[derive(Resource, Clone, Default)]
pub struct SignalsChanged(pub std::sync::Arc<std::sync::atomic::AtomicBool>);

pub fn detect_device_signals(mut commands: Commands) {
    let signals = read_navigator_signals();
    info!("[TEX] Device signals: {:?}", signals);
    commands.insert_resource(signals);

    let changed = SignalsChanged::default();
    watch_connection_changes(&changed);
    commands.insert_resource(changed);
}

/// Re-read navigator signals after a connection `change` event.
pub fn refresh_device_signals(changed: Res<SignalsChanged>, mut signals: ResMut<DeviceSignals>) {
    if changed.0.swap(false, std::sync::atomic::Ordering::Relaxed) {
        let fresh = read_navigator_signals();
        debug!("[TEX] Connection changed: {:?}", fresh);
        signals.merge(fresh);
    }
}

/// Recompute the scheduler bound on signal changes and XR start/stop.
pub fn update_load_concurrency(
    signals: Res<DeviceSignals>,
    policy: Res<ConcurrencyPolicy>,
    session: Res<ArSession>,
    mut last_xr_active: Local<Option<bool>>,
    mut scheduler: ResMut<LoadScheduler>,
) {
    let xr_active = session.is_active();
    if !signals.is_changed() && !policy.is_changed() && *last_xr_active == Some(xr_active) {
        return;
    }
    *last_xr_active = Some(xr_active);
    scheduler.set_bound(policy.compute_concurrency(&signals, xr_active));
}

#[cfg(target_arch = "wasm32")]
fn navigator_connection() -> Option<wasm_bindgen::JsValue> {
    let window = web_sys::window()?;
    let navigator: wasm_bindgen::JsValue = window.navigator().into();
    js_sys::Reflect::get(&navigator, &"connection".into())
        .ok()
        .filter(|value| !value.is_undefined() && !value.is_null())
}

#[cfg(target_arch = "wasm32")]
fn read_navigator_signals() -> DeviceSignals {
    use wasm_bindgen::JsValue;

    let Some(window) = web_sys::window() else {
        return DeviceSignals::default();
    };
    let navigator: JsValue = window.navigator().into();
    let field = |target: &JsValue, key: &str| js_sys::Reflect::get(target, &JsValue::from_str(key)).ok();
    let number = |target: &JsValue, key: &str| field(target, key).and_then(|v| v.as_f64());

    let mut signals = DeviceSignals {
        device_memory_gb: number(&navigator, "deviceMemory").map(|v| v as f32),
        hardware_concurrency: number(&navigator, "hardwareConcurrency").map(|v| v as u32),
        ..Default::default()
    };
    if let Some(connection) = navigator_connection() {
        signals.effective_type = field(&connection, "effectiveType").and_then(|v| v.as_string());
        signals.downlink_mbps = number(&connection, "downlink").map(|v| v as f32);
        signals.rtt_ms = number(&connection, "rtt").map(|v| v as f32);
        signals.save_data = field(&connection, "saveData").and_then(|v| v.as_bool());
    }
    signals
}

#[cfg(not(target_arch = "wasm32"))]
fn read_navigator_signals() -> DeviceSignals {
    DeviceSignals::default()
}

#[cfg(target_arch = "wasm32")]
fn watch_connection_changes(changed: &SignalsChanged) {
    use wasm_bindgen::JsCast;
    use wasm_bindgen::prelude::Closure;

    let Some(connection) = navigator_connection() else {
        return;
    };
    let Some(target) = connection.dyn_ref::<web_sys::EventTarget>() else {
        return;
    };
    let flag = changed.0.clone();
    let closure = Closure::wrap(Box::new(move || {
        flag.store(true, std::sync::atomic::Ordering::Relaxed);
    }) as Box<dyn FnMut()>);
    if let Err(e) = target.add_event_listener_with_callback("change", closure.as_ref().unchecked_ref()) {
        warn!("[TEX] Could not watch connection changes: {:?}", e);
    }
    closure.forget();
}

#[cfg(not(target_arch = "wasm32"))]
fn watch_connection_changes(_changed: &SignalsChanged) {}

#[cfg(test)]
mod tests {
    use super::*;

    fn signals() -> DeviceSignals {
        DeviceSignals {
            device_memory_gb: Some(8.0),
            hardware_concurrency: Some(8),
            effective_type: Some("4g".into()),
            downlink_mbps: Some(10.0),
            rtt_ms: Some(50.0),
            save_data: Some(false),
        }
    }

    #[test]
    fn fast_device_gets_full_bound_until_xr_starts() {
        let policy = ConcurrencyPolicy::default();
        assert_eq!(policy.compute_concurrency(&signals(), false), 4);
        assert_eq!(policy.compute_concurrency(&signals(), true), 2);
    }

    #[test]
    fn constrained_signals_tighten_bound() {
        let policy = ConcurrencyPolicy::default();
        let save_data = DeviceSignals { save_data: Some(true), ..signals() };
        assert_eq!(policy.compute_concurrency(&save_data, false), 1);

        let slow_rtt = DeviceSignals { rtt_ms: Some(600.0), ..signals() };
        assert_eq!(policy.compute_concurrency(&slow_rtt, false), 2);

        let small = DeviceSignals { device_memory_gb: Some(3.0), hardware_concurrency: Some(8), ..signals() };
        assert_eq!(policy.compute_concurrency(&small, false), 3);
    }

    #[test]
    fn bound_stays_in_range_for_unknown_signals() {
        let policy = ConcurrencyPolicy::default();
        for xr in [false, true] {
            let bound = policy.compute_concurrency(&DeviceSignals::default(), xr);
            assert!((1..=4).contains(&bound));
        }
    }

    #[test]
    fn slow_network_predicate() {
        assert!(!signals().is_slow_network());
        assert!(DeviceSignals { effective_type: Some("3g".into()), ..signals() }.is_slow_network());
        assert!(DeviceSignals { downlink_mbps: Some(0.8), ..signals() }.is_slow_network());
        assert!(DeviceSignals { save_data: Some(true), ..signals() }.is_slow_network());
    }

    #[test]
    fn preferred_quality_needs_fast_network_memory_and_quick_albedo() {
        assert_eq!(preferred_quality(&signals(), Some(0.4)), Quality::TwoK);
        assert_eq!(preferred_quality(&signals(), Some(2.0)), Quality::OneK);
        let low_memory = DeviceSignals { device_memory_gb: Some(2.0), ..signals() };
        assert_eq!(preferred_quality(&low_memory, None), Quality::OneK);
        let slow = DeviceSignals { effective_type: Some("2g".into()), ..signals() };
        assert_eq!(preferred_quality(&slow, None), Quality::OneK);
    }

    #[test]
    fn merge_keeps_fields_missing_from_update() {
        let mut current = signals();
        current.merge(DeviceSignals { save_data: Some(true), ..Default::default() });
        assert_eq!(current.save_data, Some(true));
        assert_eq!(current.device_memory_gb, Some(8.0));
        assert_eq!(current.effective_type.as_deref(), Some("4g"));
    }
}
