use bevy::prelude::*;
use constants::streaming::{
    FINAL_NORMAL_WAIT_SECS, HEAVY_MAP_DELAY_SECS, HEAVY_MAP_SETTLE_SECS, PREFETCH_DEBOUNCE_SECS,
    SECONDARY_MAP_WAIT_SECS, UPGRADE_DELAY_SECS,
};
use std::collections::HashMap;

use crate::engine::assets::palette::Tile;
use crate::engine::assets::texture_files::{MapKind, Quality};
use crate::engine::loading::progress::{ProgressChange, ProgressIndicator};
use crate::engine::loading::resolver::{MapSource, ResolutionKey, ResolveStatus, ResolvedTexture};
use crate::engine::loading::scheduler::Priority;

/// Waits and delays of the selection pipeline, in seconds.
#[derive(Resource, Debug, Clone, PartialEq)]
pub struct SelectionTimings {
    pub secondary_wait: f64,
    pub final_normal_wait: f64,
    pub upgrade_delay: f64,
    pub heavy_settle: f64,
    pub heavy_delay: f64,
    pub prefetch_debounce: f64,
}

impl Default for SelectionTimings {
    fn default() -> Self {
        Self {
            secondary_wait: SECONDARY_MAP_WAIT_SECS,
            final_normal_wait: FINAL_NORMAL_WAIT_SECS,
            upgrade_delay: UPGRADE_DELAY_SECS,
            heavy_settle: HEAVY_MAP_SETTLE_SECS,
            heavy_delay: HEAVY_MAP_DELAY_SECS,
            prefetch_debounce: PREFETCH_DEBOUNCE_SECS,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionState {
    Idle,
    LoadingCore,
    MaterialReady,
    BackgroundUpgrading,
}

/// Conditions captured when a selection starts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SelectionContext {
    /// The AR session is in the final visualization phase.
    pub final_phase: bool,
    pub slow_network: bool,
    pub preferred: Quality,
}

/// Work for the apply system. Every variant carrying a token must be checked
/// against the current token before it touches the material.
#[derive(Debug, Clone, PartialEq)]
pub enum SelectionOutput {
    MaterialCommit {
        token: u64,
        tile: Tile,
        albedo: ResolvedTexture,
        maps: Vec<(MapKind, Option<ResolvedTexture>)>,
        crossfade: bool,
    },
    MapUpdate {
        token: u64,
        texture: ResolvedTexture,
        crossfade: bool,
    },
    Failed {
        token: u64,
        tile_id: String,
    },
    Prefetch {
        token: u64,
        tile_id: String,
    },
    Progress(ProgressChange),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Core,
    Upgrade,
    Heavy,
}

#[derive(Debug)]
struct MapRequest {
    kind: MapKind,
    key: ResolutionKey,
    stage: Stage,
    applied: bool,
}

#[derive(Debug)]
struct ActiveSelection {
    token: u64,
    tile: Tile,
    context: SelectionContext,
    initial: Quality,
    preferred: Quality,
    requests: Vec<MapRequest>,
    applied_urls: HashMap<MapKind, String>,
    albedo_ready_at: Option<f64>,
    committed_at: Option<f64>,
    upgrade_scheduled: bool,
    heavy_scheduled: bool,
    prefetch_sent: bool,
}

impl ActiveSelection {
    fn request(&mut self, source: &mut impl MapSource, kind: MapKind, quality: Quality, priority: Priority, stage: Stage) {
        let Some(url) = self.tile.maps.get(kind) else {
            return;
        };
        let key = source.request(url, kind, quality, priority);
        self.requests.push(MapRequest { kind, key, stage, applied: false });
    }

    fn core_status(&self, source: &impl MapSource, kind: MapKind) -> Option<ResolveStatus> {
        self.requests
            .iter()
            .find(|r| r.kind == kind && r.stage == Stage::Core)
            .map(|r| source.status(&r.key))
    }

    fn core_settled(&self, source: &impl MapSource, kind: MapKind) -> bool {
        self.core_status(source, kind).is_none_or(|status| status.is_settled())
    }
}

enum Step {
    Keep,
    Done,
}

/// Drives one tile selection at a time from request to fully streamed material.
///
/// Each `select` bumps the token; the previous selection is dropped on the spot
/// and its in-flight loads are left to finish unobserved.
#[derive(Resource, Debug)]
pub struct SelectionController {
    token: u64,
    state: SelectionState,
    active: Option<ActiveSelection>,
    committed_tile: Option<String>,
    timings: SelectionTimings,
    progress: ProgressIndicator,
}

impl Default for SelectionController {
    fn default() -> Self {
        Self::new(SelectionTimings::default())
    }
}

impl SelectionController {
    pub fn new(timings: SelectionTimings) -> Self {
        Self {
            token: 0,
            state: SelectionState::Idle,
            active: None,
            committed_tile: None,
            timings,
            progress: ProgressIndicator::default(),
        }
    }

    pub fn token(&self) -> u64 {
        self.token
    }

    pub fn is_current(&self, token: u64) -> bool {
        token == self.token
    }

    pub fn state(&self) -> SelectionState {
        self.state
    }

    /// Tile whose material is currently shown.
    pub fn committed_tile(&self) -> Option<&str> {
        self.committed_tile.as_deref()
    }

    pub fn set_timings(&mut self, timings: SelectionTimings) {
        self.timings = timings;
    }

    /// Forget the current and committed selection. Loads still in flight
    /// finish unobserved, as after a newer `select`.
    pub fn end_session(&mut self) {
        self.token += 1;
        self.active = None;
        self.committed_tile = None;
        self.state = SelectionState::Idle;
        self.progress.finish();
    }

    pub fn select(&mut self, tile: Tile, context: SelectionContext, source: &mut impl MapSource, now: f64) -> u64 {
        self.token += 1;
        let initial = tile.params.force_quality.unwrap_or(Quality::OneK);
        let preferred = tile.params.force_quality.unwrap_or(context.preferred);
        info!(
            "[SELECT] Tile '{}' requested (token {}, {} then {})",
            tile.id,
            self.token,
            initial.as_str(),
            preferred.as_str()
        );

        let mut active = ActiveSelection {
            token: self.token,
            tile,
            context,
            initial,
            preferred,
            requests: Vec::new(),
            applied_urls: HashMap::new(),
            albedo_ready_at: None,
            committed_at: None,
            upgrade_scheduled: false,
            heavy_scheduled: false,
            prefetch_sent: false,
        };
        active.request(source, MapKind::Albedo, initial, Priority::High, Stage::Core);
        active.request(source, MapKind::Roughness, initial, Priority::High, Stage::Core);
        active.request(source, MapKind::Ao, initial, Priority::High, Stage::Core);
        active.request(source, MapKind::Normal, initial, Priority::Normal, Stage::Core);

        if context.final_phase {
            let tracked = active
                .requests
                .iter()
                .filter(|r| matches!(r.kind, MapKind::Albedo | MapKind::Roughness | MapKind::Ao))
                .count();
            self.progress.begin(now, tracked);
        } else {
            self.progress.finish();
        }

        self.active = Some(active);
        self.state = SelectionState::LoadingCore;
        self.token
    }

    /// Advance the current selection. Call once per frame.
    pub fn update(&mut self, source: &mut impl MapSource, now: f64) -> Vec<SelectionOutput> {
        let mut outputs = Vec::new();

        if let Some(mut active) = self.active.take() {
            let step = match self.state {
                SelectionState::LoadingCore => self.update_core(&mut active, source, now, &mut outputs),
                SelectionState::MaterialReady | SelectionState::BackgroundUpgrading => {
                    self.update_background(&mut active, source, now, &mut outputs)
                }
                SelectionState::Idle => Step::Done,
            };
            match step {
                Step::Keep => self.active = Some(active),
                Step::Done => {
                    if self.state != SelectionState::Idle {
                        debug!("[SELECT] Token {} settled", active.token);
                    }
                    self.state = SelectionState::Idle;
                }
            }
        }

        if let Some(change) = self.progress.tick(now) {
            outputs.push(SelectionOutput::Progress(change));
        }
        outputs
    }

    fn update_core(
        &mut self,
        active: &mut ActiveSelection,
        source: &mut impl MapSource,
        now: f64,
        outputs: &mut Vec<SelectionOutput>,
    ) -> Step {
        let tracked = [MapKind::Albedo, MapKind::Roughness, MapKind::Ao]
            .into_iter()
            .filter(|kind| active.core_status(&*source, *kind).is_some_and(|s| s.is_settled()))
            .count();
        self.progress.set_loaded(tracked);

        let albedo = match active.core_status(&*source, MapKind::Albedo) {
            Some(ResolveStatus::Pending) => return Step::Keep,
            Some(ResolveStatus::Ready(texture)) => texture,
            Some(ResolveStatus::Missing) | None => {
                warn!(
                    "[SELECT] Albedo for tile '{}' could not be loaded, keeping current material",
                    active.tile.id
                );
                self.progress.finish();
                outputs.push(SelectionOutput::Failed { token: active.token, tile_id: active.tile.id.clone() });
                return Step::Done;
            }
        };

        let ready_at = *active.albedo_ready_at.get_or_insert(now);
        let waited = now - ready_at;
        let ready = if active.context.final_phase {
            active.core_settled(&*source, MapKind::Roughness)
                && active.core_settled(&*source, MapKind::Ao)
                && (active.core_settled(&*source, MapKind::Normal) || waited >= self.timings.final_normal_wait)
        } else {
            (active.core_settled(&*source, MapKind::Normal)
                && active.core_settled(&*source, MapKind::Roughness)
                && active.core_settled(&*source, MapKind::Ao))
                || waited >= self.timings.secondary_wait
        };
        if !ready {
            return Step::Keep;
        }

        let mut maps = Vec::with_capacity(4);
        for kind in [MapKind::Normal, MapKind::Roughness, MapKind::Ao, MapKind::Height] {
            let status = active.core_status(&*source, kind);
            let texture = status.as_ref().and_then(|s| s.ready()).cloned();
            if let Some(request) = active
                .requests
                .iter_mut()
                .find(|r| r.kind == kind && r.stage == Stage::Core)
            {
                request.applied = status.is_some_and(|s| s.is_settled());
            }
            if let Some(texture) = texture.as_ref() {
                active.applied_urls.insert(kind, texture.url.clone());
            }
            maps.push((kind, texture));
        }
        active.applied_urls.insert(MapKind::Albedo, albedo.url.clone());
        if let Some(request) = active.requests.iter_mut().find(|r| r.kind == MapKind::Albedo) {
            request.applied = true;
        }

        info!(
            "[SELECT] Tile '{}' committed (token {}, {})",
            active.tile.id,
            active.token,
            albedo.quality.as_str()
        );
        outputs.push(SelectionOutput::MaterialCommit {
            token: active.token,
            tile: active.tile.clone(),
            albedo,
            maps,
            crossfade: active.context.final_phase,
        });
        active.committed_at = Some(now);
        self.committed_tile = Some(active.tile.id.clone());
        self.state = SelectionState::MaterialReady;
        self.progress.finish();
        Step::Keep
    }

    fn update_background(
        &mut self,
        active: &mut ActiveSelection,
        source: &mut impl MapSource,
        now: f64,
        outputs: &mut Vec<SelectionOutput>,
    ) -> Step {
        for request in active.requests.iter_mut().filter(|r| !r.applied) {
            match source.status(&request.key) {
                ResolveStatus::Pending => {}
                ResolveStatus::Missing => request.applied = true,
                ResolveStatus::Ready(texture) => {
                    request.applied = true;
                    if active.applied_urls.get(&request.kind) == Some(&texture.url) {
                        continue;
                    }
                    active.applied_urls.insert(request.kind, texture.url.clone());
                    debug!("[SELECT] Streaming {} -> {}", request.kind.as_str(), texture.url);
                    outputs.push(SelectionOutput::MapUpdate {
                        token: active.token,
                        crossfade: request.kind == MapKind::Albedo && active.context.final_phase,
                        texture,
                    });
                }
            }
        }

        let since = now - active.committed_at.unwrap_or(now);

        if !active.upgrade_scheduled && since >= self.timings.upgrade_delay {
            active.upgrade_scheduled = true;
            if active.preferred != active.initial {
                let preferred = active.preferred;
                for kind in [MapKind::Albedo, MapKind::Normal, MapKind::Roughness] {
                    active.request(source, kind, preferred, Priority::Normal, Stage::Upgrade);
                }
                self.state = SelectionState::BackgroundUpgrading;
            }
        }

        if !active.heavy_scheduled && since >= self.timings.heavy_settle + self.timings.heavy_delay {
            active.heavy_scheduled = true;
            let preferred = active.preferred;
            if preferred != active.initial {
                active.request(source, MapKind::Ao, preferred, Priority::Normal, Stage::Heavy);
            }
            if active.context.slow_network {
                debug!("[SELECT] Slow network, height map skipped");
            } else {
                active.request(source, MapKind::Height, preferred, Priority::Normal, Stage::Heavy);
            }
            self.state = SelectionState::BackgroundUpgrading;
        }

        if !active.prefetch_sent && since >= self.timings.prefetch_debounce {
            active.prefetch_sent = true;
            outputs.push(SelectionOutput::Prefetch { token: active.token, tile_id: active.tile.id.clone() });
        }

        let finished = active.upgrade_scheduled
            && active.heavy_scheduled
            && active.prefetch_sent
            && active.requests.iter().all(|r| r.applied);
        if finished { Step::Done } else { Step::Keep }
    }
}
