use bevy::prelude::*;
use constants::streaming::PREFETCH_NORMAL_WAIT_SECS;
use std::collections::HashSet;

use crate::engine::assets::catalog::ActivePalette;
use crate::engine::assets::palette::Tile;
use crate::engine::assets::texture_files::{MapKind, Quality};
use crate::engine::loading::device_signals::DeviceSignals;
use crate::engine::loading::resolver::{MapSource, ResolutionKey, ResolvedTexture, TextureResolver};
use crate::engine::loading::scheduler::Priority;

/// Emitted by the selection controller once a committed selection has settled briefly.
#[derive(Event, Debug, Clone)]
pub struct PrefetchEvent {
    pub tile_id: String,
}

/// Textures to push through a throwaway draw so the GPU upload happens early.
#[derive(Event, Debug, Clone, PartialEq)]
pub struct WarmupRequest {
    pub tile_id: String,
    pub textures: Vec<ResolvedTexture>,
}

#[derive(Debug)]
struct PrefetchJob {
    tile_id: String,
    albedo: ResolutionKey,
    roughness: Option<ResolutionKey>,
    normal: Option<ResolutionKey>,
    core_settled_at: Option<f64>,
}

/// Neighbour preloading. Each tile is prefetched at most once per palette.
#[derive(Resource, Debug)]
pub struct PrefetchQueue {
    jobs: Vec<PrefetchJob>,
    seen: HashSet<String>,
    normal_wait: f64,
}

impl Default for PrefetchQueue {
    fn default() -> Self {
        Self { jobs: Vec::new(), seen: HashSet::new(), normal_wait: PREFETCH_NORMAL_WAIT_SECS }
    }
}

impl PrefetchQueue {
    pub fn clear(&mut self) {
        self.jobs.clear();
        self.seen.clear();
    }

    /// Queue albedo, roughness and a best-effort normal at normal priority.
    pub fn start(&mut self, tile: &Tile, source: &mut impl MapSource) -> bool {
        if !self.seen.insert(tile.id.clone()) {
            return false;
        }
        let mut request = |kind: MapKind| {
            tile.maps
                .get(kind)
                .map(|url| source.request(url, kind, Quality::OneK, Priority::Normal))
        };
        let Some(albedo) = request(MapKind::Albedo) else {
            return false;
        };
        let roughness = request(MapKind::Roughness);
        let normal = request(MapKind::Normal);
        self.jobs.push(PrefetchJob {
            tile_id: tile.id.clone(),
            albedo,
            roughness,
            normal,
            core_settled_at: None,
        });
        true
    }

    /// Finished jobs become warmup requests; jobs whose albedo failed are dropped.
    pub fn poll(&mut self, source: &impl MapSource, now: f64) -> Vec<WarmupRequest> {
        let normal_wait = self.normal_wait;
        let mut ready = Vec::new();
        self.jobs.retain_mut(|job| {
            let settled = |key: &Option<ResolutionKey>| key.as_ref().is_none_or(|k| source.status(k).is_settled());
            if !source.status(&job.albedo).is_settled() || !settled(&job.roughness) {
                return true;
            }
            let since = now - *job.core_settled_at.get_or_insert(now);
            if !settled(&job.normal) && since < normal_wait {
                return true;
            }

            let textures: Vec<ResolvedTexture> = [Some(&job.albedo), job.roughness.as_ref(), job.normal.as_ref()]
                .into_iter()
                .flatten()
                .filter_map(|key| source.status(key).ready().cloned())
                .collect();
            if textures.iter().any(|t| t.kind == MapKind::Albedo) {
                ready.push(WarmupRequest { tile_id: job.tile_id.clone(), textures });
            }
            false
        });
        ready
    }
}

pub fn handle_prefetch_events(
    mut events: EventReader<PrefetchEvent>,
    palette: Res<ActivePalette>,
    signals: Res<DeviceSignals>,
    mut queue: ResMut<PrefetchQueue>,
    mut resolver: ResMut<TextureResolver>,
) {
    for event in events.read() {
        if signals.is_slow_network() {
            debug!("[SELECT] Constrained network, prefetch skipped");
            continue;
        }
        for neighbour in palette.neighbours(&event.tile_id) {
            if queue.start(neighbour, resolver.as_mut()) {
                debug!("[SELECT] Prefetching neighbour '{}'", neighbour.id);
            }
        }
    }
}

pub fn poll_prefetch(
    time: Res<Time>,
    resolver: Res<TextureResolver>,
    mut queue: ResMut<PrefetchQueue>,
    mut warmups: EventWriter<WarmupRequest>,
) {
    for request in queue.poll(resolver.as_ref(), time.elapsed_secs_f64()) {
        warmups.write(request);
    }
}

/// A new palette invalidates the neighbour bookkeeping.
pub fn reset_prefetch_on_palette_change(palette: Res<ActivePalette>, mut queue: ResMut<PrefetchQueue>) {
    if palette.is_changed() {
        queue.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::assets::palette::{PaletteRecord, normalize_palette};
    use crate::engine::loading::resolver::ResolveStatus;
    use std::collections::HashMap;

    #[derive(Default)]
    struct Source {
        statuses: HashMap<ResolutionKey, ResolveStatus>,
        priorities: Vec<Priority>,
    }

    impl MapSource for Source {
        fn request(&mut self, url: &str, kind: MapKind, preferred: Quality, priority: Priority) -> ResolutionKey {
            self.priorities.push(priority);
            let key = ResolutionKey { kind, canonical: url.to_string(), quality: preferred };
            self.statuses.entry(key.clone()).or_insert(ResolveStatus::Pending);
            key
        }

        fn status(&self, key: &ResolutionKey) -> ResolveStatus {
            self.statuses.get(key).cloned().unwrap_or(ResolveStatus::Missing)
        }
    }

    impl Source {
        fn ready(&mut self, kind: MapKind) {
            for (key, status) in self.statuses.iter_mut() {
                if key.kind == kind {
                    *status = ResolveStatus::Ready(ResolvedTexture {
                        url: key.canonical.clone(),
                        kind,
                        quality: Quality::OneK,
                        image: Handle::default(),
                        mean_luma: None,
                    });
                }
            }
        }
    }

    fn tile() -> Tile {
        let record: PaletteRecord = serde_json::from_str(
            r#"{"items":[{"id":"n","maps":{"albedo":"n/1k/a.webp","roughness":"n/1k/r.webp","normal":"n/1k/n.webp"}}]}"#,
        )
        .expect("record");
        normalize_palette(&record, None).remove(0)
    }

    #[test]
    fn prefetch_uses_normal_priority_once_per_tile() {
        let mut source = Source::default();
        let mut queue = PrefetchQueue::default();
        assert!(queue.start(&tile(), &mut source));
        assert!(!queue.start(&tile(), &mut source));
        assert_eq!(source.priorities, vec![Priority::Normal; 3]);
    }

    #[test]
    fn normal_is_best_effort() {
        let mut source = Source::default();
        let mut queue = PrefetchQueue::default();
        queue.start(&tile(), &mut source);
        assert!(queue.poll(&source, 0.0).is_empty());

        source.ready(MapKind::Albedo);
        source.ready(MapKind::Roughness);
        assert!(queue.poll(&source, 1.0).is_empty());
        assert!(queue.poll(&source, 1.1).is_empty());
        let warmups = queue.poll(&source, 1.23);
        assert_eq!(warmups.len(), 1);
        assert_eq!(warmups[0].textures.len(), 2);
        assert!(queue.poll(&source, 2.0).is_empty());
    }
}
