use bevy::prelude::*;
use constants::streaming::LOAD_TIME_EMA_ALPHA;
use std::collections::{HashMap, HashSet};

use crate::engine::assets::texture_files::{MapKind, Quality, candidate_urls, canonical_key, quality_of};
use crate::engine::loading::scheduler::{LoadJob, LoadScheduler, LoadTicket, Priority};
use crate::engine::loading::texture_fetch::{FetchError, FetchInbox, spawn_texture_fetch, to_bevy_image};

/// A decoded texture resident on the GPU, keyed by its concrete URL.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedTexture {
    pub url: String,
    pub kind: MapKind,
    pub quality: Quality,
    pub image: Handle<Image>,
    pub mean_luma: Option<f32>,
}

/// Identity of one resolution: the logical asset at an effective tier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResolutionKey {
    pub kind: MapKind,
    pub canonical: String,
    pub quality: Quality,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ResolveStatus {
    Pending,
    Ready(ResolvedTexture),
    Missing,
}

impl ResolveStatus {
    pub fn is_settled(&self) -> bool {
        !matches!(self, Self::Pending)
    }

    pub fn ready(&self) -> Option<&ResolvedTexture> {
        match self {
            Self::Ready(texture) => Some(texture),
            _ => None,
        }
    }
}

/// Anything that can turn a logical map URL into a texture over several frames.
pub trait MapSource {
    fn request(&mut self, url: &str, kind: MapKind, preferred: Quality, priority: Priority) -> ResolutionKey;
    fn status(&self, key: &ResolutionKey) -> ResolveStatus;
}

#[derive(Debug)]
struct PendingResolution {
    candidates: Vec<(String, Quality)>,
    next: usize,
    priority: Priority,
    in_flight: Option<LoadTicket>,
}

#[derive(Debug)]
enum Resolution {
    Pending(PendingResolution),
    Ready(ResolvedTexture),
    Missing,
}

#[derive(Debug)]
struct InFlight {
    key: ResolutionKey,
    url: String,
    quality: Quality,
    started: Option<f64>,
}

/// Texture resolution and cache for the page lifetime.
///
/// Failed resolutions are not memoized: asking again restarts the candidate walk.
/// A failed `2k` walk caps that asset at `1k` for the rest of the session.
#[derive(Resource, Debug, Default)]
pub struct TextureResolver {
    resolutions: HashMap<ResolutionKey, Resolution>,
    resolved: HashMap<(MapKind, String), (String, Quality)>,
    textures: HashMap<String, ResolvedTexture>,
    ceilings: HashSet<(MapKind, String)>,
    in_flight: HashMap<LoadTicket, InFlight>,
    /// Queued jobs whose resolution was asked for more urgently.
    promotions: Vec<(LoadTicket, Priority)>,
    load_ema: HashMap<MapKind, f64>,
}

impl TextureResolver {
    /// Moving average of fetch + decode seconds for one map kind.
    pub fn load_time_ema(&self, kind: MapKind) -> Option<f64> {
        self.load_ema.get(&kind).copied()
    }

    pub fn is_capped_at_1k(&self, kind: MapKind, url: &str) -> bool {
        self.ceilings.contains(&(kind, canonical_key(url)))
    }

    /// Submit the next candidate of every idle pending resolution.
    pub fn dispatch(&mut self, scheduler: &mut LoadScheduler) {
        for (ticket, priority) in self.promotions.drain(..) {
            if scheduler.promote(ticket, priority) {
                debug!("[TEX] Load {:?} raised to {:?}", ticket, priority);
            }
        }

        let idle: Vec<ResolutionKey> = self
            .resolutions
            .iter()
            .filter_map(|(key, resolution)| match resolution {
                Resolution::Pending(pending) if pending.in_flight.is_none() => Some(key.clone()),
                _ => None,
            })
            .collect();

        for key in idle {
            self.advance(&key, scheduler);
        }
    }

    fn advance(&mut self, key: &ResolutionKey, scheduler: &mut LoadScheduler) {
        let Some(Resolution::Pending(pending)) = self.resolutions.get(key) else {
            return;
        };
        let candidate = pending.candidates.get(pending.next).cloned();
        let priority = pending.priority;

        let Some((url, quality)) = candidate else {
            if key.quality == Quality::TwoK {
                self.ceilings.insert((key.kind, key.canonical.clone()));
            }
            debug!("[TEX] No candidate for {} {} loaded", key.kind.as_str(), key.canonical);
            self.resolutions.insert(key.clone(), Resolution::Missing);
            return;
        };

        if let Some(texture) = self.textures.get(&url).cloned() {
            if key.quality == Quality::TwoK && quality == Quality::OneK {
                self.ceilings.insert((key.kind, key.canonical.clone()));
            }
            self.resolved
                .insert((key.kind, key.canonical.clone()), (url, quality));
            self.resolutions.insert(key.clone(), Resolution::Ready(texture));
            return;
        }

        let ticket = scheduler.submit(LoadJob { url: url.clone(), kind: key.kind }, priority);
        if let Some(Resolution::Pending(pending)) = self.resolutions.get_mut(key) {
            pending.in_flight = Some(ticket);
        }
        self.in_flight
            .insert(ticket, InFlight { key: key.clone(), url, quality, started: None });
    }

    /// Called when the scheduler admits a job, to start the load timer.
    pub fn mark_started(&mut self, ticket: LoadTicket, now: f64) {
        if let Some(flight) = self.in_flight.get_mut(&ticket) {
            flight.started = Some(now);
        }
    }

    /// Record the outcome of one candidate fetch.
    pub fn complete(
        &mut self,
        ticket: LoadTicket,
        result: Result<(Handle<Image>, Option<f32>), FetchError>,
        now: f64,
    ) {
        let Some(flight) = self.in_flight.remove(&ticket) else {
            return;
        };
        let InFlight { key, url, quality, started } = flight;

        match result {
            Ok((image, mean_luma)) => {
                if let Some(started) = started {
                    self.record_load_time(key.kind, now - started);
                }
                let texture = ResolvedTexture { url: url.clone(), kind: key.kind, quality, image, mean_luma };
                self.textures.insert(url.clone(), texture.clone());
                self.resolved
                    .insert((key.kind, key.canonical.clone()), (url.clone(), quality));
                if key.quality == Quality::TwoK && quality == Quality::OneK {
                    info!("[TEX] {} capped at 1k for {}", key.kind.as_str(), key.canonical);
                    self.ceilings.insert((key.kind, key.canonical.clone()));
                }
                debug!("[TEX] Resolved {} -> {}", key.canonical, url);
                self.resolutions.insert(key, Resolution::Ready(texture));
            }
            Err(error) => {
                debug!("[TEX] Candidate skipped: {}", error);
                if let Some(Resolution::Pending(pending)) = self.resolutions.get_mut(&key) {
                    if pending.in_flight == Some(ticket) {
                        pending.in_flight = None;
                        pending.next += 1;
                    }
                }
            }
        }
    }

    /// Drop settled resolutions and their textures when an AR session ends.
    /// Resolved URLs and 1k ceilings survive, so later sessions skip straight
    /// to the candidate that worked.
    pub fn evict_settled(&mut self) -> usize {
        let before = self.resolutions.len();
        self.resolutions
            .retain(|_, resolution| matches!(resolution, Resolution::Pending(_)));
        self.textures.clear();
        let evicted = before - self.resolutions.len();
        if evicted > 0 {
            info!("[TEX] Evicted {} settled resolutions", evicted);
        }
        evicted
    }

    fn record_load_time(&mut self, kind: MapKind, seconds: f64) {
        let seconds = seconds.max(0.0);
        let average = match self.load_ema.get(&kind) {
            Some(previous) => LOAD_TIME_EMA_ALPHA * seconds + (1.0 - LOAD_TIME_EMA_ALPHA) * previous,
            None => seconds,
        };
        self.load_ema.insert(kind, average);
    }
}

impl MapSource for TextureResolver {
    fn request(&mut self, url: &str, kind: MapKind, preferred: Quality, priority: Priority) -> ResolutionKey {
        let canonical = canonical_key(url);
        let effective = match quality_of(url) {
            None => Quality::OneK,
            Some(_) if preferred == Quality::TwoK && self.ceilings.contains(&(kind, canonical.clone())) => {
                Quality::OneK
            }
            Some(_) => preferred,
        };
        let key = ResolutionKey { kind, canonical, quality: effective };

        match self.resolutions.get_mut(&key) {
            Some(Resolution::Ready(_)) => return key,
            Some(Resolution::Pending(pending)) => {
                if priority < pending.priority {
                    pending.priority = priority;
                    if let Some(ticket) = pending.in_flight {
                        self.promotions.push((ticket, priority));
                    }
                }
                return key;
            }
            Some(Resolution::Missing) | None => {}
        }

        let mut candidates = candidate_urls(url, effective);
        if let Some((resolved_url, resolved_quality)) = self.resolved.get(&(kind, key.canonical.clone())) {
            if *resolved_quality == effective || quality_of(url).is_none() {
                if let Some(cached) = self.textures.get(resolved_url) {
                    self.resolutions.insert(key.clone(), Resolution::Ready(cached.clone()));
                    return key;
                }
                candidates.retain(|(candidate, _)| candidate != resolved_url);
                candidates.insert(0, (resolved_url.clone(), *resolved_quality));
            }
        }

        self.resolutions.insert(
            key.clone(),
            Resolution::Pending(PendingResolution { candidates, next: 0, priority, in_flight: None }),
        );
        key
    }

    fn status(&self, key: &ResolutionKey) -> ResolveStatus {
        match self.resolutions.get(key) {
            Some(Resolution::Ready(texture)) => ResolveStatus::Ready(texture.clone()),
            Some(Resolution::Pending(_)) => ResolveStatus::Pending,
            Some(Resolution::Missing) => ResolveStatus::Missing,
            None => ResolveStatus::Missing,
        }
    }
}

/// Collect finished fetches, submit pending candidates and start admitted jobs.
pub fn drive_texture_loading(
    time: Res<Time>,
    inbox: Res<FetchInbox>,
    mut resolver: ResMut<TextureResolver>,
    mut scheduler: ResMut<LoadScheduler>,
    mut images: ResMut<Assets<Image>>,
) {
    let now = time.elapsed_secs_f64();

    for outcome in inbox.drain() {
        scheduler.finish(outcome.ticket);
        let kind = outcome.kind;
        let result = outcome.result.map(|decoded| {
            let mean_luma = decoded.mean_luma;
            (images.add(to_bevy_image(decoded, kind)), mean_luma)
        });
        resolver.complete(outcome.ticket, result, now);
    }

    resolver.dispatch(&mut scheduler);

    for (ticket, job) in scheduler.admit() {
        resolver.mark_started(ticket, now);
        spawn_texture_fetch(&inbox, ticket, job.url, job.kind);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn not_found(url: &str) -> FetchError {
        FetchError::Status { url: url.to_string(), status: 404 }
    }

    /// Run admitted jobs through `respond` until the scheduler is idle, returning attempted URLs.
    fn pump(
        resolver: &mut TextureResolver,
        scheduler: &mut LoadScheduler,
        now: f64,
        mut respond: impl FnMut(&str) -> bool,
    ) -> Vec<String> {
        let mut attempted = Vec::new();
        loop {
            resolver.dispatch(scheduler);
            let admitted = scheduler.admit();
            if admitted.is_empty() {
                break;
            }
            for (ticket, job) in admitted {
                resolver.mark_started(ticket, now);
                scheduler.finish(ticket);
                attempted.push(job.url.clone());
                let result = if respond(&job.url) {
                    Ok((Handle::default(), None))
                } else {
                    Err(not_found(&job.url))
                };
                resolver.complete(ticket, result, now + 0.5);
            }
        }
        attempted
    }

    #[test]
    fn missing_texture_walks_every_candidate_before_giving_up() {
        let mut resolver = TextureResolver::default();
        let mut scheduler = LoadScheduler::new(4);
        let key = resolver.request("s/t/1k/x_albedo.webp", MapKind::Albedo, Quality::TwoK, Priority::High);

        let attempted = pump(&mut resolver, &mut scheduler, 0.0, |_| false);
        assert_eq!(
            attempted,
            vec![
                "s/t/2k/x_albedo.webp",
                "s/t/2k/x_albedo.png",
                "s/t/2k/x_albedo.jpg",
                "s/t/1k/x_albedo.webp",
                "s/t/1k/x_albedo.png",
                "s/t/1k/x_albedo.jpg",
            ]
        );
        assert_eq!(resolver.status(&key), ResolveStatus::Missing);
    }

    #[test]
    fn one_k_request_tries_extension_family_only() {
        let mut resolver = TextureResolver::default();
        let mut scheduler = LoadScheduler::new(4);
        let key = resolver.request("s/t/1k/x_albedo.webp", MapKind::Albedo, Quality::OneK, Priority::High);
        let attempted = pump(&mut resolver, &mut scheduler, 0.0, |url| url.ends_with(".jpg"));
        assert_eq!(attempted, vec!["s/t/1k/x_albedo.webp", "s/t/1k/x_albedo.png", "s/t/1k/x_albedo.jpg"]);
        let texture = resolver.status(&key).ready().cloned().expect("resolved");
        assert_eq!(texture.url, "s/t/1k/x_albedo.jpg");
        assert_eq!(texture.quality, Quality::OneK);
    }

    #[test]
    fn failed_two_k_caps_asset_at_one_k() {
        let mut resolver = TextureResolver::default();
        let mut scheduler = LoadScheduler::new(4);
        let url = "s/t/1k/x_normal.webp";
        resolver.request(url, MapKind::Normal, Quality::TwoK, Priority::Normal);
        pump(&mut resolver, &mut scheduler, 0.0, |url| url.contains("/1k/"));
        assert!(resolver.is_capped_at_1k(MapKind::Normal, url));

        // A later 2k request goes straight to the cached 1k texture.
        let key = resolver.request("s/t/2k/x_normal.png", MapKind::Normal, Quality::TwoK, Priority::Normal);
        assert_eq!(key.quality, Quality::OneK);
        let attempted = pump(&mut resolver, &mut scheduler, 1.0, |_| true);
        assert!(attempted.is_empty());
        assert_eq!(
            resolver.status(&key).ready().map(|t| t.url.as_str()),
            Some("s/t/1k/x_normal.webp")
        );
    }

    #[test]
    fn concurrent_requests_share_one_resolution() {
        let mut resolver = TextureResolver::default();
        let mut scheduler = LoadScheduler::new(4);
        let a = resolver.request("s/t/1k/x_ao.webp", MapKind::Ao, Quality::OneK, Priority::Normal);
        let b = resolver.request("s/t/1k/x_ao.png?v=2", MapKind::Ao, Quality::OneK, Priority::High);
        assert_eq!(a, b);
        let attempted = pump(&mut resolver, &mut scheduler, 0.0, |_| true);
        assert_eq!(attempted.len(), 1);
        assert!(resolver.status(&a).is_settled());
    }

    #[test]
    fn failure_is_not_memoized() {
        let mut resolver = TextureResolver::default();
        let mut scheduler = LoadScheduler::new(4);
        let key = resolver.request("s/t/1k/x_albedo.png", MapKind::Albedo, Quality::OneK, Priority::High);
        pump(&mut resolver, &mut scheduler, 0.0, |_| false);
        assert_eq!(resolver.status(&key), ResolveStatus::Missing);

        resolver.request("s/t/1k/x_albedo.png", MapKind::Albedo, Quality::OneK, Priority::High);
        assert_eq!(resolver.status(&key), ResolveStatus::Pending);
        let attempted = pump(&mut resolver, &mut scheduler, 1.0, |_| true);
        assert_eq!(attempted, vec!["s/t/1k/x_albedo.png"]);
    }

    #[test]
    fn load_time_average_is_tracked_per_kind() {
        let mut resolver = TextureResolver::default();
        let mut scheduler = LoadScheduler::new(4);
        resolver.request("a/1k/a_albedo.png", MapKind::Albedo, Quality::OneK, Priority::High);
        pump(&mut resolver, &mut scheduler, 0.0, |_| true);
        assert_eq!(resolver.load_time_ema(MapKind::Albedo), Some(0.5));
        assert_eq!(resolver.load_time_ema(MapKind::Normal), None);

        resolver.request("b/1k/b_albedo.png", MapKind::Albedo, Quality::OneK, Priority::High);
        pump(&mut resolver, &mut scheduler, 10.0, |_| true);
        let ema = resolver.load_time_ema(MapKind::Albedo).unwrap_or_default();
        assert!((ema - 0.5).abs() < 1e-9);
    }

    #[test]
    fn raised_priority_requeues_the_waiting_job() {
        let mut resolver = TextureResolver::default();
        let mut scheduler = LoadScheduler::new(1);
        for name in ["a", "b", "c"] {
            resolver.request(&format!("s/{name}/1k/{name}_normal.png"), MapKind::Normal, Quality::OneK, Priority::Normal);
            resolver.dispatch(&mut scheduler);
        }
        let running = scheduler.admit();
        assert_eq!(running.len(), 1);
        assert_eq!(scheduler.queued(), 2);

        resolver.request("s/c/1k/c_normal.png", MapKind::Normal, Quality::OneK, Priority::High);
        resolver.dispatch(&mut scheduler);
        assert_eq!(scheduler.queued(), 2);

        scheduler.finish(running[0].0);
        let next = scheduler.admit();
        assert_eq!(next.first().map(|(_, job)| job.url.as_str()), Some("s/c/1k/c_normal.png"));
    }

    #[test]
    fn eviction_keeps_resolved_urls_and_ceilings() {
        let mut resolver = TextureResolver::default();
        let mut scheduler = LoadScheduler::new(4);
        let key = resolver.request("s/t/1k/x_albedo.webp", MapKind::Albedo, Quality::TwoK, Priority::High);
        pump(&mut resolver, &mut scheduler, 0.0, |url| url.ends_with("1k/x_albedo.png"));
        assert!(resolver.status(&key).is_settled());

        assert_eq!(resolver.evict_settled(), 1);
        assert_eq!(resolver.status(&key), ResolveStatus::Missing);
        assert!(resolver.is_capped_at_1k(MapKind::Albedo, "s/t/1k/x_albedo.webp"));

        let key = resolver.request("s/t/1k/x_albedo.webp", MapKind::Albedo, Quality::TwoK, Priority::High);
        assert_eq!(key.quality, Quality::OneK);
        let attempted = pump(&mut resolver, &mut scheduler, 1.0, |_| true);
        assert_eq!(attempted, vec!["s/t/1k/x_albedo.png"]);
        assert!(resolver.status(&key).ready().is_some());
    }
}
