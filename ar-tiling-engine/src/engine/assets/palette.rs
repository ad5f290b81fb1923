use bevy::prelude::*;
use constants::xr::OBJECT_STORAGE_HOST;
use serde::{Deserialize, Serialize};

use super::texture_files::{MapKind, Quality};

/// Palette JSON exactly as published by the palette service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PaletteRecord {
    #[serde(default, rename = "baseUrl")]
    pub base_url: Option<String>,
    #[serde(default)]
    pub items: Vec<RawPaletteItem>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawPaletteItem {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub preview: Option<String>,
    /// Legacy single-texture field, treated as the albedo map.
    #[serde(default)]
    pub texture: Option<String>,
    #[serde(default)]
    pub maps: Option<RawMapSet>,
    #[serde(default, rename = "tileSizeM")]
    pub tile_size_m: Option<TileSize>,
    #[serde(default)]
    pub params: Option<RawTileParams>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawMapSet {
    #[serde(default)]
    pub albedo: Option<String>,
    #[serde(default)]
    pub normal: Option<String>,
    #[serde(default)]
    pub roughness: Option<String>,
    #[serde(default)]
    pub ao: Option<String>,
    #[serde(default)]
    pub height: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawTileParams {
    pub uv_scale: Option<f32>,
    pub exposure_mult: Option<f32>,
    pub contrast: Option<f32>,
    pub saturation: Option<f32>,
    pub roughness_mult: Option<f32>,
    pub spec_strength: Option<f32>,
    pub normal_scale: Option<f32>,
    pub bump_scale: Option<f32>,
    pub force_quality: Option<Quality>,
}

/// Physical size of one tile repeat, in metres.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TileSize {
    pub w: f32,
    pub h: f32,
}

impl Default for TileSize {
    fn default() -> Self {
        Self { w: 0.6, h: 0.6 }
    }
}

/// Where a tile's albedo came from in the palette record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlbedoSource {
    Maps,
    LegacyTexture,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TileMaps {
    pub albedo: String,
    pub albedo_source: AlbedoSource,
    pub normal: Option<String>,
    pub roughness: Option<String>,
    pub ao: Option<String>,
    pub height: Option<String>,
}

impl TileMaps {
    pub fn get(&self, kind: MapKind) -> Option<&str> {
        match kind {
            MapKind::Albedo => Some(self.albedo.as_str()),
            MapKind::Normal => self.normal.as_deref(),
            MapKind::Roughness => self.roughness.as_deref(),
            MapKind::Ao => self.ao.as_deref(),
            MapKind::Height => self.height.as_deref(),
        }
    }
}

/// Per-tile shading parameters with defaults already substituted.
/// `exposure_mult` stays `None` when not authored so it can be derived from albedo.
#[derive(Debug, Clone, PartialEq)]
pub struct TileParams {
    pub uv_scale: f32,
    pub exposure_mult: Option<f32>,
    pub contrast: f32,
    pub saturation: f32,
    pub roughness_mult: f32,
    pub spec_strength: f32,
    pub normal_scale: f32,
    pub bump_scale: f32,
    pub force_quality: Option<Quality>,
}

impl Default for TileParams {
    fn default() -> Self {
        Self {
            uv_scale: 1.0,
            exposure_mult: None,
            contrast: 1.0,
            saturation: 1.0,
            roughness_mult: 1.0,
            spec_strength: 0.35,
            normal_scale: 1.0,
            bump_scale: 1.0,
            force_quality: None,
        }
    }
}

impl From<&RawTileParams> for TileParams {
    fn from(raw: &RawTileParams) -> Self {
        let defaults = Self::default();
        let positive = |value: Option<f32>, fallback: f32| match value {
            Some(v) if v.is_finite() && v > 0.0 => v,
            _ => fallback,
        };
        Self {
            uv_scale: positive(raw.uv_scale, defaults.uv_scale),
            exposure_mult: raw.exposure_mult.filter(|v| v.is_finite() && *v > 0.0),
            contrast: positive(raw.contrast, defaults.contrast),
            saturation: raw
                .saturation
                .filter(|v| v.is_finite() && *v >= 0.0)
                .unwrap_or(defaults.saturation),
            roughness_mult: positive(raw.roughness_mult, defaults.roughness_mult),
            spec_strength: raw
                .spec_strength
                .filter(|v| v.is_finite() && *v >= 0.0)
                .unwrap_or(defaults.spec_strength),
            normal_scale: raw
                .normal_scale
                .filter(|v| v.is_finite())
                .unwrap_or(defaults.normal_scale),
            bump_scale: raw
                .bump_scale
                .filter(|v| v.is_finite())
                .unwrap_or(defaults.bump_scale),
            force_quality: raw.force_quality,
        }
    }
}

/// A palette item after ingestion. Immutable for the rest of the session.
#[derive(Debug, Clone, PartialEq)]
pub struct Tile {
    pub id: String,
    pub name: String,
    pub preview: Option<String>,
    pub maps: TileMaps,
    pub tile_size: TileSize,
    pub params: TileParams,
}

/// Resolve a palette-relative path.
///
/// Order: absolute URLs as-is, then `baseUrl`, then the bucket root for
/// `surfaces/` paths on the object storage host, then the palette's directory.
pub fn resolve_asset_url(path: &str, base_url: Option<&str>, palette_url: Option<&str>) -> String {
    let path = path.trim();
    if path.contains("://") || path.starts_with("//") || path.starts_with("data:") || path.starts_with('/') {
        return path.to_string();
    }
    let relative = path.trim_start_matches("./");

    if let Some(base) = base_url.filter(|b| !b.trim().is_empty()) {
        return join_url(base.trim(), relative);
    }

    let Some(palette_url) = palette_url else {
        return relative.to_string();
    };

    // Checked before the palette directory: a `surfaces/` path is already
    // rooted at the bucket, and joining it to the palette directory would
    // always succeed and double the prefix.
    if relative.starts_with("surfaces/") {
        if let Some(root) = object_storage_bucket_root(palette_url) {
            return join_url(&root, relative);
        }
    }

    match palette_url.rfind('/') {
        Some(index) => join_url(&palette_url[..index], relative),
        None => relative.to_string(),
    }
}

fn join_url(base: &str, relative: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), relative)
}

/// `https://<host>/<bucket>` when the URL lives on the object storage host.
fn object_storage_bucket_root(url: &str) -> Option<String> {
    let (scheme, rest) = url.split_once("://")?;
    let mut segments = rest.split('/');
    let host = segments.next()?;
    if host != OBJECT_STORAGE_HOST {
        return None;
    }
    let bucket = segments.next().filter(|b| !b.is_empty())?;
    Some(format!("{scheme}://{host}/{bucket}"))
}

/// Normalize a palette record into tiles. Items without any albedo are dropped,
/// and duplicate ids keep their first occurrence.
pub fn normalize_palette(record: &PaletteRecord, palette_url: Option<&str>) -> Vec<Tile> {
    let base = record.base_url.as_deref();
    let resolve = |path: &str| resolve_asset_url(path, base, palette_url);
    let resolve_opt = |path: &Option<String>| {
        path.as_deref()
            .filter(|p| !p.trim().is_empty())
            .map(|p| resolve(p))
    };

    let mut tiles: Vec<Tile> = Vec::with_capacity(record.items.len());
    for item in &record.items {
        if item.id.trim().is_empty() {
            warn!("[PALETTE] Skipping item without id");
            continue;
        }
        if tiles.iter().any(|t| t.id == item.id) {
            warn!("[PALETTE] Duplicate tile id '{}' ignored", item.id);
            continue;
        }

        let maps = item.maps.clone().unwrap_or_default();
        let (albedo, albedo_source) = match (resolve_opt(&maps.albedo), resolve_opt(&item.texture)) {
            (Some(albedo), _) => (albedo, AlbedoSource::Maps),
            (None, Some(legacy)) => (legacy, AlbedoSource::LegacyTexture),
            (None, None) => {
                warn!("[PALETTE] Tile '{}' has no albedo map, dropped", item.id);
                continue;
            }
        };

        let tile_size = item
            .tile_size_m
            .filter(|s| s.w.is_finite() && s.h.is_finite() && s.w > 0.0 && s.h > 0.0)
            .unwrap_or_default();

        tiles.push(Tile {
            id: item.id.clone(),
            name: item.name.clone().unwrap_or_else(|| item.id.clone()),
            preview: resolve_opt(&item.preview),
            maps: TileMaps {
                albedo,
                albedo_source,
                normal: resolve_opt(&maps.normal),
                roughness: resolve_opt(&maps.roughness),
                ao: resolve_opt(&maps.ao),
                height: resolve_opt(&maps.height),
            },
            tile_size,
            params: item.params.as_ref().map(TileParams::from).unwrap_or_default(),
        });
    }
    tiles
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(json: &str) -> PaletteRecord {
        serde_json::from_str(json).expect("palette json")
    }

    #[test]
    fn base_url_wins_over_palette_location() {
        assert_eq!(
            resolve_asset_url("t1/1k/t1_albedo.webp", Some("https://cdn.example/p/"), Some("surfaces/oak/palette.json")),
            "https://cdn.example/p/t1/1k/t1_albedo.webp"
        );
    }

    #[test]
    fn relative_paths_resolve_against_palette_directory() {
        assert_eq!(
            resolve_asset_url("./t1/1k/t1_albedo.webp", None, Some("surfaces/oak/palette.json")),
            "surfaces/oak/t1/1k/t1_albedo.webp"
        );
    }

    #[test]
    fn surface_paths_on_object_storage_use_bucket_root() {
        let palette = "https://storage.googleapis.com/tiles-bucket/surfaces/oak/palette.json";
        assert_eq!(
            resolve_asset_url("surfaces/oak/t1/1k/t1_albedo.webp", None, Some(palette)),
            "https://storage.googleapis.com/tiles-bucket/surfaces/oak/t1/1k/t1_albedo.webp"
        );
        assert_eq!(
            resolve_asset_url("t1/1k/t1_albedo.webp", None, Some(palette)),
            "https://storage.googleapis.com/tiles-bucket/surfaces/oak/t1/1k/t1_albedo.webp"
        );
    }

    #[test]
    fn surface_paths_elsewhere_use_palette_directory() {
        assert_eq!(
            resolve_asset_url("surfaces/oak/t1/1k/t1_albedo.webp", None, Some("https://cdn.example/p/palette.json")),
            "https://cdn.example/p/surfaces/oak/t1/1k/t1_albedo.webp"
        );
    }

    #[test]
    fn absolute_urls_are_untouched() {
        let url = "https://other.example/x.png";
        assert_eq!(resolve_asset_url(url, Some("https://cdn.example"), None), url);
    }

    #[test]
    fn legacy_texture_field_becomes_albedo() {
        let tiles = normalize_palette(
            &record(r#"{"items":[{"id":"a","texture":"a/1k/a_albedo.png"}]}"#),
            Some("surfaces/s/palette.json"),
        );
        assert_eq!(tiles.len(), 1);
        assert_eq!(tiles[0].maps.albedo, "surfaces/s/a/1k/a_albedo.png");
        assert_eq!(tiles[0].maps.albedo_source, AlbedoSource::LegacyTexture);
        assert_eq!(tiles[0].name, "a");
        assert_eq!(tiles[0].tile_size, TileSize::default());
        assert_eq!(tiles[0].params, TileParams::default());
    }

    #[test]
    fn items_without_albedo_or_with_duplicate_ids_are_dropped() {
        let tiles = normalize_palette(
            &record(
                r#"{"items":[
                    {"id":"a","maps":{"albedo":"a.png","normal":"a_n.png"}},
                    {"id":"b","maps":{"normal":"b_n.png"}},
                    {"id":"a","maps":{"albedo":"other.png"}}
                ]}"#,
            ),
            None,
        );
        assert_eq!(tiles.len(), 1);
        assert_eq!(tiles[0].maps.albedo, "a.png");
        assert_eq!(tiles[0].maps.normal.as_deref(), Some("a_n.png"));
        assert!(tiles[0].maps.roughness.is_none());
    }

    #[test]
    fn params_fill_defaults_and_reject_nonsense() {
        let tiles = normalize_palette(
            &record(
                r#"{"items":[{"id":"a","maps":{"albedo":"a.png"},
                    "tileSizeM":{"w":0.3,"h":-1},
                    "params":{"uvScale":2.0,"roughnessMult":-3,"exposureMult":0.8,"forceQuality":"1k"}}]}"#,
            ),
            None,
        );
        let tile = &tiles[0];
        assert_eq!(tile.tile_size, TileSize::default());
        assert_eq!(tile.params.uv_scale, 2.0);
        assert_eq!(tile.params.roughness_mult, 1.0);
        assert_eq!(tile.params.exposure_mult, Some(0.8));
        assert_eq!(tile.params.force_quality, Some(Quality::OneK));
    }
}
