use bevy::prelude::*;
use constants::streaming::{
    AUTO_EXPOSURE_FULL_LUMA, AUTO_EXPOSURE_MAX, AUTO_EXPOSURE_MIN, CROSSFADE_SECS,
};

use super::tile_material::{LayoutMode, TileMaterial};
use crate::engine::assets::palette::Tile;
use crate::engine::assets::texture_files::MapKind;
use crate::engine::loading::resolver::ResolvedTexture;

/// Set one texture slot and its presence flag together.
/// Albedo has no flag; clearing it leaves the fallback white texture bound.
pub fn apply_map(material: &mut TileMaterial, kind: MapKind, texture: Option<&ResolvedTexture>) {
    let handle = texture.map(|t| t.image.clone());
    let present = u32::from(handle.is_some());
    match kind {
        MapKind::Albedo => material.albedo = handle,
        MapKind::Normal => {
            material.normal = handle;
            material.uniforms.has_normal = present;
        }
        MapKind::Roughness => {
            material.roughness = handle;
            material.uniforms.has_roughness = present;
        }
        MapKind::Ao => {
            material.ao = handle;
            material.uniforms.has_ao = present;
        }
        MapKind::Height => {
            material.height = handle;
            material.uniforms.has_height = present;
        }
    }
}

/// Albedo gain for tiles without an authored exposure multiplier.
/// Dark textures get a lower gain so the fixed light rig does not wash them out.
pub fn auto_exposure(mean_luma: f32) -> f32 {
    let t = (mean_luma / AUTO_EXPOSURE_FULL_LUMA).clamp(0.0, 1.0);
    AUTO_EXPOSURE_MIN + (AUTO_EXPOSURE_MAX - AUTO_EXPOSURE_MIN) * t
}

/// Write the tile's scalar parameters into the uniforms.
pub fn apply_tile_params(material: &mut TileMaterial, tile: &Tile, albedo_luma: Option<f32>, layout: LayoutMode) {
    let params = &tile.params;
    let uniforms = &mut material.uniforms;
    uniforms.tile_size = Vec2::new(tile.tile_size.w, tile.tile_size.h);
    uniforms.uv_scale = params.uv_scale;
    uniforms.albedo_gain = params
        .exposure_mult
        .or_else(|| albedo_luma.map(auto_exposure))
        .unwrap_or(AUTO_EXPOSURE_MAX);
    uniforms.contrast = params.contrast;
    uniforms.saturation = params.saturation;
    uniforms.roughness_mult = params.roughness_mult;
    uniforms.spec_strength = params.spec_strength;
    uniforms.normal_scale = params.normal_scale;
    uniforms.bump_scale = params.bump_scale;
    uniforms.layout_mode = layout.as_u32();
}

pub fn smoothstep(t: f64) -> f32 {
    let t = t.clamp(0.0, 1.0);
    (t * t * (3.0 - 2.0 * t)) as f32
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Crossfade {
    pub started: f64,
    pub duration: f64,
}

impl Crossfade {
    pub fn mix_at(&self, now: f64) -> f32 {
        if self.duration <= 0.0 {
            return 1.0;
        }
        smoothstep((now - self.started) / self.duration)
    }

    pub fn is_complete(&self, now: f64) -> bool {
        now - self.started >= self.duration
    }
}

/// The single floor material and the state of its albedo crossfade.
#[derive(Resource, Debug, Default)]
pub struct FloorMaterial {
    pub handle: Option<Handle<TileMaterial>>,
    pub crossfade: Option<Crossfade>,
    pub layout: LayoutMode,
    pub tile_id: Option<String>,
    pub token: u64,
}

impl FloorMaterial {
    /// Fade from the current albedo to `texture`. Without a current albedo the
    /// texture is set directly. A fade already in flight is committed first.
    pub fn begin_crossfade(&mut self, material: &mut TileMaterial, texture: &ResolvedTexture, now: f64) {
        if let Some(next) = material.albedo_next.take() {
            material.albedo = Some(next);
        }
        material.uniforms.albedo_mix = 0.0;

        if material.albedo.is_none() {
            material.albedo = Some(texture.image.clone());
            self.crossfade = None;
            return;
        }
        material.albedo_next = Some(texture.image.clone());
        self.crossfade = Some(Crossfade { started: now, duration: CROSSFADE_SECS });
    }

    /// Direct albedo swap, cancelling any fade.
    pub fn set_albedo(&mut self, material: &mut TileMaterial, texture: &ResolvedTexture) {
        material.albedo_next = None;
        material.uniforms.albedo_mix = 0.0;
        apply_map(material, MapKind::Albedo, Some(texture));
        self.crossfade = None;
    }

    /// Advance the fade. Returns true on the frame the secondary slot is committed.
    pub fn advance_crossfade(&mut self, material: &mut TileMaterial, now: f64) -> bool {
        let Some(fade) = self.crossfade else {
            return false;
        };
        if fade.is_complete(now) {
            if let Some(next) = material.albedo_next.take() {
                material.albedo = Some(next);
            }
            material.uniforms.albedo_mix = 0.0;
            self.crossfade = None;
            return true;
        }
        material.uniforms.albedo_mix = fade.mix_at(now);
        false
    }
}

pub fn advance_crossfade_system(
    time: Res<Time>,
    mut floor: ResMut<FloorMaterial>,
    mut materials: ResMut<Assets<TileMaterial>>,
) {
    if floor.crossfade.is_none() {
        return;
    }
    let Some(handle) = floor.handle.clone() else {
        floor.crossfade = None;
        return;
    };
    if let Some(material) = materials.get_mut(&handle) {
        if floor.advance_crossfade(material, time.elapsed_secs_f64()) {
            debug!("[SELECT] Crossfade committed");
        }
    }
}

/// Apply a layout change to the live material.
pub fn apply_layout(floor: &mut FloorMaterial, materials: &mut Assets<TileMaterial>, layout: LayoutMode) {
    floor.layout = layout;
    if let Some(material) = floor.handle.as_ref().and_then(|h| materials.get_mut(h)) {
        material.uniforms.layout_mode = layout.as_u32();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::assets::palette::{PaletteRecord, normalize_palette};
    use crate::engine::assets::texture_files::Quality;

    fn texture(url: &str, kind: MapKind) -> ResolvedTexture {
        ResolvedTexture {
            url: url.to_string(),
            kind,
            quality: Quality::OneK,
            image: Handle::default(),
            mean_luma: Some(0.1),
        }
    }

    fn albedo_only_tile() -> Tile {
        let record: PaletteRecord =
            serde_json::from_str(r#"{"items":[{"id":"plain","maps":{"albedo":"plain/1k/plain_albedo.webp"}}]}"#)
                .expect("record");
        normalize_palette(&record, None).remove(0)
    }

    #[test]
    fn albedo_only_tile_disables_every_optional_map() {
        let mut material = TileMaterial::default();
        // Leftovers from a previous, fully mapped tile.
        apply_map(&mut material, MapKind::Normal, Some(&texture("n", MapKind::Normal)));
        apply_map(&mut material, MapKind::Height, Some(&texture("h", MapKind::Height)));

        let tile = albedo_only_tile();
        apply_map(&mut material, MapKind::Albedo, Some(&texture("a", MapKind::Albedo)));
        for kind in [MapKind::Normal, MapKind::Roughness, MapKind::Ao, MapKind::Height] {
            apply_map(&mut material, kind, None);
        }
        apply_tile_params(&mut material, &tile, Some(0.1), LayoutMode::Straight);

        let u = material.uniforms;
        assert_eq!((u.has_normal, u.has_roughness, u.has_ao, u.has_height), (0, 0, 0, 0));
        assert!(material.normal.is_none() && material.height.is_none());
        assert!(material.albedo.is_some());
    }

    #[test]
    fn auto_exposure_is_clamped() {
        assert!((auto_exposure(0.0) - 0.70).abs() < 1e-6);
        assert!((auto_exposure(0.125) - 0.85).abs() < 1e-6);
        assert!((auto_exposure(0.9) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn authored_exposure_wins_over_auto() {
        let mut tile = albedo_only_tile();
        let mut material = TileMaterial::default();
        apply_tile_params(&mut material, &tile, Some(0.0), LayoutMode::Diagonal);
        assert!((material.uniforms.albedo_gain - 0.70).abs() < 1e-6);
        assert_eq!(material.uniforms.layout_mode, 1);

        tile.params.exposure_mult = Some(0.9);
        apply_tile_params(&mut material, &tile, Some(0.0), LayoutMode::Straight);
        assert!((material.uniforms.albedo_gain - 0.9).abs() < 1e-6);
    }

    #[test]
    fn crossfade_follows_smoothstep_and_commits() {
        let mut floor = FloorMaterial::default();
        let mut material = TileMaterial::default();
        let first = texture("first", MapKind::Albedo);
        floor.begin_crossfade(&mut material, &first, 0.0);
        // No current albedo: set directly.
        assert!(floor.crossfade.is_none());
        assert!(material.albedo.is_some());

        let second = texture("second", MapKind::Albedo);
        floor.begin_crossfade(&mut material, &second, 1.0);
        assert!(material.albedo_next.is_some());

        assert!(!floor.advance_crossfade(&mut material, 1.07));
        assert!((material.uniforms.albedo_mix - 0.5).abs() < 1e-3);
        assert!(!floor.advance_crossfade(&mut material, 1.035));
        assert!((material.uniforms.albedo_mix - smoothstep(0.25)).abs() < 1e-6);

        assert!(floor.advance_crossfade(&mut material, 1.2));
        assert!(material.albedo_next.is_none());
        assert_eq!(material.uniforms.albedo_mix, 0.0);
        assert!(floor.crossfade.is_none());
    }

    #[test]
    fn new_fade_commits_the_one_in_flight() {
        let mut floor = FloorMaterial::default();
        let mut material = TileMaterial::default();
        floor.set_albedo(&mut material, &texture("a", MapKind::Albedo));
        floor.begin_crossfade(&mut material, &texture("b", MapKind::Albedo), 0.0);
        floor.begin_crossfade(&mut material, &texture("c", MapKind::Albedo), 0.05);
        assert!(material.albedo_next.is_some());
        assert_eq!(floor.crossfade.map(|f| f.started), Some(0.05));
        assert_eq!(material.uniforms.albedo_mix, 0.0);
    }
}
