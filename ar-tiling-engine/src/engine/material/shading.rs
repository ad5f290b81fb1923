//! CPU formulation of the tile fragment shader.
//!
//! `assets/shaders/tile_surface.wgsl` evaluates the same terms per pixel; keep
//! the two in step. Colours are linear RGB unless noted.

use bevy::math::{Vec2, Vec3};

use super::tile_material::LayoutMode;

pub const LUMA_WEIGHTS: Vec3 = Vec3::new(0.2126, 0.7152, 0.0722);
pub const DIELECTRIC_F0: f32 = 0.04;
pub const AMBIENT_TERM: f32 = 0.35;
pub const ENVIRONMENT_RADIANCE: Vec3 = Vec3::new(0.62, 0.66, 0.72);

/// Map local floor coordinates (metres) to tiling UVs, one unit per tile.
pub fn layout_uv(local: Vec2, tile_size: Vec2, uv_scale: f32, mode: LayoutMode) -> Vec2 {
    let tile = tile_size.max(Vec2::splat(1e-4));
    let local = match mode {
        LayoutMode::Diagonal => Vec2::from_angle(std::f32::consts::FRAC_PI_4).rotate(local),
        LayoutMode::Straight | LayoutMode::HalfOffset => local,
    };
    let mut uv = local * uv_scale / tile;
    if mode == LayoutMode::HalfOffset {
        let row = uv.y.floor();
        if row.rem_euclid(2.0) >= 1.0 {
            uv.x += 0.5;
        }
    }
    uv
}

pub fn luma(colour: Vec3) -> f32 {
    colour.dot(LUMA_WEIGHTS)
}

/// Scale chroma around the pixel's own luminance, leaving luminance unchanged.
pub fn adjust_saturation(colour: Vec3, saturation: f32) -> Vec3 {
    let grey = Vec3::splat(luma(colour));
    grey.lerp(colour, saturation).max(Vec3::ZERO)
}

/// Contrast around mid grey.
pub fn adjust_contrast(colour: Vec3, contrast: f32) -> Vec3 {
    ((colour - Vec3::splat(0.5)) * contrast + Vec3::splat(0.5)).clamp(Vec3::ZERO, Vec3::ONE)
}

/// Tangent-space normal from an optional normal map sample and height gradient.
///
/// `normal_sample` is the raw texel in [0, 1]. `height_gradient` is the height
/// map's finite difference along u and v. The result is in world space for a
/// horizontal floor: tangent +X, bitangent +Z, normal +Y.
pub fn perturbed_normal(
    normal_sample: Option<Vec3>,
    normal_scale: f32,
    height_gradient: Option<Vec2>,
    bump_scale: f32,
) -> Vec3 {
    let mut tangent = match normal_sample {
        Some(sample) => sample * 2.0 - Vec3::ONE,
        None => Vec3::Z,
    };
    tangent.x *= normal_scale;
    tangent.y *= normal_scale;
    if let Some(gradient) = height_gradient {
        tangent.x -= gradient.x * bump_scale;
        tangent.y -= gradient.y * bump_scale;
    }
    let tangent = tangent.normalize_or(Vec3::Z);
    Vec3::new(tangent.x, tangent.z, tangent.y).normalize_or(Vec3::Y)
}

pub fn fresnel_schlick(cos_theta: f32, f0: f32) -> f32 {
    f0 + (1.0 - f0) * (1.0 - cos_theta.clamp(0.0, 1.0)).powi(5)
}

pub fn reinhard(colour: Vec3) -> Vec3 {
    colour / (Vec3::ONE + colour)
}

/// Per-pixel inputs after texture sampling.
#[derive(Debug, Clone, Copy)]
pub struct ShadingInput {
    pub albedo: Vec3,
    pub roughness_sample: Option<f32>,
    pub ao_sample: Option<f32>,
    pub normal: Vec3,
    pub view_dir: Vec3,
    pub light_dir: Vec3,
}

/// Scalar parameters, mirroring the tile uniforms.
#[derive(Debug, Clone, Copy)]
pub struct ShadingParams {
    pub albedo_gain: f32,
    pub exposure: f32,
    pub contrast: f32,
    pub saturation: f32,
    pub roughness_mult: f32,
    pub default_roughness: f32,
    pub spec_strength: f32,
}

impl Default for ShadingParams {
    fn default() -> Self {
        Self {
            albedo_gain: 1.0,
            exposure: 1.0,
            contrast: 1.0,
            saturation: 1.0,
            roughness_mult: 1.0,
            default_roughness: constants::render_settings::DEFAULT_ROUGHNESS,
            spec_strength: 0.35,
        }
    }
}

pub fn shade(input: &ShadingInput, params: &ShadingParams) -> Vec3 {
    let albedo = adjust_saturation(
        adjust_contrast(input.albedo * params.albedo_gain, params.contrast),
        params.saturation,
    );
    let roughness = (input.roughness_sample.unwrap_or(params.default_roughness) * params.roughness_mult)
        .clamp(0.04, 1.0);
    let ao = input.ao_sample.unwrap_or(1.0).clamp(0.0, 1.0);

    let n = input.normal.normalize_or(Vec3::Y);
    let v = input.view_dir.normalize_or(Vec3::Y);
    let l = input.light_dir.normalize_or(Vec3::Y);
    let h = (l + v).normalize_or(n);

    let n_dot_l = n.dot(l).max(0.0);
    let diffuse = albedo * (AMBIENT_TERM + (1.0 - AMBIENT_TERM) * n_dot_l) * ao;

    let gloss = 1.0 - roughness;
    let shininess = 4.0 + 124.0 * gloss * gloss;
    let highlight = n.dot(h).max(0.0).powf(shininess) * gloss * n_dot_l;

    let fresnel = fresnel_schlick(n.dot(v).max(0.0), DIELECTRIC_F0);
    let environment = ENVIRONMENT_RADIANCE * fresnel * gloss * ao;

    let colour = diffuse + (Vec3::splat(highlight) + environment) * params.spec_strength;
    reinhard(colour * params.exposure)
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f32 = 1e-5;

    #[test]
    fn straight_layout_counts_tiles_in_metres() {
        let uv = layout_uv(Vec2::new(1.2, 0.3), Vec2::new(0.6, 0.3), 1.0, LayoutMode::Straight);
        assert!((uv - Vec2::new(2.0, 1.0)).length() < EPS);
        let scaled = layout_uv(Vec2::new(1.2, 0.3), Vec2::new(0.6, 0.3), 2.0, LayoutMode::Straight);
        assert!((scaled - Vec2::new(4.0, 2.0)).length() < EPS);
    }

    #[test]
    fn half_offset_shifts_odd_rows() {
        let tile = Vec2::ONE;
        let even = layout_uv(Vec2::new(0.25, 0.5), tile, 1.0, LayoutMode::HalfOffset);
        let odd = layout_uv(Vec2::new(0.25, 1.5), tile, 1.0, LayoutMode::HalfOffset);
        let negative = layout_uv(Vec2::new(0.25, -0.5), tile, 1.0, LayoutMode::HalfOffset);
        assert!((even.x - 0.25).abs() < EPS);
        assert!((odd.x - 0.75).abs() < EPS);
        assert!((negative.x - 0.75).abs() < EPS);
    }

    #[test]
    fn diagonal_layout_rotates_by_45_degrees() {
        let uv = layout_uv(Vec2::new(1.0, 0.0), Vec2::ONE, 1.0, LayoutMode::Diagonal);
        let half_sqrt2 = std::f32::consts::FRAC_1_SQRT_2;
        assert!((uv - Vec2::new(half_sqrt2, half_sqrt2)).length() < EPS);
    }

    #[test]
    fn saturation_preserves_luma() {
        let colour = Vec3::new(0.8, 0.3, 0.1);
        let grey = adjust_saturation(colour, 0.0);
        assert!((grey.x - grey.y).abs() < EPS && (grey.y - grey.z).abs() < EPS);
        assert!((luma(grey) - luma(colour)).abs() < EPS);
        assert!((adjust_saturation(colour, 1.0) - colour).length() < EPS);
    }

    #[test]
    fn unit_contrast_is_identity() {
        let colour = Vec3::new(0.2, 0.5, 0.9);
        assert!((adjust_contrast(colour, 1.0) - colour).length() < EPS);
        assert!(adjust_contrast(colour, 2.0).x < colour.x);
    }

    #[test]
    fn missing_maps_give_flat_normal() {
        assert!((perturbed_normal(None, 1.0, None, 1.0) - Vec3::Y).length() < EPS);
        // A neutral normal map texel is also flat.
        let neutral = perturbed_normal(Some(Vec3::new(0.5, 0.5, 1.0)), 1.0, None, 1.0);
        assert!((neutral - Vec3::Y).length() < EPS);
    }

    #[test]
    fn height_slope_tilts_normal_away_from_rising_side() {
        let n = perturbed_normal(None, 1.0, Some(Vec2::new(0.5, 0.0)), 1.0);
        assert!(n.x < 0.0);
        assert!((n.length() - 1.0).abs() < EPS);
    }

    #[test]
    fn fresnel_limits() {
        assert!((fresnel_schlick(1.0, DIELECTRIC_F0) - DIELECTRIC_F0).abs() < EPS);
        assert!((fresnel_schlick(0.0, DIELECTRIC_F0) - 1.0).abs() < EPS);
    }

    #[test]
    fn ao_darkens_and_output_stays_below_one() {
        let input = ShadingInput {
            albedo: Vec3::splat(0.8),
            roughness_sample: None,
            ao_sample: None,
            normal: Vec3::Y,
            view_dir: Vec3::new(0.0, 1.0, 1.0),
            light_dir: Vec3::from_array(constants::render_settings::LIGHT_DIRECTION),
        };
        let params = ShadingParams::default();
        let open = shade(&input, &params);
        let occluded = shade(&ShadingInput { ao_sample: Some(0.3), ..input }, &params);
        assert!(luma(occluded) < luma(open));
        assert!(open.max_element() < 1.0);
    }
}
