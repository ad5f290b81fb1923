use bevy::prelude::*;
use bevy::reflect::TypePath;
use bevy::render::render_resource::{AsBindGroup, ShaderRef, ShaderType};
use constants::render_settings::{DEFAULT_ROUGHNESS, GLOBAL_EXPOSURE, LIGHT_DIRECTION};
use serde::{Deserialize, Serialize};

pub const TILE_SHADER_PATH: &str = "shaders/tile_surface.wgsl";

/// How tiles are laid out across the floor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayoutMode {
    #[default]
    Straight,
    /// Grid rotated by 45 degrees.
    Diagonal,
    /// Running bond: every other row shifted by half a tile.
    HalfOffset,
}

impl LayoutMode {
    pub fn as_u32(&self) -> u32 {
        match self {
            Self::Straight => 0,
            Self::Diagonal => 1,
            Self::HalfOffset => 2,
        }
    }

    pub fn from_string(value: &str) -> Option<Self> {
        match value {
            "straight" => Some(Self::Straight),
            "diagonal" => Some(Self::Diagonal),
            "half_offset" => Some(Self::HalfOffset),
            _ => None,
        }
    }
}

/// Scalar inputs of the tile shader. Field order matches `TileUniforms` in WGSL.
#[derive(Debug, Clone, Copy, PartialEq, ShaderType)]
pub struct TileUniforms {
    pub tile_size: Vec2,
    pub uv_scale: f32,
    pub albedo_gain: f32,
    pub exposure: f32,
    pub contrast: f32,
    pub saturation: f32,
    pub roughness_mult: f32,
    pub spec_strength: f32,
    pub normal_scale: f32,
    pub bump_scale: f32,
    pub default_roughness: f32,
    pub alpha: f32,
    /// Blend factor from `albedo` towards `albedo_next` during a crossfade.
    pub albedo_mix: f32,
    pub layout_mode: u32,
    pub has_normal: u32,
    pub has_roughness: u32,
    pub has_ao: u32,
    pub has_height: u32,
    pub light_direction: Vec3,
}

impl Default for TileUniforms {
    fn default() -> Self {
        Self {
            tile_size: Vec2::splat(0.6),
            uv_scale: 1.0,
            albedo_gain: 1.0,
            exposure: GLOBAL_EXPOSURE,
            contrast: 1.0,
            saturation: 1.0,
            roughness_mult: 1.0,
            spec_strength: 0.35,
            normal_scale: 1.0,
            bump_scale: 1.0,
            default_roughness: DEFAULT_ROUGHNESS,
            alpha: 1.0,
            albedo_mix: 0.0,
            layout_mode: LayoutMode::Straight.as_u32(),
            has_normal: 0,
            has_roughness: 0,
            has_ao: 0,
            has_height: 0,
            light_direction: Vec3::from_array(LIGHT_DIRECTION).normalize(),
        }
    }
}

/// The floor fill material. One instance is reused across tile switches.
#[derive(Asset, TypePath, AsBindGroup, Debug, Clone, Default)]
pub struct TileMaterial {
    #[uniform(0)]
    pub uniforms: TileUniforms,

    #[texture(1)]
    #[sampler(2)]
    pub albedo: Option<Handle<Image>>,

    #[texture(3)]
    #[sampler(4)]
    pub albedo_next: Option<Handle<Image>>,

    #[texture(5)]
    #[sampler(6)]
    pub normal: Option<Handle<Image>>,

    #[texture(7)]
    #[sampler(8)]
    pub roughness: Option<Handle<Image>>,

    #[texture(9)]
    #[sampler(10)]
    pub ao: Option<Handle<Image>>,

    #[texture(11)]
    #[sampler(12)]
    pub height: Option<Handle<Image>>,
}

impl Material for TileMaterial {
    fn fragment_shader() -> ShaderRef {
        TILE_SHADER_PATH.into()
    }

    fn alpha_mode(&self) -> AlphaMode {
        AlphaMode::Blend
    }
}
