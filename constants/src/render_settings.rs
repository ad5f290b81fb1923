use bevy::color::Color;

pub const DRAW_LINE_WIDTH: f32 = 0.012;
pub const DRAW_VERTEX_SIZE: f32 = 0.018;
pub const RETICLE_RADIUS: f32 = 0.05;

pub const OUTER_GUIDE_COLOUR: Color = Color::srgb(1.0, 1.0, 1.0);
pub const HOLE_GUIDE_COLOUR: Color = Color::srgb(1.0, 0.45, 0.2);
pub const PREVIEW_GUIDE_COLOUR: Color = Color::srgba(1.0, 1.0, 1.0, 0.6);
pub const MASK_FILL_COLOUR: Color = Color::srgba(0.2, 0.6, 1.0, 0.35);

/// Fixed lighting rig for the tile shader.
pub const GLOBAL_EXPOSURE: f32 = 1.0;
pub const LIGHT_DIRECTION: [f32; 3] = [0.35, 0.85, 0.4];
pub const DEFAULT_ROUGHNESS: f32 = 0.8;

/// Render layer used for the 1x1 GPU warmup pass.
pub const WARMUP_RENDER_LAYER: usize = 7;
