use bevy::prelude::*;
use serde::{Deserialize, Serialize};

use super::palette::Tile;
use super::texture_files::surface_palette_path;

/// Shape catalog as a Bevy asset. Mirrors the JSON structure exactly.
#[derive(Asset, Debug, Clone, Default, Serialize, Deserialize, TypePath, Resource)]
pub struct ShapeCatalog {
    #[serde(default)]
    pub shapes: Vec<ShapeEntry>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShapeEntry {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hero: Option<String>,
    #[serde(default)]
    pub gallery: Vec<String>,
    /// Display order of tiles for this shape. Palette order applies when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tile_ids: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub surface_palette: Option<String>,
    /// Free-form technical sheet shown by the host page.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tech: Option<serde_json::Map<String, serde_json::Value>>,
}

impl ShapeCatalog {
    pub fn shape(&self, id: &str) -> Option<&ShapeEntry> {
        self.shapes.iter().find(|shape| shape.id == id)
    }
}

impl ShapeEntry {
    /// Palette location, falling back to the surface layout convention.
    pub fn palette_path(&self) -> String {
        match self.surface_palette.as_deref() {
            Some(path) if !path.trim().is_empty() => path.trim().to_string(),
            _ => surface_palette_path(&self.id),
        }
    }

    /// Arrange palette tiles in display order.
    ///
    /// With `tileIds`, listed tiles come first in that order and unknown ids are
    /// skipped; tiles the list omits are not shown.
    pub fn display_order(&self, tiles: Vec<Tile>) -> Vec<Tile> {
        let Some(order) = self.tile_ids.as_ref().filter(|ids| !ids.is_empty()) else {
            return tiles;
        };
        let mut remaining: Vec<Option<Tile>> = tiles.into_iter().map(Some).collect();
        let mut ordered = Vec::with_capacity(order.len());
        for id in order {
            let slot = remaining
                .iter_mut()
                .find(|slot| slot.as_ref().is_some_and(|tile| &tile.id == id));
            match slot.and_then(Option::take) {
                Some(tile) => ordered.push(tile),
                None => debug!("[PALETTE] Catalog lists unknown tile '{}'", id),
            }
        }
        ordered
    }
}

/// Tiles of the currently selected shape, in display order.
#[derive(Resource, Debug, Default, Clone)]
pub struct ActivePalette {
    pub shape_id: Option<String>,
    pub tiles: Vec<Tile>,
}

impl ActivePalette {
    pub fn tile(&self, id: &str) -> Option<&Tile> {
        self.tiles.iter().find(|tile| tile.id == id)
    }

    /// Tiles adjacent to `id` in display order (previous, then next).
    pub fn neighbours(&self, id: &str) -> Vec<&Tile> {
        let Some(index) = self.tiles.iter().position(|tile| tile.id == id) else {
            return Vec::new();
        };
        let mut result = Vec::with_capacity(2);
        if index > 0 {
            result.push(&self.tiles[index - 1]);
        }
        if let Some(next) = self.tiles.get(index + 1) {
            result.push(next);
        }
        result
    }
}
