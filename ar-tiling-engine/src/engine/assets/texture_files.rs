use serde::{Deserialize, Serialize};

/// Texture map slots a tile can provide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MapKind {
    Albedo,
    Normal,
    Roughness,
    Ao,
    Height,
}

impl MapKind {
    pub const ALL: [MapKind; 5] = [
        MapKind::Albedo,
        MapKind::Normal,
        MapKind::Roughness,
        MapKind::Ao,
        MapKind::Height,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Albedo => "albedo",
            Self::Normal => "normal",
            Self::Roughness => "roughness",
            Self::Ao => "ao",
            Self::Height => "height",
        }
    }

    /// Only albedo carries colour data; every other map is sampled linearly.
    pub fn is_srgb(&self) -> bool {
        matches!(self, Self::Albedo)
    }
}

/// Resolution tier of a texture asset, encoded as a `/1k/` or `/2k/` path segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Quality {
    #[serde(rename = "1k")]
    OneK,
    #[serde(rename = "2k")]
    TwoK,
}

impl Quality {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OneK => "1k",
            Self::TwoK => "2k",
        }
    }

    pub fn from_segment(segment: &str) -> Option<Self> {
        match segment {
            "1k" => Some(Self::OneK),
            "2k" => Some(Self::TwoK),
            _ => None,
        }
    }
}

/// Interchangeable encodings of the same texture, in lookup order.
pub const EXTENSION_FAMILY: [&str; 3] = ["webp", "png", "jpg"];

const QUALITY_PLACEHOLDER: &str = "{q}";

/// Split `url` into the part before any query/fragment and the suffix itself.
fn split_query(url: &str) -> (&str, &str) {
    match url.find(['?', '#']) {
        Some(index) => url.split_at(index),
        None => (url, ""),
    }
}

/// Split a path into stem and extension; only the last path segment is considered.
fn split_extension(path: &str) -> (&str, Option<&str>) {
    let name_start = path.rfind('/').map_or(0, |i| i + 1);
    match path[name_start..].rfind('.') {
        Some(dot) if dot > 0 => {
            let split = name_start + dot;
            (&path[..split], Some(&path[split + 1..]))
        }
        _ => (path, None),
    }
}

/// Byte range of the quality directory segment (without slashes).
fn quality_segment(path: &str) -> Option<(usize, usize, Quality)> {
    let mut offset = 0;
    for segment in path.split('/') {
        let end = offset + segment.len();
        // The final segment is the file name, never a tier directory.
        if end < path.len() {
            if let Some(quality) = Quality::from_segment(segment) {
                return Some((offset, end, quality));
            }
        }
        offset = end + 1;
    }
    None
}

/// Quality tier encoded in the URL path, if any.
pub fn quality_of(url: &str) -> Option<Quality> {
    let (path, _) = split_query(url);
    quality_segment(path).map(|(_, _, quality)| quality)
}

/// Rewrite the quality segment of `url`. URLs without one are returned unchanged.
pub fn with_quality(url: &str, quality: Quality) -> String {
    let (path, suffix) = split_query(url);
    match quality_segment(path) {
        Some((start, end, _)) => format!("{}{}{}{}", &path[..start], quality.as_str(), &path[end..], suffix),
        None => url.to_string(),
    }
}

/// Cache identity shared by every tier and encoding of the same logical asset.
pub fn canonical_key(url: &str) -> String {
    let (path, _) = split_query(url);
    let path = match quality_segment(path) {
        Some((start, end, _)) => format!("{}{}{}", &path[..start], QUALITY_PLACEHOLDER, &path[end..]),
        None => path.to_string(),
    };
    let (stem, _) = split_extension(&path);
    stem.to_string()
}

/// The URL itself followed by its alternate encodings from the extension family.
pub fn extension_variants(url: &str) -> Vec<String> {
    let (path, suffix) = split_query(url);
    let (stem, extension) = split_extension(path);
    let Some(extension) = extension else {
        return vec![url.to_string()];
    };
    let lowered = extension.to_ascii_lowercase();
    let lowered = if lowered == "jpeg" { "jpg".to_string() } else { lowered };
    if !EXTENSION_FAMILY.contains(&lowered.as_str()) {
        return vec![url.to_string()];
    }

    let mut variants = vec![url.to_string()];
    for candidate in EXTENSION_FAMILY {
        if candidate != lowered {
            variants.push(format!("{stem}.{candidate}{suffix}"));
        }
    }
    variants
}

/// Ordered candidate list for a logical URL: the preferred tier family first,
/// then the 1k family when 2k was preferred.
pub fn candidate_urls(url: &str, preferred: Quality) -> Vec<(String, Quality)> {
    if quality_of(url).is_none() {
        return extension_variants(url)
            .into_iter()
            .map(|variant| (variant, preferred))
            .collect();
    }

    let tiers: &[Quality] = match preferred {
        Quality::TwoK => &[Quality::TwoK, Quality::OneK],
        Quality::OneK => &[Quality::OneK],
    };

    let mut candidates: Vec<(String, Quality)> = Vec::new();
    for tier in tiers {
        for variant in extension_variants(&with_quality(url, *tier)) {
            if !candidates.iter().any(|(existing, _)| existing == &variant) {
                candidates.push((variant, *tier));
            }
        }
    }
    candidates
}

/// Default palette location for a shape inside the surface asset layout.
pub fn surface_palette_path(shape_id: &str) -> String {
    format!("surfaces/{shape_id}/palette.json")
}
