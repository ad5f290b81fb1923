use bevy::asset::RenderAssetUsages;
use bevy::image::{ImageAddressMode, ImageFilterMode, ImageSampler, ImageSamplerDescriptor};
use bevy::prelude::*;
use bevy::render::render_resource::{Extent3d, TextureDimension, TextureFormat};
use constants::streaming::ASSET_ROOT;
use std::sync::{Arc, Mutex};
use thiserror::Error;

use crate::engine::assets::texture_files::MapKind;
use crate::engine::loading::scheduler::LoadTicket;

/// Largest number of pixels sampled when estimating albedo luminance.
const LUMA_SAMPLE_BUDGET: usize = 65_536;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request for {url} failed: {reason}")]
    Request { url: String, reason: String },
    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },
    #[error("could not read {url}: {source}")]
    Io {
        url: String,
        #[source]
        source: std::io::Error,
    },
    #[error("could not decode {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: image::ImageError,
    },
    #[error("{url} is not valid JSON: {source}")]
    Json {
        url: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("remote URL {0} cannot be fetched by the desktop build")]
    Unsupported(String),
}

/// RGBA8 pixels ready to become a GPU texture.
#[derive(Debug, Clone)]
pub struct DecodedTexture {
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
    /// Mean linear luminance, only measured for albedo maps.
    pub mean_luma: Option<f32>,
}

#[derive(Debug)]
pub struct FetchOutcome {
    pub ticket: LoadTicket,
    pub url: String,
    pub kind: MapKind,
    pub result: Result<DecodedTexture, FetchError>,
}

/// Completed fetches waiting to be picked up by the resolver system.
#[derive(Resource, Clone, Default)]
pub struct FetchInbox(pub Arc<Mutex<Vec<FetchOutcome>>>);

impl FetchInbox {
    pub fn push(&self, outcome: FetchOutcome) {
        if let Ok(mut queue) = self.0.lock() {
            queue.push(outcome);
        }
    }

    pub fn drain(&self) -> Vec<FetchOutcome> {
        match self.0.lock() {
            Ok(mut queue) => std::mem::take(&mut *queue),
            Err(_) => Vec::new(),
        }
    }
}

/// Paths relative to the page (or working directory) live under the asset root.
pub fn is_remote(url: &str) -> bool {
    url.contains("://") || url.starts_with("//") || url.starts_with("data:")
}

pub fn decode_texture(url: &str, bytes: &[u8], kind: MapKind) -> Result<DecodedTexture, FetchError> {
    let decoded = image::load_from_memory(bytes).map_err(|source| FetchError::Decode {
        url: url.to_string(),
        source,
    })?;
    let rgba = decoded.into_rgba8();
    let (width, height) = rgba.dimensions();
    let rgba = rgba.into_raw();
    let mean_luma = (kind == MapKind::Albedo).then(|| mean_linear_luma(&rgba));
    Ok(DecodedTexture { width, height, rgba, mean_luma })
}

fn srgb_to_linear(channel: u8) -> f32 {
    let c = channel as f32 / 255.0;
    if c <= 0.04045 {
        c / 12.92
    } else {
        ((c + 0.055) / 1.055).powf(2.4)
    }
}

/// Mean Rec.709 luminance of sRGB encoded RGBA8 pixels, in linear space.
pub fn mean_linear_luma(rgba: &[u8]) -> f32 {
    let pixels = rgba.len() / 4;
    if pixels == 0 {
        return 0.0;
    }
    let stride = pixels.div_ceil(LUMA_SAMPLE_BUDGET).max(1);
    let mut total = 0.0f64;
    let mut samples = 0usize;
    for pixel in rgba.chunks_exact(4).step_by(stride) {
        let luma = 0.2126 * srgb_to_linear(pixel[0])
            + 0.7152 * srgb_to_linear(pixel[1])
            + 0.0722 * srgb_to_linear(pixel[2]);
        total += luma as f64;
        samples += 1;
    }
    (total / samples as f64) as f32
}

/// Build a repeat-addressed Bevy image. Albedo is sRGB, every other map linear.
pub fn to_bevy_image(decoded: DecodedTexture, kind: MapKind) -> Image {
    let format = if kind.is_srgb() {
        TextureFormat::Rgba8UnormSrgb
    } else {
        TextureFormat::Rgba8Unorm
    };
    let mut image = Image::new(
        Extent3d {
            width: decoded.width,
            height: decoded.height,
            depth_or_array_layers: 1,
        },
        TextureDimension::D2,
        decoded.rgba,
        format,
        RenderAssetUsages::RENDER_WORLD,
    );
    image.sampler = ImageSampler::Descriptor(ImageSamplerDescriptor {
        address_mode_u: ImageAddressMode::Repeat,
        address_mode_v: ImageAddressMode::Repeat,
        mag_filter: ImageFilterMode::Linear,
        min_filter: ImageFilterMode::Linear,
        mipmap_filter: ImageFilterMode::Linear,
        ..default()
    });
    image
}

/// Fetch and decode one texture off the frame loop; the outcome lands in `inbox`.
pub fn spawn_texture_fetch(inbox: &FetchInbox, ticket: LoadTicket, url: String, kind: MapKind) {
    let inbox = inbox.clone();
    spawn_request(url.clone(), move |bytes| {
        let result = bytes.and_then(|bytes| decode_texture(&url, &bytes, kind));
        inbox.push(FetchOutcome { ticket, url, kind, result });
    });
}

/// Fetch raw bytes and hand them to `done` once available.
pub fn spawn_request<F>(url: String, done: F)
where
    F: FnOnce(Result<Vec<u8>, FetchError>) + Send + 'static,
{
    #[cfg(target_arch = "wasm32")]
    {
        wasm_bindgen_futures::spawn_local(async move {
            done(fetch_bytes(&url).await);
        });
    }

    #[cfg(not(target_arch = "wasm32"))]
    {
        bevy::tasks::IoTaskPool::get()
            .spawn(async move {
                done(read_local(&url));
            })
            .detach();
    }
}

#[cfg(target_arch = "wasm32")]
async fn fetch_bytes(url: &str) -> Result<Vec<u8>, FetchError> {
    use wasm_bindgen::JsCast;
    use wasm_bindgen_futures::JsFuture;

    let request_error = |reason: String| FetchError::Request {
        url: url.to_string(),
        reason,
    };
    let target = if is_remote(url) || url.starts_with('/') {
        url.to_string()
    } else {
        format!("{ASSET_ROOT}/{url}")
    };

    let window = web_sys::window().ok_or_else(|| request_error("no window".into()))?;
    let response = JsFuture::from(window.fetch_with_str(&target))
        .await
        .map_err(|e| request_error(format!("{e:?}")))?;
    let response: web_sys::Response = response
        .dyn_into()
        .map_err(|e| request_error(format!("{e:?}")))?;
    if !response.ok() {
        return Err(FetchError::Status {
            url: url.to_string(),
            status: response.status(),
        });
    }
    let buffer = response
        .array_buffer()
        .map_err(|e| request_error(format!("{e:?}")))?;
    let buffer = JsFuture::from(buffer)
        .await
        .map_err(|e| request_error(format!("{e:?}")))?;
    Ok(js_sys::Uint8Array::new(&buffer).to_vec())
}

#[cfg(not(target_arch = "wasm32"))]
fn read_local(url: &str) -> Result<Vec<u8>, FetchError> {
    if is_remote(url) {
        return Err(FetchError::Unsupported(url.to_string()));
    }
    let path = bevy::asset::io::file::FileAssetReader::get_base_path()
        .join(ASSET_ROOT)
        .join(url.trim_start_matches('/'));
    std::fs::read(&path).map_err(|source| FetchError::Io {
        url: url.to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode_png(pixels: &[u8], width: u32, height: u32) -> Vec<u8> {
        let buffer = image::RgbaImage::from_raw(width, height, pixels.to_vec()).expect("buffer");
        let mut bytes = std::io::Cursor::new(Vec::new());
        buffer
            .write_to(&mut bytes, image::ImageFormat::Png)
            .expect("encode");
        bytes.into_inner()
    }

    #[test]
    fn luma_of_white_and_black() {
        assert!((mean_linear_luma(&[255, 255, 255, 255]) - 1.0).abs() < 1e-4);
        assert_eq!(mean_linear_luma(&[0, 0, 0, 255]), 0.0);
        assert_eq!(mean_linear_luma(&[]), 0.0);
    }

    #[test]
    fn mid_grey_is_dark_in_linear_space() {
        let luma = mean_linear_luma(&[128, 128, 128, 255]);
        assert!((luma - 0.2158).abs() < 1e-3, "luma {luma}");
    }

    #[test]
    fn decode_measures_luma_only_for_albedo() {
        let bytes = encode_png(&[255, 255, 255, 255, 0, 0, 0, 255], 2, 1);
        let albedo = decode_texture("a.png", &bytes, MapKind::Albedo).expect("albedo");
        assert_eq!((albedo.width, albedo.height), (2, 1));
        assert!((albedo.mean_luma.unwrap_or_default() - 0.5).abs() < 1e-3);

        let normal = decode_texture("n.png", &bytes, MapKind::Normal).expect("normal");
        assert!(normal.mean_luma.is_none());
    }

    #[test]
    fn garbage_bytes_are_a_decode_error() {
        let result = decode_texture("broken.webp", b"not an image", MapKind::Albedo);
        assert!(matches!(result, Err(FetchError::Decode { .. })));
    }

    #[test]
    fn bevy_image_uses_colour_space_per_kind() {
        let decoded = DecodedTexture { width: 1, height: 1, rgba: vec![1, 2, 3, 4], mean_luma: None };
        let albedo = to_bevy_image(decoded.clone(), MapKind::Albedo);
        assert_eq!(albedo.texture_descriptor.format, TextureFormat::Rgba8UnormSrgb);
        let roughness = to_bevy_image(decoded, MapKind::Roughness);
        assert_eq!(roughness.texture_descriptor.format, TextureFormat::Rgba8Unorm);
    }

    #[test]
    fn remote_detection() {
        assert!(is_remote("https://cdn.example/x.png"));
        assert!(is_remote("//cdn.example/x.png"));
        assert!(!is_remote("surfaces/a/1k/a_albedo.png"));
    }
}
