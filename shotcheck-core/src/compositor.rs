//! Mask Compositor - Background Violation Overlay
//!
//! Loads the product photo and its segmentation mask, then paints every
//! background pixel that is not pure white in the violation color.
//!
//! Mask polarity is fixed: light = product, dark = background.

use std::fmt;
use std::io::Cursor;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use image::imageops::{self, FilterType};
use image::{DynamicImage, ImageFormat, RgbaImage};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, instrument};

use crate::config::LoaderConfig;
use crate::hashing::sha256_hex;

/// Mask pixels with mean RGB below this are background.
pub const BACKGROUND_LUMA_THRESHOLD: u32 = 128;
pub const VIOLATION_COLOR: [u8; 3] = [255, 0, 0];
const PURE_WHITE: [u8; 3] = [255, 255, 255];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageRole {
    Source,
    Mask,
}

impl fmt::Display for ImageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImageRole::Source => f.write_str("source"),
            ImageRole::Mask => f.write_str("mask"),
        }
    }
}

#[derive(Debug, Error)]
pub enum CompositeError {
    #[error("Failed to create drawing surface: {0}")]
    SurfaceCreationFailed(String),

    #[error("Failed to load source image {url}: {reason}")]
    SourceLoadFailed { url: String, reason: String },

    #[error("Failed to load mask image {url}: {reason}")]
    MaskLoadFailed { url: String, reason: String },

    #[error("Timed out loading {role} image {url} after {timeout_ms}ms")]
    LoadTimeout {
        role: ImageRole,
        url: String,
        timeout_ms: u64,
    },

    #[error("Failed to encode overlay: {0}")]
    EncodeFailed(#[from] image::ImageError),
}

impl CompositeError {
    /// Which input caused the failure, if any.
    pub fn role(&self) -> Option<ImageRole> {
        match self {
            CompositeError::SourceLoadFailed { .. } => Some(ImageRole::Source),
            CompositeError::MaskLoadFailed { .. } => Some(ImageRole::Mask),
            CompositeError::LoadTimeout { role, .. } => Some(*role),
            CompositeError::SurfaceCreationFailed(_) | CompositeError::EncodeFailed(_) => None,
        }
    }

    fn load_failed(role: ImageRole, url: &str, reason: String) -> Self {
        match role {
            ImageRole::Source => CompositeError::SourceLoadFailed {
                url: url.to_string(),
                reason,
            },
            ImageRole::Mask => CompositeError::MaskLoadFailed {
                url: url.to_string(),
                reason,
            },
        }
    }
}

/// Encoded overlay plus how many pixels were flagged.
#[derive(Debug, Clone)]
pub struct CompositeOutput {
    pub width: u32,
    pub height: u32,
    pub png: Vec<u8>,
    pub flagged_pixels: usize,
}

impl CompositeOutput {
    pub fn to_data_url(&self) -> String {
        format!("data:image/png;base64,{}", STANDARD.encode(&self.png))
    }

    pub fn sha256(&self) -> String {
        sha256_hex(&self.png)
    }
}

/// Fetches and decodes images from `http(s)://`, `data:`, `file://` or plain paths.
pub struct ImageLoader {
    config: LoaderConfig,
    client: reqwest::Client,
}

impl ImageLoader {
    pub fn new(config: LoaderConfig) -> Self {
        // reqwest keeps no cookie store by default, so no credentials ride along.
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self::with_client(config, client)
    }

    /// Use a caller-built HTTP client, e.g. one with custom proxy or TLS settings.
    pub fn with_client(config: LoaderConfig, client: reqwest::Client) -> Self {
        Self { config, client }
    }

    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    /// Load one image, bounded by the configured timeout. Single attempt.
    pub async fn load(&self, role: ImageRole, url: &str) -> Result<DynamicImage, CompositeError> {
        let timeout = self.config.load_timeout();
        match tokio::time::timeout(timeout, self.fetch_and_decode(url)).await {
            Ok(Ok(image)) => {
                debug!(%role, width = image.width(), height = image.height(), "image loaded");
                Ok(image)
            }
            Ok(Err(reason)) => Err(CompositeError::load_failed(role, url, reason)),
            Err(_elapsed) => Err(CompositeError::LoadTimeout {
                role,
                url: url.to_string(),
                timeout_ms: self.config.load_timeout_ms,
            }),
        }
    }

    /// Load both images concurrently and composite them.
    #[instrument(name = "composite_overlay", skip_all)]
    pub async fn composite(
        &self,
        source_url: &str,
        mask_url: &str,
    ) -> Result<CompositeOutput, CompositeError> {
        let (source, mask) = tokio::join!(
            self.load(ImageRole::Source, source_url),
            self.load(ImageRole::Mask, mask_url),
        );
        let source = source?;
        let mask = mask?;

        let output = composite_images(&source, &mask)?;
        debug!(
            width = output.width,
            height = output.height,
            flagged = output.flagged_pixels,
            "overlay composited"
        );
        Ok(output)
    }

    async fn fetch_and_decode(&self, url: &str) -> Result<DynamicImage, String> {
        let bytes = self.fetch(url).await?;
        tokio::task::spawn_blocking(move || image::load_from_memory(&bytes))
            .await
            .map_err(|e| format!("decode task failed: {}", e))?
            .map_err(|e| format!("decode failed: {}", e))
    }

    async fn fetch(&self, url: &str) -> Result<Vec<u8>, String> {
        if let Some(rest) = url.strip_prefix("data:") {
            return decode_data_url(rest);
        }

        if url.starts_with("http://") || url.starts_with("https://") {
            let response = self
                .client
                .get(url)
                .send()
                .await
                .map_err(|e| format!("request failed: {}", e))?;
            if !response.status().is_success() {
                return Err(format!("unexpected status {}", response.status()));
            }
            return response
                .bytes()
                .await
                .map(|b| b.to_vec())
                .map_err(|e| format!("read body failed: {}", e));
        }

        let path = match url.strip_prefix("file://") {
            Some(path) => path,
            None if url.contains("://") => return Err("unsupported url scheme".to_string()),
            None => url,
        };
        if !self.config.allow_local_files {
            return Err("local file access is disabled".to_string());
        }
        tokio::fs::read(path)
            .await
            .map_err(|e| format!("read {} failed: {}", path, e))
    }
}

impl Default for ImageLoader {
    fn default() -> Self {
        Self::new(LoaderConfig::default())
    }
}

/// Composite with the default loader, resolving to a PNG data URL.
pub async fn composite_violation_overlay(
    source_url: &str,
    mask_url: &str,
) -> Result<String, CompositeError> {
    let output = ImageLoader::default().composite(source_url, mask_url).await?;
    Ok(output.to_data_url())
}

/// Composite two decoded images. The surface takes the source's size and
/// the mask is resampled onto it when the sizes differ.
pub fn composite_images(
    source: &DynamicImage,
    mask: &DynamicImage,
) -> Result<CompositeOutput, CompositeError> {
    let (width, height) = (source.width(), source.height());
    surface_len(width, height)?;
    if mask.width() == 0 || mask.height() == 0 {
        return Err(CompositeError::SurfaceCreationFailed(format!(
            "mask image is {}x{}",
            mask.width(),
            mask.height()
        )));
    }

    let mut surface = source.to_rgba8();
    let mask = mask.to_rgba8();
    let mask = if mask.dimensions() == (width, height) {
        mask
    } else {
        debug!(
            mask_width = mask.width(),
            mask_height = mask.height(),
            width,
            height,
            "resampling mask to source size"
        );
        imageops::resize(&mask, width, height, FilterType::Triangle)
    };

    let flagged_pixels = flag_background_violations(&mut surface, &mask).ok_or_else(|| {
        CompositeError::SurfaceCreationFailed("mask buffer does not match source".to_string())
    })?;
    let png = encode_png(&surface)?;

    Ok(CompositeOutput {
        width,
        height,
        png,
        flagged_pixels,
    })
}

/// Recolor non-white background pixels in an interleaved RGBA buffer.
///
/// Both buffers must describe the same width and height. Alpha is kept.
/// Returns the number of recolored pixels, or `None` without touching
/// `source` when the buffers are not equal-length RGBA.
pub fn flag_background_violations(source: &mut [u8], mask: &[u8]) -> Option<usize> {
    if source.len() != mask.len() || source.len() % 4 != 0 {
        return None;
    }

    let mut flagged = 0;
    for (px, m) in source.chunks_exact_mut(4).zip(mask.chunks_exact(4)) {
        let luma_sum = m[0] as u32 + m[1] as u32 + m[2] as u32;
        if luma_sum >= BACKGROUND_LUMA_THRESHOLD * 3 {
            continue;
        }
        if px[..3] != PURE_WHITE {
            px[..3].copy_from_slice(&VIOLATION_COLOR);
            flagged += 1;
        }
    }
    Some(flagged)
}

fn surface_len(width: u32, height: u32) -> Result<usize, CompositeError> {
    if width == 0 || height == 0 {
        return Err(CompositeError::SurfaceCreationFailed(format!(
            "source image is {}x{}",
            width, height
        )));
    }
    (width as usize)
        .checked_mul(height as usize)
        .and_then(|n| n.checked_mul(4))
        .ok_or_else(|| {
            CompositeError::SurfaceCreationFailed(format!("{}x{} exceeds addressable memory", width, height))
        })
}

fn encode_png(image: &RgbaImage) -> Result<Vec<u8>, CompositeError> {
    let mut png = Vec::new();
    image.write_to(&mut Cursor::new(&mut png), ImageFormat::Png)?;
    Ok(png)
}

fn decode_data_url(rest: &str) -> Result<Vec<u8>, String> {
    let (header, payload) = rest
        .split_once(',')
        .ok_or_else(|| "malformed data url".to_string())?;
    if !header.ends_with(";base64") {
        return Err("only base64 data urls are supported".to_string());
    }
    STANDARD
        .decode(payload.trim())
        .map_err(|e| format!("invalid base64 payload: {}", e))
}
