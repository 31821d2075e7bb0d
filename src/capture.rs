//! Preview capture module
//! Grabs one still frame from the camera to serve as the backdrop behind the markers.
//! The frame is only a visual reference; nothing here looks at its pixels.
//! Fetched once per session, scaled to the fixed surface size.

use crate::config::{Config, SURFACE_HEIGHT, SURFACE_WIDTH};
use anyhow::{Context, Result};
use image::imageops::FilterType;
use image::{DynamicImage, Rgb, RgbImage};
use reqwest::Client;
use std::time::{Duration, Instant};

const BACKDROP_FILL: Rgb<u8> = Rgb([0x20, 0x20, 0x20]);

/// Downloads the preview frame and scales it to the surface size.
pub async fn fetch_backdrop(config: &Config) -> Result<DynamicImage> {
    let start = Instant::now();
    let url = config.backdrop_url();

    let mut builder = Client::builder();
    if let Some(secs) = config.timeout_secs {
        builder = builder.timeout(Duration::from_secs(secs));
    }
    let client = builder.build().context("Failed to create HTTP client")?;

    let mut request = client.get(&url);
    if let Some((user, password)) = config.credentials() {
        request = request.basic_auth(user, Some(password));
    }
    let bytes = request
        .send()
        .await
        .and_then(|r| r.error_for_status())
        .with_context(|| format!("Failed to request preview frame from {}", url))?
        .bytes()
        .await
        .context("Failed to read preview frame body")?;

    let frame = decode_frame(&bytes)?;
    log::debug!("Backdrop fetch + decode latency: {:?}", start.elapsed());
    Ok(frame)
}

/// Decodes an encoded still (JPEG from the camera, any format `image` knows) at surface size.
pub fn decode_frame(bytes: &[u8]) -> Result<DynamicImage> {
    let frame = image::load_from_memory(bytes).context("Failed to decode preview frame")?;
    if frame.width() == 0 || frame.height() == 0 {
        anyhow::bail!("Preview frame is empty");
    }
    Ok(frame.resize_exact(SURFACE_WIDTH, SURFACE_HEIGHT, FilterType::Triangle))
}

/// Flat backdrop used when no preview frame is available.
pub fn placeholder() -> DynamicImage {
    DynamicImage::ImageRgb8(RgbImage::from_pixel(SURFACE_WIDTH, SURFACE_HEIGHT, BACKDROP_FILL))
}

/// Preview frame, or the placeholder when the camera does not deliver one.
pub async fn backdrop_or_placeholder(config: &Config) -> DynamicImage {
    match fetch_backdrop(config).await {
        Ok(frame) => frame,
        Err(e) => {
            log::warn!("No preview backdrop, drawing on a blank surface: {:#}", e);
            placeholder()
        }
    }
}
