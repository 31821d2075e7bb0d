//! Overlay module.
//! Transparent drawing layer the same size as the preview, plus the pointer-to-pixel translation.
//! Markers are filled circles with a white outline, drawn with `imageproc`.
//! The composed frame (backdrop + markers) is saved as PNG for the operator to look at.

use crate::config::{SURFACE_HEIGHT, SURFACE_WIDTH};
use anyhow::{Context, Result};
use image::{DynamicImage, Rgba, RgbaImage};
use imageproc::drawing::{draw_filled_circle_mut, draw_hollow_circle_mut};
use std::fs;
use std::path::Path;

pub const MARKER_RADIUS: i32 = 6;
const OUTLINE: Rgba<u8> = Rgba([0xff, 0xff, 0xff, 0xff]);
const TRANSPARENT: Rgba<u8> = Rgba([0, 0, 0, 0]);

/// Everything the calibration session draws on or writes to.
pub trait Surface {
    /// Erases every marker.
    fn clear(&mut self);
    fn draw_marker(&mut self, x: i32, y: i32, color: Rgba<u8>);
    /// Coordinate readout, e.g. `center: (1, 2) min: (3, 4) max: (5, 6)`.
    fn set_values_text(&mut self, text: &str);
    /// Instruction for the operator.
    fn set_info_text(&mut self, text: &str);
    fn alert(&mut self, message: &str);
}

/// A raw pointer click in screen coordinates.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PointerEvent {
    pub client_x: f64,
    pub client_y: f64,
}

/// On-screen bounding box of the preview.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Bounds {
    pub left: f64,
    pub top: f64,
}

/// Surface-relative integer pixel of a click. Clicks outside the preview are not rejected.
pub fn capture_click(event: PointerEvent, bounds: Bounds) -> (i32, i32) {
    (
        round_half_up(event.client_x - bounds.left),
        round_half_up(event.client_y - bounds.top),
    )
}

// Halves round toward +inf (-2.5 -> -2), unlike f64::round.
fn round_half_up(v: f64) -> i32 {
    (v + 0.5).floor() as i32
}

/// Drawing layer backed by an RGBA canvas.
pub struct Overlay {
    canvas: RgbaImage,
    info: String,
    values: String,
    alerts: Vec<String>,
}

impl Overlay {
    pub fn new() -> Self {
        Self {
            canvas: RgbaImage::from_pixel(SURFACE_WIDTH, SURFACE_HEIGHT, TRANSPARENT),
            info: String::new(),
            values: String::new(),
            alerts: Vec::new(),
        }
    }

    pub fn info(&self) -> &str {
        &self.info
    }

    pub fn values(&self) -> &str {
        &self.values
    }

    /// Alerts raised since the last call.
    pub fn take_alerts(&mut self) -> Vec<String> {
        std::mem::take(&mut self.alerts)
    }

    /// Markers blended over `backdrop`, which is stretched to the surface size.
    pub fn compose(&self, backdrop: &DynamicImage) -> RgbaImage {
        let mut frame = backdrop
            .resize_exact(SURFACE_WIDTH, SURFACE_HEIGHT, image::imageops::FilterType::Triangle)
            .to_rgba8();
        image::imageops::overlay(&mut frame, &self.canvas, 0, 0);
        frame
    }

    pub fn save(&self, path: &Path, backdrop: &DynamicImage) -> Result<()> {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create output directory {}", dir.display()))?;
        }
        self.compose(backdrop)
            .save(path)
            .with_context(|| format!("Failed to save overlay to {}", path.display()))
    }
}

impl Surface for Overlay {
    fn clear(&mut self) {
        for pixel in self.canvas.pixels_mut() {
            *pixel = TRANSPARENT;
        }
    }

    fn draw_marker(&mut self, x: i32, y: i32, color: Rgba<u8>) {
        // Markers entirely off the canvas are skipped; imageproc overflows near i32::MAX.
        let (x64, y64, r) = (i64::from(x), i64::from(y), i64::from(MARKER_RADIUS));
        if x64 < -r || y64 < -r || x64 > i64::from(SURFACE_WIDTH) + r || y64 > i64::from(SURFACE_HEIGHT) + r {
            log::debug!("Marker at ({}, {}) is outside the surface", x, y);
            return;
        }
        draw_filled_circle_mut(&mut self.canvas, (x, y), MARKER_RADIUS, color);
        draw_hollow_circle_mut(&mut self.canvas, (x, y), MARKER_RADIUS, OUTLINE);
    }

    fn set_values_text(&mut self, text: &str) {
        self.values = text.to_string();
    }

    fn set_info_text(&mut self, text: &str) {
        self.info = text.to_string();
    }

    fn alert(&mut self, message: &str) {
        log::error!("{}", message);
        self.alerts.push(message.to_string());
    }
}
