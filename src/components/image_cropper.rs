//! Circular avatar cropper — one crop session per dialog.
//!
//! DESIGN
//! ======
//! The dialog shows the image scaled to some displayed size and lets the user
//! drag a square selection (rendered under a circular mask) in displayed
//! pixels. On confirm, the selection is mapped back to the image's native
//! resolution using the native/displayed ratio per axis, sampled onto a raster
//! the size of the selection, and encoded as JPEG at a fixed quality.
//!
//! The displayed size comes from the client, so it is bounded: at most
//! `MAX_DISPLAY_SIDE` per side and at most `MAX_DISPLAY_UPSCALE` times the
//! native side. The output raster can never exceed it.

use std::io::Cursor;

use fast_image_resize as fir;
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ImageReader, RgbaImage};
use serde::{Deserialize, Serialize};

pub const JPEG_QUALITY: u8 = 95;
pub const CROPPED_CONTENT_TYPE: &str = "image/jpeg";

/// Largest accepted displayed side, in pixels.
pub const MAX_DISPLAY_SIDE: u32 = 4096;
/// How far the displayed image may be scaled up from its native size.
pub const MAX_DISPLAY_UPSCALE: u32 = 8;

#[derive(Debug, thiserror::Error)]
pub enum CropError {
    #[error("image decode failed: {0}")]
    Decode(String),
    #[error("no drawing surface for a {width}x{height} selection")]
    EmptySurface { width: u32, height: u32 },
    #[error("display size {width}x{height} is too large for this image")]
    DisplayTooLarge { width: u32, height: u32 },
    #[error("image resample failed: {0}")]
    Resample(String),
    #[error("image encode failed: {0}")]
    Encode(String),
}

/// Size of the image as laid out on screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplaySize {
    pub width: u32,
    pub height: u32,
}

/// Selection rectangle in displayed pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Selection {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Selection {
    /// Largest square centered in `display`.
    #[must_use]
    pub fn centered_square(display: DisplaySize) -> Self {
        let side = f64::from(display.width.min(display.height));
        Self {
            x: (f64::from(display.width) - side) / 2.0,
            y: (f64::from(display.height) - side) / 2.0,
            width: side,
            height: side,
        }
    }
}

/// Encoded crop result, ready for upload.
#[derive(Debug, Clone)]
pub struct CroppedImage {
    pub bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

pub struct CropSession {
    source: RgbaImage,
    display: DisplaySize,
    selection: Selection,
}

impl CropSession {
    /// Decode `bytes` and start a session with a centered square selection.
    /// `display` defaults to the native size when absent or degenerate.
    ///
    /// # Errors
    ///
    /// Returns [`CropError::Decode`] if the bytes are not a supported image,
    /// or [`CropError::DisplayTooLarge`] for an out-of-bounds display size.
    pub fn load(bytes: &[u8], display: Option<DisplaySize>) -> Result<Self, CropError> {
        let reader = ImageReader::new(Cursor::new(bytes))
            .with_guessed_format()
            .map_err(|e| CropError::Decode(e.to_string()))?;
        let decoded = reader
            .decode()
            .map_err(|e| CropError::Decode(e.to_string()))?;
        Self::from_image(decoded.to_rgba8(), display)
    }

    /// # Errors
    ///
    /// Returns [`CropError::DisplayTooLarge`] when `display` exceeds the
    /// allowed bounds for `source`.
    pub fn from_image(source: RgbaImage, display: Option<DisplaySize>) -> Result<Self, CropError> {
        let display = match display.filter(|d| d.width > 0 && d.height > 0) {
            Some(d) => {
                let max_w = MAX_DISPLAY_SIDE.min(source.width().saturating_mul(MAX_DISPLAY_UPSCALE));
                let max_h = MAX_DISPLAY_SIDE.min(source.height().saturating_mul(MAX_DISPLAY_UPSCALE));
                if d.width > max_w || d.height > max_h {
                    return Err(CropError::DisplayTooLarge { width: d.width, height: d.height });
                }
                d
            }
            None => DisplaySize { width: source.width(), height: source.height() },
        };
        Ok(Self { selection: Selection::centered_square(display), source, display })
    }

    #[must_use]
    pub fn natural_size(&self) -> DisplaySize {
        DisplaySize { width: self.source.width(), height: self.source.height() }
    }

    #[must_use]
    pub fn display_size(&self) -> DisplaySize {
        self.display
    }

    #[must_use]
    pub fn selection(&self) -> Selection {
        self.selection
    }

    /// Move/resize the selection. The result is always square and inside the
    /// displayed image; the applied selection is returned.
    pub fn set_selection(&mut self, requested: Selection) -> Selection {
        let display_w = f64::from(self.display.width);
        let display_h = f64::from(self.display.height);
        let side = requested
            .width
            .min(requested.height)
            .clamp(0.0, display_w.min(display_h));
        let side = if side.is_nan() { 0.0 } else { side };
        let x = requested.x.clamp(0.0, display_w - side);
        let y = requested.y.clamp(0.0, display_h - side);
        self.selection = Selection {
            x: if x.is_nan() { 0.0 } else { x },
            y: if y.is_nan() { 0.0 } else { y },
            width: side,
            height: side,
        };
        self.selection
    }

    /// Draw the selected region onto a raster sized to the selection, using
    /// nearest sampling from the matching native rectangle.
    ///
    /// # Errors
    ///
    /// Returns [`CropError::EmptySurface`] when the selection is narrower or
    /// shorter than one pixel.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn render(&self) -> Result<RgbaImage, CropError> {
        let out_w = self.selection.width.max(0.0) as u32;
        let out_h = self.selection.height.max(0.0) as u32;
        if out_w == 0 || out_h == 0 {
            return Err(CropError::EmptySurface { width: out_w, height: out_h });
        }

        let native_w = f64::from(self.source.width());
        let native_h = f64::from(self.source.height());
        let scale_x = native_w / f64::from(self.display.width);
        let scale_y = native_h / f64::from(self.display.height);
        let left = (self.selection.x * scale_x).clamp(0.0, native_w);
        let top = (self.selection.y * scale_y).clamp(0.0, native_h);
        let width = (self.selection.width * scale_x).min(native_w - left);
        let height = (self.selection.height * scale_y).min(native_h - top);

        let src_image = fir::images::ImageRef::new(
            self.source.width(),
            self.source.height(),
            self.source.as_raw(),
            fir::PixelType::U8x4,
        )
        .map_err(|e| CropError::Resample(e.to_string()))?;
        let mut dst_image = fir::images::Image::new(out_w, out_h, fir::PixelType::U8x4);
        let options = fir::ResizeOptions::new()
            .resize_alg(fir::ResizeAlg::Nearest)
            .crop(left, top, width, height);
        fir::Resizer::new()
            .resize(&src_image, &mut dst_image, Some(&options))
            .map_err(|e| CropError::Resample(e.to_string()))?;

        RgbaImage::from_raw(out_w, out_h, dst_image.into_vec())
            .ok_or_else(|| CropError::Resample("invalid output buffer".into()))
    }

    /// Render the selection and encode it as JPEG.
    ///
    /// # Errors
    ///
    /// Returns a [`CropError`] if rendering or encoding fails.
    pub fn confirm(&self) -> Result<CroppedImage, CropError> {
        let raster = self.render()?;
        encode_jpeg(raster)
    }
}

fn encode_jpeg(raster: RgbaImage) -> Result<CroppedImage, CropError> {
    let rgb = DynamicImage::ImageRgba8(raster).to_rgb8();
    let mut bytes = Vec::new();
    JpegEncoder::new_with_quality(&mut bytes, JPEG_QUALITY)
        .encode_image(&rgb)
        .map_err(|e| CropError::Encode(e.to_string()))?;
    Ok(CroppedImage { bytes, width: rgb.width(), height: rgb.height() })
}

#[cfg(test)]
#[path = "image_cropper_test.rs"]
mod tests;
