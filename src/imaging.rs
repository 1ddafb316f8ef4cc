//! Image decoding, encoding and the pre-processing applied before storage.
//!
//! | Operation | Crate / function |
//! |---|---|
//! | Decode (PNG, JPEG, WebP) | `image::load_from_memory` |
//! | Data URLs | `base64` standard engine |
//! | Downsize to format height | `image::imageops::resize` with `Lanczos3` |
//! | Background blur | `image::imageops::blur` on a reduced copy |

use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat, RgbaImage};
use std::io::Cursor;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),
    #[error("invalid data URL")]
    DataUrl,
    #[error("base64 error: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("font error: {0}")]
    Font(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("render task failed: {0}")]
    Task(String),
}

/// Blur is computed on a copy reduced by this factor, then scaled back.
const BLUR_REDUCTION: u32 = 8;

pub fn decode_bytes(bytes: &[u8]) -> Result<DynamicImage, RenderError> {
    Ok(image::load_from_memory(bytes)?)
}

/// Decode a `data:<mime>;base64,<payload>` URL.
pub fn decode_data_url(url: &str) -> Result<DynamicImage, RenderError> {
    let rest = url.strip_prefix("data:").ok_or(RenderError::DataUrl)?;
    let (meta, payload) = rest.split_once(',').ok_or(RenderError::DataUrl)?;
    if !meta.ends_with(";base64") {
        return Err(RenderError::DataUrl);
    }
    let bytes = STANDARD.decode(payload.trim())?;
    decode_bytes(&bytes)
}

pub fn to_data_url(bytes: &[u8], mime: &str) -> String {
    format!("data:{};base64,{}", mime, STANDARD.encode(bytes))
}

pub fn encode_png(image: &RgbaImage) -> Result<Vec<u8>, RenderError> {
    let mut out = Cursor::new(Vec::new());
    image.write_to(&mut out, ImageFormat::Png)?;
    Ok(out.into_inner())
}

pub fn png_data_url(image: &DynamicImage) -> Result<String, RenderError> {
    let png = encode_png(&image.to_rgba8())?;
    Ok(to_data_url(&png, "image/png"))
}

/// Widest image kept after [`resize_to_max_height`]: eight canvas widths.
pub const MAX_STORED_WIDTH: u32 = 8 * 1080;

/// Scale to exactly `max_height` pixels tall, keeping the aspect ratio.
///
/// Panoramas that would end up wider than [`MAX_STORED_WIDTH`] are scaled to
/// that width instead, so they come out shorter than `max_height`.
pub fn resize_to_max_height(image: &DynamicImage, max_height: u32) -> DynamicImage {
    let (w, h) = (image.width(), image.height());
    if h == 0 || w == 0 {
        return image.clone();
    }
    let aspect = w as f64 / h as f64;
    let width = (max_height as f64 * aspect).round().max(1.0);
    let (width, height) = if width > MAX_STORED_WIDTH as f64 {
        let height = (MAX_STORED_WIDTH as f64 / aspect).round().max(1.0);
        (MAX_STORED_WIDTH, height as u32)
    } else {
        (width as u32, max_height)
    };
    image.resize_exact(width, height, FilterType::Lanczos3)
}

/// Heavily blurred copy used behind content slides.
pub fn blurred(image: &DynamicImage, radius: f32) -> DynamicImage {
    let (w, h) = (image.width(), image.height());
    if w == 0 || h == 0 || radius <= 0.0 {
        return image.clone();
    }
    let small_w = (w / BLUR_REDUCTION).max(1);
    let small_h = (h / BLUR_REDUCTION).max(1);
    let small = image.resize_exact(small_w, small_h, FilterType::Triangle);
    let sigma = (radius / BLUR_REDUCTION as f32).max(0.5);
    let soft = image::imageops::blur(&small.to_rgba8(), sigma);
    DynamicImage::ImageRgba8(image::imageops::resize(&soft, w, h, FilterType::Triangle))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn solid(w: u32, h: u32, px: [u8; 4]) -> DynamicImage {
        DynamicImage::ImageRgba8(RgbaImage::from_pixel(w, h, Rgba(px)))
    }

    #[test]
    fn data_url_round_trip() {
        let img = solid(4, 3, [10, 20, 30, 255]);
        let url = png_data_url(&img).unwrap();
        assert!(url.starts_with("data:image/png;base64,"));
        let back = decode_data_url(&url).unwrap();
        assert_eq!((back.width(), back.height()), (4, 3));
        assert_eq!(back.to_rgba8().get_pixel(1, 1), &Rgba([10, 20, 30, 255]));
    }

    #[test]
    fn rejects_non_base64_data_url() {
        assert!(matches!(decode_data_url("data:image/png,abc"), Err(RenderError::DataUrl)));
        assert!(matches!(decode_data_url("https://x/y.png"), Err(RenderError::DataUrl)));
    }

    #[test]
    fn resize_keeps_aspect() {
        let img = solid(200, 100, [0, 0, 0, 255]);
        let out = resize_to_max_height(&img, 1920);
        assert_eq!((out.width(), out.height()), (3840, 1920));
    }

    #[test]
    fn resize_caps_panorama_width() {
        let img = solid(20000, 10, [0, 0, 0, 255]);
        let out = resize_to_max_height(&img, 1920);
        assert_eq!((out.width(), out.height()), (MAX_STORED_WIDTH, 4));

        // 4.5:1 lands exactly on the cap.
        let img = solid(45, 10, [0, 0, 0, 255]);
        let out = resize_to_max_height(&img, 1920);
        assert_eq!((out.width(), out.height()), (MAX_STORED_WIDTH, 1920));
    }

    #[test]
    fn blur_keeps_size_and_uniform_color() {
        let img = solid(64, 48, [200, 100, 50, 255]);
        let out = blurred(&img, 100.0);
        assert_eq!((out.width(), out.height()), (64, 48));
        let px = out.to_rgba8().get_pixel(10, 10).0;
        assert!((px[0] as i32 - 200).abs() <= 2);
    }
}
