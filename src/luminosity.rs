//! Perceived brightness of the background image and the overlay strength
//! derived from it.
//!
//! Luminance follows WCAG 2.0 relative luminance: sRGB channels are linearised
//! (breakpoint 0.03928) and weighted 0.2126 / 0.7152 / 0.0722.

use image::imageops::FilterType;
use image::DynamicImage;
use serde::{Deserialize, Serialize};

/// Sampling edge, in pixels, of the reduced copy.
const SAMPLE_SIZE: u32 = 100;
/// Share of the image height sampled for `Top` / `Bottom`.
const BAND_RATIO: f64 = 0.4;
/// Only every `PIXEL_STRIDE`-th sampled pixel is read.
const PIXEL_STRIDE: usize = 4;
const MIN_ALPHA: u8 = 128;
const NEUTRAL: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SampleRegion {
    /// Top 40% of the image.
    Top,
    /// Bottom 40% of the image.
    Bottom,
    /// The whole image.
    Middle,
}

/// Average relative luminance in `[0, 1]`; 0.5 when nothing can be sampled.
pub fn sample_luminosity(image: Option<&DynamicImage>, region: SampleRegion) -> f64 {
    let Some(image) = image else {
        return NEUTRAL;
    };
    let (w, h) = (image.width(), image.height());
    if w == 0 || h == 0 {
        return NEUTRAL;
    }

    let band = ((h as f64 * BAND_RATIO).round() as u32).clamp(1, h);
    let (src_y, src_h) = match region {
        SampleRegion::Top => (0, band),
        SampleRegion::Bottom => (h - band, band),
        SampleRegion::Middle => (0, h),
    };

    let sample = image
        .crop_imm(0, src_y, w, src_h)
        .resize_exact(w.min(SAMPLE_SIZE), h.min(SAMPLE_SIZE), FilterType::Triangle)
        .to_rgba8();

    let (sum, count) = sample
        .pixels()
        .step_by(PIXEL_STRIDE)
        .filter(|p| p.0[3] >= MIN_ALPHA)
        .fold((0.0, 0usize), |(sum, count), p| {
            (sum + relative_luminance(p.0[0], p.0[1], p.0[2]), count + 1)
        });

    if count > 0 {
        sum / count as f64
    } else {
        NEUTRAL
    }
}

fn linearize(channel: u8) -> f64 {
    let c = channel as f64 / 255.0;
    if c <= 0.03928 {
        c / 12.92
    } else {
        ((c + 0.055) / 1.055).powf(2.4)
    }
}

pub fn relative_luminance(r: u8, g: u8, b: u8) -> f64 {
    0.2126 * linearize(r) + 0.7152 * linearize(g) + 0.0722 * linearize(b)
}

/// Linear map from luminosity to overlay opacity: brighter backgrounds get a
/// darker overlay so white text stays readable.
pub fn opacity_from_luminosity(luminosity: f64, min_opacity: f64, max_opacity: f64) -> f64 {
    let l = luminosity.clamp(0.0, 1.0);
    min_opacity + l * (max_opacity - min_opacity)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    fn solid(w: u32, h: u32, px: [u8; 4]) -> DynamicImage {
        DynamicImage::ImageRgba8(RgbaImage::from_pixel(w, h, Rgba(px)))
    }

    /// White on the top half, black on the bottom half.
    fn split(w: u32, h: u32) -> DynamicImage {
        DynamicImage::ImageRgba8(RgbaImage::from_fn(w, h, |_, y| {
            if y < h / 2 {
                Rgba([255, 255, 255, 255])
            } else {
                Rgba([0, 0, 0, 255])
            }
        }))
    }

    #[test]
    fn white_is_one_black_is_zero() {
        let white = solid(300, 200, [255, 255, 255, 255]);
        let black = solid(300, 200, [0, 0, 0, 255]);
        assert!((sample_luminosity(Some(&white), SampleRegion::Middle) - 1.0).abs() < 1e-6);
        assert!(sample_luminosity(Some(&black), SampleRegion::Middle).abs() < 1e-6);
    }

    #[test]
    fn missing_or_transparent_is_neutral() {
        assert_eq!(sample_luminosity(None, SampleRegion::Top), 0.5);
        let clear = solid(50, 50, [255, 255, 255, 0]);
        assert_eq!(sample_luminosity(Some(&clear), SampleRegion::Middle), 0.5);
    }

    #[test]
    fn regions_sample_their_band() {
        let img = split(120, 400);
        assert!(sample_luminosity(Some(&img), SampleRegion::Top) > 0.99);
        assert!(sample_luminosity(Some(&img), SampleRegion::Bottom) < 0.01);
        let mid = sample_luminosity(Some(&img), SampleRegion::Middle);
        assert!(mid > 0.3 && mid < 0.7, "mid = {mid}");
    }

    #[test]
    fn small_images_are_not_upscaled() {
        let img = solid(3, 2, [255, 255, 255, 255]);
        assert!((sample_luminosity(Some(&img), SampleRegion::Bottom) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn luminance_weights() {
        assert!((relative_luminance(0, 255, 0) - 0.7152).abs() < 1e-9);
        assert!((relative_luminance(255, 0, 0) - 0.2126).abs() < 1e-9);
        assert!((linearize(10) - (10.0 / 255.0) / 12.92).abs() < 1e-12);
    }

    #[test]
    fn opacity_is_clamped_and_monotonic() {
        assert_eq!(opacity_from_luminosity(-1.0, 0.5, 0.8), 0.5);
        assert_eq!(opacity_from_luminosity(2.0, 0.5, 0.8), 0.8);
        let mut last = f64::MIN;
        for i in 0..=20 {
            let o = opacity_from_luminosity(i as f64 / 20.0, 0.5, 0.8);
            assert!(o >= last);
            last = o;
        }
    }
}
