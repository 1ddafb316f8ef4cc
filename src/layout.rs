//! Layout adaptation: font fitting, cover-fit positioning and gradient ramps.
//!
//! Font fitting is a hill climb driven by measured text height. Each step
//! moves the size by one point toward the target band; the caller re-measures
//! and steps again until the size stops changing.

use serde::{Deserialize, Serialize};

/// Largest content font size, also the starting point of every fit.
pub const CONTENT_FONT_CEILING: u32 = 64;
/// Band the content block height should land in on a 1350px tall canvas.
pub const CONTENT_BAND: (f32, f32) = (950.0, 1050.0);
/// Canvas height the fixed layout constants were designed for.
pub const REFERENCE_HEIGHT: f32 = 1350.0;

/// Text measuring capability: height of wrapped text, width of one line.
pub trait TextMeasure: Send + Sync {
    fn text_height(&self, text: &str, font_size: f32, max_width: f32, bold: bool) -> f32;
    fn text_width(&self, text: &str, font_size: f32, bold: bool) -> f32;
}

/// Target height band for the fitted text block.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FitBand {
    pub min: f32,
    pub max: f32,
}

impl FitBand {
    /// Content band scaled to a canvas of `canvas_height` pixels.
    pub fn for_canvas(canvas_height: u32) -> Self {
        let k = canvas_height as f32 / REFERENCE_HEIGHT;
        Self {
            min: CONTENT_BAND.0 * k,
            max: CONTENT_BAND.1 * k,
        }
    }
}

/// One hill-climbing step.
///
/// Too tall shrinks by one point, too short grows by one point; both results
/// are capped at `ceiling`. Inside the band the size is kept. The size never
/// drops below 1.
pub fn fit_font_size(measured_height: f32, current: u32, band: FitBand, ceiling: u32) -> u32 {
    if measured_height > band.max {
        current.saturating_sub(1).min(ceiling).max(1)
    } else if measured_height < band.min {
        (current + 1).min(ceiling).max(1)
    } else {
        current
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FitOutcome {
    pub font_size: u32,
    pub iterations: u32,
    /// False when the iteration bound was hit or the size oscillated.
    pub converged: bool,
}

/// Measure, adjust, re-measure until the size is a fixed point.
///
/// When the band is narrower than one point of text height the climb can
/// bounce between two sizes; the smaller one is kept since it does not
/// overflow.
pub fn converge<F>(mut measure: F, start: u32, band: FitBand, ceiling: u32, max_iterations: u32) -> FitOutcome
where
    F: FnMut(u32) -> f32,
{
    let mut size = start.clamp(1, ceiling.max(1));
    let mut previous = None;
    for i in 0..max_iterations {
        let next = fit_font_size(measure(size), size, band, ceiling);
        if next == size {
            return FitOutcome {
                font_size: size,
                iterations: i,
                converged: true,
            };
        }
        if previous == Some(next) {
            return FitOutcome {
                font_size: size.min(next),
                iterations: i + 1,
                converged: false,
            };
        }
        previous = Some(size);
        size = next;
    }
    FitOutcome {
        font_size: size,
        iterations: max_iterations,
        converged: false,
    }
}

/// "Cover" placement of an image on a canvas: uniformly scaled so the canvas
/// is fully covered, overflow cropped.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoverFit {
    pub scale: f64,
    pub width: f64,
    pub height: f64,
    canvas_width: f64,
    canvas_height: f64,
}

impl CoverFit {
    pub fn new(image_width: u32, image_height: u32, canvas_width: u32, canvas_height: u32) -> Self {
        let (iw, ih) = (image_width.max(1) as f64, image_height.max(1) as f64);
        let (cw, ch) = (canvas_width as f64, canvas_height as f64);
        let scale = (cw / iw).max(ch / ih);
        Self {
            scale,
            width: iw * scale,
            height: ih * scale,
            canvas_width: cw,
            canvas_height: ch,
        }
    }

    /// Smallest allowed horizontal offset; the largest is 0.
    pub fn min_x(&self) -> f64 {
        (self.canvas_width - self.width).min(0.0)
    }

    pub fn min_y(&self) -> f64 {
        (self.canvas_height - self.height).min(0.0)
    }

    /// Clamp a requested offset so the image keeps covering the canvas.
    pub fn clamp_x(&self, x: f64) -> f64 {
        if x.is_nan() {
            return 0.0;
        }
        x.clamp(self.min_x(), 0.0)
    }

    pub fn clamp_y(&self, y: f64) -> f64 {
        if y.is_nan() {
            return 0.0;
        }
        y.clamp(self.min_y(), 0.0)
    }
}

/// Opacity ramp of the first-slide gradient, from the text edge inward.
const GRADIENT_STOPS: [(f64, f64); 7] = [
    (0.0, 1.0),
    (0.5, 1.0),
    (0.7, 0.9),
    (0.75, 0.8),
    (0.85, 0.4),
    (0.95, 0.1),
    (1.0, 0.0),
];

/// Gradient opacity at `t` in `[0, 1]` (0 = text edge), scaled by `max_opacity`.
pub fn gradient_alpha(t: f64, max_opacity: f64) -> f64 {
    let t = t.clamp(0.0, 1.0);
    let alpha = GRADIENT_STOPS
        .windows(2)
        .find(|w| t <= w[1].0)
        .map(|w| {
            let ((t0, a0), (t1, a1)) = (w[0], w[1]);
            let span = t1 - t0;
            if span <= 0.0 {
                a1
            } else {
                a0 + (a1 - a0) * (t - t0) / span
            }
        })
        .unwrap_or(0.0);
    alpha * max_opacity
}
