//! CPU rasterization of slide scenes.
//!
//! Drawing is done with the `image` crate on an RGBA canvas; glyphs come from
//! `fontdue`. The same fonts back the [`TextMeasure`] implementation so that
//! layout fitting measures exactly what gets drawn.

use crate::imaging::{self, RenderError};
use crate::layout::{gradient_alpha, CoverFit, TextMeasure};
use crate::scene::{Align, Edge, Layer, Rgb, Scene, TextRun};
use async_trait::async_trait;
use fontdue::layout::{CoordinateSystem, HorizontalAlign, Layout, LayoutSettings, TextStyle, WrapStyle};
use fontdue::{Font, FontSettings};
use image::imageops::FilterType;
use image::{DynamicImage, Rgba, RgbaImage};
use std::path::Path;
use std::sync::Arc;
use tracing::{instrument, warn};

/// Turns a described scene into pixels.
#[async_trait]
pub trait Rasterizer: Send + Sync {
    async fn rasterize(&self, scene: &Scene, pixel_ratio: f32) -> Result<RgbaImage, RenderError>;
}

/// Regular and bold faces. Missing faces fall back to each other; with no face
/// at all, text is neither drawn nor measured.
#[derive(Default)]
pub struct Fonts {
    regular: Option<Font>,
    bold: Option<Font>,
}

impl Fonts {
    pub fn from_bytes(regular: Option<&[u8]>, bold: Option<&[u8]>) -> Result<Self, RenderError> {
        let parse = |bytes: &[u8]| {
            Font::from_bytes(bytes, FontSettings::default()).map_err(|e| RenderError::Font(e.to_string()))
        };
        Ok(Self {
            regular: regular.map(parse).transpose()?,
            bold: bold.map(parse).transpose()?,
        })
    }

    pub fn load(regular: Option<&Path>, bold: Option<&Path>) -> Result<Self, RenderError> {
        let regular = regular.map(std::fs::read).transpose()?;
        let bold = bold.map(std::fs::read).transpose()?;
        if regular.is_none() && bold.is_none() {
            warn!("no font configured; slide text will not be rendered");
        }
        Self::from_bytes(regular.as_deref(), bold.as_deref())
    }

    pub fn is_empty(&self) -> bool {
        self.regular.is_none() && self.bold.is_none()
    }

    fn face(&self, bold: bool) -> Option<&Font> {
        if bold {
            self.bold.as_ref().or(self.regular.as_ref())
        } else {
            self.regular.as_ref().or(self.bold.as_ref())
        }
    }

    fn layout(&self, run: &TextRun, ratio: f32) -> Option<(&Font, Layout)> {
        let font = self.face(run.bold)?;
        let mut layout = Layout::new(CoordinateSystem::PositiveYDown);
        layout.reset(&LayoutSettings {
            x: run.x * ratio,
            y: run.y * ratio,
            max_width: run.width.map(|w| w * ratio),
            horizontal_align: match run.align {
                Align::Left => HorizontalAlign::Left,
                Align::Center => HorizontalAlign::Center,
            },
            wrap_style: WrapStyle::Word,
            line_height: run.line_height,
            ..LayoutSettings::default()
        });
        layout.append(std::slice::from_ref(font), &TextStyle::new(&run.text, run.font_size * ratio, 0));
        Some((font, layout))
    }
}

impl TextMeasure for Fonts {
    fn text_height(&self, text: &str, font_size: f32, max_width: f32, bold: bool) -> f32 {
        let run = TextRun {
            bold,
            ..TextRun::new(text, 0.0, 0.0, font_size).width(max_width)
        };
        self.layout(&run, 1.0).map(|(_, l)| l.height()).unwrap_or(0.0)
    }

    fn text_width(&self, text: &str, font_size: f32, bold: bool) -> f32 {
        self.face(bold)
            .map(|font| text.chars().map(|c| font.metrics(c, font_size).advance_width).sum())
            .unwrap_or(0.0)
    }
}

#[derive(Clone, Default)]
pub struct CpuRasterizer {
    fonts: Arc<Fonts>,
    logo: Option<Arc<DynamicImage>>,
}

impl CpuRasterizer {
    pub fn new(fonts: Arc<Fonts>, logo: Option<DynamicImage>) -> Self {
        Self {
            fonts,
            logo: logo.map(Arc::new),
        }
    }

    pub fn fonts(&self) -> Arc<Fonts> {
        Arc::clone(&self.fonts)
    }

    /// Draw synchronously. Output is `scene` size times `pixel_ratio`.
    pub fn draw(&self, scene: &Scene, pixel_ratio: f32) -> RgbaImage {
        let ratio = if pixel_ratio > 0.0 { pixel_ratio } else { 1.0 };
        let width = ((scene.width as f32) * ratio).round().max(1.0) as u32;
        let height = ((scene.height as f32) * ratio).round().max(1.0) as u32;
        let mut canvas = RgbaImage::new(width, height);

        for layer in &scene.layers {
            match layer {
                Layer::Fill(color) => {
                    for px in canvas.pixels_mut() {
                        *px = Rgba([color[0], color[1], color[2], 255]);
                    }
                }
                Layer::Background { image, x } => {
                    draw_background(&mut canvas, image, *x, scene, ratio);
                }
                Layer::Gradient {
                    y,
                    height,
                    edge,
                    color,
                    max_opacity,
                } => draw_gradient(&mut canvas, *y * ratio, *height * ratio, *edge, *color, *max_opacity),
                Layer::Rect {
                    x,
                    y,
                    width,
                    height,
                    color,
                    opacity,
                } => fill_rect(
                    &mut canvas,
                    (*x * ratio, *y * ratio, *width * ratio, *height * ratio),
                    *color,
                    *opacity,
                ),
                Layer::Text(run) => self.draw_text(&mut canvas, run, ratio),
                Layer::Line { from, to, color, width } => draw_line(
                    &mut canvas,
                    (from.0 * ratio, from.1 * ratio),
                    (to.0 * ratio, to.1 * ratio),
                    *color,
                    (*width * ratio).max(1.0),
                ),
                Layer::Logo { x, y, width } => {
                    if let Some(logo) = &self.logo {
                        draw_logo(&mut canvas, logo, *x * ratio, *y * ratio, *width * ratio);
                    }
                }
            }
        }
        canvas
    }

    fn draw_text(&self, canvas: &mut RgbaImage, run: &TextRun, ratio: f32) {
        let Some((font, layout)) = self.fonts.layout(run, ratio) else {
            return;
        };
        for glyph in layout.glyphs() {
            if glyph.width == 0 || glyph.height == 0 {
                continue;
            }
            let (metrics, coverage) = font.rasterize_config(glyph.key);
            let (gx, gy) = (glyph.x.round() as i64, glyph.y.round() as i64);
            for row in 0..metrics.height {
                for col in 0..metrics.width {
                    let alpha = coverage[row * metrics.width + col];
                    if alpha == 0 {
                        continue;
                    }
                    blend_at(canvas, gx + col as i64, gy + row as i64, run.color, alpha as f64 / 255.0);
                }
            }
        }
    }
}

#[async_trait]
impl Rasterizer for CpuRasterizer {
    #[instrument(skip_all, fields(width = scene.width, height = scene.height, layers = scene.layers.len()))]
    async fn rasterize(&self, scene: &Scene, pixel_ratio: f32) -> Result<RgbaImage, RenderError> {
        let this = self.clone();
        let scene = scene.clone();
        tokio::task::spawn_blocking(move || this.draw(&scene, pixel_ratio))
            .await
            .map_err(|e| RenderError::Task(e.to_string()))
    }
}

fn blend(px: &mut Rgba<u8>, color: Rgb, alpha: f64) {
    let a = alpha.clamp(0.0, 1.0);
    for i in 0..3 {
        let mixed = color[i] as f64 * a + px.0[i] as f64 * (1.0 - a);
        px.0[i] = mixed.round().clamp(0.0, 255.0) as u8;
    }
    px.0[3] = 255;
}

fn blend_at(canvas: &mut RgbaImage, x: i64, y: i64, color: Rgb, alpha: f64) {
    if x < 0 || y < 0 || x >= canvas.width() as i64 || y >= canvas.height() as i64 {
        return;
    }
    blend(canvas.get_pixel_mut(x as u32, y as u32), color, alpha);
}

fn draw_background(canvas: &mut RgbaImage, image: &DynamicImage, x: f64, scene: &Scene, ratio: f32) {
    let fit = CoverFit::new(image.width(), image.height(), scene.width, scene.height);
    let ratio = ratio as f64;
    let w = (fit.width * ratio).ceil().max(1.0) as u32;
    let h = (fit.height * ratio).ceil().max(1.0) as u32;
    let scaled = image.resize_exact(w, h, FilterType::Triangle).to_rgba8();
    let ox = (fit.clamp_x(x) * ratio).round() as i64;
    let oy = (fit.clamp_y(0.0) * ratio).round() as i64;
    image::imageops::overlay(canvas, &scaled, ox, oy);
}

fn draw_gradient(canvas: &mut RgbaImage, y: f32, height: f32, edge: Edge, color: Rgb, max_opacity: f64) {
    if height <= 0.0 {
        return;
    }
    let start = y.max(0.0).floor() as u32;
    let end = ((y + height).ceil().max(0.0) as u32).min(canvas.height());
    for row in start..end {
        let offset = row as f32 + 0.5 - y;
        let t = match edge {
            Edge::Top => offset / height,
            Edge::Bottom => 1.0 - offset / height,
        };
        let alpha = gradient_alpha(t as f64, max_opacity);
        if alpha <= 0.0 {
            continue;
        }
        for col in 0..canvas.width() {
            blend(canvas.get_pixel_mut(col, row), color, alpha);
        }
    }
}

fn fill_rect(canvas: &mut RgbaImage, (x, y, w, h): (f32, f32, f32, f32), color: Rgb, opacity: f64) {
    let x0 = x.max(0.0).floor() as u32;
    let y0 = y.max(0.0).floor() as u32;
    let x1 = ((x + w).ceil().max(0.0) as u32).min(canvas.width());
    let y1 = ((y + h).ceil().max(0.0) as u32).min(canvas.height());
    for row in y0..y1 {
        for col in x0..x1 {
            blend(canvas.get_pixel_mut(col, row), color, opacity);
        }
    }
}

fn draw_line(canvas: &mut RgbaImage, from: (f32, f32), to: (f32, f32), color: Rgb, width: f32) {
    let (dx, dy) = (to.0 - from.0, to.1 - from.1);
    let steps = dx.abs().max(dy.abs()).ceil().max(1.0) as u32;
    let half = width / 2.0;
    for i in 0..=steps {
        let t = i as f32 / steps as f32;
        let (cx, cy) = (from.0 + dx * t, from.1 + dy * t);
        fill_rect(canvas, (cx - half, cy - half, width, width), color, 1.0);
    }
}

fn draw_logo(canvas: &mut RgbaImage, logo: &DynamicImage, x: f32, y: f32, width: f32) {
    if logo.width() == 0 || width < 1.0 {
        return;
    }
    let height = (width * logo.height() as f32 / logo.width() as f32).round().max(1.0) as u32;
    let scaled = logo.resize_exact(width.round() as u32, height, FilterType::Lanczos3);
    image::imageops::overlay(canvas, &scaled.to_rgba8(), x.round() as i64, y.round() as i64);
}

/// Load the optional logo image from disk.
pub fn load_logo(path: Option<&Path>) -> Result<Option<DynamicImage>, RenderError> {
    path.map(|p| std::fs::read(p).map_err(RenderError::from).and_then(|b| imaging::decode_bytes(&b)))
        .transpose()
}
