//! Renderer-agnostic description of one slide canvas.
//!
//! A [`Scene`] is an ordered list of layers in logical canvas pixels; the
//! rasterizer multiplies everything by the output pixel ratio.

use image::DynamicImage;
use std::sync::Arc;

pub type Rgb = [u8; 3];

pub const WHITE: Rgb = [255, 255, 255];
pub const BLACK: Rgb = [0, 0, 0];
pub const ACCENT: Rgb = [0xff, 0xd9, 0xaf];
pub const OVERLAY: Rgb = [0x11, 0x11, 0x11];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Align {
    #[default]
    Left,
    Center,
}

/// Which side the gradient's opaque edge sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Edge {
    Top,
    Bottom,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TextRun {
    pub text: String,
    pub x: f32,
    pub y: f32,
    /// Wrap width; `None` lays the text out on one line.
    pub width: Option<f32>,
    pub font_size: f32,
    pub bold: bool,
    pub color: Rgb,
    pub align: Align,
    pub line_height: f32,
}

impl TextRun {
    pub fn new(text: impl Into<String>, x: f32, y: f32, font_size: f32) -> Self {
        Self {
            text: text.into(),
            x,
            y,
            width: None,
            font_size,
            bold: false,
            color: WHITE,
            align: Align::Left,
            line_height: 1.0,
        }
    }

    pub fn width(mut self, width: f32) -> Self {
        self.width = Some(width);
        self
    }

    pub fn bold(mut self) -> Self {
        self.bold = true;
        self
    }

    pub fn color(mut self, color: Rgb) -> Self {
        self.color = color;
        self
    }

    pub fn centered(mut self) -> Self {
        self.align = Align::Center;
        self
    }

    pub fn line_height(mut self, line_height: f32) -> Self {
        self.line_height = line_height;
        self
    }
}

#[derive(Debug, Clone)]
pub enum Layer {
    Fill(Rgb),
    /// Cover-fitted background; `x` is clamped by the rasterizer.
    Background { image: Arc<DynamicImage>, x: f64 },
    /// Full-width vertical gradient from opaque `color` at `edge` to clear.
    Gradient {
        y: f32,
        height: f32,
        edge: Edge,
        color: Rgb,
        max_opacity: f64,
    },
    Rect {
        x: f32,
        y: f32,
        width: f32,
        height: f32,
        color: Rgb,
        opacity: f64,
    },
    Text(TextRun),
    Line {
        from: (f32, f32),
        to: (f32, f32),
        color: Rgb,
        width: f32,
    },
    /// Brand logo scaled to `width`, keeping its aspect ratio.
    Logo { x: f32, y: f32, width: f32 },
}

#[derive(Debug, Clone)]
pub struct Scene {
    pub width: u32,
    pub height: u32,
    pub layers: Vec<Layer>,
}

impl Scene {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            layers: vec![Layer::Fill(WHITE)],
        }
    }

    pub fn push(&mut self, layer: Layer) -> &mut Self {
        self.layers.push(layer);
        self
    }

    pub fn texts(&self) -> impl Iterator<Item = &TextRun> {
        self.layers.iter().filter_map(|l| match l {
            Layer::Text(t) => Some(t),
            _ => None,
        })
    }
}
