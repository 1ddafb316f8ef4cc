//! Slide descriptors: the record turned into renderable slides.
//!
//! Descriptors carry the derived values (fitted font size, overlay opacity,
//! measured block heights) and build the [`Scene`] the rasterizer draws.

use crate::imaging;
use crate::layout::{self, converge, FitBand, TextMeasure, CONTENT_FONT_CEILING};
use crate::luminosity::{opacity_from_luminosity, sample_luminosity, SampleRegion};
use crate::model::{Record, TextPosition};
use crate::scene::{Edge, Layer, Scene, TextRun, ACCENT, BLACK, OVERLAY, WHITE};
use crate::typography::apply_french_typography;
use image::DynamicImage;
use std::sync::Arc;
use tracing::{debug, warn};

const MARGIN: f32 = 150.0;
const TITLE_SIZE: f32 = 80.0;
const INTRO_SIZE: f32 = 64.0;
const RUBRIC_SIZE: f32 = 64.0;
const CONTENT_RUBRIC_SIZE: f32 = 48.0;
const ARROW_SIZE: f32 = 108.0;
const GRADIENT_PADDING: f32 = 350.0;

/// Inputs of slide derivation that come from configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct LayoutSettings {
    pub min_opacity: f64,
    pub max_opacity: f64,
    pub max_fit_iterations: u32,
    pub blur_radius: f32,
    pub site_name: String,
}

impl Default for LayoutSettings {
    fn default() -> Self {
        Self {
            min_opacity: 0.5,
            max_opacity: 0.8,
            max_fit_iterations: 64,
            blur_radius: 100.0,
            site_name: "partidesfemmes.fr".to_string(),
        }
    }
}

/// Decoded background image and its blurred copy.
#[derive(Debug, Clone, Default)]
pub struct SlideAssets {
    pub image: Option<Arc<DynamicImage>>,
    pub blurred: Option<Arc<DynamicImage>>,
}

impl SlideAssets {
    /// Decode the record image. An undecodable image is treated as absent.
    pub fn prepare(record: &Record, blur_radius: f32) -> Self {
        let Some(url) = record.image.as_deref() else {
            return Self::default();
        };
        match imaging::decode_data_url(url) {
            Ok(image) => Self::from_image(image, blur_radius),
            Err(err) => {
                warn!(?err, record_id = %record.id, "ignoring undecodable image");
                Self::default()
            }
        }
    }

    pub fn from_image(image: DynamicImage, blur_radius: f32) -> Self {
        let blurred = imaging::blurred(&image, blur_radius);
        Self {
            image: Some(Arc::new(image)),
            blurred: Some(Arc::new(blurred)),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FirstSlide {
    pub title: String,
    pub intro: String,
    pub rubric: String,
    pub position: TextPosition,
    pub image_x: f64,
    pub title_height: f32,
    pub intro_height: f32,
    pub font_size: u32,
    /// Maximum opacity of the gradient behind the title block.
    pub overlay_opacity: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ContentSlide {
    /// Position among content slides.
    pub index: usize,
    pub text: String,
    pub rubric: String,
    pub image_x: f64,
    pub font_size: u32,
    pub content_height: f32,
    pub rubric_width: f32,
    pub overlay_opacity: f64,
    pub last: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SubscribeSlide {
    pub issue_number: i64,
    pub image_x: f64,
    pub overlay_opacity: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SlideDescriptor {
    First(FirstSlide),
    Content(ContentSlide),
    Subscribe(SubscribeSlide),
}

/// Derive every slide of `record`, in export order.
pub fn describe(
    record: &Record,
    assets: &SlideAssets,
    measure: &dyn TextMeasure,
    settings: &LayoutSettings,
) -> Vec<SlideDescriptor> {
    let (canvas_w, canvas_h) = record.format.dimensions();
    let text_width = canvas_w as f32 - 2.0 * MARGIN;
    let image = assets.image.as_deref();
    let opacity = |region| {
        opacity_from_luminosity(
            sample_luminosity(image, region),
            settings.min_opacity,
            settings.max_opacity,
        )
    };

    let mut slides = Vec::with_capacity(record.stage_count());

    let title = apply_french_typography(&record.title);
    let intro = apply_french_typography(&record.intro);
    let region = match record.position {
        TextPosition::Top => SampleRegion::Top,
        TextPosition::Bottom => SampleRegion::Bottom,
    };
    slides.push(SlideDescriptor::First(FirstSlide {
        title_height: height_of(measure, &title, TITLE_SIZE, text_width, true),
        intro_height: height_of(measure, &intro, INTRO_SIZE, text_width, false),
        title,
        intro,
        rubric: record.rubric.clone(),
        position: record.position,
        image_x: record.image_x,
        font_size: TITLE_SIZE as u32,
        overlay_opacity: opacity(region),
    }));

    let backdrop = opacity(SampleRegion::Middle);
    let band = FitBand::for_canvas(canvas_h);
    let rubric_width = measure.text_width(&record.rubric, CONTENT_RUBRIC_SIZE, false);
    let count = record.slides.len();
    for (index, raw) in record.slides.iter().enumerate() {
        let text = apply_french_typography(raw);
        let fit = converge(
            |size| height_of(measure, &text, size as f32, text_width, false),
            CONTENT_FONT_CEILING,
            band,
            CONTENT_FONT_CEILING,
            settings.max_fit_iterations,
        );
        debug!(index, font_size = fit.font_size, iterations = fit.iterations, converged = fit.converged, "fitted content slide");
        slides.push(SlideDescriptor::Content(ContentSlide {
            index,
            content_height: height_of(measure, &text, fit.font_size as f32, text_width, false),
            text,
            rubric: record.rubric.clone(),
            image_x: record.image_x,
            font_size: fit.font_size,
            rubric_width,
            overlay_opacity: backdrop,
            last: index + 1 == count,
        }));
    }

    if record.subscribe {
        slides.push(SlideDescriptor::Subscribe(SubscribeSlide {
            issue_number: record.issue_number,
            image_x: record.image_x,
            overlay_opacity: backdrop,
        }));
    }
    slides
}

fn height_of(measure: &dyn TextMeasure, text: &str, size: f32, width: f32, bold: bool) -> f32 {
    if text.is_empty() {
        0.0
    } else {
        measure.text_height(text, size, width, bold)
    }
}

impl SlideDescriptor {
    pub fn font_size(&self) -> u32 {
        match self {
            SlideDescriptor::First(s) => s.font_size,
            SlideDescriptor::Content(s) => s.font_size,
            SlideDescriptor::Subscribe(_) => 82,
        }
    }

    pub fn overlay_opacity(&self) -> f64 {
        match self {
            SlideDescriptor::First(s) => s.overlay_opacity,
            SlideDescriptor::Content(s) => s.overlay_opacity,
            SlideDescriptor::Subscribe(s) => s.overlay_opacity,
        }
    }

    /// Layers for this slide on a `canvas` sized (width, height) stage.
    pub fn scene(&self, canvas: (u32, u32), assets: &SlideAssets, site_name: &str) -> Scene {
        match self {
            SlideDescriptor::First(s) => first_scene(s, canvas, assets),
            SlideDescriptor::Content(s) => content_scene(s, canvas, assets),
            SlideDescriptor::Subscribe(s) => subscribe_scene(s, canvas, assets, site_name),
        }
    }
}

fn first_scene(s: &FirstSlide, (w, h): (u32, u32), assets: &SlideAssets) -> Scene {
    let mut scene = Scene::new(w, h);
    let (cw, ch) = (w as f32, h as f32);
    let text_width = cw - 2.0 * MARGIN;
    let block = s.title_height + s.intro_height;
    let top = s.position == TextPosition::Top;

    if let Some(image) = &assets.image {
        scene.push(Layer::Background {
            image: Arc::clone(image),
            x: s.image_x,
        });
    }
    let gradient_height = block + GRADIENT_PADDING;
    scene.push(Layer::Gradient {
        y: if top { 0.0 } else { ch - gradient_height },
        height: gradient_height,
        edge: if top { Edge::Top } else { Edge::Bottom },
        color: BLACK,
        max_opacity: s.overlay_opacity,
    });
    scene.push(Layer::Logo {
        x: MARGIN,
        y: if top { 70.0 } else { ch - 250.0 - block },
        width: 80.0,
    });
    scene.push(Layer::Text(
        TextRun::new(&s.rubric, 260.0, if top { 85.0 } else { ch - 235.0 - block }, RUBRIC_SIZE)
            .color(ACCENT),
    ));
    scene.push(Layer::Text(
        TextRun::new(&s.title, MARGIN, if top { 200.0 } else { ch - 150.0 - block }, TITLE_SIZE)
            .width(text_width)
            .bold(),
    ));
    scene.push(Layer::Text(
        TextRun::new(
            &s.intro,
            MARGIN,
            if top {
                250.0 + s.title_height
            } else {
                ch - 100.0 - s.intro_height
            },
            INTRO_SIZE,
        )
        .width(text_width),
    ));
    scene
}

fn backdrop(scene: &mut Scene, assets: &SlideAssets, image_x: f64, opacity: f64) {
    if let Some(image) = assets.blurred.as_ref().or(assets.image.as_ref()) {
        scene.push(Layer::Background {
            image: Arc::clone(image),
            x: image_x,
        });
    }
    let (w, h) = (scene.width as f32, scene.height as f32);
    scene.push(Layer::Rect {
        x: 0.0,
        y: 0.0,
        width: w,
        height: h,
        color: OVERLAY,
        opacity,
    });
}

fn content_scene(s: &ContentSlide, (w, h): (u32, u32), assets: &SlideAssets) -> Scene {
    let mut scene = Scene::new(w, h);
    let (cw, ch) = (w as f32, h as f32);
    backdrop(&mut scene, assets, s.image_x, s.overlay_opacity);

    scene.push(Layer::Logo {
        x: cw - 150.0 - s.rubric_width,
        y: 37.0,
        width: 60.0,
    });
    scene.push(Layer::Text(
        TextRun::new(&s.rubric, cw - 60.0 - s.rubric_width, 60.0, CONTENT_RUBRIC_SIZE).color(ACCENT),
    ));
    scene.push(Layer::Text(
        TextRun::new(&s.text, MARGIN, (ch - s.content_height) / 2.0, s.font_size as f32)
            .width(cw - 2.0 * MARGIN),
    ));
    if !s.last {
        scene.push(Layer::Text(
            TextRun::new(">", cw - MARGIN, ch - 207.0, ARROW_SIZE)
                .color(ACCENT)
                .bold(),
        ));
    }
    scene
}

fn subscribe_scene(s: &SubscribeSlide, (w, h): (u32, u32), assets: &SlideAssets, site_name: &str) -> Scene {
    let mut scene = Scene::new(w, h);
    let cw = w as f32;
    // Fixed layout designed for the reference height, centred on taller canvases.
    let dy = ((h as f32 - layout::REFERENCE_HEIGHT) / 2.0).max(0.0);
    backdrop(&mut scene, assets, s.image_x, s.overlay_opacity);

    let wide = cw - 2.0 * MARGIN;
    let narrow = cw - 2.0 * 200.0;
    let line_y = 565.0 + dy;
    scene
        .push(Layer::Text(
            TextRun::new(
                format!("La suite de cet article est à retrouver dans notre N°{}", s.issue_number),
                MARGIN,
                200.0 + dy,
                82.0,
            )
            .width(wide)
            .centered(),
        ))
        .push(Layer::Text(TextRun::new("ou", MARGIN, 530.0 + dy, 72.0).width(wide).centered()))
        .push(Layer::Line {
            from: (MARGIN, line_y),
            to: (450.0, line_y),
            color: WHITE,
            width: 1.0,
        })
        .push(Layer::Line {
            from: (cw - MARGIN, line_y),
            to: (cw - 450.0, line_y),
            color: WHITE,
            width: 1.0,
        })
        .push(Layer::Text(TextRun::new("sur", MARGIN, 680.0 + dy, 72.0).width(wide).centered()))
        .push(Layer::Text(
            TextRun::new(site_name, MARGIN, 760.0 + dy, 72.0)
                .width(wide)
                .centered()
                .bold(),
        ))
        .push(Layer::Logo {
            x: (cw - 90.0) / 2.0,
            y: 950.0 + dy,
            width: 90.0,
        })
        .push(Layer::Text(
            TextRun::new("Soutiens la presse féministe et indépendante !", 200.0, 1060.0 + dy, 50.0)
                .width(narrow)
                .centered()
                .color(ACCENT)
                .line_height(1.1),
        ))
        .push(Layer::Text(
            TextRun::new("Abonne-toi !", 200.0, 1180.0 + dy, 50.0)
                .width(narrow)
                .centered()
                .color(ACCENT)
                .bold(),
        ));
    scene
}
