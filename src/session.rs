//! One open record: local state, segmentation and debounced saving.
use crate::config::SaveFailure;
use crate::db::{RecordStore, StoreError};
use crate::export::{self, Artifact, ExportError};
use crate::imaging::{self, RenderError};
use crate::layout::TextMeasure;
use crate::model::{Change, Field, Record, MAX_FORMAT_HEIGHT};
use crate::raster::Rasterizer;
use crate::scene::Scene;
use crate::scheduler::SaveScheduler;
use crate::segment::EditorState;
use crate::slides::{describe, LayoutSettings, SlideAssets, SlideDescriptor};
use crate::wordpress::ImportedArticle;
use image::DynamicImage;
use std::sync::Arc;
use tracing::{info, instrument, warn};

pub struct EditorSession {
    record: Record,
    editor: EditorState,
    scheduler: Arc<SaveScheduler>,
    settings: LayoutSettings,
}

impl EditorSession {
    /// Load `id` from the store (an unknown id opens an empty record).
    #[instrument(skip_all, fields(record_id = %id))]
    pub async fn open(
        store: Arc<dyn RecordStore>,
        id: &str,
        on_failure: SaveFailure,
        settings: LayoutSettings,
    ) -> Result<Self, StoreError> {
        let record = store.get(id).await?;
        info!(slides = record.slides.len(), "opened record");
        Ok(Self {
            editor: EditorState::from_slides(&record.slides),
            scheduler: Arc::new(SaveScheduler::new(id, store, on_failure)),
            record,
            settings,
        })
    }

    pub fn record(&self) -> &Record {
        &self.record
    }

    pub fn editor(&self) -> &EditorState {
        &self.editor
    }

    pub fn scheduler(&self) -> &Arc<SaveScheduler> {
        &self.scheduler
    }

    pub fn settings(&self) -> &LayoutSettings {
        &self.settings
    }

    pub fn is_unsaved(&self, field: Field) -> bool {
        self.scheduler.is_unsaved(field)
    }

    /// Update the local value and queue it for saving. Blank slides are dropped.
    pub fn set(&mut self, change: Change) {
        let change = match change {
            Change::Slides(slides) => {
                let slides = EditorState::from_slides(&slides).to_slides();
                self.editor = EditorState::from_slides(&slides);
                Change::Slides(slides)
            }
            other => other,
        };
        change.apply(&mut self.record);
        self.scheduler.schedule(change);
    }

    /// Replace the body text; cuts outside the edited span are kept.
    pub fn edit_text(&mut self, new_text: &str) {
        self.editor = self.editor.apply_edit(new_text);
        self.sync_slides();
    }

    pub fn add_cut(&mut self, position: usize) {
        self.editor = self.editor.add_cut(position);
        self.sync_slides();
    }

    pub fn remove_cut(&mut self, index: usize) {
        self.editor = self.editor.remove_cut(index);
        self.sync_slides();
    }

    fn sync_slides(&mut self) {
        let slides = self.editor.to_slides();
        if slides != self.record.slides {
            self.record.slides = slides.clone();
            self.scheduler.schedule(Change::Slides(slides));
        }
    }

    /// Store `bytes` (any supported image format) as the background.
    pub fn set_image(&mut self, bytes: &[u8]) -> Result<(), RenderError> {
        let image = imaging::decode_bytes(bytes)?;
        self.set_decoded_image(&image)
    }

    fn set_decoded_image(&mut self, image: &DynamicImage) -> Result<(), RenderError> {
        let resized = imaging::resize_to_max_height(image, MAX_FORMAT_HEIGHT);
        let url = imaging::png_data_url(&resized)?;
        self.set(Change::Image(Some(url)));
        Ok(())
    }

    pub fn clear_image(&mut self) {
        self.set(Change::Image(None));
    }

    /// Copy imported fields into the record. An undecodable image is skipped.
    pub fn apply_import(&mut self, article: &ImportedArticle, with_content: bool) {
        for change in article.changes(with_content) {
            self.set(change);
        }
        let Some(url) = article.image_data_url.as_deref() else {
            return;
        };
        let stored = imaging::decode_data_url(url).and_then(|image| self.set_decoded_image(&image));
        if let Err(err) = stored {
            warn!(?err, record_id = %self.record.id, "imported image ignored");
        }
    }

    pub fn assets(&self) -> SlideAssets {
        SlideAssets::prepare(&self.record, self.settings.blur_radius)
    }

    pub fn descriptors(&self, assets: &SlideAssets, measure: &dyn TextMeasure) -> Vec<SlideDescriptor> {
        describe(&self.record, assets, measure, &self.settings)
    }

    /// One scene per slide, in export order.
    pub fn stages(&self, assets: &SlideAssets, measure: &dyn TextMeasure) -> Vec<Scene> {
        let canvas = self.record.format.dimensions();
        self.descriptors(assets, measure)
            .iter()
            .map(|d| d.scene(canvas, assets, &self.settings.site_name))
            .collect()
    }

    #[instrument(skip_all, fields(record_id = %self.record.id))]
    pub async fn export(
        &self,
        measure: &dyn TextMeasure,
        rasterizer: &dyn Rasterizer,
        pixel_ratio: f32,
    ) -> Result<Artifact, ExportError> {
        let assets = self.assets();
        let stages = self.stages(&assets, measure);
        export::export(&stages, rasterizer, pixel_ratio).await
    }

    /// Save everything still pending.
    pub async fn flush(&self) -> Result<usize, StoreError> {
        self.scheduler.flush().await
    }
}
