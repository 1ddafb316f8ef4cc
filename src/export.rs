//! Export of rendered slides: one PNG, or a ZIP of PNGs named by slide index.
use crate::imaging::{encode_png, RenderError};
use crate::raster::Rasterizer;
use crate::scene::Scene;
use async_trait::async_trait;
use futures::future::try_join_all;
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, instrument};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

pub const SINGLE_FILE_NAME: &str = "slide.png";
pub const ARCHIVE_FILE_NAME: &str = "slides.zip";
/// Output pixels per canvas pixel.
pub const DEFAULT_PIXEL_RATIO: f32 = 2.0;

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("nothing to export")]
    NoStages,
    #[error(transparent)]
    Render(#[from] RenderError),
    #[error("archive error: {0}")]
    Archive(#[from] zip::result::ZipError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A named file ready to hand to a [`DownloadSink`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub name: String,
    pub mime: &'static str,
    pub bytes: Vec<u8>,
}

/// Receives finished exports.
#[async_trait]
pub trait DownloadSink: Send + Sync {
    async fn deliver(&self, artifact: &Artifact) -> Result<PathBuf, ExportError>;
}

/// Writes artifacts into a directory, overwriting same-named files.
#[derive(Debug, Clone)]
pub struct DirectorySink {
    dir: PathBuf,
}

impl DirectorySink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[async_trait]
impl DownloadSink for DirectorySink {
    async fn deliver(&self, artifact: &Artifact) -> Result<PathBuf, ExportError> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.dir.join(&artifact.name);
        tokio::fs::write(&path, &artifact.bytes).await?;
        info!(path = %path.display(), bytes = artifact.bytes.len(), "export written");
        Ok(path)
    }
}

/// Rasterize `stages` (in slide order) and package them.
///
/// All stages are rasterized concurrently; file indices come from each
/// stage's position in `stages`, not from completion order.
#[instrument(skip_all, fields(stages = stages.len()))]
pub async fn export(
    stages: &[Scene],
    rasterizer: &dyn Rasterizer,
    pixel_ratio: f32,
) -> Result<Artifact, ExportError> {
    if stages.is_empty() {
        return Err(ExportError::NoStages);
    }

    let bitmaps = try_join_all(stages.iter().map(|s| rasterizer.rasterize(s, pixel_ratio))).await?;

    if let [single] = bitmaps.as_slice() {
        return Ok(Artifact {
            name: SINGLE_FILE_NAME.to_string(),
            mime: "image/png",
            bytes: encode_png(single)?,
        });
    }

    let pngs = bitmaps.iter().map(encode_png).collect::<Result<Vec<_>, _>>()?;
    Ok(Artifact {
        name: ARCHIVE_FILE_NAME.to_string(),
        mime: "application/zip",
        bytes: archive(&pngs)?,
    })
}

/// ZIP the PNGs as `0.png`, `1.png`, … in the given order.
pub fn archive(pngs: &[Vec<u8>]) -> Result<Vec<u8>, ExportError> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    // PNG data is already compressed.
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
    for (i, png) in pngs.iter().enumerate() {
        zip.start_file(format!("{i}.png"), options)?;
        zip.write_all(png)?;
    }
    Ok(zip.finish()?.into_inner())
}
