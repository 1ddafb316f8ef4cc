use carrousel::config::SaveFailure;
use carrousel::db::{RecordStore, RetryPolicy, SqliteStore};
use carrousel::export::{ARCHIVE_FILE_NAME, SINGLE_FILE_NAME};
use carrousel::imaging::{decode_data_url, png_data_url};
use carrousel::model::{Change, Field, Format, TextPosition};
use carrousel::raster::{CpuRasterizer, Fonts};
use carrousel::session::EditorSession;
use carrousel::slides::{LayoutSettings, SlideDescriptor};
use carrousel::wordpress::ImportedArticle;
use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
use std::io::Cursor;
use std::sync::Arc;
use zip::ZipArchive;

async fn setup_store() -> Arc<SqliteStore> {
    Arc::new(
        SqliteStore::connect("sqlite::memory:", RetryPolicy::default())
            .await
            .unwrap(),
    )
}

async fn open(store: &Arc<SqliteStore>, id: &str) -> EditorSession {
    EditorSession::open(store.clone(), id, SaveFailure::Retain, LayoutSettings::default())
        .await
        .unwrap()
}

fn png_bytes(w: u32, h: u32) -> Vec<u8> {
    let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(w, h, Rgba([200, 200, 200, 255])));
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, ImageFormat::Png).unwrap();
    out.into_inner()
}

#[tokio::test]
async fn typed_setters_persist_only_after_flush() {
    let store = setup_store().await;
    let mut session = open(&store, "r1").await;

    session.set(Change::Title("Titre".into()));
    session.set(Change::Position(TextPosition::Bottom));
    assert_eq!(session.record().title, "Titre");
    assert!(session.is_unsaved(Field::Title));
    assert_eq!(store.get("r1").await.unwrap().title, "");

    assert_eq!(session.flush().await.unwrap(), 2);
    assert!(!session.is_unsaved(Field::Title));

    let stored = store.get("r1").await.unwrap();
    assert_eq!(stored.title, "Titre");
    assert_eq!(stored.position, TextPosition::Bottom);
}

#[tokio::test]
async fn text_edits_and_cuts_become_slides() {
    let store = setup_store().await;
    let mut session = open(&store, "r1").await;

    session.edit_text("Premier. Second.");
    assert_eq!(session.record().slides, vec!["Premier. Second."]);

    session.add_cut(8);
    assert_eq!(session.record().slides, vec!["Premier.", " Second."]);

    // Edit inside the second slide keeps the cut.
    session.edit_text("Premier. Deuxième.");
    assert_eq!(session.editor().cuts(), &[8]);
    assert_eq!(session.record().slides, vec!["Premier.", " Deuxième."]);
    session.flush().await.unwrap();

    let reopened = open(&store, "r1").await;
    assert_eq!(reopened.record().slides, vec!["Premier.", " Deuxième."]);
    assert_eq!(reopened.editor().full_text(), "Premier. Deuxième.");
    assert_eq!(reopened.editor().cuts(), &[8]);

    let mut reopened = reopened;
    reopened.remove_cut(0);
    assert_eq!(reopened.record().slides, vec!["Premier. Deuxième."]);
}

#[tokio::test]
async fn whitespace_slice_is_dropped() {
    let store = setup_store().await;
    let mut session = open(&store, "r1").await;
    session.set(Change::Slides(vec!["Un".into(), "Deux".into()]));
    session.edit_text("Un   ");
    assert_eq!(session.record().slides, vec!["Un"]);
}

#[tokio::test]
async fn blank_slides_are_never_stored() {
    let store = setup_store().await;
    let mut session = open(&store, "r1").await;
    session.set(Change::Slides(vec!["".into(), "   ".into(), "texte".into()]));

    assert_eq!(session.record().slides, vec!["texte"]);
    assert_eq!(session.editor().to_slides(), session.record().slides);
    assert_eq!(session.record().stage_count(), 2);

    session.flush().await.unwrap();
    assert_eq!(store.get("r1").await.unwrap().slides, vec!["texte"]);
}

#[tokio::test]
async fn image_is_downsized_to_tallest_format() {
    let store = setup_store().await;
    let mut session = open(&store, "r1").await;
    session.set_image(&png_bytes(40, 20)).unwrap();
    session.flush().await.unwrap();

    let stored = store.get("r1").await.unwrap();
    let image = decode_data_url(stored.image.as_deref().unwrap()).unwrap();
    assert_eq!((image.width(), image.height()), (3840, 1920));
    assert!(session.set_image(b"not an image").is_err());
}

#[tokio::test]
async fn import_sets_fields() {
    let store = setup_store().await;
    let mut session = open(&store, "r1").await;
    session.set(Change::Slides(vec!["ancien".into()]));

    let image = DynamicImage::ImageRgba8(RgbaImage::from_pixel(10, 20, Rgba([0, 0, 0, 255])));
    let article = ImportedArticle {
        title: "Titre importé".into(),
        content: "Corps".into(),
        legend: "Résumé".into(),
        article_url: "https://example.org/a/".into(),
        rubric: Some("actu".into()),
        image_caption: Some("Photo : X".into()),
        image_data_url: Some(png_data_url(&image).unwrap()),
    };

    session.apply_import(&article, false);
    assert_eq!(session.record().slides, vec!["ancien"]);

    session.apply_import(&article, true);
    session.flush().await.unwrap();

    let stored = store.get("r1").await.unwrap();
    assert_eq!(stored.title, "Titre importé");
    assert_eq!(stored.slides, vec!["Corps"]);
    assert_eq!(stored.rubric, "actu");
    assert_eq!(stored.legend, "Résumé");
    assert_eq!(stored.article_url.as_deref(), Some("https://example.org/a/"));
    assert_eq!(stored.image_caption.as_deref(), Some("Photo : X"));
    let image = decode_data_url(stored.image.as_deref().unwrap()).unwrap();
    assert_eq!(image.height(), 1920);
}

#[tokio::test]
async fn descriptors_follow_record() {
    let store = setup_store().await;
    let mut session = open(&store, "r1").await;
    session.set(Change::Slides(vec!["a".into(), "b".into()]));
    session.set(Change::Subscribe(true));
    session.set(Change::Format(Format::Story));

    let fonts = Fonts::default();
    let assets = session.assets();
    let descriptors = session.descriptors(&assets, &fonts);
    assert_eq!(descriptors.len(), 4);
    assert!(matches!(descriptors[3], SlideDescriptor::Subscribe(_)));

    let stages = session.stages(&assets, &fonts);
    assert!(stages.iter().all(|s| (s.width, s.height) == (1080, 1920)));
}

#[tokio::test]
async fn export_names_follow_stage_count() {
    let store = setup_store().await;
    let mut session = open(&store, "r1").await;
    let rasterizer = CpuRasterizer::default();
    let fonts = rasterizer.fonts();

    let single = session.export(fonts.as_ref(), &rasterizer, 0.1).await.unwrap();
    assert_eq!(single.name, SINGLE_FILE_NAME);

    session.set(Change::Slides(vec!["Une slide".into()]));
    let archive = session.export(fonts.as_ref(), &rasterizer, 0.1).await.unwrap();
    assert_eq!(archive.name, ARCHIVE_FILE_NAME);
    let mut zip = ZipArchive::new(Cursor::new(archive.bytes)).unwrap();
    let names: Vec<String> = (0..zip.len())
        .map(|i| zip.by_index(i).unwrap().name().to_string())
        .collect();
    assert_eq!(names, vec!["0.png", "1.png"]);
}
