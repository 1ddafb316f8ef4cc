use anyhow::{Context, Result};
use carrousel::caption::{generate_caption, Network};
use carrousel::config::{self, Config};
use carrousel::db::{RecordStore, RetryPolicy, SqliteStore};
use carrousel::export::{DirectorySink, DownloadSink};
use carrousel::model::{Change, Field, Record};
use carrousel::raster::{load_logo, CpuRasterizer, Fonts};
use carrousel::session::EditorSession;
use carrousel::wordpress::{ArticleSource, WordPressClient};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info};

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print a fresh record id
    New,
    /// List stored record ids, most recently edited first
    List,
    /// Print a record as JSON (image elided)
    Show { id: String },
    /// Print the body text sections and their start offsets
    Sections { id: String },
    /// Set one field, e.g. `set <id> title "Mon titre"`
    Set { id: String, field: Field, value: String },
    /// Replace the body text with the content of a file
    Text { id: String, file: PathBuf },
    /// Add a slide boundary at a character offset of the body text
    Cut { id: String, position: usize },
    /// Remove the n-th slide boundary
    Uncut { id: String, index: usize },
    /// Use an image file as background
    Image { id: String, file: PathBuf },
    /// Import title, excerpt, rubric and image from a WordPress article
    Import {
        id: String,
        url: String,
        /// Keep the current slides instead of importing the article body
        #[arg(long)]
        without_content: bool,
    },
    /// Render all slides into `slide.png` or `slides.zip`
    Export {
        id: String,
        #[arg(long, default_value = ".")]
        out: PathBuf,
    },
    /// Print a caption for a social network
    Caption { id: String, network: Network },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    let cfg = config::load(Some(&args.config))
        .with_context(|| format!("failed to load {}", args.config.display()))?;
    cfg.ensure_dirs()?;

    let database_url = cfg.database_url();
    let store = Arc::new(
        SqliteStore::connect(&database_url, RetryPolicy::from_config(&cfg.store))
            .await
            .with_context(|| format!("failed to open {database_url}"))?,
    );

    if let Err(err) = run(args.command, &cfg, store).await {
        error!(?err, "command failed");
        return Err(err);
    }
    Ok(())
}

async fn run(command: Command, cfg: &Config, store: Arc<SqliteStore>) -> Result<()> {
    match command {
        Command::New => println!("{}", uuid::Uuid::new_v4()),
        Command::List => {
            for id in store.list_ids().await? {
                println!("{id}");
            }
        }
        Command::Show { id } => {
            let record = store.get(&id).await?;
            println!("{}", serde_json::to_string_pretty(&elide_image(record))?);
        }
        Command::Sections { id } => {
            let session = open(cfg, store, &id).await?;
            let editor = session.editor();
            for (i, section) in editor.sections().iter().enumerate() {
                println!("[{i}] @{}\n{section}\n", editor.section_start(i));
            }
        }
        Command::Set { id, field, value } => {
            let change = Change::parse(field, &value)?;
            edit(cfg, store, &id, |s| {
                s.set(change);
                Ok(())
            })
            .await?;
        }
        Command::Text { id, file } => {
            let text = tokio::fs::read_to_string(&file)
                .await
                .with_context(|| format!("failed to read {}", file.display()))?;
            edit(cfg, store, &id, |s| {
                s.edit_text(&text);
                Ok(())
            })
            .await?;
        }
        Command::Cut { id, position } => {
            edit(cfg, store, &id, |s| {
                s.add_cut(position);
                Ok(())
            })
            .await?;
        }
        Command::Uncut { id, index } => {
            edit(cfg, store, &id, |s| {
                s.remove_cut(index);
                Ok(())
            })
            .await?;
        }
        Command::Image { id, file } => {
            let bytes = tokio::fs::read(&file)
                .await
                .with_context(|| format!("failed to read {}", file.display()))?;
            edit(cfg, store, &id, |s| {
                s.set_image(&bytes).context("unsupported image")
            })
            .await?;
        }
        Command::Import {
            id,
            url,
            without_content,
        } => {
            let client = WordPressClient::from_config(&cfg.wordpress)?;
            // Import errors are user-facing messages.
            let article = match client.import(&url).await {
                Ok(article) => article,
                Err(err) => {
                    eprintln!("{err}");
                    return Ok(());
                }
            };
            edit(cfg, store, &id, |s| {
                s.apply_import(&article, !without_content);
                Ok(())
            })
            .await?;
        }
        Command::Export { id, out } => {
            let session = open(cfg, store, &id).await?;
            let rasterizer = rasterizer(cfg)?;
            let fonts = rasterizer.fonts();
            let artifact = session
                .export(fonts.as_ref(), &rasterizer, cfg.render.pixel_ratio)
                .await?;
            let path = DirectorySink::new(out).deliver(&artifact).await?;
            println!("{}", path.display());
        }
        Command::Caption { id, network } => {
            let record = store.get(&id).await?;
            println!(
                "{}",
                generate_caption(
                    network,
                    &record.legend,
                    record.image_caption.as_deref(),
                    record.article_url.as_deref(),
                )
            );
        }
    }
    Ok(())
}

async fn open(cfg: &Config, store: Arc<SqliteStore>, id: &str) -> Result<EditorSession> {
    let session = EditorSession::open(store, id, cfg.app.on_save_failure, cfg.layout_settings()).await?;
    Ok(session)
}

/// Open `id`, apply `f` while the periodic saver runs, then flush.
async fn edit<F>(cfg: &Config, store: Arc<SqliteStore>, id: &str, f: F) -> Result<()>
where
    F: FnOnce(&mut EditorSession) -> Result<()>,
{
    let mut session = open(cfg, store, id).await?;
    let ticker = session.scheduler().spawn(cfg.save_interval());
    let applied = f(&mut session);
    // Waits for a tick that is mid-save, then writes what is left.
    let flushed = session.flush().await;
    ticker.abort();
    applied?;
    let fields = flushed?;
    info!(record_id = %id, fields, "record saved");
    Ok(())
}

fn rasterizer(cfg: &Config) -> Result<CpuRasterizer> {
    let fonts = Fonts::load(
        cfg.render.font_path.as_deref().map(Path::new),
        cfg.render.bold_font_path.as_deref().map(Path::new),
    )
    .context("failed to load fonts")?;
    let logo = load_logo(cfg.render.logo_path.as_deref().map(Path::new)).context("failed to load logo")?;
    Ok(CpuRasterizer::new(Arc::new(fonts), logo))
}

fn elide_image(mut record: Record) -> Record {
    if let Some(image) = &record.image {
        record.image = Some(format!("<{} bytes data URL>", image.len()));
    }
    record
}
