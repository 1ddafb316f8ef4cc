//! Configuration loader and validator for the carousel generator.
use crate::layout::CONTENT_FONT_CEILING;
use crate::slides::LayoutSettings;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
}

/// Root configuration struct mirroring the YAML schema.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    pub app: App,
    #[serde(default)]
    pub store: Store,
    #[serde(default)]
    pub render: Render,
    #[serde(default)]
    pub overlay: Overlay,
    #[serde(default)]
    pub wordpress: WordPress,
}

/// What the save scheduler does with a batch the store rejected.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SaveFailure {
    /// Put the batch back so the next tick retries it.
    #[default]
    Retain,
    /// Drop the batch; the values stay only in memory.
    Discard,
}

/// App-level settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct App {
    pub data_dir: String,
    #[serde(default = "default_save_interval_ms")]
    pub save_interval_ms: u64,
    #[serde(default)]
    pub on_save_failure: SaveFailure,
}

/// Database retry settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Store {
    pub max_attempts: u32,
    pub retry_backoff_ms: u64,
}

impl Default for Store {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            retry_backoff_ms: 200,
        }
    }
}

/// Rasterizer and layout settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Render {
    pub pixel_ratio: f32,
    pub font_path: Option<String>,
    pub bold_font_path: Option<String>,
    pub logo_path: Option<String>,
    pub blur_radius: f32,
    pub max_fit_iterations: u32,
    pub site_name: String,
}

impl Default for Render {
    fn default() -> Self {
        Self {
            pixel_ratio: 2.0,
            font_path: None,
            bold_font_path: None,
            logo_path: None,
            blur_radius: 100.0,
            max_fit_iterations: 64,
            site_name: "partidesfemmes.fr".to_string(),
        }
    }
}

/// Bounds of the luminosity-driven overlay opacity.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Overlay {
    pub min_opacity: f64,
    pub max_opacity: f64,
}

impl Default for Overlay {
    fn default() -> Self {
        Self {
            min_opacity: 0.5,
            max_opacity: 0.8,
        }
    }
}

/// HTTP client settings for WordPress imports.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WordPress {
    pub user_agent: String,
    pub timeout_secs: u64,
}

impl Default for WordPress {
    fn default() -> Self {
        Self {
            user_agent: concat!("carrousel/", env!("CARGO_PKG_VERSION")).to_string(),
            timeout_secs: 20,
        }
    }
}

fn default_save_interval_ms() -> u64 {
    1000
}

impl Config {
    /// Ensure required directories exist (creates `app.data_dir` if missing).
    pub fn ensure_dirs(&self) -> Result<(), std::io::Error> {
        if self.app.data_dir.trim().is_empty() {
            return Ok(());
        }
        fs::create_dir_all(&self.app.data_dir)
    }

    /// `DATABASE_URL` if set, otherwise a file under `app.data_dir`.
    pub fn database_url(&self) -> String {
        std::env::var("DATABASE_URL").unwrap_or_else(|_| {
            let path = PathBuf::from(&self.app.data_dir).join("carrousel.db");
            format!("sqlite://{}", path.display())
        })
    }

    pub fn save_interval(&self) -> Duration {
        Duration::from_millis(self.app.save_interval_ms)
    }

    pub fn layout_settings(&self) -> LayoutSettings {
        LayoutSettings {
            min_opacity: self.overlay.min_opacity,
            max_opacity: self.overlay.max_opacity,
            max_fit_iterations: self.render.max_fit_iterations,
            blur_radius: self.render.blur_radius,
            site_name: self.render.site_name.clone(),
        }
    }
}

/// Load configuration from a YAML file and validate it.
/// - If `path` is None, uses `config.yaml` in the current working directory.
pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = path.unwrap_or_else(|| Path::new("config.yaml"));
    let content = fs::read_to_string(path)?;
    let cfg: Config = serde_yaml::from_str(&content)?;
    validate(&cfg)?;
    Ok(cfg)
}

/// Validate a configuration instance.
pub fn validate(cfg: &Config) -> Result<(), ConfigError> {
    if cfg.app.data_dir.trim().is_empty() {
        return Err(ConfigError::Invalid("app.data_dir must be non-empty"));
    }
    if cfg.app.save_interval_ms == 0 {
        return Err(ConfigError::Invalid("app.save_interval_ms must be > 0"));
    }

    if cfg.store.max_attempts == 0 {
        return Err(ConfigError::Invalid("store.max_attempts must be >= 1"));
    }

    if !(cfg.render.pixel_ratio > 0.0) {
        return Err(ConfigError::Invalid("render.pixel_ratio must be > 0"));
    }
    if cfg.render.blur_radius < 0.0 {
        return Err(ConfigError::Invalid("render.blur_radius must be >= 0"));
    }
    // Starting from the ceiling, reaching size 1 takes `ceiling` steps.
    if cfg.render.max_fit_iterations < CONTENT_FONT_CEILING {
        return Err(ConfigError::Invalid("render.max_fit_iterations must be >= the content font ceiling"));
    }

    let o = &cfg.overlay;
    if !(0.0..=1.0).contains(&o.min_opacity) || !(0.0..=1.0).contains(&o.max_opacity) {
        return Err(ConfigError::Invalid("overlay opacities must be within [0, 1]"));
    }
    if o.min_opacity > o.max_opacity {
        return Err(ConfigError::Invalid("overlay.min_opacity must be <= overlay.max_opacity"));
    }

    if cfg.wordpress.user_agent.trim().is_empty() {
        return Err(ConfigError::Invalid("wordpress.user_agent must be non-empty"));
    }
    if cfg.wordpress.timeout_secs == 0 {
        return Err(ConfigError::Invalid("wordpress.timeout_secs must be > 0"));
    }

    Ok(())
}

/// Returns the example YAML content.
pub fn example() -> &'static str {
    r#"app:
  data_dir: "./data"
  save_interval_ms: 1000
  on_save_failure: retain

store:
  max_attempts: 3
  retry_backoff_ms: 200

render:
  pixel_ratio: 2.0
  font_path: "./fonts/Inter-Regular.ttf"
  bold_font_path: "./fonts/Inter-Bold.ttf"
  logo_path: "./assets/logo.png"
  blur_radius: 100
  max_fit_iterations: 64
  site_name: "partidesfemmes.fr"

overlay:
  min_opacity: 0.5
  max_opacity: 0.8

wordpress:
  user_agent: "carrousel/0.1"
  timeout_secs: 20
"#
}
