//! Branded carousel slides for social networks: text segmentation, debounced
//! field-level saving, luminosity-aware layout and PNG/ZIP export.

pub mod caption;
pub mod config;
pub mod db;
pub mod export;
pub mod imaging;
pub mod layout;
pub mod luminosity;
pub mod model;
pub mod raster;
pub mod scene;
pub mod scheduler;
pub mod segment;
pub mod session;
pub mod slides;
pub mod typography;
pub mod wordpress;
