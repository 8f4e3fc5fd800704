pub mod aggregate;
pub mod config;
pub mod db;
pub mod extract;
pub mod import;
pub mod matcher;
pub mod metadata;
pub mod similarity;
pub mod sources;

/// Article file extensions accepted by `import`
pub const SUPPORTED_EXTENSIONS: &[&str] = &["json", "yaml", "yml"];

/// Application name for XDG paths
pub const APP_NAME: &str = "musicscout";
