use std::path::PathBuf;

use directories::ProjectDirs;
use serde::Deserialize;

use crate::sources::CustomSourceConfig;

/// Application configuration loaded from TOML config file.
/// Every field has a default; the config file is optional.
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// Directories to import articles from (used when `import` has no CLI args).
    pub import_dirs: Vec<PathBuf>,
    /// Custom database path (overrides XDG default).
    pub db_path: Option<PathBuf>,
    /// External album metadata lookups.
    pub metadata: MetadataConfig,
    /// Custom source definitions (merged with the built-in registry).
    #[serde(rename = "sources")]
    pub custom_sources: Vec<CustomSourceConfig>,
}

/// MusicBrainz / Spotify lookup settings.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct MetadataConfig {
    /// Enrich albums as they are created during aggregation.
    pub enabled: bool,
    pub musicbrainz_url: String,
    pub cover_art_url: String,
    /// MusicBrainz rejects requests without an identifying User-Agent.
    pub user_agent: String,
    /// Pause before each MusicBrainz request, in milliseconds.
    pub rate_limit_ms: u64,
    pub spotify_client_id: Option<String>,
    pub spotify_client_secret: Option<String>,
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            musicbrainz_url: "https://musicbrainz.org/ws/2".to_string(),
            cover_art_url: "https://coverartarchive.org".to_string(),
            user_agent: format!(
                "{}/{} (personal music tracker)",
                crate::APP_NAME,
                env!("CARGO_PKG_VERSION")
            ),
            rate_limit_ms: 1000,
            spotify_client_id: None,
            spotify_client_secret: None,
        }
    }
}

impl MetadataConfig {
    /// Both Spotify credentials, when configured.
    pub fn spotify_credentials(&self) -> Option<(&str, &str)> {
        match (&self.spotify_client_id, &self.spotify_client_secret) {
            (Some(id), Some(secret)) if !id.is_empty() && !secret.is_empty() => {
                Some((id.as_str(), secret.as_str()))
            }
            _ => None,
        }
    }
}

impl AppConfig {
    /// Load config from `~/.config/musicscout/config.toml`.
    /// Returns default config if file doesn't exist.
    /// Logs a warning if the file exists but can't be parsed.
    pub fn load() -> Self {
        match Self::config_path() {
            Some(path) if path.exists() => match std::fs::read_to_string(&path) {
                Ok(contents) => Self::parse(&contents).unwrap_or_else(|e| {
                    log::warn!("Failed to parse {}: {}. Using defaults.", path.display(), e);
                    Self::default()
                }),
                Err(e) => {
                    log::warn!("Failed to read {}: {}. Using defaults.", path.display(), e);
                    Self::default()
                }
            },
            _ => {
                log::debug!("No config file found, using defaults");
                Self::default()
            }
        }
    }

    pub fn parse(contents: &str) -> Result<Self, toml::de::Error> {
        let config: AppConfig = toml::from_str(contents)?;
        log::info!(
            "Loaded config ({} custom sources, metadata {})",
            config.custom_sources.len(),
            if config.metadata.enabled { "on" } else { "off" }
        );
        Ok(config)
    }

    /// Get the config file path.
    fn config_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", crate::APP_NAME)
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }
}

/// Resolve the default database path using XDG data directory.
pub fn default_db_path() -> PathBuf {
    if let Some(dirs) = ProjectDirs::from("", "", crate::APP_NAME) {
        let data_dir = dirs.data_dir();
        std::fs::create_dir_all(data_dir).ok();
        data_dir.join("musicscout.db")
    } else {
        PathBuf::from("musicscout.db")
    }
}
