use serde::Deserialize;

use crate::db::models::{NewSource, SourceKind};
use crate::db::{Database, Result};

/// Config file source definition (deserialized from TOML).
///
/// A name matching a built-in source overrides only the fields given.
/// A new name needs a `url`.
#[derive(Debug, Deserialize, Clone)]
pub struct CustomSourceConfig {
    pub name: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub weight: Option<f64>,
}

/// The set of review sources known to this installation.
#[derive(Debug)]
pub struct SourceRegistry {
    sources: Vec<NewSource>,
}

/// Outcome of seeding the sources table.
#[derive(Debug, Default)]
pub struct SeedResult {
    pub created: usize,
    pub existing: usize,
}

impl SourceRegistry {
    /// Built-in sources merged with config entries.
    pub fn new(custom_sources: &[CustomSourceConfig]) -> Self {
        let mut sources = builtin_sources();

        for custom in custom_sources {
            let kind = custom.kind.as_deref().and_then(|k| {
                let parsed = SourceKind::parse(k);
                if parsed.is_none() {
                    log::warn!("Unknown source kind '{k}' for {}, ignoring", custom.name);
                }
                parsed
            });

            let existing = sources
                .iter_mut()
                .find(|s| s.name.eq_ignore_ascii_case(&custom.name));

            if let Some(entry) = existing {
                if let Some(url) = &custom.url {
                    entry.url = url.clone();
                }
                if let Some(kind) = kind {
                    entry.kind = kind;
                }
                if let Some(weight) = custom.weight {
                    entry.weight = weight;
                }
            } else if let Some(url) = &custom.url {
                sources.push(NewSource {
                    name: custom.name.clone(),
                    url: url.clone(),
                    kind: kind.unwrap_or(SourceKind::Rss),
                    weight: custom.weight.unwrap_or(1.0),
                });
            } else {
                log::warn!("Custom source '{}' has no url, skipping", custom.name);
            }
        }

        Self { sources }
    }

    pub fn sources(&self) -> &[NewSource] {
        &self.sources
    }

    pub fn get(&self, name: &str) -> Option<&NewSource> {
        self.sources.iter().find(|s| s.name.eq_ignore_ascii_case(name))
    }

    /// Insert every registry source not yet in the database.
    /// Existing rows are left untouched.
    pub fn seed(&self, db: &Database) -> Result<SeedResult> {
        let mut result = SeedResult::default();
        for source in &self.sources {
            if db.insert_source_if_missing(source)? {
                log::info!("Created source: {}", source.name);
                result.created += 1;
            } else {
                log::debug!("Source already exists: {}", source.name);
                result.existing += 1;
            }
        }
        Ok(result)
    }
}

fn rss(name: &str, url: &str, weight: f64) -> NewSource {
    NewSource {
        name: name.to_string(),
        url: url.to_string(),
        kind: SourceKind::Rss,
        weight,
    }
}

fn builtin_sources() -> Vec<NewSource> {
    vec![
        rss("The Prog Report", "https://progreport.com/feed/", 1.2),
        rss(
            "The Prog Report Reviews",
            "https://progreport.com/category/progressive-rock-reviews/feed/",
            1.2,
        ),
        rss("Sonic Perspectives", "https://www.sonicperspectives.com/feed/", 1.5),
        rss(
            "Sonic Perspectives Reviews",
            "https://www.sonicperspectives.com/category/album-reviews/feed/",
            1.5,
        ),
        rss("Metal Injection", "https://metalinjection.net/feed", 1.0),
        rss("Ultimate Classic Rock", "https://ultimateclassicrock.com/feed/", 1.3),
        rss("The Prog Mind", "https://theprogmind.com/feed/", 1.4),
        rss("Heavy Music HQ", "https://heavymusichq.com/feed/", 1.2),
        rss("Proglodytes", "https://www.proglodytes.com/feed/", 1.4),
        rss("Blabbermouth", "https://www.blabbermouth.net/feed/", 1.0),
        rss("Louder Sound Prog", "https://www.loudersound.com/prog/feed", 1.3),
        rss("MetalSucks", "https://www.metalsucks.net/feed/", 1.0),
        rss("Brooklyn Vegan", "https://www.brooklynvegan.com/feed/", 0.8),
    ]
}
