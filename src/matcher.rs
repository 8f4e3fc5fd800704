//! Resolve free-text artist and album mentions onto canonical entities.
//!
//! Exact lookup on the normalized key first, then a fuzzy scan in creation
//! order. Ties on the best score go to the entity created first.

use std::sync::LazyLock;

use chrono::Datelike;
use regex::Regex;

use crate::db::models::{Album, Artist, NewAlbum, ReviewItem};
use crate::db::{Database, Result};
use crate::metadata::MetadataProvider;
use crate::similarity::similarity;

/// Scores at or above this are effectively the same name.
pub const EXACT_MATCH_THRESHOLD: f64 = 0.95;
/// Minimum score to auto-link to an existing entity.
pub const STRONG_MATCH_THRESHOLD: f64 = 0.85;
/// Minimum score to appear in suggestion lists.
pub const WEAK_MATCH_THRESHOLD: f64 = 0.70;
/// Added to an album candidate whose release year equals the supplied one.
pub const YEAR_MATCH_BONUS: f64 = 0.10;

/// Weights for the combined score in [`EntityMatcher::find_similar`].
const SIMILAR_TITLE_WEIGHT: f64 = 0.7;
const SIMILAR_ARTIST_WEIGHT: f64 = 0.3;

// Innermost (...), [...] or {...} span, contents included
static BRACKETED_SPAN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\([^()]*\)|\[[^\[\]]*\]|\{[^{}]*\}").unwrap());

static PUNCTUATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"['".,!?:;()\[\]{}‘’“”]"#).unwrap());

static DASH_VARIANTS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[–—―‐‑]").unwrap());

static WHITESPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").unwrap());

static LEADING_ARTICLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:the\s+)+").unwrap());

/// Canonical comparison key for an artist name or album title.
///
/// Lowercases, drops bracketed spans with their contents, strips punctuation,
/// unifies dashes to `-`, collapses whitespace and removes leading "the".
/// Idempotent; empty input gives an empty key.
pub fn normalize(text: &str) -> String {
    let mut s = text.to_lowercase();

    while BRACKETED_SPAN.is_match(&s) {
        s = BRACKETED_SPAN.replace_all(&s, " ").into_owned();
    }

    let s = PUNCTUATION.replace_all(&s, "");
    let s = DASH_VARIANTS.replace_all(&s, "-");
    let s = WHITESPACE.replace_all(&s, " ");
    let s = LEADING_ARTICLE.replace(s.trim(), "");
    s.trim().to_string()
}

/// Band a similarity score falls into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchStrength {
    Exact,
    Strong,
    Weak,
    None,
}

impl MatchStrength {
    pub fn from_score(score: f64) -> Self {
        if score >= EXACT_MATCH_THRESHOLD {
            Self::Exact
        } else if score >= STRONG_MATCH_THRESHOLD {
            Self::Strong
        } else if score >= WEAK_MATCH_THRESHOLD {
            Self::Weak
        } else {
            Self::None
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Exact => "exact",
            Self::Strong => "strong",
            Self::Weak => "weak",
            Self::None => "none",
        }
    }
}

/// Artist/album resolver over the catalog store.
///
/// Every creation is committed before returning, so later calls in the same
/// pass see it. An optional metadata provider enriches newly created albums.
pub struct EntityMatcher<'a> {
    db: &'a Database,
    metadata: Option<&'a dyn MetadataProvider>,
}

impl<'a> EntityMatcher<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db, metadata: None }
    }

    pub fn with_metadata(db: &'a Database, provider: &'a dyn MetadataProvider) -> Self {
        Self { db, metadata: Some(provider) }
    }

    pub fn match_artist(&self, name: &str, create_if_missing: bool) -> Result<Option<Artist>> {
        let normalized = normalize(name);
        if normalized.is_empty() {
            return Ok(None);
        }

        if let Some(artist) = self.db.find_artist_by_normalized(&normalized)? {
            log::debug!("Exact artist match: '{name}' -> {}", artist.name);
            return Ok(Some(artist));
        }

        let mut best: Option<(Artist, f64)> = None;
        for artist in self.db.list_artists()? {
            let score = similarity(&normalized, &artist.normalized_name);
            if score >= STRONG_MATCH_THRESHOLD && best.as_ref().is_none_or(|(_, b)| score > *b) {
                best = Some((artist, score));
            }
        }

        if let Some((artist, score)) = best {
            log::info!("Fuzzy artist match: '{name}' -> {} (score: {score:.2})", artist.name);
            return Ok(Some(artist));
        }

        if !create_if_missing {
            return Ok(None);
        }

        let artist = self.db.insert_artist(name, &normalized)?;
        log::info!("Created new artist: {}", artist.name);
        Ok(Some(artist))
    }

    pub fn match_album(
        &self,
        title: &str,
        artist_name: &str,
        create_if_missing: bool,
        release_year: Option<i32>,
    ) -> Result<Option<Album>> {
        let normalized = normalize(title);
        if normalized.is_empty() {
            return Ok(None);
        }

        let Some(artist) = self.match_artist(artist_name, create_if_missing)? else {
            return Ok(None);
        };

        if let Some(album) = self.db.find_album_by_normalized(artist.id, &normalized)? {
            log::debug!("Exact album match: '{title}' by {} -> {}", artist.name, album.title);
            return Ok(Some(album));
        }

        let mut best: Option<(Album, f64)> = None;
        for album in self.db.list_albums_by_artist(artist.id)? {
            let mut score = similarity(&normalized, &album.normalized_title);
            if release_year.is_some() && album.release_year == release_year {
                score += YEAR_MATCH_BONUS;
            }
            if score >= STRONG_MATCH_THRESHOLD && best.as_ref().is_none_or(|(_, b)| score > *b) {
                best = Some((album, score));
            }
        }

        if let Some((album, score)) = best {
            log::info!(
                "Fuzzy album match: '{title}' by {} -> {} (score: {score:.2})",
                artist.name,
                album.title
            );
            return Ok(Some(album));
        }

        if !create_if_missing {
            return Ok(None);
        }

        let album = self.db.insert_album(&NewAlbum {
            title: title.to_string(),
            normalized_title: normalized,
            artist_id: artist.id,
            release_year,
        })?;
        log::info!("Created new album: {} by {}", album.title, artist.name);

        self.enrich_new_album(album, &artist).map(Some)
    }

    /// Look up external metadata for a freshly created album.
    fn enrich_new_album(&self, album: Album, artist: &Artist) -> Result<Album> {
        let Some(provider) = self.metadata else {
            return Ok(album);
        };
        let Some(meta) = provider.fetch_album_metadata(&artist.name, &album.title) else {
            log::debug!("No {} metadata for {} by {}", provider.name(), album.title, artist.name);
            return Ok(album);
        };

        self.db.apply_album_metadata(album.id, &meta.to_enrichment())?;
        log::info!(
            "Enriched {} by {} from {} (confidence {:.2})",
            album.title,
            artist.name,
            meta.source(),
            meta.confidence()
        );
        Ok(self.db.get_album(album.id)?.unwrap_or(album))
    }

    /// Resolve a review item through its primary artist and album mention.
    /// The publication year is offered as the release year.
    pub fn match_review_item_to_album(
        &self,
        item: &ReviewItem,
        create_if_missing: bool,
    ) -> Result<Option<Album>> {
        let (Some(artist), Some(album)) = (item.primary_artist(), item.album_mention()) else {
            return Ok(None);
        };
        let release_year = Some(item.published_date.year());
        self.match_album(album, artist, create_if_missing, release_year)
    }

    /// Albums across all artists scored by `0.7 * title + 0.3 * artist`,
    /// keeping those at or above the weak threshold, best first.
    pub fn find_similar(&self, title: &str, artist_name: &str, limit: usize) -> Result<Vec<(Album, f64)>> {
        let normalized_title = normalize(title);
        let normalized_artist = normalize(artist_name);

        let mut matches: Vec<(Album, f64)> = self
            .db
            .list_albums_with_artist_names()?
            .into_iter()
            .filter_map(|(album, artist_norm)| {
                let title_score = similarity(&normalized_title, &album.normalized_title);
                let artist_score = similarity(&normalized_artist, &artist_norm);
                let combined = SIMILAR_TITLE_WEIGHT * title_score + SIMILAR_ARTIST_WEIGHT * artist_score;
                (combined >= WEAK_MATCH_THRESHOLD).then_some((album, combined))
            })
            .collect();

        matches.sort_by(|a, b| b.1.total_cmp(&a.1));
        matches.truncate(limit);
        Ok(matches)
    }
}
