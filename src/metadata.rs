//! External album metadata: MusicBrainz, Spotify and a cascade over both.
//!
//! Providers are passed in explicitly (see [`crate::matcher::EntityMatcher::with_metadata`]).
//! Network and parse failures are logged and surface as `None`.

use std::cell::RefCell;
use std::collections::HashMap;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use chrono::NaiveDate;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Deserialize;
use serde::de::DeserializeOwned;

use crate::config::MetadataConfig;
use crate::db::Database;
use crate::db::models::AlbumEnrichment;

const SPOTIFY_TOKEN_URL: &str = "https://accounts.spotify.com/api/token";
const SPOTIFY_API: &str = "https://api.spotify.com/v1";

/// Capability to look up album metadata by artist and album name.
pub trait MetadataProvider {
    fn name(&self) -> &'static str;

    /// `None` when nothing was found or the lookup failed.
    fn fetch_album_metadata(&self, artist: &str, album: &str) -> Option<AlbumMetadata>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct SpotifyAlbum {
    pub spotify_album_id: String,
    pub spotify_artist_id: Option<String>,
    pub title: String,
    pub artist: String,
    pub release_date: Option<String>,
    /// album, single or compilation
    pub album_type: Option<String>,
    pub label: Option<String>,
    pub genres: Vec<String>,
    pub cover_art_url: Option<String>,
    pub total_tracks: Option<u32>,
    pub popularity: Option<u32>,
    pub artist_popularity: Option<u32>,
    pub artist_followers: Option<u64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MusicBrainzRelease {
    pub musicbrainz_id: String,
    pub title: String,
    pub artist: String,
    pub release_date: Option<String>,
    pub genres: Vec<String>,
    pub cover_art_url: Option<String>,
}

/// Album metadata tagged by where it came from.
#[derive(Debug, Clone, PartialEq)]
pub enum AlbumMetadata {
    Spotify(SpotifyAlbum),
    MusicBrainz(MusicBrainzRelease),
}

impl AlbumMetadata {
    pub fn source(&self) -> &'static str {
        match self {
            Self::Spotify(_) => "spotify",
            Self::MusicBrainz(_) => "musicbrainz",
        }
    }

    pub fn confidence(&self) -> f64 {
        match self {
            Self::Spotify(_) => 0.95,
            Self::MusicBrainz(_) => 0.80,
        }
    }

    pub fn title(&self) -> &str {
        match self {
            Self::Spotify(a) => &a.title,
            Self::MusicBrainz(r) => &r.title,
        }
    }

    pub fn artist(&self) -> &str {
        match self {
            Self::Spotify(a) => &a.artist,
            Self::MusicBrainz(r) => &r.artist,
        }
    }

    pub fn genres(&self) -> &[String] {
        match self {
            Self::Spotify(a) => &a.genres,
            Self::MusicBrainz(r) => &r.genres,
        }
    }

    fn raw_release_date(&self) -> Option<&str> {
        match self {
            Self::Spotify(a) => a.release_date.as_deref(),
            Self::MusicBrainz(r) => r.release_date.as_deref(),
        }
    }

    /// Full `YYYY-MM-DD` release date. Year-only or year-month dates give `None`.
    pub fn release_date(&self) -> Option<NaiveDate> {
        NaiveDate::parse_from_str(self.raw_release_date()?, "%Y-%m-%d").ok()
    }

    /// Leading year of the release date, at any precision.
    pub fn release_year(&self) -> Option<i32> {
        let raw = self.raw_release_date()?;
        raw.get(..4)?.parse().ok()
    }

    /// Names present plus genres or an external id.
    pub fn is_sufficient(&self) -> bool {
        if self.artist().trim().is_empty() || self.title().trim().is_empty() {
            return false;
        }
        let has_id = match self {
            Self::Spotify(a) => !a.spotify_album_id.is_empty(),
            Self::MusicBrainz(r) => !r.musicbrainz_id.is_empty(),
        };
        has_id || !self.genres().is_empty()
    }

    /// Column updates for the albums table.
    pub fn to_enrichment(&self) -> AlbumEnrichment {
        let mut e = AlbumEnrichment {
            release_date: self.release_date(),
            release_year: self.release_year(),
            genres: self.genres().to_vec(),
            metadata_source: self.source().to_string(),
            metadata_confidence: self.confidence(),
            ..Default::default()
        };
        match self {
            Self::Spotify(a) => {
                e.spotify_id = Some(a.spotify_album_id.clone());
                e.album_type = a.album_type.clone();
                e.label = a.label.clone();
                e.cover_art_url = a.cover_art_url.clone();
            }
            Self::MusicBrainz(r) => {
                e.musicbrainz_id = Some(r.musicbrainz_id.clone());
                e.cover_art_url = r.cover_art_url.clone();
            }
        }
        e
    }
}

// --- MusicBrainz ---

#[derive(Debug, Deserialize)]
struct MbSearchResponse {
    #[serde(default)]
    releases: Vec<MbRelease>,
}

#[derive(Debug, Deserialize)]
struct MbRelease {
    id: String,
    title: String,
    date: Option<String>,
    #[serde(rename = "artist-credit", default)]
    artist_credit: Vec<MbArtistCredit>,
}

#[derive(Debug, Deserialize)]
struct MbArtistCredit {
    artist: MbArtist,
}

#[derive(Debug, Deserialize)]
struct MbArtist {
    id: String,
    name: String,
}

#[derive(Debug, Deserialize)]
struct MbTagged {
    #[serde(default)]
    tags: Vec<MbTag>,
}

#[derive(Debug, Deserialize)]
struct MbTag {
    name: String,
    #[serde(default)]
    count: i64,
}

#[derive(Debug, Deserialize)]
struct CoverArtResponse {
    #[serde(default)]
    images: Vec<CoverArtImage>,
}

#[derive(Debug, Deserialize)]
struct CoverArtImage {
    #[serde(default)]
    front: bool,
    image: Option<String>,
    #[serde(default)]
    thumbnails: CoverArtThumbnails,
}

#[derive(Debug, Deserialize, Default)]
struct CoverArtThumbnails {
    small: Option<String>,
}

/// Five most-counted tags with a positive count.
fn top_tags(mut tags: Vec<MbTag>) -> Vec<String> {
    tags.sort_by(|a, b| b.count.cmp(&a.count));
    tags.into_iter()
        .take(5)
        .filter(|t| t.count > 0)
        .map(|t| t.name)
        .collect()
}

/// Front cover thumbnail, else the first image.
fn pick_cover(images: &[CoverArtImage]) -> Option<String> {
    let image = images.iter().find(|i| i.front).or_else(|| images.first())?;
    image.thumbnails.small.clone().or_else(|| image.image.clone())
}

pub struct MusicBrainzProvider {
    base_url: String,
    cover_art_url: String,
    user_agent: String,
    rate_limit: Duration,
}

impl MusicBrainzProvider {
    pub fn new(config: &MetadataConfig) -> Self {
        Self {
            base_url: config.musicbrainz_url.trim_end_matches('/').to_string(),
            cover_art_url: config.cover_art_url.trim_end_matches('/').to_string(),
            user_agent: config.user_agent.clone(),
            rate_limit: Duration::from_millis(config.rate_limit_ms),
        }
    }

    fn get_json<T: DeserializeOwned>(&self, url: &str, query: &[(&str, &str)]) -> Result<T> {
        thread::sleep(self.rate_limit);
        log::debug!("Fetching {url}");

        let mut request = ureq::get(url).header("User-Agent", self.user_agent.as_str());
        for (key, value) in query {
            request = request.query(*key, *value);
        }
        let body: T = request
            .call()
            .with_context(|| format!("HTTP request failed for {url}"))?
            .body_mut()
            .read_json()
            .with_context(|| format!("Failed to parse JSON from {url}"))?;
        Ok(body)
    }

    fn search_release(&self, artist: &str, album: &str) -> Result<Option<MusicBrainzRelease>> {
        let query = format!("artist:\"{artist}\" AND release:\"{album}\"");
        let url = format!("{}/release", self.base_url);
        let response: MbSearchResponse =
            self.get_json(&url, &[("query", query.as_str()), ("fmt", "json"), ("limit", "1")])?;

        let Some(release) = response.releases.into_iter().next() else {
            log::info!("No MusicBrainz results for {artist} - {album}");
            return Ok(None);
        };

        let credit = release.artist_credit.into_iter().next();
        let mut genres = self.fetch_tags("release", &release.id).unwrap_or_else(|e| {
            log::debug!("Release genres unavailable for {}: {e:#}", release.id);
            Vec::new()
        });
        if genres.is_empty() {
            if let Some(c) = &credit {
                genres = self.fetch_tags("artist", &c.artist.id).unwrap_or_else(|e| {
                    log::debug!("Artist genres unavailable for {}: {e:#}", c.artist.id);
                    Vec::new()
                });
            }
        }
        let cover_art_url = self.fetch_cover_art(&release.id).unwrap_or_else(|e| {
            log::debug!("No cover art for release {}: {e:#}", release.id);
            None
        });

        Ok(Some(MusicBrainzRelease {
            musicbrainz_id: release.id,
            title: release.title,
            artist: credit.map(|c| c.artist.name).unwrap_or_default(),
            release_date: release.date.filter(|d| !d.is_empty()),
            genres,
            cover_art_url,
        }))
    }

    /// Tags of a release or artist entity.
    fn fetch_tags(&self, entity: &str, id: &str) -> Result<Vec<String>> {
        let url = format!("{}/{entity}/{id}", self.base_url);
        let tagged: MbTagged = self.get_json(&url, &[("inc", "tags"), ("fmt", "json")])?;
        Ok(top_tags(tagged.tags))
    }

    fn fetch_cover_art(&self, release_id: &str) -> Result<Option<String>> {
        let url = format!("{}/release/{release_id}", self.cover_art_url);
        let response: CoverArtResponse = self.get_json(&url, &[])?;
        Ok(pick_cover(&response.images))
    }
}

impl MetadataProvider for MusicBrainzProvider {
    fn name(&self) -> &'static str {
        "musicbrainz"
    }

    fn fetch_album_metadata(&self, artist: &str, album: &str) -> Option<AlbumMetadata> {
        match self.search_release(artist, album) {
            Ok(release) => release.map(AlbumMetadata::MusicBrainz),
            Err(e) => {
                log::warn!("MusicBrainz lookup failed for {artist} - {album}: {e:#}");
                None
            }
        }
    }
}

// --- Spotify ---

#[derive(Debug, Deserialize)]
struct SpotifyToken {
    access_token: String,
    expires_in: u64,
}

#[derive(Debug, Deserialize)]
struct SpotifySearchResponse {
    albums: SpotifyPage,
}

#[derive(Debug, Deserialize)]
struct SpotifyPage {
    #[serde(default)]
    items: Vec<SpotifyAlbumItem>,
}

#[derive(Debug, Deserialize)]
struct SpotifyAlbumItem {
    id: String,
    name: String,
    #[serde(default)]
    artists: Vec<SpotifyArtistRef>,
    release_date: Option<String>,
    album_type: Option<String>,
    #[serde(default)]
    images: Vec<SpotifyImage>,
    total_tracks: Option<u32>,
    label: Option<String>,
    popularity: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct SpotifyArtistRef {
    id: String,
    name: String,
}

#[derive(Debug, Deserialize)]
struct SpotifyImage {
    url: String,
}

#[derive(Debug, Deserialize)]
struct SpotifyArtist {
    #[serde(default)]
    genres: Vec<String>,
    popularity: Option<u32>,
    followers: Option<SpotifyFollowers>,
}

#[derive(Debug, Deserialize)]
struct SpotifyFollowers {
    total: u64,
}

impl SpotifyAlbumItem {
    fn into_album(self) -> SpotifyAlbum {
        let artist = self.artists.into_iter().next();
        SpotifyAlbum {
            spotify_album_id: self.id,
            spotify_artist_id: artist.as_ref().map(|a| a.id.clone()),
            title: self.name,
            artist: artist.map(|a| a.name).unwrap_or_default(),
            release_date: self.release_date,
            album_type: self.album_type,
            label: self.label,
            genres: Vec::new(),
            cover_art_url: self.images.into_iter().next().map(|i| i.url),
            total_tracks: self.total_tracks,
            popularity: self.popularity,
            artist_popularity: None,
            artist_followers: None,
        }
    }
}

/// Spotify Web API lookups with the client-credentials flow.
pub struct SpotifyProvider {
    client_id: String,
    client_secret: String,
    /// Access token and the instant it stops being used.
    token: RefCell<Option<(String, Instant)>>,
}

impl SpotifyProvider {
    pub fn new(client_id: &str, client_secret: &str) -> Self {
        Self {
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
            token: RefCell::new(None),
        }
    }

    fn access_token(&self) -> Result<String> {
        if let Some((token, expires)) = self.token.borrow().as_ref() {
            if Instant::now() < *expires {
                return Ok(token.clone());
            }
        }

        log::info!("Requesting new Spotify access token");
        let token: SpotifyToken = ureq::post(SPOTIFY_TOKEN_URL)
            .send_form([
                ("grant_type", "client_credentials"),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
            ])
            .context("Spotify token request failed")?
            .body_mut()
            .read_json()
            .context("Failed to parse Spotify token response")?;

        // Refresh a minute early
        let ttl = Duration::from_secs(token.expires_in.saturating_sub(60));
        *self.token.borrow_mut() = Some((token.access_token.clone(), Instant::now() + ttl));
        Ok(token.access_token)
    }

    fn get_json<T: DeserializeOwned>(&self, url: &str, query: &[(&str, &str)]) -> Result<T> {
        let token = self.access_token()?;
        log::debug!("Fetching {url}");

        let mut request = ureq::get(url).header("Authorization", format!("Bearer {token}"));
        for (key, value) in query {
            request = request.query(*key, *value);
        }
        let body: T = request
            .call()
            .with_context(|| format!("HTTP request failed for {url}"))?
            .body_mut()
            .read_json()
            .with_context(|| format!("Failed to parse JSON from {url}"))?;
        Ok(body)
    }

    fn search_album(&self, artist: &str, album: &str) -> Result<Option<SpotifyAlbum>> {
        let q = format!("artist:{artist} album:{album}");
        let url = format!("{SPOTIFY_API}/search");
        let response: SpotifySearchResponse =
            self.get_json(&url, &[("q", q.as_str()), ("type", "album"), ("limit", "1")])?;

        let Some(item) = response.albums.items.into_iter().next() else {
            log::info!("No Spotify results for {artist} - {album}");
            return Ok(None);
        };
        let mut found = item.into_album();

        // Genres live on the artist, not the album
        if let Some(artist_id) = &found.spotify_artist_id {
            match self.get_json::<SpotifyArtist>(&format!("{SPOTIFY_API}/artists/{artist_id}"), &[]) {
                Ok(a) => {
                    found.genres = a.genres;
                    found.artist_popularity = a.popularity;
                    found.artist_followers = a.followers.map(|f| f.total);
                }
                Err(e) => log::debug!("Spotify artist lookup failed for {artist_id}: {e:#}"),
            }
        }

        Ok(Some(found))
    }
}

impl MetadataProvider for SpotifyProvider {
    fn name(&self) -> &'static str {
        "spotify"
    }

    fn fetch_album_metadata(&self, artist: &str, album: &str) -> Option<AlbumMetadata> {
        match self.search_album(artist, album) {
            Ok(found) => found.map(AlbumMetadata::Spotify),
            Err(e) => {
                log::warn!("Spotify lookup failed for {artist} - {album}: {e:#}");
                None
            }
        }
    }
}

// --- Cascade ---

/// Tries each provider in order and remembers successful answers.
///
/// The first answer with sufficient data wins; otherwise the last provider's
/// answer is returned as-is.
pub struct CascadingProvider {
    providers: Vec<Box<dyn MetadataProvider>>,
    cache: RefCell<HashMap<String, AlbumMetadata>>,
}

impl CascadingProvider {
    pub fn new(providers: Vec<Box<dyn MetadataProvider>>) -> Self {
        Self {
            providers,
            cache: RefCell::new(HashMap::new()),
        }
    }

    /// Spotify first when credentials exist, then MusicBrainz.
    pub fn from_config(config: &MetadataConfig) -> Self {
        let mut providers: Vec<Box<dyn MetadataProvider>> = Vec::new();
        if let Some((id, secret)) = config.spotify_credentials() {
            providers.push(Box::new(SpotifyProvider::new(id, secret)));
        }
        providers.push(Box::new(MusicBrainzProvider::new(config)));
        Self::new(providers)
    }

    fn cache_key(artist: &str, album: &str) -> String {
        format!("{}::{}", artist.to_lowercase(), album.to_lowercase())
    }
}

impl MetadataProvider for CascadingProvider {
    fn name(&self) -> &'static str {
        "cascade"
    }

    fn fetch_album_metadata(&self, artist: &str, album: &str) -> Option<AlbumMetadata> {
        let key = Self::cache_key(artist, album);
        if let Some(hit) = self.cache.borrow().get(&key) {
            log::debug!("Cache hit for {artist} - {album}");
            return Some(hit.clone());
        }

        let mut last = None;
        for provider in &self.providers {
            let found = provider.fetch_album_metadata(artist, album);
            if found.as_ref().is_some_and(AlbumMetadata::is_sufficient) {
                last = found;
                break;
            }
            log::info!("{} had nothing usable for {artist} - {album}", provider.name());
            last = found;
        }

        match last {
            Some(meta) => {
                self.cache.borrow_mut().insert(key, meta.clone());
                Some(meta)
            }
            None => {
                log::warn!("All metadata sources failed for {artist} - {album}");
                None
            }
        }
    }
}

#[derive(Debug, Default)]
pub struct EnrichResult {
    pub checked: u64,
    pub enriched: u64,
    pub not_found: u64,
}

/// Fill external metadata for up to `limit` albums that have none.
/// With `dry_run`, report what was found without writing it.
pub fn enrich_albums(
    db: &Database,
    provider: &dyn MetadataProvider,
    limit: usize,
    dry_run: bool,
) -> crate::db::Result<EnrichResult> {
    let albums = db.albums_missing_metadata(limit)?;
    let pb = ProgressBar::new(albums.len() as u64);
    pb.set_style(
        ProgressStyle::with_template(
            "{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} ({per_sec}) ({eta}) {msg}",
        )
        .unwrap()
        .progress_chars("#>-"),
    );

    let mut result = EnrichResult::default();
    for (album, artist) in &albums {
        result.checked += 1;
        pb.set_message(format!("{artist} - {}", album.title));

        match provider.fetch_album_metadata(artist, &album.title) {
            Some(meta) => {
                if dry_run {
                    pb.println(format!(
                        "  {artist} - {}: {} ({} genres, released {})",
                        album.title,
                        meta.source(),
                        meta.genres().len(),
                        meta.release_date()
                            .map_or_else(|| "?".to_string(), |d| d.to_string())
                    ));
                } else {
                    db.apply_album_metadata(album.id, &meta.to_enrichment())?;
                }
                result.enriched += 1;
            }
            None => {
                log::info!("No metadata for {artist} - {}", album.title);
                result.not_found += 1;
            }
        }
        pb.inc(1);
    }

    pb.finish_with_message(format!(
        "Done: {} enriched, {} not found",
        result.enriched, result.not_found
    ));
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn mb_release(genres: Vec<&str>) -> MusicBrainzRelease {
        MusicBrainzRelease {
            musicbrainz_id: "a1b2".to_string(),
            title: "Closure/Continuation".to_string(),
            artist: "Porcupine Tree".to_string(),
            release_date: Some("2022-06-24".to_string()),
            genres: genres.into_iter().map(String::from).collect(),
            cover_art_url: None,
        }
    }

    #[test]
    fn test_mb_search_deserialize() {
        let json = r#"{
            "releases": [{
                "id": "mbid-1",
                "title": "In Absentia",
                "date": "2002-09-24",
                "artist-credit": [{"name": "Porcupine Tree", "artist": {"id": "art-1", "name": "Porcupine Tree"}}]
            }]
        }"#;
        let r: MbSearchResponse = serde_json::from_str(json).unwrap();
        assert_eq!(r.releases.len(), 1);
        assert_eq!(r.releases[0].artist_credit[0].artist.name, "Porcupine Tree");
        assert_eq!(r.releases[0].date.as_deref(), Some("2002-09-24"));
    }

    #[test]
    fn test_mb_search_empty() {
        let r: MbSearchResponse = serde_json::from_str(r#"{"count": 0}"#).unwrap();
        assert!(r.releases.is_empty());
    }

    #[test]
    fn test_top_tags_sorted_limited_positive() {
        let json = r#"{"tags": [
            {"name": "rock", "count": 3},
            {"name": "progressive rock", "count": 9},
            {"name": "art rock", "count": 4},
            {"name": "zero", "count": 0},
            {"name": "british", "count": 1},
            {"name": "psychedelic", "count": 2},
            {"name": "dropped", "count": 1}
        ]}"#;
        let tagged: MbTagged = serde_json::from_str(json).unwrap();
        assert_eq!(
            top_tags(tagged.tags),
            vec!["progressive rock", "art rock", "rock", "psychedelic", "british"]
        );
    }

    #[test]
    fn test_cover_prefers_front_thumbnail() {
        let json = r#"{"images": [
            {"front": false, "image": "http://img/back.jpg", "thumbnails": {"small": "http://img/back-250.jpg"}},
            {"front": true, "image": "http://img/front.jpg", "thumbnails": {"small": "http://img/front-250.jpg"}}
        ]}"#;
        let r: CoverArtResponse = serde_json::from_str(json).unwrap();
        assert_eq!(pick_cover(&r.images).as_deref(), Some("http://img/front-250.jpg"));

        let json = r#"{"images": [{"image": "http://img/only.jpg"}]}"#;
        let r: CoverArtResponse = serde_json::from_str(json).unwrap();
        assert_eq!(pick_cover(&r.images).as_deref(), Some("http://img/only.jpg"));

        let r: CoverArtResponse = serde_json::from_str(r#"{"images": []}"#).unwrap();
        assert!(pick_cover(&r.images).is_none());
    }

    #[test]
    fn test_spotify_search_deserialize() {
        let json = r#"{"albums": {"items": [{
            "id": "sp-1",
            "name": "Fear Inoculum",
            "artists": [{"id": "sp-art", "name": "Tool"}],
            "release_date": "2019-08-30",
            "album_type": "album",
            "images": [{"url": "http://img/640.jpg", "height": 640, "width": 640}],
            "total_tracks": 7
        }]}}"#;
        let r: SpotifySearchResponse = serde_json::from_str(json).unwrap();
        let album = r.albums.items.into_iter().next().unwrap().into_album();
        assert_eq!(album.artist, "Tool");
        assert_eq!(album.spotify_artist_id.as_deref(), Some("sp-art"));
        assert_eq!(album.cover_art_url.as_deref(), Some("http://img/640.jpg"));
        assert_eq!(album.total_tracks, Some(7));
        assert!(album.genres.is_empty());
    }

    #[test]
    fn test_release_date_precision() {
        let mut r = mb_release(vec![]);
        let full = AlbumMetadata::MusicBrainz(r.clone());
        assert_eq!(full.release_date(), NaiveDate::from_ymd_opt(2022, 6, 24));
        assert_eq!(full.release_year(), Some(2022));

        r.release_date = Some("1999".to_string());
        let year_only = AlbumMetadata::MusicBrainz(r);
        assert_eq!(year_only.release_date(), None);
        assert_eq!(year_only.release_year(), Some(1999));
    }

    #[test]
    fn test_sufficiency() {
        assert!(AlbumMetadata::MusicBrainz(mb_release(vec![])).is_sufficient());
        let mut no_id = mb_release(vec![]);
        no_id.musicbrainz_id.clear();
        assert!(!AlbumMetadata::MusicBrainz(no_id.clone()).is_sufficient());
        no_id.genres = vec!["prog".to_string()];
        assert!(AlbumMetadata::MusicBrainz(no_id.clone()).is_sufficient());
        no_id.artist.clear();
        assert!(!AlbumMetadata::MusicBrainz(no_id).is_sufficient());
    }

    #[test]
    fn test_enrichment_fields_by_source() {
        let e = AlbumMetadata::MusicBrainz(mb_release(vec!["art rock"])).to_enrichment();
        assert_eq!(e.metadata_source, "musicbrainz");
        assert!((e.metadata_confidence - 0.80).abs() < 1e-10);
        assert_eq!(e.musicbrainz_id.as_deref(), Some("a1b2"));
        assert!(e.spotify_id.is_none());
    }

    /// Returns a fixed answer and counts calls.
    struct Canned {
        answer: Option<AlbumMetadata>,
        calls: Cell<usize>,
    }

    impl MetadataProvider for &Canned {
        fn name(&self) -> &'static str {
            "canned"
        }

        fn fetch_album_metadata(&self, _artist: &str, _album: &str) -> Option<AlbumMetadata> {
            self.calls.set(self.calls.get() + 1);
            self.answer.clone()
        }
    }

    fn leak(c: Canned) -> &'static Canned {
        Box::leak(Box::new(c))
    }

    #[test]
    fn test_cascade_falls_through_and_caches() {
        let mut thin = mb_release(vec![]);
        thin.musicbrainz_id.clear();
        let first = leak(Canned {
            answer: Some(AlbumMetadata::MusicBrainz(thin)),
            calls: Cell::new(0),
        });
        let second = leak(Canned {
            answer: Some(AlbumMetadata::MusicBrainz(mb_release(vec!["art rock"]))),
            calls: Cell::new(0),
        });
        let cascade = CascadingProvider::new(vec![Box::new(first), Box::new(second)]);

        let got = cascade.fetch_album_metadata("Porcupine Tree", "Closure/Continuation").unwrap();
        assert_eq!(got.genres(), ["art rock".to_string()]);
        let again = cascade.fetch_album_metadata("PORCUPINE TREE", "closure/continuation").unwrap();
        assert_eq!(again, got);
        assert_eq!(first.calls.get(), 1);
        assert_eq!(second.calls.get(), 1);
    }

    #[test]
    fn test_cascade_stops_at_first_sufficient() {
        let first = leak(Canned {
            answer: Some(AlbumMetadata::MusicBrainz(mb_release(vec![]))),
            calls: Cell::new(0),
        });
        let second = leak(Canned { answer: None, calls: Cell::new(0) });
        let cascade = CascadingProvider::new(vec![Box::new(first), Box::new(second)]);
        assert!(cascade.fetch_album_metadata("a", "b").is_some());
        assert_eq!(second.calls.get(), 0);
    }

    #[test]
    fn test_cascade_none_not_cached() {
        let only = leak(Canned { answer: None, calls: Cell::new(0) });
        let cascade = CascadingProvider::new(vec![Box::new(only)]);
        assert!(cascade.fetch_album_metadata("a", "b").is_none());
        assert!(cascade.fetch_album_metadata("a", "b").is_none());
        assert_eq!(only.calls.get(), 2);
    }

    #[test]
    fn test_enrich_albums_fills_missing_only() {
        let db = Database::open_in_memory().unwrap();
        let artist = db.insert_artist("Porcupine Tree", "porcupine tree").unwrap();
        for title in ["Closure/Continuation", "In Absentia"] {
            db.insert_album(&crate::db::models::NewAlbum {
                title: title.to_string(),
                normalized_title: title.to_lowercase(),
                artist_id: artist.id,
                release_year: None,
            })
            .unwrap();
        }
        let provider = leak(Canned {
            answer: Some(AlbumMetadata::MusicBrainz(mb_release(vec!["art rock"]))),
            calls: Cell::new(0),
        });

        let dry = enrich_albums(&db, &provider, 10, true).unwrap();
        assert_eq!(dry.enriched, 2);
        assert_eq!(db.albums_missing_metadata(10).unwrap().len(), 2);

        let limited = enrich_albums(&db, &provider, 1, false).unwrap();
        assert_eq!(limited.checked, 1);
        assert_eq!(db.albums_missing_metadata(10).unwrap().len(), 1);

        let rest = enrich_albums(&db, &provider, 10, false).unwrap();
        assert_eq!(rest.enriched, 1);
        assert!(db.albums_missing_metadata(10).unwrap().is_empty());
        assert_eq!(provider.calls.get(), 4);
    }

    #[test]
    fn test_enrich_albums_counts_misses() {
        let db = Database::open_in_memory().unwrap();
        let artist = db.insert_artist("Camel", "camel").unwrap();
        db.insert_album(&crate::db::models::NewAlbum {
            title: "Moonmadness".to_string(),
            normalized_title: "moonmadness".to_string(),
            artist_id: artist.id,
            release_year: Some(1976),
        })
        .unwrap();
        let provider = leak(Canned { answer: None, calls: Cell::new(0) });
        let result = enrich_albums(&db, &provider, 10, false).unwrap();
        assert_eq!(result.not_found, 1);
        assert_eq!(result.enriched, 0);
    }
}
