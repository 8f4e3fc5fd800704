use chrono::{DateTime, NaiveDate, Utc};
use std::collections::BTreeMap;

/// Article classification assigned at import time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContentType {
    Review,
    News,
    Premiere,
    Interview,
    BestOf,
    AlbumOfDay,
}

impl ContentType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Review => "review",
            Self::News => "news",
            Self::Premiere => "premiere",
            Self::Interview => "interview",
            Self::BestOf => "best_of",
            Self::AlbumOfDay => "album_of_day",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "review" => Some(Self::Review),
            "news" => Some(Self::News),
            "premiere" => Some(Self::Premiere),
            "interview" => Some(Self::Interview),
            "best_of" | "best-of" => Some(Self::BestOf),
            "album_of_day" | "album-of-day" | "aotd" => Some(Self::AlbumOfDay),
            _ => None,
        }
    }
}

/// How a source is crawled. Only recorded; fetching lives outside this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Rss,
    Html,
    Api,
}

impl SourceKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Rss => "rss",
            Self::Html => "html",
            Self::Api => "api",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "rss" => Some(Self::Rss),
            "html" => Some(Self::Html),
            "api" => Some(Self::Api),
            _ => None,
        }
    }
}

/// Data for registering a source.
#[derive(Debug, Clone)]
pub struct NewSource {
    pub name: String,
    pub url: String,
    pub kind: SourceKind,
    pub weight: f64,
}

/// A source row read from the database.
#[derive(Debug, Clone)]
pub struct Source {
    pub id: i64,
    pub name: String,
    pub url: String,
    pub kind: SourceKind,
    pub weight: f64,
    pub enabled: bool,
    pub health_score: f64,
}

/// Data for inserting or updating a review item (import phase).
#[derive(Debug, Clone)]
pub struct NewReviewItem {
    pub source_id: i64,
    pub url: String,
    pub title: String,
    pub published_date: DateTime<Utc>,
    pub content_type: ContentType,
    pub raw_content: String,
    pub author: Option<String>,
    pub tags: Vec<String>,

    pub artists: Vec<String>,
    pub album: Option<String>,
    pub track: Option<String>,
    pub tracks: Vec<String>,
    pub genres: Vec<String>,

    pub review_score: Option<f64>,
    pub review_score_raw: Option<String>,
    pub score_confidence: Option<f64>,
    pub score_format: Option<String>,
}

/// A review item row read from the database.
#[derive(Debug, Clone)]
pub struct ReviewItem {
    pub id: i64,
    pub source_id: i64,
    pub url: String,
    pub title: String,
    pub published_date: DateTime<Utc>,
    pub content_type: ContentType,
    pub raw_content: String,
    pub author: Option<String>,
    pub tags: Vec<String>,
    pub artists: Vec<String>,
    pub album: Option<String>,
    pub track: Option<String>,
    pub tracks: Vec<String>,
    pub genres: Vec<String>,
    pub review_score: Option<f64>,
    pub review_score_raw: Option<String>,
    pub score_confidence: Option<f64>,
    pub score_format: Option<String>,
}

impl ReviewItem {
    /// First artist mention, the one used for matching.
    pub fn primary_artist(&self) -> Option<&str> {
        self.artists
            .first()
            .map(|a| a.trim())
            .filter(|a| !a.is_empty())
    }

    pub fn album_mention(&self) -> Option<&str> {
        self.album.as_deref().map(str::trim).filter(|a| !a.is_empty())
    }
}

/// Re-derived extraction fields written back by `rescore`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ItemExtraction {
    pub review_score: Option<f64>,
    pub review_score_raw: Option<String>,
    pub score_confidence: Option<f64>,
    pub score_format: Option<String>,
    pub genres: Vec<String>,
    pub track: Option<String>,
    pub tracks: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct Artist {
    pub id: i64,
    pub name: String,
    pub normalized_name: String,
    pub musicbrainz_id: Option<String>,
    pub spotify_id: Option<String>,
    pub genres: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct Album {
    pub id: i64,
    pub title: String,
    pub normalized_title: String,
    pub artist_id: i64,
    pub release_date: Option<NaiveDate>,
    pub release_year: Option<i32>,
    pub musicbrainz_id: Option<String>,
    pub spotify_id: Option<String>,
    pub album_type: Option<String>,
    pub label: Option<String>,
    pub genres: Vec<String>,
    pub cover_art_url: Option<String>,
    pub metadata_source: Option<String>,
    pub metadata_confidence: Option<f64>,
    pub metadata_fetched_at: Option<DateTime<Utc>>,
}

/// Data for creating an album during matching.
#[derive(Debug, Clone)]
pub struct NewAlbum {
    pub title: String,
    pub normalized_title: String,
    pub artist_id: i64,
    pub release_year: Option<i32>,
}

/// External metadata applied to an existing album.
/// `None` fields leave the stored value untouched.
#[derive(Debug, Clone, Default)]
pub struct AlbumEnrichment {
    pub release_date: Option<NaiveDate>,
    pub release_year: Option<i32>,
    pub musicbrainz_id: Option<String>,
    pub spotify_id: Option<String>,
    pub album_type: Option<String>,
    pub label: Option<String>,
    pub genres: Vec<String>,
    pub cover_art_url: Option<String>,
    pub metadata_source: String,
    pub metadata_confidence: f64,
}

/// Six fixed score buckets: [0,3) [3,5) [5,7) [7,8) [8,9) [9,10].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScoreDistribution(pub [u32; 6]);

impl ScoreDistribution {
    pub const LABELS: [&'static str; 6] = ["0-3", "3-5", "5-7", "7-8", "8-9", "9-10"];

    pub fn from_scores(scores: &[f64]) -> Self {
        let mut counts = [0u32; 6];
        for &s in scores {
            counts[Self::bucket_index(s)] += 1;
        }
        Self(counts)
    }

    /// Bucket for a score. Out-of-range values clamp to the end buckets.
    pub fn bucket_index(score: f64) -> usize {
        if score < 3.0 {
            0
        } else if score < 5.0 {
            1
        } else if score < 7.0 {
            2
        } else if score < 8.0 {
            3
        } else if score < 9.0 {
            4
        } else {
            5
        }
    }

    pub fn get(&self, label: &str) -> u32 {
        Self::LABELS
            .iter()
            .position(|l| *l == label)
            .map(|i| self.0[i])
            .unwrap_or(0)
    }

    pub fn total(&self) -> u32 {
        self.0.iter().sum()
    }

    pub fn to_map(&self) -> BTreeMap<String, u32> {
        Self::LABELS
            .iter()
            .zip(self.0.iter())
            .map(|(l, c)| (l.to_string(), *c))
            .collect()
    }

    pub fn from_map(map: &BTreeMap<String, u32>) -> Self {
        let mut counts = [0u32; 6];
        for (i, label) in Self::LABELS.iter().enumerate() {
            counts[i] = map.get(*label).copied().unwrap_or(0);
        }
        Self(counts)
    }
}

/// Derived consensus fields for one album, ready to upsert.
#[derive(Debug, Clone, PartialEq)]
pub struct NewAggregate {
    pub album_id: i64,
    pub review_count: i64,
    pub average_score: f64,
    pub weighted_average: f64,
    pub median_score: f64,
    pub score_stddev: f64,
    pub consensus_strength: f64,
    pub controversy_score: f64,
    pub score_distribution: ScoreDistribution,
    pub source_ids: Vec<i64>,
    pub review_item_ids: Vec<i64>,
    pub first_review_date: Option<DateTime<Utc>>,
    pub latest_review_date: Option<DateTime<Utc>>,
    pub days_since_release: Option<i64>,
}

/// An aggregate row read from the database.
#[derive(Debug, Clone, PartialEq)]
pub struct AlbumReviewAggregate {
    pub id: i64,
    pub album_id: i64,
    pub review_count: i64,
    pub average_score: f64,
    pub weighted_average: f64,
    pub median_score: f64,
    pub score_stddev: f64,
    pub consensus_strength: f64,
    pub controversy_score: f64,
    pub score_distribution: ScoreDistribution,
    pub source_ids: Vec<i64>,
    pub review_item_ids: Vec<i64>,
    pub first_review_date: Option<DateTime<Utc>>,
    pub latest_review_date: Option<DateTime<Utc>>,
    pub days_since_release: Option<i64>,
}

/// Catalog-wide counts for the stats command.
#[derive(Debug)]
pub struct CatalogStats {
    pub total_sources: i64,
    pub total_items: i64,
    pub total_reviews: i64,
    pub scored_reviews: i64,
    pub total_artists: i64,
    pub total_albums: i64,
    pub albums_with_metadata: i64,
    pub total_aggregates: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_type_round_trip_names() {
        for ct in [
            ContentType::Review,
            ContentType::News,
            ContentType::Premiere,
            ContentType::Interview,
            ContentType::BestOf,
            ContentType::AlbumOfDay,
        ] {
            assert_eq!(ContentType::parse(ct.as_str()), Some(ct));
        }
        assert_eq!(ContentType::parse("podcast"), None);
    }

    #[test]
    fn test_bucket_boundaries() {
        assert_eq!(ScoreDistribution::bucket_index(0.0), 0);
        assert_eq!(ScoreDistribution::bucket_index(2.99), 0);
        assert_eq!(ScoreDistribution::bucket_index(3.0), 1);
        assert_eq!(ScoreDistribution::bucket_index(5.0), 2);
        assert_eq!(ScoreDistribution::bucket_index(7.0), 3);
        assert_eq!(ScoreDistribution::bucket_index(8.0), 4);
        assert_eq!(ScoreDistribution::bucket_index(9.0), 5);
        assert_eq!(ScoreDistribution::bucket_index(10.0), 5);
    }

    #[test]
    fn test_distribution_five_scores() {
        let dist = ScoreDistribution::from_scores(&[5.0, 6.5, 7.5, 8.5, 9.2]);
        assert_eq!(dist.get("0-3"), 0);
        assert_eq!(dist.get("3-5"), 0);
        assert_eq!(dist.get("5-7"), 2);
        assert_eq!(dist.get("7-8"), 1);
        assert_eq!(dist.get("8-9"), 1);
        assert_eq!(dist.get("9-10"), 1);
        assert_eq!(dist.total(), 5);
    }

    #[test]
    fn test_distribution_map_keeps_all_buckets() {
        let dist = ScoreDistribution::from_scores(&[9.5]);
        let map = dist.to_map();
        assert_eq!(map.len(), 6);
        assert_eq!(ScoreDistribution::from_map(&map), dist);
    }
}
