use std::collections::{BTreeSet, HashMap};

use indicatif::{ProgressBar, ProgressStyle};

use crate::db::models::{
    Album, AlbumReviewAggregate, ContentType, NewAggregate, ReviewItem, ScoreDistribution,
};
use crate::db::{Database, Result};
use crate::matcher::EntityMatcher;
use crate::metadata::MetadataProvider;

/// Weight for a source with no explicit weight.
pub const DEFAULT_SOURCE_WEIGHT: f64 = 1.0;

/// Why an album did or did not get an aggregate.
#[derive(Debug)]
pub enum AggregationOutcome {
    Aggregated(AlbumReviewAggregate),
    MissingAlbum,
    MissingArtist,
    /// No review resolves to the album.
    NoReviews,
    /// Reviews resolve to the album but none carries a score.
    NoScoredReviews,
}

impl AggregationOutcome {
    pub fn into_aggregate(self) -> Option<AlbumReviewAggregate> {
        match self {
            Self::Aggregated(agg) => Some(agg),
            _ => None,
        }
    }
}

// --- Statistics ---

pub fn mean(scores: &[f64]) -> f64 {
    if scores.is_empty() {
        return 0.0;
    }
    scores.iter().sum::<f64>() / scores.len() as f64
}

/// Middle value; the mean of the two middle values for even counts.
pub fn median(scores: &[f64]) -> f64 {
    if scores.is_empty() {
        return 0.0;
    }
    let mut sorted = scores.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

/// Sample standard deviation. 0.0 for fewer than two scores.
pub fn sample_stddev(scores: &[f64]) -> f64 {
    if scores.len() < 2 {
        return 0.0;
    }
    let m = mean(scores);
    let variance = scores.iter().map(|s| (s - m).powi(2)).sum::<f64>() / (scores.len() - 1) as f64;
    variance.sqrt()
}

/// Weighted mean of `(score, weight)` pairs. Falls back to the plain mean
/// when the weights sum to zero.
pub fn weighted_average(weighted: &[(f64, f64)]) -> f64 {
    let total_weight: f64 = weighted.iter().map(|(_, w)| w).sum();
    if total_weight <= 0.0 {
        let scores: Vec<f64> = weighted.iter().map(|(s, _)| *s).collect();
        return mean(&scores);
    }
    weighted.iter().map(|(s, w)| s * w).sum::<f64>() / total_weight
}

/// `max(0, 1 - stddev/mean)` to 3 decimals. A single score, or a zero
/// mean, is full agreement.
pub fn consensus_strength(scores: &[f64]) -> f64 {
    if scores.len() <= 1 {
        return 1.0;
    }
    let m = mean(scores);
    if m == 0.0 {
        return 1.0;
    }
    let cv = sample_stddev(scores) / m;
    ((1.0 - cv).max(0.0) * 1000.0).round() / 1000.0
}

/// Spread on the fixed 0-10 scale, capped at 1.
pub fn controversy_score(stddev: f64) -> f64 {
    (stddev / 10.0).min(1.0)
}

/// Derived aggregate fields for `album` from its matched reviews, or
/// `None` when none of them is scored.
///
/// Review and source ids are sorted and deduplicated so recomputation
/// over the same set gives identical rows.
pub fn compute_aggregate(
    album: &Album,
    reviews: &[ReviewItem],
    weights: &HashMap<i64, f64>,
) -> Option<NewAggregate> {
    let scored: Vec<(f64, f64)> = reviews
        .iter()
        .filter_map(|r| {
            let weight = weights.get(&r.source_id).copied().unwrap_or(DEFAULT_SOURCE_WEIGHT);
            r.review_score.map(|s| (s, weight))
        })
        .collect();
    if scored.is_empty() {
        return None;
    }
    let scores: Vec<f64> = scored.iter().map(|(s, _)| *s).collect();

    let stddev = sample_stddev(&scores);
    let first_review_date = reviews.iter().map(|r| r.published_date).min();
    let latest_review_date = reviews.iter().map(|r| r.published_date).max();
    let days_since_release = match (first_review_date, album.release_date) {
        (Some(first), Some(released)) => {
            Some(first.date_naive().signed_duration_since(released).num_days())
        }
        _ => None,
    };

    let source_ids: BTreeSet<i64> = reviews.iter().map(|r| r.source_id).collect();
    let review_ids: BTreeSet<i64> = reviews.iter().map(|r| r.id).collect();

    Some(NewAggregate {
        album_id: album.id,
        review_count: reviews.len() as i64,
        average_score: mean(&scores),
        weighted_average: weighted_average(&scored),
        median_score: median(&scores),
        score_stddev: stddev,
        consensus_strength: consensus_strength(&scores),
        controversy_score: controversy_score(stddev),
        score_distribution: ScoreDistribution::from_scores(&scores),
        source_ids: source_ids.into_iter().collect(),
        review_item_ids: review_ids.into_iter().collect(),
        first_review_date,
        latest_review_date,
        days_since_release,
    })
}

/// Cross-source consensus over the reviews matched to each album.
pub struct ReviewConsensusAggregator<'a> {
    db: &'a Database,
    matcher: EntityMatcher<'a>,
}

impl<'a> ReviewConsensusAggregator<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self {
            db,
            matcher: EntityMatcher::new(db),
        }
    }

    /// Albums created during `aggregate_all_reviews` are enriched through `provider`.
    pub fn with_metadata(db: &'a Database, provider: &'a dyn MetadataProvider) -> Self {
        Self {
            db,
            matcher: EntityMatcher::with_metadata(db, provider),
        }
    }

    pub fn matcher(&self) -> &EntityMatcher<'a> {
        &self.matcher
    }

    /// Recompute and store the aggregate for one album.
    ///
    /// Every review is re-resolved without creating entities; linkage is
    /// never cached.
    pub fn aggregate_album(&self, album_id: i64) -> Result<AggregationOutcome> {
        let Some(album) = self.db.get_album(album_id)? else {
            log::warn!("Album {album_id} not found");
            return Ok(AggregationOutcome::MissingAlbum);
        };
        if self.db.get_artist(album.artist_id)?.is_none() {
            log::warn!("Artist {} not found for album {album_id}", album.artist_id);
            return Ok(AggregationOutcome::MissingArtist);
        }

        let mut reviews = Vec::new();
        for item in self.db.get_review_items_by_type(ContentType::Review)? {
            let matched = self.matcher.match_review_item_to_album(&item, false)?;
            if matched.is_some_and(|a| a.id == album_id) {
                reviews.push(item);
            }
        }

        if reviews.is_empty() {
            log::warn!("No reviews found for album {album_id}");
            self.drop_stale_aggregate(album_id)?;
            return Ok(AggregationOutcome::NoReviews);
        }

        let source_ids: Vec<i64> = reviews.iter().map(|r| r.source_id).collect();
        let weights = self.db.source_weights(&source_ids)?;
        let Some(aggregate) = compute_aggregate(&album, &reviews, &weights) else {
            log::warn!("No scored reviews found for album {album_id}");
            self.drop_stale_aggregate(album_id)?;
            return Ok(AggregationOutcome::NoScoredReviews);
        };

        self.db.upsert_aggregate(&aggregate)?;
        log::info!(
            "Aggregated {} reviews for {}: avg={:.2}, weighted={:.2}, consensus={:.2}",
            aggregate.review_count,
            album.title,
            aggregate.average_score,
            aggregate.weighted_average,
            aggregate.consensus_strength
        );

        Ok(self
            .db
            .get_aggregate_by_album(album_id)?
            .map_or(AggregationOutcome::MissingAlbum, AggregationOutcome::Aggregated))
    }

    // An aggregate left over from an earlier review set must not outlive it
    fn drop_stale_aggregate(&self, album_id: i64) -> Result<()> {
        if self.db.delete_aggregate(album_id)? {
            log::info!("Removed stale aggregate for album {album_id}");
        }
        Ok(())
    }

    /// Aggregate for one album, or `None` for any non-aggregated outcome.
    pub fn aggregate_reviews_for_album(&self, album_id: i64) -> Result<Option<AlbumReviewAggregate>> {
        Ok(self.aggregate_album(album_id)?.into_aggregate())
    }

    /// Resolve every review (creating artists and albums as needed), then
    /// aggregate each album touched. Unresolvable reviews are skipped.
    pub fn aggregate_all_reviews(&self) -> Result<Vec<AlbumReviewAggregate>> {
        let reviews = self.db.get_review_items_by_type(ContentType::Review)?;
        log::info!("Processing {} reviews for aggregation", reviews.len());

        let mut album_ids = BTreeSet::new();
        for review in &reviews {
            match self.matcher.match_review_item_to_album(review, true)? {
                Some(album) => {
                    album_ids.insert(album.id);
                }
                None => log::warn!(
                    "Could not match review to album: {} (missing artist/album data)",
                    review.title
                ),
            }
        }
        log::info!("Matched reviews to {} unique albums", album_ids.len());

        let pb = ProgressBar::new(album_ids.len() as u64);
        pb.set_style(
            ProgressStyle::with_template(
                "{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} ({per_sec}) ({eta}) {msg}",
            )
            .unwrap()
            .progress_chars("#>-"),
        );

        let mut aggregates = Vec::new();
        for album_id in album_ids {
            if let Some(aggregate) = self.aggregate_reviews_for_album(album_id)? {
                aggregates.push(aggregate);
            }
            pb.inc(1);
        }

        pb.finish_with_message(format!("{} aggregates", aggregates.len()));
        log::info!("Created/updated {} album review aggregates", aggregates.len());
        Ok(aggregates)
    }

    pub fn get_top_rated_albums(&self, limit: usize, min_reviews: i64) -> Result<Vec<AlbumReviewAggregate>> {
        self.db.top_rated_aggregates(limit, min_reviews)
    }

    pub fn get_controversial_albums(&self, limit: usize, min_reviews: i64) -> Result<Vec<AlbumReviewAggregate>> {
        self.db.controversial_aggregates(limit, min_reviews)
    }

    /// Most recently reviewed albums first. `days` does not filter.
    pub fn get_recent_aggregates(&self, days: u32, limit: usize) -> Result<Vec<AlbumReviewAggregate>> {
        log::debug!("Recent aggregates requested for a {days}-day window, ordering by recency only");
        self.db.recent_aggregates(limit)
    }
}
