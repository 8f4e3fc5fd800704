use super::models::{
    Album, AlbumEnrichment, AlbumReviewAggregate, Artist, CatalogStats, ContentType,
    ItemExtraction, NewAggregate, NewAlbum, NewReviewItem, NewSource, ReviewItem,
    ScoreDistribution, Source, SourceKind,
};
use super::{Database, Result};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSqlOutput, ValueRef};
use rusqlite::{params, Connection, OptionalExtension, Row, ToSql};
use serde::de::DeserializeOwned;
use std::collections::{BTreeMap, HashMap};

impl ToSql for ContentType {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for ContentType {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()
            .and_then(|s| Self::parse(s).ok_or(FromSqlError::InvalidType))
    }
}

impl ToSql for SourceKind {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for SourceKind {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()
            .and_then(|s| Self::parse(s).ok_or(FromSqlError::InvalidType))
    }
}

/// Decode a JSON text column inside a row mapper.
fn json_column<T: DeserializeOwned>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T> {
    let text: String = row.get(idx)?;
    serde_json::from_str(&text).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

const SOURCE_COLUMNS: &str = "id, name, url, kind, weight, enabled, health_score";

fn source_from_row(row: &Row<'_>) -> rusqlite::Result<Source> {
    Ok(Source {
        id: row.get(0)?,
        name: row.get(1)?,
        url: row.get(2)?,
        kind: row.get(3)?,
        weight: row.get(4)?,
        enabled: row.get(5)?,
        health_score: row.get(6)?,
    })
}

const ITEM_COLUMNS: &str = "id, source_id, url, title, published_date, content_type,
    raw_content, author, tags, artists, album, track, tracks, genres,
    review_score, review_score_raw, score_confidence, score_format";

fn item_from_row(row: &Row<'_>) -> rusqlite::Result<ReviewItem> {
    Ok(ReviewItem {
        id: row.get(0)?,
        source_id: row.get(1)?,
        url: row.get(2)?,
        title: row.get(3)?,
        published_date: row.get(4)?,
        content_type: row.get(5)?,
        raw_content: row.get(6)?,
        author: row.get(7)?,
        tags: json_column(row, 8)?,
        artists: json_column(row, 9)?,
        album: row.get(10)?,
        track: row.get(11)?,
        tracks: json_column(row, 12)?,
        genres: json_column(row, 13)?,
        review_score: row.get(14)?,
        review_score_raw: row.get(15)?,
        score_confidence: row.get(16)?,
        score_format: row.get(17)?,
    })
}

const ARTIST_COLUMNS: &str = "id, name, normalized_name, musicbrainz_id, spotify_id, genres";

fn artist_from_row(row: &Row<'_>) -> rusqlite::Result<Artist> {
    Ok(Artist {
        id: row.get(0)?,
        name: row.get(1)?,
        normalized_name: row.get(2)?,
        musicbrainz_id: row.get(3)?,
        spotify_id: row.get(4)?,
        genres: json_column(row, 5)?,
    })
}

const ALBUM_COLUMNS: &str = "al.id, al.title, al.normalized_title, al.artist_id,
    al.release_date, al.release_year, al.musicbrainz_id, al.spotify_id,
    al.album_type, al.label, al.genres, al.cover_art_url,
    al.metadata_source, al.metadata_confidence, al.metadata_fetched_at";

fn album_from_row(row: &Row<'_>) -> rusqlite::Result<Album> {
    Ok(Album {
        id: row.get(0)?,
        title: row.get(1)?,
        normalized_title: row.get(2)?,
        artist_id: row.get(3)?,
        release_date: row.get(4)?,
        release_year: row.get(5)?,
        musicbrainz_id: row.get(6)?,
        spotify_id: row.get(7)?,
        album_type: row.get(8)?,
        label: row.get(9)?,
        genres: json_column(row, 10)?,
        cover_art_url: row.get(11)?,
        metadata_source: row.get(12)?,
        metadata_confidence: row.get(13)?,
        metadata_fetched_at: row.get(14)?,
    })
}

const AGGREGATE_COLUMNS: &str = "id, album_id, review_count, average_score, weighted_average,
    median_score, score_stddev, consensus_strength, controversy_score,
    score_distribution, source_ids, review_item_ids,
    first_review_date, latest_review_date, days_since_release";

fn aggregate_from_row(row: &Row<'_>) -> rusqlite::Result<AlbumReviewAggregate> {
    let buckets: BTreeMap<String, u32> = json_column(row, 9)?;
    Ok(AlbumReviewAggregate {
        id: row.get(0)?,
        album_id: row.get(1)?,
        review_count: row.get(2)?,
        average_score: row.get(3)?,
        weighted_average: row.get(4)?,
        median_score: row.get(5)?,
        score_stddev: row.get(6)?,
        consensus_strength: row.get(7)?,
        controversy_score: row.get(8)?,
        score_distribution: ScoreDistribution::from_map(&buckets),
        source_ids: json_column(row, 10)?,
        review_item_ids: json_column(row, 11)?,
        first_review_date: row.get(12)?,
        latest_review_date: row.get(13)?,
        days_since_release: row.get(14)?,
    })
}

impl Database {
    // --- Sources ---

    /// Register a source unless one with the same name exists.
    /// Returns true when a row was created.
    pub fn insert_source_if_missing(&self, s: &NewSource) -> Result<bool> {
        let changed = self.conn.execute(
            "INSERT INTO sources (name, url, kind, weight)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(name) DO NOTHING",
            params![s.name, s.url, s.kind, s.weight],
        )?;
        Ok(changed > 0)
    }

    pub fn get_source_by_name(&self, name: &str) -> Result<Option<Source>> {
        let sql = format!("SELECT {SOURCE_COLUMNS} FROM sources WHERE name = ?1");
        let source = self
            .conn
            .query_row(&sql, params![name], source_from_row)
            .optional()?;
        Ok(source)
    }

    pub fn get_source(&self, id: i64) -> Result<Option<Source>> {
        let sql = format!("SELECT {SOURCE_COLUMNS} FROM sources WHERE id = ?1");
        let source = self
            .conn
            .query_row(&sql, params![id], source_from_row)
            .optional()?;
        Ok(source)
    }

    pub fn list_sources(&self) -> Result<Vec<Source>> {
        let sql = format!("SELECT {SOURCE_COLUMNS} FROM sources ORDER BY id");
        let mut stmt = self.conn.prepare(&sql)?;
        let sources = stmt
            .query_map([], source_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(sources)
    }

    /// Weights for the given source ids. Unknown ids are absent from the map;
    /// callers treat a missing weight as 1.0.
    pub fn source_weights(&self, ids: &[i64]) -> Result<HashMap<i64, f64>> {
        let mut stmt = self.conn.prepare("SELECT weight FROM sources WHERE id = ?1")?;
        let mut weights = HashMap::with_capacity(ids.len());
        for &id in ids {
            if let Some(w) = stmt
                .query_row(params![id], |row| row.get::<_, f64>(0))
                .optional()?
            {
                weights.insert(id, w);
            }
        }
        Ok(weights)
    }

    // --- Review items ---

    /// Insert or update a review item keyed by URL. Returns the item id.
    pub fn upsert_review_item(&self, item: &NewReviewItem) -> Result<i64> {
        Self::store_review_item_row(&self.conn, item)
    }

    /// Store a batch of review items in a single transaction.
    pub fn store_review_items(&self, items: &[NewReviewItem]) -> Result<Vec<i64>> {
        let tx = self.conn.unchecked_transaction()?;
        let mut ids = Vec::with_capacity(items.len());
        for item in items {
            ids.push(Self::store_review_item_row(&tx, item)?);
        }
        tx.commit()?;
        Ok(ids)
    }

    fn store_review_item_row(conn: &Connection, item: &NewReviewItem) -> Result<i64> {
        let tags = serde_json::to_string(&item.tags)?;
        let artists = serde_json::to_string(&item.artists)?;
        let tracks = serde_json::to_string(&item.tracks)?;
        let genres = serde_json::to_string(&item.genres)?;

        conn.execute(
            "INSERT INTO review_items (
                source_id, url, title, published_date, content_type,
                raw_content, author, tags,
                artists, album, track, tracks, genres,
                review_score, review_score_raw, score_confidence, score_format,
                updated_at
            ) VALUES (
                ?1, ?2, ?3, ?4, ?5,
                ?6, ?7, ?8,
                ?9, ?10, ?11, ?12, ?13,
                ?14, ?15, ?16, ?17,
                datetime('now')
            )
            ON CONFLICT(url) DO UPDATE SET
                source_id = excluded.source_id,
                title = excluded.title,
                published_date = excluded.published_date,
                content_type = excluded.content_type,
                raw_content = excluded.raw_content,
                author = excluded.author,
                tags = excluded.tags,
                artists = excluded.artists,
                album = excluded.album,
                track = excluded.track,
                tracks = excluded.tracks,
                genres = excluded.genres,
                review_score = excluded.review_score,
                review_score_raw = excluded.review_score_raw,
                score_confidence = excluded.score_confidence,
                score_format = excluded.score_format,
                updated_at = datetime('now')
            ",
            params![
                item.source_id, item.url, item.title, item.published_date, item.content_type,
                item.raw_content, item.author, tags,
                artists, item.album, item.track, tracks, genres,
                item.review_score, item.review_score_raw, item.score_confidence, item.score_format,
            ],
        )?;

        let id: i64 = conn.query_row(
            "SELECT id FROM review_items WHERE url = ?1",
            params![item.url],
            |row| row.get(0),
        )?;
        Ok(id)
    }

    pub fn review_item_exists(&self, url: &str) -> Result<bool> {
        let result: std::result::Result<i64, _> = self.conn.query_row(
            "SELECT id FROM review_items WHERE url = ?1",
            params![url],
            |row| row.get(0),
        );

        match result {
            Ok(_) => Ok(true),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    pub fn get_review_item(&self, id: i64) -> Result<Option<ReviewItem>> {
        let sql = format!("SELECT {ITEM_COLUMNS} FROM review_items WHERE id = ?1");
        let item = self
            .conn
            .query_row(&sql, params![id], item_from_row)
            .optional()?;
        Ok(item)
    }

    /// All items of one content type, in insertion order.
    pub fn get_review_items_by_type(&self, content_type: ContentType) -> Result<Vec<ReviewItem>> {
        let sql = format!(
            "SELECT {ITEM_COLUMNS} FROM review_items WHERE content_type = ?1 ORDER BY id"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let items = stmt
            .query_map(params![content_type], item_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(items)
    }

    pub fn get_all_review_items(&self) -> Result<Vec<ReviewItem>> {
        let sql = format!("SELECT {ITEM_COLUMNS} FROM review_items ORDER BY id");
        let mut stmt = self.conn.prepare(&sql)?;
        let items = stmt
            .query_map([], item_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(items)
    }

    /// Overwrite the derived extraction fields of one item (rescore).
    pub fn update_review_item_extraction(&self, id: i64, x: &ItemExtraction) -> Result<()> {
        let genres = serde_json::to_string(&x.genres)?;
        let tracks = serde_json::to_string(&x.tracks)?;
        self.conn.execute(
            "UPDATE review_items SET
                review_score = ?2, review_score_raw = ?3, score_confidence = ?4,
                score_format = ?5, genres = ?6, track = ?7, tracks = ?8,
                updated_at = datetime('now')
             WHERE id = ?1",
            params![
                id, x.review_score, x.review_score_raw, x.score_confidence,
                x.score_format, genres, x.track, tracks,
            ],
        )?;
        Ok(())
    }

    // --- Artists ---

    /// First artist (by id) with this normalized name.
    pub fn find_artist_by_normalized(&self, normalized: &str) -> Result<Option<Artist>> {
        let sql = format!(
            "SELECT {ARTIST_COLUMNS} FROM artists WHERE normalized_name = ?1 ORDER BY id LIMIT 1"
        );
        let artist = self
            .conn
            .query_row(&sql, params![normalized], artist_from_row)
            .optional()?;
        Ok(artist)
    }

    pub fn get_artist(&self, id: i64) -> Result<Option<Artist>> {
        let sql = format!("SELECT {ARTIST_COLUMNS} FROM artists WHERE id = ?1");
        let artist = self
            .conn
            .query_row(&sql, params![id], artist_from_row)
            .optional()?;
        Ok(artist)
    }

    /// All artists in creation order.
    pub fn list_artists(&self) -> Result<Vec<Artist>> {
        let sql = format!("SELECT {ARTIST_COLUMNS} FROM artists ORDER BY id");
        let mut stmt = self.conn.prepare(&sql)?;
        let artists = stmt
            .query_map([], artist_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(artists)
    }

    pub fn insert_artist(&self, name: &str, normalized: &str) -> Result<Artist> {
        self.conn.execute(
            "INSERT INTO artists (name, normalized_name) VALUES (?1, ?2)",
            params![name, normalized],
        )?;
        Ok(Artist {
            id: self.conn.last_insert_rowid(),
            name: name.to_string(),
            normalized_name: normalized.to_string(),
            musicbrainz_id: None,
            spotify_id: None,
            genres: Vec::new(),
        })
    }

    // --- Albums ---

    pub fn get_album(&self, id: i64) -> Result<Option<Album>> {
        let sql = format!("SELECT {ALBUM_COLUMNS} FROM albums al WHERE al.id = ?1");
        let album = self
            .conn
            .query_row(&sql, params![id], album_from_row)
            .optional()?;
        Ok(album)
    }

    /// First album (by id) of this artist with this normalized title.
    pub fn find_album_by_normalized(&self, artist_id: i64, normalized: &str) -> Result<Option<Album>> {
        let sql = format!(
            "SELECT {ALBUM_COLUMNS} FROM albums al
             WHERE al.artist_id = ?1 AND al.normalized_title = ?2
             ORDER BY al.id LIMIT 1"
        );
        let album = self
            .conn
            .query_row(&sql, params![artist_id, normalized], album_from_row)
            .optional()?;
        Ok(album)
    }

    /// Albums owned by one artist, in creation order.
    pub fn list_albums_by_artist(&self, artist_id: i64) -> Result<Vec<Album>> {
        let sql = format!(
            "SELECT {ALBUM_COLUMNS} FROM albums al WHERE al.artist_id = ?1 ORDER BY al.id"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let albums = stmt
            .query_map(params![artist_id], album_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(albums)
    }

    /// Every album paired with its owning artist's normalized name, in creation order.
    pub fn list_albums_with_artist_names(&self) -> Result<Vec<(Album, String)>> {
        let sql = format!(
            "SELECT {ALBUM_COLUMNS}, ar.normalized_name
             FROM albums al
             JOIN artists ar ON ar.id = al.artist_id
             ORDER BY al.id"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map([], |row| Ok((album_from_row(row)?, row.get(15)?)))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn insert_album(&self, a: &NewAlbum) -> Result<Album> {
        self.conn.execute(
            "INSERT INTO albums (title, normalized_title, artist_id, release_year)
             VALUES (?1, ?2, ?3, ?4)",
            params![a.title, a.normalized_title, a.artist_id, a.release_year],
        )?;
        let id = self.conn.last_insert_rowid();
        self.get_album(id)?
            .ok_or(super::DbError::Sqlite(rusqlite::Error::QueryReturnedNoRows))
    }

    /// Apply external metadata to an album. A stored release year is kept.
    pub fn apply_album_metadata(&self, album_id: i64, m: &AlbumEnrichment) -> Result<()> {
        let genres = if m.genres.is_empty() {
            None
        } else {
            Some(serde_json::to_string(&m.genres)?)
        };
        self.conn.execute(
            "UPDATE albums SET
                release_date = COALESCE(?2, release_date),
                release_year = COALESCE(release_year, ?3),
                musicbrainz_id = COALESCE(?4, musicbrainz_id),
                spotify_id = COALESCE(?5, spotify_id),
                album_type = COALESCE(?6, album_type),
                label = COALESCE(?7, label),
                genres = COALESCE(?8, genres),
                cover_art_url = COALESCE(?9, cover_art_url),
                metadata_source = ?10,
                metadata_confidence = ?11,
                metadata_fetched_at = ?12,
                updated_at = datetime('now')
             WHERE id = ?1",
            params![
                album_id, m.release_date, m.release_year, m.musicbrainz_id, m.spotify_id,
                m.album_type, m.label, genres, m.cover_art_url,
                m.metadata_source, m.metadata_confidence, chrono::Utc::now(),
            ],
        )?;
        Ok(())
    }

    /// Albums never enriched, oldest first, with their artist's display name.
    pub fn albums_missing_metadata(&self, limit: usize) -> Result<Vec<(Album, String)>> {
        let sql = format!(
            "SELECT {ALBUM_COLUMNS}, ar.name
             FROM albums al
             JOIN artists ar ON ar.id = al.artist_id
             WHERE al.metadata_source IS NULL
             ORDER BY al.id
             LIMIT ?1"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![limit as i64], |row| Ok((album_from_row(row)?, row.get(15)?)))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    // --- Aggregates ---

    pub fn get_aggregate_by_album(&self, album_id: i64) -> Result<Option<AlbumReviewAggregate>> {
        let sql = format!(
            "SELECT {AGGREGATE_COLUMNS} FROM album_review_aggregates WHERE album_id = ?1"
        );
        let agg = self
            .conn
            .query_row(&sql, params![album_id], aggregate_from_row)
            .optional()?;
        Ok(agg)
    }

    /// Insert or overwrite the aggregate for an album. The row id is preserved
    /// across updates. Returns the aggregate id.
    pub fn upsert_aggregate(&self, a: &NewAggregate) -> Result<i64> {
        let distribution = serde_json::to_string(&a.score_distribution.to_map())?;
        let source_ids = serde_json::to_string(&a.source_ids)?;
        let review_ids = serde_json::to_string(&a.review_item_ids)?;

        self.conn.execute(
            "INSERT INTO album_review_aggregates (
                album_id, review_count, average_score, weighted_average,
                median_score, score_stddev, consensus_strength, controversy_score,
                score_distribution, source_ids, review_item_ids,
                first_review_date, latest_review_date, days_since_release,
                updated_at
            ) VALUES (
                ?1, ?2, ?3, ?4,
                ?5, ?6, ?7, ?8,
                ?9, ?10, ?11,
                ?12, ?13, ?14,
                datetime('now')
            )
            ON CONFLICT(album_id) DO UPDATE SET
                review_count = excluded.review_count,
                average_score = excluded.average_score,
                weighted_average = excluded.weighted_average,
                median_score = excluded.median_score,
                score_stddev = excluded.score_stddev,
                consensus_strength = excluded.consensus_strength,
                controversy_score = excluded.controversy_score,
                score_distribution = excluded.score_distribution,
                source_ids = excluded.source_ids,
                review_item_ids = excluded.review_item_ids,
                first_review_date = excluded.first_review_date,
                latest_review_date = excluded.latest_review_date,
                days_since_release = excluded.days_since_release,
                updated_at = datetime('now')
            ",
            params![
                a.album_id, a.review_count, a.average_score, a.weighted_average,
                a.median_score, a.score_stddev, a.consensus_strength, a.controversy_score,
                distribution, source_ids, review_ids,
                a.first_review_date, a.latest_review_date, a.days_since_release,
            ],
        )?;

        let id: i64 = self.conn.query_row(
            "SELECT id FROM album_review_aggregates WHERE album_id = ?1",
            params![a.album_id],
            |row| row.get(0),
        )?;
        Ok(id)
    }

    /// Drop an album's aggregate. Returns whether a row was removed.
    pub fn delete_aggregate(&self, album_id: i64) -> Result<bool> {
        let n = self.conn.execute(
            "DELETE FROM album_review_aggregates WHERE album_id = ?1",
            params![album_id],
        )?;
        Ok(n > 0)
    }

    /// Aggregates with at least `min_reviews` reviews, best weighted average first.
    pub fn top_rated_aggregates(&self, limit: usize, min_reviews: i64) -> Result<Vec<AlbumReviewAggregate>> {
        let sql = format!(
            "SELECT {AGGREGATE_COLUMNS} FROM album_review_aggregates
             WHERE review_count >= ?1
             ORDER BY weighted_average DESC, id ASC
             LIMIT ?2"
        );
        self.query_aggregates(&sql, params![min_reviews, limit as i64])
    }

    /// Aggregates with at least `min_reviews` reviews, most controversial first.
    pub fn controversial_aggregates(&self, limit: usize, min_reviews: i64) -> Result<Vec<AlbumReviewAggregate>> {
        let sql = format!(
            "SELECT {AGGREGATE_COLUMNS} FROM album_review_aggregates
             WHERE review_count >= ?1
             ORDER BY controversy_score DESC, id ASC
             LIMIT ?2"
        );
        self.query_aggregates(&sql, params![min_reviews, limit as i64])
    }

    /// Aggregates with a latest review date, most recent first.
    pub fn recent_aggregates(&self, limit: usize) -> Result<Vec<AlbumReviewAggregate>> {
        let sql = format!(
            "SELECT {AGGREGATE_COLUMNS} FROM album_review_aggregates
             WHERE latest_review_date IS NOT NULL
             ORDER BY latest_review_date DESC, id ASC
             LIMIT ?1"
        );
        self.query_aggregates(&sql, params![limit as i64])
    }

    fn query_aggregates(
        &self,
        sql: &str,
        params: &[&dyn ToSql],
    ) -> Result<Vec<AlbumReviewAggregate>> {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt
            .query_map(params, aggregate_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Get catalog statistics.
    pub fn stats(&self) -> Result<CatalogStats> {
        let count = |sql: &str| -> Result<i64> {
            Ok(self.conn.query_row(sql, [], |row| row.get(0))?)
        };

        Ok(CatalogStats {
            total_sources: count("SELECT COUNT(*) FROM sources")?,
            total_items: count("SELECT COUNT(*) FROM review_items")?,
            total_reviews: count("SELECT COUNT(*) FROM review_items WHERE content_type = 'review'")?,
            scored_reviews: count(
                "SELECT COUNT(*) FROM review_items
                 WHERE content_type = 'review' AND review_score IS NOT NULL",
            )?,
            total_artists: count("SELECT COUNT(*) FROM artists")?,
            total_albums: count("SELECT COUNT(*) FROM albums")?,
            albums_with_metadata: count(
                "SELECT COUNT(*) FROM albums WHERE metadata_source IS NOT NULL",
            )?,
            total_aggregates: count("SELECT COUNT(*) FROM album_review_aggregates")?,
        })
    }
}
