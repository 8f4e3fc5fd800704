pub mod models;
pub mod queries;

use rusqlite::Connection;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Migration failed: {0}")]
    Migration(String),
    #[error("JSON column error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, DbError>;

pub struct Database {
    pub conn: Connection,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let conn = Connection::open(path)?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    fn init(&self) -> Result<()> {
        self.conn.pragma_update(None, "journal_mode", "WAL")?;
        self.conn.pragma_update(None, "synchronous", "NORMAL")?;
        self.conn.pragma_update(None, "foreign_keys", "ON")?;
        self.migrate()?;
        Ok(())
    }

    fn migrate(&self) -> Result<()> {
        let version: i32 = self
            .conn
            .pragma_query_value(None, "user_version", |row| row.get(0))
            .unwrap_or(0);

        if version > SCHEMA_VERSION {
            return Err(DbError::Migration(format!(
                "database schema v{version} is newer than this build (v{SCHEMA_VERSION})"
            )));
        }
        if version < 1 {
            self.migrate_v1()?;
        }
        if version < 2 {
            self.migrate_v2()?;
        }

        self.conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;
        Ok(())
    }

    /// V1: sources, review items, canonical artists/albums, per-album aggregates
    fn migrate_v1(&self) -> Result<()> {
        self.conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS sources (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                name            TEXT NOT NULL UNIQUE,
                url             TEXT NOT NULL,
                kind            TEXT NOT NULL DEFAULT 'rss',
                weight          REAL NOT NULL DEFAULT 1.0,
                enabled         INTEGER NOT NULL DEFAULT 1,
                health_score    REAL NOT NULL DEFAULT 1.0,
                last_crawled    TEXT,
                created_at      TEXT NOT NULL DEFAULT (datetime('now')),
                updated_at      TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE TABLE IF NOT EXISTS review_items (
                id                  INTEGER PRIMARY KEY AUTOINCREMENT,
                source_id           INTEGER NOT NULL REFERENCES sources(id),
                url                 TEXT NOT NULL UNIQUE,
                title               TEXT NOT NULL,
                published_date      TEXT NOT NULL,
                content_type        TEXT NOT NULL,
                raw_content         TEXT NOT NULL,
                author              TEXT,

                -- Extracted metadata (JSON arrays stored as text)
                tags                TEXT NOT NULL DEFAULT '[]',
                artists             TEXT NOT NULL DEFAULT '[]',
                album               TEXT,
                track               TEXT,
                tracks              TEXT NOT NULL DEFAULT '[]',
                genres              TEXT NOT NULL DEFAULT '[]',

                -- Parsed review score (0-10 scale)
                review_score        REAL,
                review_score_raw    TEXT,
                score_confidence    REAL,
                score_format        TEXT,

                created_at          TEXT NOT NULL DEFAULT (datetime('now')),
                updated_at          TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE INDEX IF NOT EXISTS idx_items_source ON review_items(source_id);
            CREATE INDEX IF NOT EXISTS idx_items_type ON review_items(content_type);
            CREATE INDEX IF NOT EXISTS idx_items_published ON review_items(published_date);

            -- Near-duplicate artists may coexist: uniqueness is a matching concern
            CREATE TABLE IF NOT EXISTS artists (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                name            TEXT NOT NULL,
                normalized_name TEXT NOT NULL,
                musicbrainz_id  TEXT,
                spotify_id      TEXT,
                genres          TEXT NOT NULL DEFAULT '[]',
                created_at      TEXT NOT NULL DEFAULT (datetime('now')),
                updated_at      TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE INDEX IF NOT EXISTS idx_artists_normalized ON artists(normalized_name);

            CREATE TABLE IF NOT EXISTS albums (
                id                  INTEGER PRIMARY KEY AUTOINCREMENT,
                title               TEXT NOT NULL,
                normalized_title    TEXT NOT NULL,
                artist_id           INTEGER NOT NULL REFERENCES artists(id),
                release_date        TEXT,
                release_year        INTEGER,
                musicbrainz_id      TEXT,
                spotify_id          TEXT,
                album_type          TEXT,
                label               TEXT,
                genres              TEXT NOT NULL DEFAULT '[]',
                cover_art_url       TEXT,
                created_at          TEXT NOT NULL DEFAULT (datetime('now')),
                updated_at          TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE INDEX IF NOT EXISTS idx_albums_artist ON albums(artist_id, normalized_title);

            CREATE TABLE IF NOT EXISTS album_review_aggregates (
                id                  INTEGER PRIMARY KEY AUTOINCREMENT,
                album_id            INTEGER NOT NULL UNIQUE REFERENCES albums(id) ON DELETE CASCADE,

                review_count        INTEGER NOT NULL,
                average_score       REAL NOT NULL,
                weighted_average    REAL NOT NULL,
                median_score        REAL NOT NULL,
                score_stddev        REAL NOT NULL,
                consensus_strength  REAL NOT NULL,
                controversy_score   REAL NOT NULL,

                score_distribution  TEXT NOT NULL,
                source_ids          TEXT NOT NULL,
                review_item_ids     TEXT NOT NULL,

                first_review_date   TEXT,
                latest_review_date  TEXT,
                days_since_release  INTEGER,

                created_at          TEXT NOT NULL DEFAULT (datetime('now')),
                updated_at          TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE INDEX IF NOT EXISTS idx_aggregates_weighted ON album_review_aggregates(weighted_average);
            CREATE INDEX IF NOT EXISTS idx_aggregates_controversy ON album_review_aggregates(controversy_score);
            CREATE INDEX IF NOT EXISTS idx_aggregates_latest ON album_review_aggregates(latest_review_date);
            ",
        )?;
        Ok(())
    }

    /// V2: metadata enrichment tracking on albums
    fn migrate_v2(&self) -> Result<()> {
        let new_columns = [
            "metadata_source TEXT",
            "metadata_confidence REAL",
            "metadata_fetched_at TEXT",
        ];

        for col in &new_columns {
            // SQLite has no ADD COLUMN IF NOT EXISTS; a duplicate column is fine
            let sql = format!("ALTER TABLE albums ADD COLUMN {col}");
            match self.conn.execute(&sql, []) {
                Ok(_) => {}
                Err(rusqlite::Error::SqliteFailure(err, _))
                    if err.code == rusqlite::ffi::ErrorCode::Unknown
                        || err.extended_code == 1 => {}
                Err(e) => return Err(e.into()),
            }
        }

        Ok(())
    }
}

/// Current schema version written to `user_version`.
const SCHEMA_VERSION: i32 = 2;
