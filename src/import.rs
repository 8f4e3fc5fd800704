use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Deserialize;
use thiserror::Error;
use walkdir::WalkDir;

use crate::db::models::{ContentType, NewReviewItem, NewSource, SourceKind};
use crate::db::{Database, DbError};
use crate::extract;
use crate::SUPPORTED_EXTENSIONS;

#[derive(Error, Debug)]
pub enum ImportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Database error: {0}")]
    Db(#[from] DbError),
    #[error("Parse error for {path}: {message}")]
    Parse { path: String, message: String },
}

/// One article as exported by a feed reader or scraper.
#[derive(Debug, Clone, Deserialize)]
pub struct Article {
    /// Source name, e.g. "Sonic Perspectives". Also the score parser hint.
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub title: String,
    /// RFC 3339, RFC 2822, `YYYY-MM-DD HH:MM:SS` or `YYYY-MM-DD`, taken as UTC.
    /// Missing dates fall back to the import time.
    #[serde(default)]
    pub published: Option<String>,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Overrides classification when set.
    #[serde(default)]
    pub content_type: Option<String>,
}

#[derive(Debug, Default)]
pub struct ImportResult {
    pub files: u64,
    pub articles: u64,
    pub new: u64,
    pub updated: u64,
    pub skipped: u64,
    pub errors: u64,
}

enum ArticleAction {
    New,
    Updated,
    Skipped,
}

/// Import every article file under `paths` and upsert the articles by URL.
///
/// Already imported URLs are skipped unless `force`. Unreadable files and
/// bad articles are counted as errors and do not stop the import.
pub fn import_paths(db: &Database, paths: &[PathBuf], force: bool) -> Result<ImportResult, ImportError> {
    let mut files: Vec<PathBuf> = Vec::new();
    for path in paths {
        for entry in WalkDir::new(path).follow_links(true).into_iter().filter_map(|e| e.ok()) {
            if entry.file_type().is_file() && has_supported_extension(entry.path()) {
                files.push(entry.into_path());
            }
        }
    }
    files.sort();

    let pb = ProgressBar::new(files.len() as u64);
    pb.set_style(
        ProgressStyle::with_template(
            "{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} ({per_sec}) ({eta}) {msg}",
        )
        .unwrap()
        .progress_chars("#>-"),
    );
    pb.set_message("Importing...");

    let mut result = ImportResult::default();
    let mut source_ids: HashMap<String, i64> = HashMap::new();

    let tx = db.conn.unchecked_transaction().map_err(DbError::from)?;

    for path in &files {
        result.files += 1;
        let articles = match read_articles(path) {
            Ok(articles) => articles,
            Err(e) => {
                log::warn!("Skipping {}: {e}", path.display());
                result.errors += 1;
                pb.inc(1);
                continue;
            }
        };

        for article in &articles {
            result.articles += 1;
            match import_article(db, article, force, &mut source_ids) {
                Ok(ArticleAction::New) => result.new += 1,
                Ok(ArticleAction::Updated) => result.updated += 1,
                Ok(ArticleAction::Skipped) => result.skipped += 1,
                Err(e) => {
                    log::warn!("Error importing {}: {e}", article.url);
                    result.errors += 1;
                }
            }
        }
        pb.inc(1);
    }

    tx.commit().map_err(DbError::from)?;

    pb.finish_with_message(format!(
        "Done: {} new, {} updated, {} skipped, {} errors",
        result.new, result.updated, result.skipped, result.errors
    ));
    Ok(result)
}

fn has_supported_extension(path: &Path) -> bool {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();
    SUPPORTED_EXTENSIONS.contains(&ext.as_str())
}

/// Articles from a JSON or YAML file holding an array of articles.
pub fn read_articles(path: &Path) -> Result<Vec<Article>, ImportError> {
    let contents = std::fs::read_to_string(path)?;
    let parse_error = |message: String| ImportError::Parse {
        path: path.display().to_string(),
        message,
    };
    let is_json = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("json"));

    if is_json {
        serde_json::from_str(&contents).map_err(|e| parse_error(e.to_string()))
    } else {
        serde_yaml::from_str(&contents).map_err(|e| parse_error(e.to_string()))
    }
}

/// Publication timestamp in any of the accepted formats.
pub fn parse_published(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Some(dt.and_utc());
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}

/// `https://host` part of a URL.
fn site_root(url: &str) -> String {
    match url.split_once("://") {
        Some((scheme, rest)) => {
            let host = rest.split('/').next().unwrap_or(rest);
            format!("{scheme}://{host}")
        }
        None => url.to_string(),
    }
}

/// Source id for an article, registering unknown sources at the default weight.
fn resolve_source(
    db: &Database,
    article: &Article,
    cache: &mut HashMap<String, i64>,
) -> Result<i64, ImportError> {
    if let Some(&id) = cache.get(&article.source) {
        return Ok(id);
    }

    let source = match db.get_source_by_name(&article.source)? {
        Some(source) => source,
        None => {
            log::warn!("Unknown source '{}', registering with weight 1.0", article.source);
            db.insert_source_if_missing(&NewSource {
                name: article.source.clone(),
                url: site_root(&article.url),
                kind: SourceKind::Rss,
                weight: 1.0,
            })?;
            db.get_source_by_name(&article.source)?.ok_or_else(|| ImportError::Parse {
                path: article.url.clone(),
                message: format!("source '{}' could not be registered", article.source),
            })?
        }
    };

    cache.insert(article.source.clone(), source.id);
    Ok(source.id)
}

fn import_article(
    db: &Database,
    article: &Article,
    force: bool,
    source_ids: &mut HashMap<String, i64>,
) -> Result<ArticleAction, ImportError> {
    let parse_error = |message: String| ImportError::Parse {
        path: article.url.clone(),
        message,
    };
    if article.url.trim().is_empty() || article.source.trim().is_empty() {
        return Err(parse_error("article needs a url and a source".to_string()));
    }

    let exists = db.review_item_exists(&article.url)?;
    if exists && !force {
        return Ok(ArticleAction::Skipped);
    }

    let published_date = match article.published.as_deref() {
        Some(raw) => parse_published(raw)
            .ok_or_else(|| parse_error(format!("unrecognised date '{raw}'")))?,
        None => {
            log::debug!("No publication date for {}, using import time", article.url);
            Utc::now()
        }
    };

    let explicit_type = article.content_type.as_deref().and_then(|ct| {
        let parsed = ContentType::parse(ct);
        if parsed.is_none() {
            log::warn!("Unknown content type '{ct}' for {}, classifying", article.url);
        }
        parsed
    });

    let source_id = resolve_source(db, article, source_ids)?;
    let x = extract::extract_article(
        &article.title,
        &article.content,
        &article.url,
        &article.source,
        &article.tags,
        explicit_type,
    );
    if let Some(score) = x.fields.review_score {
        log::info!("Extracted score: {score:.1}/10 for '{}'", article.title);
    }

    db.upsert_review_item(&NewReviewItem {
        source_id,
        url: article.url.clone(),
        title: article.title.clone(),
        published_date,
        content_type: x.content_type,
        raw_content: article.content.clone(),
        author: article.author.clone(),
        tags: article.tags.clone(),
        artists: x.artists,
        album: x.album,
        track: x.fields.track,
        tracks: x.fields.tracks,
        genres: x.fields.genres,
        review_score: x.fields.review_score,
        review_score_raw: x.fields.review_score_raw,
        score_confidence: x.fields.score_confidence,
        score_format: x.fields.score_format,
    })?;

    Ok(if exists { ArticleAction::Updated } else { ArticleAction::New })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("musicscout-{}-{name}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    const JSON_ARTICLES: &str = r#"[
        {
            "source": "The Prog Report",
            "url": "https://progreport.com/porcupine-tree-closure-continuation/",
            "title": "Porcupine Tree - Closure/Continuation Review",
            "published": "2022-06-24T09:00:00Z",
            "content": "<p>The prog rock event of the year.</p><p>Rating: 9/10</p>",
            "tags": ["Reviews"]
        },
        {
            "source": "The Prog Report",
            "url": "https://progreport.com/haken-tour/",
            "title": "Haken Announce European Tour",
            "published": "Fri, 24 Jun 2022 10:00:00 +0000"
        }
    ]"#;

    const YAML_ARTICLES: &str = r#"
- source: Some New Blog
  url: https://newblog.example/reviews/leprous
  title: "Leprous: Melodies of Atonement"
  published: "2024-08-30"
  content: "Grade: A-"
- source: Some New Blog
  url: https://newblog.example/bad-date
  title: Whatever
  published: last tuesday
"#;

    #[test]
    fn test_parse_published_formats() {
        let expected = Utc.with_ymd_and_hms(2022, 6, 24, 9, 0, 0).unwrap();
        assert_eq!(parse_published("2022-06-24T09:00:00Z"), Some(expected));
        assert_eq!(parse_published("2022-06-24T11:00:00+02:00"), Some(expected));
        assert_eq!(parse_published("Fri, 24 Jun 2022 09:00:00 +0000"), Some(expected));
        assert_eq!(parse_published("2022-06-24 09:00:00"), Some(expected));
        assert_eq!(
            parse_published("2022-06-24"),
            Some(Utc.with_ymd_and_hms(2022, 6, 24, 0, 0, 0).unwrap())
        );
        assert_eq!(parse_published("yesterday"), None);
    }

    #[test]
    fn test_site_root() {
        assert_eq!(site_root("https://newblog.example/reviews/x"), "https://newblog.example");
        assert_eq!(site_root("no-scheme"), "no-scheme");
    }

    #[test]
    fn test_import_json_and_yaml() {
        let dir = scratch_dir("mixed");
        std::fs::write(dir.join("prog.json"), JSON_ARTICLES).unwrap();
        std::fs::create_dir_all(dir.join("nested")).unwrap();
        std::fs::write(dir.join("nested/blog.yaml"), YAML_ARTICLES).unwrap();
        std::fs::write(dir.join("notes.txt"), "ignored").unwrap();

        let db = Database::open_in_memory().unwrap();
        let result = import_paths(&db, &[dir.clone()], false).unwrap();
        assert_eq!(result.files, 2);
        assert_eq!(result.articles, 4);
        assert_eq!(result.new, 3);
        assert_eq!(result.errors, 1);

        let reviews = db.get_review_items_by_type(ContentType::Review).unwrap();
        assert_eq!(reviews.len(), 2);
        let pt = reviews
            .iter()
            .find(|r| r.url.contains("porcupine"))
            .unwrap();
        assert_eq!(pt.primary_artist(), Some("Porcupine Tree"));
        assert_eq!(pt.album_mention(), Some("Closure/Continuation"));
        assert_eq!(pt.review_score, Some(9.0));
        assert_eq!(pt.genres, vec!["progressive rock".to_string()]);

        let leprous = reviews.iter().find(|r| r.url.contains("leprous")).unwrap();
        assert_eq!(leprous.review_score, Some(8.5));

        let news = db.get_review_items_by_type(ContentType::News).unwrap();
        assert_eq!(news.len(), 1);
        assert!(news[0].artists.is_empty());

        let blog = db.get_source_by_name("Some New Blog").unwrap().unwrap();
        assert_eq!(blog.url, "https://newblog.example");
        assert!((blog.weight - 1.0).abs() < 1e-10);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_reimport_skips_unless_forced() {
        let dir = scratch_dir("reimport");
        std::fs::write(dir.join("prog.json"), JSON_ARTICLES).unwrap();
        let db = Database::open_in_memory().unwrap();

        let first = import_paths(&db, &[dir.clone()], false).unwrap();
        assert_eq!(first.new, 2);

        let second = import_paths(&db, &[dir.clone()], false).unwrap();
        assert_eq!(second.new, 0);
        assert_eq!(second.skipped, 2);

        let forced = import_paths(&db, &[dir.clone()], true).unwrap();
        assert_eq!(forced.updated, 2);
        assert_eq!(db.get_all_review_items().unwrap().len(), 2);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_undated_article_does_not_sink_file() {
        let dir = scratch_dir("undated");
        std::fs::write(
            dir.join("feed.json"),
            r#"[
                {
                    "source": "Metal Temple",
                    "url": "https://metal-temple.com/review/soen-memorial/",
                    "title": "Soen - Memorial Review",
                    "published": "2023-09-01",
                    "content": "Rating: 8/10"
                },
                {
                    "source": "Metal Temple",
                    "url": "https://metal-temple.com/review/tesseract-war-of-being/",
                    "title": "TesseracT - War of Being Review",
                    "content": "Rating: 9/10"
                },
                {
                    "title": "Orphaned entry with no url or source"
                }
            ]"#,
        )
        .unwrap();

        let before = Utc::now();
        let db = Database::open_in_memory().unwrap();
        let result = import_paths(&db, &[dir.clone()], false).unwrap();
        assert_eq!(result.files, 1);
        assert_eq!(result.articles, 3);
        assert_eq!(result.new, 2);
        assert_eq!(result.errors, 1);

        let items = db.get_all_review_items().unwrap();
        assert_eq!(items.len(), 2);
        let dated = items.iter().find(|i| i.url.contains("soen")).unwrap();
        assert_eq!(dated.published_date, Utc.with_ymd_and_hms(2023, 9, 1, 0, 0, 0).unwrap());
        let undated = items.iter().find(|i| i.url.contains("tesseract")).unwrap();
        assert!(undated.published_date >= before - chrono::Duration::seconds(1));
        assert_eq!(undated.review_score, Some(9.0));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_malformed_file_counted() {
        let dir = scratch_dir("malformed");
        std::fs::write(dir.join("broken.json"), "{ not json").unwrap();
        let db = Database::open_in_memory().unwrap();
        let result = import_paths(&db, &[dir.clone()], false).unwrap();
        assert_eq!(result.files, 1);
        assert_eq!(result.errors, 1);
        assert_eq!(result.articles, 0);
        assert!(matches!(
            read_articles(&dir.join("broken.json")),
            Err(ImportError::Parse { .. })
        ));
        let _ = std::fs::remove_dir_all(&dir);
    }
}
