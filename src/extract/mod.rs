pub mod classify;
pub mod genre;
pub mod score;
pub mod title;
pub mod tracks;

use regex::{Captures, Regex};
use std::collections::HashMap;
use std::sync::LazyLock;

use indicatif::{ProgressBar, ProgressStyle};

use crate::db::models::{ContentType, ItemExtraction, ReviewItem};
use crate::db::{Database, Result};

static SCRIPT_OR_STYLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<script\b.*?</script\s*>|<style\b.*?</style\s*>").unwrap()
});

static TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)<[^>]*>").unwrap());

static ENTITY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"&(?:#(\d+)|#[xX]([0-9a-fA-F]+)|(amp|lt|gt|quot|apos|nbsp));").unwrap()
});

static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

fn decode_entity(caps: &Captures) -> String {
    let code = if let Some(dec) = caps.get(1) {
        dec.as_str().parse().ok()
    } else if let Some(hex) = caps.get(2) {
        u32::from_str_radix(hex.as_str(), 16).ok()
    } else {
        let named = match caps.get(3).map(|m| m.as_str()) {
            Some("amp") => '&',
            Some("lt") => '<',
            Some("gt") => '>',
            Some("quot") => '"',
            Some("apos") => '\'',
            _ => ' ',
        };
        return named.to_string();
    };
    code.and_then(char::from_u32)
        .map_or_else(|| caps[0].to_string(), |c| c.to_string())
}

/// Plain text from an HTML fragment: scripts and styles dropped, tags
/// replaced by spaces, entities decoded, whitespace collapsed.
pub fn strip_markup(html: &str) -> String {
    let text = SCRIPT_OR_STYLE.replace_all(html, " ");
    let text = TAG.replace_all(&text, " ");
    let text = ENTITY.replace_all(&text, decode_entity);
    WHITESPACE.replace_all(&text, " ").trim().to_string()
}

/// Everything derived from one article's text.
#[derive(Debug, Clone)]
pub struct ArticleExtraction {
    pub content_type: ContentType,
    pub artists: Vec<String>,
    pub album: Option<String>,
    pub fields: ItemExtraction,
}

/// Score, genres and tracks for an article. The score is only looked
/// for in reviews.
pub fn extract_fields(
    title: &str,
    text: &str,
    content_type: ContentType,
    source_name: &str,
    tags: &[String],
) -> ItemExtraction {
    let mut fields = ItemExtraction::default();

    if content_type == ContentType::Review {
        if let Some(parsed) = score::parse_score(text, source_name) {
            log::debug!(
                "Extracted score {:.1}/10 from '{}' ({}, confidence {:.2})",
                parsed.normalized_score,
                parsed.raw_text,
                parsed.format.as_str(),
                parsed.confidence
            );
            fields.review_score = Some(parsed.normalized_score);
            fields.review_score_raw = Some(parsed.raw_text);
            fields.score_confidence = Some(parsed.confidence);
            fields.score_format = Some(parsed.format.as_str().to_string());
        }
    }

    let mut genres = genre::extract_genres(title, text);
    genres.extend(genre::extract_from_tags(tags));
    genres.sort();
    genres.dedup();
    fields.genres = genres;

    fields.track = tracks::extract_track_name(title);
    fields.tracks = tracks::extract_all_tracks(title);
    fields
}

/// Run the full extraction pipeline over one article.
///
/// `explicit_type` overrides classification. `content` may be HTML.
pub fn extract_article(
    title: &str,
    content: &str,
    url: &str,
    source_name: &str,
    tags: &[String],
    explicit_type: Option<ContentType>,
) -> ArticleExtraction {
    let text = strip_markup(content);
    let content_type = explicit_type.unwrap_or_else(|| classify::classify_content_type(title, url));

    let (artists, album) = if content_type == ContentType::Review {
        let extracted = title::extract_artist_album(title);
        (extracted.artists, extracted.album)
    } else {
        (Vec::new(), None)
    };

    ArticleExtraction {
        content_type,
        artists,
        album,
        fields: extract_fields(title, &text, content_type, source_name, tags),
    }
}

#[derive(Debug, Default)]
pub struct RescoreResult {
    pub items: u64,
    pub scored: u64,
    pub changed: u64,
}

fn current_extraction(item: &ReviewItem) -> ItemExtraction {
    ItemExtraction {
        review_score: item.review_score,
        review_score_raw: item.review_score_raw.clone(),
        score_confidence: item.score_confidence,
        score_format: item.score_format.clone(),
        genres: item.genres.clone(),
        track: item.track.clone(),
        tracks: item.tracks.clone(),
    }
}

/// Re-run score, genre and track extraction over every stored item and
/// write back whatever changed. Artist and album mentions are left alone.
pub fn rescore_items(db: &Database) -> Result<RescoreResult> {
    let source_names: HashMap<i64, String> = db
        .list_sources()?
        .into_iter()
        .map(|s| (s.id, s.name))
        .collect();
    let items = db.get_all_review_items()?;

    let pb = ProgressBar::new(items.len() as u64);
    pb.set_style(
        ProgressStyle::with_template(
            "{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} ({per_sec}) ({eta}) {msg}",
        )
        .unwrap()
        .progress_chars("#>-"),
    );
    pb.set_message("Rescoring...");

    let mut result = RescoreResult::default();
    let tx = db.conn.unchecked_transaction()?;

    for item in &items {
        result.items += 1;
        let source_name = source_names.get(&item.source_id).map_or("", String::as_str);
        let text = strip_markup(&item.raw_content);
        let fields = extract_fields(&item.title, &text, item.content_type, source_name, &item.tags);

        if fields.review_score.is_some() {
            result.scored += 1;
        }
        if fields != current_extraction(item) {
            db.update_review_item_extraction(item.id, &fields)?;
            result.changed += 1;
        }
        pb.inc(1);
    }

    tx.commit()?;
    pb.finish_with_message(format!("Done: {} changed, {} scored", result.changed, result.scored));
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_markup() {
        let html = "<p>Rating:&nbsp;<b>8/10</b></p><script>var x = '<p>';</script>\n<p>Tom &amp; Jerry &#8217;s &#x2605;</p>";
        assert_eq!(strip_markup(html), "Rating: 8/10 Tom & Jerry ’s ★");
    }

    #[test]
    fn test_strip_markup_no_double_decode() {
        assert_eq!(strip_markup("&amp;lt;b&amp;gt;"), "&lt;b&gt;");
        assert_eq!(strip_markup("plain text"), "plain text");
    }

    #[test]
    fn test_extract_review_article() {
        let x = extract_article(
            "Porcupine Tree - Closure/Continuation Review",
            "<p>A return to form for the prog rock veterans.</p><p>Rating: 9/10</p>",
            "https://example.com/2022/porcupine-tree",
            "The Prog Report",
            &["Reviews".to_string()],
            None,
        );
        assert_eq!(x.content_type, ContentType::Review);
        assert_eq!(x.artists, vec!["Porcupine Tree"]);
        assert_eq!(x.album.as_deref(), Some("Closure/Continuation"));
        assert_eq!(x.fields.review_score, Some(9.0));
        assert_eq!(x.fields.score_format.as_deref(), Some("fraction"));
        assert_eq!(x.fields.genres, vec!["progressive rock"]);
    }

    #[test]
    fn test_news_article_has_no_score_or_album() {
        let x = extract_article(
            "Haken Unveils New Single \"Puzzle Box\"",
            "Score: 9/10 for the video alone. Progressive metal at its finest.",
            "https://example.com/news/haken",
            "Sonic Perspectives",
            &[],
            None,
        );
        assert_eq!(x.content_type, ContentType::Premiere);
        assert!(x.artists.is_empty());
        assert!(x.album.is_none());
        assert!(x.fields.review_score.is_none());
        assert_eq!(x.fields.track.as_deref(), Some("Puzzle Box"));
        assert_eq!(x.fields.genres, vec!["progressive metal"]);
    }

    #[test]
    fn test_explicit_type_overrides() {
        let x = extract_article(
            "Leprous: Melodies of Atonement",
            "Grade: A",
            "",
            "Blog",
            &["Post Rock".to_string()],
            Some(ContentType::Review),
        );
        assert_eq!(x.content_type, ContentType::Review);
        assert_eq!(x.artists, vec!["Leprous"]);
        assert_eq!(x.fields.review_score, Some(9.0));
        assert_eq!(x.fields.genres, vec!["post-rock"]);
    }

    #[test]
    fn test_rescore_updates_changed_items_only() {
        use crate::db::models::{NewReviewItem, NewSource, SourceKind};
        use chrono::{TimeZone, Utc};

        let db = Database::open_in_memory().unwrap();
        db.insert_source_if_missing(&NewSource {
            name: "Sonic Perspectives".to_string(),
            url: "https://www.sonicperspectives.com".to_string(),
            kind: SourceKind::Rss,
            weight: 1.5,
        })
        .unwrap();
        let source = db.get_source_by_name("Sonic Perspectives").unwrap().unwrap();
        let item = |url: &str, content: &str| NewReviewItem {
            source_id: source.id,
            url: url.to_string(),
            title: "Haken - Fauna Review".to_string(),
            published_date: Utc.with_ymd_and_hms(2023, 3, 3, 0, 0, 0).unwrap(),
            content_type: ContentType::Review,
            raw_content: content.to_string(),
            author: None,
            tags: Vec::new(),
            artists: vec!["Haken".to_string()],
            album: Some("Fauna".to_string()),
            track: None,
            tracks: Vec::new(),
            genres: Vec::new(),
            review_score: None,
            review_score_raw: None,
            score_confidence: None,
            score_format: None,
        };
        let scored = db
            .upsert_review_item(&item("https://a.example/1", "<p>Overall Score: 8.8 out of 10</p>"))
            .unwrap();
        db.upsert_review_item(&item("https://a.example/2", "No verdict.")).unwrap();

        let result = rescore_items(&db).unwrap();
        assert_eq!(result.items, 2);
        assert_eq!(result.scored, 1);
        assert_eq!(result.changed, 1);

        let stored = db.get_review_item(scored).unwrap().unwrap();
        assert_eq!(stored.review_score, Some(8.8));
        assert_eq!(stored.score_format.as_deref(), Some("decimal"));
        assert_eq!(stored.artists, vec!["Haken".to_string()]);

        let again = rescore_items(&db).unwrap();
        assert_eq!(again.changed, 0);
    }
}
