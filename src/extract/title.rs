use regex::Regex;
use std::sync::LazyLock;

/// Artist and album pulled out of an article title.
#[derive(Debug, Default, PartialEq)]
pub struct ExtractedTitle {
    pub artists: Vec<String>,
    pub album: Option<String>,
}

/// Titles with these words are about something other than an album.
const SKIP_KEYWORDS: &[&str] = &[
    "concert review",
    "tour",
    "announce",
    "shares",
    "reveals",
    "premiere",
    "interview",
    "best of",
    "best albums",
    "best progressive",
];

const ALBUM_NOISE: &[&str] = &["concert", "tour", "show"];
const FALLBACK_NOISE: &[&str] = &["concert", "tour", "announce", "return", "deliver"];
const ARTIST_NOISE: &[&str] = &[
    "omaha",
    "philadelphia",
    "lauderdale",
    "returns to",
    "blew the roof",
];

static REVIEW_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^\s*review:\s*").unwrap());

static PAREN_SPAN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s*\(.*?\)\s*").unwrap());

/// Which capture holds the artist.
#[derive(Clone, Copy)]
enum Order {
    ArtistAlbum,
    AlbumArtist,
}

// Most specific first. e.g.
//   "Opeth Return to Growls on The Last Will and Testament"
//   "The Last Will and Testament by Opeth"
//   "OPETH – The Last Will and Testament album review"
//   "Opeth - The Last Will and Testament Review"
//   "Opeth: The Last Will and Testament"
static REVIEW_PATTERNS: LazyLock<Vec<(Regex, Order)>> = LazyLock::new(|| {
    [
        (
            r"(?i)^(.+?)\s+(?:preserve|deliver|remain|blend|channel|masterfully|return|continue|embrace|explore)s?\s+.+?\s+on\s+(.+?)$",
            Order::ArtistAlbum,
        ),
        (r"(?i)^(.+?)\s+by\s+(.+?)(?:\s*[-–—]|$)", Order::AlbumArtist),
        (
            r"(?i)^([a-z\s&]+)\s*[-–—]\s*(.+?)\s*\(?album review\)?",
            Order::ArtistAlbum,
        ),
        (
            r"(?i)^(.+?)\s*[-–—]\s*(.+?)\s*(?:album\s+)?review",
            Order::ArtistAlbum,
        ),
        (r"(?i)^(.+?)\s*:\s*(.+?)$", Order::ArtistAlbum),
    ]
    .into_iter()
    .map(|(p, order)| (Regex::new(p).unwrap(), order))
    .collect()
});

static ARTIST_DASH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^(.+?)\s*[-–—]\s*(.+?)$").unwrap());

// "Album Review", "(Album Review) ..." and everything after
static REVIEW_SUFFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\s*\(?(?:album\s+)?review\)?.*$").unwrap());

static VERDICT_SUFFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\s*\(?(?:album\s+)?(?:review|rating|score)\)?.*$").unwrap()
});

// " - 20th Anniversary" and the like
static NUMBERED_SUFFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s*[-–—]\s*\d+.*$").unwrap());

fn trim_quotes(s: &str) -> &str {
    s.trim_matches(|c: char| c.is_whitespace() || matches!(c, '"' | '\'' | '“' | '”'))
}

fn trim_quotes_and_dashes(s: &str) -> &str {
    s.trim_matches(|c: char| {
        c.is_whitespace() || matches!(c, '"' | '\'' | '“' | '”' | '-' | '–' | '—')
    })
}

fn strip_suffix(re: &Regex, s: &str) -> String {
    re.replace(s, "").trim().to_string()
}

/// Title with review prefixes and parenthesised asides removed.
fn clean_title(title: &str) -> String {
    let title = REVIEW_PREFIX.replace(title, "");
    PAREN_SPAN.replace_all(&title, " ").trim().to_string()
}

fn match_review_pattern(title: &str) -> Option<(Vec<String>, String)> {
    let (caps, order) = REVIEW_PATTERNS
        .iter()
        .find_map(|(re, order)| re.captures(title).map(|caps| (caps, *order)))?;
    let first = caps[1].trim();
    let second = caps[2].trim();
    let (artist, album) = match order {
        Order::ArtistAlbum => (first, second),
        Order::AlbumArtist => (second, first),
    };

    let album = strip_suffix(&REVIEW_SUFFIX, trim_quotes(album));

    let artist = strip_suffix(&NUMBERED_SUFFIX, trim_quotes(artist));
    let artist = strip_suffix(&REVIEW_SUFFIX, &artist);
    let artists = if artist.chars().count() > 1 {
        vec![artist]
    } else {
        Vec::new()
    };

    Some((artists, album))
}

fn match_artist_dash(title: &str) -> Option<(Vec<String>, String)> {
    let caps = ARTIST_DASH.captures(title)?;
    let part2 = caps[2].trim();
    let part2_lower = part2.to_lowercase();
    if FALLBACK_NOISE.iter().any(|k| part2_lower.contains(k)) {
        return None;
    }
    Some((vec![caps[1].trim().to_string()], part2.to_string()))
}

fn clean_album(album: &str) -> Option<String> {
    let album = strip_suffix(&VERDICT_SUFFIX, trim_quotes_and_dashes(album));
    let lower = album.to_lowercase();
    // Bare "Live" is a section heading; "Live at Wembley" is an album
    if album.chars().count() < 2 || ALBUM_NOISE.iter().any(|k| lower.contains(k)) || lower == "live"
    {
        return None;
    }
    Some(album)
}

fn clean_artist(artist: &str) -> Option<String> {
    let artist = trim_quotes_and_dashes(artist);
    let lower = artist.to_lowercase();
    if artist.chars().count() <= 1 || ARTIST_NOISE.iter().any(|k| lower.contains(k)) {
        return None;
    }
    Some(artist.to_string())
}

/// Extract artist and album from an article title.
///
/// Returns an empty result for titles about tours, premieres,
/// interviews and lists, and whenever no pattern fits.
pub fn extract_artist_album(title: &str) -> ExtractedTitle {
    let cleaned = clean_title(title);
    let lower = cleaned.to_lowercase();
    if cleaned.is_empty() || SKIP_KEYWORDS.iter().any(|k| lower.contains(k)) {
        return ExtractedTitle::default();
    }

    let (artists, album) = match match_review_pattern(&cleaned) {
        Some((artists, album)) if !artists.is_empty() || !album.is_empty() => (artists, album),
        _ => match_artist_dash(&cleaned).unwrap_or_default(),
    };

    ExtractedTitle {
        artists: artists.iter().filter_map(|a| clean_artist(a)).collect(),
        album: clean_album(&album),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extract(title: &str) -> (Vec<String>, Option<String>) {
        let e = extract_artist_album(title);
        (e.artists, e.album)
    }

    fn some(artist: &str, album: &str) -> (Vec<String>, Option<String>) {
        (vec![artist.to_string()], Some(album.to_string()))
    }

    #[test]
    fn test_artist_dash_album_review() {
        assert_eq!(
            extract("Porcupine Tree - Closure/Continuation Review"),
            some("Porcupine Tree", "Closure/Continuation")
        );
    }

    #[test]
    fn test_review_prefix_and_parens() {
        assert_eq!(
            extract("Review: Opeth - The Last Will and Testament"),
            some("Opeth", "The Last Will and Testament")
        );
        assert_eq!(extract("Haken - Fauna (Album Review)"), some("Haken", "Fauna"));
    }

    #[test]
    fn test_album_by_artist() {
        assert_eq!(
            extract("The Last Will and Testament by Opeth"),
            some("Opeth", "The Last Will and Testament")
        );
    }

    #[test]
    fn test_verb_on_album() {
        assert_eq!(
            extract("Opeth Return to Growls on The Last Will and Testament"),
            some("Opeth", "The Last Will and Testament")
        );
    }

    #[test]
    fn test_upper_artist_album_review() {
        assert_eq!(
            extract("LEPROUS – Melodies of Atonement album review"),
            some("LEPROUS", "Melodies of Atonement")
        );
    }

    #[test]
    fn test_colon_form() {
        assert_eq!(
            extract("Leprous: Melodies of Atonement"),
            some("Leprous", "Melodies of Atonement")
        );
    }

    #[test]
    fn test_quoted_album() {
        assert_eq!(
            extract("Riverside - \"ID.Entity\" Review"),
            some("Riverside", "ID.Entity")
        );
    }

    #[test]
    fn test_skip_keywords() {
        assert_eq!(extract("Dream Theater Announce North American Tour"), (vec![], None));
        assert_eq!(extract("Haken Premiere New Video"), (vec![], None));
        assert_eq!(extract("The Best Progressive Albums of 2024"), (vec![], None));
    }

    #[test]
    fn test_fallback_rejects_news_second_part() {
        assert_eq!(extract("Tool - Return to the Studio"), (vec![], None));
    }

    #[test]
    fn test_bare_live_rejected() {
        assert_eq!(
            extract("Marillion - Live Review"),
            (vec!["Marillion".to_string()], None)
        );
    }

    #[test]
    fn test_venue_noise_artist_rejected() {
        let (artists, album) = extract("Steven Wilson Blew the Roof Off - Philadelphia");
        assert!(artists.is_empty());
        assert_eq!(album.as_deref(), Some("Philadelphia"));
    }

    #[test]
    fn test_no_pattern() {
        assert_eq!(extract("Weekly roundup"), (vec![], None));
        assert_eq!(extract(""), (vec![], None));
    }
}
