use regex::Regex;
use std::sync::LazyLock;

/// Title words that mark an article as being about a single track.
const TRACK_KEYWORDS: &[&str] = &[
    "single",
    "video",
    "premiere",
    "releases",
    "unveils",
    "shares",
    "drops",
    "animated video",
    "music video",
    "lyric video",
];

/// Quoted names that are people, not songs.
const FALSE_POSITIVES: &[&str] = &["featuring", "ft.", "feat.", "members", "ex-", "former"];

const MAX_TRACK_CHARS: usize = 100;

static QUOTED_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r#"['"]([^'"]+)['"]"#,
        // Mangled quotes from badly encoded feeds
        r"\x{FFFD}([^\x{FFFD}]+)\x{FFFD}",
        r"[‘’]([^‘’]+)[‘’]",
        r"“([^”]+)”",
    ]
    .into_iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

fn clean_track(raw: &str) -> Option<String> {
    let name = raw.trim().trim_end_matches([',', '.', ';', ':', '!', '?']);
    let len = name.chars().count();
    if !(2..=MAX_TRACK_CHARS).contains(&len) {
        return None;
    }
    let lower = name.to_lowercase();
    if FALSE_POSITIVES.iter().any(|k| lower.contains(k)) {
        return None;
    }
    Some(name.to_string())
}

fn quoted_names(title: &str) -> impl Iterator<Item = String> + '_ {
    QUOTED_PATTERNS
        .iter()
        .flat_map(move |re| re.captures_iter(title))
        .filter_map(|caps| clean_track(&caps[1]))
}

/// Track name from a single/video/premiere title, taken from the first
/// usable quoted string.
pub fn extract_track_name(title: &str) -> Option<String> {
    let lower = title.to_lowercase();
    if !TRACK_KEYWORDS.iter().any(|k| lower.contains(k)) {
        return None;
    }
    quoted_names(title).next()
}

/// Every usable quoted string in a title, in pattern order.
pub fn extract_all_tracks(title: &str) -> Vec<String> {
    quoted_names(title).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_in_double_quotes() {
        assert_eq!(
            extract_track_name("Haken Unveils New Single \"Puzzle Box\""),
            Some("Puzzle Box".to_string())
        );
    }

    #[test]
    fn test_typographic_quotes() {
        assert_eq!(
            extract_track_name("Leprous Share Music Video for “Silently Walking Alone”"),
            Some("Silently Walking Alone".to_string())
        );
        assert_eq!(
            extract_track_name("Soen drop lyric video for ‘Lunacy’"),
            Some("Lunacy".to_string())
        );
    }

    #[test]
    fn test_replacement_char_quotes() {
        assert_eq!(
            extract_track_name("Riverside releases \u{FFFD}Friend or Foe?\u{FFFD}"),
            Some("Friend or Foe".to_string())
        );
    }

    #[test]
    fn test_requires_track_keyword() {
        assert_eq!(extract_track_name("Opeth - \"The Last Will\" Review"), None);
    }

    #[test]
    fn test_false_positives_skipped() {
        assert_eq!(
            extract_track_name("Supergroup With \"Ex-Dream Theater Members\" Drops \"Aurora\""),
            Some("Aurora".to_string())
        );
        assert_eq!(extract_track_name("New single \"A\""), None);
    }

    #[test]
    fn test_extract_all_tracks() {
        let tracks = extract_all_tracks("Track by track: \"Cocoon\", \"Fear Inoculum\" and \"7empest\"");
        assert_eq!(tracks, vec!["Cocoon", "Fear Inoculum", "7empest"]);
        assert!(extract_all_tracks("No quotes here").is_empty());
    }
}
