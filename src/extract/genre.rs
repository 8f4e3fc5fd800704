use regex::Regex;
use std::collections::BTreeSet;
use std::sync::LazyLock;

/// Canonical genre → spellings seen in articles.
const GENRES: &[(&str, &[&str])] = &[
    ("progressive rock", &["progressive rock", "prog rock", "prog-rock"]),
    ("progressive metal", &["progressive metal", "prog metal", "prog-metal"]),
    ("power metal", &["power metal"]),
    ("death metal", &["death metal"]),
    ("black metal", &["black metal"]),
    ("doom metal", &["doom metal", "stoner doom", "funeral doom"]),
    ("thrash metal", &["thrash metal", "thrash"]),
    ("heavy metal", &["heavy metal", "traditional metal", "trad metal"]),
    ("metalcore", &["metalcore", "metal-core"]),
    ("deathcore", &["deathcore"]),
    ("jazz fusion", &["jazz fusion", "fusion"]),
    ("hard rock", &["hard rock"]),
    ("classic rock", &["classic rock"]),
    ("blues rock", &["blues rock"]),
    ("post-rock", &["post-rock", "post rock"]),
    ("post-metal", &["post-metal", "post metal"]),
    ("folk metal", &["folk metal"]),
    ("symphonic metal", &["symphonic metal"]),
    ("gothic metal", &["gothic metal", "goth metal"]),
    ("industrial metal", &["industrial metal"]),
    ("alternative metal", &["alternative metal", "alt-metal"]),
    ("groove metal", &["groove metal"]),
    ("sludge metal", &["sludge metal", "sludge"]),
    ("experimental", &["experimental", "avant-garde"]),
    ("instrumental", &["instrumental"]),
    ("atmospheric", &["atmospheric"]),
];

static METALLICA: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\bmetallica\b").unwrap());
static ROCK_AND_ROLL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\brock\s+(?:and|&|n)\s+roll\b").unwrap());
static ROCK_WORD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\brock\b").unwrap());

fn table_matches(text: &str, found: &mut BTreeSet<&'static str>) {
    for (genre, variants) in GENRES {
        if variants.iter().any(|v| text.contains(v)) {
            found.insert(*genre);
        }
    }
}

/// Genre tags mentioned in an article. Sorted, no duplicates.
///
/// Falls back to plain "metal" or "rock" when the text uses the word but
/// names no sub-genre of it.
pub fn extract_genres(title: &str, content: &str) -> Vec<String> {
    let text = format!("{title} {content}").to_lowercase();
    let mut found = BTreeSet::new();
    table_matches(&text, &mut found);

    if text.contains("metal")
        && !found.iter().any(|g| g.contains("metal"))
        && !METALLICA.is_match(&text)
    {
        found.insert("metal");
    }

    if !found.iter().any(|g| g.contains("rock"))
        && ROCK_WORD.is_match(&text)
        && !ROCK_AND_ROLL.is_match(&text)
    {
        found.insert("rock");
    }

    found.into_iter().map(String::from).collect()
}

/// Genre tags named by an article's own tag list.
pub fn extract_from_tags(tags: &[String]) -> Vec<String> {
    let mut found = BTreeSet::new();
    for tag in tags {
        table_matches(&tag.to_lowercase(), &mut found);
    }
    found.into_iter().map(String::from).collect()
}
