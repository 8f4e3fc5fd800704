use regex::{Captures, Regex};
use std::collections::BTreeMap;
use std::sync::LazyLock;

/// How a score was written in the review.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoreFormat {
    Decimal,
    Fraction,
    Stars,
    Letter,
    Text,
    Percentage,
    Subcategory,
}

impl ScoreFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Decimal => "decimal",
            Self::Fraction => "fraction",
            Self::Stars => "stars",
            Self::Letter => "letter",
            Self::Text => "text",
            Self::Percentage => "percentage",
            Self::Subcategory => "subcategory",
        }
    }
}

/// A score found in review text, normalized to 0-10.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedScore {
    pub raw_text: String,
    pub normalized_score: f64,
    pub confidence: f64,
    pub format: ScoreFormat,
    /// Per-category scores when the overall score is their mean.
    pub sub_scores: Option<BTreeMap<String, f64>>,
}

impl ParsedScore {
    pub fn confidence_reason(&self) -> &'static str {
        if self.confidence >= 0.9 {
            "High confidence - exact score format match"
        } else if self.confidence >= 0.8 {
            "Good confidence - recognized format"
        } else if self.confidence >= 0.6 {
            "Medium confidence - generic pattern match"
        } else {
            "Low confidence - weak pattern match"
        }
    }
}

const UNIVERSAL_CONFIDENCE: f64 = 0.6;
const SUBCATEGORY_CONFIDENCE: f64 = 0.8;
const MIN_SUBCATEGORIES: usize = 2;

/// One extraction rule. Fractions capture numerator and denominator.
struct ScorePattern {
    regex: Regex,
    format: ScoreFormat,
    confidence: f64,
}

impl ScorePattern {
    fn new(pattern: &str, format: ScoreFormat, confidence: f64) -> Self {
        Self {
            regex: Regex::new(pattern).unwrap(),
            format,
            confidence,
        }
    }
}

/// Bespoke patterns for one publication.
struct SourceProfile {
    /// Lowercase substring of the source name that selects this profile.
    hint: &'static str,
    /// Sorted by descending confidence.
    patterns: Vec<ScorePattern>,
    sub_categories: Vec<(&'static str, Regex)>,
}

impl SourceProfile {
    fn new(hint: &'static str, mut patterns: Vec<ScorePattern>, sub_categories: &[&'static str]) -> Self {
        patterns.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
        let sub_categories = sub_categories
            .iter()
            .map(|name| {
                let re = Regex::new(&format!(r"{name}:\s*(\d+(?:\.\d+)?)(?:\s*/\s*10)?")).unwrap();
                (*name, re)
            })
            .collect();
        Self { hint, patterns, sub_categories }
    }
}

// Shared number shapes
const NUM: &str = r"(\d+(?:\.\d+)?)";

fn fraction(denominator: &str, confidence: f64) -> ScorePattern {
    ScorePattern::new(
        &format!(r"\b{NUM}\s*/\s*({denominator})\b"),
        ScoreFormat::Fraction,
        confidence,
    )
}

fn labelled_decimal(label: &str, confidence: f64) -> ScorePattern {
    ScorePattern::new(&format!(r"{label}:\s*{NUM}"), ScoreFormat::Decimal, confidence)
}

static SOURCE_PROFILES: LazyLock<Vec<SourceProfile>> = LazyLock::new(|| {
    vec![
        SourceProfile::new(
            "sonic perspectives",
            vec![
                ScorePattern::new(
                    r"(?:overall\s*score|score).*?(\d+\.\d+)\s*out\s*of\s*10",
                    ScoreFormat::Decimal,
                    0.95,
                ),
                ScorePattern::new(r"(\d+\.\d+)\s*out\s*of\s*10", ScoreFormat::Decimal, 0.90),
                ScorePattern::new(
                    r"score.*?(\d+\.\d+).*?(?:excellent|good|average)",
                    ScoreFormat::Decimal,
                    0.85,
                ),
            ],
            &["songwriting", "musicianship", "originality", "production"],
        ),
        SourceProfile::new(
            "prog report",
            vec![fraction("10", 0.85), fraction("5", 0.80), labelled_decimal("rating", 0.80)],
            &[],
        ),
        SourceProfile::new(
            "metal temple",
            vec![fraction("100", 0.90), fraction("10", 0.90), labelled_decimal("rating", 0.80)],
            &[],
        ),
        SourceProfile::new(
            "ultimate classic rock",
            vec![ScorePattern::new(
                &format!(r"\b{NUM}\s*(?:out\s*of|/)\s*(\d+)\b"),
                ScoreFormat::Fraction,
                0.85,
            )],
            &[],
        ),
        SourceProfile::new(
            "sea of tranquility",
            vec![
                fraction("5", 0.85),
                ScorePattern::new(r"★{1,5}", ScoreFormat::Stars, 0.85),
            ],
            &[],
        ),
    ]
});

// Letter, text and percentage scores only count after an explicit label
static UNIVERSAL_PATTERNS: LazyLock<Vec<ScorePattern>> = LazyLock::new(|| {
    vec![
        ScorePattern::new(
            r"\b(\d{1,2}(?:\.\d+)?)\s*/\s*(5|10)\b(?:\s*stars?)?",
            ScoreFormat::Fraction,
            UNIVERSAL_CONFIDENCE,
        ),
        ScorePattern::new(r"★{1,5}", ScoreFormat::Stars, UNIVERSAL_CONFIDENCE),
        ScorePattern::new(
            r"(?:grade|rating|score):\s*([a-f][+-])(?:[^\w+-]|$)",
            ScoreFormat::Letter,
            UNIVERSAL_CONFIDENCE,
        ),
        // A bare letter must be closed by punctuation or the end, so
        // "score: a masterpiece" is not read as an A
        ScorePattern::new(
            r"(?:grade|rating|score):\s*([a-f])(?:[^\w\s+-]|$)",
            ScoreFormat::Letter,
            UNIVERSAL_CONFIDENCE,
        ),
        ScorePattern::new(
            r"(?:rating|score):\s*(excellent|great|good|average|poor|terrible)\b",
            ScoreFormat::Text,
            UNIVERSAL_CONFIDENCE,
        ),
        ScorePattern::new(
            &format!(r"(?:score|rating):\s*{NUM}%"),
            ScoreFormat::Percentage,
            UNIVERSAL_CONFIDENCE,
        ),
    ]
});

/// Letter grade to 0-10. Unknown grades give `None`.
pub fn letter_grade_score(grade: &str) -> Option<f64> {
    match grade.to_uppercase().as_str() {
        "A+" => Some(10.0),
        "A" => Some(9.0),
        "A-" => Some(8.5),
        "B+" => Some(8.0),
        "B" => Some(7.0),
        "B-" => Some(6.5),
        "C+" => Some(6.0),
        "C" => Some(5.0),
        "C-" => Some(4.5),
        "D+" => Some(4.0),
        "D" => Some(3.0),
        "D-" => Some(2.5),
        "F" => Some(1.0),
        _ => None,
    }
}

/// Qualitative rating word to 0-10.
pub fn text_rating_score(word: &str) -> Option<f64> {
    match word.to_lowercase().as_str() {
        "excellent" => Some(9.0),
        "great" => Some(8.0),
        "good" => Some(7.0),
        "average" => Some(5.0),
        "poor" => Some(3.0),
        "terrible" => Some(1.0),
        _ => None,
    }
}

/// `(num / den) * 10`, capped at 10. Zero denominator gives `None`.
pub fn fraction_score(numerator: f64, denominator: f64) -> Option<f64> {
    if denominator == 0.0 {
        return None;
    }
    Some((numerator / denominator * 10.0).min(10.0))
}

fn group_f64(caps: &Captures, i: usize) -> Option<f64> {
    caps.get(i)?.as_str().parse().ok()
}

/// Normalized value for one match, or `None` if it can't be used.
fn normalize_match(format: ScoreFormat, caps: &Captures) -> Option<f64> {
    let score = match format {
        ScoreFormat::Decimal => group_f64(caps, 1)?,
        ScoreFormat::Fraction => fraction_score(group_f64(caps, 1)?, group_f64(caps, 2)?)?,
        ScoreFormat::Stars => {
            let stars = caps.get(0)?.as_str().chars().filter(|c| *c == '★').count();
            stars as f64 / 5.0 * 10.0
        }
        ScoreFormat::Letter => letter_grade_score(caps.get(1)?.as_str())?,
        ScoreFormat::Text => text_rating_score(caps.get(1)?.as_str())?,
        ScoreFormat::Percentage => group_f64(caps, 1)? / 100.0 * 10.0,
        ScoreFormat::Subcategory => return None,
    };
    (0.0..=10.0).contains(&score).then_some(score)
}

/// Matched text from the score itself to the end of the match.
fn raw_text(caps: &Captures) -> String {
    let Some(whole) = caps.get(0) else {
        return String::new();
    };
    let start = caps.get(1).map_or(whole.start(), |g| g.start());
    let text = &whole.as_str()[start - whole.start()..];
    text.trim_end_matches(|c: char| !(c.is_alphanumeric() || matches!(c, '+' | '-' | '%' | '★')))
        .to_string()
}

/// First usable match across patterns, in order.
fn first_valid(content: &str, patterns: &[ScorePattern]) -> Option<ParsedScore> {
    for pattern in patterns {
        for caps in pattern.regex.captures_iter(content) {
            if let Some(score) = normalize_match(pattern.format, &caps) {
                return Some(ParsedScore {
                    raw_text: raw_text(&caps),
                    normalized_score: score,
                    confidence: pattern.confidence,
                    format: pattern.format,
                    sub_scores: None,
                });
            }
            log::trace!("Rejected {} candidate '{}'", pattern.format.as_str(), &caps[0]);
        }
    }
    None
}

fn parse_sub_categories(content: &str, profile: &SourceProfile) -> Option<ParsedScore> {
    let mut sub_scores = BTreeMap::new();
    for (name, regex) in &profile.sub_categories {
        let value = regex
            .captures_iter(content)
            .filter_map(|caps| group_f64(&caps, 1))
            .find(|v| (0.0..=10.0).contains(v));
        if let Some(v) = value {
            sub_scores.insert(name.to_string(), v);
        }
    }

    if sub_scores.len() < MIN_SUBCATEGORIES {
        return None;
    }
    let mean = sub_scores.values().sum::<f64>() / sub_scores.len() as f64;
    Some(ParsedScore {
        raw_text: format!("Average of {} categories", sub_scores.len()),
        normalized_score: mean,
        confidence: SUBCATEGORY_CONFIDENCE,
        format: ScoreFormat::Subcategory,
        sub_scores: Some(sub_scores),
    })
}

/// Extract a 0-10 score from review text.
///
/// Tries the hinted source's own patterns, then its sub-category mean,
/// then the universal patterns. No score is a normal outcome.
pub fn parse_score(content: &str, source_hint: &str) -> Option<ParsedScore> {
    if content.trim().is_empty() {
        return None;
    }
    let content = content.to_lowercase();
    let hint = source_hint.to_lowercase();

    if let Some(profile) = SOURCE_PROFILES.iter().find(|p| hint.contains(p.hint)) {
        if let Some(parsed) = first_valid(&content, &profile.patterns) {
            return Some(parsed);
        }
        if let Some(parsed) = parse_sub_categories(&content, profile) {
            return Some(parsed);
        }
    }

    first_valid(&content, &UNIVERSAL_PATTERNS)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-10
    }

    #[test]
    fn test_labelled_letter_grade() {
        let p = parse_score("Rating: B+", "Some Blog").unwrap();
        assert!(approx(p.normalized_score, 8.0));
        assert_eq!(p.format, ScoreFormat::Letter);
        assert!(approx(p.confidence, 0.6));
        assert_eq!(p.raw_text, "b+");
    }

    #[test]
    fn test_letter_grade_needs_label() {
        assert!(parse_score("An A+ effort from start to finish", "").is_none());
        let p = parse_score("Grade: A-. Recommended.", "").unwrap();
        assert!(approx(p.normalized_score, 8.5));
    }

    #[test]
    fn test_article_a_is_not_a_grade() {
        assert!(parse_score("Score: a masterpiece of modern prog", "").is_none());
        assert!(parse_score("Rating: a bit uneven, but worth it", "").is_none());

        let p = parse_score("Final grade: A. Essential listening.", "").unwrap();
        assert!(approx(p.normalized_score, 9.0));
        assert_eq!(p.raw_text, "a");
        let p = parse_score("Grade: A", "").unwrap();
        assert!(approx(p.normalized_score, 9.0));
        let p = parse_score("Rating: B- with a few filler tracks", "").unwrap();
        assert!(approx(p.normalized_score, 6.5));
    }

    #[test]
    fn test_letter_table() {
        assert_eq!(letter_grade_score("a+"), Some(10.0));
        assert_eq!(letter_grade_score("C-"), Some(4.5));
        assert_eq!(letter_grade_score("F"), Some(1.0));
        assert_eq!(letter_grade_score("E"), None);
        assert_eq!(letter_grade_score("F+"), None);
    }

    #[test]
    fn test_sonic_perspectives_overall() {
        let p = parse_score("Overall Score: 8.8 out of 10", "Sonic Perspectives Reviews").unwrap();
        assert!(approx(p.normalized_score, 8.8));
        assert!(approx(p.confidence, 0.95));
        assert_eq!(p.format, ScoreFormat::Decimal);
        assert_eq!(p.raw_text, "8.8 out of 10");
    }

    #[test]
    fn test_sonic_perspectives_plain_out_of_ten() {
        let p = parse_score("We give it 8.5 out of 10.", "Sonic Perspectives").unwrap();
        assert!(approx(p.normalized_score, 8.5));
        assert!(approx(p.confidence, 0.90));
    }

    #[test]
    fn test_out_of_range_candidate_skipped() {
        let text = "Score: 12.5 out of 10 would be absurd, so 8.5 out of 10 it is";
        let p = parse_score(text, "Sonic Perspectives").unwrap();
        assert!(approx(p.normalized_score, 8.5));
        assert!(approx(p.confidence, 0.90));
    }

    #[test]
    fn test_sonic_sub_categories() {
        let text = "Songwriting: 8\nMusicianship: 9/10\nOriginality: 7\nProduction: 8";
        let p = parse_score(text, "Sonic Perspectives").unwrap();
        assert_eq!(p.format, ScoreFormat::Subcategory);
        assert!(approx(p.normalized_score, 8.0));
        assert!(approx(p.confidence, 0.8));
        let subs = p.sub_scores.unwrap();
        assert_eq!(subs.len(), 4);
        assert!(approx(subs["musicianship"], 9.0));
    }

    #[test]
    fn test_single_sub_category_not_enough() {
        assert!(parse_score("Songwriting: 8", "Sonic Perspectives").is_none());
    }

    #[test]
    fn test_sub_categories_only_for_their_source() {
        let text = "Songwriting: 8\nMusicianship: 9";
        assert!(parse_score(text, "Blabbermouth").is_none());
    }

    #[test]
    fn test_prog_report_fractions() {
        let p = parse_score("Verdict: 8/10", "The Prog Report").unwrap();
        assert!(approx(p.normalized_score, 8.0));
        assert!(approx(p.confidence, 0.85));
        assert_eq!(p.raw_text, "8/10");

        let p = parse_score("Verdict: 4/5", "The Prog Report Reviews").unwrap();
        assert!(approx(p.normalized_score, 8.0));
        assert!(approx(p.confidence, 0.80));
    }

    #[test]
    fn test_prog_report_rating_out_of_range_falls_back() {
        let p = parse_score("Rating: 85\nScore: 80%", "The Prog Report").unwrap();
        assert_eq!(p.format, ScoreFormat::Percentage);
        assert!(approx(p.normalized_score, 8.0));
        assert!(approx(p.confidence, 0.6));
    }

    #[test]
    fn test_metal_temple_hundred() {
        let p = parse_score("Final rating 85/100", "Metal Temple").unwrap();
        assert!(approx(p.normalized_score, 8.5));
        assert!(approx(p.confidence, 0.90));
    }

    #[test]
    fn test_ultimate_classic_rock_out_of() {
        let p = parse_score("We rate it 3.5 out of 5", "Ultimate Classic Rock").unwrap();
        assert!(approx(p.normalized_score, 7.0));
        assert_eq!(p.format, ScoreFormat::Fraction);
    }

    #[test]
    fn test_zero_denominator_rejected() {
        assert_eq!(fraction_score(3.0, 0.0), None);
        assert!(parse_score("3 out of 0", "Ultimate Classic Rock").is_none());
    }

    #[test]
    fn test_fraction_capped() {
        assert_eq!(fraction_score(12.0, 10.0), Some(10.0));
    }

    #[test]
    fn test_sea_of_tranquility_stars() {
        let p = parse_score("★★★★", "Sea of Tranquility").unwrap();
        assert!(approx(p.normalized_score, 8.0));
        assert!(approx(p.confidence, 0.85));
        assert_eq!(p.format, ScoreFormat::Stars);
    }

    #[test]
    fn test_universal_patterns() {
        let p = parse_score("Easily 4/5 stars", "").unwrap();
        assert!(approx(p.normalized_score, 8.0));
        assert_eq!(p.format, ScoreFormat::Fraction);

        let p = parse_score("★★★", "").unwrap();
        assert!(approx(p.normalized_score, 6.0));

        let p = parse_score("Rating: Excellent", "").unwrap();
        assert!(approx(p.normalized_score, 9.0));
        assert_eq!(p.format, ScoreFormat::Text);

        let p = parse_score("score: 85%", "").unwrap();
        assert!(approx(p.normalized_score, 8.5));
        assert_eq!(p.raw_text, "85%");
    }

    #[test]
    fn test_dates_are_not_fractions() {
        assert!(parse_score("Released 2022/10 on InsideOut", "").is_none());
    }

    #[test]
    fn test_percentage_over_hundred_rejected() {
        assert!(parse_score("score: 150%", "").is_none());
    }

    #[test]
    fn test_nothing_found() {
        assert!(parse_score("", "Sonic Perspectives").is_none());
        assert!(parse_score("A fine record with no verdict.", "The Prog Report").is_none());
    }

    #[test]
    fn test_confidence_reason_tiers() {
        let mut p = parse_score("Rating: B", "").unwrap();
        assert!(p.confidence_reason().starts_with("Medium"));
        p.confidence = 0.95;
        assert!(p.confidence_reason().starts_with("High"));
        p.confidence = 0.85;
        assert!(p.confidence_reason().starts_with("Good"));
        p.confidence = 0.3;
        assert!(p.confidence_reason().starts_with("Low"));
    }
}
