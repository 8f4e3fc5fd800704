use crate::db::models::ContentType;

/// Classify an article from its title and URL.
///
/// Tiered: first match wins (URL path → review words → interview →
/// premiere → album of the day → best-of lists → news).
pub fn classify_content_type(title: &str, url: &str) -> ContentType {
    let title_lower = title.to_lowercase();
    let url_lower = url.to_lowercase();
    let title_has = |words: &[&str]| words.iter().any(|w| title_lower.contains(w));

    // Tier 1: Review sections on sites that don't say "review" in titles
    const REVIEW_PATHS: &[&str] = &["/review/", "/reviews/", "/album-review", "review.php"];
    if REVIEW_PATHS.iter().any(|p| url_lower.contains(p)) {
        return ContentType::Review;
    }

    // Tier 2
    if title_has(&["review", "rating", "score"]) {
        return ContentType::Review;
    }

    // Tier 3
    if title_has(&["interview", "talks", "speaks", "discusses"]) {
        return ContentType::Interview;
    }

    // Tier 4
    if title_has(&["premiere", "debuts", "releases", "unveils"]) {
        return ContentType::Premiere;
    }

    // Tier 5
    if title_has(&["album of the day", "aotd"]) {
        return ContentType::AlbumOfDay;
    }

    // Tier 6
    if title_has(&["best of", "top 10", "top albums", "best albums", "best progressive"]) {
        return ContentType::BestOf;
    }

    ContentType::News
}
