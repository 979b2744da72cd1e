//! Content-provider detection and provider-specific fact extraction.
//!
//! Detection maps a URL hostname to a known provider slug, falling back to
//! the bare hostname so downstream consumers always have something to show.
//! Fact routines read the raw selector results captured at link-preview
//! scrape time; they never issue network calls of their own.

use std::collections::BTreeMap;

use serde_json::Value;

use curio_core::{CardFact, FactSource, LinkCategory};

/// Hostname fragments that identify well-known providers.
const KNOWN_PROVIDERS: [(&str, &str); 10] = [
    ("github.com", "github"),
    ("goodreads.com", "goodreads"),
    ("amazon.", "amazon"),
    ("imdb.com", "imdb"),
    ("netflix.com", "netflix"),
    ("youtube.com", "youtube"),
    ("youtu.be", "youtube"),
    ("spotify.com", "spotify"),
    ("etsy.com", "etsy"),
    ("steampowered.com", "steam"),
];

/// Detect the content provider for a URL. An AI-supplied hint wins over
/// hostname matching; an unrecognized hostname falls back to the bare host
/// (minus any `www.` prefix).
pub fn detect_provider(url: &str, hint: Option<&str>) -> Option<String> {
    if let Some(hint) = hint {
        let hint = hint.trim().to_lowercase();
        if !hint.is_empty() {
            return Some(hint);
        }
    }

    let host = url::Url::parse(url).ok()?.host_str()?.to_lowercase();
    let host = host.strip_prefix("www.").unwrap_or(&host).to_string();
    for (fragment, slug) in KNOWN_PROVIDERS {
        // Open-ended fragments ("amazon.") match a whole label at the start
        // of the host or after a dot, covering country TLD variants. Closed
        // fragments must be the host itself or a dot-separated suffix of it.
        let matched = if fragment.ends_with('.') {
            host.starts_with(fragment) || host.contains(&format!(".{fragment}"))
        } else {
            host == fragment || host.ends_with(&format!(".{fragment}"))
        };
        if matched {
            return Some(slug.to_string());
        }
    }
    Some(host)
}

/// Extract facts from raw selector results for a `(provider, category)`
/// pair. Unknown pairs yield nothing.
pub fn provider_facts(
    provider: &str,
    category: LinkCategory,
    raw: &BTreeMap<String, Value>,
) -> Vec<CardFact> {
    let mut facts = Vec::new();
    let mut push = |label: &str, key: &str| {
        if let Some(value) = raw_str(raw, key) {
            facts.push(CardFact::new(label, value, FactSource::Provider));
        }
    };

    match (provider, category) {
        ("github", LinkCategory::Software) => {
            push("stars", "stars");
            push("forks", "forks");
            push("language", "language");
            push("last_updated", "updated");
        }
        ("goodreads", LinkCategory::Book) => {
            push("rating", "rating");
            push("ratings_count", "ratings_count");
            push("pages", "pages");
            push("published", "published");
        }
        ("imdb", LinkCategory::Movie) | ("imdb", LinkCategory::Tv) => {
            push("rating", "rating");
            push("year", "year");
            push("duration", "duration");
        }
        ("amazon", LinkCategory::Product) | ("etsy", LinkCategory::Product) => {
            push("price", "price");
            push("rating", "rating");
        }
        ("spotify", LinkCategory::Music) | ("spotify", LinkCategory::Podcast) => {
            push("artist", "artist");
            push("duration", "duration");
        }
        ("steam", LinkCategory::Software) => {
            push("price", "price");
            push("reviews", "review_summary");
        }
        _ => {}
    }

    facts
}

fn raw_str(raw: &BTreeMap<String, Value>, key: &str) -> Option<String> {
    match raw.get(key)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn known_hosts_map_to_slugs() {
        assert_eq!(
            detect_provider("https://github.com/rust-lang/rust", None).as_deref(),
            Some("github")
        );
        assert_eq!(
            detect_provider("https://www.goodreads.com/book/1", None).as_deref(),
            Some("goodreads")
        );
        assert_eq!(
            detect_provider("https://www.amazon.co.uk/dp/123", None).as_deref(),
            Some("amazon")
        );
        assert_eq!(
            detect_provider("https://youtu.be/abc", None).as_deref(),
            Some("youtube")
        );
    }

    #[test]
    fn lookalike_hosts_do_not_match_known_providers() {
        assert_eq!(
            detect_provider("https://notamazon.com/dp/123", None).as_deref(),
            Some("notamazon.com")
        );
        assert_eq!(
            detect_provider("https://github.com.evil.co/repo", None).as_deref(),
            Some("github.com.evil.co")
        );
        // Subdomains of the real host still match.
        assert_eq!(
            detect_provider("https://gist.github.com/x", None).as_deref(),
            Some("github")
        );
        assert_eq!(
            detect_provider("https://smile.amazon.de/dp/123", None).as_deref(),
            Some("amazon")
        );
    }

    #[test]
    fn unknown_host_falls_back_to_hostname() {
        assert_eq!(
            detect_provider("https://www.example.com/page", None).as_deref(),
            Some("example.com")
        );
    }

    #[test]
    fn hint_overrides_hostname() {
        assert_eq!(
            detect_provider("https://example.com", Some("Goodreads")).as_deref(),
            Some("goodreads")
        );
        // Empty hint falls through to hostname matching.
        assert_eq!(
            detect_provider("https://github.com/x", Some("  ")).as_deref(),
            Some("github")
        );
    }

    #[test]
    fn github_software_facts() {
        let mut raw = BTreeMap::new();
        raw.insert("stars".to_string(), json!("4.2k"));
        raw.insert("language".to_string(), json!("Rust"));
        raw.insert("unrelated".to_string(), json!("ignored"));

        let facts = provider_facts("github", LinkCategory::Software, &raw);
        assert_eq!(facts.len(), 2);
        assert!(facts.iter().all(|f| f.source == FactSource::Provider));
        assert!(facts.iter().any(|f| f.label == "stars" && f.value == "4.2k"));
    }

    #[test]
    fn unknown_pair_yields_nothing() {
        let mut raw = BTreeMap::new();
        raw.insert("rating".to_string(), json!("4.5"));
        assert!(provider_facts("github", LinkCategory::Recipe, &raw).is_empty());
    }
}
