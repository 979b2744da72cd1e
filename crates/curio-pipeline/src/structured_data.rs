//! JSON-LD extraction from fetched HTML.
//!
//! Pages embed structured data in `<script type="application/ld+json">`
//! blocks. We parse those blocks (bounded), pick entities whose `@type`
//! matches the classified category, and pull out category-specific facts
//! plus a representative image.

use scraper::{Html, Selector};
use serde_json::Value;
use tracing::debug;

use curio_core::{defaults, CardFact, FactSource, LinkCategory};

/// Parse all JSON-LD entities out of an HTML document, flattening `@graph`
/// containers and top-level arrays, capped at a fixed entity count.
pub fn parse_json_ld(html: &str) -> Vec<Value> {
    let document = Html::parse_document(html);
    let selector =
        Selector::parse(r#"script[type="application/ld+json"]"#).expect("static selector");

    let mut entities = Vec::new();
    for script in document.select(&selector) {
        let text: String = script.text().collect();
        let parsed: Value = match serde_json::from_str(text.trim()) {
            Ok(v) => v,
            Err(e) => {
                debug!(error = %e, "Skipping malformed JSON-LD block");
                continue;
            }
        };
        collect_entities(parsed, &mut entities);
        if entities.len() >= defaults::STRUCTURED_DATA_MAX_ENTITIES {
            entities.truncate(defaults::STRUCTURED_DATA_MAX_ENTITIES);
            break;
        }
    }
    entities
}

fn collect_entities(value: Value, out: &mut Vec<Value>) {
    match value {
        Value::Array(items) => {
            for item in items {
                collect_entities(item, out);
            }
        }
        Value::Object(ref obj) => {
            if let Some(graph) = obj.get("@graph").cloned() {
                collect_entities(graph, out);
            } else {
                out.push(value);
            }
        }
        _ => {}
    }
}

/// JSON-LD `@type` values relevant to a classified category.
pub fn relevant_types(category: LinkCategory) -> &'static [&'static str] {
    match category {
        LinkCategory::Book => &["Book", "Audiobook"],
        LinkCategory::Movie => &["Movie"],
        LinkCategory::Tv => &["TVSeries", "TVEpisode", "TVSeason"],
        LinkCategory::Article => &["Article", "BlogPosting", "NewsArticle"],
        LinkCategory::News => &["NewsArticle", "ReportageNewsArticle", "Article"],
        LinkCategory::Podcast => &["PodcastEpisode", "PodcastSeries"],
        LinkCategory::Music => &["MusicRecording", "MusicAlbum", "MusicGroup"],
        LinkCategory::Product => &["Product", "Offer"],
        LinkCategory::Recipe => &["Recipe"],
        LinkCategory::Course => &["Course"],
        LinkCategory::Research => &["ScholarlyArticle", "Article"],
        LinkCategory::Event => &["Event", "MusicEvent", "SportsEvent"],
        LinkCategory::Software => &["SoftwareApplication", "SoftwareSourceCode", "WebApplication"],
        LinkCategory::DesignPortfolio => &["CreativeWork", "VisualArtwork", "WebSite"],
    }
}

/// Whether an entity's `@type` (string or array) matches the category.
pub fn entity_matches(entity: &Value, category: LinkCategory) -> bool {
    let wanted = relevant_types(category);
    match entity.get("@type") {
        Some(Value::String(t)) => wanted.contains(&t.as_str()),
        Some(Value::Array(types)) => types
            .iter()
            .filter_map(Value::as_str)
            .any(|t| wanted.contains(&t)),
        _ => false,
    }
}

/// Extract category-specific facts and a representative image from one
/// matched entity.
pub fn extract_facts(entity: &Value, category: LinkCategory) -> (Vec<CardFact>, Option<String>) {
    let mut facts = Vec::new();
    let mut push = |label: &str, value: Option<String>| {
        if let Some(value) = value {
            if !value.trim().is_empty() {
                facts.push(CardFact::new(label, value.trim(), FactSource::StructuredData));
            }
        }
    };

    match category {
        LinkCategory::Book => {
            push("author", name_list(entity.get("author")));
            push("rating", rating_value(entity));
            push("pages", scalar_string(entity.get("numberOfPages")));
            push("published", scalar_string(entity.get("datePublished")));
            push("isbn", scalar_string(entity.get("isbn")));
        }
        LinkCategory::Movie | LinkCategory::Tv => {
            push("director", name_list(entity.get("director")));
            push("rating", rating_value(entity));
            push("released", scalar_string(entity.get("datePublished")));
            push("duration", scalar_string(entity.get("duration")));
            push("genre", name_list(entity.get("genre")));
        }
        LinkCategory::Recipe => {
            push("total_time", scalar_string(entity.get("totalTime")));
            push("cook_time", scalar_string(entity.get("cookTime")));
            push("yield", scalar_string(entity.get("recipeYield")));
            push(
                "ingredients",
                entity
                    .get("recipeIngredient")
                    .and_then(Value::as_array)
                    .map(|a| a.len().to_string()),
            );
            push("rating", rating_value(entity));
        }
        LinkCategory::Product => {
            push("price", offer_price(entity));
            push("brand", name_list(entity.get("brand")));
            push("rating", rating_value(entity));
        }
        LinkCategory::Article | LinkCategory::News | LinkCategory::Research => {
            push("author", name_list(entity.get("author")));
            push("published", scalar_string(entity.get("datePublished")));
            push("publisher", name_list(entity.get("publisher")));
        }
        LinkCategory::Podcast | LinkCategory::Music => {
            push("artist", name_list(entity.get("byArtist")));
            push("author", name_list(entity.get("author")));
            push("duration", scalar_string(entity.get("duration")));
            push("released", scalar_string(entity.get("datePublished")));
        }
        LinkCategory::Course => {
            push("provider", name_list(entity.get("provider")));
            push("rating", rating_value(entity));
        }
        LinkCategory::Event => {
            push("starts", scalar_string(entity.get("startDate")));
            push("location", name_list(entity.get("location")));
        }
        LinkCategory::Software => {
            push("language", scalar_string(entity.get("programmingLanguage")));
            push("os", scalar_string(entity.get("operatingSystem")));
            push("rating", rating_value(entity));
        }
        LinkCategory::DesignPortfolio => {
            push("creator", name_list(entity.get("creator")));
            push("author", name_list(entity.get("author")));
        }
    }

    (facts, entity_image(entity))
}

/// Merge provider and structured-data facts, deduplicating by
/// `(label, value)`; the first occurrence wins.
pub fn merge_facts(mut facts: Vec<CardFact>, more: Vec<CardFact>) -> Vec<CardFact> {
    for fact in more {
        if !facts
            .iter()
            .any(|f| f.label == fact.label && f.value == fact.value)
        {
            facts.push(fact);
        }
    }
    facts
}

fn scalar_string(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Pull a display name from a string, a `{name}` object, or an array of
/// either, joining multiples with ", ".
fn name_list(value: Option<&Value>) -> Option<String> {
    fn one(v: &Value) -> Option<String> {
        match v {
            Value::String(s) => Some(s.clone()),
            Value::Object(o) => o.get("name").and_then(Value::as_str).map(str::to_string),
            _ => None,
        }
    }
    match value? {
        Value::Array(items) => {
            let names: Vec<String> = items.iter().filter_map(one).collect();
            if names.is_empty() {
                None
            } else {
                Some(names.join(", "))
            }
        }
        other => one(other),
    }
}

fn rating_value(entity: &Value) -> Option<String> {
    scalar_string(entity.get("aggregateRating").and_then(|r| r.get("ratingValue")))
}

fn offer_price(entity: &Value) -> Option<String> {
    let offers = entity.get("offers")?;
    let offer = match offers {
        Value::Array(items) => items.first()?,
        other => other,
    };
    let price = scalar_string(offer.get("price"))?;
    match offer.get("priceCurrency").and_then(Value::as_str) {
        Some(currency) => Some(format!("{} {}", price, currency)),
        None => Some(price),
    }
}

fn entity_image(entity: &Value) -> Option<String> {
    fn one(v: &Value) -> Option<String> {
        match v {
            Value::String(s) => Some(s.clone()),
            Value::Object(o) => o.get("url").and_then(Value::as_str).map(str::to_string),
            _ => None,
        }
    }
    match entity.get("image")? {
        Value::Array(items) => items.iter().find_map(one),
        other => one(other),
    }
}
