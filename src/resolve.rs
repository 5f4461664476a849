use crate::data::{
    FALLBACK_CATEGORY, FALLBACK_RATING, FALLBACK_REVIEW_COUNT, PRODUCT_FIXTURES, ProductRecord,
    ResponseTopic,
};

/// Topic rules, checked top to bottom. A query can hit several of these
/// ("best crm" is both crm and best), so the order decides the answer.
pub static TOPIC_RULES: &[(&[&str], ResponseTopic)] = &[
    (
        &["crm", "customer relationship", "sales team", "startup crm"],
        ResponseTopic::Crm,
    ),
    (
        &["compare", "vs", "versus", "difference"],
        ResponseTopic::Compare,
    ),
    (&["best", "top", "recommended", "leading"], ResponseTopic::Best),
    (
        &["alternative", "similar", "like", "instead of"],
        ResponseTopic::Alternatives,
    ),
    (&["review", "rating", "rated"], ResponseTopic::Reviews),
];

/// Returns the first fixture whose key occurs in the query, or a synthesized
/// listing built from the query itself.
pub fn resolve_product(query: &str) -> ProductRecord {
    let lowered = query.to_lowercase();
    if let Some(fixture) = PRODUCT_FIXTURES
        .iter()
        .find(|fixture| lowered.contains(fixture.key))
    {
        return fixture.to_record();
    }
    synthesize_product(query)
}

fn synthesize_product(query: &str) -> ProductRecord {
    let name = title_case(query);
    ProductRecord {
        description: format!(
            "Find verified user reviews, pricing, and alternatives for {name} on G2."
        ),
        name,
        category: FALLBACK_CATEGORY.to_string(),
        rating: FALLBACK_RATING,
        review_count: FALLBACK_REVIEW_COUNT,
        badge: None,
    }
}

pub fn resolve_topic(query: &str) -> ResponseTopic {
    let lowered = query.to_lowercase();
    TOPIC_RULES
        .iter()
        .find(|(needles, _)| needles.iter().any(|needle| lowered.contains(needle)))
        .map(|(_, topic)| *topic)
        .unwrap_or(ResponseTopic::Default)
}

pub fn resolve_response(query: &str) -> &'static str {
    resolve_topic(query).text()
}

/// Capitalizes each whitespace-separated token that starts with a word
/// character and lower-cases the rest of it.
pub fn title_case(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_token = false;
    for ch in text.chars() {
        if ch.is_whitespace() {
            in_token = false;
            out.push(ch);
        } else if in_token {
            out.extend(ch.to_lowercase());
        } else if ch.is_alphanumeric() || ch == '_' {
            in_token = true;
            out.extend(ch.to_uppercase());
        } else {
            out.push(ch);
        }
    }
    out
}
