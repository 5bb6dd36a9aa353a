//! Keyword ranking for search-mode views.
//!
//! Score is token overlap between the query and a tool's name and
//! description, with name matches weighted higher. Ties break by name, so
//! identical queries over an unchanged catalog always rank the same way.

use std::collections::HashSet;

use serde::Serialize;

pub const DEFAULT_SEARCH_LIMIT: usize = 10;

const NAME_WEIGHT: u32 = 3;
const DESCRIPTION_WEIGHT: u32 = 1;
/// Bonus when the whole normalized query appears in the tool name.
const PHRASE_BONUS: u32 = 2;

/// A catalog item as reported to search callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchHit {
    pub name: String,
    pub description: String,
    pub server: String,
}

fn normalize(token: &str) -> String {
    let lower = token.to_lowercase();
    match lower.strip_suffix('s') {
        Some(stem) if stem.len() >= 3 && !stem.ends_with('s') => stem.to_string(),
        _ => lower,
    }
}

/// Split on anything that is not alphanumeric; `read_file` yields `read`, `file`.
fn tokenize(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.len() >= 2)
        .map(normalize)
        .collect()
}

pub fn score(query: &str, name: &str, description: &str) -> u32 {
    let query_tokens = tokenize(query);
    if query_tokens.is_empty() {
        return 0;
    }
    let name_tokens = tokenize(name);
    let description_tokens = tokenize(description);

    let mut total = 0;
    for token in &query_tokens {
        if name_tokens.contains(token) {
            total += NAME_WEIGHT;
        }
        if description_tokens.contains(token) {
            total += DESCRIPTION_WEIGHT;
        }
    }

    let joined_query: String = query
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.len() >= 2)
        .map(normalize)
        .collect::<Vec<_>>()
        .join("_");
    if total > 0 && !joined_query.is_empty() && normalize_name(name).contains(&joined_query) {
        total += PHRASE_BONUS;
    }
    total
}

fn normalize_name(name: &str) -> String {
    name.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(normalize)
        .collect::<Vec<_>>()
        .join("_")
}

/// Rank `hits` for `query`. An empty query lists the catalog in name order.
/// Non-empty queries drop tools that match nothing.
pub fn rank(hits: &[SearchHit], query: &str, limit: usize) -> Vec<SearchHit> {
    let query = query.trim();
    let mut scored: Vec<(u32, &SearchHit)> = if query.is_empty() {
        hits.iter().map(|h| (0, h)).collect()
    } else {
        hits.iter()
            .map(|h| (score(query, &h.name, &h.description), h))
            .filter(|(s, _)| *s > 0)
            .collect()
    };

    scored.sort_by(|(sa, a), (sb, b)| {
        sb.cmp(sa)
            .then_with(|| a.name.cmp(&b.name))
            .then_with(|| a.server.cmp(&b.server))
    });
    scored
        .into_iter()
        .take(limit)
        .map(|(_, h)| h.clone())
        .collect()
}
