//! Search, filter and ordering rules for story listings.
//!
//! The backend and the offline cache both answer "search", "popular",
//! "recent" and "by owner" queries; they go through these functions so a
//! listing looks the same whichever store served it.

use std::cmp::Reverse;

use serde::{Deserialize, Serialize};

use crate::models::Story;

/// Structured filters accepted by story search.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchFilters {
    /// Matches stories carrying ANY of these tags. Empty = no tag filter.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Exact author display name.
    #[serde(default)]
    pub author: Option<String>,
    /// Inclusive lower bound on `character_count`.
    #[serde(default)]
    pub min_characters: Option<usize>,
    /// Inclusive upper bound on `character_count`.
    #[serde(default)]
    pub max_characters: Option<usize>,
}

impl SearchFilters {
    /// The canonical form both stores evaluate.
    ///
    /// Tags are split on commas, trimmed and deduplicated, because the
    /// query-string form can only carry them comma-joined. An empty author
    /// means "any author".
    pub fn normalized(&self) -> SearchFilters {
        let mut tags: Vec<String> = Vec::new();
        for tag in self.tags.iter().flat_map(|t| split_tags(t)) {
            if !tags.contains(&tag) {
                tags.push(tag);
            }
        }

        SearchFilters {
            tags,
            author: self.author.clone().filter(|a| !a.is_empty()),
            min_characters: self.min_characters,
            max_characters: self.max_characters,
        }
    }
}

fn split_tags(raw: &str) -> impl Iterator<Item = String> + '_ {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
}

/// Query-string form of a search, shared by the HTTP client and server.
///
/// Tags travel comma-separated (`tags=a,b`) because the url-encoded form
/// has no repeated-key arrays.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchQuery {
    #[serde(default)]
    pub q: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_characters: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_characters: Option<usize>,
}

impl SearchQuery {
    pub fn from_parts(text: &str, filters: &SearchFilters) -> Self {
        let filters = filters.normalized();
        Self {
            q: text.to_string(),
            tags: (!filters.tags.is_empty()).then(|| filters.tags.join(",")),
            author: filters.author.clone(),
            min_characters: filters.min_characters,
            max_characters: filters.max_characters,
        }
    }

    pub fn into_parts(self) -> (String, SearchFilters) {
        let filters = SearchFilters {
            tags: self.tags.into_iter().collect(),
            author: self.author,
            min_characters: self.min_characters,
            max_characters: self.max_characters,
        };
        (self.q, filters.normalized())
    }
}

/// Whether `story` matches the free-text query and every filter. `filters`
/// must already be [normalized](SearchFilters::normalized).
fn matches(story: &Story, text: &str, filters: &SearchFilters) -> bool {
    let needle = text.trim().to_lowercase();
    if !needle.is_empty() {
        let hit = story.title.to_lowercase().contains(&needle)
            || story.content.to_lowercase().contains(&needle)
            || story
                .tags
                .iter()
                .any(|tag| tag.to_lowercase().contains(&needle));
        if !hit {
            return false;
        }
    }

    if !filters.tags.is_empty() && !filters.tags.iter().any(|t| story.tags.contains(t)) {
        return false;
    }

    if let Some(author) = &filters.author {
        if &story.author != author {
            return false;
        }
    }

    if filters
        .min_characters
        .is_some_and(|min| story.character_count < min)
    {
        return false;
    }
    if filters
        .max_characters
        .is_some_and(|max| story.character_count > max)
    {
        return false;
    }

    true
}

fn newest_first(stories: &mut [Story]) {
    stories.sort_by_key(|s| Reverse(s.created_at));
}

/// Stories matching `text` and `filters`, newest first.
pub fn search(stories: Vec<Story>, text: &str, filters: &SearchFilters) -> Vec<Story> {
    let filters = &filters.normalized();
    let mut hits: Vec<Story> = stories
        .into_iter()
        .filter(|s| matches(s, text, filters))
        .collect();
    newest_first(&mut hits);
    hits
}

/// Longest stories first (ties: newest first), at most `limit`.
pub fn popular(mut stories: Vec<Story>, limit: usize) -> Vec<Story> {
    stories.sort_by_key(|s| (Reverse(s.character_count), Reverse(s.created_at)));
    stories.truncate(limit);
    stories
}

/// Newest stories first, at most `limit`.
pub fn recent(mut stories: Vec<Story>, limit: usize) -> Vec<Story> {
    newest_first(&mut stories);
    stories.truncate(limit);
    stories
}

/// Stories owned by `user_id`, newest first.
pub fn by_owner(stories: Vec<Story>, user_id: &str) -> Vec<Story> {
    let mut owned: Vec<Story> = stories.into_iter().filter(|s| s.user_id == user_id).collect();
    newest_first(&mut owned);
    owned
}
