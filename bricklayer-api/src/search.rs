use crate::{Post, ProfileSummary};

/// Queries shorter than this (once trimmed) match nothing
pub const MIN_SEARCH_LEN: usize = 2;

/// Maximum number of results of each kind
pub const SEARCH_LIMIT: usize = 10;

#[derive(Clone, Debug, Default, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct TagName {
    pub name: String,
}

#[derive(Clone, Debug, Default, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct SearchResults {
    pub posts: Vec<Post>,
    pub users: Vec<ProfileSummary>,
    pub tags: Vec<TagName>,
}

impl SearchResults {
    /// Returns the trimmed query if it is long enough to be worth sending
    pub fn normalize_query(query: &str) -> Option<&str> {
        let query = query.trim();
        (query.chars().count() >= MIN_SEARCH_LEN && !query.contains('\0')).then_some(query)
    }

    pub fn is_empty(&self) -> bool {
        self.posts.is_empty() && self.users.is_empty() && self.tags.is_empty()
    }
}
