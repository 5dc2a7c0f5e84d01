//! Feed data as delivered by a feed source.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// A decoded feed: the channel title and its entries.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Feed {
    /// Channel title, used as the `source` of every record
    pub title: String,

    /// Channel description
    pub description: String,

    /// Entries in document order
    pub entries: Vec<RawEntry>,
}

impl Feed {
    /// Primary links of all entries, skipping entries without one.
    pub fn all_links(&self) -> Vec<String> {
        self.entries
            .iter()
            .map(RawEntry::primary_link)
            .filter(|link| !link.is_empty())
            .map(str::to_string)
            .collect()
    }
}

/// A single feed entry before normalization.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RawEntry {
    pub title: String,

    /// All `<link>` values; the first one is the primary link
    pub links: Vec<String>,

    pub description: String,

    /// Publication date, verbatim
    pub pub_date: String,

    /// Globally unique identifier, empty when the feed has none
    pub guid: String,

    pub categories: Vec<RawCategory>,
}

impl RawEntry {
    /// First link of the entry, or an empty string.
    pub fn primary_link(&self) -> &str {
        self.links.first().map(String::as_str).unwrap_or("")
    }

    /// Whether any category carries the given value.
    pub fn has_category(&self, value: &str) -> bool {
        self.categories.iter().any(|c| c.value == value)
    }

    /// Distinct category domains, sorted.
    pub fn category_domains(&self) -> Vec<String> {
        self.categories
            .iter()
            .map(|c| c.domain.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }
}

/// A `(domain, value)` category pair as found in the feed.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RawCategory {
    pub domain: String,
    pub value: String,
}

impl RawCategory {
    pub fn new(domain: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            value: value.into(),
        }
    }
}
