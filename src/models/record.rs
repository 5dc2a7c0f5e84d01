//! Canonical record persisted by the store.

use serde::{Deserialize, Serialize};

/// The normalized, persisted form of one feed entry.
///
/// Field names follow the document layout shared by every store backend.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CanonicalRecord {
    /// Content-addressed identifier, see [`crate::pipeline::assign_id`]
    #[serde(rename = "_id")]
    pub id: String,

    /// Feed title at fetch time
    pub source: String,

    pub title: String,

    pub description: String,

    /// Primary link, empty when the entry had none
    pub link: String,

    /// Publication date, carried verbatim
    pub pub_date: String,

    #[serde(default)]
    pub categories: Vec<Category>,

    /// Set by downstream enrichment, never by ingestion
    #[serde(default)]
    pub geo_located: bool,

    /// Set by downstream enrichment, never by ingestion
    #[serde(default)]
    pub locations: Vec<Location>,
}

impl CanonicalRecord {
    /// Take the ingestion-owned fields from `incoming`, keeping the
    /// enrichment fields already stored in `self`.
    pub fn merge_ingested(&mut self, incoming: CanonicalRecord) {
        let CanonicalRecord {
            id: _,
            source,
            title,
            description,
            link,
            pub_date,
            categories,
            geo_located: _,
            locations: _,
        } = incoming;

        self.source = source;
        self.title = title;
        self.description = description;
        self.link = link;
        self.pub_date = pub_date;
        self.categories = categories;
    }
}

/// A stored `(domain, value)` category pair.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Category {
    pub domain: String,
    pub value: String,
}

/// A place attached to a record by enrichment.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
    pub place_id: String,
}

/// Announcement that a record did not exist before the current pass.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct NewRecordEvent {
    pub id: String,
}

impl NewRecordEvent {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}
