//! Raw entry to canonical record mapping.

use crate::models::{CanonicalRecord, Category, RawEntry};

use super::identity::assign_id;

/// Map a feed entry into its canonical record.
///
/// Never fails: missing fields come through as empty strings.
pub fn normalize(entry: &RawEntry, source: &str) -> CanonicalRecord {
    let link = entry.primary_link().to_string();

    CanonicalRecord {
        id: assign_id(&entry.guid, &link, &entry.pub_date),
        source: source.to_string(),
        title: decode_entities(&entry.title),
        description: decode_entities(&entry.description),
        link,
        pub_date: entry.pub_date.clone(),
        categories: entry
            .categories
            .iter()
            .map(|c| Category {
                domain: c.domain.clone(),
                value: c.value.clone(),
            })
            .collect(),
        geo_located: false,
        locations: Vec::new(),
    }
}

fn decode_entities(text: &str) -> String {
    html_escape::decode_html_entities(text).into_owned()
}
