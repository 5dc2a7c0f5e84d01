//! Content-addressed record identifiers.

use sha1::{Digest, Sha1};

/// Derive the record id for an entry.
///
/// The id is the lowercase hex SHA-1 of `guid + link + pub_date`, or of
/// `link + pub_date` when the guid is blank. Inputs are hashed exactly as
/// given: no trimming, case folding or reordering.
pub fn assign_id(guid: &str, link: &str, pub_date: &str) -> String {
    let mut hasher = Sha1::new();
    if !guid.trim().is_empty() {
        hasher.update(guid.as_bytes());
    }
    hasher.update(link.as_bytes());
    hasher.update(pub_date.as_bytes());
    hex::encode(hasher.finalize())
}

/// Whether an entry carries nothing identifying beyond its date.
pub fn is_degenerate(guid: &str, link: &str) -> bool {
    guid.trim().is_empty() && link.is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_digests() {
        assert_eq!(
            assign_id("", "https://x/1", "2024-01-01"),
            "071864e31d91cce803dedabcc35355ad8cd5c3df"
        );
        assert_eq!(
            assign_id("g1", "https://x/1", "2024-01-01"),
            "12b7e93d0aec9c3e3ffd031d17e45b80e5368dd3"
        );
    }

    #[test]
    fn test_empty_inputs_hash_empty_string() {
        assert_eq!(
            assign_id("", "", ""),
            "da39a3ee5e6b4b0d3255bfef95601890afd80709"
        );
    }

    #[test]
    fn test_blank_guid_is_ignored() {
        assert_eq!(
            assign_id("   ", "https://x/1", "2024-01-01"),
            assign_id("", "https://x/1", "2024-01-01")
        );
    }

    #[test]
    fn test_deterministic_and_input_sensitive() {
        let base = assign_id("g", "https://x/1", "2024-01-01");
        assert_eq!(base, assign_id("g", "https://x/1", "2024-01-01"));

        let variants = [
            assign_id("h", "https://x/1", "2024-01-01"),
            assign_id("g", "https://x/2", "2024-01-01"),
            assign_id("g", "https://x/1", "2024-01-02"),
            assign_id("g", "https://x/1 ", "2024-01-01"),
        ];
        for v in variants {
            assert_ne!(v, base);
        }
    }

    #[test]
    fn test_degenerate() {
        assert!(is_degenerate("", ""));
        assert!(is_degenerate("  ", ""));
        assert!(!is_degenerate("g", ""));
        assert!(!is_degenerate("", "https://x"));
    }
}
