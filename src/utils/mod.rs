//! Utility functions and helpers.

pub mod http;

use url::Url;

/// Whether a feed location should be fetched over HTTP rather than read from disk.
pub fn is_remote(location: &str) -> bool {
    Url::parse(location)
        .map(|u| matches!(u.scheme(), "http" | "https"))
        .unwrap_or(false)
}

/// Extract the host from a URL string.
pub fn get_domain(url_str: &str) -> Option<String> {
    Url::parse(url_str)
        .ok()
        .and_then(|u| u.host_str().map(|s| s.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_remote() {
        assert!(is_remote("https://feeds.bbci.co.uk/news/world/rss.xml"));
        assert!(is_remote("http://localhost:8080/rss"));
        assert!(!is_remote("fixtures/world.xml"));
        assert!(!is_remote("/tmp/world.xml"));
        assert!(!is_remote("file:///tmp/world.xml"));
    }

    #[test]
    fn test_get_domain() {
        assert_eq!(
            get_domain("https://feeds.bbci.co.uk/news/world/rss.xml"),
            Some("feeds.bbci.co.uk".to_string())
        );
        assert_eq!(get_domain("world.xml"), None);
    }
}
