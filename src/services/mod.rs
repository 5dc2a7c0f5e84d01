//! External collaborators of the pipeline.
//!
//! - Feed retrieval and decoding (`FeedSource`, `HttpFeedSource`, `FileFeedSource`)

mod feed;

pub use feed::{FeedSource, FileFeedSource, HttpFeedSource, decode_feed};
