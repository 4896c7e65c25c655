//! Feed ingestion: fetch subscribed RSS feeds and store the magnet links they announce

pub mod parser;
pub mod refresher;

pub use parser::parse_channel;
pub use refresher::FeedRefresher;
