//! Application Services
//!
//! - `ChartFeed`: history loading, live bar subscriptions and trade markers
//!   for one charted instrument

mod chart_feed;

pub use chart_feed::{ChartFeed, ChartFeedConfig, FeedError};
