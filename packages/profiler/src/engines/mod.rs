//! Bundled capability implementations that need more than a thin HTTP call.

pub mod http_crawler;

pub use http_crawler::HttpCrawlerEngine;
