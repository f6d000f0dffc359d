//! Fetcher implementations for the static extraction path.

mod http;

pub use http::HttpFetcher;

pub use crate::traits::fetcher::Fetcher;
