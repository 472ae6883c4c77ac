//! Threat feed acquisition
//!
//! Feeds are read concurrently ([`fanout`]), aggregated into a minimal
//! covering set per community ([`aggregate`]) and merged into a
//! [`Generation`](crate::rib::Generation) by the [`partition`] step.

pub mod aggregate;
pub mod fanout;
pub mod partition;
pub mod reader;

pub use aggregate::aggregate;
pub use fanout::{fetch_feeds, FetchResult};
pub use partition::{build_generation, partition};
pub use reader::{FeedFormat, FeedReader, NetworkTx};

use std::error;
use std::fmt;

/// Failure reading a single feed
///
/// None of these abort a refresh; the feed simply contributes fewer
/// networks for the cycle.
#[derive(Debug)]
pub enum FeedError {
    /// Network or file error. [reason]
    UnreachableSource(String),
    /// Not a local path or http(s) URL. [scheme]
    UnsupportedScheme(String),
    /// Non-2xx HTTP response. [status code]
    BadStatus(u16),
    /// Malformed content. [1-based line, reason]
    DecodeError { line: usize, reason: String },
}

impl fmt::Display for FeedError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("Feed Error: ")?;
        use FeedError::*;
        match self {
            UnreachableSource(r) => write!(f, "Source unreachable [{}]", r),
            UnsupportedScheme(s) => write!(f, "Unsupported scheme '{}'", s),
            BadStatus(code) => write!(f, "Non-OK status code: {}", code),
            DecodeError { line, reason } => write!(f, "Line {} decode [{}]", line, reason),
        }
    }
}

impl error::Error for FeedError {}
