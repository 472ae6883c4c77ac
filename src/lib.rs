//! Announce networks from threat feeds as BGP blackhole routes
//!
//! Feeds (local files or http(s) URLs) are fetched on a schedule and
//! aggregated into a [`rib::Generation`]. Each new generation is diffed
//! against the last one applied and only the changes are handed to a
//! [`speaker::RouteSpeaker`].

pub mod announcer;
pub mod config;
pub mod feeds;
pub mod handler;
pub mod rib;
pub mod speaker;
pub mod utils;

pub use config::{ServerConfig, SpeakerKind};
pub use handler::{RefreshError, RefreshSummary, Refresher};
