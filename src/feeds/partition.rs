use std::collections::BTreeMap;
use std::sync::Arc;

use log::debug;

use super::{fetch_feeds, FeedReader};
use crate::config::FeedConfig;
use crate::rib::{Community, Generation, GenerationBuilder};

/// Group feed URLs by effective community, in ascending community order
///
/// Feeds without a community are grouped under the instance blackhole
/// community (`local_as:666`).
pub fn partition(feeds: &[FeedConfig], local_as: u32) -> BTreeMap<Community, Vec<String>> {
    let mut partitions: BTreeMap<Community, Vec<String>> = BTreeMap::new();
    for feed in feeds {
        partitions
            .entry(feed.community.or_blackhole(local_as))
            .or_insert_with(Vec::new)
            .push(feed.url.clone());
    }
    partitions
}

/// Fetch every community's feeds and merge them into a new generation
///
/// Returns the generation and the number of networks fetched before
/// aggregation. Communities are processed one after another; a network
/// described under several communities carries all of them.
pub async fn build_generation(
    reader: &Arc<FeedReader>,
    feeds: &[FeedConfig],
    local_as: u32,
) -> (Generation, usize) {
    let mut builder = GenerationBuilder::new();
    let mut fetched = 0;
    for (community, urls) in partition(feeds, local_as) {
        debug!("Fetching {} feed(s) for {}", urls.len(), community);
        let result = fetch_feeds(reader, community, &urls).await;
        fetched += result.fetched;
        builder.merge(community, result.networks);
    }
    (builder.build(), fetched)
}
