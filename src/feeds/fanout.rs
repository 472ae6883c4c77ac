use std::sync::Arc;

use futures::future::join_all;
use ipnetwork::IpNetwork;
use log::{debug, error, info};
use tokio::sync::mpsc;

use super::{aggregate, FeedReader};
use crate::rib::Community;

// Networks buffered between feed workers and the fan-in
const FAN_IN_CAPACITY: usize = 1024;

/// Minimal covering set for one community's feeds
#[derive(Debug, Default)]
pub struct FetchResult {
    /// Aggregated networks
    pub networks: Vec<IpNetwork>,
    /// Networks decoded across all feeds, before aggregation
    pub fetched: usize,
}

/// Read every feed concurrently and aggregate what they return
///
/// One worker is spawned per feed. A feed that fails is logged and only loses
/// its own (remaining) networks. The fan-in completes once every worker has
/// finished, so aggregation never sees a partial set.
pub async fn fetch_feeds(
    reader: &Arc<FeedReader>,
    community: Community,
    feeds: &[String],
) -> FetchResult {
    let (tx, mut rx) = mpsc::channel(FAN_IN_CAPACITY);

    let workers: Vec<_> = feeds
        .iter()
        .cloned()
        .map(|feed| {
            let reader = Arc::clone(reader);
            let tx = tx.clone();
            tokio::spawn(async move {
                match reader.read(&feed, &tx).await {
                    Ok(count) => info!("Parsed {} [{}]: {} networks", feed, community, count),
                    Err(err) => error!("Error reading {} [{}]: {}", feed, community, err),
                }
            })
        })
        .collect();
    // Fan-in closes once every worker has dropped its sender
    drop(tx);

    let mut networks: Vec<IpNetwork> = Vec::with_capacity(FAN_IN_CAPACITY);
    while let Some(network) = rx.recv().await {
        networks.push(network);
    }
    for result in join_all(workers).await {
        if let Err(err) = result {
            error!("Feed worker for [{}] failed: {}", community, err);
        }
    }

    let fetched = networks.len();
    let networks = aggregate(&networks);
    debug!(
        "[{}] {} networks fetched, {} after aggregation",
        community,
        fetched,
        networks.len()
    );
    FetchResult { networks, fetched }
}
