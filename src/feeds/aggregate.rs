//! Adapter over the `ipnet` aggregation engine

use ipnet::IpNet;
use ipnetwork::IpNetwork;

/// Reduce networks to their minimal covering set
///
/// Duplicates and subsumed prefixes are dropped and adjacent prefixes of the
/// same size are merged into their supernet, e.g.
/// [10.0.0.0/25, 10.0.0.128/25, 10.0.0.7/32] -> [10.0.0.0/24]
pub fn aggregate(networks: &[IpNetwork]) -> Vec<IpNetwork> {
    let nets: Vec<IpNet> = networks
        .iter()
        .filter_map(|n| IpNet::new(n.ip(), n.prefix()).ok())
        .collect();
    IpNet::aggregate(&nets)
        .into_iter()
        .filter_map(|n| IpNetwork::new(n.addr(), n.prefix_len()).ok())
        .collect()
}
