pub mod community;
pub mod families;

pub use community::{Community, CommunitySet};
pub use families::Family;

use std::collections::{btree_map, BTreeMap, BTreeSet};
use std::fmt;
use std::iter::FromIterator;

use chrono::{DateTime, Utc};
use ipnetwork::IpNetwork;

use crate::utils::format_time_as_elapsed;

/// One complete snapshot of network -> communities, produced by a refresh cycle
///
/// A `Generation` can't be changed once built; refreshes build a new one with a
/// [`GenerationBuilder`] and diff it against the previous snapshot.
#[derive(Debug)]
pub struct Generation {
    networks: BTreeMap<IpNetwork, CommunitySet>,
    built: DateTime<Utc>,
}

impl Generation {
    /// Empty generation, the baseline before the first refresh
    pub fn new() -> Self {
        Self {
            networks: BTreeMap::new(),
            built: Utc::now(),
        }
    }

    pub fn len(&self) -> usize {
        self.networks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.networks.is_empty()
    }

    pub fn get(&self, network: &IpNetwork) -> Option<&CommunitySet> {
        self.networks.get(network)
    }

    pub fn contains(&self, network: &IpNetwork) -> bool {
        self.networks.contains_key(network)
    }

    pub fn iter(&self) -> btree_map::Iter<IpNetwork, CommunitySet> {
        self.networks.iter()
    }

    /// Compare this (previous) generation with `current`
    pub fn diff(&self, current: &Generation) -> Diff {
        diff(self, current)
    }

    /// This generation with `diff` applied on top
    ///
    /// Used to record what a speaker actually accepted when only part of a
    /// diff went through.
    pub fn patched(&self, diff: &Diff) -> Generation {
        let mut networks = self.networks.clone();
        for (network, communities) in &diff.announce {
            networks.insert(*network, communities.clone());
        }
        for network in &diff.withdraw {
            networks.remove(network);
        }
        Generation {
            networks,
            built: Utc::now(),
        }
    }
}

impl Default for Generation {
    fn default() -> Self {
        Self::new()
    }
}

impl FromIterator<(IpNetwork, Community)> for Generation {
    fn from_iter<I: IntoIterator<Item = (IpNetwork, Community)>>(iter: I) -> Self {
        let mut builder = GenerationBuilder::new();
        for (network, community) in iter {
            builder.insert(network, community);
        }
        builder.build()
    }
}

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "<Generation networks={} age={}>",
            self.networks.len(),
            format_time_as_elapsed(self.built),
        )
    }
}

/// Collects networks per community while a refresh is in flight
#[derive(Debug, Default)]
pub struct GenerationBuilder {
    networks: BTreeMap<IpNetwork, CommunitySet>,
}

impl GenerationBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tag a network with a community, keeping any tags it already has
    pub fn insert(&mut self, network: IpNetwork, community: Community) {
        self.networks
            .entry(network)
            .or_insert_with(CommunitySet::new)
            .insert(community);
    }

    /// Merge a community's minimal set into the generation
    pub fn merge<I>(&mut self, community: Community, networks: I)
    where
        I: IntoIterator<Item = IpNetwork>,
    {
        for network in networks {
            self.insert(network, community);
        }
    }

    pub fn build(self) -> Generation {
        Generation {
            networks: self.networks,
            built: Utc::now(),
        }
    }
}

/// Changes needed to move the speaker from one generation to the next
#[derive(Debug, Default, PartialEq)]
pub struct Diff {
    /// New networks, or networks whose communities changed
    pub announce: BTreeMap<IpNetwork, CommunitySet>,
    /// Networks no longer present
    pub withdraw: BTreeSet<IpNetwork>,
}

impl Diff {
    pub fn is_empty(&self) -> bool {
        self.announce.is_empty() && self.withdraw.is_empty()
    }
}

impl fmt::Display for Diff {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "<Diff announce={} withdraw={}>",
            self.announce.len(),
            self.withdraw.len()
        )
    }
}

/// Partition two generations into announce and withdraw sets
///
/// A network present in both with the same communities produces nothing. A
/// community change is a single announce carrying the new communities.
pub fn diff(previous: &Generation, current: &Generation) -> Diff {
    let announce = current
        .iter()
        .filter(|(network, communities)| previous.get(network) != Some(*communities))
        .map(|(network, communities)| (*network, communities.clone()))
        .collect();
    let withdraw = previous
        .iter()
        .map(|(network, _)| network)
        .filter(|network| !current.contains(network))
        .cloned()
        .collect();
    Diff { announce, withdraw }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn net(value: &str) -> IpNetwork {
        value.parse().unwrap()
    }

    #[test]
    fn test_first_refresh() {
        let previous = Generation::new();
        let current: Generation = vec![(net("10.0.0.0/24"), Community::blackhole(64512))]
            .into_iter()
            .collect();
        let diff = previous.diff(&current);
        assert_eq!(diff.announce.len(), 1);
        assert_eq!(
            diff.announce[&net("10.0.0.0/24")].to_string(),
            "64512:666"
        );
        assert!(diff.withdraw.is_empty());
    }

    #[test]
    fn test_community_change() {
        let (a, b) = (Community::new(64512, 666), Community::new(64512, 100));
        let previous: Generation = vec![(net("10.0.0.0/24"), a)].into_iter().collect();
        let current: Generation = vec![(net("10.0.0.0/24"), b)].into_iter().collect();
        let diff = diff(&previous, &current);
        assert_eq!(diff.announce.len(), 1);
        assert!(diff.announce[&net("10.0.0.0/24")].contains(b));
        assert!(!diff.announce[&net("10.0.0.0/24")].contains(a));
        assert!(diff.withdraw.is_empty());
    }

    #[test]
    fn test_withdraw_and_unchanged() {
        let comm = Community::blackhole(65000);
        let previous: Generation = vec![
            (net("10.0.0.0/24"), comm),
            (net("192.0.2.0/24"), comm),
            (net("2001:db8::/32"), comm),
        ]
        .into_iter()
        .collect();
        let current: Generation = vec![(net("10.0.0.0/24"), comm), (net("198.51.100.0/24"), comm)]
            .into_iter()
            .collect();
        let diff = previous.diff(&current);
        assert_eq!(
            diff.announce.keys().cloned().collect::<Vec<_>>(),
            vec![net("198.51.100.0/24")]
        );
        assert_eq!(
            diff.withdraw.iter().cloned().collect::<Vec<_>>(),
            vec![net("192.0.2.0/24"), net("2001:db8::/32")]
        );
    }

    #[test]
    fn test_union_of_communities() {
        let mut builder = GenerationBuilder::new();
        builder.merge(Community::new(65000, 100), vec![net("10.0.0.0/24")]);
        builder.merge(
            Community::new(65000, 200),
            vec![net("10.0.0.0/24"), net("10.1.0.0/16")],
        );
        let generation = builder.build();
        assert_eq!(generation.len(), 2);
        assert_eq!(
            generation.get(&net("10.0.0.0/24")).unwrap().to_string(),
            "65000:100 65000:200"
        );
        assert_eq!(
            generation.get(&net("10.1.0.0/16")).unwrap().to_string(),
            "65000:200"
        );
    }

    #[test]
    fn test_community_order_is_irrelevant() {
        let (a, b) = (Community::new(1, 1), Community::new(2, 2));
        let previous: Generation = vec![(net("10.0.0.0/8"), a), (net("10.0.0.0/8"), b)]
            .into_iter()
            .collect();
        let current: Generation = vec![(net("10.0.0.0/8"), b), (net("10.0.0.0/8"), a)]
            .into_iter()
            .collect();
        assert!(previous.diff(&current).is_empty());
    }

    #[test]
    fn test_patched_with_partial_diff() {
        let comm = Community::blackhole(64512);
        let previous: Generation = vec![(net("10.0.0.0/24"), comm), (net("10.9.0.0/16"), comm)]
            .into_iter()
            .collect();
        let mut partial = Diff::default();
        partial
            .announce
            .insert(net("10.1.0.0/24"), vec![comm].into_iter().collect());
        partial.withdraw.insert(net("10.9.0.0/16"));

        let patched = previous.patched(&partial);
        assert_eq!(
            patched.iter().map(|(n, _)| *n).collect::<Vec<_>>(),
            vec![net("10.0.0.0/24"), net("10.1.0.0/24")]
        );
        // The source generation is untouched
        assert_eq!(previous.len(), 2);
        assert!(previous.contains(&net("10.9.0.0/16")));
    }

    fn network_strategy() -> impl Strategy<Value = IpNetwork> {
        prop_oneof![
            (any::<u8>(), any::<u8>(), 8u8..=32).prop_map(|(a, b, len)| {
                crate::utils::parse_network(&format!("{}.{}.0.0/{}", a, b, len)).unwrap()
            }),
            (any::<u16>(), 16u8..=64).prop_map(|(a, len)| {
                crate::utils::parse_network(&format!("2001:{:x}::/{}", a, len)).unwrap()
            }),
        ]
    }

    fn community_strategy() -> impl Strategy<Value = Community> {
        (64512u16..64516, prop_oneof![Just(666u16), Just(100u16)])
            .prop_map(|(upper, lower)| Community::new(upper, lower))
    }

    fn generation_strategy() -> impl Strategy<Value = Generation> {
        prop::collection::vec((network_strategy(), community_strategy()), 0..40)
            .prop_map(|entries| entries.into_iter().collect())
    }

    proptest! {
        #[test]
        fn prop_diff_is_idempotent(generation in generation_strategy()) {
            prop_assert!(generation.diff(&generation).is_empty());
        }

        #[test]
        fn prop_diff_is_complete(
            previous in generation_strategy(),
            current in generation_strategy()
        ) {
            let diff = previous.diff(&current);
            for (network, communities) in current.iter() {
                let changed = previous.get(network) != Some(communities);
                prop_assert_eq!(diff.announce.get(network).is_some(), changed);
                if changed {
                    prop_assert_eq!(&diff.announce[network], communities);
                }
            }
            for (network, _) in previous.iter() {
                prop_assert_eq!(diff.withdraw.contains(network), !current.contains(network));
            }
            for network in diff.withdraw.iter() {
                prop_assert!(!diff.announce.contains_key(network));
                prop_assert!(previous.contains(network));
            }
            for network in diff.announce.keys() {
                prop_assert!(current.contains(network));
            }
        }

        #[test]
        fn prop_first_refresh_announces_everything(current in generation_strategy()) {
            let diff = Generation::new().diff(&current);
            prop_assert_eq!(diff.announce.len(), current.len());
            prop_assert!(diff.withdraw.is_empty());
        }
    }
}
