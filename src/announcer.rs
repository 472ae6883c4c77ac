//! Translate generation diffs into speaker paths

use std::net::{IpAddr, Ipv4Addr};

use bgp_rs::{MPReachNLRI, NLRIEncoding, Origin, PathAttribute, AFI, SAFI};
use ipnetwork::IpNetwork;
use log::trace;

use crate::rib::{CommunitySet, Diff, Family};
use crate::speaker::{Path, RouteSpeaker, SpeakerError};
use crate::utils::prefix_from_network;

/// A diff the speaker stopped accepting part way through
#[derive(Debug)]
pub struct Rejected {
    /// Paths the speaker accepted before the failure
    pub applied: Diff,
    pub error: SpeakerError,
}

/// Submits announce/withdraw paths to a [`RouteSpeaker`], using the router-id
/// as next hop (IPv4-mapped for IPv6 networks)
pub struct Announcer<S> {
    router_id: Ipv4Addr,
    speaker: S,
}

impl<S> Announcer<S>
where
    S: RouteSpeaker,
{
    pub fn new(router_id: Ipv4Addr, speaker: S) -> Self {
        Self { router_id, speaker }
    }

    pub fn speaker(&self) -> &S {
        &self.speaker
    }

    pub fn speaker_mut(&mut self) -> &mut S {
        &mut self.speaker
    }

    pub async fn announce(
        &mut self,
        network: IpNetwork,
        communities: &CommunitySet,
    ) -> Result<(), SpeakerError> {
        let path = self.build_path(network, Some(communities));
        trace!("Submitting {}", path);
        self.speaker.add_path(path).await
    }

    pub async fn withdraw(&mut self, network: IpNetwork) -> Result<(), SpeakerError> {
        let path = self.build_path(network, None);
        trace!("Submitting {}", path);
        self.speaker.add_path(path).await
    }

    /// Submit every announce, then every withdraw, in prefix order
    ///
    /// Stops at the first rejected path, reporting what was accepted before
    /// it. Returns (announced, withdrawn).
    pub async fn apply(&mut self, diff: &Diff) -> Result<(usize, usize), Rejected> {
        let mut applied = Diff::default();
        for (network, communities) in &diff.announce {
            if let Err(error) = self.announce(*network, communities).await {
                return Err(Rejected { applied, error });
            }
            applied.announce.insert(*network, communities.clone());
        }
        for network in &diff.withdraw {
            if let Err(error) = self.withdraw(*network).await {
                return Err(Rejected { applied, error });
            }
            applied.withdraw.insert(*network);
        }
        Ok((diff.announce.len(), diff.withdraw.len()))
    }

    /// Withdraws carry no communities
    fn build_path(&self, network: IpNetwork, communities: Option<&CommunitySet>) -> Path {
        let family = Family::for_network(&network);
        let mut attributes: Vec<PathAttribute> = Vec::with_capacity(3);
        attributes.push(PathAttribute::ORIGIN(Origin::IGP));
        if family.is_ipv6() {
            attributes.push(PathAttribute::MP_REACH_NLRI(MPReachNLRI {
                afi: AFI::IPV6,
                safi: SAFI::Unicast,
                next_hop: self.router_id.to_ipv6_mapped().octets().to_vec(),
                announced_routes: vec![NLRIEncoding::IP(prefix_from_network(&network))],
            }));
        } else {
            attributes.push(PathAttribute::NEXT_HOP(IpAddr::V4(self.router_id)));
        }
        if let Some(communities) = communities {
            let standard = communities.standard();
            if !standard.is_empty() {
                attributes.push(PathAttribute::COMMUNITY(standard));
            }
        }
        Path {
            family,
            network,
            attributes,
            withdraw: communities.is_none(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rib::{Community, Generation};
    use crate::speaker::DryRun;
    use async_trait::async_trait;

    fn announcer() -> Announcer<DryRun> {
        Announcer::new(Ipv4Addr::new(192, 0, 2, 1), DryRun::new())
    }

    fn net(value: &str) -> IpNetwork {
        value.parse().unwrap()
    }

    #[tokio::test]
    async fn test_announce_ipv4() {
        let mut announcer = announcer();
        let communities: CommunitySet = vec![Community::new(64512, 666)].into_iter().collect();
        announcer.announce(net("10.0.0.0/24"), &communities).await.unwrap();

        let path = announcer.speaker().get(&net("10.0.0.0/24")).unwrap();
        assert_eq!(path.family, Family::new(AFI::IPV4, SAFI::Unicast));
        assert!(!path.withdraw);
        assert_eq!(path.next_hop(), Some("192.0.2.1".parse().unwrap()));
        assert_eq!(path.communities(), vec![64512 << 16 ^ 666]);
        assert!(matches!(path.origin(), Some(Origin::IGP)));
    }

    #[tokio::test]
    async fn test_announce_ipv6() {
        let mut announcer = announcer();
        let communities: CommunitySet = vec![Community::new(64512, 666)].into_iter().collect();
        announcer.announce(net("2001:db8::/64"), &communities).await.unwrap();

        let path = announcer.speaker().get(&net("2001:db8::/64")).unwrap();
        assert_eq!(path.family, Family::new(AFI::IPV6, SAFI::Unicast));
        assert_eq!(path.next_hop(), Some("::ffff:192.0.2.1".parse().unwrap()));
        assert!(!path
            .attributes
            .iter()
            .any(|attr| matches!(attr, PathAttribute::NEXT_HOP(_))));
        let announced = path.attributes.iter().find_map(|attr| match attr {
            PathAttribute::MP_REACH_NLRI(nlri) => Some(nlri.announced_routes.len()),
            _ => None,
        });
        assert_eq!(announced, Some(1));
    }

    #[test]
    fn test_withdraw_has_no_communities() {
        let path = announcer().build_path(net("10.0.0.0/24"), None);
        assert!(path.withdraw);
        assert!(path.communities().is_empty());
    }

    #[test]
    fn test_communities_ascending() {
        let communities: CommunitySet = vec![
            Community::new(65000, 1),
            Community::new(64512, 666),
            Community::new(100, 7),
        ]
        .into_iter()
        .collect();
        let path = announcer().build_path(net("10.0.0.0/24"), Some(&communities));
        assert_eq!(
            path.communities(),
            vec![100 << 16 ^ 7, 64512 << 16 ^ 666, 65000 << 16 ^ 1]
        );
    }

    #[tokio::test]
    async fn test_apply_diff() {
        let mut announcer = announcer();
        let blackhole = Community::blackhole(64512);
        let first: Generation = vec![
            (net("10.0.0.0/24"), blackhole),
            (net("2001:db8::/48"), blackhole),
        ]
        .into_iter()
        .collect();
        let counts = announcer
            .apply(&Generation::new().diff(&first))
            .await
            .unwrap();
        assert_eq!(counts, (2, 0));
        assert_eq!(announcer.speaker().len(), 2);

        let second: Generation = vec![(net("10.0.0.0/24"), blackhole)].into_iter().collect();
        let counts = announcer.apply(&first.diff(&second)).await.unwrap();
        assert_eq!(counts, (0, 1));
        assert_eq!(announcer.speaker().len(), 1);
    }

    /// Records the order of submitted paths, rejecting any past `limit`
    struct Recorder {
        paths: Vec<(bool, IpNetwork)>,
        limit: usize,
    }

    impl Recorder {
        fn new(limit: usize) -> Self {
            Self {
                paths: Vec::new(),
                limit,
            }
        }
    }

    #[async_trait]
    impl RouteSpeaker for Recorder {
        async fn add_path(&mut self, path: Path) -> Result<(), SpeakerError> {
            if self.paths.len() == self.limit {
                return Err(SpeakerError::Submission("queue full".to_string()));
            }
            self.paths.push((path.withdraw, path.network));
            Ok(())
        }

        async fn stop(&mut self) -> Result<(), SpeakerError> {
            Ok(())
        }
    }

    fn generation(networks: &[&str]) -> Generation {
        networks
            .iter()
            .map(|n| (net(n), Community::blackhole(64512)))
            .collect()
    }

    #[tokio::test]
    async fn test_announces_before_withdraws() {
        let mut announcer = Announcer::new(Ipv4Addr::new(192, 0, 2, 1), Recorder::new(10));
        let previous = generation(&["10.9.0.0/16", "10.1.0.0/16"]);
        let current = generation(&["10.5.0.0/16", "10.2.0.0/16"]);
        announcer.apply(&previous.diff(&current)).await.unwrap();
        assert_eq!(
            announcer.speaker().paths,
            vec![
                (false, net("10.2.0.0/16")),
                (false, net("10.5.0.0/16")),
                (true, net("10.1.0.0/16")),
                (true, net("10.9.0.0/16")),
            ]
        );
    }

    #[tokio::test]
    async fn test_rejection_reports_accepted_paths() {
        let mut announcer = Announcer::new(Ipv4Addr::new(192, 0, 2, 1), Recorder::new(3));
        let previous = generation(&["10.8.0.0/16", "10.9.0.0/16"]);
        let current = generation(&["10.1.0.0/16", "10.2.0.0/16"]);

        let rejected = announcer.apply(&previous.diff(&current)).await.unwrap_err();
        assert!(matches!(rejected.error, SpeakerError::Submission(_)));
        assert_eq!(
            rejected.applied.announce.keys().cloned().collect::<Vec<_>>(),
            vec![net("10.1.0.0/16"), net("10.2.0.0/16")]
        );
        assert_eq!(
            rejected.applied.withdraw.iter().cloned().collect::<Vec<_>>(),
            vec![net("10.8.0.0/16")]
        );
    }
}
