use std::fmt;

use bgp_rs::{AFI, SAFI};
use ipnetwork::IpNetwork;

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct Family {
    pub afi: AFI,
    pub safi: SAFI,
}

impl fmt::Display for Family {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} {}", self.afi, self.safi)
    }
}

impl Family {
    pub fn new(afi: AFI, safi: SAFI) -> Self {
        Self { afi, safi }
    }

    /// Unicast family matching the network's address family
    pub fn for_network(network: &IpNetwork) -> Self {
        match network {
            IpNetwork::V4(_) => Self::new(AFI::IPV4, SAFI::Unicast),
            IpNetwork::V6(_) => Self::new(AFI::IPV6, SAFI::Unicast),
        }
    }

    pub fn is_ipv6(&self) -> bool {
        self.afi == AFI::IPV6
    }
}
