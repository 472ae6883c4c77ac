//! Route speaker client interface
//!
//! The speaker owns the BGP sessions; this crate only hands it paths to
//! announce or withdraw. `Start` is each backend's constructor, `AddPath` and
//! `Stop` are the [`RouteSpeaker`] methods.

mod dry_run;
mod exabgp;

pub use dry_run::DryRun;
pub use exabgp::ExaBgp;

use std::error;
use std::fmt;
use std::io;
use std::net::IpAddr;

use async_trait::async_trait;
use bgp_rs::{MPUnreachNLRI, NLRIEncoding, Origin, PathAttribute, Update, AFI, SAFI};
use ipnetwork::IpNetwork;
use itertools::Itertools;

use crate::rib::{Community, Family};
use crate::utils::{bytes_to_ipv6, prefix_from_network};

#[derive(Debug)]
pub enum SpeakerError {
    /// Speaker couldn't be started, nothing can be announced. [reason]
    Startup(String),
    /// A path wasn't accepted. [reason]
    Submission(String),
    /// Speaker was already stopped
    Stopped,
}

impl fmt::Display for SpeakerError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("Speaker Error: ")?;
        use SpeakerError::*;
        match self {
            Startup(r) => write!(f, "Failed to start [{}]", r),
            Submission(r) => write!(f, "Path submission failed [{}]", r),
            Stopped => write!(f, "Speaker is stopped"),
        }
    }
}

impl From<io::Error> for SpeakerError {
    fn from(error: io::Error) -> Self {
        SpeakerError::Submission(error.to_string())
    }
}

impl error::Error for SpeakerError {}

/// A single path handed to the speaker
///
/// IPv4 paths carry a NEXT_HOP attribute, IPv6 paths carry their next hop
/// (and the prefix) inside MP_REACH_NLRI.
#[derive(Clone, Debug)]
pub struct Path {
    pub family: Family,
    pub network: IpNetwork,
    pub attributes: Vec<PathAttribute>,
    pub withdraw: bool,
}

impl Path {
    pub fn nlri(&self) -> NLRIEncoding {
        NLRIEncoding::IP(prefix_from_network(&self.network))
    }

    pub fn origin(&self) -> Option<&Origin> {
        self.attributes.iter().find_map(|attr| match attr {
            PathAttribute::ORIGIN(origin) => Some(origin),
            _ => None,
        })
    }

    pub fn next_hop(&self) -> Option<IpAddr> {
        self.attributes.iter().find_map(|attr| match attr {
            PathAttribute::NEXT_HOP(next_hop) => Some(*next_hop),
            PathAttribute::MP_REACH_NLRI(nlri) => bytes_to_ipv6(&nlri.next_hop),
            _ => None,
        })
    }

    /// Raw COMMUNITY values, empty when the attribute isn't present
    pub fn communities(&self) -> Vec<u32> {
        self.attributes
            .iter()
            .find_map(|attr| match attr {
                PathAttribute::COMMUNITY(communities) => Some(communities.clone()),
                _ => None,
            })
            .unwrap_or_default()
    }

    /// Build the BGP UPDATE message carrying this path
    pub fn to_update(&self) -> Update {
        let nlri = self.nlri();
        match (self.family.is_ipv6(), self.withdraw) {
            (false, false) => Update {
                withdrawn_routes: Vec::new(),
                attributes: self.attributes.clone(),
                announced_routes: vec![nlri],
            },
            (false, true) => Update {
                withdrawn_routes: vec![nlri],
                attributes: Vec::new(),
                announced_routes: Vec::new(),
            },
            // MP_REACH_NLRI already carries the prefix
            (true, false) => Update {
                withdrawn_routes: Vec::new(),
                attributes: self.attributes.clone(),
                announced_routes: Vec::new(),
            },
            (true, true) => Update {
                withdrawn_routes: Vec::new(),
                attributes: vec![PathAttribute::MP_UNREACH_NLRI(MPUnreachNLRI {
                    afi: AFI::IPV6,
                    safi: SAFI::Unicast,
                    withdrawn_routes: vec![nlri],
                })],
                announced_routes: Vec::new(),
            },
        }
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let action = if self.withdraw { "withdraw" } else { "announce" };
        write!(f, "<Path {} {} ({})", action, self.network, self.family)?;
        if let Some(next_hop) = self.next_hop() {
            write!(f, " next-hop {}", next_hop)?;
        }
        let communities = self.communities();
        if !communities.is_empty() {
            let communities = communities.into_iter().map(Community).join(" ");
            write!(f, " communities [{}]", communities)?;
        }
        write!(f, ">")
    }
}

/// Client side of a BGP route speaker
#[async_trait]
pub trait RouteSpeaker: Send {
    /// Submit a path for announcement (or withdrawal, per `path.withdraw`)
    async fn add_path(&mut self, path: Path) -> Result<(), SpeakerError>;

    /// Shut the speaker down, after which paths are rejected
    async fn stop(&mut self) -> Result<(), SpeakerError>;
}

#[async_trait]
impl<S: RouteSpeaker + ?Sized> RouteSpeaker for Box<S> {
    async fn add_path(&mut self, path: Path) -> Result<(), SpeakerError> {
        (**self).add_path(path).await
    }

    async fn stop(&mut self) -> Result<(), SpeakerError> {
        (**self).stop().await
    }
}
