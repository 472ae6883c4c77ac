use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use itertools::Itertools;
use serde::{self, Deserialize, Deserializer};

use crate::utils::ParseError;

/// RFC 7999 BLACKHOLE value carried in the lower half of the community
pub const BLACKHOLE: u16 = 666;

/// A standard (RFC 1997) BGP community, rendered as "upper:lower"
///
/// Zero means the community was not configured; see [`Community::or_blackhole`].
#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Community(pub u32);

impl Community {
    pub fn new(upper: u16, lower: u16) -> Self {
        Self(u32::from(upper) << 16 ^ u32::from(lower))
    }

    /// Blackhole community for an instance: `AS << 16 ^ 666`
    pub fn blackhole(local_as: u32) -> Self {
        Self(local_as << 16 ^ u32::from(BLACKHOLE))
    }

    pub fn is_unset(self) -> bool {
        self.0 == 0
    }

    /// Resolve an unset community to the instance blackhole community
    pub fn or_blackhole(self, local_as: u32) -> Self {
        if self.is_unset() {
            Self::blackhole(local_as)
        } else {
            self
        }
    }

    pub fn upper(self) -> u16 {
        (self.0 >> 16) as u16
    }

    pub fn lower(self) -> u16 {
        self.0 as u16
    }
}

impl fmt::Display for Community {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.upper(), self.lower())
    }
}

impl From<Community> for u32 {
    fn from(community: Community) -> u32 {
        community.0
    }
}

impl FromStr for Community {
    type Err = ParseError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let chunks: Vec<_> = value.trim().split(':').collect();
        if chunks.len() != 2 {
            return Err(ParseError::new(format!("Malformed community '{}'", value)));
        }
        let upper = chunks[0]
            .parse::<u16>()
            .map_err(|err| {
                ParseError::new(format!("Malformed community '{}': upper {}", value, err))
            })?;
        let lower = chunks[1]
            .parse::<u16>()
            .map_err(|err| {
                ParseError::new(format!("Malformed community '{}': lower {}", value, err))
            })?;
        Ok(Community::new(upper, lower))
    }
}

impl<'de> Deserialize<'de> for Community {
    fn deserialize<D>(deserializer: D) -> Result<Community, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Ordered set of communities tagging one network
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct CommunitySet(BTreeSet<Community>);

impl CommunitySet {
    pub fn new() -> Self {
        Self(BTreeSet::new())
    }

    pub fn insert(&mut self, community: Community) -> bool {
        self.0.insert(community)
    }

    pub fn contains(&self, community: Community) -> bool {
        self.0.contains(&community)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Raw values for the COMMUNITY path attribute (ascending)
    pub fn standard(&self) -> Vec<u32> {
        self.0.iter().map(|c| c.0).collect()
    }
}

impl std::iter::FromIterator<Community> for CommunitySet {
    fn from_iter<I: IntoIterator<Item = Community>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl fmt::Display for CommunitySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.iter().join(" "))
    }
}
