use std::fmt;
use std::fs::File;
use std::io::Read;
use std::net::Ipv4Addr;
use std::str::FromStr;

use serde::{self, Deserialize, Deserializer};
use toml;

use super::ConfigError;
use crate::rib::Community;

struct Defaults {}

impl Defaults {
    // 120 minutes
    fn refresh_rate() -> u64 {
        7200
    }

    fn speaker() -> SpeakerKind {
        SpeakerKind::ExaBgp
    }
}

/// Config (toml) representation of a threat feed
#[derive(Clone, Debug, Deserialize)]
pub(super) struct FeedConfigSpec {
    // Local path or http(s) URL
    pub(super) url: String,
    // Falls back to the instance blackhole community when not provided
    #[serde(default)]
    pub(super) community: Community,
}

#[derive(Debug, Deserialize)]
pub(super) struct ServerConfigSpec {
    // Next hop for announced routes (can be given on the command line instead)
    pub(super) router_id: Option<Ipv4Addr>,
    // Local ASN, also used to build the blackhole community
    pub(super) local_as: Option<u32>,
    // Seconds between refreshes
    #[serde(default = "Defaults::refresh_rate")]
    pub(super) refresh_rate: u64,
    #[serde(default = "Defaults::speaker")]
    pub(super) speaker: SpeakerKind,
    #[serde(default = "Vec::new")]
    pub(super) feeds: Vec<FeedConfigSpec>,
}

impl ServerConfigSpec {
    pub(super) fn from_file(path: &str) -> Result<Self, ConfigError> {
        let mut file =
            File::open(path).map_err(|err| ConfigError::Io(format!("{}: {}", path, err)))?;
        let mut contents = String::new();
        file.read_to_string(&mut contents)
            .map_err(|err| ConfigError::Io(format!("{}: {}", path, err)))?;
        Self::from_toml(&contents)
    }

    pub(super) fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        toml::from_str(contents).map_err(|err| ConfigError::Parse(err.to_string()))
    }
}

/// Which route speaker receives the paths
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SpeakerKind {
    /// ExaBGP API process (commands on stdout, responses on stdin)
    ExaBgp,
    /// Log paths and keep them in memory only
    DryRun,
}

impl fmt::Display for SpeakerKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use SpeakerKind::*;
        let display = match self {
            ExaBgp => "exabgp",
            DryRun => "log",
        };
        write!(f, "{}", display)
    }
}

impl FromStr for SpeakerKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "exabgp" => Ok(SpeakerKind::ExaBgp),
            "log" | "dry-run" => Ok(SpeakerKind::DryRun),
            _ => Err(ConfigError::Invalid(format!("Unsupported speaker: '{}'", s))),
        }
    }
}

impl<'de> Deserialize<'de> for SpeakerKind {
    fn deserialize<D>(deserializer: D) -> Result<SpeakerKind, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
