mod file;

pub use file::SpeakerKind;

use std::error;
use std::fmt;
use std::net::Ipv4Addr;
use std::time::Duration;

use itertools::Itertools;

use crate::rib::Community;
use crate::utils::u32_to_dotted;

#[derive(Debug)]
pub enum ConfigError {
    /// Config file couldn't be read. [reason]
    Io(String),
    /// Config file isn't valid. [reason]
    Parse(String),
    /// Required setting not provided in file or arguments. [setting]
    Missing(&'static str),
    /// Setting has an unusable value. [reason]
    Invalid(String),
    /// Nothing to fetch
    NoFeeds,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("Config Error: ")?;
        use ConfigError::*;
        match self {
            Io(r) => write!(f, "{}", r),
            Parse(r) => write!(f, "{}", r),
            Missing(setting) => write!(f, "'{}' is required", setting),
            Invalid(r) => write!(f, "{}", r),
            NoFeeds => write!(f, "No feeds configured"),
        }
    }
}

impl error::Error for ConfigError {}

/// A threat feed and the community its networks are tagged with
#[derive(Clone, Debug, PartialEq)]
pub struct FeedConfig {
    pub url: String,
    /// Unset (zero) means the instance blackhole community
    pub community: Community,
}

impl FeedConfig {
    pub fn new(url: &str) -> Self {
        Self {
            url: url.to_string(),
            community: Community::default(),
        }
    }

    pub fn with_community(url: &str, community: Community) -> Self {
        Self {
            url: url.to_string(),
            community,
        }
    }
}

impl fmt::Display for FeedConfig {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.community.is_unset() {
            write!(f, "{}", self.url)
        } else {
            write!(f, "{}[{}]", self.url, self.community)
        }
    }
}

/// Settings given on the command line, taking precedence over the config file
#[derive(Debug, Default)]
pub struct Overrides {
    pub router_id: Option<Ipv4Addr>,
    pub local_as: Option<u32>,
    pub refresh_rate: Option<u64>,
    pub speaker: Option<SpeakerKind>,
    /// Appended to the file's feeds, with the instance blackhole community
    pub feeds: Vec<String>,
}

/// In-Memory Server config, with defaults and overrides resolved
#[derive(Debug)]
pub struct ServerConfig {
    pub router_id: Ipv4Addr,
    pub local_as: u32,
    pub refresh_rate: Duration,
    pub speaker: SpeakerKind,
    pub feeds: Vec<FeedConfig>,
}

impl ServerConfig {
    /// Parse a TOML config file (if any) and merge command line overrides
    pub fn load(path: Option<&str>, overrides: Overrides) -> Result<Self, ConfigError> {
        let spec = match path {
            Some(path) => file::ServerConfigSpec::from_file(path)?,
            None => file::ServerConfigSpec::from_toml("")?,
        };
        Self::from_spec(spec, overrides)
    }

    fn from_spec(spec: file::ServerConfigSpec, overrides: Overrides) -> Result<Self, ConfigError> {
        let router_id = overrides
            .router_id
            .or(spec.router_id)
            .ok_or(ConfigError::Missing("router_id"))?;
        let local_as = overrides
            .local_as
            .or(spec.local_as)
            .ok_or(ConfigError::Missing("local_as"))?;
        let refresh_rate = overrides.refresh_rate.unwrap_or(spec.refresh_rate);
        if refresh_rate == 0 {
            return Err(ConfigError::Invalid(
                "refresh_rate must be at least 1 second".to_string(),
            ));
        }
        let feeds: Vec<FeedConfig> = spec
            .feeds
            .into_iter()
            .map(|f| FeedConfig::with_community(&f.url, f.community))
            .chain(overrides.feeds.iter().map(|url| FeedConfig::new(url)))
            .collect();
        if feeds.is_empty() {
            return Err(ConfigError::NoFeeds);
        }
        // The blackhole community only has 16 bits for the AS
        if local_as > u32::from(u16::MAX) && feeds.iter().any(|f| f.community.is_unset()) {
            return Err(ConfigError::Invalid(format!(
                "AS{} can't be encoded in a blackhole community, set a community on every feed",
                u32_to_dotted(local_as, '.'),
            )));
        }

        Ok(Self {
            router_id,
            local_as,
            refresh_rate: Duration::from_secs(refresh_rate),
            speaker: overrides.speaker.unwrap_or(spec.speaker),
            feeds,
        })
    }

    /// Community applied to feeds without one: `local_as:666`
    pub fn blackhole_community(&self) -> Community {
        Community::blackhole(self.local_as)
    }
}

impl fmt::Display for ServerConfig {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let feeds = self.feeds.iter().join(" ");
        write!(
            f,
            "<ServerConfig router_id={} as={} refresh={}s speaker={} feeds=[{}]>",
            self.router_id,
            u32_to_dotted(self.local_as, '.'),
            self.refresh_rate.as_secs(),
            self.speaker,
            feeds,
        )
    }
}
