use std::error::Error;
use std::fmt;
use std::net::{AddrParseError, IpAddr};

use bgp_rs::{Prefix, AFI};
use ipnetwork::IpNetwork;

#[derive(Debug)]
pub struct ParseError {
    pub reason: String,
}

impl ParseError {
    pub fn new(reason: String) -> Self {
        ParseError { reason }
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ParseError: {}", self.reason)
    }
}

impl Error for ParseError {}

/// Convert an ASN string to a u32
/// E.g. "65000.100" -> 4259840100
pub fn asn_from_dotted(value: &str) -> std::result::Result<u32, ParseError> {
    // Parse to list of u32, since we should support 4 byte aSN as a single int
    // (E.g. "4259840100")
    let mut chunks = [0; 2];
    let check_for_overflow = value.contains('.');
    // Iterate through chunks in reverse, so if there's no dot (only one number),
    // it will be in the least significant position
    for (i, chunk) in value
        .splitn(2, '.')
        .collect::<Vec<&str>>()
        .into_iter()
        .rev()
        .enumerate()
    {
        let chunk: u32 = chunk
            .parse()
            .map_err(|err| ParseError::new(format!("{} '{}'", err, value)))?;
        if check_for_overflow && chunk > std::u16::MAX as u32 {
            return Err(ParseError::new(format!("Unsupported ASN '{}'", value)));
        }
        chunks[i] = chunk;
    }
    Ok((chunks[1] << 16) + chunks[0])
}

/// Parse a feed entry into a network with host bits masked off
/// A bare address is treated as a host prefix (/32 or /128)
/// ```
/// use bgp_blackhole::utils::parse_network;
/// let network = parse_network("192.168.10.7/24").unwrap();
/// assert_eq!(network.to_string(), "192.168.10.0/24");
/// ```
pub fn parse_network(value: &str) -> std::result::Result<IpNetwork, ParseError> {
    let network = if value.contains('/') {
        value
            .parse::<IpNetwork>()
            .map_err(|err| ParseError::new(format!("{} '{}'", err, value)))?
    } else {
        let addr: IpAddr = value
            .parse()
            .map_err(|err: AddrParseError| ParseError::new(format!("{} '{}'", err, value)))?;
        IpNetwork::from(addr)
    };
    IpNetwork::new(network.network(), network.prefix())
        .map_err(|err| ParseError::new(format!("{} '{}'", err, value)))
}

/// Convert an IpNetwork to a bgp_rs::Prefix
pub fn prefix_from_network(network: &IpNetwork) -> Prefix {
    let (protocol, octets) = match network {
        IpNetwork::V4(v4) => (AFI::IPV4, v4.ip().octets().to_vec()),
        IpNetwork::V6(v6) => (AFI::IPV6, v6.ip().octets().to_vec()),
    };
    Prefix {
        protocol,
        length: network.prefix(),
        prefix: octets,
    }
}
