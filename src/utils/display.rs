use std::net::{IpAddr, Ipv6Addr};

use chrono::{DateTime, Duration, TimeZone, Utc};

use super::*;

/// Convert an ASN (4 byte) as dotted if it exceeds the 2-byte limit
/// E.g. 4259840100 -> "65000.100"
pub fn u32_to_dotted(asn: u32, sep: char) -> String {
    if asn <= u32::from(std::u16::MAX) {
        format!("{}", asn)
    } else {
        let bytes = transform_u32_to_bytes(asn);
        format!(
            "{}{}{}",
            as_u16_be([bytes[0], bytes[1]]),
            sep,
            as_u16_be([bytes[2], bytes[3]])
        )
    }
}

/// Convert the first 16 bytes of an MP_REACH next hop to an IpAddr
/// Returns None when the next hop is too short to be an IPv6 address
pub fn bytes_to_ipv6(bytes: &[u8]) -> Option<IpAddr> {
    if bytes.len() < 16 {
        return None;
    }
    let mut buffer: [u8; 16] = [0; 16];
    buffer.clone_from_slice(&bytes[..16]);
    Some(IpAddr::V6(Ipv6Addr::from(buffer)))
}

fn fit_with_remainder(dividend: u64, divisor: u64) -> (u64, u64) {
    let fit = dividend / divisor;
    let remainder = dividend % divisor;
    (fit, remainder)
}

pub fn get_elapsed_time<Tz>(time: DateTime<Tz>) -> Duration
where
    Tz: TimeZone,
{
    Utc::now().signed_duration_since(time)
}

/// Given a duration, format like "00:00:00.000"
pub fn format_elapsed_time(elapsed: Duration) -> String {
    let millis = elapsed.num_milliseconds().abs() as u64;
    let (seconds, millis) = fit_with_remainder(millis, 1000);
    let (hours, remainder) = fit_with_remainder(seconds, 3600);
    let (minutes, seconds) = fit_with_remainder(remainder, 60);
    format!("{:02}:{:02}:{:02}.{:03}", hours, minutes, seconds, millis)
}

/// Given a timestamp, get the elapsed time and return formatted string
pub fn format_time_as_elapsed<Tz>(time: DateTime<Tz>) -> String
where
    Tz: TimeZone,
{
    format_elapsed_time(get_elapsed_time(time))
}
