use std::io;
use std::path::Path;
use std::time::Duration;

use futures::{StreamExt, TryStreamExt};
use ipnetwork::IpNetwork;
use log::trace;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Url};
use serde::Deserialize;
use tokio::fs::File;
use tokio::io::AsyncRead;
use tokio::sync::mpsc;
use tokio_util::codec::{AnyDelimiterCodec, AnyDelimiterCodecError, FramedRead};
use tokio_util::io::StreamReader;

use super::FeedError;
use crate::utils::parse_network;

const HTTP_TIMEOUT_SECS: u64 = 30;
const MAX_LINE_LENGTH: usize = 64 * 1024;

/// Where a feed reader emits each network as soon as it's decoded
pub type NetworkTx = mpsc::Sender<IpNetwork>;

/// Content layout of a feed
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum FeedFormat {
    /// One CIDR (or bare address) per line, `#`/`;` comments allowed
    Lines,
    /// Spamhaus-style JSON lines, one record with a `cidr` field per line
    JsonLines,
}

impl FeedFormat {
    pub fn from_path(path: &str) -> Self {
        match Path::new(path).extension().and_then(|ext| ext.to_str()) {
            Some("json") | Some("jsonl") => FeedFormat::JsonLines,
            _ => FeedFormat::Lines,
        }
    }

    pub fn from_content_type(content_type: Option<&str>) -> Self {
        match content_type {
            Some(value) if value.contains("json") => FeedFormat::JsonLines,
            _ => FeedFormat::Lines,
        }
    }
}

/// Spamhaus DROP record
#[derive(Debug, Deserialize)]
struct SblEntry {
    // IP network to drop, in CIDR format
    #[serde(default)]
    cidr: String,
    // Regional Internet Registry that manages the network
    #[serde(default)]
    rir: String,
    // Spamhaus Block List identifier
    #[serde(default)]
    sblid: String,
}

/// Resolves a feed (local path or http/https URL) to a stream of networks
#[derive(Clone, Debug)]
pub struct FeedReader {
    client: Client,
}

impl FeedReader {
    pub fn new() -> Result<Self, FeedError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
            .user_agent(format!("bgp-blackhole/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|err| FeedError::UnreachableSource(err.to_string()))?;
        Ok(Self { client })
    }

    /// Read a feed, sending each network to `tx` as it's decoded
    ///
    /// Returns the number of networks sent. On a mid-stream failure the
    /// networks sent before the failure have already been delivered.
    pub async fn read(&self, feed: &str, tx: &NetworkTx) -> Result<usize, FeedError> {
        match Url::parse(feed) {
            Ok(url) => match url.scheme() {
                "http" | "https" => self.read_http(url, tx).await,
                scheme => Err(FeedError::UnsupportedScheme(scheme.to_string())),
            },
            // No scheme, this is a path on the local filesystem
            Err(_) => read_file(feed, tx).await,
        }
    }

    async fn read_http(&self, url: Url, tx: &NetworkTx) -> Result<usize, FeedError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|err| FeedError::UnreachableSource(err.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(FeedError::BadStatus(status.as_u16()));
        }
        let format = FeedFormat::from_content_type(
            response
                .headers()
                .get(CONTENT_TYPE)
                .and_then(|value| value.to_str().ok()),
        );
        let body = StreamReader::new(
            response
                .bytes_stream()
                .map_err(|err| io::Error::new(io::ErrorKind::Other, err)),
        );
        decode(body, format, tx).await
    }
}

async fn read_file(path: &str, tx: &NetworkTx) -> Result<usize, FeedError> {
    let file = File::open(path)
        .await
        .map_err(|err| FeedError::UnreachableSource(format!("{}: {}", path, err)))?;
    decode(file, FeedFormat::from_path(path), tx).await
}

/// Decode a feed line by line, emitting networks as they're parsed
async fn decode<R>(reader: R, format: FeedFormat, tx: &NetworkTx) -> Result<usize, FeedError>
where
    R: AsyncRead,
{
    // Framed as bytes: feeds aren't guaranteed to be UTF-8 (comments especially)
    let codec =
        AnyDelimiterCodec::new_with_max_length(b"\n".to_vec(), Vec::new(), MAX_LINE_LENGTH);
    let lines = FramedRead::new(reader, codec);
    tokio::pin!(lines);
    let mut sent = 0;
    let mut line_no = 0;
    while let Some(line) = lines.next().await {
        line_no += 1;
        let line = line.map_err(|err| match err {
            AnyDelimiterCodecError::Io(err) => FeedError::UnreachableSource(err.to_string()),
            AnyDelimiterCodecError::MaxChunkLengthExceeded => FeedError::DecodeError {
                line: line_no,
                reason: format!("exceeds {} bytes", MAX_LINE_LENGTH),
            },
        })?;
        let line = String::from_utf8_lossy(&line);
        let parsed = match format {
            FeedFormat::Lines => parse_line(&line),
            FeedFormat::JsonLines => parse_json_line(&line),
        };
        let network = parsed.map_err(|reason| FeedError::DecodeError {
            line: line_no,
            reason,
        })?;
        if let Some(network) = network {
            if tx.send(network).await.is_err() {
                // Fan-in has gone away, nobody is listening
                break;
            }
            sent += 1;
        }
    }
    Ok(sent)
}

/// Parse a CIDR-per-line entry, returning None for blank/comment lines
pub fn parse_line(line: &str) -> Result<Option<IpNetwork>, String> {
    let entry = line
        .split(|c: char| c == '#' || c == ';')
        .next()
        .unwrap_or_default()
        .trim();
    if entry.is_empty() {
        return Ok(None);
    }
    parse_network(entry).map(Some).map_err(|err| err.reason)
}

/// Parse a JSON-lines record, returning None for records without a CIDR
pub fn parse_json_line(line: &str) -> Result<Option<IpNetwork>, String> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let entry: SblEntry = serde_json::from_str(line).map_err(|err| err.to_string())?;
    if entry.cidr.is_empty() {
        // Probably the footer line
        return Ok(None);
    }
    trace!("{} {} {}", entry.cidr, entry.sblid, entry.rir);
    parse_network(&entry.cidr)
        .map(Some)
        .map_err(|err| err.reason)
}
