use std::collections::BTreeMap;

use async_trait::async_trait;
use bgp_rs::Message;
use ipnetwork::IpNetwork;
use log::{debug, info};

use super::{Path, RouteSpeaker, SpeakerError};

/// Speaker that only logs what it would send
///
/// Keeps an Adj-RIB-Out of announced paths so feeds can be validated
/// without a BGP daemon attached.
#[derive(Debug, Default)]
pub struct DryRun {
    adj_rib_out: BTreeMap<IpNetwork, Path>,
    submitted: usize,
    stopped: bool,
}

impl DryRun {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, network: &IpNetwork) -> Option<&Path> {
        self.adj_rib_out.get(network)
    }

    pub fn len(&self) -> usize {
        self.adj_rib_out.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adj_rib_out.is_empty()
    }

    /// Count of paths accepted since creation, announces and withdraws
    pub fn submitted(&self) -> usize {
        self.submitted
    }
}

#[async_trait]
impl RouteSpeaker for DryRun {
    async fn add_path(&mut self, path: Path) -> Result<(), SpeakerError> {
        if self.stopped {
            return Err(SpeakerError::Stopped);
        }
        let mut buf: Vec<u8> = Vec::with_capacity(64);
        Message::Update(path.to_update())
            .encode(&mut buf)
            .map_err(|err| SpeakerError::Submission(err.to_string()))?;
        info!("{} [{} bytes]", path, buf.len());

        if path.withdraw {
            self.adj_rib_out.remove(&path.network);
        } else {
            self.adj_rib_out.insert(path.network, path);
        }
        self.submitted += 1;
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), SpeakerError> {
        if self.stopped {
            return Err(SpeakerError::Stopped);
        }
        self.stopped = true;
        debug!("Dry-run speaker stopped with {} paths", self.adj_rib_out.len());
        Ok(())
    }
}
