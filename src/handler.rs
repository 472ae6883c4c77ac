//! Refresh scheduler
//!
//! Each cycle fetches every feed into a new [`Generation`], diffs it against
//! the last applied generation and hands the diff to the [`Announcer`]. Cycles
//! run on a timer, on request, and never overlap.

use std::error;
use std::fmt;
use std::sync::Arc;

use chrono::{Duration, Utc};
use log::{debug, error, info, warn};
use tokio::sync::{mpsc, watch};
use tokio::time::{self, Instant};

use crate::announcer::Announcer;
use crate::config::ServerConfig;
use crate::feeds::{build_generation, FeedReader};
use crate::rib::Generation;
use crate::speaker::{RouteSpeaker, SpeakerError};
use crate::utils::{format_elapsed_time, get_elapsed_time};

#[derive(Debug)]
pub enum RefreshError {
    /// The speaker rejected a path, the cycle was abandoned
    Speaker(SpeakerError),
}

impl fmt::Display for RefreshError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("Refresh Error: ")?;
        match self {
            RefreshError::Speaker(err) => write!(f, "{}", err),
        }
    }
}

impl From<SpeakerError> for RefreshError {
    fn from(error: SpeakerError) -> Self {
        RefreshError::Speaker(error)
    }
}

impl error::Error for RefreshError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            RefreshError::Speaker(err) => Some(err),
        }
    }
}

/// Outcome of a successful refresh cycle
#[derive(Debug, Clone, PartialEq)]
pub struct RefreshSummary {
    /// Networks decoded across all feeds
    pub fetched: usize,
    /// Networks in the new generation, after aggregation
    pub networks: usize,
    pub announced: usize,
    pub withdrawn: usize,
    pub elapsed: Duration,
}

impl fmt::Display for RefreshSummary {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{} networks fetched, {} summarized networks ({} announced/{} withdrawn) in {}",
            self.fetched,
            self.networks,
            self.announced,
            self.withdrawn,
            format_elapsed_time(self.elapsed),
        )
    }
}

/// Owns the last applied generation and drives refresh cycles
pub struct Refresher<S> {
    config: Arc<ServerConfig>,
    reader: Arc<FeedReader>,
    announcer: Announcer<S>,
    current: Generation,
    cycles: usize,
}

impl<S> Refresher<S>
where
    S: RouteSpeaker,
{
    pub fn new(config: Arc<ServerConfig>, reader: FeedReader, speaker: S) -> Self {
        let announcer = Announcer::new(config.router_id, speaker);
        Self {
            config,
            reader: Arc::new(reader),
            announcer,
            current: Generation::new(),
            cycles: 0,
        }
    }

    /// Networks the speaker is known to hold
    pub fn current(&self) -> &Generation {
        &self.current
    }

    pub fn announcer(&self) -> &Announcer<S> {
        &self.announcer
    }

    /// Number of refresh cycles run so far, failed ones included
    pub fn cycles(&self) -> usize {
        self.cycles
    }

    /// Run one refresh cycle
    ///
    /// The new generation only replaces the current one once every path has
    /// been accepted. When the speaker rejects a path, the current generation
    /// is patched with the paths it did accept, so the next cycle diffs
    /// against what the speaker actually holds.
    pub async fn refresh(&mut self) -> Result<RefreshSummary, RefreshError> {
        self.cycles += 1;
        let started = Utc::now();
        let (generation, fetched) =
            build_generation(&self.reader, &self.config.feeds, self.config.local_as).await;
        let diff = self.current.diff(&generation);
        debug!("{} against {}", diff, self.current);

        let (announced, withdrawn) = match self.announcer.apply(&diff).await {
            Ok(counts) => counts,
            Err(rejected) => {
                self.current = self.current.patched(&rejected.applied);
                return Err(rejected.error.into());
            }
        };
        let summary = RefreshSummary {
            fetched,
            networks: generation.len(),
            announced,
            withdrawn,
            elapsed: get_elapsed_time(started),
        };
        self.current = generation;
        Ok(summary)
    }

    /// Refresh on every tick of the refresh rate (starting immediately) and on
    /// each `refresh` request, until `shutdown` is set
    ///
    /// Shutdown is only observed between cycles. Requests arriving while a
    /// cycle runs are coalesced into a single follow-up cycle. The speaker is
    /// stopped on the way out.
    pub async fn run(
        &mut self,
        mut refresh: mpsc::Receiver<()>,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<(), RefreshError> {
        let refresh_rate = self.config.refresh_rate;
        let timer = time::sleep(std::time::Duration::from_secs(0));
        tokio::pin!(timer);
        let mut accept_requests = true;

        loop {
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        debug!("Shutdown channel closed");
                        break;
                    }
                    continue;
                }
                request = refresh.recv(), if accept_requests => {
                    match request {
                        Some(()) => info!("Refresh requested"),
                        None => {
                            accept_requests = false;
                            continue;
                        }
                    }
                }
                _ = &mut timer => {}
            }

            info!("Refresh #{} ({}s) started", self.cycles + 1, refresh_rate.as_secs());
            match self.refresh().await {
                Ok(summary) => info!("Refresh complete: {}", summary),
                Err(err) => error!("Refresh failed: {}", err),
            }

            let mut pending = 0;
            while refresh.try_recv().is_ok() {
                pending += 1;
            }
            if pending > 0 {
                debug!("{} refresh request(s) arrived during the refresh", pending);
                timer.as_mut().reset(Instant::now());
            } else {
                timer.as_mut().reset(Instant::now() + refresh_rate);
            }
        }

        info!("Stopping with {} networks announced", self.current.len());
        if let Err(err) = self.announcer.speaker_mut().stop().await {
            warn!("{}", err);
            return Err(err.into());
        }
        Ok(())
    }
}
