use std::error::Error;
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use clap::Parser;
use env_logger::Builder;
use log::{debug, error, info, warn, LevelFilter};
use signal_hook::consts::{SIGINT, SIGTERM, SIGUSR1};
use signal_hook::iterator::Signals;
use tokio::runtime::Runtime;
use tokio::sync::{mpsc, watch};

use bgp_blackhole::config::Overrides;
use bgp_blackhole::feeds::FeedReader;
use bgp_blackhole::speaker::{DryRun, ExaBgp, RouteSpeaker};
use bgp_blackhole::utils::asn_from_dotted;
use bgp_blackhole::{Refresher, ServerConfig, SpeakerKind};

// Blocking tasks still running after this are abandoned
const SHUTDOWN_GRACE: Duration = Duration::from_secs(1);

#[derive(Parser, Debug)]
#[clap(name = "blackhole", rename_all = "kebab-case", version)]
/// Announce threat feed networks as BGP blackhole routes
pub struct Args {
    /// Path to config.toml (optional when feeds and identity are given as arguments)
    config_path: Option<String>,
    /// Feed URL or path to fetch, tagged with the blackhole community (repeatable)
    #[clap(short, long = "feed")]
    feeds: Vec<String>,
    /// Seconds between refreshes
    #[clap(long)]
    refresh_rate: Option<u64>,
    /// Router-id, also used as the next hop
    #[clap(long)]
    router_id: Option<Ipv4Addr>,
    /// Local AS number (asplain or asdot)
    #[clap(long, parse(try_from_str = asn_from_dotted))]
    local_as: Option<u32>,
    /// Route speaker to drive [exabgp, log]
    #[clap(long)]
    speaker: Option<SpeakerKind>,
    /// Show debug logs (additive for trace logs)
    #[clap(short, parse(from_occurrences))]
    verbose: u8,
}

fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();

    let (crate_level, other_level) = match args.verbose {
        0 => (LevelFilter::Info, LevelFilter::Warn),
        1 => (LevelFilter::Debug, LevelFilter::Warn),
        2 => (LevelFilter::Trace, LevelFilter::Warn),
        _ => (LevelFilter::Trace, LevelFilter::Trace),
    };
    // ExaBGP reads commands from stdout, keep logs on stderr
    Builder::new()
        .filter(Some("blackhole"), crate_level)
        .filter(Some("bgp_blackhole"), crate_level)
        .filter(None, other_level)
        .target(env_logger::Target::Stderr)
        .init();
    info!("Starting blackhole v{}", env!("CARGO_PKG_VERSION"));
    debug!("Logging at levels {}/{}", crate_level, other_level);

    let overrides = Overrides {
        router_id: args.router_id,
        local_as: args.local_as,
        refresh_rate: args.refresh_rate,
        speaker: args.speaker,
        feeds: args.feeds,
    };
    let config = Arc::new(ServerConfig::load(args.config_path.as_deref(), overrides)?);
    info!("{}", config);

    let (refresh_tx, refresh_rx) = mpsc::channel::<()>(1);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut signals = Signals::new(&[SIGUSR1, SIGINT, SIGTERM])?;
    thread::spawn(move || {
        for signal in signals.forever() {
            match signal {
                SIGUSR1 => {
                    // A refresh already queued covers this one
                    if refresh_tx.try_send(()).is_err() {
                        debug!("Refresh already pending");
                    }
                }
                _ => {
                    info!("Received signal {}, stopping after the current refresh", signal);
                    if shutdown_tx.send(true).is_err() {
                        break;
                    }
                }
            }
        }
    });

    let runtime = Runtime::new()?;
    let result = runtime.block_on(async move {
        let reader = FeedReader::new()?;
        let speaker: Box<dyn RouteSpeaker> = match config.speaker {
            SpeakerKind::ExaBgp => Box::new(ExaBgp::start()?),
            SpeakerKind::DryRun => {
                warn!("Dry-run speaker, routes will only be logged");
                Box::new(DryRun::new())
            }
        };
        let mut refresher = Refresher::new(Arc::clone(&config), reader, speaker);
        if let Err(err) = refresher.run(refresh_rx, shutdown_rx).await {
            error!("{}", err);
            return Err(err.into());
        }
        info!("Stopped");
        Ok::<(), Box<dyn Error>>(())
    });
    shutdown(runtime);
    result
}

/// Stop the runtime without waiting on blocking reads (ExaBGP's stdin)
fn shutdown(runtime: Runtime) {
    runtime.shutdown_timeout(SHUTDOWN_GRACE);
}
