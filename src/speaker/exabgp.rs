use std::fmt::Write as _;

use async_trait::async_trait;
use itertools::Itertools;
use log::{debug, trace, warn};
use tokio::io::{self, AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, Stdout};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

use super::{Path, RouteSpeaker, SpeakerError};
use crate::rib::Community;

/// Drives an ExaBGP process through its text API
///
/// ExaBGP runs this binary as an API process: commands go out on stdout and
/// acknowledgements come back on stdin.
pub struct ExaBgp<W> {
    writer: Option<W>,
    responses: Option<JoinHandle<()>>,
}

impl ExaBgp<Stdout> {
    /// Attach to the ExaBGP process on stdout/stdin
    pub fn start() -> Result<Self, SpeakerError> {
        let handle = Handle::try_current().map_err(|err| SpeakerError::Startup(err.to_string()))?;
        let responses = handle.spawn(log_responses(io::stdin()));
        Ok(Self {
            writer: Some(io::stdout()),
            responses: Some(responses),
        })
    }
}

impl<W> ExaBgp<W>
where
    W: AsyncWrite + Unpin + Send,
{
    pub fn with_writer(writer: W) -> Self {
        Self {
            writer: Some(writer),
            responses: None,
        }
    }

    pub fn get_ref(&self) -> Option<&W> {
        self.writer.as_ref()
    }
}

#[async_trait]
impl<W> RouteSpeaker for ExaBgp<W>
where
    W: AsyncWrite + Unpin + Send,
{
    async fn add_path(&mut self, path: Path) -> Result<(), SpeakerError> {
        let writer = self.writer.as_mut().ok_or(SpeakerError::Stopped)?;
        let command = render_command(&path)?;
        trace!("Sending to ExaBGP: {}", command.trim_end());
        writer.write_all(command.as_bytes()).await?;
        writer.flush().await?;
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), SpeakerError> {
        let mut writer = self.writer.take().ok_or(SpeakerError::Stopped)?;
        if let Some(responses) = self.responses.take() {
            responses.abort();
        }
        writer.flush().await?;
        debug!("ExaBGP speaker stopped");
        Ok(())
    }
}

/// Render a path as an ExaBGP API command (newline terminated)
fn render_command(path: &Path) -> Result<String, SpeakerError> {
    let next_hop = path
        .next_hop()
        .ok_or_else(|| SpeakerError::Submission(format!("No next-hop for {}", path.network)))?;
    let mut command = String::with_capacity(96);
    if path.withdraw {
        let _ = write!(command, "withdraw route {} next-hop {}", path.network, next_hop);
    } else {
        let _ = write!(
            command,
            "announce route {} next-hop {} origin igp",
            path.network, next_hop
        );
        let communities = path.communities();
        if !communities.is_empty() {
            let communities = communities.into_iter().map(Community).join(" ");
            let _ = write!(command, " community [{}]", communities);
        }
    }
    command.push('\n');
    Ok(command)
}

async fn log_responses<R>(reader: R)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                let line = line.trim();
                if line.is_empty() || line == "done" {
                    continue;
                }
                if line.starts_with("error") {
                    warn!("ExaBGP rejected a command: {:?}", line);
                } else {
                    debug!("Received from ExaBGP: {:?}", line);
                }
            }
            Ok(None) => break,
            Err(err) => {
                warn!("Error reading ExaBGP responses: {}", err);
                break;
            }
        }
    }
    debug!("ExaBGP response stream closed");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rib::Family;
    use bgp_rs::{MPReachNLRI, NLRIEncoding, Origin, PathAttribute, AFI, SAFI};
    use ipnetwork::IpNetwork;
    use std::net::{IpAddr, Ipv4Addr};
    use std::pin::Pin;
    use std::task::{Context, Poll};

    use crate::utils::prefix_from_network;

    fn v4_path(network: &str, communities: Vec<u32>, withdraw: bool) -> Path {
        let network: IpNetwork = network.parse().unwrap();
        let mut attributes = vec![
            PathAttribute::ORIGIN(Origin::IGP),
            PathAttribute::NEXT_HOP(IpAddr::V4(Ipv4Addr::new(192, 0, 2, 1))),
        ];
        if !communities.is_empty() {
            attributes.push(PathAttribute::COMMUNITY(communities));
        }
        Path {
            family: Family::for_network(&network),
            network,
            attributes,
            withdraw,
        }
    }

    struct BrokenPipe;

    impl AsyncWrite for BrokenPipe {
        fn poll_write(
            self: Pin<&mut Self>,
            _: &mut Context<'_>,
            _: &[u8],
        ) -> Poll<std::io::Result<usize>> {
            Poll::Ready(Err(std::io::ErrorKind::BrokenPipe.into()))
        }

        fn poll_flush(self: Pin<&mut Self>, _: &mut Context<'_>) -> Poll<std::io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _: &mut Context<'_>) -> Poll<std::io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    #[test]
    fn test_render_commands() {
        let path = v4_path("10.0.0.0/24", vec![64512 << 16 ^ 666, 64512 << 16 ^ 100], false);
        assert_eq!(
            render_command(&path).unwrap(),
            "announce route 10.0.0.0/24 next-hop 192.0.2.1 origin igp community [64512:666 64512:100]\n"
        );

        let path = v4_path("10.0.0.0/24", vec![], true);
        assert_eq!(
            render_command(&path).unwrap(),
            "withdraw route 10.0.0.0/24 next-hop 192.0.2.1\n"
        );
    }

    #[test]
    fn test_render_ipv6_next_hop() {
        let network: IpNetwork = "2001:db8::/32".parse().unwrap();
        let path = Path {
            family: Family::for_network(&network),
            network,
            attributes: vec![
                PathAttribute::ORIGIN(Origin::IGP),
                PathAttribute::MP_REACH_NLRI(MPReachNLRI {
                    afi: AFI::IPV6,
                    safi: SAFI::Unicast,
                    next_hop: Ipv4Addr::new(192, 0, 2, 1).to_ipv6_mapped().octets().to_vec(),
                    announced_routes: vec![NLRIEncoding::IP(prefix_from_network(&network))],
                }),
            ],
            withdraw: true,
        };
        assert_eq!(
            render_command(&path).unwrap(),
            "withdraw route 2001:db8::/32 next-hop ::ffff:192.0.2.1\n"
        );
    }

    #[test]
    fn test_render_without_next_hop() {
        let mut path = v4_path("10.0.0.0/24", vec![], false);
        path.attributes.retain(|attr| !matches!(attr, PathAttribute::NEXT_HOP(_)));
        assert!(matches!(
            render_command(&path),
            Err(SpeakerError::Submission(_))
        ));
    }

    #[tokio::test]
    async fn test_add_path_and_stop() {
        let mut speaker = ExaBgp::with_writer(Vec::new());
        speaker
            .add_path(v4_path("10.0.0.0/24", vec![64512 << 16 ^ 666], false))
            .await
            .unwrap();
        speaker
            .add_path(v4_path("10.1.0.0/16", vec![], true))
            .await
            .unwrap();
        let written = String::from_utf8(speaker.get_ref().unwrap().clone()).unwrap();
        assert_eq!(
            written.lines().collect::<Vec<_>>(),
            vec![
                "announce route 10.0.0.0/24 next-hop 192.0.2.1 origin igp community [64512:666]",
                "withdraw route 10.1.0.0/16 next-hop 192.0.2.1",
            ]
        );

        speaker.stop().await.unwrap();
        assert!(matches!(
            speaker.add_path(v4_path("10.0.0.0/24", vec![], true)).await,
            Err(SpeakerError::Stopped)
        ));
        assert!(matches!(speaker.stop().await, Err(SpeakerError::Stopped)));
    }

    #[tokio::test]
    async fn test_write_failure_is_submission_error() {
        let mut speaker = ExaBgp::with_writer(BrokenPipe);
        let result = speaker
            .add_path(v4_path("10.0.0.0/24", vec![], false))
            .await;
        assert!(matches!(result, Err(SpeakerError::Submission(_))));
    }

    #[tokio::test]
    async fn test_log_responses_ends_on_eof() {
        let responses: &[u8] = b"done\n\nerror\nneighbor 192.0.2.2 up\n";
        // Completes once the stream is exhausted
        log_responses(responses).await;
    }
}
