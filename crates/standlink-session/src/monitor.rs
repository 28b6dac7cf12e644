//! Liveness monitor.
//!
//! The transport's own state reporting is not sufficient: a WebSocket keeps
//! reporting `Open` while the Wi-Fi link underneath is already dead. The
//! monitor therefore performs an out-of-band check on every tick and tears
//! the session down when it fails. Reconnection is never attempted here.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::session::{SessionCore, SessionState};

// MARK: - LivenessProbe

/// Role-specific reachability check run on every monitor tick.
pub(crate) enum LivenessProbe {
    /// Tablet role: raw TCP connect to the hub's listening address. A bare
    /// connect succeeds even when the WebSocket above it has stalled, and
    /// fails fast once the hub is gone.
    TcpReach { host: String, port: u16, timeout: Duration },
    /// Hub role: write a WebSocket ping through the serialized send path and
    /// require *some* inbound frame within `stale_after`. A half-open link
    /// accepts the ping locally but never produces the pong.
    PingPong { stale_after: Duration },
}

impl LivenessProbe {
    async fn peer_alive<S>(&self, core: &SessionCore<S>) -> bool
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        match self {
            Self::TcpReach { host, port, timeout } => {
                match tokio::time::timeout(*timeout, TcpStream::connect((host.as_str(), *port))).await {
                    Ok(Ok(_)) => true,
                    Ok(Err(e)) => {
                        debug!("Reachability probe to {}:{} failed: {}", host, port, e);
                        false
                    }
                    Err(_) => {
                        debug!("Reachability probe to {}:{} timed out", host, port);
                        false
                    }
                }
            }
            Self::PingPong { stale_after } => {
                if core.last_rx_age() > *stale_after {
                    debug!("No inbound frames for {:?}", core.last_rx_age());
                    return false;
                }
                core.send_ping().await.is_ok()
            }
        }
    }
}

// MARK: - Monitor loop

/// Polls until the lifecycle scope is cancelled or a check fails. On failure
/// it disconnects the session and exits; the caller owns any retry policy.
pub(crate) async fn monitor_loop<S>(
    core: Arc<SessionCore<S>>,
    probe: LivenessProbe,
    interval: Duration,
    grace: Duration,
    token: CancellationToken,
) where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    loop {
        tokio::select! {
            _ = token.cancelled() => {
                debug!("Monitor stopped by lifecycle scope");
                return;
            }
            _ = tokio::time::sleep(interval) => {}
        }

        // The transport's own view first, then the out-of-band check.
        if core.state() != SessionState::Open {
            debug!("Monitor exiting: session no longer open");
            return;
        }

        if !probe.peer_alive(&core).await {
            warn!("Peer unreachable; closing session");
            core.fault();
            core.disconnect(grace).await;
            return;
        }
    }
}
