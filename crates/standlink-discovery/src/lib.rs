//! UDP broadcast discovery.
//!
//! A hub announces `{name, port}` on the discovery port once per second so a
//! tablet on the same subnet can find it without manual address entry. The
//! tablet side browses and emits [`PeerInfo`] values over a channel as
//! announcements arrive.
//!
//! This is the collaborator boundary of the session core: the core only
//! starts the broadcaster alongside its listener and stops it via the shared
//! cancellation scope. Pairing decisions stay with the tablet orchestration.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub const DEFAULT_DISCOVERY_PORT: u16 = 15000;
const ANNOUNCE_INTERVAL: Duration = Duration::from_secs(1);
const MAX_DATAGRAM: usize = 512;

// MARK: - Wire format

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct Announcement {
    name: String,
    port: u16,
}

/// A hub seen on the local subnet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerInfo {
    pub name: String,
    pub address: IpAddr,
    pub port: u16,
}

// MARK: - DiscoveryError

#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
    #[error("Failed to bind discovery socket: {0}")]
    BindFailed(std::io::Error),

    #[error("Failed to enable broadcast: {0}")]
    BroadcastFailed(std::io::Error),
}

// MARK: - Broadcaster

/// Announces a hub on the local subnet until its scope is cancelled.
#[derive(Debug, Clone)]
pub struct Broadcaster {
    announcement: Announcement,
    discovery_port: u16,
    /// Announcement target; tests override the subnet broadcast address.
    target: IpAddr,
}

impl Broadcaster {
    /// Broadcaster announcing `name` as reachable on WebSocket port `port`.
    pub fn new(name: &str, port: u16, discovery_port: u16) -> Self {
        Self {
            announcement: Announcement { name: name.to_owned(), port },
            discovery_port,
            target: IpAddr::V4(Ipv4Addr::BROADCAST),
        }
    }

    /// Broadcaster named after the local machine (the stand's `standNN` host
    /// name is what tablets route on).
    pub fn for_local_host(port: u16, discovery_port: u16) -> Self {
        let name = hostname::get()
            .ok()
            .and_then(|h| h.into_string().ok())
            .unwrap_or_else(|| "standlink-hub".to_owned());
        Self::new(&name, port, discovery_port)
    }

    pub fn with_target(mut self, target: IpAddr) -> Self {
        self.target = target;
        self
    }

    pub fn name(&self) -> &str {
        &self.announcement.name
    }

    /// Spawn the announcement task. It stops when `token` is cancelled.
    pub fn start_broadcasting(&self, token: CancellationToken) {
        let announcement = self.announcement.clone();
        let destination = SocketAddr::new(self.target, self.discovery_port);

        tokio::spawn(async move {
            let socket = match UdpSocket::bind(("0.0.0.0", 0)).await {
                Ok(socket) => socket,
                Err(e) => {
                    warn!("[Discovery] Broadcast socket unavailable: {}", e);
                    return;
                }
            };
            if let Err(e) = socket.set_broadcast(true) {
                warn!("[Discovery] Cannot enable broadcast: {}", e);
                return;
            }

            let payload = match serde_json::to_vec(&announcement) {
                Ok(payload) => payload,
                Err(e) => {
                    warn!("[Discovery] Unserializable announcement: {}", e);
                    return;
                }
            };

            info!("[Discovery] Announcing '{}' to {}", announcement.name, destination);
            loop {
                tokio::select! {
                    _ = token.cancelled() => {
                        debug!("[Discovery] Broadcasting stopped");
                        return;
                    }
                    _ = tokio::time::sleep(ANNOUNCE_INTERVAL) => {}
                }
                if let Err(e) = socket.send_to(&payload, destination).await {
                    debug!("[Discovery] Announcement send failed: {}", e);
                }
            }
        });
    }
}

// MARK: - Listener

/// Browses for hub announcements on the local subnet.
pub struct Listener {
    discovery_port: u16,
}

impl Listener {
    pub fn new(discovery_port: u16) -> Self {
        Self { discovery_port }
    }

    /// Start browsing. Returns a channel that emits one [`PeerInfo`] per
    /// received announcement until `token` is cancelled.
    pub async fn start_browsing(
        &self,
        token: CancellationToken,
    ) -> Result<mpsc::Receiver<PeerInfo>, DiscoveryError> {
        let socket = UdpSocket::bind(("0.0.0.0", self.discovery_port))
            .await
            .map_err(DiscoveryError::BindFailed)?;
        socket.set_broadcast(true).map_err(DiscoveryError::BroadcastFailed)?;

        let (tx, rx) = mpsc::channel(16);

        tokio::spawn(async move {
            let mut buffer = [0u8; MAX_DATAGRAM];
            loop {
                let received = tokio::select! {
                    _ = token.cancelled() => {
                        debug!("[Discovery] Browsing stopped");
                        return;
                    }
                    received = socket.recv_from(&mut buffer) => received,
                };

                let (len, source) = match received {
                    Ok(received) => received,
                    Err(e) => {
                        warn!("[Discovery] Receive failed: {}", e);
                        continue;
                    }
                };

                match serde_json::from_slice::<Announcement>(&buffer[..len]) {
                    Ok(announcement) => {
                        debug!("[Discovery] Found '{}' at {}", announcement.name, source.ip());
                        let peer = PeerInfo {
                            name: announcement.name,
                            address: source.ip(),
                            port: announcement.port,
                        };
                        if tx.send(peer).await.is_err() {
                            debug!("[Discovery] Consumer gone; stopping browse");
                            return;
                        }
                    }
                    Err(e) => debug!("[Discovery] Ignoring malformed announcement: {}", e),
                }
            }
        });

        Ok(rx)
    }
}
