use std::time::Duration;

/// Tuning knobs shared by both session roles.
///
/// The tablet fills in `server_address` from discovery (or operator input);
/// the laptop hub leaves it empty and binds `port` locally.
#[derive(Debug, Clone, PartialEq)]
pub struct EndpointOptions {
    /// Peer network name or address the tablet connects to.
    pub server_address: String,
    /// WebSocket port (hub listens, tablet connects).
    pub port: u16,
    /// UDP port for discovery announcements.
    pub discovery_port: u16,
    /// Raw peer name used for context-carrying dispatch. Defaults to
    /// `server_address` on the tablet side when unset.
    pub peer_name: Option<String>,
    /// Bound on a single connect attempt.
    pub connect_timeout: Duration,
    /// Bound on one out-of-band reachability probe.
    pub probe_timeout: Duration,
    /// Liveness monitor polling interval.
    pub monitor_interval: Duration,
    /// Grace period for the closing handshake during teardown.
    pub close_grace: Duration,
    /// Suggested pause between caller-driven reconnect attempts.
    pub reconnect_delay: Duration,
}

impl Default for EndpointOptions {
    fn default() -> Self {
        Self {
            server_address: String::new(),
            port: 8080,
            discovery_port: 15000,
            peer_name: None,
            connect_timeout: Duration::from_secs(1),
            probe_timeout: Duration::from_secs(2),
            monitor_interval: Duration::from_secs(1),
            close_grace: Duration::from_millis(500),
            reconnect_delay: Duration::from_secs(1),
        }
    }
}

impl EndpointOptions {
    /// Options for a tablet connecting to `server_address`.
    pub fn for_server(server_address: &str) -> Self {
        Self { server_address: server_address.to_owned(), ..Self::default() }
    }

    /// Stands probe each other less aggressively than they poll; a peer is
    /// considered stale after missing this many monitor intervals.
    pub fn stale_after(&self) -> Duration {
        self.monitor_interval * 3
    }
}
