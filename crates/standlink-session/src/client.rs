//! Tablet-side session endpoint.
//!
//! Connects to a discovered laptop hub, keeps exactly one transport alive,
//! and reports every outcome through `Result`s and connectivity events —
//! retry/backoff belongs to the caller.

use std::sync::Arc;

use standlink_core::{EndpointOptions, SessionError};
use standlink_protocol::{Command, CommandRegistry};
use tokio::net::TcpStream;
use tokio::sync::broadcast;
use tokio_tungstenite::MaybeTlsStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::events::EndpointEvent;
use crate::monitor::{monitor_loop, LivenessProbe};
use crate::session::{receive_loop, SessionCore, SessionState};

type ClientStream = MaybeTlsStream<TcpStream>;

/// Client-role session endpoint running on the tablet.
pub struct TabletClient {
    options: EndpointOptions,
    registry: Arc<CommandRegistry>,
    core: Arc<SessionCore<ClientStream>>,
}

impl TabletClient {
    pub fn new(options: EndpointOptions, registry: Arc<CommandRegistry>) -> Self {
        Self { options, registry, core: SessionCore::new() }
    }

    pub fn state(&self) -> SessionState {
        self.core.state()
    }

    /// Connectivity events for UI/logging subscribers. Never blocks emission.
    pub fn subscribe(&self) -> broadcast::Receiver<EndpointEvent> {
        self.core.subscribe()
    }

    /// Open a transport to the configured hub and start the receive loop and
    /// liveness monitor for this connection generation.
    ///
    /// Refuses with [`SessionError::AlreadyConnected`] while a generation is
    /// live. On failure the session stays `Disconnected`; no internal retry.
    pub async fn connect(&self) -> Result<(), SessionError> {
        self.core.begin(SessionState::Connecting)?;

        let token = CancellationToken::new();
        self.core.install_scope(token.clone());

        let url = format!("ws://{}:{}/", self.options.server_address, self.options.port);
        debug!("Connecting to {}", url);

        let stream = match self.open_transport(&url, &token).await {
            Ok(stream) => stream,
            Err(e) => {
                warn!("Connect to {} failed: {}", url, e);
                self.core.abort_attempt();
                return Err(e);
            }
        };

        use futures_util::StreamExt;
        let (sink, source) = stream.split();
        self.core.open(sink).await;
        info!("Connected to {}", url);

        tokio::spawn(receive_loop(
            Arc::clone(&self.core),
            source,
            Arc::clone(&self.registry),
            Some(self.peer_name()),
            token.clone(),
            self.options.close_grace,
        ));
        tokio::spawn(monitor_loop(
            Arc::clone(&self.core),
            LivenessProbe::TcpReach {
                host: self.options.server_address.clone(),
                port: self.options.port,
                timeout: self.options.probe_timeout,
            },
            self.options.monitor_interval,
            self.options.close_grace,
            token,
        ));

        Ok(())
    }

    /// One bounded connect attempt, abandoned early if the lifecycle scope is
    /// cancelled from the outside.
    async fn open_transport(
        &self,
        url: &str,
        token: &CancellationToken,
    ) -> Result<tokio_tungstenite::WebSocketStream<ClientStream>, SessionError> {
        let timeout = self.options.connect_timeout;
        let attempt = async {
            match tokio::time::timeout(timeout, tokio_tungstenite::connect_async(url)).await {
                Err(_) => Err(SessionError::Timeout { ms: timeout.as_millis() as u64 }),
                Ok(Err(e)) => Err(SessionError::Transport { reason: e.to_string() }),
                Ok(Ok((stream, _response))) => Ok(stream),
            }
        };

        tokio::select! {
            _ = token.cancelled() => Err(SessionError::Transport {
                reason: "connect attempt cancelled".to_owned(),
            }),
            result = attempt => result,
        }
    }

    /// Send one command frame. Fails fast when the session is not `Open`;
    /// transport errors surface as a `Result`, never a panic.
    pub async fn send(&self, command: &Command) -> Result<(), SessionError> {
        self.core.send(command).await
    }

    /// Idempotent teardown of the current generation.
    pub async fn disconnect(&self) {
        self.core.disconnect(self.options.close_grace).await;
    }

    /// Raw peer name used for context-carrying dispatch; defaults to the
    /// configured server address (stand hubs are addressed by name).
    fn peer_name(&self) -> String {
        self.options
            .peer_name
            .clone()
            .unwrap_or_else(|| self.options.server_address.clone())
    }
}

/// Convenience loop for callers that want the endpoint kept alive: waits out
/// `reconnect_delay` after every failed attempt or disconnect until `token`
/// is cancelled.
pub async fn run_with_reconnect(client: &TabletClient, token: CancellationToken) {
    let delay = client.options.reconnect_delay;
    let mut events = client.subscribe();

    while !token.is_cancelled() {
        if client.state() == SessionState::Disconnected {
            if let Err(e) = client.connect().await {
                debug!("Reconnect attempt failed: {}", e);
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = tokio::time::sleep(delay) => continue,
                }
            }
        }

        // Wait for the generation to end before trying again.
        tokio::select! {
            _ = token.cancelled() => break,
            event = events.recv() => {
                if matches!(event, Ok(EndpointEvent::Connectivity(false)) | Err(broadcast::error::RecvError::Closed)) {
                    tokio::select! {
                        _ = token.cancelled() => break,
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }
    }

    client.disconnect().await;
}
