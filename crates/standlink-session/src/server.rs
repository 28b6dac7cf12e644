//! Laptop-hub session endpoint.
//!
//! Binds one TCP listener, upgrades inbound connections to WebSocket, and
//! keeps exactly one tablet session alive: a second upgrade replaces the
//! prior transport after tearing it down. The hub never dials out — after a
//! disconnect it simply waits for the next upgrade while the discovery
//! broadcaster keeps announcing it.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex as StdMutex};

use futures_util::StreamExt;
use standlink_core::{EndpointOptions, SessionError};
use standlink_discovery::Broadcaster;
use standlink_protocol::{Command, CommandRegistry};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::events::EndpointEvent;
use crate::monitor::{monitor_loop, LivenessProbe};
use crate::session::{receive_loop, SessionCore, SessionState};

/// Server-role session endpoint running on the laptop hub.
pub struct LaptopServer {
    options: EndpointOptions,
    registry: Arc<CommandRegistry>,
    core: Arc<SessionCore<TcpStream>>,
    server_scope: StdMutex<Option<CancellationToken>>,
    broadcaster: Option<Broadcaster>,
}

impl LaptopServer {
    pub fn new(options: EndpointOptions, registry: Arc<CommandRegistry>) -> Arc<Self> {
        Arc::new(Self {
            options,
            registry,
            core: SessionCore::new(),
            server_scope: StdMutex::new(None),
            broadcaster: None,
        })
    }

    /// Announce this hub over UDP discovery whenever the listener is up.
    pub fn with_broadcaster(
        options: EndpointOptions,
        registry: Arc<CommandRegistry>,
        broadcaster: Broadcaster,
    ) -> Arc<Self> {
        Arc::new(Self {
            options,
            registry,
            core: SessionCore::new(),
            server_scope: StdMutex::new(None),
            broadcaster: Some(broadcaster),
        })
    }

    pub fn state(&self) -> SessionState {
        self.core.state()
    }

    /// Connectivity and server-status events. Never blocks emission.
    pub fn subscribe(&self) -> broadcast::Receiver<EndpointEvent> {
        self.core.subscribe()
    }

    /// Bind the listener and start accepting upgrades. Returns the bound
    /// address (`options.port` may be 0 to let the OS pick one).
    pub async fn start(self: &Arc<Self>) -> Result<SocketAddr, SessionError> {
        let token = CancellationToken::new();
        {
            let mut scope = self.server_scope.lock().unwrap_or_else(|e| e.into_inner());
            if scope.is_some() {
                debug!("Hub already started");
                return Err(SessionError::AlreadyConnected);
            }
            *scope = Some(token.clone());
        }

        let listener = TcpListener::bind(("0.0.0.0", self.options.port))
            .await
            .map_err(|e| SessionError::Transport { reason: e.to_string() })?;
        let addr = listener
            .local_addr()
            .map_err(|e| SessionError::Transport { reason: e.to_string() })?;

        if let Some(broadcaster) = &self.broadcaster {
            broadcaster.start_broadcasting(token.child_token());
        }

        self.core.emit(EndpointEvent::ServerStatus(true));
        info!("Hub listening on {}", addr);

        tokio::spawn(Arc::clone(self).accept_loop(listener, token));
        Ok(addr)
    }

    /// Stop the listener, tear down any active session, and announce the
    /// stopped status. Idempotent.
    pub async fn stop(&self) {
        let token = self
            .server_scope
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        let Some(token) = token else {
            debug!("Hub already stopped");
            return;
        };
        token.cancel();
        self.core.disconnect(self.options.close_grace).await;
        self.core.emit(EndpointEvent::ServerStatus(false));
        info!("Hub stopped");
    }

    /// Send one command to the connected tablet. Fails fast when no session
    /// is `Open`.
    pub async fn send(&self, command: &Command) -> Result<(), SessionError> {
        self.core.send(command).await
    }

    /// Tear down the active session without stopping the listener.
    pub async fn disconnect(&self) {
        self.core.disconnect(self.options.close_grace).await;
    }

    // MARK: - Accept path

    async fn accept_loop(self: Arc<Self>, listener: TcpListener, token: CancellationToken) {
        loop {
            let accepted = tokio::select! {
                _ = token.cancelled() => {
                    debug!("Accept loop stopped");
                    return;
                }
                accepted = listener.accept() => accepted,
            };

            match accepted {
                Ok((stream, peer)) => self.handle_upgrade(stream, peer, &token).await,
                Err(e) => warn!("Accept failed: {}", e),
            }
        }
    }

    async fn handle_upgrade(&self, stream: TcpStream, peer: SocketAddr, token: &CancellationToken) {
        // Single active transport: a newcomer replaces the prior session.
        if self.core.state() != SessionState::Disconnected {
            info!("Replacing active session with upgrade from {}", peer);
            self.core.disconnect(self.options.close_grace).await;
        }

        if let Err(e) = self.core.begin(SessionState::Accepting) {
            warn!("Refusing upgrade from {}: {}", peer, e);
            return;
        }

        if let Err(e) = stream.set_nodelay(true) {
            debug!("set_nodelay failed for {}: {}", peer, e);
        }

        let upgrade = tokio::time::timeout(
            self.options.connect_timeout,
            tokio_tungstenite::accept_async(stream),
        )
        .await;
        let ws = match upgrade {
            Ok(Ok(ws)) => ws,
            Ok(Err(e)) => {
                warn!("WebSocket upgrade from {} failed: {}", peer, e);
                self.core.abort_attempt();
                return;
            }
            Err(_) => {
                warn!("WebSocket upgrade from {} timed out", peer);
                self.core.abort_attempt();
                return;
            }
        };

        let session_token = token.child_token();
        self.core.install_scope(session_token.clone());

        let (sink, source) = ws.split();
        self.core.open(sink).await;
        info!("Tablet connected from {}", peer);

        tokio::spawn(receive_loop(
            Arc::clone(&self.core),
            source,
            Arc::clone(&self.registry),
            self.options.peer_name.clone(),
            session_token.clone(),
            self.options.close_grace,
        ));
        tokio::spawn(monitor_loop(
            Arc::clone(&self.core),
            LivenessProbe::PingPong { stale_after: self.options.stale_after() },
            self.options.monitor_interval,
            self.options.close_grace,
            session_token,
        ));
    }
}
