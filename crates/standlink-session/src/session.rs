//! Shared session state and the receive loop, generic over the transport's
//! underlying stream (plain TCP on the hub, maybe-TLS on the tablet).

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex, MutexGuard};
use std::time::{Duration, Instant};

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use standlink_core::SessionError;
use standlink_protocol::{envelope, Command, CommandRegistry};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{broadcast, Mutex as AsyncMutex};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::events::EndpointEvent;

// MARK: - SessionState

/// Lifecycle of one connection generation. The endpoint itself is reusable:
/// `Disconnected` is terminal per generation only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Accepting,
    Open,
    Closing,
    Faulted,
}

pub(crate) type WsSink<S> = SplitSink<WebSocketStream<S>, Message>;
pub(crate) type WsSource<S> = SplitStream<WebSocketStream<S>>;

// MARK: - SessionCore

/// State shared between an endpoint's public API and its background tasks.
///
/// Invariants:
/// - at most one transport (the `writer` slot) exists per session;
/// - all writes go through the `writer` async mutex, one frame at a time;
/// - teardown runs exactly once per generation: the first `disconnect` caller
///   flips the state to `Closing` under the state lock, later callers return.
pub(crate) struct SessionCore<S> {
    state: StdMutex<SessionState>,
    scope: StdMutex<Option<CancellationToken>>,
    writer: AsyncMutex<Option<WsSink<S>>>,
    events: broadcast::Sender<EndpointEvent>,
    /// Milliseconds since `epoch` of the last inbound frame of any kind.
    last_rx: AtomicU64,
    epoch: Instant,
}

impl<S> SessionCore<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    pub(crate) fn new() -> Arc<Self> {
        let (events, _) = broadcast::channel(16);
        Arc::new(Self {
            state: StdMutex::new(SessionState::Disconnected),
            scope: StdMutex::new(None),
            writer: AsyncMutex::new(None),
            events,
            last_rx: AtomicU64::new(0),
            epoch: Instant::now(),
        })
    }

    pub(crate) fn subscribe(&self) -> broadcast::Receiver<EndpointEvent> {
        self.events.subscribe()
    }

    pub(crate) fn emit(&self, event: EndpointEvent) {
        let _ = self.events.send(event);
    }

    pub(crate) fn state(&self) -> SessionState {
        *self.lock_state()
    }

    /// Claim the session for a new connection attempt. Refused unless the
    /// session is fully `Disconnected`.
    pub(crate) fn begin(&self, target: SessionState) -> Result<(), SessionError> {
        let mut state = self.lock_state();
        match *state {
            SessionState::Disconnected => {
                *state = target;
                Ok(())
            }
            _ => Err(SessionError::AlreadyConnected),
        }
    }

    /// Roll a failed connect attempt back to `Disconnected` without emitting
    /// any connectivity event (the transport was never `Open`).
    pub(crate) fn abort_attempt(&self) {
        self.scope.lock().unwrap_or_else(|e| e.into_inner()).take();
        let mut state = self.lock_state();
        if matches!(*state, SessionState::Connecting | SessionState::Accepting) {
            *state = SessionState::Disconnected;
        }
    }

    pub(crate) fn install_scope(&self, token: CancellationToken) {
        let previous = self
            .scope
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .replace(token);
        if let Some(previous) = previous {
            previous.cancel();
        }
    }

    /// Install the transport and transition to `Open`.
    pub(crate) async fn open(&self, sink: WsSink<S>) {
        *self.writer.lock().await = Some(sink);
        self.touch();
        *self.lock_state() = SessionState::Open;
        self.emit(EndpointEvent::Connectivity(true));
    }

    // MARK: - Send path

    /// Serialize `command` and write it as one text frame. Concurrent callers
    /// queue on the writer mutex; frames hit the wire in acquisition order.
    pub(crate) async fn send(&self, command: &Command) -> Result<(), SessionError> {
        if self.state() != SessionState::Open {
            return Err(SessionError::NotConnected);
        }
        let text = envelope::encode(command)?;
        self.write_message(Message::Text(text)).await
    }

    /// Out-of-band ping used by the liveness monitor; shares the send lock so
    /// it can never interleave with a command frame.
    pub(crate) async fn send_ping(&self) -> Result<(), SessionError> {
        self.write_message(Message::Ping(Vec::new())).await
    }

    async fn write_message(&self, message: Message) -> Result<(), SessionError> {
        let mut writer = self.writer.lock().await;
        let sink = writer.as_mut().ok_or(SessionError::NotConnected)?;
        sink.send(message).await.map_err(|e| {
            warn!("Frame write failed: {}", e);
            SessionError::Transport { reason: e.to_string() }
        })
    }

    // MARK: - Liveness bookkeeping

    pub(crate) fn touch(&self) {
        self.last_rx.store(self.epoch.elapsed().as_millis() as u64, Ordering::Relaxed);
    }

    pub(crate) fn last_rx_age(&self) -> Duration {
        let now = self.epoch.elapsed().as_millis() as u64;
        Duration::from_millis(now.saturating_sub(self.last_rx.load(Ordering::Relaxed)))
    }

    // MARK: - Teardown

    /// Transition to `Faulted` on an unrecoverable transport error; the
    /// follow-up `disconnect` routes it through `Closing` to `Disconnected`.
    pub(crate) fn fault(&self) {
        let mut state = self.lock_state();
        if matches!(
            *state,
            SessionState::Open | SessionState::Connecting | SessionState::Accepting
        ) {
            *state = SessionState::Faulted;
        }
    }

    /// Idempotent teardown. Cancels the lifecycle scope, attempts a graceful
    /// close bounded by `grace`, releases the transport, and emits
    /// `Connectivity(false)` exactly once per generation.
    pub(crate) async fn disconnect(&self, grace: Duration) {
        {
            let mut state = self.lock_state();
            match *state {
                SessionState::Disconnected | SessionState::Closing => return,
                _ => *state = SessionState::Closing,
            }
        }

        if let Some(token) = self.scope.lock().unwrap_or_else(|e| e.into_inner()).take() {
            token.cancel();
        }

        let sink = self.writer.lock().await.take();
        if let Some(mut sink) = sink {
            match tokio::time::timeout(grace, sink.close()).await {
                Err(_) => warn!("Close handshake exceeded {:?}; dropping transport", grace),
                Ok(Err(e)) => debug!("Close handshake failed: {}", e),
                Ok(Ok(())) => debug!("Transport closed cleanly"),
            }
        }

        *self.lock_state() = SessionState::Disconnected;
        self.emit(EndpointEvent::Connectivity(false));
        info!("Session disconnected");
    }

    fn lock_state(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

// MARK: - Receive loop

/// Pulls frames until the lifecycle scope is cancelled or the transport dies.
///
/// Decode/dispatch failures skip the frame and keep the loop alive; transport
/// failures fault the session and trigger teardown.
pub(crate) async fn receive_loop<S>(
    core: Arc<SessionCore<S>>,
    mut source: WsSource<S>,
    registry: Arc<CommandRegistry>,
    peer_name: Option<String>,
    token: CancellationToken,
    grace: Duration,
) where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    loop {
        // Biased: a cancelled scope always wins over a ready frame, so a loop
        // whose generation was already torn down never runs teardown itself.
        let frame = tokio::select! {
            biased;
            _ = token.cancelled() => {
                debug!("Receive loop stopped by lifecycle scope");
                return;
            }
            frame = source.next() => frame,
        };

        match frame {
            Some(Ok(message)) => {
                core.touch();
                match message {
                    Message::Text(text) => {
                        submit_frame(&registry, peer_name.as_deref(), &text);
                        continue;
                    }
                    Message::Close(_) => info!("Peer sent close frame"),
                    // Pings are answered by the transport; pongs only matter
                    // for the `last_rx` timestamp refreshed above.
                    Message::Ping(_) | Message::Pong(_) => continue,
                    other => {
                        debug!("Ignoring non-text frame: {:?}", other);
                        continue;
                    }
                }
            }
            Some(Err(e)) => warn!("Receive failed: {}", e),
            None => info!("Transport closed by peer"),
        }

        // The scope may have been cancelled while the frame was in hand; a
        // stale loop must not fault a replacement session.
        if token.is_cancelled() {
            debug!("Receive loop stopped by lifecycle scope");
            return;
        }
        core.fault();
        core.disconnect(grace).await;
        return;
    }
}

/// Decode one frame and hand it to dispatch on a separate task, so the
/// receive loop never waits on business logic.
fn submit_frame(registry: &Arc<CommandRegistry>, peer_name: Option<&str>, text: &str) {
    match registry.decode(text) {
        Ok(command) => {
            debug!("Received {} frame", command.discriminator());
            match peer_name {
                Some(peer) => registry.dispatch_with_context_async(peer, command),
                None => registry.dispatch_async(command),
            }
        }
        Err(e) => warn!("Dropping frame: {}", e),
    }
}
