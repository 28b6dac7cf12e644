//! Discriminator-keyed command catalog and handler dispatch.
//!
//! All shapes a process can handle are registered once at startup
//! ([`CommandRegistry::with_builtin_commands`]); inbound frames are resolved
//! against that table, never against runtime type information. Handlers are
//! opt-in: dispatching a command nobody registered for is a silent no-op.

use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::de::DeserializeOwned;
use standlink_core::{IdentityExtractor, ProtocolError, StandInfo};
use tracing::{debug, warn};

use crate::commands::{Command, CommandKind};
use crate::envelope;

// MARK: - Table entries

/// Decodes one frame into its concrete payload, wrapped in [`Command`].
pub type ShapeDecoder = Arc<dyn Fn(&str) -> Result<Command, ProtocolError> + Send + Sync>;

type Handler = Arc<dyn Fn(Command) -> anyhow::Result<()> + Send + Sync>;
type ContextHandler = Arc<dyn Fn(StandInfo, Command) -> anyhow::Result<()> + Send + Sync>;

/// Per-shape handler slot. At most one of the two flavors is populated.
#[derive(Default, Clone)]
enum HandlerSlot {
    #[default]
    None,
    Plain(Handler),
    WithContext(ContextHandler),
}

#[derive(Clone)]
struct Registration {
    decoder: ShapeDecoder,
    handler: HandlerSlot,
}

// MARK: - CommandRegistry

/// Catalog of known discriminators, their decoders, and their handlers.
///
/// One registry instance is shared (via `Arc`) by every session endpoint of
/// the process; handler slots may be installed after construction by business
/// code.
pub struct CommandRegistry {
    shapes: RwLock<HashMap<String, Registration>>,
    extractor: Arc<dyn IdentityExtractor>,
}

impl CommandRegistry {
    /// Empty catalog. Useful for tests; production code wants
    /// [`with_builtin_commands`](Self::with_builtin_commands).
    pub fn new(extractor: Arc<dyn IdentityExtractor>) -> Arc<Self> {
        Arc::new(Self { shapes: RwLock::new(HashMap::new()), extractor })
    }

    /// Catalog pre-populated with every shape in [`CommandKind::ALL`].
    pub fn with_builtin_commands(extractor: Arc<dyn IdentityExtractor>) -> Arc<Self> {
        let registry = Self::new(extractor);
        for kind in CommandKind::ALL {
            registry.register_shape(kind.discriminator(), builtin_decoder(kind));
        }
        registry
    }

    /// Register (or replace) the decoder for `discriminator`. Re-registration
    /// keeps any previously installed handler; the latest decoder wins.
    pub fn register_shape(&self, discriminator: &str, decoder: ShapeDecoder) {
        self.write_shapes()
            .entry(discriminator.to_owned())
            .and_modify(|registration| registration.decoder = Arc::clone(&decoder))
            .or_insert(Registration { decoder, handler: HandlerSlot::None });
    }

    /// Resolve a discriminator to its decoder.
    pub fn resolve_shape(&self, discriminator: &str) -> Result<ShapeDecoder, ProtocolError> {
        self.read_shapes()
            .get(discriminator)
            .map(|registration| Arc::clone(&registration.decoder))
            .ok_or_else(|| ProtocolError::UnknownCommand { name: discriminator.to_owned() })
    }

    /// Decode one frame: discriminator extraction, shape resolution, typed
    /// payload decode.
    pub fn decode(&self, text: &str) -> Result<Command, ProtocolError> {
        let discriminator = envelope::decode_kind(text)?;
        let decoder = self.resolve_shape(&discriminator)?;
        decoder(text)
    }

    // MARK: - Handler registration

    /// Install the context-free handler for `discriminator`, replacing any
    /// prior slot content.
    pub fn set_handler<F>(&self, discriminator: &str, handler: F) -> Result<(), ProtocolError>
    where
        F: Fn(Command) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.set_slot(discriminator, HandlerSlot::Plain(Arc::new(handler)))
    }

    /// Install the context-carrying handler for `discriminator`, replacing any
    /// prior slot content.
    pub fn set_context_handler<F>(&self, discriminator: &str, handler: F) -> Result<(), ProtocolError>
    where
        F: Fn(StandInfo, Command) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.set_slot(discriminator, HandlerSlot::WithContext(Arc::new(handler)))
    }

    fn set_slot(&self, discriminator: &str, slot: HandlerSlot) -> Result<(), ProtocolError> {
        let mut shapes = self.write_shapes();
        let registration = shapes
            .get_mut(discriminator)
            .ok_or_else(|| ProtocolError::UnknownCommand { name: discriminator.to_owned() })?;
        registration.handler = slot;
        Ok(())
    }

    // MARK: - Dispatch

    /// Invoke the context-free handler for the command's shape, if installed.
    pub fn dispatch(&self, command: Command) {
        let discriminator = command.discriminator();
        match self.handler_slot(discriminator) {
            HandlerSlot::Plain(handler) => {
                if let Err(e) = handler(command) {
                    warn!("Handler for {} failed: {:#}", discriminator, e);
                }
            }
            _ => debug!("No handler registered for {}; dropping", discriminator),
        }
    }

    /// Resolve `peer_name_raw` into a [`StandInfo`] and invoke the
    /// context-carrying handler for the command's shape. Shapes that only
    /// installed a context-free handler still get the command: one slot per
    /// shape is populated in practice, and the peer context is droppable.
    pub fn dispatch_with_context(&self, peer_name_raw: &str, command: Command) {
        let discriminator = command.discriminator();
        match self.handler_slot(discriminator) {
            HandlerSlot::WithContext(handler) => {
                let stand = match self.extractor.extract(peer_name_raw) {
                    Ok(stand) => stand,
                    Err(e) => {
                        warn!("Cannot resolve peer '{}': {}", peer_name_raw, e);
                        return;
                    }
                };
                if let Err(e) = handler(stand, command) {
                    warn!("Context handler for {} failed: {:#}", discriminator, e);
                }
            }
            HandlerSlot::Plain(handler) => {
                if let Err(e) = handler(command) {
                    warn!("Handler for {} failed: {:#}", discriminator, e);
                }
            }
            HandlerSlot::None => debug!("No handler registered for {}; dropping", discriminator),
        }
    }

    /// Run [`dispatch`](Self::dispatch) on a separate task so a receive loop
    /// is never blocked by slow business logic.
    pub fn dispatch_async(self: &Arc<Self>, command: Command) {
        let registry = Arc::clone(self);
        tokio::spawn(async move { registry.dispatch(command) });
    }

    /// Async flavor of [`dispatch_with_context`](Self::dispatch_with_context).
    pub fn dispatch_with_context_async(self: &Arc<Self>, peer_name_raw: &str, command: Command) {
        let registry = Arc::clone(self);
        let peer = peer_name_raw.to_owned();
        tokio::spawn(async move { registry.dispatch_with_context(&peer, command) });
    }

    fn handler_slot(&self, discriminator: &str) -> HandlerSlot {
        self.read_shapes()
            .get(discriminator)
            .map(|registration| registration.handler.clone())
            .unwrap_or(HandlerSlot::None)
    }

    // Lock poisoning cannot leave the table half-written; recover the guard.
    fn read_shapes(&self) -> RwLockReadGuard<'_, HashMap<String, Registration>> {
        self.shapes.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_shapes(&self) -> RwLockWriteGuard<'_, HashMap<String, Registration>> {
        self.shapes.write().unwrap_or_else(|e| e.into_inner())
    }
}

// MARK: - Builtin decoders

fn builtin_decoder(kind: CommandKind) -> ShapeDecoder {
    match kind {
        CommandKind::EmergencyShutdown => typed_decoder(kind, Command::EmergencyShutdown),
        CommandKind::Notification => typed_decoder(kind, Command::Notification),
        CommandKind::RestoredState => typed_decoder(kind, Command::RestoredState),
        CommandKind::Sensor => typed_decoder(kind, Command::Sensor),
        CommandKind::StandConnect => typed_decoder(kind, Command::StandConnect),
        CommandKind::StandState => typed_decoder(kind, Command::StandState),
    }
}

fn typed_decoder<T, F>(kind: CommandKind, wrap: F) -> ShapeDecoder
where
    T: DeserializeOwned,
    F: Fn(T) -> Command + Send + Sync + 'static,
{
    Arc::new(move |text| envelope::decode_typed(kind.discriminator(), text).map(&wrap))
}
