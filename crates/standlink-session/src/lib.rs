//! standlink-session — session lifecycle for the tablet/laptop pair.
//!
//! Each side of the link is a session endpoint owning at most one WebSocket
//! transport at a time:
//!
//! ```text
//! Tablet (mobile)                         Laptop hub (stationary)
//! ───────────────────                     ───────────────────────
//! TabletClient ───── ws://host:8080/ ───► LaptopServer
//!   ├─ receive loop                         ├─ receive loop
//!   └─ liveness monitor (TCP probe)         └─ liveness monitor (ping/stale)
//! ```
//!
//! An `Open` session runs exactly two background tasks — the receive loop and
//! the liveness monitor — both scoped to one [`CancellationToken`] per
//! connection generation. Cancelling that token is the single mechanism that
//! stops them; `disconnect()` is idempotent and safe to call from the monitor,
//! the receive loop, and external callers concurrently.
//!
//! The monitor exists because a WebSocket can report itself open long after
//! the underlying Wi-Fi link died. It never reconnects by itself: the tablet
//! retries on its own schedule, the hub simply waits for the next upgrade.
//!
//! [`CancellationToken`]: tokio_util::sync::CancellationToken

pub mod client;
pub mod events;
pub mod server;

mod monitor;
mod session;

pub use client::{run_with_reconnect, TabletClient};
pub use events::{EndpointEvent, StandEvent, StandNotifier};
pub use server::LaptopServer;
pub use session::SessionState;
