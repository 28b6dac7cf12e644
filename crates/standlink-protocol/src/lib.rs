//! standlink-protocol — command envelopes and dispatch.
//!
//! The wire unit is a single self-describing JSON text frame whose
//! `CommandName` field names the payload shape:
//!
//! ```text
//! {"CommandName":"StandConnectCommand","StandNumber":12,"IsConnect":true}
//! ```
//!
//! [`envelope`] reads and writes frames without knowing the payload shapes;
//! [`registry::CommandRegistry`] maps discriminators to typed decoders and to
//! the business handlers installed at startup.
//!
//! # Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use standlink_core::TrailingDigitsExtractor;
//! use standlink_protocol::{envelope, Command, CommandRegistry};
//! use standlink_protocol::commands::StandConnectCommand;
//!
//! let registry = CommandRegistry::with_builtin_commands(Arc::new(TrailingDigitsExtractor));
//! registry
//!     .set_context_handler("StandConnectCommand", |stand, command| {
//!         println!("stand {} sent {:?}", stand.stand_number, command);
//!         Ok(())
//!     })
//!     .unwrap();
//!
//! let frame = envelope::encode(&Command::StandConnect(StandConnectCommand {
//!     stand_number: 12,
//!     stand_state: None,
//!     is_connect: true,
//! }))
//! .unwrap();
//! let command = registry.decode(&frame).unwrap();
//! registry.dispatch_with_context("stand12", command);
//! ```

pub mod commands;
pub mod envelope;
pub mod registry;

pub use commands::{Command, CommandKind};
pub use registry::CommandRegistry;
