pub mod config;
pub mod errors;
pub mod naming;
pub mod types;

pub use config::EndpointOptions;
pub use errors::{NamingError, ProtocolError, SessionError};
pub use naming::{IdentityExtractor, StandInfo, StandNameValidator, TrailingDigitsExtractor};
pub use types::*;
