//! WebSocket relay
//!
//! Streams engine output to clients over `/ws/query/{client_id}`.

pub mod handler;
pub mod protocol;
pub mod registry;
pub mod session;

pub use handler::{handle_socket, ws_query_handler};
pub use protocol::{ClientRequest, Envelope, ProtocolError};
pub use registry::{ConnectionError, ConnectionHandle, ConnectionRegistry};
pub use session::SessionOutcome;
