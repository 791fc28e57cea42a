pub mod error;
pub mod handlers;
pub mod logging;
pub mod server;
pub mod staging;
pub mod state;
pub mod websocket;

pub use error::{ApiError, ErrorResponse};
pub use server::{create_router, run_server, serve};
pub use staging::{ImageStore, StagedImage, StagedRef, StagingError};
pub use state::{AppState, ConnectionLimits};
pub use websocket::{ConnectionHandle, ConnectionRegistry, Envelope, SessionOutcome};
