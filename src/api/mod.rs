//! HTTP surface of the analysis service.
//!
//! A thin wrapper over [`crate::core_state::CoreState`]: handlers parse
//! the request, hand blocking work to `spawn_blocking`, and map pipeline
//! errors onto structured JSON responses.

pub mod endpoints;
pub mod error;
pub mod middleware;
pub mod router;
pub mod server;
pub mod types;

pub use router::api_router;
pub use server::{start_server, ApiServer, ApiSession};
pub use types::ApiContext;
