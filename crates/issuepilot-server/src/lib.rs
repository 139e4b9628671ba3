//! HTTP surface for the issue assistant.
//!
//! One endpoint, `POST /githubAssistant/respondToIssue`, accepts the three
//! request shapes and drives the research pipeline; `GET /health` reports
//! the tool-provider bridge status.

pub mod error;
pub mod routes;
pub mod server;
pub mod state;

pub use error::{ApiError, INTERNAL_ERROR_MESSAGE};
pub use server::{run_server, run_server_with_state};
pub use state::ServerState;
