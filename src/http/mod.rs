//! HTTP API for driving task sessions from the assessment UI
//!
//! - POST /sessions - Create a session and begin recording
//! - POST /sessions/:id/end - Stop recording early
//! - POST /sessions/:id/retry - Retry denied devices, then begin
//! - DELETE /sessions/:id - Dispose a session and release its devices
//! - GET /sessions/:id/status - Query session status
//! - GET /health - Health check

mod handlers;
mod routes;
mod state;

pub use routes::create_router;
pub use state::AppState;
