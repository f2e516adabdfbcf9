/// Middleware module
///
/// Credential gating and request logging.

mod auth_gate;
mod request_logger;

pub use auth_gate::{authenticate, bearer_token, AuthGate, AuthenticatedUser};
pub use request_logger::RequestLogger;
