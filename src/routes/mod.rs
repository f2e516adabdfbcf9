mod auth;
mod health_check;

pub use auth::{login, logout, refresh, validate};
pub use health_check::health_check;
