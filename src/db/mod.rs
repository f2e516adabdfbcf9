/// Storage collaborators
///
/// Postgres implementations for production and in-process ones for tests
/// and local runs.

pub mod memory;
pub mod postgres;

pub use memory::{InMemoryDirectory, InMemoryRefreshTokens};
pub use postgres::{PgDirectory, PgRefreshTokens};
