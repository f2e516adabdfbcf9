/// Authentication module
///
/// Password hashing, credential signing/validation, refresh-token
/// bookkeeping and the session lifecycle built on top of them.

mod claims;
mod identity;
mod jwt;
mod password;
mod refresh_token;
mod session;

pub use claims::{Claims, TokenKind};
pub use identity::{Identity, IdentityDirectory, PublicUser, Role, UserAccount};
pub use jwt::TokenCodec;
pub use password::{PasswordHasher, MAX_SECRET_BYTES};
pub use refresh_token::{RefreshRecord, RefreshTokenRepository, RefreshTokenStore};
pub use session::{LoginOutcome, RefreshOutcome, SessionCredentialPair, SessionManager};
