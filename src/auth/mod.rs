//! Authentication and third-party token handling.
//!
//! Users are authenticated by a trusted reverse proxy that forwards their
//! identity in headers. Stored OAuth tokens for external identity providers
//! are refreshed under a row lock so concurrent refreshes cannot clobber a
//! rotated refresh token.

mod error;
mod identity;
mod oauth_client;
mod token_refresh;

pub use error::AuthError;
pub use identity::{Identity, identity_middleware};
pub use oauth_client::OAuthTokenRefresher;
pub use token_refresh::{RefreshError, TokenRefreshError, TokenRefreshGuard, TokenRefresher};
