//! Authentication module
//!
//! Google service accounts: a signed assertion is exchanged for an access
//! token. The `Authenticator` applies that token to outgoing destination
//! requests and caches it until shortly before it expires.

mod authenticator;
mod types;

pub use authenticator::Authenticator;
pub use types::{
    AssertionClaims, CachedToken, ServiceAccountAuth, BIGQUERY_SCOPE, JWT_BEARER_GRANT,
};
