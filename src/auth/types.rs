//! Authentication types
//!
//! Service-account assertion settings and the cached access token.

use crate::config::GcpCredentials;
use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde::Serialize;

/// OAuth2 scope granting BigQuery read/write access
pub const BIGQUERY_SCOPE: &str = "https://www.googleapis.com/auth/bigquery";

/// Grant type of the signed-assertion token exchange (RFC 7523)
pub const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";

/// Google caps assertion lifetime at one hour
const MAX_ASSERTION_LIFETIME_SECS: i64 = 3600;

// ============================================================================
// Service Account
// ============================================================================

/// Signed-assertion settings for one service account
#[derive(Clone)]
pub struct ServiceAccountAuth {
    /// Service-account email, the assertion issuer
    pub client_email: String,
    /// Token endpoint; also the assertion audience
    pub token_url: String,
    /// Space separated OAuth2 scopes
    pub scope: String,
    /// Assertion lifetime in seconds
    pub lifetime_secs: i64,
    private_key: String,
}

impl ServiceAccountAuth {
    /// Build assertion settings from resolved credentials
    pub fn new(
        credentials: &GcpCredentials,
        token_url: impl Into<String>,
        scope: impl Into<String>,
    ) -> Self {
        Self {
            client_email: credentials.client_email().to_string(),
            token_url: token_url.into(),
            scope: scope.into(),
            lifetime_secs: MAX_ASSERTION_LIFETIME_SECS,
            private_key: credentials.private_key().to_string(),
        }
    }

    /// Set the assertion lifetime, capped at one hour
    #[must_use]
    pub fn with_lifetime(mut self, secs: i64) -> Self {
        self.lifetime_secs = secs.clamp(1, MAX_ASSERTION_LIFETIME_SECS);
        self
    }

    /// Claims of an assertion issued at `issued_at` (unix seconds)
    pub fn claims(&self, issued_at: i64) -> AssertionClaims {
        AssertionClaims {
            iss: self.client_email.clone(),
            scope: self.scope.clone(),
            aud: self.token_url.clone(),
            iat: issued_at,
            exp: issued_at + self.lifetime_secs,
        }
    }

    /// Sign an assertion issued at `issued_at`
    pub fn assertion(&self, issued_at: i64) -> Result<String> {
        let key = EncodingKey::from_rsa_pem(self.private_key.as_bytes()).map_err(|e| {
            Error::JwtGeneration {
                message: format!("Invalid private key: {e}"),
            }
        })?;

        jsonwebtoken::encode(&Header::new(Algorithm::RS256), &self.claims(issued_at), &key)
            .map_err(|e| Error::JwtGeneration {
                message: format!("Failed to sign assertion: {e}"),
            })
    }
}

impl std::fmt::Debug for ServiceAccountAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceAccountAuth")
            .field("client_email", &self.client_email)
            .field("token_url", &self.token_url)
            .field("scope", &self.scope)
            .field("lifetime_secs", &self.lifetime_secs)
            .field("private_key", &"<redacted>")
            .finish()
    }
}

/// Claims of a service-account assertion
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AssertionClaims {
    /// Issuer (service-account email)
    pub iss: String,
    /// Requested scopes
    pub scope: String,
    /// Audience (token endpoint)
    pub aud: String,
    /// Issued at
    pub iat: i64,
    /// Expiry
    pub exp: i64,
}

// ============================================================================
// Token Cache Entry
// ============================================================================

/// Cached token with expiration
#[derive(Debug, Clone)]
pub struct CachedToken {
    /// The access token
    pub token: String,
    /// When the token expires
    pub expires_at: Option<DateTime<Utc>>,
}

impl CachedToken {
    /// Create a new cached token
    pub fn new(token: String, expires_at: Option<DateTime<Utc>>) -> Self {
        Self { token, expires_at }
    }

    /// Create a token that expires in N seconds from now
    pub fn expires_in(token: String, seconds: i64) -> Self {
        Self::new(token, Some(Utc::now() + chrono::Duration::seconds(seconds)))
    }

    /// Expired, or within 30 seconds of expiring
    pub fn is_expired(&self) -> bool {
        self.expires_at
            .is_some_and(|at| Utc::now() + chrono::Duration::seconds(30) >= at)
    }
}

#[cfg(test)]
mod type_tests {
    use super::*;

    fn service_account() -> ServiceAccountAuth {
        let key = include_str!("../../tests/fixtures/service_account_key.pem");
        let creds = GcpCredentials::new("loader@demo.iam", key, "demo").unwrap();
        ServiceAccountAuth::new(&creds, "https://oauth2.googleapis.com/token", BIGQUERY_SCOPE)
    }

    #[test]
    fn test_cached_token_expiry() {
        assert!(!CachedToken::expires_in("t".to_string(), 3600).is_expired());
        assert!(CachedToken::expires_in("t".to_string(), -100).is_expired());
        // inside the 30s buffer
        assert!(CachedToken::expires_in("t".to_string(), 10).is_expired());
        assert!(!CachedToken::new("t".to_string(), None).is_expired());
    }

    #[test]
    fn test_assertion_claims() {
        let claims = service_account().claims(1_700_000_000);

        assert_eq!(
            claims,
            AssertionClaims {
                iss: "loader@demo.iam".to_string(),
                scope: BIGQUERY_SCOPE.to_string(),
                aud: "https://oauth2.googleapis.com/token".to_string(),
                iat: 1_700_000_000,
                exp: 1_700_003_600,
            }
        );
    }

    #[test]
    fn test_lifetime_is_capped() {
        let sa = service_account().with_lifetime(7200);
        assert_eq!(sa.lifetime_secs, 3600);
        let sa = service_account().with_lifetime(600);
        assert_eq!(sa.claims(0).exp, 600);
    }

    #[test]
    fn test_assertion_is_rs256_jwt() {
        let jwt = service_account().assertion(1_700_000_000).unwrap();
        assert_eq!(jwt.split('.').count(), 3);
        let header = jsonwebtoken::decode_header(&jwt).unwrap();
        assert_eq!(header.alg, Algorithm::RS256);
    }

    #[test]
    fn test_debug_redacts_key() {
        let debug = format!("{:?}", service_account());
        assert!(debug.contains("<redacted>"));
        assert!(!debug.contains("PRIVATE KEY"));
    }
}
