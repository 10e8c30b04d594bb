//! Authenticator implementation
//!
//! Applies credentials to outgoing requests. Service-account access tokens
//! are exchanged on first use and reused until shortly before they expire.

use super::types::{CachedToken, ServiceAccountAuth, JWT_BEARER_GRANT};
use crate::error::{Error, Result};
use chrono::Utc;
use reqwest::{Client, RequestBuilder};
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// Attaches a service-account access token to HTTP requests
pub struct Authenticator {
    account: ServiceAccountAuth,
    token: Arc<RwLock<Option<CachedToken>>>,
    http_client: Client,
}

impl Authenticator {
    /// Token exchanges go through `http_client`
    pub fn new(account: ServiceAccountAuth, http_client: Client) -> Self {
        Self {
            account,
            token: Arc::new(RwLock::new(None)),
            http_client,
        }
    }

    /// Add a bearer token to a request builder
    pub async fn apply(&self, req: RequestBuilder) -> Result<RequestBuilder> {
        let token = self.access_token().await?;
        Ok(req.bearer_auth(token))
    }

    /// Cached access token, exchanging a fresh assertion when needed
    async fn access_token(&self) -> Result<String> {
        if let Some(token) = self.token.read().await.as_ref().filter(|t| !t.is_expired()) {
            return Ok(token.token.clone());
        }

        let mut slot = self.token.write().await;
        // Another task may have refreshed while we waited for the write lock
        if let Some(token) = slot.as_ref().filter(|t| !t.is_expired()) {
            return Ok(token.token.clone());
        }

        let fresh = self.exchange().await?;
        let value = fresh.token.clone();
        *slot = Some(fresh);
        Ok(value)
    }

    /// Trade a signed assertion for an access token
    async fn exchange(&self) -> Result<CachedToken> {
        let account = &self.account;
        let assertion = account.assertion(Utc::now().timestamp())?;
        debug!(
            "Exchanging assertion for {} at {}",
            account.client_email, account.token_url
        );

        let response = self
            .http_client
            .post(&account.token_url)
            .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
            .send()
            .await
            .map_err(|e| Error::auth(format!("Token request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::JwtGeneration {
                message: format!("Token exchange failed with status {}: {body}", status.as_u16()),
            });
        }

        let grant: TokenGrant = response
            .json()
            .await
            .map_err(|e| Error::auth(format!("Malformed token response: {e}")))?;

        Ok(match grant.expires_in {
            Some(secs) => CachedToken::expires_in(grant.access_token, secs),
            None => CachedToken::new(grant.access_token, None),
        })
    }
}

impl std::fmt::Debug for Authenticator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Authenticator")
            .field("client_email", &self.account.client_email)
            .finish_non_exhaustive()
    }
}

/// Successful token endpoint response
#[derive(Debug, Deserialize)]
struct TokenGrant {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
}
