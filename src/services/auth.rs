// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! OAuth2 token lifecycle for the fleet API.
//!
//! Exactly one token record is authoritative. Callers ask
//! [`TokenManager::get_valid_token`] before every authenticated call; it
//! refreshes when the stored token is missing, expired or about to expire.

use async_trait::async_trait;
use chrono::Duration;
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::db::Store;
use crate::error::AppError;
use crate::models::AuthToken;
use crate::services::http::{build_client, check_response_json, Upstream};
use crate::time_utils::Clock;

/// Margin before token expiration when we proactively refresh (5 minutes).
pub const TOKEN_REFRESH_MARGIN_SECS: i64 = 5 * 60;

/// Token endpoint response.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenGrant {
    pub access_token: String,
    pub refresh_token: String,
    /// Lifetime in seconds, relative to the exchange
    pub expires_in: i64,
}

/// Refresh-token exchange.
#[async_trait]
pub trait AuthApi: Send + Sync {
    async fn exchange_refresh_token(&self, refresh_token: &str) -> Result<TokenGrant, AppError>;
}

/// HTTP client for the token endpoint.
#[derive(Clone)]
pub struct AuthClient {
    http: reqwest::Client,
    token_url: String,
}

impl AuthClient {
    pub fn new(token_url: String, timeout: std::time::Duration) -> Self {
        Self {
            http: build_client(timeout),
            token_url,
        }
    }
}

#[async_trait]
impl AuthApi for AuthClient {
    async fn exchange_refresh_token(&self, refresh_token: &str) -> Result<TokenGrant, AppError> {
        let response = self
            .http
            .post(&self.token_url)
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
            ])
            .send()
            .await
            .map_err(|e| AppError::Auth(format!("Token refresh request failed: {}", e)))?;

        check_response_json(Upstream::Auth, response).await
    }
}

/// Hands out valid access tokens, refreshing and persisting as needed.
pub struct TokenManager {
    auth: Arc<dyn AuthApi>,
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
    /// Fallback when the store holds no refresh token
    bootstrap_refresh_token: Option<String>,
    /// Serializes refreshes within this process.
    refresh_lock: Mutex<()>,
}

impl TokenManager {
    pub fn new(
        auth: Arc<dyn AuthApi>,
        store: Arc<dyn Store>,
        clock: Arc<dyn Clock>,
        bootstrap_refresh_token: Option<String>,
    ) -> Self {
        Self {
            auth,
            store,
            clock,
            bootstrap_refresh_token,
            refresh_lock: Mutex::new(()),
        }
    }

    /// Get a valid access token.
    ///
    /// 1. A stored token more than 5 minutes from expiry is returned as is
    /// 2. Otherwise take the refresh lock and re-check (another task may
    ///    have refreshed while we waited)
    /// 3. Refresh with the stored refresh token, or the bootstrap token
    ///    when nothing is stored
    pub async fn get_valid_token(&self) -> Result<String, AppError> {
        if let Some(token) = self.usable_token().await? {
            return Ok(token);
        }

        let _guard = self.refresh_lock.lock().await;

        if let Some(token) = self.usable_token().await? {
            return Ok(token);
        }

        let stored = self.load_token().await?;
        let refresh_token = match stored {
            Some(token) => {
                if token.is_valid_at(self.clock.now()) {
                    tracing::info!(
                        expires_at = %token.expires_at,
                        "Access token expiring soon, refreshing"
                    );
                } else {
                    tracing::info!("Access token expired, refreshing");
                }
                token.refresh_token
            }
            None => self.bootstrap_refresh_token.clone().ok_or_else(|| {
                AppError::Auth(
                    "No stored token and no bootstrap refresh token configured".to_string(),
                )
            })?,
        };

        self.refresh(&refresh_token).await
    }

    /// Exchange `refresh_token` and replace the stored record.
    pub async fn refresh(&self, refresh_token: &str) -> Result<String, AppError> {
        let grant = self
            .auth
            .exchange_refresh_token(refresh_token)
            .await
            .map_err(|e| match e {
                e @ AppError::Auth(_) => e,
                other => AppError::Auth(other.to_string()),
            })?;

        let now = self.clock.now();
        let token = AuthToken {
            access_token: grant.access_token,
            refresh_token: grant.refresh_token,
            expires_at: now + Duration::seconds(grant.expires_in),
            updated_at: now,
        };

        self.store
            .replace_token(&token)
            .await
            .map_err(|e| AppError::Auth(format!("Failed to persist refreshed token: {}", e)))?;

        tracing::info!(expires_in = grant.expires_in, "Fleet token refreshed");
        Ok(token.access_token)
    }

    /// Stored access token if it is valid beyond the refresh margin.
    async fn usable_token(&self) -> Result<Option<String>, AppError> {
        let now = self.clock.now();
        let margin = Duration::seconds(TOKEN_REFRESH_MARGIN_SECS);

        Ok(self
            .load_token()
            .await?
            .filter(|t| t.is_valid_at(now) && !t.expires_within(now, margin))
            .map(|t| t.access_token))
    }

    async fn load_token(&self) -> Result<Option<AuthToken>, AppError> {
        self.store
            .get_token()
            .await
            .map_err(|e| AppError::Auth(format!("Failed to read stored token: {}", e)))
    }
}
