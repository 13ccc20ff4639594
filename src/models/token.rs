// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Fleet API credential.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The single active OAuth2 token pair.
///
/// Stored at: `auth_tokens/active`, replaced on every refresh.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthToken {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AuthToken {
    /// Usable only while expiry is strictly in the future.
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now
    }

    /// Whether expiry falls within `margin` of `now`.
    pub fn expires_within(&self, now: DateTime<Utc>, margin: chrono::Duration) -> bool {
        self.expires_at - now < margin
    }
}
