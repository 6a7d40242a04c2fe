//! Token storage records

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Seconds before expiry at which a token is treated as expired.
const EXPIRY_SKEW_SECS: i64 = 300;

/// Access token with its absolute expiry (unix seconds).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredToken {
    pub token: String,
    pub expires_at: Option<i64>,
}

impl StoredToken {
    pub fn new(token: String, expires_in_secs: Option<u64>) -> Self {
        let expires_at = expires_in_secs.map(|secs| {
            let secs = i64::try_from(secs).unwrap_or(i64::MAX);
            Utc::now().timestamp().saturating_add(secs)
        });
        Self { token, expires_at }
    }

    /// Expired, or less than five minutes left.
    pub fn is_expired(&self) -> bool {
        match self.expires_at {
            Some(exp) => Utc::now().timestamp() + EXPIRY_SKEW_SECS >= exp,
            None => false,
        }
    }

    pub fn expires_on(&self) -> Option<DateTime<Utc>> {
        self.expires_at
            .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
    }
}
