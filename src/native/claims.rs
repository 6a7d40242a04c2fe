//! Account extraction from ID tokens
//!
//! Claims are read, not validated: the token arrived over TLS straight from
//! the token endpoint.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use serde::Deserialize;

use crate::client::AccountInfo;
use crate::error::ClientError;

#[derive(Debug, Deserialize)]
struct IdTokenClaims {
    oid: Option<String>,
    sub: Option<String>,
    tid: Option<String>,
    preferred_username: Option<String>,
    upn: Option<String>,
    email: Option<String>,
    name: Option<String>,
}

fn malformed(reason: &str) -> ClientError {
    ClientError::new("invalid_id_token", format!("Malformed ID token: {}", reason))
}

/// Build the account record described by an ID token.
pub fn account_from_id_token(id_token: &str, environment: &str) -> Result<AccountInfo, ClientError> {
    let payload = id_token
        .split('.')
        .nth(1)
        .ok_or_else(|| malformed("missing payload segment"))?;
    let bytes = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .map_err(|e| malformed(&e.to_string()))?;
    let claims: IdTokenClaims =
        serde_json::from_slice(&bytes).map_err(|e| malformed(&e.to_string()))?;

    let object_id = claims
        .oid
        .or(claims.sub)
        .ok_or_else(|| malformed("no oid or sub claim"))?;
    let tenant_id = claims.tid.unwrap_or_default();
    let username = claims
        .preferred_username
        .or(claims.upn)
        .or(claims.email)
        .unwrap_or_default();

    Ok(AccountInfo {
        home_account_id: format!("{}.{}", object_id, tenant_id),
        environment: environment.to_string(),
        tenant_id,
        username,
        local_account_id: object_id,
        name: claims.name,
    })
}

#[cfg(test)]
pub(crate) fn fake_id_token(claims: serde_json::Value) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(claims.to_string());
    format!("{}.{}.", header, payload)
}
