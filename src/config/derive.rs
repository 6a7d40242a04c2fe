//! Expansion of [`AuthConfig`] into the client application's configuration

use std::fmt;

use serde::{Deserialize, Serialize};
use url::Url;

use super::{AuthConfig, AuthorityType, CacheLocation};
use crate::error::AuthError;
use crate::logging::{default_logger_callback, LogLevel, LoggerOptions};

pub const AUTHORITY_HOST: &str = "https://login.microsoftonline.com";

/// Redirect URI used when the host has no origin of its own.
pub const HEADLESS_REDIRECT_URI: &str = "http://localhost:3000";

/// What the host environment can tell us about itself.
///
/// A browser-like host has an origin (and, after a redirect, a current URL
/// carrying the authorization response). A headless host has neither.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionContext {
    origin: Option<String>,
    current_url: Option<Url>,
}

impl ExecutionContext {
    pub fn headless() -> Self {
        Self::default()
    }

    pub fn browser(origin: impl Into<String>) -> Self {
        Self {
            origin: Some(origin.into()),
            current_url: None,
        }
    }

    /// Attach the URL the host is currently showing.
    pub fn with_current_url(mut self, url: Url) -> Self {
        self.current_url = Some(url);
        self
    }

    pub fn current_url(&self) -> Option<&Url> {
        self.current_url.as_ref()
    }

    fn default_redirect_uri(&self) -> String {
        self.origin
            .clone()
            .unwrap_or_else(|| HEADLESS_REDIRECT_URI.to_string())
    }
}

/// Identity provider endpoint scoping which directory issues tokens.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Authority(String);

impl Authority {
    pub fn new(url: impl Into<String>) -> Self {
        Self(url.into())
    }

    /// Authority for an authority type; `tenant` requires a tenant id.
    pub fn for_type(kind: AuthorityType, tenant_id: Option<&str>) -> Result<Self, AuthError> {
        let segment = match kind {
            AuthorityType::Tenant => non_empty(tenant_id).ok_or(AuthError::MissingTenantId)?,
            other => other.as_str(),
        };
        Ok(Self(format!("{}/{}", AUTHORITY_HOST, segment)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/oauth2/v2.0/{}", self.0.trim_end_matches('/'), path)
    }

    pub fn authorize_endpoint(&self) -> String {
        self.endpoint("authorize")
    }

    pub fn token_endpoint(&self) -> String {
        self.endpoint("token")
    }

    pub fn device_code_endpoint(&self) -> String {
        self.endpoint("devicecode")
    }

    pub fn logout_endpoint(&self) -> String {
        self.endpoint("logout")
    }
}

impl fmt::Display for Authority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentityOptions {
    pub client_id: String,
    pub authority: Authority,
    pub redirect_uri: String,
    pub post_logout_redirect_uri: String,
    pub navigate_to_login_request_url: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheOptions {
    pub cache_location: CacheLocation,
    pub store_auth_state_in_cookie: bool,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemOptions {
    pub logger_options: LoggerOptions,
}

/// Fully-populated client application configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DerivedConfiguration {
    pub auth: IdentityOptions,
    pub cache: CacheOptions,
    #[serde(default)]
    pub system: SystemOptions,
}

/// Expand user options into a client configuration.
///
/// A `custom_config` is returned as-is and skips every check below it.
pub fn derive(
    config: &AuthConfig,
    context: &ExecutionContext,
) -> Result<DerivedConfiguration, AuthError> {
    if let Some(custom) = &config.custom_config {
        return Ok(custom.clone());
    }

    let client_id = non_empty(config.client_id.as_deref()).ok_or(AuthError::MissingClientId)?;
    let authority = Authority::for_type(config.authority_type, config.tenant_id.as_deref())?;

    let redirect_uri = non_empty(config.redirect_uri.as_deref())
        .map(str::to_string)
        .unwrap_or_else(|| context.default_redirect_uri());
    let post_logout_redirect_uri = non_empty(config.post_logout_redirect_uri.as_deref())
        .map(str::to_string)
        .unwrap_or_else(|| redirect_uri.clone());

    let logger_callback = config
        .logger_callback
        .clone()
        .unwrap_or_else(|| default_logger_callback(config.enable_logging));
    let log_level = if config.enable_logging {
        LogLevel::Verbose
    } else {
        LogLevel::Error
    };

    Ok(DerivedConfiguration {
        auth: IdentityOptions {
            client_id: client_id.to_string(),
            authority,
            redirect_uri,
            post_logout_redirect_uri,
            navigate_to_login_request_url: config.navigate_to_login_request_url,
        },
        cache: CacheOptions {
            cache_location: config.cache_location,
            store_auth_state_in_cookie: config.store_auth_state_in_cookie,
        },
        system: SystemOptions {
            logger_options: LoggerOptions {
                logger_callback: Some(logger_callback),
                log_level,
                pii_logging_enabled: false,
            },
        },
    })
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}
