//! User-facing authentication options
//!
//! [`AuthConfig`] is the small record a host fills in; [`derive`] expands it
//! into the full [`DerivedConfiguration`] the client application consumes.

mod derive;

pub use derive::{derive, Authority, CacheOptions, DerivedConfiguration, ExecutionContext,
    IdentityOptions, SystemOptions, AUTHORITY_HOST, HEADLESS_REDIRECT_URI};

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::logging::LoggerCallback;

/// Scope requested when neither the config nor the caller names any.
pub const DEFAULT_SCOPE: &str = "User.Read";

/// Which directory issues tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthorityType {
    /// Work, school and personal accounts
    #[default]
    Common,
    /// Work and school accounts only
    Organizations,
    /// Personal accounts only
    Consumers,
    /// A single directory, named by `tenant_id`
    Tenant,
}

impl AuthorityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthorityType::Common => "common",
            AuthorityType::Organizations => "organizations",
            AuthorityType::Consumers => "consumers",
            AuthorityType::Tenant => "tenant",
        }
    }
}

/// Where the client application keeps its token cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CacheLocation {
    #[default]
    SessionStorage,
    LocalStorage,
    MemoryStorage,
}

impl CacheLocation {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheLocation::SessionStorage => "sessionStorage",
            CacheLocation::LocalStorage => "localStorage",
            CacheLocation::MemoryStorage => "memoryStorage",
        }
    }
}

/// Authentication options supplied once, when the provider is created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Application (client) ID of the app registration
    pub client_id: Option<String>,
    /// Directory (tenant) ID, used with `AuthorityType::Tenant`
    pub tenant_id: Option<String>,
    pub authority_type: AuthorityType,
    /// Defaults to the execution context's origin
    pub redirect_uri: Option<String>,
    /// Defaults to `redirect_uri`
    pub post_logout_redirect_uri: Option<String>,
    /// Default scopes for the facade; `["User.Read"]` when unset
    pub scopes: Option<Vec<String>>,
    pub cache_location: CacheLocation,
    /// Keep the pending redirect state in persistent storage
    pub store_auth_state_in_cookie: bool,
    /// Return to the page that started a redirect login once it completes
    pub navigate_to_login_request_url: bool,
    /// Full configuration that replaces derivation entirely
    pub custom_config: Option<DerivedConfiguration>,
    pub enable_logging: bool,
    #[serde(skip)]
    pub logger_callback: Option<LoggerCallback>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            client_id: None,
            tenant_id: None,
            authority_type: AuthorityType::Common,
            redirect_uri: None,
            post_logout_redirect_uri: None,
            scopes: None,
            cache_location: CacheLocation::SessionStorage,
            store_auth_state_in_cookie: false,
            navigate_to_login_request_url: true,
            custom_config: None,
            enable_logging: false,
            logger_callback: None,
        }
    }
}

impl AuthConfig {
    /// Multi-tenant app accepting work, school and personal accounts.
    pub fn common(client_id: impl Into<String>) -> Self {
        Self {
            client_id: Some(client_id.into()),
            ..Self::default()
        }
    }

    /// Work and school accounts only.
    pub fn organizations(client_id: impl Into<String>) -> Self {
        Self {
            authority_type: AuthorityType::Organizations,
            ..Self::common(client_id)
        }
    }

    /// Personal Microsoft accounts only.
    pub fn consumers(client_id: impl Into<String>) -> Self {
        Self {
            authority_type: AuthorityType::Consumers,
            ..Self::common(client_id)
        }
    }

    /// Single-tenant app.
    pub fn single_tenant(client_id: impl Into<String>, tenant_id: impl Into<String>) -> Self {
        Self {
            tenant_id: Some(tenant_id.into()),
            authority_type: AuthorityType::Tenant,
            ..Self::common(client_id)
        }
    }

    pub fn with_redirect_uri(mut self, uri: impl Into<String>) -> Self {
        self.redirect_uri = Some(uri.into());
        self
    }

    pub fn with_post_logout_redirect_uri(mut self, uri: impl Into<String>) -> Self {
        self.post_logout_redirect_uri = Some(uri.into());
        self
    }

    pub fn with_scopes<I, S>(mut self, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scopes = Some(scopes.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_cache_location(mut self, location: CacheLocation) -> Self {
        self.cache_location = location;
        self
    }

    pub fn with_logging(mut self, enabled: bool) -> Self {
        self.enable_logging = enabled;
        self
    }

    pub fn with_logger_callback(mut self, callback: LoggerCallback) -> Self {
        self.logger_callback = Some(callback);
        self
    }

    pub fn with_custom_config(mut self, config: DerivedConfiguration) -> Self {
        self.custom_config = Some(config);
        self
    }

    /// Scopes the facade falls back to when a call names none.
    pub fn default_scopes(&self) -> Vec<String> {
        match &self.scopes {
            Some(scopes) if !scopes.is_empty() => scopes.clone(),
            _ => vec![DEFAULT_SCOPE.to_string()],
        }
    }

    /// Default location of the config file.
    pub fn default_path() -> Result<PathBuf> {
        let dirs = project_dirs().context("Could not determine config directory")?;
        Ok(dirs.config_dir().join("config.toml"))
    }

    /// Load options from a TOML file, or the default location when `path`
    /// is `None`. A missing file yields the default options.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::default_path()?,
        };

        if !path.exists() {
            tracing::debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        toml::from_str(&content).context("Failed to parse config file")
    }
}

pub(crate) fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("com", "entra-auth", "entra-auth")
}
