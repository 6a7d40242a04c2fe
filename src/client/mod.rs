//! Client application seam
//!
//! Everything protocol-related (token issuance, popup/redirect flows, cache
//! storage, silent renewal) lives behind [`ClientApplication`]. The provider
//! and the facade only sequence calls to it.

mod events;
#[cfg(test)]
pub(crate) mod mock;

pub use events::{
    CallbackId, EventCallback, EventMessage, EventPayload, EventRegistry, EventType,
    InteractionType,
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ClientError;

/// Signed-in account as cached by the client application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountInfo {
    /// `{object id}.{tenant id}`
    pub home_account_id: String,
    pub environment: String,
    pub tenant_id: String,
    pub username: String,
    pub local_account_id: String,
    #[serde(default)]
    pub name: Option<String>,
}

/// Outcome of a login or token request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticationResult {
    pub access_token: String,
    pub id_token: Option<String>,
    pub token_type: String,
    pub scopes: Vec<String>,
    pub account: Option<AccountInfo>,
    pub expires_on: Option<DateTime<Utc>>,
    pub from_cache: bool,
}

/// `prompt` parameter of an interactive request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Prompt {
    SelectAccount,
    Login,
    Consent,
    None,
}

impl Prompt {
    pub fn as_str(&self) -> &'static str {
        match self {
            Prompt::SelectAccount => "select_account",
            Prompt::Login => "login",
            Prompt::Consent => "consent",
            Prompt::None => "none",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PopupRequest {
    pub scopes: Vec<String>,
    pub prompt: Option<Prompt>,
    pub account: Option<AccountInfo>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RedirectRequest {
    pub scopes: Vec<String>,
    pub prompt: Option<Prompt>,
    pub account: Option<AccountInfo>,
    /// Page to return to once the redirect completes
    pub redirect_start_page: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SilentRequest {
    pub scopes: Vec<String>,
    pub account: AccountInfo,
    /// Skip cached access tokens
    pub force_refresh: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct EndSessionRequest {
    pub account: Option<AccountInfo>,
    pub post_logout_redirect_uri: Option<String>,
}

/// What the client application is doing right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum InteractionStatus {
    #[default]
    None,
    Startup,
    Login,
    Logout,
    AcquireToken,
    HandleRedirect,
}

impl InteractionStatus {
    pub fn is_idle(&self) -> bool {
        *self == InteractionStatus::None
    }
}

/// A public client application for the Microsoft identity platform.
///
/// `initialize` must complete before any other async call.
#[async_trait]
pub trait ClientApplication: Send + Sync + 'static {
    async fn initialize(&self) -> Result<(), ClientError>;

    /// Finalize a redirect flow that brought the host back to us.
    /// Resolves to `None` when there is nothing to finalize.
    async fn handle_redirect_promise(&self) -> Result<Option<AuthenticationResult>, ClientError>;

    fn add_event_callback(&self, callback: EventCallback) -> CallbackId;

    fn remove_event_callback(&self, id: &CallbackId);

    fn get_all_accounts(&self) -> Vec<AccountInfo>;

    fn interaction_status(&self) -> InteractionStatus;

    async fn login_popup(&self, request: PopupRequest) -> Result<AuthenticationResult, ClientError>;

    async fn login_redirect(&self, request: RedirectRequest) -> Result<(), ClientError>;

    async fn logout_popup(&self, request: EndSessionRequest) -> Result<(), ClientError>;

    async fn logout_redirect(&self, request: EndSessionRequest) -> Result<(), ClientError>;

    async fn acquire_token_silent(
        &self,
        request: SilentRequest,
    ) -> Result<AuthenticationResult, ClientError>;

    async fn acquire_token_popup(
        &self,
        request: PopupRequest,
    ) -> Result<AuthenticationResult, ClientError>;

    async fn acquire_token_redirect(&self, request: RedirectRequest) -> Result<(), ClientError>;
}

/// A shared instance is itself a client application.
#[async_trait]
impl<T: ClientApplication + ?Sized> ClientApplication for std::sync::Arc<T> {
    async fn initialize(&self) -> Result<(), ClientError> {
        (**self).initialize().await
    }

    async fn handle_redirect_promise(&self) -> Result<Option<AuthenticationResult>, ClientError> {
        (**self).handle_redirect_promise().await
    }

    fn add_event_callback(&self, callback: EventCallback) -> CallbackId {
        (**self).add_event_callback(callback)
    }

    fn remove_event_callback(&self, id: &CallbackId) {
        (**self).remove_event_callback(id)
    }

    fn get_all_accounts(&self) -> Vec<AccountInfo> {
        (**self).get_all_accounts()
    }

    fn interaction_status(&self) -> InteractionStatus {
        (**self).interaction_status()
    }

    async fn login_popup(&self, request: PopupRequest) -> Result<AuthenticationResult, ClientError> {
        (**self).login_popup(request).await
    }

    async fn login_redirect(&self, request: RedirectRequest) -> Result<(), ClientError> {
        (**self).login_redirect(request).await
    }

    async fn logout_popup(&self, request: EndSessionRequest) -> Result<(), ClientError> {
        (**self).logout_popup(request).await
    }

    async fn logout_redirect(&self, request: EndSessionRequest) -> Result<(), ClientError> {
        (**self).logout_redirect(request).await
    }

    async fn acquire_token_silent(
        &self,
        request: SilentRequest,
    ) -> Result<AuthenticationResult, ClientError> {
        (**self).acquire_token_silent(request).await
    }

    async fn acquire_token_popup(
        &self,
        request: PopupRequest,
    ) -> Result<AuthenticationResult, ClientError> {
        (**self).acquire_token_popup(request).await
    }

    async fn acquire_token_redirect(&self, request: RedirectRequest) -> Result<(), ClientError> {
        (**self).acquire_token_redirect(request).await
    }
}
