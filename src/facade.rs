//! Promise-style surface over the ambient client application
//!
//! Every operation logs its failure and hands the error back. The only
//! exception is `acquire_token`, which treats a silent failure as the cue to
//! try a popup.

use std::sync::Arc;

use crate::client::{
    AccountInfo, AuthenticationResult, ClientApplication, EndSessionRequest, PopupRequest,
    Prompt, RedirectRequest, SilentRequest,
};
use crate::error::{AuthError, ClientError, Operation};

/// Stable handle over the client application.
///
/// Account state is read from the client on every call.
pub struct AuthFacade<C: ClientApplication> {
    instance: Arc<C>,
    default_scopes: Vec<String>,
}

fn failed(operation: Operation, source: ClientError) -> AuthError {
    tracing::error!("{} failed: {}", operation, source);
    AuthError::Interaction { operation, source }
}

impl<C: ClientApplication> AuthFacade<C> {
    /// Facade over `instance`, requesting `default_scopes` when a call names none.
    pub fn new(instance: Arc<C>, default_scopes: Vec<String>) -> Self {
        Self {
            instance,
            default_scopes,
        }
    }

    /// First cached account, if any.
    pub fn account(&self) -> Option<AccountInfo> {
        self.instance.get_all_accounts().into_iter().next()
    }

    /// Every cached account.
    pub fn accounts(&self) -> Vec<AccountInfo> {
        self.instance.get_all_accounts()
    }

    /// True while at least one account is cached.
    pub fn is_authenticated(&self) -> bool {
        !self.instance.get_all_accounts().is_empty()
    }

    /// True while the client runs an interaction.
    pub fn in_progress(&self) -> bool {
        !self.instance.interaction_status().is_idle()
    }

    pub fn default_scopes(&self) -> &[String] {
        &self.default_scopes
    }

    fn scopes(&self, scopes: Option<Vec<String>>) -> Vec<String> {
        scopes.unwrap_or_else(|| self.default_scopes.clone())
    }

    fn active_account(&self) -> Result<AccountInfo, AuthError> {
        self.account().ok_or(AuthError::NoActiveAccount)
    }

    /// Interactive login in a popup, prompting for account selection.
    pub async fn login_popup(
        &self,
        scopes: Option<Vec<String>>,
    ) -> Result<AuthenticationResult, AuthError> {
        let request = PopupRequest {
            scopes: self.scopes(scopes),
            prompt: Some(Prompt::SelectAccount),
            account: None,
        };
        self.instance
            .login_popup(request)
            .await
            .map_err(|e| failed(Operation::LoginPopup, e))
    }

    /// Interactive login by full-page redirect.
    pub async fn login_redirect(&self, scopes: Option<Vec<String>>) -> Result<(), AuthError> {
        let request = RedirectRequest {
            scopes: self.scopes(scopes),
            prompt: Some(Prompt::SelectAccount),
            ..RedirectRequest::default()
        };
        self.instance
            .login_redirect(request)
            .await
            .map_err(|e| failed(Operation::LoginRedirect, e))
    }

    /// Sign out the current account (or none) in a popup.
    pub async fn logout_popup(&self) -> Result<(), AuthError> {
        let request = EndSessionRequest {
            account: self.account(),
            ..EndSessionRequest::default()
        };
        self.instance
            .logout_popup(request)
            .await
            .map_err(|e| failed(Operation::LogoutPopup, e))
    }

    /// Sign out the current account (or none) by redirect.
    pub async fn logout_redirect(&self) -> Result<(), AuthError> {
        let request = EndSessionRequest {
            account: self.account(),
            ..EndSessionRequest::default()
        };
        self.instance
            .logout_redirect(request)
            .await
            .map_err(|e| failed(Operation::LogoutRedirect, e))
    }

    /// Access token for the current account without user interaction.
    pub async fn acquire_token_silent(
        &self,
        scopes: Option<Vec<String>>,
    ) -> Result<String, AuthError> {
        let account = self.active_account()?;
        let request = SilentRequest {
            scopes: self.scopes(scopes),
            account,
            force_refresh: false,
        };
        let result = self
            .instance
            .acquire_token_silent(request)
            .await
            .map_err(|e| failed(Operation::AcquireTokenSilent, e))?;
        Ok(result.access_token)
    }

    /// Access token for the current account through a popup.
    pub async fn acquire_token_popup(
        &self,
        scopes: Option<Vec<String>>,
    ) -> Result<String, AuthError> {
        let account = self.active_account()?;
        let request = PopupRequest {
            scopes: self.scopes(scopes),
            prompt: None,
            account: Some(account),
        };
        let result = self
            .instance
            .acquire_token_popup(request)
            .await
            .map_err(|e| failed(Operation::AcquireTokenPopup, e))?;
        Ok(result.access_token)
    }

    /// Start a redirect to obtain a token for the current account.
    pub async fn acquire_token_redirect(
        &self,
        scopes: Option<Vec<String>>,
    ) -> Result<(), AuthError> {
        let account = self.active_account()?;
        let request = RedirectRequest {
            scopes: self.scopes(scopes),
            account: Some(account),
            ..RedirectRequest::default()
        };
        self.instance
            .acquire_token_redirect(request)
            .await
            .map_err(|e| failed(Operation::AcquireTokenRedirect, e))
    }

    /// Silent acquisition, falling back to a popup once on any failure.
    ///
    /// The silent error is dropped; only the popup's error is returned.
    pub async fn acquire_token(&self, scopes: Option<Vec<String>>) -> Result<String, AuthError> {
        let scopes = self.scopes(scopes);
        match self.acquire_token_silent(Some(scopes.clone())).await {
            Ok(token) => Ok(token),
            Err(err) => {
                tracing::warn!(
                    "Silent token acquisition failed ({}), falling back to popup",
                    err
                );
                self.acquire_token_popup(Some(scopes)).await
            }
        }
    }
}
