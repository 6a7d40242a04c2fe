//! Context handed to children once the provider is ready
//!
//! Besides producing the facade, it exposes a few direct accessors over the
//! client application for hosts that need more than the facade offers.

use std::sync::{Arc, Mutex};

use crate::client::{AccountInfo, ClientApplication, InteractionStatus};
use crate::facade::AuthFacade;

pub struct AuthContext<C: ClientApplication> {
    instance: Arc<C>,
    default_scopes: Vec<String>,
    facade: Mutex<Option<Arc<AuthFacade<C>>>>,
}

impl<C: ClientApplication> AuthContext<C> {
    pub fn new(instance: Arc<C>, default_scopes: Vec<String>) -> Self {
        Self {
            instance,
            default_scopes,
            facade: Mutex::new(None),
        }
    }

    /// The client application itself.
    pub fn instance(&self) -> &Arc<C> {
        &self.instance
    }

    /// Accounts cached by the client application.
    pub fn accounts(&self) -> Vec<AccountInfo> {
        self.instance.get_all_accounts()
    }

    pub fn interaction_status(&self) -> InteractionStatus {
        self.instance.interaction_status()
    }

    pub fn is_authenticated(&self) -> bool {
        !self.accounts().is_empty()
    }

    pub fn account_by_home_id(&self, home_account_id: &str) -> Option<AccountInfo> {
        self.accounts()
            .into_iter()
            .find(|a| a.home_account_id == home_account_id)
    }

    pub fn default_scopes(&self) -> &[String] {
        &self.default_scopes
    }

    /// Facade using the configured default scopes.
    pub fn use_auth(&self) -> Arc<AuthFacade<C>> {
        self.use_auth_with_scopes(self.default_scopes.clone())
    }

    /// Facade with explicit default scopes.
    ///
    /// Returns the previously built facade while the scopes are unchanged.
    pub fn use_auth_with_scopes(&self, default_scopes: Vec<String>) -> Arc<AuthFacade<C>> {
        let mut guard = self.facade.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(existing) = guard.as_ref() {
            if existing.default_scopes() == default_scopes {
                return existing.clone();
            }
        }

        let facade = Arc::new(AuthFacade::new(self.instance.clone(), default_scopes));
        *guard = Some(facade.clone());
        facade
    }
}
