//! Scripted client application for tests

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::oneshot;

use super::{
    AccountInfo, AuthenticationResult, CallbackId, ClientApplication, EndSessionRequest,
    EventCallback, EventMessage, EventRegistry, InteractionStatus, PopupRequest, Prompt,
    RedirectRequest, SilentRequest,
};
use crate::error::ClientError;

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Initialize,
    HandleRedirect,
    LoginPopup(Vec<String>, Option<Prompt>),
    LoginRedirect(Vec<String>, Option<Prompt>),
    LogoutPopup(Option<String>),
    LogoutRedirect(Option<String>),
    AcquireSilent(Vec<String>, String),
    AcquirePopup(Vec<String>, Option<String>),
    AcquireRedirect(Vec<String>, Option<String>),
}

#[derive(Default)]
pub struct MockClient {
    accounts: Mutex<Vec<AccountInfo>>,
    status: Mutex<InteractionStatus>,
    calls: Mutex<Vec<Call>>,
    failures: Mutex<HashMap<&'static str, ClientError>>,
    redirect_result: Mutex<Option<AuthenticationResult>>,
    redirect_gate: Mutex<Option<oneshot::Receiver<()>>>,
    pub events: EventRegistry,
}

pub fn account(username: &str) -> AccountInfo {
    AccountInfo {
        home_account_id: format!("{}.tenant", username),
        environment: "login.microsoftonline.com".to_string(),
        tenant_id: "tenant".to_string(),
        username: username.to_string(),
        local_account_id: username.to_string(),
        name: Some(username.to_uppercase()),
    }
}

pub fn token_result(scopes: &[String], account: Option<AccountInfo>) -> AuthenticationResult {
    AuthenticationResult {
        access_token: format!("token:{}", scopes.join(" ")),
        id_token: None,
        token_type: "Bearer".to_string(),
        scopes: scopes.to_vec(),
        account,
        expires_on: None,
        from_cache: false,
    }
}

impl MockClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_account(self, account: AccountInfo) -> Self {
        self.set_accounts(vec![account]);
        self
    }

    pub fn set_accounts(&self, accounts: Vec<AccountInfo>) {
        *self.accounts.lock().unwrap() = accounts;
    }

    pub fn set_status(&self, status: InteractionStatus) {
        *self.status.lock().unwrap() = status;
    }

    /// Make the named method fail with `error` from now on.
    pub fn fail(&self, method: &'static str, error: ClientError) {
        self.failures.lock().unwrap().insert(method, error);
    }

    pub fn set_redirect_result(&self, result: AuthenticationResult) {
        *self.redirect_result.lock().unwrap() = Some(result);
    }

    /// Hold `handle_redirect_promise` until the returned sender fires.
    pub fn gate_redirect(&self) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        *self.redirect_gate.lock().unwrap() = Some(rx);
        tx
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn emit(&self, message: EventMessage) {
        self.events.emit(message);
    }

    fn record(&self, call: Call, method: &'static str) -> Result<(), ClientError> {
        self.calls.lock().unwrap().push(call);
        match self.failures.lock().unwrap().get(method) {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }
}

fn username(account: &Option<AccountInfo>) -> Option<String> {
    account.as_ref().map(|a| a.username.clone())
}

#[async_trait]
impl ClientApplication for MockClient {
    async fn initialize(&self) -> Result<(), ClientError> {
        self.record(Call::Initialize, "initialize")
    }

    async fn handle_redirect_promise(&self) -> Result<Option<AuthenticationResult>, ClientError> {
        let gate = self.redirect_gate.lock().unwrap().take();
        if let Some(rx) = gate {
            let _ = rx.await;
        }
        self.record(Call::HandleRedirect, "handle_redirect_promise")?;
        Ok(self.redirect_result.lock().unwrap().take())
    }

    fn add_event_callback(&self, callback: EventCallback) -> CallbackId {
        self.events.add(callback)
    }

    fn remove_event_callback(&self, id: &CallbackId) {
        self.events.remove(id)
    }

    fn get_all_accounts(&self) -> Vec<AccountInfo> {
        self.accounts.lock().unwrap().clone()
    }

    fn interaction_status(&self) -> InteractionStatus {
        *self.status.lock().unwrap()
    }

    async fn login_popup(&self, request: PopupRequest) -> Result<AuthenticationResult, ClientError> {
        self.record(
            Call::LoginPopup(request.scopes.clone(), request.prompt),
            "login_popup",
        )?;
        Ok(token_result(&request.scopes, request.account))
    }

    async fn login_redirect(&self, request: RedirectRequest) -> Result<(), ClientError> {
        self.record(
            Call::LoginRedirect(request.scopes, request.prompt),
            "login_redirect",
        )
    }

    async fn logout_popup(&self, request: EndSessionRequest) -> Result<(), ClientError> {
        self.record(Call::LogoutPopup(username(&request.account)), "logout_popup")
    }

    async fn logout_redirect(&self, request: EndSessionRequest) -> Result<(), ClientError> {
        self.record(
            Call::LogoutRedirect(username(&request.account)),
            "logout_redirect",
        )
    }

    async fn acquire_token_silent(
        &self,
        request: SilentRequest,
    ) -> Result<AuthenticationResult, ClientError> {
        self.record(
            Call::AcquireSilent(request.scopes.clone(), request.account.username.clone()),
            "acquire_token_silent",
        )?;
        Ok(token_result(&request.scopes, Some(request.account)))
    }

    async fn acquire_token_popup(
        &self,
        request: PopupRequest,
    ) -> Result<AuthenticationResult, ClientError> {
        self.record(
            Call::AcquirePopup(request.scopes.clone(), username(&request.account)),
            "acquire_token_popup",
        )?;
        Ok(token_result(&request.scopes, request.account))
    }

    async fn acquire_token_redirect(&self, request: RedirectRequest) -> Result<(), ClientError> {
        self.record(
            Call::AcquireRedirect(request.scopes, username(&request.account)),
            "acquire_token_redirect",
        )
    }
}
