//! Native public client application
//!
//! Implements [`ClientApplication`] for hosts without a browser runtime by
//! driving the OAuth2 endpoints through the `oauth2` crate. Popup flows map
//! to the device code flow; redirect flows to authorization code with PKCE,
//! finalized later by [`ClientApplication::handle_redirect_promise`].

mod cache;
mod claims;
mod oauth;
mod tokens;

pub use cache::{scope_key, CacheState, PendingRedirect, RedirectKind, TokenCache};
pub use tokens::StoredToken;

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use url::Url;

use self::cache::CachedAccessToken;
use self::oauth::{EntraClient, EntraTokenResponse};
use crate::client::{
    AccountInfo, AuthenticationResult, CallbackId, ClientApplication, EndSessionRequest,
    EventCallback, EventMessage, EventPayload, EventRegistry, EventType, InteractionStatus,
    InteractionType, PopupRequest, RedirectRequest, SilentRequest,
};
use crate::config::{DerivedConfiguration, ExecutionContext};
use crate::error::ClientError;
use crate::logging::LogLevel;

/// Where the native client sends the user.
pub trait UserAgent: Send + Sync {
    /// Navigate to (or ask the user to open) a URL.
    fn open(&self, url: &Url);

    /// Present device code sign-in instructions.
    fn show_device_code(&self, verification_uri: &str, user_code: &str);
}

/// Prints instructions on stdout.
pub struct ConsoleUserAgent;

impl UserAgent for ConsoleUserAgent {
    fn open(&self, url: &Url) {
        println!();
        println!("Open this URL in your browser:");
        println!("  {}", url);
        println!();
    }

    fn show_device_code(&self, verification_uri: &str, user_code: &str) {
        println!();
        println!("To sign in, visit: {}", verification_uri);
        println!("Enter code:        {}", user_code);
        println!();
    }
}

/// Resets the interaction status when an interaction ends, however it ends.
struct InteractionGuard<'a> {
    status: &'a Mutex<InteractionStatus>,
}

impl Drop for InteractionGuard<'_> {
    fn drop(&mut self) {
        *self.status.lock().unwrap_or_else(|e| e.into_inner()) = InteractionStatus::None;
    }
}

/// Client application for terminals and other hosts without a browser runtime.
pub struct PublicClientApplication {
    config: DerivedConfiguration,
    oauth: EntraClient,
    environment: String,
    current_url: Option<Url>,
    user_agent: Arc<dyn UserAgent>,
    cache: TokenCache,
    events: EventRegistry,
    status: Mutex<InteractionStatus>,
    initialized: AtomicBool,
}

impl PublicClientApplication {
    /// Build a client; the cache location decides where tokens are kept.
    pub fn new(
        config: DerivedConfiguration,
        context: &ExecutionContext,
        user_agent: Arc<dyn UserAgent>,
    ) -> Result<Self, ClientError> {
        let cache = TokenCache::for_location(
            config.cache.cache_location,
            &config.auth.client_id,
            config.cache.store_auth_state_in_cookie,
        )?;
        Self::with_cache(config, context, user_agent, cache)
    }

    /// Build a client on top of an existing token cache.
    pub fn with_cache(
        config: DerivedConfiguration,
        context: &ExecutionContext,
        user_agent: Arc<dyn UserAgent>,
        cache: TokenCache,
    ) -> Result<Self, ClientError> {
        let oauth = oauth::build_client(&config.auth)?;
        let environment = Url::parse(config.auth.authority.as_str())
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))
            .ok_or_else(|| ClientError::invalid_config("Authority has no host"))?;

        Ok(Self {
            config,
            oauth,
            environment,
            current_url: context.current_url().cloned(),
            user_agent,
            cache,
            events: EventRegistry::new(),
            status: Mutex::new(InteractionStatus::None),
            initialized: AtomicBool::new(false),
        })
    }

    /// Configuration the client was built from.
    pub fn configuration(&self) -> &DerivedConfiguration {
        &self.config
    }

    fn log(&self, level: LogLevel, message: &str) {
        self.config.system.logger_options.log(level, message, false);
    }

    fn log_pii(&self, level: LogLevel, message: &str) {
        self.config.system.logger_options.log(level, message, true);
    }

    fn ensure_initialized(&self) -> Result<(), ClientError> {
        if self.initialized.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(ClientError::uninitialized())
        }
    }

    /// Claim the single interaction slot.
    fn begin(&self, kind: InteractionStatus) -> Result<InteractionGuard<'_>, ClientError> {
        let mut status = self.status.lock().unwrap_or_else(|e| e.into_inner());
        if !status.is_idle() {
            self.log(LogLevel::Warning, "Interaction already in progress");
            return Err(ClientError::interaction_in_progress());
        }
        *status = kind;
        Ok(InteractionGuard {
            status: &self.status,
        })
    }

    fn emit(
        &self,
        event_type: EventType,
        interaction: InteractionType,
        payload: Option<EventPayload>,
        error: Option<ClientError>,
    ) {
        let mut message = EventMessage::new(event_type).with_interaction(interaction);
        if let Some(payload) = payload {
            message = message.with_payload(payload);
        }
        if let Some(error) = error {
            message = message.with_error(error);
        }
        self.events.emit(message);
    }

    /// Emit the success or failure event matching `result`.
    fn report(
        &self,
        result: &Result<AuthenticationResult, ClientError>,
        success: EventType,
        failure: EventType,
        interaction: InteractionType,
    ) {
        match result {
            Ok(auth) => self.emit(
                success,
                interaction,
                Some(EventPayload::Authentication(auth.clone())),
                None,
            ),
            Err(err) => {
                self.log(LogLevel::Error, &err.to_string());
                self.emit(failure, interaction, None, Some(err.clone()))
            }
        }
    }

    /// Cache a token response and turn it into an authentication result.
    fn store_response(
        &self,
        response: EntraTokenResponse,
        requested_scopes: &[String],
        known_account: Option<&AccountInfo>,
    ) -> Result<AuthenticationResult, ClientError> {
        use oauth2::TokenResponse;

        let id_token = response.extra_fields().id_token.clone();
        let account = match &id_token {
            Some(token) => claims::account_from_id_token(token, &self.environment)?,
            None => known_account.cloned().ok_or_else(ClientError::no_account)?,
        };

        let scopes: Vec<String> = match response.scopes() {
            Some(granted) => granted.iter().map(|s| s.to_string()).collect(),
            None => requested_scopes.to_vec(),
        };
        let token = StoredToken::new(
            response.access_token().secret().to_string(),
            response.expires_in().map(|d| d.as_secs()),
        );
        let refresh_token = response.refresh_token().map(|rt| rt.secret().to_string());

        let is_new = !self
            .cache
            .accounts()
            .iter()
            .any(|a| a.home_account_id == account.home_account_id);
        self.cache.save_tokens(
            &account,
            refresh_token,
            CachedAccessToken {
                home_account_id: account.home_account_id.clone(),
                scopes: scope_key(&scopes),
                token: token.clone(),
            },
        )?;
        self.log_pii(
            LogLevel::Verbose,
            &format!("Cached tokens for {}", account.username),
        );
        if is_new {
            self.events.emit(
                EventMessage::new(EventType::AccountAdded)
                    .with_payload(EventPayload::Account(account.clone())),
            );
        }

        Ok(AuthenticationResult {
            access_token: token.token.clone(),
            id_token,
            token_type: "Bearer".to_string(),
            scopes,
            account: Some(account),
            expires_on: token.expires_on(),
            from_cache: false,
        })
    }

    async fn device_code(
        &self,
        scopes: &[String],
        known_account: Option<&AccountInfo>,
    ) -> Result<AuthenticationResult, ClientError> {
        let all_scopes = oauth::with_login_scopes(scopes);
        let response =
            oauth::device_code_flow(&self.oauth, &all_scopes, self.user_agent.as_ref()).await?;
        self.store_response(response, scopes, known_account)
    }

    async fn silent(&self, request: &SilentRequest) -> Result<AuthenticationResult, ClientError> {
        let account = &request.account;
        if !request.force_refresh {
            if let Some(cached) = self
                .cache
                .access_token(&account.home_account_id, &request.scopes)
            {
                self.log(LogLevel::Verbose, "Returning cached access token");
                return Ok(AuthenticationResult {
                    access_token: cached.token.token.clone(),
                    id_token: None,
                    token_type: "Bearer".to_string(),
                    scopes: cached.scopes,
                    account: Some(account.clone()),
                    expires_on: cached.token.expires_on(),
                    from_cache: true,
                });
            }
        }

        let refresh_token = self
            .cache
            .refresh_token(&account.home_account_id)
            .ok_or_else(|| {
                ClientError::interaction_required("No refresh token cached for this account")
            })?;
        self.log(LogLevel::Info, "Redeeming refresh token");
        let mut scopes = request.scopes.clone();
        scopes.push("offline_access".to_string());
        let response = oauth::refresh(&self.oauth, &refresh_token, &scopes).await?;
        self.store_response(response, &request.scopes, Some(account))
    }

    /// Send the user to the authorize endpoint, remembering how to come back.
    fn start_redirect(
        &self,
        kind: RedirectKind,
        request: RedirectRequest,
    ) -> Result<(), ClientError> {
        let scopes = match kind {
            RedirectKind::Login => oauth::with_login_scopes(&request.scopes),
            RedirectKind::AcquireToken => {
                let mut scopes = request.scopes.clone();
                scopes.push("offline_access".to_string());
                scopes
            }
        };
        let login_hint = request.account.as_ref().map(|a| a.username.as_str());
        let authorize = oauth::authorize_request(&self.oauth, &scopes, request.prompt, login_hint);

        let redirect_start_page = request
            .redirect_start_page
            .or_else(|| self.current_url.as_ref().map(Url::to_string));
        self.cache.set_pending(PendingRedirect {
            kind,
            state: authorize.state,
            pkce_verifier: authorize.pkce_verifier,
            scopes: request.scopes,
            account_home_id: request.account.map(|a| a.home_account_id),
            redirect_start_page,
        })?;

        self.log(LogLevel::Info, "Navigating to authorize endpoint");
        self.user_agent.open(&authorize.url);
        Ok(())
    }

    async fn finish_redirect(
        &self,
        params: &HashMap<String, String>,
        pending: &PendingRedirect,
    ) -> Result<AuthenticationResult, ClientError> {
        if let Some(error) = params.get("error") {
            return Err(ClientError::new(
                error.clone(),
                params.get("error_description").cloned().unwrap_or_default(),
            ));
        }
        if params.get("state") != Some(&pending.state) {
            return Err(ClientError::state_mismatch());
        }
        let code = params
            .get("code")
            .ok_or_else(|| ClientError::new("no_auth_code", "Redirect carried no code"))?;

        let response = oauth::exchange_code(&self.oauth, code, &pending.pkce_verifier).await?;
        let known = pending.account_home_id.as_deref().and_then(|id| {
            self.cache
                .accounts()
                .into_iter()
                .find(|a| a.home_account_id == id)
        });
        self.store_response(response, &pending.scopes, known.as_ref())
    }

    fn logout(
        &self,
        request: EndSessionRequest,
        interaction: InteractionType,
    ) -> Result<(), ClientError> {
        match &request.account {
            Some(account) => {
                if self.cache.remove_account(&account.home_account_id)? {
                    self.events.emit(
                        EventMessage::new(EventType::AccountRemoved)
                            .with_payload(EventPayload::Account(account.clone())),
                    );
                }
            }
            None => self.cache.clear()?,
        }

        let post_logout = request
            .post_logout_redirect_uri
            .unwrap_or_else(|| self.config.auth.post_logout_redirect_uri.clone());
        let hint = request.account.as_ref().map(|a| a.username.as_str());
        let url = oauth::logout_url(&self.config.auth.authority, &post_logout, hint)?;
        self.log(LogLevel::Info, "Navigating to end-session endpoint");
        self.user_agent.open(&url);
        self.emit(EventType::LogoutSuccess, interaction, None, None);
        Ok(())
    }

    async fn logout_with(
        &self,
        request: EndSessionRequest,
        interaction: InteractionType,
    ) -> Result<(), ClientError> {
        self.ensure_initialized()?;
        let _guard = self.begin(InteractionStatus::Logout)?;
        self.emit(EventType::LogoutStart, interaction, None, None);

        let result = self.logout(request, interaction);
        if let Err(err) = &result {
            self.emit(EventType::LogoutFailure, interaction, None, Some(err.clone()));
        }
        self.emit(EventType::LogoutEnd, interaction, None, None);
        result
    }

    async fn redirect_with(
        &self,
        kind: RedirectKind,
        request: RedirectRequest,
    ) -> Result<(), ClientError> {
        self.ensure_initialized()?;
        let (status, start, failure) = match kind {
            RedirectKind::Login => (
                InteractionStatus::Login,
                EventType::LoginStart,
                EventType::LoginFailure,
            ),
            RedirectKind::AcquireToken => (
                InteractionStatus::AcquireToken,
                EventType::AcquireTokenStart,
                EventType::AcquireTokenFailure,
            ),
        };
        let _guard = self.begin(status)?;
        self.emit(start, InteractionType::Redirect, None, None);

        let result = self.start_redirect(kind, request);
        if let Err(err) = &result {
            self.emit(failure, InteractionType::Redirect, None, Some(err.clone()));
        }
        result
    }
}

/// Query (or, failing that, fragment) parameters of a redirect URL.
fn response_params(url: &Url) -> HashMap<String, String> {
    let query: HashMap<String, String> = url.query_pairs().into_owned().collect();
    if query.contains_key("code") || query.contains_key("error") {
        return query;
    }
    url.fragment()
        .map(|f| url::form_urlencoded::parse(f.as_bytes()).into_owned().collect())
        .unwrap_or_default()
}

#[async_trait]
impl ClientApplication for PublicClientApplication {
    /// Load the token cache. Idempotent.
    async fn initialize(&self) -> Result<(), ClientError> {
        if self.initialized.load(Ordering::SeqCst) {
            return Ok(());
        }
        self.events.emit(EventMessage::new(EventType::InitializeStart));
        self.cache.load()?;
        self.initialized.store(true, Ordering::SeqCst);
        self.log(LogLevel::Info, "Client application initialized");
        self.events.emit(EventMessage::new(EventType::InitializeEnd));
        Ok(())
    }

    /// Finish a redirect flow from the current URL, if it carries a response.
    async fn handle_redirect_promise(&self) -> Result<Option<AuthenticationResult>, ClientError> {
        self.ensure_initialized()?;
        let Some(url) = self.current_url.as_ref() else {
            return Ok(None);
        };
        let params = response_params(url);
        if !params.contains_key("code") && !params.contains_key("error") {
            return Ok(None);
        }
        let _guard = self.begin(InteractionStatus::HandleRedirect)?;
        let Some(pending) = self.cache.take_pending()? else {
            self.log(LogLevel::Warning, "Redirect response without pending request");
            return Ok(None);
        };

        self.events.emit(
            EventMessage::new(EventType::HandleRedirectStart)
                .with_interaction(InteractionType::Redirect),
        );

        let result = self.finish_redirect(&params, &pending).await;
        let (success, failure) = match pending.kind {
            RedirectKind::Login => (EventType::LoginSuccess, EventType::LoginFailure),
            RedirectKind::AcquireToken => {
                (EventType::AcquireTokenSuccess, EventType::AcquireTokenFailure)
            }
        };
        self.report(&result, success, failure, InteractionType::Redirect);
        self.events.emit(
            EventMessage::new(EventType::HandleRedirectEnd)
                .with_interaction(InteractionType::Redirect),
        );

        let result = result?;
        if self.config.auth.navigate_to_login_request_url {
            if let Some(start) = pending
                .redirect_start_page
                .as_deref()
                .and_then(|s| Url::parse(s).ok())
            {
                if Some(&start) != self.current_url.as_ref() {
                    self.user_agent.open(&start);
                }
            }
        }
        Ok(Some(result))
    }

    fn add_event_callback(&self, callback: EventCallback) -> CallbackId {
        self.events.add(callback)
    }

    fn remove_event_callback(&self, id: &CallbackId) {
        self.events.remove(id)
    }

    fn get_all_accounts(&self) -> Vec<AccountInfo> {
        self.cache.accounts()
    }

    fn interaction_status(&self) -> InteractionStatus {
        *self.status.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Device code login.
    async fn login_popup(&self, request: PopupRequest) -> Result<AuthenticationResult, ClientError> {
        self.ensure_initialized()?;
        let _guard = self.begin(InteractionStatus::Login)?;
        self.emit(EventType::LoginStart, InteractionType::Popup, None, None);
        if request.prompt.is_some() {
            self.log(LogLevel::Verbose, "Device code flow ignores the prompt parameter");
        }

        let result = self.device_code(&request.scopes, None).await;
        self.report(
            &result,
            EventType::LoginSuccess,
            EventType::LoginFailure,
            InteractionType::Popup,
        );
        result
    }

    /// Authorization code login; finished by `handle_redirect_promise`.
    async fn login_redirect(&self, request: RedirectRequest) -> Result<(), ClientError> {
        self.redirect_with(RedirectKind::Login, request).await
    }

    async fn logout_popup(&self, request: EndSessionRequest) -> Result<(), ClientError> {
        self.logout_with(request, InteractionType::Popup).await
    }

    async fn logout_redirect(&self, request: EndSessionRequest) -> Result<(), ClientError> {
        self.logout_with(request, InteractionType::Redirect).await
    }

    /// Cached access token, else a refresh token exchange.
    async fn acquire_token_silent(
        &self,
        request: SilentRequest,
    ) -> Result<AuthenticationResult, ClientError> {
        self.ensure_initialized()?;
        self.emit(EventType::AcquireTokenStart, InteractionType::Silent, None, None);
        let result = self.silent(&request).await;
        self.report(
            &result,
            EventType::AcquireTokenSuccess,
            EventType::AcquireTokenFailure,
            InteractionType::Silent,
        );
        result
    }

    /// Device code flow for a token.
    async fn acquire_token_popup(
        &self,
        request: PopupRequest,
    ) -> Result<AuthenticationResult, ClientError> {
        self.ensure_initialized()?;
        let _guard = self.begin(InteractionStatus::AcquireToken)?;
        self.emit(EventType::AcquireTokenStart, InteractionType::Popup, None, None);

        let result = self
            .device_code(&request.scopes, request.account.as_ref())
            .await;
        self.report(
            &result,
            EventType::AcquireTokenSuccess,
            EventType::AcquireTokenFailure,
            InteractionType::Popup,
        );
        result
    }

    async fn acquire_token_redirect(&self, request: RedirectRequest) -> Result<(), ClientError> {
        self.redirect_with(RedirectKind::AcquireToken, request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::mock::account;
    use crate::client::Prompt;
    use crate::config::{derive, AuthConfig, CacheLocation};

    #[derive(Default)]
    struct RecordingAgent {
        opened: Mutex<Vec<Url>>,
    }

    impl UserAgent for RecordingAgent {
        fn open(&self, url: &Url) {
            self.opened.lock().unwrap().push(url.clone());
        }

        fn show_device_code(&self, _verification_uri: &str, _user_code: &str) {}
    }

    impl RecordingAgent {
        fn opened(&self) -> Vec<Url> {
            self.opened.lock().unwrap().clone()
        }
    }

    fn config() -> DerivedConfiguration {
        let options = AuthConfig::common("client-1").with_cache_location(CacheLocation::MemoryStorage);
        derive(&options, &ExecutionContext::headless()).unwrap()
    }

    fn app_with(
        context: &ExecutionContext,
        cache: TokenCache,
    ) -> (PublicClientApplication, Arc<RecordingAgent>) {
        let agent = Arc::new(RecordingAgent::default());
        let app = PublicClientApplication::with_cache(config(), context, agent.clone(), cache).unwrap();
        (app, agent)
    }

    fn cached_token(home: &str, scopes: &[&str]) -> CachedAccessToken {
        let scopes: Vec<String> = scopes.iter().map(|s| s.to_string()).collect();
        CachedAccessToken {
            home_account_id: home.to_string(),
            scopes: scope_key(&scopes),
            token: StoredToken::new("cached-at".to_string(), Some(3600)),
        }
    }

    fn event_log(app: &PublicClientApplication) -> Arc<Mutex<Vec<EventType>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        app.add_event_callback(EventCallback::new(move |m| {
            sink.lock().unwrap().push(m.event_type);
        }));
        seen
    }

    #[tokio::test]
    async fn test_calls_before_initialize_fail() {
        let (app, _) = app_with(&ExecutionContext::headless(), TokenCache::in_memory());
        let err = app.handle_redirect_promise().await.unwrap_err();
        assert_eq!(err, ClientError::uninitialized());
        let err = app
            .login_redirect(RedirectRequest::default())
            .await
            .unwrap_err();
        assert_eq!(err.code, "uninitialized_public_client_application");
    }

    #[tokio::test]
    async fn test_initialize_is_idempotent_and_emits() {
        let (app, _) = app_with(&ExecutionContext::headless(), TokenCache::in_memory());
        let seen = event_log(&app);
        app.initialize().await.unwrap();
        app.initialize().await.unwrap();
        assert_eq!(
            *seen.lock().unwrap(),
            vec![EventType::InitializeStart, EventType::InitializeEnd]
        );
    }

    #[tokio::test]
    async fn test_no_redirect_in_url_resolves_none() {
        let context = ExecutionContext::browser("https://app.contoso.com")
            .with_current_url(Url::parse("https://app.contoso.com/inbox?tab=1").unwrap());
        let (app, _) = app_with(&context, TokenCache::in_memory());
        app.initialize().await.unwrap();
        assert_eq!(app.handle_redirect_promise().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_login_redirect_stores_pending_and_navigates() {
        let cache = TokenCache::in_memory();
        let (app, agent) = app_with(&ExecutionContext::headless(), cache);
        app.initialize().await.unwrap();
        let seen = event_log(&app);

        app.login_redirect(RedirectRequest {
            scopes: vec!["User.Read".to_string()],
            prompt: Some(Prompt::SelectAccount),
            redirect_start_page: Some("http://localhost:3000/reports".to_string()),
            ..RedirectRequest::default()
        })
        .await
        .unwrap();

        let opened = agent.opened();
        assert_eq!(opened.len(), 1);
        let params: HashMap<String, String> = opened[0].query_pairs().into_owned().collect();
        assert_eq!(params["prompt"], "select_account");
        assert_eq!(params["scope"], "User.Read openid profile offline_access");

        let pending = app.cache.take_pending().unwrap().unwrap();
        assert_eq!(pending.kind, RedirectKind::Login);
        assert_eq!(pending.state, params["state"]);
        assert_eq!(pending.scopes, vec!["User.Read".to_string()]);
        assert_eq!(
            pending.redirect_start_page.as_deref(),
            Some("http://localhost:3000/reports")
        );
        assert_eq!(*seen.lock().unwrap(), vec![EventType::LoginStart]);
        assert_eq!(app.interaction_status(), InteractionStatus::None);
    }

    #[tokio::test]
    async fn test_redirect_error_response_reported() {
        let cache = TokenCache::in_memory();
        cache
            .set_pending(PendingRedirect {
                kind: RedirectKind::Login,
                state: "s1".to_string(),
                pkce_verifier: "v".to_string(),
                scopes: vec!["User.Read".to_string()],
                account_home_id: None,
                redirect_start_page: None,
            })
            .unwrap();
        let context = ExecutionContext::headless().with_current_url(
            Url::parse("http://localhost:3000/?error=access_denied&error_description=User+declined&state=s1")
                .unwrap(),
        );
        let (app, _) = app_with(&context, cache);
        app.initialize().await.unwrap();
        let seen = event_log(&app);

        let err = app.handle_redirect_promise().await.unwrap_err();
        assert_eq!(err, ClientError::new("access_denied", "User declined"));
        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                EventType::HandleRedirectStart,
                EventType::LoginFailure,
                EventType::HandleRedirectEnd
            ]
        );
        // Pending state is consumed either way.
        assert_eq!(app.cache.take_pending().unwrap(), None);
        assert_eq!(app.interaction_status(), InteractionStatus::None);
    }

    #[tokio::test]
    async fn test_redirect_state_mismatch() {
        let cache = TokenCache::in_memory();
        cache
            .set_pending(PendingRedirect {
                kind: RedirectKind::AcquireToken,
                state: "expected".to_string(),
                pkce_verifier: "v".to_string(),
                scopes: vec![],
                account_home_id: None,
                redirect_start_page: None,
            })
            .unwrap();
        let context = ExecutionContext::headless()
            .with_current_url(Url::parse("http://localhost:3000/#code=abc&state=forged").unwrap());
        let (app, _) = app_with(&context, cache);
        app.initialize().await.unwrap();

        let err = app.handle_redirect_promise().await.unwrap_err();
        assert_eq!(err, ClientError::state_mismatch());
    }

    #[tokio::test]
    async fn test_redirect_without_pending_state_ignored() {
        let context = ExecutionContext::headless()
            .with_current_url(Url::parse("http://localhost:3000/?code=abc&state=s").unwrap());
        let (app, _) = app_with(&context, TokenCache::in_memory());
        app.initialize().await.unwrap();
        assert_eq!(app.handle_redirect_promise().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_silent_served_from_cache() {
        let cache = TokenCache::in_memory();
        let ada = account("ada");
        cache
            .save_tokens(&ada, Some("rt".to_string()), cached_token(&ada.home_account_id, &["User.Read"]))
            .unwrap();
        let (app, _) = app_with(&ExecutionContext::headless(), cache);
        app.initialize().await.unwrap();

        let result = app
            .acquire_token_silent(SilentRequest {
                scopes: vec!["user.read".to_string()],
                account: ada.clone(),
                force_refresh: false,
            })
            .await
            .unwrap();
        assert_eq!(result.access_token, "cached-at");
        assert!(result.from_cache);
        assert_eq!(result.account, Some(ada));
    }

    #[tokio::test]
    async fn test_silent_without_refresh_token_requires_interaction() {
        let (app, _) = app_with(&ExecutionContext::headless(), TokenCache::in_memory());
        app.initialize().await.unwrap();
        let seen = event_log(&app);

        let err = app
            .acquire_token_silent(SilentRequest {
                scopes: vec!["User.Read".to_string()],
                account: account("ada"),
                force_refresh: false,
            })
            .await
            .unwrap_err();
        assert!(err.is_interaction_required());
        assert_eq!(
            *seen.lock().unwrap(),
            vec![EventType::AcquireTokenStart, EventType::AcquireTokenFailure]
        );
    }

    #[tokio::test]
    async fn test_interaction_in_progress_rejected() {
        let (app, _) = app_with(&ExecutionContext::headless(), TokenCache::in_memory());
        app.initialize().await.unwrap();

        let guard = app.begin(InteractionStatus::Login).unwrap();
        assert_eq!(app.interaction_status(), InteractionStatus::Login);
        let err = app
            .logout_popup(EndSessionRequest::default())
            .await
            .unwrap_err();
        assert_eq!(err, ClientError::interaction_in_progress());

        drop(guard);
        assert_eq!(app.interaction_status(), InteractionStatus::None);
    }

    #[tokio::test]
    async fn test_logout_removes_account_and_opens_end_session() {
        let cache = TokenCache::in_memory();
        let ada = account("ada");
        let grace = account("grace");
        cache
            .save_tokens(&ada, Some("rt".into()), cached_token(&ada.home_account_id, &["User.Read"]))
            .unwrap();
        cache
            .save_tokens(&grace, Some("rt".into()), cached_token(&grace.home_account_id, &["User.Read"]))
            .unwrap();
        let (app, agent) = app_with(&ExecutionContext::headless(), cache);
        app.initialize().await.unwrap();
        let seen = event_log(&app);

        app.logout_redirect(EndSessionRequest {
            account: Some(ada.clone()),
            post_logout_redirect_uri: None,
        })
        .await
        .unwrap();

        assert_eq!(app.get_all_accounts(), vec![grace]);
        let opened = agent.opened();
        assert_eq!(opened.len(), 1);
        assert!(opened[0]
            .as_str()
            .starts_with("https://login.microsoftonline.com/common/oauth2/v2.0/logout?"));
        let params: HashMap<String, String> = opened[0].query_pairs().into_owned().collect();
        assert_eq!(params["post_logout_redirect_uri"], "http://localhost:3000");
        assert_eq!(params["logout_hint"], "ada");
        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                EventType::LogoutStart,
                EventType::AccountRemoved,
                EventType::LogoutSuccess,
                EventType::LogoutEnd
            ]
        );
    }

    #[tokio::test]
    async fn test_logout_without_account_clears_cache() {
        let cache = TokenCache::in_memory();
        let ada = account("ada");
        cache
            .save_tokens(&ada, None, cached_token(&ada.home_account_id, &["User.Read"]))
            .unwrap();
        let (app, _) = app_with(&ExecutionContext::headless(), cache);
        app.initialize().await.unwrap();

        app.logout_popup(EndSessionRequest::default()).await.unwrap();
        assert!(app.get_all_accounts().is_empty());
    }

    #[test]
    fn test_response_without_id_token_needs_known_account() {
        use oauth2::basic::BasicTokenType;
        use oauth2::AccessToken;

        let (app, _) = app_with(&ExecutionContext::headless(), TokenCache::in_memory());
        let response = || {
            EntraTokenResponse::new(
                AccessToken::new("at".to_string()),
                BasicTokenType::Bearer,
                oauth::IdTokenFields::default(),
            )
        };
        let scopes = vec!["User.Read".to_string()];

        let err = app.store_response(response(), &scopes, None).unwrap_err();
        assert_eq!(err, ClientError::no_account());
        assert!(app.get_all_accounts().is_empty());

        let ada = account("ada");
        let result = app.store_response(response(), &scopes, Some(&ada)).unwrap();
        assert_eq!(result.access_token, "at");
        assert_eq!(result.scopes, scopes);
        assert_eq!(result.account, Some(ada.clone()));
        assert_eq!(app.get_all_accounts(), vec![ada]);
    }

    #[test]
    fn test_invalid_authority_rejected() {
        let mut derived = config();
        derived.auth.authority = crate::config::Authority::new("not a url");
        let result = PublicClientApplication::with_cache(
            derived,
            &ExecutionContext::headless(),
            Arc::new(ConsoleUserAgent),
            TokenCache::in_memory(),
        );
        assert_eq!(result.err().unwrap().code, "invalid_client_configuration");
    }

    #[test]
    fn test_response_params_prefers_query_then_fragment() {
        let url = Url::parse("http://localhost:3000/?code=q&state=s#code=f").unwrap();
        assert_eq!(response_params(&url)["code"], "q");
        let url = Url::parse("http://localhost:3000/#code=f&state=s").unwrap();
        assert_eq!(response_params(&url)["code"], "f");
        let url = Url::parse("http://localhost:3000/").unwrap();
        assert!(response_params(&url).is_empty());
    }
}
