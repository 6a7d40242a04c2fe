//! Lifecycle owner of the client application
//!
//! `AuthProvider` moves through `Uninitialized -> Initializing -> Ready`
//! exactly once. Until it is ready it renders a placeholder; afterwards it
//! renders children with an [`AuthContext`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use crate::client::{
    AuthenticationResult, ClientApplication, EventCallback, EventMessage, EventPayload,
    EventType,
};
use crate::config::{derive, AuthConfig, DerivedConfiguration, ExecutionContext};
use crate::context::AuthContext;
use crate::error::{AuthError, ClientError, InitStage};

pub const DEFAULT_LOADING_PLACEHOLDER: &str = "Loading authentication...";

/// Builds the client application from a derived configuration.
pub trait ClientFactory<C> {
    fn create(&self, config: DerivedConfiguration) -> Result<C, ClientError>;
}

impl<C, F> ClientFactory<C> for F
where
    F: Fn(DerivedConfiguration) -> Result<C, ClientError>,
{
    fn create(&self, config: DerivedConfiguration) -> Result<C, ClientError> {
        self(config)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Lifecycle of a provider; it only ever moves forward.
pub enum ProviderState {
    Uninitialized,
    Initializing,
    Ready,
}

/// Output of [`AuthProvider::render`].
#[derive(Debug, PartialEq)]
pub enum Rendered<'a, V> {
    Loading(&'a str),
    Ready(V),
}

/// Provider-level notifications; other event types are ignored.
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderEvent {
    LoginSuccess { username: Option<String> },
    LoginFailure { error: Option<ClientError> },
    LogoutSuccess,
}

impl ProviderEvent {
    pub fn recognize(message: &EventMessage) -> Option<Self> {
        match message.event_type {
            EventType::LoginSuccess => {
                let username = match &message.payload {
                    Some(EventPayload::Authentication(result)) => {
                        result.account.as_ref().map(|a| a.username.clone())
                    }
                    Some(EventPayload::Account(account)) => Some(account.username.clone()),
                    None => None,
                };
                Some(ProviderEvent::LoginSuccess { username })
            }
            EventType::LoginFailure => Some(ProviderEvent::LoginFailure {
                error: message.error.clone(),
            }),
            EventType::LogoutSuccess => Some(ProviderEvent::LogoutSuccess),
            _ => None,
        }
    }

    fn log(&self) {
        match self {
            ProviderEvent::LoginSuccess { username } => {
                tracing::info!(
                    "Login successful: {}",
                    username.as_deref().unwrap_or("(unknown account)")
                );
            }
            ProviderEvent::LoginFailure { error: Some(err) } => {
                tracing::error!("Login failed: {}", err);
            }
            ProviderEvent::LoginFailure { error: None } => {
                tracing::error!("Login failed");
            }
            ProviderEvent::LogoutSuccess => tracing::info!("Logout successful"),
        }
    }
}

/// Owns one client application and its start-up sequence.
pub struct AuthProvider<C: ClientApplication, F> {
    config: AuthConfig,
    context: ExecutionContext,
    factory: F,
    placeholder: String,
    started: AtomicBool,
    ready: OnceLock<AuthContext<C>>,
}

impl<C, F> AuthProvider<C, F>
where
    C: ClientApplication,
    F: ClientFactory<C>,
{
    /// Provider for `config`; nothing runs until [`AuthProvider::start`].
    pub fn new(config: AuthConfig, context: ExecutionContext, factory: F) -> Self {
        Self {
            config,
            context,
            factory,
            placeholder: DEFAULT_LOADING_PLACEHOLDER.to_string(),
            started: AtomicBool::new(false),
            ready: OnceLock::new(),
        }
    }

    /// Replace the text rendered while starting up.
    pub fn with_loading_placeholder(mut self, placeholder: impl Into<String>) -> Self {
        self.placeholder = placeholder.into();
        self
    }

    /// Options the provider was built with.
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ProviderState {
        if self.ready.get().is_some() {
            ProviderState::Ready
        } else if self.started.load(Ordering::SeqCst) {
            ProviderState::Initializing
        } else {
            ProviderState::Uninitialized
        }
    }

    /// Context for children, once ready.
    pub fn context(&self) -> Option<&AuthContext<C>> {
        self.ready.get()
    }

    /// Run `children` once ready, else hand back the loading placeholder.
    pub fn render<V>(&self, children: impl FnOnce(&AuthContext<C>) -> V) -> Rendered<'_, V> {
        match self.ready.get() {
            Some(ctx) => Rendered::Ready(children(ctx)),
            None => Rendered::Loading(&self.placeholder),
        }
    }

    /// Run the initialization sequence. Only the first call does anything.
    ///
    /// Configuration errors are returned untouched. Client failures are
    /// logged and returned; the provider then stays `Initializing`.
    pub async fn start(&self) -> Result<(), AuthError> {
        if self.started.swap(true, Ordering::SeqCst) {
            tracing::debug!("Authentication provider already started");
            return Ok(());
        }

        let derived = derive(&self.config, &self.context)?;

        let instance = self
            .factory
            .create(derived)
            .map_err(|e| init_failed(InitStage::Construct, e))?;

        instance
            .initialize()
            .await
            .map_err(|e| init_failed(InitStage::Initialize, e))?;

        let redirect: Option<AuthenticationResult> = instance
            .handle_redirect_promise()
            .await
            .map_err(|e| init_failed(InitStage::HandleRedirect, e))?;
        if redirect.is_some() {
            tracing::info!("Redirect authentication successful");
        }

        instance.add_event_callback(EventCallback::new(|message| {
            if let Some(event) = ProviderEvent::recognize(message) {
                event.log();
            }
        }));

        let context = AuthContext::new(Arc::new(instance), self.config.default_scopes());
        if self.ready.set(context).is_err() {
            tracing::warn!("Authentication provider became ready twice");
        }
        tracing::debug!("Authentication provider ready");
        Ok(())
    }
}

fn init_failed(stage: InitStage, source: ClientError) -> AuthError {
    tracing::error!("Initialization failed during {}: {}", stage, source);
    AuthError::Initialization { stage, source }
}
