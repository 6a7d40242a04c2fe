//! Events emitted by a client application

use std::fmt;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};

use super::{AccountInfo, AuthenticationResult};
use crate::error::ClientError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    InitializeStart,
    InitializeEnd,
    AccountAdded,
    AccountRemoved,
    LoginStart,
    LoginSuccess,
    LoginFailure,
    AcquireTokenStart,
    AcquireTokenSuccess,
    AcquireTokenFailure,
    HandleRedirectStart,
    HandleRedirectEnd,
    LogoutStart,
    LogoutSuccess,
    LogoutFailure,
    LogoutEnd,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InteractionType {
    Popup,
    Redirect,
    Silent,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EventPayload {
    Authentication(AuthenticationResult),
    Account(AccountInfo),
}

#[derive(Debug, Clone, PartialEq)]
pub struct EventMessage {
    pub event_type: EventType,
    pub interaction_type: Option<InteractionType>,
    pub payload: Option<EventPayload>,
    pub error: Option<ClientError>,
    pub timestamp: DateTime<Utc>,
}

impl EventMessage {
    pub fn new(event_type: EventType) -> Self {
        Self {
            event_type,
            interaction_type: None,
            payload: None,
            error: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_interaction(mut self, interaction: InteractionType) -> Self {
        self.interaction_type = Some(interaction);
        self
    }

    pub fn with_payload(mut self, payload: EventPayload) -> Self {
        self.payload = Some(payload);
        self
    }

    pub fn with_error(mut self, error: ClientError) -> Self {
        self.error = Some(error);
        self
    }
}

#[derive(Clone)]
pub struct EventCallback(Arc<dyn Fn(&EventMessage) + Send + Sync>);

impl EventCallback {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&EventMessage) + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    pub fn call(&self, message: &EventMessage) {
        (self.0)(message)
    }
}

impl fmt::Debug for EventCallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("EventCallback(..)")
    }
}

/// Handle returned when registering a callback.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CallbackId(String);

impl CallbackId {
    fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Registered callbacks of one client application.
#[derive(Debug, Default)]
pub struct EventRegistry {
    callbacks: Mutex<Vec<(CallbackId, EventCallback)>>,
}

impl EventRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, callback: EventCallback) -> CallbackId {
        let id = CallbackId::generate();
        let mut guard = self.callbacks.lock().unwrap_or_else(|e| e.into_inner());
        guard.push((id.clone(), callback));
        id
    }

    pub fn remove(&self, id: &CallbackId) {
        let mut guard = self.callbacks.lock().unwrap_or_else(|e| e.into_inner());
        guard.retain(|(existing, _)| existing != id);
    }

    pub fn len(&self) -> usize {
        self.callbacks.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Deliver a message to every callback, in registration order.
    pub fn emit(&self, message: EventMessage) {
        // Snapshot so callbacks may register or remove callbacks themselves.
        let callbacks: Vec<EventCallback> = {
            let guard = self.callbacks.lock().unwrap_or_else(|e| e.into_inner());
            guard.iter().map(|(_, cb)| cb.clone()).collect()
        };
        for cb in callbacks {
            cb.call(&message);
        }
    }
}
