//! entra-auth - sign-in plumbing for the Microsoft identity platform
//!
//! An [`AuthProvider`] turns an [`AuthConfig`] into a ready
//! [`ClientApplication`], and hands out [`AuthFacade`]s that wrap the
//! login, logout and token calls behind one error type.

pub mod api;
pub mod client;
pub mod config;
pub mod context;
pub mod error;
pub mod facade;
pub mod logging;
pub mod models;
pub mod native;
pub mod provider;

pub use client::{AccountInfo, AuthenticationResult, ClientApplication, InteractionStatus};
pub use config::{AuthConfig, AuthorityType, CacheLocation, DerivedConfiguration, ExecutionContext};
pub use context::AuthContext;
pub use error::{AuthError, AuthErrorKind, ClientError};
pub use facade::AuthFacade;
pub use logging::{LogEntry, LogHistory, LogLevel, LoggerCallback, LoggerOptions};
pub use native::{ConsoleUserAgent, PublicClientApplication, UserAgent};
pub use provider::{AuthProvider, ClientFactory, ProviderState, Rendered};
