//! Microsoft Graph calls made with tokens from the facade

pub mod client;
mod me;

pub use client::GraphClient;
pub use me::{me, print_user};
