//! Graph entities

mod user;

pub use user::*;
