//! User profile endpoint (/me)

use anyhow::{Context, Result};

use super::client::GraphClient;
use crate::models::User;

/// Fetch the signed-in user's profile.
pub async fn me(client: &GraphClient) -> Result<User> {
    let resp = client.get("/me").await?;
    resp.json().await.context("Failed to parse /me response")
}

pub fn print_user(user: &User) {
    println!();
    println!(
        "Display Name: {}",
        user.display_name.as_deref().unwrap_or("(none)")
    );
    println!("Mail:         {}", user.mail.as_deref().unwrap_or("(none)"));
    println!(
        "UPN:          {}",
        user.user_principal_name.as_deref().unwrap_or("(none)")
    );
    println!("ID:           {}", user.id);
}
