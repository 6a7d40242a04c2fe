//! entra-auth - sign in to the Microsoft identity platform from a terminal
//!
//! Thin CLI over the provider and facade: configure once, then log in,
//! fetch tokens and call Graph.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use url::Url;

use entra_auth::api::{self, GraphClient};
use entra_auth::config::{derive, DEFAULT_SCOPE};
use entra_auth::{
    AuthConfig, AuthContext, AuthProvider, ClientFactory, ConsoleUserAgent, DerivedConfiguration,
    ExecutionContext, LogHistory, PublicClientApplication, UserAgent,
};

#[derive(Parser)]
#[command(name = "entra-auth")]
#[command(about = "Sign in to the Microsoft identity platform", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file (defaults to config.toml in the platform config dir)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Act as a browser host served from this origin
    #[arg(long, global = true)]
    origin: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the derived client configuration
    Config,

    /// Sign in (device code by default)
    Login {
        /// Use the authorization code redirect flow instead
        #[arg(short, long)]
        redirect: bool,

        /// Scopes to request (repeatable)
        #[arg(short, long = "scope")]
        scopes: Vec<String>,
    },

    /// Finish a redirect flow with the URL the browser landed on
    Complete {
        /// Redirect URL including the code (or error) parameters
        url: String,
    },

    /// Sign out the current account
    Logout {
        #[arg(short, long)]
        redirect: bool,
    },

    /// Acquire an access token and print it
    Token {
        #[arg(short, long, value_enum, default_value = "auto")]
        mode: TokenMode,

        /// Scopes to request (repeatable)
        #[arg(short, long = "scope")]
        scopes: Vec<String>,
    },

    /// Show accounts and authentication state (with --verbose, the identity log too)
    Status,

    /// Show current user info from Graph (verify auth works)
    Whoami,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum TokenMode {
    /// Silent, then device code if that fails
    Auto,
    Silent,
    Popup,
    Redirect,
}

fn scopes_arg(scopes: Vec<String>) -> Option<Vec<String>> {
    if scopes.is_empty() {
        None
    } else {
        Some(scopes)
    }
}

type Provider<F> = AuthProvider<PublicClientApplication, F>;

/// Start the provider and hand back its context.
async fn ready<F>(provider: &Provider<F>) -> Result<&AuthContext<PublicClientApplication>>
where
    F: ClientFactory<PublicClientApplication>,
{
    provider.start().await?;
    provider
        .context()
        .context("Authentication provider is not ready")
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose { "debug" } else { "info" };
    let history = LogHistory::new();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .with(history.clone())
        .init();

    let mut config = AuthConfig::load(cli.config.as_deref())?;
    if cli.verbose {
        config.enable_logging = true;
    }

    let mut context = match &cli.origin {
        Some(origin) => ExecutionContext::browser(origin.clone()),
        None => ExecutionContext::headless(),
    };
    if let Commands::Complete { url } = &cli.command {
        let url = Url::parse(url).with_context(|| format!("Invalid redirect URL: {}", url))?;
        context = context.with_current_url(url);
    }

    let user_agent: Arc<dyn UserAgent> = Arc::new(ConsoleUserAgent);
    let factory_context = context.clone();
    let provider: Provider<_> =
        AuthProvider::new(config, context.clone(), move |derived: DerivedConfiguration| {
            PublicClientApplication::new(derived, &factory_context, user_agent.clone())
        });

    match cli.command {
        Commands::Config => {
            let derived = derive(provider.config(), &context)?;
            println!("{}", serde_json::to_string_pretty(&derived)?);
        }
        Commands::Login { redirect, scopes } => {
            let facade = ready(&provider).await?.use_auth();
            if redirect {
                facade.login_redirect(scopes_arg(scopes)).await?;
                println!("After signing in, run: entra-auth complete '<redirected URL>'");
            } else {
                tracing::info!("Starting device code login...");
                let result = facade.login_popup(scopes_arg(scopes)).await?;
                if let Some(account) = result.account {
                    println!("Signed in as {}", account.username);
                }
            }
        }
        Commands::Complete { .. } => {
            let auth = ready(&provider).await?;
            if auth.is_authenticated() {
                print_status(auth);
            } else {
                println!("No redirect result to complete.");
            }
        }
        Commands::Logout { redirect } => {
            let facade = ready(&provider).await?.use_auth();
            tracing::info!("Logging out...");
            if redirect {
                facade.logout_redirect().await?;
            } else {
                facade.logout_popup().await?;
            }
            println!("Signed out.");
        }
        Commands::Token { mode, scopes } => {
            let facade = ready(&provider).await?.use_auth();
            let scopes = scopes_arg(scopes);
            let token = match mode {
                TokenMode::Auto => facade.acquire_token(scopes).await?,
                TokenMode::Silent => facade.acquire_token_silent(scopes).await?,
                TokenMode::Popup => facade.acquire_token_popup(scopes).await?,
                TokenMode::Redirect => {
                    facade.acquire_token_redirect(scopes).await?;
                    println!("After signing in, run: entra-auth complete '<redirected URL>'");
                    return Ok(());
                }
            };
            println!("{}", token);
        }
        Commands::Status => {
            print_status(ready(&provider).await?);
            if cli.verbose {
                print_identity_log(&history);
            }
        }
        Commands::Whoami => {
            let facade = ready(&provider).await?.use_auth();
            let token = facade
                .acquire_token(Some(vec![DEFAULT_SCOPE.to_string()]))
                .await?;
            let user = api::me(&GraphClient::new(token)).await?;
            api::print_user(&user);
        }
    }

    Ok(())
}

fn print_status(auth: &AuthContext<PublicClientApplication>) {
    let accounts = auth.accounts();
    println!(
        "Authenticated: {}",
        if auth.is_authenticated() { "yes" } else { "no" }
    );
    println!("Interaction:   {:?}", auth.interaction_status());
    println!("Scopes:        {}", auth.default_scopes().join(" "));
    if accounts.is_empty() {
        println!("Accounts:      none");
    }
    for account in accounts {
        println!(
            "Account:       {} ({})",
            account.username,
            account.name.as_deref().unwrap_or("no name")
        );
        println!("  home_account_id: {}", account.home_account_id);
    }
}

fn print_identity_log(history: &LogHistory) {
    let entries = history.identity();
    println!();
    println!("Identity log ({} entries):", entries.len());
    for entry in entries {
        println!("  {}", entry);
    }
}
