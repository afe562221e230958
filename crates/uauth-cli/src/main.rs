//! uauth - command-line client for uauth sessions.
//!
//! Logs in against a uauth issuer, keeps the token pair in the configured
//! store between runs, and renews it transparently on every command.

use std::io::{self, Write};

use anyhow::{Context, Result};
use chrono::{DateTime, Local, Utc};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use uauth_core::{AuthClient, Config, SessionView};

const USAGE: &str = "\
Usage: uauth <command>

Commands:
  login [username]   Log in (password is prompted)
  status             Show session state and token expiry
  whoami             Show the logged-in identity
  get <path>         Authenticated GET, prints the JSON response
  tokens             List your refresh tokens
  revoke <token>     Revoke one refresh token
  logout             Revoke the current refresh token and log out

Environment:
  UAUTH_URL          Issuer base URL (e.g. http://localhost:8080/uauth)
  UAUTH_TIMEOUT_MS   Request timeout in milliseconds (default 5000)
  UAUTH_STORAGE      file | keyring | memory (default file)
  RUST_LOG           Log filter (default warn)";

/// Initialize the tracing subscriber for logging
fn init_tracing() {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    init_tracing();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(command) = args.first().map(String::as_str) else {
        println!("{USAGE}");
        return Ok(());
    };
    if matches!(command, "-h" | "--help" | "help") {
        println!("{USAGE}");
        return Ok(());
    }

    let mut config = Config::load().context("Failed to load configuration")?;
    let auth = AuthClient::from_config(&config)?;
    let restored = auth.restore().await;
    info!(restored, "uauth starting");

    match (command, args.get(1)) {
        ("login", username) => login(&auth, &mut config, username.cloned()).await,
        ("status", _) => {
            print_status(&auth.view());
            Ok(())
        }
        ("whoami", _) => whoami(&auth),
        ("get", Some(path)) => get(&auth, path).await,
        ("tokens", _) => list_tokens(&auth).await,
        ("revoke", Some(token)) => {
            auth.delete_refresh_token(token).await?;
            println!("Refresh token revoked");
            Ok(())
        }
        ("logout", _) => {
            auth.logout().await?;
            println!("Logged out");
            Ok(())
        }
        _ => {
            eprintln!("{USAGE}");
            anyhow::bail!("Unknown or incomplete command: {}", args.join(" "))
        }
    }
}

async fn login(auth: &AuthClient, config: &mut Config, username: Option<String>) -> Result<()> {
    let username = match username.or_else(|| config.last_username.clone()) {
        Some(name) => name,
        None => prompt("Username: ")?,
    };
    let password = rpassword::prompt_password(format!("Password for {}: ", username))
        .context("Failed to read password")?;

    let user = auth.login(&username, &password).await?;
    println!("Logged in as {} ({})", user.user_name, user.full_name());

    if config.last_username.as_deref() != Some(username.as_str()) {
        config.last_username = Some(username);
        config.save().context("Failed to save configuration")?;
    }
    Ok(())
}

fn whoami(auth: &AuthClient) -> Result<()> {
    let user = auth
        .user()
        .ok_or_else(|| anyhow::anyhow!("Not logged in"))?;
    println!("{}", serde_json::to_string_pretty(&user)?);
    Ok(())
}

async fn get(auth: &AuthClient, path: &str) -> Result<()> {
    let client = auth.request(None).await?;
    let body: serde_json::Value = client.get_json(path).await?;
    println!("{}", serde_json::to_string_pretty(&body)?);
    Ok(())
}

async fn list_tokens(auth: &AuthClient) -> Result<()> {
    let current = auth.view().refresh_token;
    let tokens = auth.list_refresh_tokens().await?;
    if tokens.is_empty() {
        println!("No refresh tokens");
        return Ok(());
    }
    for token in tokens {
        let marker = if current.as_deref() == Some(token.raw.as_str()) { "*" } else { " " };
        println!(
            "{} issued {}  expires {}  {}",
            marker,
            local(token.issued_at()),
            local(token.expires_at()),
            token.raw
        );
    }
    Ok(())
}

fn print_status(view: &SessionView) {
    if !view.logged_in {
        println!("Not logged in");
        return;
    }
    if let Some(ref user) = view.user {
        println!("Logged in as {}", user.user_name);
    }
    if let Some(until) = view.access_token_valid_until {
        println!("Access token valid until  {}", local(until));
    }
    if let Some(until) = view.refresh_token_valid_until {
        println!("Refresh token valid until {}", local(until));
    }
}

fn local(ts: DateTime<Utc>) -> String {
    ts.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S").to_string()
}

fn prompt(label: &str) -> Result<String> {
    print!("{}", label);
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().read_line(&mut line)?;
    let value = line.trim().to_string();
    if value.is_empty() {
        anyhow::bail!("No username given");
    }
    Ok(value)
}
