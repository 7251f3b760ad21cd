//! check command - authenticate one credential from the command line

use anyhow::{Context, Result};
use dcauth_api::AuthGateway;
use dcauth_auth::ldap::{AuthRequest, LdapConnector};
use dcauth_core::ConfigSource;
use std::io::BufRead;
use std::sync::Arc;

/// Prints the `/checkAuth` response body; returns whether the credential
/// was accepted
pub async fn execute(
    config: Arc<dyn ConfigSource>,
    username: String,
    domain: Option<String>,
    password: Option<String>,
) -> Result<bool> {
    let password = match password {
        Some(password) => password,
        None => read_password(std::io::stdin().lock())?,
    };

    let request = AuthRequest::new(username, password, domain)?;
    let gateway = AuthGateway::new(config, Arc::new(LdapConnector::new()));
    let response = gateway.handle(request).await?;

    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(response.authenticated)
}

/// First line of `input` without its line terminator
fn read_password(mut input: impl BufRead) -> Result<String> {
    let mut line = String::new();
    input
        .read_line(&mut line)
        .context("reading password from stdin")?;

    Ok(line.trim_end_matches(&['\r', '\n'][..]).to_string())
}
