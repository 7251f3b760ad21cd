//! verify-token command - validate a token and print its claims

use anyhow::{Context, Result};
use dcauth_auth::TokenIssuer;
use dcauth_core::{ConfigSource, TokenSettings};

pub fn execute(config: &dyn ConfigSource, token: &str) -> Result<()> {
    let settings = TokenSettings::from_source(config)?;
    let issuer = TokenIssuer::new(&settings)?;

    let claims = issuer
        .verify(token.trim())
        .context("token verification failed")?;

    println!("{}", serde_json::to_string_pretty(&claims)?);
    Ok(())
}
