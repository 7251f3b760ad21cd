//! Directory URL resolution

use crate::ldap::types::DirectoryEndpoint;
use dcauth_core::config::keys;
use dcauth_core::{Error, Result, DEFAULT_LDAPS_PORT, DEFAULT_LDAP_PORT};
use std::net::Ipv6Addr;
use tracing::warn;
use url::Url;

/// Resolve the configured directory URL into host, port and TLS mode
///
/// `ldaps://` defaults to port 636 with implicit TLS; `ldap://` and bare
/// hosts default to 389. An explicit port always wins. A bare IPv6
/// literal such as `::1` is accepted without brackets.
pub fn resolve(configured_url: Option<&str>) -> Result<DirectoryEndpoint> {
    let raw = configured_url
        .map(str::trim)
        .filter(|u| !u.is_empty())
        .ok_or(Error::NotConfigured {
            what: "Domain controller URL",
            key: keys::DIRECTORY_URL,
        })?;

    let url = if raw.contains("://") {
        Url::parse(raw)
    } else if raw.parse::<Ipv6Addr>().is_ok() {
        Url::parse(&format!("ldap://[{}]", raw))
    } else {
        Url::parse(&format!("ldap://{}", raw))
    }
    .map_err(|e| invalid(raw, &e.to_string()))?;

    let implicit_tls = match url.scheme() {
        "ldaps" => true,
        "ldap" => false,
        other => {
            warn!(scheme = %other, "Unrecognized directory URL scheme, treating as ldap");
            false
        }
    };

    let host = url
        .host_str()
        .map(|h| h.trim_start_matches('[').trim_end_matches(']'))
        .filter(|h| !h.is_empty())
        .ok_or_else(|| invalid(raw, "missing host"))?
        .to_string();

    let port = match url.port() {
        Some(0) => return Err(invalid(raw, "port must be between 1 and 65535")),
        Some(port) => port,
        None if implicit_tls => DEFAULT_LDAPS_PORT,
        None => DEFAULT_LDAP_PORT,
    };

    Ok(DirectoryEndpoint {
        host,
        port,
        implicit_tls,
    })
}

fn invalid(raw: &str, reason: &str) -> Error {
    Error::InvalidConfiguration(format!(
        "Domain controller URL invalid ({}): {:?}: {}",
        keys::DIRECTORY_URL,
        raw,
        reason
    ))
}
