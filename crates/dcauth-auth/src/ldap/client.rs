//! Directory connections
//!
//! The bind ladder talks to the directory through [`DirectoryConnector`] and
//! [`DirectorySession`]. [`LdapConnector`] is the `ldap3` implementation;
//! it supports simple binds over plain LDAP, StartTLS and LDAPS.

use crate::ldap::types::{BindAttemptSpec, BindMechanism, ConnectOptions, DirectoryError, Transport};
use async_trait::async_trait;
use ldap3::{Ldap, LdapConnAsync, LdapConnSettings, LdapError};
use tokio::task::JoinHandle;
use tracing::debug;

/// Opens one connection per bind attempt
#[async_trait]
pub trait DirectoryConnector: Send + Sync {
    /// Whether [`DirectorySession::bind`] can perform `mechanism`
    fn supports(&self, mechanism: BindMechanism) -> bool;

    /// Connect (and secure, for TLS transports) a new connection
    async fn connect(
        &self,
        spec: &BindAttemptSpec,
        options: &ConnectOptions,
    ) -> Result<Box<dyn DirectorySession>, DirectoryError>;
}

/// A single open directory connection
///
/// Dropping a session releases the connection; [`close`](Self::close) also
/// says goodbye to the server first.
#[async_trait]
pub trait DirectorySession: Send {
    async fn bind(
        &mut self,
        mechanism: BindMechanism,
        bind_name: &str,
        password: &str,
    ) -> Result<(), DirectoryError>;

    async fn close(self: Box<Self>);
}

/// `ldap3`-backed connector
#[derive(Debug, Clone, Copy, Default)]
pub struct LdapConnector;

impl LdapConnector {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl DirectoryConnector for LdapConnector {
    fn supports(&self, mechanism: BindMechanism) -> bool {
        matches!(mechanism, BindMechanism::Simple)
    }

    async fn connect(
        &self,
        spec: &BindAttemptSpec,
        options: &ConnectOptions,
    ) -> Result<Box<dyn DirectorySession>, DirectoryError> {
        let settings = LdapConnSettings::new()
            .set_conn_timeout(options.connect_timeout)
            .set_starttls(spec.transport == Transport::StartTls)
            .set_no_tls_verify(options.skip_tls_verify);

        let url = spec.url();
        debug!("Connecting to LDAP server: {} ({})", url, spec.transport.as_str());

        let (conn, ldap) = LdapConnAsync::with_settings(settings, &url)
            .await
            .map_err(|e| connect_error(spec.transport, e))?;

        let driver = tokio::spawn(async move {
            if let Err(e) = conn.drive().await {
                debug!("LDAP connection driver ended: {}", e);
            }
        });

        Ok(Box::new(LdapSession { ldap, driver }))
    }
}

struct LdapSession {
    ldap: Ldap,
    driver: JoinHandle<()>,
}

#[async_trait]
impl DirectorySession for LdapSession {
    async fn bind(
        &mut self,
        mechanism: BindMechanism,
        bind_name: &str,
        password: &str,
    ) -> Result<(), DirectoryError> {
        if mechanism != BindMechanism::Simple {
            return Err(DirectoryError::Unsupported(mechanism));
        }

        let result = self
            .ldap
            .simple_bind(bind_name, password)
            .await
            .map_err(operation_error)?;

        if result.rc != 0 {
            return Err(DirectoryError::Bind {
                rc: result.rc,
                message: result.text,
            });
        }

        Ok(())
    }

    async fn close(mut self: Box<Self>) {
        if let Err(e) = self.ldap.unbind().await {
            debug!("LDAP unbind failed: {}", e);
        }
    }
}

impl Drop for LdapSession {
    fn drop(&mut self) {
        // Stops the driver task, which closes the socket.
        self.driver.abort();
    }
}

fn connect_error(transport: Transport, error: LdapError) -> DirectoryError {
    let message = error.to_string();

    if transport == Transport::StartTls {
        let refused = matches!(error, LdapError::LdapResult { .. });
        if refused || message.to_ascii_lowercase().contains("starttls") {
            return DirectoryError::TlsInit(message);
        }
    }

    DirectoryError::Connect(message)
}

fn operation_error(error: LdapError) -> DirectoryError {
    match error {
        LdapError::LdapResult { result } => DirectoryError::Bind {
            rc: result.rc,
            message: result.text,
        },
        other => DirectoryError::Connect(other.to_string()),
    }
}
