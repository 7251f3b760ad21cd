//! Directory types shared by the resolver, the connector and the bind ladder

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

// ============================================================================
// Endpoint
// ============================================================================

/// Resolved directory server address
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryEndpoint {
    pub host: String,
    pub port: u16,
    /// `ldaps://`: TLS from the first byte
    pub implicit_tls: bool,
}

impl fmt::Display for DirectoryEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let scheme = if self.implicit_tls { "ldaps" } else { "ldap" };
        write!(f, "{}://{}:{}", scheme, url_host(&self.host), self.port)
    }
}

/// IPv6 literals need brackets inside a URL
fn url_host(host: &str) -> String {
    if host.contains(':') && !host.starts_with('[') {
        format!("[{}]", host)
    } else {
        host.to_string()
    }
}

// ============================================================================
// Bind attempts
// ============================================================================

/// How the connection carrying a bind is secured
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Transport {
    /// Unencrypted LDAP
    Plain,
    /// LDAP upgraded with the StartTLS extended operation
    StartTls,
    /// LDAPS
    ImplicitTls,
}

impl Transport {
    pub fn as_str(&self) -> &'static str {
        match self {
            Transport::Plain => "plain",
            Transport::StartTls => "starttls",
            Transport::ImplicitTls => "ldaps",
        }
    }

    pub fn is_encrypted(&self) -> bool {
        !matches!(self, Transport::Plain)
    }
}

/// Bind mechanism
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BindMechanism {
    Simple,
    Negotiate,
    Ntlm,
}

impl BindMechanism {
    pub fn as_str(&self) -> &'static str {
        match self {
            BindMechanism::Simple => "simple",
            BindMechanism::Negotiate => "negotiate",
            BindMechanism::Ntlm => "ntlm",
        }
    }
}

/// One concrete bind attempt: where to connect, how to secure it, how to bind
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BindAttemptSpec {
    pub host: String,
    pub port: u16,
    pub transport: Transport,
    pub mechanism: BindMechanism,
}

impl BindAttemptSpec {
    /// URL handed to the LDAP client. StartTLS connects with `ldap://`.
    pub fn url(&self) -> String {
        let scheme = match self.transport {
            Transport::ImplicitTls => "ldaps",
            Transport::Plain | Transport::StartTls => "ldap",
        };
        format!("{}://{}:{}", scheme, url_host(&self.host), self.port)
    }
}

impl fmt::Display for BindAttemptSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} bind over {} to {}:{}",
            self.mechanism.as_str(),
            self.transport.as_str(),
            self.host,
            self.port
        )
    }
}

/// Per-connection options taken from configuration
#[derive(Debug, Clone)]
pub struct ConnectOptions {
    pub connect_timeout: Duration,
    pub skip_tls_verify: bool,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(dcauth_core::DEFAULT_ATTEMPT_TIMEOUT_SECS),
            skip_tls_verify: false,
        }
    }
}

// ============================================================================
// Errors and outcomes
// ============================================================================

/// Raw failure reported by a directory connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DirectoryError {
    /// The server answered the bind with a non-zero result code
    Bind { rc: u32, message: String },
    /// TLS could not be initialised on the connection (StartTLS refused)
    TlsInit(String),
    /// Transport failure: DNS, refused connection, TLS handshake, I/O
    Connect(String),
    /// The attempt did not finish in time
    Timeout(Duration),
    /// The connector cannot perform this mechanism
    Unsupported(BindMechanism),
}

impl fmt::Display for DirectoryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DirectoryError::Bind { rc, message } => {
                write!(f, "bind failed with result code {}: {}", rc, message)
            }
            DirectoryError::TlsInit(msg) => write!(f, "error initializing TLS: {}", msg),
            DirectoryError::Connect(msg) => write!(f, "connection failed: {}", msg),
            DirectoryError::Timeout(d) => {
                write!(f, "directory did not respond within {}ms", d.as_millis())
            }
            DirectoryError::Unsupported(m) => {
                write!(f, "{} bind is not supported by the directory client", m.as_str())
            }
        }
    }
}

impl std::error::Error for DirectoryError {}

/// How the ladder treats a failed attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureClass {
    /// The server wants a stronger method; try the next rung
    StrongAuthRequired,
    /// The credentials (or account) were refused
    Rejected,
    /// The directory could not be reached or did not answer
    Infrastructure,
}

impl FailureClass {
    pub fn is_escalatable(&self) -> bool {
        matches!(self, FailureClass::StrongAuthRequired)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FailureClass::StrongAuthRequired => "strong_auth_required",
            FailureClass::Rejected => "rejected",
            FailureClass::Infrastructure => "infrastructure",
        }
    }
}

/// Final result of running the bind ladder
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthOutcome {
    /// Carries the bind name that succeeded
    Authenticated(String),
    Rejected,
    Failed(String),
}

impl AuthOutcome {
    pub fn is_authenticated(&self) -> bool {
        matches!(self, AuthOutcome::Authenticated(_))
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AuthOutcome::Authenticated(_) => "authenticated",
            AuthOutcome::Rejected => "rejected",
            AuthOutcome::Failed(_) => "failed",
        }
    }
}

/// Rungs of the escalation ladder, in evaluation order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LadderStep {
    /// Simple bind over the configured transport
    Primary,
    /// Same port, upgraded with StartTLS
    StartTls,
    /// Implicit TLS on the TLS port
    ImplicitTlsFallback,
    /// Another mechanism over the transport of the last failed attempt
    Alternate(BindMechanism),
}

impl fmt::Display for LadderStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LadderStep::Primary => write!(f, "primary"),
            LadderStep::StartTls => write!(f, "starttls"),
            LadderStep::ImplicitTlsFallback => write!(f, "implicit-tls"),
            LadderStep::Alternate(m) => write!(f, "alternate-{}", m.as_str()),
        }
    }
}

/// What happened on one rung
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptRecord {
    pub step: LadderStep,
    pub spec: BindAttemptSpec,
    /// `None` when the bind succeeded
    pub failure: Option<FailureClass>,
    pub elapsed: Duration,
}

/// Outcome plus the attempts that led to it
#[derive(Debug, Clone)]
pub struct AuthReport {
    pub outcome: AuthOutcome,
    pub attempts: Vec<AttemptRecord>,
}
