//! Failure classification for bind attempts
//!
//! Every escalation decision goes through [`classify`].

use crate::ldap::types::{DirectoryError, FailureClass};
use once_cell::sync::Lazy;
use regex::Regex;

/// LDAP result code `strongerAuthRequired` (RFC 4511)
pub const RC_STRONGER_AUTH_REQUIRED: u32 = 8;

/// LDAP result code `confidentialityRequired` (RFC 4511)
pub const RC_CONFIDENTIALITY_REQUIRED: u32 = 13;

/// LDAP result code `invalidCredentials` (RFC 4511)
pub const RC_INVALID_CREDENTIALS: u32 = 49;

static STRONG_AUTH_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)strong(er)?\s+auth|error initiali[sz]ing ssl/tls|confidentiality\s+required")
        .expect("static pattern compiles")
});

/// Whether a directory message signals that a stronger method is required
pub fn is_strong_auth_message(message: &str) -> bool {
    STRONG_AUTH_PATTERN.is_match(message)
}

/// Decide whether a failed attempt escalates, rejects or aborts
pub fn classify(error: &DirectoryError) -> FailureClass {
    match error {
        DirectoryError::Bind { rc, .. }
            if *rc == RC_STRONGER_AUTH_REQUIRED || *rc == RC_CONFIDENTIALITY_REQUIRED =>
        {
            FailureClass::StrongAuthRequired
        }
        DirectoryError::Bind { message, .. } if is_strong_auth_message(message) => {
            FailureClass::StrongAuthRequired
        }
        DirectoryError::Bind { .. } => FailureClass::Rejected,
        DirectoryError::TlsInit(_) => FailureClass::StrongAuthRequired,
        DirectoryError::Connect(message) if is_strong_auth_message(message) => {
            FailureClass::StrongAuthRequired
        }
        DirectoryError::Connect(_) | DirectoryError::Timeout(_) | DirectoryError::Unsupported(_) => {
            FailureClass::Infrastructure
        }
    }
}
