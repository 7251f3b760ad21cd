//! Error types for DCAuth

use serde::Serialize;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    // Client Errors
    #[error("Missing credentials")]
    MissingCredentials,

    #[error("Invalid username: {0}")]
    InvalidUsername(String),

    // Configuration Errors
    #[error("{what} not configured ({key})")]
    NotConfigured { what: &'static str, key: &'static str },

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    // Infrastructure Errors
    #[error("Directory service unavailable: {0}")]
    DirectoryUnavailable(String),

    #[error("Token issuance failed: {0}")]
    TokenIssuance(String),

    #[error("Internal server error: {0}")]
    InternalError(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    pub fn code(&self) -> &'static str {
        match self {
            Error::MissingCredentials => "missing_credentials",
            Error::InvalidUsername(_) => "invalid_username",
            Error::NotConfigured { .. } => "not_configured",
            Error::InvalidConfiguration(_) => "invalid_configuration",
            Error::DirectoryUnavailable(_) => "directory_unavailable",
            Error::TokenIssuance(_) => "token_issuance_failed",
            Error::InternalError(_) => "internal_error",
            Error::Io(_) => "internal_error",
            Error::Other(_) => "internal_error",
        }
    }

    pub fn http_status(&self) -> u16 {
        match self {
            Error::MissingCredentials | Error::InvalidUsername(_) => 400,
            _ => 500,
        }
    }

    /// Client errors are reported as `{"error": code}`, everything else as a
    /// problem document.
    pub fn is_client_error(&self) -> bool {
        self.http_status() < 500
    }
}

/// RFC 7807 problem document used for server-side failures
#[derive(Debug, Clone, Serialize)]
pub struct ProblemDetails {
    #[serde(rename = "type")]
    pub problem_type: String,
    pub title: String,
    pub status: u16,
    pub detail: String,
}

impl From<&Error> for ProblemDetails {
    fn from(err: &Error) -> Self {
        ProblemDetails {
            problem_type: "https://tools.ietf.org/html/rfc9110#section-15.6.1".to_string(),
            title: "An error occurred while processing your request.".to_string(),
            status: err.http_status(),
            detail: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(Error::MissingCredentials.http_status(), 400);
        assert_eq!(Error::InvalidUsername("x".into()).http_status(), 400);
        assert_eq!(
            Error::NotConfigured {
                what: "Domain controller URL",
                key: "DomainController:Url"
            }
            .http_status(),
            500
        );
        assert_eq!(Error::DirectoryUnavailable("timeout".into()).http_status(), 500);
    }

    #[test]
    fn test_problem_details_carries_detail() {
        let err = Error::NotConfigured {
            what: "JWT signing key",
            key: "Jwt:Key",
        };
        let problem = ProblemDetails::from(&err);

        assert_eq!(problem.status, 500);
        assert_eq!(problem.detail, "JWT signing key not configured (Jwt:Key)");

        let json = serde_json::to_value(&problem).unwrap();
        assert!(json.get("type").is_some());
    }
}
