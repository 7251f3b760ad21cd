//! Authentication gateway
//!
//! Composes normalization, endpoint resolution, the bind ladder and token
//! issuance for one `/checkAuth` call. Configuration is read on every call,
//! so nothing is shared between requests beyond the connector.

use dcauth_auth::ldap::{
    resolve_endpoint, AuthOutcome, AuthRequest, BindStrategyEngine, CredentialNormalizer,
    DirectoryConnector, LadderPolicy,
};
use dcauth_auth::TokenIssuer;
use dcauth_core::{ConfigSource, DirectorySettings, Error, Result, TokenSettings};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::metrics;

/// Body of a `/checkAuth` response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckAuthResponse {
    pub authenticated: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

impl CheckAuthResponse {
    pub fn authenticated(token: Option<String>) -> Self {
        Self {
            authenticated: true,
            token,
        }
    }

    pub fn rejected() -> Self {
        Self {
            authenticated: false,
            token: None,
        }
    }
}

#[derive(Clone)]
pub struct AuthGateway {
    config: Arc<dyn ConfigSource>,
    connector: Arc<dyn DirectoryConnector>,
}

impl AuthGateway {
    pub fn new(config: Arc<dyn ConfigSource>, connector: Arc<dyn DirectoryConnector>) -> Self {
        Self { config, connector }
    }

    /// Authenticate one request
    ///
    /// Wrong credentials are `Ok` with `authenticated: false`. Configuration
    /// and directory failures are errors so they are never mistaken for a
    /// rejection.
    pub async fn handle(&self, request: AuthRequest) -> Result<CheckAuthResponse> {
        let directory = DirectorySettings::from_source(self.config.as_ref())?;
        let tokens = TokenSettings::from_source(self.config.as_ref())?;

        // Checked before binding so a misconfigured key never costs a bind.
        let issuer = if tokens.enabled {
            Some(TokenIssuer::new(&tokens)?)
        } else {
            None
        };

        if request.password.is_empty() && !directory.allow_empty_password {
            debug!(username = %request.username, "Empty password refused");
            return Ok(CheckAuthResponse::rejected());
        }

        let credential = CredentialNormalizer::new(directory.mixed_username_policy)
            .normalize(&request, directory.default_domain.as_deref())?;
        let endpoint = resolve_endpoint(directory.url.as_deref())?;

        debug!(
            bind_name = %credential.bind_name(),
            endpoint = %endpoint,
            "Authenticating"
        );

        let engine = BindStrategyEngine::new(self.connector.clone(), LadderPolicy::from(&directory));
        let started = Instant::now();
        let report = engine.authenticate(&endpoint, &credential).await;
        metrics::record_authentication(&report, started.elapsed());

        match report.outcome {
            AuthOutcome::Authenticated(principal) => {
                let token = match &issuer {
                    Some(issuer) => Some(issuer.issue(&principal)?.token),
                    None => None,
                };
                info!(
                    principal = %principal,
                    attempts = report.attempts.len(),
                    "Authentication succeeded"
                );
                Ok(CheckAuthResponse::authenticated(token))
            }
            AuthOutcome::Rejected => {
                info!(
                    bind_name = %credential.bind_name(),
                    attempts = report.attempts.len(),
                    "Authentication rejected"
                );
                Ok(CheckAuthResponse::rejected())
            }
            AuthOutcome::Failed(reason) => {
                warn!(endpoint = %endpoint, "Authentication failed: {}", reason);
                Err(Error::DirectoryUnavailable(reason))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dcauth_auth::testing::{FakeResponse, ScriptedConnector};
    use dcauth_auth::Claims;
    use dcauth_core::MapConfigSource;

    const KEY: &str = "0123456789abcdef0123456789abcdef";

    fn config() -> MapConfigSource {
        MapConfigSource::new()
            .with("DomainController:Url", "ldap://dc1.example.com")
            .with("Jwt:Key", KEY)
    }

    fn gateway(config: MapConfigSource, connector: &Arc<ScriptedConnector>) -> AuthGateway {
        AuthGateway::new(Arc::new(config), connector.clone())
    }

    fn request(username: &str, password: &str, domain: Option<&str>) -> AuthRequest {
        AuthRequest::new(username, password, domain.map(str::to_string)).unwrap()
    }

    fn verify(config: MapConfigSource, token: &str) -> Claims {
        let settings = TokenSettings::from_source(&config).unwrap();
        TokenIssuer::new(&settings).unwrap().verify(token).unwrap()
    }

    #[tokio::test]
    async fn test_upn_success_issues_token() {
        let connector = Arc::new(ScriptedConnector::accepting("correct"));
        let response = gateway(config(), &connector)
            .handle(request("alice@example.com", "correct", None))
            .await
            .unwrap();

        assert!(response.authenticated);
        let claims = verify(config(), response.token.as_deref().unwrap());
        assert_eq!(claims.sub, "alice@example.com");
        assert_eq!(connector.bind_names(), vec!["alice@example.com".to_string()]);
    }

    #[tokio::test]
    async fn test_wrong_password_is_rejection() {
        let connector = Arc::new(ScriptedConnector::accepting("correct"));
        let response = gateway(config(), &connector)
            .handle(request("bob", "wrong", Some("CORP")))
            .await
            .unwrap();

        assert_eq!(response, CheckAuthResponse::rejected());
        assert_eq!(connector.bind_names(), vec!["CORP\\bob".to_string()]);
        assert_eq!(connector.connection_attempts(), 1);
    }

    #[tokio::test]
    async fn test_default_domain_applies_to_bare_names() {
        let connector = Arc::new(ScriptedConnector::accepting("pw"));
        let response = gateway(config().with("DomainController:Domain", "CORP"), &connector)
            .handle(request("carol", "pw", None))
            .await
            .unwrap();

        assert!(response.authenticated);
        assert_eq!(connector.bind_names(), vec!["CORP\\carol".to_string()]);

        let claims = verify(config(), response.token.as_deref().unwrap());
        assert_eq!(claims.sub, "carol");
        assert_eq!(claims.domain.as_deref(), Some("CORP"));
    }

    #[tokio::test]
    async fn test_escalation_success() {
        let connector = Arc::new(ScriptedConnector::new(vec![
            FakeResponse::strong_auth_required(),
            FakeResponse::Accept,
        ]));
        let response = gateway(config(), &connector)
            .handle(request("CORP\\alice", "pw", None))
            .await
            .unwrap();

        assert!(response.authenticated);
        assert_eq!(connector.connection_attempts(), 2);
        assert_eq!(connector.open_sessions(), 0);
    }

    #[tokio::test]
    async fn test_missing_url_is_server_error() {
        let connector = Arc::new(ScriptedConnector::accepting("pw"));
        let config = MapConfigSource::new().with("Jwt:Key", KEY);

        let err = gateway(config, &connector)
            .handle(request("alice", "pw", None))
            .await
            .unwrap_err();

        assert_eq!(err.http_status(), 500);
        assert!(err.to_string().contains("DomainController:Url"));
        assert_eq!(connector.connection_attempts(), 0);
    }

    #[tokio::test]
    async fn test_missing_key_checked_before_bind() {
        let connector = Arc::new(ScriptedConnector::accepting("pw"));
        let config = MapConfigSource::new().with("DomainController:Url", "ldap://dc1");

        let err = gateway(config, &connector)
            .handle(request("alice", "pw", None))
            .await
            .unwrap_err();

        assert!(err.to_string().contains("Jwt:Key"));
        assert_eq!(connector.connection_attempts(), 0);
    }

    #[tokio::test]
    async fn test_issuance_disabled() {
        let connector = Arc::new(ScriptedConnector::accepting("pw"));
        let config = MapConfigSource::new()
            .with("DomainController:Url", "ldap://dc1")
            .with("Jwt:Enabled", "false");

        let response = gateway(config, &connector)
            .handle(request("alice", "pw", None))
            .await
            .unwrap();

        assert_eq!(response, CheckAuthResponse::authenticated(None));
    }

    #[tokio::test]
    async fn test_directory_down_is_not_rejection() {
        let connector = Arc::new(ScriptedConnector::new(vec![FakeResponse::ConnectError(
            dcauth_auth::ldap::DirectoryError::Connect("Connection refused".into()),
        )]));

        let err = gateway(config(), &connector)
            .handle(request("alice", "pw", None))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::DirectoryUnavailable(_)));
    }

    #[tokio::test]
    async fn test_empty_password_policy() {
        let connector = Arc::new(ScriptedConnector::new(vec![FakeResponse::Accept]));
        let response = gateway(
            config().with("DomainController:AllowEmptyPassword", "false"),
            &connector,
        )
        .handle(request("alice", "", None))
        .await
        .unwrap();

        assert_eq!(response, CheckAuthResponse::rejected());
        assert_eq!(connector.connection_attempts(), 0);

        // Allowed by default; the directory decides
        let connector = Arc::new(ScriptedConnector::new(vec![FakeResponse::invalid_credentials()]));
        let response = gateway(config(), &connector)
            .handle(request("alice", "", None))
            .await
            .unwrap();

        assert!(!response.authenticated);
        assert_eq!(connector.connection_attempts(), 1);
    }

    #[tokio::test]
    async fn test_invalid_username_is_client_error() {
        let connector = Arc::new(ScriptedConnector::accepting("pw"));
        let err = gateway(config(), &connector)
            .handle(request("CORP\\", "pw", None))
            .await
            .unwrap_err();

        assert_eq!(err.http_status(), 400);
        assert_eq!(err.code(), "invalid_username");
    }
}
