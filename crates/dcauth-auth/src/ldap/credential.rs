//! Username normalization
//!
//! Accepted forms:
//! - `DOMAIN\user` (split on the first backslash)
//! - `user@domain` (user principal name, used verbatim)
//! - `user` with a domain hint from the request or configuration
//! - bare `user`

use dcauth_core::{Error, MixedUsernamePolicy, Result};
use std::fmt;

/// Inbound credentials, validated once per call
#[derive(Clone)]
pub struct AuthRequest {
    pub username: String,
    pub password: String,
    pub domain: Option<String>,
}

impl AuthRequest {
    /// Fails with [`Error::MissingCredentials`] when the username is blank
    pub fn new(
        username: impl Into<String>,
        password: impl Into<String>,
        domain: Option<String>,
    ) -> Result<Self> {
        let username = username.into();
        if username.trim().is_empty() {
            return Err(Error::MissingCredentials);
        }

        Ok(Self {
            username,
            password: password.into(),
            domain: domain.filter(|d| !d.trim().is_empty()),
        })
    }
}

impl fmt::Debug for AuthRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthRequest")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("domain", &self.domain)
            .finish()
    }
}

/// Credential ready to be bound
#[derive(Clone, PartialEq, Eq)]
pub struct NormalizedCredential {
    pub bind_domain: Option<String>,
    pub bind_principal: String,
    pub password: String,
}

impl NormalizedCredential {
    /// Name sent to the directory: the UPN as given, `domain\user` when a
    /// domain is known, otherwise the bare name
    pub fn bind_name(&self) -> String {
        if self.is_upn() {
            return self.bind_principal.clone();
        }

        match &self.bind_domain {
            Some(domain) => format!("{}\\{}", domain, self.bind_principal),
            None => self.bind_principal.clone(),
        }
    }

    pub fn is_upn(&self) -> bool {
        self.bind_principal.contains('@') && self.bind_domain.is_none()
    }
}

impl fmt::Debug for NormalizedCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NormalizedCredential")
            .field("bind_domain", &self.bind_domain)
            .field("bind_principal", &self.bind_principal)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Splits usernames into bind domain and principal
#[derive(Debug, Clone, Copy, Default)]
pub struct CredentialNormalizer {
    policy: MixedUsernamePolicy,
}

impl CredentialNormalizer {
    pub fn new(policy: MixedUsernamePolicy) -> Self {
        Self { policy }
    }

    /// Normalize a request; the request domain wins over `default_domain`
    pub fn normalize(
        &self,
        request: &AuthRequest,
        default_domain: Option<&str>,
    ) -> Result<NormalizedCredential> {
        let hint = request
            .domain
            .as_deref()
            .or(default_domain)
            .map(str::trim)
            .filter(|d| !d.is_empty());

        let (bind_domain, bind_principal) = self.split_username(&request.username, hint)?;

        Ok(NormalizedCredential {
            bind_domain,
            bind_principal,
            password: request.password.clone(),
        })
    }

    /// Pure split of a username into `(bind_domain, bind_principal)`
    pub fn split_username(
        &self,
        username: &str,
        domain_hint: Option<&str>,
    ) -> Result<(Option<String>, String)> {
        if let Some((domain, user)) = username.split_once('\\') {
            if user.is_empty() {
                return Err(Error::InvalidUsername(
                    "missing user name after domain prefix".to_string(),
                ));
            }

            if user.contains('@') {
                match self.policy {
                    MixedUsernamePolicy::PreferUpn => return Ok((None, user.to_string())),
                    MixedUsernamePolicy::PreferDomain => {}
                    MixedUsernamePolicy::Reject => {
                        return Err(Error::InvalidUsername(
                            "username combines a domain prefix with a user principal name"
                                .to_string(),
                        ))
                    }
                }
            }

            let domain = Some(domain.to_string()).filter(|d| !d.is_empty());
            return Ok((domain, user.to_string()));
        }

        if username.contains('@') {
            return Ok((None, username.to_string()));
        }

        let domain = domain_hint.filter(|d| !d.is_empty()).map(str::to_string);
        Ok((domain, username.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn split(username: &str, hint: Option<&str>) -> (Option<String>, String) {
        CredentialNormalizer::default()
            .split_username(username, hint)
            .unwrap()
    }

    #[test]
    fn test_backslash_splits_on_first_only() {
        assert_eq!(
            split("CORP\\alice", None),
            (Some("CORP".to_string()), "alice".to_string())
        );
        assert_eq!(
            split("CORP\\ops\\alice", Some("OTHER")),
            (Some("CORP".to_string()), "ops\\alice".to_string())
        );
    }

    #[test]
    fn test_upn_ignores_domain_hint() {
        for username in ["alice@example.com", "CORP\\alice@example.com"] {
            let (domain, principal) = split(username, Some("CORP"));
            assert_eq!(domain, None, "{}", username);
            assert_eq!(principal, "alice@example.com");
        }
    }

    #[test]
    fn test_domain_hint_and_bare_name() {
        assert_eq!(
            split("bob", Some("CORP")),
            (Some("CORP".to_string()), "bob".to_string())
        );
        assert_eq!(split("bob", Some("")), (None, "bob".to_string()));
        assert_eq!(split("bob", None), (None, "bob".to_string()));
    }

    #[test]
    fn test_empty_user_part_is_invalid() {
        let result = CredentialNormalizer::default().split_username("CORP\\", None);
        assert!(matches!(result, Err(Error::InvalidUsername(_))));
    }

    #[test]
    fn test_mixed_username_policies() {
        let prefer_domain = CredentialNormalizer::new(MixedUsernamePolicy::PreferDomain);
        let (domain, principal) = prefer_domain
            .split_username("CORP\\alice@example.com", None)
            .unwrap();
        assert_eq!(domain.as_deref(), Some("CORP"));
        assert_eq!(principal, "alice@example.com");

        let reject = CredentialNormalizer::new(MixedUsernamePolicy::Reject);
        assert!(reject.split_username("CORP\\alice@example.com", None).is_err());
        assert!(reject.split_username("alice@example.com", None).is_ok());
    }

    #[test]
    fn test_bind_name_formats() {
        let normalizer = CredentialNormalizer::default();

        let request = AuthRequest::new("alice@example.com", "pw", Some("CORP".into())).unwrap();
        let credential = normalizer.normalize(&request, None).unwrap();
        assert_eq!(credential.bind_name(), "alice@example.com");

        let request = AuthRequest::new("bob", "pw", None).unwrap();
        let credential = normalizer.normalize(&request, Some("CORP")).unwrap();
        assert_eq!(credential.bind_name(), "CORP\\bob");
        assert_eq!(credential.password, "pw");

        let request = AuthRequest::new("bob", "pw", Some("SALES".into())).unwrap();
        let credential = normalizer.normalize(&request, Some("CORP")).unwrap();
        assert_eq!(credential.bind_name(), "SALES\\bob");

        let request = AuthRequest::new("bob", "pw", None).unwrap();
        let credential = normalizer.normalize(&request, None).unwrap();
        assert_eq!(credential.bind_name(), "bob");
    }

    #[test]
    fn test_request_validation_and_redaction() {
        assert!(matches!(
            AuthRequest::new("  ", "pw", None),
            Err(Error::MissingCredentials)
        ));

        let request = AuthRequest::new("alice", "hunter2", Some("  ".into())).unwrap();
        assert!(request.domain.is_none());
        assert!(!format!("{:?}", request).contains("hunter2"));
    }
}
