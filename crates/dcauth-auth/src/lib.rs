//! Directory-backed authentication for DCAuth

pub mod ldap;
pub mod token;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use ldap::{
    resolve_endpoint, AuthOutcome, AuthReport, AuthRequest, BindStrategyEngine,
    CredentialNormalizer, DirectoryConnector, DirectoryEndpoint, LadderPolicy, LdapConnector,
    NormalizedCredential,
};
pub use token::{Claims, IssuedToken, TokenIssuer};
