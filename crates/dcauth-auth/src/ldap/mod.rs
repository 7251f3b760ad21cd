//! Directory authentication
//!
//! - Username normalization (`DOMAIN\user`, UPN, bare name)
//! - Directory URL resolution
//! - Bind escalation ladder with failure classification
//! - `ldap3` connector (plain LDAP, StartTLS, LDAPS)

mod classify;
mod client;
mod credential;
mod endpoint;
mod strategy;
mod types;

pub use classify::{classify, is_strong_auth_message};
pub use client::{DirectoryConnector, DirectorySession, LdapConnector};
pub use credential::{AuthRequest, CredentialNormalizer, NormalizedCredential};
pub use endpoint::resolve as resolve_endpoint;
pub use strategy::{BindStrategyEngine, LadderPolicy, LADDER};
pub use types::*;
