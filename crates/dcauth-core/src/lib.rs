//! DCAuth Core Library
//!
//! Error types and configuration shared by the DCAuth gateway crates.

pub mod config;
pub mod error;

pub use config::{
    ConfigSource, DirectorySettings, EnvConfigSource, FileConfigSource, LayeredConfig,
    MapConfigSource, MixedUsernamePolicy, TokenSettings,
};
pub use error::{Error, Result};

/// DCAuth version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default LDAP port
pub const DEFAULT_LDAP_PORT: u16 = 389;

/// Default LDAPS port
pub const DEFAULT_LDAPS_PORT: u16 = 636;

/// Default token lifetime in minutes
pub const DEFAULT_TOKEN_LIFETIME_MINUTES: i64 = 60;

/// Default per-attempt directory timeout in seconds
pub const DEFAULT_ATTEMPT_TIMEOUT_SECS: u64 = 5;
