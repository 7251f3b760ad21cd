//! Configuration for DCAuth
//!
//! Values are addressed by `Section:Key` names (for example
//! `DomainController:Url`). The gateway only depends on [`ConfigSource`];
//! where the values come from is decided by the binary:
//!
//! - [`FileConfigSource`]: a TOML file, nested tables flattened to `Section:Key`
//! - [`EnvConfigSource`]: process environment, tried as `Section__Key` and
//!   then `SECTION_KEY`
//! - [`LayeredConfig`]: environment first (outside development), then a store
//! - [`MapConfigSource`]: in-memory values

use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::{Error, Result};

/// Well-known configuration keys
pub mod keys {
    pub const DIRECTORY_URL: &str = "DomainController:Url";
    pub const DIRECTORY_DOMAIN: &str = "DomainController:Domain";
    pub const DIRECTORY_TLS_PORT: &str = "DomainController:TlsPort";
    pub const DIRECTORY_TIMEOUT_SECONDS: &str = "DomainController:TimeoutSeconds";
    pub const DIRECTORY_DEADLINE_SECONDS: &str = "DomainController:DeadlineSeconds";
    pub const DIRECTORY_SKIP_TLS_VERIFY: &str = "DomainController:SkipTlsVerify";
    pub const DIRECTORY_ALLOW_PLAINTEXT_BIND: &str = "DomainController:AllowPlaintextBind";
    pub const DIRECTORY_ALLOW_EMPTY_PASSWORD: &str = "DomainController:AllowEmptyPassword";
    pub const DIRECTORY_MIXED_USERNAME_POLICY: &str = "DomainController:MixedUsernamePolicy";

    pub const JWT_ENABLED: &str = "Jwt:Enabled";
    pub const JWT_KEY: &str = "Jwt:Key";
    pub const JWT_ISSUER: &str = "Jwt:Issuer";
    pub const JWT_AUDIENCE: &str = "Jwt:Audience";
    pub const JWT_EXPIRES_MINUTES: &str = "Jwt:ExpiresMinutes";

    pub const SERVER_BIND_ADDRESS: &str = "Server:BindAddress";
    pub const SERVER_PORT: &str = "Server:Port";

    pub const LOGGING_LEVEL: &str = "Logging:Level";
    pub const LOGGING_FORMAT: &str = "Logging:Format";

    /// Environment variable naming the hosting environment
    pub const ENVIRONMENT_VAR: &str = "DCAUTH_ENVIRONMENT";
}

// ============================================================================
// Sources
// ============================================================================

/// Read-only access to configuration values
pub trait ConfigSource: Send + Sync {
    /// Raw value for `key`, if present
    fn get(&self, key: &str) -> Option<String>;

    /// Value for `key` with blank values treated as absent
    fn get_non_blank(&self, key: &str) -> Option<String> {
        self.get(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }
}

impl<T: ConfigSource + ?Sized> ConfigSource for Arc<T> {
    fn get(&self, key: &str) -> Option<String> {
        (**self).get(key)
    }
}

impl<T: ConfigSource + ?Sized> ConfigSource for Box<T> {
    fn get(&self, key: &str) -> Option<String> {
        (**self).get(key)
    }
}

/// In-memory configuration, keys matched case-insensitively
#[derive(Debug, Clone, Default)]
pub struct MapConfigSource {
    values: HashMap<String, String>,
}

impl MapConfigSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert
    pub fn with(mut self, key: &str, value: impl Into<String>) -> Self {
        self.set(key, value);
        self
    }

    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        self.values.insert(key.to_ascii_lowercase(), value.into());
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl ConfigSource for MapConfigSource {
    fn get(&self, key: &str) -> Option<String> {
        self.values.get(&key.to_ascii_lowercase()).cloned()
    }
}

/// TOML file flattened to `Section:Key` values
///
/// ```toml
/// [DomainController]
/// Url = "ldaps://dc1.example.com"
///
/// [Jwt]
/// Key = "..."
/// ExpiresMinutes = 30
/// ```
#[derive(Debug, Clone, Default)]
pub struct FileConfigSource {
    inner: MapConfigSource,
}

impl FileConfigSource {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::InvalidConfiguration(format!("Failed to read config {}: {}", path.display(), e))
        })?;

        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let table: toml::Table = toml::from_str(content)
            .map_err(|e| Error::InvalidConfiguration(format!("Failed to parse config: {}", e)))?;

        let mut inner = MapConfigSource::new();
        flatten_table(&mut inner, None, &table);

        Ok(Self { inner })
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

fn flatten_table(out: &mut MapConfigSource, prefix: Option<&str>, table: &toml::Table) {
    for (name, value) in table {
        let key = match prefix {
            Some(p) => format!("{}:{}", p, name),
            None => name.clone(),
        };

        match value {
            toml::Value::Table(nested) => flatten_table(out, Some(&key), nested),
            toml::Value::String(s) => out.set(&key, s.clone()),
            toml::Value::Array(_) => {
                warn!(key = %key, "Ignoring array configuration value");
            }
            other => out.set(&key, other.to_string()),
        }
    }
}

impl ConfigSource for FileConfigSource {
    fn get(&self, key: &str) -> Option<String> {
        self.inner.get(key)
    }
}

type EnvLookup = dyn Fn(&str) -> Option<String> + Send + Sync;

/// Process environment source
///
/// `DomainController:Url` is looked up as `DomainController__Url` and then
/// as `DOMAINCONTROLLER_URL`. Empty variables count as unset.
#[derive(Clone)]
pub struct EnvConfigSource {
    lookup: Arc<EnvLookup>,
}

impl EnvConfigSource {
    pub fn new() -> Self {
        Self::with_lookup(|name| std::env::var(name).ok())
    }

    /// Use a custom variable lookup instead of the process environment
    pub fn with_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String> + Send + Sync + 'static,
    {
        Self {
            lookup: Arc::new(lookup),
        }
    }

    /// Candidate variable names for a configuration key, in lookup order
    pub fn variable_names(key: &str) -> [String; 2] {
        [
            key.replace(':', "__"),
            key.replace(':', "_").to_ascii_uppercase(),
        ]
    }
}

impl Default for EnvConfigSource {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for EnvConfigSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EnvConfigSource").finish_non_exhaustive()
    }
}

impl ConfigSource for EnvConfigSource {
    fn get(&self, key: &str) -> Option<String> {
        Self::variable_names(key)
            .iter()
            .filter_map(|name| (self.lookup)(name))
            .find(|v| !v.is_empty())
    }
}

/// Environment variables over a structured store
///
/// Outside the `Development` environment the process environment wins;
/// in development only the store is consulted.
pub struct LayeredConfig {
    environment: String,
    env: EnvConfigSource,
    store: Box<dyn ConfigSource>,
}

impl LayeredConfig {
    /// Layer the process environment over `store`, reading the environment
    /// name from `DCAUTH_ENVIRONMENT` (default `Production`)
    pub fn new(store: impl ConfigSource + 'static) -> Self {
        let environment =
            std::env::var(keys::ENVIRONMENT_VAR).unwrap_or_else(|_| "Production".to_string());
        Self::with_environment(environment, EnvConfigSource::new(), store)
    }

    pub fn with_environment(
        environment: impl Into<String>,
        env: EnvConfigSource,
        store: impl ConfigSource + 'static,
    ) -> Self {
        Self {
            environment: environment.into(),
            env,
            store: Box::new(store),
        }
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    pub fn is_development(&self) -> bool {
        self.environment.eq_ignore_ascii_case("Development")
    }
}

impl ConfigSource for LayeredConfig {
    fn get(&self, key: &str) -> Option<String> {
        if !self.is_development() {
            if let Some(value) = self.env.get(key) {
                return Some(value);
            }
        }

        self.store.get(key)
    }
}

// ============================================================================
// Typed settings
// ============================================================================

/// How to read usernames carrying both a `DOMAIN\` prefix and an `@`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum MixedUsernamePolicy {
    /// `CORP\alice@corp.example` binds as the UPN `alice@corp.example`
    #[default]
    PreferUpn,
    /// `CORP\alice@corp.example` binds as `CORP\alice@corp.example`
    PreferDomain,
    /// Refuse the username as a client error
    Reject,
}

impl FromStr for MixedUsernamePolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "prefer-upn" | "upn" => Ok(Self::PreferUpn),
            "prefer-domain" | "domain" => Ok(Self::PreferDomain),
            "reject" => Ok(Self::Reject),
            other => Err(Error::InvalidConfiguration(format!(
                "Unknown mixed username policy: {}",
                other
            ))),
        }
    }
}

/// Directory connection settings
#[derive(Debug, Clone)]
pub struct DirectorySettings {
    /// Directory URL (`ldap://host[:port]`, `ldaps://host[:port]` or a bare host)
    pub url: Option<String>,
    /// Default domain for unqualified usernames
    pub default_domain: Option<String>,
    /// Port used for the implicit-TLS fallback
    pub tls_port: u16,
    /// Bound on each individual bind attempt
    pub attempt_timeout: Duration,
    /// Bound on the whole escalation ladder
    pub deadline: Duration,
    pub skip_tls_verify: bool,
    /// When false the ladder never binds over an unencrypted connection
    pub allow_plaintext_bind: bool,
    pub allow_empty_password: bool,
    pub mixed_username_policy: MixedUsernamePolicy,
}

impl Default for DirectorySettings {
    fn default() -> Self {
        Self {
            url: None,
            default_domain: None,
            tls_port: crate::DEFAULT_LDAPS_PORT,
            attempt_timeout: Duration::from_secs(crate::DEFAULT_ATTEMPT_TIMEOUT_SECS),
            deadline: Duration::from_secs(30),
            skip_tls_verify: false,
            allow_plaintext_bind: true,
            allow_empty_password: true,
            mixed_username_policy: MixedUsernamePolicy::default(),
        }
    }
}

impl DirectorySettings {
    pub fn from_source(source: &dyn ConfigSource) -> Result<Self> {
        let defaults = Self::default();

        Ok(Self {
            url: source.get_non_blank(keys::DIRECTORY_URL),
            default_domain: source.get_non_blank(keys::DIRECTORY_DOMAIN),
            tls_port: positive_or(source, keys::DIRECTORY_TLS_PORT, defaults.tls_port)?,
            attempt_timeout: Duration::from_secs(positive_or(
                source,
                keys::DIRECTORY_TIMEOUT_SECONDS,
                defaults.attempt_timeout.as_secs(),
            )?),
            deadline: Duration::from_secs(positive_or(
                source,
                keys::DIRECTORY_DEADLINE_SECONDS,
                defaults.deadline.as_secs(),
            )?),
            skip_tls_verify: bool_or(source, keys::DIRECTORY_SKIP_TLS_VERIFY, false)?,
            allow_plaintext_bind: bool_or(source, keys::DIRECTORY_ALLOW_PLAINTEXT_BIND, true)?,
            allow_empty_password: bool_or(source, keys::DIRECTORY_ALLOW_EMPTY_PASSWORD, true)?,
            mixed_username_policy: match source.get_non_blank(keys::DIRECTORY_MIXED_USERNAME_POLICY)
            {
                Some(v) => v.parse()?,
                None => MixedUsernamePolicy::default(),
            },
        })
    }
}

/// Token issuance settings
#[derive(Clone)]
pub struct TokenSettings {
    /// Deployments may switch issuance off and only report the bind result
    pub enabled: bool,
    pub signing_key: Option<String>,
    pub issuer: Option<String>,
    pub audience: Option<String>,
    pub lifetime_minutes: i64,
}

impl fmt::Debug for TokenSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenSettings")
            .field("enabled", &self.enabled)
            .field("signing_key", &self.signing_key.as_ref().map(|_| "<redacted>"))
            .field("issuer", &self.issuer)
            .field("audience", &self.audience)
            .field("lifetime_minutes", &self.lifetime_minutes)
            .finish()
    }
}

impl Default for TokenSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            signing_key: None,
            issuer: None,
            audience: None,
            lifetime_minutes: crate::DEFAULT_TOKEN_LIFETIME_MINUTES,
        }
    }
}

impl TokenSettings {
    pub fn from_source(source: &dyn ConfigSource) -> Result<Self> {
        let lifetime_minutes = match source.get_non_blank(keys::JWT_EXPIRES_MINUTES) {
            Some(raw) => match raw.parse::<i64>() {
                Ok(m) if m > 0 => m,
                _ => {
                    warn!(
                        value = %raw,
                        "Ignoring invalid {}, using {} minutes",
                        keys::JWT_EXPIRES_MINUTES,
                        crate::DEFAULT_TOKEN_LIFETIME_MINUTES
                    );
                    crate::DEFAULT_TOKEN_LIFETIME_MINUTES
                }
            },
            None => crate::DEFAULT_TOKEN_LIFETIME_MINUTES,
        };

        Ok(Self {
            enabled: bool_or(source, keys::JWT_ENABLED, true)?,
            // The key is used verbatim; only an all-blank value counts as missing.
            signing_key: source.get(keys::JWT_KEY).filter(|k| !k.trim().is_empty()),
            issuer: source.get_non_blank(keys::JWT_ISSUER),
            audience: source.get_non_blank(keys::JWT_AUDIENCE),
            lifetime_minutes,
        })
    }
}

/// HTTP listener settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

impl ServerConfig {
    pub fn from_source(source: &dyn ConfigSource) -> Result<Self> {
        let defaults = Self::default();

        Ok(Self {
            bind_address: source
                .get_non_blank(keys::SERVER_BIND_ADDRESS)
                .unwrap_or(defaults.bind_address),
            port: parse_or(source, keys::SERVER_PORT, defaults.port)?,
        })
    }

    pub fn socket_address(&self) -> String {
        format!("{}:{}", self.bind_address, self.port)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

impl LoggingConfig {
    pub fn from_source(source: &dyn ConfigSource) -> Self {
        let defaults = Self::default();

        Self {
            level: source
                .get_non_blank(keys::LOGGING_LEVEL)
                .unwrap_or(defaults.level),
            format: source
                .get_non_blank(keys::LOGGING_FORMAT)
                .unwrap_or(defaults.format),
        }
    }

    pub fn is_json(&self) -> bool {
        self.format.eq_ignore_ascii_case("json")
    }
}

fn parse_or<T>(source: &dyn ConfigSource, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    match source.get_non_blank(key) {
        Some(raw) => raw
            .parse()
            .map_err(|e| Error::InvalidConfiguration(format!("{}: {}", key, e))),
        None => Ok(default),
    }
}

/// Like [`parse_or`], but zero is rejected
fn positive_or<T>(source: &dyn ConfigSource, key: &str, default: T) -> Result<T>
where
    T: FromStr + Default + PartialEq,
    T::Err: fmt::Display,
{
    let value = parse_or(source, key, default)?;
    if value == T::default() {
        return Err(Error::InvalidConfiguration(format!(
            "{}: must be greater than zero",
            key
        )));
    }
    Ok(value)
}

fn bool_or(source: &dyn ConfigSource, key: &str, default: bool) -> Result<bool> {
    match source.get_non_blank(key) {
        Some(raw) => match raw.to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Ok(true),
            "false" | "0" | "no" | "off" => Ok(false),
            _ => Err(Error::InvalidConfiguration(format!(
                "{}: expected a boolean, got {:?}",
                key, raw
            ))),
        },
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn env_from(pairs: &[(&str, &str)]) -> EnvConfigSource {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        EnvConfigSource::with_lookup(move |name| vars.get(name).cloned())
    }

    #[test]
    fn test_env_name_mangling() {
        assert_eq!(
            EnvConfigSource::variable_names("DomainController:Url"),
            ["DomainController__Url".to_string(), "DOMAINCONTROLLER_URL".to_string()]
        );

        let env = env_from(&[("DOMAINCONTROLLER_URL", "ldap://upper")]);
        assert_eq!(env.get(keys::DIRECTORY_URL).as_deref(), Some("ldap://upper"));

        let env = env_from(&[
            ("DomainController__Url", "ldap://double"),
            ("DOMAINCONTROLLER_URL", "ldap://upper"),
        ]);
        assert_eq!(env.get(keys::DIRECTORY_URL).as_deref(), Some("ldap://double"));

        // Empty first candidate falls through to the second
        let env = env_from(&[
            ("DomainController__Url", ""),
            ("DOMAINCONTROLLER_URL", "ldap://upper"),
        ]);
        assert_eq!(env.get(keys::DIRECTORY_URL).as_deref(), Some("ldap://upper"));
    }

    #[test]
    fn test_layered_precedence() {
        let store = MapConfigSource::new()
            .with(keys::DIRECTORY_URL, "ldap://from-store")
            .with(keys::JWT_ISSUER, "store-issuer");
        let env = env_from(&[("DOMAINCONTROLLER_URL", "ldap://from-env")]);

        let production = LayeredConfig::with_environment("Production", env.clone(), store.clone());
        assert_eq!(
            production.get(keys::DIRECTORY_URL).as_deref(),
            Some("ldap://from-env")
        );
        assert_eq!(production.get(keys::JWT_ISSUER).as_deref(), Some("store-issuer"));

        let development = LayeredConfig::with_environment("Development", env, store);
        assert!(development.is_development());
        assert_eq!(
            development.get(keys::DIRECTORY_URL).as_deref(),
            Some("ldap://from-store")
        );
    }

    #[test]
    fn test_file_source_flattens_sections() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[DomainController]
Url = "ldaps://dc1.example.com"
TlsPort = 3269

[Jwt]
Key = "secret"
ExpiresMinutes = 15
"#
        )
        .unwrap();

        let source = FileConfigSource::from_file(file.path()).unwrap();
        assert_eq!(
            source.get("DomainController:Url").as_deref(),
            Some("ldaps://dc1.example.com")
        );
        assert_eq!(source.get("domaincontroller:tlsport").as_deref(), Some("3269"));
        assert_eq!(source.get(keys::JWT_EXPIRES_MINUTES).as_deref(), Some("15"));
    }

    #[test]
    fn test_file_source_rejects_invalid_toml() {
        assert!(matches!(
            FileConfigSource::from_toml_str("[DomainController\nUrl ="),
            Err(Error::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_directory_settings_defaults() {
        let settings = DirectorySettings::from_source(&MapConfigSource::new()).unwrap();

        assert!(settings.url.is_none());
        assert_eq!(settings.tls_port, 636);
        assert_eq!(settings.attempt_timeout, Duration::from_secs(5));
        assert!(settings.allow_plaintext_bind);
        assert_eq!(settings.mixed_username_policy, MixedUsernamePolicy::PreferUpn);
    }

    #[test]
    fn test_directory_settings_overrides() {
        let source = MapConfigSource::new()
            .with(keys::DIRECTORY_URL, "  ldap://dc1  ")
            .with(keys::DIRECTORY_DOMAIN, "   ")
            .with(keys::DIRECTORY_TLS_PORT, "3269")
            .with(keys::DIRECTORY_ALLOW_PLAINTEXT_BIND, "false")
            .with(keys::DIRECTORY_MIXED_USERNAME_POLICY, "reject");

        let settings = DirectorySettings::from_source(&source).unwrap();
        assert_eq!(settings.url.as_deref(), Some("ldap://dc1"));
        assert!(settings.default_domain.is_none());
        assert_eq!(settings.tls_port, 3269);
        assert!(!settings.allow_plaintext_bind);
        assert_eq!(settings.mixed_username_policy, MixedUsernamePolicy::Reject);

        let bad = MapConfigSource::new().with(keys::DIRECTORY_TLS_PORT, "not-a-port");
        assert!(matches!(
            DirectorySettings::from_source(&bad),
            Err(Error::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_directory_rejects_zero_values() {
        for key in [
            keys::DIRECTORY_TLS_PORT,
            keys::DIRECTORY_TIMEOUT_SECONDS,
            keys::DIRECTORY_DEADLINE_SECONDS,
        ] {
            let source = MapConfigSource::new().with(key, "0");
            match DirectorySettings::from_source(&source) {
                Err(Error::InvalidConfiguration(msg)) => assert!(msg.starts_with(key), "{}", msg),
                other => panic!("{} = 0 accepted: {:?}", key, other.map(|s| s.tls_port)),
            }
        }

        let source = MapConfigSource::new()
            .with(keys::DIRECTORY_TIMEOUT_SECONDS, "1")
            .with(keys::DIRECTORY_DEADLINE_SECONDS, "2");
        let settings = DirectorySettings::from_source(&source).unwrap();
        assert_eq!(settings.attempt_timeout, Duration::from_secs(1));
        assert_eq!(settings.deadline, Duration::from_secs(2));
    }

    #[test]
    fn test_token_lifetime_fallback() {
        let source = MapConfigSource::new().with(keys::JWT_EXPIRES_MINUTES, "soon");
        assert_eq!(TokenSettings::from_source(&source).unwrap().lifetime_minutes, 60);

        let source = MapConfigSource::new().with(keys::JWT_EXPIRES_MINUTES, "-5");
        assert_eq!(TokenSettings::from_source(&source).unwrap().lifetime_minutes, 60);

        let source = MapConfigSource::new().with(keys::JWT_EXPIRES_MINUTES, "15");
        assert_eq!(TokenSettings::from_source(&source).unwrap().lifetime_minutes, 15);
    }

    #[test]
    fn test_token_settings_redacts_key() {
        let source = MapConfigSource::new().with(keys::JWT_KEY, "super-secret-signing-key");
        let settings = TokenSettings::from_source(&source).unwrap();

        assert!(settings.enabled);
        assert!(!format!("{:?}", settings).contains("super-secret"));
    }
}
