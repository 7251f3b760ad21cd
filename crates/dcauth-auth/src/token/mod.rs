//! Token issuance
//!
//! HS256-signed JWTs asserting the identity that bound successfully.

use chrono::{DateTime, Duration, TimeZone, Utc};
use dcauth_core::config::keys;
use dcauth_core::{Error, Result, TokenSettings};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;
use uuid::Uuid;

/// Shortest accepted HMAC key, in bytes
pub const MIN_SIGNING_KEY_LEN: usize = 32;

/// JWT claims
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub iat: i64,
    pub nbf: i64,
    pub exp: i64,
    pub jti: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aud: Option<String>,
    /// Bind name as sent to the directory, when it differs from `sub`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub principal: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
}

/// A freshly signed token
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub subject: String,
    pub issuer: Option<String>,
    pub audience: Option<String>,
    pub issued_at: DateTime<Utc>,
    pub not_before: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    /// Compact JWS serialization
    pub token: String,
}

pub struct TokenIssuer {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    issuer: Option<String>,
    audience: Option<String>,
    lifetime: Duration,
}

impl fmt::Debug for TokenIssuer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenIssuer")
            .field("issuer", &self.issuer)
            .field("audience", &self.audience)
            .field("lifetime", &self.lifetime)
            .finish_non_exhaustive()
    }
}

impl TokenIssuer {
    /// Fails when the signing key is missing or shorter than
    /// [`MIN_SIGNING_KEY_LEN`] bytes
    pub fn new(settings: &TokenSettings) -> Result<Self> {
        let key = settings.signing_key.as_deref().ok_or(Error::NotConfigured {
            what: "JWT signing key",
            key: keys::JWT_KEY,
        })?;

        if key.len() < MIN_SIGNING_KEY_LEN {
            return Err(Error::InvalidConfiguration(format!(
                "JWT signing key ({}) must be at least {} bytes",
                keys::JWT_KEY,
                MIN_SIGNING_KEY_LEN
            )));
        }

        let lifetime = Duration::try_minutes(settings.lifetime_minutes).ok_or_else(|| {
            Error::InvalidConfiguration(format!(
                "token lifetime ({}) out of range: {}",
                keys::JWT_EXPIRES_MINUTES,
                settings.lifetime_minutes
            ))
        })?;

        Ok(Self {
            encoding_key: EncodingKey::from_secret(key.as_bytes()),
            decoding_key: DecodingKey::from_secret(key.as_bytes()),
            issuer: settings.issuer.clone(),
            audience: settings.audience.clone(),
            lifetime,
        })
    }

    pub fn issue(&self, principal: &str) -> Result<IssuedToken> {
        self.issue_at(principal, Utc::now())
    }

    /// Issue a token for `principal` as of `now`
    ///
    /// `principal` is the bind name; a `DOMAIN\` prefix is moved out of the
    /// subject into the `domain` claim.
    pub fn issue_at(&self, principal: &str, now: DateTime<Utc>) -> Result<IssuedToken> {
        let (domain, subject) = match principal.split_once('\\') {
            Some((domain, user)) if !user.is_empty() => {
                (Some(domain.to_string()).filter(|d| !d.is_empty()), user)
            }
            _ => (None, principal),
        };

        // Second precision, as carried by the token
        let issued_at = Utc
            .timestamp_opt(now.timestamp(), 0)
            .single()
            .ok_or_else(|| Error::TokenIssuance(format!("invalid timestamp {}", now)))?;
        let expires_at = issued_at
            .checked_add_signed(self.lifetime)
            .ok_or_else(|| Error::TokenIssuance("token expiry out of range".to_string()))?;

        let claims = Claims {
            sub: subject.to_string(),
            iat: issued_at.timestamp(),
            nbf: issued_at.timestamp(),
            exp: expires_at.timestamp(),
            jti: Uuid::new_v4().to_string(),
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
            principal: (subject != principal).then(|| principal.to_string()),
            domain,
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| Error::TokenIssuance(e.to_string()))?;

        debug!(sub = %claims.sub, jti = %claims.jti, "Issued token");

        Ok(IssuedToken {
            subject: claims.sub,
            issuer: claims.iss,
            audience: claims.aud,
            issued_at,
            not_before: issued_at,
            expires_at,
            token,
        })
    }

    /// Validate signature, expiry and the configured issuer/audience
    pub fn verify(&self, token: &str) -> Result<Claims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_nbf = true;

        if let Some(issuer) = &self.issuer {
            validation.set_issuer(&[issuer]);
        }
        match &self.audience {
            Some(audience) => validation.set_audience(&[audience]),
            None => validation.validate_aud = false,
        }

        decode::<Claims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|e| Error::TokenIssuance(format!("token rejected: {}", e)))
    }
}
