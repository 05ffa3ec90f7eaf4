use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use thiserror::Error;
use time::{Duration, OffsetDateTime};
use tracing::{debug, warn};

use super::claims::{Claims, SUBJECT};
use crate::config::JwtConfig;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenError {
    #[error("invalid token")]
    Invalid,
    #[error("token expired")]
    Expired,
    #[error("token issuer mismatch")]
    IssuerMismatch,
    #[error("invalid token configuration: {0}")]
    ConfigInvalid(String),
    #[error("failed to sign token: {0}")]
    Signing(String),
}

/// HS256 signing and verification keys bound to one issuer and lifetime.
#[derive(Clone)]
pub struct JwtKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    issuer: String,
    ttl: Duration,
}

impl JwtKeys {
    /// `ttl_ms` may be zero or negative; such keys mint tokens that are
    /// already expired.
    pub fn new(secret: &str, issuer: impl Into<String>, ttl_ms: i64) -> Result<Self, TokenError> {
        if secret.trim().is_empty() {
            return Err(TokenError::ConfigInvalid(
                "signing secret must not be blank".into(),
            ));
        }
        Ok(Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            issuer: issuer.into(),
            ttl: Duration::milliseconds(ttl_ms),
        })
    }

    pub fn from_config(cfg: &JwtConfig) -> Result<Self, TokenError> {
        Self::new(&cfg.secret, cfg.issuer.clone(), cfg.token_lifetime_ms)
    }

    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    pub fn issue(&self, email: &str) -> Result<String, TokenError> {
        let exp = OffsetDateTime::now_utc()
            .checked_add(self.ttl)
            .ok_or_else(|| TokenError::Signing("token lifetime out of range".into()))?;
        let claims = Claims {
            sub: SUBJECT.to_string(),
            iss: self.issuer.clone(),
            exp: exp.unix_timestamp(),
            email: email.to_string(),
        };
        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| TokenError::Signing(e.to_string()))?;
        debug!(exp = claims.exp, "jwt signed");
        Ok(token)
    }

    pub fn verify(&self, token: &str) -> Result<Claims, TokenError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(std::slice::from_ref(&self.issuer));
        validation.sub = Some(SUBJECT.to_string());
        // expiry is checked below with no leeway: now >= exp is expired
        validation.validate_exp = false;
        validation.required_spec_claims.clear();

        let data = decode::<Claims>(token, &self.decoding, &validation).map_err(|e| {
            let err = match e.kind() {
                ErrorKind::InvalidIssuer => TokenError::IssuerMismatch,
                ErrorKind::ExpiredSignature => TokenError::Expired,
                _ => TokenError::Invalid,
            };
            warn!(error = %e, "jwt rejected");
            err
        })?;

        if OffsetDateTime::now_utc().unix_timestamp() >= data.claims.exp {
            debug!(exp = data.claims.exp, "jwt expired");
            return Err(TokenError::Expired);
        }
        Ok(data.claims)
    }
}
