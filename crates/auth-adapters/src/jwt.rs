//! # JWT verifier
//!
//! Verifies bearer tokens issued by the identity provider: signature
//! (HS256 shared secret or RS256 public key), expiry, issuer, and
//! audience. Claims are mapped onto a [`Principal`].

use async_trait::async_trait;
use domains::{AuthError, IdentityVerifier, Principal};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use tracing::debug;

/// The subset of identity-token claims the service reads.
#[derive(Debug, Deserialize)]
struct Claims {
    sub: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default, alias = "cognito:username")]
    username: Option<String>,
}

pub struct JwtVerifier {
    key: DecodingKey,
    validation: Validation,
}

impl JwtVerifier {
    pub fn hs256(secret: &[u8], issuer: Option<&str>, audience: Option<&str>) -> Self {
        Self {
            key: DecodingKey::from_secret(secret),
            validation: validation(Algorithm::HS256, issuer, audience),
        }
    }

    pub fn rs256_pem(pem: &[u8], issuer: Option<&str>, audience: Option<&str>) -> Result<Self, AuthError> {
        let key = DecodingKey::from_rsa_pem(pem)
            .map_err(|e| AuthError::InvalidToken(format!("bad RS256 public key: {e}")))?;
        Ok(Self {
            key,
            validation: validation(Algorithm::RS256, issuer, audience),
        })
    }
}

fn validation(algorithm: Algorithm, issuer: Option<&str>, audience: Option<&str>) -> Validation {
    let mut validation = Validation::new(algorithm);
    if let Some(issuer) = issuer {
        validation.set_issuer(&[issuer]);
    }
    match audience {
        Some(audience) => validation.set_audience(&[audience]),
        None => validation.validate_aud = false,
    }
    validation
}

#[async_trait]
impl IdentityVerifier for JwtVerifier {
    async fn verify(&self, token: &str) -> Result<Principal, AuthError> {
        let data = decode::<Claims>(token, &self.key, &self.validation).map_err(|e| {
            debug!(reason = %e, "token rejected");
            AuthError::InvalidToken(e.to_string())
        })?;
        let Claims { sub, email, username } = data.claims;
        Ok(Principal {
            subject: sub,
            email,
            username,
        })
    }
}
