//! Fixed token → principal table for local runs and tests.

use async_trait::async_trait;
use dashmap::DashMap;
use domains::{AuthError, IdentityVerifier, Principal};
use tracing::debug;

#[derive(Default)]
pub struct StaticTokenVerifier {
    tokens: DashMap<String, Principal>,
}

impl StaticTokenVerifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `token` as a credential for `email`.
    pub fn with_user(self, token: impl Into<String>, email: impl Into<String>) -> Self {
        let email = email.into();
        self.tokens.insert(
            token.into(),
            Principal {
                subject: email.clone(),
                email: Some(email),
                username: None,
            },
        );
        self
    }
}

#[async_trait]
impl IdentityVerifier for StaticTokenVerifier {
    async fn verify(&self, token: &str) -> Result<Principal, AuthError> {
        match self.tokens.get(token) {
            Some(principal) => Ok(principal.value().clone()),
            None => {
                debug!("unknown static token");
                Err(AuthError::InvalidToken("unknown token".into()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn known_token_maps_to_its_user() {
        let verifier = StaticTokenVerifier::new().with_user("t-1", "a@x.com");
        let principal = verifier.verify("t-1").await.unwrap();
        assert!(principal.acts_as("a@x.com"));
        assert!(matches!(verifier.verify("t-2").await, Err(AuthError::InvalidToken(_))));
    }
}
