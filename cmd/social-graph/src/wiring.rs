//! Picks adapter implementations from settings. A backend named in the
//! settings but not compiled in is a startup error.

use std::sync::Arc;

use anyhow::bail;
use auth_adapters::StaticTokenVerifier;
use configs::{AuthBackend, AuthSettings, MediaBackend, MediaSettings, StoreBackend, StoreSettings};
use domains::{DocumentStore, IdentityVerifier, ObjectStore};
use storage_adapters::{InMemoryDocumentStore, InMemoryObjectStore};
use tracing::{info, warn};

pub async fn document_store(settings: &StoreSettings) -> anyhow::Result<Arc<dyn DocumentStore>> {
    match settings.backend {
        StoreBackend::Memory => {
            warn!("using the in-memory document store; data is lost on exit");
            Ok(Arc::new(InMemoryDocumentStore::new()))
        }
        #[cfg(feature = "db-dynamo")]
        StoreBackend::Dynamo => {
            use storage_adapters::dynamo::DynamoDocumentStore;
            info!(prefix = %settings.table_prefix, "using DynamoDB");
            let store = DynamoDocumentStore::connect(settings.region.clone(), settings.table_prefix.clone()).await;
            Ok(Arc::new(store))
        }
        #[cfg(not(feature = "db-dynamo"))]
        StoreBackend::Dynamo => bail!("store.backend = \"dynamo\" needs the db-dynamo feature"),
    }
}

pub async fn object_store(settings: &MediaSettings) -> anyhow::Result<Arc<dyn ObjectStore>> {
    match settings.backend {
        MediaBackend::Memory => Ok(Arc::new(InMemoryObjectStore::new())),
        #[cfg(feature = "media-s3")]
        MediaBackend::S3 => {
            use storage_adapters::s3::S3ObjectStore;
            let Some(bucket) = settings.bucket.clone() else {
                bail!("media.bucket is required for the s3 backend");
            };
            info!(%bucket, "using S3 for media");
            Ok(Arc::new(S3ObjectStore::connect(settings.region.clone(), bucket).await))
        }
        #[cfg(not(feature = "media-s3"))]
        MediaBackend::S3 => bail!("media.backend = \"s3\" needs the media-s3 feature"),
    }
}

pub fn identity_verifier(settings: &AuthSettings) -> anyhow::Result<Arc<dyn IdentityVerifier>> {
    match settings.backend {
        AuthBackend::Static => {
            warn!(tokens = settings.static_tokens.len(), "using static bearer tokens");
            let verifier = settings
                .static_tokens
                .iter()
                .fold(StaticTokenVerifier::new(), |v, (token, email)| v.with_user(token.clone(), email.clone()));
            Ok(Arc::new(verifier))
        }
        #[cfg(feature = "auth-jwt")]
        AuthBackend::Jwt => jwt_verifier(settings),
        #[cfg(not(feature = "auth-jwt"))]
        AuthBackend::Jwt => bail!("auth.backend = \"jwt\" needs the auth-jwt feature"),
    }
}

#[cfg(feature = "auth-jwt")]
fn jwt_verifier(settings: &AuthSettings) -> anyhow::Result<Arc<dyn IdentityVerifier>> {
    use anyhow::Context;
    use auth_adapters::JwtVerifier;
    use secrecy::ExposeSecret;

    let issuer = settings.issuer.as_deref();
    let audience = settings.audience.as_deref();
    let verifier = match (&settings.rs256_public_key_path, &settings.hs256_secret) {
        (Some(path), _) => {
            let pem = std::fs::read(path).with_context(|| format!("reading {path}"))?;
            JwtVerifier::rs256_pem(&pem, issuer, audience)?
        }
        (None, Some(secret)) => JwtVerifier::hs256(secret.expose_secret().as_bytes(), issuer, audience),
        (None, None) => bail!("auth.jwt needs hs256_secret or rs256_public_key_path"),
    };
    info!(issuer, audience, "verifying JWT bearer tokens");
    Ok(Arc::new(verifier))
}
