//! # configs
//!
//! Layered runtime settings. Later layers win:
//!
//! 1. built-in defaults (the `Default` impls below)
//! 2. `config/default.toml`, if present
//! 3. `config/local.toml`, if present
//! 4. `SOCIAL_GRAPH__<SECTION>__<KEY>` environment variables (`.env` is
//!    loaded first)

use std::collections::BTreeMap;
use std::path::Path;

use config::{Config, Environment, File, FileFormat};
use secrecy::SecretString;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

pub const ENV_PREFIX: &str = "SOCIAL_GRAPH";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to load settings: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid settings: {0}")]
    Invalid(String),
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub server: ServerSettings,
    pub log: LogSettings,
    pub store: StoreSettings,
    pub media: MediaSettings,
    pub auth: AuthSettings,
    pub services: ServicesSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    pub request_timeout_secs: u64,
    pub body_limit_bytes: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 8080,
            request_timeout_secs: 10,
            body_limit_bytes: 64 * 1024,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    /// `EnvFilter` directive; `RUST_LOG` overrides it when set.
    pub filter: String,
    pub json: bool,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            filter: "info".into(),
            json: true,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Memory,
    Dynamo,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StoreSettings {
    pub backend: StoreBackend,
    pub region: Option<String>,
    /// Prepended to every table name, e.g. `prod_`.
    pub table_prefix: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaBackend {
    #[default]
    Memory,
    S3,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MediaSettings {
    pub backend: MediaBackend,
    pub bucket: Option<String>,
    pub region: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthBackend {
    #[default]
    Jwt,
    /// Fixed tokens from `auth.static_tokens`; local runs only.
    Static,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct AuthSettings {
    pub backend: AuthBackend,
    pub issuer: Option<String>,
    pub audience: Option<String>,
    pub hs256_secret: Option<SecretString>,
    /// Path to a PEM-encoded RS256 public key.
    pub rs256_public_key_path: Option<String>,
    /// token -> email
    pub static_tokens: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ServiceSettings {
    /// Operations that may be called without a bearer token.
    pub public_operations: Vec<String>,
}

impl ServiceSettings {
    fn public(ops: &[&str]) -> Self {
        Self {
            public_operations: ops.iter().map(|s| s.to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServicesSettings {
    pub follow: ServiceSettings,
    pub engagement: ServiceSettings,
    pub badges: ServiceSettings,
}

impl Default for ServicesSettings {
    /// Reads are public, every mutation needs a token.
    fn default() -> Self {
        Self {
            follow: ServiceSettings::public(&[
                "getFollowers",
                "getFollowing",
                "checkFollowStatus",
                "batchCheckStatus",
            ]),
            engagement: ServiceSettings::public(&["getLikeStatus", "getComments"]),
            badges: ServiceSettings::public(&["checkBadgeEligibility", "getUserBadges"]),
        }
    }
}

impl ServicesSettings {
    /// The allow-list of the named service; unknown services get none.
    pub fn public_operations(&self, service: &str) -> Vec<String> {
        match service {
            "follow" => self.follow.public_operations.clone(),
            "engagement" => self.engagement.public_operations.clone(),
            "badges" => self.badges.public_operations.clone(),
            _ => Vec::new(),
        }
    }
}

impl Settings {
    /// Loads `.env`, then the layers from `./config` and the environment.
    pub fn load() -> Result<Self, ConfigError> {
        if let Ok(path) = dotenvy::dotenv() {
            debug!(path = %path.display(), ".env loaded");
        }
        Self::load_from(Path::new("config"))
    }

    pub fn load_from(dir: &Path) -> Result<Self, ConfigError> {
        let builder = Config::builder()
            .add_source(File::from(dir.join("default")).required(false))
            .add_source(File::from(dir.join("local")).required(false))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            );
        let settings: Settings = builder.build()?.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Parses a single TOML document over the built-in defaults.
    pub fn from_toml(toml: &str) -> Result<Self, ConfigError> {
        let settings: Settings = Config::builder()
            .add_source(File::from_str(toml, FileFormat::Toml))
            .build()?
            .try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.media.backend == MediaBackend::S3 && self.media.bucket.is_none() {
            return Err(ConfigError::Invalid("media.bucket is required for the s3 backend".into()));
        }
        match self.auth.backend {
            AuthBackend::Jwt => {
                if self.auth.hs256_secret.is_none() && self.auth.rs256_public_key_path.is_none() {
                    return Err(ConfigError::Invalid(
                        "auth.jwt needs hs256_secret or rs256_public_key_path".into(),
                    ));
                }
                if self.auth.issuer.is_none() || self.auth.audience.is_none() {
                    return Err(ConfigError::Invalid("auth.jwt needs issuer and audience".into()));
                }
            }
            AuthBackend::Static if self.auth.static_tokens.is_empty() => {
                return Err(ConfigError::Invalid("auth.static needs at least one static_tokens entry".into()));
            }
            AuthBackend::Static => {}
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    const JWT: &str = r#"
        [auth]
        issuer = "https://idp.example"
        audience = "social-graph"
        hs256_secret = "hunter2"
    "#;

    #[test]
    fn defaults_keep_mutations_private() {
        let settings = Settings::from_toml(JWT).unwrap();
        assert_eq!(settings.auth.backend, AuthBackend::Jwt);
        assert_eq!(settings.server.port, 8080);
        assert_eq!(settings.store.backend, StoreBackend::Memory);
        assert!(settings.services.follow.public_operations.contains(&"getFollowers".to_string()));
        assert!(!settings.services.follow.public_operations.contains(&"addFollow".to_string()));
        assert!(!settings.services.engagement.public_operations.contains(&"deleteMeme".to_string()));
        assert_eq!(
            settings.services.public_operations("badges"),
            vec!["checkBadgeEligibility".to_string(), "getUserBadges".to_string()]
        );
        assert!(settings.services.public_operations("comments").is_empty());
    }

    #[test]
    fn file_values_override_defaults() {
        let settings = Settings::from_toml(
            r#"
            [store]
            backend = "dynamo"
            table_prefix = "prod_"

            [auth]
            backend = "jwt"
            hs256_secret = "s3cr3t"
            issuer = "https://idp.example"
            audience = "social-graph"

            [services.engagement]
            public_operations = ["getLikeStatus", "deleteMeme"]
            "#,
        )
        .unwrap();

        assert_eq!(settings.store.backend, StoreBackend::Dynamo);
        assert_eq!(settings.store.table_prefix, "prod_");
        assert_eq!(
            settings.auth.hs256_secret.as_ref().map(|s| s.expose_secret().to_string()),
            Some("s3cr3t".to_string())
        );
        assert_eq!(settings.services.engagement.public_operations.len(), 2);
        // untouched sections keep their defaults
        assert_eq!(settings.services.badges.public_operations.len(), 2);
    }

    #[test]
    fn jwt_without_key_material_is_rejected() {
        let err = Settings::from_toml("[auth]\nbackend = \"jwt\"").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn bare_settings_refuse_to_start() {
        let err = Settings::from_toml("").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));

        let no_audience = "[auth]\nissuer = \"https://idp.example\"\nhs256_secret = \"k\"";
        assert!(Settings::from_toml(no_audience).is_err());
    }

    #[test]
    fn static_tokens_must_be_opted_into() {
        assert!(Settings::from_toml("[auth]\nbackend = \"static\"").is_err());

        let settings = Settings::from_toml(
            r#"
            [auth]
            backend = "static"
            [auth.static_tokens]
            "local-token" = "dev@example.com"
            "#,
        )
        .unwrap();
        assert_eq!(settings.auth.backend, AuthBackend::Static);
        assert_eq!(settings.auth.static_tokens.len(), 1);
    }

    #[test]
    fn shipped_defaults_do_not_carry_tokens() {
        let shipped = include_str!("../../../config/default.toml");
        let err = Settings::from_toml(shipped).unwrap_err();
        assert!(err.to_string().contains("auth.jwt"));
        assert!(!shipped.contains("static_tokens"));
    }

    #[test]
    fn s3_needs_a_bucket() {
        assert!(Settings::from_toml(&format!("{JWT}\n[media]\nbackend = \"s3\"")).is_err());
        assert!(Settings::from_toml(&format!("{JWT}\n[media]\nbackend = \"s3\"\nbucket = \"media\"")).is_ok());
    }

    #[test]
    fn secrets_are_redacted_in_debug_output() {
        let settings = Settings::from_toml(JWT).unwrap();
        assert!(!format!("{settings:?}").contains("hunter2"));
    }
}
