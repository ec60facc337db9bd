use secrecy::{ExposeSecret, SecretString};

use crate::errors::ConfigError;

/// Environment variables read by [`Credentials::from_env`].
pub mod env_vars {
    pub const CONSUMER_KEY: &str = "FILTERHOSE_CONSUMER_KEY";
    pub const CONSUMER_SECRET: &str = "FILTERHOSE_CONSUMER_SECRET";
    pub const TOKEN: &str = "FILTERHOSE_TOKEN";
    pub const TOKEN_SECRET: &str = "FILTERHOSE_TOKEN_SECRET";
}

/// OAuth credential bundle. All four fields are required; only presence is
/// checked, never validity.
#[derive(Clone)]
pub struct Credentials {
    consumer_key: SecretString,
    consumer_secret: SecretString,
    token: SecretString,
    token_secret: SecretString,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Credentials([REDACTED])")
    }
}

impl Credentials {
    pub fn new(
        consumer_key: impl Into<String>,
        consumer_secret: impl Into<String>,
        token: impl Into<String>,
        token_secret: impl Into<String>,
    ) -> Result<Self, ConfigError> {
        Ok(Self {
            consumer_key: required("consumer_key", consumer_key.into())?,
            consumer_secret: required("consumer_secret", consumer_secret.into())?,
            token: required("token", token.into())?,
            token_secret: required("token_secret", token_secret.into())?,
        })
    }

    /// Build from a key lookup, e.g. the process environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |var: &str| lookup(var).unwrap_or_default();
        Self::new(
            get(env_vars::CONSUMER_KEY),
            get(env_vars::CONSUMER_SECRET),
            get(env_vars::TOKEN),
            get(env_vars::TOKEN_SECRET),
        )
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    pub fn consumer_key(&self) -> &str {
        self.consumer_key.expose_secret()
    }

    pub fn consumer_secret(&self) -> &str {
        self.consumer_secret.expose_secret()
    }

    pub fn token(&self) -> &str {
        self.token.expose_secret()
    }

    pub fn token_secret(&self) -> &str {
        self.token_secret.expose_secret()
    }
}

fn required(field: &'static str, value: String) -> Result<SecretString, ConfigError> {
    if value.trim().is_empty() {
        return Err(ConfigError::MissingCredential(field));
    }
    Ok(SecretString::from(value))
}
