//! Deterministic store names for platform keys, partner keys and partner secrets.

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

use crate::config::AppConfig;

pub const PLATFORM_PUBLIC_KEY_NAME: &str = "M2_PLATFORM_PUBLIC_KEY";
pub const PLATFORM_PRIVATE_KEY_NAME: &str = "M2_PLATFORM_PRIVATE_KEY";

static SECRET_NAME_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z0-9-]+$").expect("secret name pattern"));

#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid secret name '{0}'")]
pub struct InvalidSecretName(pub String);

/// A secret name that passed sanitisation.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SecretName(String);

impl SecretName {
    /// Strips underscores, then requires `^[a-zA-Z0-9-]+$`.
    pub fn sanitize(raw: &str) -> Result<Self, InvalidSecretName> {
        let stripped = raw.replace('_', "");
        if SECRET_NAME_PATTERN.is_match(&stripped) {
            Ok(Self(stripped))
        } else {
            Err(InvalidSecretName(raw.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SecretName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// key: exchange-naming
/// Builds `{prefix-}{env}-{product}-module-secretsharing-partner-{partner}-...` names.
#[derive(Clone, Debug)]
pub struct StoreNaming {
    env: String,
    product: String,
    prefix: Option<String>,
}

impl StoreNaming {
    pub fn new(
        env: impl Into<String>,
        product: impl Into<String>,
        prefix: Option<String>,
    ) -> Self {
        Self {
            env: env.into(),
            product: product.into(),
            prefix: prefix.filter(|value| !value.is_empty()),
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(
            config.env.clone(),
            config.product_name.clone(),
            config.name_prefix.clone(),
        )
    }

    pub fn env(&self) -> &str {
        &self.env
    }

    pub fn product(&self) -> &str {
        &self.product
    }

    pub fn partner_public_key(&self, partner_id: &str) -> String {
        format!("{}-public-key", self.partner_scope(partner_id))
    }

    pub fn partner_secret(&self, partner_id: &str, secret_name: &SecretName) -> String {
        format!("{}-secret-{}", self.partner_scope(partner_id), secret_name)
    }

    fn partner_scope(&self, partner_id: &str) -> String {
        let base = format!(
            "{}-{}-module-secretsharing-partner-{}",
            self.env, self.product, partner_id
        );
        match &self.prefix {
            Some(prefix) => format!("{prefix}-{base}"),
            None => base,
        }
    }
}
