use serde::Deserialize;
use thiserror::Error;

/// Smallest RSA modulus accepted for the platform keypair.
pub const MIN_KEY_BITS: u32 = 2048;
const DEFAULT_KEY_BITS: u32 = 4096;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("environment variable '{0}' is not set")]
    Missing(&'static str),
    #[error("environment variable '{var}' is invalid: {reason}")]
    Invalid { var: &'static str, reason: String },
}

/// One entry of the `ACCEPTED_PARTNER_IDS` allow-list.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct PartnerIdentity {
    pub id: String,
    #[serde(default)]
    pub public_key: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Pretty,
    Compact,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StoreBackend {
    Memory,
    Vault {
        addr: String,
        token: String,
        mount: String,
    },
    Postgres {
        url: String,
        max_connections: u32,
    },
}

impl StoreBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            StoreBackend::Memory => "memory",
            StoreBackend::Vault { .. } => "vault",
            StoreBackend::Postgres { .. } => "postgres",
        }
    }
}

/// key: exchange-config
/// Process configuration, loaded once at startup and handed to every component.
#[derive(Clone, Debug)]
pub struct AppConfig {
    pub partners: Vec<PartnerIdentity>,
    pub product_name: String,
    pub env: String,
    pub contact_name: String,
    pub contact_email: String,
    pub name_prefix: Option<String>,
    pub key_bits: u32,
    pub bind_address: String,
    pub bind_port: u16,
    pub store: StoreBackend,
    pub log_format: LogFormat,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };
        let require = |key: &'static str| read(key).ok_or(ConfigError::Missing(key));

        let partners = parse_partners(&require("ACCEPTED_PARTNER_IDS")?)?;
        let product_name = normalize_product_name(&require("PRODUCT_NAME")?);
        if product_name.is_empty() {
            return Err(ConfigError::Invalid {
                var: "PRODUCT_NAME",
                reason: "empty after normalisation".into(),
            });
        }
        let env = require("ENV")?;
        let contact_email = require("CONTACT_EMAIL")?;
        let contact_name = require("CONTACT_NAME")?;

        let key_bits = match read("PGP_KEY_BITS") {
            Some(raw) => raw
                .parse::<u32>()
                .ok()
                .filter(|bits| *bits >= MIN_KEY_BITS)
                .ok_or_else(|| ConfigError::Invalid {
                    var: "PGP_KEY_BITS",
                    reason: format!("expected an integer >= {MIN_KEY_BITS}, got '{raw}'"),
                })?,
            None => DEFAULT_KEY_BITS,
        };

        let bind_port = match read("BIND_PORT") {
            Some(raw) => raw.parse::<u16>().map_err(|err| ConfigError::Invalid {
                var: "BIND_PORT",
                reason: err.to_string(),
            })?,
            None => 3000,
        };

        let store = match read("SECRETS_BACKEND").as_deref().unwrap_or("memory") {
            "memory" => StoreBackend::Memory,
            "vault" => StoreBackend::Vault {
                addr: require("VAULT_ADDR")?,
                token: require("VAULT_TOKEN")?,
                mount: read("VAULT_KV_MOUNT").unwrap_or_else(|| "secret".to_string()),
            },
            "postgres" => StoreBackend::Postgres {
                url: require("DATABASE_URL")?,
                max_connections: read("DATABASE_MAX_CONNECTIONS")
                    .and_then(|value| value.parse::<u32>().ok())
                    .filter(|value| *value > 0)
                    .unwrap_or(5),
            },
            other => {
                return Err(ConfigError::Invalid {
                    var: "SECRETS_BACKEND",
                    reason: format!("unsupported backend '{other}'"),
                })
            }
        };

        let log_format = match read("LOG_FORMAT")
            .map(|value| value.to_ascii_lowercase())
            .as_deref()
        {
            None | Some("json") => LogFormat::Json,
            Some("pretty") => LogFormat::Pretty,
            Some("compact") => LogFormat::Compact,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    var: "LOG_FORMAT",
                    reason: format!("expected json, pretty or compact, got '{other}'"),
                })
            }
        };

        Ok(Self {
            partners,
            product_name,
            env,
            contact_name,
            contact_email,
            name_prefix: read("SECRET_NAME_PREFIX"),
            key_bits,
            bind_address: read("BIND_ADDRESS").unwrap_or_else(|| "0.0.0.0".to_string()),
            bind_port,
            store,
            log_format,
        })
    }
}

/// Lower-cases the product name and drops underscores so it is safe inside store names.
pub fn normalize_product_name(raw: &str) -> String {
    raw.trim().to_lowercase().replace('_', "")
}

fn parse_partners(raw: &str) -> Result<Vec<PartnerIdentity>, ConfigError> {
    let partners: Vec<PartnerIdentity> =
        serde_json::from_str(raw).map_err(|err| ConfigError::Invalid {
            var: "ACCEPTED_PARTNER_IDS",
            reason: err.to_string(),
        })?;
    if let Some(blank) = partners.iter().find(|partner| partner.id.trim().is_empty()) {
        return Err(ConfigError::Invalid {
            var: "ACCEPTED_PARTNER_IDS",
            reason: format!("partner id must not be empty: {blank:?}"),
        });
    }
    // Store names join id and secret name with "-secret-"; an id carrying that segment
    // would share a name space with another partner's secrets.
    if let Some(clash) = partners
        .iter()
        .find(|partner| partner.id.split('-').any(|segment| segment == "secret"))
    {
        return Err(ConfigError::Invalid {
            var: "ACCEPTED_PARTNER_IDS",
            reason: format!("partner id must not contain a 'secret' segment: {}", clash.id),
        });
    }
    Ok(partners)
}
