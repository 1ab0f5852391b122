//! Durable secret storage used for platform keys, partner keys and imported secrets.

mod memory;
mod postgres;
mod vault;

pub use memory::MemorySecretStore;
pub use postgres::PostgresSecretStore;
pub use vault::VaultSecretStore;

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::config::StoreBackend;

pub const TAG_ENV: &str = "env";
pub const TAG_PRODUCT_NAME: &str = "product_name";
pub const TAG_PARTNER_ID: &str = "partner_id";
pub const TAG_DESCRIPTION: &str = "description";

pub type Tags = BTreeMap<String, String>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("secret '{0}' does not exist")]
    Missing(String),
    #[error("database error: {0}")]
    Db(#[from] sqlx::Error),
    #[error("vault error: {0}")]
    Vault(#[from] reqwest::Error),
    #[error("unexpected store response: {0}")]
    Backend(String),
}

/// A secret as read back from the store.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredSecret {
    pub name: String,
    pub value: String,
    pub tags: Tags,
}

/// A secret about to be created, with the metadata attached on creation.
#[derive(Clone, Debug)]
pub struct NewSecret {
    pub name: String,
    pub value: String,
    pub description: String,
    pub tags: Tags,
}

impl NewSecret {
    /// Tags as persisted, with the description folded in.
    pub fn tags_with_description(&self) -> Tags {
        let mut tags = self.tags.clone();
        tags.insert(TAG_DESCRIPTION.to_string(), self.description.clone());
        tags
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CreateOutcome {
    Created,
    AlreadyExists,
}

/// key: secret-store
/// Create/get/put capability over a named secret store.
///
/// `create_if_absent` must report an existing entry as [`CreateOutcome::AlreadyExists`]
/// rather than as an error; concurrent creators rely on it.
#[async_trait]
pub trait SecretStore: Send + Sync {
    async fn get(&self, name: &str) -> Result<Option<StoredSecret>, StoreError>;

    async fn create_if_absent(&self, secret: NewSecret) -> Result<CreateOutcome, StoreError>;

    /// Replaces the value of an existing entry; metadata is left untouched.
    async fn put_value(&self, name: &str, value: &str) -> Result<(), StoreError>;

    /// Full-overwrite upsert. Last writer wins.
    async fn upsert(&self, secret: NewSecret) -> Result<CreateOutcome, StoreError> {
        let name = secret.name.clone();
        let value = secret.value.clone();
        match self.create_if_absent(secret).await? {
            CreateOutcome::Created => Ok(CreateOutcome::Created),
            CreateOutcome::AlreadyExists => {
                self.put_value(&name, &value).await?;
                Ok(CreateOutcome::AlreadyExists)
            }
        }
    }
}

/// Connects the backend selected by `SECRETS_BACKEND`.
pub async fn connect(backend: &StoreBackend) -> anyhow::Result<Arc<dyn SecretStore>> {
    let store: Arc<dyn SecretStore> = match backend {
        StoreBackend::Memory => {
            tracing::warn!("using in-memory secret store; secrets are lost on restart");
            Arc::new(MemorySecretStore::new())
        }
        StoreBackend::Vault { addr, token, mount } => {
            Arc::new(VaultSecretStore::new(addr.clone(), token.clone(), mount.clone())?)
        }
        StoreBackend::Postgres {
            url,
            max_connections,
        } => Arc::new(PostgresSecretStore::connect(url, *max_connections).await?),
    };
    tracing::info!(backend = backend.as_str(), "secret store ready");
    Ok(store)
}
