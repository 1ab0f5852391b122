//! Partner-facing workflows: key publication, partner key registration and the
//! decrypt-on-import / encrypt-on-export secret exchange.

use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tracing::{error, info, instrument, warn};

use crate::crypto::PgpEngine;
use crate::keys::{KeyRegistry, RegistryError};
use crate::naming::{InvalidSecretName, SecretName, StoreNaming};
use crate::policy::{AuthorizationPolicy, UnauthorizedPartner};
use crate::store::{
    CreateOutcome, NewSecret, SecretStore, StoreError, Tags, TAG_ENV, TAG_PARTNER_ID,
    TAG_PRODUCT_NAME,
};

#[derive(Debug, Error)]
pub enum ExchangeError {
    #[error(transparent)]
    Unauthorized(#[from] UnauthorizedPartner),
    #[error(transparent)]
    InvalidName(#[from] InvalidSecretName),
    #[error("decryption failed: {0}")]
    DecryptionFailed(String),
    #[error("failed to store secret: {0}")]
    StorageWriteFailed(#[source] StoreError),
    #[error("no public key registered for partner '{0}'")]
    PartnerKeyNotFound(String),
    #[error("secret '{0}' not found")]
    SecretNotFound(String),
    #[error("encryption failed: {0}")]
    EncryptionFailed(String),
    #[error("secret '{name}' is stored for partner '{owner}'")]
    NameOwnedByOtherPartner { name: String, owner: String },
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Confirmation of a stored secret.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImportedSecret {
    pub partner_id: String,
    pub secret_name: SecretName,
    pub replaced: bool,
}

/// key: exported-secret
#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct ExportedSecret {
    pub encrypted_secret: String,
    pub partner_id: String,
    pub secret_name: String,
}

/// key: secret-exchange
/// Every partner-scoped operation passes the allow-list before touching the store.
pub struct SecretExchange {
    policy: Arc<AuthorizationPolicy>,
    registry: Arc<KeyRegistry>,
    store: Arc<dyn SecretStore>,
    engine: Arc<dyn PgpEngine>,
    naming: StoreNaming,
}

impl SecretExchange {
    pub fn new(
        policy: Arc<AuthorizationPolicy>,
        registry: Arc<KeyRegistry>,
        store: Arc<dyn SecretStore>,
        engine: Arc<dyn PgpEngine>,
    ) -> Self {
        let naming = registry.naming().clone();
        Self {
            policy,
            registry,
            store,
            engine,
            naming,
        }
    }

    /// Returns the platform public key, generating the keypair on first use.
    #[instrument(skip(self), fields(operation = "platform_public_key"))]
    pub async fn platform_public_key(&self) -> Result<String, ExchangeError> {
        if let Some(public_key) = self.registry.get_public_key().await? {
            if self.registry.get_private_key().await?.is_some() {
                return Ok(public_key);
            }
            warn!("platform private key missing behind a published public key; repairing");
        }
        let keypair = self.registry.get_or_create_platform_keypair().await?;
        Ok(self
            .registry
            .get_public_key()
            .await?
            .unwrap_or(keypair.public_key))
    }

    #[instrument(skip(self, public_key), fields(operation = "register_partner_key"))]
    pub async fn register_partner_key(
        &self,
        partner_id: &str,
        public_key: &str,
    ) -> Result<CreateOutcome, ExchangeError> {
        self.policy.authorize(partner_id)?;
        Ok(self
            .registry
            .register_partner_public_key(partner_id, public_key)
            .await?)
    }

    #[instrument(skip(self, ciphertext), fields(operation = "import_secret"))]
    pub async fn import_secret(
        &self,
        partner_id: &str,
        secret_name: &str,
        ciphertext: &str,
    ) -> Result<ImportedSecret, ExchangeError> {
        self.policy.authorize(partner_id)?;
        let name = SecretName::sanitize(secret_name)?;
        let storage_name = self.naming.partner_secret(partner_id, &name);
        if let Some(existing) = self.store.get(&storage_name).await? {
            if let Some(owner) = existing.tags.get(TAG_PARTNER_ID) {
                if owner != partner_id {
                    warn!(partner_id, owner = %owner, secret_name = %name, "import would overwrite another partner's secret");
                    return Err(ExchangeError::NameOwnedByOtherPartner {
                        name: name.to_string(),
                        owner: owner.clone(),
                    });
                }
            }
        }

        let private_key = self.registry.get_private_key().await?.ok_or_else(|| {
            ExchangeError::DecryptionFailed("platform private key is not available".into())
        })?;
        let engine = Arc::clone(&self.engine);
        let ciphertext = ciphertext.to_string();
        let plaintext =
            tokio::task::spawn_blocking(move || engine.decrypt(&private_key, &ciphertext))
                .await
                .map_err(|err| ExchangeError::DecryptionFailed(err.to_string()))?
                .map_err(|err| {
                    error!(partner_id, secret_name = %name, %err, "failed to decrypt imported secret");
                    ExchangeError::DecryptionFailed(err.to_string())
                })?;

        let outcome = self
            .store
            .upsert(NewSecret {
                name: storage_name,
                value: plaintext,
                description: format!(
                    "Secret '{name}' from partner: {partner_id} for product: {}",
                    self.naming.product()
                ),
                tags: self.partner_tags(partner_id),
            })
            .await
            .map_err(ExchangeError::StorageWriteFailed)?;

        let replaced = outcome == CreateOutcome::AlreadyExists;
        info!(partner_id, secret_name = %name, replaced, "secret imported");
        Ok(ImportedSecret {
            partner_id: partner_id.to_string(),
            secret_name: name,
            replaced,
        })
    }

    #[instrument(skip(self), fields(operation = "export_secret"))]
    pub async fn export_secret(
        &self,
        partner_id: &str,
        secret_name: &str,
    ) -> Result<ExportedSecret, ExchangeError> {
        self.policy.authorize(partner_id)?;
        let name = SecretName::sanitize(secret_name)?;

        let partner_key = self
            .registry
            .lookup_partner_public_key(partner_id)
            .await?
            .ok_or_else(|| ExchangeError::PartnerKeyNotFound(partner_id.to_string()))?;

        let stored = self
            .store
            .get(&self.naming.partner_secret(partner_id, &name))
            .await?
            .ok_or_else(|| ExchangeError::SecretNotFound(name.to_string()))?;
        if let Some(owner) = stored.tags.get(TAG_PARTNER_ID) {
            if owner != partner_id {
                warn!(partner_id, owner = %owner, secret_name = %name, "partner mismatch on stored secret");
                return Err(ExchangeError::SecretNotFound(name.to_string()));
            }
        }

        let engine = Arc::clone(&self.engine);
        let public_key = partner_key.public_key;
        let plaintext = stored.value;
        let encrypted_secret =
            tokio::task::spawn_blocking(move || engine.encrypt(&public_key, &plaintext))
                .await
                .map_err(|err| ExchangeError::EncryptionFailed(err.to_string()))?
                .map_err(|err| {
                    error!(partner_id, secret_name = %name, %err, "failed to encrypt secret for partner");
                    ExchangeError::EncryptionFailed(err.to_string())
                })?;

        info!(partner_id, secret_name = %name, "secret exported");
        Ok(ExportedSecret {
            encrypted_secret,
            partner_id: partner_id.to_string(),
            secret_name: name.to_string(),
        })
    }

    fn partner_tags(&self, partner_id: &str) -> Tags {
        Tags::from([
            (TAG_ENV.to_string(), self.naming.env().to_string()),
            (TAG_PRODUCT_NAME.to_string(), self.naming.product().to_string()),
            (TAG_PARTNER_ID.to_string(), partner_id.to_string()),
        ])
    }
}
