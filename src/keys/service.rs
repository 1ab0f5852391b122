use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{info, warn};

use super::models::{KeyLifetime, PartnerPublicKey, PlatformKeyPair};
use crate::config::PartnerIdentity;
use crate::crypto::{ArmoredKeyPair, KeyIdentity, PgpEngine, PgpError};
use crate::naming::{StoreNaming, PLATFORM_PRIVATE_KEY_NAME, PLATFORM_PUBLIC_KEY_NAME};
use crate::store::{
    CreateOutcome, NewSecret, SecretStore, StoreError, StoredSecret, Tags, TAG_ENV,
    TAG_PARTNER_ID, TAG_PRODUCT_NAME,
};

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("platform key generation failed: {0}")]
    KeyGeneration(#[source] PgpError),
    #[error("failed to persist platform key '{name}': {source}")]
    KeyPersistence {
        name: &'static str,
        source: StoreError,
    },
    #[error("key task aborted: {0}")]
    Task(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl RegistryError {
    /// True for every failure of the generate-and-persist path.
    pub fn is_key_generation(&self) -> bool {
        matches!(
            self,
            RegistryError::KeyGeneration(_)
                | RegistryError::KeyPersistence { .. }
                | RegistryError::Task(_)
        )
    }
}

/// key: key-registry
/// Owns the platform keypair and the per-partner public keys held in the secret store.
///
/// Generation is serialised in-process by `creation`; across processes the private half
/// is created first with `create_if_absent`, so whichever writer lands it decides the
/// keypair and everyone else derives the public half from the stored private key.
pub struct KeyRegistry {
    store: Arc<dyn SecretStore>,
    engine: Arc<dyn PgpEngine>,
    naming: StoreNaming,
    identity: KeyIdentity,
    creation: Mutex<()>,
}

impl KeyRegistry {
    pub fn new(
        store: Arc<dyn SecretStore>,
        engine: Arc<dyn PgpEngine>,
        naming: StoreNaming,
        identity: KeyIdentity,
    ) -> Self {
        Self {
            store,
            engine,
            naming,
            identity,
            creation: Mutex::new(()),
        }
    }

    pub fn naming(&self) -> &StoreNaming {
        &self.naming
    }

    /// Reads the platform public key. Never generates.
    pub async fn get_public_key(&self) -> Result<Option<String>, RegistryError> {
        let Some(public) = self.store.get(PLATFORM_PUBLIC_KEY_NAME).await? else {
            return Ok(None);
        };
        let lifetime = KeyLifetime::from_tags(&public.tags);
        if lifetime.is_expired(Utc::now()) {
            warn!(
                expires_at = ?lifetime.expires_at,
                "platform keypair is past its expiry; rotate it"
            );
        }
        Ok(Some(public.value))
    }

    /// Reads the platform private key. Never generates.
    pub async fn get_private_key(&self) -> Result<Option<String>, RegistryError> {
        Ok(self
            .store
            .get(PLATFORM_PRIVATE_KEY_NAME)
            .await?
            .map(|private| private.value))
    }

    pub async fn get_or_create_platform_keypair(&self) -> Result<PlatformKeyPair, RegistryError> {
        let _guard = self.creation.lock().await;

        let private = self.store.get(PLATFORM_PRIVATE_KEY_NAME).await?;
        let public = self.store.get(PLATFORM_PUBLIC_KEY_NAME).await?;
        match (public, private) {
            (Some(public), Some(private)) => {
                return Ok(PlatformKeyPair::from_stored(&public, &private))
            }
            (None, Some(private)) => {
                warn!("platform public key missing; deriving it from the stored private key");
                return self.restore_public_half(private).await;
            }
            (Some(_), None) => {
                warn!("platform private key missing; generating a replacement keypair")
            }
            (None, None) => info!("no platform keypair stored; generating one"),
        }

        let generated = self.generate().await?;
        let lifetime = KeyLifetime::starting_at(Utc::now());
        let tags = self.platform_tags(&lifetime);

        let outcome = self
            .store
            .create_if_absent(NewSecret {
                name: PLATFORM_PRIVATE_KEY_NAME.to_string(),
                value: generated.private_key.clone(),
                description: format!("PGP Private Key for product: {}", self.naming.product()),
                tags: tags.clone(),
            })
            .await
            .map_err(|source| RegistryError::KeyPersistence {
                name: PLATFORM_PRIVATE_KEY_NAME,
                source,
            })?;

        if outcome == CreateOutcome::AlreadyExists {
            info!("platform private key was created concurrently; adopting the stored key");
            let private = self
                .store
                .get(PLATFORM_PRIVATE_KEY_NAME)
                .await?
                .ok_or_else(|| StoreError::Missing(PLATFORM_PRIVATE_KEY_NAME.to_string()))?;
            return self.restore_public_half(private).await;
        }

        self.write_public_half(&generated.public_key, tags).await?;
        info!(
            expires_at = ?lifetime.expires_at,
            "platform keypair generated and stored"
        );

        Ok(PlatformKeyPair {
            public_key: generated.public_key,
            private_key: generated.private_key,
            created_at: lifetime.created_at,
            expires_at: lifetime.expires_at,
        })
    }

    /// Stores or replaces a partner's public key. Re-registration overwrites.
    pub async fn register_partner_public_key(
        &self,
        partner_id: &str,
        public_key: &str,
    ) -> Result<CreateOutcome, RegistryError> {
        let outcome = self
            .store
            .upsert(self.partner_key_secret(partner_id, public_key))
            .await?;
        let replaced = outcome == CreateOutcome::AlreadyExists;
        info!(partner_id, replaced, "partner public key stored");
        Ok(outcome)
    }

    pub async fn lookup_partner_public_key(
        &self,
        partner_id: &str,
    ) -> Result<Option<PartnerPublicKey>, RegistryError> {
        let name = self.naming.partner_public_key(partner_id);
        Ok(self.store.get(&name).await?.map(|stored| PartnerPublicKey {
            partner_id: partner_id.to_string(),
            public_key: stored.value,
        }))
    }

    /// Writes keys shipped with the partner configuration without replacing keys partners
    /// have since registered themselves. Returns how many were newly stored.
    pub async fn seed_partner_keys(
        &self,
        partners: &[PartnerIdentity],
    ) -> Result<usize, RegistryError> {
        let mut seeded = 0;
        for partner in partners {
            let Some(public_key) = partner.public_key.as_deref() else {
                continue;
            };
            let outcome = self
                .store
                .create_if_absent(self.partner_key_secret(&partner.id, public_key))
                .await?;
            if outcome == CreateOutcome::Created {
                info!(partner_id = %partner.id, "seeded partner public key from configuration");
                seeded += 1;
            }
        }
        Ok(seeded)
    }

    async fn generate(&self) -> Result<ArmoredKeyPair, RegistryError> {
        let engine = Arc::clone(&self.engine);
        let identity = self.identity.clone();
        tokio::task::spawn_blocking(move || engine.generate_keypair(&identity))
            .await
            .map_err(|err| RegistryError::Task(err.to_string()))?
            .map_err(RegistryError::KeyGeneration)
    }

    async fn restore_public_half(
        &self,
        private: StoredSecret,
    ) -> Result<PlatformKeyPair, RegistryError> {
        let engine = Arc::clone(&self.engine);
        let armored = private.value.clone();
        let public_key = tokio::task::spawn_blocking(move || engine.public_key_of(&armored))
            .await
            .map_err(|err| RegistryError::Task(err.to_string()))?
            .map_err(RegistryError::KeyGeneration)?;

        let lifetime = KeyLifetime::from_tags(&private.tags);
        self.write_public_half(&public_key, self.platform_tags(&lifetime))
            .await?;

        Ok(PlatformKeyPair {
            public_key,
            private_key: private.value,
            created_at: lifetime.created_at,
            expires_at: lifetime.expires_at,
        })
    }

    // A public half without its private half is stale and gets replaced.
    async fn write_public_half(&self, public_key: &str, tags: Tags) -> Result<(), RegistryError> {
        let persistence = |source| RegistryError::KeyPersistence {
            name: PLATFORM_PUBLIC_KEY_NAME,
            source,
        };
        let outcome = self
            .store
            .create_if_absent(NewSecret {
                name: PLATFORM_PUBLIC_KEY_NAME.to_string(),
                value: public_key.to_string(),
                description: format!("PGP Public Key for product: {}", self.naming.product()),
                tags,
            })
            .await
            .map_err(persistence)?;
        if outcome == CreateOutcome::AlreadyExists {
            self.store
                .put_value(PLATFORM_PUBLIC_KEY_NAME, public_key)
                .await
                .map_err(persistence)?;
        }
        Ok(())
    }

    fn platform_tags(&self, lifetime: &KeyLifetime) -> Tags {
        let mut tags = self.scope_tags();
        lifetime.write_tags(&mut tags);
        tags
    }

    fn partner_key_secret(&self, partner_id: &str, public_key: &str) -> NewSecret {
        let mut tags = self.scope_tags();
        tags.insert(TAG_PARTNER_ID.into(), partner_id.to_string());
        NewSecret {
            name: self.naming.partner_public_key(partner_id),
            value: public_key.to_string(),
            description: format!(
                "PGP Public Key from partner: {partner_id} for product: {}",
                self.naming.product()
            ),
            tags,
        }
    }

    fn scope_tags(&self) -> Tags {
        Tags::from([
            (TAG_ENV.to_string(), self.naming.env().to_string()),
            (TAG_PRODUCT_NAME.to_string(), self.naming.product().to_string()),
        ])
    }
}
