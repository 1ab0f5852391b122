use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use super::{CreateOutcome, NewSecret, SecretStore, StoreError, StoredSecret};

/// Process-local store. Each entry is created atomically through the map's entry API.
#[derive(Debug, Default)]
pub struct MemorySecretStore {
    entries: DashMap<String, StoredSecret>,
}

impl MemorySecretStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl SecretStore for MemorySecretStore {
    async fn get(&self, name: &str) -> Result<Option<StoredSecret>, StoreError> {
        Ok(self.entries.get(name).map(|entry| entry.value().clone()))
    }

    async fn create_if_absent(&self, secret: NewSecret) -> Result<CreateOutcome, StoreError> {
        match self.entries.entry(secret.name.clone()) {
            Entry::Occupied(_) => Ok(CreateOutcome::AlreadyExists),
            Entry::Vacant(slot) => {
                slot.insert(StoredSecret {
                    tags: secret.tags_with_description(),
                    name: secret.name,
                    value: secret.value,
                });
                Ok(CreateOutcome::Created)
            }
        }
    }

    async fn put_value(&self, name: &str, value: &str) -> Result<(), StoreError> {
        match self.entries.get_mut(name) {
            Some(mut entry) => {
                entry.value_mut().value = value.to_string();
                Ok(())
            }
            None => Err(StoreError::Missing(name.to_string())),
        }
    }
}
