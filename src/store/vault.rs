use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, Response, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::warn;

use super::{CreateOutcome, NewSecret, SecretStore, StoreError, StoredSecret, Tags};

const CAS_MISMATCH: &str = "check-and-set";

/// HashiCorp Vault KV v2 backend.
///
/// Each secret lives at `{mount}/data/{name}` with its value under `data.value`; tags and
/// the description are written as the entry's `custom_metadata`.
pub struct VaultSecretStore {
    base: String,
    token: String,
    mount: String,
    client: Client,
}

#[derive(Deserialize)]
struct KvReadResponse {
    data: KvReadData,
}

#[derive(Deserialize)]
struct KvReadData {
    data: Option<KvValue>,
    #[serde(default)]
    metadata: Option<KvMetadata>,
}

#[derive(Deserialize)]
struct KvValue {
    value: Option<String>,
}

#[derive(Deserialize)]
struct KvMetadataResponse {
    data: KvMetadata,
}

#[derive(Deserialize)]
struct KvMetadata {
    #[serde(default)]
    custom_metadata: Option<Tags>,
}

impl VaultSecretStore {
    pub fn new(
        base: impl Into<String>,
        token: impl Into<String>,
        mount: impl Into<String>,
    ) -> Result<Self, StoreError> {
        Ok(Self {
            base: base.into().trim_end_matches('/').to_string(),
            token: token.into(),
            mount: mount.into().trim_matches('/').to_string(),
            client: Client::builder().timeout(Duration::from_secs(10)).build()?,
        })
    }

    async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<Response, StoreError> {
        let url = format!("{}/v1/{}/{}", self.base, self.mount, path);
        let mut req = self
            .client
            .request(method, &url)
            .header("X-Vault-Token", &self.token);
        if let Some(b) = body {
            req = req.json(&b);
        }
        Ok(req.send().await?)
    }

    async fn write_custom_metadata(&self, name: &str, tags: &Tags) -> Result<(), StoreError> {
        let response = self
            .request(
                Method::POST,
                &format!("metadata/{name}"),
                Some(json!({ "custom_metadata": tags })),
            )
            .await?;
        expect_success(response, "write metadata").await
    }

    /// Reads an entry's custom metadata; `None` when the entry does not exist.
    async fn read_custom_metadata(&self, name: &str) -> Result<Option<Tags>, StoreError> {
        let response = self
            .request(Method::GET, &format!("metadata/{name}"), None)
            .await?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => {
                let body = response.text().await?;
                let parsed: KvMetadataResponse = serde_json::from_str(&body).map_err(|err| {
                    StoreError::Backend(format!("failed to decode vault metadata response: {err}"))
                })?;
                Ok(Some(parsed.data.custom_metadata.unwrap_or_default()))
            }
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(StoreError::Backend(format!(
                    "metadata lookup failed: {status} {body}"
                )))
            }
        }
    }
}

async fn expect_success(response: Response, operation: &str) -> Result<(), StoreError> {
    let status = response.status();
    if status.is_success() {
        return Ok(());
    }
    let body = response.text().await.unwrap_or_default();
    Err(StoreError::Backend(format!(
        "{operation} failed: {status} {body}"
    )))
}

#[async_trait]
impl SecretStore for VaultSecretStore {
    async fn get(&self, name: &str) -> Result<Option<StoredSecret>, StoreError> {
        let response = self
            .request(Method::GET, &format!("data/{name}"), None)
            .await?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => {
                let body = response.text().await?;
                let parsed: KvReadResponse = serde_json::from_str(&body).map_err(|err| {
                    StoreError::Backend(format!("failed to decode vault read response: {err}"))
                })?;
                // A soft-deleted version reads back with null data.
                let Some(value) = parsed.data.data.and_then(|data| data.value) else {
                    return Ok(None);
                };
                let tags = parsed
                    .data
                    .metadata
                    .and_then(|metadata| metadata.custom_metadata)
                    .unwrap_or_default();
                Ok(Some(StoredSecret {
                    name: name.to_string(),
                    value,
                    tags,
                }))
            }
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(StoreError::Backend(format!(
                    "read secret failed: {status} {body}"
                )))
            }
        }
    }

    async fn create_if_absent(&self, secret: NewSecret) -> Result<CreateOutcome, StoreError> {
        let response = self
            .request(
                Method::POST,
                &format!("data/{}", secret.name),
                Some(json!({
                    "options": { "cas": 0 },
                    "data": { "value": secret.value },
                })),
            )
            .await?;
        let status = response.status();
        if status == StatusCode::BAD_REQUEST {
            let body = response.text().await.unwrap_or_default();
            if body.contains(CAS_MISMATCH) {
                // An earlier create may have stored the value but failed on the metadata write.
                if let Some(existing) = self.read_custom_metadata(&secret.name).await? {
                    if existing.is_empty() {
                        warn!(name = %secret.name, "existing vault entry has no metadata; restoring tags");
                        self.write_custom_metadata(&secret.name, &secret.tags_with_description())
                            .await?;
                    }
                }
                return Ok(CreateOutcome::AlreadyExists);
            }
            return Err(StoreError::Backend(format!(
                "create secret failed: {status} {body}"
            )));
        }
        expect_success(response, "create secret").await?;

        self.write_custom_metadata(&secret.name, &secret.tags_with_description())
            .await?;
        Ok(CreateOutcome::Created)
    }

    async fn put_value(&self, name: &str, value: &str) -> Result<(), StoreError> {
        if self.read_custom_metadata(name).await?.is_none() {
            return Err(StoreError::Missing(name.to_string()));
        }
        let response = self
            .request(
                Method::POST,
                &format!("data/{name}"),
                Some(json!({ "data": { "value": value } })),
            )
            .await?;
        expect_success(response, "write secret").await
    }
}
