#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use async_trait::async_trait;
use axum::Router;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use partner_secrets::config::AppConfig;
use partner_secrets::crypto::{ArmoredKeyPair, KeyIdentity, PgpEngine, PgpError};
use partner_secrets::store::{
    CreateOutcome, MemorySecretStore, NewSecret, SecretStore, StoreError, StoredSecret,
};
use partner_secrets::AppState;
use serde_json::Value;
use tower::ServiceExt;

const PUBLIC: &str = "FAKE-PUBLIC:";
const PRIVATE: &str = "FAKE-PRIVATE:";
const MESSAGE: &str = "FAKE-MESSAGE:";

/// Deterministic stand-in for OpenPGP. A message can only be opened with the private key
/// sharing its owner id, which is enough to model partners holding their own keys.
#[derive(Default)]
pub struct FakePgpEngine {
    generated: AtomicUsize,
}

impl FakePgpEngine {
    pub fn generated(&self) -> usize {
        self.generated.load(Ordering::SeqCst)
    }

    /// A keypair "held by" an external partner.
    pub fn partner_keypair(owner: &str) -> ArmoredKeyPair {
        ArmoredKeyPair {
            public_key: format!("{PUBLIC}{owner}"),
            private_key: format!("{PRIVATE}{owner}"),
        }
    }
}

impl PgpEngine for FakePgpEngine {
    fn generate_keypair(&self, _identity: &KeyIdentity) -> Result<ArmoredKeyPair, PgpError> {
        let n = self.generated.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(Self::partner_keypair(&format!("platform-{n}")))
    }

    fn public_key_of(&self, private_key: &str) -> Result<String, PgpError> {
        let owner = private_key.strip_prefix(PRIVATE).ok_or(PgpError::Parse {
            what: "private key",
            reason: "not a fake key".into(),
        })?;
        Ok(format!("{PUBLIC}{owner}"))
    }

    fn encrypt(&self, public_key: &str, plaintext: &str) -> Result<String, PgpError> {
        let owner = public_key.strip_prefix(PUBLIC).ok_or(PgpError::Parse {
            what: "public key",
            reason: "not a fake key".into(),
        })?;
        Ok(format!("{MESSAGE}{owner}:{}", STANDARD.encode(plaintext)))
    }

    fn decrypt(&self, private_key: &str, ciphertext: &str) -> Result<String, PgpError> {
        let owner = private_key.strip_prefix(PRIVATE).ok_or(PgpError::Parse {
            what: "private key",
            reason: "not a fake key".into(),
        })?;
        let (recipient, payload) = ciphertext
            .strip_prefix(MESSAGE)
            .and_then(|rest| rest.split_once(':'))
            .ok_or(PgpError::Parse {
                what: "message",
                reason: "not a fake message".into(),
            })?;
        if recipient != owner {
            return Err(PgpError::Decrypt("no matching key".into()));
        }
        let bytes = STANDARD
            .decode(payload)
            .map_err(|err| PgpError::Decrypt(err.to_string()))?;
        String::from_utf8(bytes).map_err(|err| PgpError::Decrypt(err.to_string()))
    }
}

/// Fails every write of a partner secret; keys are stored normally.
pub struct RejectSecretWrites(pub Arc<MemorySecretStore>);

#[async_trait]
impl SecretStore for RejectSecretWrites {
    async fn get(&self, name: &str) -> Result<Option<StoredSecret>, StoreError> {
        self.0.get(name).await
    }

    async fn create_if_absent(&self, secret: NewSecret) -> Result<CreateOutcome, StoreError> {
        if secret.name.contains("-secret-") {
            return Err(StoreError::Backend("permission denied".into()));
        }
        self.0.create_if_absent(secret).await
    }

    async fn put_value(&self, name: &str, value: &str) -> Result<(), StoreError> {
        if name.contains("-secret-") {
            return Err(StoreError::Backend("permission denied".into()));
        }
        self.0.put_value(name, value).await
    }
}

pub fn test_config() -> AppConfig {
    let env = HashMap::from([
        (
            "ACCEPTED_PARTNER_IDS",
            r#"[{"id": "acme"}, {"id": "globex"}]"#,
        ),
        ("PRODUCT_NAME", "Loyalty_Hub"),
        ("ENV", "dev"),
        ("CONTACT_NAME", "Platform Team"),
        ("CONTACT_EMAIL", "platform@example.com"),
    ]);
    AppConfig::from_lookup(|key| env.get(key).map(|value| value.to_string()))
        .expect("test configuration")
}

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub store: Arc<MemorySecretStore>,
    pub engine: Arc<FakePgpEngine>,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_store(|store| store as Arc<dyn SecretStore>)
    }

    /// Serves through the store returned by `wrap`; `store` stays the inner memory store.
    pub fn with_store(wrap: impl FnOnce(Arc<MemorySecretStore>) -> Arc<dyn SecretStore>) -> Self {
        let store = Arc::new(MemorySecretStore::new());
        let engine = Arc::new(FakePgpEngine::default());
        let state = AppState::new(&test_config(), wrap(store.clone()), engine.clone());
        Self {
            router: partner_secrets::app(&state),
            state,
            store,
            engine,
        }
    }

    pub async fn send(&self, method: &str, uri: &str, body: Option<&str>) -> (StatusCode, String) {
        let mut request = Request::builder().method(method).uri(uri);
        if body.is_some() {
            request = request.header("content-type", "application/json");
        }
        let request = request
            .body(body.map(|b| Body::from(b.to_string())).unwrap_or_else(Body::empty))
            .unwrap();
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = hyper::body::to_bytes(response.into_body()).await.unwrap();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    pub async fn send_json(&self, method: &str, uri: &str, body: &Value) -> (StatusCode, Value) {
        let (status, text) = self.send(method, uri, Some(&body.to_string())).await;
        (status, serde_json::from_str(&text).unwrap())
    }

    pub async fn get_json(&self, uri: &str) -> (StatusCode, Value) {
        let (status, text) = self.send("GET", uri, None).await;
        (status, serde_json::from_str(&text).unwrap())
    }

    /// Fetches the platform key and encrypts `plaintext` to it, as a partner would.
    pub async fn encrypt_for_platform(&self, plaintext: &str) -> String {
        let (status, public_key) = self.send("GET", "/.well-known/pgp-key", None).await;
        assert_eq!(status, StatusCode::OK);
        self.engine.encrypt(&public_key, plaintext).unwrap()
    }
}
