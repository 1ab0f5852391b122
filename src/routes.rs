use std::sync::Arc;

use axum::{
    routing::{get, post},
    Extension, Router,
};

use crate::config::AppConfig;
use crate::crypto::{KeyIdentity, PgpEngine};
use crate::error::AppError;
use crate::exchange::SecretExchange;
use crate::keys::KeyRegistry;
use crate::naming::StoreNaming;
use crate::policy::AuthorizationPolicy;
use crate::store::SecretStore;
use crate::{keys_api, secrets};

pub const WELL_KNOWN_KEY_PATH: &str = "/.well-known/pgp-key";

/// Components shared by every request, built once at startup.
#[derive(Clone)]
pub struct AppState {
    pub policy: Arc<AuthorizationPolicy>,
    pub registry: Arc<KeyRegistry>,
    pub exchange: Arc<SecretExchange>,
}

impl AppState {
    pub fn new(
        config: &AppConfig,
        store: Arc<dyn SecretStore>,
        engine: Arc<dyn PgpEngine>,
    ) -> Self {
        let policy = Arc::new(AuthorizationPolicy::from_config(config));
        let identity = KeyIdentity::for_product(
            &config.contact_name,
            &config.contact_email,
            &config.product_name,
        );
        let registry = Arc::new(KeyRegistry::new(
            Arc::clone(&store),
            Arc::clone(&engine),
            StoreNaming::from_config(config),
            identity,
        ));
        let exchange = Arc::new(SecretExchange::new(
            Arc::clone(&policy),
            Arc::clone(&registry),
            store,
            engine,
        ));
        Self {
            policy,
            registry,
            exchange,
        }
    }
}

pub fn api_routes() -> Router {
    Router::new()
        .route(
            WELL_KNOWN_KEY_PATH,
            get(keys_api::platform_public_key).fallback(only_get),
        )
        .route(
            "/partner/import",
            post(keys_api::import_partner_key).fallback(only_post),
        )
        .route(
            "/partners/import",
            post(keys_api::import_partner_key).fallback(only_post),
        )
        .route(
            "/secrets/import",
            post(secrets::import_secret).fallback(only_post),
        )
        .route(
            "/secrets/export",
            get(secrets::export_secret).fallback(only_get),
        )
}

/// The full partner-facing application with its shared state attached.
pub fn app(state: &AppState) -> Router {
    api_routes()
        .fallback(not_found)
        .layer(Extension(Arc::clone(&state.exchange)))
        .layer(Extension(Arc::clone(&state.registry)))
        .layer(Extension(Arc::clone(&state.policy)))
}

async fn only_get() -> AppError {
    AppError::MethodNotAllowed("GET")
}

async fn only_post() -> AppError {
    AppError::MethodNotAllowed("POST")
}

async fn not_found() -> AppError {
    AppError::NotFound
}
