use std::sync::Arc;

use axum::{extract::Extension, http::StatusCode, response::IntoResponse, Json};
use serde_json::json;

use crate::error::AppResult;
use crate::exchange::SecretExchange;
use crate::extractor::JsonFields;

/// key: well-known-pgp-key
/// Serves the armored platform public key, generating the keypair on the first request.
pub async fn platform_public_key(
    Extension(exchange): Extension<Arc<SecretExchange>>,
) -> AppResult<impl IntoResponse> {
    let public_key = exchange.platform_public_key().await?;
    Ok((StatusCode::OK, public_key))
}

/// key: partner-key-import
pub async fn import_partner_key(
    Extension(exchange): Extension<Arc<SecretExchange>>,
    fields: JsonFields,
) -> AppResult<impl IntoResponse> {
    let [partner_id, public_key] = fields.require(["partner_id", "public_key"])?;
    exchange.register_partner_key(partner_id, public_key).await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(json!({ "message": "partner public key processed successfully" })),
    ))
}
