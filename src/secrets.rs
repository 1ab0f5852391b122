use std::sync::Arc;

use axum::{
    extract::{Extension, Query},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use serde_json::json;

use crate::error::{AppError, AppResult};
use crate::exchange::{ExportedSecret, SecretExchange};
use crate::extractor::JsonFields;

#[derive(Debug, Default, Deserialize)]
pub struct ExportParams {
    pub partner_id: Option<String>,
    pub secret_name: Option<String>,
}

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|value| !value.trim().is_empty())
}

impl ExportParams {
    /// Both parameters must be present and non-empty.
    fn required(&self) -> Result<(&str, &str), AppError> {
        match (present(&self.partner_id), present(&self.secret_name)) {
            (Some(partner_id), Some(secret_name)) => Ok((partner_id, secret_name)),
            (partner_id, secret_name) => {
                let mut missing = Vec::new();
                if partner_id.is_none() {
                    missing.push("partner_id");
                }
                if secret_name.is_none() {
                    missing.push("secret_name");
                }
                Err(AppError::MissingParameters(missing))
            }
        }
    }
}

/// key: secret-import
pub async fn import_secret(
    Extension(exchange): Extension<Arc<SecretExchange>>,
    fields: JsonFields,
) -> AppResult<impl IntoResponse> {
    let [partner_id, secret_name, secret] =
        fields.require(["partner_id", "secret_name", "secret"])?;
    exchange
        .import_secret(partner_id, secret_name, secret)
        .await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(json!({ "message": "secret processed successfully" })),
    ))
}

/// key: secret-export
/// Reads `partner_id` and `secret_name` from the query string only.
pub async fn export_secret(
    Extension(exchange): Extension<Arc<SecretExchange>>,
    params: Option<Query<ExportParams>>,
) -> AppResult<Json<ExportedSecret>> {
    let params = params.map(|Query(params)| params).unwrap_or_default();
    let (partner_id, secret_name) = params.required()?;
    let exported = exchange.export_secret(partner_id, secret_name).await?;
    Ok(Json(exported))
}
