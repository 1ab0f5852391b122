use axum::async_trait;
use axum::body::Bytes;
use axum::extract::FromRequest;
use axum::http::Request;
use serde_json::{Map, Value};

use crate::error::AppError;

/// A request body that must be a JSON object.
///
/// An empty body reads as `{}` so that it reports missing fields rather than bad JSON.
#[derive(Debug)]
pub struct JsonFields(pub Map<String, Value>);

impl JsonFields {
    pub fn parse(body: &[u8]) -> Result<Self, AppError> {
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self(Map::new()));
        }
        match serde_json::from_slice::<Value>(body) {
            Ok(Value::Object(map)) => Ok(Self(map)),
            _ => Err(AppError::InvalidJson),
        }
    }

    /// Fetches `N` string fields, reporting every absent one (sorted) at once.
    pub fn require<const N: usize>(
        &self,
        names: [&'static str; N],
    ) -> Result<[&str; N], AppError> {
        let mut missing: Vec<&'static str> = names
            .iter()
            .copied()
            .filter(|name| !self.0.contains_key(*name))
            .collect();
        if !missing.is_empty() {
            missing.sort_unstable();
            return Err(AppError::MissingFields(missing));
        }

        let mut values = [""; N];
        for (slot, name) in values.iter_mut().zip(names) {
            *slot = self
                .0
                .get(name)
                .and_then(Value::as_str)
                .ok_or(AppError::InvalidField(name))?;
        }
        Ok(values)
    }
}

#[async_trait]
impl<S, B> FromRequest<S, B> for JsonFields
where
    Bytes: FromRequest<S, B>,
    B: Send + 'static,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request<B>, state: &S) -> Result<Self, Self::Rejection> {
        let body = Bytes::from_request(req, state)
            .await
            .map_err(|_| AppError::InvalidJson)?;
        Self::parse(&body)
    }
}
