use async_trait::async_trait;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::types::Json;
use sqlx::{PgPool, Row};

use super::{CreateOutcome, NewSecret, SecretStore, StoreError, StoredSecret, Tags};

/// Postgres-backed store over the `exchange_secrets` table.
#[derive(Clone)]
pub struct PostgresSecretStore {
    pool: PgPool,
}

impl PostgresSecretStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connects and applies pending migrations.
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await?;
        sqlx::migrate!()
            .run(&pool)
            .await
            .map_err(|err| StoreError::Backend(format!("migrations failed: {err}")))?;
        Ok(Self::new(pool))
    }
}

fn map_row(row: &PgRow) -> Result<StoredSecret, StoreError> {
    let Json(tags) = row.try_get::<Json<Tags>, _>("tags")?;
    Ok(StoredSecret {
        name: row.try_get("name")?,
        value: row.try_get("value")?,
        tags,
    })
}

#[async_trait]
impl SecretStore for PostgresSecretStore {
    async fn get(&self, name: &str) -> Result<Option<StoredSecret>, StoreError> {
        let row = sqlx::query("SELECT name, value, tags FROM exchange_secrets WHERE name = $1")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(map_row).transpose()
    }

    async fn create_if_absent(&self, secret: NewSecret) -> Result<CreateOutcome, StoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO exchange_secrets (name, value, description, tags)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (name) DO NOTHING
            "#,
        )
        .bind(&secret.name)
        .bind(&secret.value)
        .bind(&secret.description)
        .bind(Json(&secret.tags))
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            Ok(CreateOutcome::AlreadyExists)
        } else {
            Ok(CreateOutcome::Created)
        }
    }

    async fn put_value(&self, name: &str, value: &str) -> Result<(), StoreError> {
        let result =
            sqlx::query("UPDATE exchange_secrets SET value = $2, updated_at = NOW() WHERE name = $1")
                .bind(name)
                .bind(value)
                .execute(&self.pool)
                .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::Missing(name.to_string()));
        }
        Ok(())
    }
}
