// src/database.rs
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use crate::store::StoreError;

pub async fn create_pool(database_url: &str, max_connections: u32) -> Result<PgPool, StoreError> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;
    tracing::info!("Database migrations applied");

    Ok(pool)
}
