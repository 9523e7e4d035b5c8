use sqlx::postgres::{PgPool, PgPoolOptions};

use crate::config::Config;

pub type DbPool = PgPool;

pub async fn create_pool(config: &Config) -> anyhow::Result<DbPool> {
    let pool = PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .connect(&config.database_url)
        .await?;
    Ok(pool)
}
