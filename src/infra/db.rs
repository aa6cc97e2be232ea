//! SQLite pool setup and migrations.

use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};

use super::InfraError;

pub async fn connect(url: &str, max_connections: u32) -> Result<SqlitePool, InfraError> {
    SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect(url)
        .await
        .map_err(Into::into)
}

pub async fn run_migrations(pool: &SqlitePool) -> Result<(), InfraError> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(Into::into)
}
