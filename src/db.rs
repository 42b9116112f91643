//! SQLite connection pool and schema migrations.
use sqlx::migrate::{MigrateDatabase, Migrator};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use sqlx::{Sqlite, migrate};

use crate::AppResult;

/// Create the database if it doesn't already exist.
pub async fn create_database(url: &str) -> AppResult<()> {
    if !Sqlite::database_exists(url).await? {
        Sqlite::create_database(url).await?;
    }
    Ok(())
}

pub async fn connection_pool(url: &str, max_connections: u32) -> AppResult<SqlitePool> {
    // sqlx turns `foreign_keys` on for every SQLite connection, which the cascading deletes of
    // projects and events rely on.
    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect(url)
        .await?;
    Ok(pool)
}

pub fn migrations() -> Migrator {
    migrate!()
}

pub async fn run_pending_migrations(pool: &SqlitePool) -> AppResult<()> {
    migrations().run(pool).await?;
    Ok(())
}

/// Create, connect and migrate in one go.
pub async fn connect(url: &str, max_connections: u32) -> AppResult<SqlitePool> {
    create_database(url).await?;
    let pool = connection_pool(url, max_connections).await?;
    run_pending_migrations(&pool).await?;
    tracing::info!(url, "database ready");
    Ok(pool)
}

/// Throw-away in-memory database with all migrations applied.
#[cfg(any(test, feature = "test_utils"))]
pub async fn temporary() -> SqlitePool {
    // Every temporary database gets its own name so parallel tests stay isolated.
    // See https://github.com/launchbadge/sqlx/issues/2510
    let url = format!(
        "sqlite://dbmem{}?mode=memory&cache=private",
        rand::random::<u32>()
    );
    let pool = connection_pool(&url, 1)
        .await
        .expect("in-memory database");
    run_pending_migrations(&pool).await.expect("migrations succeeded");
    pool
}
