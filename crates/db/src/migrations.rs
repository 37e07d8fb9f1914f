use sqlx::migrate::{MigrateError, Migrator};

use crate::DbPool;

pub static MIGRATOR: Migrator = sqlx::migrate!("../../migrations");

pub async fn run_pending(pool: &DbPool) -> Result<(), MigrateError> {
    MIGRATOR.run(pool).await
}

/// Number of embedded forward migrations.
pub fn expected_count() -> i64 {
    MIGRATOR.iter().filter(|migration| migration.migration_type.is_up_migration()).count() as i64
}

/// Migrations recorded as successfully applied; zero on a database never migrated.
pub async fn applied_count(pool: &DbPool) -> Result<i64, sqlx::Error> {
    let tracked: bool = sqlx::query_scalar(
        "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = '_sqlx_migrations')",
    )
    .fetch_one(pool)
    .await?;
    if !tracked {
        return Ok(0);
    }

    sqlx::query_scalar("SELECT COUNT(1) FROM _sqlx_migrations WHERE success = 1")
        .fetch_one(pool)
        .await
}
