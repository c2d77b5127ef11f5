use sqlx::SqlitePool;

const SCHEMA: &str = include_str!("../migrations/schema.sql");

/// Create all tables if they don't exist and enable foreign keys.
pub async fn init_schema(pool: &SqlitePool) -> anyhow::Result<()> {
    sqlx::query("PRAGMA foreign_keys = ON").execute(pool).await?;
    sqlx::raw_sql(SCHEMA).execute(pool).await?;
    Ok(())
}

/// Single-connection in-memory pool for unit tests. One connection so
/// every test statement sees the same database.
#[cfg(test)]
pub(crate) async fn test_pool() -> SqlitePool {
    let pool = sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    init_schema(&pool).await.unwrap();
    pool
}
