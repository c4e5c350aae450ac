use anyhow::Result;
use sqlx::SqlitePool;

/// Create the embedded schema. Safe to run on every start: tables and
/// indexes are created only when missing and late-added columns are
/// appended to databases created by older builds.
pub async fn migrate(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS users (
            id TEXT PRIMARY KEY,
            email TEXT UNIQUE NOT NULL,
            password TEXT NOT NULL,
            role TEXT NOT NULL DEFAULT 'user',
            created_at TEXT DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS movies (
            id TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            year INTEGER,
            rating REAL,
            genre TEXT,
            director TEXT,
            description TEXT,
            image TEXT,
            tmdb_id INTEGER,
            trailer_url TEXT,
            created_at TEXT DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS favorites (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            movie_id TEXT NOT NULL REFERENCES movies(id) ON DELETE CASCADE,
            created_at TEXT DEFAULT (datetime('now')),
            UNIQUE(user_id, movie_id)
        );
        "#,
    )
    .execute(pool)
    .await?;

    add_missing_columns(pool).await?;
    create_indexes(pool).await?;

    Ok(())
}

/// Columns introduced after the first schema version
const LATE_COLUMNS: &[(&str, &str, &str)] = &[("movies", "trailer_url", "TEXT")];

async fn add_missing_columns(pool: &SqlitePool) -> Result<()> {
    for (table, column, column_type) in LATE_COLUMNS {
        if has_column(pool, table, column).await? {
            continue;
        }
        tracing::info!("Adding column {}.{}", table, column);
        sqlx::query(&format!(
            "ALTER TABLE {} ADD COLUMN {} {}",
            table, column, column_type
        ))
        .execute(pool)
        .await?;
    }
    Ok(())
}

async fn has_column(pool: &SqlitePool, table: &str, column: &str) -> Result<bool> {
    let columns: Vec<(String,)> =
        sqlx::query_as(&format!("SELECT name FROM pragma_table_info('{}')", table))
            .fetch_all(pool)
            .await?;
    Ok(columns.iter().any(|(name,)| name == column))
}

async fn create_indexes(pool: &SqlitePool) -> Result<()> {
    let indexes = [
        // Favorites of a user
        "CREATE INDEX IF NOT EXISTS idx_favorites_user_id ON favorites(user_id)",
        // Favorites pointing at a movie
        "CREATE INDEX IF NOT EXISTS idx_favorites_movie_id ON favorites(movie_id)",
        // Seeder dedup by provider id
        "CREATE INDEX IF NOT EXISTS idx_movies_tmdb_id ON movies(tmdb_id)",
    ];

    for index_sql in indexes {
        if let Err(e) = sqlx::query(index_sql).execute(pool).await {
            tracing::warn!("Failed to create index: {} - {}", index_sql, e);
        }
    }

    tracing::debug!("Database indexes created/verified");

    Ok(())
}

/// Promote the well-known admin account in case it was registered before
/// it was configured as admin
pub async fn promote_admin(pool: &SqlitePool, admin_email: &str) -> Result<u64> {
    let result = sqlx::query("UPDATE users SET role = 'admin' WHERE email = ? AND role != 'admin'")
        .bind(admin_email)
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}

#[cfg(test)]
pub async fn test_pool() -> SqlitePool {
    let pool = sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    sqlx::query("PRAGMA foreign_keys = ON")
        .execute(&pool)
        .await
        .unwrap();
    migrate(&pool).await.unwrap();
    pool
}
