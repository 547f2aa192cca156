use std::path::Path;
use std::str::FromStr;

use log::debug;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use tempfile::TempDir;

use crate::constants::{generate_library_unique_id, EXPECTED_DB_VERSION};
use crate::error::DynError;
use crate::queries::{ddl, metadata};

/// Open a file-based library database for production use
/// Enables WAL mode and foreign keys, creating the file if needed
pub async fn open_database_connection(db_path: &Path) -> Result<SqlitePool, DynError> {
    let options = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;
    debug!("SQLite library: {}", db_path.display());
    Ok(pool)
}

/// Open a read-only connection (for commands that never write)
pub async fn open_readonly_connection(db_path: &Path) -> Result<SqlitePool, DynError> {
    if !db_path.exists() {
        return Err(format!("Database file not found: {}", db_path.display()).into());
    }
    let options = SqliteConnectOptions::new()
        .filename(db_path)
        .read_only(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;
    Ok(pool)
}

/// Create all tables and indexes; safe to call repeatedly
pub async fn init_database_schema(pool: &SqlitePool) -> Result<(), DynError> {
    sqlx::query(&ddl::create_metadata_table()).execute(pool).await?;
    sqlx::query(&ddl::create_songs_table()).execute(pool).await?;
    sqlx::query(&ddl::create_songs_created_at_index())
        .execute(pool)
        .await?;

    // Stamp version and unique id exactly once
    let version_exists: Option<i64> = sqlx::query_scalar(&metadata::exists("version"))
        .fetch_optional(pool)
        .await?;
    if version_exists.is_none() {
        sqlx::query(&metadata::insert("version", EXPECTED_DB_VERSION))
            .execute(pool)
            .await?;
        sqlx::query(&metadata::insert(
            "unique_id",
            &generate_library_unique_id(),
        ))
        .execute(pool)
        .await?;
    }

    Ok(())
}

/// Verify the library was written by a compatible version of this tool
pub async fn check_database_version(pool: &SqlitePool) -> Result<(), DynError> {
    let row = sqlx::query(&metadata::select_by_key("version"))
        .fetch_optional(pool)
        .await?
        .ok_or("No version found in metadata; not a song library database")?;
    let version: String = row.get(0);

    if version != EXPECTED_DB_VERSION {
        return Err(format!(
            "Unsupported database version: '{}'. This application only supports version '{}'",
            version, EXPECTED_DB_VERSION
        )
        .into());
    }
    Ok(())
}

/// Create an in-memory database with schema for testing
pub async fn create_test_connection_in_memory() -> SqlitePool {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")
        .expect("Valid in-memory connection string")
        .foreign_keys(true);
    // A single never-recycled connection; the database lives and dies with it
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await
        .expect("Failed to create in-memory database");
    init_database_schema(&pool)
        .await
        .expect("Failed to initialize in-memory schema");
    pool
}

/// Create a file-based database in a temporary directory for testing
/// The TempDir guard must be kept alive for the pool's lifetime
pub async fn create_test_connection_in_temporary_file() -> Result<(SqlitePool, TempDir), DynError> {
    let dir = tempfile::tempdir()?;
    let pool = open_database_connection(&dir.path().join("library.sqlite")).await?;
    init_database_schema(&pool).await?;
    Ok((pool, dir))
}
