use sea_query::{ColumnDef, Index, SqliteQueryBuilder, Table};

use crate::schema::{Metadata, Songs};

/// CREATE TABLE IF NOT EXISTS metadata (key TEXT PRIMARY KEY, value TEXT NOT NULL)
pub fn create_metadata_table() -> String {
    Table::create()
        .table(Metadata::Table)
        .if_not_exists()
        .col(ColumnDef::new(Metadata::Key).string().primary_key())
        .col(ColumnDef::new(Metadata::Value).string().not_null())
        .to_string(SqliteQueryBuilder)
}

/// CREATE TABLE IF NOT EXISTS songs (
///     id INTEGER PRIMARY KEY AUTOINCREMENT,
///     title TEXT NOT NULL,
///     lyrics TEXT NOT NULL,
///     music_description TEXT NOT NULL,
///     album_art_url TEXT NOT NULL,
///     audio_data BLOB,
///     created_at_ms INTEGER NOT NULL
/// )
pub fn create_songs_table() -> String {
    Table::create()
        .table(Songs::Table)
        .if_not_exists()
        .col(
            ColumnDef::new(Songs::Id)
                .integer()
                .primary_key()
                .auto_increment(),
        )
        .col(ColumnDef::new(Songs::Title).string().not_null())
        .col(ColumnDef::new(Songs::Lyrics).string().not_null())
        .col(ColumnDef::new(Songs::MusicDescription).string().not_null())
        .col(ColumnDef::new(Songs::AlbumArtUrl).string().not_null())
        .col(ColumnDef::new(Songs::AudioData).blob())
        .col(ColumnDef::new(Songs::CreatedAtMs).big_integer().not_null())
        .to_string(SqliteQueryBuilder)
}

/// CREATE INDEX IF NOT EXISTS idx_songs_created_at ON songs(created_at_ms)
pub fn create_songs_created_at_index() -> String {
    Index::create()
        .if_not_exists()
        .name("idx_songs_created_at")
        .table(Songs::Table)
        .col(Songs::CreatedAtMs)
        .to_string(SqliteQueryBuilder)
}
