use sea_query::{Expr, Order, Query, SqliteQueryBuilder};

use crate::schema::Songs;

/// INSERT INTO songs (title, lyrics, music_description, album_art_url, audio_data, created_at_ms)
/// VALUES (?, ?, ?, ?, ?, ?)
pub fn insert(
    title: &str,
    lyrics: &str,
    music_description: &str,
    album_art_url: &str,
    audio_data: Option<&[u8]>,
    created_at_ms: i64,
) -> String {
    Query::insert()
        .into_table(Songs::Table)
        .columns([
            Songs::Title,
            Songs::Lyrics,
            Songs::MusicDescription,
            Songs::AlbumArtUrl,
            Songs::AudioData,
            Songs::CreatedAtMs,
        ])
        .values_panic([
            title.into(),
            lyrics.into(),
            music_description.into(),
            album_art_url.into(),
            audio_data.map(|data| data.to_vec()).into(),
            created_at_ms.into(),
        ])
        .to_string(SqliteQueryBuilder)
}

/// SELECT id, title, lyrics, music_description, album_art_url, audio_data, created_at_ms
/// FROM songs ORDER BY created_at_ms DESC, id DESC
pub fn select_all() -> String {
    Query::select()
        .columns([
            Songs::Id,
            Songs::Title,
            Songs::Lyrics,
            Songs::MusicDescription,
            Songs::AlbumArtUrl,
            Songs::AudioData,
            Songs::CreatedAtMs,
        ])
        .from(Songs::Table)
        .order_by(Songs::CreatedAtMs, Order::Desc)
        .order_by(Songs::Id, Order::Desc)
        .to_string(SqliteQueryBuilder)
}

/// SELECT id, title, lyrics, music_description, album_art_url, audio_data, created_at_ms
/// FROM songs WHERE id = ?
pub fn select_by_id(id: i64) -> String {
    Query::select()
        .columns([
            Songs::Id,
            Songs::Title,
            Songs::Lyrics,
            Songs::MusicDescription,
            Songs::AlbumArtUrl,
            Songs::AudioData,
            Songs::CreatedAtMs,
        ])
        .from(Songs::Table)
        .and_where(Expr::col(Songs::Id).eq(id))
        .to_string(SqliteQueryBuilder)
}

/// SELECT audio_data, created_at_ms FROM songs WHERE id = ?
pub fn select_audio_by_id(id: i64) -> String {
    Query::select()
        .columns([Songs::AudioData, Songs::CreatedAtMs])
        .from(Songs::Table)
        .and_where(Expr::col(Songs::Id).eq(id))
        .to_string(SqliteQueryBuilder)
}

/// DELETE FROM songs WHERE id = ?
pub fn delete_by_id(id: i64) -> String {
    Query::delete()
        .from_table(Songs::Table)
        .and_where(Expr::col(Songs::Id).eq(id))
        .to_string(SqliteQueryBuilder)
}
