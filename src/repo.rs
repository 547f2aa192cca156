use chrono::{DateTime, TimeZone, Utc};
use log::debug;
use sqlx::sqlite::SqlitePool;
use sqlx::Row;

use crate::error::PipelineError;
use crate::queries::songs;
use crate::types::{NewSong, SavedSong, StyleDescription};

/// Row-oriented store for completed songs
///
/// Owns the persisted copy exclusively; drafts and render jobs stay transient
/// and are superseded once a row exists. Binary audio round-trips byte-exact
/// through the BLOB column.
#[derive(Clone)]
pub struct SongRepository {
    pool: SqlitePool,
}

impl SongRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Persist a song, assigning a fresh unique id
    pub async fn save(&self, song: &NewSong) -> Result<i64, PipelineError> {
        self.save_at(song, Utc::now()).await
    }

    /// Persist with an explicit creation time (for tests that need a fixed
    /// ordering reference)
    pub async fn save_at(
        &self,
        song: &NewSong,
        created_at: DateTime<Utc>,
    ) -> Result<i64, PipelineError> {
        let music_description =
            serde_json::to_string(&song.style).map_err(PipelineError::corrupt_row)?;
        let sql = songs::insert(
            &song.title,
            &song.lyrics,
            &music_description,
            &song.album_art_url,
            song.audio.as_deref(),
            created_at.timestamp_millis(),
        );
        let result = sqlx::query(&sql).execute(&self.pool).await?;
        let id = result.last_insert_rowid();
        debug!("saved song {} ('{}')", id, song.title);
        Ok(id)
    }

    /// All songs, newest first
    pub async fn list_all(&self) -> Result<Vec<SavedSong>, PipelineError> {
        let rows = sqlx::query(&songs::select_all()).fetch_all(&self.pool).await?;
        rows.iter().map(row_to_song).collect()
    }

    pub async fn get_by_id(&self, id: i64) -> Result<Option<SavedSong>, PipelineError> {
        let row = sqlx::query(&songs::select_by_id(id))
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_song).transpose()
    }

    /// Audio bytes and creation time only, for the serving path
    pub async fn get_audio_by_id(
        &self,
        id: i64,
    ) -> Result<Option<(Option<Vec<u8>>, DateTime<Utc>)>, PipelineError> {
        let row = sqlx::query(&songs::select_audio_by_id(id))
            .fetch_optional(&self.pool)
            .await?;
        row.map(|row| {
            let audio: Option<Vec<u8>> = row.get(0);
            let created_at_ms: i64 = row.get(1);
            Ok((audio, timestamp_to_datetime(created_at_ms)))
        })
        .transpose()
    }

    /// Delete a song. Deleting a nonexistent id is a no-op, not an error.
    pub async fn delete_by_id(&self, id: i64) -> Result<(), PipelineError> {
        let result = sqlx::query(&songs::delete_by_id(id))
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            debug!("delete of song {} was a no-op", id);
        }
        Ok(())
    }
}

fn row_to_song(row: &sqlx::sqlite::SqliteRow) -> Result<SavedSong, PipelineError> {
    let music_description: String = row.get(3);
    let style: StyleDescription =
        serde_json::from_str(&music_description).map_err(PipelineError::corrupt_row)?;
    let created_at_ms: i64 = row.get(6);

    Ok(SavedSong {
        id: row.get(0),
        title: row.get(1),
        lyrics: row.get(2),
        style,
        album_art_url: row.get(4),
        audio: row.get(5),
        created_at: timestamp_to_datetime(created_at_ms),
    })
}

fn timestamp_to_datetime(timestamp_ms: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(timestamp_ms)
        .single()
        .unwrap_or_else(Utc::now)
}
