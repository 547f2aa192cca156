//! # Song Repository Tests
//!
//! These tests verify the persistence contract: fresh unique ids, strict
//! newest-first listing, idempotent deletes, and byte-exact audio round-trips
//! through the BLOB column.
//!
//! ## Running the Tests
//!
//! ```bash
//! cargo test --test repository_test
//! ```

use chrono::{TimeZone, Utc};
use sqlx::Row;

use hum_to_song::db;
use hum_to_song::queries::metadata;
use hum_to_song::repo::SongRepository;
use hum_to_song::types::{Arrangement, Genre, Mood, NewSong, StyleDescription, Vocals};

fn sample_style() -> StyleDescription {
    StyleDescription {
        genre: Genre::Pop,
        mood: Mood::Happy,
        arrangement: Arrangement::FullBand,
        vocals: Vocals::Female,
    }
}

fn sample_song(title: &str, audio: Option<Vec<u8>>) -> NewSong {
    NewSong {
        title: title.to_string(),
        lyrics: "[Verse 1]\nLa la la\n\n[Chorus]\nSing it back".to_string(),
        style: sample_style(),
        album_art_url: "data:image/jpeg;base64,QUJD".to_string(),
        audio,
    }
}

/// Audio covering every byte value, so truncation or re-encoding would show
fn binary_audio() -> Vec<u8> {
    (0..4096u32).map(|i| (i % 256) as u8).collect()
}

#[tokio::test]
async fn audio_round_trips_byte_exact() {
    let (pool, _guard) = db::create_test_connection_in_temporary_file()
        .await
        .unwrap();
    let repo = SongRepository::new(pool);

    let audio = binary_audio();
    let id = repo.save(&sample_song("Neon Dreams", Some(audio.clone()))).await.unwrap();

    let listed = repo.list_all().await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, id);
    assert_eq!(listed[0].audio.as_deref(), Some(audio.as_slice()));
    assert_eq!(listed[0].style, sample_style());
    assert_eq!(listed[0].title, "Neon Dreams");

    let fetched = repo.get_by_id(id).await.unwrap().unwrap();
    assert_eq!(fetched.audio.as_deref(), Some(audio.as_slice()));
    assert_eq!(fetched.lyrics, listed[0].lyrics);
}

#[tokio::test]
async fn list_all_is_newest_first() {
    let pool = db::create_test_connection_in_memory().await;
    let repo = SongRepository::new(pool);

    let t1 = Utc.timestamp_millis_opt(1_700_000_000_000).unwrap();
    let t2 = Utc.timestamp_millis_opt(1_700_000_060_000).unwrap();
    let t3 = Utc.timestamp_millis_opt(1_700_000_120_000).unwrap();

    // Insert out of order so the ordering must come from created_at
    repo.save_at(&sample_song("second", None), t2).await.unwrap();
    repo.save_at(&sample_song("first", None), t1).await.unwrap();
    repo.save_at(&sample_song("third", None), t3).await.unwrap();

    let titles: Vec<String> = repo
        .list_all()
        .await
        .unwrap()
        .into_iter()
        .map(|s| s.title)
        .collect();
    assert_eq!(titles, vec!["third", "second", "first"]);
}

#[tokio::test]
async fn equal_timestamps_fall_back_to_id_order() {
    let pool = db::create_test_connection_in_memory().await;
    let repo = SongRepository::new(pool);

    let t = Utc.timestamp_millis_opt(1_700_000_000_000).unwrap();
    let first = repo.save_at(&sample_song("older", None), t).await.unwrap();
    let second = repo.save_at(&sample_song("newer", None), t).await.unwrap();
    assert_ne!(first, second);

    let ids: Vec<i64> = repo
        .list_all()
        .await
        .unwrap()
        .into_iter()
        .map(|s| s.id)
        .collect();
    assert_eq!(ids, vec![second, first]);
}

#[tokio::test]
async fn delete_of_missing_id_is_a_no_op() {
    let pool = db::create_test_connection_in_memory().await;
    let repo = SongRepository::new(pool);

    let id = repo.save(&sample_song("keeper", None)).await.unwrap();

    repo.delete_by_id(id + 1000).await.unwrap();
    assert_eq!(repo.list_all().await.unwrap().len(), 1);

    repo.delete_by_id(id).await.unwrap();
    assert!(repo.list_all().await.unwrap().is_empty());

    // Deleting again is still fine
    repo.delete_by_id(id).await.unwrap();
}

#[tokio::test]
async fn get_by_id_of_missing_song_is_none() {
    let pool = db::create_test_connection_in_memory().await;
    let repo = SongRepository::new(pool);

    assert!(repo.get_by_id(42).await.unwrap().is_none());
}

#[tokio::test]
async fn audio_helper_returns_bytes_and_creation_time() {
    let pool = db::create_test_connection_in_memory().await;
    let repo = SongRepository::new(pool);

    let t = Utc.timestamp_millis_opt(1_700_000_000_000).unwrap();
    let audio = binary_audio();
    let id = repo
        .save_at(&sample_song("with audio", Some(audio.clone())), t)
        .await
        .unwrap();

    let (stored, created_at) = repo.get_audio_by_id(id).await.unwrap().unwrap();
    assert_eq!(stored.as_deref(), Some(audio.as_slice()));
    assert_eq!(created_at, t);

    assert!(repo.get_audio_by_id(id + 1).await.unwrap().is_none());
}

#[tokio::test]
async fn schema_init_is_idempotent() {
    let (pool, _guard) = db::create_test_connection_in_temporary_file()
        .await
        .unwrap();

    let unique_id_before: String = sqlx::query(&metadata::select_by_key("unique_id"))
        .fetch_one(&pool)
        .await
        .unwrap()
        .get(0);

    db::init_database_schema(&pool).await.unwrap();
    db::init_database_schema(&pool).await.unwrap();

    let unique_id_after: String = sqlx::query(&metadata::select_by_key("unique_id"))
        .fetch_one(&pool)
        .await
        .unwrap()
        .get(0);
    assert_eq!(unique_id_before, unique_id_after);

    db::check_database_version(&pool).await.unwrap();
}

#[tokio::test]
async fn version_mismatch_is_rejected() {
    let pool = db::create_test_connection_in_memory().await;
    db::check_database_version(&pool).await.unwrap();

    sqlx::query(&metadata::upsert("version", "999"))
        .execute(&pool)
        .await
        .unwrap();

    let err = db::check_database_version(&pool).await.unwrap_err();
    assert!(err.to_string().contains("Unsupported database version"));
}
