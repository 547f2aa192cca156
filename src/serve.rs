use std::path::PathBuf;
use std::sync::Arc as StdArc;
use std::time::SystemTime;

use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use log::error;
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};

use crate::db;
use crate::error::DynError;
use crate::repo::SongRepository;
use crate::types::{NewSong, SavedSong, StyleDescription};

/// State for the song library handlers
pub struct AppState {
    pub repo: SongRepository,
}

#[derive(Serialize)]
struct SongSummary {
    id: i64,
    title: String,
    lyrics: String,
    music_description: StyleDescription,
    album_art_url: String,
    has_audio: bool,
    created_at: String,
}

impl From<&SavedSong> for SongSummary {
    fn from(song: &SavedSong) -> Self {
        Self {
            id: song.id,
            title: song.title.clone(),
            lyrics: song.lyrics.clone(),
            music_description: song.style,
            album_art_url: song.album_art_url.clone(),
            has_audio: song.audio.as_ref().is_some_and(|a| !a.is_empty()),
            created_at: song.created_at.to_rfc3339(),
        }
    }
}

#[derive(Serialize)]
struct SongsResponse {
    success: bool,
    songs: Vec<SongSummary>,
}

#[derive(Serialize)]
struct SongResponse {
    success: bool,
    song: SongSummary,
}

#[derive(Deserialize)]
struct CreateSongRequest {
    title: String,
    lyrics: String,
    music_description: StyleDescription,
    album_art_url: String,
    /// Base64-encoded audio bytes
    #[serde(default)]
    audio_data: Option<String>,
}

#[derive(Serialize)]
struct CreateSongResponse {
    success: bool,
    id: i64,
}

#[derive(Serialize)]
struct OkResponse {
    success: bool,
}

#[derive(Serialize)]
struct ErrorResponse {
    success: bool,
    error: String,
}

fn error_response(status: StatusCode, message: impl Into<String>) -> axum::response::Response {
    (
        status,
        Json(ErrorResponse {
            success: false,
            error: message.into(),
        }),
    )
        .into_response()
}

async fn health_handler() -> impl IntoResponse {
    Json(OkResponse { success: true })
}

async fn list_songs_handler(State(state): State<StdArc<AppState>>) -> impl IntoResponse {
    match state.repo.list_all().await {
        Ok(songs) => Json(SongsResponse {
            success: true,
            songs: songs.iter().map(SongSummary::from).collect(),
        })
        .into_response(),
        Err(e) => {
            error!("Failed to list songs: {}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, format!("Database error: {}", e))
        }
    }
}

async fn get_song_handler(
    State(state): State<StdArc<AppState>>,
    Path(id): Path<i64>,
) -> impl IntoResponse {
    match state.repo.get_by_id(id).await {
        Ok(Some(song)) => Json(SongResponse {
            success: true,
            song: SongSummary::from(&song),
        })
        .into_response(),
        Ok(None) => error_response(StatusCode::NOT_FOUND, format!("Song {} not found", id)),
        Err(e) => {
            error!("Failed to fetch song {}: {}", id, e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, format!("Database error: {}", e))
        }
    }
}

async fn create_song_handler(
    State(state): State<StdArc<AppState>>,
    Json(request): Json<CreateSongRequest>,
) -> impl IntoResponse {
    if request.title.trim().is_empty() || request.lyrics.trim().is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "Missing required fields");
    }

    let audio = match &request.audio_data {
        Some(encoded) => match BASE64.decode(encoded) {
            Ok(bytes) => Some(bytes),
            Err(e) => {
                return error_response(
                    StatusCode::BAD_REQUEST,
                    format!("audio_data is not valid base64: {}", e),
                )
            }
        },
        None => None,
    };

    let song = NewSong {
        title: request.title,
        lyrics: request.lyrics,
        style: request.music_description,
        album_art_url: request.album_art_url,
        audio,
    };
    match state.repo.save(&song).await {
        Ok(id) => (
            StatusCode::CREATED,
            Json(CreateSongResponse { success: true, id }),
        )
            .into_response(),
        Err(e) => {
            error!("Failed to save song: {}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, format!("Database error: {}", e))
        }
    }
}

async fn delete_song_handler(
    State(state): State<StdArc<AppState>>,
    Path(id): Path<i64>,
) -> impl IntoResponse {
    // Deleting a missing id is a success, matching idempotent-delete semantics
    match state.repo.delete_by_id(id).await {
        Ok(()) => Json(OkResponse { success: true }).into_response(),
        Err(e) => {
            error!("Failed to delete song {}: {}", id, e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, format!("Database error: {}", e))
        }
    }
}

async fn song_audio_handler(
    State(state): State<StdArc<AppState>>,
    Path(id): Path<i64>,
) -> impl IntoResponse {
    match state.repo.get_audio_by_id(id).await {
        Ok(Some((Some(audio), created_at))) if !audio.is_empty() => {
            let last_modified = httpdate::fmt_http_date(SystemTime::from(created_at));
            (
                [
                    (header::CONTENT_TYPE, "audio/mpeg".to_string()),
                    (header::LAST_MODIFIED, last_modified),
                ],
                audio,
            )
                .into_response()
        }
        Ok(Some(_)) => error_response(
            StatusCode::NOT_FOUND,
            format!("Song {} has no stored audio", id),
        ),
        Ok(None) => error_response(StatusCode::NOT_FOUND, format!("Song {} not found", id)),
        Err(e) => {
            error!("Failed to fetch audio for song {}: {}", id, e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, format!("Database error: {}", e))
        }
    }
}

/// Build the API router over an opened repository
pub fn router(repo: SongRepository) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/health", get(health_handler))
        .route("/api/songs", get(list_songs_handler).post(create_song_handler))
        .route(
            "/api/songs/{id}",
            get(get_song_handler).delete(delete_song_handler),
        )
        .route("/api/songs/{id}/audio", get(song_audio_handler))
        .layer(cors)
        .with_state(StdArc::new(AppState { repo }))
}

/// Serve the song library over HTTP (for serve command)
pub fn serve_library(database: PathBuf, port: u16) -> Result<(), DynError> {
    println!("Starting server for: {}", database.display());
    println!("Listening on: http://[::]:{} (IPv4 + IPv6)", port);
    println!("Endpoints:");
    println!("  GET    /api/health  - Health check");
    println!("  GET    /api/songs  - List songs, newest first");
    println!("  POST   /api/songs  - Save a song (audio as base64)");
    println!("  GET    /api/songs/:id  - Fetch one song");
    println!("  DELETE /api/songs/:id  - Delete a song (idempotent)");
    println!("  GET    /api/songs/:id/audio  - Raw audio bytes");

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async {
        let pool = db::open_database_connection(&database).await?;
        db::init_database_schema(&pool).await?;
        db::check_database_version(&pool).await?;

        let app = router(SongRepository::new(pool));
        let listener = tokio::net::TcpListener::bind(format!("[::]:{}", port))
            .await
            .map_err(|e| format!("Failed to bind to port {}: {}", port, e))?;
        axum::serve(listener, app)
            .await
            .map_err(|e| format!("Server error: {}", e))?;

        Ok::<(), DynError>(())
    })
}
