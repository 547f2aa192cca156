use std::fs::File;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use fs2::FileExt;
use log::debug;
use url::Url;

use hum_to_song::config::AppConfig;
use hum_to_song::credentials::load_credentials;
use hum_to_song::db;
use hum_to_song::draft::DraftGenerator;
use hum_to_song::error::DynError;
use hum_to_song::pipeline::SongPipeline;
use hum_to_song::recorder::{RecordingSession, WavFileDevice};
use hum_to_song::render::{RenderClient, RenderModel, RenderRequest};
use hum_to_song::repo::SongRepository;
use hum_to_song::serve::serve_library;

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Turn a hummed melody into a finished song with AI generation"
)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate a song from a recorded hum or voice memo
    Generate {
        /// Path to the recorded WAV input
        #[arg(short, long)]
        input: PathBuf,

        /// Path to config file (TOML format)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Render model to use
        #[arg(long, value_enum)]
        model: Option<RenderModel>,

        /// Requested duration in seconds (models with client-side duration)
        #[arg(long)]
        duration: Option<u32>,

        /// Replace the drafted lyrics with this file's contents before rendering
        #[arg(long)]
        lyrics: Option<PathBuf>,

        /// Override the style tag string submitted to the render provider
        #[arg(long)]
        tags: Option<String>,

        /// Print the draft and stop; skip rendering and saving
        #[arg(long)]
        draft_only: bool,

        /// Path to the library database (overrides config)
        #[arg(long)]
        database: Option<PathBuf>,
    },
    /// Serve the song library over HTTP
    Serve {
        /// Path to the library database (overrides config)
        #[arg(long)]
        database: Option<PathBuf>,

        /// Port to listen on (overrides config api_port)
        #[arg(short, long)]
        port: Option<u16>,

        /// Path to config file (TOML format)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// List saved songs, newest first
    List {
        /// Path to the library database (overrides config)
        #[arg(long)]
        database: Option<PathBuf>,

        /// Path to config file (TOML format)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Write a saved song's audio to a file
    Export {
        /// Song id to export
        id: i64,

        /// Output file path (default: {output_dir}/song_{id}.mp3)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Path to the library database (overrides config)
        #[arg(long)]
        database: Option<PathBuf>,

        /// Path to config file (TOML format)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Delete a saved song (no-op if the id does not exist)
    Delete {
        /// Song id to delete
        id: i64,

        /// Path to the library database (overrides config)
        #[arg(long)]
        database: Option<PathBuf>,

        /// Path to config file (TOML format)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Initialize a library database (safe to run repeatedly)
    InitDb {
        /// Path to the library database (overrides config)
        #[arg(long)]
        database: Option<PathBuf>,

        /// Path to config file (TOML format)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

fn main() -> Result<(), DynError> {
    env_logger::init();
    let args = Args::parse();

    match args.command {
        Command::Generate {
            input,
            config,
            model,
            duration,
            lyrics,
            tags,
            draft_only,
            database,
        } => generate(
            input, config, model, duration, lyrics, tags, draft_only, database,
        ),
        Command::Serve {
            database,
            port,
            config,
        } => {
            let config = AppConfig::load(config.as_deref())?;
            let database = database.unwrap_or_else(|| config.database_path());
            ensure_parent_dir(&database)?;
            serve_library(database, port.unwrap_or(config.api_port))
        }
        Command::List { database, config } => list(database, config),
        Command::Export {
            id,
            output,
            database,
            config,
        } => export(id, output, database, config),
        Command::Delete {
            id,
            database,
            config,
        } => delete(id, database, config),
        Command::InitDb { database, config } => init_db(database, config),
    }
}

#[allow(clippy::too_many_arguments)]
fn generate(
    input: PathBuf,
    config: Option<PathBuf>,
    model: Option<RenderModel>,
    duration: Option<u32>,
    lyrics_override: Option<PathBuf>,
    tags_override: Option<String>,
    draft_only: bool,
    database: Option<PathBuf>,
) -> Result<(), DynError> {
    let config = AppConfig::load(config.as_deref())?;
    let credentials = load_credentials()?;
    let generation = config.generation.clone().unwrap_or_default();

    let database = database.unwrap_or_else(|| config.database_path());
    ensure_parent_dir(&database)?;

    // One writer per library at a time
    let lock_path = database.with_extension("lock");
    let lock_file = File::create(&lock_path)
        .map_err(|e| format!("Failed to create lock file '{}': {}", lock_path.display(), e))?;
    lock_file.try_lock_exclusive().map_err(|_| {
        format!(
            "Another instance is already writing to this library. Lock file: {}",
            lock_path.display()
        )
    })?;

    let model = model
        .or(generation.model)
        .unwrap_or(RenderModel::MinimaxMusic);
    let duration_seconds = duration.or(generation.duration_seconds).unwrap_or(60);
    let spec = model.spec();
    if spec.client_duration && !spec.duration_options.contains(&duration_seconds) {
        return Err(format!(
            "{} does not support a {}s duration (allowed: {:?})",
            spec.name, duration_seconds, spec.duration_options
        )
        .into());
    }

    let mut drafts = DraftGenerator::new(&credentials.gemini_api_key)?;
    if let Some(base_url) = &generation.generation_base_url {
        drafts = drafts.with_base_url(Url::parse(base_url)?);
    }
    let mut renderer = RenderClient::new(&credentials.replicate_api_token)?;
    if let Some(base_url) = &generation.render_base_url {
        renderer = renderer.with_base_url(Url::parse(base_url)?);
    }
    if generation.poll_interval_secs.is_some() || generation.render_timeout_secs.is_some() {
        renderer = renderer.with_timing(
            Duration::from_secs(generation.poll_interval_secs.unwrap_or(2)),
            Duration::from_secs(generation.render_timeout_secs.unwrap_or(300)),
        );
    }

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async move {
        let pool = db::open_database_connection(&database).await?;
        db::init_database_schema(&pool).await?;
        db::check_database_version(&pool).await?;
        let repo = SongRepository::new(pool);

        // "Record" from the input file through the same state machine a live
        // device would drive
        let mut session = RecordingSession::new(Box::new(WavFileDevice::new(&input)));
        session.start()?;
        let captured = session.stop()?;
        println!(
            "Captured {:.1}s of audio from {}",
            captured.duration_seconds,
            input.display()
        );

        let pipeline = Arc::new(SongPipeline::new(drafts, renderer, repo));

        let mut phases = pipeline.phase();
        tokio::spawn(async move {
            while phases.changed().await.is_ok() {
                debug!("pipeline phase: {:?}", *phases.borrow());
            }
        });

        let mut draft = pipeline.generate_draft(&captured).await?;
        println!();
        println!("Title: {}", draft.title);
        println!("Style: {}", draft.style);
        println!();
        println!("{}", draft.lyrics);
        println!();

        if let Some(lyrics_path) = lyrics_override {
            draft.lyrics = std::fs::read_to_string(&lyrics_path).map_err(|e| {
                format!("Failed to read lyrics file '{}': {}", lyrics_path.display(), e)
            })?;
            println!("Using edited lyrics from {}", lyrics_path.display());
        }

        if draft_only {
            println!("Draft only; skipping render.");
            return Ok(());
        }

        let request = RenderRequest {
            lyrics: draft.lyrics.clone(),
            tags: tags_override.unwrap_or_else(|| draft.style.prompt_tags()),
            duration_seconds,
            model,
        };

        // Ctrl-C abandons polling; the remote job is left to finish on its own
        let canceller = pipeline.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                canceller.reset();
            }
        });

        println!("Rendering with {} ...", spec.name);
        let saved = pipeline.render_and_save(&draft, &request).await?;
        let audio_bytes = saved.audio.as_ref().map(|a| a.len()).unwrap_or(0);
        println!(
            "Saved song {} ('{}'), {} bytes of audio",
            saved.id, saved.title, audio_bytes
        );

        Ok::<(), DynError>(())
    })
}

fn list(database: Option<PathBuf>, config: Option<PathBuf>) -> Result<(), DynError> {
    let config = AppConfig::load(config.as_deref())?;
    let database = database.unwrap_or_else(|| config.database_path());

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async move {
        let pool = db::open_readonly_connection(&database).await?;
        db::check_database_version(&pool).await?;
        let repo = SongRepository::new(pool);

        let songs = repo.list_all().await?;
        if songs.is_empty() {
            println!("No songs saved yet.");
            return Ok(());
        }
        for song in &songs {
            let audio = match song.audio.as_ref().map(|a| a.len()) {
                Some(len) if len > 0 => format!("{} bytes", len),
                _ => "no audio".to_string(),
            };
            println!(
                "{:>4}  {}  {}  [{}]  {}",
                song.id,
                song.created_at.format("%Y-%m-%d %H:%M:%S UTC"),
                song.title,
                song.style,
                audio
            );
        }
        Ok::<(), DynError>(())
    })
}

fn export(
    id: i64,
    output: Option<PathBuf>,
    database: Option<PathBuf>,
    config: Option<PathBuf>,
) -> Result<(), DynError> {
    let config = AppConfig::load(config.as_deref())?;
    let database = database.unwrap_or_else(|| config.database_path());
    let output = output.unwrap_or_else(|| config.output_dir().join(format!("song_{}.mp3", id)));

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async move {
        let pool = db::open_readonly_connection(&database).await?;
        db::check_database_version(&pool).await?;
        let repo = SongRepository::new(pool);

        let song = repo
            .get_by_id(id)
            .await?
            .ok_or_else(|| format!("Song {} not found", id))?;
        let audio = song
            .audio
            .filter(|a| !a.is_empty())
            .ok_or_else(|| format!("Song {} has no stored audio", id))?;

        if let Some(parent) = output.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&output, &audio)?;
        println!(
            "Exported '{}' ({} bytes) to {}",
            song.title,
            audio.len(),
            output.display()
        );
        Ok::<(), DynError>(())
    })
}

fn delete(id: i64, database: Option<PathBuf>, config: Option<PathBuf>) -> Result<(), DynError> {
    let config = AppConfig::load(config.as_deref())?;
    let database = database.unwrap_or_else(|| config.database_path());
    if !database.exists() {
        return Err(format!("Database file not found: {}", database.display()).into());
    }

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async move {
        let pool = db::open_database_connection(&database).await?;
        db::check_database_version(&pool).await?;
        let repo = SongRepository::new(pool);

        repo.delete_by_id(id).await?;
        println!("Deleted song {} (no-op if it did not exist)", id);
        Ok::<(), DynError>(())
    })
}

fn init_db(database: Option<PathBuf>, config: Option<PathBuf>) -> Result<(), DynError> {
    let config = AppConfig::load(config.as_deref())?;
    let database = database.unwrap_or_else(|| config.database_path());
    ensure_parent_dir(&database)?;

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async move {
        let pool = db::open_database_connection(&database).await?;
        db::init_database_schema(&pool).await?;
        db::check_database_version(&pool).await?;
        println!("Library initialized at {}", database.display());
        Ok::<(), DynError>(())
    })
}

fn ensure_parent_dir(path: &std::path::Path) -> Result<(), DynError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|e| {
                format!("Failed to create directory '{}': {}", parent.display(), e)
            })?;
        }
    }
    Ok(())
}
