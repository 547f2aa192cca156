use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::DynError;
use crate::render::RenderModel;

fn default_api_port() -> u16 {
    3000
}

/// Application configuration file structure
#[derive(Debug, Deserialize)]
pub struct AppConfig {
    /// Path to the song library database (default: {output_dir}/library.sqlite)
    pub database: Option<PathBuf>,
    /// Directory for exported audio files (default: tmp)
    pub output_dir: Option<PathBuf>,
    /// API server port (default: 3000)
    #[serde(default = "default_api_port")]
    pub api_port: u16,
    /// Generation and rendering settings (maps to [generation] section in TOML)
    pub generation: Option<GenerationConfig>,
}

/// Generation and rendering settings
#[derive(Debug, Clone, Deserialize, Default)]
pub struct GenerationConfig {
    /// Render model: ace-step or minimax-music (default: minimax-music)
    pub model: Option<RenderModel>,
    /// Requested duration in seconds for models with client-side duration
    pub duration_seconds: Option<u32>,
    /// Seconds between render job status polls (default: 2)
    pub poll_interval_secs: Option<u64>,
    /// Wall-clock budget in seconds for render polling (default: 300)
    pub render_timeout_secs: Option<u64>,
    /// Override for the generation service root (mainly for testing)
    pub generation_base_url: Option<String>,
    /// Override for the render provider root (mainly for testing)
    pub render_base_url: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: None,
            output_dir: None,
            api_port: default_api_port(),
            generation: None,
        }
    }
}

impl AppConfig {
    /// Load configuration from an explicit path, or from the default location
    /// if one exists. A missing default file yields the built-in defaults; a
    /// missing explicit file is an error.
    pub fn load(path: Option<&Path>) -> Result<Self, DynError> {
        let path = match path {
            Some(path) => {
                if !path.exists() {
                    return Err(format!("Config file not found: {}", path.display()).into());
                }
                path.to_path_buf()
            }
            None => {
                let default = Self::default_config_path()?;
                if !default.exists() {
                    return Ok(Self::default());
                }
                default
            }
        };

        let content = std::fs::read_to_string(&path)
            .map_err(|e| format!("Failed to read config file '{}': {}", path.display(), e))?;
        let config: AppConfig = toml::from_str(&content)
            .map_err(|e| format!("Failed to parse config file '{}': {}", path.display(), e))?;
        config.validate()?;
        Ok(config)
    }

    /// Default config file path: ~/.config/hum_to_song/config.toml
    pub fn default_config_path() -> Result<PathBuf, DynError> {
        let home = std::env::var("HOME").map_err(|_| "HOME environment variable not set")?;
        Ok(PathBuf::from(home)
            .join(".config")
            .join("hum_to_song")
            .join("config.toml"))
    }

    /// Resolve the library database path
    pub fn database_path(&self) -> PathBuf {
        match &self.database {
            Some(path) => path.clone(),
            None => self.output_dir().join("library.sqlite"),
        }
    }

    pub fn output_dir(&self) -> PathBuf {
        self.output_dir.clone().unwrap_or_else(|| PathBuf::from("tmp"))
    }

    /// Validate generation settings
    ///
    /// If a model with client-side duration is configured together with a
    /// duration, the duration must be one of the model's allowed values.
    pub fn validate(&self) -> Result<(), String> {
        if let Some(generation) = &self.generation {
            if let (Some(model), Some(duration)) = (generation.model, generation.duration_seconds) {
                let spec = model.spec();
                if spec.client_duration && !spec.duration_options.contains(&duration) {
                    return Err(format!(
                        "duration_seconds = {} is not supported by {} (allowed: {:?})",
                        duration, spec.name, spec.duration_options
                    ));
                }
            }
        }
        Ok(())
    }
}
