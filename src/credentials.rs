use std::path::PathBuf;

use serde::Deserialize;

use crate::error::DynError;

pub const GEMINI_API_KEY_VAR: &str = "GEMINI_API_KEY";
pub const REPLICATE_API_TOKEN_VAR: &str = "REPLICATE_API_TOKEN";

/// Credentials file structure
///
/// Format:
/// ```toml
/// [gemini]
/// api_key = "your_generation_service_key_here"
///
/// [replicate]
/// api_token = "your_render_provider_token_here"
/// ```
#[derive(Debug, Clone, Deserialize, Default)]
struct CredentialsFile {
    #[serde(default)]
    gemini: Option<GeminiSection>,
    #[serde(default)]
    replicate: Option<ReplicateSection>,
}

#[derive(Debug, Clone, Deserialize)]
struct GeminiSection {
    api_key: String,
}

#[derive(Debug, Clone, Deserialize)]
struct ReplicateSection {
    api_token: String,
}

/// Resolved credentials for both external services
#[derive(Debug, Clone)]
pub struct Credentials {
    pub gemini_api_key: String,
    pub replicate_api_token: String,
}

/// Get the default credentials file path: ~/.config/hum_to_song/credentials.toml
pub fn get_credentials_path() -> Result<PathBuf, DynError> {
    let home = std::env::var("HOME").map_err(|_| "HOME environment variable not set")?;
    Ok(PathBuf::from(home)
        .join(".config")
        .join("hum_to_song")
        .join("credentials.toml"))
}

/// Load credentials, environment first, credentials file second
///
/// Called at startup so a missing credential fails before any device or
/// network work happens, with a message naming what to set.
pub fn load_credentials() -> Result<Credentials, DynError> {
    let creds_path = get_credentials_path()?;
    let file: CredentialsFile = if creds_path.exists() {
        let content = std::fs::read_to_string(&creds_path)?;
        toml::from_str(&content)
            .map_err(|e| format!("Failed to parse '{}': {}", creds_path.display(), e))?
    } else {
        CredentialsFile::default()
    };

    let gemini_api_key = env_or(GEMINI_API_KEY_VAR)
        .or_else(|| file.gemini.as_ref().map(|s| s.api_key.clone()))
        .ok_or_else(|| {
            format!(
                "{} is not set and no [gemini] section was found in {}",
                GEMINI_API_KEY_VAR,
                creds_path.display()
            )
        })?;

    let replicate_api_token = env_or(REPLICATE_API_TOKEN_VAR)
        .or_else(|| file.replicate.as_ref().map(|s| s.api_token.clone()))
        .ok_or_else(|| {
            format!(
                "{} is not set and no [replicate] section was found in {}",
                REPLICATE_API_TOKEN_VAR,
                creds_path.display()
            )
        })?;

    Ok(Credentials {
        gemini_api_key,
        replicate_api_token,
    })
}

fn env_or(var: &str) -> Option<String> {
    std::env::var(var).ok().filter(|v| !v.trim().is_empty())
}
