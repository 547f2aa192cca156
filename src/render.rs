use std::time::Duration;

use bytes::Bytes;
use clap::ValueEnum;
use log::{debug, info, warn};
use reqwest::header::AUTHORIZATION;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::error::{DynError, PipelineError};
use crate::types::{JobStatus, RenderJob};

const DEFAULT_BASE_URL: &str = "https://api.replicate.com/";

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);
pub const DEFAULT_RENDER_BUDGET: Duration = Duration::from_secs(300);

/// Version pin for the ace-step model's create request
const ACE_STEP_VERSION: &str = "280fc4f9ee507577f880a167f639c02622421d8fecf492454320311217b688f1";

/// Lyrics bounds for providers that limit prompt length
pub const MAX_PROMPT_PARAGRAPHS: usize = 4;
pub const MAX_PROMPT_CHARS: usize = 580;
pub const TRUNCATION_MARKER: &str = "...";

/// Render provider profile, selected per render request
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RenderModel {
    /// Fast, versatile generation with good tag adherence and an explicit
    /// client-supplied duration
    AceStep,
    /// Higher-quality vocals; duration is provider-determined and lyrics are
    /// length-bounded
    MinimaxMusic,
}

/// Static request-shaping data for a provider profile
#[derive(Debug, Clone, Copy)]
pub struct ModelSpec {
    pub name: &'static str,
    pub duration_options: &'static [u32],
    /// Whether the client supplies the duration
    pub client_duration: bool,
}

impl RenderModel {
    pub fn spec(&self) -> ModelSpec {
        match self {
            RenderModel::AceStep => ModelSpec {
                name: "ACE-Step",
                duration_options: &[30, 60, 120],
                client_duration: true,
            },
            RenderModel::MinimaxMusic => ModelSpec {
                name: "MiniMax Music 1.5",
                duration_options: &[30, 60, 120, 180, 300],
                client_duration: false,
            },
        }
    }

    fn create_path(&self) -> &'static str {
        match self {
            RenderModel::AceStep => "v1/predictions",
            RenderModel::MinimaxMusic => "v1/models/minimax/music-1.5/predictions",
        }
    }
}

/// Inputs for one render submission; never mutated by a failed attempt
#[derive(Debug, Clone)]
pub struct RenderRequest {
    pub lyrics: String,
    /// Free-text style tag string (see `StyleDescription::prompt_tags`)
    pub tags: String,
    pub duration_seconds: u32,
    pub model: RenderModel,
}

/// Retrieved output of a succeeded render job
#[derive(Debug, Clone)]
pub struct RenderedAudio {
    pub url: String,
    pub bytes: Bytes,
}

// Wire types for the render provider

#[derive(Serialize)]
struct CreatePrediction<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    version: Option<&'static str>,
    input: PredictionInput<'a>,
}

#[derive(Serialize)]
struct PredictionInput<'a> {
    lyrics: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    tags: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    prompt: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    duration: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tag_guidance_scale: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    lyric_guidance_scale: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    guidance_scale: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    number_of_steps: Option<u32>,
}

#[derive(Deserialize)]
struct PredictionStatus {
    id: String,
    status: String,
    #[serde(default)]
    urls: PredictionUrls,
    #[serde(default)]
    error: Option<serde_json::Value>,
    #[serde(default)]
    output: Option<serde_json::Value>,
}

#[derive(Deserialize, Default)]
struct PredictionUrls {
    #[serde(default)]
    get: Option<String>,
}

/// Client for the asynchronous music render provider
pub struct RenderClient {
    http: reqwest::Client,
    api_token: String,
    base_url: Url,
    poll_interval: Duration,
    render_budget: Duration,
}

impl RenderClient {
    pub fn new(api_token: &str) -> Result<Self, DynError> {
        let http = reqwest::Client::builder().build()?;
        Ok(Self {
            http,
            api_token: api_token.to_string(),
            base_url: Url::parse(DEFAULT_BASE_URL)?,
            poll_interval: DEFAULT_POLL_INTERVAL,
            render_budget: DEFAULT_RENDER_BUDGET,
        })
    }

    /// Point the client at a different provider root (used by tests)
    pub fn with_base_url(mut self, base_url: Url) -> Self {
        self.base_url = base_url;
        self
    }

    pub fn with_timing(mut self, poll_interval: Duration, render_budget: Duration) -> Self {
        self.poll_interval = poll_interval;
        self.render_budget = render_budget;
        self
    }

    /// Submit, poll to a terminal state, and retrieve the output asset
    ///
    /// Errors carry the provider's status or message; no step retries
    /// automatically. A canceled or timed-out job is abandoned remotely.
    pub async fn render(
        &self,
        request: &RenderRequest,
        cancel: &CancellationToken,
    ) -> Result<RenderedAudio, PipelineError> {
        let mut job = self.submit(request).await?;
        info!("render job {} submitted ({})", job.id, request.model.spec().name);

        self.poll_until_terminal(&mut job, cancel).await?;

        match job.status {
            JobStatus::Succeeded => {
                let output_url = job.output_url.clone().ok_or_else(|| {
                    PipelineError::RenderFailed(
                        "job succeeded but no output URL was provided".to_string(),
                    )
                })?;
                self.fetch_output(&output_url).await
            }
            JobStatus::Failed => Err(PipelineError::RenderFailed(format!(
                "provider reported failure: {}",
                job.error_detail.as_deref().unwrap_or("no detail given")
            ))),
            JobStatus::Canceled => Err(PipelineError::RenderCanceled),
            // poll_until_terminal returns the timeout error itself; any other
            // status here means the terminal lattice was violated
            status => Err(PipelineError::RenderFailed(format!(
                "job ended polling in non-terminal status {:?}",
                status
            ))),
        }
    }

    /// Create the prediction and return the tracked job
    pub async fn submit(&self, request: &RenderRequest) -> Result<RenderJob, PipelineError> {
        let spec = request.model.spec();
        if spec.client_duration && !spec.duration_options.contains(&request.duration_seconds) {
            return Err(PipelineError::RenderFailed(format!(
                "{} does not support a {}s duration (allowed: {:?})",
                spec.name, request.duration_seconds, spec.duration_options
            )));
        }

        let shaped_lyrics;
        let body = match request.model {
            RenderModel::AceStep => {
                shaped_lyrics = ensure_structured(&request.lyrics);
                CreatePrediction {
                    version: Some(ACE_STEP_VERSION),
                    input: PredictionInput {
                        lyrics: &shaped_lyrics,
                        tags: Some(&request.tags),
                        prompt: None,
                        duration: Some(request.duration_seconds),
                        tag_guidance_scale: Some(7),
                        lyric_guidance_scale: Some(5),
                        guidance_scale: Some(15),
                        number_of_steps: Some(60),
                    },
                }
            }
            RenderModel::MinimaxMusic => {
                let (truncated, was_cut) = truncate_lyrics_for_prompt(&request.lyrics);
                if was_cut {
                    info!(
                        "lyrics truncated for {}: {} -> {} chars",
                        spec.name,
                        request.lyrics.chars().count(),
                        truncated.chars().count()
                    );
                }
                shaped_lyrics = truncated;
                CreatePrediction {
                    version: None,
                    input: PredictionInput {
                        lyrics: &shaped_lyrics,
                        tags: None,
                        prompt: Some(&request.tags),
                        duration: None,
                        tag_guidance_scale: None,
                        lyric_guidance_scale: None,
                        guidance_scale: None,
                        number_of_steps: None,
                    },
                }
            }
        };

        let url = self.base_url.join(request.model.create_path()).map_err(|e| {
            PipelineError::RenderFailed(format!("invalid provider endpoint: {}", e))
        })?;
        let response = self
            .http
            .post(url)
            .header(AUTHORIZATION, format!("Token {}", self.api_token))
            .json(&body)
            .send()
            .await
            .map_err(|e| PipelineError::RenderFailed(format!("job creation failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(PipelineError::RenderFailed(format!(
                "job creation returned HTTP {}: {}",
                status, detail
            )));
        }

        let prediction: PredictionStatus = response.json().await.map_err(|e| {
            PipelineError::RenderFailed(format!("unreadable job creation response: {}", e))
        })?;
        let poll_url = prediction.urls.get.clone().ok_or_else(|| {
            PipelineError::RenderFailed("job creation response carried no poll URL".to_string())
        })?;

        Ok(RenderJob {
            id: prediction.id.clone(),
            status: map_provider_status(&prediction.status),
            poll_url,
            output_url: extract_output_url(prediction.output.as_ref()),
            error_detail: prediction.error.as_ref().map(format_error_detail),
        })
    }

    /// Poll the job at a fixed interval until it reaches a terminal state
    ///
    /// The cancellation token is checked every tick; exceeding the wall-clock
    /// budget marks the job TimedOut and abandons it without a remote cancel.
    pub async fn poll_until_terminal(
        &self,
        job: &mut RenderJob,
        cancel: &CancellationToken,
    ) -> Result<(), PipelineError> {
        let deadline = tokio::time::Instant::now() + self.render_budget;

        loop {
            if job.status.is_terminal() {
                return Ok(());
            }
            let now = tokio::time::Instant::now();
            if now >= deadline {
                job.advance(JobStatus::TimedOut);
                warn!("render job {} abandoned after polling budget expired", job.id);
                return Err(PipelineError::RenderTimedOut {
                    budget: self.render_budget,
                });
            }

            let tick = self.poll_interval.min(deadline - now);
            tokio::select! {
                _ = cancel.cancelled() => {
                    job.advance(JobStatus::Canceled);
                    info!("render job {} polling canceled; remote job left running", job.id);
                    return Err(PipelineError::RenderCanceled);
                }
                _ = tokio::time::sleep(tick) => {}
            }

            self.poll_status(job).await?;
        }
    }

    /// One status observation; terminal statuses are sticky on the job
    async fn poll_status(&self, job: &mut RenderJob) -> Result<(), PipelineError> {
        let response = self
            .http
            .get(&job.poll_url)
            .header(AUTHORIZATION, format!("Token {}", self.api_token))
            .send()
            .await
            .map_err(|e| PipelineError::RenderFailed(format!("status poll failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(PipelineError::RenderFailed(format!(
                "status poll returned HTTP {}",
                status
            )));
        }

        let prediction: PredictionStatus = response.json().await.map_err(|e| {
            PipelineError::RenderFailed(format!("unreadable status response: {}", e))
        })?;
        debug!("render job {} status: {}", job.id, prediction.status);

        job.advance(map_provider_status(&prediction.status));
        if job.output_url.is_none() {
            job.output_url = extract_output_url(prediction.output.as_ref());
        }
        if job.error_detail.is_none() {
            job.error_detail = prediction.error.as_ref().map(format_error_detail);
        }
        Ok(())
    }

    /// Retrieve the rendered asset bytes. A failure here is distinct from job
    /// failure: the render itself succeeded.
    async fn fetch_output(&self, output_url: &str) -> Result<RenderedAudio, PipelineError> {
        let response = self.http.get(output_url).send().await.map_err(|e| {
            PipelineError::RenderFailed(format!("fetching rendered audio failed: {}", e))
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(PipelineError::RenderFailed(format!(
                "fetching rendered audio from {} returned HTTP {}",
                output_url, status
            )));
        }

        let audio_bytes = response.bytes().await.map_err(|e| {
            PipelineError::RenderFailed(format!("reading rendered audio failed: {}", e))
        })?;
        if audio_bytes.is_empty() {
            return Err(PipelineError::RenderFailed(
                "rendered audio asset is empty".to_string(),
            ));
        }

        Ok(RenderedAudio {
            url: output_url.to_string(),
            bytes: audio_bytes,
        })
    }
}

fn map_provider_status(status: &str) -> JobStatus {
    match status {
        "starting" | "queued" => JobStatus::Created,
        "processing" => JobStatus::Processing,
        "succeeded" => JobStatus::Succeeded,
        "failed" => JobStatus::Failed,
        "canceled" => JobStatus::Canceled,
        other => {
            warn!("unknown provider status '{}', treating as processing", other);
            JobStatus::Processing
        }
    }
}

fn extract_output_url(output: Option<&serde_json::Value>) -> Option<String> {
    match output {
        Some(serde_json::Value::String(url)) => Some(url.clone()),
        Some(serde_json::Value::Array(items)) => items.iter().find_map(|item| match item {
            serde_json::Value::String(url) => Some(url.clone()),
            _ => None,
        }),
        _ => None,
    }
}

fn format_error_detail(error: &serde_json::Value) -> String {
    match error {
        serde_json::Value::String(message) => message.clone(),
        other => other.to_string(),
    }
}

/// Bound lyrics to the length-limited provider profile: at most
/// `MAX_PROMPT_PARAGRAPHS` paragraph blocks and `MAX_PROMPT_CHARS` characters,
/// with a visible marker whenever anything was cut. Returns the shaped text
/// and whether truncation happened.
pub fn truncate_lyrics_for_prompt(lyrics: &str) -> (String, bool) {
    let paragraphs: Vec<&str> = lyrics.split("\n\n").collect();
    let paragraph_cut = paragraphs.len() > MAX_PROMPT_PARAGRAPHS;
    let mut text: String = if paragraph_cut {
        paragraphs[..MAX_PROMPT_PARAGRAPHS].join("\n\n")
    } else {
        lyrics.to_string()
    };

    let char_budget = MAX_PROMPT_CHARS - TRUNCATION_MARKER.len();
    let char_cut = text.chars().count() > MAX_PROMPT_CHARS;
    if char_cut || (paragraph_cut && text.chars().count() > char_budget) {
        text = text.chars().take(char_budget).collect();
    }

    if paragraph_cut || char_cut {
        text.push_str(TRUNCATION_MARKER);
        return (text, true);
    }
    (text, false)
}

/// Give unstructured lyrics the `[verse]`/`[chorus]` scaffolding the
/// tag-driven profile responds to; lyrics that already carry section headers
/// pass through unchanged.
pub fn ensure_structured(lyrics: &str) -> String {
    let has_section_header = lyrics
        .lines()
        .any(|line| line.trim_start().starts_with('[') && line.trim_end().ends_with(']'));
    if has_section_header {
        return lyrics.to_string();
    }

    let lines: Vec<&str> = lyrics.lines().filter(|line| !line.trim().is_empty()).collect();
    if lines.is_empty() {
        return lyrics.to_string();
    }
    let body = lines.join("\n");
    format!("[verse]\n{}\n\n[chorus]\n{}", body, body)
}
