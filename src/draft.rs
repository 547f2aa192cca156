use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{DynError, PipelineError};
use crate::types::{
    Arrangement, CapturedAudio, Genre, Mood, SongDraft, StyleDescription, Vocals,
};

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/";
const TEXT_MODEL: &str = "gemini-2.5-flash";
const IMAGE_MODEL: &str = "imagen-3.0-generate-002";

/// How much of an unparseable payload is quoted back in the error
const ERROR_PAYLOAD_PREFIX_CHARS: usize = 200;

/// Fixed instruction sent with every audio sample. The response contract
/// (single JSON object, closed option lists, escaped strings) is what the
/// parsing below relies on.
const SONGWRITER_INSTRUCTION: &str = r#"You are an AI songwriter with three tasks. You will process the user's audio input by following these steps in order:

**Step 1: Transcribe and Analyze.**
First, listen to the audio carefully.
- Transcribe any spoken words you hear. If no words are spoken, note that you will base the theme on the melody alone.
- Analyze the non-vocal parts of the audio (the humming) to determine its core emotional tone, tempo, and melodic style (e.g., "upbeat and simple," "slow and melancholic," "complex and rhythmic").

**Step 2: Write Lyrics.**
Now, write a full set of song lyrics.
- If words were transcribed in Step 1, use them as the central theme or a starting line for the lyrics. The new lyrics should feel like a natural and creative extension of the user's original idea.
- If no words were spoken, write lyrics that perfectly match the emotional tone and style you analyzed in Step 1.
- Structure the lyrics logically (e.g., verse, chorus, bridge).

**Step 3: Classify and Create.**
Finally, based on the original audio and the lyrics you wrote, provide the following:
1.  **Title:** A short, catchy title for the song (e.g., "Neon Dreams", "Rainy Window", "First Glance").
2.  **Music Style:** An object with four string properties: "genre", "mood", "arrangement", and "vocals". You MUST choose one option for each property from the provided lists below.
    - "genre" MUST be one of: ["Pop", "Rock", "Hip Hop", "Electronic", "Folk / Country", "R&B / Soul", "Jazz", "Orchestral"].
    - "mood" MUST be one of: ["Happy", "Sad", "Energetic", "Relaxing", "Romantic", "Epic", "Nostalgic", "Sentimental"].
    - "arrangement" MUST be one of: ["Full Band", "Acoustic", "Electronic", "Orchestral", "Simple Acoustic", "Synth & Drums"].
    - "vocals" MUST be one of: ["Male", "Female"]. For the "vocals" property, analyze the pitch of the user's voice in the audio and classify it as 'Male' or 'Female'. If it's ambiguous or just humming without clear words, choose the vocal style that you feel best fits the melody.
3.  **Image Prompt:** A concise, descriptive prompt for an AI to generate album art that captures the essence of the song.

Your final output must be a single, valid JSON object with four keys: "title", "lyrics", "musicDescription", and "imagePrompt".
- The value for "lyrics" must be a single multi-line string with proper JSON escaping (use \n for line breaks).
- The value for "musicDescription" must be an object with "genre", "mood", "arrangement", and "vocals" strings, strictly following the options provided above.
- CRITICAL: Ensure all strings in the JSON are properly escaped. Replace all actual newlines with \n, escape all quotes properly, and ensure valid JSON syntax.
- Do not wrap the JSON in markdown code blocks or any other formatting."#;

// Request/response wire types for the generation service

#[derive(Serialize)]
struct GenerateContentRequest<'a> {
    contents: Vec<Content<'a>>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig<'a>,
}

#[derive(Serialize)]
struct Content<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum Part<'a> {
    Text {
        text: &'a str,
    },
    InlineData {
        #[serde(rename = "inlineData")]
        inline_data: InlineData<'a>,
    },
}

#[derive(Serialize)]
struct InlineData<'a> {
    #[serde(rename = "mimeType")]
    mime_type: &'a str,
    data: String,
}

#[derive(Serialize)]
struct GenerationConfig<'a> {
    #[serde(rename = "responseMimeType")]
    response_mime_type: &'a str,
}

#[derive(Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

#[derive(Serialize)]
struct PredictRequest<'a> {
    instances: Vec<PredictInstance<'a>>,
    parameters: PredictParameters,
}

#[derive(Serialize)]
struct PredictInstance<'a> {
    prompt: &'a str,
}

#[derive(Serialize)]
struct PredictParameters {
    #[serde(rename = "sampleCount")]
    sample_count: u32,
}

#[derive(Deserialize)]
struct PredictResponse {
    #[serde(default)]
    predictions: Vec<Prediction>,
}

#[derive(Deserialize)]
struct Prediction {
    #[serde(rename = "bytesBase64Encoded")]
    bytes_base64_encoded: Option<String>,
    #[serde(rename = "mimeType")]
    mime_type: Option<String>,
}

/// Shape the model is instructed to return inside the response text
#[derive(Deserialize)]
struct DraftPayload {
    title: String,
    lyrics: LyricsField,
    #[serde(rename = "musicDescription")]
    music_description: RawStyle,
    #[serde(rename = "imagePrompt")]
    image_prompt: String,
}

/// Lyrics arrive either flat or as named sections in provider order
#[derive(Deserialize)]
#[serde(untagged)]
enum LyricsField {
    Text(String),
    Sections(serde_json::Map<String, serde_json::Value>),
}

#[derive(Deserialize)]
struct RawStyle {
    genre: String,
    mood: String,
    arrangement: String,
    vocals: String,
}

/// Validated draft fields before album art is attached
#[derive(Debug, Clone)]
pub struct ParsedDraft {
    pub title: String,
    pub lyrics: String,
    pub style: StyleDescription,
    pub image_prompt: String,
}

/// Client for the multimodal generation service
pub struct DraftGenerator {
    http: reqwest::Client,
    api_key: String,
    base_url: Url,
}

impl DraftGenerator {
    pub fn new(api_key: &str) -> Result<Self, DynError> {
        let http = reqwest::Client::builder().build()?;
        Ok(Self {
            http,
            api_key: api_key.to_string(),
            base_url: Url::parse(DEFAULT_BASE_URL)?,
        })
    }

    /// Point the client at a different service root (used by tests)
    pub fn with_base_url(mut self, base_url: Url) -> Self {
        self.base_url = base_url;
        self
    }

    /// Produce a complete draft from a captured audio artifact
    ///
    /// Fails as a whole: if the album art request fails, no partial draft is
    /// returned, and the captured audio remains usable for a retry.
    pub async fn generate(&self, audio: &CapturedAudio) -> Result<SongDraft, PipelineError> {
        let request = GenerateContentRequest {
            contents: vec![Content {
                parts: vec![
                    Part::Text {
                        text: SONGWRITER_INSTRUCTION,
                    },
                    Part::InlineData {
                        inline_data: InlineData {
                            mime_type: &audio.mime_type,
                            data: BASE64.encode(&audio.bytes),
                        },
                    },
                ],
            }],
            generation_config: GenerationConfig {
                response_mime_type: "application/json",
            },
        };

        let url = self.endpoint(&format!("models/{}:generateContent", TEXT_MODEL))?;
        debug!("requesting song draft ({} audio bytes)", audio.bytes.len());
        let response = self
            .http
            .post(url)
            .query(&[("key", self.api_key.as_str())])
            .json(&request)
            .send()
            .await
            .map_err(|e| PipelineError::GenerationFailed(format!("generation request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PipelineError::GenerationFailed(format!(
                "generation service returned HTTP {}: {}",
                status,
                payload_prefix(&body)
            )));
        }

        let body: GenerateContentResponse = response.json().await.map_err(|e| {
            PipelineError::GenerationFailed(format!("unreadable generation response: {}", e))
        })?;
        let text = body
            .candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .and_then(|c| c.parts.first())
            .and_then(|p| p.text.clone())
            .ok_or_else(|| {
                PipelineError::GenerationFailed("empty response from generation service".to_string())
            })?;

        let parsed = parse_draft_payload(&text)?;
        let album_art_url = self.generate_album_art(&parsed).await?;

        Ok(SongDraft {
            title: parsed.title,
            lyrics: parsed.lyrics,
            style: parsed.style,
            album_art_url,
        })
    }

    async fn generate_album_art(&self, draft: &ParsedDraft) -> Result<String, PipelineError> {
        let prompt = format!(
            "Album art for a song titled \"{}\". Cinematic, high-resolution, photorealistic. Style: {}. Mood: {}. {}",
            draft.title, draft.style.genre, draft.style.mood, draft.image_prompt
        );
        let request = PredictRequest {
            instances: vec![PredictInstance { prompt: &prompt }],
            parameters: PredictParameters { sample_count: 1 },
        };

        let url = self.endpoint(&format!("models/{}:predict", IMAGE_MODEL))?;
        let response = self
            .http
            .post(url)
            .query(&[("key", self.api_key.as_str())])
            .json(&request)
            .send()
            .await
            .map_err(|e| PipelineError::GenerationFailed(format!("album art request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PipelineError::GenerationFailed(format!(
                "album art service returned HTTP {}: {}",
                status,
                payload_prefix(&body)
            )));
        }

        let body: PredictResponse = response.json().await.map_err(|e| {
            PipelineError::GenerationFailed(format!("unreadable album art response: {}", e))
        })?;
        let prediction = body.predictions.into_iter().next().ok_or_else(|| {
            PipelineError::GenerationFailed("no album art returned".to_string())
        })?;
        let data = prediction.bytes_base64_encoded.filter(|d| !d.is_empty()).ok_or_else(|| {
            PipelineError::GenerationFailed("album art response carried no image data".to_string())
        })?;
        let mime_type = prediction.mime_type.unwrap_or_else(|| "image/jpeg".to_string());

        Ok(format!("data:{};base64,{}", mime_type, data))
    }

    fn endpoint(&self, path: &str) -> Result<Url, PipelineError> {
        self.base_url.join(path).map_err(|e| {
            PipelineError::GenerationFailed(format!("invalid service endpoint '{}': {}", path, e))
        })
    }
}

/// Parse and validate the model's response text into draft fields
///
/// Fence markers are stripped first; an initial parse failure gets one
/// bounded repair pass before failing permanently with the payload prefix.
pub fn parse_draft_payload(text: &str) -> Result<ParsedDraft, PipelineError> {
    let stripped = strip_code_fence(text);

    let payload: DraftPayload = match serde_json::from_str(stripped) {
        Ok(payload) => payload,
        Err(first_err) => {
            warn!("draft payload failed to parse ({}), attempting repair", first_err);
            let repaired = repair_payload(stripped);
            serde_json::from_str(&repaired).map_err(|_| {
                PipelineError::GenerationFailed(format!(
                    "response could not be parsed as a draft ({}): {}",
                    first_err,
                    payload_prefix(stripped)
                ))
            })?
        }
    };

    if payload.title.trim().is_empty() {
        return Err(PipelineError::GenerationFailed(
            "response is missing a title".to_string(),
        ));
    }

    let style = validate_style(&payload.music_description)?;
    let lyrics = flatten_lyrics(payload.lyrics)?;

    if payload.image_prompt.trim().is_empty() {
        return Err(PipelineError::GenerationFailed(
            "response is missing an image prompt".to_string(),
        ));
    }

    Ok(ParsedDraft {
        title: payload.title,
        lyrics,
        style,
        image_prompt: payload.image_prompt,
    })
}

/// Remove surrounding markdown code fences, tolerating a language tag
pub fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    if !trimmed.starts_with("```") {
        return trimmed;
    }
    let after_open = match trimmed.find('\n') {
        Some(idx) => &trimmed[idx + 1..],
        None => return trimmed,
    };
    match after_open.rfind("```") {
        Some(idx) => after_open[..idx].trim(),
        None => trimmed,
    }
}

/// One bounded normalization pass over an unparseable payload: undo
/// over-escaped quotes and re-escape raw control characters inside strings.
pub fn repair_payload(raw: &str) -> String {
    raw.replace("\\'", "'")
        .replace('\n', "\\n")
        .replace('\r', "\\r")
        .replace('\t', "\\t")
}

fn validate_style(raw: &RawStyle) -> Result<StyleDescription, PipelineError> {
    let genre = Genre::from_label(&raw.genre).ok_or_else(|| style_error("genre", &raw.genre))?;
    let mood = Mood::from_label(&raw.mood).ok_or_else(|| style_error("mood", &raw.mood))?;
    let arrangement = Arrangement::from_label(&raw.arrangement)
        .ok_or_else(|| style_error("arrangement", &raw.arrangement))?;
    let vocals =
        Vocals::from_label(&raw.vocals).ok_or_else(|| style_error("vocals", &raw.vocals))?;
    Ok(StyleDescription {
        genre,
        mood,
        arrangement,
        vocals,
    })
}

fn style_error(field: &str, value: &str) -> PipelineError {
    PipelineError::GenerationFailed(format!(
        "style field '{}' has a value outside its option set: '{}'",
        field, value
    ))
}

/// Collapse sectioned lyrics into one text, one `[Section]` header line per
/// segment, preserving provider order
fn flatten_lyrics(field: LyricsField) -> Result<String, PipelineError> {
    match field {
        LyricsField::Text(text) => {
            if text.trim().is_empty() {
                return Err(PipelineError::GenerationFailed(
                    "response contained empty lyrics".to_string(),
                ));
            }
            Ok(text)
        }
        LyricsField::Sections(sections) => {
            if sections.is_empty() {
                return Err(PipelineError::GenerationFailed(
                    "response contained no lyric sections".to_string(),
                ));
            }
            let blocks: Vec<String> = sections
                .iter()
                .map(|(section, text)| {
                    let body = match text {
                        serde_json::Value::String(s) => s.clone(),
                        other => other.to_string(),
                    };
                    format!("[{}]\n{}", section, body)
                })
                .collect();
            Ok(blocks.join("\n\n"))
        }
    }
}

fn payload_prefix(payload: &str) -> String {
    let prefix: String = payload.chars().take(ERROR_PAYLOAD_PREFIX_CHARS).collect();
    if payload.chars().count() > ERROR_PAYLOAD_PREFIX_CHARS {
        format!("{}...", prefix)
    } else {
        prefix
    }
}
