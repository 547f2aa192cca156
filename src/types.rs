use std::fmt;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Genre options the generation service is allowed to return
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Genre {
    Pop,
    Rock,
    #[serde(rename = "Hip Hop")]
    HipHop,
    Electronic,
    #[serde(rename = "Folk / Country")]
    FolkCountry,
    #[serde(rename = "R&B / Soul")]
    RnbSoul,
    Jazz,
    Orchestral,
}

impl Genre {
    pub const OPTIONS: [Genre; 8] = [
        Genre::Pop,
        Genre::Rock,
        Genre::HipHop,
        Genre::Electronic,
        Genre::FolkCountry,
        Genre::RnbSoul,
        Genre::Jazz,
        Genre::Orchestral,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Genre::Pop => "Pop",
            Genre::Rock => "Rock",
            Genre::HipHop => "Hip Hop",
            Genre::Electronic => "Electronic",
            Genre::FolkCountry => "Folk / Country",
            Genre::RnbSoul => "R&B / Soul",
            Genre::Jazz => "Jazz",
            Genre::Orchestral => "Orchestral",
        }
    }

    pub fn from_label(label: &str) -> Option<Genre> {
        Self::OPTIONS.iter().copied().find(|g| g.as_str() == label)
    }

    /// Expanded tag fragment used when shaping render prompts
    pub fn prompt_tags(&self) -> &'static str {
        match self {
            Genre::Pop => "pop, catchy, mainstream, upbeat",
            Genre::Rock => "rock, guitar, drums, powerful",
            Genre::HipHop => "hip-hop, rap, beats, urban",
            Genre::Electronic => "electronic, synthesizer, digital, modern",
            Genre::FolkCountry => "folk, country, acoustic, traditional",
            Genre::RnbSoul => "r&b, soul, smooth, rhythm",
            Genre::Jazz => "jazz, improvisation, saxophone, smooth",
            Genre::Orchestral => "orchestral, classical, symphony, grand",
        }
    }
}

impl fmt::Display for Genre {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Mood options the generation service is allowed to return
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Mood {
    Happy,
    Sad,
    Energetic,
    Relaxing,
    Romantic,
    Epic,
    Nostalgic,
    Sentimental,
}

impl Mood {
    pub const OPTIONS: [Mood; 8] = [
        Mood::Happy,
        Mood::Sad,
        Mood::Energetic,
        Mood::Relaxing,
        Mood::Romantic,
        Mood::Epic,
        Mood::Nostalgic,
        Mood::Sentimental,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Mood::Happy => "Happy",
            Mood::Sad => "Sad",
            Mood::Energetic => "Energetic",
            Mood::Relaxing => "Relaxing",
            Mood::Romantic => "Romantic",
            Mood::Epic => "Epic",
            Mood::Nostalgic => "Nostalgic",
            Mood::Sentimental => "Sentimental",
        }
    }

    pub fn from_label(label: &str) -> Option<Mood> {
        Self::OPTIONS.iter().copied().find(|m| m.as_str() == label)
    }

    /// Expanded tag fragment used when shaping render prompts
    pub fn prompt_tags(&self) -> &'static str {
        match self {
            Mood::Happy => "happy, uplifting, cheerful, bright",
            Mood::Sad => "sad, melancholic, emotional, slow",
            Mood::Energetic => "energetic, high-energy, fast, dynamic",
            Mood::Relaxing => "relaxing, calm, peaceful, soothing",
            Mood::Romantic => "romantic, love, intimate, tender",
            Mood::Epic => "epic, cinematic, grand, powerful",
            Mood::Nostalgic => "nostalgic, memories, wistful, reflective",
            Mood::Sentimental => "sentimental, touching, emotional, heartfelt",
        }
    }
}

impl fmt::Display for Mood {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Arrangement options the generation service is allowed to return
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Arrangement {
    #[serde(rename = "Full Band")]
    FullBand,
    Acoustic,
    Electronic,
    Orchestral,
    #[serde(rename = "Simple Acoustic")]
    SimpleAcoustic,
    #[serde(rename = "Synth & Drums")]
    SynthAndDrums,
}

impl Arrangement {
    pub const OPTIONS: [Arrangement; 6] = [
        Arrangement::FullBand,
        Arrangement::Acoustic,
        Arrangement::Electronic,
        Arrangement::Orchestral,
        Arrangement::SimpleAcoustic,
        Arrangement::SynthAndDrums,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Arrangement::FullBand => "Full Band",
            Arrangement::Acoustic => "Acoustic",
            Arrangement::Electronic => "Electronic",
            Arrangement::Orchestral => "Orchestral",
            Arrangement::SimpleAcoustic => "Simple Acoustic",
            Arrangement::SynthAndDrums => "Synth & Drums",
        }
    }

    pub fn from_label(label: &str) -> Option<Arrangement> {
        Self::OPTIONS.iter().copied().find(|a| a.as_str() == label)
    }
}

impl fmt::Display for Arrangement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Vocal style options the generation service is allowed to return
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Vocals {
    Male,
    Female,
}

impl Vocals {
    pub const OPTIONS: [Vocals; 2] = [Vocals::Male, Vocals::Female];

    pub fn as_str(&self) -> &'static str {
        match self {
            Vocals::Male => "Male",
            Vocals::Female => "Female",
        }
    }

    pub fn from_label(label: &str) -> Option<Vocals> {
        Self::OPTIONS.iter().copied().find(|v| v.as_str() == label)
    }
}

impl fmt::Display for Vocals {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured style description attached to every draft and saved song
///
/// Immutable once produced by the generator; the user may replace whole
/// fields before rendering, but every value stays inside its option set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StyleDescription {
    pub genre: Genre,
    pub mood: Mood,
    pub arrangement: Arrangement,
    pub vocals: Vocals,
}

impl StyleDescription {
    /// Free-text tag string submitted to the render provider
    pub fn prompt_tags(&self) -> String {
        format!(
            "{}, {}, {}, {} vocals",
            self.genre.prompt_tags(),
            self.mood.prompt_tags(),
            self.arrangement.as_str().to_lowercase(),
            self.vocals.as_str().to_lowercase()
        )
    }
}

impl fmt::Display for StyleDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} / {} / {} / {} vocals",
            self.genre, self.mood, self.arrangement, self.vocals
        )
    }
}

/// Finalized capture artifact handed from the recorder to the generator
#[derive(Debug, Clone)]
pub struct CapturedAudio {
    /// Complete WAV container
    pub bytes: Bytes,
    pub mime_type: String,
    pub duration_seconds: f64,
}

/// Draft produced by the generator, editable before rendering
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SongDraft {
    pub title: String,
    pub lyrics: String,
    pub style: StyleDescription,
    /// data: URL holding the generated cover art
    pub album_art_url: String,
}

/// Status of an asynchronous render job
///
/// Terminal statuses never transition again; see [`RenderJob::advance`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Created,
    Processing,
    Succeeded,
    Failed,
    Canceled,
    TimedOut,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, JobStatus::Created | JobStatus::Processing)
    }
}

/// A render job tracked by polling the provider's status endpoint
#[derive(Debug, Clone)]
pub struct RenderJob {
    /// Provider-assigned prediction id
    pub id: String,
    pub status: JobStatus,
    /// Absolute status URL returned at creation
    pub poll_url: String,
    /// Output asset URL, present once the job succeeds
    pub output_url: Option<String>,
    /// Provider error message, present once the job fails
    pub error_detail: Option<String>,
}

impl RenderJob {
    /// Move the status forward. Terminal states are sticky: once reached, any
    /// further observation is ignored rather than rewound.
    pub fn advance(&mut self, next: JobStatus) {
        if self.status.is_terminal() {
            return;
        }
        self.status = next;
    }
}

/// A completed song ready to be persisted
#[derive(Debug, Clone)]
pub struct NewSong {
    pub title: String,
    pub lyrics: String,
    pub style: StyleDescription,
    pub album_art_url: String,
    pub audio: Option<Vec<u8>>,
}

/// A song row owned by the repository
#[derive(Debug, Clone)]
pub struct SavedSong {
    pub id: i64,
    pub title: String,
    pub lyrics: String,
    pub style: StyleDescription,
    pub album_art_url: String,
    pub audio: Option<Vec<u8>>,
    pub created_at: DateTime<Utc>,
}
