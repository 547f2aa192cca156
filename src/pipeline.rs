use std::sync::Mutex;

use log::{info, warn};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::draft::DraftGenerator;
use crate::error::PipelineError;
use crate::render::{RenderClient, RenderRequest};
use crate::repo::SongRepository;
use crate::types::{CapturedAudio, NewSong, SavedSong, SongDraft};

/// View-model surface for a presentation layer: where the pipeline currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelinePhase {
    Idle,
    Drafting,
    Rendering,
    Saving,
    Complete,
}

/// Sequential composition of draft generation, rendering, and persistence
///
/// One logical flow per instance: no stage starts before the previous result
/// is available, and starting a new render invalidates any prior in-flight
/// job by canceling its polling (the remote job keeps running; its result is
/// discarded locally).
pub struct SongPipeline {
    drafts: DraftGenerator,
    renderer: RenderClient,
    repo: SongRepository,
    active_render: Mutex<Option<CancellationToken>>,
    phase_tx: watch::Sender<PipelinePhase>,
    phase_rx: watch::Receiver<PipelinePhase>,
}

impl SongPipeline {
    pub fn new(drafts: DraftGenerator, renderer: RenderClient, repo: SongRepository) -> Self {
        let (phase_tx, phase_rx) = watch::channel(PipelinePhase::Idle);
        Self {
            drafts,
            renderer,
            repo,
            active_render: Mutex::new(None),
            phase_tx,
            phase_rx,
        }
    }

    /// Observe phase transitions (the presentation layer subscribes here)
    pub fn phase(&self) -> watch::Receiver<PipelinePhase> {
        self.phase_rx.clone()
    }

    pub fn repository(&self) -> &SongRepository {
        &self.repo
    }

    /// Produce an editable draft from a finished recording
    ///
    /// A failure leaves no draft behind; the captured audio is untouched and
    /// can be submitted again.
    pub async fn generate_draft(
        &self,
        audio: &CapturedAudio,
    ) -> Result<SongDraft, PipelineError> {
        self.set_phase(PipelinePhase::Drafting);
        let result = self.drafts.generate(audio).await;
        if result.is_err() {
            self.set_phase(PipelinePhase::Idle);
        }
        result
    }

    /// Render the (possibly user-edited) draft and persist the finished song
    ///
    /// Returns the saved song. On any failure nothing is persisted and the
    /// draft remains valid for a retry with unchanged inputs.
    pub async fn render_and_save(
        &self,
        draft: &SongDraft,
        request: &RenderRequest,
    ) -> Result<SavedSong, PipelineError> {
        let cancel = self.begin_render();

        self.set_phase(PipelinePhase::Rendering);
        let rendered = match self.renderer.render(request, &cancel).await {
            Ok(rendered) => rendered,
            Err(e) => {
                self.set_phase(PipelinePhase::Idle);
                return Err(e);
            }
        };

        // A song row only ever comes from a succeeded render with real bytes;
        // fetch_output already rejects empty assets.
        self.set_phase(PipelinePhase::Saving);
        let song = NewSong {
            title: draft.title.clone(),
            lyrics: draft.lyrics.clone(),
            style: draft.style,
            album_art_url: draft.album_art_url.clone(),
            audio: Some(rendered.bytes.to_vec()),
        };
        let id = match self.repo.save(&song).await {
            Ok(id) => id,
            Err(e) => {
                self.set_phase(PipelinePhase::Idle);
                return Err(e);
            }
        };

        let saved = self
            .repo
            .get_by_id(id)
            .await?
            .ok_or(PipelineError::NotFound(id))?;
        info!("song {} saved ('{}')", saved.id, saved.title);
        self.set_phase(PipelinePhase::Complete);
        Ok(saved)
    }

    /// Cancel any in-flight render polling; used by the UI-level reset action
    pub fn reset(&self) {
        if let Some(token) = self.take_active_render() {
            warn!("abandoning in-flight render job");
            token.cancel();
        }
        self.set_phase(PipelinePhase::Idle);
    }

    /// Replace the active render token, canceling the previous one so only a
    /// single job per flow is ever polled
    fn begin_render(&self) -> CancellationToken {
        let token = CancellationToken::new();
        let previous = {
            let mut active = self
                .active_render
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            active.replace(token.clone())
        };
        if let Some(previous) = previous {
            warn!("replacing in-flight render job; prior result will be discarded");
            previous.cancel();
        }
        token
    }

    fn take_active_render(&self) -> Option<CancellationToken> {
        self.active_render
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
    }

    fn set_phase(&self, phase: PipelinePhase) {
        let _ = self.phase_tx.send(phase);
    }
}
