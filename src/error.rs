use std::time::Duration;

/// Boxed error type used at the CLI boundary
pub type DynError = Box<dyn std::error::Error + Send + Sync>;

/// Failure taxonomy for the recording-to-song pipeline
///
/// Every external-call failure is caught at the pipeline boundary and carried
/// here with the provider detail included, so the caller can show an
/// actionable message and retry manually from unchanged inputs. No variant
/// triggers an automatic retry.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// The audio input device could not be acquired or produced no audio
    #[error("audio device unavailable: {0}")]
    DeviceUnavailable(String),

    /// A recorder operation was invoked from a state that does not allow it
    #[error("cannot {action} while recorder is {from}")]
    InvalidStateTransition {
        from: &'static str,
        action: &'static str,
    },

    /// The generation service errored, returned malformed structure, or
    /// returned a style value outside its option set
    #[error("song generation failed: {0}")]
    GenerationFailed(String),

    /// The render job failed, or the job succeeded but its output could not
    /// be retrieved
    #[error("music render failed: {0}")]
    RenderFailed(String),

    /// The render job never reached a terminal state within the polling budget
    #[error("music render timed out after {} seconds", budget.as_secs())]
    RenderTimedOut { budget: Duration },

    /// Polling was canceled locally; the remote job is abandoned, not canceled
    #[error("music render canceled")]
    RenderCanceled,

    #[error("persistence failed: {0}")]
    PersistenceFailed(#[from] sqlx::Error),

    #[error("song {0} not found")]
    NotFound(i64),
}

impl PipelineError {
    /// Map a corrupt stored value to a persistence failure, keeping the cause
    pub fn corrupt_row(cause: serde_json::Error) -> Self {
        PipelineError::PersistenceFailed(sqlx::Error::Decode(Box::new(cause)))
    }
}
