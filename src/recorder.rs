use std::io::Cursor;
use std::path::PathBuf;

use crossbeam_channel::{unbounded, Receiver};
use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use log::{debug, warn};
use uuid::Uuid;

use crate::error::PipelineError;
use crate::types::CapturedAudio;

/// Samples per chunk delivered over the capture channel
const CHUNK_SAMPLES: usize = 4096;

/// Recorder lifecycle state
///
/// Idle -> Recording -> {Paused <-> Recording} -> Stopped; any state moves to
/// Failed on a device error and back to Idle on discard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecorderState {
    Idle,
    Recording,
    Paused,
    Stopped,
    Failed,
}

impl RecorderState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecorderState::Idle => "idle",
            RecorderState::Recording => "recording",
            RecorderState::Paused => "paused",
            RecorderState::Stopped => "stopped",
            RecorderState::Failed => "failed",
        }
    }
}

/// PCM format of an acquired capture stream
#[derive(Debug, Clone, Copy)]
pub struct CaptureSpec {
    pub sample_rate: u32,
    pub channels: u16,
}

/// Chunked 16-bit PCM delivery from an acquired device
pub struct CaptureStream {
    pub spec: CaptureSpec,
    pub chunks: Receiver<Vec<i16>>,
}

/// Audio input device abstraction
///
/// The session owns the device for the duration of a recording and releases
/// it on stop, discard, or failure. `release` must be idempotent.
pub trait CaptureDevice: Send {
    fn acquire(&mut self) -> Result<CaptureStream, String>;
    fn set_paused(&mut self, paused: bool);
    fn release(&mut self);
}

/// Recording session state machine
///
/// Every operation validates the current state and returns
/// `InvalidStateTransition` instead of mutating anything when invoked out of
/// order. The only observable side effects are device acquisition/release and
/// the finalized WAV buffer exposed by `stop`.
pub struct RecordingSession {
    id: Uuid,
    state: RecorderState,
    device: Box<dyn CaptureDevice>,
    stream: Option<CaptureStream>,
    spec: Option<CaptureSpec>,
    samples: Vec<i16>,
}

impl RecordingSession {
    pub fn new(device: Box<dyn CaptureDevice>) -> Self {
        Self {
            id: Uuid::new_v4(),
            state: RecorderState::Idle,
            device,
            stream: None,
            spec: None,
            samples: Vec::new(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> RecorderState {
        self.state
    }

    /// Elapsed capture time derived from the drained sample count
    pub fn elapsed_seconds(&self) -> f64 {
        match self.spec {
            Some(spec) => {
                self.samples.len() as f64 / (spec.sample_rate as f64 * spec.channels as f64)
            }
            None => 0.0,
        }
    }

    /// Acquire the device and begin capturing
    ///
    /// Valid from Idle, or from Stopped once the previous buffer has been
    /// handed off; starting over a Stopped session discards its buffer.
    pub fn start(&mut self) -> Result<(), PipelineError> {
        match self.state {
            RecorderState::Idle | RecorderState::Stopped => {}
            _ => {
                return Err(PipelineError::InvalidStateTransition {
                    from: self.state.as_str(),
                    action: "start",
                })
            }
        }
        self.samples.clear();
        match self.device.acquire() {
            Ok(stream) => {
                debug!("recording session {} started", self.id);
                self.spec = Some(stream.spec);
                self.stream = Some(stream);
                self.state = RecorderState::Recording;
                Ok(())
            }
            Err(e) => {
                warn!("recording session {} failed to acquire device: {}", self.id, e);
                self.state = RecorderState::Failed;
                Err(PipelineError::DeviceUnavailable(e))
            }
        }
    }

    /// Suspend capture. Valid only while Recording.
    pub fn pause(&mut self) -> Result<(), PipelineError> {
        if self.state != RecorderState::Recording {
            return Err(PipelineError::InvalidStateTransition {
                from: self.state.as_str(),
                action: "pause",
            });
        }
        self.drain();
        self.device.set_paused(true);
        self.state = RecorderState::Paused;
        Ok(())
    }

    /// Resume capture. Valid only while Paused.
    pub fn resume(&mut self) -> Result<(), PipelineError> {
        if self.state != RecorderState::Paused {
            return Err(PipelineError::InvalidStateTransition {
                from: self.state.as_str(),
                action: "resume",
            });
        }
        self.device.set_paused(false);
        self.state = RecorderState::Recording;
        Ok(())
    }

    /// Finalize the captured buffer and release the device
    ///
    /// Valid from Recording or Paused. An empty capture is a device failure,
    /// not a valid artifact.
    pub fn stop(&mut self) -> Result<CapturedAudio, PipelineError> {
        match self.state {
            RecorderState::Recording | RecorderState::Paused => {}
            _ => {
                return Err(PipelineError::InvalidStateTransition {
                    from: self.state.as_str(),
                    action: "stop",
                })
            }
        }
        self.drain();
        self.device.release();
        self.stream = None;

        let spec = match self.spec {
            Some(spec) => spec,
            None => {
                self.state = RecorderState::Failed;
                return Err(PipelineError::DeviceUnavailable(
                    "capture stream was never established".to_string(),
                ));
            }
        };
        if self.samples.is_empty() {
            self.state = RecorderState::Failed;
            return Err(PipelineError::DeviceUnavailable(
                "capture produced no audio".to_string(),
            ));
        }

        let duration_seconds = self.elapsed_seconds();
        let bytes = encode_wav(&self.samples, spec).map_err(|e| {
            self.state = RecorderState::Failed;
            PipelineError::DeviceUnavailable(format!("failed to finalize WAV buffer: {}", e))
        })?;

        debug!(
            "recording session {} stopped: {:.1}s, {} bytes",
            self.id,
            duration_seconds,
            bytes.len()
        );
        self.state = RecorderState::Stopped;
        Ok(CapturedAudio {
            bytes: bytes.into(),
            mime_type: "audio/wav".to_string(),
            duration_seconds,
        })
    }

    /// Release the device and buffer and return to Idle. Valid from any state.
    pub fn discard(&mut self) {
        self.device.release();
        self.stream = None;
        self.spec = None;
        self.samples.clear();
        self.state = RecorderState::Idle;
    }

    fn drain(&mut self) {
        if let Some(stream) = &self.stream {
            while let Ok(chunk) = stream.chunks.try_recv() {
                self.samples.extend_from_slice(&chunk);
            }
        }
    }
}

/// Encode interleaved 16-bit PCM into a complete WAV container
fn encode_wav(samples: &[i16], spec: CaptureSpec) -> Result<Vec<u8>, hound::Error> {
    let wav_spec = WavSpec {
        channels: spec.channels,
        sample_rate: spec.sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };
    let mut cursor = Cursor::new(Vec::new());
    let mut writer = WavWriter::new(&mut cursor, wav_spec)?;
    for &sample in samples {
        writer.write_sample(sample)?;
    }
    writer.finalize()?;
    Ok(cursor.into_inner())
}

/// Capture device backed by a WAV file
///
/// Stands in for a live microphone in the headless CLI: the file's samples
/// are delivered in chunks exactly as a capture thread would deliver them.
pub struct WavFileDevice {
    path: PathBuf,
}

impl WavFileDevice {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl CaptureDevice for WavFileDevice {
    fn acquire(&mut self) -> Result<CaptureStream, String> {
        let mut reader = WavReader::open(&self.path)
            .map_err(|e| format!("cannot open input '{}': {}", self.path.display(), e))?;
        let wav_spec = reader.spec();

        let samples: Vec<i16> = match (wav_spec.sample_format, wav_spec.bits_per_sample) {
            (SampleFormat::Int, bits) if bits <= 16 => reader
                .samples::<i16>()
                .collect::<Result<_, _>>()
                .map_err(|e| format!("failed to read '{}': {}", self.path.display(), e))?,
            (SampleFormat::Float, 32) => reader
                .samples::<f32>()
                .map(|s| s.map(|v| (v.clamp(-1.0, 1.0) * i16::MAX as f32) as i16))
                .collect::<Result<_, _>>()
                .map_err(|e| format!("failed to read '{}': {}", self.path.display(), e))?,
            (format, bits) => {
                return Err(format!(
                    "unsupported WAV sample format in '{}': {:?}/{} bits",
                    self.path.display(),
                    format,
                    bits
                ))
            }
        };

        let (sender, receiver) = unbounded();
        for chunk in samples.chunks(CHUNK_SAMPLES) {
            // Receiver outlives this loop; a send failure just means the
            // session was dropped mid-acquire.
            if sender.send(chunk.to_vec()).is_err() {
                break;
            }
        }

        Ok(CaptureStream {
            spec: CaptureSpec {
                sample_rate: wav_spec.sample_rate,
                channels: wav_spec.channels,
            },
            chunks: receiver,
        })
    }

    fn set_paused(&mut self, _paused: bool) {}

    fn release(&mut self) {}
}
