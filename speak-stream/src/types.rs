//! Core types shared by the pipeline stages.
//!
//! - Chunks and jobs: [`TextChunk`], [`SynthesisJob`], [`JobStatus`]
//! - Resource handles: [`SessionId`], [`OutputLocation`], [`AudioArtifact`]
//! - Delivery and results: [`ChunkDelivery`], [`SessionReport`], [`SessionOutcome`]

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::errors::{StreamError, SynthesisError};

// ============================================================================
// Text Chunk
// ============================================================================

/// An ordered, immutable unit of text to be synthesized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextChunk {
    index: usize,
    content: String,
}

impl TextChunk {
    pub(crate) fn new(index: usize, content: String) -> Self {
        Self { index, content }
    }

    /// Position of this chunk in the stream (dense, 0-based).
    pub fn index(&self) -> usize {
        self.index
    }

    /// The text to speak, exactly as it appeared in the source.
    pub fn content(&self) -> &str {
        &self.content
    }

    /// UTF-8 byte length of the content.
    pub fn byte_length(&self) -> usize {
        self.content.len()
    }

    /// Character count of the content (what the size limit is measured in).
    pub fn char_length(&self) -> usize {
        self.content.chars().count()
    }
}

// ============================================================================
// Session and resource handles
// ============================================================================

static SESSION_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Identifier of one streaming session.
///
/// Generated ids are timestamped and carry a process-wide counter so that two
/// sessions started within the same microsecond still differ.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Create a session id from an existing string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a fresh, unique session id.
    pub fn generate() -> Self {
        let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S_%f");
        let n = SESSION_COUNTER.fetch_add(1, Ordering::Relaxed);
        Self(format!("session_{stamp}_{n}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque handle for where a chunk's audio should be written.
///
/// Handed out by a [`ResourceTracker`](crate::traits::ResourceTracker) and
/// passed unchanged to the synthesizer.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OutputLocation(PathBuf);

impl OutputLocation {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self(path.into())
    }

    pub fn path(&self) -> &Path {
        &self.0
    }
}

impl fmt::Display for OutputLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.display())
    }
}

// ============================================================================
// Audio
// ============================================================================

/// Audio container produced by a synthesizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioFormat {
    #[default]
    Wav,
    Mp3,
}

impl AudioFormat {
    /// File extension without the leading dot.
    pub fn extension(&self) -> &'static str {
        match self {
            AudioFormat::Wav => "wav",
            AudioFormat::Mp3 => "mp3",
        }
    }

    /// MIME type for network consumers.
    pub fn mime_type(&self) -> &'static str {
        match self {
            AudioFormat::Wav => "audio/wav",
            AudioFormat::Mp3 => "audio/mpeg",
        }
    }
}

/// Reference to a finished piece of audio.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioArtifact {
    pub location: OutputLocation,
    pub format: AudioFormat,
    /// Size of the audio file in bytes.
    pub bytes: u64,
}

// ============================================================================
// Synthesis Job
// ============================================================================

/// Lifecycle state of a [`SynthesisJob`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    InFlight,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

/// The unit of work submitted to the synthesis collaborator, one per chunk.
#[derive(Debug, Clone)]
pub struct SynthesisJob {
    index: usize,
    content: String,
    location: Option<OutputLocation>,
    status: JobStatus,
}

impl SynthesisJob {
    pub(crate) fn for_chunk(chunk: &TextChunk) -> Self {
        Self {
            index: chunk.index(),
            content: chunk.content().to_string(),
            location: None,
            status: JobStatus::Pending,
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    /// The allocated output location, if allocation succeeded.
    pub fn location(&self) -> Option<&OutputLocation> {
        self.location.as_ref()
    }

    pub fn status(&self) -> JobStatus {
        self.status
    }

    pub(crate) fn submit(&mut self, location: OutputLocation) {
        debug_assert_eq!(self.status, JobStatus::Pending);
        self.location = Some(location);
        self.status = JobStatus::InFlight;
    }

    pub(crate) fn finish<T, E>(&mut self, result: &Result<T, E>) {
        if self.status.is_terminal() {
            return;
        }
        self.status = match result {
            Ok(_) => JobStatus::Completed,
            Err(_) => JobStatus::Failed,
        };
    }
}

// ============================================================================
// Delivery
// ============================================================================

/// One in-order delivery handed to a [`StreamConsumer`](crate::traits::StreamConsumer).
///
/// Failed chunks are delivered too, in their sequence position, so the
/// consumer can render an explicit failure marker.
#[derive(Debug)]
pub struct ChunkDelivery {
    pub index: usize,
    pub text: String,
    pub result: Result<AudioArtifact, SynthesisError>,
}

impl ChunkDelivery {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }

    pub fn artifact(&self) -> Option<&AudioArtifact> {
        self.result.as_ref().ok()
    }
}

/// A chunk that failed, as recorded in the session report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChunkFailure {
    pub index: usize,
    pub message: String,
}

/// Summary of a finished (or cancelled) session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionReport {
    pub session_id: SessionId,
    pub chunk_count: usize,
    /// Number of chunks handed to the consumer (successes and failures).
    pub delivered: usize,
    pub failures: Vec<ChunkFailure>,
}

impl SessionReport {
    pub(crate) fn new(session_id: SessionId, chunk_count: usize) -> Self {
        Self {
            session_id,
            chunk_count,
            delivered: 0,
            failures: Vec::new(),
        }
    }

    pub fn successful_count(&self) -> usize {
        self.delivered - self.failures.len()
    }

    pub fn failed_count(&self) -> usize {
        self.failures.len()
    }

    /// `true` when every chunk was delivered and none failed.
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty() && self.delivered == self.chunk_count
    }
}

/// The single terminal outcome of a session.
#[derive(Debug)]
pub enum SessionOutcome {
    /// Every chunk synthesized and delivered.
    Completed(SessionReport),
    /// The stream drained but at least one chunk failed.
    CompletedWithErrors(SessionReport),
    /// A fatal error ended the session.
    Failed(StreamError),
    /// The caller cancelled the session.
    Cancelled(SessionReport),
}

impl SessionOutcome {
    /// `true` only for a fully successful session.
    pub fn is_success(&self) -> bool {
        matches!(self, SessionOutcome::Completed(_))
    }

    pub fn report(&self) -> Option<&SessionReport> {
        match self {
            SessionOutcome::Completed(r)
            | SessionOutcome::CompletedWithErrors(r)
            | SessionOutcome::Cancelled(r) => Some(r),
            SessionOutcome::Failed(_) => None,
        }
    }

    /// Short label used in logs and by the CLI.
    pub fn label(&self) -> &'static str {
        match self {
            SessionOutcome::Completed(_) => "completed",
            SessionOutcome::CompletedWithErrors(_) => "completed with errors",
            SessionOutcome::Failed(_) => "failed",
            SessionOutcome::Cancelled(_) => "cancelled",
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
