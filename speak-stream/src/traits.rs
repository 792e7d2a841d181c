//! Collaborator traits for the streaming pipeline.
//!
//! The core only talks to the outside world through these four seams:
//! [`Translator`], [`Synthesizer`], [`ResourceTracker`] and
//! [`StreamConsumer`]. Async methods use native async functions in traits;
//! the returned futures must be `Send` so jobs can run on spawned tasks.

use std::future::Future;

use crate::errors::{ConsumerError, ResourceError, StreamError, SynthesisError, TranslationError};
use crate::types::{AudioArtifact, ChunkDelivery, OutputLocation, SessionId, SessionReport};

/// Translates text into a target language.
///
/// Implementations may batch long text internally; the orchestrator always
/// passes the full source text.
pub trait Translator: Send + Sync {
    fn translate(
        &self,
        text: &str,
        target_language: &str,
    ) -> impl Future<Output = Result<String, TranslationError>> + Send;
}

/// Converts one piece of text into an audio file.
///
/// ## Examples
///
/// ```ignore
/// use speak_stream::{AudioArtifact, AudioFormat, OutputLocation, SynthesisError, Synthesizer};
///
/// struct Silent;
///
/// impl Synthesizer for Silent {
///     async fn synthesize(
///         &self,
///         _text: &str,
///         _voice: Option<&str>,
///         location: &OutputLocation,
///     ) -> Result<AudioArtifact, SynthesisError> {
///         tokio::fs::write(location.path(), b"").await?;
///         Ok(AudioArtifact { location: location.clone(), format: AudioFormat::Wav, bytes: 0 })
///     }
/// }
/// ```
pub trait Synthesizer: Send + Sync {
    /// Synthesize `text` into `location`.
    ///
    /// `voice` is an opaque selector; `None` lets the provider pick its default.
    fn synthesize(
        &self,
        text: &str,
        voice: Option<&str>,
        location: &OutputLocation,
    ) -> impl Future<Output = Result<AudioArtifact, SynthesisError>> + Send;
}

/// Hands out per-chunk output locations and cleans them up.
///
/// Called concurrently from in-flight jobs, so implementations synchronise
/// their own bookkeeping.
pub trait ResourceTracker: Send + Sync {
    fn allocate(&self, session: &SessionId, index: usize) -> Result<OutputLocation, ResourceError>;

    /// Forget a location and delete whatever was written there.
    fn release(&self, location: &OutputLocation);

    /// Remove everything belonging to a session. Returns how many tracked
    /// locations were dropped.
    fn cleanup_session(&self, session: &SessionId) -> Result<usize, ResourceError>;
}

/// Receives the session's output, one surface per implementation.
///
/// Exactly one of [`on_session_complete`](StreamConsumer::on_session_complete),
/// [`on_session_failed`](StreamConsumer::on_session_failed) or
/// [`on_session_cancelled`](StreamConsumer::on_session_cancelled) is called
/// per session.
pub trait StreamConsumer: Send {
    /// Called once chunks are known, before any delivery.
    fn on_session_started(
        &mut self,
        _session: &SessionId,
        _chunk_count: usize,
    ) -> impl Future<Output = Result<(), ConsumerError>> + Send {
        async { Ok(()) }
    }

    /// Called once per chunk, in strictly ascending index order.
    fn on_chunk_ready(
        &mut self,
        delivery: ChunkDelivery,
    ) -> impl Future<Output = Result<(), ConsumerError>> + Send;

    /// The stream drained. Check [`SessionReport::is_clean`] for partial failures.
    fn on_session_complete(&mut self, report: &SessionReport) -> impl Future<Output = ()> + Send;

    fn on_session_failed(&mut self, error: &StreamError) -> impl Future<Output = ()> + Send;

    fn on_session_cancelled(&mut self, _report: &SessionReport) -> impl Future<Output = ()> + Send {
        async {}
    }
}

/// Used when no translation provider is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoTranslator;

impl Translator for NoTranslator {
    async fn translate(&self, _text: &str, target_language: &str) -> Result<String, TranslationError> {
        Err(TranslationError::Unavailable {
            target_language: target_language.to_string(),
        })
    }
}

// ============================================================================
// Tests
// ============================================================================
