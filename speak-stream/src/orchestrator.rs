//! End-to-end control of one streaming session.
//!
//! [`StreamOrchestrator::run`] translates (optionally), segments, dispatches
//! and delivers, then reports exactly one terminal outcome. It is the single
//! owner of the [`OrderedQueue`]; completions arrive from the dispatcher over a
//! channel and the consumer is awaited for every in-order release.

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::cancel::CancelToken;
use crate::dispatcher::{DEFAULT_CONCURRENCY, DispatchHandle, Dispatcher, JobCompletion};
use crate::errors::{SegmentationError, StreamError, SynthesisError};
use crate::ordered_queue::OrderedQueue;
use crate::segmenter::{Segmenter, SegmenterConfig};
use crate::traits::{NoTranslator, ResourceTracker, StreamConsumer, Synthesizer, Translator};
use crate::types::{
    ChunkDelivery, ChunkFailure, SessionId, SessionOutcome, SessionReport, SynthesisJob, TextChunk,
};

/// Input for one session.
#[derive(Debug, Clone, Default)]
pub struct StreamRequest {
    pub text: String,
    /// Translate the text into this language before segmenting.
    pub target_language: Option<String>,
    /// Opaque voice selector handed to the synthesizer.
    pub voice: Option<String>,
    /// Use this id instead of generating one.
    pub session_id: Option<SessionId>,
}

impl StreamRequest {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }

    #[must_use]
    pub fn with_target_language(mut self, language: impl Into<String>) -> Self {
        self.target_language = Some(language.into());
        self
    }

    #[must_use]
    pub fn with_voice(mut self, voice: impl Into<String>) -> Self {
        self.voice = Some(voice.into());
        self
    }

    #[must_use]
    pub fn with_session_id(mut self, session_id: SessionId) -> Self {
        self.session_id = Some(session_id);
        self
    }
}

/// Tuning shared by every session an orchestrator runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamOptions {
    pub segmenter: SegmenterConfig,
    /// Maximum synthesis jobs in flight.
    pub concurrency: usize,
}

impl Default for StreamOptions {
    fn default() -> Self {
        Self {
            segmenter: SegmenterConfig::default(),
            concurrency: DEFAULT_CONCURRENCY,
        }
    }
}

enum Ending {
    Drained,
    Cancelled,
    Failed(StreamError),
}

/// Drives sessions from raw text to in-order consumer callbacks.
///
/// ## Examples
///
/// ```ignore
/// let orchestrator = StreamOrchestrator::new(Arc::new(synth), Arc::new(tracker))
///     .with_options(StreamOptions { concurrency: 2, ..Default::default() });
/// let outcome = orchestrator
///     .run(StreamRequest::new("Hello. World!"), &mut consumer, &CancelToken::new())
///     .await;
/// assert!(outcome.is_success());
/// ```
pub struct StreamOrchestrator<S, R, T = NoTranslator> {
    synthesizer: Arc<S>,
    tracker: Arc<R>,
    translator: T,
    options: StreamOptions,
}

impl<S, R> StreamOrchestrator<S, R, NoTranslator> {
    pub fn new(synthesizer: Arc<S>, tracker: Arc<R>) -> Self {
        Self {
            synthesizer,
            tracker,
            translator: NoTranslator,
            options: StreamOptions::default(),
        }
    }
}

impl<S, R, T> StreamOrchestrator<S, R, T> {
    pub fn with_translator<U: Translator>(self, translator: U) -> StreamOrchestrator<S, R, U> {
        StreamOrchestrator {
            synthesizer: self.synthesizer,
            tracker: self.tracker,
            translator,
            options: self.options,
        }
    }

    #[must_use]
    pub fn with_options(mut self, options: StreamOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> &StreamOptions {
        &self.options
    }

    pub fn tracker(&self) -> &Arc<R> {
        &self.tracker
    }

    /// Segment `text` with the configured options without synthesizing anything.
    ///
    /// ## Errors
    ///
    /// Any [`SegmentationError`] the segmenter raises.
    pub fn plan(&self, text: &str) -> Result<Vec<TextChunk>, SegmentationError> {
        Segmenter::new(self.options.segmenter.clone())?.segment(text)
    }
}

impl<S, R, T> StreamOrchestrator<S, R, T>
where
    S: Synthesizer + 'static,
    R: ResourceTracker + 'static,
    T: Translator,
{
    /// Run one session to its terminal outcome.
    ///
    /// The consumer receives every chunk in ascending index order (failures
    /// included) followed by exactly one terminal callback. Cancelling
    /// `cancel` stops admission, waits for in-flight jobs, releases every
    /// location that was not delivered and ends the session as
    /// [`SessionOutcome::Cancelled`].
    pub async fn run<C: StreamConsumer>(
        &self,
        request: StreamRequest,
        consumer: &mut C,
        cancel: &CancelToken,
    ) -> SessionOutcome {
        let StreamRequest {
            text,
            target_language,
            voice,
            session_id,
        } = request;
        let session = session_id.unwrap_or_else(SessionId::generate);
        info!(
            session = %session,
            chars = text.chars().count(),
            target_language = target_language.as_deref(),
            "Starting stream session"
        );

        let text = match target_language {
            Some(language) => {
                let translated = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        return cancel_before_dispatch(session, 0, consumer).await;
                    }
                    translated = self.translator.translate(&text, &language) => translated,
                };
                match translated {
                    Ok(translated) => {
                        debug!(session = %session, language = %language, "Translation complete");
                        translated
                    }
                    Err(e) => return fail(&session, e.into(), consumer).await,
                }
            }
            None => text,
        };

        let chunks = match self.plan(&text) {
            Ok(chunks) => chunks,
            Err(e) => return fail(&session, e.into(), consumer).await,
        };
        let total = chunks.len();
        debug!(session = %session, chunks = total, "Text segmented");

        if cancel.is_cancelled() {
            return cancel_before_dispatch(session, total, consumer).await;
        }
        if let Err(e) = consumer.on_session_started(&session, total).await {
            return fail(&session, e.into(), consumer).await;
        }

        let mut report = SessionReport::new(session.clone(), total);
        let dispatcher = Dispatcher::new(
            Arc::clone(&self.synthesizer),
            Arc::clone(&self.tracker),
            self.options.concurrency,
        );
        let mut handle = dispatcher.dispatch(session.clone(), chunks.clone(), voice, cancel.clone());
        let mut queue = OrderedQueue::new(total);

        let ending = 'session: loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => break Ending::Cancelled,
                next = handle.next_completion() => next,
            };

            let completions = match next {
                Some(completion) => vec![completion],
                None if queue.is_drained() => break Ending::Drained,
                None => abandoned(&session, &chunks, &queue),
            };

            for completion in completions {
                let index = completion.job.index();
                let ready = match queue.on_complete(index, completion) {
                    Ok(ready) => ready,
                    Err(e) => {
                        warn!(session = %session, error = %e, "Ignoring unexpected completion");
                        continue;
                    }
                };
                match self.deliver(ready, consumer, cancel, &mut report).await {
                    // a cancel after the last delivery does not undo the session
                    Ok(()) if queue.is_drained() => break 'session Ending::Drained,
                    Ok(()) => {}
                    Err(ending) => break 'session ending,
                }
            }
        };

        match ending {
            Ending::Drained => {
                let summary = handle.finish().await;
                debug!(session = %session, admitted = summary.admitted, "Dispatch drained");
                if report.is_clean() {
                    info!(session = %session, chunks = total, "Session completed");
                    consumer.on_session_complete(&report).await;
                    SessionOutcome::Completed(report)
                } else {
                    warn!(
                        session = %session,
                        successful = report.successful_count(),
                        failed = report.failed_count(),
                        "Session completed with errors"
                    );
                    consumer.on_session_complete(&report).await;
                    SessionOutcome::CompletedWithErrors(report)
                }
            }
            Ending::Cancelled => {
                let released = self.wind_down(handle, &mut queue).await;
                info!(
                    session = %session,
                    delivered = report.delivered,
                    released,
                    "Session cancelled"
                );
                consumer.on_session_cancelled(&report).await;
                SessionOutcome::Cancelled(report)
            }
            Ending::Failed(e) => {
                self.wind_down(handle, &mut queue).await;
                fail(&session, e, consumer).await
            }
        }
    }

    /// Hand released items to the consumer in order.
    ///
    /// On cancellation or consumer failure the remaining items are released
    /// and the reason is returned as the session ending.
    async fn deliver<C: StreamConsumer>(
        &self,
        ready: Vec<(usize, JobCompletion)>,
        consumer: &mut C,
        cancel: &CancelToken,
        report: &mut SessionReport,
    ) -> Result<(), Ending> {
        let mut ready = ready.into_iter();

        while let Some((index, JobCompletion { job, result })) = ready.next() {
            let location = job.location().cloned();
            let failure = result.as_ref().err().map(|e| {
                warn!(session = %report.session_id, index, error = %e, "Chunk synthesis failed");
                ChunkFailure {
                    index,
                    message: e.to_string(),
                }
            });
            let delivery = ChunkDelivery {
                index,
                text: job.content().to_string(),
                result,
            };

            let delivered = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                delivered = consumer.on_chunk_ready(delivery) => Some(delivered),
            };

            let ending = match delivered {
                Some(Ok(())) => {
                    report.delivered += 1;
                    report.failures.extend(failure);
                    debug!(session = %report.session_id, index, "Chunk delivered");
                    continue;
                }
                Some(Err(e)) => Ending::Failed(e.into()),
                None => Ending::Cancelled,
            };

            if let Some(location) = &location {
                self.tracker.release(location);
            }
            for (_, rest) in ready {
                self.release_completion(&rest);
            }
            return Err(ending);
        }

        Ok(())
    }

    /// Let in-flight jobs finish and release everything that was never delivered.
    async fn wind_down(&self, mut handle: DispatchHandle, queue: &mut OrderedQueue<JobCompletion>) -> usize {
        handle.stop_admission();
        let mut released = 0;
        while let Some(completion) = handle.next_completion().await {
            released += self.release_completion(&completion);
        }
        let summary = handle.finish().await;
        for (_, completion) in queue.take_buffered() {
            released += self.release_completion(&completion);
        }
        debug!(
            admitted = summary.admitted,
            not_admitted = summary.not_admitted,
            released,
            "Dispatch wound down"
        );
        released
    }

    fn release_completion(&self, completion: &JobCompletion) -> usize {
        match completion.job.location() {
            Some(location) => {
                self.tracker.release(location);
                1
            }
            None => 0,
        }
    }
}

/// Failure completions for chunks whose job never reported back.
fn abandoned(session: &SessionId, chunks: &[TextChunk], queue: &OrderedQueue<JobCompletion>) -> Vec<JobCompletion> {
    queue
        .missing()
        .into_iter()
        .filter_map(|index| chunks.get(index))
        .map(|chunk| {
            warn!(session = %session, index = chunk.index(), "Synthesis job never reported back");
            let mut job = SynthesisJob::for_chunk(chunk);
            let result = Err(SynthesisError::Abandoned { index: chunk.index() });
            job.finish(&result);
            JobCompletion { job, result }
        })
        .collect()
}

async fn fail<C: StreamConsumer>(session: &SessionId, e: StreamError, consumer: &mut C) -> SessionOutcome {
    error!(session = %session, error = %e, "Session failed");
    consumer.on_session_failed(&e).await;
    SessionOutcome::Failed(e)
}

async fn cancel_before_dispatch<C: StreamConsumer>(
    session: SessionId,
    chunk_count: usize,
    consumer: &mut C,
) -> SessionOutcome {
    info!(session = %session, "Session cancelled before dispatch");
    let report = SessionReport::new(session, chunk_count);
    consumer.on_session_cancelled(&report).await;
    SessionOutcome::Cancelled(report)
}

// ============================================================================
// Tests
// ============================================================================
