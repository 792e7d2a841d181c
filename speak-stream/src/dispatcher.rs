//! Bounded, concurrent dispatch of synthesis jobs.
//!
//! Chunks are admitted strictly in sequence order. Each admitted job holds a
//! semaphore permit for its whole lifetime, so no more than `limit` jobs are
//! ever in flight. Completions come back over a channel in whatever order
//! the synthesizer finishes them.
//!
//! ## Event Flow
//!
//! 1. A permit is acquired (or cancellation wins the race and admission stops)
//! 2. An output location is allocated from the [`ResourceTracker`]
//! 3. The job is spawned and moves to [`JobStatus::InFlight`](crate::types::JobStatus::InFlight)
//! 4. The finished [`JobCompletion`] is sent to the owner of the [`DispatchHandle`]

use std::sync::Arc;

use tokio::sync::{Semaphore, mpsc};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, warn};

use crate::cancel::CancelToken;
use crate::errors::SynthesisError;
use crate::traits::{ResourceTracker, Synthesizer};
use crate::types::{AudioArtifact, SessionId, SynthesisJob, TextChunk};

/// Jobs allowed in flight when nothing else is configured.
pub const DEFAULT_CONCURRENCY: usize = 3;

/// A finished job and its result.
#[derive(Debug)]
pub struct JobCompletion {
    pub job: SynthesisJob,
    pub result: Result<AudioArtifact, SynthesisError>,
}

/// What the dispatcher did with the chunks it was given.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchSummary {
    /// Chunks that were admitted (and therefore reported a completion).
    pub admitted: usize,
    /// Chunks never admitted because the session was cancelled.
    pub not_admitted: usize,
}

/// Receiving side of a running dispatch.
#[derive(Debug)]
pub struct DispatchHandle {
    completions: mpsc::Receiver<JobCompletion>,
    driver: JoinHandle<DispatchSummary>,
    stop: CancelToken,
}

impl DispatchHandle {
    /// Stop admitting new jobs. Jobs already in flight still report back.
    pub fn stop_admission(&self) {
        self.stop.cancel();
    }

    /// Next completion, or `None` once every admitted job has reported.
    pub async fn next_completion(&mut self) -> Option<JobCompletion> {
        self.completions.recv().await
    }

    /// Wait for the driver to wind down and return its summary.
    pub async fn finish(self) -> DispatchSummary {
        drop(self.completions);
        match self.driver.await {
            Ok(summary) => summary,
            Err(e) => {
                warn!(error = %e, "Dispatch driver ended abnormally");
                DispatchSummary::default()
            }
        }
    }
}

/// Runs synthesis jobs against a [`Synthesizer`] with a concurrency bound.
pub struct Dispatcher<S, R> {
    synthesizer: Arc<S>,
    tracker: Arc<R>,
    limit: usize,
}

impl<S, R> Dispatcher<S, R>
where
    S: Synthesizer + 'static,
    R: ResourceTracker + 'static,
{
    /// A `limit` of zero is treated as one.
    pub fn new(synthesizer: Arc<S>, tracker: Arc<R>, limit: usize) -> Self {
        Self {
            synthesizer,
            tracker,
            limit: limit.max(1),
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Start dispatching `chunks` in the background.
    ///
    /// Admission stops as soon as `cancel` fires or
    /// [`DispatchHandle::stop_admission`] is called. Must be called from
    /// within a tokio runtime.
    pub fn dispatch(
        &self,
        session: SessionId,
        chunks: Vec<TextChunk>,
        voice: Option<String>,
        cancel: CancelToken,
    ) -> DispatchHandle {
        let (tx, rx) = mpsc::channel(chunks.len().max(1));
        let stop = CancelToken::new();
        let driver = tokio::spawn(drive(
            Arc::clone(&self.synthesizer),
            Arc::clone(&self.tracker),
            self.limit,
            session,
            chunks,
            voice,
            cancel,
            stop.clone(),
            tx,
        ));
        DispatchHandle {
            completions: rx,
            driver,
            stop,
        }
    }

    /// Synthesize a single job again, outside any running dispatch.
    ///
    /// Retrying is always the caller's decision. Any location the failed job
    /// held is released before a fresh one is allocated.
    pub async fn resynthesize(
        &self,
        session: &SessionId,
        failed: &SynthesisJob,
        voice: Option<&str>,
    ) -> JobCompletion {
        if let Some(previous) = failed.location() {
            self.tracker.release(previous);
        }

        let chunk = TextChunk::new(failed.index(), failed.content().to_string());
        let mut job = SynthesisJob::for_chunk(&chunk);
        let location = match self.tracker.allocate(session, chunk.index()) {
            Ok(location) => location,
            Err(source) => {
                let result = Err(SynthesisError::ResourceAllocation { source });
                job.finish(&result);
                return JobCompletion { job, result };
            }
        };

        job.submit(location.clone());
        debug!(session = %session, index = job.index(), "Retrying synthesis job");
        let result = self
            .synthesizer
            .synthesize(job.content(), voice, &location)
            .await;
        job.finish(&result);
        JobCompletion { job, result }
    }
}

#[allow(clippy::too_many_arguments)]
async fn drive<S, R>(
    synthesizer: Arc<S>,
    tracker: Arc<R>,
    limit: usize,
    session: SessionId,
    chunks: Vec<TextChunk>,
    voice: Option<String>,
    cancel: CancelToken,
    stop: CancelToken,
    tx: mpsc::Sender<JobCompletion>,
) -> DispatchSummary
where
    S: Synthesizer + 'static,
    R: ResourceTracker + 'static,
{
    let semaphore = Arc::new(Semaphore::new(limit));
    let mut jobs = JoinSet::new();
    let total = chunks.len();
    let mut admitted = 0;

    for chunk in chunks {
        let permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = stop.cancelled() => break,
            permit = Arc::clone(&semaphore).acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => break,
            },
        };
        if cancel.is_cancelled() || stop.is_cancelled() {
            break;
        }

        let mut job = SynthesisJob::for_chunk(&chunk);
        admitted += 1;

        let location = match tracker.allocate(&session, chunk.index()) {
            Ok(location) => location,
            Err(source) => {
                warn!(
                    session = %session,
                    index = chunk.index(),
                    error = %source,
                    "Output location allocation failed"
                );
                let result = Err(SynthesisError::ResourceAllocation { source });
                job.finish(&result);
                if tx.send(JobCompletion { job, result }).await.is_err() {
                    break;
                }
                continue;
            }
        };

        job.submit(location.clone());
        debug!(
            session = %session,
            index = job.index(),
            in_flight = limit - semaphore.available_permits(),
            "Submitting synthesis job"
        );

        let synthesizer = Arc::clone(&synthesizer);
        let voice = voice.clone();
        let tx = tx.clone();
        jobs.spawn(async move {
            let _permit = permit;
            let result = synthesizer
                .synthesize(job.content(), voice.as_deref(), &location)
                .await;
            job.finish(&result);
            // the session may already be gone; it releases what it never saw
            let _ = tx.send(JobCompletion { job, result }).await;
        });
    }
    drop(tx);

    while let Some(joined) = jobs.join_next().await {
        if let Err(e) = joined {
            warn!(session = %session, error = %e, "Synthesis job task ended abnormally");
        }
    }

    DispatchSummary {
        admitted,
        not_admitted: total - admitted,
    }
}

// ============================================================================
// Tests
// ============================================================================
