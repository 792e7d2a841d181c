//! Channel-based consumer for network surfaces.
//!
//! [`ChannelConsumer`] turns session callbacks into serialisable
//! [`StreamEvent`]s and pushes them over a tokio mpsc channel. A websocket or
//! SSE handler only has to drain the receiver and write each event as JSON.
//!
//! ```json
//! {"type":"audio_url","index":0,"url":"/audio/session_x/chunk_0.wav","text":"Hello."}
//! ```

use serde::Serialize;
use tokio::sync::mpsc;
use tracing::debug;

use crate::errors::{ConsumerError, StreamError};
use crate::traits::StreamConsumer;
use crate::types::{ChunkDelivery, OutputLocation, SessionId, SessionReport};

/// Warning attached to `complete` when some chunks failed.
pub const PARTIAL_FAILURE_WARNING: &str = "Some audio chunks failed to generate";

/// One event of a session, in delivery order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    Start {
        session_id: SessionId,
        chunk_count: usize,
    },
    AudioUrl {
        index: usize,
        url: String,
        text: String,
    },
    ChunkFailed {
        index: usize,
        text: String,
        error: String,
    },
    Complete {
        successful_count: usize,
        failed_count: usize,
        #[serde(skip_serializing_if = "Option::is_none")]
        warning: Option<String>,
    },
    Error {
        message: String,
    },
    Cancelled {
        delivered: usize,
    },
}

impl StreamEvent {
    /// `true` for the events that end a session.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            StreamEvent::Complete { .. } | StreamEvent::Error { .. } | StreamEvent::Cancelled { .. }
        )
    }
}

type UrlMapper = Box<dyn Fn(&OutputLocation) -> String + Send + Sync>;

/// [`StreamConsumer`] that forwards [`StreamEvent`]s over a channel.
///
/// A closed channel makes chunk deliveries fail with
/// [`ConsumerError::Disconnected`], which ends the session.
pub struct ChannelConsumer {
    tx: mpsc::Sender<StreamEvent>,
    url_for: UrlMapper,
}

impl std::fmt::Debug for ChannelConsumer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelConsumer").finish_non_exhaustive()
    }
}

impl ChannelConsumer {
    /// Audio URLs default to the location's file-system path.
    pub fn new(tx: mpsc::Sender<StreamEvent>) -> Self {
        Self {
            tx,
            url_for: Box::new(|location| location.to_string()),
        }
    }

    /// Map locations to URLs, e.g. with
    /// [`FileResourceTracker::audio_url`](crate::resources::FileResourceTracker::audio_url).
    #[must_use]
    pub fn with_url_mapper(mut self, mapper: impl Fn(&OutputLocation) -> String + Send + Sync + 'static) -> Self {
        self.url_for = Box::new(mapper);
        self
    }

    async fn send(&self, event: StreamEvent) -> Result<(), ConsumerError> {
        self.tx.send(event).await.map_err(|_| ConsumerError::Disconnected)
    }

    async fn send_terminal(&self, event: StreamEvent) {
        if self.send(event).await.is_err() {
            debug!("Event receiver dropped before the terminal event");
        }
    }
}

impl StreamConsumer for ChannelConsumer {
    async fn on_session_started(&mut self, session: &SessionId, chunk_count: usize) -> Result<(), ConsumerError> {
        self.send(StreamEvent::Start {
            session_id: session.clone(),
            chunk_count,
        })
        .await
    }

    async fn on_chunk_ready(&mut self, delivery: ChunkDelivery) -> Result<(), ConsumerError> {
        let event = match &delivery.result {
            Ok(artifact) => StreamEvent::AudioUrl {
                index: delivery.index,
                url: (self.url_for)(&artifact.location),
                text: delivery.text,
            },
            Err(e) => StreamEvent::ChunkFailed {
                index: delivery.index,
                error: e.to_string(),
                text: delivery.text,
            },
        };
        self.send(event).await
    }

    async fn on_session_complete(&mut self, report: &SessionReport) {
        let failed_count = report.failed_count();
        self.send_terminal(StreamEvent::Complete {
            successful_count: report.successful_count(),
            failed_count,
            warning: (failed_count > 0).then(|| PARTIAL_FAILURE_WARNING.to_string()),
        })
        .await;
    }

    async fn on_session_failed(&mut self, error: &StreamError) {
        self.send_terminal(StreamEvent::Error {
            message: error.to_string(),
        })
        .await;
    }

    async fn on_session_cancelled(&mut self, report: &SessionReport) {
        self.send_terminal(StreamEvent::Cancelled {
            delivered: report.delivered,
        })
        .await;
    }
}

// ============================================================================
// Tests
// ============================================================================
