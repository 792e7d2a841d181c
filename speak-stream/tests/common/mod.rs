//! Test doubles shared by the streaming integration tests.
//!
//! Nothing here touches the file system or spawns processes: locations are
//! plain strings and synthesis is a timed sleep.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use speak_stream::{
    AudioArtifact, AudioFormat, CancelToken, ChunkDelivery, ConsumerError, OutputLocation,
    ResourceError, ResourceTracker, SessionId, SessionReport, StreamConsumer, StreamError,
    SynthesisError, Synthesizer, TranslationError, Translator,
};

/// Synthesizer whose latency and failures are scripted per chunk text.
#[derive(Default)]
pub struct ScriptedSynth {
    latencies: HashMap<String, Duration>,
    failing: Vec<String>,
    default_latency: Duration,
    in_flight: AtomicUsize,
    pub peak_in_flight: AtomicUsize,
    pub calls: AtomicUsize,
    pub finished: Mutex<Vec<String>>,
}

impl ScriptedSynth {
    pub fn new(default_latency: Duration) -> Self {
        Self {
            default_latency,
            ..Default::default()
        }
    }

    pub fn latency(mut self, text: &str, latency: Duration) -> Self {
        self.latencies.insert(text.to_string(), latency);
        self
    }

    pub fn failing(mut self, text: &str) -> Self {
        self.failing.push(text.to_string());
        self
    }

    pub fn finish_order(&self) -> Vec<String> {
        self.finished.lock().unwrap().clone()
    }
}

impl Synthesizer for ScriptedSynth {
    async fn synthesize(
        &self,
        text: &str,
        _voice: Option<&str>,
        location: &OutputLocation,
    ) -> Result<AudioArtifact, SynthesisError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);

        let latency = self
            .latencies
            .get(text)
            .copied()
            .unwrap_or(self.default_latency);
        tokio::time::sleep(latency).await;

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.finished.lock().unwrap().push(text.to_string());

        if self.failing.iter().any(|f| f == text) {
            return Err(SynthesisError::ProcessFailed {
                provider: "scripted".into(),
                stderr: format!("refusing to speak {text:?}"),
            });
        }
        Ok(AudioArtifact {
            location: location.clone(),
            format: AudioFormat::Wav,
            bytes: text.len() as u64,
        })
    }
}

/// In-memory tracker that records every allocation and release.
#[derive(Default)]
pub struct MemoryTracker {
    pub allocated: Mutex<Vec<OutputLocation>>,
    pub released: Mutex<Vec<OutputLocation>>,
    cancel: Option<CancelToken>,
    pub allocated_after_cancel: AtomicUsize,
}

impl MemoryTracker {
    /// Count allocations (admissions) made after `cancel` has fired.
    pub fn watching(cancel: CancelToken) -> Self {
        Self {
            cancel: Some(cancel),
            ..Default::default()
        }
    }

    pub fn allocated(&self) -> Vec<OutputLocation> {
        self.allocated.lock().unwrap().clone()
    }

    pub fn released(&self) -> Vec<OutputLocation> {
        self.released.lock().unwrap().clone()
    }
}

impl ResourceTracker for MemoryTracker {
    fn allocate(&self, session: &SessionId, index: usize) -> Result<OutputLocation, ResourceError> {
        if self.cancel.as_ref().is_some_and(CancelToken::is_cancelled) {
            self.allocated_after_cancel.fetch_add(1, Ordering::SeqCst);
        }
        let location = OutputLocation::new(format!("/mem/{session}/chunk_{index}.wav"));
        self.allocated.lock().unwrap().push(location.clone());
        Ok(location)
    }

    fn release(&self, location: &OutputLocation) {
        self.released.lock().unwrap().push(location.clone());
    }

    fn cleanup_session(&self, _session: &SessionId) -> Result<usize, ResourceError> {
        Ok(0)
    }
}

/// What a [`RecordingConsumer`] saw, in call order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Seen {
    Started(usize),
    Chunk { index: usize, text: String, ok: bool },
    Complete,
    Failed,
    Cancelled,
}

#[derive(Default)]
pub struct RecordingConsumer {
    pub seen: Vec<Seen>,
    pub delivered_locations: Vec<OutputLocation>,
    cancel_after: Option<(usize, CancelToken)>,
}

impl RecordingConsumer {
    /// Cancel `token` right after chunk `index` has been delivered.
    pub fn cancelling_after(index: usize, token: CancelToken) -> Self {
        Self {
            cancel_after: Some((index, token)),
            ..Default::default()
        }
    }

    pub fn chunk_indices(&self) -> Vec<usize> {
        self.seen
            .iter()
            .filter_map(|s| match s {
                Seen::Chunk { index, .. } => Some(*index),
                _ => None,
            })
            .collect()
    }

    pub fn terminal(&self) -> Vec<&Seen> {
        self.seen
            .iter()
            .filter(|s| matches!(s, Seen::Complete | Seen::Failed | Seen::Cancelled))
            .collect()
    }
}

impl StreamConsumer for RecordingConsumer {
    async fn on_session_started(&mut self, _session: &SessionId, chunk_count: usize) -> Result<(), ConsumerError> {
        self.seen.push(Seen::Started(chunk_count));
        Ok(())
    }

    async fn on_chunk_ready(&mut self, delivery: ChunkDelivery) -> Result<(), ConsumerError> {
        if let Some(artifact) = delivery.artifact() {
            self.delivered_locations.push(artifact.location.clone());
        }
        self.seen.push(Seen::Chunk {
            index: delivery.index,
            ok: delivery.is_success(),
            text: delivery.text,
        });
        if let Some((after, token)) = &self.cancel_after {
            if *after == delivery.index {
                token.cancel();
            }
        }
        Ok(())
    }

    async fn on_session_complete(&mut self, _report: &SessionReport) {
        self.seen.push(Seen::Complete);
    }

    async fn on_session_failed(&mut self, _error: &StreamError) {
        self.seen.push(Seen::Failed);
    }

    async fn on_session_cancelled(&mut self, _report: &SessionReport) {
        self.seen.push(Seen::Cancelled);
    }
}

/// Translator that always fails and counts how often it was asked.
#[derive(Default)]
pub struct BrokenTranslator {
    pub calls: Arc<AtomicUsize>,
}

impl Translator for BrokenTranslator {
    async fn translate(&self, _text: &str, _target_language: &str) -> Result<String, TranslationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(TranslationError::Provider {
            status: 503,
            message: "service unavailable".into(),
        })
    }
}

/// Translator that upper-cases its input.
pub struct ShoutingTranslator;

impl Translator for ShoutingTranslator {
    async fn translate(&self, text: &str, _target_language: &str) -> Result<String, TranslationError> {
        Ok(text.to_uppercase())
    }
}
