//! Deadline wrapper for any synthesizer.

use std::time::Duration;

use tracing::warn;

use crate::errors::SynthesisError;
use crate::traits::Synthesizer;
use crate::types::{AudioArtifact, OutputLocation};

/// Deadline applied when the settings do not name one.
pub const DEFAULT_SYNTHESIS_TIMEOUT: Duration = Duration::from_secs(120);

/// Fails a synthesis with [`SynthesisError::Timeout`] once `limit` elapses.
///
/// The inner future is dropped on timeout; the host providers kill their
/// child process when that happens.
#[derive(Debug, Clone)]
pub struct TimeoutSynthesizer<S> {
    inner: S,
    limit: Duration,
}

impl<S> TimeoutSynthesizer<S> {
    pub fn new(inner: S, limit: Duration) -> Self {
        Self { inner, limit }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    pub fn limit(&self) -> Duration {
        self.limit
    }
}

impl<S: Synthesizer> Synthesizer for TimeoutSynthesizer<S> {
    async fn synthesize(
        &self,
        text: &str,
        voice: Option<&str>,
        location: &OutputLocation,
    ) -> Result<AudioArtifact, SynthesisError> {
        match tokio::time::timeout(self.limit, self.inner.synthesize(text, voice, location)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(output = %location, limit = ?self.limit, "Synthesis timed out");
                Err(SynthesisError::Timeout { after: self.limit })
            }
        }
    }
}
