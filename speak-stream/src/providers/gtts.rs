//! gTTS (Google Text-to-Speech) provider.
//!
//! Uses the `gtts-cli` Python package. Requires network connectivity and
//! writes MP3.

use std::process::Stdio;

use tokio::io::AsyncWriteExt;
use tracing::debug;

use super::verify_output;
use crate::errors::SynthesisError;
use crate::traits::Synthesizer;
use crate::types::{AudioArtifact, AudioFormat, OutputLocation};

/// Language used when no voice is requested.
pub const DEFAULT_LANGUAGE: &str = "en";

/// gTTS synthesizer.
///
/// ## Installation
///
/// ```bash
/// pip install gTTS
/// ```
///
/// ## Voice Selection
///
/// The voice is passed as `--lang` (e.g. "en", "fr", "de"). gTTS does not
/// distinguish between male and female voices.
#[derive(Debug, Clone)]
pub struct GttsSynthesizer {
    binary: String,
}

impl Default for GttsSynthesizer {
    fn default() -> Self {
        Self::new()
    }
}

impl GttsSynthesizer {
    const PROVIDER_NAME: &'static str = "gtts-cli";

    pub fn new() -> Self {
        Self::with_binary(Self::PROVIDER_NAME)
    }

    pub fn with_binary(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

impl Synthesizer for GttsSynthesizer {
    async fn synthesize(
        &self,
        text: &str,
        voice: Option<&str>,
        location: &OutputLocation,
    ) -> Result<AudioArtifact, SynthesisError> {
        let lang = voice.unwrap_or(DEFAULT_LANGUAGE);
        debug!(provider = Self::PROVIDER_NAME, lang, output = %location, "Synthesizing with gTTS");

        // "-" reads the text from stdin, so text starting with a dash is not
        // mistaken for an option
        let mut child = tokio::process::Command::new(&self.binary)
            .arg("--output")
            .arg(location.path())
            .arg("--lang")
            .arg(lang)
            .arg("-")
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| SynthesisError::ProcessSpawnFailed {
                provider: Self::PROVIDER_NAME.into(),
                source: e,
            })?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| SynthesisError::StdinPipeError {
                provider: Self::PROVIDER_NAME.into(),
            })?;
        stdin
            .write_all(text.as_bytes())
            .await
            .map_err(|e| SynthesisError::StdinWriteError {
                provider: Self::PROVIDER_NAME.into(),
                source: e,
            })?;
        drop(stdin);

        let output = child.wait_with_output().await?;
        if !output.status.success() {
            return Err(SynthesisError::ProcessFailed {
                provider: Self::PROVIDER_NAME.into(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        verify_output(Self::PROVIDER_NAME, location, AudioFormat::Mp3).await
    }
}

// ============================================================================
// Tests
// ============================================================================
