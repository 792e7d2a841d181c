//! eSpeak/eSpeak-NG provider.
//!
//! Uses the `espeak-ng` or `espeak` command, writing WAV output with `-w`.
//! Common on Linux systems, also available on macOS and Windows.

use std::process::Stdio;

use tokio::io::AsyncWriteExt;
use tracing::debug;

use super::verify_output;
use crate::errors::SynthesisError;
use crate::traits::Synthesizer;
use crate::types::{AudioArtifact, AudioFormat, OutputLocation};

/// eSpeak/eSpeak-NG synthesizer.
///
/// ## Voice Selection
///
/// - `-v` sets the voice/language (e.g. "en", "en-us", "en+f3")
/// - With no voice, eSpeak uses its own default
///
/// ## Examples
///
/// ```ignore
/// use speak_stream::providers::EspeakSynthesizer;
/// use speak_stream::{OutputLocation, Synthesizer};
///
/// let espeak = EspeakSynthesizer::new();
/// let artifact = espeak
///     .synthesize("Hello, world!", Some("en-us"), &OutputLocation::new("/tmp/hello.wav"))
///     .await?;
/// ```
#[derive(Debug, Clone)]
pub struct EspeakSynthesizer {
    /// The binary to use (espeak-ng or espeak).
    binary: String,
}

impl Default for EspeakSynthesizer {
    fn default() -> Self {
        Self::new()
    }
}

impl EspeakSynthesizer {
    /// Auto-detect the binary, preferring `espeak-ng`.
    pub fn new() -> Self {
        let binary = if which::which("espeak-ng").is_ok() {
            "espeak-ng".to_string()
        } else {
            "espeak".to_string()
        };
        Self { binary }
    }

    pub fn with_binary(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    pub fn binary(&self) -> &str {
        &self.binary
    }
}

impl Synthesizer for EspeakSynthesizer {
    async fn synthesize(
        &self,
        text: &str,
        voice: Option<&str>,
        location: &OutputLocation,
    ) -> Result<AudioArtifact, SynthesisError> {
        let mut cmd = tokio::process::Command::new(&self.binary);
        if let Some(voice) = voice {
            cmd.arg("-v").arg(voice);
        }
        cmd.arg("-w").arg(location.path());

        cmd.stdin(Stdio::piped());
        cmd.stdout(Stdio::null());
        cmd.stderr(Stdio::piped());
        cmd.kill_on_drop(true);

        debug!(provider = %self.binary, voice, output = %location, "Synthesizing with eSpeak");

        let mut child = cmd.spawn().map_err(|e| SynthesisError::ProcessSpawnFailed {
            provider: self.binary.clone(),
            source: e,
        })?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| SynthesisError::StdinPipeError {
                provider: self.binary.clone(),
            })?;
        stdin
            .write_all(text.as_bytes())
            .await
            .map_err(|e| SynthesisError::StdinWriteError {
                provider: self.binary.clone(),
                source: e,
            })?;
        // EOF tells espeak the text is complete
        drop(stdin);

        let output = child.wait_with_output().await?;
        if !output.status.success() {
            return Err(SynthesisError::ProcessFailed {
                provider: self.binary.clone(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        verify_output(&self.binary, location, AudioFormat::Wav).await
    }
}

// ============================================================================
// Tests
// ============================================================================
