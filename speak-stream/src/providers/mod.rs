//! Host TTS providers that implement [`Synthesizer`].
//!
//! Each provider shells out to a CLI that writes audio straight to the
//! allocated [`OutputLocation`]. [`HostSynthesizer`] selects one at runtime
//! from a [`ProviderKind`], and [`TimeoutSynthesizer`] bounds any synthesizer
//! by a duration.

pub mod espeak;
pub mod gtts;
pub mod timeout;

use std::fmt;
use std::io;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub use espeak::EspeakSynthesizer;
pub use gtts::GttsSynthesizer;
pub use timeout::{DEFAULT_SYNTHESIS_TIMEOUT, TimeoutSynthesizer};

use crate::errors::SynthesisError;
use crate::traits::Synthesizer;
use crate::types::{AudioArtifact, AudioFormat, OutputLocation};

/// Which host provider to synthesize with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// `espeak-ng` / `espeak`, offline, WAV output.
    #[default]
    Espeak,
    /// `gtts-cli`, needs network, MP3 output.
    Gtts,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 2] = [ProviderKind::Espeak, ProviderKind::Gtts];

    pub fn name(&self) -> &'static str {
        match self {
            ProviderKind::Espeak => "espeak",
            ProviderKind::Gtts => "gtts",
        }
    }

    /// Format of the files this provider writes.
    pub fn audio_format(&self) -> AudioFormat {
        match self {
            ProviderKind::Espeak => AudioFormat::Wav,
            ProviderKind::Gtts => AudioFormat::Mp3,
        }
    }

    /// `true` when the provider's binary is on `PATH`.
    pub fn is_available(&self) -> bool {
        match self {
            ProviderKind::Espeak => which::which("espeak-ng").is_ok() || which::which("espeak").is_ok(),
            ProviderKind::Gtts => which::which("gtts-cli").is_ok(),
        }
    }

    /// Build a synthesizer for this provider.
    pub fn synthesizer(&self) -> HostSynthesizer {
        match self {
            ProviderKind::Espeak => HostSynthesizer::Espeak(EspeakSynthesizer::new()),
            ProviderKind::Gtts => HostSynthesizer::Gtts(GttsSynthesizer::new()),
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Unknown provider name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown TTS provider '{0}' (expected espeak or gtts)")]
pub struct UnknownProvider(pub String);

impl FromStr for ProviderKind {
    type Err = UnknownProvider;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "espeak" | "espeak-ng" => Ok(ProviderKind::Espeak),
            "gtts" | "gtts-cli" => Ok(ProviderKind::Gtts),
            _ => Err(UnknownProvider(s.to_string())),
        }
    }
}

/// Runtime choice between the host providers.
#[derive(Debug, Clone)]
pub enum HostSynthesizer {
    Espeak(EspeakSynthesizer),
    Gtts(GttsSynthesizer),
}

impl HostSynthesizer {
    pub fn kind(&self) -> ProviderKind {
        match self {
            HostSynthesizer::Espeak(_) => ProviderKind::Espeak,
            HostSynthesizer::Gtts(_) => ProviderKind::Gtts,
        }
    }
}

impl Synthesizer for HostSynthesizer {
    async fn synthesize(
        &self,
        text: &str,
        voice: Option<&str>,
        location: &OutputLocation,
    ) -> Result<AudioArtifact, SynthesisError> {
        match self {
            HostSynthesizer::Espeak(p) => p.synthesize(text, voice, location).await,
            HostSynthesizer::Gtts(p) => p.synthesize(text, voice, location).await,
        }
    }
}

/// Confirm the provider left a non-empty file behind.
pub(crate) async fn verify_output(
    provider: &str,
    location: &OutputLocation,
    format: AudioFormat,
) -> Result<AudioArtifact, SynthesisError> {
    let missing = || SynthesisError::MissingOutput {
        provider: provider.to_string(),
        path: location.path().to_path_buf(),
    };

    let metadata = match tokio::fs::metadata(location.path()).await {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Err(missing()),
        Err(e) => return Err(e.into()),
    };
    if !metadata.is_file() || metadata.len() == 0 {
        return Err(missing());
    }

    Ok(AudioArtifact {
        location: location.clone(),
        format,
        bytes: metadata.len(),
    })
}

/// Write an executable shell script standing in for a provider binary.
#[cfg(all(test, unix))]
pub(crate) fn fake_binary(dir: &std::path::Path, name: &str, body: &str) -> std::path::PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_provider_kind_parsing() {
        assert_eq!("espeak".parse::<ProviderKind>().unwrap(), ProviderKind::Espeak);
        assert_eq!("eSpeak-NG".parse::<ProviderKind>().unwrap(), ProviderKind::Espeak);
        assert_eq!(" gtts-cli ".parse::<ProviderKind>().unwrap(), ProviderKind::Gtts);
        assert_eq!(
            "say".parse::<ProviderKind>(),
            Err(UnknownProvider("say".to_string()))
        );
    }

    #[test]
    fn test_provider_kind_formats_and_names() {
        assert_eq!(ProviderKind::Espeak.audio_format(), AudioFormat::Wav);
        assert_eq!(ProviderKind::Gtts.audio_format(), AudioFormat::Mp3);
        for kind in ProviderKind::ALL {
            assert_eq!(kind.to_string().parse::<ProviderKind>().unwrap(), kind);
            assert_eq!(kind.synthesizer().kind(), kind);
        }
    }

    #[tokio::test]
    async fn test_verify_output_rejects_missing_and_empty_files() {
        let dir = TempDir::new().unwrap();
        let location = OutputLocation::new(dir.path().join("a.wav"));

        let err = verify_output("test", &location, AudioFormat::Wav).await.unwrap_err();
        assert!(matches!(err, SynthesisError::MissingOutput { .. }));

        std::fs::write(location.path(), b"").unwrap();
        let err = verify_output("test", &location, AudioFormat::Wav).await.unwrap_err();
        assert!(matches!(err, SynthesisError::MissingOutput { .. }));

        std::fs::write(location.path(), b"RIFF....").unwrap();
        let artifact = verify_output("test", &location, AudioFormat::Wav).await.unwrap();
        assert_eq!(artifact.bytes, 8);
        assert_eq!(artifact.location, location);
    }
}
