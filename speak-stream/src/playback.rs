//! Local audio playback.
//!
//! Plays files through a system audio player (afplay on macOS, paplay/aplay
//! on Linux, PowerShell on Windows) and provides [`PlaybackConsumer`], which
//! speaks a session's chunks aloud in order.

use std::path::Path;

use tracing::{debug, info, warn};

use crate::errors::{ConsumerError, PlaybackError, StreamError};
use crate::traits::StreamConsumer;
use crate::types::{AudioFormat, ChunkDelivery, SessionId, SessionReport};

// ============================================================================
// OS-Specific Audio Players
// ============================================================================

/// Players for WAV, lightweight ones first.
#[cfg(target_os = "macos")]
const WAV_PLAYERS: &[&str] = &["afplay"];

/// Players for WAV, lightweight ones first.
#[cfg(target_os = "linux")]
const WAV_PLAYERS: &[&str] = &["paplay", "aplay", "play", "mpv", "ffplay"];

#[cfg(target_os = "windows")]
const WAV_PLAYERS: &[&str] = &["powershell"];

#[cfg(not(any(target_os = "macos", target_os = "linux", target_os = "windows")))]
const WAV_PLAYERS: &[&str] = &["ffplay", "play"];

/// Players that can decode MP3.
#[cfg(target_os = "macos")]
const MP3_PLAYERS: &[&str] = &["afplay"];

/// Players that can decode MP3. paplay and aplay only handle PCM and play
/// MP3 as static.
#[cfg(target_os = "linux")]
const MP3_PLAYERS: &[&str] = &["mpv", "ffplay", "play"];

#[cfg(target_os = "windows")]
const MP3_PLAYERS: &[&str] = &["powershell"];

#[cfg(not(any(target_os = "macos", target_os = "linux", target_os = "windows")))]
const MP3_PLAYERS: &[&str] = &["mpv", "ffplay", "play"];

// ============================================================================
// Player Detection
// ============================================================================

/// First player on `PATH` that supports `format`.
pub fn get_audio_player_for_format(format: AudioFormat) -> Option<&'static str> {
    let players = match format {
        AudioFormat::Wav => WAV_PLAYERS,
        AudioFormat::Mp3 => MP3_PLAYERS,
    };
    players.iter().copied().find(|player| which::which(player).is_ok())
}

// ============================================================================
// Playback
// ============================================================================

/// Play a file with `player`, waiting for it to finish.
///
/// The player is killed if the returned future is dropped.
///
/// ## Errors
///
/// [`PlaybackError::SpawnFailed`] or [`PlaybackError::PlayerFailed`].
pub async fn play_audio_file(player: &str, path: &Path) -> Result<(), PlaybackError> {
    let args = build_player_args(player, path);
    debug!(player, path = %path.display(), "Playing audio file");

    let output = tokio::process::Command::new(player)
        .args(&args)
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|source| PlaybackError::SpawnFailed {
            player: player.to_string(),
            source,
        })?;

    if !output.status.success() {
        return Err(PlaybackError::PlayerFailed {
            player: player.to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    Ok(())
}

fn build_player_args(player: &str, path: &Path) -> Vec<String> {
    let path_str = path.to_string_lossy().to_string();

    match player {
        "powershell" => vec![
            "-NoProfile".to_string(),
            "-NonInteractive".to_string(),
            "-Command".to_string(),
            format!(
                "(New-Object Media.SoundPlayer '{}').PlaySync()",
                path_str.replace('\'', "''")
            ),
        ],
        "ffplay" => vec![
            "-nodisp".to_string(),
            "-autoexit".to_string(),
            "-loglevel".to_string(),
            "quiet".to_string(),
            path_str,
        ],
        "mpv" => vec!["--no-video".to_string(), "--really-quiet".to_string(), path_str],
        // afplay, paplay, aplay, play
        _ => vec![path_str],
    }
}

// ============================================================================
// Playback Consumer
// ============================================================================

/// Speaks each chunk as it is delivered.
///
/// Chunks that failed to synthesize, or whose playback fails, are logged and
/// skipped. Having no usable player at all is a [`ConsumerError`] and ends
/// the session.
#[derive(Debug, Default)]
pub struct PlaybackConsumer {
    player: Option<String>,
    echo: bool,
    played: usize,
}

impl PlaybackConsumer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Always use this player instead of detecting one per format.
    #[must_use]
    pub fn with_player(mut self, player: impl Into<String>) -> Self {
        self.player = Some(player.into());
        self
    }

    /// Print each chunk's text to stdout before playing it.
    #[must_use]
    pub fn with_echo(mut self, echo: bool) -> Self {
        self.echo = echo;
        self
    }

    /// Chunks played successfully so far.
    pub fn played(&self) -> usize {
        self.played
    }

    fn player_for(&self, format: AudioFormat) -> Result<String, PlaybackError> {
        match &self.player {
            Some(player) => Ok(player.clone()),
            None => get_audio_player_for_format(format)
                .map(str::to_string)
                .ok_or(PlaybackError::NoAudioPlayer {
                    extension: format.extension(),
                }),
        }
    }
}

impl StreamConsumer for PlaybackConsumer {
    async fn on_session_started(&mut self, session: &SessionId, chunk_count: usize) -> Result<(), ConsumerError> {
        debug!(session = %session, chunk_count, "Playback starting");
        Ok(())
    }

    async fn on_chunk_ready(&mut self, delivery: ChunkDelivery) -> Result<(), ConsumerError> {
        let artifact = match &delivery.result {
            Ok(artifact) => artifact,
            Err(e) => {
                warn!(index = delivery.index, error = %e, "Skipping chunk that failed to synthesize");
                return Ok(());
            }
        };

        let player = self.player_for(artifact.format)?;
        if self.echo {
            println!("{}", delivery.text.trim());
        }

        match play_audio_file(&player, artifact.location.path()).await {
            Ok(()) => self.played += 1,
            Err(e @ PlaybackError::SpawnFailed { .. }) => return Err(e.into()),
            Err(e) => warn!(index = delivery.index, error = %e, "Playback failed"),
        }
        Ok(())
    }

    async fn on_session_complete(&mut self, report: &SessionReport) {
        info!(
            session = %report.session_id,
            played = self.played,
            failed = report.failed_count(),
            "Playback finished"
        );
    }

    async fn on_session_failed(&mut self, error: &StreamError) {
        debug!(error = %error, played = self.played, "Playback stopped");
    }
}

// ============================================================================
// Tests
// ============================================================================
