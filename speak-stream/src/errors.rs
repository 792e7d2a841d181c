//! Error types for the streaming pipeline and its collaborators.
//!
//! Errors are split by who raises them. Session-fatal errors
//! ([`SegmentationError`], [`TranslationError`], [`ConsumerError`]) are
//! collected under [`StreamError`]; per-chunk [`SynthesisError`]s never abort
//! a session and are delivered to the consumer in sequence position instead.

use std::path::PathBuf;
use std::time::Duration;

/// The input text could not be turned into speakable chunks.
#[derive(Debug, thiserror::Error)]
pub enum SegmentationError {
    /// The input was the empty string.
    #[error("Input text is empty")]
    EmptyInput,

    /// The input contained only whitespace and boundary characters.
    #[error("Input text has no speakable content")]
    NoSpeakableContent,

    /// The segmenter configuration cannot be used.
    #[error("Invalid segmenter configuration: {reason}")]
    InvalidConfig {
        /// Why the configuration was rejected.
        reason: String,
    },
}

/// The translation collaborator failed. Always fatal to the session.
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum TranslationError {
    /// A target language was requested but no translator is configured.
    #[error("No translation provider is configured (requested '{target_language}')")]
    Unavailable {
        /// The language that was asked for.
        target_language: String,
    },

    /// The HTTP request could not be sent or its body could not be read.
    #[error("Translation request failed")]
    Http {
        /// The underlying transport error.
        #[source]
        source: reqwest::Error,
    },

    /// The provider answered with a non-success status.
    #[error("Translation provider returned {status}: {message}")]
    Provider {
        /// HTTP status code.
        status: u16,
        /// Body or error message returned by the provider.
        message: String,
    },

    /// The provider answered with a body we could not interpret.
    #[error("Malformed translation response: {reason}")]
    MalformedResponse {
        /// What was wrong with the response.
        reason: String,
    },
}

/// The session resource tracker could not hand out or clean up a location.
#[derive(Debug, thiserror::Error)]
pub enum ResourceError {
    /// Creating a session directory failed.
    #[error("Failed to create directory {}", .path.display())]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Removing a file or directory failed.
    #[error("Failed to remove {}", .path.display())]
    Remove {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Reading the output root failed while purging stale sessions.
    #[error("Failed to scan {}", .path.display())]
    Scan {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The same index was allocated twice within one session.
    #[error("Output location for chunk {index} of session {session} was already allocated")]
    AlreadyAllocated {
        session: String,
        index: usize,
    },
}

/// A single chunk failed to synthesize. Isolated to that chunk.
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum SynthesisError {
    /// No output location could be allocated for the chunk.
    #[error("Output location allocation failed")]
    ResourceAllocation {
        #[source]
        source: ResourceError,
    },

    /// The synthesizer process could not be started.
    #[error("Failed to spawn {provider}")]
    ProcessSpawnFailed {
        provider: String,
        #[source]
        source: std::io::Error,
    },

    /// Could not obtain the synthesizer's stdin pipe.
    #[error("Failed to open stdin pipe for {provider}")]
    StdinPipeError { provider: String },

    /// Writing the text to the synthesizer's stdin failed.
    #[error("Failed to write text to {provider}")]
    StdinWriteError {
        provider: String,
        #[source]
        source: std::io::Error,
    },

    /// The synthesizer exited with a non-zero status.
    #[error("{provider} failed: {stderr}")]
    ProcessFailed { provider: String, stderr: String },

    /// The synthesizer reported success but left no audio behind.
    #[error("{provider} produced no audio at {}", .path.display())]
    MissingOutput { provider: String, path: PathBuf },

    /// The synthesizer did not finish within the configured limit.
    #[error("Synthesis timed out after {after:?}")]
    Timeout { after: Duration },

    /// The job never reported back (its task was lost).
    #[error("Synthesis job for chunk {index} was abandoned")]
    Abandoned { index: usize },

    /// I/O error while inspecting the produced audio.
    #[error("I/O error during synthesis")]
    Io {
        #[from]
        source: std::io::Error,
    },
}

/// Audio playback through a system player failed.
#[derive(Debug, thiserror::Error)]
pub enum PlaybackError {
    /// No player on `PATH` can handle the format.
    #[error("No audio player available for .{extension} files")]
    NoAudioPlayer { extension: &'static str },

    /// The player process could not be started.
    #[error("Failed to spawn audio player {player}")]
    SpawnFailed {
        player: String,
        #[source]
        source: std::io::Error,
    },

    /// The player exited with an error.
    #[error("Audio playback failed ({player}): {stderr}")]
    PlayerFailed { player: String, stderr: String },
}

/// The consumer could not accept a delivery. Fatal to the session.
#[derive(Debug, thiserror::Error)]
pub enum ConsumerError {
    /// The receiving side of the consumer has gone away.
    #[error("Consumer disconnected")]
    Disconnected,

    /// Playback is impossible on this host.
    #[error(transparent)]
    Playback(#[from] PlaybackError),
}

/// Errors from the ordered delivery queue.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum QueueError {
    /// The index lies outside `0..total`.
    #[error("Sequence index {index} is out of range (total {total})")]
    OutOfRange { index: usize, total: usize },

    /// The index was already received.
    #[error("Sequence index {index} was already completed")]
    Duplicate { index: usize },
}

/// Problems loading [`StreamSettings`](crate::settings::StreamSettings).
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    /// The settings file exists but could not be read.
    #[error("Failed to read settings file {}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The settings file is not valid YAML for our schema.
    #[error("Failed to parse settings file {}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// An environment override could not be parsed.
    #[error("Invalid value for {key}: '{value}'")]
    InvalidEnv { key: &'static str, value: String },

    /// The combined settings violate a constraint.
    #[error("Invalid settings: {reason}")]
    Invalid { reason: String },
}

/// A fatal, session-level failure.
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    #[error(transparent)]
    Segmentation(#[from] SegmentationError),

    #[error(transparent)]
    Translation(#[from] TranslationError),

    #[error(transparent)]
    Consumer(#[from] ConsumerError),
}
