//! Speak Stream
//!
//! Streaming text-to-speech pipeline: split text into sentence-sized chunks,
//! synthesize them concurrently, and deliver the audio strictly in reading
//! order so playback can start before the whole text is synthesized.
//!
//! ## Features
//!
//! - **Deterministic segmentation**: boundary characters plus an optional
//!   size limit, counted in characters
//! - **Bounded concurrency**: at most `N` synthesis jobs in flight
//! - **Ordered delivery**: out-of-order completions are re-sequenced;
//!   failures are delivered in position instead of being skipped
//! - **Cancellation**: stops admission, lets in-flight jobs finish and
//!   releases every undelivered output file
//! - **Pluggable collaborators**: translator, synthesizer, resource tracker
//!   and consumer are traits
//!
//! ## Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use speak_stream::{
//!     CancelToken, FileResourceTracker, PlaybackConsumer, ProviderKind, StreamOrchestrator,
//!     StreamRequest,
//! };
//!
//! let tracker = Arc::new(FileResourceTracker::new("/tmp/read-aloud"));
//! let orchestrator = StreamOrchestrator::new(Arc::new(ProviderKind::Espeak.synthesizer()), tracker);
//! let outcome = orchestrator
//!     .run(StreamRequest::new("Hello. World!"), &mut PlaybackConsumer::new(), &CancelToken::new())
//!     .await;
//! ```
//!
//! ## Module Structure
//!
//! - [`segmenter`] - Text to ordered chunks
//! - [`dispatcher`] - Bounded concurrent synthesis
//! - [`ordered_queue`] - Re-sequencing of completions
//! - [`orchestrator`] - One session end to end
//! - [`traits`] - Collaborator seams
//! - [`providers`], [`translation`], [`resources`], [`playback`], [`consumers`] -
//!   Concrete collaborators
//! - [`settings`] - Layered configuration

pub mod cancel;
pub mod consumers;
pub mod dispatcher;
pub mod errors;
pub mod orchestrator;
pub mod ordered_queue;
pub mod playback;
pub mod providers;
pub mod resources;
pub mod segmenter;
pub mod settings;
pub mod traits;
pub mod translation;
pub mod types;

// Re-export main types at crate root for convenience
pub use cancel::CancelToken;
pub use consumers::{ChannelConsumer, StreamEvent};
pub use dispatcher::{DEFAULT_CONCURRENCY, DispatchSummary, Dispatcher, JobCompletion};
pub use errors::{
    ConsumerError, PlaybackError, QueueError, ResourceError, SegmentationError, SettingsError,
    StreamError, SynthesisError, TranslationError,
};
pub use orchestrator::{StreamOptions, StreamOrchestrator, StreamRequest};
pub use ordered_queue::OrderedQueue;
pub use playback::PlaybackConsumer;
pub use providers::{
    EspeakSynthesizer, GttsSynthesizer, HostSynthesizer, ProviderKind, TimeoutSynthesizer,
};
pub use resources::FileResourceTracker;
pub use segmenter::{Segmenter, SegmenterConfig};
pub use settings::StreamSettings;
pub use traits::{NoTranslator, ResourceTracker, StreamConsumer, Synthesizer, Translator};
pub use translation::HttpTranslator;
pub use types::{
    AudioArtifact, AudioFormat, ChunkDelivery, ChunkFailure, JobStatus, OutputLocation, SessionId,
    SessionOutcome, SessionReport, SynthesisJob, TextChunk,
};
