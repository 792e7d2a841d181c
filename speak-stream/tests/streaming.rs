//! End-to-end session behavior with scripted collaborators.
//!
//! All timing tests run on a paused clock so latencies are exact and the
//! tests are deterministic.

mod common;

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use common::{
    BrokenTranslator, MemoryTracker, RecordingConsumer, ScriptedSynth, Seen, ShoutingTranslator,
};
use speak_stream::{
    AudioArtifact, AudioFormat, CancelToken, FileResourceTracker, OutputLocation, ResourceTracker,
    SessionId, SessionOutcome, StreamError, StreamOptions, StreamOrchestrator, StreamRequest,
    SynthesisError, Synthesizer, TranslationError,
};

fn ms(n: u64) -> Duration {
    Duration::from_millis(n)
}

fn options(concurrency: usize) -> StreamOptions {
    StreamOptions {
        concurrency,
        ..Default::default()
    }
}

// ============================================================================
// Ordering and concurrency
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_out_of_order_completions_are_delivered_in_order() {
    let synth = Arc::new(
        ScriptedSynth::new(ms(10))
            .latency("Hello.", ms(300))
            .latency(" World!", ms(100))
            .latency(" Bye.", ms(200)),
    );
    let tracker = Arc::new(MemoryTracker::default());
    let orchestrator =
        StreamOrchestrator::new(Arc::clone(&synth), Arc::clone(&tracker)).with_options(options(3));
    let mut consumer = RecordingConsumer::default();

    let outcome = orchestrator
        .run(StreamRequest::new("Hello. World! Bye."), &mut consumer, &CancelToken::new())
        .await;

    assert!(outcome.is_success());
    assert_eq!(synth.finish_order(), [" World!", " Bye.", "Hello."]);
    assert_eq!(consumer.chunk_indices(), [0, 1, 2]);
    assert_eq!(consumer.seen.first(), Some(&Seen::Started(3)));
    assert_eq!(consumer.terminal(), [&Seen::Complete]);

    let report = outcome.report().unwrap();
    assert_eq!(report.chunk_count, 3);
    assert_eq!(report.delivered, 3);
    assert!(tracker.released().is_empty(), "delivered audio belongs to the consumer");
}

#[tokio::test(start_paused = true)]
async fn test_concurrency_of_one_runs_sequentially() {
    let synth = Arc::new(
        ScriptedSynth::new(ms(10))
            .latency("One.", ms(100))
            .latency(" Two.", ms(200))
            .latency(" Three.", ms(300)),
    );
    let orchestrator = StreamOrchestrator::new(Arc::clone(&synth), Arc::new(MemoryTracker::default()))
        .with_options(options(1));
    let mut consumer = RecordingConsumer::default();

    let started = tokio::time::Instant::now();
    let outcome = orchestrator
        .run(StreamRequest::new("One. Two. Three."), &mut consumer, &CancelToken::new())
        .await;

    assert!(outcome.is_success());
    assert_eq!(synth.peak_in_flight.load(Ordering::SeqCst), 1);
    assert!(started.elapsed() >= ms(600));
    assert_eq!(synth.finish_order(), ["One.", " Two.", " Three."]);
    assert_eq!(consumer.chunk_indices(), [0, 1, 2]);
}

#[tokio::test(start_paused = true)]
async fn test_many_chunks_stay_within_the_bound_and_in_order() {
    let text: String = (0..20).map(|i| format!("Sentence {i}. ")).collect();
    let mut synth = ScriptedSynth::new(ms(10));
    for i in 0..20u64 {
        let chunk = if i == 0 {
            "Sentence 0.".to_string()
        } else {
            format!(" Sentence {i}.")
        };
        synth = synth.latency(&chunk, ms((i * 37 % 11 + 1) * 10));
    }
    let synth = Arc::new(synth);
    let tracker = Arc::new(MemoryTracker::default());
    let orchestrator =
        StreamOrchestrator::new(Arc::clone(&synth), Arc::clone(&tracker)).with_options(options(4));
    let mut consumer = RecordingConsumer::default();

    let outcome = orchestrator
        .run(StreamRequest::new(text.trim_end()), &mut consumer, &CancelToken::new())
        .await;

    assert!(outcome.is_success());
    assert!(synth.peak_in_flight.load(Ordering::SeqCst) <= 4);
    assert_eq!(synth.calls.load(Ordering::SeqCst), 20);
    assert_eq!(consumer.chunk_indices(), (0..20).collect::<Vec<_>>());

    // one distinct location per chunk
    let allocated = tracker.allocated();
    let unique: HashSet<_> = allocated.iter().collect();
    assert_eq!(allocated.len(), 20);
    assert_eq!(unique.len(), 20);
}

// ============================================================================
// Failures
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_failed_chunk_is_delivered_in_position() {
    let synth = Arc::new(ScriptedSynth::new(ms(50)).failing(" World!"));
    let tracker = Arc::new(MemoryTracker::default());
    let orchestrator = StreamOrchestrator::new(Arc::clone(&synth), Arc::clone(&tracker));
    let mut consumer = RecordingConsumer::default();

    let outcome = orchestrator
        .run(StreamRequest::new("Hello. World! Bye."), &mut consumer, &CancelToken::new())
        .await;

    assert_eq!(
        consumer.seen,
        [
            Seen::Started(3),
            Seen::Chunk {
                index: 0,
                text: "Hello.".into(),
                ok: true
            },
            Seen::Chunk {
                index: 1,
                text: " World!".into(),
                ok: false
            },
            Seen::Chunk {
                index: 2,
                text: " Bye.".into(),
                ok: true
            },
            Seen::Complete,
        ]
    );

    let SessionOutcome::CompletedWithErrors(report) = outcome else {
        panic!("expected completed with errors, got {}", outcome.label());
    };
    assert_eq!(report.failed_count(), 1);
    assert_eq!(report.successful_count(), 2);
    assert_eq!(report.failures[0].index, 1);
    assert!(report.failures[0].message.contains("World"));
}

#[tokio::test(start_paused = true)]
async fn test_translation_failure_fails_before_any_synthesis() {
    let synth = Arc::new(ScriptedSynth::new(ms(10)));
    let tracker = Arc::new(MemoryTracker::default());
    let translator = BrokenTranslator::default();
    let translator_calls = Arc::clone(&translator.calls);
    let orchestrator =
        StreamOrchestrator::new(Arc::clone(&synth), Arc::clone(&tracker)).with_translator(translator);
    let mut consumer = RecordingConsumer::default();

    let outcome = orchestrator
        .run(
            StreamRequest::new("Hello. World!").with_target_language("fr"),
            &mut consumer,
            &CancelToken::new(),
        )
        .await;

    assert!(matches!(
        outcome,
        SessionOutcome::Failed(StreamError::Translation(TranslationError::Provider { status: 503, .. }))
    ));
    assert_eq!(translator_calls.load(Ordering::SeqCst), 1);
    assert_eq!(synth.calls.load(Ordering::SeqCst), 0);
    assert!(tracker.allocated().is_empty());
    assert_eq!(consumer.seen, [Seen::Failed]);
}

#[tokio::test(start_paused = true)]
async fn test_translated_text_is_what_gets_spoken() {
    let synth = Arc::new(ScriptedSynth::new(ms(10)));
    let orchestrator = StreamOrchestrator::new(Arc::clone(&synth), Arc::new(MemoryTracker::default()))
        .with_translator(ShoutingTranslator);
    let mut consumer = RecordingConsumer::default();

    let outcome = orchestrator
        .run(
            StreamRequest::new("Hello. World!").with_target_language("xx"),
            &mut consumer,
            &CancelToken::new(),
        )
        .await;

    assert!(outcome.is_success());
    let texts: Vec<_> = consumer
        .seen
        .iter()
        .filter_map(|s| match s {
            Seen::Chunk { text, .. } => Some(text.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(texts, ["HELLO.", " WORLD!"]);
}

#[tokio::test(start_paused = true)]
async fn test_no_target_language_skips_translation() {
    let translator = BrokenTranslator::default();
    let translator_calls = Arc::clone(&translator.calls);
    let orchestrator = StreamOrchestrator::new(
        Arc::new(ScriptedSynth::new(ms(10))),
        Arc::new(MemoryTracker::default()),
    )
    .with_translator(translator);
    let mut consumer = RecordingConsumer::default();

    let outcome = orchestrator
        .run(StreamRequest::new("Hello."), &mut consumer, &CancelToken::new())
        .await;

    assert!(outcome.is_success());
    assert_eq!(translator_calls.load(Ordering::SeqCst), 0);
}

// ============================================================================
// Cancellation
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_cancel_mid_stream_stops_admission_and_releases_undelivered() {
    let cancel = CancelToken::new();
    let synth = Arc::new(ScriptedSynth::new(ms(100)));
    let tracker = Arc::new(MemoryTracker::watching(cancel.clone()));
    let orchestrator =
        StreamOrchestrator::new(Arc::clone(&synth), Arc::clone(&tracker)).with_options(options(1));
    let mut consumer = RecordingConsumer::cancelling_after(0, cancel.clone());

    let outcome = orchestrator
        .run(StreamRequest::new("One. Two. Three. Four."), &mut consumer, &cancel)
        .await;

    let SessionOutcome::Cancelled(report) = outcome else {
        panic!("expected cancelled, got {}", outcome.label());
    };
    assert_eq!(report.delivered, 1);
    assert_eq!(consumer.chunk_indices(), [0]);
    assert_eq!(consumer.terminal(), [&Seen::Cancelled]);

    // nothing admitted once cancelled, and the tail was never reached
    assert_eq!(tracker.allocated_after_cancel.load(Ordering::SeqCst), 0);
    let allocated = tracker.allocated();
    assert!(allocated.len() <= 2, "admitted {allocated:?}");

    // every allocated location is either delivered or released, never both
    let delivered: HashSet<_> = consumer.delivered_locations.iter().cloned().collect();
    let released: HashSet<_> = tracker.released().into_iter().collect();
    assert!(delivered.is_disjoint(&released));
    let accounted: HashSet<_> = delivered.union(&released).cloned().collect();
    assert_eq!(accounted, allocated.into_iter().collect::<HashSet<_>>());
    assert_eq!(tracker.released().len(), released.len(), "released twice");
}

#[tokio::test(start_paused = true)]
async fn test_cancel_during_final_delivery_keeps_completed_outcome() {
    let cancel = CancelToken::new();
    let synth = Arc::new(ScriptedSynth::new(ms(50)));
    let tracker = Arc::new(MemoryTracker::default());
    let orchestrator =
        StreamOrchestrator::new(Arc::clone(&synth), Arc::clone(&tracker)).with_options(options(3));
    let mut consumer = RecordingConsumer::cancelling_after(2, cancel.clone());

    let outcome = orchestrator
        .run(StreamRequest::new("One. Two. Three."), &mut consumer, &cancel)
        .await;

    assert!(outcome.is_success(), "got {}", outcome.label());
    assert_eq!(consumer.chunk_indices(), [0, 1, 2]);
    assert_eq!(consumer.terminal(), [&Seen::Complete]);
    assert!(tracker.released().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_cancel_before_start_does_no_work() {
    let cancel = CancelToken::new();
    cancel.cancel();
    let synth = Arc::new(ScriptedSynth::new(ms(10)));
    let tracker = Arc::new(MemoryTracker::default());
    let orchestrator = StreamOrchestrator::new(Arc::clone(&synth), Arc::clone(&tracker));
    let mut consumer = RecordingConsumer::default();

    let outcome = orchestrator
        .run(StreamRequest::new("Hello. World!"), &mut consumer, &cancel)
        .await;

    assert!(matches!(outcome, SessionOutcome::Cancelled(_)));
    assert_eq!(synth.calls.load(Ordering::SeqCst), 0);
    assert!(tracker.allocated().is_empty());
    assert_eq!(consumer.seen, [Seen::Cancelled]);
}

// ============================================================================
// File-backed session
// ============================================================================

/// Writes a tiny placeholder file at the allocated location.
struct FileSynth;

impl Synthesizer for FileSynth {
    async fn synthesize(
        &self,
        text: &str,
        _voice: Option<&str>,
        location: &OutputLocation,
    ) -> Result<AudioArtifact, SynthesisError> {
        tokio::time::sleep(ms(5)).await;
        std::fs::write(location.path(), text.as_bytes())?;
        Ok(AudioArtifact {
            location: location.clone(),
            format: AudioFormat::Wav,
            bytes: text.len() as u64,
        })
    }
}

#[tokio::test]
async fn test_cancelled_session_leaves_only_delivered_files() {
    let dir = tempfile::tempdir().unwrap();
    let tracker = Arc::new(FileResourceTracker::new(dir.path()));
    let cancel = CancelToken::new();
    let orchestrator =
        StreamOrchestrator::new(Arc::new(FileSynth), Arc::clone(&tracker)).with_options(options(1));
    let mut consumer = RecordingConsumer::cancelling_after(0, cancel.clone());
    let session = SessionId::new("session_files");

    let outcome = orchestrator
        .run(
            StreamRequest::new("One. Two. Three.").with_session_id(session.clone()),
            &mut consumer,
            &cancel,
        )
        .await;

    assert!(matches!(outcome, SessionOutcome::Cancelled(_)));
    assert_eq!(consumer.delivered_locations.len(), 1);
    assert!(consumer.delivered_locations[0].path().exists());

    let on_disk: Vec<_> = std::fs::read_dir(tracker.session_dir(&session))
        .unwrap()
        .map(|entry| entry.unwrap().path())
        .collect();
    assert_eq!(on_disk, [consumer.delivered_locations[0].path().to_path_buf()]);

    // the caller owns delivered audio until it cleans up the session
    tracker.cleanup_session(&session).unwrap();
    assert!(!tracker.session_dir(&session).exists());
}
