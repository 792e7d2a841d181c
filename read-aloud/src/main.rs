//! read-aloud - speak text sentence by sentence as soon as each is synthesized

use std::io::{self, Read};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use owo_colors::{OwoColorize, Stream, Style};
use speak_stream::providers::DEFAULT_SYNTHESIS_TIMEOUT;
use speak_stream::translation::DEFAULT_TRANSLATE_TIMEOUT;
use speak_stream::{
    CancelToken, ChannelConsumer, FileResourceTracker, HostSynthesizer, HttpTranslator,
    PlaybackConsumer, ProviderKind, ResourceError, ResourceTracker, SegmentationError,
    SessionId, SessionOutcome, SettingsError, StreamOptions, StreamOrchestrator, StreamRequest,
    StreamSettings, TextChunk, TimeoutSynthesizer, TranslationError, Translator,
};
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::{filter::EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Longest input read aloud, in characters. Longer input is truncated.
const MAX_INPUT_CHARS: usize = 10_000;

const EXIT_COMPLETED: u8 = 0;
const EXIT_FAILED: u8 = 1;
const EXIT_COMPLETED_WITH_ERRORS: u8 = 2;
const EXIT_CANCELLED: u8 = 130;

type Synth = TimeoutSynthesizer<HostSynthesizer>;

/// Read text aloud, streaming it sentence by sentence
#[derive(Parser, Debug)]
#[command(name = "read-aloud")]
#[command(about = "Read text aloud, starting playback before the whole text is synthesized", long_about = None)]
#[command(version)]
struct Cli {
    /// Text to read (reads from stdin if neither text nor --file is given).
    /// Input from any source is capped at 10 000 characters
    text: Vec<String>,

    /// Read the text from a file
    #[arg(short, long, value_name = "PATH", conflicts_with = "text")]
    file: Option<PathBuf>,

    /// Translate into this language before speaking (needs a translate_url)
    #[arg(short, long, value_name = "LANG")]
    lang: Option<String>,

    /// Voice handed to the TTS provider
    #[arg(long, value_name = "VOICE")]
    voice: Option<String>,

    /// TTS provider (espeak or gtts)
    #[arg(long, value_name = "NAME")]
    provider: Option<ProviderKind>,

    /// Maximum chunks synthesized at once
    #[arg(short, long, value_name = "N")]
    concurrency: Option<usize>,

    /// Split chunks longer than this many characters
    #[arg(long, value_name = "CHARS")]
    max_chunk: Option<usize>,

    /// Settings file [default: <config dir>/read-aloud/config.yaml]
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Directory for session audio files
    #[arg(short, long, value_name = "DIR")]
    output_dir: Option<PathBuf>,

    /// Print the chunk plan and exit without synthesizing
    #[arg(long)]
    dry_run: bool,

    /// Write JSON events to stdout instead of playing audio (implies --keep)
    #[arg(long)]
    events: bool,

    /// Keep the session's audio files after it ends
    #[arg(long)]
    keep: bool,

    /// Delete session directories older than this many hours, then exit
    #[arg(long, value_name = "HOURS")]
    purge_hours: Option<u64>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short = 'v', action = clap::ArgAction::Count)]
    verbose: u8,

    /// Output logs as JSON
    #[arg(long)]
    log_json: bool,
}

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("No input provided. Usage: read-aloud <text>, --file <path> or echo \"text\" | read-aloud")]
    NoInput,

    #[error("Failed to read {}: {source}", .path.display())]
    ReadFile {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to read stdin: {0}")]
    Stdin(#[source] io::Error),

    #[error("TTS provider '{0}' is not installed")]
    ProviderUnavailable(ProviderKind),

    #[error(transparent)]
    Settings(#[from] SettingsError),

    #[error(transparent)]
    Segmentation(#[from] SegmentationError),

    #[error(transparent)]
    Resource(#[from] ResourceError),

    #[error(transparent)]
    Translation(#[from] TranslationError),
}

// ============================================================================
// Setup
// ============================================================================

/// Initialize tracing subscriber based on verbosity and output format
fn init_tracing(verbose: u8, json: bool) {
    // Default (verbose=0) shows only WARN level; logs never go to stdout
    let base_filter = match std::env::var("RUST_LOG") {
        Ok(filter) => filter,
        Err(_) => match verbose {
            0 => "warn".to_string(),
            1 => "warn,speak_stream=info,read_aloud=info".to_string(),
            2 => "info,speak_stream=debug,read_aloud=debug".to_string(),
            _ => "debug,speak_stream=trace,read_aloud=trace".to_string(),
        },
    };

    let filter = EnvFilter::try_new(&base_filter).unwrap_or_else(|_| EnvFilter::new("warn"));

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_level(true)
                    .with_file(verbose >= 3)
                    .with_line_number(verbose >= 3)
                    .with_writer(std::io::stderr)
                    .compact(),
            )
            .init();
    }
}

/// Load settings and layer the command-line overrides on top.
fn settings_for(cli: &Cli) -> Result<StreamSettings, CliError> {
    let mut settings = StreamSettings::load(cli.config.as_deref())?;
    apply_overrides(&mut settings, cli);
    settings.validate()?;
    Ok(settings)
}

fn apply_overrides(settings: &mut StreamSettings, cli: &Cli) {
    if let Some(dir) = &cli.output_dir {
        settings.output_directory = dir.clone();
    }
    if let Some(voice) = &cli.voice {
        settings.tts_voice = Some(voice.clone());
    }
    if let Some(provider) = cli.provider {
        settings.provider = provider;
    }
    if let Some(concurrency) = cli.concurrency {
        settings.concurrency = concurrency;
    }
    if let Some(max) = cli.max_chunk {
        settings.max_chunk_chars = Some(max);
    }
}

/// Text from `--file`, the positional arguments or stdin, trimmed and capped
/// at [`MAX_INPUT_CHARS`].
fn read_input(cli: &Cli) -> Result<String, CliError> {
    let raw = if let Some(path) = &cli.file {
        std::fs::read_to_string(path).map_err(|source| CliError::ReadFile {
            path: path.clone(),
            source,
        })?
    } else if !cli.text.is_empty() {
        cli.text.join(" ")
    } else {
        read_from_stdin()?
    };

    let text = raw.trim();
    if text.is_empty() {
        return Err(CliError::NoInput);
    }
    Ok(cap_input(text))
}

fn cap_input(text: &str) -> String {
    match text.char_indices().nth(MAX_INPUT_CHARS) {
        Some((end, _)) => {
            warn!(limit = MAX_INPUT_CHARS, "Input truncated");
            text[..end].trim_end().to_string()
        }
        None => text.to_string(),
    }
}

fn read_from_stdin() -> Result<String, CliError> {
    // a UTF-8 char is at most four bytes
    let mut buffer = Vec::new();
    io::stdin()
        .take((MAX_INPUT_CHARS * 4) as u64)
        .read_to_end(&mut buffer)
        .map_err(CliError::Stdin)?;
    Ok(String::from_utf8_lossy(&buffer).into_owned())
}

fn tracker_for(settings: &StreamSettings) -> FileResourceTracker {
    FileResourceTracker::new(&settings.output_directory)
        .with_prefix(settings.file_prefix.clone())
        .with_format(settings.provider.audio_format())
}

fn orchestrator_for(
    settings: &StreamSettings,
    tracker: Arc<FileResourceTracker>,
) -> StreamOrchestrator<Synth, FileResourceTracker> {
    let limit = settings.synthesis_timeout().unwrap_or(DEFAULT_SYNTHESIS_TIMEOUT);
    let synthesizer = TimeoutSynthesizer::new(settings.provider.synthesizer(), limit);
    StreamOrchestrator::new(Arc::new(synthesizer), tracker).with_options(StreamOptions {
        segmenter: settings.segmenter_config(),
        concurrency: settings.concurrency,
    })
}

// ============================================================================
// Output
// ============================================================================

fn format_plan(chunks: &[TextChunk]) -> String {
    chunks
        .iter()
        .map(|chunk| format!("[{}] {}", chunk.index(), chunk.content().trim()))
        .collect::<Vec<_>>()
        .join("\n")
}

fn exit_code(outcome: &SessionOutcome) -> u8 {
    match outcome {
        SessionOutcome::Completed(_) => EXIT_COMPLETED,
        SessionOutcome::CompletedWithErrors(_) => EXIT_COMPLETED_WITH_ERRORS,
        SessionOutcome::Failed(_) => EXIT_FAILED,
        SessionOutcome::Cancelled(_) => EXIT_CANCELLED,
    }
}

fn print_error(message: impl std::fmt::Display) {
    eprintln!(
        "{} {message}",
        "Error:".if_supports_color(Stream::Stderr, |t| t.style(Style::new().red().bold()))
    );
}

fn report_outcome(outcome: &SessionOutcome) {
    match outcome {
        SessionOutcome::Completed(report) => {
            info!(chunks = report.chunk_count, "Finished reading");
        }
        SessionOutcome::CompletedWithErrors(report) => {
            eprintln!(
                "{} {} of {} chunks could not be synthesized",
                "Warning:".if_supports_color(Stream::Stderr, |t| t.yellow()),
                report.failed_count(),
                report.chunk_count
            );
        }
        SessionOutcome::Failed(e) => print_error(e),
        SessionOutcome::Cancelled(report) => {
            eprintln!(
                "{}",
                format!("Cancelled after {} of {} chunks", report.delivered, report.chunk_count)
                    .if_supports_color(Stream::Stderr, |t| t.dimmed())
            );
        }
    }
}

// ============================================================================
// Session
// ============================================================================

/// Run one session with either the playback or the JSON event consumer.
async fn speak<T: Translator>(
    orchestrator: &StreamOrchestrator<Synth, FileResourceTracker, T>,
    request: StreamRequest,
    events: bool,
    cancel: &CancelToken,
) -> SessionOutcome {
    if !events {
        let mut consumer = PlaybackConsumer::new().with_echo(true);
        return orchestrator.run(request, &mut consumer, cancel).await;
    }

    let (tx, mut rx) = mpsc::channel(32);
    let printer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            match serde_json::to_string(&event) {
                Ok(line) => println!("{line}"),
                Err(e) => warn!(error = %e, "Failed to serialize event"),
            }
        }
    });

    let mut consumer = ChannelConsumer::new(tx);
    let outcome = orchestrator.run(request, &mut consumer, cancel).await;
    drop(consumer);
    if let Err(e) = printer.await {
        warn!(error = %e, "Event printer stopped unexpectedly");
    }
    outcome
}

async fn run(cli: Cli) -> Result<u8, CliError> {
    let settings = settings_for(&cli)?;
    let tracker = Arc::new(tracker_for(&settings));

    if let Some(hours) = cli.purge_hours {
        let removed = tracker.cleanup_older_than(Duration::from_secs(hours.saturating_mul(3600)))?;
        println!("Removed {removed} stale session(s) from {}", tracker.root().display());
        return Ok(EXIT_COMPLETED);
    }

    let text = read_input(&cli)?;
    let orchestrator = orchestrator_for(&settings, Arc::clone(&tracker));

    if cli.dry_run {
        let chunks = orchestrator.plan(&text)?;
        println!("{}", format_plan(&chunks));
        return Ok(EXIT_COMPLETED);
    }

    if !settings.provider.is_available() {
        return Err(CliError::ProviderUnavailable(settings.provider));
    }

    let session = SessionId::generate();
    let mut request = StreamRequest::new(text).with_session_id(session.clone());
    if let Some(language) = &cli.lang {
        request = request.with_target_language(language.clone());
    }
    if let Some(voice) = settings.voice() {
        request = request.with_voice(voice);
    }

    let cancel = CancelToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupted, cancelling session");
            on_interrupt.cancel();
        }
    });

    let outcome = match &settings.translate_url {
        Some(url) => {
            let translator = HttpTranslator::new(url.clone(), DEFAULT_TRANSLATE_TIMEOUT)?
                .with_api_key(settings.translate_api_key.clone())
                .with_max_batch_chars(settings.max_translate_chars);
            speak(&orchestrator.with_translator(translator), request, cli.events, &cancel).await
        }
        None => speak(&orchestrator, request, cli.events, &cancel).await,
    };
    report_outcome(&outcome);

    if !(cli.keep || cli.events) {
        if let Err(e) = tracker.cleanup_session(&session) {
            warn!(session = %session, error = %e, "Failed to clean up session audio");
        }
    }
    Ok(exit_code(&outcome))
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.log_json);

    match run(cli).await {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            print_error(&e);
            ExitCode::from(EXIT_FAILED)
        }
    }
}
