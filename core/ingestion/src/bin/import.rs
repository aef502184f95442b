/// Import Binary - Classifies a saved classifier response and stores it as a log
///
/// Usage:
///   cargo run --bin import -- [--db-path <path>] [--audio-path <path>] <payload.json>
///
/// The payload is the classifier's JSON object: a `transcript` string and a
/// `segments` array. Unknown segment types and malformed fragments are skipped.

use anyhow::{bail, Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::{info, warn, Level};
use voice_journal_ingestion::{Database, SegmentExtractor, ServiceConfig, StorageCoordinator};

#[derive(Parser, Debug)]
#[command(name = "import")]
#[command(about = "Classify a saved classifier response and store it as a journal log")]
struct Args {
    /// Path to SQLite database file (defaults to JOURNAL_DB_PATH)
    #[arg(long, short)]
    db_path: Option<PathBuf>,

    /// Recording the transcript came from
    #[arg(long)]
    audio_path: Option<String>,

    /// Order segments by type, then confidence
    #[arg(long)]
    sort_by_type: bool,

    /// Drop segments below this confidence
    #[arg(long)]
    min_confidence: Option<f64>,

    /// Classifier response JSON file
    payload: PathBuf,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let mut config = ServiceConfig::from_env()?;

    if let Some(db_path) = args.db_path {
        config.db_path = db_path;
    }
    if args.sort_by_type {
        config.extraction.sort_by_type = true;
    }
    if let Some(min) = args.min_confidence {
        config.extraction.min_confidence = min;
    }

    let raw = std::fs::read_to_string(&args.payload)
        .with_context(|| format!("failed to read {}", args.payload.display()))?;

    let extractor = SegmentExtractor::new(config.extraction);
    let result = extractor.parse_and_extract(raw.as_str())?;

    let Some(transcript) = result.transcript.as_deref() else {
        bail!("{} has no transcript", args.payload.display());
    };

    if result.skipped > 0 {
        warn!("Skipped {} unusable segments", result.skipped);
    }
    info!(
        "Classified {} segments: {} todos, {} ideas, {} learnings, {} accomplishments ({} need review)",
        result.stats.total,
        result.stats.by_type.todo,
        result.stats.by_type.idea,
        result.stats.by_type.learning,
        result.stats.by_type.accomplishment,
        result.stats.needs_review
    );

    if let Some(parent) = config.db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let store = StorageCoordinator::new(Database::new(&config.db_path)?, config.storage);
    info!("Database: {}", config.db_path.display());

    let saved = store.save_analysis_result(transcript, &result.segments, args.audio_path.as_deref())?;
    info!("Stored log {} with {} segments", saved.log.id, saved.segment_count());

    println!("{}", serde_json::to_string_pretty(&saved)?);
    Ok(())
}
