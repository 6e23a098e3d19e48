//! # Main Entry Point
//!
//! Replays a recorded model response through the streaming parser against a local
//! sandbox directory and prints what the turn produced.

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use futures::StreamExt;
use futures::stream::BoxStream;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_stream::wrappers::LinesStream;
use tracing::{info, warn};

use boltstream::application::driver::{TurnDriver, TurnOutcome, stop_channel};
use boltstream::application::protocol::{LineDecoder, StreamRecord};
use boltstream::domain::config::{AppConfig, DEFAULT_CONFIG_PATH};
use boltstream::infrastructure::logging;
use boltstream::infrastructure::tools::sandbox::LocalSandbox;
use boltstream::strings::logs;

const DEFAULT_RAW_CHUNK: usize = 64;

#[derive(Parser)]
#[command(name = "boltstream")]
#[command(about = "Streaming parser and executor for boltAction responses")]
struct Cli {
    /// Path to the YAML configuration
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Sandbox directory (overrides workspace.sandbox_dir)
    #[arg(long)]
    sandbox: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Replay a recorded response stream
    Replay(ReplayArgs),
}

#[derive(Args)]
struct ReplayArgs {
    /// Transcript of protocol lines (or plain model text with --raw)
    transcript: PathBuf,

    /// Treat the transcript as model text and split it into `0:` records
    #[arg(long)]
    raw: bool,

    /// Chunk size: characters per record with --raw, bytes per transport chunk otherwise
    #[arg(long)]
    chunk_size: Option<usize>,

    /// Keep the sandbox unavailable until this many lines were processed
    #[arg(long)]
    ready_after: Option<usize>,
}

type LineStream = BoxStream<'static, Result<String>>;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = AppConfig::load(&cli.config)?;
    let _guard = logging::init(&config.logging)?;
    if cli.config.exists() {
        info!("{}", logs::config_loaded(&cli.config.display().to_string()));
    } else {
        info!("{}", logs::CONFIG_MISSING);
    }

    match cli.command {
        Command::Replay(args) => replay(&config, cli.sandbox, args).await,
    }
}

async fn replay(config: &AppConfig, sandbox_dir: Option<PathBuf>, args: ReplayArgs) -> Result<()> {
    let work_dir = config.work_dir()?;
    let sandbox_dir = sandbox_dir.unwrap_or_else(|| PathBuf::from(&config.workspace.sandbox_dir));
    let sandbox = Arc::new(LocalSandbox::new(&sandbox_dir, work_dir.clone(), &config.commands)?);
    if args.ready_after.is_some() {
        sandbox.set_ready(false);
    }

    let chunking = match (args.raw, args.chunk_size) {
        (true, size) => format!("raw, {} chars per record", size.unwrap_or(DEFAULT_RAW_CHUNK)),
        (false, Some(size)) => format!("{} bytes per chunk", size),
        (false, None) => "line by line".to_string(),
    };
    info!("{}", logs::replay_started(&args.transcript.display().to_string(), &chunking));

    let lines = transcript_lines(&args).await?;
    let lines = gate_readiness(lines, sandbox.clone(), args.ready_after);

    let (stop, signal) = stop_channel();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => stop.stop(),
            Err(e) => warn!("{}", logs::shutdown_fail(&e.to_string())),
        }
    });

    let mut driver = TurnDriver::new(sandbox, work_dir, &config.parser);
    let outcome = driver.run_turn(lines, signal).await;

    println!("{}\n", outcome.narrative);
    println!("{}\n", driver.feed().render());
    print_outcome(&outcome);

    if let Some(err) = outcome.error {
        bail!("{}", err);
    }
    Ok(())
}

async fn transcript_lines(args: &ReplayArgs) -> Result<LineStream> {
    let path = &args.transcript;

    if args.raw {
        let text = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let size = args.chunk_size.unwrap_or(DEFAULT_RAW_CHUNK).max(1);
        let stream = async_stream::stream! {
            let chars: Vec<char> = text.chars().collect();
            for chunk in chars.chunks(size) {
                let chunk: String = chunk.iter().collect();
                yield Ok::<_, anyhow::Error>(StreamRecord::text_line(&chunk));
            }
        };
        return Ok(stream.boxed());
    }

    match args.chunk_size {
        None => {
            let file = tokio::fs::File::open(path)
                .await
                .with_context(|| format!("Failed to open {}", path.display()))?;
            let lines = LinesStream::new(BufReader::new(file).lines());
            Ok(lines
                .map(|line| line.context("Failed to read transcript line"))
                .boxed())
        }
        Some(size) => {
            let bytes = tokio::fs::read(path)
                .await
                .with_context(|| format!("Failed to read {}", path.display()))?;
            let size = size.max(1);
            let stream = async_stream::stream! {
                let mut decoder = LineDecoder::new();
                for chunk in bytes.chunks(size) {
                    for line in decoder.feed(chunk) {
                        yield Ok::<_, anyhow::Error>(line);
                    }
                }
                if let Some(line) = decoder.finish() {
                    yield Ok(line);
                }
            };
            Ok(stream.boxed())
        }
    }
}

/// Flips the sandbox to ready once `ready_after` lines have gone through.
fn gate_readiness(lines: LineStream, sandbox: Arc<LocalSandbox>, ready_after: Option<usize>) -> LineStream {
    let Some(threshold) = ready_after else {
        return lines;
    };

    async_stream::stream! {
        let mut lines = lines;
        let mut seen = 0;
        while let Some(line) = lines.next().await {
            if seen == threshold {
                sandbox.set_ready(true);
            }
            seen += 1;
            yield line;
        }
        sandbox.set_ready(true);
    }
    .boxed()
}

fn print_outcome(outcome: &TurnOutcome) {
    println!("Files: {}", outcome.files.len());
    for file in &outcome.files {
        println!("  {}", file);
    }
    println!("Commands: {}", outcome.commands.len());
    for command in &outcome.commands {
        println!("  {}", command);
    }
    if let Some(flush) = &outcome.flush {
        println!(
            "Flushed: {} applied, {} failed{}",
            flush.applied,
            flush.failed,
            flush
                .first_file
                .as_deref()
                .map(|f| format!(", opened {}", f))
                .unwrap_or_default()
        );
    }
    if outcome.pending > 0 {
        println!("Pending: {}", outcome.pending);
    }
    if let Some(truncated) = &outcome.truncated {
        println!("Truncated: {}", truncated);
    }
    if outcome.used_fallback {
        println!("Recovered from code fences");
    }
    if outcome.cancelled {
        println!("Cancelled");
    }
    if let Some(usage) = &outcome.usage {
        println!("Usage: {}", usage);
    }
}
