use anyhow::{Context, Result, bail};
use avatar_core::remote::HttpClassifier;
use avatar_core::{ClipCatalog, IntentResolver, SessionController, SessionHandle, SessionParts};
use avatar_service::command::{Command, HELP};
use avatar_service::config::Config;
use avatar_service::stage::{SimulatedElement, StageTiming};
use avatar_service::terminal::{TerminalEngine, TypedSpeech};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::watch;
use tracing_subscriber::fmt::time::ChronoLocal;

#[derive(Parser)]
#[command(version, about = "Run the talking-avatar conversation loop in a terminal")]
struct Cli {
    /// Remote intent classifier endpoint (overrides AVATAR_CLASSIFIER_URL)
    #[arg(long)]
    classifier_url: Option<String>,

    /// Directory holding the clip files. Every clip must be present.
    #[arg(long, value_name = "DIR")]
    clips: Option<PathBuf>,

    /// Simulated length of non-looping clips, in seconds
    #[arg(long, default_value_t = 3.0)]
    clip_secs: f64,

    /// Classify with keywords only, never calling the remote classifier
    #[arg(long)]
    local_only: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // --- 1. Load Configuration ---
    let config = Config::from_env().context("Failed to load application configuration")?;

    // --- 2. Initialize Logging ---
    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_timer(ChronoLocal::rfc_3339())
        .init();

    let args = Cli::parse();
    if !args.clip_secs.is_finite() || args.clip_secs <= 0.0 {
        bail!("--clip-secs must be a positive number of seconds");
    }
    let session_config = config.session_config();

    // --- 3. Clips ---
    let catalog = match &args.clips {
        Some(dir) => {
            let missing = ClipCatalog::missing_files(dir);
            if !missing.is_empty() {
                let names: Vec<String> = missing.iter().map(|p| p.display().to_string()).collect();
                bail!("Clip directory is incomplete, missing: {}", names.join(", "));
            }
            ClipCatalog::new(dir.display().to_string())
        }
        None => ClipCatalog::new(config.clip_base.clone()),
    };
    tracing::info!("Serving clips from {}", catalog.base());

    // --- 4. Classifier ---
    let endpoint = args.classifier_url.clone().or_else(|| config.classifier_url.clone());
    let resolver = match endpoint {
        Some(endpoint) if !args.local_only => {
            let mut client = HttpClassifier::new(endpoint, session_config.remote_timeout)
                .context("Failed to build the classifier HTTP client")?;
            if let Some(token) = config.classifier_token.clone() {
                client = client.with_token(token);
            }
            tracing::info!("Using remote classifier at {}", client.endpoint());
            IntentResolver::with_remote(Arc::new(client), session_config.remote_timeout)
        }
        _ => {
            tracing::info!("Using keyword classification only");
            IntentResolver::local()
        }
    };

    // --- 5. Session ---
    let speech = TypedSpeech::default();
    let timing = StageTiming {
        clip_length: Duration::from_secs_f64(args.clip_secs),
        verify_files: args.clips.is_some(),
        ..StageTiming::default()
    };
    let parts = SessionParts {
        engine: Box::new(TerminalEngine::new(speech.clone())),
        elements: [
            Box::new(SimulatedElement::new("primary", timing)),
            Box::new(SimulatedElement::new("secondary", timing)),
        ],
        catalog,
        resolver,
        config: session_config,
    };
    let (handle, session_task) = SessionController::spawn(parts);
    let reporter = tokio::spawn(report_snapshots(handle.subscribe()));

    println!("{HELP}");

    // --- 6. Terminal loop ---
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.context("Failed to read from stdin")? else {
                    break;
                };
                let Some(command) = Command::parse(&line) else {
                    continue;
                };
                if !run_command(command, &handle, &speech)? {
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Received Ctrl-C, shutting down...");
                break;
            }
        }
    }

    tracing::info!("Shutting down...");
    // The loop may already be gone; nothing left to stop then.
    let _ = handle.shutdown();
    session_task.await.context("Session task failed")?;
    reporter.abort();
    Ok(())
}

/// Returns `false` when the user asked to quit.
fn run_command(command: Command, handle: &SessionHandle, speech: &TypedSpeech) -> Result<bool> {
    match command {
        Command::Start => handle.start()?,
        Command::Stop => handle.stop()?,
        Command::RetryPermission => handle.retry_permission()?,
        Command::DismissError => handle.dismiss_error()?,
        Command::ClipEnded => handle.simulate_clip_ended()?,
        Command::Type(text) => handle.submit_text(text)?,
        Command::Say(text) => {
            if !speech.deliver(&text) {
                println!("(the microphone is closed; /type submits text directly)");
            }
        }
        Command::Status => {
            let snapshot = serde_json::to_string_pretty(&handle.snapshot())
                .context("Failed to serialize the session snapshot")?;
            println!("{snapshot}");
        }
        Command::Help => println!("{HELP}"),
        Command::Quit => return Ok(false),
        Command::Unknown(line) => println!("Unknown command: {line} (try /help)"),
    }
    Ok(true)
}

async fn report_snapshots(mut watcher: watch::Receiver<avatar_core::SessionSnapshot>) {
    let mut previous = watcher.borrow_and_update().clone();
    while watcher.changed().await.is_ok() {
        let snapshot = watcher.borrow_and_update().clone();
        tracing::info!(
            phase = %snapshot.phase,
            clip = %snapshot.current_clip,
            looping = snapshot.is_looping,
            transcript = %snapshot.transcript,
            "Session updated"
        );
        if snapshot.last_category != previous.last_category
            || snapshot.last_summary != previous.last_summary
        {
            if let Some(category) = snapshot.last_category {
                tracing::info!(
                    %category,
                    summary = snapshot.last_summary.as_deref().unwrap_or("-"),
                    keyword = snapshot.last_keyword_match.as_deref().unwrap_or("-"),
                    "Heard"
                );
            }
        }
        if snapshot.error_message != previous.error_message {
            if let Some(message) = &snapshot.error_message {
                tracing::warn!("{}", message);
            }
        }
        previous = snapshot;
    }
}
