//! Wayfarer application binary - composition root.
//!
//! Ties the Wayfarer crates into a single executable:
//! 1. Load configuration from TOML and install logging
//! 2. Open chat history storage (SQLite, or memory with `--ephemeral`)
//! 3. Build the Gemini client, chat session and voice adapter
//! 4. Start the connectivity probe
//! 5. Run the interactive chat loop

mod chat_loop;
mod cli;
mod commands;
mod probe;
mod recognition;
mod render;
mod speech;

use std::path::Path;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use wayfarer_chat::{
    ChatSession, ChatView, ConnectivitySignal, GeminiClient, GenerationConfig, MessageStore,
    ResponseFormatter, SpeechRecognizer, SpeechSynthesizer, VoiceInterface,
};
use wayfarer_core::config::WayfarerConfig;
use wayfarer_core::error::WayfarerError;
use wayfarer_core::events::EventBus;
use wayfarer_storage::{Database, KeyValueStore, MemoryKeyValueStore, SqliteKeyValueStore};

use crate::cli::CliArgs;
use crate::recognition::CommandRecognizer;
use crate::speech::CommandSynthesizer;

/// Install the stderr subscriber. `RUST_LOG` wins over the configured level.
fn init_tracing(log_level: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level)),
        )
        .with_writer(std::io::stderr)
        .init();
}

/// Open the key-value store backing chat history.
fn open_history(ephemeral: bool, data_dir: &Path) -> Result<Arc<dyn KeyValueStore>, WayfarerError> {
    if ephemeral {
        tracing::info!("Ephemeral mode: chat history kept in memory");
        return Ok(Arc::new(MemoryKeyValueStore::new()));
    }
    let db_path = data_dir.join("wayfarer.db");
    let db = Database::new(&db_path)?;
    tracing::info!(path = %db_path.display(), "SQLite database opened");
    Ok(Arc::new(SqliteKeyValueStore::new(Arc::new(db))))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();

    // Config, then tracing at the configured level.
    let config_file = args.resolve_config_path();
    let loaded = WayfarerConfig::load(&config_file);
    let config = loaded.as_ref().cloned().unwrap_or_default();
    init_tracing(&config.general.log_level);

    tracing::info!("Starting Wayfarer v{}", env!("CARGO_PKG_VERSION"));
    match &loaded {
        Ok(_) => tracing::info!(path = %config_file.display(), "Configuration loaded"),
        Err(e) if config_file.exists() => tracing::warn!(
            path = %config_file.display(),
            error = %e,
            "Invalid configuration; using defaults"
        ),
        Err(_) => tracing::debug!(path = %config_file.display(), "No configuration file; using defaults"),
    }

    // Generative client. A missing API key is fatal.
    let client = match GeminiClient::from_config(&config.gemini) {
        Ok(client) => client,
        Err(e) => {
            tracing::error!(error = %e, "Cannot start without a Gemini API key");
            eprintln!("{}", render::warning(&e.to_string()));
            return Err(e.into());
        }
    };
    tracing::info!(model = client.model(), "Gemini client ready");

    // Storage.
    let events = EventBus::default();
    let kv = open_history(args.ephemeral, &config.general.data_path())?;
    let store = MessageStore::restore(kv, events.clone());

    // Voice. Both engines are external commands from `[voice]`.
    let (synthesizer, recognizer) = if args.no_voice {
        (None, None)
    } else {
        (
            CommandSynthesizer::from_config(&config.voice)
                .map(|s| Arc::new(s) as Arc<dyn SpeechSynthesizer>),
            CommandRecognizer::from_config(&config.voice)
                .map(|r| Arc::new(r) as Arc<dyn SpeechRecognizer>),
        )
    };
    let voice = VoiceInterface::new(
        synthesizer,
        recognizer,
        &config.voice.language,
        events.clone(),
    );

    // Connectivity.
    let connectivity = ConnectivitySignal::new(true, events.clone());
    let probe = probe::spawn_probe(connectivity.clone(), config.network.clone());

    // View.
    let session = ChatSession::new(client, GenerationConfig::from(&config.generation));
    let view = ChatView::new(session, store, voice, connectivity, events)
        .with_formatter(ResponseFormatter::new(config.chat.emphasis_marker.as_str()))
        .with_auto_speak(config.chat.auto_speak && !args.no_voice);
    let view = Arc::new(view);

    if args.clear {
        if let Err(e) = view.clear_history() {
            tracing::warn!(error = %e, "Failed to erase saved history");
        }
    }
    view.reset_conversation().await;

    let result = chat_loop::run(Arc::clone(&view)).await;
    probe.abort();
    tracing::info!("Wayfarer stopped");
    result?;
    Ok(())
}
