//! Speech output through an external text-to-speech program.
//!
//! The configured command (for example `espeak` or `say`) is run with the
//! configured arguments followed by the text. `{lang}` in an argument is
//! replaced with the utterance language. Cancelling kills the child.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use chrono::Utc;
use tokio::process::Command;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use wayfarer_chat::{SpeechSynthesizer, Utterance};
use wayfarer_core::config::VoiceConfig;
use wayfarer_core::error::WayfarerError;
use wayfarer_core::events::{ChatEvent, EventBus};

/// Runs one TTS child process at a time.
pub struct CommandSynthesizer {
    program: String,
    args: Vec<String>,
    speaking: Arc<AtomicBool>,
    generation: Arc<AtomicU64>,
    cancel: Mutex<Option<oneshot::Sender<()>>>,
}

impl CommandSynthesizer {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            speaking: Arc::new(AtomicBool::new(false)),
            generation: Arc::new(AtomicU64::new(0)),
            cancel: Mutex::new(None),
        }
    }

    /// Build from `[voice]`. Returns `None` when voice is disabled or no
    /// command is configured.
    pub fn from_config(config: &VoiceConfig) -> Option<Self> {
        if !config.enabled {
            return None;
        }
        let program = config.tts_command.as_deref()?.trim();
        if program.is_empty() {
            return None;
        }
        info!(program, "Speech output via external command");
        Some(Self::new(program, config.tts_args.clone()))
    }

    fn command(&self, utterance: &Utterance) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(
            self.args
                .iter()
                .map(|arg| arg.replace("{lang}", &utterance.language)),
        )
        .arg(&utterance.text)
        .stdin(std::process::Stdio::null())
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .kill_on_drop(true);
        cmd
    }

    fn take_cancel(&self) -> Option<oneshot::Sender<()>> {
        self.cancel.lock().ok().and_then(|mut slot| slot.take())
    }
}

impl SpeechSynthesizer for CommandSynthesizer {
    fn speak(&self, utterance: Utterance, events: EventBus) -> Result<(), WayfarerError> {
        let mut child = self.command(&utterance).spawn().map_err(|e| {
            WayfarerError::Voice(format!("failed to start {}: {}", self.program, e))
        })?;

        let (tx, rx) = oneshot::channel::<()>();
        if let Some(previous) = self
            .cancel
            .lock()
            .map_err(|e| WayfarerError::Voice(format!("Lock poisoned: {}", e)))?
            .replace(tx)
        {
            let _ = previous.send(());
        }

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let current = Arc::clone(&self.generation);
        let speaking = Arc::clone(&self.speaking);
        speaking.store(true, Ordering::SeqCst);
        events.emit(ChatEvent::SpeechStarted {
            timestamp: Utc::now(),
        });

        tokio::spawn(async move {
            tokio::select! {
                status = child.wait() => match status {
                    Ok(status) if !status.success() => {
                        warn!(%status, "Speech command exited with failure");
                    }
                    Err(e) => warn!(error = %e, "Failed to wait for speech command"),
                    Ok(_) => {}
                },
                _ = rx => {
                    if let Err(e) = child.kill().await {
                        debug!(error = %e, "Speech command already exited");
                    }
                }
            }
            // A replaced playback ends silently; its successor reports the end.
            if current.load(Ordering::SeqCst) == generation {
                speaking.store(false, Ordering::SeqCst);
                events.emit(ChatEvent::SpeechEnded {
                    timestamp: Utc::now(),
                });
            }
        });
        Ok(())
    }

    fn cancel(&self) {
        if let Some(tx) = self.take_cancel() {
            let _ = tx.send(());
        }
        self.speaking.store(false, Ordering::SeqCst);
    }

    fn is_speaking(&self) -> bool {
        self.speaking.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for CommandSynthesizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandSynthesizer")
            .field("program", &self.program)
            .field("args", &self.args)
            .field("speaking", &self.is_speaking())
            .finish()
    }
}
