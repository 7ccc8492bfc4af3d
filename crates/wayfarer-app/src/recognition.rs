//! Speech input through an external speech-to-text program.
//!
//! The configured command is started with the configured arguments
//! (`{lang}` replaced with the capture language) and every non-blank line
//! it prints is published as a transcript. The session ends when the
//! program exits or the capture is aborted, which kills the child.

use std::process::Stdio;
use std::sync::Mutex;

use chrono::Utc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use wayfarer_chat::{RecognitionConfig, SpeechRecognizer};
use wayfarer_core::config::VoiceConfig;
use wayfarer_core::error::WayfarerError;
use wayfarer_core::events::{ChatEvent, EventBus};

/// Runs one STT child process at a time.
pub struct CommandRecognizer {
    program: String,
    args: Vec<String>,
    cancel: Mutex<Option<oneshot::Sender<()>>>,
}

impl CommandRecognizer {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            cancel: Mutex::new(None),
        }
    }

    /// Build from `[voice]`. Returns `None` when voice is disabled or no
    /// command is configured.
    pub fn from_config(config: &VoiceConfig) -> Option<Self> {
        if !config.enabled {
            return None;
        }
        let program = config.stt_command.as_deref()?.trim();
        if program.is_empty() {
            return None;
        }
        info!(program, "Speech input via external command");
        Some(Self::new(program, config.stt_args.clone()))
    }

    fn command(&self, language: &str) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(self.args.iter().map(|arg| arg.replace("{lang}", language)))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        cmd
    }
}

impl SpeechRecognizer for CommandRecognizer {
    fn start(&self, config: RecognitionConfig, events: EventBus) -> Result<(), WayfarerError> {
        let mut child = self.command(&config.language).spawn().map_err(|e| {
            WayfarerError::Voice(format!("failed to start {}: {}", self.program, e))
        })?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| WayfarerError::Voice(format!("{} has no output", self.program)))?;

        let (tx, mut rx) = oneshot::channel::<()>();
        if let Some(previous) = self
            .cancel
            .lock()
            .map_err(|e| WayfarerError::Voice(format!("Lock poisoned: {}", e)))?
            .replace(tx)
        {
            let _ = previous.send(());
        }

        debug!(
            language = %config.language,
            interim = config.interim_results,
            "Speech capture started"
        );
        events.emit(ChatEvent::RecognitionStarted {
            timestamp: Utc::now(),
        });

        let program = self.program.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            let aborted = loop {
                tokio::select! {
                    line = lines.next_line() => match line {
                        Ok(Some(line)) => {
                            let transcript = line.trim();
                            if !transcript.is_empty() {
                                events.emit(ChatEvent::TranscriptRecognized {
                                    transcript: transcript.to_string(),
                                    timestamp: Utc::now(),
                                });
                            }
                        }
                        Ok(None) => break false,
                        Err(e) => {
                            warn!(error = %e, "Failed to read speech command output");
                            break false;
                        }
                    },
                    _ = &mut rx => break true,
                }
            };

            if aborted {
                if let Err(e) = child.kill().await {
                    debug!(error = %e, "Speech capture command already exited");
                }
                events.emit(ChatEvent::RecognitionEnded {
                    timestamp: Utc::now(),
                });
                return;
            }

            match child.wait().await {
                Ok(status) if status.success() => events.emit(ChatEvent::RecognitionEnded {
                    timestamp: Utc::now(),
                }),
                Ok(status) => events.emit(ChatEvent::RecognitionError {
                    reason: format!("{} exited with {}", program, status),
                    timestamp: Utc::now(),
                }),
                Err(e) => events.emit(ChatEvent::RecognitionError {
                    reason: format!("failed to wait for {}: {}", program, e),
                    timestamp: Utc::now(),
                }),
            }
        });
        Ok(())
    }

    fn abort(&self) {
        let cancel = self.cancel.lock().ok().and_then(|mut slot| slot.take());
        if let Some(tx) = cancel {
            let _ = tx.send(());
        }
    }
}

impl std::fmt::Debug for CommandRecognizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandRecognizer")
            .field("program", &self.program)
            .field("args", &self.args)
            .finish()
    }
}
