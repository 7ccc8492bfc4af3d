//! Voice input and output.
//!
//! Speech engines are optional host capabilities. When an engine is absent
//! the matching operations are inert and only log a diagnostic. At most one
//! playback and one capture session are active; starting another first
//! stops the current one.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use wayfarer_core::error::WayfarerError;
use wayfarer_core::events::{ChatEvent, EventBus};

use crate::error::ChatError;

// =============================================================================
// Capability interfaces
// =============================================================================

/// Text to be spoken.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Utterance {
    pub text: String,
    /// BCP 47 language tag.
    pub language: String,
}

/// Parameters for a single-utterance capture session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecognitionConfig {
    pub language: String,
    pub interim_results: bool,
}

/// Speech synthesis engine.
///
/// Implementations emit [`ChatEvent::SpeechStarted`] and
/// [`ChatEvent::SpeechEnded`] on the supplied bus.
pub trait SpeechSynthesizer: Send + Sync {
    /// Begin playback without waiting for it to finish.
    fn speak(&self, utterance: Utterance, events: EventBus) -> Result<(), WayfarerError>;

    /// Cancel playback. Must be harmless when idle.
    fn cancel(&self);

    fn is_speaking(&self) -> bool;
}

/// Speech recognition engine.
///
/// Implementations emit `RecognitionStarted`, `TranscriptRecognized`,
/// `RecognitionError` and `RecognitionEnded` on the supplied bus.
pub trait SpeechRecognizer: Send + Sync {
    fn start(&self, config: RecognitionConfig, events: EventBus) -> Result<(), WayfarerError>;

    /// Abort the active capture session, if any.
    fn abort(&self);
}

// =============================================================================
// InputBuffer
// =============================================================================

/// Shared text the user is composing.
#[derive(Debug, Clone, Default)]
pub struct InputBuffer {
    text: Arc<Mutex<String>>,
}

impl InputBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> String {
        self.text.lock().map(|t| t.clone()).unwrap_or_default()
    }

    pub fn set(&self, value: impl Into<String>) {
        if let Ok(mut text) = self.text.lock() {
            *text = value.into();
        }
    }

    /// Return the current contents and leave the buffer empty.
    pub fn take(&self) -> String {
        self.text
            .lock()
            .map(|mut t| std::mem::take(&mut *t))
            .unwrap_or_default()
    }

    pub fn clear(&self) {
        self.set(String::new());
    }

    /// Append a recognized transcript, separated from existing text by one space.
    pub fn append_transcript(&self, transcript: &str) {
        let transcript = transcript.trim();
        if transcript.is_empty() {
            return;
        }
        if let Ok(mut text) = self.text.lock() {
            if !text.is_empty() && !text.ends_with(char::is_whitespace) {
                text.push(' ');
            }
            text.push_str(transcript);
        }
    }
}

// =============================================================================
// VoiceInterface
// =============================================================================

/// Voice adapter coordinating optional synthesis and recognition engines.
pub struct VoiceInterface {
    synthesizer: Option<Arc<dyn SpeechSynthesizer>>,
    recognizer: Option<Arc<dyn SpeechRecognizer>>,
    language: String,
    events: EventBus,
    listening: Arc<AtomicBool>,
    generation: Arc<AtomicU64>,
    listen_task: Mutex<Option<JoinHandle<()>>>,
}

impl VoiceInterface {
    pub fn new(
        synthesizer: Option<Arc<dyn SpeechSynthesizer>>,
        recognizer: Option<Arc<dyn SpeechRecognizer>>,
        language: impl Into<String>,
        events: EventBus,
    ) -> Self {
        Self {
            synthesizer,
            recognizer,
            language: language.into(),
            events,
            listening: Arc::new(AtomicBool::new(false)),
            generation: Arc::new(AtomicU64::new(0)),
            listen_task: Mutex::new(None),
        }
    }

    /// A voice adapter with no engines; every operation is inert.
    pub fn disabled(events: EventBus) -> Self {
        Self::new(None, None, "en-US", events)
    }

    pub fn can_speak(&self) -> bool {
        self.synthesizer.is_some()
    }

    pub fn can_listen(&self) -> bool {
        self.recognizer.is_some()
    }

    pub fn is_speaking(&self) -> bool {
        self.synthesizer
            .as_ref()
            .is_some_and(|engine| engine.is_speaking())
    }

    pub fn is_listening(&self) -> bool {
        self.listening.load(Ordering::SeqCst)
    }

    /// Speak `text`, cancelling any playback in progress.
    pub fn speak(&self, text: &str) -> Result<(), ChatError> {
        let Some(engine) = self.synthesizer.as_ref() else {
            debug!("Speech synthesis unavailable; speak ignored");
            return Ok(());
        };
        if text.trim().is_empty() {
            return Ok(());
        }
        if engine.is_speaking() {
            engine.cancel();
        }
        engine.speak(
            Utterance {
                text: text.to_string(),
                language: self.language.clone(),
            },
            self.events.clone(),
        )?;
        debug!(chars = text.len(), "Playback started");
        Ok(())
    }

    /// Cancel playback. No-op when idle or unavailable.
    pub fn stop(&self) {
        if let Some(engine) = self.synthesizer.as_ref() {
            if engine.is_speaking() {
                engine.cancel();
                debug!("Playback stopped");
            }
        }
    }

    /// Stop if speaking, otherwise speak `text`.
    pub fn toggle(&self, text: &str) -> Result<(), ChatError> {
        if self.is_speaking() {
            self.stop();
            Ok(())
        } else {
            self.speak(text)
        }
    }

    /// Start a single-utterance capture session.
    ///
    /// Every recognized transcript is handed to `on_transcript`. The session
    /// ends on the first error or on the engine's natural end. Without a
    /// recognizer this only logs a diagnostic.
    pub fn listen<F>(&self, mut on_transcript: F) -> Result<(), ChatError>
    where
        F: FnMut(&str) + Send + 'static,
    {
        let Some(recognizer) = self.recognizer.clone() else {
            info!("Speech recognition is not available on this host");
            return Ok(());
        };

        self.stop_listening();

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let mut subscription = self.events.subscribe();
        let listening = Arc::clone(&self.listening);
        let current = Arc::clone(&self.generation);
        listening.store(true, Ordering::SeqCst);

        let task = tokio::spawn(async move {
            while let Some(event) = subscription.recv().await {
                match event {
                    ChatEvent::TranscriptRecognized { transcript, .. } => {
                        on_transcript(&transcript);
                    }
                    ChatEvent::RecognitionError { reason, .. } => {
                        warn!(reason = %reason, "Speech recognition error");
                        break;
                    }
                    ChatEvent::RecognitionEnded { .. } => break,
                    _ => {}
                }
            }
            if current.load(Ordering::SeqCst) == generation {
                listening.store(false, Ordering::SeqCst);
            }
        });

        let config = RecognitionConfig {
            language: self.language.clone(),
            interim_results: false,
        };
        if let Err(e) = recognizer.start(config, self.events.clone()) {
            task.abort();
            self.listening.store(false, Ordering::SeqCst);
            return Err(e.into());
        }

        if let Ok(mut slot) = self.listen_task.lock() {
            *slot = Some(task);
        }
        debug!(generation, "Capture session started");
        Ok(())
    }

    /// Abort the active capture session. No-op when not listening.
    pub fn stop_listening(&self) {
        let task = self.listen_task.lock().ok().and_then(|mut slot| slot.take());
        if let Some(task) = task {
            task.abort();
        }
        if self.listening.swap(false, Ordering::SeqCst) {
            if let Some(recognizer) = self.recognizer.as_ref() {
                recognizer.abort();
            }
            debug!("Capture session stopped");
        }
    }
}

impl Drop for VoiceInterface {
    fn drop(&mut self) {
        self.stop();
        self.stop_listening();
    }
}

impl std::fmt::Debug for VoiceInterface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VoiceInterface")
            .field("can_speak", &self.can_speak())
            .field("can_listen", &self.can_listen())
            .field("language", &self.language)
            .field("listening", &self.is_listening())
            .finish()
    }
}
