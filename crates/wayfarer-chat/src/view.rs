//! Chat view: coordinates session, store, formatter, voice and connectivity.
//!
//! Accepts one send at a time. A second send while one is in flight, a send
//! while offline, or a blank send is rejected without touching the store.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

use chrono::Utc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use wayfarer_core::events::{ChatEvent, EventBus, Subscription};
use wayfarer_core::types::{Message, MessageBody, MessageId};

use crate::client::GenerativeClient;
use crate::connectivity::ConnectivitySignal;
use crate::error::ChatError;
use crate::formatter::ResponseFormatter;
use crate::session::ChatSession;
use crate::store::MessageStore;
use crate::voice::{InputBuffer, VoiceInterface};

/// Assistant text shown when the generative service fails.
pub const APOLOGY_TEXT: &str = "Sorry, I encountered an error. Please try again.";

/// Why a send was not attempted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    Empty,
    Offline,
    Busy,
}

/// Result of a send attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    /// The assistant replied; `message_id` is the reply.
    Delivered { message_id: MessageId },
    /// The service failed; `message_id` is the apology message.
    Failed { message_id: MessageId, reason: String },
    /// Nothing was appended and the service was not called.
    Rejected(RejectReason),
}

/// Clears the in-flight flag when the send completes, however it completes.
struct InFlightGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> InFlightGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| Self { flag })
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

/// Orchestrates a single chat transcript.
pub struct ChatView<C> {
    session: tokio::sync::Mutex<ChatSession<C>>,
    store: Mutex<MessageStore>,
    formatter: ResponseFormatter,
    voice: VoiceInterface,
    connectivity: ConnectivitySignal,
    input: InputBuffer,
    events: EventBus,
    in_flight: AtomicBool,
    auto_speak: bool,
}

impl<C: GenerativeClient> ChatView<C> {
    pub fn new(
        session: ChatSession<C>,
        store: MessageStore,
        voice: VoiceInterface,
        connectivity: ConnectivitySignal,
        events: EventBus,
    ) -> Self {
        Self {
            session: tokio::sync::Mutex::new(session),
            store: Mutex::new(store),
            formatter: ResponseFormatter::default(),
            voice,
            connectivity,
            input: InputBuffer::new(),
            events,
            in_flight: AtomicBool::new(false),
            auto_speak: false,
        }
    }

    pub fn with_formatter(mut self, formatter: ResponseFormatter) -> Self {
        self.formatter = formatter;
        self
    }

    /// Speak every successful reply.
    pub fn with_auto_speak(mut self, auto_speak: bool) -> Self {
        self.auto_speak = auto_speak;
        self
    }

    // -- Accessors --

    pub fn input(&self) -> &InputBuffer {
        &self.input
    }

    pub fn voice(&self) -> &VoiceInterface {
        &self.voice
    }

    pub fn connectivity(&self) -> &ConnectivitySignal {
        &self.connectivity
    }

    pub fn is_sending(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Listen for transcript and transcript-change events.
    pub fn subscribe(&self) -> Subscription {
        self.events.subscribe()
    }

    /// Snapshot of the transcript for rendering.
    pub fn messages(&self) -> Vec<Message> {
        self.lock_store().messages().to_vec()
    }

    pub fn message(&self, id: MessageId) -> Option<Message> {
        self.lock_store().get(id).cloned()
    }

    // -- Conversation --

    /// Start a fresh conversational context.
    pub async fn reset_conversation(&self) -> Uuid {
        let context_id = self.session.lock().await.initialize();
        self.events.emit(ChatEvent::ConversationReset {
            context_id,
            timestamp: Utc::now(),
        });
        context_id
    }

    /// Send the current input buffer.
    pub async fn send_input(&self) -> SendOutcome {
        let text = self.input.get();
        self.send(&text).await
    }

    /// Send user text and record the exchange.
    pub async fn send(&self, text: &str) -> SendOutcome {
        let text = text.trim();
        if text.is_empty() {
            return SendOutcome::Rejected(RejectReason::Empty);
        }
        if !self.connectivity.is_online() {
            debug!("Send rejected: offline");
            return SendOutcome::Rejected(RejectReason::Offline);
        }
        let Some(_guard) = InFlightGuard::acquire(&self.in_flight) else {
            debug!("Send rejected: request already in flight");
            return SendOutcome::Rejected(RejectReason::Busy);
        };

        self.append(Message::user(text));
        self.input.clear();

        let result = {
            let mut session = self.session.lock().await;
            session.send(text).await
        };

        match result {
            Ok(reply) => {
                let body = self.to_body(&reply);
                let spoken = body.plain_text();
                let message_id = self.append(Message::assistant(body));
                self.events.emit(ChatEvent::ResponseReceived {
                    message_id,
                    timestamp: Utc::now(),
                });
                if self.auto_speak {
                    if let Err(e) = self.voice.speak(&spoken) {
                        warn!(error = %e, "Auto-speak failed");
                    }
                }
                SendOutcome::Delivered { message_id }
            }
            Err(e) => {
                warn!(error = %e, "Error getting assistant response");
                let message_id = self.append(Message::assistant_error(APOLOGY_TEXT));
                let reason = e.to_string();
                self.events.emit(ChatEvent::RequestFailed {
                    reason: reason.clone(),
                    timestamp: Utc::now(),
                });
                SendOutcome::Failed { message_id, reason }
            }
        }
    }

    /// Erase the transcript and its persisted copy.
    pub fn clear_history(&self) -> Result<(), ChatError> {
        self.voice.stop();
        self.lock_store().clear()
    }

    // -- Voice --

    /// Toggle playback of an assistant reply.
    ///
    /// Returns `Ok(false)` for user or error messages, which have no playback.
    pub fn speak_message(&self, id: MessageId) -> Result<bool, ChatError> {
        let Some(message) = self.message(id) else {
            return Ok(false);
        };
        if message.is_user() || message.is_error() {
            return Ok(false);
        }
        self.voice.toggle(&message.plain_text())?;
        Ok(true)
    }

    pub fn stop_speaking(&self) {
        self.voice.stop();
    }

    /// Capture speech into the input buffer.
    pub fn listen(&self) -> Result<(), ChatError> {
        let input = self.input.clone();
        self.voice.listen(move |transcript| {
            input.append_transcript(transcript);
        })
    }

    // -- Helpers --

    fn to_body(&self, reply: &str) -> MessageBody {
        if self.formatter.has_markup(reply) {
            let content = self.formatter.format(reply);
            if !content.is_empty() {
                return MessageBody::Formatted(content);
            }
        }
        MessageBody::Plain(reply.trim().to_string())
    }

    /// Append and return the stored id. Persistence failures are logged; the
    /// message stays in the transcript. A message the store refuses is logged
    /// and its requested id returned.
    fn append(&self, message: Message) -> MessageId {
        let requested = message.id();
        let mut store = self.lock_store();
        let before = store.len();
        let appended = store
            .append(message)
            .map(|stored| (stored.id(), stored.author()));
        match appended {
            Ok((id, author)) => {
                info!(message_id = %id, %author, "Message appended");
                id
            }
            Err(e) if store.len() > before => {
                warn!(error = %e, "Failed to persist chat history");
                store.last().map_or(requested, |m| m.id())
            }
            Err(e) => {
                warn!(error = %e, message_id = %requested, "Message rejected by store");
                requested
            }
        }
    }

    fn lock_store(&self) -> MutexGuard<'_, MessageStore> {
        self.store
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl<C> std::fmt::Debug for ChatView<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatView")
            .field("voice", &self.voice)
            .field("online", &self.connectivity.is_online())
            .field("in_flight", &self.in_flight.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}
