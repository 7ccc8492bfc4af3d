use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{trace, warn};
use uuid::Uuid;

use crate::types::{Author, MessageId};

/// Default buffer size for the event channel.
const DEFAULT_CAPACITY: usize = 256;

/// Everything observable that happens in a chat session.
///
/// Emitted after state changes and consumed by:
/// - Renderers (redraw on `MessageAppended` / `HistoryCleared`)
/// - The voice adapter (speech and recognition lifecycle)
/// - Logging
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[non_exhaustive]
pub enum ChatEvent {
    // =========================================================================
    // Message store
    // =========================================================================
    /// A message was appended to the transcript.
    MessageAppended {
        message_id: MessageId,
        author: Author,
        timestamp: DateTime<Utc>,
    },

    /// The transcript and its persisted copy were erased.
    HistoryCleared { timestamp: DateTime<Utc> },

    // =========================================================================
    // Conversation
    // =========================================================================
    /// A fresh conversational context was started.
    ConversationReset {
        context_id: Uuid,
        timestamp: DateTime<Utc>,
    },

    /// The generative service answered a prompt.
    ResponseReceived {
        message_id: MessageId,
        timestamp: DateTime<Utc>,
    },

    /// A request to the generative service failed.
    RequestFailed {
        reason: String,
        timestamp: DateTime<Utc>,
    },

    // =========================================================================
    // Voice
    // =========================================================================
    SpeechStarted { timestamp: DateTime<Utc> },

    SpeechEnded { timestamp: DateTime<Utc> },

    RecognitionStarted { timestamp: DateTime<Utc> },

    /// A final transcript was recognized from speech input.
    TranscriptRecognized {
        transcript: String,
        timestamp: DateTime<Utc>,
    },

    RecognitionError {
        reason: String,
        timestamp: DateTime<Utc>,
    },

    RecognitionEnded { timestamp: DateTime<Utc> },

    // =========================================================================
    // Connectivity
    // =========================================================================
    ConnectivityChanged {
        online: bool,
        timestamp: DateTime<Utc>,
    },
}

impl ChatEvent {
    /// Returns the timestamp of the event.
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            ChatEvent::MessageAppended { timestamp, .. }
            | ChatEvent::HistoryCleared { timestamp }
            | ChatEvent::ConversationReset { timestamp, .. }
            | ChatEvent::ResponseReceived { timestamp, .. }
            | ChatEvent::RequestFailed { timestamp, .. }
            | ChatEvent::SpeechStarted { timestamp }
            | ChatEvent::SpeechEnded { timestamp }
            | ChatEvent::RecognitionStarted { timestamp }
            | ChatEvent::TranscriptRecognized { timestamp, .. }
            | ChatEvent::RecognitionError { timestamp, .. }
            | ChatEvent::RecognitionEnded { timestamp }
            | ChatEvent::ConnectivityChanged { timestamp, .. } => *timestamp,
        }
    }

    /// Returns a stable event name for logging.
    pub fn event_name(&self) -> &'static str {
        match self {
            ChatEvent::MessageAppended { .. } => "message_appended",
            ChatEvent::HistoryCleared { .. } => "history_cleared",
            ChatEvent::ConversationReset { .. } => "conversation_reset",
            ChatEvent::ResponseReceived { .. } => "response_received",
            ChatEvent::RequestFailed { .. } => "request_failed",
            ChatEvent::SpeechStarted { .. } => "speech_started",
            ChatEvent::SpeechEnded { .. } => "speech_ended",
            ChatEvent::RecognitionStarted { .. } => "recognition_started",
            ChatEvent::TranscriptRecognized { .. } => "transcript_recognized",
            ChatEvent::RecognitionError { .. } => "recognition_error",
            ChatEvent::RecognitionEnded { .. } => "recognition_ended",
            ChatEvent::ConnectivityChanged { .. } => "connectivity_changed",
        }
    }

    /// Whether renderers need to redraw the transcript.
    pub fn changes_transcript(&self) -> bool {
        matches!(
            self,
            ChatEvent::MessageAppended { .. } | ChatEvent::HistoryCleared { .. }
        )
    }
}

// =============================================================================
// EventBus
// =============================================================================

/// Fan-out channel for [`ChatEvent`]s.
///
/// Cloning the bus shares the underlying channel. Emitting with no
/// subscribers is not an error.
#[derive(Clone, Debug)]
pub struct EventBus {
    tx: broadcast::Sender<ChatEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn emit(&self, event: ChatEvent) {
        trace!(event = event.event_name(), "Emitting chat event");
        // Err only means nobody is listening.
        let _ = self.tx.send(event);
    }

    /// Register a new listener. Events emitted before this call are not seen.
    pub fn subscribe(&self) -> Subscription {
        Subscription {
            rx: self.tx.subscribe(),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

/// A registered listener on an [`EventBus`]. Dropping it unsubscribes.
#[derive(Debug)]
pub struct Subscription {
    rx: broadcast::Receiver<ChatEvent>,
}

impl Subscription {
    /// Wait for the next event. Returns `None` once every bus handle is gone.
    pub async fn recv(&mut self) -> Option<ChatEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Event subscriber lagged; events dropped");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Take the next buffered event without waiting.
    pub fn try_recv(&mut self) -> Option<ChatEvent> {
        loop {
            match self.rx.try_recv() {
                Ok(event) => return Some(event),
                Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                    warn!(skipped, "Event subscriber lagged; events dropped");
                }
                Err(_) => return None,
            }
        }
    }

    /// Explicitly stop listening.
    pub fn unsubscribe(self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_timestamp() {
        let ts = Utc::now();
        let event = ChatEvent::MessageAppended {
            message_id: MessageId(1),
            author: Author::User,
            timestamp: ts,
        };
        assert_eq!(event.timestamp(), ts);
    }

    #[test]
    fn test_event_name() {
        let event = ChatEvent::TranscriptRecognized {
            transcript: "paris".into(),
            timestamp: Utc::now(),
        };
        assert_eq!(event.event_name(), "transcript_recognized");
    }

    #[test]
    fn test_changes_transcript() {
        let appended = ChatEvent::MessageAppended {
            message_id: MessageId(1),
            author: Author::Assistant,
            timestamp: Utc::now(),
        };
        let cleared = ChatEvent::HistoryCleared {
            timestamp: Utc::now(),
        };
        let speech = ChatEvent::SpeechStarted {
            timestamp: Utc::now(),
        };
        assert!(appended.changes_transcript());
        assert!(cleared.changes_transcript());
        assert!(!speech.changes_transcript());
    }

    #[test]
    fn test_event_serialization() {
        let event = ChatEvent::ConnectivityChanged {
            online: false,
            timestamp: Utc::now(),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("ConnectivityChanged"));
    }

    #[test]
    fn test_emit_without_subscribers_is_ok() {
        let bus = EventBus::default();
        bus.emit(ChatEvent::SpeechEnded {
            timestamp: Utc::now(),
        });
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn test_subscribe_and_try_recv() {
        let bus = EventBus::new(8);
        let mut sub = bus.subscribe();
        bus.emit(ChatEvent::SpeechStarted {
            timestamp: Utc::now(),
        });
        let event = sub.try_recv().unwrap();
        assert_eq!(event.event_name(), "speech_started");
        assert!(sub.try_recv().is_none());
    }

    #[test]
    fn test_unsubscribe_drops_receiver() {
        let bus = EventBus::new(8);
        let sub = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 1);
        sub.unsubscribe();
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn test_lagged_subscriber_skips_to_newest() {
        let bus = EventBus::new(2);
        let mut sub = bus.subscribe();
        for _ in 0..5 {
            bus.emit(ChatEvent::SpeechStarted {
                timestamp: Utc::now(),
            });
        }
        bus.emit(ChatEvent::SpeechEnded {
            timestamp: Utc::now(),
        });
        let mut last = None;
        while let Some(event) = sub.try_recv() {
            last = Some(event);
        }
        assert_eq!(last.unwrap().event_name(), "speech_ended");
    }

    #[tokio::test]
    async fn test_recv_returns_none_when_bus_dropped() {
        let bus = EventBus::new(4);
        let mut sub = bus.subscribe();
        bus.emit(ChatEvent::RecognitionEnded {
            timestamp: Utc::now(),
        });
        drop(bus);
        assert!(sub.recv().await.is_some());
        assert!(sub.recv().await.is_none());
    }
}
