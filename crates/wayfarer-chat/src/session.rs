//! Chat session adapter.
//!
//! Holds the conversational context for the generative service and turns
//! user text into tour-guide prompts. Greetings are answered locally.

use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::client::{GenerationConfig, GenerativeClient, Turn};
use crate::error::ChatError;

/// Reply for greeting messages; never sent to the service.
pub const GREETING_REPLY: &str = "Hello! I'm your travel and tourism guide. Name a destination and I'll share a bit of its history, the top attractions, a local specialty, and a day trip worth taking.";

/// Greeting keywords, matched case-insensitively as whole words.
const GREETING_KEYWORDS: &[&str] = &[
    "hello",
    "hi",
    "hey",
    "greetings",
    "good morning",
    "good afternoon",
    "good evening",
];

static GREETING_RE: LazyLock<Regex> = LazyLock::new(|| {
    let alternatives = GREETING_KEYWORDS
        .iter()
        .map(|k| regex::escape(k).replace(' ', r"\s+"))
        .collect::<Vec<_>>()
        .join("|");
    Regex::new(&format!(r"(?i)\b(?:{})\b", alternatives)).expect("Invalid greeting regex")
});

/// Whether `text` contains a greeting keyword.
///
/// Keywords match case-insensitively as whole words, not as substrings:
/// "Hi there" is a greeting, "history of Rome" and "Chicago" are not.
pub fn is_greeting(text: &str) -> bool {
    GREETING_RE.is_match(text)
}

/// Wrap a user question in the tour-guide prompt.
pub fn build_prompt(user_text: &str) -> String {
    format!(
        "You are a friendly, knowledgeable travel and tourism guide. \
         Answer the traveller's request below. Start with the destination name in **bold** as a title, \
         then use **bold labels** followed by a colon for each section:\n\
         **History:** a short snapshot of the place's history.\n\
         **Attractions:** 2-3 must-see attractions.\n\
         **Local Specialty:** one dish or product the place is known for.\n\
         **Day Trip:** one nearby day-trip suggestion.\n\
         Keep the whole answer concise.\n\n\
         Traveller's request: {}",
        user_text.trim()
    )
}

/// Accumulated turns of one conversational context.
#[derive(Debug, Clone)]
struct Context {
    id: Uuid,
    turns: Vec<Turn>,
}

impl Context {
    fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            turns: Vec::new(),
        }
    }
}

/// Handle to the generative service's conversational context.
///
/// Owned by the chat view and passed explicitly; not safe for overlapping
/// sends, which the view prevents.
#[derive(Debug)]
pub struct ChatSession<C> {
    client: C,
    config: GenerationConfig,
    context: Option<Context>,
}

impl<C: GenerativeClient> ChatSession<C> {
    /// Create a session. No context exists until `initialize` or the first send.
    pub fn new(client: C, config: GenerationConfig) -> Self {
        Self {
            client,
            config,
            context: None,
        }
    }

    /// Start a fresh context, discarding all prior turns. Returns its id.
    pub fn initialize(&mut self) -> Uuid {
        let context = Context::new();
        let id = context.id;
        if let Some(old) = self.context.replace(context) {
            debug!(old_context = %old.id, turns = old.turns.len(), "Discarded conversation context");
        }
        info!(context_id = %id, "Conversation context initialized");
        id
    }

    pub fn is_initialized(&self) -> bool {
        self.context.is_some()
    }

    pub fn context_id(&self) -> Option<Uuid> {
        self.context.as_ref().map(|c| c.id)
    }

    /// Number of turns held by the current context.
    pub fn context_len(&self) -> usize {
        self.context.as_ref().map_or(0, |c| c.turns.len())
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    pub fn generation_config(&self) -> &GenerationConfig {
        &self.config
    }

    /// Send user text and return the raw reply.
    ///
    /// Greetings short-circuit with [`GREETING_REPLY`]. Any service failure is
    /// returned as-is; the context is only extended on success.
    pub async fn send(&mut self, user_text: &str) -> Result<String, ChatError> {
        if user_text.trim().is_empty() {
            return Err(ChatError::EmptyMessage);
        }
        if self.context.is_none() {
            self.initialize();
        }

        if is_greeting(user_text) {
            debug!("Greeting detected; answering locally");
            return Ok(GREETING_REPLY.to_string());
        }

        let prompt = build_prompt(user_text);
        let mut turns = self
            .context
            .as_ref()
            .map(|c| c.turns.clone())
            .unwrap_or_default();
        turns.push(Turn::user(prompt));

        match self.client.generate(&turns, &self.config).await {
            Ok(reply) => {
                turns.push(Turn::model(reply.clone()));
                if let Some(context) = self.context.as_mut() {
                    context.turns = turns;
                    debug!(context_id = %context.id, turns = context.turns.len(), "Reply received");
                }
                Ok(reply)
            }
            Err(e) => {
                warn!(
                    context_id = ?self.context_id(),
                    error = %e,
                    "Generative request failed"
                );
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Records every request; replies with a fixed string or fails.
    #[derive(Default)]
    struct ScriptedClient {
        calls: AtomicUsize,
        last_turns: Mutex<Vec<Turn>>,
        fail: bool,
    }

    impl GenerativeClient for ScriptedClient {
        async fn generate(
            &self,
            turns: &[Turn],
            _config: &GenerationConfig,
        ) -> Result<String, ChatError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last_turns.lock().unwrap() = turns.to_vec();
            if self.fail {
                Err(ChatError::Request("connection refused".into()))
            } else {
                Ok("**Rome** **History:** ancient".to_string())
            }
        }
    }

    fn session(fail: bool) -> ChatSession<ScriptedClient> {
        ChatSession::new(
            ScriptedClient {
                fail,
                ..Default::default()
            },
            GenerationConfig::default(),
        )
    }

    #[test]
    fn test_greeting_detection() {
        assert!(is_greeting("hello there"));
        assert!(is_greeting("Hi"));
        assert!(is_greeting("HEY, what's up"));
        assert!(is_greeting("Good   Morning guide"));
        assert!(!is_greeting("Tell me the history of Rome"));
        assert!(!is_greeting("Things to do in Chicago"));
        assert!(!is_greeting("good food in Naples"));
    }

    #[test]
    fn test_build_prompt_contains_sections_and_text() {
        let prompt = build_prompt("  Lisbon in spring ");
        assert!(prompt.contains("History"));
        assert!(prompt.contains("Attractions"));
        assert!(prompt.contains("Local Specialty"));
        assert!(prompt.contains("Day Trip"));
        assert!(prompt.ends_with("Traveller's request: Lisbon in spring"));
    }

    #[tokio::test]
    async fn test_greeting_short_circuits() {
        let mut s = session(false);
        let reply = s.send("hello there").await.unwrap();
        assert_eq!(reply, GREETING_REPLY);
        assert_eq!(s.client().calls.load(Ordering::SeqCst), 0);
        assert_eq!(s.context_len(), 0);
    }

    #[tokio::test]
    async fn test_send_lazily_initializes() {
        let mut s = session(false);
        assert!(!s.is_initialized());
        s.send("Rome").await.unwrap();
        assert!(s.is_initialized());
    }

    #[tokio::test]
    async fn test_send_wraps_prompt_and_extends_context() {
        let mut s = session(false);
        let reply = s.send("Rome").await.unwrap();
        assert_eq!(reply, "**Rome** **History:** ancient");
        assert_eq!(s.context_len(), 2);

        s.send("Florence").await.unwrap();
        let turns = s.client().last_turns.lock().unwrap().clone();
        assert_eq!(turns.len(), 3);
        assert!(turns[2].text.contains("Traveller's request: Florence"));
        assert_eq!(s.context_len(), 4);
    }

    #[tokio::test]
    async fn test_failure_propagates_and_context_unchanged() {
        let mut s = session(true);
        let err = s.send("Rome").await.unwrap_err();
        assert!(matches!(err, ChatError::Request(_)));
        assert_eq!(s.context_len(), 0);
        assert_eq!(s.client().calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_initialize_twice_resets_context() {
        let mut s = session(false);
        s.send("Rome").await.unwrap();
        let first = s.context_id().unwrap();

        let second = s.initialize();
        let third = s.initialize();
        assert_ne!(first, second);
        assert_ne!(second, third);
        assert_eq!(s.context_len(), 0);

        s.send("Madrid").await.unwrap();
        let turns = s.client().last_turns.lock().unwrap().clone();
        assert_eq!(turns.len(), 1);
    }

    #[tokio::test]
    async fn test_empty_message_rejected() {
        let mut s = session(false);
        assert!(matches!(s.send("   ").await, Err(ChatError::EmptyMessage)));
        assert_eq!(s.client().calls.load(Ordering::SeqCst), 0);
    }
}
