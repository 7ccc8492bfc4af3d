//! Conversational core for Wayfarer.
//!
//! Formats generative responses, keeps the persisted transcript, wraps the
//! Gemini chat context, and coordinates optional voice input and output.

pub mod client;
pub mod connectivity;
pub mod error;
pub mod formatter;
pub mod session;
pub mod store;
pub mod view;
pub mod voice;

pub use client::{GeminiClient, GenerationConfig, GenerativeClient, Turn, TurnRole};
pub use connectivity::ConnectivitySignal;
pub use error::ChatError;
pub use formatter::ResponseFormatter;
pub use session::{ChatSession, GREETING_REPLY};
pub use store::{MessageStore, HISTORY_KEY};
pub use view::{ChatView, RejectReason, SendOutcome, APOLOGY_TEXT};
pub use voice::{
    InputBuffer, RecognitionConfig, SpeechRecognizer, SpeechSynthesizer, Utterance,
    VoiceInterface,
};
