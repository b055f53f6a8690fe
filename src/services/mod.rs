//! External collaborators
//!
//! The chat and speech-synthesis services are plain request/response calls.
//! The front end only depends on the traits here; the HTTP clients are the
//! production implementations.

mod chat;
mod stt;
mod tts;

use async_trait::async_trait;

pub use chat::HttpChatService;
pub use stt::WhisperClient;
pub use tts::HttpSpeechSynthesizer;

use crate::Result;
use crate::persona::VoiceKind;
use crate::session::ChatMessage;

/// Input to the chat collaborator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatRequest {
    /// System prompt, history and the latest user utterance, in order
    pub messages: Vec<ChatMessage>,
    /// Persona identifier, once one is assigned
    pub voice_profile: Option<String>,
}

/// Produces one assistant reply per request
#[async_trait]
pub trait ChatService: Send + Sync {
    /// # Errors
    ///
    /// Returns error if the reply cannot be produced
    async fn reply(&self, request: &ChatRequest) -> Result<String>;
}

/// Input to the speech-synthesis collaborator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpeechRequest {
    /// Already sanitized text
    pub text: String,
    /// Provider voice identifier
    pub voice_id: String,
    pub kind: VoiceKind,
}

/// Turns text into encoded audio
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// # Errors
    ///
    /// Returns error if synthesis fails
    async fn synthesize(&self, request: &SpeechRequest) -> Result<Vec<u8>>;
}
