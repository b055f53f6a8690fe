//! Conversation session state
//!
//! One `Session` exists per running front end. It is owned by the
//! [`TurnCoordinator`](crate::coordinator::TurnCoordinator) and lives only in memory.

use serde::{Deserialize, Serialize};

use crate::persona::VoiceProfile;

/// Where the session is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    /// Nothing has happened yet; the first press starts setup
    #[default]
    Idle,
    /// The setup wizard is asking its questions
    SettingUp,
    /// General conversation with the assigned persona
    Conversing,
}

/// Speaker of a history entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One chat message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Process-wide conversational state
#[derive(Debug, Clone, Default)]
pub struct Session {
    phase: Phase,
    wizard_stage: Option<u8>,
    voice_profile: Option<VoiceProfile>,
    history: Vec<ChatMessage>,
}

impl Session {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub const fn phase(&self) -> Phase {
        self.phase
    }

    #[must_use]
    pub const fn wizard_stage(&self) -> Option<u8> {
        self.wizard_stage
    }

    #[must_use]
    pub const fn voice_profile(&self) -> Option<&VoiceProfile> {
        self.voice_profile.as_ref()
    }

    /// Conversation turns in the order they happened
    #[must_use]
    pub fn history(&self) -> &[ChatMessage] {
        &self.history
    }

    pub(crate) const fn set_phase(&mut self, phase: Phase) {
        self.phase = phase;
    }

    pub(crate) const fn set_wizard_stage(&mut self, stage: Option<u8>) {
        self.wizard_stage = stage;
    }

    /// Assign the persona; a profile is only ever assigned once
    pub(crate) fn assign_profile(&mut self, profile: VoiceProfile) {
        if self.voice_profile.is_none() {
            self.voice_profile = Some(profile);
        } else {
            tracing::warn!("voice profile already assigned, ignoring");
        }
    }

    pub(crate) fn push(&mut self, message: ChatMessage) {
        self.history.push(message);
    }
}
