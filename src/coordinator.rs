//! Turn-taking coordinator
//!
//! [`TurnCoordinator`] owns the session and the capture, playback and setup
//! controllers. It is the only caller of the recognizer and the audio
//! context, and it never lets capture and playback run at the same time.
//!
//! ```text
//! press start ──▶ Idle phase? ──yes──▶ SetupWizard::start
//!                     │no
//!                     ▼
//!             speaking or capturing? ──yes──▶ ignored
//!                     │no
//!                     ▼
//!              unlock ─▶ capture.begin          (Listening)
//!
//! press end ──▶ capture.end ─▶ empty? ──yes──▶ NoSpeech (Idle)
//!                                 │no
//!                     ┌───────────┴───────────┐
//!                SettingUp                Conversing
//!              wizard.answer        chat ─▶ playback.speak
//! ```

use std::sync::Arc;

use tokio::sync::watch;

use crate::error::Fault;
use crate::persona::{Gender, VoiceKind, VoiceProfile};
use crate::services::{ChatRequest, ChatService};
use crate::session::{ChatMessage, Phase, Session};
use crate::voice::{
    AudioUnlockManager, CaptureController, CaptureState, PlaybackController, RecognitionEvent,
    SpeechJob,
};
use crate::wizard::{SetupWizard, WizardProgress};
use crate::{Error, config};

/// What the front end shows
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UiState {
    /// Ready for a press
    Idle,
    /// Capturing the user's speech
    Listening,
    /// Waiting on the settle window or the chat collaborator
    Thinking,
    /// A prompt or reply is playing
    Speaking,
    /// The last turn failed; a new press retries
    Error(Fault),
}

impl std::fmt::Display for UiState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => f.write_str("idle"),
            Self::Listening => f.write_str("listening"),
            Self::Thinking => f.write_str("thinking"),
            Self::Speaking => f.write_str("speaking"),
            Self::Error(Fault::PermissionDenied) => f.write_str("error: microphone access denied"),
            Self::Error(Fault::AudioLocked) => f.write_str("error: tap again to enable audio"),
            Self::Error(Fault::Service) => f.write_str("error: something went wrong, try again"),
        }
    }
}

/// Result of a press start
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PressOutcome {
    /// The first press began the setup dialogue
    SetupStarted,
    /// Capture is running
    Capturing,
    /// Nothing happened
    Ignored,
}

/// Result of a press end
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    /// No capture was running
    Ignored,
    /// Nothing was heard; ready for another press
    NoSpeech,
    /// The wizard took the answer and is waiting on `stage`
    WizardAdvanced(u8),
    /// The wizard finished and assigned the named persona
    WizardComplete(String),
    /// The chat reply was spoken
    Replied,
    /// The turn failed; see [`UiState::Error`]
    Failed,
}

/// Top-level turn arbiter
pub struct TurnCoordinator {
    session: Session,
    audio: Arc<AudioUnlockManager>,
    capture: CaptureController,
    playback: Arc<PlaybackController>,
    wizard: SetupWizard,
    chat: Arc<dyn ChatService>,
    system_prompt: String,
    ui: watch::Sender<UiState>,
}

impl TurnCoordinator {
    #[must_use]
    pub fn new(
        audio: Arc<AudioUnlockManager>,
        capture: CaptureController,
        playback: Arc<PlaybackController>,
        wizard: SetupWizard,
        chat: Arc<dyn ChatService>,
    ) -> Self {
        let (ui, _) = watch::channel(UiState::Idle);
        Self {
            session: Session::new(),
            audio,
            capture,
            playback,
            wizard,
            chat,
            system_prompt: config::DEFAULT_SYSTEM_PROMPT.to_string(),
            ui,
        }
    }

    #[must_use]
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    #[must_use]
    pub const fn session(&self) -> &Session {
        &self.session
    }

    #[must_use]
    pub fn ui_state(&self) -> UiState {
        *self.ui.borrow()
    }

    /// Watch UI state changes
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<UiState> {
        self.ui.subscribe()
    }

    #[must_use]
    pub const fn capture_state(&self) -> CaptureState {
        self.capture.state()
    }

    #[must_use]
    pub const fn playback(&self) -> &Arc<PlaybackController> {
        &self.playback
    }

    #[must_use]
    pub const fn wizard(&self) -> &SetupWizard {
        &self.wizard
    }

    /// The user pressed the talk button
    pub async fn on_press_start(&mut self) -> PressOutcome {
        if self.session.phase() == Phase::Idle {
            return self.start_setup().await;
        }

        if self.playback.is_active() {
            tracing::debug!("press ignored while speaking");
            return PressOutcome::Ignored;
        }

        if self.capture.is_capturing() {
            tracing::debug!("press ignored, already listening");
            return PressOutcome::Ignored;
        }

        if let Err(e) = self.audio.unlock().await {
            self.fail(&e);
            return PressOutcome::Ignored;
        }

        match self.capture.begin() {
            Ok(()) => {
                self.publish(UiState::Listening);
                PressOutcome::Capturing
            }
            Err(e) => {
                self.fail(&e);
                PressOutcome::Ignored
            }
        }
    }

    /// The user released the talk button
    pub async fn on_press_end(&mut self) -> TurnOutcome {
        if !self.capture.is_capturing() {
            return TurnOutcome::Ignored;
        }

        self.publish(UiState::Thinking);
        let Some(utterance) = self.capture.end().await else {
            self.publish(UiState::Idle);
            return TurnOutcome::Ignored;
        };

        if utterance.is_empty() {
            tracing::info!("no speech detected");
            self.publish(UiState::Idle);
            return TurnOutcome::NoSpeech;
        }

        tracing::info!(text = %utterance.text, phase = ?self.session.phase(), "user said");
        match self.session.phase() {
            Phase::SettingUp => self.answer_wizard(&utterance.text).await,
            Phase::Conversing => self.converse(utterance.text).await,
            Phase::Idle => {
                self.publish(UiState::Idle);
                TurnOutcome::Ignored
            }
        }
    }

    /// Wait for the recognizer's next event
    pub async fn next_recognition_event(&mut self) -> Option<RecognitionEvent> {
        self.capture.next_event().await
    }

    /// Apply a recognizer event that arrived between presses
    pub fn on_recognition_event(&mut self, event: RecognitionEvent) {
        if let Err(e) = self.capture.handle_event(event) {
            self.fail(&e);
        }
    }

    /// The front end moved to the background or back
    pub async fn on_visibility_change(&mut self, visible: bool) {
        tracing::debug!(visible, "visibility changed");
        self.audio.on_visibility_change(visible).await;
    }

    async fn start_setup(&mut self) -> PressOutcome {
        self.session.set_phase(Phase::SettingUp);
        self.publish(UiState::Speaking);

        match self.wizard.start(&self.audio, &self.playback).await {
            Ok(WizardProgress::Awaiting { stage }) => {
                self.session.set_wizard_stage(Some(stage));
                self.publish(UiState::Idle);
                PressOutcome::SetupStarted
            }
            Ok(WizardProgress::Complete(_)) => {
                self.sync_wizard();
                self.publish(UiState::Idle);
                PressOutcome::Ignored
            }
            Err(e) => {
                self.session.set_phase(Phase::Idle);
                self.fail(&e);
                PressOutcome::Ignored
            }
        }
    }

    async fn answer_wizard(&mut self, text: &str) -> TurnOutcome {
        let Some(stage) = self.session.wizard_stage() else {
            tracing::warn!("setup answer without a wizard stage");
            self.publish(UiState::Idle);
            return TurnOutcome::Ignored;
        };

        self.publish(UiState::Speaking);
        let result = self.wizard.answer(text, stage, &self.playback).await;
        self.sync_wizard();

        match result {
            Ok(WizardProgress::Awaiting { stage }) => {
                self.publish(UiState::Idle);
                TurnOutcome::WizardAdvanced(stage)
            }
            Ok(WizardProgress::Complete(profile)) => {
                self.publish(UiState::Idle);
                TurnOutcome::WizardComplete(profile.name)
            }
            Err(e) => {
                self.fail(&e);
                TurnOutcome::Failed
            }
        }
    }

    async fn converse(&mut self, text: String) -> TurnOutcome {
        self.session.push(ChatMessage::user(text));
        self.publish(UiState::Thinking);

        let request = ChatRequest {
            messages: self.chat_messages(),
            voice_profile: self.session.voice_profile().map(VoiceProfile::id),
        };

        let reply = match self.chat.reply(&request).await {
            Ok(reply) => reply,
            Err(e) => {
                tracing::warn!(error = %e, "chat failed, turn kept without reply");
                self.fail(&e);
                return TurnOutcome::Failed;
            }
        };

        self.session.push(ChatMessage::assistant(reply.clone()));
        let kind = self
            .session
            .voice_profile()
            .map_or(VoiceKind::Persona(Gender::Female), VoiceProfile::kind);

        self.publish(UiState::Speaking);
        match self.playback.speak(SpeechJob::new(reply, kind)).await {
            Ok(_) => {
                self.publish(UiState::Idle);
                TurnOutcome::Replied
            }
            Err(e) => {
                self.fail(&e);
                TurnOutcome::Failed
            }
        }
    }

    /// System prompt followed by the history, latest user turn last
    fn chat_messages(&self) -> Vec<ChatMessage> {
        std::iter::once(ChatMessage::system(self.system_prompt.clone()))
            .chain(self.session.history().iter().cloned())
            .collect()
    }

    /// Copy wizard progress into the session
    fn sync_wizard(&mut self) {
        if let Some(profile) = self.wizard.profile() {
            if self.session.voice_profile().is_none() {
                self.session.assign_profile(profile.clone());
                self.session.set_phase(Phase::Conversing);
                self.session.set_wizard_stage(None);
                tracing::info!(persona = %profile.name, "conversation mode");
            }
            return;
        }

        let stage = self.wizard.stage();
        self.session.set_wizard_stage((stage > 0).then_some(stage));
    }

    fn fail(&self, error: &Error) {
        tracing::warn!(error = %error, "turn failed");
        self.publish(UiState::Error(error.fault()));
    }

    fn publish(&self, state: UiState) {
        self.ui.send_if_modified(|current| {
            if *current == state {
                false
            } else {
                tracing::debug!(from = %current, to = %state, "ui state");
                *current = state;
                true
            }
        });
    }
}
