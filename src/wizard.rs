//! First-run setup dialogue
//!
//! A fixed list of questions, each introduced by a few spoken steps and
//! answered by one capture turn. The answer to the last question picks the
//! persona, which greets the user in its own voice.
//!
//! `stage` is 0 before [`SetupWizard::start`], then `n` while the answer to
//! question `n` is awaited, and [`COMPLETE_STAGE`] once the persona is set.

use std::time::Duration;

use crate::persona::{PersonaCatalog, VoiceKind, VoiceProfile, resolve_voice_preference};
use crate::voice::{AudioUnlockManager, PlaybackController, SpeechJob, SpeechOutcome};
use crate::{Error, Result};

const WELCOME: &str = "Welcome to the world's first artificially intelligent operating system, \
OS1. We'd like to ask you a few basic questions before the operating system is initiated. \
This will help create an OS to best fit your needs.";

/// Spoken by the persona once it has been chosen
pub const GREETING: &str = "Hi. How are you?";

/// One step of a spoken prompt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Say(&'static str),
    Pause(Duration),
}

/// What a wizard question asks about
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    Sociability,
    Mother,
    VoicePreference,
}

struct Question {
    slot: Slot,
    /// Spoken before the answer is awaited
    prompt: &'static [Step],
}

const QUESTIONS: &[Question] = &[
    Question {
        slot: Slot::Sociability,
        prompt: &[
            Step::Say(WELCOME),
            Step::Pause(Duration::from_millis(800)),
            Step::Say("Are you social or anti-social?"),
        ],
    },
    Question {
        slot: Slot::Mother,
        prompt: &[Step::Say("How's your relationship with your mother?")],
    },
    Question {
        slot: Slot::VoicePreference,
        prompt: &[
            Step::Say(
                "Thank you. Please wait as your individualized operating system is initiated.",
            ),
            Step::Pause(Duration::from_millis(1000)),
            Step::Say("Would you like a male or female voice?"),
        ],
    },
];

/// Stage reached once every question is answered
#[allow(clippy::cast_possible_truncation)]
pub const COMPLETE_STAGE: u8 = QUESTIONS.len() as u8 + 1;

/// One recorded answer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WizardAnswer {
    pub slot: Slot,
    pub stage: u8,
    pub text: String,
}

/// Where the wizard stands after a call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WizardProgress {
    /// Waiting for the answer to question `stage`
    Awaiting { stage: u8 },
    /// All questions answered and the persona assigned
    Complete(VoiceProfile),
}

/// Drives the setup questions through playback
pub struct SetupWizard {
    catalog: PersonaCatalog,
    stage: u8,
    started: bool,
    answers: Vec<WizardAnswer>,
    profile: Option<VoiceProfile>,
    answer_delay: Duration,
}

impl SetupWizard {
    #[must_use]
    pub const fn new(catalog: PersonaCatalog) -> Self {
        Self {
            catalog,
            stage: 0,
            started: false,
            answers: Vec::new(),
            profile: None,
            answer_delay: Duration::from_millis(500),
        }
    }

    /// Pause between a captured answer and the next prompt
    #[must_use]
    pub const fn with_answer_delay(mut self, delay: Duration) -> Self {
        self.answer_delay = delay;
        self
    }

    #[must_use]
    pub const fn stage(&self) -> u8 {
        self.stage
    }

    #[must_use]
    pub const fn is_complete(&self) -> bool {
        self.stage >= COMPLETE_STAGE
    }

    #[must_use]
    pub fn answers(&self) -> &[WizardAnswer] {
        &self.answers
    }

    /// The chosen persona, once the last answer is in
    #[must_use]
    pub const fn profile(&self) -> Option<&VoiceProfile> {
        self.profile.as_ref()
    }

    /// Unlock audio, speak the welcome and the first question
    ///
    /// Calling this again once started changes nothing and reports the
    /// current progress.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AudioLocked`] if audio cannot be unlocked, or the
    /// playback error if a prompt cannot be spoken. The wizard is back at
    /// stage 0 afterwards and may be started again.
    pub async fn start(
        &mut self,
        audio: &AudioUnlockManager,
        playback: &PlaybackController,
    ) -> Result<WizardProgress> {
        if self.started {
            tracing::debug!(stage = self.stage, "setup already started");
            return Ok(self.progress());
        }
        self.started = true;

        let introduced = async {
            audio.unlock().await?;
            speak_steps(QUESTIONS[0].prompt, playback).await
        }
        .await;

        if let Err(e) = introduced {
            tracing::warn!(error = %e, "setup could not start");
            self.started = false;
            return Err(e);
        }

        self.stage = 1;
        tracing::info!("setup started");
        Ok(self.progress())
    }

    /// Record the answer for `stage` and move on
    ///
    /// Speaks the next question, or on the last question resolves the
    /// persona, commits it and speaks the greeting in the persona's voice.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] if `stage` is not the stage awaiting an
    /// answer. If the next prompt cannot be spoken the stage stays where it was
    /// and nothing is recorded. If only the greeting fails, the persona is
    /// already committed and the wizard is complete.
    pub async fn answer(
        &mut self,
        transcript: &str,
        stage: u8,
        playback: &PlaybackController,
    ) -> Result<WizardProgress> {
        if !self.started || self.is_complete() || stage == 0 || stage != self.stage {
            return Err(Error::InvalidState(format!(
                "answer for stage {stage} while wizard is at stage {}",
                self.stage
            )));
        }

        let text = transcript.trim();
        let question = &QUESTIONS[usize::from(stage - 1)];
        tracing::debug!(stage, slot = ?question.slot, answer = text, "setup answer");

        tokio::time::sleep(self.answer_delay).await;

        if let Some(next) = QUESTIONS.get(usize::from(stage)) {
            speak_steps(next.prompt, playback).await?;
            self.record(question.slot, stage, text);
            self.stage += 1;
            return Ok(self.progress());
        }

        self.record(question.slot, stage, text);
        let gender = resolve_voice_preference(text);
        let profile = self.catalog.profile(gender).clone();
        self.profile = Some(profile.clone());
        self.stage = COMPLETE_STAGE;
        tracing::info!(persona = %profile.name, %gender, "setup complete");

        speak(GREETING, profile.kind(), playback).await?;
        Ok(WizardProgress::Complete(profile))
    }

    /// Forget everything and return to stage 0
    pub fn reset(&mut self) {
        self.stage = 0;
        self.started = false;
        self.answers.clear();
        self.profile = None;
    }

    fn progress(&self) -> WizardProgress {
        self.profile.clone().map_or(
            WizardProgress::Awaiting { stage: self.stage },
            WizardProgress::Complete,
        )
    }

    fn record(&mut self, slot: Slot, stage: u8, text: &str) {
        self.answers.push(WizardAnswer {
            slot,
            stage,
            text: text.to_string(),
        });
    }
}

async fn speak_steps(steps: &[Step], playback: &PlaybackController) -> Result<()> {
    for step in steps {
        match *step {
            Step::Say(text) => speak(text, VoiceKind::Setup, playback).await?,
            Step::Pause(duration) => tokio::time::sleep(duration).await,
        }
    }
    Ok(())
}

async fn speak(text: &str, kind: VoiceKind, playback: &PlaybackController) -> Result<()> {
    if playback.speak(SpeechJob::new(text, kind)).await? == SpeechOutcome::Cancelled {
        tracing::debug!(kind = %kind, "prompt cut short");
    }
    Ok(())
}
