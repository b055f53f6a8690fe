//! OS1 voice - hold-to-talk turn taking for a voice companion
//!
//! This library provides the control logic of a voice front end:
//! - Audio unlocking and one-at-a-time speech playback
//! - Press-and-hold speech capture
//! - A spoken setup wizard that assigns a persona
//! - Turn coordination between capture, playback and the chat collaborator
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                  Front end (os1)                     │
//! │        press start / press end / visibility          │
//! └────────────────────┬────────────────────────────────┘
//!                      │
//! ┌────────────────────▼────────────────────────────────┐
//! │                 TurnCoordinator                      │
//! │   Session  │  SetupWizard  │  Capture  │  Playback  │
//! └────────────────────┬────────────────────────────────┘
//!                      │
//! ┌────────────────────▼────────────────────────────────┐
//! │                  Collaborators                       │
//! │   Chat  │  TTS  │  Recognizer  │  Audio output      │
//! └─────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod coordinator;
pub mod error;
pub mod persona;
pub mod services;
pub mod session;
pub mod voice;
pub mod wizard;

pub use config::Config;
pub use coordinator::{PressOutcome, TurnCoordinator, TurnOutcome, UiState};
pub use error::{Error, Fault, Result};
pub use persona::{Gender, PersonaCatalog, VoiceKind, VoiceProfile, resolve_voice_preference};
pub use session::{ChatMessage, Phase, Role, Session};
pub use wizard::{SetupWizard, WizardAnswer, WizardProgress};
