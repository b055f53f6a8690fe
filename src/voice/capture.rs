//! Press-and-hold speech capture
//!
//! The recognizer is a callback-style platform API. Its callbacks are turned
//! into [`RecognitionEvent`]s on a channel, and [`CaptureController`] consumes
//! them as explicit transitions of an `Idle → Capturing → Idle` machine.

use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::{Error, Result};

/// Errors reported by a speech recognizer
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RecognizerError {
    /// `start` while already running; harmless
    #[error("recognition already started")]
    AlreadyStarted,

    /// `stop` while not running; harmless
    #[error("recognition not running")]
    NotRunning,

    /// Microphone access refused
    #[error("microphone access denied: {0}")]
    PermissionDenied(String),

    /// Platform gave up without hearing anything
    #[error("no speech")]
    NoSpeech,

    #[error("{0}")]
    Other(String),
}

/// One recognized piece of speech
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub transcript: String,
    /// Interim segments may still change and are never kept
    pub is_final: bool,
}

impl Segment {
    #[must_use]
    pub fn final_text(transcript: impl Into<String>) -> Self {
        Self {
            transcript: transcript.into(),
            is_final: true,
        }
    }

    #[must_use]
    pub fn interim(transcript: impl Into<String>) -> Self {
        Self {
            transcript: transcript.into(),
            is_final: false,
        }
    }
}

/// Recognizer callbacks as messages
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecognitionEvent {
    /// New results since the last event, in arrival order
    Results(Vec<Segment>),
    /// The recognizer stopped, on request or on its own
    End,
    Error(RecognizerError),
}

/// Sending half handed to a recognizer implementation
pub type RecognitionSender = mpsc::UnboundedSender<RecognitionEvent>;

/// Receiving half owned by the capture controller
pub type RecognitionReceiver = mpsc::UnboundedReceiver<RecognitionEvent>;

/// Create the channel a recognizer reports through
#[must_use]
pub fn recognition_channel() -> (RecognitionSender, RecognitionReceiver) {
    mpsc::unbounded_channel()
}

/// A continuous, interim-capable speech-to-text engine
///
/// Results arrive asynchronously on the [`RecognitionSender`] the
/// implementation was built with.
pub trait Recognizer {
    /// # Errors
    ///
    /// Returns error if recognition cannot start
    fn start(&mut self) -> std::result::Result<(), RecognizerError>;

    /// # Errors
    ///
    /// Returns error if recognition cannot stop
    fn stop(&mut self) -> std::result::Result<(), RecognizerError>;
}

/// Vibration feedback, where the device has it
pub trait Haptics {
    fn pulse(&self, duration: Duration);
}

/// Capture lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureState {
    Idle,
    Capturing,
}

/// The transcript of one hold
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Utterance {
    /// Trimmed final transcript; empty means nothing was heard
    pub text: String,
    pub captured_at: DateTime<Utc>,
}

impl Utterance {
    #[must_use]
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            captured_at: Utc::now(),
        }
    }

    /// No speech detected
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty()
    }
}

/// Owns the recognizer and the transcript of the current hold
pub struct CaptureController {
    recognizer: Box<dyn Recognizer>,
    events: RecognitionReceiver,
    haptics: Option<Box<dyn Haptics>>,
    state: CaptureState,
    transcript: String,
    settle: Duration,
}

impl CaptureController {
    #[must_use]
    pub fn new(recognizer: Box<dyn Recognizer>, events: RecognitionReceiver, settle: Duration) -> Self {
        Self {
            recognizer,
            events,
            haptics: None,
            state: CaptureState::Idle,
            transcript: String::new(),
            settle,
        }
    }

    #[must_use]
    pub fn with_haptics(mut self, haptics: Box<dyn Haptics>) -> Self {
        self.haptics = Some(haptics);
        self
    }

    #[must_use]
    pub const fn state(&self) -> CaptureState {
        self.state
    }

    #[must_use]
    pub fn is_capturing(&self) -> bool {
        self.state == CaptureState::Capturing
    }

    /// Final text accumulated so far in this hold, untrimmed
    #[must_use]
    pub fn transcript(&self) -> &str {
        &self.transcript
    }

    /// Start a hold
    ///
    /// A no-op while already capturing.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PermissionDenied`] if the microphone is refused, or
    /// [`Error::Recognizer`] if recognition fails to start for another reason.
    pub fn begin(&mut self) -> Result<()> {
        if self.is_capturing() {
            tracing::debug!("capture already in progress");
            return Ok(());
        }

        // Leftovers from the previous hold must not leak into this one
        while let Ok(event) = self.events.try_recv() {
            tracing::trace!(?event, "discarding stale recognition event");
        }
        self.transcript.clear();
        self.pulse(Duration::from_millis(50));

        match self.recognizer.start() {
            Ok(()) => {}
            Err(RecognizerError::AlreadyStarted) => {
                tracing::debug!("recognition already started");
            }
            Err(RecognizerError::PermissionDenied(reason)) => {
                tracing::warn!(reason, "microphone permission denied");
                return Err(Error::PermissionDenied(reason));
            }
            Err(e) => return Err(Error::Recognizer(e.to_string())),
        }

        self.state = CaptureState::Capturing;
        tracing::debug!("capture started");
        Ok(())
    }

    /// Wait for the next recognizer event
    pub async fn next_event(&mut self) -> Option<RecognitionEvent> {
        self.events.recv().await
    }

    /// Apply a recognizer event received outside [`end`](Self::end)
    ///
    /// # Errors
    ///
    /// Returns [`Error::PermissionDenied`] if the recognizer lost microphone
    /// access mid-hold; capture is back to idle in that case.
    pub fn handle_event(&mut self, event: RecognitionEvent) -> Result<()> {
        match event {
            RecognitionEvent::Results(segments) => {
                if self.is_capturing() {
                    self.append_finals(&segments);
                } else {
                    tracing::trace!("results while idle, dropped");
                }
            }
            RecognitionEvent::End => {
                if self.is_capturing() {
                    // The platform stopped on its own; keep the hold going
                    match self.recognizer.start() {
                        Ok(()) => tracing::debug!("recognition restarted"),
                        Err(e) => tracing::debug!(error = %e, "recognition restart failed"),
                    }
                }
            }
            RecognitionEvent::Error(RecognizerError::PermissionDenied(reason)) => {
                if self.is_capturing() {
                    self.state = CaptureState::Idle;
                    let _ = self.recognizer.stop();
                }
                tracing::warn!(reason, "microphone permission denied");
                return Err(Error::PermissionDenied(reason));
            }
            RecognitionEvent::Error(RecognizerError::Other(reason)) => {
                tracing::warn!(reason, "recognition error");
            }
            RecognitionEvent::Error(e) => {
                tracing::debug!(error = %e, "transient recognition error");
            }
        }
        Ok(())
    }

    /// Finish the hold and return what was said
    ///
    /// Returns `None` if no hold was in progress. Trailing final results are
    /// collected until the recognizer reports its end or the settle window
    /// passes, whichever comes first.
    pub async fn end(&mut self) -> Option<Utterance> {
        if !self.is_capturing() {
            return None;
        }

        self.state = CaptureState::Idle;
        self.pulse(Duration::from_millis(30));

        // Everything already queued predates the stop request
        while let Ok(event) = self.events.try_recv() {
            self.absorb(event);
        }

        if let Err(e) = self.recognizer.stop() {
            tracing::debug!(error = %e, "recognition stop failed");
        }

        let deadline = Instant::now() + self.settle;
        loop {
            match tokio::time::timeout_at(deadline, self.events.recv()).await {
                Ok(Some(RecognitionEvent::End) | None) | Err(_) => break,
                Ok(Some(event)) => self.absorb(event),
            }
        }

        let utterance = Utterance::new(self.transcript.trim());
        tracing::debug!(
            text = %utterance.text,
            empty = utterance.is_empty(),
            "capture finished"
        );
        Some(utterance)
    }

    /// Collect results that arrive while the hold is winding down
    fn absorb(&mut self, event: RecognitionEvent) {
        match event {
            RecognitionEvent::Results(segments) => self.append_finals(&segments),
            RecognitionEvent::End => {}
            RecognitionEvent::Error(e) => tracing::debug!(error = %e, "error while settling"),
        }
    }

    fn append_finals(&mut self, segments: &[Segment]) {
        for segment in segments.iter().filter(|s| s.is_final) {
            self.transcript.push_str(&segment.transcript);
            self.transcript.push(' ');
        }
    }

    fn pulse(&self, duration: Duration) {
        if let Some(haptics) = &self.haptics {
            haptics.pulse(duration);
        }
    }
}
